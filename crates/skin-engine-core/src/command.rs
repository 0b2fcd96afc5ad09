//! Command descriptors and bound commands.
//!
//! A command is declared either as a direct callable or as a method name to be
//! looked up on a target object. Method lookup happens once, when the command
//! is bound; executing a [`BoundCommand`] is a plain function call.

use std::fmt;
use std::sync::Arc;

use crate::binding::BindingSource;
use crate::copy::CopyManager;
use crate::error::{CoreError, CoreResult};
use crate::logging::targets;
use crate::path::PropertyPath;
use crate::property::PropertyCell;
use crate::value::Value;

/// A method exposed by a [`Bindable`](crate::Bindable) object.
#[derive(Clone)]
pub enum Method {
    /// Takes no parameter.
    NoArg(Arc<dyn Fn() + Send + Sync>),
    /// Takes one parameter.
    WithArg(Arc<dyn Fn(Value) + Send + Sync>),
}

impl Method {
    /// Wrap a parameterless closure.
    pub fn no_arg(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self::NoArg(Arc::new(f))
    }

    /// Wrap a closure taking one value.
    pub fn with_arg(f: impl Fn(Value) + Send + Sync + 'static) -> Self {
        Self::WithArg(Arc::new(f))
    }

    /// Whether the method takes a parameter.
    pub fn accepts_parameter(&self) -> bool {
        matches!(self, Self::WithArg(_))
    }

    fn invoke(&self, parameter: Option<Value>) {
        match self {
            Self::NoArg(f) => f(),
            Self::WithArg(f) => f(parameter.unwrap_or_default()),
        }
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoArg(_) => f.write_str("Method::NoArg"),
            Self::WithArg(_) => f.write_str("Method::WithArg"),
        }
    }
}

/// A directly invocable command body.
pub type Callable = Arc<dyn Fn(Option<Value>) + Send + Sync>;

/// How a command finds the code it runs.
#[derive(Clone)]
pub enum CommandDescriptor {
    /// A function reference.
    Direct(Callable),
    /// A method resolved by name on a target object at bind time.
    Method {
        /// Where the target root comes from.
        target: BindingSource,
        /// Path from the target root to the object exposing the method.
        path: PropertyPath,
        /// Method name.
        method: String,
    },
}

impl PartialEq for CommandDescriptor {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Direct(a), Self::Direct(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            (
                Self::Method { target: t1, path: p1, method: m1 },
                Self::Method { target: t2, path: p2, method: m2 },
            ) => t1 == t2 && p1 == p2 && m1 == m2,
            _ => false,
        }
    }
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(_) => f.write_str("Direct"),
            Self::Method { target, path, method } => f
                .debug_struct("Method")
                .field("target", target)
                .field("path", &path.to_string())
                .field("method", method)
                .finish(),
        }
    }
}

/// Where a command's parameter comes from when none is passed to `execute`.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandParameter {
    /// A fixed value.
    Value(Value),
    /// A property of the declaring element, read at execution time.
    Property(String),
}

/// A declared command: descriptor plus optional parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandDecl {
    /// What to run.
    pub descriptor: CommandDescriptor,
    /// Default parameter.
    pub parameter: Option<CommandParameter>,
}

impl CommandDecl {
    /// A command calling `f` directly.
    pub fn direct(f: impl Fn(Option<Value>) + Send + Sync + 'static) -> Self {
        Self {
            descriptor: CommandDescriptor::Direct(Arc::new(f)),
            parameter: None,
        }
    }

    /// A command calling `method` on the object found at `path` from `target`.
    pub fn method(target: BindingSource, path: PropertyPath, method: impl Into<String>) -> Self {
        Self {
            descriptor: CommandDescriptor::Method {
                target,
                path,
                method: method.into(),
            },
            parameter: None,
        }
    }

    /// Set the default parameter.
    pub fn with_parameter(mut self, parameter: CommandParameter) -> Self {
        self.parameter = Some(parameter);
        self
    }

    /// The declared target source, for method commands.
    pub fn target_source(&self) -> Option<&BindingSource> {
        match &self.descriptor {
            CommandDescriptor::Direct(_) => None,
            CommandDescriptor::Method { target, .. } => Some(target),
        }
    }

    /// Resolve the descriptor once.
    ///
    /// `target_root` is the resolved target source (method commands only);
    /// `parameter_cell` backs a [`CommandParameter::Property`] parameter.
    pub fn bind(&self, target_root: Option<&Value>, parameter_cell: Option<PropertyCell>) -> CoreResult<BoundCommand> {
        let body = match &self.descriptor {
            CommandDescriptor::Direct(callable) => Body::Direct(callable.clone()),
            CommandDescriptor::Method { path, method, .. } => {
                let root = target_root.ok_or(CoreError::CommandTargetMissing)?;
                let target = path.value(root).map_err(|_| CoreError::CommandTargetMissing)?;
                let Value::Object(object) = target else {
                    tracing::debug!(target: targets::BINDING, %path, "command target is not an object");
                    return Err(CoreError::CommandTargetMissing);
                };
                let resolved = object.method(method).ok_or_else(|| {
                    tracing::debug!(target: targets::BINDING, method = %method, "command method not found");
                    CoreError::MethodNotFound { name: method.clone() }
                })?;
                Body::Method(resolved)
            }
        };
        let parameter = match &self.parameter {
            None => BoundParameter::None,
            Some(CommandParameter::Value(v)) => BoundParameter::Value(v.clone()),
            Some(CommandParameter::Property(_)) => match parameter_cell {
                Some(cell) => BoundParameter::Cell(cell),
                None => BoundParameter::None,
            },
        };
        Ok(BoundCommand { body, parameter })
    }

    pub(crate) fn deep_copy(&self, cm: &mut CopyManager) -> Self {
        let descriptor = match &self.descriptor {
            CommandDescriptor::Direct(f) => CommandDescriptor::Direct(f.clone()),
            CommandDescriptor::Method { target, path, method } => CommandDescriptor::Method {
                target: target.deep_copy(cm),
                path: path.clone(),
                method: method.clone(),
            },
        };
        let parameter = self.parameter.as_ref().map(|p| match p {
            CommandParameter::Value(v) => CommandParameter::Value(cm.copy_value(v)),
            CommandParameter::Property(name) => CommandParameter::Property(name.clone()),
        });
        Self { descriptor, parameter }
    }
}

enum Body {
    Direct(Callable),
    Method(Method),
}

enum BoundParameter {
    None,
    Value(Value),
    Cell(PropertyCell),
}

/// A command whose target has been resolved.
pub struct BoundCommand {
    body: Body,
    parameter: BoundParameter,
}

impl BoundCommand {
    /// Run the command.
    ///
    /// `parameter` overrides the declared parameter. Parameterless methods
    /// ignore it.
    pub fn execute(&self, parameter: Option<Value>) {
        let parameter = parameter.or_else(|| match &self.parameter {
            BoundParameter::None => None,
            BoundParameter::Value(v) => Some(v.clone()),
            BoundParameter::Cell(cell) => Some(cell.get()),
        });
        tracing::trace!(target: targets::BINDING, has_parameter = parameter.is_some(), "executing command");
        match &self.body {
            Body::Direct(f) => f(parameter),
            Body::Method(m) => m.invoke(parameter),
        }
    }
}

impl fmt::Debug for BoundCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = match &self.body {
            Body::Direct(_) => "direct",
            Body::Method(_) => "method",
        };
        f.debug_struct("BoundCommand").field("body", &body).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindable::ObservableObject;
    use parking_lot::Mutex;

    fn player(log: Arc<Mutex<Vec<String>>>) -> Value {
        let l1 = log.clone();
        let l2 = log;
        let obj = ObservableObject::new("Player")
            .with_method("Stop", Method::no_arg(move || l1.lock().push("stop".into())))
            .with_method(
                "Seek",
                Method::with_arg(move |v| l2.lock().push(format!("seek {v:?}"))),
            );
        Value::Object(obj.into_ref())
    }

    #[test]
    fn test_method_resolved_at_bind_time() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let root = player(log.clone());

        let stop = CommandDecl::method(BindingSource::DataContext, PropertyPath::default(), "Stop");
        let bound = stop.bind(Some(&root), None).unwrap();
        bound.execute(Some(Value::from(3)));

        let seek = CommandDecl::method(BindingSource::DataContext, PropertyPath::default(), "Seek")
            .with_parameter(CommandParameter::Value(Value::from(30)));
        let bound = seek.bind(Some(&root), None).unwrap();
        bound.execute(None);
        bound.execute(Some(Value::from(60)));

        assert_eq!(*log.lock(), vec!["stop", "seek Int(30)", "seek Int(60)"]);
    }

    #[test]
    fn test_bind_errors() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let root = player(log);
        let missing = CommandDecl::method(BindingSource::DataContext, PropertyPath::default(), "Eject");
        assert_eq!(
            missing.bind(Some(&root), None).unwrap_err(),
            CoreError::MethodNotFound { name: "Eject".into() }
        );
        assert_eq!(missing.bind(None, None).unwrap_err(), CoreError::CommandTargetMissing);
        assert_eq!(
            missing.bind(Some(&Value::from(1)), None).unwrap_err(),
            CoreError::CommandTargetMissing
        );
    }

    #[test]
    fn test_parameter_cell_read_at_execution() {
        let seen = Arc::new(Mutex::new(None));
        let s = seen.clone();
        let decl = CommandDecl::direct(move |p| *s.lock() = p)
            .with_parameter(CommandParameter::Property("SelectedItem".into()));
        let cell = PropertyCell::new("first");
        let bound = decl.bind(None, Some(cell.clone())).unwrap();

        cell.set("second");
        bound.execute(None);
        assert_eq!(*seen.lock(), Some(Value::from("second")));
    }
}
