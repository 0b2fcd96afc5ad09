//! End-to-end tests: templates, bindings, commands and worker-thread updates.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use skin_engine::prelude::*;
use skin_engine::{CoreError, DATA_CONTEXT, HAS_FOCUS};
use tracing_subscriber::EnvFilter;

/// Route engine logs to the test output. Set `RUST_LOG` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn episode(title: &str) -> ObjectRef {
    ObservableObject::new("Episode")
        .with_property("Title", title)
        .into_ref()
}

fn list_item_template() -> Arc<Template> {
    let item = Element::new(ElementKind::ListItem)
        .named("Item")
        .with_binding(BindingDecl::new("Text", PropertyPath::parse("Title").unwrap()));
    Template::new(item)
        .keyed("EpisodeItem")
        .for_data_type("Episode")
        .into_shared()
}

fn live_list(tree: &mut VisualTree) -> NodeId {
    let resources = shared(ResourceDictionary::new().with("EpisodeItem", list_item_template()));
    let list = shared(Element::new(ElementKind::ItemsControl).with_resources(resources));
    let root = tree.insert_root(&list).unwrap();
    tree.set_root(root).unwrap();
    root
}

#[test]
fn test_template_instances_follow_their_own_models() {
    init_tracing();
    let mut tree = VisualTree::new();
    let list = live_list(&mut tree);
    let template = list_item_template();
    let loader = TemplateLoader::new();

    let first_model = episode("Episode 1");
    let second_model = episode("Pilot");
    let first = loader
        .instantiate(&mut tree, &template, list, Some(Value::Object(first_model.clone())))
        .unwrap();
    let second = loader
        .instantiate(&mut tree, &template, list, Some(Value::Object(second_model)))
        .unwrap();

    assert_eq!(tree.property(first, "Text").unwrap(), Value::from("Episode 1"));
    assert_eq!(tree.property(second, "Text").unwrap(), Value::from("Pilot"));

    // Updates arrive from a worker and are applied on the owner thread.
    let dispatcher = UiDispatcher::new();
    let handle = dispatcher.handle();
    let model = first_model.clone();
    thread::spawn(move || {
        handle
            .post(move || {
                model.property("Title").unwrap().set("Episode 2");
            })
            .unwrap();
    })
    .join()
    .unwrap();

    assert_eq!(tree.property(first, "Text").unwrap(), Value::from("Episode 1"));
    assert_eq!(dispatcher.process_pending(), 1);
    assert_eq!(tree.property(first, "Text").unwrap(), Value::from("Episode 2"));
    assert_eq!(tree.property(second, "Text").unwrap(), Value::from("Pilot"));
}

#[test]
fn test_items_population_and_repopulation() {
    init_tracing();
    let mut tree = VisualTree::new();
    let list = live_list(&mut tree);
    let models: Vec<Value> = (1..=4)
        .map(|n| Value::Object(episode(&format!("Episode {n}"))))
        .collect();
    let loader = TemplateLoader::new();

    let items = loader.populate_items(&mut tree, list, &models, None).unwrap();
    assert_eq!(items.len(), 4);
    for (n, item) in items.iter().enumerate() {
        assert_eq!(
            tree.property(*item, "Text").unwrap(),
            Value::from(format!("Episode {}", n + 1))
        );
        assert_eq!(tree.templated_parent(*item).unwrap(), Some(list));
        assert_eq!(tree.find_node(*item, "Item"), Some(*item));
    }

    let old_title = models[0].as_object().unwrap().property("Title").unwrap();
    assert_eq!(old_title.subscriber_count(), 1);

    let fresh = loader.populate_items(&mut tree, list, &models[2..], None).unwrap();
    assert_eq!(fresh.len(), 2);
    assert_eq!(tree.len(), 3);
    // The destroyed instance no longer listens to its model.
    assert_eq!(old_title.subscriber_count(), 0);
}

#[test]
fn test_parked_template_binds_when_attached() {
    let mut tree = VisualTree::new();
    let live = live_list(&mut tree);
    let parking = tree
        .insert_root(&shared(Element::new(ElementKind::Panel)))
        .unwrap();

    let item = TemplateLoader::new()
        .instantiate(
            &mut tree,
            &list_item_template(),
            parking,
            Some(Value::Object(episode("Parked"))),
        )
        .unwrap();
    assert!(!tree.is_activated(item));
    assert!(!tree.attach_to_live_root(item).unwrap());

    tree.set_parent(item, Some(live)).unwrap();
    assert!(tree.is_activated(item));
    assert_eq!(tree.property(item, "Text").unwrap(), Value::from("Parked"));
}

#[test]
fn test_command_reaches_data_context_method() {
    let played = Arc::new(AtomicUsize::new(0));
    let counter = played.clone();
    let player = ObservableObject::new("Player")
        .with_method(
            "Play",
            Method::no_arg(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .into_ref();

    let panel = shared(Element::new(ElementKind::Panel).with_property(DATA_CONTEXT, player));
    let button = Element::new(ElementKind::Button).named("PlayButton").with_command(
        "Click",
        CommandDecl::method(BindingSource::DataContext, PropertyPath::default(), "Play"),
    );
    Element::add_child(&panel, shared(button));

    let mut tree = VisualTree::new();
    let root = tree.insert_root(&panel).unwrap();
    let button = tree.find_node(root, "PlayButton").unwrap();

    assert!(matches!(
        tree.execute_command(button, "Click"),
        Err(SkinError::CommandNotFound { .. })
    ));
    tree.set_root(root).unwrap();
    tree.execute_command(button, "Click").unwrap();
    tree.execute_command_with(button, "Click", Some(Value::from(3))).unwrap();
    assert_eq!(played.load(Ordering::SeqCst), 2);
}

#[test]
fn test_unknown_command_method_fails_activation() {
    let model = ObservableObject::new("Player").into_ref();
    let button = shared(
        Element::new(ElementKind::Button)
            .with_property(DATA_CONTEXT, model)
            .with_command(
                "Click",
                CommandDecl::method(BindingSource::DataContext, PropertyPath::default(), "Missing"),
            ),
    );
    let mut tree = VisualTree::new();
    let root = tree.insert_root(&button).unwrap();
    assert!(matches!(
        tree.set_root(root),
        Err(SkinError::Core(CoreError::MethodNotFound { .. }))
    ));
    assert_eq!(tree.live_root(), None);
    assert!(!tree.is_activated(root));
}

#[test]
fn test_focus_trigger_updates_named_target() {
    let panel = shared(Element::new(ElementKind::Panel));
    let hint = Element::new(ElementKind::Label)
        .named("Hint")
        .with_property("Text", "");
    let button = shared(Element::new(ElementKind::Button).at(0.0, 0.0, 100.0, 40.0));
    Element::add_trigger(
        &button,
        Trigger::new(HAS_FOCUS, true)
            .on_enter(TriggerAction::Set {
                target: Some("Hint".into()),
                property: "Text".into(),
                value: Value::from("Press OK to play"),
            })
            .on_exit(TriggerAction::Set {
                target: Some("Hint".into()),
                property: "Text".into(),
                value: Value::from(""),
            }),
    );
    Element::add_child(&panel, shared(hint));
    Element::add_child(&panel, button);

    let mut tree = VisualTree::new();
    let root = tree.insert_root(&panel).unwrap();
    tree.set_root(root).unwrap();
    let hint = tree.find_node(root, "Hint").unwrap();
    let button = tree.children(root).unwrap()[1];

    let mut focus = FocusNavigator::new(true);
    assert!(focus.set_focus(&tree, button));
    assert_eq!(tree.property(hint, "Text").unwrap(), Value::from("Press OK to play"));
    focus.clear_focus(&tree);
    assert_eq!(tree.property(hint, "Text").unwrap(), Value::from(""));
}

#[test]
fn test_resources_resolve_through_enclosing_scopes() {
    let outer = shared(ResourceDictionary::new().with("Accent", "#ff8800").with("Font", "Sans"));
    let inner = shared(ResourceDictionary::new().with("Font", "Serif"));

    let screen = shared(Element::new(ElementKind::Panel).with_resources(outer));
    let group = shared(Element::new(ElementKind::Panel).with_resources(inner));
    Element::add_child(&group, shared(Element::new(ElementKind::Label).named("Caption")));
    Element::add_child(&screen, group);

    let mut tree = VisualTree::new();
    let root = tree.insert_root(&screen).unwrap();
    let caption = tree.find_node(root, "Caption");
    assert!(caption.is_none(), "names in a nested scope stay private to it");

    let group = tree.children(root).unwrap()[0];
    let caption = tree.find_node(group, "Caption").unwrap();
    assert_eq!(tree.find_resource(caption, "Font"), Some(Value::from("Serif")));
    assert_eq!(tree.find_resource(caption, "Accent"), Some(Value::from("#ff8800")));
    assert_eq!(tree.find_resource(caption, "Missing"), None);
}

#[test]
fn test_include_expands_from_skin_source() {
    let fragment = shared(Element::new(ElementKind::Panel).named("Header"));
    Element::add_child(
        &fragment,
        shared(Element::new(ElementKind::Label).named("Clock").with_property("Text", "12:00")),
    );
    let source: Arc<dyn SkinSource> = Arc::new(MemorySkinSource::new().with("header.xml", fragment));

    let screen = shared(Element::new(ElementKind::Panel));
    Element::add_child(
        &screen,
        shared(Element::new(ElementKind::Include {
            source: "header.xml".into(),
        })),
    );

    let mut tree = VisualTree::new().with_skin_source(source);
    let root = tree.insert_root(&screen).unwrap();
    let include = tree.children(root).unwrap()[0];
    let header = tree.children(include).unwrap()[0];
    let clock = tree.find_node(header, "Clock").unwrap();
    assert_eq!(tree.property(clock, "Text").unwrap(), Value::from("12:00"));
    assert_eq!(tree.len(), 4);

    let missing = shared(Element::new(ElementKind::Include {
        source: "footer.xml".into(),
    }));
    assert!(matches!(
        tree.mount(&missing, root),
        Err(SkinError::Core(CoreError::SourceNotFound { .. }))
    ));
    assert_eq!(tree.len(), 4);
}
