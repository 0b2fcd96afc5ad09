//! Tests for focus navigation and render registration on a live screen.

use std::sync::Arc;

use skin_engine::prelude::*;
use skin_engine::render::{BatchKey, ParamValue};
use skin_engine::{HAS_FOCUS, TreeFormatOptions};

fn tile(left: f64, top: f64, name: &str) -> Shared<Element> {
    shared(
        Element::new(ElementKind::Button)
            .named(name)
            .at(left, top, 0.0, 0.0),
    )
}

fn screen(config: EngineConfig) -> (VisualTree, NodeId) {
    let panel = shared(Element::new(ElementKind::Panel).at(0.0, 0.0, 1280.0, 720.0));
    Element::add_child(&panel, tile(0.0, 0.0, "Home"));
    Element::add_child(&panel, tile(0.0, 100.0, "Below"));
    Element::add_child(&panel, tile(100.0, 0.0, "Right"));

    let mut tree = VisualTree::with_config(config);
    let root = tree.insert_root(&panel).unwrap();
    tree.set_root(root).unwrap();
    (tree, root)
}

#[test]
fn test_directional_focus_on_point_elements() {
    let config = EngineConfig::default();
    let (tree, root) = screen(config.clone());
    let home = tree.find_node(root, "Home").unwrap();
    let below = tree.find_node(root, "Below").unwrap();
    let right = tree.find_node(root, "Right").unwrap();

    let mut nav = FocusNavigator::from_config(&config);
    assert!(nav.is_strict());
    assert!(nav.set_focus(&tree, home));

    assert_eq!(nav.predict_focus(&tree, root, Some(home), FocusDirection::Down), Some(below));
    assert_eq!(nav.predict_focus(&tree, root, Some(home), FocusDirection::Right), Some(right));

    assert!(!nav.move_focus(&tree, root, FocusDirection::Up));
    assert_eq!(nav.focused(), Some(home));
    assert_eq!(tree.property(home, HAS_FOCUS).unwrap(), Value::Bool(true));

    assert!(nav.move_focus(&tree, root, FocusDirection::Right));
    assert_eq!(nav.focused(), Some(right));
    assert!(nav.move_focus(&tree, root, FocusDirection::Left));
    assert_eq!(nav.focused(), Some(home));
}

#[test]
fn test_focus_survives_destroyed_node() {
    let (mut tree, root) = screen(EngineConfig::default());
    let home = tree.find_node(root, "Home").unwrap();
    let below = tree.find_node(root, "Below").unwrap();

    let mut nav = FocusNavigator::new(true);
    assert!(nav.set_focus(&tree, home));
    tree.destroy(home).unwrap();

    // The stale focus is replaced without touching the destroyed node.
    assert!(nav.set_focus(&tree, below));
    assert_eq!(nav.focused(), Some(below));
    assert_eq!(nav.predict_focus(&tree, root, Some(home), FocusDirection::Down), Some(below));
}

#[test]
fn test_empty_screen_has_no_candidate() {
    let mut tree = VisualTree::new();
    let root = tree
        .insert_root(&shared(Element::new(ElementKind::Panel)))
        .unwrap();
    let mut nav = FocusNavigator::new(true);
    assert_eq!(nav.predict_focus(&tree, root, None, FocusDirection::Down), None);
    assert!(!nav.move_focus(&tree, root, FocusDirection::Down));
    assert!(!nav.focus_next(&tree, root));
}

#[derive(Default)]
struct RecordingDevice {
    draws: Vec<(BatchKey, usize)>,
}

impl RenderDevice for RecordingDevice {
    fn draw(&mut self, key: &BatchKey, geometry: &[GeometryHandle]) -> bool {
        self.draws.push((key.clone(), geometry.len()));
        true
    }
}

#[test]
fn test_visible_nodes_feed_the_batch_compiler() {
    let pipeline = Arc::new(BatchCompiler::new());
    let (mut tree, root) = {
        let panel = shared(Element::new(ElementKind::Panel));
        Element::add_child(&panel, tile(0.0, 0.0, "Home"));
        Element::add_child(&panel, tile(0.0, 100.0, "Below"));
        let mut tree = VisualTree::new().with_pipeline(pipeline.clone());
        let root = tree.insert_root(&panel).unwrap();
        (tree, root)
    };
    let home = tree.find_node(root, "Home").unwrap();
    let below = tree.find_node(root, "Below").unwrap();

    let text = EffectId(1);
    let glow = RenderPrimitive::new(GeometryHandle(10), EffectId(2))
        .with_parameter("Radius", ParamValue::Float(4.0));
    tree.set_primitives(home, vec![RenderPrimitive::new(GeometryHandle(1), text), glow.clone()])
        .unwrap();
    tree.set_primitives(below, vec![RenderPrimitive::new(GeometryHandle(2), text)])
        .unwrap();
    assert_eq!(pipeline.pending_count(), 3);

    let mut device = RecordingDevice::default();
    let stats = pipeline.render(&mut device).unwrap();
    assert_eq!(stats.batches_drawn, 2);
    assert_eq!(device.draws[0].1, 2);
    assert_eq!(device.draws[1], (glow.batch_key(), 1));

    tree.set_visible(below, false).unwrap();
    assert_eq!(pipeline.primitive_count(), 2);

    tree.destroy(home).unwrap();
    assert_eq!(pipeline.primitive_count(), 0);
    let stats = pipeline.render(&mut RecordingDevice::default()).unwrap();
    assert_eq!(stats.primitives_drawn, 0);
    assert_eq!(pipeline.batch_count(), 0);
}

#[test]
fn test_debug_dump_of_screen() {
    let (tree, root) = screen(EngineConfig::default());
    let dump = TreeDebug::new(&tree)
        .with_options(TreeFormatOptions::minimal())
        .subtree(root)
        .to_string();
    assert_eq!(dump, "(unnamed)\n├── Home\n├── Below\n└── Right\n");
}
