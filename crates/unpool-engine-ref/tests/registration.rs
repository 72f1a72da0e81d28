use unpool::engine::registry;
use unpool_engine_ref::register_reference_engine;

#[test]
fn reference_engine_is_reachable_by_name() {
    register_reference_engine();
    assert!(registry::has_engine("reference"));
    let engine = registry::create_engine("reference").expect("reference engine registered");
    assert_eq!(engine.engine_name(), "reference");
    assert!(registry::list_engines().contains(&"reference".to_string()));
}
