use std::cell::Cell;

use resgraph_api::{Catalog, Instance, InstanceKey, ResourceGraph};
use resgraph_query::parse;

fn names(results: &[&Instance]) -> Vec<String> {
    results.iter().map(|i| i.name().to_string()).collect()
}

fn catalog() -> Catalog {
    let mut catalog = Catalog::new();

    let mut app = Instance::new("ApplicationComponent", "app");
    app.set_attribute("activity/status", "active");
    app.add_relation("uses", InstanceKey::new("Database", "orders"));
    catalog.add_instance(app);

    let mut legacy = Instance::new("ApplicationComponent", "legacy");
    legacy.set_attribute("activity/status", "abandoned");
    legacy.add_relation("uses", InstanceKey::new("Database", "archive"));
    catalog.add_instance(legacy);

    let mut orders = Instance::new("Database", "orders");
    orders.set_attribute("activity/status", "active");
    catalog.add_instance(orders);

    let mut archive = Instance::new("Database", "archive");
    archive.set_attribute("activity/status", "abandoned");
    catalog.add_instance(archive);

    catalog
}

#[test]
fn subquery_target_by_name() {
    let catalog = catalog();

    let query = parse(r#"-> $(name == "orders")"#).unwrap();
    assert_eq!(names(&query.filter(&catalog)), vec!["app"]);

    // No instance named X: the sub-query set is empty, nothing matches.
    let query = parse(r#"-> $(name == "X")"#).unwrap();
    assert!(query.filter(&catalog).is_empty());
}

#[test]
fn subquery_with_kind_filter_and_expression() {
    let catalog = catalog();

    let query = parse(r#"-> $(Database: 'activity/status' == "abandoned")"#).unwrap();
    assert_eq!(names(&query.filter(&catalog)), vec!["legacy"]);
}

#[test]
fn nested_subqueries_resolve_innermost_first() {
    let mut catalog = catalog();
    let mut gateway = Instance::new("Gateway", "edge");
    gateway.add_relation("routesTo", InstanceKey::new("ApplicationComponent", "app"));
    catalog.add_instance(gateway);

    // Instances pointing at something that itself points at an active
    // database.
    let query = parse(r#"-> $(-> $('activity/status' == "active" AND kind == "Database"))"#)
        .unwrap();
    assert_eq!(names(&query.filter(&catalog)), vec!["edge"]);
}

#[test]
fn subquery_under_not_and_transitive() {
    let catalog = catalog();

    let query = parse(r#"ApplicationComponent: NOT -> $(name == "archive")"#).unwrap();
    assert_eq!(names(&query.filter(&catalog)), vec!["app"]);

    let query = parse(r#"~> $(Database: name =~ /arch/)"#).unwrap();
    assert_eq!(names(&query.filter(&catalog)), vec!["legacy"]);
}

/// Counts full-store scans handed out, so tests can observe how often the
/// evaluator materializes sub-query result sets.
struct CountingGraph {
    inner: Catalog,
    scans: Cell<usize>,
}

impl ResourceGraph for CountingGraph {
    fn instances_of(&self, kind: &str) -> &[Instance] {
        self.inner.instances_of(kind)
    }

    fn instances(&self) -> Box<dyn Iterator<Item = &Instance> + '_> {
        self.scans.set(self.scans.get() + 1);
        self.inner.instances()
    }

    fn get(&self, key: &InstanceKey) -> Option<&Instance> {
        self.inner.get(key)
    }

    fn is_list_attribute(&self, kind: &str, attribute: &str) -> bool {
        self.inner.is_list_attribute(kind, attribute)
    }
}

#[test]
fn subquery_is_materialized_once_per_call() {
    let graph = CountingGraph {
        inner: catalog(),
        scans: Cell::new(0),
    };

    // One scan to materialize the sub-query, one for the outer filter.
    // Without the pre-pass the sub-query would re-run per candidate.
    let query = parse(r#"-> $(name =~ "orders")"#).unwrap();
    let results = query.filter(&graph);
    assert_eq!(names(&results), vec!["app"]);
    assert_eq!(graph.scans.get(), 2);

    // A fresh call gets a fresh cache.
    query.filter(&graph);
    assert_eq!(graph.scans.get(), 4);
}

#[test]
fn incoming_subquery_target() {
    let catalog = catalog();

    // Databases pointed at by an active component.
    let query =
        parse(r#"Database: <- $('activity/status' == "active" AND kind == "ApplicationComponent")"#)
            .unwrap();
    assert_eq!(names(&query.filter(&catalog)), vec!["orders"]);
}

#[test]
fn or_with_failing_right_side_still_matches() {
    let catalog = catalog();

    // The left side already decides the match; the empty-set sub-query on
    // the right must not flip it.
    let query = parse(r#"name == "app" OR -> $(name == "no-such-instance")"#).unwrap();
    assert_eq!(names(&query.filter(&catalog)), vec!["app"]);
}
