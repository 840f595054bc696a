use resgraph_api::{Catalog, Instance};
use resgraph_query::{ErrorKind, parse};

#[test]
fn lex_errors_carry_kind_offset_and_source() {
    let err = parse("name == \"unterminated").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Lex);
    assert_eq!(err.offset, 8);
    assert_eq!(err.source, "name == \"unterminated");
}

#[test]
fn parse_errors_render_a_caret_pointer() {
    let err = parse("kind == ==").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Parse);
    let annotated = err.annotate();
    let mut lines = annotated.lines();
    assert_eq!(lines.next(), Some("kind == =="));
    assert_eq!(lines.next(), Some("        ^"));
}

#[test]
fn parsed_queries_are_reusable_and_shareable() {
    let mut catalog = Catalog::new();
    let mut node = Instance::new("Component", "shared");
    node.set_attribute("tier", "backend");
    catalog.add_instance(node);

    let query = parse(r#"tier == "backend""#).unwrap();

    // Same query value, many calls, including from other threads.
    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                assert_eq!(query.filter(&catalog).len(), 1);
            });
        }
    });
    assert_eq!(query.filter(&catalog).len(), 1);
}

#[test]
fn parsed_query_exposes_its_ast() {
    let query = parse("Component:").unwrap();
    assert_eq!(query.root().kind.as_deref(), Some("Component"));
    assert!(query.root().expression.is_none());
}

#[test]
fn queries_round_trip_through_serde() {
    let query = parse(r#"Component: -> $(name == "x") AND tier? "#).unwrap();
    let json = serde_json::to_string(query.root()).unwrap();
    let back: resgraph_query::ast::Query = serde_json::from_str(&json).unwrap();
    assert_eq!(&back, query.root());
}
