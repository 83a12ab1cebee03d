//! Property-based tests for rendering invariants

use liquido::{render_document, ErrorKind, RenderOutcome};
use proptest::prelude::*;
use serde_json::Value;

// ============================================================================
// Strategies
// ============================================================================

/// Arbitrary JSON documents, a few levels deep
fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        (-1.0e6f64..1.0e6).prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,8}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::vec(("[a-z]{1,6}", inner), 0..6)
                .prop_map(|entries| Value::Object(entries.into_iter().collect())),
        ]
    })
}

/// Text with no `{{` or `{%` in it
fn arb_literal_text() -> impl Strategy<Value = String> {
    "([^{]|\\{[^{%]){0,64}"
}

/// Short sources built from template punctuation, mostly malformed
fn arb_template_noise() -> impl Strategy<Value = String> {
    "[{}%|a-z \\-\"'.:,()\\[\\]=<>0-9]{0,40}"
}

const TEMPLATES: &[&str] = &[
    "{{ model }}",
    "{{ model | size }}",
    "{% for x in model %}{{ x }},{% endfor %}",
    "{% for kv in model %}{{ kv.name }}={{ kv.value }};{% endfor %}",
    "{% if model %}{{ model.a.b[0] | default: \"-\" }}{% else %}nil{% endif %}",
    "{{ model | join: \"/\" | upcase }}",
];

fn success(outcome: RenderOutcome) -> String {
    match outcome {
        RenderOutcome::Success { output } => output,
        failure => panic!("render failed: {failure:?}"),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn literal_text_renders_verbatim(text in arb_literal_text()) {
        prop_assert_eq!(success(render_document("null", &text)), text);
    }

    #[test]
    fn rendering_is_deterministic(doc in arb_json(), index in 0..TEMPLATES.len()) {
        let document = doc.to_string();
        let first = render_document(&document, TEMPLATES[index]);
        let second = render_document(&document, TEMPLATES[index]);
        prop_assert!(first.is_success(), "{:?}", first);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn join_matches_std_join(items in prop::collection::vec(any::<i64>(), 0..12)) {
        let document = serde_json::to_string(&items).unwrap();
        let expected = items.iter().map(i64::to_string).collect::<Vec<_>>().join(", ");
        let output = success(render_document(&document, "{{ model | join: \", \" }}"));
        prop_assert_eq!(output, expected);
    }

    #[test]
    fn for_loop_concatenates_elements(items in prop::collection::vec("[a-z]{0,5}", 0..12)) {
        let document = serde_json::to_string(&items).unwrap();
        let output = success(render_document(&document, "{% for x in model %}{{ x }}{% endfor %}"));
        prop_assert_eq!(output, items.concat());
    }

    #[test]
    fn malformed_templates_fail_cleanly(source in arb_template_noise()) {
        let outcome = render_document(r#"{"a":[1,2],"b":{"c":"d"}}"#, &source);
        if let RenderOutcome::Failure { kind, message, .. } = outcome {
            prop_assert_ne!(kind, ErrorKind::InternalError, "{}", message);
        }
    }
}
