//! End-to-end rendering tests

use liquido::{
    parse_document, render_document, render_document_with, ErrorKind, RenderOptions,
    RenderOutcome, Template, TemplateError,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn render(document: &str, template: &str) -> String {
    match render_document(document, template) {
        RenderOutcome::Success { output } => output,
        failure => panic!("render failed: {failure:?}"),
    }
}

fn failure_kind(document: &str, template: &str) -> ErrorKind {
    match render_document(document, template) {
        RenderOutcome::Failure { kind, .. } => kind,
        success => panic!("expected failure, got {success:?}"),
    }
}

#[test]
fn test_hello() {
    assert_eq!(render(r#"{"name":"Ann"}"#, "Hello, {{ name }}!"), "Hello, Ann!");
}

#[test]
fn test_join_over_array_root() {
    assert_eq!(render("[1,2,3]", r#"{{ model | join: ", " }}"#), "1, 2, 3");
}

#[test]
fn test_for_over_array_and_empty_array() {
    let template = "{% for x in model %}{{ x }}{% endfor %}";
    assert_eq!(render(r#"["a","b","c"]"#, template), "abc");
    assert_eq!(render("[]", template), "");
}

#[test]
fn test_default_filter() {
    assert_eq!(render("{}", r#"{{ "x" | default: "y" }}"#), "x");
    assert_eq!(render("{}", r#"{{ nothing | default: "y" }}"#), "y");
}

#[test]
fn test_object_iteration_in_insertion_order() {
    assert_eq!(
        render(
            r#"{"obj":{"a":1,"b":2}}"#,
            "{% for kv in obj %}{{ kv.name }}={{ kv.value }}{% endfor %}"
        ),
        "a=1b=2"
    );
    assert_eq!(
        render(
            r#"{"z":1,"a":2}"#,
            "{% for kv in model %}{{ kv.name }}{% endfor %}"
        ),
        "za"
    );
}

#[test]
fn test_unknown_filter_has_no_partial_output() {
    let outcome = render_document(r#"{"x":1}"#, "before {{ x | bogus }} after");
    assert_eq!(
        outcome,
        RenderOutcome::Failure {
            kind: ErrorKind::UnknownFilter,
            message: "Unknown filter `bogus` at line 1, column 15".into(),
            position: Some((1, 15)),
        }
    );
}

#[test]
fn test_unknown_filter_fails_even_when_never_applied() {
    assert_eq!(
        failure_kind("{}", "{% if false %}{{ x | bogus }}{% endif %}ok"),
        ErrorKind::UnknownFilter
    );
    assert_eq!(
        failure_kind("{}", "{% for x in model %}{{ x | bogus }}{% endfor %}"),
        ErrorKind::UnknownFilter
    );
    assert_eq!(
        failure_kind(r#"{"a":true}"#, "{{ a or x | bogus }}"),
        ErrorKind::UnknownFilter
    );
    let err = Template::parse("{% unless true %}{{ 1 | nope }}{% endunless %}").unwrap_err();
    assert!(matches!(err, TemplateError::UnknownFilter { ref name, .. } if name == "nope"));
}

#[test]
fn test_unterminated_tag_reports_tag_start() {
    let outcome = render_document("{}", "<p>{{ name </p>");
    assert_eq!(
        outcome,
        RenderOutcome::Failure {
            kind: ErrorKind::SyntaxError,
            message: "Syntax error: unterminated tag `{{` starting at line 1, column 4".into(),
            position: Some((1, 4)),
        }
    );
    let outcome = render_document("{}", "{{ name }");
    assert!(matches!(
        outcome,
        RenderOutcome::Failure { kind: ErrorKind::SyntaxError, position: Some((1, 1)), .. }
    ));
}

/// Runs `f` on a thread with a 1 MiB stack, the wasm default
fn on_small_stack<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
    std::thread::Builder::new()
        .stack_size(1 << 20)
        .spawn(f)
        .unwrap()
        .join()
        .unwrap()
}

#[test]
fn test_thousands_of_when_arms() {
    let template = "{% case x %}".to_string() + &"{% when i %}w".repeat(5_000) + "{% endcase %}";
    let outcome = on_small_stack(move || render_document(r#"{"x":-1}"#, &template));
    assert_eq!(outcome.output(), Some(""));
}

#[test]
fn test_thousands_of_elsif_arms() {
    let arms: String = (1..20_000).map(|i| format!("{{% elsif x == {i} %}}{i}")).collect();
    let template = format!("{{% if x == 0 %}}zero{arms}{{% else %}}none{{% endif %}}");
    let outcome = on_small_stack(move || render_document(r#"{"x":19999}"#, &template));
    assert_eq!(outcome.output(), Some("19999"));
}

#[test]
fn test_deep_lookup_is_a_syntax_error() {
    let depth = 200_000;
    let template = format!("{{{{ {}x{} }}}}", "a[".repeat(depth), "]".repeat(depth));
    let outcome = render_document("{}", &template);
    assert!(matches!(
        outcome,
        RenderOutcome::Failure { kind: ErrorKind::SyntaxError, ref message, .. }
            if message.contains("nesting")
    ));
}

#[test]
fn test_loop_variable_named_forloop() {
    assert_eq!(
        render("[1,2]", "{% for forloop in model %}{{ forloop }}{% endfor %}"),
        "12"
    );
}

#[test]
fn test_large_integers_compare_exactly() {
    let document = r#"{"a":9007199254740993,"b":9007199254740992}"#;
    assert_eq!(render(document, "{% if a == b %}same{% else %}different{% endif %}"), "different");
}

#[test]
fn test_unclosed_for() {
    let err = Template::parse("{% if true %}ok{% endif %}\n  {% for x in y %}{{ x }}").unwrap_err();
    match err {
        TemplateError::Syntax(liquido::SyntaxError::UnclosedBlock { tag, position }) => {
            assert_eq!(tag, "for");
            assert_eq!((position.line, position.column), (2, 3));
        }
        other => panic!("expected unclosed block, got {other:?}"),
    }
}

#[test]
fn test_whitespace_control_trims_adjacent_runs_only() {
    assert_eq!(render("{}", "  \n {%- if true -%} \n X \n {%- endif -%} \n  "), "X");
    assert_eq!(render("{}", "a \n{%- if true %} X {% endif -%}\n b"), "a X b");
    assert_eq!(render("{}", "a\n\n{%- if true %}X{% endif %}\n"), "aX\n");
    assert_eq!(render(r#"{"v":1}"#, "[ {{- v -}} ]"), "[1]");
}

#[test]
fn test_syntax_error_kinds() {
    assert_eq!(failure_kind("{}", "{{ x"), ErrorKind::SyntaxError);
    assert_eq!(failure_kind("{}", "{% if x %}{% endfor %}"), ErrorKind::SyntaxError);
    assert_eq!(failure_kind("{}", "{% frobnicate %}"), ErrorKind::SyntaxError);
    assert_eq!(failure_kind("{}", "{% endif %}"), ErrorKind::SyntaxError);
}

#[test]
fn test_invalid_document_kinds() {
    assert_eq!(failure_kind("", "x"), ErrorKind::InvalidDocument);
    assert_eq!(failure_kind("{'a': 1}", "x"), ErrorKind::InvalidDocument);
    assert_eq!(failure_kind("[1, 2,]", "x"), ErrorKind::InvalidDocument);
}

#[test]
fn test_missing_data_degrades_to_nil() {
    let document = r#"{"user":{"name":"Ann"},"list":[1]}"#;
    assert_eq!(render(document, "[{{ user.email }}][{{ list[5] }}][{{ user.name.first }}]"), "[][][]");
    assert_eq!(render(document, "{% if user.email %}yes{% else %}no{% endif %}"), "no");
}

#[test]
fn test_model_collision() {
    assert_eq!(
        render(r#"{"model":"inner","x":1}"#, "{{ model.model }}/{{ model.x }}"),
        "inner/1"
    );
}

#[test]
fn test_scalar_roots() {
    assert_eq!(render("42", "{{ model | plus: 1 }}"), "43");
    assert_eq!(render(r#""txt""#, "{{ model | upcase }}"), "TXT");
    assert_eq!(render("null", "[{{ model }}]"), "[]");
}

#[test]
fn test_case_unless_capture_raw_comment() {
    let document = r#"{"status":"paid","items":[]}"#;
    let template = r#"{% case status %}{% when "open", "draft" %}O{% when "paid" %}P{% else %}?{% endcase %}
{%- unless items.size > 0 %} empty{% endunless %}
{%- capture tag %}[{{ status | upcase }}]{% endcapture %} {{ tag }}
{%- comment %} {{ ignored }} {% endcomment %}
{% raw %}{{ kept }}{% endraw %}"#;
    assert_eq!(render(document, template), "P empty [PAID]\n{{ kept }}");
}

#[test]
fn test_iteration_limit_across_nested_loops() {
    // outer iterations count too: 3 + 3 * 3
    let options = RenderOptions::default().with_max_iterations(12);
    let template = "{% for a in model %}{% for b in model %}.{% endfor %}{% endfor %}";
    let ok = render_document_with("[1,2,3]", template, &options);
    assert_eq!(ok.output(), Some("........."));

    let outcome = render_document_with("[1,2,3,4]", template, &options);
    match outcome {
        RenderOutcome::Failure { kind, position, .. } => {
            assert_eq!(kind, ErrorKind::IterationLimitExceeded);
            assert_eq!(position, Some((1, 21)));
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn test_nesting_limit() {
    let options = RenderOptions::default().with_max_nesting_depth(3);
    let deep = "{% if true %}".repeat(4) + &"{% endif %}".repeat(4);
    let outcome = render_document_with("{}", &deep, &options);
    assert!(matches!(
        outcome,
        RenderOutcome::Failure { kind: ErrorKind::SyntaxError, .. }
    ));

    let shallow = "{% if true %}".repeat(3) + "ok" + &"{% endif %}".repeat(3);
    assert_eq!(render_document_with("{}", &shallow, &options).output(), Some("ok"));
}

#[test]
fn test_template_reuse_across_documents() {
    let template = Template::parse("{% for p in model %}{{ p.name }};{% endfor %}").unwrap();
    let first = parse_document(r#"[{"name":"a"},{"name":"b"}]"#).unwrap();
    let second = parse_document(r#"{"name":"c"}"#).unwrap();
    assert_eq!(template.render(&first).unwrap(), "a;b;");
    assert_eq!(template.render(&second).unwrap(), "name;");
    assert_eq!(template.render(&json!([])).unwrap(), "");
}

#[test]
fn test_outcome_json_shape() {
    let outcome = render_document("{", "x");
    let value = serde_json::to_value(&outcome).unwrap();
    assert_eq!(value["status"], "failure");
    assert_eq!(value["kind"], "InvalidDocument");
    assert!(value["message"].as_str().unwrap().starts_with("Invalid document at line 1"));
}

// Playground samples

#[test]
fn test_playground_csharp_from_array() {
    let document = r#"[
  { "type": "string", "name": "FirstName" },
  { "type": "int", "name": "Age" }
]"#;
    let template = "public class Person
{
{%- for prop in model %}
    public {{ prop.type }} {{ prop.name }} { get; set; }
{% endfor %}
}";
    let expected = "public class Person
{
    public string FirstName { get; set; }

    public int Age { get; set; }

}";
    assert_eq!(render(document, template), expected);
}

#[test]
fn test_playground_sql_inserts() {
    let document = r#"[
  { "table": "Users", "columns": ["Id", "Name"], "values": [1, "John Doe"] },
  { "table": "Users", "columns": ["Id", "Name"], "values": [2, "Jane Smith"] }
]"#;
    let template = "{% for row in model %}INSERT INTO {{ row.table }} ({{ row.columns | join: ', ' }})
VALUES ({{ row.values | join: ', ' }});
{% endfor %}";
    let expected = "INSERT INTO Users (Id, Name)
VALUES (1, John Doe);
INSERT INTO Users (Id, Name)
VALUES (2, Jane Smith);
";
    assert_eq!(render(document, template), expected);
}

#[test]
fn test_playground_csharp_class() {
    let document = r#"{
  "namespace": "MyApp.Models",
  "className": "Product",
  "properties": [
    { "name": "Id", "type": "int" },
    { "name": "Price", "type": "decimal" }
  ]
}"#;
    let template = "namespace {{ namespace }}
{
    public class {{ className }}
    {
{%- for prop in properties %}
        public {{ prop.type }} {{ prop.name }} { get; set; }{% endfor %}
    }
}";
    let expected = "namespace MyApp.Models
{
    public class Product
    {
        public int Id { get; set; }
        public decimal Price { get; set; }
    }
}";
    assert_eq!(render(document, template), expected);
}

#[test]
fn test_playground_html_table() {
    let document = r#"{
  "title": "User List",
  "users": [
    { "id": 1, "name": "John Doe" },
    { "id": 2, "name": "Jane <Admin>" }
  ]
}"#;
    let template = "<h1>{{ title }}</h1>
<ul>
{%- for user in users %}
  <li id=\"u{{ user.id }}\">{{ user.name | escape }}</li>
{%- endfor %}
</ul>";
    let expected = "<h1>User List</h1>
<ul>
  <li id=\"u1\">John Doe</li>
  <li id=\"u2\">Jane &lt;Admin&gt;</li>
</ul>";
    assert_eq!(render(document, template), expected);
}
