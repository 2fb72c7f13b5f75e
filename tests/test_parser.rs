use vinja::{context, Environment, ErrorKind};

use similar_asserts::assert_eq;

fn parse_error(source: &str) -> vinja::Error {
    let env = Environment::new();
    env.template_from_str(source).unwrap_err()
}

#[test]
fn test_unclosed_variable_block() {
    let err = parse_error("{{ foo");
    assert_eq!(err.kind(), ErrorKind::ParseError);
}

#[test]
fn test_missing_end_tag() {
    let err = parse_error("{% if x %}body");
    assert_eq!(err.kind(), ErrorKind::ParseError);
}

#[test]
fn test_unknown_tag() {
    let err = parse_error("{% frobnicate %}");
    assert_eq!(err.kind(), ErrorKind::ParseError);
    assert!(err.to_string().contains("frobnicate"));
}

#[test]
fn test_unexpected_token() {
    let err = parse_error("{{ 1 + }}");
    assert_eq!(err.kind(), ErrorKind::ParseError);
}

#[test]
fn test_error_line_numbers() {
    let err = parse_error("line1\nline2\n{% bogus %}");
    assert_eq!(err.line(), Some(3));
}

#[test]
fn test_unterminated_string() {
    let err = parse_error("{{ 'abc }}");
    assert_eq!(err.kind(), ErrorKind::LexError);
}

#[test]
fn test_unterminated_comment() {
    let err = parse_error("{# never closed");
    assert_eq!(err.kind(), ErrorKind::LexError);
}

#[test]
fn test_unterminated_raw() {
    let err = parse_error("{% raw %}forever");
    assert_eq!(err.kind(), ErrorKind::LexError);
}

#[test]
fn test_reserved_assignment_names() {
    let err = parse_error("{% set true = 1 %}");
    assert_eq!(err.kind(), ErrorKind::ParseError);
    let err = parse_error("{% for loop in items %}{% endfor %}");
    assert_eq!(err.kind(), ErrorKind::ParseError);
}

#[test]
fn test_loop_controls_outside_loop() {
    let err = parse_error("{% break %}");
    assert_eq!(err.kind(), ErrorKind::ParseError);
    let err = parse_error("{% continue %}");
    assert_eq!(err.kind(), ErrorKind::ParseError);
}

#[test]
fn test_duplicate_block() {
    let err = parse_error("{% block a %}{% endblock %}{% block a %}{% endblock %}");
    assert_eq!(err.kind(), ErrorKind::ParseError);
}

#[test]
fn test_block_in_macro() {
    let err = parse_error("{% macro m() %}{% block b %}{% endblock %}{% endmacro %}");
    assert_eq!(err.kind(), ErrorKind::ParseError);
}

#[test]
fn test_keyword_after_positional() {
    let err = parse_error("{{ f(a=1, 2) }}");
    assert_eq!(err.kind(), ErrorKind::ParseError);
}

#[test]
fn test_string_literals() {
    let env = Environment::new();
    assert_eq!(
        env.render_str(r#"{{ "a" "b" 'c' }}"#, context!()).unwrap(),
        "abc"
    );
    assert_eq!(
        env.render_str(r#"{{ "tab\tnewline\n" }}"#, context!()).unwrap(),
        "tab\tnewline\n"
    );
    assert_eq!(
        env.render_str(r#"{{ "\x41☃" }}"#, context!()).unwrap(),
        "A\u{2603}"
    );
}

#[test]
fn test_number_literals() {
    let env = Environment::new();
    assert_eq!(env.render_str("{{ 1_000 }}", context!()).unwrap(), "1000");
    assert_eq!(env.render_str("{{ 1e3 }}", context!()).unwrap(), "1000.0");
    assert_eq!(env.render_str("{{ 2.5e2 }}", context!()).unwrap(), "250.0");
}

#[test]
fn test_tuple_literals() {
    let env = Environment::new();
    assert_eq!(
        env.render_str("{{ (1, 2)[0] }} {{ () }}", context!()).unwrap(),
        "1 []"
    );
}

#[test]
fn test_operator_precedence() {
    let env = Environment::new();
    assert_eq!(env.render_str("{{ 2 + 3 * 4 }}", context!()).unwrap(), "14");
    assert_eq!(env.render_str("{{ (2 + 3) * 4 }}", context!()).unwrap(), "20");
    assert_eq!(env.render_str("{{ 2 ** 3 ** 2 }}", context!()).unwrap(), "512");
    assert_eq!(env.render_str("{{ -2 ** 2 }}", context!()).unwrap(), "-4");
    assert_eq!(
        env.render_str("{{ 'a' ~ 1 + 1 ~ 'b' }}", context!()).unwrap(),
        "a2b"
    );
    assert_eq!(
        env.render_str("{{ not true and false }}", context!()).unwrap(),
        "false"
    );
}

#[test]
fn test_keywords_as_attributes() {
    let env = Environment::new();
    // keywords are fine after a dot
    let rv = env
        .render_str(
            "{{ obj.items }}",
            context!(obj => serde_json::json!({"items": 3})),
        )
        .unwrap();
    assert_eq!(rv, "3");
}
