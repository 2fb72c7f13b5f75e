use vinja::{context, Environment, ErrorKind, UndefinedPolicy};

use similar_asserts::assert_eq;

fn env_with(policy: UndefinedPolicy) -> Environment {
    let mut env = Environment::new();
    env.set_undefined_policy(policy);
    env
}

#[test]
fn test_lenient_prints_empty() {
    let env = env_with(UndefinedPolicy::Lenient);
    assert_eq!(env.render_str("[{{ missing }}]", context!()).unwrap(), "[]");
}

#[test]
fn test_lenient_swallows_attributes() {
    let env = env_with(UndefinedPolicy::Lenient);
    assert_eq!(
        env.render_str("[{{ missing.attr }}]", context!()).unwrap(),
        "[]"
    );
}

#[test]
fn test_lenient_iterates_empty() {
    let env = env_with(UndefinedPolicy::Lenient);
    assert_eq!(
        env.render_str("{% for x in missing %}x{% endfor %}ok", context!())
            .unwrap(),
        "ok"
    );
}

#[test]
fn test_strict_errors_on_print() {
    let env = env_with(UndefinedPolicy::Strict);
    let err = env.render_str("{{ missing }}", context!()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UndefinedError);
    assert!(err.to_string().contains("missing"));
}

#[test]
fn test_strict_errors_on_attribute() {
    let env = env_with(UndefinedPolicy::Strict);
    let err = env.render_str("{{ missing.attr }}", context!()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UndefinedError);
}

#[test]
fn test_strict_errors_on_condition() {
    let env = env_with(UndefinedPolicy::Strict);
    let err = env
        .render_str("{% if missing %}x{% endif %}", context!())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UndefinedError);
}

#[test]
fn test_strict_errors_on_iteration() {
    let env = env_with(UndefinedPolicy::Strict);
    let err = env
        .render_str("{% for x in missing %}x{% endfor %}", context!())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UndefinedError);
}

#[test]
fn test_strict_allows_defined_test() {
    let env = env_with(UndefinedPolicy::Strict);
    assert_eq!(
        env.render_str("{{ missing is defined }}", context!()).unwrap(),
        "false"
    );
    assert_eq!(
        env.render_str("{{ missing|default('x') }}", context!())
            .unwrap(),
        "x"
    );
}

#[test]
fn test_chainable_chains() {
    let env = env_with(UndefinedPolicy::Chainable);
    assert_eq!(
        env.render_str("[{{ missing.a.b.c }}]", context!()).unwrap(),
        "[]"
    );
    assert_eq!(
        env.render_str("[{{ missing['a'][0] }}]", context!()).unwrap(),
        "[]"
    );
}

#[test]
fn test_debug_prints_sentinel() {
    let env = env_with(UndefinedPolicy::Debug);
    let rv = env.render_str("{{ missing }}", context!()).unwrap();
    assert_eq!(rv, "<undefined value: missing>");
    // the chain is preserved in the sentinel
    let rv = env.render_str("{{ missing.attr }}", context!()).unwrap();
    assert_eq!(rv, "<undefined value: missing.attr>");
}

#[test]
fn test_undefined_truthiness() {
    let env = env_with(UndefinedPolicy::Lenient);
    assert_eq!(
        env.render_str("{{ not missing }}", context!()).unwrap(),
        "true"
    );
}

#[test]
fn test_undefined_in_container_check() {
    let env = env_with(UndefinedPolicy::Lenient);
    assert_eq!(
        env.render_str("{{ 1 in missing }}", context!()).unwrap(),
        "false"
    );
}
