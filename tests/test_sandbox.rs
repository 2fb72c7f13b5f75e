use std::sync::Arc;

use vinja::sandbox::{DefaultSandbox, ImmutableSandbox, SecurityPolicy};
use vinja::value::Value;
use vinja::{context, Environment, ErrorKind};

use similar_asserts::assert_eq;

#[test]
fn test_underscore_attributes_blocked() {
    let mut env = Environment::new();
    env.set_security_policy(Arc::new(DefaultSandbox));
    let ctx = context!(obj => serde_json::json!({"_secret": 1, "public": 2}));
    let err = env.render_str("{{ obj._secret }}", ctx.clone()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SecurityError);
    assert_eq!(env.render_str("{{ obj.public }}", ctx).unwrap(), "2");
}

#[test]
fn test_range_guard() {
    let mut env = Environment::new();
    env.set_max_range(100);
    let err = env.render_str("{{ range(101) }}", context!()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SecurityError);
    assert_eq!(
        env.render_str("{{ range(3)|length }}", context!()).unwrap(),
        "3"
    );
}

#[test]
fn test_default_range_guard() {
    let env = Environment::new();
    // the default guard refuses runaway ranges before allocating
    let err = env
        .render_str("{{ range(10000000000) }}", context!())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SecurityError);
}

#[test]
fn test_unsafe_callable_blocked() {
    struct NoCalls;
    impl SecurityPolicy for NoCalls {
        fn is_safe_callable(&self, _callable: &Value) -> bool {
            false
        }
    }

    let mut env = Environment::new();
    env.set_security_policy(Arc::new(NoCalls));
    let err = env.render_str("{{ range(3) }}", context!()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SecurityError);
}

#[test]
fn test_immutable_sandbox_blocks_mutating_methods() {
    let mut env = Environment::new();
    env.set_security_policy(Arc::new(ImmutableSandbox));
    let err = env
        .render_str("{% do items.append(4) %}", context!(items => vec![1, 2, 3]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SecurityError);
}

#[test]
fn test_policy_sees_attribute_names() {
    struct DenyList(&'static str);
    impl SecurityPolicy for DenyList {
        fn is_safe_attribute(&self, _obj: &Value, name: &str) -> bool {
            name != self.0
        }
    }

    let mut env = Environment::new();
    env.set_security_policy(Arc::new(DenyList("password")));
    let ctx = context!(user => serde_json::json!({"name": "a", "password": "b"}));
    assert_eq!(env.render_str("{{ user.name }}", ctx.clone()).unwrap(), "a");
    let err = env.render_str("{{ user.password }}", ctx).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SecurityError);
}

#[test]
fn test_no_policy_allows_everything() {
    let env = Environment::new();
    let ctx = context!(obj => serde_json::json!({"_secret": 1}));
    assert_eq!(env.render_str("{{ obj._secret }}", ctx).unwrap(), "1");
}
