use std::thread;

use vinja::value::Value;
use vinja::{context, Environment, UndefinedPolicy};

use similar_asserts::assert_eq;

#[test]
fn test_globals() {
    let mut env = Environment::new();
    env.add_global("version", 42);
    assert_eq!(env.render_str("{{ version }}", context!()).unwrap(), "42");
    // context variables shadow globals
    assert_eq!(
        env.render_str("{{ version }}", context!(version => 1)).unwrap(),
        "1"
    );
}

#[test]
fn test_custom_function() {
    let mut env = Environment::new();
    env.add_function("add", |_state: &vinja::State, args: &[Value]| {
        let (a, b): (i64, i64) = vinja::value::from_args(args)?;
        Ok(Value::from(a + b))
    });
    assert_eq!(env.render_str("{{ add(1, 2) }}", context!()).unwrap(), "3");
}

#[test]
fn test_expression_evaluation() {
    let env = Environment::new();
    let expr = env.compile_expression("number < 42").unwrap();
    assert!(expr.eval(context!(number => 23)).unwrap().is_true());
    assert!(!expr.eval(context!(number => 99)).unwrap().is_true());

    let expr = env.compile_expression("items|length * 2").unwrap();
    assert_eq!(
        expr.eval(context!(items => vec![1, 2])).unwrap(),
        Value::from(4)
    );
}

#[test]
fn test_overlay_shares_registries() {
    let mut env = Environment::new();
    env.add_global("who", "parent");
    let overlay = env.overlay();
    assert_eq!(
        overlay.render_str("{{ who }}", context!()).unwrap(),
        "parent"
    );
}

#[test]
fn test_overlay_owns_policies() {
    let mut env = Environment::new();
    env.add_template("t", "[{{ missing }}]").unwrap();
    let mut overlay = env.overlay();
    overlay.set_undefined_policy(UndefinedPolicy::Strict);

    // the parent stays lenient, the overlay is strict
    assert_eq!(
        env.get_template("t").unwrap().render(context!()).unwrap(),
        "[]"
    );
    assert!(overlay.get_template("t").unwrap().render(context!()).is_err());
}

#[test]
fn test_overlay_owns_cache() {
    let mut env = Environment::new();
    env.set_loader(vinja::loader::DictLoader::new([("t", "x")]));
    env.get_template("t").unwrap();
    let overlay = env.overlay();
    assert_eq!(overlay.cache_stats().size, 0);
    assert_eq!(env.cache_stats().size, 1);
}

#[test]
fn test_shared_environment_across_threads() {
    let mut env = Environment::new();
    env.add_template("hello", "Hello {{ name }}!").unwrap();
    let env = env.into_shared();

    let mut handles = Vec::new();
    for idx in 0..4 {
        let env = env.clone();
        handles.push(thread::spawn(move || {
            let tmpl = env.get_template("hello").unwrap();
            tmpl.render(context!(name => idx)).unwrap()
        }));
    }
    let mut results: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    results.sort();
    assert_eq!(
        results,
        vec!["Hello 0!", "Hello 1!", "Hello 2!", "Hello 3!"]
    );
}

#[test]
fn test_shared_environment_with_loader() {
    let mut env = Environment::new();
    env.set_loader(vinja::loader::DictLoader::new([(
        "t",
        "{% for i in range(3) %}{{ i }}{% endfor %}",
    )]));
    let env = env.into_shared();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let env = env.clone();
        handles.push(thread::spawn(move || {
            env.get_template("t").unwrap().render(context!()).unwrap()
        }));
    }
    for handle in handles {
        assert_eq!(handle.join().unwrap(), "012");
    }
}

#[test]
fn test_empty_environment() {
    let env = Environment::empty();
    // no builtins registered
    assert!(env.render_str("{{ 'x'|upper }}", context!()).is_err());
    assert!(env.render_str("{{ range(3) }}", context!()).is_err());
    // plain interpolation still works
    assert_eq!(env.render_str("{{ v }}", context!(v => 1)).unwrap(), "1");
}

#[test]
fn test_render_named_str_error_name() {
    let env = Environment::new();
    let err = env
        .render_named_str("broken.txt", "{{", context!())
        .unwrap_err();
    assert_eq!(err.name(), Some("broken.txt"));
}
