use vinja::{context, Environment, State};

use similar_asserts::assert_eq;

fn test_passes(expr: &str, ctx: vinja::value::Value) -> bool {
    let env = Environment::new();
    env.render_str(&format!("{{% if {expr} %}}true{{% else %}}false{{% endif %}}"), ctx)
        .unwrap()
        == "true"
}

#[test]
fn test_numbers() {
    assert!(test_passes("1 is odd", context!()));
    assert!(test_passes("2 is even", context!()));
    assert!(test_passes("9 is divisibleby 3", context!()));
    assert!(test_passes("42 is number", context!()));
    assert!(test_passes("42 is integer", context!()));
    assert!(test_passes("42.0 is float", context!()));
    assert!(!test_passes("'42' is number", context!()));
}

#[test]
fn test_definedness() {
    assert!(test_passes("missing is undefined", context!()));
    assert!(test_passes("v is defined", context!(v => 1)));
    assert!(test_passes("none is none", context!()));
    assert!(!test_passes("0 is none", context!()));
}

#[test]
fn test_kinds() {
    assert!(test_passes("'x' is string", context!()));
    assert!(test_passes("true is boolean", context!()));
    assert!(test_passes("true is true", context!()));
    assert!(test_passes("false is false", context!()));
    assert!(test_passes("{'a': 1} is mapping", context!()));
    assert!(test_passes("[1] is sequence", context!()));
    assert!(test_passes("[1] is iterable", context!()));
    assert!(test_passes("'x' is iterable", context!()));
    assert!(test_passes("range is callable", context!()));
}

#[test]
fn test_safety() {
    assert!(test_passes("v is safe", context!(v => vinja::value::Value::from_safe_string("x".into()))));
    assert!(!test_passes("'x' is safe", context!()));
    assert!(test_passes("('<'|escape) is escaped", context!()));
}

#[test]
fn test_string_tests() {
    assert!(test_passes("'foobar' is startingwith 'foo'", context!()));
    assert!(test_passes("'foobar' is endingwith('bar')", context!()));
    assert!(test_passes("'abc' is lower", context!()));
    assert!(test_passes("'ABC' is upper", context!()));
}

#[test]
fn test_operator_tests() {
    assert!(test_passes("1 is eq 1", context!()));
    assert!(test_passes("1 is equalto 1", context!()));
    assert!(test_passes("1 is ne 2", context!()));
    assert!(test_passes("1 is lt 2", context!()));
    assert!(test_passes("1 is lessthan 2", context!()));
    assert!(test_passes("2 is le 2", context!()));
    assert!(test_passes("3 is gt 2", context!()));
    assert!(test_passes("3 is greaterthan 2", context!()));
    assert!(test_passes("3 is ge 3", context!()));
    assert!(test_passes("2 is in [1, 2]", context!()));
}

#[test]
fn test_negation() {
    assert!(test_passes("1 is not even", context!()));
    assert!(test_passes("'x' is not none", context!()));
}

#[test]
fn test_sameas() {
    let env = Environment::new();
    // an aliased list is the same object, a rebuilt one is not
    let rv = env
        .render_str(
            "{% set a = [1, 2] %}{% set b = a %}{% set c = a|list %}{{ a is sameas b }} {{ a is sameas c }}",
            context!(),
        )
        .unwrap();
    assert_eq!(rv, "true false");
    assert!(test_passes("true is sameas true", context!()));
}

#[test]
fn test_custom_test() {
    let mut env = Environment::new();
    fn is_prime(_state: &State, value: i64) -> Result<bool, vinja::Error> {
        Ok(value > 1 && (2..value).all(|x| value % x != 0))
    }
    env.add_test("prime", is_prime);
    assert_eq!(
        env.render_str("{{ 7 is prime }} {{ 8 is prime }}", context!())
            .unwrap(),
        "true false"
    );
}
