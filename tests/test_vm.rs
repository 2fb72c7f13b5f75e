use vinja::{context, Environment, ErrorKind};

use similar_asserts::assert_eq;

fn render(source: &str, ctx: vinja::value::Value) -> String {
    let env = Environment::new();
    env.render_str(source, ctx).unwrap()
}

#[test]
fn test_simple_variable() {
    let rv = render("Hello {{ name }}!", context!(name => "World"));
    insta::assert_snapshot!(rv, @"Hello World!");
}

#[test]
fn test_empty_template() {
    assert_eq!(render("", context!()), "");
}

#[test]
fn test_for_loop() {
    let rv = render(
        "{% for i in items %}{{ i }}{% endfor %}",
        context!(items => vec![1, 2, 3]),
    );
    assert_eq!(rv, "123");
}

#[test]
fn test_if_elif_else() {
    let tmpl = "{% if x == 1 %}one{% elif x == 2 %}two{% else %}other{% endif %}";
    assert_eq!(render(tmpl, context!(x => 1)), "one");
    assert_eq!(render(tmpl, context!(x => 2)), "two");
    assert_eq!(render(tmpl, context!(x => 42)), "other");
}

#[test]
fn test_filter_chain() {
    let rv = render("{{ '  Hello World  '|trim|lower|length }}", context!());
    assert_eq!(rv, "11");
}

#[test]
fn test_loop_first_last() {
    let rv = render(
        "{% for i in items %}{% if loop.first %}F{% endif %}{% if loop.last %}L{% endif %}{% endfor %}",
        context!(items => vec!["a", "b"]),
    );
    assert_eq!(rv, "FL");
}

#[test]
fn test_loop_variables() {
    let rv = render(
        "{% for i in items %}{{ loop.index }}:{{ loop.index0 }}:{{ loop.revindex }}:{{ loop.revindex0 }}:{{ loop.length }};{% endfor %}",
        context!(items => vec!["a", "b", "c"]),
    );
    assert_eq!(rv, "1:0:3:2:3;2:1:2:1:3;3:2:1:0:3;");
}

#[test]
fn test_loop_adjacent_items() {
    let rv = render(
        "{% for i in items %}[{{ loop.previtem }}|{{ i }}|{{ loop.nextitem }}]{% endfor %}",
        context!(items => vec![1, 2, 3]),
    );
    assert_eq!(rv, "[|1|2][1|2|3][2|3|]");
}

#[test]
fn test_loop_cycle() {
    let rv = render(
        "{% for i in items %}{{ loop.cycle('a', 'b') }}{% endfor %}",
        context!(items => vec![1, 2, 3]),
    );
    assert_eq!(rv, "aba");
}

#[test]
fn test_loop_changed() {
    let rv = render(
        "{% for i in items %}{% if loop.changed(i) %}{{ i }}{% endif %}{% endfor %}",
        context!(items => vec![1, 1, 2, 2, 3]),
    );
    assert_eq!(rv, "123");
}

#[test]
fn test_break() {
    let rv = render(
        "{% for i in items %}{{ i }}{% if i == 'b' %}{% break %}{% endif %}{% endfor %}",
        context!(items => vec!["a", "b", "c"]),
    );
    assert_eq!(rv, "ab");
}

#[test]
fn test_continue() {
    let rv = render(
        "{% for i in items %}{% if i == 2 %}{% continue %}{% endif %}{{ i }}{% endfor %}",
        context!(items => vec![1, 2, 3]),
    );
    assert_eq!(rv, "13");
}

#[test]
fn test_for_else() {
    let rv = render(
        "{% for i in items %}{{ i }}{% else %}empty{% endfor %}",
        context!(items => Vec::<i32>::new()),
    );
    assert_eq!(rv, "empty");
}

#[test]
fn test_for_filter() {
    let rv = render(
        "{% for i in items if i % 2 == 0 %}{{ i }}{% endfor %}",
        context!(items => vec![1, 2, 3, 4, 5]),
    );
    assert_eq!(rv, "24");
}

#[test]
fn test_for_unpacking() {
    let rv = render(
        "{% for a, b in items %}{{ a }}={{ b }};{% endfor %}",
        context!(items => vec![(1, "one"), (2, "two")]),
    );
    assert_eq!(rv, "1=one;2=two;");
}

#[test]
fn test_recursive_loop() {
    let rv = render(
        "{% for item in tree recursive %}{{ item.name }}{% if item.children %}({{ loop(item.children) }}){% endif %}{% endfor %}",
        context!(tree => serde_json::json!([
            {"name": "a", "children": [{"name": "b", "children": []}]},
            {"name": "c", "children": []},
        ])),
    );
    assert_eq!(rv, "a(b)c");
}

#[test]
fn test_attribute_access() {
    let rv = render(
        "{{ user.name }}",
        context!(user => serde_json::json!({"name": "Alice"})),
    );
    assert_eq!(rv, "Alice");
}

#[test]
fn test_subscript() {
    let rv = render(
        "{{ items[1] }} {{ items[-1] }} {{ map['key'] }}",
        context!(items => vec![10, 20, 30], map => serde_json::json!({"key": "value"})),
    );
    assert_eq!(rv, "20 30 value");
}

#[test]
fn test_slicing() {
    let rv = render(
        "{{ items[1:3] }}",
        context!(items => vec![10, 20, 30, 40]),
    );
    assert_eq!(rv, "[20, 30]");
    let rv = render("{{ items[::2] }}", context!(items => vec![1, 2, 3, 4, 5]));
    assert_eq!(rv, "[1, 3, 5]");
    let rv = render("{{ 'abcdef'[2:] }}", context!());
    assert_eq!(rv, "cdef");
}

#[test]
fn test_chained_comparison() {
    for (a, b, c) in [(1, 2, 3), (2, 2, 3), (3, 2, 1), (1, 3, 2)] {
        let chained = render(
            "{{ a < b < c }}",
            context!(a => a, b => b, c => c),
        );
        let expanded = render(
            "{{ (a < b) and (b < c) }}",
            context!(a => a, b => b, c => c),
        );
        assert_eq!(chained, expanded, "mismatch for {a} {b} {c}");
    }
}

#[test]
fn test_longer_comparison_chains() {
    let rv = render("{{ 1 < 2 < 3 }} {{ 3 > 2 > 1 }} {{ 1 < 2 > 3 }}", context!());
    assert_eq!(rv, "true true false");
    let rv = render("{{ 1 <= a <= 3 }}", context!(a => 3));
    assert_eq!(rv, "true");
    let rv = render("{{ a == b == c }}", context!(a => 1, b => 1, c => 2));
    assert_eq!(rv, "false");
}

#[test]
fn test_math() {
    assert_eq!(render("{{ 1 + 2 * 3 }}", context!()), "7");
    assert_eq!(render("{{ 7 // 2 }}", context!()), "3");
    assert_eq!(render("{{ 7 % 2 }}", context!()), "1");
    assert_eq!(render("{{ 2 ** 8 }}", context!()), "256");
    assert_eq!(render("{{ 1 / 2 }}", context!()), "0.5");
    assert_eq!(render("{{ -x }}", context!(x => 42)), "-42");
}

#[test]
fn test_zero_division() {
    let env = Environment::new();
    let err = env.render_str("{{ x / 0 }}", context!(x => 1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ZeroDivisionError);
    let err = env.render_str("{{ x // 0 }}", context!(x => 1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ZeroDivisionError);
    // float division follows IEEE 754
    assert_eq!(render("{{ x / 0.0 }}", context!(x => 1.0)), "inf");
}

#[test]
fn test_string_concat() {
    assert_eq!(render("{{ 'a' ~ 1 ~ 'b' }}", context!()), "a1b");
}

#[test]
fn test_logic_ops() {
    assert_eq!(render("{{ true and false }}", context!()), "false");
    assert_eq!(render("{{ false or true }}", context!()), "true");
    assert_eq!(render("{{ not true }}", context!()), "false");
    // and/or return the deciding operand
    assert_eq!(render("{{ 42 or 23 }}", context!()), "42");
    assert_eq!(render("{{ 0 or 23 }}", context!()), "23");
}

#[test]
fn test_truthiness_roundtrip() {
    for (source, expected) in [
        ("{{ not 0 }}", "true"),
        ("{{ not 1 }}", "false"),
        ("{{ not '' }}", "true"),
        ("{{ not 'x' }}", "false"),
        ("{{ not [] }}", "true"),
        ("{{ not [1] }}", "false"),
        ("{{ not none }}", "true"),
        ("{{ not {} }}", "true"),
    ] {
        assert_eq!(render(source, context!()), expected, "{source}");
    }
}

#[test]
fn test_in_operator() {
    assert_eq!(render("{{ 'x' in 'xyz' }}", context!()), "true");
    assert_eq!(render("{{ 2 in [1, 2] }}", context!()), "true");
    assert_eq!(render("{{ 3 not in [1, 2] }}", context!()), "true");
    assert_eq!(
        render("{{ 'a' in {'a': 1} }}", context!()),
        "true"
    );
}

#[test]
fn test_ternary() {
    assert_eq!(render("{{ 'a' if x else 'b' }}", context!(x => true)), "a");
    assert_eq!(render("{{ 'a' if x else 'b' }}", context!(x => false)), "b");
}

#[test]
fn test_with_block() {
    let rv = render("{% with a = 1, b = 2 %}{{ a }}{{ b }}{% endwith %}{{ a }}", context!());
    assert_eq!(rv, "12");
}

#[test]
fn test_set() {
    assert_eq!(render("{% set x = 23 %}{{ x }}", context!()), "23");
}

#[test]
fn test_set_block() {
    let rv = render(
        "{% set x %}hello {{ name }}{% endset %}[{{ x }}]",
        context!(name => "peter"),
    );
    assert_eq!(rv, "[hello peter]");
    let rv = render("{% set x | upper %}abc{% endset %}{{ x }}", context!());
    assert_eq!(rv, "ABC");
}

#[test]
fn test_namespace_set() {
    let rv = render(
        "{% set ns = namespace(found=false) %}{% for i in items %}{% if i == 2 %}{% set ns.found = true %}{% endif %}{% endfor %}{{ ns.found }}",
        context!(items => vec![1, 2, 3]),
    );
    assert_eq!(rv, "true");
}

#[test]
fn test_do() {
    // do evaluates for the side effect and emits nothing
    let rv = render("{% do range(1) %}ok", context!());
    assert_eq!(rv, "ok");
}

#[test]
fn test_determinism() {
    let env = Environment::new();
    let source = "{% for i in items %}{{ i * 2 }},{% endfor %}{{ d }}";
    let ctx = context!(items => vec![3, 1, 2], d => serde_json::json!({"b": 1, "a": 2}));
    let first = env.render_str(source, ctx.clone()).unwrap();
    let second = env.render_str(source, ctx).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_dict_iteration_order() {
    // insertion order is preserved for dicts
    let rv = render(
        "{% set d = {'z': 1, 'a': 2, 'm': 3} %}{% for key in d %}{{ key }}{{ d[key] }}{% endfor %}",
        context!(),
    );
    assert_eq!(rv, "z1a2m3");
}

#[test]
fn test_recursion_limit() {
    let mut env = Environment::new();
    env.add_template("t", "{% macro m() %}{{ m() }}{% endmacro %}{{ m() }}")
        .unwrap();
    let err = env.get_template("t").unwrap().render(context!()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RecursionLimit);
}

#[test]
fn test_error_location() {
    let env = Environment::new();
    let err = env
        .render_named_str("hello.txt", "line one\n{{ 1 / 0 }}", context!())
        .unwrap_err();
    assert_eq!(err.name(), Some("hello.txt"));
    assert_eq!(err.line(), Some(2));
}

#[test]
fn test_unknown_function() {
    let env = Environment::new();
    let err = env.render_str("{{ does_not_exist() }}", context!()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NameError);
}

#[test]
fn test_debug_tag() {
    let env = Environment::new();
    let rv = env
        .render_str("{% debug %}", context!(my_marker_variable => 1))
        .unwrap();
    assert!(rv.contains("my_marker_variable"));
}
