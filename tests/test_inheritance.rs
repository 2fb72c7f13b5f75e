use vinja::{context, Environment, ErrorKind};

use similar_asserts::assert_eq;

#[test]
fn test_extends_basic() {
    let mut env = Environment::new();
    env.add_template("base", "[{% block content %}base{% endblock %}]")
        .unwrap();
    env.add_template("child", "{% extends \"base\" %}{% block content %}child{% endblock %}")
        .unwrap();
    let rv = env.get_template("child").unwrap().render(context!()).unwrap();
    assert_eq!(rv, "[child]");
    // the base template still renders its own block
    let rv = env.get_template("base").unwrap().render(context!()).unwrap();
    assert_eq!(rv, "[base]");
}

#[test]
fn test_super() {
    let mut env = Environment::new();
    env.add_template("base", "{% block content %}base{% endblock %}")
        .unwrap();
    env.add_template(
        "child",
        "{% extends \"base\" %}{% block content %}({{ super() }})child{% endblock %}",
    )
    .unwrap();
    let rv = env.get_template("child").unwrap().render(context!()).unwrap();
    assert_eq!(rv, "(base)child");
}

#[test]
fn test_multi_level_inheritance() {
    let mut env = Environment::new();
    env.add_template("a", "{% block x %}A{% endblock %}").unwrap();
    env.add_template("b", "{% extends \"a\" %}{% block x %}B{{ super() }}{% endblock %}")
        .unwrap();
    env.add_template("c", "{% extends \"b\" %}{% block x %}C{{ super() }}{% endblock %}")
        .unwrap();
    let rv = env.get_template("c").unwrap().render(context!()).unwrap();
    assert_eq!(rv, "CBA");
}

#[test]
fn test_inherited_blocks_keep_context() {
    let mut env = Environment::new();
    env.add_template("base", "{% block greeting %}{% endblock %}")
        .unwrap();
    env.add_template(
        "child",
        "{% extends \"base\" %}{% block greeting %}Hello {{ name }}!{% endblock %}",
    )
    .unwrap();
    let rv = env
        .get_template("child")
        .unwrap()
        .render(context!(name => "World"))
        .unwrap();
    assert_eq!(rv, "Hello World!");
}

#[test]
fn test_inheritance_cycle() {
    let mut env = Environment::new();
    env.add_template("a", "{% extends \"b\" %}").unwrap();
    env.add_template("b", "{% extends \"a\" %}").unwrap();
    let err = env.get_template("a").unwrap().render(context!()).unwrap_err();
    assert!(err.to_string().contains("cycle"));
}

#[test]
fn test_include() {
    let mut env = Environment::new();
    env.add_template("header", "Hello {{ name }}!").unwrap();
    env.add_template("page", "<{% include \"header\" %}>").unwrap();
    let rv = env
        .get_template("page")
        .unwrap()
        .render(context!(name => "World"))
        .unwrap();
    assert_eq!(rv, "<Hello World!>");
}

#[test]
fn test_include_without_context() {
    let mut env = Environment::new();
    env.add_template("header", "[{{ name }}]").unwrap();
    env.add_template("page", "{% include \"header\" without context %}")
        .unwrap();
    let rv = env
        .get_template("page")
        .unwrap()
        .render(context!(name => "World"))
        .unwrap();
    assert_eq!(rv, "[]");
}

#[test]
fn test_include_ignore_missing() {
    let mut env = Environment::new();
    env.add_template("page", "a{% include \"missing\" ignore missing %}b")
        .unwrap();
    let rv = env.get_template("page").unwrap().render(context!()).unwrap();
    assert_eq!(rv, "ab");

    env.add_template("strict-page", "a{% include \"missing\" %}b")
        .unwrap();
    let err = env
        .get_template("strict-page")
        .unwrap()
        .render(context!())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TemplateNotFound);
}

#[test]
fn test_include_error_carries_template_stack() {
    let mut env = Environment::new();
    env.add_template("inner", "{{ 1 / 0 }}").unwrap();
    env.add_template("outer", "{% include \"inner\" %}").unwrap();
    let err = env.get_template("outer").unwrap().render(context!()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ZeroDivisionError);
    assert_eq!(err.name(), Some("inner"));
    assert!(err
        .template_stack()
        .iter()
        .any(|(name, _)| name == "outer"));
}

#[test]
fn test_macro_basic() {
    let env = Environment::new();
    let rv = env
        .render_str(
            "{% macro m(a, b=2) %}{{ a }}-{{ b }}{% endmacro %}{{ m(1) }} {{ m(1, 3) }} {{ m(1, b=4) }}",
            context!(),
        )
        .unwrap();
    assert_eq!(rv, "1-2 1-3 1-4");
}

#[test]
fn test_macro_closure() {
    let env = Environment::new();
    let rv = env
        .render_str(
            "{% set greeting = 'Hello' %}{% macro greet(name) %}{{ greeting }} {{ name }}{% endmacro %}{{ greet('World') }}",
            context!(),
        )
        .unwrap();
    assert_eq!(rv, "Hello World");
}

#[test]
fn test_macro_argument_errors() {
    let env = Environment::new();
    let err = env
        .render_str("{% macro m(a) %}{{ a }}{% endmacro %}{{ m(1, 2) }}", context!())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArgumentError);
    let err = env
        .render_str(
            "{% macro m(a) %}{{ a }}{% endmacro %}{{ m(nope=1) }}",
            context!(),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArgumentError);
}

#[test]
fn test_call_block() {
    let env = Environment::new();
    let rv = env
        .render_str(
            "{% macro dialog(title) %}<{{ title }}|{{ caller() }}>{% endmacro %}{% call dialog('hi') %}body {{ name }}{% endcall %}",
            context!(name => "x"),
        )
        .unwrap();
    assert_eq!(rv, "<hi|body x>");
}

#[test]
fn test_call_block_with_args() {
    let env = Environment::new();
    let rv = env
        .render_str(
            "{% macro each(items) %}{% for item in items %}{{ caller(item) }}{% endfor %}{% endmacro %}{% call(item) each([1, 2]) %}[{{ item }}]{% endcall %}",
            context!(),
        )
        .unwrap();
    assert_eq!(rv, "[1][2]");
}

#[test]
fn test_import() {
    let mut env = Environment::new();
    env.add_template("helpers", "{% macro shout(s) %}{{ s|upper }}!{% endmacro %}")
        .unwrap();
    env.add_template("page", "{% import \"helpers\" as h %}{{ h.shout('hey') }}")
        .unwrap();
    let rv = env.get_template("page").unwrap().render(context!()).unwrap();
    assert_eq!(rv, "HEY!");
}

#[test]
fn test_from_import() {
    let mut env = Environment::new();
    env.add_template("helpers", "{% macro shout(s) %}{{ s|upper }}{% endmacro %}{% set punct = '!' %}")
        .unwrap();
    env.add_template(
        "page",
        "{% from \"helpers\" import shout, punct as p %}{{ shout('hey') }}{{ p }}",
    )
    .unwrap();
    let rv = env.get_template("page").unwrap().render(context!()).unwrap();
    assert_eq!(rv, "HEY!");
}

#[test]
fn test_macro_in_for_loop() {
    let env = Environment::new();
    let rv = env
        .render_str(
            "{% macro item(x) %}<{{ x }}>{% endmacro %}{% for i in [1, 2] %}{{ item(i) }}{% endfor %}",
            context!(),
        )
        .unwrap();
    assert_eq!(rv, "<1><2>");
}
