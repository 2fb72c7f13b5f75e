use vinja::syntax::SyntaxConfig;
use vinja::{context, Environment};

use similar_asserts::assert_eq;

#[test]
fn test_auto_escape_by_extension() {
    let mut env = Environment::new();
    env.add_template("t.html", "{{ v }}").unwrap();
    env.add_template("t.txt", "{{ v }}").unwrap();
    let ctx = context!(v => "<script>");
    assert_eq!(
        env.get_template("t.html").unwrap().render(ctx.clone()).unwrap(),
        "&lt;script&gt;"
    );
    assert_eq!(
        env.get_template("t.txt").unwrap().render(ctx).unwrap(),
        "<script>"
    );
}

#[test]
fn test_escaping_all_entities() {
    let mut env = Environment::new();
    env.add_template("t.html", "{{ v }}").unwrap();
    let rv = env
        .get_template("t.html")
        .unwrap()
        .render(context!(v => "<>&\"'"))
        .unwrap();
    assert_eq!(rv, "&lt;&gt;&amp;&quot;&#x27;");
}

#[test]
fn test_safe_filter() {
    let mut env = Environment::new();
    env.add_template("t.html", "{{ v|safe }}").unwrap();
    let rv = env
        .get_template("t.html")
        .unwrap()
        .render(context!(v => "<b>"))
        .unwrap();
    assert_eq!(rv, "<b>");
}

#[test]
fn test_concat_preserves_safety() {
    let mut env = Environment::new();
    env.add_template("a.html", "{{ '<b>' ~ name ~ '</b>' }}").unwrap();
    env.add_template("b.html", "{{ '<b>' ~ (name|safe) ~ '</b>' }}")
        .unwrap();
    let ctx = context!(name => "<x>");
    assert_eq!(
        env.get_template("a.html").unwrap().render(ctx.clone()).unwrap(),
        "&lt;b&gt;&lt;x&gt;&lt;/b&gt;"
    );
    assert_eq!(
        env.get_template("b.html").unwrap().render(ctx).unwrap(),
        "&lt;b&gt;<x>&lt;/b&gt;"
    );
}

#[test]
fn test_autoescape_tag() {
    let env = Environment::new();
    let rv = env
        .render_str(
            "{% autoescape true %}{{ v }}{% endautoescape %}|{{ v }}",
            context!(v => "<x>"),
        )
        .unwrap();
    assert_eq!(rv, "&lt;x&gt;|<x>");
}

#[test]
fn test_autoescape_off_in_html() {
    let mut env = Environment::new();
    env.add_template(
        "t.html",
        "{% autoescape false %}{{ v }}{% endautoescape %}|{{ v }}",
    )
    .unwrap();
    let rv = env
        .get_template("t.html")
        .unwrap()
        .render(context!(v => "<x>"))
        .unwrap();
    assert_eq!(rv, "<x>|&lt;x&gt;");
}

#[test]
fn test_whitespace_markers() {
    let env = Environment::new();
    let rv = env
        .render_str("x  {{- 1 }}  {{ 2 -}}  y", context!())
        .unwrap();
    assert_eq!(rv, "x1  2y");
    let rv = env
        .render_str("a\n  {%- if true %}b{% endif %}", context!())
        .unwrap();
    assert_eq!(rv, "ab");
}

#[test]
fn test_trim_blocks() {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    let rv = env
        .render_str("{% if true %}\nx\n{% endif %}\n", context!())
        .unwrap();
    assert_eq!(rv, "x\n");
}

#[test]
fn test_lstrip_blocks() {
    let mut env = Environment::new();
    env.set_lstrip_blocks(true);
    let rv = env
        .render_str("a\n    {% if true %}b{% endif %}", context!())
        .unwrap();
    assert_eq!(rv, "a\nb");
}

#[test]
fn test_keep_trailing_newline() {
    let env = Environment::new();
    assert_eq!(env.render_str("x\n", context!()).unwrap(), "x");

    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);
    assert_eq!(env.render_str("x\n", context!()).unwrap(), "x\n");
}

#[test]
fn test_newline_normalization() {
    let env = Environment::new();
    assert_eq!(env.render_str("a\r\nb", context!()).unwrap(), "a\nb");

    let mut env = Environment::new();
    env.set_newline_sequence("\r\n");
    assert_eq!(env.render_str("a\nb", context!()).unwrap(), "a\r\nb");
}

#[test]
fn test_raw_block() {
    let env = Environment::new();
    let rv = env
        .render_str("{% raw %}{{ not rendered }}{% endraw %}", context!())
        .unwrap();
    assert_eq!(rv, "{{ not rendered }}");
}

#[test]
fn test_comments() {
    let env = Environment::new();
    let rv = env.render_str("a{# comment #}b", context!()).unwrap();
    assert_eq!(rv, "ab");
}

#[test]
fn test_custom_delimiters() {
    let mut env = Environment::new();
    env.set_syntax(
        SyntaxConfig::builder()
            .block_delimiters("<%", "%>")
            .variable_delimiters("${", "}")
            .comment_delimiters("<#", "#>")
            .build()
            .unwrap(),
    );
    let rv = env
        .render_str(
            "<% for i in items %>${ i }<# nothing #><% endfor %>",
            context!(items => vec![1, 2]),
        )
        .unwrap();
    assert_eq!(rv, "12");
}

#[test]
fn test_line_statements() {
    let mut env = Environment::new();
    env.set_syntax(
        SyntaxConfig::builder()
            .line_statement_prefix("#")
            .line_comment_prefix("##")
            .build()
            .unwrap(),
    );
    let rv = env
        .render_str(
            "# for i in items\n{{ i }}\n# endfor\n## trailing comment\n",
            context!(items => vec![1, 2]),
        )
        .unwrap();
    assert_eq!(rv, "1\n2\n");
}

#[test]
fn test_finalize_callback() {
    let mut env = Environment::new();
    env.set_finalize(|_state, value| {
        if value.is_none() {
            vinja::value::Value::from("~")
        } else {
            value.clone()
        }
    });
    let rv = env.render_str("[{{ none }}]", context!()).unwrap();
    assert_eq!(rv, "[~]");
}
