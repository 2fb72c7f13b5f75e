use std::sync::Arc;

use vinja::ast::{self, Spanned};
use vinja::extensions::{Extension, TagParser};
use vinja::value::Value;
use vinja::{context, Environment, Error, ErrorKind, State};

use similar_asserts::assert_eq;

/// Implements `{% repeat <expr> %}body{% endrepeat %}` by desugaring into
/// a for loop over `range()`.
#[derive(Debug)]
struct RepeatExtension;

impl Extension for RepeatExtension {
    fn name(&self) -> &str {
        "repeat"
    }

    fn tags(&self) -> &[&str] {
        &["repeat"]
    }

    fn parse(&self, parser: &mut TagParser) -> Result<ast::Stmt, Error> {
        let span = parser.span();
        let count = parser.parse_expr()?;
        let body = parser.parse_body("endrepeat")?;
        Ok(ast::Stmt::ForLoop(Spanned::new(
            ast::ForLoop {
                target: ast::Expr::Var(Spanned::new(
                    ast::Var {
                        id: "__repeat_index".into(),
                    },
                    span,
                )),
                iter: ast::Expr::Call(Spanned::new(
                    ast::Call {
                        expr: ast::Expr::Var(Spanned::new(ast::Var { id: "range".into() }, span)),
                        args: vec![ast::CallArg::Pos(count)],
                    },
                    span,
                )),
                filter_expr: None,
                recursive: false,
                body,
                else_body: Vec::new(),
            },
            span,
        )))
    }
}

/// Contributes a filter and a test but no tags.
#[derive(Debug)]
struct ShoutExtension;

impl Extension for ShoutExtension {
    fn name(&self) -> &str {
        "shout"
    }

    fn filters(&self) -> Vec<(&str, Value)> {
        fn shout(state: &State, args: &[Value]) -> Result<Value, Error> {
            let _ = state;
            Ok(Value::from(format!("{}!!!", args[0])))
        }
        vec![("shout", Value::from_function("shout", shout))]
    }

    fn tests(&self) -> Vec<(&str, Value)> {
        fn is_loud(_state: &State, args: &[Value]) -> Result<Value, Error> {
            Ok(Value::from(
                args[0].as_str().map_or(false, |s| s.ends_with('!')),
            ))
        }
        vec![("loud", Value::from_function("loud", is_loud))]
    }
}

#[test]
fn test_custom_tag() {
    let mut env = Environment::new();
    env.register_extension(Arc::new(RepeatExtension));
    let rv = env
        .render_str("{% repeat 3 %}x{% endrepeat %}", context!())
        .unwrap();
    assert_eq!(rv, "xxx");
}

#[test]
fn test_custom_tag_with_body_statements() {
    let mut env = Environment::new();
    env.register_extension(Arc::new(RepeatExtension));
    let rv = env
        .render_str(
            "{% repeat 2 %}{% if true %}a{% endif %}{% endrepeat %}",
            context!(),
        )
        .unwrap();
    assert_eq!(rv, "aa");
}

#[test]
fn test_unknown_tag_still_fails() {
    let mut env = Environment::new();
    env.register_extension(Arc::new(RepeatExtension));
    let err = env
        .render_str("{% frobnicate %}", context!())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ParseError);
}

#[test]
fn test_extension_filters_and_tests() {
    let mut env = Environment::new();
    env.register_extension(Arc::new(ShoutExtension));
    assert_eq!(
        env.render_str("{{ 'hey'|shout }}", context!()).unwrap(),
        "hey!!!"
    );
    assert_eq!(
        env.render_str("{{ 'hey!' is loud }}", context!()).unwrap(),
        "true"
    );
}

#[test]
fn test_builtins_win_over_extension_filters() {
    #[derive(Debug)]
    struct EvilExtension;
    impl Extension for EvilExtension {
        fn name(&self) -> &str {
            "evil"
        }
        fn filters(&self) -> Vec<(&str, Value)> {
            fn upper(_state: &State, _args: &[Value]) -> Result<Value, Error> {
                Ok(Value::from("evil"))
            }
            vec![("upper", Value::from_function("upper", upper))]
        }
    }

    let mut env = Environment::new();
    env.register_extension(Arc::new(EvilExtension));
    assert_eq!(
        env.render_str("{{ 'x'|upper }}", context!()).unwrap(),
        "X"
    );
}

#[test]
fn test_extension_priority() {
    #[derive(Debug)]
    struct Claimer(&'static str, i32);
    impl Extension for Claimer {
        fn name(&self) -> &str {
            self.0
        }
        fn priority(&self) -> i32 {
            self.1
        }
        fn tags(&self) -> &[&str] {
            &["thing"]
        }
        fn parse(&self, parser: &mut TagParser) -> Result<ast::Stmt, Error> {
            let span = parser.span();
            parser.expect_block_end()?;
            Ok(ast::Stmt::EmitRaw(Spanned::new(
                ast::EmitRaw {
                    raw: self.0.to_string(),
                },
                span,
            )))
        }
    }

    let mut env = Environment::new();
    env.register_extension(Arc::new(Claimer("late", 100)));
    env.register_extension(Arc::new(Claimer("early", 1)));
    let rv = env.render_str("{% thing %}", context!()).unwrap();
    assert_eq!(rv, "early");
}
