use vinja::machinery::{optimize, parse, Bytecode, CodeGenerator, Instr};
use vinja::syntax::{SyntaxConfig, WhitespaceConfig};
use vinja::{context, Environment};

use similar_asserts::assert_eq;

fn compile(env: &Environment, source: &str) -> Bytecode {
    let ast = parse(
        source,
        "<test>",
        SyntaxConfig::default(),
        WhitespaceConfig::default(),
        Vec::new(),
    )
    .unwrap();
    let state = env.empty_state();
    let ast = optimize(&state, ast);
    let mut generator = CodeGenerator::new("<test>");
    generator.compile_stmt(&ast).unwrap();
    generator.finish().0
}

fn instructions(code: &Bytecode) -> Vec<&Instr> {
    (0..code.len()).map(|idx| code.get(idx).unwrap()).collect()
}

#[test]
fn test_optimizer_is_idempotent() {
    let env = Environment::new();
    let state = env.empty_state();
    let source = "a{{ 1 + 2 }}{% if x %}b{% endif %}{% for i in [1, 2] %}{{ i|upper }}{% endfor %}";
    let parse_it = || {
        parse(
            source,
            "<test>",
            SyntaxConfig::default(),
            WhitespaceConfig::default(),
            Vec::new(),
        )
        .unwrap()
    };
    let once = optimize(&state, parse_it());
    let twice = optimize(&state, optimize(&state, parse_it()));
    assert_eq!(format!("{once:#?}"), format!("{twice:#?}"));
}

#[test]
fn test_constant_folding() {
    let env = Environment::new();
    let code = compile(&env, "{{ 1 + 2 * 3 }}");
    assert!(!instructions(&code)
        .iter()
        .any(|instr| matches!(instr, Instr::Add | Instr::Mul)));
    assert_eq!(env.render_str("{{ 1 + 2 * 3 }}", context!()).unwrap(), "7");
}

#[test]
fn test_pure_filter_folding() {
    let env = Environment::new();
    let code = compile(&env, "{{ 'hello'|upper }}");
    assert!(!instructions(&code)
        .iter()
        .any(|instr| matches!(instr, Instr::ApplyFilter(..))));
}

#[test]
fn test_impure_filters_are_not_folded() {
    let env = Environment::new();
    // first is not marked pure so it stays a runtime call
    let code = compile(&env, "{{ [1, 2]|first }}");
    assert!(instructions(&code)
        .iter()
        .any(|instr| matches!(instr, Instr::ApplyFilter(..))));
}

#[test]
fn test_overridden_filter_is_not_folded() {
    let mut env = Environment::new();
    env.add_filter("upper", |_state: &vinja::State, value: String| {
        Ok::<_, vinja::Error>(format!("!{value}!"))
    });
    // the user override is not pure, so folding must not happen and the
    // override must win at runtime
    let code = compile(&env, "{{ 'x'|upper }}");
    assert!(instructions(&code)
        .iter()
        .any(|instr| matches!(instr, Instr::ApplyFilter(..))));
    assert_eq!(env.render_str("{{ 'x'|upper }}", context!()).unwrap(), "!x!");
}

#[test]
fn test_dead_branch_elimination() {
    let env = Environment::new();
    let code = compile(&env, "{% if false %}dead{% endif %}live");
    assert!(!instructions(&code)
        .iter()
        .any(|instr| matches!(instr, Instr::JumpIfFalse(_))));

    let code = compile(&env, "{% if true %}live{% else %}dead{% endif %}");
    assert!(!instructions(&code)
        .iter()
        .any(|instr| matches!(instr, Instr::JumpIfFalse(_))));
}

#[test]
fn test_empty_loop_elimination() {
    let env = Environment::new();
    let code = compile(&env, "{% for x in [] %}a{% else %}b{% endfor %}");
    assert!(!instructions(&code)
        .iter()
        .any(|instr| matches!(instr, Instr::Iterate(_))));
    assert_eq!(
        env.render_str("{% for x in [] %}a{% else %}b{% endfor %}", context!())
            .unwrap(),
        "b"
    );
}

#[test]
fn test_output_merging() {
    let env = Environment::new();
    // the eliminated branch leaves two adjacent raw outputs that merge
    let code = compile(&env, "a{% if false %}x{% endif %}b");
    let emits = instructions(&code)
        .iter()
        .filter(|instr| matches!(instr, Instr::EmitText(_)))
        .count();
    assert_eq!(emits, 1);
}

#[test]
fn test_division_by_zero_is_not_folded() {
    let env = Environment::new();
    let code = compile(&env, "{{ 1 / 0 }}");
    assert!(instructions(&code)
        .iter()
        .any(|instr| matches!(instr, Instr::Div)));
    // the error surfaces at render time with location info
    let err = env.render_str("{{ 1 / 0 }}", context!()).unwrap_err();
    assert_eq!(err.kind(), vinja::ErrorKind::ZeroDivisionError);
}

#[test]
fn test_chained_comparison_folding() {
    let env = Environment::new();
    let code = compile(&env, "{{ 1 < 2 < 3 }}");
    assert!(!instructions(&code)
        .iter()
        .any(|instr| matches!(instr, Instr::Cmp(_))));
    assert_eq!(env.render_str("{{ 1 < 2 < 3 }}", context!()).unwrap(), "true");
}
