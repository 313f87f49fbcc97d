//! Cross-backend agreement suite.
//!
//! The tree-walker is the reference semantics; for every program in the
//! compiler-supported subset, the VM must produce the same value.

use anyhow::{Context, Result, ensure};

use escript::ast::encode;
use escript::backend::{Backend, Interpreter, Machine};
use escript::parser::parse_source;
use escript::runtime::Value;

/// Programs both backends support, one value-producing program per entry.
const AGREEMENT_CASES: &[&str] = &[
    "1 + 2;",
    "50 / 2 * 2 + 10 - 5;",
    "5 * (2 + 10);",
    "10 % 3;",
    "-1;",
    "-(5 + 5);",
    "true;",
    "1 == 2;",
    "1 != 2;",
    "1 < 2;",
    "2 > 1;",
    "2 <= 1;",
    "1 >= 1;",
    "true == false;",
    "false < true;",
    "!true;",
    "!!5;",
    "1 && 2;",
    "1 && 0;",
    "0 && 2;",
    "0 || 2;",
    "1 || 2;",
    "true ? 10 : 20;",
    "false ? 10 : 20;",
    "1 < 2 ? \"yes\" : \"no\";",
    "true ? 10 : 20; 3333;",
    "\"mon\" + \"key\";",
    "\"a\" == \"b\";",
    "const a = 5; a;",
    "const a = 5; const b = a + 1; a + b;",
    "[];",
    "[1, 2 + 3, \"x\"];",
    "[1, 2, 3][1];",
    "[[1, 1], [2, 2]][1][0];",
    "({\"a\": 1, 2: 4 / 2});",
    "({\"a\": 7})[\"a\"];",
    "const f = func() { 5 + 10; }; f();",
    "func() { 24; }();",
    "const identity = func(a) { a; }; identity(4);",
    "const sum = func(a, b) { a + b; }; sum(1, 2);",
    "const f = func(a, b) { const c = a + b; c * 2; }; f(1, 2);",
    "const g = 10; const f = func(a) { a + g; }; f(5);",
    "const apply = func(f, x) { f(x); }; const double = func(n) { n * 2; }; apply(double, 21);",
    "type(true);",
    "str(1 + 2);",
    "sprintf(\"%v-%v\", 1, 2);",
    "state(false);",
    "loads(dumps([1, 2, 3]));",
];

/// Programs that must fail on both backends.
const FAILURE_CASES: &[&str] = &[
    "1 / 0;",
    "10 % 0;",
    "1 + true;",
    "\"a\" - \"b\";",
    "[1, 2][9];",
    "const x = 1; x();",
    "const id = func(a) { a; }; id();",
];

fn run_with(backend: &mut dyn Backend, input: &str) -> Result<Value> {
    let program = parse_source(input).with_context(|| format!("Parsing {input}"))?;
    backend
        .run(&program)
        .with_context(|| format!("Backend {} failed for {input}", backend.name()))
}

#[test]
fn backends_agree_on_the_supported_subset() -> Result<()> {
    for case in AGREEMENT_CASES {
        let reference = run_with(&mut Interpreter::new(), case)?;
        let compiled = run_with(&mut Machine::new(), case)?;
        ensure!(
            reference == compiled,
            "backend mismatch for {case}: interpreter {reference}, vm {compiled}"
        );
    }
    Ok(())
}

#[test]
fn backends_agree_on_concrete_scenarios() -> Result<()> {
    let cases: &[(&str, Value)] = &[
        ("1 + 2;", Value::Integer(3)),
        ("50 / 2 * 2 + 10 - 5;", Value::Integer(55)),
        ("true ? 10 : 20;", Value::Integer(10)),
        ("1 == 2;", Value::Boolean(false)),
        ("!true;", Value::Boolean(false)),
        ("1 && 2;", Value::Integer(2)),
        ("-1;", Value::Integer(-1)),
    ];
    for (input, want) in cases {
        let backends: [Box<dyn Backend>; 2] =
            [Box::new(Interpreter::new()), Box::new(Machine::new())];
        for mut backend in backends {
            let got = run_with(backend.as_mut(), input)?;
            ensure!(
                got == *want,
                "backend {} for {input}: want {want}, got {got}",
                backend.name()
            );
        }
    }
    Ok(())
}

#[test]
fn failures_surface_on_both_backends() -> Result<()> {
    for case in FAILURE_CASES {
        let program = parse_source(case).with_context(|| format!("Parsing {case}"))?;
        ensure!(
            Interpreter::new().run(&program).is_err(),
            "interpreter unexpectedly succeeded for {case}"
        );
        ensure!(
            Machine::new().run(&program).is_err(),
            "vm unexpectedly succeeded for {case}"
        );
    }
    Ok(())
}

#[test]
fn tree_walker_covers_nodes_the_compiler_rejects() -> Result<()> {
    let cases: &[(&str, Value)] = &[
        ("null;", Value::Null),
        ("[1, 2, 3].len();", Value::Integer(3)),
        ("[1, 2].first;", Value::Integer(1)),
        (
            "func fib(n) { n < 2 ? n : fib(n - 1) + fib(n - 2); } fib(10);",
            Value::Integer(55),
        ),
        (
            "loop(5, func(i) { state(i == 2); }).quit;",
            Value::Boolean(true),
        ),
    ];
    for (input, want) in cases {
        let got = run_with(&mut Interpreter::new(), input)?;
        ensure!(got == *want, "interpreter for {input}: want {want}, got {got}");

        let program = parse_source(input)?;
        let err = Machine::new()
            .run(&program)
            .expect_err("vm should reject nodes outside its subset");
        ensure!(
            err.to_string().contains("unsupported node")
                || err.to_string().contains("unresolved identifier"),
            "unexpected vm error for {input}: {err}"
        );
    }
    Ok(())
}

#[test]
fn serialized_programs_run_identically() -> Result<()> {
    for case in AGREEMENT_CASES {
        let program = parse_source(case)?;
        let reloaded = encode::from_json_str(&encode::to_json_string(&program)?)
            .with_context(|| format!("Reloading {case}"))?;
        ensure!(reloaded == program, "round trip changed {case}");

        let direct = Interpreter::new().run(&program)?;
        let via_json = Interpreter::new().run(&reloaded)?;
        ensure!(
            direct == via_json,
            "serialized run mismatch for {case}: {direct} vs {via_json}"
        );
    }
    Ok(())
}

#[test]
fn repl_style_sessions_agree_across_backends() -> Result<()> {
    let lines = [
        "const base = 40;",
        "const bump = func(n) { n + 2; };",
        "bump(base);",
    ];
    let mut interpreter = Interpreter::new();
    let mut machine = Machine::new();
    let mut last_interpreter = Value::Null;
    let mut last_machine = Value::Null;
    for line in lines {
        last_interpreter = run_with(&mut interpreter, line)?;
        last_machine = run_with(&mut machine, line)?;
    }
    ensure!(last_interpreter == Value::Integer(42));
    ensure!(last_machine == Value::Integer(42));
    Ok(())
}
