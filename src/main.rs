use std::fs;

use anyhow::{Context, Result, bail};
use escript::ast::encode;
use escript::backend::{self, Backend};
use escript::{parser, repl};

const SUFFIX_SOURCE: &str = ".es";
const SUFFIX_JSON: &str = ".json";

enum Mode {
    Repl,
    EvalScript(String),
    DumpAst(String),
    LoadJson(String),
}

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let mut backend_name = "vm".to_string();
    let mut mode = Mode::Repl;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--backend" | "-b" => {
                backend_name = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("Missing backend name after {arg}"))?;
            }
            "--dump" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("Missing path after --dump"))?;
                mode = Mode::DumpAst(path);
            }
            "--load" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("Missing path after --load"))?;
                mode = Mode::LoadJson(path);
            }
            _ => {
                mode = Mode::EvalScript(arg);
                if args.next().is_some() {
                    bail!("Only one input file is supported");
                }
            }
        }
    }

    let mut backend = select_backend(&backend_name)?;
    match mode {
        Mode::Repl => repl::run(backend.as_mut()),
        Mode::EvalScript(path) => eval_script(backend.as_mut(), &path),
        Mode::DumpAst(path) => dump_ast(&path),
        Mode::LoadJson(path) => load_json(backend.as_mut(), &path),
    }
}

fn select_backend(name: &str) -> Result<Box<dyn Backend>> {
    for backend in backend::backends() {
        if backend.name() == name {
            return Ok(backend);
        }
    }
    bail!("Unknown backend '{name}'")
}

fn load_source(path: &str) -> Result<String> {
    if !path.ends_with(SUFFIX_SOURCE) {
        bail!("file \"{path}\" does not end with {SUFFIX_SOURCE}");
    }
    fs::read_to_string(path).with_context(|| format!("Reading {path}"))
}

fn print_result(value: escript::runtime::Value) {
    if !value.is_null() {
        println!("{value}");
    }
}

fn eval_script(backend: &mut dyn Backend, path: &str) -> Result<()> {
    let source = load_source(path)?;
    let program = parser::parse_source(&source)?;
    print_result(backend.run(&program)?);
    Ok(())
}

fn dump_ast(path: &str) -> Result<()> {
    let source = load_source(path)?;
    let program = parser::parse_source(&source)?;
    println!("{}", encode::to_json_string(&program)?);
    Ok(())
}

fn load_json(backend: &mut dyn Backend, path: &str) -> Result<()> {
    if !path.ends_with(SUFFIX_JSON) {
        bail!("file \"{path}\" does not end with {SUFFIX_JSON}");
    }
    let data = fs::read_to_string(path).with_context(|| format!("Reading {path}"))?;
    let program = encode::from_json_str(&data)?;
    print_result(backend.run(&program)?);
    Ok(())
}
