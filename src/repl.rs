//! Line-oriented REPL.
//!
//! Each line is parsed and fed to the selected backend; backends carry
//! their bindings, constants and globals forward, and errors recover at
//! the line boundary.

use anyhow::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::backend::Backend;
use crate::parser;

const PROMPT: &str = ">> ";

pub fn run(backend: &mut dyn Backend) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    loop {
        match editor.readline(PROMPT) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);
                eval_line(backend, line);
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return Ok(()),
            Err(err) => return Err(err.into()),
        }
    }
}

fn eval_line(backend: &mut dyn Backend, line: &str) {
    let program = match parser::parse_source(line) {
        Ok(program) => program,
        Err(err) => {
            println!("\t{err}");
            return;
        }
    };
    match backend.run(&program) {
        Ok(value) => {
            if !value.is_null() {
                println!("{value}");
            }
        }
        Err(err) => println!("{err}"),
    }
}
