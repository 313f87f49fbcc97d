//! Execution backends behind one trait.
//!
//! Both engines keep their state across `run` calls so the REPL can feed
//! them one line at a time: the interpreter holds its environment, the
//! machine its symbol table, constant pool and globals.

use anyhow::Result;

use crate::ast::Program;
use crate::compiler::Compiler;
use crate::compiler::symbol_table::SymbolTable;
use crate::interpreter;
use crate::runtime::{Env, Value};
use crate::vm::Vm;

pub trait Backend {
    fn name(&self) -> &'static str;
    fn run(&mut self, program: &Program) -> Result<Value>;
}

pub fn backends() -> Vec<Box<dyn Backend>> {
    vec![
        Box::new(Interpreter::new()),
        Box::new(Machine::new()),
    ]
}

/// Tree-walking backend.
pub struct Interpreter {
    env: Env,
}

impl Interpreter {
    pub fn new() -> Self {
        Self { env: Env::new() }
    }
}

impl Backend for Interpreter {
    fn name(&self) -> &'static str {
        "interpreter"
    }

    fn run(&mut self, program: &Program) -> Result<Value> {
        Ok(interpreter::eval_program(program, &self.env)?)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

/// Compiler + VM backend.
pub struct Machine {
    state: Option<(SymbolTable, Vec<Value>)>,
    vm: Vm,
}

impl Machine {
    pub fn new() -> Self {
        Self {
            state: None,
            vm: Vm::new(),
        }
    }
}

impl Backend for Machine {
    fn name(&self) -> &'static str {
        "vm"
    }

    fn run(&mut self, program: &Program) -> Result<Value> {
        let (symbols, consts) = self
            .state
            .take()
            .unwrap_or_else(|| (SymbolTable::with_builtins(), Vec::new()));
        let mut compiler = Compiler::with_state(symbols, consts);
        let compiled = compiler.compile(program);
        let bytecode = compiler.bytecode();
        // Keep the symbol table and constant pool even when this line
        // failed; the next line continues from them.
        self.state = Some(compiler.into_state());
        compiled?;
        self.vm.run(&bytecode)?;
        Ok(self.vm.last_popped())
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}
