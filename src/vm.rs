//! Stack virtual machine.
//!
//! Decodes the instruction stream the compiler emits against a value
//! stack, a globals vector and a frame stack. Each frame owns its own
//! instruction pointer, compiled function and base pointer into the value
//! stack. `OpPop` records the discarded value so the REPL can print the
//! result of the last expression statement.

use anyhow::{Result, bail};
use std::collections::HashMap;
use std::rc::Rc;

use crate::builtins;
use crate::bytecode::{Bytecode, CompiledFunction, Opcode, read_operands};
use crate::runtime::{HashKey, Value};
use crate::token::TokenKind;

pub const STACK_SIZE: usize = 2048;
/// Matches the u16 operand width of `OpSetGlobal`/`OpGetGlobal`.
pub const GLOBALS_SIZE: usize = 65536;

struct Frame {
    func: Rc<CompiledFunction>,
    ip: usize,
    bp: usize,
}

pub struct Vm {
    stack: Vec<Value>,
    sp: usize,
    globals: Vec<Value>,
    last_popped: Value,
}

impl Vm {
    /// Fresh machine with builtins seeded into their registry slots,
    /// mirroring the compiler's root symbol table.
    pub fn new() -> Self {
        let mut globals = vec![Value::Null; GLOBALS_SIZE];
        let mut index = 0;
        while let Some(builtin) = builtins::resolve(index) {
            globals[index] = Value::Builtin(builtin);
            index += 1;
        }
        Self {
            stack: vec![Value::Null; STACK_SIZE],
            sp: 0,
            globals,
            last_popped: Value::Null,
        }
    }

    /// Most recently popped value; what the final expression statement of
    /// a program produced.
    pub fn last_popped(&self) -> Value {
        self.last_popped.clone()
    }

    /// Executes a compiled program. Globals survive across calls so a
    /// REPL can keep feeding lines into one machine.
    pub fn run(&mut self, bytecode: &Bytecode) -> Result<()> {
        let main = Rc::new(CompiledFunction {
            instructions: bytecode.instructions.clone(),
            consts: bytecode.consts.clone(),
            num_locals: 0,
            num_params: 0,
        });
        self.sp = 0;
        let mut frames = vec![Frame {
            func: main,
            ip: 0,
            bp: 0,
        }];

        loop {
            let (op, operands) = {
                let frame = frames.last_mut().expect("frame stack never empty here");
                let ins = &frame.func.instructions.0;
                if frame.ip >= ins.len() {
                    if frames.len() == 1 {
                        break;
                    }
                    bail!("function body ended without return");
                }
                let op = Opcode::try_from(ins[frame.ip])?;
                let (operands, consumed) = read_operands(op.definition(), ins, frame.ip + 1)?;
                frame.ip += 1 + consumed;
                (op, operands)
            };

            match op {
                Opcode::Const => {
                    let frame = frames.last().expect("current frame");
                    let Some(value) = frame.func.consts.get(operands[0]).cloned() else {
                        bail!("constant index {} out of range", operands[0]);
                    };
                    self.push(value)?;
                }
                Opcode::Pop => {
                    self.last_popped = self.pop()?;
                }
                Opcode::Add
                | Opcode::Sub
                | Opcode::Mul
                | Opcode::Div
                | Opcode::Mod
                | Opcode::And
                | Opcode::Or
                | Opcode::Eq
                | Opcode::Neq
                | Opcode::Gt
                | Opcode::Lt
                | Opcode::Geq
                | Opcode::Leq => {
                    let right = self.pop()?;
                    let left = self.pop()?;
                    let result = left.calc(&binary_token(op), &right)?;
                    self.push(result)?;
                }
                Opcode::Neg => {
                    let value = self.pop()?;
                    self.push(value.prefix(&TokenKind::Minus)?)?;
                }
                Opcode::Not => {
                    let value = self.pop()?;
                    self.push(value.prefix(&TokenKind::Not)?)?;
                }
                Opcode::True => self.push(Value::Boolean(true))?,
                Opcode::False => self.push(Value::Boolean(false))?,
                Opcode::Jump => {
                    self.jump(frames.last_mut().expect("current frame"), operands[0])?;
                }
                Opcode::JumpWhenFalse => {
                    let cond = self.pop()?;
                    if !cond.is_truthy() {
                        self.jump(frames.last_mut().expect("current frame"), operands[0])?;
                    }
                }
                Opcode::SetGlobal => {
                    self.globals[operands[0]] = self.pop()?;
                }
                Opcode::GetGlobal => {
                    let value = self.globals[operands[0]].clone();
                    self.push(value)?;
                }
                Opcode::SetLocal => {
                    let bp = frames.last().expect("current frame").bp;
                    self.stack[bp + operands[0]] = self.pop()?;
                }
                Opcode::GetLocal => {
                    let bp = frames.last().expect("current frame").bp;
                    let value = self.stack[bp + operands[0]].clone();
                    self.push(value)?;
                }
                Opcode::Array => {
                    let count = operands[0];
                    let items = self.pop_many(count)?;
                    self.push(Value::Array(items))?;
                }
                Opcode::Hash => {
                    let count = operands[0];
                    let flat = self.pop_many(count * 2)?;
                    let mut pairs = HashMap::with_capacity(count);
                    for pair in flat.chunks(2) {
                        let key = HashKey::try_from_value(&pair[0])?;
                        pairs.insert(key, pair[1].clone());
                    }
                    self.push(Value::Hash(pairs))?;
                }
                Opcode::Index => {
                    let index = self.pop()?;
                    let left = self.pop()?;
                    self.push(left.call_member("index", &[index])?)?;
                }
                Opcode::Call => {
                    self.call(&mut frames, operands[0])?;
                }
                Opcode::Return => {
                    let result = self.pop()?;
                    let frame = frames.pop().expect("return inside a call frame");
                    if frames.is_empty() {
                        bail!("return outside of function");
                    }
                    // Drop locals and the callee slot, then yield the result.
                    self.sp = frame.bp - 1;
                    self.push(result)?;
                }
            }
        }
        Ok(())
    }

    /// `OpCall argc`: the callee sits below the arguments.
    fn call(&mut self, frames: &mut Vec<Frame>, argc: usize) -> Result<()> {
        if self.sp < argc + 1 {
            bail!("stack underflow");
        }
        let callee = self.stack[self.sp - argc - 1].clone();
        match callee {
            Value::ByteFunc(func) => {
                if argc != func.num_params {
                    bail!(
                        "Function expected {} arguments, got {argc}",
                        func.num_params
                    );
                }
                let bp = self.sp - argc;
                if bp + func.num_locals > STACK_SIZE {
                    bail!("stack overflow");
                }
                // Arguments already occupy the first local slots.
                self.sp = bp + func.num_locals;
                frames.push(Frame { func, ip: 0, bp });
            }
            Value::Builtin(builtin) => {
                let result = (builtin.func)(&self.stack[self.sp - argc..self.sp])?;
                self.sp -= argc + 1;
                self.push(result)?;
            }
            other => bail!("Object of type {} is not callable", other.type_name()),
        }
        Ok(())
    }

    fn jump(&self, frame: &mut Frame, target: usize) -> Result<()> {
        if target > frame.func.instructions.len() {
            bail!("jump target {target} out of range");
        }
        frame.ip = target;
        Ok(())
    }

    fn push(&mut self, value: Value) -> Result<()> {
        if self.sp >= STACK_SIZE {
            bail!("stack overflow");
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Result<Value> {
        if self.sp == 0 {
            bail!("stack underflow");
        }
        self.sp -= 1;
        Ok(std::mem::replace(&mut self.stack[self.sp], Value::Null))
    }

    /// Pops `count` values, restoring their push order.
    fn pop_many(&mut self, count: usize) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.pop()?);
        }
        values.reverse();
        Ok(values)
    }

    #[cfg(test)]
    fn stack_depth(&self) -> usize {
        self.sp
    }
}

fn binary_token(op: Opcode) -> TokenKind {
    match op {
        Opcode::Add => TokenKind::Plus,
        Opcode::Sub => TokenKind::Minus,
        Opcode::Mul => TokenKind::Star,
        Opcode::Div => TokenKind::Slash,
        Opcode::Mod => TokenKind::Percent,
        Opcode::And => TokenKind::And,
        Opcode::Or => TokenKind::Or,
        Opcode::Eq => TokenKind::Eq,
        Opcode::Neq => TokenKind::Neq,
        Opcode::Gt => TokenKind::Gt,
        Opcode::Lt => TokenKind::Lt,
        Opcode::Geq => TokenKind::Geq,
        Opcode::Leq => TokenKind::Leq,
        other => unreachable!("not a binary opcode: {:?}", other),
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::parser::parse_source;
    use crate::runtime::State;

    fn run(input: &str) -> Result<Value> {
        let program = parse_source(input).expect("parse should succeed");
        let mut compiler = Compiler::new();
        compiler.compile(&program)?;
        let mut vm = Vm::new();
        vm.run(&compiler.bytecode())?;
        assert_eq!(vm.stack_depth(), 0, "stack not drained for {input}");
        Ok(vm.last_popped())
    }

    fn run_ok(input: &str) -> Value {
        run(input).expect("run should succeed")
    }

    #[test]
    fn runs_integer_arithmetic() {
        let cases = [
            ("1", 1),
            ("2", 2),
            ("1 + 2", 3),
            ("1 - 2", -1),
            ("1 * 2", 2),
            ("4 / 2", 2),
            ("50 / 2 * 2 + 10 - 5", 55),
            ("5 + 5 + 5 + 5 - 10", 10),
            ("2 * 2 * 2 * 2 * 2", 32),
            ("5 * 2 + 10", 20),
            ("5 + 2 * 10", 25),
            ("5 * (2 + 10)", 60),
            ("10 % 3", 1),
            ("-1", -1),
            ("-(5 + 5)", -10),
        ];
        for (input, want) in cases {
            assert_eq!(run_ok(input), Value::Integer(want), "input: {input}");
        }
    }

    #[test]
    fn runs_boolean_expressions() {
        let cases = [
            ("true", true),
            ("false", false),
            ("1 < 2", true),
            ("1 > 2", false),
            ("1 == 2", false),
            ("1 != 2", true),
            ("1 >= 1", true),
            ("2 <= 1", false),
            ("true == false", false),
            ("true != false", true),
            ("!true", false),
            ("!!true", true),
        ];
        for (input, want) in cases {
            assert_eq!(run_ok(input), Value::Boolean(want), "input: {input}");
        }
    }

    #[test]
    fn and_or_are_strict_and_operand_valued() {
        // Both operands are already on the stack when OpAnd runs.
        assert_eq!(run_ok("1 && 2"), Value::Integer(2));
        assert_eq!(run_ok("1 && 0"), Value::Integer(0));
        assert_eq!(run_ok("0 && 2"), Value::Integer(0));
        assert_eq!(run_ok("0 || 2"), Value::Integer(2));
        assert_eq!(run_ok("1 || 2"), Value::Integer(1));
        // Unlike the tree-walker, the right operand is evaluated either
        // way, so an unresolved name in it fails at compile time.
        let program = parse_source("0 && missing").expect("parse");
        let err = Compiler::new()
            .compile(&program)
            .expect_err("compile should fail");
        assert_eq!(err.to_string(), "unresolved identifier: missing");
    }

    #[test]
    fn runs_conditionals() {
        assert_eq!(run_ok("true ? 10 : 20"), Value::Integer(10));
        assert_eq!(run_ok("false ? 10 : 20"), Value::Integer(20));
        assert_eq!(run_ok("1 < 2 ? 10 : 20"), Value::Integer(10));
        assert_eq!(run_ok("true ? 10 : 20; 3333;"), Value::Integer(3333));
    }

    #[test]
    fn runs_global_consts() {
        assert_eq!(run_ok("const one = 1; one;"), Value::Integer(1));
        assert_eq!(
            run_ok("const one = 1; const two = 2; one + two;"),
            Value::Integer(3)
        );
        assert_eq!(
            run_ok("const one = 1; const two = one + one; one + two;"),
            Value::Integer(3)
        );
    }

    #[test]
    fn runs_string_expressions() {
        assert_eq!(run_ok("\"mon\" + \"key\""), Value::Str("monkey".to_string()));
        assert_eq!(run_ok("\"a\" == \"a\""), Value::Boolean(true));
    }

    #[test]
    fn runs_array_and_hash_literals() {
        assert_eq!(run_ok("[]"), Value::Array(vec![]));
        assert_eq!(
            run_ok("[1, 2 + 3]"),
            Value::Array(vec![Value::Integer(1), Value::Integer(5)])
        );
        let Value::Hash(pairs) = run_ok("({\"a\": 1, 2: 4 / 2});") else {
            panic!("expected hash");
        };
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[&HashKey::Str("a".to_string())], Value::Integer(1));
        assert_eq!(pairs[&HashKey::Integer(2)], Value::Integer(2));
        assert_eq!(run_ok("({});"), Value::Hash(HashMap::new()));
    }

    #[test]
    fn runs_index_expressions() {
        assert_eq!(run_ok("[1, 2, 3][1]"), Value::Integer(2));
        assert_eq!(run_ok("[[1, 1], [2, 2]][1][0]"), Value::Integer(2));
        assert_eq!(run_ok("({\"a\": 7})[\"a\"]"), Value::Integer(7));
        let err = run("[1][9]").expect_err("out of bounds");
        assert!(err.to_string().contains("out of bounds"));
    }

    #[test]
    fn calls_functions_without_arguments() {
        assert_eq!(
            run_ok("const f = func() { 5 + 10; }; f();"),
            Value::Integer(15)
        );
        assert_eq!(
            run_ok("const a = func() { 1; }; const b = func() { 2; }; a() + b();"),
            Value::Integer(3)
        );
        // Expression-position call without a binding.
        assert_eq!(run_ok("func() { 24; }();"), Value::Integer(24));
    }

    #[test]
    fn calls_functions_with_arguments_and_locals() {
        assert_eq!(
            run_ok("const identity = func(a) { a; }; identity(4);"),
            Value::Integer(4)
        );
        assert_eq!(
            run_ok("const sum = func(a, b) { a + b; }; sum(1, 2);"),
            Value::Integer(3)
        );
        assert_eq!(
            run_ok("const f = func(a, b) { const c = a + b; c * 2; }; f(1, 2);"),
            Value::Integer(6)
        );
        assert_eq!(
            run_ok("const g = 10; const f = func(a) { a + g; }; f(5);"),
            Value::Integer(15)
        );
    }

    #[test]
    fn first_class_functions_pass_as_values() {
        assert_eq!(
            run_ok(
                "const apply = func(f, x) { f(x); }; const double = func(n) { n * 2; }; apply(double, 21);"
            ),
            Value::Integer(42)
        );
    }

    #[test]
    fn calls_builtins_through_global_slots() {
        assert_eq!(run_ok("type(1)"), Value::Str("integer".to_string()));
        assert_eq!(run_ok("str(1 + 2)"), Value::Str("3".to_string()));
        assert_eq!(
            run_ok("sprintf(\"%v!\", \"ok\")"),
            Value::Str("ok!".to_string())
        );
        assert_eq!(run_ok("state(true)"), Value::State(State { quit: true }));
    }

    #[test]
    fn call_arity_is_checked() {
        let err = run("const f = func(a) { a; }; f();").expect_err("arity");
        assert_eq!(err.to_string(), "Function expected 1 arguments, got 0");
    }

    #[test]
    fn calling_a_non_callable_fails() {
        let err = run("const x = 1; x();").expect_err("not callable");
        assert_eq!(err.to_string(), "Object of type integer is not callable");
    }

    #[test]
    fn runtime_type_errors_surface() {
        let err = run("1 / 0").expect_err("division by zero");
        assert_eq!(err.to_string(), "Division by zero");
        let err = run("1 + true").expect_err("mismatched operands");
        assert!(err.to_string().contains("Type mismatch"));
        let err = run("[1, 2][true]").expect_err("index type");
        assert!(err.to_string().contains("Expected integer"));
    }

    #[test]
    fn last_popped_defaults_to_null() {
        assert_eq!(run_ok(""), Value::Null);
        assert_eq!(run_ok("const a = 1;"), Value::Null);
    }

    #[test]
    fn globals_survive_across_runs() {
        let mut compiler = Compiler::new();
        compiler
            .compile(&parse_source("const a = 40;").expect("parse"))
            .expect("compile line 1");
        let mut vm = Vm::new();
        vm.run(&compiler.bytecode()).expect("run line 1");

        let (symbols, consts) = compiler.into_state();
        let mut compiler = Compiler::with_state(symbols, consts);
        compiler
            .compile(&parse_source("a + 2;").expect("parse"))
            .expect("compile line 2");
        vm.run(&compiler.bytecode()).expect("run line 2");
        assert_eq!(vm.last_popped(), Value::Integer(42));
    }

    #[test]
    fn aborted_runs_keep_prior_globals_intact() {
        let mut compiler = Compiler::new();
        compiler
            .compile(&parse_source("const a = 1; 1 / 0; const b = 2;").expect("parse"))
            .expect("compile");
        let mut vm = Vm::new();
        vm.run(&compiler.bytecode()).expect_err("run should fail");

        // `a` was written before the failing instruction; the next line
        // still sees it.
        let (symbols, consts) = compiler.into_state();
        let mut compiler = Compiler::with_state(symbols, consts);
        compiler
            .compile(&parse_source("a;").expect("parse"))
            .expect("compile next line");
        vm.run(&compiler.bytecode()).expect("run next line");
        assert_eq!(vm.last_popped(), Value::Integer(1));
    }
}
