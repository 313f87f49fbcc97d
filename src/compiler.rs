//! Bytecode compiler.
//!
//! Lowers the AST into a flat instruction stream plus a constant pool,
//! resolving identifiers through the chained symbol table and
//! back-patching jump targets for conditionals. Compared to the
//! tree-walker this backend supports a subset of the language; nodes
//! outside it fail with explicit errors.

use anyhow::{Result, bail};
use std::rc::Rc;

use crate::ast::{BlockStmt, Expression, Program, Statement};
use crate::bytecode::{
    self, Bytecode, CompiledFunction, Instructions, Opcode, PLACEHOLDER, infix_code, prefix_code,
};
use crate::runtime::Value;

pub mod symbol_table;

use symbol_table::{Symbol, SymbolScope, SymbolTable};

/// What an expression statement does with its value: discarded at top
/// level, returned in function bodies. Conditional arms bypass statement
/// compilation entirely so their value stays on the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExprOption {
    Pop,
    Return,
}

struct Scope {
    instructions: Instructions,
    consts: Vec<Value>,
    last_op: Option<Opcode>,
}

impl Scope {
    fn new(consts: Vec<Value>) -> Self {
        Self {
            instructions: Instructions::new(),
            consts,
            last_op: None,
        }
    }
}

pub struct Compiler {
    scopes: Vec<Scope>,
    symbols: SymbolTable,
}

impl Compiler {
    pub fn new() -> Self {
        Self::with_state(SymbolTable::with_builtins(), Vec::new())
    }

    /// REPL entry: resumes with the symbol table and constant pool of the
    /// previous line.
    pub fn with_state(symbols: SymbolTable, consts: Vec<Value>) -> Self {
        Self {
            scopes: vec![Scope::new(consts)],
            symbols,
        }
    }

    /// Hands the symbol table and constant pool back for the next line.
    pub fn into_state(mut self) -> (SymbolTable, Vec<Value>) {
        let consts = std::mem::take(&mut self.scopes[0].consts);
        (self.symbols, consts)
    }

    pub fn compile(&mut self, program: &Program) -> Result<()> {
        for stmt in &program.stmts {
            self.compile_stmt(stmt, ExprOption::Pop)?;
        }
        Ok(())
    }

    /// The artifact emitted so far: instructions plus constant pool.
    pub fn bytecode(&self) -> Bytecode {
        let scope = self.scope();
        Bytecode {
            instructions: scope.instructions.clone(),
            consts: scope.consts.clone(),
        }
    }

    fn compile_stmt(&mut self, stmt: &Statement, option: ExprOption) -> Result<()> {
        match stmt {
            Statement::Block(block) => self.compile_block(block, option),
            Statement::Const { name, value } => {
                self.compile_expr(value)?;
                if self.symbols.defined_locally(name) {
                    bail!("identifier already defined: {name}");
                }
                let symbol = self.symbols.define(name);
                self.emit_symbol_set(&symbol)
            }
            Statement::Function { .. } => {
                bail!("unsupported node in compiler backend: function statement")
            }
            Statement::Expr(expr) => {
                self.compile_expr(expr)?;
                match option {
                    ExprOption::Pop => self.emit(Opcode::Pop, &[])?,
                    ExprOption::Return => self.emit(Opcode::Return, &[])?,
                };
                Ok(())
            }
        }
    }

    fn compile_block(&mut self, block: &BlockStmt, option: ExprOption) -> Result<()> {
        for stmt in &block.stmts {
            self.compile_stmt(stmt, option)?;
        }
        Ok(())
    }

    fn compile_expr(&mut self, expr: &Expression) -> Result<()> {
        match expr {
            Expression::Integer(value) => self.emit_const(Value::Integer(*value)),
            Expression::Boolean(true) => self.emit(Opcode::True, &[]).map(|_| ()),
            Expression::Boolean(false) => self.emit(Opcode::False, &[]).map(|_| ()),
            Expression::Str(value) => self.emit_const(Value::Str(value.clone())),
            Expression::Null => bail!("unsupported node in compiler backend: null literal"),
            Expression::Ident(name) => {
                let Some(symbol) = self.symbols.resolve(name) else {
                    bail!("unresolved identifier: {name}");
                };
                self.emit_symbol_get(&symbol)
            }
            Expression::Array(items) => {
                // Data first, op last.
                for item in items {
                    self.compile_expr(item)?;
                }
                self.emit(Opcode::Array, &[items.len()])?;
                Ok(())
            }
            Expression::Hash(pairs) => {
                // Key order is sorted by stringification so emission is
                // deterministic across runs.
                let mut sorted: Vec<&(Expression, Expression)> = pairs.iter().collect();
                sorted.sort_by_key(|(key, _)| key.to_string());
                for (key, value) in sorted {
                    self.compile_expr(key)?;
                    self.compile_expr(value)?;
                }
                self.emit(Opcode::Hash, &[pairs.len()])?;
                Ok(())
            }
            Expression::Prefix { op, right } => {
                self.compile_expr(right)?;
                self.emit(prefix_code(op)?, &[])?;
                Ok(())
            }
            Expression::Infix { left, op, right } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.emit(infix_code(op)?, &[])?;
                Ok(())
            }
            Expression::Conditional { cond, yes, no } => self.compile_conditional(cond, yes, no),
            Expression::Index { left, index } => {
                self.compile_expr(left)?;
                self.compile_expr(index)?;
                self.emit(Opcode::Index, &[])?;
                Ok(())
            }
            Expression::Call { func, args } => {
                self.compile_expr(func)?;
                for arg in args {
                    self.compile_expr(arg)?;
                }
                self.emit(Opcode::Call, &[args.len()])?;
                Ok(())
            }
            Expression::Function(literal) => self.compile_function(literal),
            Expression::ObjectMember { .. } => {
                bail!("unsupported node in compiler backend: object member")
            }
            Expression::CallMember { .. } => {
                bail!("unsupported node in compiler backend: member call")
            }
            Expression::Loop { .. } => {
                bail!("unsupported node in compiler backend: loop expression")
            }
        }
    }

    /// Conditional layout: cond, OpJumpWhenFalse →no, yes, OpJump →end,
    /// no. Both arms leave their value on the stack.
    fn compile_conditional(
        &mut self,
        cond: &Expression,
        yes: &Expression,
        no: &Expression,
    ) -> Result<()> {
        self.compile_expr(cond)?;
        let jump_when_false = self.emit(Opcode::JumpWhenFalse, &[PLACEHOLDER])?;
        self.compile_expr(yes)?;
        let jump = self.emit(Opcode::Jump, &[PLACEHOLDER])?;
        self.change_operand(jump_when_false, self.pos())?;
        self.compile_expr(no)?;
        self.change_operand(jump, self.pos())?;
        Ok(())
    }

    fn compile_function(&mut self, literal: &Rc<crate::ast::FunctionLit>) -> Result<()> {
        self.enter_scope();
        for param in &literal.params {
            self.symbols.define(param);
        }
        self.compile_block(&literal.body, ExprOption::Return)?;
        if self.scope().last_op != Some(Opcode::Return) {
            // A body that never produces a value would let a VM frame run
            // off its instruction slice.
            self.leave_scope()?;
            bail!("function body must end with an expression");
        }
        let num_locals = self.symbols.num_definitions();
        let inner = self.leave_scope()?;
        let function = CompiledFunction {
            instructions: inner.instructions,
            consts: inner.consts,
            num_locals,
            num_params: literal.params.len(),
        };
        self.emit_const(Value::ByteFunc(Rc::new(function)))
    }

    /// Pushes a fresh emission buffer and symbol frame for a function
    /// literal.
    fn enter_scope(&mut self) {
        self.scopes.push(Scope::new(Vec::new()));
        let parent = std::mem::take(&mut self.symbols);
        self.symbols = SymbolTable::enclosed(parent);
    }

    /// Pops the innermost emission buffer and symbol frame, returning the
    /// completed inner bytecode.
    fn leave_scope(&mut self) -> Result<Bytecode> {
        if self.scopes.len() == 1 {
            bail!("scope imbalance: leave_scope without matching enter_scope");
        }
        let scope = self.scopes.pop().expect("scope stack checked above");
        let symbols = std::mem::take(&mut self.symbols);
        self.symbols = symbols
            .pop()
            .expect("symbol frames mirror the scope stack");
        Ok(Bytecode {
            instructions: scope.instructions,
            consts: scope.consts,
        })
    }

    fn scope(&self) -> &Scope {
        self.scopes.last().expect("at least one scope")
    }

    fn scope_mut(&mut self) -> &mut Scope {
        self.scopes.last_mut().expect("at least one scope")
    }

    /// Current emission cursor, the target of jump back-patching.
    fn pos(&self) -> usize {
        self.scope().instructions.len()
    }

    /// Encodes and appends one instruction, returning its position.
    fn emit(&mut self, op: Opcode, operands: &[usize]) -> Result<usize> {
        let ins = bytecode::make(op, operands)?;
        let scope = self.scope_mut();
        let pos = scope.instructions.append(ins);
        scope.last_op = Some(op);
        Ok(pos)
    }

    fn change_operand(&mut self, pos: usize, operand: usize) -> Result<()> {
        self.scope_mut().instructions.change_operand(pos, operand)
    }

    fn add_const(&mut self, value: Value) -> usize {
        let scope = self.scope_mut();
        scope.consts.push(value);
        scope.consts.len() - 1
    }

    fn emit_const(&mut self, value: Value) -> Result<()> {
        let idx = self.add_const(value);
        self.emit(Opcode::Const, &[idx])?;
        Ok(())
    }

    fn emit_symbol_set(&mut self, symbol: &Symbol) -> Result<()> {
        let op = match symbol.scope {
            SymbolScope::Global => Opcode::SetGlobal,
            SymbolScope::Local => Opcode::SetLocal,
        };
        self.emit(op, &[symbol.index])?;
        Ok(())
    }

    fn emit_symbol_get(&mut self, symbol: &Symbol) -> Result<()> {
        let op = match symbol.scope {
            SymbolScope::Global => Opcode::GetGlobal,
            SymbolScope::Local => Opcode::GetLocal,
        };
        self.emit(op, &[symbol.index])?;
        Ok(())
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
