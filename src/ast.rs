//! Shared syntax tree used by all execution backends.
//!
//! The parser builds these nodes once, then the interpreter walks them
//! directly while the compiler lowers them into bytecode. Each node also has
//! a tagged-tree serialization in `ast::encode` and a round-trippable text
//! form via `Display`.

use std::fmt;
use std::rc::Rc;

use crate::token::TokenKind;

pub mod encode;

#[derive(Debug, PartialEq, Clone)]
pub struct Program {
    pub stmts: Vec<Statement>,
}

/// Statement list introducing a lexical scope in the tree-walker.
#[derive(Debug, PartialEq, Clone)]
pub struct BlockStmt {
    pub stmts: Vec<Statement>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Statement {
    Block(BlockStmt),
    Const {
        name: String,
        value: Expression,
    },
    /// Named function declaration; `value` is always a `Function` literal.
    Function {
        name: String,
        value: Expression,
    },
    Expr(Expression),
}

#[derive(Debug, PartialEq, Clone)]
pub struct FunctionLit {
    /// Empty for anonymous literals.
    pub name: String,
    pub params: Vec<String>,
    pub body: BlockStmt,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    Integer(i64),
    Boolean(bool),
    Str(String),
    Null,
    Ident(String),
    Array(Vec<Expression>),
    /// Key→value pairs in source order; emission and serialization sort by
    /// key stringification.
    Hash(Vec<(Expression, Expression)>),
    Prefix {
        op: TokenKind,
        right: Box<Expression>,
    },
    Infix {
        left: Box<Expression>,
        op: TokenKind,
        right: Box<Expression>,
    },
    Conditional {
        cond: Box<Expression>,
        yes: Box<Expression>,
        no: Box<Expression>,
    },
    Index {
        left: Box<Expression>,
        index: Box<Expression>,
    },
    ObjectMember {
        left: Box<Expression>,
        member: String,
    },
    Call {
        func: Box<Expression>,
        args: Vec<Expression>,
    },
    CallMember {
        left: Box<Expression>,
        member: String,
        args: Vec<Expression>,
    },
    Function(Rc<FunctionLit>),
    Loop {
        cnt: Box<Expression>,
        body: Box<Expression>,
    },
}

fn join<T: fmt::Display>(items: &[T], sep: &str) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(sep)
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stmt in &self.stmts {
            write!(f, "{stmt}")?;
        }
        Ok(())
    }
}

impl fmt::Display for BlockStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stmt in &self.stmts {
            write!(f, "{stmt}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Block(block) => write!(f, "{{ {block} }}"),
            Statement::Const { name, value } => write!(f, "const {name} = {value};"),
            Statement::Function { value, .. } => write!(f, "{value}"),
            Statement::Expr(expr) => write!(f, "{expr};"),
        }
    }
}

impl fmt::Display for FunctionLit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "func")?;
        if !self.name.is_empty() {
            write!(f, " {}", self.name)?;
        }
        write!(f, "({}) {{ {} }}", join(&self.params, ", "), self.body)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Integer(value) => write!(f, "{value}"),
            Expression::Boolean(value) => write!(f, "{value}"),
            Expression::Str(value) => write!(f, "\"{value}\""),
            Expression::Null => write!(f, "null"),
            Expression::Ident(name) => write!(f, "{name}"),
            Expression::Array(items) => write!(f, "[{}]", join(items, ", ")),
            Expression::Hash(pairs) => {
                let rendered = pairs
                    .iter()
                    .map(|(key, value)| format!("{key}: {value}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{{{rendered}}}")
            }
            Expression::Prefix { op, right } => write!(f, "({}{right})", op.literal()),
            Expression::Infix { left, op, right } => {
                write!(f, "({left} {} {right})", op.literal())
            }
            Expression::Conditional { cond, yes, no } => write!(f, "({cond} ? {yes} : {no})"),
            Expression::Index { left, index } => write!(f, "({left}[{index}])"),
            Expression::ObjectMember { left, member } => write!(f, "{left}.{member}"),
            Expression::Call { func, args } => write!(f, "{func}({})", join(args, ", ")),
            Expression::CallMember { left, member, args } => {
                write!(f, "{left}.{member}({})", join(args, ", "))
            }
            Expression::Function(function) => write!(f, "{function}"),
            Expression::Loop { cnt, body } => write!(f, "loop({cnt}, {body})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_round_trippable_statement_forms() {
        let program = Program {
            stmts: vec![
                Statement::Const {
                    name: "a".to_string(),
                    value: Expression::Infix {
                        left: Box::new(Expression::Integer(1)),
                        op: TokenKind::Plus,
                        right: Box::new(Expression::Integer(2)),
                    },
                },
                Statement::Expr(Expression::Conditional {
                    cond: Box::new(Expression::Boolean(true)),
                    yes: Box::new(Expression::Ident("a".to_string())),
                    no: Box::new(Expression::Index {
                        left: Box::new(Expression::Array(vec![
                            Expression::Integer(1),
                            Expression::Str("x".to_string()),
                        ])),
                        index: Box::new(Expression::Integer(0)),
                    }),
                }),
            ],
        };
        assert_eq!(
            program.to_string(),
            "const a = (1 + 2);(true ? a : ([1, \"x\"][0]));"
        );
    }

    #[test]
    fn renders_function_literal_with_params() {
        let function = Expression::Function(Rc::new(FunctionLit {
            name: String::new(),
            params: vec!["x".to_string(), "y".to_string()],
            body: BlockStmt {
                stmts: vec![Statement::Expr(Expression::Infix {
                    left: Box::new(Expression::Ident("x".to_string())),
                    op: TokenKind::Star,
                    right: Box::new(Expression::Ident("y".to_string())),
                })],
            },
        }));
        assert_eq!(function.to_string(), "func(x, y) { (x * y); }");
    }
}
