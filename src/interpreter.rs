//! Tree-walking backend.
//!
//! Executes the AST directly against a chained environment and serves as
//! the reference semantics for the compiler + VM pair. Unlike the VM it
//! also covers object members, member calls and loop expressions.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{BlockStmt, Expression, Program, Statement};
use crate::builtins;
use crate::runtime::{Closure, Env, HashKey, RuntimeError, State, Value};
use crate::token::TokenKind;

pub fn eval_program(program: &Program, env: &Env) -> Result<Value, RuntimeError> {
    let mut result = Value::Null;
    for stmt in &program.stmts {
        result = eval_stmt(stmt, env)?;
    }
    Ok(result)
}

fn eval_stmt(stmt: &Statement, env: &Env) -> Result<Value, RuntimeError> {
    match stmt {
        // Blocks introduce a lexical scope.
        Statement::Block(block) => eval_block(block, &Env::enclosed(env)),
        Statement::Const { name, value } | Statement::Function { name, value } => {
            let value = eval_expr(value, env)?;
            env.set(name, value)?;
            Ok(Value::Null)
        }
        Statement::Expr(expr) => eval_expr(expr, env),
    }
}

fn eval_block(block: &BlockStmt, env: &Env) -> Result<Value, RuntimeError> {
    let mut result = Value::Null;
    for stmt in &block.stmts {
        result = eval_stmt(stmt, env)?;
    }
    Ok(result)
}

fn eval_expr(expr: &Expression, env: &Env) -> Result<Value, RuntimeError> {
    match expr {
        Expression::Integer(value) => Ok(Value::Integer(*value)),
        Expression::Boolean(value) => Ok(Value::Boolean(*value)),
        Expression::Str(value) => Ok(Value::Str(value.clone())),
        Expression::Null => Ok(Value::Null),
        Expression::Ident(name) => eval_ident(name, env),
        Expression::Array(items) => {
            let items = items
                .iter()
                .map(|item| eval_expr(item, env))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(items))
        }
        Expression::Hash(pairs) => {
            let mut map = HashMap::with_capacity(pairs.len());
            for (key, value) in pairs {
                let key = HashKey::try_from_value(&eval_expr(key, env)?)?;
                map.insert(key, eval_expr(value, env)?);
            }
            Ok(Value::Hash(map))
        }
        Expression::Prefix { op, right } => eval_expr(right, env)?.prefix(op),
        Expression::Infix { left, op, right } => eval_infix(left, op, right, env),
        Expression::Conditional { cond, yes, no } => {
            if eval_expr(cond, env)?.is_truthy() {
                eval_expr(yes, env)
            } else {
                eval_expr(no, env)
            }
        }
        Expression::Index { left, index } => {
            let left = eval_expr(left, env)?;
            let index = eval_expr(index, env)?;
            left.call_member("index", &[index])
        }
        Expression::ObjectMember { left, member } => {
            eval_expr(left, env)?.call_member(member, &[])
        }
        Expression::Call { func, args } => {
            let func = eval_expr(func, env)?;
            let args = eval_args(args, env)?;
            func.call(&args)
        }
        Expression::CallMember { left, member, args } => {
            let left = eval_expr(left, env)?;
            let args = eval_args(args, env)?;
            left.call_member(member, &args)
        }
        Expression::Function(literal) => Ok(Value::Closure(Rc::new(Closure {
            func: literal.clone(),
            env: env.clone(),
        }))),
        Expression::Loop { cnt, body } => eval_loop(cnt, body, env),
    }
}

fn eval_ident(name: &str, env: &Env) -> Result<Value, RuntimeError> {
    if let Some(value) = env.get(name) {
        return Ok(value);
    }
    if let Some(builtin) = builtins::lookup(name) {
        return Ok(Value::Builtin(builtin));
    }
    Err(RuntimeError::UndefinedIdentifier {
        name: name.to_string(),
    })
}

/// `&&`/`||` short-circuit here; everything else defers to the value's
/// operator dispatch.
fn eval_infix(
    left: &Expression,
    op: &TokenKind,
    right: &Expression,
    env: &Env,
) -> Result<Value, RuntimeError> {
    let left = eval_expr(left, env)?;
    match op {
        TokenKind::And if !left.is_truthy() => return Ok(left),
        TokenKind::Or if left.is_truthy() => return Ok(left),
        TokenKind::And | TokenKind::Or => return eval_expr(right, env),
        _ => {}
    }
    let right = eval_expr(right, env)?;
    left.calc(op, &right)
}

fn eval_args(args: &[Expression], env: &Env) -> Result<Vec<Value>, RuntimeError> {
    args.iter().map(|arg| eval_expr(arg, env)).collect()
}

/// Runs `body(i)` for `i` in `[0, cnt)`; each invocation must yield a
/// loop-state, and `quit` stops the loop early.
fn eval_loop(cnt: &Expression, body: &Expression, env: &Env) -> Result<Value, RuntimeError> {
    let cnt = eval_expr(cnt, env)?.as_int()?;
    let body = eval_expr(body, env)?;
    if !body.is_callable() {
        return Err(RuntimeError::NotCallable {
            type_name: body.type_name().to_string(),
        });
    }
    let mut state: Option<State> = None;
    for i in 0..cnt {
        let value = body.call(&[Value::Integer(i)])?;
        let next = value.as_state()?;
        state = Some(next);
        if next.quit {
            break;
        }
    }
    Ok(state.map(Value::State).unwrap_or(Value::Null))
}

/// Applies a closure: child environment of the captured one, positional
/// parameter binding, body evaluation.
pub(crate) fn call_closure(closure: &Closure, args: &[Value]) -> Result<Value, RuntimeError> {
    if args.len() != closure.func.params.len() {
        return Err(RuntimeError::ArityMismatch {
            expected: closure.func.params.len(),
            found: args.len(),
        });
    }
    let scope = Env::enclosed(&closure.env);
    for (param, value) in closure.func.params.iter().zip(args) {
        scope.set(param, value.clone())?;
    }
    eval_block(&closure.func.body, &scope)
}
