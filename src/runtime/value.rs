use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::FunctionLit;
use crate::bytecode::CompiledFunction;
use crate::runtime::env::Env;
use crate::runtime::error::RuntimeError;
use crate::token::TokenKind;

pub type BuiltinFn = fn(&[Value]) -> Result<Value, RuntimeError>;

/// Named native callable registered in `builtins`.
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

/// Sentinel returned by each loop body iteration; `quit` stops the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct State {
    pub quit: bool,
}

/// Function literal bundled with its captured environment.
pub struct Closure {
    pub func: Rc<FunctionLit>,
    pub env: Env,
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The captured environment may reference this closure; keep Debug
        // acyclic by printing the literal only.
        write!(f, "Closure({})", self.func)
    }
}

/// Hashable key subset of the value space.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    Integer(i64),
    Boolean(bool),
    Str(String),
}

impl HashKey {
    pub fn try_from_value(value: &Value) -> Result<HashKey, RuntimeError> {
        match value {
            Value::Integer(v) => Ok(HashKey::Integer(*v)),
            Value::Boolean(v) => Ok(HashKey::Boolean(*v)),
            Value::Str(v) => Ok(HashKey::Str(v.clone())),
            other => Err(RuntimeError::NotHashable {
                type_name: other.type_name().to_string(),
            }),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            HashKey::Integer(v) => Value::Integer(*v),
            HashKey::Boolean(v) => Value::Boolean(*v),
            HashKey::Str(v) => Value::Str(v.clone()),
        }
    }
}

impl fmt::Display for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashKey::Integer(v) => write!(f, "{v}"),
            HashKey::Boolean(v) => write!(f, "{v}"),
            HashKey::Str(v) => write!(f, "{v}"),
        }
    }
}

/// The polymorphic value produced by both backends.
#[derive(Debug, Clone)]
pub enum Value {
    Integer(i64),
    Boolean(bool),
    Str(String),
    Array(Vec<Value>),
    Hash(HashMap<HashKey, Value>),
    Closure(Rc<Closure>),
    ByteFunc(Rc<CompiledFunction>),
    Builtin(&'static Builtin),
    State(State),
    Null,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Boolean(_) => "boolean",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Hash(_) => "hash",
            Value::Closure(_) => "function",
            Value::ByteFunc(_) => "compiled function",
            Value::Builtin(_) => "builtin",
            Value::State(_) => "state",
            Value::Null => "null",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Integer(value) => *value != 0,
            Value::Boolean(value) => *value,
            Value::Str(value) => !value.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Hash(pairs) => !pairs.is_empty(),
            Value::Null => false,
            _ => true,
        }
    }

    pub fn as_int(&self) -> Result<i64, RuntimeError> {
        match self {
            Value::Integer(value) => Ok(*value),
            other => Err(RuntimeError::ExpectedInteger {
                type_name: other.type_name().to_string(),
            }),
        }
    }

    pub fn as_state(&self) -> Result<State, RuntimeError> {
        match self {
            Value::State(state) => Ok(*state),
            other => Err(RuntimeError::ExpectedState {
                type_name: other.type_name().to_string(),
            }),
        }
    }

    /// Infix operator dispatch.
    ///
    /// `&&`/`||` yield an operand, not a coerced boolean, for any operand
    /// types; both backends agree on that, short-circuiting is the
    /// tree-walker's concern alone.
    pub fn calc(&self, op: &TokenKind, rhs: &Value) -> Result<Value, RuntimeError> {
        match op {
            TokenKind::And => {
                return Ok(if !self.is_truthy() {
                    self.clone()
                } else {
                    rhs.clone()
                });
            }
            TokenKind::Or => {
                return Ok(if self.is_truthy() {
                    self.clone()
                } else {
                    rhs.clone()
                });
            }
            _ => {}
        }

        match (self, rhs) {
            (Value::Integer(left), Value::Integer(right)) => calc_integer(op, *left, *right),
            (Value::Str(left), Value::Str(right)) => calc_string(op, left, right),
            (Value::Boolean(left), Value::Boolean(right)) => calc_boolean(op, *left, *right),
            (Value::Null, Value::Null) => match op {
                TokenKind::Eq => Ok(Value::Boolean(true)),
                TokenKind::Neq => Ok(Value::Boolean(false)),
                _ => Err(unsupported(op, self)),
            },
            (left, right) if left.type_name() != right.type_name() => {
                Err(RuntimeError::OperandMismatch {
                    op: op.literal(),
                    left: left.type_name().to_string(),
                    right: right.type_name().to_string(),
                })
            }
            _ => Err(unsupported(op, self)),
        }
    }

    /// Prefix operator dispatch: `-` on integers, `!` on anything.
    pub fn prefix(&self, op: &TokenKind) -> Result<Value, RuntimeError> {
        match op {
            TokenKind::Minus => Ok(Value::Integer(self.as_int()?.wrapping_neg())),
            TokenKind::Not => Ok(Value::Boolean(!self.is_truthy())),
            _ => Err(unsupported(op, self)),
        }
    }

    /// Member dispatch keyed on `(receiver type, member name)`.
    pub fn call_member(&self, member: &str, args: &[Value]) -> Result<Value, RuntimeError> {
        match (self, member) {
            (Value::Array(items), "len") => {
                expect_member_args(member, 0, args)?;
                Ok(Value::Integer(items.len() as i64))
            }
            (Value::Array(items), "first") => {
                expect_member_args(member, 0, args)?;
                Ok(items.first().cloned().unwrap_or(Value::Null))
            }
            (Value::Array(items), "last") => {
                expect_member_args(member, 0, args)?;
                Ok(items.last().cloned().unwrap_or(Value::Null))
            }
            (Value::Array(items), "index") => {
                expect_member_args(member, 1, args)?;
                let index = args[0].as_int()?;
                usize::try_from(index)
                    .ok()
                    .and_then(|i| items.get(i))
                    .cloned()
                    .ok_or(RuntimeError::IndexOutOfBounds {
                        index,
                        len: items.len(),
                    })
            }
            (Value::Str(value), "len") => {
                expect_member_args(member, 0, args)?;
                Ok(Value::Integer(value.chars().count() as i64))
            }
            (Value::Str(value), "index") => {
                expect_member_args(member, 1, args)?;
                let index = args[0].as_int()?;
                usize::try_from(index)
                    .ok()
                    .and_then(|i| value.chars().nth(i))
                    .map(|c| Value::Str(c.to_string()))
                    .ok_or(RuntimeError::IndexOutOfBounds {
                        index,
                        len: value.chars().count(),
                    })
            }
            (Value::Hash(pairs), "len") => {
                expect_member_args(member, 0, args)?;
                Ok(Value::Integer(pairs.len() as i64))
            }
            (Value::Hash(pairs), "keys") => {
                expect_member_args(member, 0, args)?;
                let mut keys: Vec<Value> = pairs.keys().map(HashKey::to_value).collect();
                keys.sort_by_key(ToString::to_string);
                Ok(Value::Array(keys))
            }
            (Value::Hash(pairs), "index") => {
                expect_member_args(member, 1, args)?;
                let key = HashKey::try_from_value(&args[0])?;
                pairs
                    .get(&key)
                    .cloned()
                    .ok_or(RuntimeError::KeyNotFound {
                        key: key.to_string(),
                    })
            }
            (Value::State(state), "quit") => {
                expect_member_args(member, 0, args)?;
                Ok(Value::Boolean(state.quit))
            }
            _ => Err(RuntimeError::UnknownMember {
                member: member.to_string(),
                type_name: self.type_name().to_string(),
            }),
        }
    }

    /// Invokes a callable value. Compiled functions are only callable
    /// through VM frames, so they are rejected here.
    pub fn call(&self, args: &[Value]) -> Result<Value, RuntimeError> {
        match self {
            Value::Builtin(builtin) => (builtin.func)(args),
            Value::Closure(closure) => crate::interpreter::call_closure(closure, args),
            other => Err(RuntimeError::NotCallable {
                type_name: other.type_name().to_string(),
            }),
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Builtin(_) | Value::Closure(_) | Value::ByteFunc(_))
    }
}

fn unsupported(op: &TokenKind, value: &Value) -> RuntimeError {
    RuntimeError::UnsupportedOperator {
        op: op.literal(),
        type_name: value.type_name().to_string(),
    }
}

/// Integer arithmetic wraps on overflow; `/` and `%` by zero are errors.
fn calc_integer(op: &TokenKind, left: i64, right: i64) -> Result<Value, RuntimeError> {
    let value = match op {
        TokenKind::Plus => Value::Integer(left.wrapping_add(right)),
        TokenKind::Minus => Value::Integer(left.wrapping_sub(right)),
        TokenKind::Star => Value::Integer(left.wrapping_mul(right)),
        TokenKind::Slash => {
            if right == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            Value::Integer(left.wrapping_div(right))
        }
        TokenKind::Percent => {
            if right == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            Value::Integer(left.wrapping_rem(right))
        }
        TokenKind::Eq => Value::Boolean(left == right),
        TokenKind::Neq => Value::Boolean(left != right),
        TokenKind::Lt => Value::Boolean(left < right),
        TokenKind::Gt => Value::Boolean(left > right),
        TokenKind::Leq => Value::Boolean(left <= right),
        TokenKind::Geq => Value::Boolean(left >= right),
        _ => return Err(unsupported(op, &Value::Integer(left))),
    };
    Ok(value)
}

fn calc_string(op: &TokenKind, left: &str, right: &str) -> Result<Value, RuntimeError> {
    let value = match op {
        TokenKind::Plus => Value::Str(format!("{left}{right}")),
        TokenKind::Eq => Value::Boolean(left == right),
        TokenKind::Neq => Value::Boolean(left != right),
        _ => return Err(unsupported(op, &Value::Str(left.to_string()))),
    };
    Ok(value)
}

/// Booleans order as `false < true`.
fn calc_boolean(op: &TokenKind, left: bool, right: bool) -> Result<Value, RuntimeError> {
    let value = match op {
        TokenKind::Eq => left == right,
        TokenKind::Neq => left != right,
        TokenKind::Lt => !left & right,
        TokenKind::Gt => left & !right,
        TokenKind::Leq => left <= right,
        TokenKind::Geq => left >= right,
        _ => return Err(unsupported(op, &Value::Boolean(left))),
    };
    Ok(Value::Boolean(value))
}

fn expect_member_args(member: &str, expected: usize, args: &[Value]) -> Result<(), RuntimeError> {
    if args.len() != expected {
        return Err(RuntimeError::MemberArityMismatch {
            member: member.to_string(),
            expected,
            found: args.len(),
        });
    }
    Ok(())
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(left), Value::Integer(right)) => left == right,
            (Value::Boolean(left), Value::Boolean(right)) => left == right,
            (Value::Str(left), Value::Str(right)) => left == right,
            (Value::Array(left), Value::Array(right)) => left == right,
            (Value::Hash(left), Value::Hash(right)) => left == right,
            (Value::Closure(left), Value::Closure(right)) => Rc::ptr_eq(left, right),
            (Value::ByteFunc(left), Value::ByteFunc(right)) => left == right,
            (Value::Builtin(left), Value::Builtin(right)) => left.name == right.name,
            (Value::State(left), Value::State(right)) => left == right,
            (Value::Null, Value::Null) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(value) => write!(f, "{value}"),
            Value::Boolean(value) => write!(f, "{value}"),
            Value::Str(value) => write!(f, "{value}"),
            Value::Array(items) => {
                let rendered = items
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "[{rendered}]")
            }
            Value::Hash(pairs) => {
                // Render sorted by key so output is stable.
                let mut rendered: Vec<(String, String)> = pairs
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.to_string()))
                    .collect();
                rendered.sort();
                let body = rendered
                    .iter()
                    .map(|(key, value)| format!("{key}: {value}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{{{body}}}")
            }
            Value::Closure(closure) => write!(f, "{}", closure.func),
            Value::ByteFunc(_) => write!(f, "<compiled function>"),
            Value::Builtin(builtin) => write!(f, "<built-in function {}>", builtin.name),
            Value::State(state) => write!(f, "state({})", state.quit),
            Value::Null => write!(f, "null"),
        }
    }
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Builtin({})", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arithmetic_and_comparisons() {
        let cases = [
            (TokenKind::Plus, 6, 2, Value::Integer(8)),
            (TokenKind::Minus, 6, 2, Value::Integer(4)),
            (TokenKind::Star, 6, 2, Value::Integer(12)),
            (TokenKind::Slash, 6, 2, Value::Integer(3)),
            (TokenKind::Percent, 7, 2, Value::Integer(1)),
            (TokenKind::Eq, 1, 1, Value::Boolean(true)),
            (TokenKind::Neq, 1, 1, Value::Boolean(false)),
            (TokenKind::Lt, 1, 2, Value::Boolean(true)),
            (TokenKind::Gt, 1, 2, Value::Boolean(false)),
            (TokenKind::Leq, 2, 2, Value::Boolean(true)),
            (TokenKind::Geq, 1, 2, Value::Boolean(false)),
        ];
        for (op, left, right, want) in cases {
            let got = Value::Integer(left)
                .calc(&op, &Value::Integer(right))
                .expect("calc should succeed");
            assert_eq!(got, want, "{left} {} {right}", op.literal());
        }
    }

    #[test]
    fn integer_arithmetic_wraps_on_overflow() {
        let got = Value::Integer(i64::MAX)
            .calc(&TokenKind::Plus, &Value::Integer(1))
            .expect("calc should succeed");
        assert_eq!(got, Value::Integer(i64::MIN));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let err = Value::Integer(1)
            .calc(&TokenKind::Slash, &Value::Integer(0))
            .expect_err("division by zero should fail");
        assert_eq!(err, RuntimeError::DivisionByZero);
        let err = Value::Integer(1)
            .calc(&TokenKind::Percent, &Value::Integer(0))
            .expect_err("modulo by zero should fail");
        assert_eq!(err, RuntimeError::DivisionByZero);
    }

    #[test]
    fn and_or_yield_operands() {
        let one = Value::Integer(1);
        let two = Value::Integer(2);
        let zero = Value::Integer(0);
        assert_eq!(one.calc(&TokenKind::And, &two).expect("calc"), two);
        assert_eq!(zero.calc(&TokenKind::And, &two).expect("calc"), zero);
        assert_eq!(one.calc(&TokenKind::Or, &two).expect("calc"), one);
        assert_eq!(zero.calc(&TokenKind::Or, &two).expect("calc"), two);
    }

    #[test]
    fn string_concat_and_equality() {
        let hello = Value::Str("hello ".to_string());
        let world = Value::Str("world".to_string());
        assert_eq!(
            hello.calc(&TokenKind::Plus, &world).expect("calc"),
            Value::Str("hello world".to_string())
        );
        assert_eq!(
            world.calc(&TokenKind::Eq, &world).expect("calc"),
            Value::Boolean(true)
        );
        let err = hello
            .calc(&TokenKind::Star, &world)
            .expect_err("expected unsupported operator");
        assert!(matches!(err, RuntimeError::UnsupportedOperator { .. }));
    }

    #[test]
    fn mismatched_operand_types_are_errors() {
        let err = Value::Integer(1)
            .calc(&TokenKind::Plus, &Value::Str("x".to_string()))
            .expect_err("expected mismatch");
        assert!(matches!(err, RuntimeError::OperandMismatch { .. }));
    }

    #[test]
    fn prefix_operators() {
        assert_eq!(
            Value::Integer(1).prefix(&TokenKind::Minus).expect("prefix"),
            Value::Integer(-1)
        );
        assert_eq!(
            Value::Boolean(true).prefix(&TokenKind::Not).expect("prefix"),
            Value::Boolean(false)
        );
        assert_eq!(
            Value::Null.prefix(&TokenKind::Not).expect("prefix"),
            Value::Boolean(true)
        );
        let err = Value::Str("x".to_string())
            .prefix(&TokenKind::Minus)
            .expect_err("expected failure");
        assert!(matches!(err, RuntimeError::ExpectedInteger { .. }));
    }

    #[test]
    fn array_members() {
        let arr = Value::Array(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]);
        assert_eq!(arr.call_member("len", &[]).expect("len"), Value::Integer(3));
        assert_eq!(arr.call_member("first", &[]).expect("first"), Value::Integer(1));
        assert_eq!(arr.call_member("last", &[]).expect("last"), Value::Integer(3));
        assert_eq!(
            arr.call_member("index", &[Value::Integer(1)]).expect("index"),
            Value::Integer(2)
        );
        let err = arr
            .call_member("index", &[Value::Integer(9)])
            .expect_err("out of bounds");
        assert_eq!(err, RuntimeError::IndexOutOfBounds { index: 9, len: 3 });
        assert_eq!(
            Value::Array(vec![]).call_member("first", &[]).expect("first"),
            Value::Null
        );
    }

    #[test]
    fn hash_members() {
        let mut pairs = HashMap::new();
        pairs.insert(HashKey::Str("a".to_string()), Value::Integer(1));
        pairs.insert(HashKey::Integer(2), Value::Integer(2));
        let hash = Value::Hash(pairs);
        assert_eq!(hash.call_member("len", &[]).expect("len"), Value::Integer(2));
        assert_eq!(
            hash.call_member("index", &[Value::Str("a".to_string())])
                .expect("index"),
            Value::Integer(1)
        );
        let err = hash
            .call_member("index", &[Value::Str("missing".to_string())])
            .expect_err("missing key");
        assert_eq!(
            err,
            RuntimeError::KeyNotFound {
                key: "missing".to_string()
            }
        );
        let err = hash
            .call_member("index", &[Value::Null])
            .expect_err("unhashable key");
        assert!(matches!(err, RuntimeError::NotHashable { .. }));
    }

    #[test]
    fn unknown_member_is_an_error() {
        let err = Value::Integer(1)
            .call_member("len", &[])
            .expect_err("expected unknown member");
        assert_eq!(
            err,
            RuntimeError::UnknownMember {
                member: "len".to_string(),
                type_name: "integer".to_string()
            }
        );
    }

    #[test]
    fn calling_a_non_callable_fails() {
        let err = Value::Integer(1).call(&[]).expect_err("expected not callable");
        assert_eq!(
            err,
            RuntimeError::NotCallable {
                type_name: "integer".to_string()
            }
        );
    }

    #[test]
    fn truthiness_matches_both_backends() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(!Value::Integer(0).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(!Value::Array(vec![]).is_truthy());
        assert!(Value::Integer(-1).is_truthy());
        assert!(Value::Str("x".to_string()).is_truthy());
    }
}
