//! Native functions exposed to scripts.
//!
//! The table is ordered so the compiler backend can reference builtins by
//! position; the tree-walker looks them up by name as an environment
//! fallback.

use crate::ast::{Expression, encode};
use crate::runtime::{Builtin, HashKey, RuntimeError, State, Value};

static BUILTINS: &[Builtin] = &[
    Builtin { name: "type", func: builtin_type },
    Builtin { name: "str", func: builtin_str },
    Builtin { name: "print", func: builtin_print },
    Builtin { name: "println", func: builtin_println },
    Builtin { name: "printf", func: builtin_printf },
    Builtin { name: "sprintf", func: builtin_sprintf },
    Builtin { name: "loads", func: builtin_loads },
    Builtin { name: "dumps", func: builtin_dumps },
    Builtin { name: "state", func: builtin_state },
];

pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|builtin| builtin.name == name)
}

pub fn resolve(index: usize) -> Option<&'static Builtin> {
    BUILTINS.get(index)
}

/// Registry order, used to seed the compiler's root symbol table and the
/// VM's globals with matching slots.
pub fn names() -> impl Iterator<Item = &'static str> {
    BUILTINS.iter().map(|builtin| builtin.name)
}

fn expect_one(name: &'static str, args: &[Value]) -> Result<(), RuntimeError> {
    if args.len() != 1 {
        return Err(RuntimeError::BuiltinArityMismatch {
            name,
            expected: "exactly one argument",
            found: args.len(),
        });
    }
    Ok(())
}

fn builtin_type(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_one("type", args)?;
    Ok(Value::Str(args[0].type_name().to_string()))
}

fn builtin_str(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_one("str", args)?;
    Ok(Value::Str(args[0].to_string()))
}

fn render(args: &[Value]) -> String {
    args.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

fn builtin_print(args: &[Value]) -> Result<Value, RuntimeError> {
    print!("{}", render(args));
    Ok(Value::Null)
}

fn builtin_println(args: &[Value]) -> Result<Value, RuntimeError> {
    println!("{}", render(args));
    Ok(Value::Null)
}

/// Substitutes `%v` with the next argument's string form; `%%` is a
/// literal percent. Surplus or missing arguments are errors.
fn format_args(name: &'static str, args: &[Value]) -> Result<String, RuntimeError> {
    if args.len() < 2 {
        return Err(RuntimeError::BuiltinArityMismatch {
            name,
            expected: "at least 2 arguments",
            found: args.len(),
        });
    }
    let Value::Str(format) = &args[0] else {
        return Err(RuntimeError::InvalidArgument {
            operation: name.to_string(),
            expected: "string format".to_string(),
            got: args[0].type_name().to_string(),
        });
    };

    let mut out = String::with_capacity(format.len());
    let mut rest = args[1..].iter();
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('v') => match rest.next() {
                Some(value) => out.push_str(&value.to_string()),
                None => {
                    return Err(RuntimeError::BuiltinFailed {
                        name,
                        message: "not enough arguments for format".to_string(),
                    });
                }
            },
            Some('%') => out.push('%'),
            other => {
                return Err(RuntimeError::BuiltinFailed {
                    name,
                    message: format!(
                        "unsupported format verb '%{}'",
                        other.map(String::from).unwrap_or_default()
                    ),
                });
            }
        }
    }
    if rest.next().is_some() {
        return Err(RuntimeError::BuiltinFailed {
            name,
            message: "too many arguments for format".to_string(),
        });
    }
    Ok(out)
}

fn builtin_printf(args: &[Value]) -> Result<Value, RuntimeError> {
    print!("{}", format_args("printf", args)?);
    Ok(Value::Null)
}

fn builtin_sprintf(args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Str(format_args("sprintf", args)?))
}

/// Decodes a serialized tagged tree and evaluates it in a fresh
/// environment.
fn builtin_loads(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_one("loads", args)?;
    let Value::Str(data) = &args[0] else {
        return Err(RuntimeError::InvalidArgument {
            operation: "loads".to_string(),
            expected: "string".to_string(),
            got: args[0].type_name().to_string(),
        });
    };
    let program = encode::from_json_str(data).map_err(|err| RuntimeError::BuiltinFailed {
        name: "loads",
        message: err.to_string(),
    })?;
    crate::interpreter::eval_program(&program, &crate::runtime::Env::new()).map_err(|err| {
        RuntimeError::BuiltinFailed {
            name: "loads",
            message: err.to_string(),
        }
    })
}

/// Encodes a data value as the tagged tree of its literal expression, the
/// inverse of `loads` over data values.
fn builtin_dumps(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_one("dumps", args)?;
    let literal = value_to_literal(&args[0])?;
    let rendered =
        serde_json::to_string(&encode::encode_expr(&literal)).map_err(|err| {
            RuntimeError::BuiltinFailed {
                name: "dumps",
                message: err.to_string(),
            }
        })?;
    Ok(Value::Str(rendered))
}

fn builtin_state(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_one("state", args)?;
    match &args[0] {
        Value::Boolean(quit) => Ok(Value::State(State { quit: *quit })),
        other => Err(RuntimeError::InvalidArgument {
            operation: "state".to_string(),
            expected: "boolean".to_string(),
            got: other.type_name().to_string(),
        }),
    }
}

fn value_to_literal(value: &Value) -> Result<Expression, RuntimeError> {
    match value {
        Value::Integer(v) => Ok(Expression::Integer(*v)),
        Value::Boolean(v) => Ok(Expression::Boolean(*v)),
        Value::Str(v) => Ok(Expression::Str(v.clone())),
        Value::Null => Ok(Expression::Null),
        Value::Array(items) => Ok(Expression::Array(
            items.iter().map(value_to_literal).collect::<Result<_, _>>()?,
        )),
        Value::Hash(pairs) => {
            // Stable output: order pairs by key stringification.
            let mut keys: Vec<&HashKey> = pairs.keys().collect();
            keys.sort_by_key(|key| key.to_string());
            let pairs = keys
                .into_iter()
                .map(|key| {
                    Ok((
                        value_to_literal(&key.to_value())?,
                        value_to_literal(&pairs[key])?,
                    ))
                })
                .collect::<Result<Vec<_>, RuntimeError>>()?;
            Ok(Expression::Hash(pairs))
        }
        other => Err(RuntimeError::BuiltinFailed {
            name: "dumps",
            message: format!("cannot serialize {}", other.type_name()),
        }),
    }
}

/// Seeds a tree-walker style name→builtin map, used by tests.
#[cfg(test)]
pub fn registry() -> std::collections::HashMap<String, Value> {
    BUILTINS
        .iter()
        .map(|builtin| (builtin.name.to_string(), Value::Builtin(builtin)))
        .collect()
}
