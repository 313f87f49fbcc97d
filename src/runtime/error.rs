use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Unsupported operator '{op}' for type {type_name}")]
    UnsupportedOperator { op: String, type_name: String },
    #[error("Type mismatch for operator '{op}': {left} vs {right}")]
    OperandMismatch {
        op: String,
        left: String,
        right: String,
    },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Unknown member '{member}' for type {type_name}")]
    UnknownMember { member: String, type_name: String },
    #[error("Member '{member}' expected {expected} arguments, got {found}")]
    MemberArityMismatch {
        member: String,
        expected: usize,
        found: usize,
    },
    #[error("Object of type {type_name} is not callable")]
    NotCallable { type_name: String },
    #[error("Function expected {expected} arguments, got {found}")]
    ArityMismatch { expected: usize, found: usize },
    #[error("{name}() takes {expected} ({found} given)")]
    BuiltinArityMismatch {
        name: &'static str,
        expected: &'static str,
        found: usize,
    },
    #[error("{name}: {message}")]
    BuiltinFailed { name: &'static str, message: String },
    #[error("Invalid argument for {operation}: expected {expected}, got {got}")]
    InvalidArgument {
        operation: String,
        expected: String,
        got: String,
    },
    #[error("Identifier not found: {name}")]
    UndefinedIdentifier { name: String },
    #[error("Identifier already defined: {name}")]
    AlreadyDefined { name: String },
    #[error("Array index out of bounds: index {index}, len {len}")]
    IndexOutOfBounds { index: i64, len: usize },
    #[error("Key not found: {key}")]
    KeyNotFound { key: String },
    #[error("Type {type_name} is not hashable")]
    NotHashable { type_name: String },
    #[error("Expected integer, got {type_name}")]
    ExpectedInteger { type_name: String },
    #[error("Expected loop state, got {type_name}")]
    ExpectedState { type_name: String },
}
