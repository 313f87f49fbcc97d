//! Tagged-tree serialization of the AST.
//!
//! Every node encodes as `{"type": tag, "value": payload}` where the tag
//! belongs to a closed set and the payload is recursively a tagged tree, a
//! primitive, or an aggregate of tagged trees. `decode_*` is the exact
//! inverse and fails on unknown tags or malformed payloads.

use anyhow::{Context, Result, anyhow, bail};
use serde_json::{Value as Json, json};
use std::rc::Rc;

use crate::ast::{BlockStmt, Expression, FunctionLit, Program, Statement};
use crate::token::TokenKind;

const KEY_TYPE: &str = "type";
const KEY_VALUE: &str = "value";

const TYPE_PROGRAM: &str = "Program";
const TYPE_STMT_BLOCK: &str = "StmtBlock";
const TYPE_STMT_CONST: &str = "StmtConst";
const TYPE_STMT_EXPR: &str = "StmtExpr";
const TYPE_STMT_FUNCTION: &str = "StmtFunction";
const TYPE_EXPR_ARRAY: &str = "ExprArray";
const TYPE_EXPR_HASH: &str = "ExprHash";
const TYPE_EXPR_INDEX: &str = "ExprIndex";
const TYPE_EXPR_INFIX: &str = "ExprInfix";
const TYPE_EXPR_PREFIX: &str = "ExprPrefix";
const TYPE_EXPR_CONDITIONAL: &str = "ExprConditional";
const TYPE_EXPR_IDENT: &str = "ExprIdent";
const TYPE_EXPR_INTEGER: &str = "ExprInteger";
const TYPE_EXPR_BOOLEAN: &str = "ExprBoolean";
const TYPE_EXPR_STRING: &str = "ExprString";
const TYPE_EXPR_NULL: &str = "ExprNull";
const TYPE_EXPR_CALL: &str = "ExprCall";
const TYPE_EXPR_CALL_MEMBER: &str = "ExprCallMember";
const TYPE_EXPR_OBJECT_MEMBER: &str = "ExprObjectMember";
const TYPE_EXPR_FUNCTION: &str = "ExprFunction";
const TYPE_EXPR_LOOP: &str = "ExprLoop";

fn tagged(tag: &str, value: Json) -> Json {
    json!({ "type": tag, "value": value })
}

fn encode_ident(name: &str) -> Json {
    tagged(TYPE_EXPR_IDENT, json!(name))
}

pub fn encode_program(program: &Program) -> Json {
    let stmts: Vec<Json> = program.stmts.iter().map(encode_stmt).collect();
    tagged(TYPE_PROGRAM, Json::Array(stmts))
}

fn encode_block(block: &BlockStmt) -> Json {
    let stmts: Vec<Json> = block.stmts.iter().map(encode_stmt).collect();
    tagged(TYPE_STMT_BLOCK, Json::Array(stmts))
}

pub fn encode_stmt(stmt: &Statement) -> Json {
    match stmt {
        Statement::Block(block) => encode_block(block),
        Statement::Const { name, value } => tagged(
            TYPE_STMT_CONST,
            json!({ "name": encode_ident(name), "value": encode_expr(value) }),
        ),
        Statement::Function { name, value } => tagged(
            TYPE_STMT_FUNCTION,
            json!({ "name": encode_ident(name), "value": encode_expr(value) }),
        ),
        Statement::Expr(expr) => tagged(TYPE_STMT_EXPR, encode_expr(expr)),
    }
}

pub fn encode_expr(expr: &Expression) -> Json {
    match expr {
        Expression::Integer(value) => tagged(TYPE_EXPR_INTEGER, json!(value)),
        Expression::Boolean(value) => tagged(TYPE_EXPR_BOOLEAN, json!(value)),
        Expression::Str(value) => tagged(TYPE_EXPR_STRING, json!(value)),
        Expression::Null => tagged(TYPE_EXPR_NULL, Json::Null),
        Expression::Ident(name) => encode_ident(name),
        Expression::Array(items) => {
            let items: Vec<Json> = items.iter().map(encode_expr).collect();
            tagged(TYPE_EXPR_ARRAY, Json::Array(items))
        }
        Expression::Hash(pairs) => {
            // Pairs keep source order; only bytecode emission sorts keys.
            let pairs: Vec<Json> = pairs
                .iter()
                .map(|(key, value)| {
                    json!({ "key": encode_expr(key), "value": encode_expr(value) })
                })
                .collect();
            tagged(TYPE_EXPR_HASH, Json::Array(pairs))
        }
        Expression::Prefix { op, right } => tagged(
            TYPE_EXPR_PREFIX,
            json!({ "op": op.literal(), "right": encode_expr(right) }),
        ),
        Expression::Infix { left, op, right } => tagged(
            TYPE_EXPR_INFIX,
            json!({
                "left": encode_expr(left),
                "op": op.literal(),
                "right": encode_expr(right),
            }),
        ),
        Expression::Conditional { cond, yes, no } => tagged(
            TYPE_EXPR_CONDITIONAL,
            json!({
                "cond": encode_expr(cond),
                "yes": encode_expr(yes),
                "no": encode_expr(no),
            }),
        ),
        Expression::Index { left, index } => tagged(
            TYPE_EXPR_INDEX,
            json!({ "left": encode_expr(left), "index": encode_expr(index) }),
        ),
        Expression::ObjectMember { left, member } => tagged(
            TYPE_EXPR_OBJECT_MEMBER,
            json!({ "left": encode_expr(left), "member": encode_ident(member) }),
        ),
        Expression::Call { func, args } => {
            let args: Vec<Json> = args.iter().map(encode_expr).collect();
            tagged(
                TYPE_EXPR_CALL,
                json!({ "func": encode_expr(func), "args": args }),
            )
        }
        Expression::CallMember { left, member, args } => {
            let args: Vec<Json> = args.iter().map(encode_expr).collect();
            tagged(
                TYPE_EXPR_CALL_MEMBER,
                json!({
                    "left": encode_expr(left),
                    "member": encode_ident(member),
                    "args": args,
                }),
            )
        }
        Expression::Function(function) => {
            let params: Vec<Json> = function
                .params
                .iter()
                .map(|param| encode_ident(param))
                .collect();
            tagged(
                TYPE_EXPR_FUNCTION,
                json!({
                    "name": function.name,
                    "params": params,
                    "body": encode_block(&function.body),
                }),
            )
        }
        Expression::Loop { cnt, body } => tagged(
            TYPE_EXPR_LOOP,
            json!({ "cnt": encode_expr(cnt), "body": encode_expr(body) }),
        ),
    }
}

fn node_tag(node: &Json) -> Result<&str> {
    node.get(KEY_TYPE)
        .and_then(Json::as_str)
        .ok_or_else(|| anyhow!("missing type tag in {node}"))
}

fn node_value<'a>(node: &'a Json, tag: &str) -> Result<&'a Json> {
    node.get(KEY_VALUE)
        .with_context(|| format!("missing value for {tag}"))
}

fn field<'a>(payload: &'a Json, tag: &str, name: &str) -> Result<&'a Json> {
    payload
        .get(name)
        .with_context(|| format!("missing field '{name}' in {tag}"))
}

fn string_field(payload: &Json, tag: &str, name: &str) -> Result<String> {
    field(payload, tag, name)?
        .as_str()
        .map(str::to_string)
        .with_context(|| format!("field '{name}' in {tag} is not a string"))
}

fn array_value<'a>(value: &'a Json, tag: &str) -> Result<&'a Vec<Json>> {
    value
        .as_array()
        .with_context(|| format!("value of {tag} is not an array"))
}

fn decode_ident(node: &Json) -> Result<String> {
    let tag = node_tag(node)?;
    if tag != TYPE_EXPR_IDENT {
        bail!("not an identifier: {tag}");
    }
    node_value(node, tag)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("identifier value is not a string"))
}

fn decode_stmts(value: &Json, tag: &str) -> Result<Vec<Statement>> {
    array_value(value, tag)?.iter().map(decode_stmt).collect()
}

fn decode_exprs(value: &Json, tag: &str) -> Result<Vec<Expression>> {
    array_value(value, tag)?.iter().map(decode_expr).collect()
}

fn decode_block(node: &Json) -> Result<BlockStmt> {
    let tag = node_tag(node)?;
    if tag != TYPE_STMT_BLOCK {
        bail!("not a block statement: {tag}");
    }
    Ok(BlockStmt {
        stmts: decode_stmts(node_value(node, tag)?, tag)?,
    })
}

pub fn decode_program(node: &Json) -> Result<Program> {
    let tag = node_tag(node)?;
    if tag != TYPE_PROGRAM {
        bail!("not a program: {tag}");
    }
    Ok(Program {
        stmts: decode_stmts(node_value(node, tag)?, tag)?,
    })
}

pub fn decode_stmt(node: &Json) -> Result<Statement> {
    let tag = node_tag(node)?;
    let value = node_value(node, tag)?;
    match tag {
        TYPE_STMT_BLOCK => Ok(Statement::Block(BlockStmt {
            stmts: decode_stmts(value, tag)?,
        })),
        TYPE_STMT_CONST => Ok(Statement::Const {
            name: decode_ident(field(value, tag, "name")?)?,
            value: decode_expr(field(value, tag, "value")?)?,
        }),
        TYPE_STMT_FUNCTION => Ok(Statement::Function {
            name: decode_ident(field(value, tag, "name")?)?,
            value: decode_expr(field(value, tag, "value")?)?,
        }),
        TYPE_STMT_EXPR => Ok(Statement::Expr(decode_expr(value)?)),
        _ => bail!("unknown statement type: {tag}"),
    }
}

pub fn decode_expr(node: &Json) -> Result<Expression> {
    let tag = node_tag(node)?;
    let value = node_value(node, tag)?;
    match tag {
        TYPE_EXPR_INTEGER => value
            .as_i64()
            .map(Expression::Integer)
            .ok_or_else(|| anyhow!("integer value is not an i64: {value}")),
        TYPE_EXPR_BOOLEAN => value
            .as_bool()
            .map(Expression::Boolean)
            .ok_or_else(|| anyhow!("boolean value is not a bool: {value}")),
        TYPE_EXPR_STRING => value
            .as_str()
            .map(|s| Expression::Str(s.to_string()))
            .ok_or_else(|| anyhow!("string value is not a string: {value}")),
        TYPE_EXPR_NULL => Ok(Expression::Null),
        TYPE_EXPR_IDENT => Ok(Expression::Ident(decode_ident(node)?)),
        TYPE_EXPR_ARRAY => Ok(Expression::Array(decode_exprs(value, tag)?)),
        TYPE_EXPR_HASH => {
            let pairs = array_value(value, tag)?
                .iter()
                .map(|pair| {
                    Ok((
                        decode_expr(field(pair, tag, "key")?)?,
                        decode_expr(field(pair, tag, "value")?)?,
                    ))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Expression::Hash(pairs))
        }
        TYPE_EXPR_PREFIX => {
            let op = string_field(value, tag, "op")?;
            let op = TokenKind::from_prefix_literal(&op)
                .ok_or_else(|| anyhow!("unknown prefix op: {op}"))?;
            Ok(Expression::Prefix {
                op,
                right: Box::new(decode_expr(field(value, tag, "right")?)?),
            })
        }
        TYPE_EXPR_INFIX => {
            let op = string_field(value, tag, "op")?;
            let op = TokenKind::from_infix_literal(&op)
                .ok_or_else(|| anyhow!("unknown infix op: {op}"))?;
            Ok(Expression::Infix {
                left: Box::new(decode_expr(field(value, tag, "left")?)?),
                op,
                right: Box::new(decode_expr(field(value, tag, "right")?)?),
            })
        }
        TYPE_EXPR_CONDITIONAL => Ok(Expression::Conditional {
            cond: Box::new(decode_expr(field(value, tag, "cond")?)?),
            yes: Box::new(decode_expr(field(value, tag, "yes")?)?),
            no: Box::new(decode_expr(field(value, tag, "no")?)?),
        }),
        TYPE_EXPR_INDEX => Ok(Expression::Index {
            left: Box::new(decode_expr(field(value, tag, "left")?)?),
            index: Box::new(decode_expr(field(value, tag, "index")?)?),
        }),
        TYPE_EXPR_OBJECT_MEMBER => Ok(Expression::ObjectMember {
            left: Box::new(decode_expr(field(value, tag, "left")?)?),
            member: decode_ident(field(value, tag, "member")?)?,
        }),
        TYPE_EXPR_CALL => Ok(Expression::Call {
            func: Box::new(decode_expr(field(value, tag, "func")?)?),
            args: decode_exprs(field(value, tag, "args")?, tag)?,
        }),
        TYPE_EXPR_CALL_MEMBER => Ok(Expression::CallMember {
            left: Box::new(decode_expr(field(value, tag, "left")?)?),
            member: decode_ident(field(value, tag, "member")?)?,
            args: decode_exprs(field(value, tag, "args")?, tag)?,
        }),
        TYPE_EXPR_FUNCTION => {
            let params = array_value(field(value, tag, "params")?, tag)?
                .iter()
                .map(decode_ident)
                .collect::<Result<Vec<_>>>()?;
            Ok(Expression::Function(Rc::new(FunctionLit {
                name: string_field(value, tag, "name")?,
                params,
                body: decode_block(field(value, tag, "body")?)?,
            })))
        }
        TYPE_EXPR_LOOP => Ok(Expression::Loop {
            cnt: Box::new(decode_expr(field(value, tag, "cnt")?)?),
            body: Box::new(decode_expr(field(value, tag, "body")?)?),
        }),
        _ => bail!("unknown expr type: {tag}"),
    }
}

/// Decodes any node kind into a runnable program: bare statements and
/// expressions are wrapped in a single-statement program.
pub fn decode_any(node: &Json) -> Result<Program> {
    match node_tag(node)? {
        TYPE_PROGRAM => decode_program(node),
        TYPE_STMT_BLOCK | TYPE_STMT_CONST | TYPE_STMT_EXPR | TYPE_STMT_FUNCTION => Ok(Program {
            stmts: vec![decode_stmt(node)?],
        }),
        _ => Ok(Program {
            stmts: vec![Statement::Expr(decode_expr(node)?)],
        }),
    }
}

pub fn to_json_string(program: &Program) -> Result<String> {
    serde_json::to_string(&encode_program(program)).context("serializing program")
}

pub fn from_json_str(data: &str) -> Result<Program> {
    let root: Json = serde_json::from_str(data).context("parsing serialized tree")?;
    decode_any(&root)
}
