//! Token model shared by the lexer, parser and the operator→opcode tables.

/// Byte offset into the source text.
pub type Pos = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Str(String),

    // Keywords
    Const,
    Func,
    True,
    False,
    Null,
    Loop,

    // Operators
    Assign,   // =
    Plus,     // +
    Minus,    // -
    Star,     // *
    Slash,    // /
    Percent,  // %
    Eq,       // ==
    Neq,      // !=
    Lt,       // <
    Gt,       // >
    Leq,      // <=
    Geq,      // >=
    And,      // &&
    Or,       // ||
    Not,      // !
    Question, // ?

    // Delimiters
    Colon,
    Comma,
    Semicolon,
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    Eof,
}

impl TokenKind {
    /// Keyword lookup for identifier-shaped lexemes.
    pub fn lookup_ident(literal: &str) -> TokenKind {
        match literal {
            "const" => TokenKind::Const,
            "func" => TokenKind::Func,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            "loop" => TokenKind::Loop,
            _ => TokenKind::Ident(literal.to_string()),
        }
    }

    /// The literal form written back out by `Display` on AST nodes and the
    /// tagged-tree encoder.
    pub fn literal(&self) -> String {
        let fixed = match self {
            TokenKind::Ident(name) => return name.clone(),
            TokenKind::Int(value) => return value.to_string(),
            TokenKind::Str(value) => return value.clone(),
            TokenKind::Const => "const",
            TokenKind::Func => "func",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Null => "null",
            TokenKind::Loop => "loop",
            TokenKind::Assign => "=",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Eq => "==",
            TokenKind::Neq => "!=",
            TokenKind::Lt => "<",
            TokenKind::Gt => ">",
            TokenKind::Leq => "<=",
            TokenKind::Geq => ">=",
            TokenKind::And => "&&",
            TokenKind::Or => "||",
            TokenKind::Not => "!",
            TokenKind::Question => "?",
            TokenKind::Colon => ":",
            TokenKind::Comma => ",",
            TokenKind::Semicolon => ";",
            TokenKind::Dot => ".",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Eof => "",
        };
        fixed.to_string()
    }

    /// Inverse of `literal()` for infix operators, used when decoding a
    /// serialized infix node.
    pub fn from_infix_literal(literal: &str) -> Option<TokenKind> {
        let kind = match literal {
            "+" => TokenKind::Plus,
            "-" => TokenKind::Minus,
            "*" => TokenKind::Star,
            "/" => TokenKind::Slash,
            "%" => TokenKind::Percent,
            "==" => TokenKind::Eq,
            "!=" => TokenKind::Neq,
            "<" => TokenKind::Lt,
            ">" => TokenKind::Gt,
            "<=" => TokenKind::Leq,
            ">=" => TokenKind::Geq,
            "&&" => TokenKind::And,
            "||" => TokenKind::Or,
            _ => return None,
        };
        Some(kind)
    }

    /// Inverse of `literal()` for prefix operators.
    pub fn from_prefix_literal(literal: &str) -> Option<TokenKind> {
        match literal {
            "-" => Some(TokenKind::Minus),
            "!" => Some(TokenKind::Not),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Pos,
}

impl Token {
    pub fn new(kind: TokenKind, pos: Pos) -> Self {
        Self { kind, pos }
    }
}
