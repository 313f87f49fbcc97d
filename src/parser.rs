use anyhow::Result;

use crate::ast::{BlockStmt, Expression, FunctionLit, Program, Statement};
use crate::token::{Token, TokenKind};
use std::rc::Rc;

/// Binding power table, lowest first. The ternary is the weakest operator;
/// calls, indexing and member access bind tightest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Ternary,
    Or,
    And,
    Equality,
    Comparison,
    Sum,
    Product,
    Prefix,
    Postfix,
}

fn precedence_of(kind: &TokenKind) -> Precedence {
    match kind {
        TokenKind::Question => Precedence::Ternary,
        TokenKind::Or => Precedence::Or,
        TokenKind::And => Precedence::And,
        TokenKind::Eq | TokenKind::Neq => Precedence::Equality,
        TokenKind::Lt | TokenKind::Gt | TokenKind::Leq | TokenKind::Geq => Precedence::Comparison,
        TokenKind::Plus | TokenKind::Minus => Precedence::Sum,
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Precedence::Product,
        TokenKind::LParen | TokenKind::LBracket | TokenKind::Dot => Precedence::Postfix,
        _ => Precedence::Lowest,
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    current: Token,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.is_empty() {
            tokens.push(Token::new(TokenKind::Eof, 0));
        }
        let current = tokens[0].clone();
        Self {
            tokens,
            pos: 0,
            current,
        }
    }

    pub fn parse_program(mut self) -> Result<Program> {
        let mut stmts = Vec::new();
        while self.current.kind != TokenKind::Eof {
            stmts.push(self.parse_statement()?);
        }
        Ok(Program { stmts })
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        match &self.current.kind {
            TokenKind::Const => self.parse_const(),
            TokenKind::LBrace => Ok(Statement::Block(self.parse_block()?)),
            // `func name(...)` declares; anonymous `func(...)` is an expression.
            TokenKind::Func if matches!(self.peek_kind(), Some(TokenKind::Ident(_))) => {
                self.parse_function_stmt()
            }
            _ => self.parse_expression_stmt(),
        }
    }

    fn parse_const(&mut self) -> Result<Statement> {
        self.expect(TokenKind::Const)?;
        let name = self.expect_identifier()?;
        self.expect(TokenKind::Assign)?;
        let value = self.parse_expression(Precedence::Lowest)?;
        self.expect(TokenKind::Semicolon)?;
        Ok(Statement::Const { name, value })
    }

    fn parse_function_stmt(&mut self) -> Result<Statement> {
        let function = self.parse_function_literal()?;
        let Expression::Function(literal) = &function else {
            return Err(self.error("function literal"));
        };
        let name = literal.name.clone();
        Ok(Statement::Function {
            name,
            value: function,
        })
    }

    fn parse_block(&mut self) -> Result<BlockStmt> {
        self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !matches!(self.current.kind, TokenKind::RBrace | TokenKind::Eof) {
            stmts.push(self.parse_statement()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(BlockStmt { stmts })
    }

    fn parse_expression_stmt(&mut self) -> Result<Statement> {
        let expr = self.parse_expression(Precedence::Lowest)?;
        // Trailing semicolons are optional for expression statements.
        if self.current.kind == TokenKind::Semicolon {
            self.advance();
        }
        Ok(Statement::Expr(expr))
    }

    fn parse_expression(&mut self, precedence: Precedence) -> Result<Expression> {
        let mut left = self.parse_prefix()?;
        while precedence < precedence_of(&self.current.kind) {
            left = self.parse_infix(left)?;
        }
        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expression> {
        match self.current.kind.clone() {
            TokenKind::Int(value) => {
                self.advance();
                Ok(Expression::Integer(value))
            }
            TokenKind::Str(value) => {
                self.advance();
                Ok(Expression::Str(value))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expression::Boolean(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expression::Boolean(false))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expression::Null)
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Expression::Ident(name))
            }
            TokenKind::Minus | TokenKind::Not => {
                let op = self.advance().kind;
                let right = self.parse_expression(Precedence::Prefix)?;
                Ok(Expression::Prefix {
                    op,
                    right: Box::new(right),
                })
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression(Precedence::Lowest)?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::LBracket => self.parse_array(),
            TokenKind::LBrace => self.parse_hash(),
            TokenKind::Func => self.parse_function_literal(),
            TokenKind::Loop => self.parse_loop(),
            _ => Err(self.error("expression")),
        }
    }

    fn parse_infix(&mut self, left: Expression) -> Result<Expression> {
        match self.current.kind {
            TokenKind::Question => self.parse_conditional(left),
            TokenKind::LParen => self.parse_call(left),
            TokenKind::LBracket => self.parse_index(left),
            TokenKind::Dot => self.parse_member(left),
            _ => {
                let precedence = precedence_of(&self.current.kind);
                let op = self.advance().kind;
                let right = self.parse_expression(precedence)?;
                Ok(Expression::Infix {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                })
            }
        }
    }

    fn parse_conditional(&mut self, cond: Expression) -> Result<Expression> {
        self.expect(TokenKind::Question)?;
        let yes = self.parse_expression(Precedence::Lowest)?;
        self.expect(TokenKind::Colon)?;
        // Right-associative: `a ? b : c ? d : e` nests in the no-arm.
        let no = self.parse_expression(Precedence::Lowest)?;
        Ok(Expression::Conditional {
            cond: Box::new(cond),
            yes: Box::new(yes),
            no: Box::new(no),
        })
    }

    fn parse_call(&mut self, func: Expression) -> Result<Expression> {
        let args = self.parse_expression_list(TokenKind::LParen, TokenKind::RParen)?;
        Ok(Expression::Call {
            func: Box::new(func),
            args,
        })
    }

    fn parse_index(&mut self, left: Expression) -> Result<Expression> {
        self.expect(TokenKind::LBracket)?;
        let index = self.parse_expression(Precedence::Lowest)?;
        self.expect(TokenKind::RBracket)?;
        Ok(Expression::Index {
            left: Box::new(left),
            index: Box::new(index),
        })
    }

    fn parse_member(&mut self, left: Expression) -> Result<Expression> {
        self.expect(TokenKind::Dot)?;
        let member = self.expect_identifier()?;
        if self.current.kind == TokenKind::LParen {
            let args = self.parse_expression_list(TokenKind::LParen, TokenKind::RParen)?;
            return Ok(Expression::CallMember {
                left: Box::new(left),
                member,
                args,
            });
        }
        Ok(Expression::ObjectMember {
            left: Box::new(left),
            member,
        })
    }

    fn parse_array(&mut self) -> Result<Expression> {
        let items = self.parse_expression_list(TokenKind::LBracket, TokenKind::RBracket)?;
        Ok(Expression::Array(items))
    }

    fn parse_hash(&mut self) -> Result<Expression> {
        self.expect(TokenKind::LBrace)?;
        let mut pairs = Vec::new();
        while self.current.kind != TokenKind::RBrace {
            let key = self.parse_expression(Precedence::Lowest)?;
            self.expect(TokenKind::Colon)?;
            let value = self.parse_expression(Precedence::Lowest)?;
            pairs.push((key, value));
            if self.current.kind != TokenKind::RBrace {
                self.expect(TokenKind::Comma)?;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Expression::Hash(pairs))
    }

    fn parse_function_literal(&mut self) -> Result<Expression> {
        self.expect(TokenKind::Func)?;
        let name = match &self.current.kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                name
            }
            _ => String::new(),
        };
        let params = self.parse_params()?;
        let body = self.parse_block()?;
        Ok(Expression::Function(Rc::new(FunctionLit {
            name,
            params,
            body,
        })))
    }

    fn parse_params(&mut self) -> Result<Vec<String>> {
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        while self.current.kind != TokenKind::RParen {
            params.push(self.expect_identifier()?);
            if self.current.kind != TokenKind::RParen {
                self.expect(TokenKind::Comma)?;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(params)
    }

    fn parse_loop(&mut self) -> Result<Expression> {
        self.expect(TokenKind::Loop)?;
        self.expect(TokenKind::LParen)?;
        let cnt = self.parse_expression(Precedence::Lowest)?;
        self.expect(TokenKind::Comma)?;
        let body = self.parse_expression(Precedence::Lowest)?;
        self.expect(TokenKind::RParen)?;
        Ok(Expression::Loop {
            cnt: Box::new(cnt),
            body: Box::new(body),
        })
    }

    fn parse_expression_list(&mut self, open: TokenKind, close: TokenKind) -> Result<Vec<Expression>> {
        self.expect(open)?;
        let mut items = Vec::new();
        while self.current.kind != close {
            items.push(self.parse_expression(Precedence::Lowest)?);
            if self.current.kind != close {
                self.expect(TokenKind::Comma)?;
            }
        }
        self.expect(close)?;
        Ok(items)
    }

    fn expect(&mut self, kind: TokenKind) -> Result<()> {
        if self.current.kind == kind {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&kind.literal()))
        }
    }

    fn expect_identifier(&mut self) -> Result<String> {
        if let TokenKind::Ident(name) = &self.current.kind {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(self.error("identifier"))
        }
    }

    fn advance(&mut self) -> Token {
        let next = self
            .tokens
            .get(self.pos + 1)
            .cloned()
            .unwrap_or(Token::new(TokenKind::Eof, self.current.pos));
        self.pos = self.pos.saturating_add(1);
        std::mem::replace(&mut self.current, next)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos + 1).map(|token| &token.kind)
    }

    fn error(&self, expected: &str) -> anyhow::Error {
        anyhow::anyhow!(
            "Expected {expected}, got {:?} at position {}",
            self.current.kind,
            self.current.pos
        )
    }
}

pub fn parse_tokens(tokens: Vec<Token>) -> Result<Program> {
    Parser::new(tokens).parse_program()
}

/// Convenience front door: source text straight to a program.
pub fn parse_source(input: &str) -> Result<Program> {
    let tokens = crate::lexer::tokenize(input)?;
    parse_tokens(tokens)
}
