//! Parser for rendered provider expressions.
//!
//! Handles the syntax the query builder emits once placeholders are
//! substituted:
//! - **Conditions**: `=`, `<>`, `<`, `<=`, `>`, `>=`, `BETWEEN`, `IN`,
//!   `AND`, `OR`, `NOT`, `attribute_exists`, `attribute_not_exists`,
//!   `begins_with`, `contains`
//! - **Updates**: `SET` (with `if_not_exists` and `+`/`-`), `REMOVE`,
//!   `ADD`, `DELETE`
//! - **Projections**: comma separated attribute paths
//!
//! Paths may be nested (`#aaa.#aab`) and mix `#name` placeholders with
//! bare identifiers.
//!
//! ```
//! use dquery_core::parser::{ExpressionParser, UpdateExpressionParser};
//!
//! let expr = ExpressionParser::parse("#aaa = :aaa AND begins_with(#aab, :aab)").unwrap();
//! let actions = UpdateExpressionParser::parse("SET #aaa = :aaa REMOVE #aab").unwrap();
//! assert_eq!(actions.len(), 2);
//! # let _ = expr;
//! ```

use crate::{Error, Result, Value};
use std::fmt;

/// Attribute path made of raw segments (`#name` placeholders or identifiers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributePath(pub Vec<String>);

impl AttributePath {
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// Condition expression AST node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    // Comparison operators
    Equal(Box<Expr>, Box<Expr>),
    NotEqual(Box<Expr>, Box<Expr>),
    LessThan(Box<Expr>, Box<Expr>),
    LessThanOrEqual(Box<Expr>, Box<Expr>),
    GreaterThan(Box<Expr>, Box<Expr>),
    GreaterThanOrEqual(Box<Expr>, Box<Expr>),
    Between(Box<Expr>, Box<Expr>, Box<Expr>),
    In(Box<Expr>, Vec<Expr>),

    // Logical operators
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),

    // Functions
    AttributeExists(AttributePath),
    AttributeNotExists(AttributePath),
    BeginsWith(Box<Expr>, Box<Expr>),
    Contains(Box<Expr>, Box<Expr>),

    // Operands
    Path(AttributePath),
    ValuePlaceholder(String),
    Literal(Value),
}

/// Update expression actions
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateAction {
    /// SET path = value
    Set(AttributePath, UpdateValue),
    /// REMOVE path
    Remove(AttributePath),
    /// ADD path value (numbers or sets)
    Add(AttributePath, UpdateValue),
    /// DELETE path value (sets)
    Delete(AttributePath, UpdateValue),
}

/// Right-hand side of an update action
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateValue {
    Placeholder(String),
    Path(AttributePath),
    /// if_not_exists(path, fallback)
    IfNotExists(AttributePath, Box<UpdateValue>),
    Add(Box<UpdateValue>, Box<UpdateValue>),
    Sub(Box<UpdateValue>, Box<UpdateValue>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    // Operators
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,

    // Keywords
    And,
    Or,
    Not,
    Between,
    In,

    // Update keywords
    Set,
    Remove,
    Add,
    Delete,

    // Arithmetic
    Plus,
    Minus,

    // Functions
    AttributeExists,
    AttributeNotExists,
    BeginsWith,
    Contains,
    IfNotExists,

    // Identifiers and placeholders
    Identifier(String),
    NamePlaceholder(String),
    ValuePlaceholder(String),

    // Delimiters
    LeftParen,
    RightParen,
    Comma,
    Dot,

    Eof,
}

struct Lexer {
    input: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
        }
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.current(), Some(ch) if ch.is_whitespace()) {
            self.advance();
        }
    }

    fn read_identifier(&mut self) -> String {
        let start = self.pos;
        while matches!(self.current(), Some(ch) if ch.is_alphanumeric() || ch == '_') {
            self.advance();
        }
        self.input[start..self.pos].iter().collect()
    }

    fn single(&mut self, token: Token) -> Result<Token> {
        self.advance();
        Ok(token)
    }

    fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace();

        match self.current() {
            None => Ok(Token::Eof),
            Some('(') => self.single(Token::LeftParen),
            Some(')') => self.single(Token::RightParen),
            Some(',') => self.single(Token::Comma),
            Some('.') => self.single(Token::Dot),
            Some('+') => self.single(Token::Plus),
            Some('-') => self.single(Token::Minus),
            Some('=') => self.single(Token::Equal),
            Some('<') => {
                self.advance();
                match self.current() {
                    Some('>') => self.single(Token::NotEqual),
                    Some('=') => self.single(Token::LessThanOrEqual),
                    _ => Ok(Token::LessThan),
                }
            }
            Some('>') => {
                self.advance();
                if self.current() == Some('=') {
                    self.single(Token::GreaterThanOrEqual)
                } else {
                    Ok(Token::GreaterThan)
                }
            }
            Some('#') => {
                self.advance();
                let name = self.read_identifier();
                Ok(Token::NamePlaceholder(format!("#{}", name)))
            }
            Some(':') => {
                self.advance();
                let name = self.read_identifier();
                Ok(Token::ValuePlaceholder(format!(":{}", name)))
            }
            Some(ch) if ch.is_alphabetic() || ch == '_' => {
                let ident = self.read_identifier();
                Ok(match ident.to_uppercase().as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "NOT" => Token::Not,
                    "BETWEEN" => Token::Between,
                    "IN" => Token::In,
                    "SET" => Token::Set,
                    "REMOVE" => Token::Remove,
                    "ADD" => Token::Add,
                    "DELETE" => Token::Delete,
                    "ATTRIBUTE_EXISTS" => Token::AttributeExists,
                    "ATTRIBUTE_NOT_EXISTS" => Token::AttributeNotExists,
                    "BEGINS_WITH" => Token::BeginsWith,
                    "CONTAINS" => Token::Contains,
                    "IF_NOT_EXISTS" => Token::IfNotExists,
                    _ => Token::Identifier(ident),
                })
            }
            Some(ch) => Err(Error::InvalidExpression(format!(
                "Unexpected character: {}",
                ch
            ))),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let is_eof = token == Token::Eof;
        tokens.push(token);
        if is_eof {
            return Ok(tokens);
        }
    }
}

/// Token cursor shared by the three parsers.
struct Cursor {
    tokens: Vec<Token>,
    pos: usize,
}

impl Cursor {
    fn new(input: &str) -> Result<Self> {
        Ok(Self {
            tokens: tokenize(input)?,
            pos: 0,
        })
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.current() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(Error::InvalidExpression(format!(
                "Expected {:?}, got {:?}",
                expected,
                self.current()
            )))
        }
    }

    fn expect_eof(&self) -> Result<()> {
        match self.current() {
            Token::Eof => Ok(()),
            other => Err(Error::InvalidExpression(format!(
                "Unexpected trailing token: {:?}",
                other
            ))),
        }
    }

    fn is_path_start(&self) -> bool {
        matches!(
            self.current(),
            Token::Identifier(_) | Token::NamePlaceholder(_)
        )
    }

    /// segment ('.' segment)*
    fn parse_path(&mut self, context: &str) -> Result<AttributePath> {
        let mut segments = Vec::new();
        loop {
            match self.current().clone() {
                Token::Identifier(name) | Token::NamePlaceholder(name) => {
                    self.advance();
                    segments.push(name);
                }
                other => {
                    return Err(Error::InvalidExpression(format!(
                        "Expected attribute path in {}, got {:?}",
                        context, other
                    )))
                }
            }
            if !self.eat(&Token::Dot) {
                return Ok(AttributePath(segments));
            }
        }
    }
}

/// Condition expression parser
pub struct ExpressionParser {
    cursor: Cursor,
}

impl ExpressionParser {
    /// Parse a condition expression string into an AST
    pub fn parse(input: &str) -> Result<Expr> {
        let mut parser = Self {
            cursor: Cursor::new(input)?,
        };
        let expr = parser.parse_or()?;
        parser.cursor.expect_eof()?;
        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.cursor.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.cursor.eat(&Token::And) {
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.cursor.eat(&Token::Not) {
            let expr = self.parse_not()?;
            Ok(Expr::Not(Box::new(expr)))
        } else {
            self.parse_comparison()
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = Box::new(self.parse_operand()?);

        let op = self.cursor.current().clone();
        let binary: fn(Box<Expr>, Box<Expr>) -> Expr = match op {
            Token::Equal => Expr::Equal,
            Token::NotEqual => Expr::NotEqual,
            Token::LessThan => Expr::LessThan,
            Token::LessThanOrEqual => Expr::LessThanOrEqual,
            Token::GreaterThan => Expr::GreaterThan,
            Token::GreaterThanOrEqual => Expr::GreaterThanOrEqual,
            Token::Between => {
                self.cursor.advance();
                let low = self.parse_operand()?;
                self.cursor.expect(Token::And)?;
                let high = self.parse_operand()?;
                return Ok(Expr::Between(left, Box::new(low), Box::new(high)));
            }
            Token::In => {
                self.cursor.advance();
                self.cursor.expect(Token::LeftParen)?;
                let mut candidates = vec![self.parse_operand()?];
                while self.cursor.eat(&Token::Comma) {
                    candidates.push(self.parse_operand()?);
                }
                self.cursor.expect(Token::RightParen)?;
                return Ok(Expr::In(left, candidates));
            }
            // A function call or a parenthesized condition
            _ => return Ok(*left),
        };
        self.cursor.advance();
        let right = self.parse_operand()?;
        Ok(binary(left, Box::new(right)))
    }

    fn parse_function_args(&mut self) -> Result<(Box<Expr>, Box<Expr>)> {
        self.cursor.expect(Token::LeftParen)?;
        let first = self.parse_operand()?;
        self.cursor.expect(Token::Comma)?;
        let second = self.parse_operand()?;
        self.cursor.expect(Token::RightParen)?;
        Ok((Box::new(first), Box::new(second)))
    }

    fn parse_path_arg(&mut self, function: &str) -> Result<AttributePath> {
        self.cursor.expect(Token::LeftParen)?;
        let path = self.cursor.parse_path(function)?;
        self.cursor.expect(Token::RightParen)?;
        Ok(path)
    }

    fn parse_operand(&mut self) -> Result<Expr> {
        match self.cursor.current().clone() {
            Token::LeftParen => {
                self.cursor.advance();
                let expr = self.parse_or()?;
                self.cursor.expect(Token::RightParen)?;
                Ok(expr)
            }
            Token::Identifier(_) | Token::NamePlaceholder(_) => {
                Ok(Expr::Path(self.cursor.parse_path("operand")?))
            }
            Token::ValuePlaceholder(name) => {
                self.cursor.advance();
                Ok(Expr::ValuePlaceholder(name))
            }
            Token::AttributeExists => {
                self.cursor.advance();
                Ok(Expr::AttributeExists(self.parse_path_arg("attribute_exists")?))
            }
            Token::AttributeNotExists => {
                self.cursor.advance();
                Ok(Expr::AttributeNotExists(
                    self.parse_path_arg("attribute_not_exists")?,
                ))
            }
            Token::BeginsWith => {
                self.cursor.advance();
                let (path, prefix) = self.parse_function_args()?;
                Ok(Expr::BeginsWith(path, prefix))
            }
            Token::Contains => {
                self.cursor.advance();
                let (path, operand) = self.parse_function_args()?;
                Ok(Expr::Contains(path, operand))
            }
            other => Err(Error::InvalidExpression(format!(
                "Unexpected token: {:?}",
                other
            ))),
        }
    }
}

/// Update expression parser
pub struct UpdateExpressionParser {
    cursor: Cursor,
}

impl UpdateExpressionParser {
    /// Parse an update expression string into actions.
    /// Example: `SET #a = :a, #b = if_not_exists(#b, :b) ADD #c :c REMOVE #d`
    pub fn parse(input: &str) -> Result<Vec<UpdateAction>> {
        let mut parser = Self {
            cursor: Cursor::new(input)?,
        };
        parser.parse_update_expr()
    }

    fn parse_update_expr(&mut self) -> Result<Vec<UpdateAction>> {
        let mut actions = Vec::new();

        while self.cursor.current() != &Token::Eof {
            let clause = self.cursor.current().clone();
            self.cursor.advance();
            loop {
                let action = match &clause {
                    Token::Set => {
                        let path = self.cursor.parse_path("SET")?;
                        self.cursor.expect(Token::Equal)?;
                        UpdateAction::Set(path, self.parse_update_value()?)
                    }
                    Token::Remove => UpdateAction::Remove(self.cursor.parse_path("REMOVE")?),
                    Token::Add => {
                        let path = self.cursor.parse_path("ADD")?;
                        UpdateAction::Add(path, self.parse_operand()?)
                    }
                    Token::Delete => {
                        let path = self.cursor.parse_path("DELETE")?;
                        UpdateAction::Delete(path, self.parse_operand()?)
                    }
                    other => {
                        return Err(Error::InvalidExpression(format!(
                            "Unexpected token in update expression: {:?}",
                            other
                        )))
                    }
                };
                actions.push(action);
                if !self.cursor.eat(&Token::Comma) {
                    break;
                }
            }
        }

        if actions.is_empty() {
            return Err(Error::InvalidExpression("Update expression is empty".into()));
        }
        Ok(actions)
    }

    /// operand (('+' | '-') operand)?
    fn parse_update_value(&mut self) -> Result<UpdateValue> {
        let left = self.parse_operand()?;
        if self.cursor.eat(&Token::Plus) {
            let right = self.parse_operand()?;
            return Ok(UpdateValue::Add(Box::new(left), Box::new(right)));
        }
        if self.cursor.eat(&Token::Minus) {
            let right = self.parse_operand()?;
            return Ok(UpdateValue::Sub(Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn parse_operand(&mut self) -> Result<UpdateValue> {
        match self.cursor.current().clone() {
            Token::ValuePlaceholder(placeholder) => {
                self.cursor.advance();
                Ok(UpdateValue::Placeholder(placeholder))
            }
            Token::IfNotExists => {
                self.cursor.advance();
                self.cursor.expect(Token::LeftParen)?;
                let path = self.cursor.parse_path("if_not_exists")?;
                self.cursor.expect(Token::Comma)?;
                let fallback = self.parse_operand()?;
                self.cursor.expect(Token::RightParen)?;
                Ok(UpdateValue::IfNotExists(path, Box::new(fallback)))
            }
            _ if self.cursor.is_path_start() => {
                Ok(UpdateValue::Path(self.cursor.parse_path("update value")?))
            }
            other => Err(Error::InvalidExpression(format!(
                "Unexpected token in update value: {:?}",
                other
            ))),
        }
    }
}

/// Projection expression parser
pub struct ProjectionParser;

impl ProjectionParser {
    pub fn parse(input: &str) -> Result<Vec<AttributePath>> {
        let mut cursor = Cursor::new(input)?;
        let mut paths = vec![cursor.parse_path("projection")?];
        while cursor.eat(&Token::Comma) {
            paths.push(cursor.parse_path("projection")?);
        }
        cursor.expect_eof()?;
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(segments: &[&str]) -> AttributePath {
        AttributePath(segments.iter().map(|s| s.to_string()).collect())
    }

    fn placeholder(name: &str) -> Box<Expr> {
        Box::new(Expr::ValuePlaceholder(name.to_string()))
    }

    #[test]
    fn test_parse_comparison() {
        let expr = ExpressionParser::parse("#aaa >= :aaa").unwrap();
        assert_eq!(
            expr,
            Expr::GreaterThanOrEqual(Box::new(Expr::Path(path(&["#aaa"]))), placeholder(":aaa"))
        );
    }

    #[test]
    fn test_parse_and_binds_tighter_than_or() {
        let expr = ExpressionParser::parse("#a = :a OR #b = :b AND #c = :c").unwrap();
        match expr {
            Expr::Or(_, right) => assert!(matches!(*right, Expr::And(_, _))),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_parenthesized_group() {
        let expr = ExpressionParser::parse("(#a = :a OR #b = :b) AND #c = :c").unwrap();
        match expr {
            Expr::And(left, _) => assert!(matches!(*left, Expr::Or(_, _))),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_between_and_in() {
        let expr = ExpressionParser::parse("#aaa BETWEEN :aaa AND :aab").unwrap();
        assert!(matches!(expr, Expr::Between(_, _, _)));

        let expr = ExpressionParser::parse("#aaa IN (:aaa___0, :aaa___1)").unwrap();
        match expr {
            Expr::In(_, candidates) => assert_eq!(candidates.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_functions_and_nested_paths() {
        let expr = ExpressionParser::parse(
            "begins_with(#aaa.#aab, :aaa) AND attribute_not_exists(#aac) AND contains(#aad, :aab)",
        )
        .unwrap();
        match expr {
            Expr::And(left, right) => {
                assert!(matches!(*right, Expr::Contains(_, _)));
                match *left {
                    Expr::And(begins, missing) => {
                        assert_eq!(
                            *begins,
                            Expr::BeginsWith(
                                Box::new(Expr::Path(path(&["#aaa", "#aab"]))),
                                placeholder(":aaa")
                            )
                        );
                        assert_eq!(*missing, Expr::AttributeNotExists(path(&["#aac"])));
                    }
                    other => panic!("unexpected {other:?}"),
                }
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_not() {
        let expr = ExpressionParser::parse("NOT attribute_exists(#a)").unwrap();
        assert!(matches!(expr, Expr::Not(_)));
    }

    #[test]
    fn test_parse_rejects_trailing_tokens() {
        assert!(ExpressionParser::parse("#a = :a :b").is_err());
        assert!(ExpressionParser::parse("#a = ").is_err());
        assert!(ExpressionParser::parse("#a ? :a").is_err());
    }

    #[test]
    fn test_parse_update_clauses() {
        let actions = UpdateExpressionParser::parse(
            "SET #aaa = :aaa, #aab = if_not_exists(#aab, :aab) ADD #aac :aac DELETE #aad :aad REMOVE #aae",
        )
        .unwrap();
        assert_eq!(
            actions,
            vec![
                UpdateAction::Set(path(&["#aaa"]), UpdateValue::Placeholder(":aaa".into())),
                UpdateAction::Set(
                    path(&["#aab"]),
                    UpdateValue::IfNotExists(
                        path(&["#aab"]),
                        Box::new(UpdateValue::Placeholder(":aab".into()))
                    )
                ),
                UpdateAction::Add(path(&["#aac"]), UpdateValue::Placeholder(":aac".into())),
                UpdateAction::Delete(path(&["#aad"]), UpdateValue::Placeholder(":aad".into())),
                UpdateAction::Remove(path(&["#aae"])),
            ]
        );
    }

    #[test]
    fn test_parse_update_arithmetic() {
        let actions = UpdateExpressionParser::parse("SET #n = #n + :inc").unwrap();
        assert_eq!(
            actions,
            vec![UpdateAction::Set(
                path(&["#n"]),
                UpdateValue::Add(
                    Box::new(UpdateValue::Path(path(&["#n"]))),
                    Box::new(UpdateValue::Placeholder(":inc".into()))
                )
            )]
        );
    }

    #[test]
    fn test_parse_update_rejects_garbage() {
        assert!(UpdateExpressionParser::parse("").is_err());
        assert!(UpdateExpressionParser::parse("UPSERT #a = :a").is_err());
        assert!(UpdateExpressionParser::parse("SET #a :a").is_err());
    }

    #[test]
    fn test_parse_projection() {
        let paths = ProjectionParser::parse("#aaa, #aab.#aac").unwrap();
        assert_eq!(paths, vec![path(&["#aaa"]), path(&["#aab", "#aac"])]);
        assert!(ProjectionParser::parse("").is_err());
    }
}
