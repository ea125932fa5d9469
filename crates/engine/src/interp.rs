// RDB - Remote Program Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! The statement interpreter capability.
//!
//! The coordinator never defines what the statement language means; it only
//! requires an [`Interpreter`] it can hand one statement (or expression) and
//! a mutable variable context. [`MiniInterpreter`] is the shipped
//! implementation: assignment statements over arithmetic, string, and
//! comparison expressions. It is deliberately small — enough for the sample
//! programs and for driving the coordinator in tests — and makes no
//! sandboxing claims.

use auto_impl::auto_impl;
use rdb_common::{DebugError, ValContext, Value};

/// Executes statements and evaluates expressions against a variable context.
///
/// Implementations are trusted to mutate only the given context and to be
/// the sole authority on the statement language. Failures are surfaced as
/// [`DebugError::Execution`] with a message shown verbatim to the client.
#[auto_impl(&, Arc, Box)]
pub trait Interpreter: Send + Sync {
    /// Execute one statement, mutating `context` in place.
    fn execute(&self, statement: &str, context: &mut ValContext) -> Result<(), DebugError>;

    /// Evaluate one expression against `context` and return its value.
    fn evaluate(&self, expression: &str, context: &mut ValContext) -> Result<Value, DebugError>;
}

/// The shipped statement interpreter: `name = <expr>` assignments, where
/// expressions cover literals (int, float, single- or double-quoted string,
/// `True`/`False`), variable references, unary minus, `+ - * / %`,
/// parentheses, and the six comparison operators.
#[derive(Debug, Clone, Copy, Default)]
pub struct MiniInterpreter;

impl MiniInterpreter {
    /// Create a new interpreter.
    pub fn new() -> Self {
        Self
    }
}

impl Interpreter for MiniInterpreter {
    fn execute(&self, statement: &str, context: &mut ValContext) -> Result<(), DebugError> {
        let tokens = tokenize(statement)?;
        let mut parser = Parser::new(&tokens, context);

        let name = match parser.next() {
            Some(Token::Ident(name)) => name.clone(),
            _ => return Err(DebugError::execution("invalid syntax")),
        };
        if !matches!(parser.next(), Some(Token::Assign)) {
            return Err(DebugError::execution("invalid syntax"));
        }

        let value = parser.expression()?;
        parser.expect_end()?;
        context.insert(name, value);
        Ok(())
    }

    fn evaluate(&self, expression: &str, context: &mut ValContext) -> Result<Value, DebugError> {
        let tokens = tokenize(expression)?;
        let mut parser = Parser::new(&tokens, context);
        let value = parser.expression()?;
        parser.expect_end()?;
        Ok(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    Assign,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

fn tokenize(input: &str) -> Result<Vec<Token>, DebugError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '0'..='9' => {
                let mut text = String::new();
                let mut is_float = false;
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        text.push(d);
                        chars.next();
                    } else if d == '.' && !is_float {
                        is_float = true;
                        text.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if is_float {
                    let v = text
                        .parse::<f64>()
                        .map_err(|_| DebugError::execution("invalid syntax"))?;
                    tokens.push(Token::Float(v));
                } else {
                    let v = text
                        .parse::<i64>()
                        .map_err(|_| DebugError::execution("invalid syntax"))?;
                    tokens.push(Token::Int(v));
                }
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some(d) = chars.next() {
                    if d == '\\' {
                        match chars.next() {
                            Some('n') => text.push('\n'),
                            Some('t') => text.push('\t'),
                            Some(other) => text.push(other),
                            None => break,
                        }
                    } else if d == quote {
                        closed = true;
                        break;
                    } else {
                        text.push(d);
                    }
                }
                if !closed {
                    return Err(DebugError::execution(
                        "unterminated string literal",
                    ));
                }
                tokens.push(Token::Str(text));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        name.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(name));
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '%' => {
                chars.next();
                tokens.push(Token::Percent);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Eq);
                } else {
                    tokens.push(Token::Assign);
                }
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ne);
                } else {
                    return Err(DebugError::execution("invalid syntax"));
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            other => {
                return Err(DebugError::execution(format!(
                    "invalid character '{other}'"
                )));
            }
        }
    }

    Ok(tokens)
}

/// Recursive-descent evaluator over the token stream. Evaluation happens
/// directly during the descent; the grammar is small enough that a separate
/// AST buys nothing.
struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    context: &'a ValContext,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token], context: &'a ValContext) -> Self {
        Self { tokens, pos: 0, context }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect_end(&self) -> Result<(), DebugError> {
        if self.pos == self.tokens.len() {
            Ok(())
        } else {
            Err(DebugError::execution("invalid syntax"))
        }
    }

    /// expression := additive (cmp-op additive)?
    fn expression(&mut self) -> Result<Value, DebugError> {
        let lhs = self.additive()?;
        let op = match self.peek() {
            Some(Token::Eq) => Some(CmpOp::Eq),
            Some(Token::Ne) => Some(CmpOp::Ne),
            Some(Token::Lt) => Some(CmpOp::Lt),
            Some(Token::Le) => Some(CmpOp::Le),
            Some(Token::Gt) => Some(CmpOp::Gt),
            Some(Token::Ge) => Some(CmpOp::Ge),
            _ => None,
        };
        let Some(op) = op else { return Ok(lhs) };
        self.next();
        let rhs = self.additive()?;
        compare(op, &lhs, &rhs)
    }

    /// additive := term (('+' | '-') term)*
    fn additive(&mut self) -> Result<Value, DebugError> {
        let mut acc = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.next();
                    let rhs = self.term()?;
                    acc = add(&acc, &rhs)?;
                }
                Some(Token::Minus) => {
                    self.next();
                    let rhs = self.term()?;
                    acc = numeric_op("-", &acc, &rhs, |a, b| a - b, |a, b| Some(a - b))?;
                }
                _ => return Ok(acc),
            }
        }
    }

    /// term := unary (('*' | '/' | '%') unary)*
    fn term(&mut self) -> Result<Value, DebugError> {
        let mut acc = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.next();
                    let rhs = self.unary()?;
                    acc = numeric_op("*", &acc, &rhs, |a, b| a * b, |a, b| a.checked_mul(b))?;
                }
                Some(Token::Slash) => {
                    self.next();
                    let rhs = self.unary()?;
                    acc = divide(&acc, &rhs)?;
                }
                Some(Token::Percent) => {
                    self.next();
                    let rhs = self.unary()?;
                    acc = modulo(&acc, &rhs)?;
                }
                _ => return Ok(acc),
            }
        }
    }

    /// unary := '-' unary | primary
    fn unary(&mut self) -> Result<Value, DebugError> {
        if matches!(self.peek(), Some(Token::Minus)) {
            self.next();
            let value = self.unary()?;
            return match value {
                Value::Int(i) => Ok(Value::Int(-i)),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(DebugError::execution(format!(
                    "bad operand type for unary -: '{}'",
                    other.type_name()
                ))),
            };
        }
        self.primary()
    }

    /// primary := literal | ident | '(' expression ')'
    fn primary(&mut self) -> Result<Value, DebugError> {
        match self.next() {
            Some(Token::Int(i)) => Ok(Value::Int(*i)),
            Some(Token::Float(f)) => Ok(Value::Float(*f)),
            Some(Token::Str(s)) => Ok(Value::Str(s.clone())),
            Some(Token::Ident(name)) => match name.as_str() {
                "True" => Ok(Value::Bool(true)),
                "False" => Ok(Value::Bool(false)),
                _ => self
                    .context
                    .get(name)
                    .cloned()
                    .ok_or_else(|| {
                        DebugError::execution(format!("name '{name}' is not defined"))
                    }),
            },
            Some(Token::LParen) => {
                let value = self.expression()?;
                if matches!(self.next(), Some(Token::RParen)) {
                    Ok(value)
                } else {
                    Err(DebugError::execution("invalid syntax"))
                }
            }
            _ => Err(DebugError::execution("invalid syntax")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

fn add(lhs: &Value, rhs: &Value) -> Result<Value, DebugError> {
    if let (Value::Str(a), Value::Str(b)) = (lhs, rhs) {
        return Ok(Value::Str(format!("{a}{b}")));
    }
    numeric_op("+", lhs, rhs, |a, b| a + b, |a, b| a.checked_add(b))
}

fn divide(lhs: &Value, rhs: &Value) -> Result<Value, DebugError> {
    let (a, b) = as_floats("/", lhs, rhs)?;
    if b == 0.0 {
        return Err(DebugError::execution("division by zero"));
    }
    Ok(Value::Float(a / b))
}

fn modulo(lhs: &Value, rhs: &Value) -> Result<Value, DebugError> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => {
            if *b == 0 {
                return Err(DebugError::execution("modulo by zero"));
            }
            // Result carries the sign of the divisor
            let mut r = a % b;
            if r != 0 && (r < 0) != (*b < 0) {
                r += b;
            }
            Ok(Value::Int(r))
        }
        _ => {
            let (a, b) = as_floats("%", lhs, rhs)?;
            if b == 0.0 {
                return Err(DebugError::execution("modulo by zero"));
            }
            Ok(Value::Float(a - b * (a / b).floor()))
        }
    }
}

/// Apply an arithmetic operator to two numeric values, promoting to float
/// when either side is a float. Integer overflow is an execution error
/// rather than a panic.
fn numeric_op(
    op: &str,
    lhs: &Value,
    rhs: &Value,
    float_op: impl Fn(f64, f64) -> f64,
    int_op: impl Fn(i64, i64) -> Option<i64>,
) -> Result<Value, DebugError> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => int_op(*a, *b)
            .map(Value::Int)
            .ok_or_else(|| DebugError::execution("integer overflow")),
        _ => {
            let (a, b) = as_floats(op, lhs, rhs)?;
            Ok(Value::Float(float_op(a, b)))
        }
    }
}

fn as_floats(op: &str, lhs: &Value, rhs: &Value) -> Result<(f64, f64), DebugError> {
    let coerce = |v: &Value| match v {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    };
    match (coerce(lhs), coerce(rhs)) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(DebugError::execution(format!(
            "unsupported operand type(s) for {op}: '{}' and '{}'",
            lhs.type_name(),
            rhs.type_name()
        ))),
    }
}

fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> Result<Value, DebugError> {
    use std::cmp::Ordering;

    let ordering = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
        (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
        _ => {
            let coerce = |v: &Value| match v {
                Value::Int(i) => Some(*i as f64),
                Value::Float(f) => Some(*f),
                _ => None,
            };
            match (coerce(lhs), coerce(rhs)) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                // Mismatched types: equality is decidable, ordering is not
                _ => {
                    return match op {
                        CmpOp::Eq => Ok(Value::Bool(false)),
                        CmpOp::Ne => Ok(Value::Bool(true)),
                        _ => Err(DebugError::execution(format!(
                            "comparison not supported between instances of '{}' and '{}'",
                            lhs.type_name(),
                            rhs.type_name()
                        ))),
                    };
                }
            }
        }
    };

    let Some(ordering) = ordering else {
        // NaN comparisons
        return Ok(Value::Bool(matches!(op, CmpOp::Ne)));
    };

    let result = match op {
        CmpOp::Eq => ordering == Ordering::Equal,
        CmpOp::Ne => ordering != Ordering::Equal,
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::Le => ordering != Ordering::Greater,
        CmpOp::Gt => ordering == Ordering::Greater,
        CmpOp::Ge => ordering != Ordering::Less,
    };
    Ok(Value::Bool(result))
}
