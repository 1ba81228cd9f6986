use std::mem;

use crate::ast::{Expr, BinOp, Token};
use crate::error::SyntaxError;
use crate::lexer::{Lexer, Spanned};
use crate::normalize::ESCAPE_MARKER;
use crate::value::Value;

/// Recursive-descent parser turning one stage body into a column
/// expression.
///
/// Grammar (informal):
///
/// ```text
/// expr    := operand (binop operand)*
/// operand := atom postfix*
/// atom    := 'x' | literal | object | array | ident '(' expr ')' | '(' expr ')' | ident
/// postfix := '.' ident | '[' integer ']' | '[' string ']'
/// ```
///
/// Binary operators are left-associative and all share one precedence
/// level: the chain applies strictly left to right, and each operand is
/// evaluated against the original input record. Parenthesize to group.
pub struct Parser {
    lexer: Lexer,
    current: Spanned,
}

impl Parser {
    pub fn new(input: &str) -> Result<Self, SyntaxError> {
        Parser::with_offset(input, 0)
    }

    /// Parse a stage body that sits `base` bytes into the normalized
    /// query, so error spans point into the full query text.
    pub fn with_offset(input: &str, base: usize) -> Result<Self, SyntaxError> {
        let mut lexer = Lexer::with_offset(input, base);
        let current = lexer.next_token()?;
        Ok(Parser { lexer, current })
    }

    fn advance(&mut self) -> Result<(), SyntaxError> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn check(&self, token: &Token) -> bool {
        mem::discriminant(&self.current.token) == mem::discriminant(token)
    }

    fn expect(&mut self, expected: Token) -> Result<(), SyntaxError> {
        if !self.check(&expected) {
            return Err(self.unexpected(&format!("expected {:?}", expected)));
        }
        self.advance()
    }

    fn unexpected(&self, context: &str) -> SyntaxError {
        SyntaxError::new(
            format!("{}, got {:?}", context, self.current.token),
            self.current.start..self.current.end,
        )
    }

    /// Parse a complete expression and require end of input.
    pub fn parse(&mut self) -> Result<Expr, SyntaxError> {
        let expr = self.parse_expression()?;
        self.expect(Token::Eof)?;
        Ok(expr)
    }

    /// Parse a comma-separated argument list, separating positional
    /// arguments from `name=expr` keyword arguments.
    pub fn parse_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), SyntaxError> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();

        while !self.check(&Token::Eof) {
            let expr = self.parse_expression()?;
            if self.check(&Token::Equal) {
                let name = match &expr {
                    Expr {
                        atom: crate::ast::Atom::Binding(name),
                        ops,
                    } if ops.is_empty() => name.clone(),
                    _ => {
                        return Err(self.unexpected("keyword argument name must be an identifier"));
                    }
                };
                self.advance()?;
                kwargs.push((name, self.parse_expression()?));
            } else {
                args.push(expr);
            }
            if !self.check(&Token::Eof) {
                self.expect(Token::Comma)?;
            }
        }
        Ok((args, kwargs))
    }

    pub fn parse_expression(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_operand()?;

        loop {
            let op = match &self.current.token {
                Token::Star => BinOp::Multiply,
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Subtract,
                Token::Lt => BinOp::LessThan,
                Token::Gt => BinOp::GreaterThan,
                Token::LtEq => BinOp::LessEqual,
                Token::GtEq => BinOp::GreaterEqual,
                Token::EqEq => BinOp::Equal,
                Token::NotEq => BinOp::NotEqual,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_operand()?;
            left = left.binary(op, right);
        }
        Ok(left)
    }

    fn parse_operand(&mut self) -> Result<Expr, SyntaxError> {
        let atom = self.parse_atom()?;
        self.parse_postfix(atom)
    }

    fn parse_atom(&mut self) -> Result<Expr, SyntaxError> {
        match mem::replace(&mut self.current.token, Token::Eof) {
            Token::Float(n) => {
                self.advance()?;
                Ok(Expr::literal(Value::Float(n)))
            }
            Token::Integer(n) => {
                self.advance()?;
                Ok(Expr::literal(Value::Integer(n)))
            }
            Token::String(s) => {
                self.advance()?;
                Ok(Expr::literal(Value::String(s)))
            }
            Token::Boolean(b) => {
                self.advance()?;
                Ok(Expr::literal(Value::Boolean(b)))
            }
            Token::Null => {
                self.advance()?;
                Ok(Expr::literal(Value::Null))
            }

            // Unary minus for negative number literals
            Token::Minus => {
                self.advance()?;
                match mem::replace(&mut self.current.token, Token::Eof) {
                    Token::Integer(n) => {
                        self.advance()?;
                        Ok(Expr::literal(Value::Integer(-n)))
                    }
                    Token::Float(n) => {
                        self.advance()?;
                        Ok(Expr::literal(Value::Float(-n)))
                    }
                    token => {
                        self.current.token = token;
                        Err(self.unexpected("expected a number after '-'"))
                    }
                }
            }

            Token::Identifier(ident) => {
                self.advance()?;
                if ident == "x" {
                    return Ok(Expr::record());
                }
                if self.check(&Token::LParen) {
                    // Named unary function call: the argument chain with
                    // the function applied on top.
                    self.advance()?;
                    let arg = self.parse_expression()?;
                    self.expect(Token::RParen)?;
                    return Ok(arg.apply(ident));
                }
                Ok(Expr::binding(ident))
            }

            Token::LBrace => {
                self.advance()?;
                self.parse_object_literal()
            }
            Token::LBracket => {
                self.advance()?;
                self.parse_array_literal()
            }
            Token::LParen => {
                self.advance()?;
                let expr = self.parse_expression()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }

            token => {
                self.current.token = token;
                Err(self.unexpected("unexpected token in expression"))
            }
        }
    }

    fn parse_postfix(&mut self, mut expr: Expr) -> Result<Expr, SyntaxError> {
        loop {
            if self.check(&Token::Dot) {
                self.advance()?;
                let name = match mem::replace(&mut self.current.token, Token::Eof) {
                    Token::Identifier(name) => name,
                    token => {
                        self.current.token = token;
                        return Err(self.unexpected("expected a field name after '.'"));
                    }
                };
                self.advance()?;
                expr = expr.field(strip_marker(&name));
            } else if self.check(&Token::LBracket) {
                self.advance()?;
                expr = match mem::replace(&mut self.current.token, Token::Eof) {
                    Token::Integer(n) => {
                        self.advance()?;
                        expr.index(n)
                    }
                    Token::Minus => {
                        self.advance()?;
                        match mem::replace(&mut self.current.token, Token::Eof) {
                            Token::Integer(n) => {
                                self.advance()?;
                                expr.index(-n)
                            }
                            token => {
                                self.current.token = token;
                                return Err(self.unexpected("expected an integer after '-'"));
                            }
                        }
                    }
                    Token::String(key) => {
                        self.advance()?;
                        expr.field(key)
                    }
                    token => {
                        self.current.token = token;
                        return Err(self.unexpected("index must be an integer or a quoted key"));
                    }
                };
                self.expect(Token::RBracket)?;
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_object_literal(&mut self) -> Result<Expr, SyntaxError> {
        let mut pairs = Vec::new();

        while !self.check(&Token::RBrace) {
            let key = match mem::replace(&mut self.current.token, Token::Eof) {
                Token::String(s) => s,
                Token::Identifier(s) => strip_marker(&s),
                token => {
                    self.current.token = token;
                    return Err(self.unexpected("expected a key in object literal"));
                }
            };
            self.advance()?;
            self.expect(Token::Colon)?;

            let value = self.parse_expression()?;
            pairs.push((key, value));

            if !self.check(&Token::RBrace) {
                self.expect(Token::Comma)?;
            }
        }

        self.expect(Token::RBrace)?;
        Ok(Expr::object(pairs))
    }

    fn parse_array_literal(&mut self) -> Result<Expr, SyntaxError> {
        let mut elements = Vec::new();

        while !self.check(&Token::RBracket) {
            elements.push(self.parse_expression()?);

            if !self.check(&Token::RBracket) {
                self.expect(Token::Comma)?;
            }
        }

        self.expect(Token::RBracket)?;
        Ok(Expr::array(elements))
    }
}

/// Drop the normalizer's reserved-name tag, restoring the field name
/// the user wrote.
fn strip_marker(name: &str) -> String {
    name.strip_prefix(ESCAPE_MARKER).unwrap_or(name).to_string()
}

/// Parse a standalone column expression (no stage context).
pub fn parse_expr(input: &str) -> Result<Expr, SyntaxError> {
    Parser::new(input)?.parse()
}
