use crate::ast::Token;
use crate::error::SyntaxError;

/// A token plus the byte span it came from. Spans are global to the
/// normalized query (the lexer is constructed with the unit's offset).
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub start: usize,
    pub end: usize,
}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    base: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer::with_offset(input, 0)
    }

    /// A lexer whose reported spans are shifted by `base` bytes, for
    /// tokenizing one stage unit out of a larger query.
    pub fn with_offset(input: &str, base: usize) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
            base,
        }
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_identifier(&mut self) -> String {
        let mut result = String::new();
        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' {
                result.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        result
    }

    fn read_string(&mut self, quote: char) -> Result<String, SyntaxError> {
        let start = self.base + self.position;
        let mut result = String::new();
        self.advance(); // consume opening quote

        while let Some(ch) = self.current_char() {
            match ch {
                c if c == quote => {
                    self.advance();
                    return Ok(result);
                }
                '\\' => {
                    self.advance(); // consume backslash
                    match self.current_char() {
                        Some('n') => result.push('\n'),
                        Some('t') => result.push('\t'),
                        Some('r') => result.push('\r'),
                        Some('"') => result.push('"'),
                        Some('\'') => result.push('\''),
                        Some('\\') => result.push('\\'),
                        Some(ch) => {
                            return Err(SyntaxError::at(
                                format!("invalid escape sequence: \\{}", ch),
                                self.base + self.position,
                            ));
                        }
                        None => {
                            return Err(SyntaxError::at(
                                "unterminated string: unexpected end after backslash",
                                self.base + self.position,
                            ));
                        }
                    }
                    self.advance();
                }
                _ => {
                    result.push(ch);
                    self.advance();
                }
            }
        }

        Err(SyntaxError::at(
            "unterminated string: missing closing quote",
            start,
        ))
    }

    fn read_number(&mut self) -> Result<Token, SyntaxError> {
        let start = self.base + self.position;
        let mut number = String::new();
        let mut is_float = false;

        while let Some(ch) = self.current_char() {
            if ch.is_ascii_digit() {
                number.push(ch);
                self.advance();
            } else if ch == '.'
                && !is_float
                && self.peek_char(1).is_some_and(|c| c.is_ascii_digit())
            {
                is_float = true;
                number.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        if is_float {
            number
                .parse::<f64>()
                .map(Token::Float)
                .map_err(|_| SyntaxError::at(format!("invalid float '{}'", number), start))
        } else {
            number
                .parse::<i64>()
                .map(Token::Integer)
                .map_err(|_| SyntaxError::at(format!("invalid integer '{}'", number), start))
        }
    }

    pub fn next_token(&mut self) -> Result<Spanned, SyntaxError> {
        self.skip_whitespace();
        let start = self.base + self.position;

        let token = match self.current_char() {
            None => Token::Eof,
            Some('.') => {
                self.advance();
                Token::Dot
            }
            Some(',') => {
                self.advance();
                Token::Comma
            }
            Some(':') => {
                self.advance();
                Token::Colon
            }
            Some('+') => {
                self.advance();
                Token::Plus
            }
            Some('-') => {
                self.advance();
                Token::Minus
            }
            Some('*') => {
                self.advance();
                Token::Star
            }
            Some('=') => {
                if self.peek_char(1) == Some('=') {
                    self.advance();
                    self.advance();
                    Token::EqEq
                } else {
                    self.advance();
                    Token::Equal
                }
            }
            Some('>') => {
                if self.peek_char(1) == Some('=') {
                    self.advance();
                    self.advance();
                    Token::GtEq
                } else {
                    self.advance();
                    Token::Gt
                }
            }
            Some('<') => {
                if self.peek_char(1) == Some('=') {
                    self.advance();
                    self.advance();
                    Token::LtEq
                } else {
                    self.advance();
                    Token::Lt
                }
            }
            Some('!') => {
                if self.peek_char(1) == Some('=') {
                    self.advance();
                    self.advance();
                    Token::NotEq
                } else {
                    return Err(SyntaxError::at("unexpected '!' (did you mean '!=')", start));
                }
            }
            Some('{') => {
                self.advance();
                Token::LBrace
            }
            Some('}') => {
                self.advance();
                Token::RBrace
            }
            Some('(') => {
                self.advance();
                Token::LParen
            }
            Some(')') => {
                self.advance();
                Token::RParen
            }
            Some('[') => {
                self.advance();
                Token::LBracket
            }
            Some(']') => {
                self.advance();
                Token::RBracket
            }
            Some('"') => Token::String(self.read_string('"')?),
            Some('\'') => Token::String(self.read_string('\'')?),
            Some(ch) if ch.is_alphabetic() || ch == '_' => {
                let ident = self.read_identifier();
                match ident.as_str() {
                    "true" => Token::Boolean(true),
                    "false" => Token::Boolean(false),
                    "null" => Token::Null,
                    _ => Token::Identifier(ident),
                }
            }
            Some(ch) if ch.is_ascii_digit() => self.read_number()?,
            Some(ch) => {
                return Err(SyntaxError::at(format!("unexpected character '{}'", ch), start));
            }
        };

        Ok(Spanned {
            token,
            start,
            end: self.base + self.position,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(input);
        let mut out = Vec::new();
        loop {
            let spanned = lexer.next_token().unwrap();
            if spanned.token == Token::Eof {
                break;
            }
            out.push(spanned.token);
        }
        out
    }

    #[test]
    fn test_field_chain() {
        assert_eq!(
            tokens("x.a.b[4]"),
            vec![
                Token::Identifier("x".to_string()),
                Token::Dot,
                Token::Identifier("a".to_string()),
                Token::Dot,
                Token::Identifier("b".to_string()),
                Token::LBracket,
                Token::Integer(4),
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn test_keywords_and_literals() {
        assert_eq!(
            tokens("true false null 1 2.5 'hi'"),
            vec![
                Token::Boolean(true),
                Token::Boolean(false),
                Token::Null,
                Token::Integer(1),
                Token::Float(2.5),
                Token::String("hi".to_string()),
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            tokens("< <= > >= == != + - * ="),
            vec![
                Token::Lt,
                Token::LtEq,
                Token::Gt,
                Token::GtEq,
                Token::EqEq,
                Token::NotEq,
                Token::Plus,
                Token::Minus,
                Token::Star,
                Token::Equal,
            ]
        );
    }

    #[test]
    fn test_spans_carry_offset() {
        let mut lexer = Lexer::with_offset("x.a", 10);
        let first = lexer.next_token().unwrap();
        assert_eq!(first.start, 10);
        assert_eq!(first.end, 11);
    }

    #[test]
    fn test_bad_character_is_an_error() {
        let mut lexer = Lexer::new("x # y");
        lexer.next_token().unwrap();
        assert!(lexer.next_token().is_err());
    }
}
