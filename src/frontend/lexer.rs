use alloy_primitives::U256;
use thiserror::Error;

use crate::frontend::token::{Token, keyword};
use crate::lang::node::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: usize,
    pub col: usize,
    /// Byte offset into the source text.
    pub offset: usize,
}

impl From<Span> for Position {
    fn from(span: Span) -> Self {
        Position {
            line: span.line,
            column: span.col,
            offset: span.offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    /// Exact source text the token was scanned from.
    pub lexeme: String,
    pub span: Span,
}

#[derive(Debug, Clone, Error)]
#[error("{line}:{col}: {message}")]
pub struct LexerError {
    pub message: String,
    pub line: usize,
    pub col: usize,
}

pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    offset: usize,
    line: usize,
    col: usize,
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '$'
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '$' || ch == '.'
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            pos: 0,
            offset: 0,
            line: 1,
            col: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Result<char, LexerError> {
        let ch = self
            .current()
            .ok_or_else(|| self.error_here("unexpected end of input"))?;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        self.pos += 1;
        self.offset += ch.len_utf8();
        Ok(ch)
    }

    fn span(&self) -> Span {
        Span {
            line: self.line,
            col: self.col,
            offset: self.offset,
        }
    }

    fn error_here(&self, message: impl Into<String>) -> LexerError {
        LexerError {
            message: message.into(),
            line: self.line,
            col: self.col,
        }
    }

    fn error_at(span: Span, message: impl Into<String>) -> LexerError {
        LexerError {
            message: message.into(),
            line: span.line,
            col: span.col,
        }
    }

    /// Skips whitespace, `// line` and `/* block */` comments.
    fn skip_trivia(&mut self) -> Result<(), LexerError> {
        loop {
            match (self.current(), self.peek()) {
                (Some(ch), _) if ch.is_whitespace() => {
                    self.advance()?;
                }
                (Some('/'), Some('/')) => {
                    while let Some(ch) = self.current() {
                        if ch == '\n' {
                            break;
                        }
                        self.advance()?;
                    }
                }
                (Some('/'), Some('*')) => {
                    let start = self.span();
                    self.advance()?;
                    self.advance()?;
                    loop {
                        match (self.current(), self.peek()) {
                            (Some('*'), Some('/')) => {
                                self.advance()?;
                                self.advance()?;
                                break;
                            }
                            (Some(_), _) => {
                                self.advance()?;
                            }
                            (None, _) => {
                                return Err(Self::error_at(start, "unterminated block comment"));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn read_string(&mut self) -> Result<Token, LexerError> {
        let start = self.span();
        self.advance()?;

        let mut bytes = Vec::new();
        loop {
            match self.current() {
                Some('"') => {
                    self.advance()?;
                    return Ok(Token::String(bytes));
                }
                Some('\\') => {
                    self.advance()?;
                    match self.current() {
                        Some('n') => bytes.push(b'\n'),
                        Some('t') => bytes.push(b'\t'),
                        Some('r') => bytes.push(b'\r'),
                        Some('\\') => bytes.push(b'\\'),
                        Some('"') => bytes.push(b'"'),
                        Some('\'') => bytes.push(b'\''),
                        Some('0') => bytes.push(b'\0'),
                        Some('x') => {
                            self.advance()?;
                            let mut hex = String::new();
                            for _ in 0..2 {
                                match self.current() {
                                    Some(ch) if ch.is_ascii_hexdigit() => {
                                        hex.push(ch);
                                        self.advance()?;
                                    }
                                    _ => {
                                        return Err(
                                            self.error_here("expected two hex digits after \\x")
                                        );
                                    }
                                }
                            }
                            let byte = u8::from_str_radix(&hex, 16)
                                .map_err(|_| self.error_here("invalid \\x escape"))?;
                            bytes.push(byte);
                            continue;
                        }
                        Some(ch) => {
                            return Err(
                                self.error_here(format!("unknown escape sequence: \\{}", ch))
                            );
                        }
                        None => {
                            return Err(self.error_here("unexpected EOF in escape sequence"));
                        }
                    }
                    self.advance()?;
                }
                Some('\n') => {
                    return Err(Self::error_at(
                        start,
                        "unterminated string (newline before closing quote)",
                    ));
                }
                Some(ch) => {
                    let mut utf8 = [0u8; 4];
                    bytes.extend_from_slice(ch.encode_utf8(&mut utf8).as_bytes());
                    self.advance()?;
                }
                None => {
                    return Err(Self::error_at(start, "unterminated string literal"));
                }
            }
        }
    }

    fn read_number(&mut self) -> Result<Token, LexerError> {
        let start = self.span();

        // Hex: 0x...
        if self.current() == Some('0') && self.peek() == Some('x') {
            self.advance()?;
            self.advance()?;

            let mut hex = String::new();
            while let Some(ch) = self.current() {
                if ch.is_ascii_hexdigit() {
                    hex.push(ch);
                    self.advance()?;
                } else {
                    break;
                }
            }

            if hex.is_empty() {
                return Err(Self::error_at(start, "expected hex digits after 0x"));
            }
            if let Some(ch) = self.current().filter(|c| is_ident_char(*c)) {
                return Err(Self::error_at(
                    start,
                    format!("malformed hex number: 0x{}{}", hex, ch),
                ));
            }
            if hex.trim_start_matches('0').len() > 64 {
                return Err(Self::error_at(
                    start,
                    format!("hex number 0x{} does not fit in 256 bits", hex),
                ));
            }

            let value = U256::from_str_radix(&hex, 16)
                .map_err(|_| Self::error_at(start, format!("invalid hex number: 0x{}", hex)))?;
            return Ok(Token::HexNumber(value));
        }

        let mut digits = String::new();
        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() {
                digits.push(ch);
                self.advance()?;
            } else {
                break;
            }
        }

        if let Some(ch) = self.current().filter(|c| is_ident_char(*c)) {
            return Err(Self::error_at(
                start,
                format!("malformed number: {}{}", digits, ch),
            ));
        }

        let value = U256::from_str_radix(&digits, 10).map_err(|_| {
            Self::error_at(start, format!("number {} does not fit in 256 bits", digits))
        })?;
        Ok(Token::Number(value))
    }

    fn read_identifier(&mut self) -> Result<Token, LexerError> {
        let mut ident = String::new();
        while let Some(ch) = self.current() {
            if is_ident_char(ch) {
                ident.push(ch);
                self.advance()?;
            } else {
                break;
            }
        }

        Ok(keyword(&ident).unwrap_or(Token::Ident(ident)))
    }

    fn read_punctuation(&mut self) -> Result<Token, LexerError> {
        let ch = self.advance()?;
        let token = match (ch, self.current()) {
            (':', Some('=')) => {
                self.advance()?;
                Token::Assign
            }
            ('-', Some('>')) => {
                self.advance()?;
                Token::Arrow
            }
            ('{', _) => Token::LBrace,
            ('}', _) => Token::RBrace,
            ('(', _) => Token::LParen,
            (')', _) => Token::RParen,
            (',', _) => Token::Comma,
            (':', _) => Token::Colon,
            _ => {
                return Err(LexerError {
                    message: format!("unexpected character: '{}'", ch),
                    line: self.line,
                    col: self.col - 1,
                });
            }
        };
        Ok(token)
    }

    /// Scans the whole input. The returned stream always ends with a single
    /// `Token::Eof`.
    pub fn tokenize(&mut self) -> Result<Vec<Spanned>, LexerError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_trivia()?;
            let span = self.span();
            let start = self.pos;

            let token = match self.current() {
                None => {
                    tokens.push(Spanned {
                        token: Token::Eof,
                        lexeme: String::new(),
                        span,
                    });
                    break;
                }
                Some('"') => self.read_string()?,
                Some(ch) if ch.is_ascii_digit() => self.read_number()?,
                Some(ch) if is_ident_start(ch) => self.read_identifier()?,
                Some(_) => self.read_punctuation()?,
            };

            let lexeme = self.source[start..self.pos].iter().collect();
            tokens.push(Spanned {
                token,
                lexeme,
                span,
            });
        }

        Ok(tokens)
    }
}
