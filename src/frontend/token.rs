use alloy_primitives::U256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    // Literals
    Number(U256),
    HexNumber(U256),
    /// Payload bytes after escape processing.
    String(Vec<u8>),
    Bool(bool),

    // Keywords
    Object,
    Code,
    Let,
    If,
    Switch,
    Case,
    Default,
    For,
    Function,
    Break,
    Continue,
    Leave,

    // Delimiters
    LBrace, // {
    RBrace, // }
    LParen, // (
    RParen, // )
    Comma,  // ,
    Colon,  // :
    Assign, // :=
    Arrow,  // ->

    // Identifier (variables, user functions and built-ins alike)
    Ident(std::string::String),

    // Special
    Eof,
}

impl Token {
    /// Returns true if this token is a reserved word
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            Token::Object
                | Token::Code
                | Token::Let
                | Token::If
                | Token::Switch
                | Token::Case
                | Token::Default
                | Token::For
                | Token::Function
                | Token::Break
                | Token::Continue
                | Token::Leave
                | Token::Bool(_)
        )
    }

    /// Returns true if this token can start a literal
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Token::Number(_) | Token::HexNumber(_) | Token::String(_) | Token::Bool(_)
        )
    }

    /// Short human readable description used in parser diagnostics.
    pub fn describe(&self) -> std::string::String {
        match self {
            Token::Number(n) => format!("number '{}'", n),
            Token::HexNumber(n) => format!("hex number '{:#x}'", n),
            Token::String(s) => format!("string \"{}\"", s.escape_ascii()),
            Token::Bool(b) => format!("'{}'", b),
            Token::Ident(name) => format!("identifier '{}'", name),
            Token::Eof => "end of input".to_string(),
            other => format!("'{}'", other.keyword_text()),
        }
    }

    fn keyword_text(&self) -> &'static str {
        match self {
            Token::Object => "object",
            Token::Code => "code",
            Token::Let => "let",
            Token::If => "if",
            Token::Switch => "switch",
            Token::Case => "case",
            Token::Default => "default",
            Token::For => "for",
            Token::Function => "function",
            Token::Break => "break",
            Token::Continue => "continue",
            Token::Leave => "leave",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::Comma => ",",
            Token::Colon => ":",
            Token::Assign => ":=",
            Token::Arrow => "->",
            _ => "?",
        }
    }
}

/// Maps a scanned word to its keyword token, if it is one.
pub fn keyword(word: &str) -> Option<Token> {
    Some(match word {
        "object" => Token::Object,
        "code" => Token::Code,
        "let" => Token::Let,
        "if" => Token::If,
        "switch" => Token::Switch,
        "case" => Token::Case,
        "default" => Token::Default,
        "for" => Token::For,
        "function" => Token::Function,
        "break" => Token::Break,
        "continue" => Token::Continue,
        "leave" => Token::Leave,
        "true" => Token::Bool(true),
        "false" => Token::Bool(false),
        _ => return None,
    })
}
