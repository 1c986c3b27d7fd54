use crate::frontend::lexer::Spanned;
use crate::frontend::token::Token;

pub struct TokenDumper {
    pub color: bool,
    pub show_lexeme: bool, // if false, prints the Debug form of the token
}

impl Default for TokenDumper {
    fn default() -> Self {
        Self {
            color: true,
            show_lexeme: false,
        }
    }
}

impl TokenDumper {
    // ANSI colors
    const RESET: &'static str = "\x1b[0m";
    const DIM: &'static str = "\x1b[2m";
    const GRN: &'static str = "\x1b[32m";
    const YEL: &'static str = "\x1b[33m";
    const CYN: &'static str = "\x1b[36m";
    const MAG: &'static str = "\x1b[35m";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_color(mut self) -> Self {
        self.color = false;
        self
    }

    pub fn pretty(mut self) -> Self {
        self.show_lexeme = true;
        self
    }

    pub fn dump(&self, tokens: &[Spanned]) {
        for s in tokens {
            println!("{}", self.render(s));
        }
    }

    pub fn render(&self, s: &Spanned) -> String {
        let kind = kind(&s.token);
        let colr = if self.color { color(&s.token) } else { "" };
        let reset = if self.color { Self::RESET } else { "" };

        if self.show_lexeme && !matches!(s.token, Token::Eof) {
            format!(
                "[{:02}:{:02}] {}{:<8} {}{}",
                s.span.line, s.span.col, colr, kind, s.lexeme, reset
            )
        } else {
            format!(
                "[{:02}:{:02}] {}{:<8} {:?}{}",
                s.span.line, s.span.col, colr, kind, s.token, reset
            )
        }
    }
}

fn kind(t: &Token) -> &'static str {
    use Token::*;
    match t {
        Eof => "EOF",

        // literals
        Number(_) => "NUMBER",
        HexNumber(_) => "HEX",
        String(_) => "STRING",
        Bool(_) => "BOOL",

        // names
        Ident(_) => "IDENT",

        // structure
        LBrace | RBrace => "BRACE",
        LParen | RParen => "PAREN",
        Comma | Colon | Assign | Arrow => "PUNCT",

        // everything else = keyword
        _ => "KEYWORD",
    }
}

fn color(t: &Token) -> &'static str {
    use Token::*;
    match t {
        Eof => TokenDumper::DIM,
        String(_) => TokenDumper::GRN,
        Number(_) | HexNumber(_) | Bool(_) => TokenDumper::CYN,
        Ident(_) => TokenDumper::YEL,
        Assign | Arrow => TokenDumper::MAG,
        _ => TokenDumper::RESET,
    }
}
