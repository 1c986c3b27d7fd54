use crate::frontend::lexer::{Span, Spanned};
use crate::frontend::parser_error::ParserError;
use crate::frontend::token::Token;
use crate::lang::literal::LiteralValue;
use crate::lang::node::{
    Assignment, Block, Case, Expression, ForLoop, FunctionCall, FunctionDefinition, Identifier,
    If, Literal, Object, Position, Statement, Switch, TypedName, VariableDeclaration,
};

/// Name given to the object wrapping a bare root block.
pub const DEFAULT_OBJECT_NAME: &str = "Contract";

/// Nesting limit for objects, blocks and call arguments. Every later pass
/// recurses over the same tree, so this bounds their depth too.
pub const MAX_NESTING: usize = 64;

/// Recursive-descent parser for the IR.
///
/// The parser consumes lexed `Spanned` tokens (ending in `Token::Eof`) and
/// produces one root `Object`. It looks at most one token ahead, except when
/// telling an assignment from an expression statement, where it backtracks.
/// The first unexpected token aborts parsing.
pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Span of the most recently consumed token.
    ///
    /// Used to provide stable source locations for errors that occur at
    /// end-of-file.
    last_span: Option<Span>,
    depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned>) -> Self {
        Parser {
            tokens,
            pos: 0,
            last_span: None,
            depth: 0,
        }
    }

    /// Returns the current token without consuming it.
    fn current(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    /// Peeks the current token kind without consuming it.
    fn peek(&self) -> Option<&Token> {
        self.current().map(|s| &s.token)
    }

    /// Peeks the next token kind without consuming anything.
    fn peek_next(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1).map(|s| &s.token)
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    /// Advances the token stream by one and returns the consumed token.
    fn advance(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.pos).cloned();
        if let Some(s) = &token {
            self.last_span = Some(s.span);
        }
        self.pos += 1;
        token
    }

    /// Position of the current token (or the last consumed one at EOF).
    fn position(&self) -> Position {
        self.current()
            .map(|s| s.span)
            .or(self.last_span)
            .map(Position::from)
            .unwrap_or(Position {
                line: 1,
                column: 1,
                offset: 0,
            })
    }

    /// Constructs a `ParserError` at the most relevant location.
    ///
    /// Priority:
    /// 1. If `current()` exists, use its span.
    /// 2. Else, use `last_span`.
    /// 3. Else, default to (1,1) for truly empty input.
    fn error(&self, message: impl Into<String>) -> ParserError {
        let pos = self.position();
        ParserError {
            message: message.into(),
            line: pos.line,
            col: pos.column,
        }
    }

    fn found(&self) -> String {
        self.peek()
            .map(Token::describe)
            .unwrap_or_else(|| "end of input".to_string())
    }

    fn expect(&mut self, expected: Token, context: &str) -> Result<Position, ParserError> {
        if self.check(&expected) {
            let pos = self.position();
            self.advance();
            Ok(pos)
        } else {
            Err(self.error(format!(
                "expected {} {}, found {}",
                expected.describe(),
                context,
                self.found()
            )))
        }
    }

    fn expect_ident(&mut self, context: &str) -> Result<Identifier, ParserError> {
        let pos = self.position();
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.advance();
                Ok(Identifier { name, pos })
            }
            _ => Err(self.error(format!(
                "expected identifier {}, found {}",
                context,
                self.found()
            ))),
        }
    }

    fn enter(&mut self) -> Result<(), ParserError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error(format!("nesting deeper than {} levels", MAX_NESTING)));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Parses a complete compilation unit.
    ///
    /// ```text
    /// Root := Object | Block
    /// ```
    ///
    /// A bare block becomes the code of an object named `Contract`.
    pub fn parse(&mut self) -> Result<Object, ParserError> {
        let object = match self.peek() {
            Some(Token::Object) => self.parse_object()?,
            Some(Token::LBrace) => {
                let pos = self.position();
                let code = self.parse_block()?;
                Object {
                    name: DEFAULT_OBJECT_NAME.to_string(),
                    code,
                    objects: Vec::new(),
                    pos,
                }
            }
            _ => {
                return Err(self.error(format!(
                    "expected 'object' or '{{' at start of program, found {}",
                    self.found()
                )));
            }
        };

        if !self.check(&Token::Eof) {
            return Err(self.error(format!(
                "unexpected {} after end of program",
                self.found()
            )));
        }
        Ok(object)
    }

    /// ```text
    /// object "Name" { code { ... } object "Sub" { ... }* }
    /// ```
    fn parse_object(&mut self) -> Result<Object, ParserError> {
        self.enter()?;
        let pos = self.expect(Token::Object, "")?;
        let name = match self.peek() {
            Some(Token::String(name)) => {
                let Ok(name) = String::from_utf8(name.clone()) else {
                    return Err(self.error("object name must be valid UTF-8"));
                };
                self.advance();
                name
            }
            _ => {
                return Err(self.error(format!(
                    "expected object name string after 'object', found {}",
                    self.found()
                )));
            }
        };

        self.expect(Token::LBrace, "after object name")?;
        self.expect(Token::Code, "at start of object body")?;
        let code = self.parse_block()?;

        let mut objects = Vec::new();
        while self.check(&Token::Object) {
            objects.push(self.parse_object()?);
        }
        self.expect(Token::RBrace, "to close object")?;
        self.leave();

        Ok(Object {
            name,
            code,
            objects,
            pos,
        })
    }

    fn parse_block(&mut self) -> Result<Block, ParserError> {
        self.enter()?;
        let pos = self.expect(Token::LBrace, "to open block")?;
        let mut statements = Vec::new();

        loop {
            match self.peek() {
                Some(Token::RBrace) => {
                    self.advance();
                    break;
                }
                Some(Token::Eof) | None => {
                    return Err(self.error("unexpected end of input, expected '}'"));
                }
                _ => statements.push(self.parse_statement()?),
            }
        }

        self.leave();
        Ok(Block::new(statements, pos))
    }

    fn parse_statement(&mut self) -> Result<Statement, ParserError> {
        let pos = self.position();
        match self.peek() {
            Some(Token::LBrace) => Ok(Statement::Block(self.parse_block()?)),
            Some(Token::Function) => Ok(Statement::FunctionDefinition(
                self.parse_function_definition()?,
            )),
            Some(Token::Let) => Ok(Statement::VariableDeclaration(
                self.parse_variable_declaration()?,
            )),
            Some(Token::If) => Ok(Statement::If(self.parse_if()?)),
            Some(Token::Switch) => Ok(Statement::Switch(self.parse_switch()?)),
            Some(Token::For) => Ok(Statement::ForLoop(self.parse_for()?)),
            Some(Token::Break) => {
                self.advance();
                Ok(Statement::Break(pos))
            }
            Some(Token::Continue) => {
                self.advance();
                Ok(Statement::Continue(pos))
            }
            Some(Token::Leave) => {
                self.advance();
                Ok(Statement::Leave(pos))
            }
            Some(Token::Ident(_)) => {
                if let Some(assignment) = self.try_parse_assignment()? {
                    return Ok(Statement::Assignment(assignment));
                }
                Ok(Statement::Expression(self.parse_expression()?))
            }
            Some(t) if t.is_literal() => Ok(Statement::Expression(self.parse_expression()?)),
            _ => Err(self.error(format!(
                "unexpected {} at start of statement",
                self.found()
            ))),
        }
    }

    /// ```text
    /// function name(a, b:bool) -> r, s { ... }
    /// ```
    fn parse_function_definition(&mut self) -> Result<FunctionDefinition, ParserError> {
        let pos = self.expect(Token::Function, "")?;
        let name = self.expect_ident("after 'function'")?;

        self.expect(Token::LParen, "after function name")?;
        let parameters = if self.check(&Token::RParen) {
            Vec::new()
        } else {
            self.parse_typed_names("in parameter list")?
        };
        self.expect(Token::RParen, "to close parameter list")?;

        let returns = if self.check(&Token::Arrow) {
            self.advance();
            self.parse_typed_names("after '->'")?
        } else {
            Vec::new()
        };

        let body = self.parse_block()?;
        Ok(FunctionDefinition {
            name: name.name,
            parameters,
            returns,
            body,
            pos,
        })
    }

    /// ```text
    /// let a, b:bool := value
    /// let a
    /// ```
    fn parse_variable_declaration(&mut self) -> Result<VariableDeclaration, ParserError> {
        let pos = self.expect(Token::Let, "")?;
        let variables = self.parse_typed_names("after 'let'")?;
        let value = if self.check(&Token::Assign) {
            self.advance();
            Some(self.parse_expression()?)
        } else {
            None
        };
        Ok(VariableDeclaration {
            variables,
            value,
            pos,
        })
    }

    fn parse_if(&mut self) -> Result<If, ParserError> {
        let pos = self.expect(Token::If, "")?;
        let condition = self.parse_expression()?;
        let body = self.parse_block()?;
        Ok(If {
            condition,
            body,
            label: None,
            pos,
        })
    }

    /// ```text
    /// switch e case 1 { ... } case "a" { ... } default { ... }
    /// ```
    ///
    /// At least one `case` or a `default` is required.
    fn parse_switch(&mut self) -> Result<Switch, ParserError> {
        let pos = self.expect(Token::Switch, "")?;
        let expression = self.parse_expression()?;

        let mut cases = Vec::new();
        while self.check(&Token::Case) {
            let case_pos = self.position();
            self.advance();
            let value = match self.parse_literal()? {
                Some(literal) => literal,
                None => {
                    return Err(self.error(format!(
                        "expected literal after 'case', found {}",
                        self.found()
                    )));
                }
            };
            let body = self.parse_block()?;
            cases.push(Case {
                value,
                body,
                pos: case_pos,
            });
        }

        let default = if self.check(&Token::Default) {
            self.advance();
            Some(self.parse_block()?)
        } else {
            None
        };

        if cases.is_empty() && default.is_none() {
            return Err(self.error(format!(
                "expected 'case' or 'default' after switch expression, found {}",
                self.found()
            )));
        }

        Ok(Switch {
            expression,
            cases,
            default,
            label: None,
            pos,
        })
    }

    /// ```text
    /// for { init } condition { post } { body }
    /// ```
    fn parse_for(&mut self) -> Result<ForLoop, ParserError> {
        let pos = self.expect(Token::For, "")?;
        let init = self.parse_block()?;
        let condition = self.parse_expression()?;
        let post = self.parse_block()?;
        let body = self.parse_block()?;
        Ok(ForLoop {
            init,
            condition,
            post,
            body,
            label: None,
            pos,
        })
    }

    /// Tries `Ident (',' Ident)* ':=' Expression`.
    ///
    /// Restores the token position and returns `None` when no `:=` follows
    /// the identifier list.
    fn try_parse_assignment(&mut self) -> Result<Option<Assignment>, ParserError> {
        let saved_pos = self.pos;
        let saved_span = self.last_span;
        let pos = self.position();

        let mut targets = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Ident(name)) => {
                    targets.push(Identifier {
                        name: name.clone(),
                        pos: self.position(),
                    });
                    self.advance();
                }
                _ => break,
            }
            if self.check(&Token::Comma) && matches!(self.peek_next(), Some(Token::Ident(_))) {
                self.advance();
            } else {
                break;
            }
        }

        if !targets.is_empty() && self.check(&Token::Assign) {
            self.advance();
            let value = self.parse_expression()?;
            return Ok(Some(Assignment {
                targets,
                value,
                pos,
            }));
        }

        self.pos = saved_pos;
        self.last_span = saved_span;
        Ok(None)
    }

    /// ```text
    /// Expression := Ident '(' args ')' | Ident | Literal
    /// ```
    pub fn parse_expression(&mut self) -> Result<Expression, ParserError> {
        if let Some(literal) = self.parse_literal()? {
            return Ok(Expression::Literal(literal));
        }

        let name = self.expect_ident("or literal in expression")?;
        if !self.check(&Token::LParen) {
            return Ok(Expression::Identifier(name));
        }

        self.enter()?;
        self.advance();
        let mut arguments = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                arguments.push(self.parse_expression()?);
                if self.check(&Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(Token::RParen, "to close argument list")?;
        self.leave();

        let pos = name.pos;
        Ok(Expression::FunctionCall(FunctionCall {
            name,
            arguments,
            pos,
        }))
    }

    /// Consumes a literal token if the current token is one.
    fn parse_literal(&mut self) -> Result<Option<Literal>, ParserError> {
        let pos = self.position();
        let value = match self.peek() {
            Some(Token::Number(n)) => LiteralValue::Number(*n),
            Some(Token::HexNumber(n)) => LiteralValue::Hex(*n),
            Some(Token::Bool(b)) => LiteralValue::Bool(*b),
            Some(Token::String(s)) => LiteralValue::String(s.clone()),
            _ => return Ok(None),
        };
        self.advance();
        Ok(Some(Literal { value, pos }))
    }

    /// ```text
    /// TypedIdents := Ident (':' Ident)? (',' Ident (':' Ident)?)*
    /// ```
    fn parse_typed_names(&mut self, context: &str) -> Result<Vec<TypedName>, ParserError> {
        let mut names = Vec::new();
        loop {
            let ident = self.expect_ident(context)?;
            let ty = if self.check(&Token::Colon) {
                self.advance();
                Some(self.expect_ident("as type name after ':'")?.name)
            } else {
                None
            };
            names.push(TypedName {
                name: ident.name,
                ty,
                pos: ident.pos,
            });
            if self.check(&Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;
    use alloy_primitives::U256;

    fn parse(source: &str) -> Object {
        let tokens = Lexer::new(source).tokenize().unwrap();
        Parser::new(tokens).parse().unwrap()
    }

    fn parse_err(source: &str) -> ParserError {
        let tokens = Lexer::new(source).tokenize().unwrap();
        Parser::new(tokens).parse().unwrap_err()
    }

    fn statements(source: &str) -> Vec<Statement> {
        parse(source).code.statements
    }

    #[test]
    fn test_bare_block_wraps_in_default_object() {
        let object = parse("{ let x := 1 }");
        assert_eq!(object.name, "Contract");
        assert!(object.objects.is_empty());
        assert_eq!(object.code.statements.len(), 1);
    }

    #[test]
    fn test_object_with_nested_objects() {
        let object = parse(
            r#"object "Token" {
                code { sstore(0, 1) }
                object "Runtime" { code { } }
            }"#,
        );
        assert_eq!(object.name, "Token");
        assert_eq!(object.objects.len(), 1);
        assert_eq!(object.objects[0].name, "Runtime");
    }

    #[test]
    fn test_variable_declaration() {
        let stmts = statements("{ let a, b:bool := f() let c }");
        match &stmts[0] {
            Statement::VariableDeclaration(decl) => {
                assert_eq!(decl.variables.len(), 2);
                assert_eq!(decl.variables[1].ty.as_deref(), Some("bool"));
                assert!(decl.value.is_some());
            }
            other => panic!("expected declaration, got {:?}", other),
        }
        assert!(matches!(
            &stmts[1],
            Statement::VariableDeclaration(VariableDeclaration { value: None, .. })
        ));
    }

    #[test]
    fn test_assignment_vs_expression_statement() {
        let stmts = statements("{ x := 1 a, b := f() g(x) y }");
        assert!(matches!(&stmts[0], Statement::Assignment(a) if a.targets.len() == 1));
        assert!(matches!(&stmts[1], Statement::Assignment(a) if a.targets.len() == 2));
        assert!(matches!(
            &stmts[2],
            Statement::Expression(Expression::FunctionCall(c)) if c.name.name == "g"
        ));
        assert!(matches!(
            &stmts[3],
            Statement::Expression(Expression::Identifier(i)) if i.name == "y"
        ));
    }

    #[test]
    fn test_nested_calls() {
        let stmts = statements("{ sstore(0, add(mul(2, 3), sload(1))) }");
        let Statement::Expression(Expression::FunctionCall(call)) = &stmts[0] else {
            panic!("expected call");
        };
        assert_eq!(call.name.name, "sstore");
        assert_eq!(call.arguments.len(), 2);
        let Expression::FunctionCall(inner) = &call.arguments[1] else {
            panic!("expected nested call");
        };
        assert_eq!(inner.name.name, "add");
        assert!(matches!(&inner.arguments[0], Expression::FunctionCall(_)));
    }

    #[test]
    fn test_function_definition() {
        let stmts = statements("{ function f(a, b:u256) -> r, s { r := a } function g() {} }");
        let Statement::FunctionDefinition(f) = &stmts[0] else {
            panic!("expected function");
        };
        assert_eq!(f.name, "f");
        assert_eq!(f.parameters.len(), 2);
        assert_eq!(f.returns.len(), 2);
        assert_eq!(f.body.statements.len(), 1);

        let Statement::FunctionDefinition(g) = &stmts[1] else {
            panic!("expected function");
        };
        assert!(g.parameters.is_empty());
        assert!(g.returns.is_empty());
    }

    #[test]
    fn test_switch_cases_and_default() {
        let stmts = statements(r#"{ switch x case 0 { } case "a" { y := 1 } default { } }"#);
        let Statement::Switch(s) = &stmts[0] else {
            panic!("expected switch");
        };
        assert_eq!(s.cases.len(), 2);
        assert_eq!(s.cases[0].value.value, LiteralValue::Number(U256::ZERO));
        assert!(matches!(s.cases[1].value.value, LiteralValue::String(_)));
        assert!(s.default.is_some());
        assert!(s.label.is_none());
    }

    #[test]
    fn test_switch_default_only() {
        let stmts = statements("{ switch x default { } }");
        assert!(matches!(&stmts[0], Statement::Switch(s) if s.cases.is_empty()));
    }

    #[test]
    fn test_for_loop() {
        let stmts = statements("{ for { let i := 0 } lt(i, 10) { i := add(i, 1) } { break } }");
        let Statement::ForLoop(l) = &stmts[0] else {
            panic!("expected for");
        };
        assert_eq!(l.init.statements.len(), 1);
        assert_eq!(l.post.statements.len(), 1);
        assert!(matches!(l.body.statements[0], Statement::Break(_)));
    }

    #[test]
    fn test_positions() {
        let stmts = statements("{\n  let x := 1\n  if x { leave }\n}");
        assert_eq!(stmts[0].pos().line, 2);
        assert_eq!(stmts[0].pos().column, 3);
        assert_eq!(stmts[1].pos().line, 3);
    }

    #[test]
    fn test_error_unexpected_token() {
        let err = parse_err("{ let := 1 }");
        assert!(err.message.contains("expected identifier"));
        assert_eq!((err.line, err.col), (1, 7));
    }

    #[test]
    fn test_error_missing_closing_brace() {
        let err = parse_err("{ let x := 1");
        assert!(err.message.contains("'}'"));
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_error_switch_without_cases() {
        let err = parse_err("{ switch x }");
        assert!(err.message.contains("'case' or 'default'"));
    }

    #[test]
    fn test_error_case_needs_literal() {
        let err = parse_err("{ switch x case y { } }");
        assert!(err.message.contains("expected literal"));
    }

    #[test]
    fn test_error_trailing_tokens() {
        let err = parse_err("{ } { }");
        assert!(err.message.contains("after end of program"));
    }

    #[test]
    fn test_error_bad_start() {
        let err = parse_err("let x := 1");
        assert!(err.message.contains("start of program"));
    }

    #[test]
    fn test_error_nesting_limit() {
        let source = format!("{}{}", "{".repeat(MAX_NESTING + 1), "}".repeat(MAX_NESTING + 1));
        let err = parse_err(&source);
        assert!(err.message.contains("nesting"));
    }
}
