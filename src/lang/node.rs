use serde::{Deserialize, Serialize};

use super::literal::LiteralValue;

/// Source position of a node, copied from the token that starts it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Synthetic control-flow label assigned by the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u32);

impl std::fmt::Display for LabelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// A compilation unit: named code block plus nested objects.
///
/// Nested objects are compiled independently into sub-artifacts.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub name: String,
    pub code: Block,
    pub objects: Vec<Object>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Statement>,
    pub pos: Position,
}

impl Block {
    pub fn new(statements: Vec<Statement>, pos: Position) -> Self {
        Self { statements, pos }
    }

    pub fn empty(pos: Position) -> Self {
        Self {
            statements: Vec::new(),
            pos,
        }
    }
}

/// A name with an optional type annotation: `x` or `x:bool`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedName {
    pub name: String,
    pub ty: Option<String>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    pub name: String,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub value: LiteralValue,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    /// Callee name. Whether it is a built-in is decided after parsing.
    pub name: Identifier,
    pub arguments: Vec<Expression>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    FunctionCall(FunctionCall),
    Identifier(Identifier),
    Literal(Literal),
}

impl Expression {
    pub fn pos(&self) -> Position {
        match self {
            Expression::FunctionCall(call) => call.pos,
            Expression::Identifier(ident) => ident.pos,
            Expression::Literal(literal) => literal.pos,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Expression::Literal(literal) => Some(literal),
            _ => None,
        }
    }

    pub fn call(name: &str, arguments: Vec<Expression>, pos: Position) -> Self {
        Expression::FunctionCall(FunctionCall {
            name: Identifier {
                name: name.to_string(),
                pos,
            },
            arguments,
            pos,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclaration {
    pub variables: Vec<TypedName>,
    pub value: Option<Expression>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub targets: Vec<Identifier>,
    pub value: Expression,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct If {
    pub condition: Expression,
    pub body: Block,
    pub label: Option<LabelId>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    pub value: Literal,
    pub body: Block,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Switch {
    pub expression: Expression,
    /// Cases in source order.
    pub cases: Vec<Case>,
    pub default: Option<Block>,
    pub label: Option<LabelId>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForLoop {
    /// Empty after normalization (its statements are hoisted out).
    pub init: Block,
    pub condition: Expression,
    pub post: Block,
    pub body: Block,
    pub label: Option<LabelId>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    pub parameters: Vec<TypedName>,
    pub returns: Vec<TypedName>,
    pub body: Block,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Block(Block),
    FunctionDefinition(FunctionDefinition),
    VariableDeclaration(VariableDeclaration),
    Assignment(Assignment),
    If(If),
    Switch(Switch),
    ForLoop(ForLoop),
    Break(Position),
    Continue(Position),
    Leave(Position),
    Expression(Expression),
}

impl Statement {
    pub fn pos(&self) -> Position {
        match self {
            Statement::Block(block) => block.pos,
            Statement::FunctionDefinition(def) => def.pos,
            Statement::VariableDeclaration(decl) => decl.pos,
            Statement::Assignment(assign) => assign.pos,
            Statement::If(stmt) => stmt.pos,
            Statement::Switch(stmt) => stmt.pos,
            Statement::ForLoop(stmt) => stmt.pos,
            Statement::Break(pos) | Statement::Continue(pos) | Statement::Leave(pos) => *pos,
            Statement::Expression(expr) => expr.pos(),
        }
    }
}
