//! Control-flow graph over normalized statements.
//!
//! One graph per function body plus one for the object's top-level code.
//! Blocks hold the positions of the statements they contain; edges follow
//! structured control flow, including `break`, `continue`, `leave` and
//! terminating built-ins.

use crate::lang::builtins;
use crate::lang::node::{Block, Expression, Position, Statement};

pub type BlockId = usize;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BasicBlock {
    pub id: BlockId,
    pub statements: Vec<Position>,
    pub successors: Vec<BlockId>,
    pub predecessors: Vec<BlockId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFlowGraph {
    /// Function name, or `main` for top-level code.
    pub name: String,
    pub blocks: Vec<BasicBlock>,
    pub entry: BlockId,
    pub exit: BlockId,
}

impl ControlFlowGraph {
    pub fn build(name: &str, body: &Block) -> Self {
        let mut builder = Builder {
            blocks: Vec::new(),
            current: None,
            loops: Vec::new(),
            exit: 0,
        };
        let entry = builder.new_block();
        builder.exit = builder.new_block();
        builder.current = Some(entry);
        builder.block(body);
        if let Some(current) = builder.current {
            builder.edge(current, builder.exit);
        }

        ControlFlowGraph {
            name: name.to_string(),
            blocks: builder.blocks,
            entry,
            exit: builder.exit,
        }
    }

    /// Non-empty blocks that no path from the entry reaches.
    pub fn unreachable_blocks(&self) -> Vec<&BasicBlock> {
        let mut reachable = vec![false; self.blocks.len()];
        let mut stack = vec![self.entry];
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut reachable[id], true) {
                continue;
            }
            stack.extend(self.blocks[id].successors.iter().copied());
        }
        self.blocks
            .iter()
            .filter(|b| !reachable[b.id] && !b.statements.is_empty())
            .collect()
    }

    pub fn edge_count(&self) -> usize {
        self.blocks.iter().map(|b| b.successors.len()).sum()
    }
}

struct Builder {
    blocks: Vec<BasicBlock>,
    /// `None` after an unconditional transfer: the next statement starts a
    /// block nothing jumps to.
    current: Option<BlockId>,
    /// (continue target, break target) per enclosing loop.
    loops: Vec<(BlockId, BlockId)>,
    exit: BlockId,
}

impl Builder {
    fn new_block(&mut self) -> BlockId {
        let id = self.blocks.len();
        self.blocks.push(BasicBlock {
            id,
            ..Default::default()
        });
        id
    }

    fn edge(&mut self, from: BlockId, to: BlockId) {
        if !self.blocks[from].successors.contains(&to) {
            self.blocks[from].successors.push(to);
            self.blocks[to].predecessors.push(from);
        }
    }

    fn current_or_new(&mut self) -> BlockId {
        match self.current {
            Some(id) => id,
            None => {
                let id = self.new_block();
                self.current = Some(id);
                id
            }
        }
    }

    fn append(&mut self, pos: Position) -> BlockId {
        let id = self.current_or_new();
        self.blocks[id].statements.push(pos);
        id
    }

    fn jump(&mut self, pos: Position, target: BlockId) {
        let from = self.append(pos);
        self.edge(from, target);
        self.current = None;
    }

    fn block(&mut self, block: &Block) {
        for stmt in &block.statements {
            self.statement(stmt);
        }
    }

    fn statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::FunctionDefinition(_) => {}
            Statement::Block(block) => self.block(block),
            Statement::VariableDeclaration(_) | Statement::Assignment(_) => {
                self.append(stmt.pos());
            }
            Statement::Expression(expr) => {
                if terminates(expr) {
                    self.jump(stmt.pos(), self.exit);
                } else {
                    self.append(stmt.pos());
                }
            }
            Statement::If(s) => {
                let head = self.append(s.pos);
                let then = self.new_block();
                let join = self.new_block();
                self.edge(head, then);
                self.edge(head, join);
                self.current = Some(then);
                self.block(&s.body);
                if let Some(end) = self.current {
                    self.edge(end, join);
                }
                self.current = Some(join);
            }
            Statement::Switch(s) => {
                let head = self.append(s.pos);
                let join = self.new_block();
                let bodies = s.cases.iter().map(|c| &c.body).chain(s.default.iter());
                for body in bodies {
                    let case = self.new_block();
                    self.edge(head, case);
                    self.current = Some(case);
                    self.block(body);
                    if let Some(end) = self.current {
                        self.edge(end, join);
                    }
                }
                if s.default.is_none() {
                    self.edge(head, join);
                }
                self.current = Some(join);
            }
            Statement::ForLoop(l) => {
                self.block(&l.init);
                let before = self.current_or_new();
                let cond = self.new_block();
                let body = self.new_block();
                let post = self.new_block();
                let exit = self.new_block();
                self.edge(before, cond);
                self.blocks[cond].statements.push(l.condition.pos());
                self.edge(cond, body);
                self.edge(cond, exit);

                self.loops.push((post, exit));
                self.current = Some(body);
                self.block(&l.body);
                if let Some(end) = self.current {
                    self.edge(end, post);
                }
                self.loops.pop();

                self.current = Some(post);
                self.block(&l.post);
                if let Some(end) = self.current {
                    self.edge(end, cond);
                }
                self.current = Some(exit);
            }
            Statement::Break(pos) => match self.loops.last() {
                Some(&(_, brk)) => self.jump(*pos, brk),
                None => self.jump(*pos, self.exit),
            },
            Statement::Continue(pos) => match self.loops.last() {
                Some(&(cont, _)) => self.jump(*pos, cont),
                None => self.jump(*pos, self.exit),
            },
            Statement::Leave(pos) => self.jump(*pos, self.exit),
        }
    }
}

/// Whether an expression statement unconditionally ends execution.
pub fn terminates(expr: &Expression) -> bool {
    match expr {
        Expression::FunctionCall(call) => {
            builtins::lookup(&call.name.name).is_some_and(|b| b.terminates)
        }
        _ => false,
    }
}
