//! Code generation: normalized syntax tree to instructions with symbolic
//! labels.
//!
//! Calling convention:
//!
//! - the first argument of any call is on top of the stack, so arguments are
//!   evaluated right to left
//! - a function's `INITSLOT` moves its arguments into argument slots; named
//!   returns occupy local slots `0..n` and `let` variables follow them
//! - `RET` leaves the returns on the stack with the first return on top
//!
//! The top-level code is emitted first at address 0 and ends in `RET`.
//! Functions follow it, depth first in definition order.

use std::collections::HashMap;

use alloy_primitives::U256;
use indexmap::IndexMap;
use strum::Display;
use tracing::debug;

use crate::analysis::function_label;
use crate::bytecode::artifact::{
    CompiledArtifact, DebugInfo, Event, EventParameter, FunctionRange, MAIN_ENTRY, Method,
    Parameter,
};
use crate::bytecode::assembly::Assembly;
use crate::bytecode::compile_error::CodegenError;
use crate::bytecode::op::{Instruction, Op};
use crate::config::CompilerOptions;
use crate::context::StorageLocation;
use crate::lang::builtins::{self, Builtin, Lowering, NOTIFY_PRICE, NOTIFY_SERVICE};
use crate::lang::literal::LiteralValue;
use crate::lang::node::{
    Assignment, Block, Expression, ForLoop, FunctionCall, FunctionDefinition, If, LabelId,
    Literal, Object, Position, Statement, Switch, TypedName, VariableDeclaration,
};
use crate::lang::types::TypeTable;

/// Slot operands are one byte wide.
const MAX_SLOTS: usize = 255;

const MAIN_END: &str = "main_end";

/// Emission phase of the function being generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum FrameState {
    Entry,
    BodyEmission,
    ReturnEmission,
    Resolved,
}

impl FrameState {
    fn successor(self) -> Option<FrameState> {
        match self {
            FrameState::Entry => Some(FrameState::BodyEmission),
            FrameState::BodyEmission => Some(FrameState::ReturnEmission),
            FrameState::ReturnEmission => Some(FrameState::Resolved),
            FrameState::Resolved => None,
        }
    }
}

/// What the generator learned about one user function.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionInfo {
    pub name: String,
    pub label: String,
    pub parameters: Vec<TypedName>,
    pub returns: Vec<TypedName>,
    /// Defined directly in the object's top-level block.
    pub top_level: bool,
    pub max_depth: usize,
    pub locals: usize,
    /// Calls a state-mutating built-in itself.
    pub mutates: bool,
    /// Labels of the user functions it calls.
    pub calls: Vec<String>,
    pub pos: Position,
}

impl FunctionInfo {
    pub fn end_label(&self) -> String {
        format!("{}_end", self.label)
    }
}

/// Output of code generation, before label resolution.
#[derive(Debug, Clone)]
pub struct Generated {
    pub assembly: Assembly,
    pub functions: Vec<FunctionInfo>,
    /// Event name → number of indexed topics, in first-emission order.
    pub events: IndexMap<String, usize>,
    /// `function.variable` → slot.
    pub variables: IndexMap<String, StorageLocation>,
    pub max_stack_depth: usize,
}

/// Call target visible in a scope.
#[derive(Debug, Clone)]
struct FunctionRef {
    label: String,
    params: usize,
    returns: usize,
}

/// A function body waiting to be emitted, with the functions visible from
/// its definition site.
#[derive(Debug)]
struct Job<'a> {
    def: &'a FunctionDefinition,
    info: usize,
    scopes: Vec<IndexMap<String, FunctionRef>>,
}

#[derive(Debug, Clone)]
struct LoopLabels {
    cont: String,
    brk: String,
    /// Switch discriminants live when the loop was entered.
    switches: usize,
}

#[derive(Debug)]
struct Frame<'a> {
    name: String,
    state: FrameState,
    depth: usize,
    max_depth: usize,
    next_local: usize,
    scopes: Vec<IndexMap<String, StorageLocation>>,
    loops: Vec<LoopLabels>,
    /// Switch discriminants currently on the stack.
    switches: usize,
    leave_label: Option<String>,
    info: Option<usize>,
    nested: Vec<Job<'a>>,
}

impl Frame<'_> {
    fn new(name: &str, next_local: usize, leave_label: Option<String>, info: Option<usize>) -> Self {
        Self {
            name: name.to_string(),
            state: FrameState::Entry,
            depth: 0,
            max_depth: 0,
            next_local,
            scopes: Vec::new(),
            loops: Vec::new(),
            switches: 0,
            leave_label,
            info,
            nested: Vec::new(),
        }
    }

    fn advance(&mut self, to: FrameState) -> Result<(), CodegenError> {
        if self.state.successor() != Some(to) {
            return Err(CodegenError::InvalidState {
                function: self.name.clone(),
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        self.state = to;
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<&StorageLocation> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }
}

pub struct Compiler<'a> {
    options: CompilerOptions,
    asm: Assembly,
    frame: Frame<'a>,
    functions: Vec<FunctionInfo>,
    fn_scopes: Vec<IndexMap<String, FunctionRef>>,
    events: IndexMap<String, usize>,
    variables: IndexMap<String, StorageLocation>,
    max_stack_depth: usize,
    guards: usize,
    fresh_labels: u32,
    pos: Position,
}

/// Generates code for the top-level block of `object` and every function in
/// it. Nested objects are not visited.
pub fn generate(object: &Object, options: &CompilerOptions) -> Result<Generated, CodegenError> {
    Compiler::new(options).compile_object(object)
}

impl<'a> Compiler<'a> {
    pub fn new(options: &CompilerOptions) -> Self {
        Self {
            options: options.clone(),
            asm: Assembly::new(),
            frame: Frame::new(MAIN_ENTRY, 0, None, None),
            functions: Vec::new(),
            fn_scopes: Vec::new(),
            events: IndexMap::new(),
            variables: IndexMap::new(),
            max_stack_depth: 0,
            guards: 0,
            fresh_labels: 0,
            pos: Position::default(),
        }
    }

    pub fn compile_object(mut self, object: &'a Object) -> Result<Generated, CodegenError> {
        self.pos = object.pos;
        self.define(MAIN_ENTRY)?;
        self.emit_frame_setup(MAIN_ENTRY, count_locals(&object.code), 0)?;
        self.frame.advance(FrameState::BodyEmission)?;
        self.compile_block(&object.code, true)?;
        self.frame.advance(FrameState::ReturnEmission)?;
        self.emit_op(Op::Ret)?;
        self.define(MAIN_END)?;
        self.frame.advance(FrameState::Resolved)?;

        for job in self.finish_frame()? {
            self.compile_function(job)?;
        }

        debug!(
            object = %object.name,
            instructions = self.asm.len(),
            functions = self.functions.len(),
            max_stack_depth = self.max_stack_depth,
            "generated"
        );
        Ok(Generated {
            assembly: self.asm,
            functions: self.functions,
            events: self.events,
            variables: self.variables,
            max_stack_depth: self.max_stack_depth,
        })
    }

    fn compile_function(&mut self, job: Job<'a>) -> Result<(), CodegenError> {
        let Job { def, info, scopes } = job;
        let saved_scopes = std::mem::replace(&mut self.fn_scopes, scopes);
        let label = self.functions[info].label.clone();
        let returns = def.returns.len();
        let leave = format!("{}_leave", label);

        self.frame = Frame::new(&def.name, returns, Some(leave.clone()), Some(info));
        self.pos = def.pos;
        self.define(&label)?;
        self.emit_frame_setup(
            &def.name,
            returns + count_locals(&def.body),
            def.parameters.len(),
        )?;
        for slot in 0..returns {
            self.emit(Instruction::push_int(U256::ZERO))?;
            self.emit(Instruction::with_operand(Op::StLoc, vec![slot_operand(&def.name, slot)?]))?;
        }
        self.frame.advance(FrameState::BodyEmission)?;

        let mut scope = IndexMap::new();
        for (index, param) in def.parameters.iter().enumerate() {
            self.record_variable(&param.name, StorageLocation::Argument(index));
            scope.insert(param.name.clone(), StorageLocation::Argument(index));
        }
        for (index, ret) in def.returns.iter().enumerate() {
            self.record_variable(&ret.name, StorageLocation::Return(index));
            scope.insert(ret.name.clone(), StorageLocation::Return(index));
        }
        self.frame.scopes.push(scope);
        self.compile_block(&def.body, false)?;
        self.frame.scopes.pop();

        self.frame.advance(FrameState::ReturnEmission)?;
        self.pos = def.pos;
        self.define(&leave)?;
        for slot in (0..returns).rev() {
            self.emit(Instruction::with_operand(Op::LdLoc, vec![slot_operand(&def.name, slot)?]))?;
        }
        self.emit_op(Op::Ret)?;
        self.define(&format!("{}_end", label))?;
        self.frame.advance(FrameState::Resolved)?;

        let nested = self.finish_frame()?;
        self.fn_scopes = saved_scopes;
        for job in nested {
            self.compile_function(job)?;
        }
        Ok(())
    }

    /// Checks the frame against the configured limits and hands back the
    /// function bodies defined inside it.
    fn finish_frame(&mut self) -> Result<Vec<Job<'a>>, CodegenError> {
        let limit = self.options.max_stack_depth;
        if self.frame.max_depth > limit {
            return Err(CodegenError::StackTooDeep {
                function: self.frame.name.clone(),
                depth: self.frame.max_depth,
                limit,
            });
        }
        self.max_stack_depth = self.max_stack_depth.max(self.frame.max_depth);
        if let Some(info) = self.frame.info {
            self.functions[info].max_depth = self.frame.max_depth;
            self.functions[info].locals = self.frame.next_local;
        }
        debug!(
            function = %self.frame.name,
            depth = self.frame.max_depth,
            locals = self.frame.next_local,
            "function emitted"
        );
        Ok(std::mem::take(&mut self.frame.nested))
    }

    fn emit_frame_setup(
        &mut self,
        function: &str,
        locals: usize,
        params: usize,
    ) -> Result<(), CodegenError> {
        for count in [locals, params] {
            if count > MAX_SLOTS {
                return Err(CodegenError::TooManyLocals {
                    function: function.to_string(),
                    count,
                });
            }
        }
        if locals > 0 || params > 0 {
            self.emit(Instruction::with_operand(
                Op::InitSlot,
                vec![locals as u8, params as u8],
            ))?;
        }
        Ok(())
    }

    // =========================================================================
    // EMISSION
    // =========================================================================

    fn emit(&mut self, mut instruction: Instruction) -> Result<usize, CodegenError> {
        self.track(&instruction)?;
        instruction.source.get_or_insert(self.pos);
        Ok(self.asm.emit(instruction))
    }

    fn emit_op(&mut self, op: Op) -> Result<usize, CodegenError> {
        self.emit(Instruction::new(op))
    }

    fn emit_jump(&mut self, op: Op, label: &str) -> Result<usize, CodegenError> {
        self.emit_to_label(Instruction::jump(op), label)
    }

    fn emit_to_label(
        &mut self,
        mut instruction: Instruction,
        label: &str,
    ) -> Result<usize, CodegenError> {
        self.track(&instruction)?;
        instruction.source.get_or_insert(self.pos);
        Ok(self.asm.emit_labelled(instruction, label))
    }

    fn emit_syscall(
        &mut self,
        service: &str,
        price: u64,
        pops: usize,
        pushes: usize,
    ) -> Result<usize, CodegenError> {
        let id = builtins::syscall_id(service);
        self.emit(
            Instruction::with_operand(Op::Syscall, id.to_le_bytes().to_vec())
                .with_effect(pops, pushes)
                .with_cost(price),
        )
    }

    /// Applies the instruction's stack effect to the current frame.
    fn track(&mut self, instruction: &Instruction) -> Result<(), CodegenError> {
        let frame = &mut self.frame;
        frame.depth = frame.depth.checked_sub(instruction.pops).ok_or_else(|| {
            CodegenError::internal(format!(
                "stack underflow at {} in '{}'",
                instruction.opcode, frame.name
            ))
        })?;
        frame.depth += instruction.pushes;
        frame.max_depth = frame.max_depth.max(frame.depth);
        Ok(())
    }

    fn define(&mut self, label: &str) -> Result<(), CodegenError> {
        self.asm.define_label(label)
    }

    fn label_base(&mut self, id: Option<LabelId>) -> String {
        match id {
            Some(id) => id.0.to_string(),
            None => {
                self.fresh_labels += 1;
                format!("x{}", self.fresh_labels)
            }
        }
    }

    fn guard_label(&mut self) -> String {
        self.guards += 1;
        format!("guard_{}_ok", self.guards)
    }

    // =========================================================================
    // SCOPES
    // =========================================================================

    /// Opens a scope for `block`, making its functions callable.
    fn open_scope(&mut self, block: &'a Block, top_level: bool) {
        self.frame.scopes.push(IndexMap::new());

        let mut scope = IndexMap::new();
        let mut defined = Vec::new();
        for stmt in &block.statements {
            let Statement::FunctionDefinition(def) = stmt else {
                continue;
            };
            let label = function_label(self.functions.len(), &def.name);
            scope.insert(
                def.name.clone(),
                FunctionRef {
                    label: label.clone(),
                    params: def.parameters.len(),
                    returns: def.returns.len(),
                },
            );
            self.functions.push(FunctionInfo {
                name: def.name.clone(),
                label,
                parameters: def.parameters.clone(),
                returns: def.returns.clone(),
                top_level,
                max_depth: 0,
                locals: 0,
                mutates: false,
                calls: Vec::new(),
                pos: def.pos,
            });
            defined.push((def, self.functions.len() - 1));
        }
        self.fn_scopes.push(scope);

        for (def, info) in defined {
            self.frame.nested.push(Job {
                def,
                info,
                scopes: self.fn_scopes.clone(),
            });
        }
    }

    fn close_scope(&mut self) {
        self.fn_scopes.pop();
        self.frame.scopes.pop();
    }

    fn resolve_function(&self, name: &str) -> Option<&FunctionRef> {
        self.fn_scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn declare_local(&mut self, var: &TypedName) -> Result<usize, CodegenError> {
        let slot = self.frame.next_local;
        self.frame.next_local += 1;
        if slot >= MAX_SLOTS {
            return Err(CodegenError::TooManyLocals {
                function: self.frame.name.clone(),
                count: slot + 1,
            });
        }
        if let Some(scope) = self.frame.scopes.last_mut() {
            scope.insert(var.name.clone(), StorageLocation::Local(slot));
        }
        self.record_variable(&var.name, StorageLocation::Local(slot));
        Ok(slot)
    }

    fn record_variable(&mut self, name: &str, location: StorageLocation) {
        self.variables
            .entry(format!("{}.{}", self.frame.name, name))
            .or_insert(location);
    }

    fn load(&mut self, location: &StorageLocation) -> Result<(), CodegenError> {
        let (op, slot) = match location {
            StorageLocation::Local(slot) | StorageLocation::Return(slot) => (Op::LdLoc, *slot),
            StorageLocation::Argument(slot) => (Op::LdArg, *slot),
            other => return Err(CodegenError::internal(format!("cannot load from {}", other))),
        };
        let operand = slot_operand(&self.frame.name, slot)?;
        self.emit(Instruction::with_operand(op, vec![operand]))?;
        Ok(())
    }

    fn store(&mut self, location: &StorageLocation) -> Result<(), CodegenError> {
        let (op, slot) = match location {
            StorageLocation::Local(slot) | StorageLocation::Return(slot) => (Op::StLoc, *slot),
            StorageLocation::Argument(slot) => (Op::StArg, *slot),
            other => return Err(CodegenError::internal(format!("cannot store to {}", other))),
        };
        let operand = slot_operand(&self.frame.name, slot)?;
        self.emit(Instruction::with_operand(op, vec![operand]))?;
        Ok(())
    }

    // =========================================================================
    // STATEMENTS
    // =========================================================================

    fn compile_block(&mut self, block: &'a Block, top_level: bool) -> Result<(), CodegenError> {
        self.open_scope(block, top_level);
        for stmt in &block.statements {
            self.compile_statement(stmt)?;
        }
        self.close_scope();
        Ok(())
    }

    fn compile_statement(&mut self, stmt: &'a Statement) -> Result<(), CodegenError> {
        self.pos = stmt.pos();
        match stmt {
            Statement::Block(block) => self.compile_block(block, false),
            // emitted after the enclosing function
            Statement::FunctionDefinition(_) => Ok(()),
            Statement::VariableDeclaration(decl) => self.compile_declaration(decl),
            Statement::Assignment(assign) => self.compile_assignment(assign),
            Statement::If(s) => self.compile_if(s),
            Statement::Switch(s) => self.compile_switch(s),
            Statement::ForLoop(l) => self.compile_for(l),
            Statement::Break(pos) => {
                let target = self
                    .frame
                    .loops
                    .last()
                    .cloned()
                    .ok_or_else(|| CodegenError::unsupported("break", "outside of a loop", *pos))?;
                self.compile_exit(self.frame.switches - target.switches, &target.brk)
            }
            Statement::Continue(pos) => {
                let target = self.frame.loops.last().cloned().ok_or_else(|| {
                    CodegenError::unsupported("continue", "outside of a loop", *pos)
                })?;
                self.compile_exit(self.frame.switches - target.switches, &target.cont)
            }
            Statement::Leave(pos) => {
                let label = self.frame.leave_label.clone().ok_or_else(|| {
                    CodegenError::unsupported("leave", "outside of a function", *pos)
                })?;
                self.compile_exit(self.frame.switches, &label)
            }
            Statement::Expression(expr) => {
                let yielded = self.compile_expression(expr)?;
                for _ in 0..yielded {
                    self.emit_op(Op::Drop)?;
                }
                Ok(())
            }
        }
    }

    /// Drops `discriminants` switch values and jumps to `label`. Tracking
    /// resumes at the depth before the jump for the unreachable code after it.
    fn compile_exit(&mut self, discriminants: usize, label: &str) -> Result<(), CodegenError> {
        let saved = self.frame.depth;
        for _ in 0..discriminants {
            self.emit_op(Op::Drop)?;
        }
        self.emit_jump(Op::JmpL, label)?;
        self.frame.depth = saved;
        Ok(())
    }

    fn compile_declaration(&mut self, decl: &'a VariableDeclaration) -> Result<(), CodegenError> {
        let count = match &decl.value {
            Some(value) => self.compile_expression(value)?,
            None => {
                for _ in &decl.variables {
                    self.emit(Instruction::push_int(U256::ZERO))?;
                }
                decl.variables.len()
            }
        };
        if count != decl.variables.len() {
            return Err(CodegenError::internal(format!(
                "declaration of {} variable(s) from {} value(s)",
                decl.variables.len(),
                count
            )));
        }
        self.pos = decl.pos;
        // values are visible only after the whole declaration
        for var in &decl.variables {
            let slot = self.declare_local(var)?;
            let operand = slot_operand(&self.frame.name, slot)?;
            self.emit(Instruction::with_operand(Op::StLoc, vec![operand]))?;
        }
        Ok(())
    }

    fn compile_assignment(&mut self, assign: &'a Assignment) -> Result<(), CodegenError> {
        let count = self.compile_expression(&assign.value)?;
        if count != assign.targets.len() {
            return Err(CodegenError::internal(format!(
                "assignment to {} target(s) from {} value(s)",
                assign.targets.len(),
                count
            )));
        }
        self.pos = assign.pos;
        for target in &assign.targets {
            let location = self.frame.lookup(&target.name).cloned().ok_or_else(|| {
                CodegenError::unsupported(&target.name, "undeclared variable", target.pos)
            })?;
            self.store(&location)?;
        }
        Ok(())
    }

    fn compile_if(&mut self, s: &'a If) -> Result<(), CodegenError> {
        let end = format!("if_{}_end", self.label_base(s.label));
        self.compile_value(&s.condition)?;
        self.pos = s.pos;
        self.emit_jump(Op::JmpIfNotL, &end)?;
        self.compile_block(&s.body, false)?;
        self.define(&end)
    }

    fn compile_switch(&mut self, s: &'a Switch) -> Result<(), CodegenError> {
        let base = self.label_base(s.label);
        let end = format!("switch_{}_end", base);

        self.compile_value(&s.expression)?;
        self.frame.switches += 1;

        let mut bodies: Vec<(String, &'a Block, Position)> = Vec::new();
        for (index, case) in s.cases.iter().enumerate() {
            self.pos = case.pos;
            let label = format!("switch_{}_case_{}", base, index);
            let value = literal_word(&case.value)?;
            self.emit_op(Op::Dup)?;
            self.emit(Instruction::push_int(value))?;
            self.emit_op(Op::Equal)?;
            self.emit_jump(Op::JmpIfL, &label)?;
            bodies.push((label, &case.body, case.pos));
        }
        let fallback = match &s.default {
            Some(default) => {
                let label = format!("switch_{}_default", base);
                bodies.push((label.clone(), default, default.pos));
                label
            }
            None => end.clone(),
        };
        self.pos = s.pos;
        self.emit_jump(Op::JmpL, &fallback)?;

        for (label, body, pos) in bodies {
            self.define(&label)?;
            let before = self.frame.depth;
            self.compile_block(body, false)?;
            if self.frame.depth != before {
                return Err(CodegenError::UnbalancedCase {
                    delta: self.frame.depth as i64 - before as i64,
                    pos,
                });
            }
            self.pos = pos;
            self.emit_jump(Op::JmpL, &end)?;
        }

        self.define(&end)?;
        self.pos = s.pos;
        self.emit_op(Op::Drop)?;
        self.frame.switches -= 1;
        Ok(())
    }

    fn compile_for(&mut self, l: &'a ForLoop) -> Result<(), CodegenError> {
        let base = self.label_base(l.label);
        let cond = format!("for_{}_cond", base);
        let post = format!("for_{}_post", base);
        let end = format!("for_{}_end", base);

        // init variables stay visible in condition, body and post
        self.open_scope(&l.init, false);
        for stmt in &l.init.statements {
            self.compile_statement(stmt)?;
        }

        self.define(&cond)?;
        self.compile_value(&l.condition)?;
        self.pos = l.pos;
        self.emit_jump(Op::JmpIfNotL, &end)?;

        self.frame.loops.push(LoopLabels {
            cont: post.clone(),
            brk: end.clone(),
            switches: self.frame.switches,
        });
        self.compile_block(&l.body, false)?;
        self.frame.loops.pop();

        self.define(&post)?;
        self.compile_block(&l.post, false)?;
        self.pos = l.pos;
        self.emit_jump(Op::JmpL, &cond)?;
        self.define(&end)?;

        self.close_scope();
        Ok(())
    }

    // =========================================================================
    // EXPRESSIONS
    // =========================================================================

    /// Compiles an expression that must yield exactly one value.
    fn compile_value(&mut self, expr: &'a Expression) -> Result<(), CodegenError> {
        match self.compile_expression(expr)? {
            1 => Ok(()),
            n => Err(CodegenError::internal(format!(
                "expected a single value at {}, got {}",
                expr.pos(),
                n
            ))),
        }
    }

    /// Compiles an expression and returns the number of values it pushed.
    fn compile_expression(&mut self, expr: &'a Expression) -> Result<usize, CodegenError> {
        let saved = self.pos;
        self.pos = expr.pos();
        let pushed = match expr {
            Expression::Literal(literal) => {
                self.emit(Instruction::push_int(literal_word(literal)?))?;
                1
            }
            Expression::Identifier(ident) => {
                let location = self.frame.lookup(&ident.name).cloned().ok_or_else(|| {
                    CodegenError::unsupported(&ident.name, "undeclared variable", ident.pos)
                })?;
                self.load(&location)?;
                1
            }
            Expression::FunctionCall(call) => match builtins::lookup(&call.name.name) {
                Some(builtin) => self.compile_builtin(builtin, call)?,
                None => self.compile_call(call)?,
            },
        };
        self.pos = saved;
        Ok(pushed)
    }

    /// Pushes the arguments last to first.
    fn compile_arguments(&mut self, arguments: &'a [Expression]) -> Result<(), CodegenError> {
        for arg in arguments.iter().rev() {
            self.compile_value(arg)?;
        }
        Ok(())
    }

    fn compile_builtin(
        &mut self,
        builtin: &Builtin,
        call: &'a FunctionCall,
    ) -> Result<usize, CodegenError> {
        if call.arguments.len() != builtin.args {
            return Err(CodegenError::internal(format!(
                "'{}' called with {} argument(s)",
                builtin.name,
                call.arguments.len()
            )));
        }
        if builtin.state_mutating {
            if let Some(info) = self.frame.info {
                self.functions[info].mutates = true;
            }
        }

        match builtin.lowering {
            Lowering::Opcode(op) => {
                self.compile_arguments(&call.arguments)?;
                self.pos = call.pos;
                if let Some(divisor) = builtin.divisor {
                    self.emit_division_guard(divisor)?;
                }
                self.emit_op(op)?;
            }
            Lowering::Syscall { name, price } => {
                if let Some(width) = builtin.memory {
                    self.check_literal_offset(call, width)?;
                }
                self.compile_arguments(&call.arguments)?;
                self.pos = call.pos;
                if let Some(width) = builtin.memory {
                    if self.options.enable_bounds_checking {
                        self.emit_bounds_check(width)?;
                    }
                }
                self.emit_syscall(name, price, builtin.args, builtin.rets)?;
            }
            Lowering::Notify { topics } => self.compile_event(builtin, call, topics)?,
            Lowering::Abort => {
                self.compile_arguments(&call.arguments)?;
                self.pos = call.pos;
                self.emit(Instruction::new(Op::Abort).with_effect(builtin.args, 0))?;
            }
            Lowering::Composite => {
                return Err(CodegenError::unsupported(
                    builtin.name,
                    "must be expanded before code generation",
                    call.pos,
                ));
            }
        }
        Ok(builtin.rets)
    }

    /// Aborts when the divisor, `index` values below the top, is zero.
    fn emit_division_guard(&mut self, index: usize) -> Result<(), CodegenError> {
        let ok = self.guard_label();
        match index {
            1 => {
                self.emit_op(Op::Over)?;
            }
            n => {
                self.emit(Instruction::push_int(U256::from(n)))?;
                self.emit_op(Op::Pick)?;
            }
        }
        self.emit(Instruction::push_int(U256::ZERO))?;
        self.emit_op(Op::Equal)?;
        self.emit_jump(Op::JmpIfNotL, &ok)?;
        self.emit_op(Op::Abort)?;
        self.define(&ok)
    }

    /// Aborts when the offset on top of the stack leaves fewer than `width`
    /// bytes of memory.
    fn emit_bounds_check(&mut self, width: u32) -> Result<(), CodegenError> {
        let ok = self.guard_label();
        let highest = self.options.memory_limit_bytes.saturating_sub(u64::from(width));
        self.emit_op(Op::Dup)?;
        self.emit(Instruction::push_int(U256::from(highest)))?;
        // LT takes the limit from the top: limit < offset
        self.emit_op(Op::Lt)?;
        self.emit_jump(Op::JmpIfNotL, &ok)?;
        self.emit_op(Op::Abort)?;
        self.define(&ok)
    }

    fn check_literal_offset(&self, call: &FunctionCall, width: u32) -> Result<(), CodegenError> {
        let Some(offset) = call
            .arguments
            .first()
            .and_then(Expression::as_literal)
            .and_then(|literal| literal.value.word())
        else {
            return Ok(());
        };
        let limit = self.options.memory_limit_bytes;
        if offset.saturating_add(U256::from(width)) > U256::from(limit) {
            return Err(CodegenError::MemoryOutOfBounds {
                offset: offset.to_string(),
                limit,
                pos: call.pos,
            });
        }
        Ok(())
    }

    /// `logN(name, t1..tN, data)`: packs `[t1..tN, data]` and notifies with
    /// the event name.
    fn compile_event(
        &mut self,
        builtin: &Builtin,
        call: &'a FunctionCall,
        topics: usize,
    ) -> Result<(), CodegenError> {
        let Some(Expression::Literal(Literal {
            value: LiteralValue::String(name),
            ..
        })) = call.arguments.first()
        else {
            return Err(CodegenError::unsupported(
                builtin.name,
                "event name must be a string literal",
                call.pos,
            ));
        };
        let Ok(name) = std::str::from_utf8(name) else {
            return Err(CodegenError::unsupported(
                builtin.name,
                "event name must be valid UTF-8",
                call.pos,
            ));
        };
        if name.len() > usize::from(u8::MAX) {
            return Err(CodegenError::unsupported(
                builtin.name,
                format!("event name is {} bytes, at most 255 fit", name.len()),
                call.pos,
            ));
        }

        self.compile_arguments(&call.arguments[1..])?;
        self.pos = call.pos;
        self.emit(Instruction::push_int(U256::from(topics + 1)))?;
        self.emit(Instruction::new(Op::Pack).with_effect(topics + 2, 1))?;
        self.emit(Instruction::push_data(name.as_bytes()))?;
        self.emit_syscall(NOTIFY_SERVICE, NOTIFY_PRICE, 2, 0)?;
        self.events.entry(name.to_string()).or_insert(topics);
        Ok(())
    }

    fn compile_call(&mut self, call: &'a FunctionCall) -> Result<usize, CodegenError> {
        let callee = self
            .resolve_function(&call.name.name)
            .cloned()
            .ok_or_else(|| {
                CodegenError::unsupported(&call.name.name, "unknown function", call.pos)
            })?;
        if callee.params != call.arguments.len() {
            return Err(CodegenError::internal(format!(
                "'{}' called with {} argument(s)",
                call.name.name,
                call.arguments.len()
            )));
        }

        self.compile_arguments(&call.arguments)?;
        self.pos = call.pos;
        self.emit_to_label(
            Instruction::jump(Op::CallL).with_effect(callee.params, callee.returns),
            &callee.label,
        )?;
        if let Some(info) = self.frame.info {
            let calls = &mut self.functions[info].calls;
            if !calls.contains(&callee.label) {
                calls.push(callee.label.clone());
            }
        }
        Ok(callee.returns)
    }
}

fn slot_operand(function: &str, slot: usize) -> Result<u8, CodegenError> {
    u8::try_from(slot).map_err(|_| CodegenError::TooManyLocals {
        function: function.to_string(),
        count: slot + 1,
    })
}

fn literal_word(literal: &Literal) -> Result<U256, CodegenError> {
    literal.value.word().ok_or_else(|| {
        CodegenError::unsupported(
            &literal.value.to_string(),
            "literal does not fit in a word",
            literal.pos,
        )
    })
}

/// Number of `let` variables a function body declares, nested function
/// bodies excluded.
fn count_locals(block: &Block) -> usize {
    block
        .statements
        .iter()
        .map(|stmt| match stmt {
            Statement::VariableDeclaration(decl) => decl.variables.len(),
            Statement::Block(inner) => count_locals(inner),
            Statement::If(s) => count_locals(&s.body),
            Statement::Switch(s) => {
                s.cases.iter().map(|c| count_locals(&c.body)).sum::<usize>()
                    + s.default.as_ref().map_or(0, count_locals)
            }
            Statement::ForLoop(l) => {
                count_locals(&l.init) + count_locals(&l.body) + count_locals(&l.post)
            }
            _ => 0,
        })
        .sum()
}

// =============================================================================
// ARTIFACT
// =============================================================================

impl Generated {
    /// Resolves labels and builds the artifact. `constants` lists the
    /// object's constant functions; `types` maps annotations to ABI names.
    pub fn into_artifact(
        self,
        name: &str,
        options: &CompilerOptions,
        types: &TypeTable,
        constants: IndexMap<String, U256>,
    ) -> Result<CompiledArtifact, CodegenError> {
        let resolved = self.assembly.resolve()?;
        let mutating = self.mutating_closure();

        let mut artifact = CompiledArtifact::new(name, &options.target_version);
        artifact.entry_points.insert(MAIN_ENTRY.to_string(), 0);

        for (index, function) in self.functions.iter().enumerate() {
            if !function.top_level || function.name.starts_with('_') {
                continue;
            }
            let address = resolved
                .address_of(&function.label)
                .ok_or_else(|| CodegenError::unresolved(&function.label))?;
            artifact.entry_points.insert(function.name.clone(), address);
            artifact.methods.push(Method {
                name: function.name.clone(),
                parameters: abi_parameters(types, &function.parameters)?,
                returns: abi_parameters(types, &function.returns)?,
                address,
                safe: !mutating[index],
            });
        }

        let word = abi_name(types, None)?;
        for (event, topics) in &self.events {
            let mut parameters: Vec<EventParameter> = (0..*topics)
                .map(|i| EventParameter {
                    name: format!("topic{}", i),
                    ty: word.clone(),
                    indexed: true,
                })
                .collect();
            parameters.push(EventParameter {
                name: "data".to_string(),
                ty: word.clone(),
                indexed: false,
            });
            artifact.events.push(Event {
                name: event.clone(),
                parameters,
            });
        }

        if options.enable_debug_info {
            let mut debug = DebugInfo::default();
            for (index, instruction) in self.assembly.instructions.iter().enumerate() {
                if let Some(pos) = instruction.source {
                    debug.source_map.entry(resolved.addresses[index]).or_insert(pos);
                }
            }
            let main_end = resolved
                .address_of(MAIN_END)
                .ok_or_else(|| CodegenError::unresolved(MAIN_END))?;
            debug.functions.insert(
                MAIN_ENTRY.to_string(),
                FunctionRange {
                    start: 0,
                    end: main_end,
                },
            );
            for function in &self.functions {
                let start = resolved
                    .address_of(&function.label)
                    .ok_or_else(|| CodegenError::unresolved(&function.label))?;
                let end_label = function.end_label();
                let end = resolved
                    .address_of(&end_label)
                    .ok_or_else(|| CodegenError::unresolved(&end_label))?;
                let key = if debug.functions.contains_key(&function.name) {
                    function.label.clone()
                } else {
                    function.name.clone()
                };
                debug.functions.insert(key, FunctionRange { start, end });
            }
            debug.variables = self.variables;
            artifact.debug = Some(debug);
        }

        artifact.bytecode = resolved.bytecode;
        artifact.constants = constants;
        artifact.max_stack_depth = self.max_stack_depth;
        Ok(artifact)
    }

    /// Whether each function mutates state, itself or through its callees.
    fn mutating_closure(&self) -> Vec<bool> {
        let by_label: HashMap<&str, usize> = self
            .functions
            .iter()
            .enumerate()
            .map(|(i, f)| (f.label.as_str(), i))
            .collect();
        let mut mutating: Vec<bool> = self.functions.iter().map(|f| f.mutates).collect();
        loop {
            let mut changed = false;
            for (i, function) in self.functions.iter().enumerate() {
                if mutating[i] {
                    continue;
                }
                if function
                    .calls
                    .iter()
                    .any(|label| by_label.get(label.as_str()).is_some_and(|&j| mutating[j]))
                {
                    mutating[i] = true;
                    changed = true;
                }
            }
            if !changed {
                return mutating;
            }
        }
    }
}

fn abi_name(types: &TypeTable, annotation: Option<&str>) -> Result<String, CodegenError> {
    types
        .resolve(annotation)
        .map(|info| info.kind.abi_name().to_string())
        .map_err(|err| CodegenError::internal(err.to_string()))
}

fn abi_parameters(types: &TypeTable, names: &[TypedName]) -> Result<Vec<Parameter>, CodegenError> {
    names
        .iter()
        .map(|n| {
            Ok(Parameter {
                name: n.name.clone(),
                ty: abi_name(types, n.ty.as_deref())?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze;
    use crate::bytecode::assembly::jump_offset;
    use crate::context::CompilerContext;
    use crate::frontend::{Lexer, Parser};
    use crate::normalize::normalize;

    fn generate_with(source: &str, options: &CompilerOptions) -> Result<Generated, CodegenError> {
        let tokens = Lexer::new(source).tokenize().unwrap();
        let object = Parser::new(tokens).parse().unwrap();
        let mut ctx = CompilerContext::new(options.clone());
        let object = normalize(object, &mut ctx);
        let report = analyze(&object, &mut ctx);
        assert!(!report.has_errors(), "{:?}", report.errors);
        generate(&object, options)
    }

    fn gen_source(source: &str) -> Generated {
        generate_with(source, &CompilerOptions::default()).unwrap()
    }

    fn ops(generated: &Generated) -> Vec<Op> {
        generated
            .assembly
            .instructions
            .iter()
            .map(|i| i.opcode)
            .collect()
    }

    fn artifact(source: &str) -> CompiledArtifact {
        gen_source(source)
            .into_artifact("test", &CompilerOptions::default(), &TypeTable::new(), IndexMap::new())
            .unwrap()
    }

    #[test]
    fn test_empty_object_is_a_single_ret() {
        let generated = gen_source("{ }");
        assert_eq!(ops(&generated), vec![Op::Ret]);
        let artifact = generated
            .into_artifact("empty", &CompilerOptions::default(), &TypeTable::new(), IndexMap::new())
            .unwrap();
        assert_eq!(artifact.bytecode, vec![0x40]);
        assert_eq!(artifact.entry_point(MAIN_ENTRY), Some(0));
    }

    #[test]
    fn test_locals_and_storage() {
        let generated = gen_source("{ let x := 1 sstore(0, x) }");
        assert_eq!(
            ops(&generated),
            vec![
                Op::InitSlot,
                Op::Push1,
                Op::StLoc,
                Op::LdLoc,
                Op::Push0,
                Op::Syscall,
                Op::Ret
            ]
        );
        assert_eq!(generated.assembly.instructions[0].operand, vec![1, 0]);
        let syscall = &generated.assembly.instructions[5];
        assert_eq!(
            syscall.operand,
            builtins::syscall_id("System.Storage.Put").to_le_bytes().to_vec()
        );
        assert_eq!((syscall.pops, syscall.pushes), (2, 0));
    }

    #[test]
    fn test_function_layout_and_calling_convention() {
        let generated =
            gen_source("{ function f(a, b) -> r { r := add(a, b) } sstore(0, f(1, 2)) }");
        assert_eq!(
            ops(&generated),
            vec![
                // main
                Op::Push2,
                Op::Push1,
                Op::CallL,
                Op::Push0,
                Op::Syscall,
                Op::Ret,
                // f
                Op::InitSlot,
                Op::Push0,
                Op::StLoc,
                Op::LdArg,
                Op::LdArg,
                Op::Add,
                Op::StLoc,
                Op::LdLoc,
                Op::Ret,
            ]
        );
        let instructions = &generated.assembly.instructions;
        assert_eq!(instructions[6].operand, vec![1, 2]);
        // b is pushed before a
        assert_eq!(instructions[9].operand, vec![1]);
        assert_eq!(instructions[10].operand, vec![0]);

        let artifact = generated
            .into_artifact("t", &CompilerOptions::default(), &TypeTable::new(), IndexMap::new())
            .unwrap();
        // PUSH2 PUSH1 CALL_L(5) PUSH0 SYSCALL(5) RET
        assert_eq!(artifact.entry_point("f"), Some(14));
        assert_eq!(jump_offset(&artifact.bytecode[3..7]), Some(12));
    }

    #[test]
    fn test_returns_pushed_last_to_first() {
        let generated = gen_source(
            "{ function two() -> a, b { a := 1 b := 2 } let x, y := two() sstore(x, y) }",
        );
        let instructions = &generated.assembly.instructions;
        let ret = instructions.len() - 1;
        assert_eq!(instructions[ret].opcode, Op::Ret);
        assert_eq!(instructions[ret - 2].opcode, Op::LdLoc);
        assert_eq!(instructions[ret - 2].operand, vec![1]);
        assert_eq!(instructions[ret - 1].operand, vec![0]);
    }

    #[test]
    fn test_division_guard() {
        let generated = gen_source("{ sstore(0, div(sload(1), sload(2))) }");
        let ops = ops(&generated);
        let div = ops.iter().position(|op| *op == Op::Div).unwrap();
        assert_eq!(
            &ops[div - 5..=div],
            &[Op::Over, Op::Push0, Op::Equal, Op::JmpIfNotL, Op::Abort, Op::Div]
        );
    }

    #[test]
    fn test_modular_guard_picks_third_argument() {
        let generated = gen_source("{ sstore(0, addmod(1, 2, sload(3))) }");
        let ops = ops(&generated);
        let addmod = ops.iter().position(|op| *op == Op::AddMod).unwrap();
        assert_eq!(
            &ops[addmod - 6..=addmod],
            &[Op::Push2, Op::Pick, Op::Push0, Op::Equal, Op::JmpIfNotL, Op::Abort, Op::AddMod]
        );
    }

    #[test]
    fn test_if_jumps_past_body() {
        let generated = gen_source("{ if sload(0) { sstore(0, 1) } }");
        let ops = ops(&generated);
        assert_eq!(ops[2], Op::JmpIfNotL);
        let end = generated
            .assembly
            .labels
            .iter()
            .find(|(name, _)| name.starts_with("if_"))
            .map(|(_, at)| *at)
            .unwrap();
        assert_eq!(ops[end], Op::Ret);
    }

    #[test]
    fn test_switch_dispatch_and_cleanup() {
        let generated = gen_source(
            "{ switch sload(0) case 1 { sstore(1, 1) } case 2 { sstore(2, 2) } default { } }",
        );
        let ops = ops(&generated);
        assert_eq!(
            &ops[2..11],
            &[
                Op::Dup,
                Op::Push1,
                Op::Equal,
                Op::JmpIfL,
                Op::Dup,
                Op::Push2,
                Op::Equal,
                Op::JmpIfL,
                Op::JmpL
            ]
        );
        assert_eq!(&ops[ops.len() - 2..], &[Op::Drop, Op::Ret]);
        assert_eq!(generated.max_stack_depth, 3);
    }

    #[test]
    fn test_break_inside_switch_drops_discriminant() {
        let generated = gen_source(
            "{ for { } 1 { } { switch sload(0) case 0 { break } default { continue } } }",
        );
        let instructions = &generated.assembly.instructions;
        let drops_before_jump = instructions
            .windows(2)
            .filter(|w| w[0].opcode == Op::Drop && w[1].opcode == Op::JmpL)
            .count();
        // break, continue, and the switch exit before the back edge
        assert_eq!(drops_before_jump, 3);
        assert!(generated.assembly.resolve().is_ok());
    }

    #[test]
    fn test_leave_drops_every_discriminant() {
        let generated = gen_source(
            "{ function f(a) { switch a case 0 { switch a case 0 { leave } } } f(1) }",
        );
        let instructions = &generated.assembly.instructions;
        let leave = generated
            .assembly
            .pending
            .iter()
            .find(|p| p.label.ends_with("_leave"))
            .map(|p| p.instruction)
            .unwrap();
        assert_eq!(instructions[leave - 1].opcode, Op::Drop);
        assert_eq!(instructions[leave - 2].opcode, Op::Drop);
    }

    #[test]
    fn test_for_loop_shape() {
        let generated =
            gen_source("{ for { let i := 0 } lt(i, 3) { i := add(i, 1) } { sstore(i, i) } }");
        let labels: Vec<&str> = generated.assembly.labels.keys().map(String::as_str).collect();
        assert!(labels.iter().any(|l| l.starts_with("for_") && l.ends_with("_cond")));
        assert!(labels.iter().any(|l| l.ends_with("_post")));
        let ops = ops(&generated);
        assert_eq!(ops.iter().filter(|op| **op == Op::JmpIfNotL).count(), 1);
        assert!(generated.assembly.resolve().is_ok());
    }

    #[test]
    fn test_literal_memory_offset_out_of_bounds() {
        let options = CompilerOptions::default().with_memory_limit(64);
        assert!(generate_with("{ mstore(32, 1) }", &options).is_ok());
        let err = generate_with("{ mstore(33, 1) }", &options).unwrap_err();
        assert!(matches!(err, CodegenError::MemoryOutOfBounds { limit: 64, .. }));
        // one byte wide
        assert!(generate_with("{ mstore8(63, 1) }", &options).is_ok());

        let unchecked = options.with_bounds_checking(false);
        assert!(generate_with("{ mstore(100, 1) }", &unchecked).is_err());
    }

    #[test]
    fn test_bounds_check_toggle() {
        let checked = generate_with("{ mstore(sload(0), 1) }", &CompilerOptions::default())
            .unwrap();
        let unchecked = generate_with(
            "{ mstore(sload(0), 1) }",
            &CompilerOptions::default().with_bounds_checking(false),
        )
        .unwrap();
        assert!(ops(&checked).contains(&Op::Abort));
        assert!(!ops(&unchecked).contains(&Op::Abort));
        assert!(ops(&checked).contains(&Op::Lt));
    }

    #[test]
    fn test_stack_too_deep() {
        let options = CompilerOptions::default().with_max_stack_depth(2);
        // the left operand is evaluated last, so left nesting stacks up
        let err = generate_with("{ sstore(0, add(add(1, 2), 3)) }", &options).unwrap_err();
        assert!(matches!(err, CodegenError::StackTooDeep { limit: 2, .. }));
    }

    #[test]
    fn test_too_many_locals() {
        let lets: String = (0..256).map(|i| format!("let v{} := {} ", i, i)).collect();
        let err = generate_with(&format!("{{ {} }}", lets), &CompilerOptions::default())
            .unwrap_err();
        assert_eq!(
            err,
            CodegenError::TooManyLocals {
                function: MAIN_ENTRY.to_string(),
                count: 256
            }
        );
    }

    #[test]
    fn test_event_emission() {
        let generated = gen_source("{ log2(\"Transfer\", 1, 2, 100) }");
        assert_eq!(
            ops(&generated),
            vec![
                Op::PushInt8,
                Op::Push2,
                Op::Push1,
                Op::Push3,
                Op::Pack,
                Op::PushData1,
                Op::Syscall,
                Op::Ret
            ]
        );
        assert_eq!(generated.events.get("Transfer"), Some(&2));
        let artifact = generated
            .into_artifact("t", &CompilerOptions::default(), &TypeTable::new(), IndexMap::new())
            .unwrap();
        let event = artifact.event("Transfer").unwrap();
        assert_eq!(event.parameters.len(), 3);
        assert!(event.parameters[0].indexed);
        assert!(!event.parameters[2].indexed);
    }

    #[test]
    fn test_revert_aborts() {
        let generated = gen_source("{ revert(0, 0) }");
        assert_eq!(ops(&generated), vec![Op::Push0, Op::Push0, Op::Abort, Op::Ret]);
        assert_eq!(generated.max_stack_depth, 2);
    }

    #[test]
    fn test_methods_and_safety() {
        let artifact = artifact(
            "{ function get() -> v { v := sload(0) } \
               function put(v) { sstore(0, v) } \
               function indirect() { put(1) } \
               function _hidden() { } }",
        );
        let names: Vec<&str> = artifact.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["get", "put", "indirect"]);
        assert!(artifact.method("get").unwrap().safe);
        assert!(!artifact.method("put").unwrap().safe);
        assert!(!artifact.method("indirect").unwrap().safe);
        assert!(artifact.entry_point("_hidden").is_none());
        assert_eq!(artifact.method("put").unwrap().parameters[0].ty, "Integer");
    }

    #[test]
    fn test_nested_functions_follow_their_parent() {
        let generated = gen_source(
            "{ function outer() -> r { function inner() -> x { x := 1 } r := inner() } \
               function last() { } \
               sstore(0, outer()) }",
        );
        let order: Vec<&str> = generated
            .assembly
            .labels
            .keys()
            .filter(|l| l.starts_with("fn") && !l.ends_with("_end") && !l.ends_with("_leave"))
            .map(String::as_str)
            .collect();
        assert_eq!(order, vec!["fn0_outer", "fn2_inner", "fn1_last"]);
        let inner = generated.functions.iter().find(|f| f.name == "inner").unwrap();
        assert!(!inner.top_level);
    }

    #[test]
    fn test_debug_info() {
        let options = CompilerOptions::default().with_debug_info(true);
        let generated =
            generate_with("{ function f(a) -> r { let t := a r := t } sstore(0, f(1)) }", &options)
                .unwrap();
        let artifact = generated
            .into_artifact("t", &options, &TypeTable::new(), IndexMap::new())
            .unwrap();
        let debug = artifact.debug.unwrap();
        assert_eq!(debug.functions[MAIN_ENTRY].start, 0);
        let f = debug.functions["f"];
        assert!(f.start < f.end);
        assert_eq!(f.end, artifact.bytecode.len());
        assert_eq!(debug.variables["f.a"], StorageLocation::Argument(0));
        assert_eq!(debug.variables["f.r"], StorageLocation::Return(0));
        assert_eq!(debug.variables["f.t"], StorageLocation::Local(1));
        assert!(debug.source_map.contains_key(&0));

        let plain = artifact_without_debug();
        assert!(plain.debug.is_none());
    }

    fn artifact_without_debug() -> CompiledArtifact {
        artifact("{ sstore(0, 1) }")
    }

    #[test]
    fn test_frame_state_machine() {
        let mut frame = Frame::new("f", 0, None, None);
        assert!(frame.advance(FrameState::ReturnEmission).is_err());
        frame.advance(FrameState::BodyEmission).unwrap();
        frame.advance(FrameState::ReturnEmission).unwrap();
        frame.advance(FrameState::Resolved).unwrap();
        let err = frame.advance(FrameState::BodyEmission).unwrap_err();
        assert_eq!(
            err,
            CodegenError::InvalidState {
                function: "f".to_string(),
                from: "Resolved".to_string(),
                to: "BodyEmission".to_string(),
            }
        );
    }

    #[test]
    fn test_composite_reaching_codegen_is_rejected() {
        let tokens = Lexer::new("{ sstore(0, neq(1, 2)) }").tokenize().unwrap();
        let object = Parser::new(tokens).parse().unwrap();
        let err = generate(&object, &CompilerOptions::default()).unwrap_err();
        assert!(matches!(err, CodegenError::Unsupported { ref name, .. } if name == "neq"));
    }

    #[test]
    fn test_variable_declaration_without_value() {
        let generated = gen_source("{ let a, b sstore(a, b) }");
        assert_eq!(
            &ops(&generated)[..5],
            &[Op::InitSlot, Op::Push0, Op::Push0, Op::StLoc, Op::StLoc]
        );
    }
}
