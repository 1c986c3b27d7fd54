//! Per-unit compilation state threaded through every stage.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::CompilerOptions;
use crate::diagnostics::Diagnostics;
use crate::lang::node::{LabelId, Position};
use crate::lang::types::TypeTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Function { params: usize, returns: usize },
}

/// Where a symbol's value lives at run time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageLocation {
    /// Local slot holding a `let` variable.
    Local(usize),
    /// Local slot holding a named return value.
    Return(usize),
    Argument(usize),
    /// Code address behind a label.
    Code(String),
}

impl StorageLocation {
    /// Index into the frame's local slots, if the symbol lives in one.
    pub fn local_slot(&self) -> Option<usize> {
        match self {
            StorageLocation::Local(slot) | StorageLocation::Return(slot) => Some(*slot),
            _ => None,
        }
    }
}

impl std::fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageLocation::Local(slot) | StorageLocation::Return(slot) => {
                write!(f, "loc{}", slot)
            }
            StorageLocation::Argument(slot) => write!(f, "arg{}", slot),
            StorageLocation::Code(label) => write!(f, "@{}", label),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub location: StorageLocation,
    /// Set by any reference; never cleared.
    pub used: bool,
    pub pos: Position,
}

impl Symbol {
    pub fn variable(name: &str, location: StorageLocation, pos: Position) -> Self {
        Self {
            name: name.to_string(),
            kind: SymbolKind::Variable,
            location,
            used: false,
            pos,
        }
    }

    pub fn function(name: &str, params: usize, returns: usize, label: String, pos: Position) -> Self {
        Self {
            name: name.to_string(),
            kind: SymbolKind::Function { params, returns },
            location: StorageLocation::Code(label),
            used: false,
            pos,
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self.kind, SymbolKind::Function { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub symbols: IndexMap<String, Symbol>,
    /// Function body scope: variables of enclosing scopes are not visible
    /// past it, functions are.
    pub function_boundary: bool,
}

/// Scope stack of name → symbol maps.
///
/// Popped scopes are retired rather than dropped so later stages can still
/// ask whether a declaration was referenced.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    retired: Vec<Scope>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn push_function_scope(&mut self) {
        self.scopes.push(Scope {
            symbols: IndexMap::new(),
            function_boundary: true,
        });
    }

    /// Pops the innermost scope and returns a view of it.
    pub fn pop_scope(&mut self) -> Option<&Scope> {
        let scope = self.scopes.pop()?;
        self.retired.push(scope);
        self.retired.last()
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Declares in the innermost scope. Fails with the existing symbol when
    /// the name is already declared there.
    pub fn declare(&mut self, symbol: Symbol) -> Result<(), Symbol> {
        let Some(scope) = self.scopes.last_mut() else {
            self.scopes.push(Scope::default());
            return self.declare(symbol);
        };
        if let Some(existing) = scope.symbols.get(&symbol.name) {
            return Err(existing.clone());
        }
        scope.symbols.insert(symbol.name.clone(), symbol);
        Ok(())
    }

    fn visible_index(&self, name: &str) -> Option<usize> {
        let mut crossed_boundary = false;
        for (index, scope) in self.scopes.iter().enumerate().rev() {
            if let Some(symbol) = scope.symbols.get(name) {
                if !crossed_boundary || symbol.is_function() {
                    return Some(index);
                }
            }
            if scope.function_boundary {
                crossed_boundary = true;
            }
        }
        None
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        let index = self.visible_index(name)?;
        self.scopes[index].symbols.get(name)
    }

    /// Looks `name` up and flags it as referenced.
    pub fn mark_used(&mut self, name: &str) -> Option<&Symbol> {
        let index = self.visible_index(name)?;
        let symbol = self.scopes[index].symbols.get_mut(name)?;
        symbol.used = true;
        Some(symbol)
    }

    /// Whether the function declared at `pos` was referenced, searching both
    /// live and retired scopes.
    pub fn function_used(&self, name: &str, pos: Position) -> Option<bool> {
        self.scopes
            .iter()
            .chain(self.retired.iter())
            .filter_map(|scope| scope.symbols.get(name))
            .find(|symbol| symbol.is_function() && symbol.pos == pos)
            .map(|symbol| symbol.used)
    }

    /// Drops all scopes, live and retired.
    pub fn clear(&mut self) {
        self.scopes.clear();
        self.retired.clear();
    }
}

/// Monotonic source of control-flow labels.
#[derive(Debug, Clone, Default)]
pub struct LabelCounter {
    next: u32,
}

impl LabelCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> LabelId {
        let id = LabelId(self.next);
        self.next += 1;
        id
    }

    /// Ensures labels handed out from now on are greater than `id`.
    pub fn reserve_above(&mut self, id: LabelId) {
        self.next = self.next.max(id.0 + 1);
    }
}

/// Everything a compilation unit shares across stages. Passed by `&mut`
/// from stage to stage.
#[derive(Debug, Clone)]
pub struct CompilerContext {
    pub options: CompilerOptions,
    pub symbols: SymbolTable,
    pub types: TypeTable,
    pub diagnostics: Diagnostics,
    pub labels: LabelCounter,
}

impl CompilerContext {
    /// Declarations that fail to register are left out; `validate()`
    /// reports them before any stage runs.
    pub fn new(options: CompilerOptions) -> Self {
        let mut types = TypeTable::new();
        for declaration in &options.types {
            if let Err(err) = types.declare(declaration) {
                warn!(%err, "skipping type declaration");
            }
        }
        Self {
            options,
            symbols: SymbolTable::new(),
            types,
            diagnostics: Diagnostics::new(),
            labels: LabelCounter::new(),
        }
    }
}
