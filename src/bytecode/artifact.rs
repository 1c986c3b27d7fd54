use alloy_primitives::U256;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::StorageLocation;
use crate::lang::node::Position;

/// Name of the entry point holding the object's top-level code.
pub const MAIN_ENTRY: &str = "main";

/// A compiled object: bytecode plus the metadata a deployer needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledArtifact {
    pub name: String,
    pub target_version: String,
    pub bytecode: Vec<u8>,
    /// Entry name → byte address. `main` is always at 0.
    pub entry_points: IndexMap<String, usize>,
    pub methods: Vec<Method>,
    pub events: Vec<Event>,
    /// Constant functions and the value they return.
    pub constants: IndexMap<String, U256>,
    /// Highest evaluation stack depth of any function.
    pub max_stack_depth: usize,
    pub sub_objects: Vec<CompiledArtifact>,
    pub debug: Option<DebugInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub returns: Vec<Parameter>,
    pub address: usize,
    /// Never mutates state, directly or through the functions it calls.
    pub safe: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub indexed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub parameters: Vec<EventParameter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRange {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugInfo {
    /// Byte address → source position of the instruction starting there.
    pub source_map: IndexMap<usize, Position>,
    pub functions: IndexMap<String, FunctionRange>,
    /// `function.variable` → where it lives.
    pub variables: IndexMap<String, StorageLocation>,
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact encoding failed: {0}")]
    Encode(postcard::Error),
    #[error("artifact decoding failed: {0}")]
    Decode(postcard::Error),
}

impl CompiledArtifact {
    pub fn new(name: &str, target_version: &str) -> Self {
        Self {
            name: name.to_string(),
            target_version: target_version.to_string(),
            bytecode: Vec::new(),
            entry_points: IndexMap::new(),
            methods: Vec::new(),
            events: Vec::new(),
            constants: IndexMap::new(),
            max_stack_depth: 0,
            sub_objects: Vec::new(),
            debug: None,
        }
    }

    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn event(&self, name: &str) -> Option<&Event> {
        self.events.iter().find(|e| e.name == name)
    }

    pub fn entry_point(&self, name: &str) -> Option<usize> {
        self.entry_points.get(name).copied()
    }

    pub fn sub_object(&self, name: &str) -> Option<&CompiledArtifact> {
        self.sub_objects.iter().find(|o| o.name == name)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ArtifactError> {
        postcard::to_allocvec(self).map_err(ArtifactError::Encode)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArtifactError> {
        postcard::from_bytes(bytes).map_err(ArtifactError::Decode)
    }
}
