//! Type descriptors.
//!
//! The IR itself is untyped beyond the 256-bit word. Type annotations only
//! feed ABI descriptors and layout-sensitive checks.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Integer,
    Boolean,
    Hash160,
    Hash256,
    String,
    Array,
    Struct,
}

impl TypeKind {
    /// Name used in ABI descriptors.
    pub fn abi_name(self) -> &'static str {
        match self {
            TypeKind::Integer => "Integer",
            TypeKind::Boolean => "Boolean",
            TypeKind::Hash160 => "Hash160",
            TypeKind::Hash256 => "Hash256",
            TypeKind::String => "String",
            TypeKind::Array => "Array",
            TypeKind::Struct => "Struct",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    Primitive,
    Array { element: String, length: u32 },
    Struct { fields: Vec<(String, String)> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    pub name: String,
    /// Size in bytes; 0 for dynamically sized types.
    pub size: u32,
    pub alignment: u32,
    pub kind: TypeKind,
    pub layout: Layout,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("type '{0}' is already defined")]
    Duplicate(String),
    #[error("unknown type '{0}'")]
    Unknown(String),
}

/// A structural type supplied with the compiler options, registered before
/// annotations are checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeDeclaration {
    Array {
        name: String,
        element: String,
        length: u32,
    },
    Struct {
        name: String,
        /// `(field, type)` in declaration order.
        fields: Vec<(String, String)>,
    },
}

pub const DEFAULT_TYPE: &str = "u256";
pub const WORD_SIZE: u32 = 32;

/// Registry of type descriptors for one compilation.
#[derive(Debug, Clone)]
pub struct TypeTable {
    types: IndexMap<String, TypeInfo>,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    pub fn new() -> Self {
        let mut table = Self {
            types: IndexMap::new(),
        };
        for (name, size, kind) in [
            (DEFAULT_TYPE, WORD_SIZE, TypeKind::Integer),
            ("bool", 1, TypeKind::Boolean),
            ("address", 20, TypeKind::Hash160),
            ("bytes32", 32, TypeKind::Hash256),
            ("string", 0, TypeKind::String),
        ] {
            table.types.insert(
                name.to_string(),
                TypeInfo {
                    name: name.to_string(),
                    size,
                    alignment: size.clamp(1, WORD_SIZE),
                    kind,
                    layout: Layout::Primitive,
                },
            );
        }
        table
    }

    /// Primitives plus `declarations`, in order.
    pub fn with_declarations(declarations: &[TypeDeclaration]) -> Result<Self, TypeError> {
        let mut table = Self::new();
        for declaration in declarations {
            table.declare(declaration)?;
        }
        Ok(table)
    }

    pub fn declare(&mut self, declaration: &TypeDeclaration) -> Result<&TypeInfo, TypeError> {
        match declaration {
            TypeDeclaration::Array {
                name,
                element,
                length,
            } => self.register_array(name, element, *length),
            TypeDeclaration::Struct { name, fields } => {
                let fields: Vec<(&str, &str)> = fields
                    .iter()
                    .map(|(field, ty)| (field.as_str(), ty.as_str()))
                    .collect();
                self.register_struct(name, &fields)
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&TypeInfo> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Descriptor for an optional annotation, falling back to the word type.
    pub fn resolve(&self, annotation: Option<&str>) -> Result<&TypeInfo, TypeError> {
        let name = annotation.unwrap_or(DEFAULT_TYPE);
        self.get(name).ok_or_else(|| TypeError::Unknown(name.to_string()))
    }

    pub fn register_array(
        &mut self,
        name: &str,
        element: &str,
        length: u32,
    ) -> Result<&TypeInfo, TypeError> {
        if self.contains(name) {
            return Err(TypeError::Duplicate(name.to_string()));
        }
        let elem = self.resolve(Some(element))?;
        let stride = round_up(elem.size, elem.alignment);
        let info = TypeInfo {
            name: name.to_string(),
            size: stride * length,
            alignment: elem.alignment,
            kind: TypeKind::Array,
            layout: Layout::Array {
                element: element.to_string(),
                length,
            },
        };
        Ok(self.insert(info))
    }

    pub fn register_struct(
        &mut self,
        name: &str,
        fields: &[(&str, &str)],
    ) -> Result<&TypeInfo, TypeError> {
        if self.contains(name) {
            return Err(TypeError::Duplicate(name.to_string()));
        }
        let mut offset = 0;
        let mut alignment = 1;
        for (_, ty) in fields {
            let field = self.resolve(Some(ty))?;
            offset = round_up(offset, field.alignment) + field.size;
            alignment = alignment.max(field.alignment);
        }
        let info = TypeInfo {
            name: name.to_string(),
            size: round_up(offset, alignment),
            alignment,
            kind: TypeKind::Struct,
            layout: Layout::Struct {
                fields: fields
                    .iter()
                    .map(|(f, t)| (f.to_string(), t.to_string()))
                    .collect(),
            },
        };
        Ok(self.insert(info))
    }

    fn insert(&mut self, info: TypeInfo) -> &TypeInfo {
        let name = info.name.clone();
        let (index, _) = self.types.insert_full(name, info);
        &self.types[index]
    }
}

fn round_up(value: u32, alignment: u32) -> u32 {
    if alignment <= 1 {
        value
    } else {
        value.div_ceil(alignment) * alignment
    }
}
