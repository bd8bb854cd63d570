//! Resolution of raw addresses and byte offsets to declared entities.
//!
//! The decompiler never reads the binary itself. Whenever it meets a constant address
//! or a `[typed local + offset]` access it asks a [`ResolutionContext`] what the number
//! means. Implementations must be safe for concurrent reads so callers can lift several
//! methods in parallel against one context.

use std::collections::HashMap;

use crate::metadata::definitions::{FieldRc, TypeRc};

/// Maps type addresses and field offsets to declared entities.
pub trait ResolutionContext: Send + Sync {
    /// Returns the type whose runtime class structure lives at `address`.
    fn resolve_type_by_address(&self, address: u64) -> Option<TypeRc>;

    /// Returns the field stored `offset` bytes into an instance of `ty`.
    ///
    /// For static fields the offset is relative to the type's static storage block.
    fn resolve_field_by_offset(&self, ty: &TypeRc, offset: i64) -> Option<FieldRc>;
}

/// A context that resolves nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullContext;

impl ResolutionContext for NullContext {
    fn resolve_type_by_address(&self, _address: u64) -> Option<TypeRc> {
        None
    }

    fn resolve_field_by_offset(&self, _ty: &TypeRc, _offset: i64) -> Option<FieldRc> {
        None
    }
}

/// A context backed by in-memory lookup tables.
///
/// Useful when the caller already has the address map of a module, and in tests.
#[derive(Debug, Default, Clone)]
pub struct TableContext {
    types: HashMap<u64, TypeRc>,
    fields: Vec<FieldRc>,
}

impl TableContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `ty` as living at `address`.
    pub fn add_type(&mut self, address: u64, ty: TypeRc) -> &mut Self {
        self.types.insert(address, ty);
        self
    }

    /// Registers a field; it is found through its declaring type and offset.
    pub fn add_field(&mut self, field: FieldRc) -> &mut Self {
        self.fields.push(field);
        self
    }
}

impl ResolutionContext for TableContext {
    fn resolve_type_by_address(&self, address: u64) -> Option<TypeRc> {
        self.types.get(&address).cloned()
    }

    fn resolve_field_by_offset(&self, ty: &TypeRc, offset: i64) -> Option<FieldRc> {
        self.fields
            .iter()
            .find(|field| field.declaring_type == *ty && field.offset == offset)
            .cloned()
    }
}
