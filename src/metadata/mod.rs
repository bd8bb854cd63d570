//! Declared entities and their resolution.
//!
//! The decompiler consumes, but does not own, the metadata of the module being rebuilt:
//!
//! - [`token`] - Metadata tokens, the identity of declared entities
//! - [`definitions`] - Declared types, methods, fields and parameters
//! - [`context`] - The [`ResolutionContext`] collaborator mapping addresses and offsets

pub mod context;
pub mod definitions;
pub mod token;

pub use context::{NullContext, ResolutionContext, TableContext};
pub use definitions::{
    FieldDefinition, FieldFlags, FieldRc, MethodBuilder, MethodDefinition, MethodFlags, MethodRc,
    ParameterDefinition, SlotBinding, TypeDefinition, TypeRc,
};
pub use token::{Token, TokenKind};
