//! Declared types, methods, fields and parameters.
//!
//! These are the entities the lifted code refers to: call targets, resolved field accesses
//! and the types recovered for locals. They come from the module being decompiled and are
//! shared by reference through the [`TypeRc`], [`MethodRc`] and [`FieldRc`] aliases. Identity
//! is the metadata [`Token`].
//!
//! # Examples
//!
//! ```rust,ignore
//! use dotlift::metadata::{FieldDefinition, MethodDefinition, MethodFlags, TypeDefinition, Token};
//!
//! let point = TypeDefinition::new(Token::from_parts(Token::TYPE_DEF, 1), "Geometry", "Point");
//! let x = FieldDefinition::instance(Token::from_parts(Token::FIELD, 1), "X", &point, 0x10);
//! let ctor = MethodDefinition::builder(Token::from_parts(Token::METHOD_DEF, 1), ".ctor", &point)
//!     .flags(MethodFlags::CONSTRUCTOR)
//!     .build();
//! ```

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use bitflags::bitflags;

use crate::metadata::token::Token;

/// Shared reference to a declared type
pub type TypeRc = Arc<TypeDefinition>;
/// Shared reference to a declared method
pub type MethodRc = Arc<MethodDefinition>;
/// Shared reference to a declared field
pub type FieldRc = Arc<FieldDefinition>;

bitflags! {
    /// Method attributes relevant to lifting
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodFlags: u32 {
        /// Method has no implicit receiver
        const STATIC = 0x0010;
        /// Method is virtual
        const VIRTUAL = 0x0040;
        /// Method is an instance constructor
        const CONSTRUCTOR = 0x1000;
    }
}

bitflags! {
    /// Field attributes relevant to lifting
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FieldFlags: u32 {
        /// Field is static
        const STATIC = 0x0010;
    }
}

/// A declared type.
#[derive(Debug)]
pub struct TypeDefinition {
    /// Metadata token
    pub token: Token,
    /// Namespace, empty for the global namespace
    pub namespace: String,
    /// Simple name
    pub name: String,
}

impl TypeDefinition {
    /// Creates a shared type definition.
    #[must_use]
    pub fn new(token: Token, namespace: impl Into<String>, name: impl Into<String>) -> TypeRc {
        Arc::new(TypeDefinition {
            token,
            namespace: namespace.into(),
            name: name.into(),
        })
    }

    /// `Namespace.Name`, or just `Name` in the global namespace.
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

/// A declared field.
#[derive(Debug)]
pub struct FieldDefinition {
    /// Metadata token
    pub token: Token,
    /// Field name
    pub name: String,
    /// Type that declares this field
    pub declaring_type: TypeRc,
    /// Type of the field's value, if known
    pub field_type: Option<TypeRc>,
    /// Byte offset inside the instance (or the static storage block)
    pub offset: i64,
    /// Field attributes
    pub flags: FieldFlags,
}

impl FieldDefinition {
    /// Creates a shared instance field at `offset`.
    #[must_use]
    pub fn instance(token: Token, name: impl Into<String>, declaring_type: &TypeRc, offset: i64) -> FieldRc {
        Arc::new(FieldDefinition {
            token,
            name: name.into(),
            declaring_type: declaring_type.clone(),
            field_type: None,
            offset,
            flags: FieldFlags::empty(),
        })
    }

    /// Creates a shared static field at `offset` inside the static storage block.
    #[must_use]
    pub fn static_field(
        token: Token,
        name: impl Into<String>,
        declaring_type: &TypeRc,
        offset: i64,
    ) -> FieldRc {
        Arc::new(FieldDefinition {
            token,
            name: name.into(),
            declaring_type: declaring_type.clone(),
            field_type: None,
            offset,
            flags: FieldFlags::STATIC,
        })
    }

    /// Returns `true` if the field is static.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(FieldFlags::STATIC)
    }
}

/// A declared, explicit parameter. The implicit receiver is never part of this list.
#[derive(Debug, Clone)]
pub struct ParameterDefinition {
    /// Parameter name
    pub name: String,
    /// Parameter type, if known
    pub param_type: Option<TypeRc>,
}

impl ParameterDefinition {
    /// Creates a parameter.
    #[must_use]
    pub fn new(name: impl Into<String>, param_type: Option<TypeRc>) -> Self {
        ParameterDefinition {
            name: name.into(),
            param_type,
        }
    }
}

/// What a parameter slot of a method binds to.
#[derive(Debug, Clone, Copy)]
pub enum SlotBinding<'a> {
    /// The implicit receiver of an instance method
    This,
    /// A declared parameter
    Declared(&'a ParameterDefinition),
}

/// A declared method.
#[derive(Debug)]
pub struct MethodDefinition {
    /// Metadata token
    pub token: Token,
    /// Method name
    pub name: String,
    /// Type that declares this method
    pub declaring_type: TypeRc,
    /// Declared parameters, in order
    pub parameters: Vec<ParameterDefinition>,
    /// Return type, `None` for void
    pub return_type: Option<TypeRc>,
    /// Method attributes
    pub flags: MethodFlags,
}

impl MethodDefinition {
    /// Starts building a method declared by `declaring_type`.
    #[must_use]
    pub fn builder(token: Token, name: impl Into<String>, declaring_type: &TypeRc) -> MethodBuilder {
        MethodBuilder {
            method: MethodDefinition {
                token,
                name: name.into(),
                declaring_type: declaring_type.clone(),
                parameters: Vec::new(),
                return_type: None,
                flags: MethodFlags::empty(),
            },
        }
    }

    /// Returns `true` if the method has no implicit receiver.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodFlags::STATIC)
    }

    /// Returns `true` if the method is an instance constructor.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.flags.contains(MethodFlags::CONSTRUCTOR)
    }

    /// Returns `true` if the method returns a value.
    #[must_use]
    pub fn returns_value(&self) -> bool {
        self.return_type.is_some()
    }

    /// `DeclaringType.Name`, as used in diagnostics.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.declaring_type.full_name(), self.name)
    }

    /// Maps a parameter slot to what it binds.
    ///
    /// Slots count the implicit receiver first for instance methods, so slot `0` of an
    /// instance method is [`SlotBinding::This`] and slot `n` is declared parameter `n - 1`.
    /// Slot numbers are also the CIL argument indices.
    ///
    /// # Returns
    ///
    /// `None` when the slot lies beyond the declared parameters.
    #[must_use]
    pub fn slot_binding(&self, slot: usize) -> Option<SlotBinding<'_>> {
        if self.is_static() {
            self.parameters.get(slot).map(SlotBinding::Declared)
        } else if slot == 0 {
            Some(SlotBinding::This)
        } else {
            self.parameters.get(slot - 1).map(SlotBinding::Declared)
        }
    }

    /// Type of the value passed in a parameter slot.
    #[must_use]
    pub fn slot_type(&self, slot: usize) -> Option<TypeRc> {
        match self.slot_binding(slot)? {
            SlotBinding::This => Some(self.declaring_type.clone()),
            SlotBinding::Declared(param) => param.param_type.clone(),
        }
    }
}

/// Fluent construction of a [`MethodDefinition`].
pub struct MethodBuilder {
    method: MethodDefinition,
}

impl MethodBuilder {
    /// Appends a declared parameter.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, param_type: Option<TypeRc>) -> Self {
        self.method
            .parameters
            .push(ParameterDefinition::new(name, param_type));
        self
    }

    /// Sets the return type.
    #[must_use]
    pub fn returns(mut self, return_type: &TypeRc) -> Self {
        self.method.return_type = Some(return_type.clone());
        self
    }

    /// Sets the method attributes.
    #[must_use]
    pub fn flags(mut self, flags: MethodFlags) -> Self {
        self.method.flags = flags;
        self
    }

    /// Finishes the method.
    #[must_use]
    pub fn build(self) -> MethodRc {
        Arc::new(self.method)
    }
}

macro_rules! impl_token_identity {
    ($($ty:ty),*) => {
        $(
            impl PartialEq for $ty {
                fn eq(&self, other: &Self) -> bool {
                    self.token == other.token
                }
            }

            impl Eq for $ty {}

            impl Hash for $ty {
                fn hash<H: Hasher>(&self, state: &mut H) {
                    self.token.hash(state);
                }
            }
        )*
    };
}

impl_token_identity!(TypeDefinition, MethodDefinition, FieldDefinition);

impl fmt::Display for TypeDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

impl fmt::Display for MethodDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.full_name())?;
        for (i, param) in self.parameters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match &param.param_type {
                Some(ty) => write!(f, "{} {}", ty.name, param.name)?,
                None => write!(f, "{}", param.name)?,
            }
        }
        write!(f, ")")
    }
}

impl fmt::Display for FieldDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.declaring_type.full_name(), self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point() -> TypeRc {
        TypeDefinition::new(Token::from_parts(Token::TYPE_DEF, 1), "Geometry", "Point")
    }

    #[test]
    fn test_slot_binding_instance() {
        let ty = point();
        let int = TypeDefinition::new(Token::from_parts(Token::TYPE_DEF, 2), "System", "Int32");
        let method = MethodDefinition::builder(Token::from_parts(Token::METHOD_DEF, 1), "Move", &ty)
            .param("dx", Some(int.clone()))
            .param("dy", None)
            .build();

        assert!(matches!(method.slot_binding(0), Some(SlotBinding::This)));
        assert!(matches!(method.slot_binding(1), Some(SlotBinding::Declared(p)) if p.name == "dx"));
        assert!(matches!(method.slot_binding(2), Some(SlotBinding::Declared(p)) if p.name == "dy"));
        assert!(method.slot_binding(3).is_none());

        assert_eq!(method.slot_type(0), Some(ty));
        assert_eq!(method.slot_type(1), Some(int));
        assert_eq!(method.slot_type(2), None);
    }

    #[test]
    fn test_slot_binding_static() {
        let ty = point();
        let method = MethodDefinition::builder(Token::from_parts(Token::METHOD_DEF, 2), "Origin", &ty)
            .param("scale", None)
            .flags(MethodFlags::STATIC)
            .returns(&ty)
            .build();

        assert!(matches!(method.slot_binding(0), Some(SlotBinding::Declared(p)) if p.name == "scale"));
        assert!(method.slot_binding(1).is_none());
        assert!(method.returns_value());
        assert_eq!(method.full_name(), "Geometry.Point.Origin");
    }

    #[test]
    fn test_identity_is_token() {
        let a = TypeDefinition::new(Token::from_parts(Token::TYPE_DEF, 7), "A", "X");
        let b = TypeDefinition::new(Token::from_parts(Token::TYPE_DEF, 7), "B", "Y");
        let c = TypeDefinition::new(Token::from_parts(Token::TYPE_DEF, 8), "A", "X");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_field_flags() {
        let ty = point();
        let x = FieldDefinition::instance(Token::from_parts(Token::FIELD, 1), "X", &ty, 0x10);
        let origin = FieldDefinition::static_field(Token::from_parts(Token::FIELD, 2), "Origin", &ty, 0);
        assert!(!x.is_static());
        assert!(origin.is_static());
        assert_eq!(x.to_string(), "Geometry.Point::X");
    }
}
