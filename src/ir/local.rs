//! Recovered local variables.
//!
//! Locals are created once by local recovery, one per distinct (SSA-versioned) register,
//! and live in the owning [`crate::Method`]'s arena. Operands refer to them by [`LocalId`].
//! Later passes fill in the type and field in place; two locals are never merged, only
//! references to one are rewritten to reference another.

use std::fmt;

use crate::{
    ir::operand::Register,
    metadata::{FieldRc, TypeRc},
};

/// Index of a local in its method's arena.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalId(pub(crate) usize);

impl LocalId {
    /// Creates a `LocalId` from a raw arena index.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        LocalId(index)
    }

    /// Returns the raw arena index.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocalId({})", self.0)
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// A recovered local variable.
#[derive(Debug, Clone)]
pub struct LocalVariable {
    /// Display name (`v3`, `this`, `returnVal12`, a parameter name)
    pub name: String,
    /// Register this local was created from
    pub register: Register,
    /// Resolved type
    pub ty: Option<TypeRc>,
    /// Field accessed through this local, for field views
    pub field: Option<FieldRc>,
    /// Implicit receiver of an instance method
    pub is_this: bool,
    /// Parameter slot this local binds, which is also its CIL argument index
    pub parameter: Option<usize>,
    /// For field views, the local holding the object
    pub base: Option<LocalId>,
}

impl LocalVariable {
    /// Creates an untyped local for `register`.
    #[must_use]
    pub fn new(name: impl Into<String>, register: Register) -> Self {
        LocalVariable {
            name: name.into(),
            register,
            ty: None,
            field: None,
            is_this: false,
            parameter: None,
            base: None,
        }
    }

    /// Creates a field view of `base`: reading it reads `field` of the object in `base`.
    #[must_use]
    pub fn field_view(base_id: LocalId, base: &LocalVariable, field: FieldRc) -> Self {
        LocalVariable {
            name: base.name.clone(),
            register: base.register.clone(),
            ty: base.ty.clone(),
            field: Some(field),
            is_this: false,
            parameter: None,
            base: Some(base_id),
        }
    }

    /// Returns `true` if this local binds a parameter slot.
    #[must_use]
    pub fn is_parameter(&self) -> bool {
        self.parameter.is_some()
    }

    /// Returns `true` if this local is a field view of another local.
    #[must_use]
    pub fn is_field_view(&self) -> bool {
        self.base.is_some()
    }
}

impl fmt::Display for LocalVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.ty, &self.field) {
            (None, _) => write!(f, "{}", self.name),
            (Some(ty), None) => write!(f, "{}:{}", self.name, ty.name),
            (Some(ty), Some(field)) => write!(f, "{}:{}.{}", self.name, ty.name, field.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{FieldDefinition, Token, TypeDefinition};

    #[test]
    fn test_field_view_inherits_base() {
        let ty = TypeDefinition::new(Token::from_parts(Token::TYPE_DEF, 1), "", "Node");
        let next = FieldDefinition::instance(Token::from_parts(Token::FIELD, 1), "next", &ty, 8);

        let mut base = LocalVariable::new("v0", Register::new(1).with_version(1));
        base.ty = Some(ty.clone());

        let view = LocalVariable::field_view(LocalId::new(0), &base, next);
        assert_eq!(view.name, "v0");
        assert_eq!(view.register, base.register);
        assert_eq!(view.base, Some(LocalId::new(0)));
        assert!(view.is_field_view());
        assert!(!view.is_parameter());
        assert_eq!(view.to_string(), "v0:Node.next");
        assert_eq!(base.to_string(), "v0:Node");
    }
}
