//! Operand shapes of the lifted instruction set.
//!
//! An [`Operand`] is a closed sum over every value an instruction slot may hold. Passes
//! match on the shapes they care about and leave the rest untouched.
//!
//! # Constant-ness
//!
//! An operand is *constant* when reading it does not depend on program state that the
//! method itself computes: literals, declared entity references and raw numeric addresses.
//! Registers, stack offsets, locals and computed memory addresses are not constant. Only
//! non-constant operands take part in use/def lists and liveness.

use std::fmt;

use crate::{
    ir::local::LocalId,
    metadata::{FieldRc, MethodRc, TypeRc},
};

/// A physical register, optionally versioned for SSA.
///
/// `number` identifies the storage location. Only `version` changes while the method is
/// renamed into SSA form. Equality is structural over all three fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Register {
    /// Storage location
    pub number: u32,
    /// Display name (`rcx`, `stack_10`)
    pub name: Option<String>,
    /// SSA version, [`Register::UNVERSIONED`] before renaming
    pub version: i32,
}

impl Register {
    /// Version of a register that has not been renamed into SSA form.
    pub const UNVERSIONED: i32 = -1;
    /// Version of a parameter's initial definition.
    pub const PARAMETER_VERSION: i32 = 0;

    /// Creates an unversioned register.
    #[must_use]
    pub fn new(number: u32) -> Self {
        Register {
            number,
            name: None,
            version: Self::UNVERSIONED,
        }
    }

    /// Creates an unversioned register with a display name.
    #[must_use]
    pub fn named(number: u32, name: impl Into<String>) -> Self {
        Register {
            number,
            name: Some(name.into()),
            version: Self::UNVERSIONED,
        }
    }

    /// Same storage location, different version.
    #[must_use]
    pub fn with_version(&self, version: i32) -> Self {
        Register {
            number: self.number,
            name: self.name.clone(),
            version,
        }
    }

    /// Returns `true` for a value that was live on entry: never versioned, or a
    /// parameter's initial definition.
    #[must_use]
    pub fn is_entry_value(&self) -> bool {
        self.version <= Self::PARAMETER_VERSION
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name}")?,
            None => write!(f, "r{}", self.number)?,
        }
        if self.version != Self::UNVERSIONED {
            write!(f, "_{}", self.version)?;
        }
        Ok(())
    }
}

/// Register or local used inside a memory address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AddressPart {
    /// Before local recovery
    Register(Register),
    /// After local recovery
    Local(LocalId),
}

impl AddressPart {
    /// The register, if this part has not been turned into a local yet.
    #[must_use]
    pub fn as_register(&self) -> Option<&Register> {
        match self {
            AddressPart::Register(register) => Some(register),
            AddressPart::Local(_) => None,
        }
    }

    /// The local, if this part has been recovered.
    #[must_use]
    pub fn as_local(&self) -> Option<LocalId> {
        match self {
            AddressPart::Local(local) => Some(*local),
            AddressPart::Register(_) => None,
        }
    }
}

impl fmt::Display for AddressPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressPart::Register(register) => write!(f, "{register}"),
            AddressPart::Local(local) => write!(f, "{local}"),
        }
    }
}

/// `[base + addend + index * scale]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct MemoryAddress {
    /// Base register or local
    pub base: Option<AddressPart>,
    /// Index register or local
    pub index: Option<AddressPart>,
    /// Constant displacement
    pub addend: i64,
    /// Index multiplier, 0 when there is no index
    pub scale: i32,
}

impl MemoryAddress {
    /// `[base + addend]`
    #[must_use]
    pub fn based(base: Register, addend: i64) -> Self {
        MemoryAddress {
            base: Some(AddressPart::Register(base)),
            index: None,
            addend,
            scale: 0,
        }
    }

    /// `[address]`, a raw numeric address.
    #[must_use]
    pub fn absolute(address: u64) -> Self {
        MemoryAddress {
            base: None,
            index: None,
            addend: address as i64,
            scale: 0,
        }
    }

    /// Returns `true` when the address is a plain number, not computed at runtime.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        self.base.is_none() && self.index.is_none() && self.scale == 0
    }

    /// Base and index parts, in that order.
    pub fn parts(&self) -> impl Iterator<Item = &AddressPart> {
        self.base.iter().chain(self.index.iter())
    }

    /// Mutable base and index parts, in that order.
    pub fn parts_mut(&mut self) -> impl Iterator<Item = &mut AddressPart> {
        self.base.iter_mut().chain(self.index.iter_mut())
    }

    /// Returns `true` if the base or index is `local`.
    #[must_use]
    pub fn references_local(&self, local: LocalId) -> bool {
        self.parts().any(|part| part.as_local() == Some(local))
    }
}

impl fmt::Display for MemoryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_constant() {
            return write!(f, "[0x{:X}]", self.addend as u64);
        }

        write!(f, "[")?;
        let mut first = true;
        if let Some(base) = &self.base {
            write!(f, "{base}")?;
            first = false;
        }
        if let Some(index) = &self.index {
            if !first {
                write!(f, "+")?;
            }
            write!(f, "{index}*{}", self.scale)?;
            first = false;
        }
        if self.addend != 0 || first {
            if self.addend < 0 {
                write!(f, "-0x{:X}", self.addend.unsigned_abs())?;
            } else {
                if !first {
                    write!(f, "+")?;
                }
                write!(f, "0x{:X}", self.addend)?;
            }
        }
        write!(f, "]")
    }
}

/// Any value an instruction slot can hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// 32-bit integer literal
    Int(i32),
    /// 64-bit signed integer literal
    Long(i64),
    /// 64-bit unsigned integer literal
    ULong(u64),
    /// String literal
    Text(String),
    /// Physical register
    Register(Register),
    /// Slot relative to the stack pointer at instruction entry
    StackOffset(i32),
    /// Memory access
    Memory(MemoryAddress),
    /// Recovered local variable
    Local(LocalId),
    /// Declared method reference
    Method(MethodRc),
    /// Declared type reference
    Type(TypeRc),
    /// Declared field reference
    Field(FieldRc),
}

impl Operand {
    /// Returns `true` if reading this operand does not depend on method state.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        match self {
            Operand::Register(_) | Operand::StackOffset(_) | Operand::Local(_) => false,
            Operand::Memory(memory) => memory.is_constant(),
            _ => true,
        }
    }

    /// The local, if this operand is one.
    #[must_use]
    pub fn as_local(&self) -> Option<LocalId> {
        match self {
            Operand::Local(local) => Some(*local),
            _ => None,
        }
    }

    /// The register, if this operand is one.
    #[must_use]
    pub fn as_register(&self) -> Option<&Register> {
        match self {
            Operand::Register(register) => Some(register),
            _ => None,
        }
    }

    /// Registers read or written by this operand, including memory base and index.
    pub fn registers(&self) -> impl Iterator<Item = &Register> {
        let (direct, memory) = match self {
            Operand::Register(register) => (Some(register), None),
            Operand::Memory(memory) => (None, Some(memory)),
            _ => (None, None),
        };
        direct.into_iter().chain(
            memory
                .into_iter()
                .flat_map(MemoryAddress::parts)
                .filter_map(AddressPart::as_register),
        )
    }

    /// Mutable view of [`Operand::registers`].
    pub fn registers_mut(&mut self) -> Vec<&mut Register> {
        match self {
            Operand::Register(register) => vec![register],
            Operand::Memory(memory) => memory
                .parts_mut()
                .filter_map(|part| match part {
                    AddressPart::Register(register) => Some(register),
                    AddressPart::Local(_) => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Returns `true` if `local` is this operand or part of its memory address.
    #[must_use]
    pub fn references_local(&self, local: LocalId) -> bool {
        match self {
            Operand::Local(id) => *id == local,
            Operand::Memory(memory) => memory.references_local(local),
            _ => false,
        }
    }
}

impl From<Register> for Operand {
    fn from(register: Register) -> Self {
        Operand::Register(register)
    }
}

impl From<MemoryAddress> for Operand {
    fn from(memory: MemoryAddress) -> Self {
        Operand::Memory(memory)
    }
}

impl From<LocalId> for Operand {
    fn from(local: LocalId) -> Self {
        Operand::Local(local)
    }
}

impl From<i32> for Operand {
    fn from(value: i32) -> Self {
        Operand::Int(value)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Int(value) => write!(f, "{value}"),
            Operand::Long(value) => write!(f, "{value}L"),
            Operand::ULong(value) => write!(f, "0x{value:X}UL"),
            Operand::Text(text) => write!(f, "{text:?}"),
            Operand::Register(register) => write!(f, "{register}"),
            Operand::StackOffset(offset) if *offset < 0 => write!(f, "stack[-0x{:X}]", offset.unsigned_abs()),
            Operand::StackOffset(offset) => write!(f, "stack[0x{offset:X}]"),
            Operand::Memory(memory) => write!(f, "{memory}"),
            Operand::Local(local) => write!(f, "{local}"),
            Operand::Method(method) => write!(f, "{}", method.full_name()),
            Operand::Type(ty) => write!(f, "typeof({})", ty.full_name()),
            Operand::Field(field) => write!(f, "{field}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_classification() {
        assert!(Operand::Int(5).is_constant());
        assert!(Operand::ULong(u64::MAX).is_constant());
        assert!(Operand::Text("x".into()).is_constant());
        assert!(Operand::Memory(MemoryAddress::absolute(0x1000)).is_constant());

        assert!(!Operand::Register(Register::new(0)).is_constant());
        assert!(!Operand::StackOffset(8).is_constant());
        assert!(!Operand::Local(LocalId::new(0)).is_constant());
        assert!(!Operand::Memory(MemoryAddress::based(Register::new(1), 8)).is_constant());

        let scaled = MemoryAddress {
            base: None,
            index: None,
            addend: 0x40,
            scale: 8,
        };
        assert!(!scaled.is_constant());
    }

    #[test]
    fn test_register_equality_is_structural() {
        let a = Register::new(3);
        assert_eq!(a, Register::new(3));
        assert_ne!(a, a.with_version(1));
        assert_ne!(a, Register::named(3, "rbx"));
        assert!(a.is_entry_value());
        assert!(a.with_version(Register::PARAMETER_VERSION).is_entry_value());
        assert!(!a.with_version(2).is_entry_value());
    }

    #[test]
    fn test_registers_include_address_parts() {
        let memory = Operand::Memory(MemoryAddress {
            base: Some(AddressPart::Register(Register::new(1))),
            index: Some(AddressPart::Register(Register::new(2))),
            addend: 0,
            scale: 4,
        });
        let numbers: Vec<u32> = memory.registers().map(|r| r.number).collect();
        assert_eq!(numbers, vec![1, 2]);

        let direct = Operand::Register(Register::new(7));
        assert_eq!(direct.registers().count(), 1);
        assert_eq!(Operand::Int(1).registers().count(), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(Register::named(0, "rax").with_version(2).to_string(), "rax_2");
        assert_eq!(Register::new(4).to_string(), "r4");
        assert_eq!(MemoryAddress::based(Register::new(1), 0x10).to_string(), "[r1+0x10]");
        assert_eq!(MemoryAddress::based(Register::new(1), -8).to_string(), "[r1-0x8]");
        assert_eq!(MemoryAddress::absolute(0x1234).to_string(), "[0x1234]");
        assert_eq!(Operand::StackOffset(-16).to_string(), "stack[-0x10]");
    }
}
