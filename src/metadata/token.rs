//! Identity of declared entities.
//!
//! The front end hands over types, methods and fields together with the token each one
//! carries in the module being rebuilt. Passes never compare definitions by name: two
//! definitions denote the same entity when their tokens match, and field views are keyed
//! by the field's token. A token packs the kind of entity into its top byte and a 1-based
//! position among entities of that kind into the remaining 24 bits.

use std::fmt;

use strum::Display;

/// The kind of entity a [`Token`] denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TokenKind {
    /// A type definition
    #[strum(serialize = "type")]
    Type,
    /// A field definition
    #[strum(serialize = "field")]
    Field,
    /// A method definition
    #[strum(serialize = "method")]
    Method,
    /// Any other table, carried through untouched
    #[strum(serialize = "other")]
    Other,
}

/// Identity of a type, method or field.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(u32);

impl Token {
    /// Top byte of type definition tokens.
    pub const TYPE_DEF: u8 = 0x02;
    /// Top byte of field tokens.
    pub const FIELD: u8 = 0x04;
    /// Top byte of method definition tokens.
    pub const METHOD_DEF: u8 = 0x06;

    const ROW_MASK: u32 = 0x00FF_FFFF;

    /// Wraps an encoded token.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Token(raw)
    }

    /// Packs a kind byte and a row. Row bits that do not fit are dropped.
    #[must_use]
    pub const fn from_parts(table: u8, row: u32) -> Self {
        Token(((table as u32) << 24) | (row & Self::ROW_MASK))
    }

    /// The encoded value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// The kind byte.
    #[must_use]
    pub const fn table(self) -> u8 {
        self.0.to_be_bytes()[0]
    }

    /// Position among entities of the same kind.
    #[must_use]
    pub const fn row(self) -> u32 {
        self.0 & Self::ROW_MASK
    }

    /// What the token identifies.
    #[must_use]
    pub const fn kind(self) -> TokenKind {
        match self.table() {
            Self::TYPE_DEF => TokenKind::Type,
            Self::FIELD => TokenKind::Field,
            Self::METHOD_DEF => TokenKind::Method,
            _ => TokenKind::Other,
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind(), self.row())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}
