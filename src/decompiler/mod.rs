//! Pipeline driver.
//!
//! [`Decompiler`] owns a [`DecompilerConfig`] and the ordered list of transforms. It checks
//! the instruction ceiling, runs every pass over a [`crate::Method`] and hands the result to
//! the [`crate::codegen::CodeGenerator`].

mod config;
mod driver;

pub use config::{DecompilerConfig, DEFAULT_LIMIT};
pub use driver::Decompiler;
