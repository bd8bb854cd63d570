// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # dotlift
//!
//! A decompiler middle-end and back-end that lifts method bodies recovered from native
//! code into typed, stack-based CIL.
//!
//! A front end (out of scope here) disassembles a native method into a flat list of
//! [`ir::Instruction`]s over registers, stack offsets and memory addresses. `dotlift` builds
//! a control flow graph, normalizes the stack, goes through SSA form to recover locals,
//! propagates types and resolves fields from declared metadata, folds trivial values into
//! their uses, and finally emits a [`codegen::CilBody`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dotlift::prelude::*;
//!
//! let player = TypeDefinition::new(Token::from_parts(Token::TYPE_DEF, 1), "Game", "Player");
//! let definition = MethodDefinition::builder(Token::from_parts(Token::METHOD_DEF, 1), "Tick", &player)
//!     .flags(MethodFlags::STATIC)
//!     .build();
//!
//! let mut method = Method::new(definition, instructions, Vec::new());
//! let body = Decompiler::default().decompile_or_stub(&mut method, &NullContext)?;
//! println!("{body}");
//! # Ok::<(), dotlift::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`ir`] - Operands, opcodes, instructions and recovered locals
//! - [`metadata`] - Declared types, methods and fields, and the [`metadata::ResolutionContext`]
//! - [`analysis`] - Control flow graph and dominance
//! - [`transforms`] - The passes, each a [`transforms::Transform`]
//! - [`codegen`] - Symbolic CIL and the generator
//! - [`decompiler`] - Configuration and the pipeline driver
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Error Handling
//!
//! Three ceilings abort the current method only: the instruction count, the stack analysis
//! visit budget and the type propagation loop budget. [`Error::is_limit`] identifies them,
//! and [`Decompiler::decompile_or_stub`] replaces the body with one that throws at runtime.
//!
//! ```rust,ignore
//! match decompiler.decompile(&mut method, &context) {
//!     Ok(body) => println!("{body}"),
//!     Err(e) if e.is_limit() => println!("{}", Decompiler::stub_body(&e.to_string())),
//!     Err(e) => return Err(e),
//! }
//! ```
//!
//! Conditions that do not stop generation (an unbalanced stack, a branch whose target
//! vanished, an instruction the front end could not decode) are kept as
//! [`Method::warnings`] and logged through the `log` facade.
//!
//! ## Concurrency
//!
//! Everything is synchronous. A [`Decompiler`] holds no per-method state, so a caller may
//! share one across threads that each own a [`Method`], provided the resolution context is
//! safe to read concurrently (it is `Send + Sync` by contract).

#[macro_use]
pub(crate) mod error;

pub mod analysis;
pub mod codegen;
pub mod decompiler;
pub mod ir;
pub mod metadata;
pub mod prelude;
pub mod transforms;

mod method;

/// `dotlift` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`Error`]. This is used consistently throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// `dotlift` Error type
///
/// The main error type for all operations in this crate. See [`Error::is_limit`] for the
/// errors a caller recovers from with a stub body.
pub use error::Error;

/// A lifted method with its graph, locals and warnings
pub use method::Method;

/// Pipeline driver and its configuration
pub use decompiler::{Decompiler, DecompilerConfig};

/// Generated CIL
pub use codegen::{CilBody, CilInstruction, CilOpCode, CilOperand};
