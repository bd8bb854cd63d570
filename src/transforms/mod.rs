//! Transforms applied to a lifted method.
//!
//! Every pass implements [`Transform`] and mutates one [`Method`] in place. The driver runs
//! them in a fixed order; passes do not schedule each other.
//!
//! # Pipeline
//!
//! 1. [`RemoveUnreachableBlocks`] - drops blocks the entry cannot reach
//! 2. [`StackAnalysis`] - turns stack-relative operands into registers
//! 3. [`BuildUseDefLists`] - per-block use and def lists
//! 4. [`BuildSsaForm`] - phi insertion and register versioning
//! 5. [`CreateLocals`] - one local per versioned register, parameters bound by slot
//! 6. [`BuildUseDefLists`]
//! 7. [`RemoveUnusedLocals`] - dead definitions
//! 8. [`RemoveSsaForm`] - phis lowered to moves on incoming edges
//! 9. [`ResolveTypeAddresses`] - constant addresses naming types
//! 10. [`TypePropagation`] - types from signatures, moves and field offsets
//! 11. [`BuildUseDefLists`]
//! 12. [`Inlining`] - aliases and single-use constants folded into their uses
//! 13. [`ResolveStaticFields`] - static field views replaced by field references
//! 14. [`BuildUseDefLists`]
//!
//! # Dominance
//!
//! Dominance is computed with the method and rebuilt by the passes that restructure the
//! graph before SSA construction. It is not read after SSA destruction.

mod inlining;
mod locals;
mod ssa_build;
mod ssa_destroy;
mod stack;
mod static_fields;
mod type_addresses;
mod types;
mod unreachable;
mod unused;
mod usedef;

pub use inlining::Inlining;
pub use locals::CreateLocals;
pub use ssa_build::BuildSsaForm;
pub use ssa_destroy::RemoveSsaForm;
pub use stack::StackAnalysis;
pub use static_fields::ResolveStaticFields;
pub use type_addresses::ResolveTypeAddresses;
pub use types::TypePropagation;
pub use unreachable::RemoveUnreachableBlocks;
pub use unused::RemoveUnusedLocals;
pub use usedef::BuildUseDefLists;

use log::trace;

use crate::{analysis::ControlFlowGraph, metadata::ResolutionContext, Method, Result};

/// A pass over one method.
///
/// Passes must be thread-safe (Send + Sync) so one pipeline can be shared by workers
/// decompiling different methods. Any scratch state lives on the stack of
/// [`Transform::apply`], never on the pass itself.
pub trait Transform: Send + Sync {
    /// Unique name for logging and debugging.
    fn name(&self) -> &'static str;

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }

    /// Runs the pass.
    ///
    /// # Arguments
    ///
    /// * `method` - The method to transform
    /// * `context` - Resolves addresses and offsets to declared entities
    ///
    /// # Errors
    ///
    /// Returns an error if a configured ceiling is exceeded or the method is malformed.
    fn apply(&self, method: &mut Method, context: &dyn ResolutionContext) -> Result<()>;
}

/// Drops `Nop`s and the blocks they leave empty.
pub(crate) fn cleanup(graph: &mut ControlFlowGraph) {
    let nops = graph.remove_nops();
    let blocks = graph.remove_empty_blocks();
    let branches = graph.fix_branches();
    if nops + blocks + branches > 0 {
        trace!("cleanup removed {nops} nops, {blocks} blocks, {branches} branches");
    }
}

/// The highest register number any operand or parameter slot mentions.
pub(crate) fn max_register_number(method: &Method) -> Option<u32> {
    let in_code = method
        .graph()
        .instructions()
        .flat_map(|instruction| {
            instruction
                .operands()
                .into_iter()
                .flat_map(|operand| operand.registers().map(|register| register.number))
                .collect::<Vec<_>>()
        })
        .max();
    let in_parameters = method
        .parameters()
        .iter()
        .flat_map(|operand| operand.registers().map(|register| register.number))
        .max();

    in_code.max(in_parameters)
}
