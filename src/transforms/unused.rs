//! Dead definition removal.

use log::debug;

use crate::{
    analysis::BlockId,
    ir::{LocalId, Operand},
    metadata::ResolutionContext,
    transforms::{cleanup, Transform},
    Method, Result,
};

/// Removes definitions of locals that are never read afterwards.
///
/// Call results are kept for the call's side effects, and parameters are kept because a
/// write to one may be an out parameter. Removing a definition can make the definitions
/// feeding it dead, so the pass repeats until nothing changes.
pub struct RemoveUnusedLocals;

impl Default for RemoveUnusedLocals {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoveUnusedLocals {
    /// Creates a new pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn dead_definitions(method: &Method) -> Vec<(BlockId, usize, LocalId)> {
    let mut dead = Vec::new();
    for block in method.graph().blocks() {
        for (position, instruction) in block.instructions().iter().enumerate() {
            if instruction.is_call() {
                continue;
            }
            let Some(id) = instruction.destination().and_then(Operand::as_local) else {
                continue;
            };
            let removable = method
                .local(id)
                .is_some_and(|local| !local.is_parameter() && !local.is_field_view());
            if removable && !method.local_usage_after(block.id(), position + 1, id).is_used() {
                dead.push((block.id(), position, id));
            }
        }
    }
    dead
}

impl Transform for RemoveUnusedLocals {
    fn name(&self) -> &'static str {
        "remove-unused-locals"
    }

    fn description(&self) -> &'static str {
        "Removes definitions whose value is never read"
    }

    fn apply(&self, method: &mut Method, _context: &dyn ResolutionContext) -> Result<()> {
        let mut removed = 0;
        loop {
            let dead = dead_definitions(method);
            if dead.is_empty() {
                break;
            }

            for (block, position, _) in &dead {
                if let Some(instruction) = method
                    .graph_mut()
                    .block_mut(*block)
                    .and_then(|block| block.instructions_mut().get_mut(*position))
                {
                    instruction.make_nop();
                }
            }
            for (_, _, id) in &dead {
                method.try_remove_local(*id);
            }
            removed += dead.len();
        }

        // Phi sources and operands of removed moves may have lost their last reader
        let swept = method.remove_unreferenced_locals();
        cleanup(method.graph_mut());
        debug!(
            "{}: removed {} dead definitions and {} locals",
            method.full_name(),
            removed,
            swept
        );
        Ok(())
    }
}
