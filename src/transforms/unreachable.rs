//! Removal of blocks the entry cannot reach.
//!
//! Dead blocks come from jumps the front end resolved past, or from code after a
//! non-returning call. They would otherwise hold phantom definitions and predecessors.

use log::debug;

use crate::{metadata::ResolutionContext, transforms::Transform, Method, Result};

/// Drops every body block unreachable from the entry.
pub struct RemoveUnreachableBlocks;

impl Default for RemoveUnreachableBlocks {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoveUnreachableBlocks {
    /// Creates a new pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Transform for RemoveUnreachableBlocks {
    fn name(&self) -> &'static str {
        "remove-unreachable-blocks"
    }

    fn description(&self) -> &'static str {
        "Removes blocks unreachable from the entry"
    }

    fn apply(&self, method: &mut Method, _context: &dyn ResolutionContext) -> Result<()> {
        let reachable = method.graph().reachable();
        let dead: Vec<_> = method
            .graph()
            .layout()
            .iter()
            .copied()
            .filter(|id| !reachable.contains(*id))
            .collect();

        if dead.is_empty() {
            return Ok(());
        }

        for id in &dead {
            method.graph_mut().remove_block(*id)?;
        }
        method.rebuild_dominance();

        debug!("{}: removed {} unreachable blocks", method.full_name(), dead.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::Instruction,
        metadata::NullContext,
        transforms::test_support::{method, r},
    };

    #[test]
    fn test_removes_dead_code_after_jump() -> Result<()> {
        // 0: goto 2
        // 1: r0 = 1      (dead)
        // 2: return
        let mut method = method(vec![
            Instruction::jump(0, 2),
            Instruction::mov(1, r(0), 1),
            Instruction::ret_void(2),
        ]);
        assert_eq!(method.graph().layout().len(), 3);

        RemoveUnreachableBlocks::new().apply(&mut method, &NullContext)?;

        assert_eq!(method.graph().layout().len(), 2);
        assert_eq!(method.instruction_count(), 2);
        for block in method.graph().layout() {
            assert!(method.dominance().dominates(method.graph().entry(), *block));
        }
        Ok(())
    }

    #[test]
    fn test_keeps_reachable_graph() -> Result<()> {
        let mut method = method(vec![
            Instruction::branch_if(0, 2, r(0)),
            Instruction::mov(1, r(1), 1),
            Instruction::ret_void(2),
        ]);

        RemoveUnreachableBlocks::new().apply(&mut method, &NullContext)?;
        assert_eq!(method.instruction_count(), 3);
        Ok(())
    }
}
