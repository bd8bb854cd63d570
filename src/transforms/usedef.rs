//! Per-block use and def lists.

use crate::{ir::Operand, metadata::ResolutionContext, transforms::Transform, Method, Result};

/// Recomputes every block's use and def lists.
///
/// Uses are the non-constant sources, defs the destinations, both in first occurrence
/// order without duplicates.
///
/// No pass in this crate reads the lists: passes that rewrite instructions query the graph
/// directly. The lists are refreshed after each group of rewriting passes so that callers
/// inspecting [`Block::uses`] and [`Block::defs`] between passes, or after
/// [`crate::Decompiler::run_transforms`], see the current body.
///
/// [`Block::uses`]: crate::analysis::Block::uses
/// [`Block::defs`]: crate::analysis::Block::defs
pub struct BuildUseDefLists;

impl Default for BuildUseDefLists {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildUseDefLists {
    /// Creates a new pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn push_unique(list: &mut Vec<Operand>, operand: &Operand) {
    if !list.contains(operand) {
        list.push(operand.clone());
    }
}

impl Transform for BuildUseDefLists {
    fn name(&self) -> &'static str {
        "build-use-def-lists"
    }

    fn description(&self) -> &'static str {
        "Recomputes per-block use and def lists"
    }

    fn apply(&self, method: &mut Method, _context: &dyn ResolutionContext) -> Result<()> {
        let ids = method.graph().block_ids();
        for id in ids {
            let Some(block) = method.graph_mut().block_mut(id) else {
                continue;
            };

            let mut uses = Vec::new();
            let mut defs = Vec::new();
            for instruction in &block.instructions {
                for source in instruction.sources() {
                    push_unique(&mut uses, source);
                }
                if let Some(destination) = instruction.destination() {
                    push_unique(&mut defs, destination);
                }
            }

            block.uses = uses;
            block.defs = defs;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{BinaryOp, Instruction},
        metadata::NullContext,
        transforms::test_support::{method, r},
    };

    #[test]
    fn test_lists_are_deduplicated_and_skip_constants() -> Result<()> {
        let mut method = method(vec![
            Instruction::binary(0, BinaryOp::Add, r(0), r(1), 4),
            Instruction::binary(1, BinaryOp::Add, r(0), r(0), r(1)),
            Instruction::ret(2, r(0)),
        ]);

        BuildUseDefLists::new().apply(&mut method, &NullContext)?;

        let body = method.graph().layout()[0];
        let block = method.graph().block(body).expect("body block");
        assert_eq!(block.uses(), &[r(1), r(0)]);
        assert_eq!(block.defs(), &[r(0)]);
        Ok(())
    }
}
