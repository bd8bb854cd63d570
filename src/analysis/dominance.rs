//! Dominator and post-dominator analysis.
//!
//! A block `d` **dominates** `n` if every path from the entry to `n` passes through `d`.
//! Post-dominance is the mirror image over paths from `n` to the exit. Both relations are
//! computed here as sets with the classic iterative fixpoint, which is simple and fast
//! enough for the block counts a single method produces.
//!
//! # Derived information
//!
//! - Immediate (post-)dominators: the strict dominator dominated by every other strict
//!   dominator of a block
//! - Dominance frontiers: the join blocks where a block's dominance ends, which is exactly
//!   where SSA construction places phis
//! - The dominator tree: each block's children are the blocks it immediately dominates
//!
//! # Lifetime
//!
//! A [`Dominance`] describes the graph it was computed from. The owning
//! [`crate::Method`] computes it at construction and rebuilds it after the passes that
//! restructure the graph before SSA construction; nothing after SSA destruction reads it.
//!
//! # Examples
//!
//! ```rust,ignore
//! use dotlift::analysis::{ControlFlowGraph, Dominance};
//!
//! let graph = ControlFlowGraph::build(instructions);
//! let dominance = Dominance::compute(&graph);
//! for block in graph.layout() {
//!     assert!(dominance.dominates(graph.entry(), *block));
//! }
//! ```

use crate::analysis::cfg::{BlockId, BlockSet, ControlFlowGraph};

/// Dominance information of one control flow graph.
#[derive(Debug, Clone)]
pub struct Dominance {
    entry: BlockId,
    exit: BlockId,
    dominators: Vec<BlockSet>,
    post_dominators: Vec<BlockSet>,
    idom: Vec<Option<BlockId>>,
    ipdom: Vec<Option<BlockId>>,
    frontiers: Vec<Vec<BlockId>>,
    children: Vec<Vec<BlockId>>,
}

impl Dominance {
    /// Computes every dominance relation of `graph`.
    #[must_use]
    pub fn compute(graph: &ControlFlowGraph) -> Self {
        let nodes = graph.block_ids();
        let capacity = graph.capacity();

        let dominators = solve(graph, &nodes, graph.entry(), |id| graph.predecessors(id));
        let post_dominators = solve(graph, &nodes, graph.exit(), |id| graph.successors(id));

        let idom = immediate(&nodes, &dominators, capacity);
        let ipdom = immediate(&nodes, &post_dominators, capacity);

        let mut children = vec![Vec::new(); capacity];
        for node in &nodes {
            if let Some(parent) = idom[node.index()] {
                children[parent.index()].push(*node);
            }
        }

        let mut frontiers: Vec<Vec<BlockId>> = vec![Vec::new(); capacity];
        for join in &nodes {
            let predecessors = graph.predecessors(*join);
            if predecessors.len() < 2 {
                continue;
            }

            let join_idom = idom[join.index()];
            for predecessor in predecessors {
                let mut runner = Some(*predecessor);
                while let Some(current) = runner {
                    if Some(current) == join_idom {
                        break;
                    }
                    let frontier = &mut frontiers[current.index()];
                    if !frontier.contains(join) {
                        frontier.push(*join);
                    }
                    runner = idom[current.index()];
                }
            }
        }

        Dominance {
            entry: graph.entry(),
            exit: graph.exit(),
            dominators,
            post_dominators,
            idom,
            ipdom,
            frontiers,
            children,
        }
    }

    /// The root of the dominator tree.
    #[must_use]
    pub const fn entry(&self) -> BlockId {
        self.entry
    }

    /// The root of the post-dominator tree.
    #[must_use]
    pub const fn exit(&self) -> BlockId {
        self.exit
    }

    /// Returns `true` if `a` dominates `b`. Every block dominates itself.
    #[must_use]
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        self.dominators.get(b.index()).is_some_and(|set| set.contains(a))
    }

    /// Returns `true` if `a` dominates `b` and `a != b`.
    #[must_use]
    pub fn strictly_dominates(&self, a: BlockId, b: BlockId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Returns `true` if `a` post-dominates `b`.
    #[must_use]
    pub fn post_dominates(&self, a: BlockId, b: BlockId) -> bool {
        self.post_dominators.get(b.index()).is_some_and(|set| set.contains(a))
    }

    /// The dominator set of `block`, itself included.
    #[must_use]
    pub fn dominators(&self, block: BlockId) -> Option<&BlockSet> {
        self.dominators.get(block.index())
    }

    /// The post-dominator set of `block`, itself included.
    #[must_use]
    pub fn post_dominators(&self, block: BlockId) -> Option<&BlockSet> {
        self.post_dominators.get(block.index())
    }

    /// The immediate dominator, `None` for the entry and unreachable blocks.
    #[must_use]
    pub fn immediate_dominator(&self, block: BlockId) -> Option<BlockId> {
        self.idom.get(block.index()).copied().flatten()
    }

    /// The immediate post-dominator, `None` for the exit and blocks that never reach it.
    #[must_use]
    pub fn immediate_post_dominator(&self, block: BlockId) -> Option<BlockId> {
        self.ipdom.get(block.index()).copied().flatten()
    }

    /// The dominance frontier of `block`.
    #[must_use]
    pub fn frontier(&self, block: BlockId) -> &[BlockId] {
        self.frontiers.get(block.index()).map_or(&[], Vec::as_slice)
    }

    /// Blocks immediately dominated by `block`, in layout order.
    #[must_use]
    pub fn children(&self, block: BlockId) -> &[BlockId] {
        self.children.get(block.index()).map_or(&[], Vec::as_slice)
    }

    /// The iterated dominance frontier of a set of blocks.
    ///
    /// This is the closure of the frontier under itself: the blocks that need a phi for a
    /// value defined in every block of `blocks`.
    #[must_use]
    pub fn iterated_frontier(&self, blocks: impl IntoIterator<Item = BlockId>) -> Vec<BlockId> {
        let mut result = Vec::new();
        let mut seen = BlockSet::new(self.dominators.len());
        let mut worklist: Vec<BlockId> = blocks.into_iter().collect();

        while let Some(block) = worklist.pop() {
            for frontier in self.frontier(block) {
                if seen.insert(*frontier) {
                    result.push(*frontier);
                    worklist.push(*frontier);
                }
            }
        }

        result
    }

    /// Blocks of the dominator tree in pre-order, children in layout order.
    #[must_use]
    pub fn preorder(&self) -> Vec<BlockId> {
        let mut order = Vec::new();
        let mut stack = vec![self.entry];
        while let Some(block) = stack.pop() {
            order.push(block);
            stack.extend(self.children(block).iter().rev().copied());
        }
        order
    }
}

/// Iterates `set(n) = {n} ∪ ⋂ set(p)` over the given edge direction until nothing changes.
///
/// Blocks without incoming edges in that direction (other than the root) are only
/// dominated by themselves.
fn solve<'g, F>(graph: &'g ControlFlowGraph, nodes: &[BlockId], root: BlockId, incoming: F) -> Vec<BlockSet>
where
    F: Fn(BlockId) -> &'g [BlockId],
{
    let capacity = graph.capacity();
    let all = BlockSet::from_ids(capacity, nodes.iter().copied());

    let mut sets: Vec<BlockSet> = (0..capacity).map(|_| BlockSet::new(capacity)).collect();
    for node in nodes {
        sets[node.index()] = if *node == root {
            BlockSet::from_ids(capacity, [root])
        } else {
            all.clone()
        };
    }

    let mut changed = true;
    while changed {
        changed = false;
        for node in nodes {
            if *node == root {
                continue;
            }

            let mut next = all.clone();
            let mut any = false;
            for source in incoming(*node) {
                next.intersect_with(&sets[source.index()]);
                any = true;
            }
            if !any {
                next = BlockSet::new(capacity);
            }
            next.insert(*node);

            if next != sets[node.index()] {
                sets[node.index()] = next;
                changed = true;
            }
        }
    }

    sets
}

/// Picks, for every block, the strict dominator that all other strict dominators dominate.
fn immediate(nodes: &[BlockId], sets: &[BlockSet], capacity: usize) -> Vec<Option<BlockId>> {
    let mut result = vec![None; capacity];

    for node in nodes {
        let mut strict = sets[node.index()].clone();
        strict.remove(*node);
        if strict.is_empty() {
            continue;
        }

        result[node.index()] = strict
            .iter()
            .find(|candidate| strict.is_subset(&sets[candidate.index()]));
    }

    result
}
