//! Program analysis infrastructure for lifted methods.
//!
//! This module provides the graph structures every transform works on.
//!
//! # Architecture
//!
//! The analysis module is organized into focused sub-modules:
//!
//! - [`cfg`] - Control flow graph construction, structural rewrites and forward walks
//! - [`dominance`] - Dominators, post-dominators, frontiers and the dominator tree
//!
//! # Usage
//!
//! ```rust,ignore
//! use dotlift::analysis::{ControlFlowGraph, Dominance};
//!
//! let graph = ControlFlowGraph::build(instructions);
//! let dominance = Dominance::compute(&graph);
//! for block in graph.layout() {
//!     println!("{block} frontier: {:?}", dominance.frontier(*block));
//! }
//! ```

pub mod cfg;
pub mod dominance;

// Re-export primary types at module level
pub use cfg::{escape_dot, Block, BlockId, BlockKind, BlockSet, ControlFlowGraph, Usage, WalkControl};
pub use dominance::Dominance;
