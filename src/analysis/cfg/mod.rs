//! Control Flow Graph (CFG) construction and rewriting.
//!
//! This module turns a method's flat instruction list into a graph of basic blocks and
//! provides the structural rewrites the passes rely on.
//!
//! # Architecture
//!
//! Blocks live in an arena owned by [`ControlFlowGraph`] and are addressed by [`BlockId`].
//! Edges are id lists on both ends. Two sentinel blocks frame every graph: the entry, whose
//! only successor is the first body block, and the exit, which every return and every
//! path falling off the end leads to. Sentinels hold no instructions and are not part of
//! the layout.
//!
//! # Key Components
//!
//! - [`ControlFlowGraph`] - The graph, its builder and structural rewrites
//! - [`Block`] / [`BlockId`] - Basic blocks and their stable ids
//! - [`BlockSet`] - Bitsets over block ids for dominance computations
//! - [`Usage`] / [`WalkControl`] - Results of forward walks over the graph
//!
//! # Examples
//!
//! ```rust,ignore
//! use dotlift::analysis::ControlFlowGraph;
//!
//! let graph = ControlFlowGraph::build(instructions);
//! for block in graph.blocks() {
//!     println!("{block}");
//! }
//! ```

mod block;
mod blockset;
mod dot;
mod graph;
mod walk;

pub use block::{Block, BlockId, BlockKind};
pub use blockset::BlockSet;
pub use dot::escape_dot;
pub use graph::ControlFlowGraph;
pub use walk::{Usage, WalkControl};
