//! DOT rendering of control flow graphs, for inspecting pass output with Graphviz.

use std::fmt::Write;

use crate::analysis::cfg::{BlockKind, ControlFlowGraph};

/// Escapes a string for safe use in DOT labels.
#[must_use]
pub fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\l")
        .replace('\r', "")
        .replace('<', "\\<")
        .replace('>', "\\>")
        .replace('{', "\\{")
        .replace('}', "\\}")
}

impl ControlFlowGraph {
    /// Renders the graph in DOT format, one record per block with its instructions.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let dot = method.graph().to_dot(Some("Program.Main"));
    /// std::fs::write("main.dot", dot)?;
    /// ```
    #[must_use]
    pub fn to_dot(&self, title: Option<&str>) -> String {
        let mut dot = String::new();

        dot.push_str("digraph ControlFlow {\n");
        let _ = writeln!(dot, "    label=\"{}\";", escape_dot(title.unwrap_or("Control Flow")));
        dot.push_str("    labelloc=t;\n");
        dot.push_str("    node [shape=box, fontname=\"Courier\", fontsize=10];\n\n");

        for id in self.block_ids() {
            let Some(block) = self.block(id) else {
                continue;
            };
            match block.kind() {
                BlockKind::Entry => {
                    let _ = writeln!(dot, "    \"{id}\" [label=\"entry\", shape=oval];");
                }
                BlockKind::Exit => {
                    let _ = writeln!(dot, "    \"{id}\" [label=\"exit\", shape=oval];");
                }
                BlockKind::Body => {
                    let mut label = format!("{id}\n");
                    for instruction in block.instructions() {
                        let _ = writeln!(label, "{instruction}");
                    }
                    let _ = writeln!(dot, "    \"{id}\" [label=\"{}\"];", escape_dot(&label));
                }
            }
        }

        dot.push('\n');

        for id in self.block_ids() {
            let fall_through = self.fall_through(id);
            for successor in self.successors(id) {
                let style = if self.block(id).is_some_and(|b| !b.is_sentinel()) && fall_through != Some(*successor) {
                    " [style=dashed]"
                } else {
                    ""
                };
                let _ = writeln!(dot, "    \"{id}\" -> \"{successor}\"{style};");
            }
        }

        dot.push_str("}\n");
        dot
    }
}
