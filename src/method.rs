//! The unit of work of the decompiler: one method being transformed.
//!
//! A [`Method`] binds a declared [`MethodDefinition`] to the graph built from its lifted
//! instructions, the dominance information of that graph, the locals recovered so far and
//! the warnings collected along the way. Every transform mutates one `Method` in place.

use std::fmt;

use log::warn;

use crate::{
    analysis::{BlockId, ControlFlowGraph, Dominance, Usage},
    ir::{Instruction, LocalId, LocalVariable, Operand},
    metadata::{MethodDefinition, MethodRc},
};

/// A method being decompiled.
///
/// # Examples
///
/// ```rust,ignore
/// use dotlift::{ir::Instruction, ir::Register, Method};
///
/// let method = Method::new(definition, vec![Instruction::ret_void(0)], vec![Register::new(1).into()]);
/// assert_eq!(method.instruction_count(), 1);
/// ```
#[derive(Debug)]
pub struct Method {
    definition: MethodRc,
    parameters: Vec<Operand>,
    graph: ControlFlowGraph,
    dominance: Dominance,
    locals: Vec<Option<LocalVariable>>,
    warnings: Vec<String>,
}

impl Method {
    /// Builds the graph and dominance information of a lifted method.
    ///
    /// # Arguments
    ///
    /// * `definition` - The declared method
    /// * `instructions` - The flat instruction list from the front end
    /// * `parameters` - Where each parameter slot lives on entry, receiver first for
    ///   instance methods
    #[must_use]
    pub fn new(definition: MethodRc, instructions: Vec<Instruction>, parameters: Vec<Operand>) -> Self {
        let graph = ControlFlowGraph::build(instructions);
        let dominance = Dominance::compute(&graph);

        Method {
            definition,
            parameters,
            graph,
            dominance,
            locals: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// The declared method.
    #[must_use]
    pub fn definition(&self) -> &MethodDefinition {
        &self.definition
    }

    /// `Type.Method`, as used in diagnostics.
    #[must_use]
    pub fn full_name(&self) -> String {
        self.definition.full_name()
    }

    /// Entry locations of the parameter slots.
    #[must_use]
    pub fn parameters(&self) -> &[Operand] {
        &self.parameters
    }

    pub(crate) fn parameters_mut(&mut self) -> &mut [Operand] {
        &mut self.parameters
    }

    /// The control flow graph.
    #[must_use]
    pub fn graph(&self) -> &ControlFlowGraph {
        &self.graph
    }

    /// The control flow graph, mutably.
    pub fn graph_mut(&mut self) -> &mut ControlFlowGraph {
        &mut self.graph
    }

    /// Dominance information as of construction or the last structural pass before SSA.
    #[must_use]
    pub fn dominance(&self) -> &Dominance {
        &self.dominance
    }

    pub(crate) fn rebuild_dominance(&mut self) {
        self.dominance = Dominance::compute(&self.graph);
    }

    /// Splits the borrow so SSA construction can edit the graph while walking dominance.
    pub(crate) fn graph_and_dominance(&mut self) -> (&mut ControlFlowGraph, &Dominance) {
        (&mut self.graph, &self.dominance)
    }

    /// Total number of instructions in the graph.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.graph.instruction_count()
    }

    /// Adds a local and returns its id.
    pub fn add_local(&mut self, local: LocalVariable) -> LocalId {
        self.locals.push(Some(local));
        LocalId::new(self.locals.len() - 1)
    }

    /// Returns a live local.
    #[must_use]
    pub fn local(&self, id: LocalId) -> Option<&LocalVariable> {
        self.locals.get(id.index()).and_then(Option::as_ref)
    }

    /// Returns a live local mutably.
    pub fn local_mut(&mut self, id: LocalId) -> Option<&mut LocalVariable> {
        self.locals.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Live locals in creation order.
    pub fn locals(&self) -> impl Iterator<Item = (LocalId, &LocalVariable)> {
        self.locals
            .iter()
            .enumerate()
            .filter_map(|(index, local)| local.as_ref().map(|local| (LocalId::new(index), local)))
    }

    /// Number of live locals.
    #[must_use]
    pub fn local_count(&self) -> usize {
        self.locals.iter().flatten().count()
    }

    /// Locals bound to parameter slots, ordered by slot.
    #[must_use]
    pub fn parameter_locals(&self) -> Vec<(LocalId, &LocalVariable)> {
        let mut parameters: Vec<(LocalId, &LocalVariable)> =
            self.locals().filter(|(_, local)| local.is_parameter()).collect();
        parameters.sort_by_key(|(_, local)| local.parameter);
        parameters
    }

    /// Removes a local unless it binds a parameter or is still referenced.
    ///
    /// # Returns
    ///
    /// `true` if the local was removed.
    pub fn try_remove_local(&mut self, id: LocalId) -> bool {
        match self.local(id) {
            Some(local) if !local.is_parameter() => {}
            _ => return false,
        }
        if self.is_local_referenced(id) {
            return false;
        }

        self.locals[id.index()] = None;
        true
    }

    /// Removes every local that no instruction or field view refers to any more.
    ///
    /// Parameters and field views are kept. Returns the number of locals removed.
    pub fn remove_unreferenced_locals(&mut self) -> usize {
        let candidates: Vec<LocalId> = self
            .locals()
            .filter(|(_, local)| !local.is_parameter() && !local.is_field_view())
            .map(|(id, _)| id)
            .collect();

        candidates
            .into_iter()
            .filter(|id| self.try_remove_local(*id))
            .count()
    }

    /// Returns `true` if any instruction operand or field view refers to `id`.
    #[must_use]
    pub fn is_local_referenced(&self, id: LocalId) -> bool {
        let in_views = self.locals().any(|(_, local)| local.base == Some(id));
        in_views
            || self
                .graph
                .instructions()
                .any(|instruction| instruction.operands().iter().any(|operand| operand.references_local(id)))
    }

    /// Number of instructions writing `id` directly.
    #[must_use]
    pub fn definition_count(&self, id: LocalId) -> usize {
        self.graph
            .instructions()
            .filter(|instruction| instruction.destination().and_then(Operand::as_local) == Some(id))
            .count()
    }

    /// Finds how `id` is read on any path from position `start` of `block`.
    ///
    /// A read through memory is a memory operand based on or indexed by the local, or a
    /// field view of it, in any operand slot.
    #[must_use]
    pub fn local_usage_after(&self, block: BlockId, start: usize, id: LocalId) -> Usage {
        let views: Vec<LocalId> = self
            .locals()
            .filter(|(_, local)| local.base == Some(id))
            .map(|(view, _)| view)
            .collect();

        self.graph.find_usage_after(block, start, |instruction| {
            let sources = instruction.sources();
            if sources.iter().any(|operand| operand.as_local() == Some(id)) {
                return Usage::Direct;
            }

            let through_memory = |operand: &Operand| match operand {
                Operand::Memory(memory) => memory.references_local(id),
                Operand::Local(local) => views.contains(local),
                _ => false,
            };
            if instruction.operands().into_iter().any(through_memory) {
                return Usage::ThroughMemory;
            }

            Usage::Unused
        })
    }

    /// Records a warning once.
    pub fn add_warning(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        if !self.warnings.contains(&warning) {
            warn!("{}: {warning}", self.definition.full_name());
            self.warnings.push(warning);
        }
    }

    /// Warnings recorded so far, in order.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "method {}", self.definition.full_name())?;
        for (id, local) in self.locals() {
            writeln!(f, "  local {id} = {local}")?;
        }
        for block in self.graph.blocks() {
            write!(f, "{block}")?;
        }
        Ok(())
    }
}
