//! Static field resolution.

use log::{debug, trace};

use crate::{
    ir::{InstructionKind, LocalId, Operand, Register},
    metadata::{FieldRc, ResolutionContext},
    transforms::Transform,
    Method, Result,
};

/// Replaces field views of static fields with direct field references.
///
/// A static field is reached through the class's runtime data, so its view hangs off a
/// local holding a type reference. A view is rewritten only when its field is static and
/// some `Move` or `LoadAddress` assigns a type reference to a local with the view's
/// register. Views left unreferenced afterwards are removed.
pub struct ResolveStaticFields;

impl Default for ResolveStaticFields {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolveStaticFields {
    /// Creates a new pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Returns `true` if a local holding `register` is assigned a type reference.
fn holds_type(method: &Method, register: &Register) -> bool {
    method.graph().instructions().any(|instruction| match &instruction.kind {
        InstructionKind::Move { dest, src: Operand::Type(_) }
        | InstructionKind::LoadAddress { dest, src: Operand::Type(_) } => dest
            .as_local()
            .and_then(|id| method.local(id))
            .is_some_and(|local| local.register == *register),
        _ => false,
    })
}

fn static_views(method: &Method) -> Vec<(LocalId, FieldRc)> {
    method
        .locals()
        .filter_map(|(id, local)| {
            let field = local.field.as_ref()?;
            if !field.is_static() || !holds_type(method, &local.register) {
                return None;
            }
            Some((id, field.clone()))
        })
        .collect()
}

impl Transform for ResolveStaticFields {
    fn name(&self) -> &'static str {
        "resolve-static-fields"
    }

    fn description(&self) -> &'static str {
        "Replaces static field views with field references"
    }

    fn apply(&self, method: &mut Method, _context: &dyn ResolutionContext) -> Result<()> {
        let views = static_views(method);
        if views.is_empty() {
            return Ok(());
        }

        let mut replaced = 0;
        for instruction in method.graph_mut().instructions_mut() {
            for operand in instruction.operands_mut() {
                let Some(id) = operand.as_local() else {
                    continue;
                };
                if let Some((_, field)) = views.iter().find(|(view, _)| *view == id) {
                    *operand = Operand::Field(field.clone());
                    replaced += 1;
                }
            }
        }

        for (id, field) in &views {
            if method.try_remove_local(*id) {
                trace!("{id} resolved to static {field}");
            }
        }
        debug!("{}: resolved {} static field accesses", method.full_name(), replaced);
        Ok(())
    }
}
