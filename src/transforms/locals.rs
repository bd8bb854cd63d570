//! Local variable recovery.
//!
//! After SSA construction every register version is its own value. This pass creates one
//! local per distinct register version, in order of first appearance, and rewrites every
//! operand and memory part to refer to it. Locals holding entry values of parameter
//! registers are bound to their parameter slot and named after the declared parameter.

use std::collections::HashMap;

use log::debug;

use crate::{
    ir::{AddressPart, InstructionKind, LocalId, LocalVariable, Operand, Register},
    metadata::{ResolutionContext, SlotBinding},
    transforms::Transform,
    Method, Result,
};

/// Replaces registers with locals.
pub struct CreateLocals;

impl Default for CreateLocals {
    fn default() -> Self {
        Self::new()
    }
}

impl CreateLocals {
    /// Creates a new pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn distinct_registers(method: &Method) -> Vec<Register> {
    let mut registers: Vec<Register> = Vec::new();
    for instruction in method.graph().instructions() {
        for operand in instruction.operands() {
            for register in operand.registers() {
                if !registers.contains(register) {
                    registers.push(register.clone());
                }
            }
        }
    }
    registers
}

fn substitute(method: &mut Method, mapping: &HashMap<Register, LocalId>) {
    for instruction in method.graph_mut().instructions_mut() {
        for operand in instruction.operands_mut() {
            match operand {
                Operand::Register(register) => {
                    if let Some(local) = mapping.get(register) {
                        *operand = Operand::Local(*local);
                    }
                }
                Operand::Memory(memory) => {
                    for part in memory.parts_mut() {
                        if let AddressPart::Register(register) = part {
                            if let Some(local) = mapping.get(register) {
                                *part = AddressPart::Local(*local);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

fn name_return_values(method: &mut Method) {
    let returned: Vec<(usize, LocalId)> = method
        .graph()
        .instructions()
        .enumerate()
        .filter_map(|(position, instruction)| match &instruction.kind {
            InstructionKind::Return { value } => value.as_local().map(|local| (position, local)),
            _ => None,
        })
        .collect();

    for (position, id) in returned {
        if let Some(local) = method.local_mut(id) {
            local.name = format!("returnVal{position}");
        }
    }
}

fn bind_parameters(method: &mut Method) {
    let slots: Vec<(usize, u32)> = method
        .parameters()
        .iter()
        .enumerate()
        .filter_map(|(slot, operand)| operand.as_register().map(|register| (slot, register.number)))
        .collect();

    let mut bindings: Vec<(LocalId, usize)> = Vec::new();
    for (id, local) in method.locals() {
        if !local.register.is_entry_value() {
            continue;
        }
        let Some((slot, _)) = slots
            .iter()
            .find(|(slot, number)| *number == local.register.number && !bindings.iter().any(|(_, s)| s == slot))
        else {
            continue;
        };
        bindings.push((id, *slot));
    }

    for (id, slot) in bindings {
        let binding = match method.definition().slot_binding(slot) {
            Some(SlotBinding::This) => Some(("this".to_string(), true)),
            Some(SlotBinding::Declared(parameter)) => Some((parameter.name.clone(), false)),
            None => None,
        };
        let Some((name, is_this)) = binding else {
            continue;
        };
        if let Some(local) = method.local_mut(id) {
            local.name = name;
            local.is_this = is_this;
            local.parameter = Some(slot);
        }
    }
}

impl Transform for CreateLocals {
    fn name(&self) -> &'static str {
        "create-locals"
    }

    fn description(&self) -> &'static str {
        "Creates one local per register version and binds parameters"
    }

    fn apply(&self, method: &mut Method, _context: &dyn ResolutionContext) -> Result<()> {
        let registers = distinct_registers(method);

        let mut mapping = HashMap::with_capacity(registers.len());
        for (i, register) in registers.into_iter().enumerate() {
            let id = method.add_local(LocalVariable::new(format!("v{i}"), register.clone()));
            mapping.insert(register, id);
        }

        substitute(method, &mapping);
        name_return_values(method);
        bind_parameters(method);

        debug!(
            "{}: {} locals, {} parameters",
            method.full_name(),
            method.local_count(),
            method.parameter_locals().len()
        );
        Ok(())
    }
}
