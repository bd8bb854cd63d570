//! Resolution of constant addresses that name types.

use log::{debug, trace};

use crate::{ir::Operand, metadata::ResolutionContext, transforms::Transform, Method, Result};

/// Replaces constant-address sources that resolve to a type with a type reference.
///
/// Native code reaches a class's runtime data (static storage, type handles) through
/// absolute addresses. Only read operands are considered; a store to a constant address
/// is left alone.
pub struct ResolveTypeAddresses;

impl Default for ResolveTypeAddresses {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolveTypeAddresses {
    /// Creates a new pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Transform for ResolveTypeAddresses {
    fn name(&self) -> &'static str {
        "resolve-type-addresses"
    }

    fn description(&self) -> &'static str {
        "Replaces constant addresses of types with type references"
    }

    fn apply(&self, method: &mut Method, context: &dyn ResolutionContext) -> Result<()> {
        let mut resolved = 0;
        for instruction in method.graph_mut().instructions_mut() {
            for source in instruction.sources_mut() {
                let Operand::Memory(memory) = source else {
                    continue;
                };
                if !memory.is_constant() {
                    continue;
                }

                let Ok(address) = u64::try_from(memory.addend) else {
                    continue;
                };
                if let Some(ty) = context.resolve_type_by_address(address) {
                    trace!("address 0x{:X} is {}", address, ty.full_name());
                    *source = Operand::Type(ty);
                    resolved += 1;
                }
            }
        }

        if resolved > 0 {
            debug!("{}: resolved {} type addresses", method.full_name(), resolved);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{Instruction, MemoryAddress},
        metadata::TableContext,
        transforms::test_support::{listing, method, player_type, r},
    };

    #[test]
    fn test_sources_resolve_destinations_do_not() -> Result<()> {
        let mut context = TableContext::new();
        context.add_type(0x18_2000, player_type());

        let mut method = method(vec![
            Instruction::mov(0, r(0), MemoryAddress::absolute(0x18_2000)),
            Instruction::mov(1, MemoryAddress::absolute(0x18_2000), r(0)),
            Instruction::mov(2, r(1), MemoryAddress::absolute(0x99_0000)),
            Instruction::ret_void(3),
        ]);

        ResolveTypeAddresses::new().apply(&mut method, &context)?;

        assert_eq!(
            listing(&method),
            vec![
                "Move r0, typeof(Game.Player)",
                "Move [0x182000], r0",
                "Move r1, [0x990000]",
                "ReturnVoid"
            ]
        );
        Ok(())
    }

    #[test]
    fn test_negative_addend_is_not_an_address() -> Result<()> {
        let mut context = TableContext::new();
        context.add_type(u64::MAX - 7, player_type());

        let below_zero = MemoryAddress {
            addend: -8,
            ..Default::default()
        };
        let mut method = method(vec![Instruction::mov(0, r(0), below_zero.clone()), Instruction::ret(1, r(0))]);

        ResolveTypeAddresses::new().apply(&mut method, &context)?;

        let first = method.graph().instructions().next().map(|instruction| instruction.sources()[0].clone());
        assert_eq!(first, Some(Operand::Memory(below_zero)));
        Ok(())
    }
}
