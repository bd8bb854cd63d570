//! Type propagation and field resolution.
//!
//! Types enter the method at its boundaries and at call sites:
//!
//! - a returned local has the declared return type,
//! - a parameter local has its slot's declared type (the declaring type for `this`),
//! - a call's result has the callee's return type, or the declaring type for a
//!   constructor; its receiver has the declaring type and its arguments the declared
//!   parameter types.
//!
//! From there types flow across `Move` and `LoadAddress` in both directions until nothing
//! changes. Finally every `[local + offset]` whose local has a known type is offered to the
//! [`ResolutionContext`]; a hit turns the operand into a field view of that local.

use std::collections::HashMap;

use log::{debug, trace};

use crate::{
    ir::{InstructionKind, LocalId, LocalVariable, MemoryAddress, Operand},
    metadata::{MethodRc, ResolutionContext, Token, TypeRc},
    transforms::Transform,
    Error, Method, Result,
};

/// Infers local types and resolves field accesses.
pub struct TypePropagation {
    /// How many propagation rounds may run, `None` for no limit
    pub max_loops: Option<usize>,
}

impl Default for TypePropagation {
    fn default() -> Self {
        Self::new()
    }
}

impl TypePropagation {
    /// Creates the pass without a round ceiling.
    #[must_use]
    pub fn new() -> Self {
        TypePropagation { max_loops: None }
    }

    /// Creates the pass with a round ceiling.
    #[must_use]
    pub fn with_limit(max_loops: Option<usize>) -> Self {
        TypePropagation { max_loops }
    }
}

fn set_type(method: &mut Method, operand: &Operand, ty: Option<TypeRc>) {
    let (Some(id), Some(ty)) = (operand.as_local(), ty) else {
        return;
    };
    if let Some(local) = method.local_mut(id) {
        local.ty = Some(ty);
    }
}

/// Types taken from the declared signatures of this method and its callees.
fn seed(method: &mut Method) {
    let return_type = method.definition().return_type.clone();
    let returned: Vec<Operand> = method
        .graph()
        .instructions()
        .filter_map(|instruction| match &instruction.kind {
            InstructionKind::Return { value } => Some(value.clone()),
            _ => None,
        })
        .collect();
    for value in &returned {
        set_type(method, value, return_type.clone());
    }

    let parameters: Vec<(LocalId, usize)> = method
        .parameter_locals()
        .iter()
        .filter_map(|(id, local)| local.parameter.map(|slot| (*id, slot)))
        .collect();
    for (id, slot) in parameters {
        let ty = method.definition().slot_type(slot);
        set_type(method, &Operand::Local(id), ty);
    }

    let calls: Vec<(Option<Operand>, MethodRc, Vec<Operand>)> = method
        .graph()
        .instructions()
        .filter_map(|instruction| {
            let target = instruction.call_target()?.clone();
            let args = instruction.sources_and_constants().into_iter().cloned().collect();
            Some((instruction.destination().cloned(), target, args))
        })
        .collect();

    for (dest, target, args) in calls {
        if let Some(dest) = &dest {
            if target.is_constructor() {
                set_type(method, dest, Some(target.declaring_type.clone()));
                continue;
            }
            set_type(method, dest, target.return_type.clone());
        }

        let declared = if target.is_static() {
            &args[..]
        } else {
            if let Some(receiver) = args.first() {
                set_type(method, receiver, Some(target.declaring_type.clone()));
            }
            args.get(1..).unwrap_or_default()
        };
        for (arg, parameter) in declared.iter().zip(&target.parameters) {
            set_type(method, arg, parameter.param_type.clone());
        }
    }
}

/// Plain (non-view) local behind an operand.
fn plain_local(method: &Method, operand: &Operand) -> Option<LocalId> {
    let id = operand.as_local()?;
    method.local(id).filter(|local| !local.is_field_view()).map(|_| id)
}

/// One round of propagation across moves. Returns `true` if a type changed.
fn propagate_once(method: &mut Method) -> bool {
    let moves: Vec<(LocalId, Operand)> = method
        .graph()
        .instructions()
        .filter_map(|instruction| match &instruction.kind {
            InstructionKind::Move { dest, src } | InstructionKind::LoadAddress { dest, src } => {
                plain_local(method, dest).map(|id| (id, src.clone()))
            }
            _ => None,
        })
        .collect();

    let mut changed = false;
    for (dest, src) in moves {
        let dest_type = method.local(dest).and_then(|local| local.ty.clone());

        match &src {
            Operand::Type(ty) => {
                if dest_type.is_none() {
                    set_type(method, &Operand::Local(dest), Some(ty.clone()));
                    changed = true;
                }
            }
            Operand::Local(_) => {
                let Some(src_id) = plain_local(method, &src) else {
                    continue;
                };
                let src_type = method.local(src_id).and_then(|local| local.ty.clone());
                match (dest_type, src_type) {
                    (None, Some(ty)) => {
                        set_type(method, &Operand::Local(dest), Some(ty));
                        changed = true;
                    }
                    (Some(ty), None) => {
                        set_type(method, &src, Some(ty));
                        changed = true;
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }
    changed
}

/// `[local + offset]` with a typed, non-view base local.
fn field_access(method: &Method, memory: &MemoryAddress) -> Option<(LocalId, TypeRc, i64)> {
    if memory.index.is_some() || memory.scale != 0 {
        return None;
    }
    let base = memory.base.as_ref()?.as_local()?;
    let local = method.local(base).filter(|local| !local.is_field_view())?;
    Some((base, local.ty.clone()?, memory.addend))
}

fn resolve_fields(method: &mut Method, context: &dyn ResolutionContext) -> usize {
    let accesses: Vec<(LocalId, TypeRc, i64)> = method
        .graph()
        .instructions()
        .flat_map(|instruction| instruction.operands())
        .filter_map(|operand| match operand {
            Operand::Memory(memory) => field_access(method, memory),
            _ => None,
        })
        .collect();

    let mut views: HashMap<(LocalId, i64), LocalId> = HashMap::new();
    let mut by_field: HashMap<(LocalId, Token), LocalId> = HashMap::new();
    for (base, ty, offset) in accesses {
        if views.contains_key(&(base, offset)) {
            continue;
        }
        let Some(field) = context.resolve_field_by_offset(&ty, offset) else {
            continue;
        };

        let view = match by_field.get(&(base, field.token)) {
            Some(view) => *view,
            None => {
                let Some(base_local) = method.local(base) else {
                    continue;
                };
                trace!("[{} + 0x{:X}] is {}", base_local.name, offset, field);
                let local = LocalVariable::field_view(base, base_local, field.clone());
                let view = method.add_local(local);
                by_field.insert((base, field.token), view);
                view
            }
        };
        views.insert((base, offset), view);
    }

    if views.is_empty() {
        return 0;
    }

    let mut replaced = 0;
    for instruction in method.graph_mut().instructions_mut() {
        for operand in instruction.operands_mut() {
            let Operand::Memory(memory) = operand else {
                continue;
            };
            if memory.index.is_some() || memory.scale != 0 {
                continue;
            }
            let Some(base) = memory.base.as_ref().and_then(|part| part.as_local()) else {
                continue;
            };
            if let Some(view) = views.get(&(base, memory.addend)) {
                *operand = Operand::Local(*view);
                replaced += 1;
            }
        }
    }
    replaced
}

impl Transform for TypePropagation {
    fn name(&self) -> &'static str {
        "type-propagation"
    }

    fn description(&self) -> &'static str {
        "Infers local types and resolves field offsets"
    }

    fn apply(&self, method: &mut Method, context: &dyn ResolutionContext) -> Result<()> {
        seed(method);

        let mut loops = 0usize;
        loop {
            loops += 1;
            if let Some(limit) = self.max_loops {
                if loops > limit {
                    return Err(Error::TypesNotSettling(limit));
                }
            }
            if !propagate_once(method) {
                break;
            }
        }

        let fields = resolve_fields(method, context);
        debug!(
            "{}: types settled after {} rounds, {} field accesses resolved",
            method.full_name(),
            loops,
            fields
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{AddressPart, Instruction, Register},
        metadata::{FieldDefinition, MethodDefinition, MethodFlags, NullContext, TableContext, TypeDefinition},
        transforms::test_support::{listing, method, player_type},
    };

    fn l(index: usize) -> Operand {
        Operand::Local(LocalId::new(index))
    }

    fn add_locals(method: &mut Method, count: usize) {
        for i in 0..count {
            method.add_local(LocalVariable::new(format!("v{i}"), Register::new(i as u32).with_version(1)));
        }
    }

    fn type_of(method: &Method, index: usize) -> Option<String> {
        method
            .local(LocalId::new(index))
            .and_then(|local| local.ty.as_ref())
            .map(|ty| ty.full_name())
    }

    #[test]
    fn test_call_site_seeds_and_move_propagation() -> Result<()> {
        let player = player_type();
        let weapon = TypeDefinition::new(Token::from_parts(Token::TYPE_DEF, 5), "Game", "Weapon");
        let equip = MethodDefinition::builder(Token::from_parts(Token::METHOD_DEF, 5), "Equip", &player)
            .param("weapon", Some(weapon.clone()))
            .returns(&weapon)
            .build();

        // v0 = v1.Equip(v2); v3 = v0; v4 = v3; v5 = v2
        let mut method = method(vec![
            Instruction::new(
                0,
                InstructionKind::Call {
                    dest: l(0),
                    target: equip,
                    args: vec![l(1), l(2)],
                },
            ),
            Instruction::mov(1, l(3), l(0)),
            Instruction::mov(2, l(4), l(3)),
            Instruction::mov(3, l(6), l(5)),
            Instruction::mov(4, l(5), l(2)),
            Instruction::ret_void(5),
        ]);
        add_locals(&mut method, 7);

        TypePropagation::new().apply(&mut method, &NullContext)?;

        assert_eq!(type_of(&method, 0).as_deref(), Some("Game.Weapon"));
        assert_eq!(type_of(&method, 1).as_deref(), Some("Game.Player"));
        assert_eq!(type_of(&method, 2).as_deref(), Some("Game.Weapon"));
        assert_eq!(type_of(&method, 4).as_deref(), Some("Game.Weapon"));
        // Needs a second round: v5 is typed only after v6 = v5 was visited
        assert_eq!(type_of(&method, 6).as_deref(), Some("Game.Weapon"));
        Ok(())
    }

    #[test]
    fn test_constructor_types_destination_with_declaring_type() -> Result<()> {
        let player = player_type();
        let ctor = MethodDefinition::builder(Token::from_parts(Token::METHOD_DEF, 6), ".ctor", &player)
            .flags(MethodFlags::CONSTRUCTOR)
            .build();
        let mut method = method(vec![
            Instruction::new(
                0,
                InstructionKind::Call {
                    dest: l(0),
                    target: ctor,
                    args: Vec::new(),
                },
            ),
            Instruction::ret_void(1),
        ]);
        add_locals(&mut method, 1);

        TypePropagation::new().apply(&mut method, &NullContext)?;
        assert_eq!(type_of(&method, 0).as_deref(), Some("Game.Player"));
        Ok(())
    }

    #[test]
    fn test_field_offsets_become_views() -> Result<()> {
        let player = player_type();
        let health = FieldDefinition::instance(Token::from_parts(Token::FIELD, 1), "health", &player, 0x18);
        let mut context = TableContext::new();
        context.add_field(health);

        let access = |offset| MemoryAddress {
            base: Some(AddressPart::Local(LocalId::new(0))),
            index: None,
            addend: offset,
            scale: 0,
        };
        let mut method = method(vec![
            Instruction::mov(0, l(0), Operand::Type(player)),
            Instruction::mov(1, l(1), access(0x18)),
            Instruction::mov(2, access(0x18), l(1)),
            Instruction::mov(3, l(2), access(0x20)),
            Instruction::ret_void(4),
        ]);
        add_locals(&mut method, 3);

        TypePropagation::new().apply(&mut method, &context)?;

        assert_eq!(method.local_count(), 4);
        let view = method.local(LocalId::new(3)).expect("view");
        assert_eq!(view.base, Some(LocalId::new(0)));
        assert_eq!(view.field.as_ref().map(|f| f.name.as_str()), Some("health"));
        assert_eq!(
            listing(&method),
            vec![
                "Move L0, typeof(Game.Player)",
                "Move L1, L3",
                "Move L3, L1",
                "Move L2, [L0+0x20]",
                "ReturnVoid"
            ]
        );
        Ok(())
    }

    #[test]
    fn test_round_ceiling() {
        let mut method = method(vec![
            Instruction::mov(0, l(1), l(0)),
            Instruction::mov(1, l(0), Operand::Type(player_type())),
            Instruction::ret_void(2),
        ]);
        add_locals(&mut method, 2);

        let result = TypePropagation::with_limit(Some(1)).apply(&mut method, &NullContext);
        assert!(matches!(result, Err(Error::TypesNotSettling(1))));
    }
}
