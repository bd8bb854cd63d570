//! Lowering of a processed method to CIL.
//!
//! Blocks are emitted in layout order, each lifted instruction as a short stack sequence
//! that leaves the evaluation stack empty:
//!
//! | Lifted | CIL |
//! |--------|-----|
//! | `Move d, s` | load `s`, store `d` |
//! | `Binary`/`Compare`/`Unary` | load operands left to right, op, store |
//! | `Call d, m, args` | load args, `call m`, store `d` |
//! | `Return v` | load `v`, `ret` |
//! | `Jump`/`ConditionalJump` | `br` / load condition, `brtrue` |
//! | `Unknown`, `Phi`, `ShiftStack` | `ldstr text`, `call Console.WriteLine` |
//!
//! Stores into a field view load the object before the value. Operands that cannot be
//! loaded (raw memory, leftover registers) become a string describing them, so the method
//! still loads and shows where recovery failed.

use std::collections::HashMap;

use log::debug;

use crate::{
    analysis::BlockId,
    codegen::{
        cil::{CilBody, CilLocal, CilOpCode, CilOperand, ImportedMember},
        emitter::{CilEmitter, CodeLabel},
    },
    ir::{BinaryOp, BranchTarget, CompareOp, Instruction, InstructionKind, LocalId, Operand, UnaryOp},
    metadata::FieldRc,
    Error, Method, Result,
};

/// Generates CIL bodies.
#[derive(Debug, Clone)]
pub struct CodeGenerator {
    /// Append a default return after the last block
    pub emit_default_return: bool,
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGenerator {
    /// Creates a generator that appends the default return.
    #[must_use]
    pub fn new() -> Self {
        CodeGenerator {
            emit_default_return: true,
        }
    }

    /// Creates a generator with the default return switched on or off.
    #[must_use]
    pub fn with_default_return(emit_default_return: bool) -> Self {
        CodeGenerator { emit_default_return }
    }

    /// Lowers `method` to a CIL body.
    ///
    /// Branches whose target has no code resolve to the first instruction and are recorded
    /// as method warnings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CodegenError`] if an operand refers to a local that no longer
    /// exists, or if the method needs more slots than CIL can address.
    pub fn generate(&self, method: &mut Method) -> Result<CilBody> {
        let (body, unresolved) = {
            let mut lowering = Lowering::new(method)?;
            lowering.blocks()?;
            lowering.epilogue(self.emit_default_return)?;
            lowering.emitter.finalize(lowering.locals)
        };

        for label in unresolved {
            method.add_warning(format!("Branch to {label} has no target, using IL_0000"));
        }
        debug!(
            "{}: generated {} instructions, {} locals, max stack {}",
            method.full_name(),
            body.len(),
            body.locals.len(),
            body.max_stack
        );
        Ok(body)
    }
}

/// Where a local's value lives.
#[derive(Debug, Clone, Copy)]
enum Storage {
    Argument(u16),
    Local(u16),
}

/// Where a stored value goes.
#[derive(Debug, Clone)]
enum Place {
    Storage(Storage),
    Field { object: Storage, field: FieldRc },
    StaticField(FieldRc),
}

struct Lowering<'a> {
    method: &'a Method,
    emitter: CilEmitter,
    slots: HashMap<LocalId, u16>,
    locals: Vec<CilLocal>,
}

fn argument_index(slot: usize) -> Result<u16> {
    u16::try_from(slot).map_err(|_| Error::CodegenError(format!("argument {slot} out of range")))
}

fn binary_opcode(op: BinaryOp) -> CilOpCode {
    match op {
        BinaryOp::Add => CilOpCode::Add,
        BinaryOp::Subtract => CilOpCode::Sub,
        BinaryOp::Multiply => CilOpCode::Mul,
        BinaryOp::Divide => CilOpCode::Div,
        BinaryOp::ShiftLeft => CilOpCode::Shl,
        BinaryOp::ShiftRight => CilOpCode::Shr,
        BinaryOp::And => CilOpCode::And,
        BinaryOp::Or => CilOpCode::Or,
        BinaryOp::Xor => CilOpCode::Xor,
    }
}

fn unary_opcode(op: UnaryOp) -> CilOpCode {
    match op {
        UnaryOp::Not => CilOpCode::Not,
        UnaryOp::Negate => CilOpCode::Neg,
    }
}

fn compare_opcode(op: CompareOp) -> CilOpCode {
    match op {
        CompareOp::Equal => CilOpCode::Ceq,
        CompareOp::Greater => CilOpCode::Cgt,
        CompareOp::Less => CilOpCode::Clt,
    }
}

impl<'a> Lowering<'a> {
    fn new(method: &'a Method) -> Result<Self> {
        let mut slots = HashMap::new();
        let mut locals = Vec::new();
        for (id, local) in method.locals() {
            if local.is_parameter() || local.is_field_view() {
                continue;
            }
            let slot = u16::try_from(locals.len())
                .map_err(|_| Error::CodegenError("too many locals".to_string()))?;
            locals.push(CilLocal { ty: local.ty.clone() });
            slots.insert(id, slot);
        }

        Ok(Lowering {
            method,
            emitter: CilEmitter::new(),
            slots,
            locals,
        })
    }

    fn label(&self, target: &BranchTarget) -> CodeLabel {
        match target {
            BranchTarget::Block(block) => self.block_label(*block),
            BranchTarget::Instruction(index) => CodeLabel::Unresolved(*index),
        }
    }

    fn block_label(&self, block: BlockId) -> CodeLabel {
        if block == self.method.graph().exit() {
            CodeLabel::Epilogue
        } else {
            CodeLabel::Block(block)
        }
    }

    fn blocks(&mut self) -> Result<()> {
        let method = self.method;
        let graph = method.graph();
        let layout = graph.layout();

        for (position, id) in layout.iter().enumerate() {
            self.emitter.define_label(CodeLabel::Block(*id))?;
            let Some(block) = graph.block(*id) else {
                continue;
            };
            for instruction in block.instructions() {
                self.instruction(instruction)?;
            }

            if let Some(next) = graph.fall_through(*id) {
                let following = layout.get(position + 1).copied().unwrap_or(graph.exit());
                if next != following {
                    let label = self.block_label(next);
                    self.emitter.emit_branch(CilOpCode::Br, label)?;
                }
            }
        }
        Ok(())
    }

    fn epilogue(&mut self, emit_default_return: bool) -> Result<()> {
        self.emitter.define_label(CodeLabel::Epilogue)?;
        if !emit_default_return {
            return Ok(());
        }
        if self.method.definition().returns_value() {
            self.emitter.emit(CilOpCode::LdcI4, Some(CilOperand::Int32(0)))?;
        }
        self.emitter.emit(CilOpCode::Ret, None)
    }

    fn instruction(&mut self, instruction: &Instruction) -> Result<()> {
        match &instruction.kind {
            InstructionKind::Unknown { text } => self.diagnostic(text.clone()),
            InstructionKind::Nop => self.emitter.emit(CilOpCode::Nop, None),
            InstructionKind::Move { dest, src } => {
                let Some(place) = self.place(dest)? else {
                    return self.diagnostic(format!("not implemented: {instruction}"));
                };
                self.begin_store(&place)?;
                self.load(src)?;
                self.end_store(place)
            }
            InstructionKind::LoadAddress { dest, src } => {
                let place = self.place(dest)?;
                match place {
                    Some(place) if self.is_addressable(src) => {
                        self.begin_store(&place)?;
                        self.load_address(src)?;
                        self.end_store(place)
                    }
                    _ => self.diagnostic(format!("not implemented: {instruction}")),
                }
            }
            InstructionKind::Phi { .. } => self.diagnostic(format!("unexpected phi: {instruction}")),
            InstructionKind::ShiftStack { .. } => {
                self.diagnostic(format!("unexpected stack shift: {instruction}"))
            }
            InstructionKind::Call { dest, target, args } | InstructionKind::TailCall { dest, target, args } => {
                let place = self.place(dest)?;
                if let Some(place) = &place {
                    self.begin_store(place)?;
                }
                for arg in args {
                    self.load(arg)?;
                }
                self.emitter
                    .emit_call(CilOperand::Method(target.clone()), args.len(), true)?;
                match place {
                    Some(place) => self.end_store(place),
                    None => {
                        self.emitter.emit(CilOpCode::Pop, None)?;
                        self.diagnostic(format!("result of {} dropped: {dest}", target.full_name()))
                    }
                }
            }
            InstructionKind::CallVoid { target, args } | InstructionKind::TailCallVoid { target, args } => {
                for arg in args {
                    self.load(arg)?;
                }
                self.emitter
                    .emit_call(CilOperand::Method(target.clone()), args.len(), false)
            }
            InstructionKind::Return { value } => {
                self.load(value)?;
                self.emitter.emit(CilOpCode::Ret, None)
            }
            InstructionKind::ReturnVoid => self.emitter.emit(CilOpCode::Ret, None),
            InstructionKind::Jump { target } => {
                let label = self.label(target);
                self.emitter.emit_branch(CilOpCode::Br, label)
            }
            InstructionKind::ConditionalJump { target, condition } => {
                self.load(condition)?;
                let label = self.label(target);
                self.emitter.emit_branch(CilOpCode::Brtrue, label)
            }
            InstructionKind::Binary { op, dest, lhs, rhs } => {
                self.operation(instruction, dest, &[lhs, rhs], binary_opcode(*op))
            }
            InstructionKind::Compare { op, dest, lhs, rhs } => {
                self.operation(instruction, dest, &[lhs, rhs], compare_opcode(*op))
            }
            InstructionKind::Unary { op, dest, src } => {
                self.operation(instruction, dest, &[src], unary_opcode(*op))
            }
        }
    }

    fn operation(
        &mut self,
        instruction: &Instruction,
        dest: &Operand,
        operands: &[&Operand],
        opcode: CilOpCode,
    ) -> Result<()> {
        let Some(place) = self.place(dest)? else {
            return self.diagnostic(format!("not implemented: {instruction}"));
        };
        self.begin_store(&place)?;
        for operand in operands {
            self.load(operand)?;
        }
        self.emitter.emit(opcode, None)?;
        self.end_store(place)
    }

    /// `ldstr text; call Console.WriteLine(string)`
    fn diagnostic(&mut self, text: String) -> Result<()> {
        self.emitter.emit(CilOpCode::Ldstr, Some(CilOperand::String(text)))?;
        self.emitter
            .emit_call(CilOperand::Import(ImportedMember::ConsoleWriteLine), 1, false)
    }

    fn storage(&self, id: LocalId) -> Result<Storage> {
        let local = self
            .method
            .local(id)
            .ok_or_else(|| Error::CodegenError(format!("{id} is not a live local")))?;
        if let Some(slot) = local.parameter {
            return Ok(Storage::Argument(argument_index(slot)?));
        }
        self.slots
            .get(&id)
            .map(|slot| Storage::Local(*slot))
            .ok_or_else(|| Error::CodegenError(format!("{id} has no local slot")))
    }

    fn load_storage(&mut self, storage: Storage) -> Result<()> {
        match storage {
            Storage::Argument(index) => self.emitter.emit(CilOpCode::Ldarg, Some(CilOperand::Argument(index))),
            Storage::Local(slot) => self.emitter.emit(CilOpCode::Ldloc, Some(CilOperand::Local(slot))),
        }
    }

    fn place(&self, dest: &Operand) -> Result<Option<Place>> {
        match dest {
            Operand::Local(id) => {
                let local = self
                    .method
                    .local(*id)
                    .ok_or_else(|| Error::CodegenError(format!("{id} is not a live local")))?;
                match (local.base, &local.field) {
                    (Some(_), Some(field)) if field.is_static() => Ok(Some(Place::StaticField(field.clone()))),
                    (Some(base), Some(field)) => Ok(Some(Place::Field {
                        object: self.storage(base)?,
                        field: field.clone(),
                    })),
                    _ => Ok(Some(Place::Storage(self.storage(*id)?))),
                }
            }
            Operand::Field(field) if field.is_static() => Ok(Some(Place::StaticField(field.clone()))),
            _ => Ok(None),
        }
    }

    fn begin_store(&mut self, place: &Place) -> Result<()> {
        match place {
            Place::Field { object, .. } => self.load_storage(*object),
            Place::Storage(_) | Place::StaticField(_) => Ok(()),
        }
    }

    fn end_store(&mut self, place: Place) -> Result<()> {
        match place {
            Place::Storage(Storage::Argument(index)) => {
                self.emitter.emit(CilOpCode::Starg, Some(CilOperand::Argument(index)))
            }
            Place::Storage(Storage::Local(slot)) => self.emitter.emit(CilOpCode::Stloc, Some(CilOperand::Local(slot))),
            Place::Field { field, .. } => self.emitter.emit(CilOpCode::Stfld, Some(CilOperand::Field(field))),
            Place::StaticField(field) => self.emitter.emit(CilOpCode::Stsfld, Some(CilOperand::Field(field))),
        }
    }

    fn load(&mut self, operand: &Operand) -> Result<()> {
        match operand {
            Operand::Int(value) => self.emitter.emit(CilOpCode::LdcI4, Some(CilOperand::Int32(*value))),
            Operand::Long(value) => self.emitter.emit(CilOpCode::LdcI8, Some(CilOperand::Int64(*value))),
            Operand::ULong(value) => self.load_unsigned(*value),
            Operand::Text(text) => self.emitter.emit(CilOpCode::Ldstr, Some(CilOperand::String(text.clone()))),
            Operand::Local(id) => self.load_local(*id),
            Operand::Field(field) if field.is_static() => {
                self.emitter.emit(CilOpCode::Ldsfld, Some(CilOperand::Field(field.clone())))
            }
            Operand::Type(ty) => {
                self.emitter.emit(CilOpCode::Ldtoken, Some(CilOperand::Type(ty.clone())))?;
                self.emitter
                    .emit_call(CilOperand::Import(ImportedMember::GetTypeFromHandle), 1, true)
            }
            Operand::Memory(memory) => self.emitter.emit(CilOpCode::Ldstr, Some(CilOperand::String(memory.to_string()))),
            other => self.emitter.emit(
                CilOpCode::Ldstr,
                Some(CilOperand::String(format!("unknown operand: {other}"))),
            ),
        }
    }

    /// Values above `i64::MAX` are rebuilt from their halves, `(high << 32) | low`.
    fn load_unsigned(&mut self, value: u64) -> Result<()> {
        if let Ok(signed) = i64::try_from(value) {
            return self.emitter.emit(CilOpCode::LdcI8, Some(CilOperand::Int64(signed)));
        }

        let high = (value >> 32) as i64;
        let low = (value & 0xFFFF_FFFF) as u32 as i32;
        self.emitter.emit(CilOpCode::LdcI8, Some(CilOperand::Int64(high)))?;
        self.emitter.emit(CilOpCode::LdcI4, Some(CilOperand::Int32(32)))?;
        self.emitter.emit(CilOpCode::Shl, None)?;
        self.emitter.emit(CilOpCode::LdcI4, Some(CilOperand::Int32(low)))?;
        self.emitter.emit(CilOpCode::ConvU8, None)?;
        self.emitter.emit(CilOpCode::Or, None)
    }

    fn load_local(&mut self, id: LocalId) -> Result<()> {
        let method = self.method;
        let local = method
            .local(id)
            .ok_or_else(|| Error::CodegenError(format!("{id} is not a live local")))?;

        match (local.base, &local.field) {
            (Some(_), Some(field)) if field.is_static() => {
                self.emitter.emit(CilOpCode::Ldsfld, Some(CilOperand::Field(field.clone())))
            }
            (Some(base), Some(field)) => {
                let object = self.storage(base)?;
                self.load_storage(object)?;
                self.emitter.emit(CilOpCode::Ldfld, Some(CilOperand::Field(field.clone())))
            }
            _ => {
                let storage = self.storage(id)?;
                self.load_storage(storage)
            }
        }
    }

    fn is_addressable(&self, operand: &Operand) -> bool {
        match operand {
            Operand::Local(id) => self.method.local(*id).is_some(),
            Operand::Field(field) => field.is_static(),
            _ => false,
        }
    }

    fn load_address(&mut self, operand: &Operand) -> Result<()> {
        let method = self.method;
        match operand {
            Operand::Local(id) => {
                let local = method
                    .local(*id)
                    .ok_or_else(|| Error::CodegenError(format!("{id} is not a live local")))?;
                match (local.base, &local.field) {
                    (Some(_), Some(field)) if field.is_static() => {
                        self.emitter.emit(CilOpCode::Ldsflda, Some(CilOperand::Field(field.clone())))
                    }
                    (Some(base), Some(field)) => {
                        let object = self.storage(base)?;
                        self.load_storage(object)?;
                        self.emitter.emit(CilOpCode::Ldflda, Some(CilOperand::Field(field.clone())))
                    }
                    _ => match self.storage(*id)? {
                        Storage::Argument(index) => {
                            self.emitter.emit(CilOpCode::Ldarga, Some(CilOperand::Argument(index)))
                        }
                        Storage::Local(slot) => self.emitter.emit(CilOpCode::Ldloca, Some(CilOperand::Local(slot))),
                    },
                }
            }
            Operand::Field(field) => self.emitter.emit(CilOpCode::Ldsflda, Some(CilOperand::Field(field.clone()))),
            other => Err(Error::CodegenError(format!("cannot take the address of {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{LocalVariable, Register},
        metadata::{FieldDefinition, MethodDefinition, MethodFlags, Token},
        transforms::{
            cleanup,
            test_support::{method, player_type, static_method},
        },
    };

    fn l(index: usize) -> Operand {
        Operand::Local(LocalId::new(index))
    }

    fn add_locals(method: &mut Method, count: usize) {
        for i in 0..count {
            method.add_local(LocalVariable::new(format!("v{i}"), Register::new(i as u32)));
        }
    }

    fn text(body: &CilBody) -> Vec<String> {
        body.instructions.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_value_method_gets_default_return() -> Result<()> {
        let player = player_type();
        let definition = MethodDefinition::builder(Token::from_parts(Token::METHOD_DEF, 4), "Count", &player)
            .flags(MethodFlags::STATIC)
            .returns(&player)
            .build();
        let mut method = Method::new(
            definition,
            vec![Instruction::mov(0, l(0), 5), Instruction::ret(1, l(0))],
            Vec::new(),
        );
        add_locals(&mut method, 1);

        let body = CodeGenerator::new().generate(&mut method)?;

        assert_eq!(
            text(&body),
            vec!["ldc.i4 5", "stloc V_0", "ldloc V_0", "ret", "ldc.i4 0", "ret"]
        );
        assert_eq!(body.locals.len(), 1);
        assert_eq!(body.max_stack, 1);

        let bare = CodeGenerator::with_default_return(false).generate(&mut method)?;
        assert_eq!(bare.len(), 4);
        Ok(())
    }

    #[test]
    fn test_large_unsigned_constant_is_split() -> Result<()> {
        let mut method = method(vec![
            Instruction::mov(0, l(0), Operand::ULong(0xFFFF_FFFF_0000_0001)),
            Instruction::mov(1, l(0), Operand::ULong(5)),
            Instruction::ret_void(2),
        ]);
        add_locals(&mut method, 1);

        let body = CodeGenerator::new().generate(&mut method)?;

        assert_eq!(
            text(&body),
            vec![
                "ldc.i8 4294967295",
                "ldc.i4 32",
                "shl",
                "ldc.i4 1",
                "conv.u8",
                "or",
                "stloc V_0",
                "ldc.i8 5",
                "stloc V_0",
                "ret",
                "ret"
            ]
        );
        assert_eq!(body.max_stack, 2);
        Ok(())
    }

    #[test]
    fn test_branch_to_exit_targets_epilogue() -> Result<()> {
        let mut method = method(vec![
            Instruction::branch_if(0, 2, l(0)),
            Instruction::mov(1, l(1), 1),
            Instruction::new(2, InstructionKind::Nop),
        ]);
        add_locals(&mut method, 2);
        cleanup(method.graph_mut());

        let body = CodeGenerator::new().generate(&mut method)?;

        assert_eq!(text(&body), vec!["ldloc V_0", "brtrue IL_0004", "ldc.i4 1", "stloc V_1", "ret"]);
        assert!(method.warnings().is_empty());
        Ok(())
    }

    #[test]
    fn test_vanished_target_falls_back_to_first_instruction() -> Result<()> {
        let mut method = method(vec![Instruction::jump(0, 9)]);

        let body = CodeGenerator::new().generate(&mut method)?;

        assert_eq!(text(&body), vec!["br IL_0000", "ret"]);
        assert_eq!(method.warnings(), ["Branch to @9 has no target, using IL_0000"]);
        Ok(())
    }

    #[test]
    fn test_field_views_load_object_first() -> Result<()> {
        let player = player_type();
        let health = FieldDefinition::instance(Token::from_parts(Token::FIELD, 1), "health", &player, 0x18);
        let definition = MethodDefinition::builder(Token::from_parts(Token::METHOD_DEF, 7), "Heal", &player).build();
        let mut method = Method::new(
            definition,
            vec![
                Instruction::mov(0, l(2), l(1)),
                Instruction::mov(1, l(1), 5),
                Instruction::ret_void(2),
            ],
            Vec::new(),
        );

        let mut this = LocalVariable::new("this", Register::new(1));
        this.parameter = Some(0);
        this.is_this = true;
        this.ty = Some(player.clone());
        let this_id = method.add_local(this.clone());
        method.add_local(LocalVariable::field_view(this_id, &this, health));
        method.add_local(LocalVariable::new("v0", Register::new(2)));

        let body = CodeGenerator::new().generate(&mut method)?;

        assert_eq!(
            text(&body),
            vec![
                "ldarg A_0",
                "ldfld Game.Player::health",
                "stloc V_0",
                "ldarg A_0",
                "ldc.i4 5",
                "stfld Game.Player::health",
                "ret",
                "ret"
            ]
        );
        assert_eq!(body.locals.len(), 1);
        assert_eq!(body.max_stack, 2);
        Ok(())
    }

    #[test]
    fn test_unknown_calls_and_type_handles() -> Result<()> {
        let player = player_type();
        let spawn = MethodDefinition::builder(Token::from_parts(Token::METHOD_DEF, 8), "Spawn", &player)
            .flags(MethodFlags::STATIC)
            .returns(&player)
            .build();
        let mut method = method(vec![
            Instruction::new(0, InstructionKind::Unknown { text: "int3".to_string() }),
            Instruction::new(
                1,
                InstructionKind::CallVoid {
                    target: static_method("Log"),
                    args: vec![Operand::Int(1)],
                },
            ),
            Instruction::new(
                2,
                InstructionKind::Call {
                    dest: l(0),
                    target: spawn,
                    args: Vec::new(),
                },
            ),
            Instruction::mov(3, l(1), Operand::Type(player)),
            Instruction::ret_void(4),
        ]);
        add_locals(&mut method, 2);

        let body = CodeGenerator::new().generate(&mut method)?;

        assert_eq!(
            text(&body),
            vec![
                "ldstr \"int3\"",
                "call void System.Console::WriteLine(string)",
                "ldc.i4 1",
                "call Game.Player.Log()",
                "call Game.Player.Spawn()",
                "stloc V_0",
                "ldtoken Game.Player",
                "call System.Type System.Type::GetTypeFromHandle(System.RuntimeTypeHandle)",
                "stloc V_1",
                "ret",
                "ret"
            ]
        );
        Ok(())
    }
}
