//! The pass pipeline and code generation entry point.

use log::{debug, warn};

use crate::{
    codegen::{CilBody, CilInstruction, CilOpCode, CilOperand, CodeGenerator, ImportedMember},
    decompiler::DecompilerConfig,
    metadata::ResolutionContext,
    transforms::{
        BuildSsaForm, BuildUseDefLists, CreateLocals, Inlining, RemoveSsaForm, RemoveUnreachableBlocks,
        RemoveUnusedLocals, ResolveStaticFields, ResolveTypeAddresses, StackAnalysis, Transform, TypePropagation,
    },
    Error, Method, Result,
};

/// Lifts one method at a time through the fixed pass order and lowers it to CIL.
///
/// The decompiler holds no per-method state: one instance can be shared by workers that
/// each own a different [`Method`].
///
/// # Example
///
/// ```rust,ignore
/// use dotlift::{Decompiler, DecompilerConfig, metadata::NullContext};
///
/// let decompiler = Decompiler::new(DecompilerConfig::default());
/// let body = decompiler.decompile_or_stub(&mut method, &NullContext)?;
/// println!("{body}");
/// for warning in method.warnings() {
///     eprintln!("{warning}");
/// }
/// ```
pub struct Decompiler {
    /// Configuration.
    config: DecompilerConfig,
    /// Passes in execution order (built once in constructor).
    transforms: Vec<Box<dyn Transform>>,
}

impl Default for Decompiler {
    fn default() -> Self {
        Self::new(DecompilerConfig::default())
    }
}

impl Decompiler {
    /// Creates a new decompiler with the given configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Ceilings handed to the passes and the code generator settings.
    #[must_use]
    pub fn new(config: DecompilerConfig) -> Self {
        let transforms: Vec<Box<dyn Transform>> = vec![
            Box::new(RemoveUnreachableBlocks::new()),
            Box::new(StackAnalysis::with_limit(config.max_stack_block_visits)),
            Box::new(BuildUseDefLists::new()),
            Box::new(BuildSsaForm::new()),
            Box::new(CreateLocals::new()),
            Box::new(BuildUseDefLists::new()),
            Box::new(RemoveUnusedLocals::new()),
            Box::new(RemoveSsaForm::new()),
            Box::new(ResolveTypeAddresses::new()),
            Box::new(TypePropagation::with_limit(config.max_type_propagation_loops)),
            Box::new(BuildUseDefLists::new()),
            Box::new(Inlining::new()),
            Box::new(ResolveStaticFields::new()),
            Box::new(BuildUseDefLists::new()),
        ];

        Self { config, transforms }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &DecompilerConfig {
        &self.config
    }

    /// Names of the passes in execution order.
    #[must_use]
    pub fn transform_names(&self) -> Vec<&'static str> {
        self.transforms.iter().map(|transform| transform.name()).collect()
    }

    /// Runs every pass over `method`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooComplex`] before any pass runs if the method exceeds the
    /// instruction ceiling, and propagates the first error a pass reports.
    pub fn run_transforms(&self, method: &mut Method, context: &dyn ResolutionContext) -> Result<()> {
        let instructions = method.instruction_count();
        if let Some(limit) = self.config.max_instruction_count {
            if instructions > limit {
                return Err(Error::TooComplex {
                    method: method.full_name(),
                    instructions,
                    limit,
                });
            }
        }

        for transform in &self.transforms {
            transform.apply(method, context)?;
            debug!(
                "{}: {} -> {} blocks, {} instructions, {} locals",
                method.full_name(),
                transform.name(),
                method.graph().layout().len(),
                method.instruction_count(),
                method.local_count()
            );
        }
        Ok(())
    }

    /// Runs the pipeline and generates the CIL body.
    ///
    /// Warnings gathered along the way stay on the method ([`Method::warnings`]).
    ///
    /// # Errors
    ///
    /// Returns limit errors ([`Error::is_limit`]) and structural errors from the passes or
    /// the generator.
    pub fn decompile(&self, method: &mut Method, context: &dyn ResolutionContext) -> Result<CilBody> {
        self.run_transforms(method, context)?;
        CodeGenerator::with_default_return(self.config.emit_default_return).generate(method)
    }

    /// Like [`Decompiler::decompile`], but a limit error yields [`Decompiler::stub_body`]
    /// carrying the error text.
    ///
    /// # Errors
    ///
    /// Propagates every error that is not a limit.
    pub fn decompile_or_stub(&self, method: &mut Method, context: &dyn ResolutionContext) -> Result<CilBody> {
        match self.decompile(method, context) {
            Err(error) if error.is_limit() => {
                let text = error.to_string();
                warn!("{}: {text}, emitting stub body", method.full_name());
                method.add_warning(text.clone());
                Ok(Self::stub_body(&text))
            }
            result => result,
        }
    }

    /// A body that throws a `System.Exception` carrying `text`.
    #[must_use]
    pub fn stub_body(text: &str) -> CilBody {
        CilBody {
            locals: Vec::new(),
            instructions: vec![
                CilInstruction::new(CilOpCode::Ldstr, Some(CilOperand::String(text.to_string()))),
                CilInstruction::new(CilOpCode::Newobj, Some(CilOperand::Import(ImportedMember::ExceptionCtor))),
                CilInstruction::new(CilOpCode::Throw, None),
            ],
            max_stack: 1,
        }
    }
}
