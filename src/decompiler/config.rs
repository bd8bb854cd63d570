//! Decompiler configuration.
//!
//! All ceilings are per method. Crossing one aborts that method with a limit error (see
//! [`crate::Error::is_limit`]) and leaves every other method untouched.

/// Default ceiling shared by the instruction count, stack visit and type loop limits.
pub const DEFAULT_LIMIT: usize = 5000;

/// Configuration for the [`crate::Decompiler`].
///
/// A limit of `None` disables that ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompilerConfig {
    /// Methods with more instructions are rejected before any pass runs (default: 5000).
    pub max_instruction_count: Option<usize>,

    /// Block re-visits allowed while the stack delta fixpoint settles (default: 5000).
    pub max_stack_block_visits: Option<usize>,

    /// Loops allowed while types propagate through moves (default: 5000).
    pub max_type_propagation_loops: Option<usize>,

    /// Append a trailing default return to every generated body (default: true).
    pub emit_default_return: bool,
}

impl Default for DecompilerConfig {
    fn default() -> Self {
        Self {
            max_instruction_count: Some(DEFAULT_LIMIT),
            max_stack_block_visits: Some(DEFAULT_LIMIT),
            max_type_propagation_loops: Some(DEFAULT_LIMIT),
            emit_default_return: true,
        }
    }
}

impl DecompilerConfig {
    /// Creates a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration without any ceiling.
    ///
    /// Useful for tests and offline runs where a pathological method may take as long as
    /// it needs.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_instruction_count: None,
            max_stack_block_visits: None,
            max_type_propagation_loops: None,
            ..Self::default()
        }
    }

    /// Sets the instruction count ceiling.
    ///
    /// # Arguments
    ///
    /// * `limit` - Largest accepted method, or `None` for no ceiling.
    ///
    /// # Returns
    ///
    /// The modified configuration (builder pattern).
    #[must_use]
    pub fn with_max_instruction_count(mut self, limit: Option<usize>) -> Self {
        self.max_instruction_count = limit;
        self
    }

    /// Sets the stack analysis visit ceiling.
    #[must_use]
    pub fn with_max_stack_block_visits(mut self, limit: Option<usize>) -> Self {
        self.max_stack_block_visits = limit;
        self
    }

    /// Sets the type propagation loop ceiling.
    #[must_use]
    pub fn with_max_type_propagation_loops(mut self, limit: Option<usize>) -> Self {
        self.max_type_propagation_loops = limit;
        self
    }

    /// Enables or disables the trailing default return.
    #[must_use]
    pub fn with_default_return(mut self, enabled: bool) -> Self {
        self.emit_default_return = enabled;
        self
    }
}
