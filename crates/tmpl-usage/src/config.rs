/// How unknown (non-builtin) function calls treat their arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownFunctionPolicy {
    /// Record `Unknown` usage on any `DataRef` reachable through an argument.
    UnknownArgs,
    /// Record `Full` usage instead, treating the call as if it printed its arguments.
    FullArgs,
}

impl Default for UnknownFunctionPolicy {
    fn default() -> Self {
        Self::UnknownArgs
    }
}

/// Caller-supplied knobs for a single [`crate::analyze`] run.
#[derive(Debug, Clone, Default)]
pub struct AnalysisConfig {
    /// Caps the number of distinct literal field names recorded under a single
    /// parent node before further keys collapse into the `[?]` marker. `None`
    /// means unbounded.
    pub max_keys_per_field: Option<usize>,
    pub unknown_function_policy: UnknownFunctionPolicy,
}
