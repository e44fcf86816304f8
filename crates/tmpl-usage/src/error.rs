use std::fmt;

/// Error type for usage analysis, separating failures by the invariant they violate.
///
/// Keeping these distinct lets callers decide per-kind whether to abort a batch
/// analysis or skip the offending template, without string matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// A `call` targeted a template name absent from the registry.
    UnknownTemplateCall { caller: String, callee: String },
    /// A statement or expression violated a structural invariant (empty `if`,
    /// switch with no cases, wrong arity for a known builtin, ...).
    MalformedAst { template: String, detail: String },
    /// A `VarRef` named neither a local binding nor a declared parameter.
    UndeclaredParameter { template: String, name: String },
    /// An AST node kind this interpreter does not model.
    UnsupportedConstruct { template: String, detail: String },
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTemplateCall { caller, callee } => {
                write!(f, "{caller}: call to unknown template `{callee}`")
            }
            Self::MalformedAst { template, detail } => {
                write!(f, "{template}: malformed template: {detail}")
            }
            Self::UndeclaredParameter { template, name } => {
                write!(f, "{template}: reference to undeclared parameter `{name}`")
            }
            Self::UnsupportedConstruct { template, detail } => {
                write!(f, "{template}: unsupported construct: {detail}")
            }
        }
    }
}

impl std::error::Error for AnalysisError {}
