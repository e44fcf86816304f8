//! Minimal AST and template registry that this crate walks.
//!
//! Parsing template source into this shape is out of scope for this crate (see the
//! crate-level docs); callers construct a [`TemplateRegistry`] directly, the same way a
//! real driver would after running its own parser.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single known scalar value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Str(String),
    Int(i64),
    Bool(bool),
    Null,
}

/// Binary operators the evaluator models. Comparisons and boolean connectives are
/// tracked only so their operands still get walked for nested side effects; the
/// analysis has no path-sensitivity, so their own result is always `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// An expression node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    Literal(Literal),
    /// A named compile-time constant. Carries its folded value when the driver's
    /// constant table resolved it, `None` otherwise (treated as `Unknown`).
    Global(String, Option<Literal>),
    VarRef(String),
    /// Both `container[keyExpr]` and `container.field` (the latter desugars to a
    /// literal string key) are represented by this single node.
    Index { container: Box<Expr>, key: Box<Expr> },
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Ternary { cond: Box<Expr>, if_true: Box<Expr>, if_false: Box<Expr> },
    ListLit(Vec<Expr>),
    /// `(keyExpr, valueExpr)` pairs in source order; map literal keys must be
    /// `Literal(Str(_))` to stay a `MapLiteral` value (see `value::SymbolicValue`).
    MapLit(Vec<(Expr, Expr)>),
    Call { name: String, args: Vec<Expr> },
    /// A print directive (`|noAutoescape`, `|escapeHtml`, ...), transparent to value flow.
    Directive { inner: Box<Expr>, name: String },
    /// Placeholder for a real-world AST node kind this interpreter does not model.
    Unsupported(String),
}

impl Expr {
    pub fn field(container: Expr, field: impl Into<String>) -> Self {
        Expr::Index {
            container: Box::new(container),
            key: Box::new(Expr::Literal(Literal::Str(field.into()))),
        }
    }

    pub fn index(container: Expr, key: Expr) -> Self {
        Expr::Index { container: Box::new(container), key: Box::new(key) }
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expr::VarRef(name.into())
    }

    pub fn str(s: impl Into<String>) -> Self {
        Expr::Literal(Literal::Str(s.into()))
    }

    pub fn int(v: i64) -> Self {
        Expr::Literal(Literal::Int(v))
    }
}

/// The right-hand side of a `let`: either an expression form (`{let $x: e/}`) or a
/// block form (`{let $x}...{/let}`) whose value is derived from its body (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LetValue {
    Expr(Expr),
    Block(Vec<Stmt>),
}

/// How parameters are passed at a `call` site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CallParams {
    Explicit(Vec<(String, Expr)>),
    DataAll,
    Data(Expr),
}

/// A statement node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Stmt {
    /// Literal template text. Carries its content because a let-block whose sole
    /// child is raw text yields that text as a `Concrete` string value (§4.4).
    RawText(String),
    Print(Expr),
    Let { name: String, value: LetValue },
    If { arms: Vec<(Expr, Vec<Stmt>)>, else_body: Option<Vec<Stmt>> },
    Switch { expr: Expr, cases: Vec<(Vec<Expr>, Vec<Stmt>)>, default: Option<Vec<Stmt>> },
    Foreach { var: String, iter: Expr, body: Vec<Stmt> },
    For { var: String, range: Expr, body: Vec<Stmt> },
    Msg { body: Vec<Stmt> },
    Call { target: String, params: CallParams },
    Break,
    Continue,
    /// Placeholder for a real-world AST node kind this interpreter does not model.
    Unsupported(String),
}

/// A declared template parameter. Only these are chargeable `DataRef` roots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
}

impl Param {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A parsed template: its declared parameters and statement body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDef {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
}

/// The set of parsed templates available to the analyzer, keyed by fully qualified name.
///
/// Treated as read-only input; order of insertion is preserved but carries no
/// semantic weight for the analysis itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateRegistry {
    templates: IndexMap<String, TemplateDef>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, def: TemplateDef) {
        self.templates.insert(def.name.clone(), def);
    }

    pub fn get(&self, name: &str) -> Option<&TemplateDef> {
        self.templates.get(name)
    }
}
