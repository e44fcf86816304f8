//! The symbolic value domain (C1): the lattice the expression evaluator computes over,
//! and the operations (`join`, `concat`, indexing, key flattening) it needs to do so.

use indexmap::IndexMap;

use crate::ast::Literal;

/// One link in a `DataRef` chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainStep {
    Field(String),
    /// An integer-indexed list element. Transparent when followed by further field
    /// access; collapses to `Unknown` at the param root if it's the terminal step
    /// of a consumed chain (see `usage::resolve_chain`).
    Element,
}

/// A symbolic path rooted at a declared parameter: `paramName.field1.field2[...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPath {
    pub root: String,
    pub chain: Vec<ChainStep>,
}

impl DataPath {
    pub fn root(name: impl Into<String>) -> Self {
        Self { root: name.into(), chain: Vec::new() }
    }

    pub fn extended(&self, step: ChainStep) -> Self {
        let mut chain = self.chain.clone();
        chain.push(step);
        Self { root: self.root.clone(), chain }
    }

    /// Structural digest used to compare call-site binding shapes (C6).
    ///
    /// Capped at [`DIGEST_CHAIN_DEPTH_CAP`] steps so a self-recursive call that
    /// passes a strictly-growing chain (`node`, `node.child`, `node.child.child`,
    /// ...) still eventually produces a repeated digest: every chain longer than
    /// the cap collapses to the same truncated-plus-marker string, which is what
    /// lets the in-progress set in `interpreter::Analyzer` actually catch it.
    pub fn digest(&self) -> String {
        let mut s = format!("@{}", self.root);
        let truncated = self.chain.len() > DIGEST_CHAIN_DEPTH_CAP;
        let steps = if truncated { &self.chain[..DIGEST_CHAIN_DEPTH_CAP] } else { &self.chain[..] };
        for step in steps {
            match step {
                ChainStep::Field(f) => {
                    s.push('.');
                    s.push_str(f);
                }
                ChainStep::Element => s.push_str(".[*]"),
            }
        }
        if truncated {
            s.push_str(".…");
        }
        s
    }
}

/// Chain length beyond which [`DataPath::digest`] stops distinguishing further steps.
const DIGEST_CHAIN_DEPTH_CAP: usize = 6;

/// A symbolic value: the abstraction the evaluator computes with in place of a real
/// rendered value.
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolicValue {
    /// A fully known scalar.
    Concrete(Literal),
    /// One of a known, finite set of alternatives (e.g. the join of two branches).
    /// Never nests: flattening is maintained by construction.
    PossibleSet(Vec<SymbolicValue>),
    ListLiteral(Vec<SymbolicValue>),
    /// Keys are always `Concrete` strings; see [`Expr::MapLit`](crate::ast::Expr::MapLit).
    MapLiteral(IndexMap<String, SymbolicValue>),
    /// A path rooted at a declared parameter, not yet consumed.
    DataRef(DataPath),
    /// Nothing more precise could be determined.
    Unknown,
}

pub(crate) fn push_unique(out: &mut Vec<SymbolicValue>, v: SymbolicValue) {
    if !out.contains(&v) {
        out.push(v);
    }
}

/// Lattice join: the least upper bound of two values, used to unify branches.
/// Commutative, associative and idempotent.
pub fn join(a: SymbolicValue, b: SymbolicValue) -> SymbolicValue {
    use SymbolicValue::{Concrete, DataRef, ListLiteral, MapLiteral, PossibleSet, Unknown};

    if a == b {
        return a;
    }
    match (a, b) {
        (Unknown, _) | (_, Unknown) => Unknown,
        (PossibleSet(xs), PossibleSet(ys)) => {
            let mut out = xs;
            for y in ys {
                push_unique(&mut out, y);
            }
            PossibleSet(out)
        }
        (PossibleSet(xs), other) | (other, PossibleSet(xs)) => {
            let mut out = xs;
            push_unique(&mut out, other);
            PossibleSet(out)
        }
        (MapLiteral(ma), MapLiteral(mb)) => {
            let mut out = IndexMap::new();
            for k in ma.keys().chain(mb.keys()) {
                if out.contains_key(k) {
                    continue;
                }
                let joined = match (ma.get(k), mb.get(k)) {
                    (Some(x), Some(y)) => join(x.clone(), y.clone()),
                    _ => Unknown,
                };
                out.insert(k.clone(), joined);
            }
            MapLiteral(out)
        }
        (ListLiteral(la), ListLiteral(lb)) if la.len() == lb.len() => {
            ListLiteral(la.into_iter().zip(lb).map(|(x, y)| join(x, y)).collect())
        }
        (ListLiteral(_), ListLiteral(_)) => Unknown,
        (Concrete(x), Concrete(y)) => PossibleSet(vec![Concrete(x), Concrete(y)]),
        (DataRef(p), DataRef(q)) => PossibleSet(vec![DataRef(p), DataRef(q)]),
        (Concrete(x), DataRef(p)) | (DataRef(p), Concrete(x)) => {
            PossibleSet(vec![DataRef(p), Concrete(x)])
        }
        _ => Unknown,
    }
}

fn scalar_string(v: &SymbolicValue) -> Option<String> {
    match v {
        SymbolicValue::Concrete(Literal::Str(s)) => Some(s.clone()),
        SymbolicValue::Concrete(Literal::Int(i)) => Some(i.to_string()),
        SymbolicValue::Concrete(Literal::Bool(b)) => Some(b.to_string()),
        SymbolicValue::Concrete(Literal::Null) => Some("null".to_string()),
        _ => None,
    }
}

/// Whether `+` on this value should be treated as string concatenation: it's a
/// `Concrete` string, or a `PossibleSet` containing one.
pub fn is_stringy(v: &SymbolicValue) -> bool {
    match v {
        SymbolicValue::Concrete(Literal::Str(_)) => true,
        SymbolicValue::PossibleSet(xs) => xs.iter().any(is_stringy),
        _ => false,
    }
}

fn collapse(out: Vec<SymbolicValue>) -> SymbolicValue {
    if out.len() == 1 {
        out.into_iter().next().unwrap()
    } else {
        SymbolicValue::PossibleSet(out)
    }
}

fn push_flat(out: &mut Vec<SymbolicValue>, v: SymbolicValue) {
    match v {
        SymbolicValue::PossibleSet(vs) => {
            for x in vs {
                push_unique(out, x);
            }
        }
        other => push_unique(out, other),
    }
}

/// String concatenation via `+`, distributing over `PossibleSet` alternatives.
pub fn concat(a: SymbolicValue, b: SymbolicValue) -> SymbolicValue {
    use SymbolicValue::{PossibleSet, Unknown};

    if matches!(a, Unknown) || matches!(b, Unknown) {
        return Unknown;
    }
    match (a, b) {
        (PossibleSet(xs), b) => {
            let mut out = Vec::new();
            for x in xs {
                push_flat(&mut out, concat(x, b.clone()));
            }
            collapse(out)
        }
        (a, PossibleSet(ys)) => {
            let mut out = Vec::new();
            for y in ys {
                push_flat(&mut out, concat(a.clone(), y));
            }
            collapse(out)
        }
        (a, b) => match (scalar_string(&a), scalar_string(&b)) {
            (Some(sa), Some(sb)) => SymbolicValue::Concrete(Literal::Str(sa + &sb)),
            _ => Unknown,
        },
    }
}

/// Numeric `+`/`-`/`*`/`/`/`%`, only ever precise for two `Concrete(Int)` operands.
pub fn arithmetic(op_add: bool, a: &SymbolicValue, b: &SymbolicValue) -> SymbolicValue {
    if let (SymbolicValue::Concrete(Literal::Int(x)), SymbolicValue::Concrete(Literal::Int(y))) =
        (a, b)
    {
        if op_add {
            return SymbolicValue::Concrete(Literal::Int(x + y));
        }
    }
    SymbolicValue::Unknown
}

/// `keys($map)`: the field names of a literal map, in insertion order.
pub fn keys_of(v: &SymbolicValue) -> SymbolicValue {
    match v {
        SymbolicValue::MapLiteral(m) => SymbolicValue::ListLiteral(
            m.keys().map(|k| SymbolicValue::Concrete(Literal::Str(k.clone()))).collect(),
        ),
        _ => SymbolicValue::Unknown,
    }
}

/// `range(...)`, only precise when every argument is a `Concrete(Int)`.
pub fn range_of(args: &[SymbolicValue]) -> SymbolicValue {
    let ints: Option<Vec<i64>> = args
        .iter()
        .map(|a| match a {
            SymbolicValue::Concrete(Literal::Int(i)) => Some(*i),
            _ => None,
        })
        .collect();
    let Some(ints) = ints else {
        return SymbolicValue::Unknown;
    };
    let (start, end, step) = match ints.as_slice() {
        [end] => (0, *end, 1),
        [start, end] => (*start, *end, 1),
        [start, end, step] => (*start, *end, *step),
        _ => return SymbolicValue::Unknown,
    };
    if step == 0 {
        return SymbolicValue::Unknown;
    }
    let mut out = Vec::new();
    let mut i = start;
    if step > 0 {
        while i < end {
            out.push(SymbolicValue::Concrete(Literal::Int(i)));
            i += step;
        }
    } else {
        while i > end {
            out.push(SymbolicValue::Concrete(Literal::Int(i)));
            i += step;
        }
    }
    SymbolicValue::ListLiteral(out)
}

/// Which field(s) a key expression's value resolves to, flattened across any
/// `PossibleSet` of candidate keys.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KeyUsage {
    pub fields: std::collections::BTreeSet<String>,
    pub element: bool,
    pub unknown: bool,
}

impl KeyUsage {
    fn union(mut self, other: Self) -> Self {
        self.fields.extend(other.fields);
        self.element |= other.element;
        self.unknown |= other.unknown;
        self
    }
}

/// Reduces a key's symbolic value to the set of literal field names, the integer-element
/// marker, and/or the "key isn't statically known" marker it could denote.
pub fn flatten_keys(key: &SymbolicValue) -> KeyUsage {
    match key {
        SymbolicValue::Concrete(Literal::Str(s)) => {
            KeyUsage { fields: [s.clone()].into_iter().collect(), ..Default::default() }
        }
        SymbolicValue::Concrete(Literal::Int(_)) => KeyUsage { element: true, ..Default::default() },
        SymbolicValue::Concrete(Literal::Bool(_) | Literal::Null) => {
            KeyUsage { unknown: true, ..Default::default() }
        }
        SymbolicValue::PossibleSet(vs) => {
            vs.iter().map(flatten_keys).fold(KeyUsage::default(), KeyUsage::union)
        }
        SymbolicValue::Unknown
        | SymbolicValue::DataRef(_)
        | SymbolicValue::ListLiteral(_)
        | SymbolicValue::MapLiteral(_) => KeyUsage { unknown: true, ..Default::default() },
    }
}

fn collapse_alts(alts: Vec<SymbolicValue>) -> SymbolicValue {
    if alts.is_empty() {
        SymbolicValue::Unknown
    } else if alts.len() == 1 {
        alts.into_iter().next().unwrap()
    } else {
        SymbolicValue::PossibleSet(alts)
    }
}

/// `container[key]`, building chain extensions on `DataRef`s lazily: no usage is
/// recorded here, only at the consumption sites in `usage::consume`.
pub fn index(container: &SymbolicValue, key_usage: &KeyUsage) -> SymbolicValue {
    match container {
        SymbolicValue::DataRef(path) => {
            let mut alts = Vec::new();
            for f in &key_usage.fields {
                alts.push(SymbolicValue::DataRef(path.extended(ChainStep::Field(f.clone()))));
            }
            if key_usage.element {
                alts.push(SymbolicValue::DataRef(path.extended(ChainStep::Element)));
            }
            if key_usage.unknown {
                alts.push(SymbolicValue::DataRef(path.extended(ChainStep::Field("[?]".to_string()))));
            }
            collapse_alts(alts)
        }
        SymbolicValue::MapLiteral(m) => {
            let mut alts = Vec::new();
            for f in &key_usage.fields {
                alts.push(m.get(f).cloned().unwrap_or(SymbolicValue::Unknown));
            }
            if key_usage.element || key_usage.unknown {
                alts.push(SymbolicValue::Unknown);
            }
            collapse_alts(alts)
        }
        SymbolicValue::ListLiteral(xs) => {
            if key_usage.fields.is_empty() && !key_usage.element && !key_usage.unknown {
                return SymbolicValue::Unknown;
            }
            xs.iter()
                .cloned()
                .reduce(join)
                .unwrap_or(SymbolicValue::Unknown)
        }
        SymbolicValue::PossibleSet(alts) => alts
            .iter()
            .map(|a| index(a, key_usage))
            .reduce(join)
            .unwrap_or(SymbolicValue::Unknown),
        SymbolicValue::Concrete(_) | SymbolicValue::Unknown => SymbolicValue::Unknown,
    }
}
