//! Call resolver support (C6): building a callee's parameter bindings and the
//! structural digest used to detect repeat calls with an equivalent argument shape.
//!
//! Translating a callee's usage back into the caller's coordinate space (§4.5 step 4)
//! needs no bespoke machinery here: a callee parameter is bound directly to the
//! caller's `SymbolicValue` for that argument (often itself a `DataRef` rooted in the
//! *caller's* parameter), so any further field access inside the callee extends that
//! same chain and is recorded straight onto the one shared `UsageTree`.

use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::ast::Literal;
use crate::value::SymbolicValue;

/// A structural digest of a parameter-binding map, order-insensitive. Two calls to
/// the same template with digest-equal bindings are treated as the same call shape
/// for recursion-guard purposes (C6).
pub fn signature_digest(template: &str, bindings: &IndexMap<String, SymbolicValue>) -> String {
    let mut parts: BTreeMap<&str, String> = BTreeMap::new();
    for (k, v) in bindings {
        parts.insert(k.as_str(), value_digest(v));
    }
    let mut out = format!("{template}(");
    for (k, v) in parts {
        out.push_str(k);
        out.push('=');
        out.push_str(&v);
        out.push(';');
    }
    out.push(')');
    out
}

fn value_digest(v: &SymbolicValue) -> String {
    match v {
        SymbolicValue::Concrete(lit) => format!("c:{}", literal_digest(lit)),
        SymbolicValue::DataRef(path) => format!("d:{}", path.digest()),
        SymbolicValue::Unknown => "u".to_string(),
        SymbolicValue::PossibleSet(alts) => {
            let mut ds: Vec<String> = alts.iter().map(value_digest).collect();
            ds.sort_unstable();
            format!("s:[{}]", ds.join(","))
        }
        SymbolicValue::ListLiteral(xs) => {
            let ds: Vec<String> = xs.iter().map(value_digest).collect();
            format!("l:[{}]", ds.join(","))
        }
        SymbolicValue::MapLiteral(m) => {
            let mut ds: Vec<String> =
                m.iter().map(|(k, v)| format!("{k}:{}", value_digest(v))).collect();
            ds.sort_unstable();
            format!("m:{{{}}}", ds.join(","))
        }
    }
}

fn literal_digest(lit: &Literal) -> String {
    match lit {
        Literal::Str(s) => format!("s{s}"),
        Literal::Int(i) => format!("i{i}"),
        Literal::Bool(b) => format!("b{b}"),
        Literal::Null => "n".to_string(),
    }
}
