//! Lexical scope (C3): an immutable-by-copy binding environment.

use indexmap::IndexMap;

use crate::ast::Param;
use crate::value::{join, DataPath, SymbolicValue};

/// A binding environment. Cloning is shallow and cheap (an `IndexMap` clone); nested
/// scopes fork by cloning and never write back through the parent.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    bindings: IndexMap<String, SymbolicValue>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds one binding per declared parameter, each a bare `DataRef` at its own root.
    pub fn seeded_for_params(params: &[Param]) -> Self {
        let mut env = Self::new();
        for p in params {
            env.bindings.insert(p.name.clone(), SymbolicValue::DataRef(DataPath::root(p.name.clone())));
        }
        env
    }

    pub fn get_opt(&self, name: &str) -> Option<&SymbolicValue> {
        self.bindings.get(name)
    }

    pub fn bind(&mut self, name: impl Into<String>, value: SymbolicValue) {
        self.bindings.insert(name.into(), value);
    }

    /// Joins two environments forked from a common parent (e.g. the two sides of an
    /// `if`) back into one, key-wise. A name bound on only one side passes through
    /// unchanged; a name bound on both sides is lattice-joined.
    pub fn join(a: Environment, b: Environment) -> Environment {
        let mut out = IndexMap::new();
        for k in a.bindings.keys().chain(b.bindings.keys()) {
            if out.contains_key(k) {
                continue;
            }
            let joined = match (a.bindings.get(k), b.bindings.get(k)) {
                (Some(x), Some(y)) => join(x.clone(), y.clone()),
                (Some(x), None) | (None, Some(x)) => x.clone(),
                (None, None) => unreachable!("key drawn from one of the two maps"),
            };
            out.insert(k.clone(), joined);
        }
        Environment { bindings: out }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Literal;

    #[test]
    fn seeded_params_are_bare_data_refs() {
        let env = Environment::seeded_for_params(&[Param::new("a")]);
        assert_eq!(env.get_opt("a"), Some(&SymbolicValue::DataRef(DataPath::root("a"))));
    }

    #[test]
    fn join_keeps_one_sided_bindings_unchanged() {
        let mut a = Environment::new();
        a.bind("x", SymbolicValue::Concrete(Literal::Int(1)));
        let b = Environment::new();
        let joined = Environment::join(a, b);
        assert_eq!(joined.get_opt("x"), Some(&SymbolicValue::Concrete(Literal::Int(1))));
    }

    #[test]
    fn join_unifies_bindings_present_on_both_sides() {
        let mut a = Environment::new();
        a.bind("x", SymbolicValue::Concrete(Literal::Str("auto".into())));
        let mut b = Environment::new();
        b.bind("x", SymbolicValue::Concrete(Literal::Str("home".into())));
        let joined = Environment::join(a, b);
        assert_eq!(
            joined.get_opt("x"),
            Some(&SymbolicValue::PossibleSet(vec![
                SymbolicValue::Concrete(Literal::Str("auto".into())),
                SymbolicValue::Concrete(Literal::Str("home".into())),
            ]))
        );
    }
}
