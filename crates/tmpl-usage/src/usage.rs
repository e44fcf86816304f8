//! The Usage Tree (C2): the output structure the analysis accumulates into, and the
//! consumption rules that turn a `SymbolicValue` reaching a sink into tree writes.

use indexmap::IndexMap;

use crate::value::{ChainStep, DataPath, SymbolicValue};

/// One node of a usage tree. Leaves are `Full`/`UnknownUse`; interior nodes map
/// field names (including the `"[?]"` sentinel) to their own usage.
#[derive(Debug, Clone, PartialEq)]
pub enum UsageNode {
    /// The value was consumed as a whole (printed, iterated, passed onward).
    Full,
    /// Some use occurred but the field(s) actually touched couldn't be determined.
    UnknownUse,
    Fields(IndexMap<String, UsageNode>),
}

impl serde::Serialize for UsageNode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            UsageNode::Full => serializer.serialize_str("*"),
            UsageNode::UnknownUse => serializer.serialize_str("?"),
            UsageNode::Fields(map) => map.serialize(serializer),
        }
    }
}

impl UsageNode {
    /// Merges two usage facts about the same path. Commutative, associative, and
    /// idempotent; `Full` absorbs everything, `UnknownUse` is the identity-ish
    /// floor that a `Fields` map can still refine.
    pub fn merge(self, other: Self, cap: Option<usize>) -> Self {
        match (self, other) {
            (UsageNode::Full, _) | (_, UsageNode::Full) => UsageNode::Full,
            (UsageNode::UnknownUse, UsageNode::UnknownUse) => UsageNode::UnknownUse,
            (UsageNode::UnknownUse, UsageNode::Fields(f))
            | (UsageNode::Fields(f), UsageNode::UnknownUse) => UsageNode::Fields(f),
            (UsageNode::Fields(mut a), UsageNode::Fields(b)) => {
                for (k, v) in b {
                    insert_field(&mut a, k, v, cap);
                }
                UsageNode::Fields(a)
            }
        }
    }
}

/// Inserts `key -> value` into `fields`, merging with any existing entry. If `cap`
/// is set and `key` would be a *new* distinct field beyond that cap, it collapses
/// into the `"[?]"` marker instead (§6.1 `max_keys_per_field`).
fn insert_field(fields: &mut IndexMap<String, UsageNode>, key: String, value: UsageNode, cap: Option<usize>) {
    if let Some(existing) = fields.get_mut(&key) {
        let old = std::mem::replace(existing, UsageNode::UnknownUse);
        *existing = old.merge(value, cap);
        return;
    }
    if let Some(cap) = cap {
        let distinct = fields.keys().filter(|k| k.as_str() != "[?]").count();
        if key != "[?]" && distinct >= cap {
            insert_field(fields, "[?]".to_string(), UsageNode::UnknownUse, Some(cap));
            return;
        }
    }
    fields.insert(key, value);
}

fn build_nested(fields: &[String], leaf: UsageNode) -> UsageNode {
    let mut node = leaf;
    for f in fields.iter().rev() {
        let mut m = IndexMap::new();
        m.insert(f.clone(), node);
        node = UsageNode::Fields(m);
    }
    node
}

/// Splits a `DataRef` chain into its literal field steps and whether it also
/// crosses an `Element` step with no field steps after it — the case that
/// collapses the whole consumption to `Unknown` at the param root (§4.3).
fn resolve_chain(chain: &[ChainStep]) -> (Vec<String>, bool) {
    let had_element = chain.iter().any(|s| matches!(s, ChainStep::Element));
    let fields: Vec<String> = chain
        .iter()
        .filter_map(|s| match s {
            ChainStep::Field(f) => Some(f.clone()),
            ChainStep::Element => None,
        })
        .collect();
    let collapse_to_root = fields.is_empty() && had_element;
    (fields, collapse_to_root)
}

/// The accumulated usage facts for every parameter of the entry template, keyed by
/// parameter name in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct UsageTree {
    params: IndexMap<String, UsageNode>,
    max_keys_per_field: Option<usize>,
}

impl serde::Serialize for UsageTree {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.params.serialize(serializer)
    }
}

impl UsageTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cap(max_keys_per_field: Option<usize>) -> Self {
        Self { params: IndexMap::new(), max_keys_per_field }
    }

    pub fn params(&self) -> &IndexMap<String, UsageNode> {
        &self.params
    }

    fn record(&mut self, path: &DataPath, leaf: UsageNode) {
        let (fields, collapse_to_root) = resolve_chain(&path.chain);
        let node = if collapse_to_root { UsageNode::UnknownUse } else { build_nested(&fields, leaf) };
        match self.params.get_mut(&path.root) {
            Some(existing) => {
                let old = std::mem::replace(existing, UsageNode::UnknownUse);
                *existing = old.merge(node, self.max_keys_per_field);
            }
            None => {
                self.params.insert(path.root.clone(), node);
            }
        }
    }

    pub fn record_full(&mut self, path: &DataPath) {
        self.record(path, UsageNode::Full);
    }

    pub fn record_unknown(&mut self, path: &DataPath) {
        self.record(path, UsageNode::UnknownUse);
    }

    /// Merges another tree's facts into this one. Used to verify idempotence: analyzing
    /// the same entry twice and merging the two trees must equal analyzing it once.
    pub fn merge_into(&mut self, other: UsageTree) {
        for (k, v) in other.params {
            match self.params.get_mut(&k) {
                Some(existing) => {
                    let old = std::mem::replace(existing, UsageNode::UnknownUse);
                    *existing = old.merge(v, self.max_keys_per_field);
                }
                None => {
                    self.params.insert(k, v);
                }
            }
        }
    }
}

/// Charges a value as fully consumed (print, foreach-iterable, call-argument
/// passthrough, ...), recursing into literal containers so every reachable
/// `DataRef` gets its own `Full` mark.
pub fn consume(tree: &mut UsageTree, value: &SymbolicValue) {
    match value {
        SymbolicValue::DataRef(path) => tree.record_full(path),
        SymbolicValue::PossibleSet(alts) => {
            for a in alts {
                consume(tree, a);
            }
        }
        SymbolicValue::ListLiteral(xs) => {
            for x in xs {
                consume(tree, x);
            }
        }
        SymbolicValue::MapLiteral(m) => {
            for v in m.values() {
                consume(tree, v);
            }
        }
        SymbolicValue::Concrete(_) | SymbolicValue::Unknown => {}
    }
}

/// Charges a value as consumed with an indeterminate field (unknown-function
/// argument under the default policy, recursion-guard cutoff).
pub fn consume_unknown(tree: &mut UsageTree, value: &SymbolicValue) {
    match value {
        SymbolicValue::DataRef(path) => tree.record_unknown(path),
        SymbolicValue::PossibleSet(alts) => {
            for a in alts {
                consume_unknown(tree, a);
            }
        }
        SymbolicValue::ListLiteral(xs) => {
            for x in xs {
                consume_unknown(tree, x);
            }
        }
        SymbolicValue::MapLiteral(m) => {
            for v in m.values() {
                consume_unknown(tree, v);
            }
        }
        SymbolicValue::Concrete(_) | SymbolicValue::Unknown => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(root: &str, fields: &[&str]) -> DataPath {
        DataPath { root: root.into(), chain: fields.iter().map(|f| ChainStep::Field((*f).into())).collect() }
    }

    #[test]
    fn record_full_at_root_is_a_bare_leaf() {
        let mut tree = UsageTree::new();
        tree.record_full(&path("a", &[]));
        assert_eq!(tree.params().get("a"), Some(&UsageNode::Full));
    }

    #[test]
    fn record_full_nested_builds_chain_of_single_key_maps() {
        let mut tree = UsageTree::new();
        tree.record_full(&path("profile", &["address", "city"]));
        let expected = serde_json::json!({"profile": {"address": {"city": "*"}}});
        assert_eq!(serde_json::to_value(&tree).unwrap(), expected);
    }

    #[test]
    fn element_only_chain_collapses_to_unknown_at_root() {
        let mut tree = UsageTree::new();
        let p = DataPath { root: "list".into(), chain: vec![ChainStep::Element] };
        tree.record_full(&p);
        assert_eq!(tree.params().get("list"), Some(&UsageNode::UnknownUse));
    }

    #[test]
    fn element_then_field_keeps_the_field_name_not_the_sentinel() {
        let mut tree = UsageTree::new();
        let p = DataPath {
            root: "a".into(),
            chain: vec![ChainStep::Element, ChainStep::Field("b".into())],
        };
        tree.record_full(&p);
        let expected = serde_json::json!({"a": {"b": "*"}});
        assert_eq!(serde_json::to_value(&tree).unwrap(), expected);
    }

    #[test]
    fn full_absorbs_unknown_when_merged() {
        let mut tree = UsageTree::new();
        tree.record_full(&path("a", &[]));
        tree.record_unknown(&path("a", &[]));
        assert_eq!(tree.params().get("a"), Some(&UsageNode::Full));
    }

    #[test]
    fn cap_collapses_extra_sibling_keys_into_sentinel() {
        let mut tree = UsageTree::with_cap(Some(1));
        tree.record_full(&path("profile", &["name"]));
        tree.record_full(&path("profile", &["age"]));
        let expected = serde_json::json!({"profile": {"name": "*", "[?]": "?"}});
        assert_eq!(serde_json::to_value(&tree).unwrap(), expected);
    }

    #[test]
    fn merge_into_is_idempotent_across_two_independent_analyses() {
        let mut a = UsageTree::new();
        a.record_full(&path("profile", &["name"]));
        let mut b = UsageTree::new();
        b.record_full(&path("profile", &["name"]));
        b.record_full(&path("other", &[]));
        a.merge_into(b);
        let expected = serde_json::json!({"profile": {"name": "*"}, "other": "*"});
        assert_eq!(serde_json::to_value(&a).unwrap(), expected);
    }
}
