//! Expression evaluator (C4): interprets an `Expr` down to a `SymbolicValue`.
//!
//! Evaluation never writes to the Usage Tree directly; it only builds values and
//! (for nested subexpressions, e.g. an unknown function's arguments) charges the
//! designated consumption sinks from `crate::usage`.

use crate::ast::{BinOp, Expr, Literal};
use crate::config::{AnalysisConfig, UnknownFunctionPolicy};
use crate::env::Environment;
use crate::error::AnalysisError;
use crate::usage::{self, UsageTree};
use crate::value::{self, SymbolicValue};

pub fn eval(
    expr: &Expr,
    env: &Environment,
    tree: &mut UsageTree,
    config: &AnalysisConfig,
    template: &str,
) -> Result<SymbolicValue, AnalysisError> {
    match expr {
        Expr::Literal(lit) => Ok(SymbolicValue::Concrete(lit.clone())),
        Expr::Global(_, Some(lit)) => Ok(SymbolicValue::Concrete(lit.clone())),
        Expr::Global(_, None) => Ok(SymbolicValue::Unknown),
        Expr::VarRef(name) => match env.get_opt(name) {
            Some(v) => Ok(v.clone()),
            None => Err(AnalysisError::UndeclaredParameter {
                template: template.to_string(),
                name: name.clone(),
            }),
        },
        Expr::Index { container, key } => {
            let container_val = eval(container, env, tree, config, template)?;
            let key_val = eval(key, env, tree, config, template)?;
            let key_usage = value::flatten_keys(&key_val);
            Ok(value::index(&container_val, &key_usage))
        }
        Expr::Binary { op, lhs, rhs } => {
            let lhs_val = eval(lhs, env, tree, config, template)?;
            let rhs_val = eval(rhs, env, tree, config, template)?;
            Ok(eval_binary(*op, lhs_val, rhs_val))
        }
        Expr::Ternary { cond, if_true, if_false } => {
            // Evaluated only for nested side effects; no path-sensitivity, so both
            // arms are walked and their values joined regardless of `cond`.
            let _ = eval(cond, env, tree, config, template)?;
            let t = eval(if_true, env, tree, config, template)?;
            let f = eval(if_false, env, tree, config, template)?;
            Ok(value::join(t, f))
        }
        Expr::ListLit(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval(item, env, tree, config, template)?);
            }
            Ok(SymbolicValue::ListLiteral(out))
        }
        Expr::MapLit(pairs) => eval_map_lit(pairs, env, tree, config, template),
        Expr::Call { name, args } => eval_call(name, args, env, tree, config, template),
        Expr::Directive { inner, .. } => eval(inner, env, tree, config, template),
        Expr::Unsupported(detail) => Err(AnalysisError::UnsupportedConstruct {
            template: template.to_string(),
            detail: detail.clone(),
        }),
    }
}

fn eval_binary(op: BinOp, lhs: SymbolicValue, rhs: SymbolicValue) -> SymbolicValue {
    match op {
        BinOp::Add => {
            if value::is_stringy(&lhs) || value::is_stringy(&rhs) {
                value::concat(lhs, rhs)
            } else {
                value::arithmetic(true, &lhs, &rhs)
            }
        }
        BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => value::arithmetic(false, &lhs, &rhs),
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::And | BinOp::Or => {
            SymbolicValue::Unknown
        }
    }
}

fn eval_map_lit(
    pairs: &[(Expr, Expr)],
    env: &Environment,
    tree: &mut UsageTree,
    config: &AnalysisConfig,
    template: &str,
) -> Result<SymbolicValue, AnalysisError> {
    let all_literal_keys = pairs.iter().all(|(k, _)| matches!(k, Expr::Literal(Literal::Str(_))));
    if !all_literal_keys {
        for (k, v) in pairs {
            let _ = eval(k, env, tree, config, template)?;
            let _ = eval(v, env, tree, config, template)?;
        }
        return Ok(SymbolicValue::Unknown);
    }
    let mut map = indexmap::IndexMap::new();
    for (k, v) in pairs {
        let Expr::Literal(Literal::Str(key)) = k else { unreachable!("checked above") };
        let value = eval(v, env, tree, config, template)?;
        map.insert(key.clone(), value);
    }
    Ok(SymbolicValue::MapLiteral(map))
}

fn eval_call(
    name: &str,
    args: &[Expr],
    env: &Environment,
    tree: &mut UsageTree,
    config: &AnalysisConfig,
    template: &str,
) -> Result<SymbolicValue, AnalysisError> {
    match name {
        "length" => {
            let [arg] = require_arity(name, args, template)?;
            let _ = eval(arg, env, tree, config, template)?;
            Ok(SymbolicValue::Unknown)
        }
        "augmentMap" => {
            // Always fans out to both arguments as distinct alternatives, even when
            // their shapes don't line up for a lattice join (§4.2, §9).
            let [a, b] = require_arity2(name, args, template)?;
            let av = eval(a, env, tree, config, template)?;
            let bv = eval(b, env, tree, config, template)?;
            let mut alts = vec![av];
            value::push_unique(&mut alts, bv);
            Ok(SymbolicValue::PossibleSet(alts))
        }
        "quoteKeysIfJs" => {
            let [arg] = require_arity(name, args, template)?;
            eval(arg, env, tree, config, template)
        }
        "keys" => {
            let [arg] = require_arity(name, args, template)?;
            let v = eval(arg, env, tree, config, template)?;
            Ok(value::keys_of(&v))
        }
        "range" => {
            if args.is_empty() || args.len() > 3 {
                return Err(AnalysisError::MalformedAst {
                    template: template.to_string(),
                    detail: format!("range() called with {} arguments", args.len()),
                });
            }
            let mut vals = Vec::with_capacity(args.len());
            for a in args {
                vals.push(eval(a, env, tree, config, template)?);
            }
            Ok(value::range_of(&vals))
        }
        _ => {
            let mut vals = Vec::with_capacity(args.len());
            for a in args {
                vals.push(eval(a, env, tree, config, template)?);
            }
            for v in &vals {
                match config.unknown_function_policy {
                    UnknownFunctionPolicy::UnknownArgs => usage::consume_unknown(tree, v),
                    UnknownFunctionPolicy::FullArgs => usage::consume(tree, v),
                }
            }
            Ok(SymbolicValue::Unknown)
        }
    }
}

fn require_arity<'a>(
    name: &str,
    args: &'a [Expr],
    template: &str,
) -> Result<[&'a Expr; 1], AnalysisError> {
    match args {
        [a] => Ok([a]),
        _ => Err(AnalysisError::MalformedAst {
            template: template.to_string(),
            detail: format!("{name}() expects exactly 1 argument, got {}", args.len()),
        }),
    }
}

fn require_arity2<'a>(
    name: &str,
    args: &'a [Expr],
    template: &str,
) -> Result<[&'a Expr; 2], AnalysisError> {
    match args {
        [a, b] => Ok([a, b]),
        _ => Err(AnalysisError::MalformedAst {
            template: template.to_string(),
            detail: format!("{name}() expects exactly 2 arguments, got {}", args.len()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::DataPath;

    fn fresh() -> (Environment, UsageTree, AnalysisConfig) {
        (Environment::seeded_for_params(&[crate::ast::Param::new("a")]), UsageTree::new(), AnalysisConfig::default())
    }

    #[test]
    fn unknown_function_call_marks_its_args_unknown_by_default() {
        let (env, mut tree, config) = fresh();
        let expr = Expr::Call { name: "myFunc".into(), args: vec![Expr::field(Expr::var("a"), "b")] };
        let v = eval(&expr, &env, &mut tree, &config, "t").unwrap();
        assert_eq!(v, SymbolicValue::Unknown);
        assert_eq!(tree.params().get("a"), Some(&crate::usage::UsageNode::Fields(indexmap::indexmap! {
            "b".to_string() => crate::usage::UsageNode::UnknownUse,
        })));
    }

    #[test]
    fn augment_map_joins_both_arguments() {
        let (env, mut tree, config) = fresh();
        let expr = Expr::Call {
            name: "augmentMap".into(),
            args: vec![Expr::var("a"), Expr::MapLit(vec![(Expr::str("extra"), Expr::int(1))])],
        };
        let v = eval(&expr, &env, &mut tree, &config, "t").unwrap();
        match v {
            SymbolicValue::PossibleSet(alts) => assert_eq!(alts.len(), 2),
            other => panic!("expected PossibleSet, got {other:?}"),
        }
    }

    #[test]
    fn varref_to_undeclared_name_is_an_error() {
        let (env, mut tree, config) = fresh();
        let err = eval(&Expr::var("nope"), &env, &mut tree, &config, "t").unwrap_err();
        assert_eq!(
            err,
            AnalysisError::UndeclaredParameter { template: "t".into(), name: "nope".into() }
        );
    }

    #[test]
    fn map_literal_with_computed_key_degrades_to_unknown() {
        let (env, mut tree, config) = fresh();
        let expr = Expr::MapLit(vec![(Expr::var("a"), Expr::int(1))]);
        let v = eval(&expr, &env, &mut tree, &config, "t").unwrap();
        assert_eq!(v, SymbolicValue::Unknown);
    }

    #[test]
    fn dotted_index_chain_stays_lazy_until_consumed() {
        let (env, mut tree, config) = fresh();
        let v = eval(&Expr::field(Expr::var("a"), "b"), &env, &mut tree, &config, "t").unwrap();
        assert_eq!(
            v,
            SymbolicValue::DataRef(DataPath {
                root: "a".into(),
                chain: vec![crate::value::ChainStep::Field("b".into())]
            })
        );
        assert!(tree.params().is_empty());
    }
}
