//! Statement interpreter (C5) and the public driver entry point (C9).

use ahash::AHashSet;
use indexmap::IndexMap;

use crate::ast::{CallParams, Expr, LetValue, Literal, Stmt, TemplateDef, TemplateRegistry};
use crate::call;
use crate::config::AnalysisConfig;
use crate::env::Environment;
use crate::error::AnalysisError;
use crate::expressions::eval;
use crate::usage::{self, UsageTree};
use crate::value::{self, SymbolicValue};

/// Runs the analyzer over `registry` starting at `entry`, returning the accumulated
/// usage of that template's own parameters.
pub fn analyze(
    registry: &TemplateRegistry,
    entry: &str,
    config: &AnalysisConfig,
) -> Result<UsageTree, AnalysisError> {
    let Some(def) = registry.get(entry) else {
        return Err(AnalysisError::UnknownTemplateCall {
            caller: "<entry>".to_string(),
            callee: entry.to_string(),
        });
    };
    let mut analyzer = Analyzer {
        registry,
        config,
        tree: UsageTree::with_cap(config.max_keys_per_field),
        in_progress: AHashSet::default(),
    };
    let mut env = Environment::seeded_for_params(&def.params);
    analyzer.exec_stmts(&def.body, &mut env, entry)?;
    Ok(analyzer.tree)
}

struct Analyzer<'a> {
    registry: &'a TemplateRegistry,
    config: &'a AnalysisConfig,
    tree: UsageTree,
    in_progress: AHashSet<String>,
}

impl<'a> Analyzer<'a> {
    fn eval(&mut self, expr: &Expr, env: &Environment, template: &str) -> Result<SymbolicValue, AnalysisError> {
        eval(expr, env, &mut self.tree, self.config, template)
    }

    fn exec_stmts(&mut self, stmts: &[Stmt], env: &mut Environment, template: &str) -> Result<(), AnalysisError> {
        for s in stmts {
            self.exec_stmt(s, env, template)?;
        }
        Ok(())
    }

    fn exec_stmt(&mut self, stmt: &Stmt, env: &mut Environment, template: &str) -> Result<(), AnalysisError> {
        match stmt {
            Stmt::RawText(_) => Ok(()),
            Stmt::Print(expr) => {
                let v = self.eval(expr, env, template)?;
                usage::consume(&mut self.tree, &v);
                Ok(())
            }
            Stmt::Let { name, value } => {
                let v = match value {
                    LetValue::Expr(e) => self.eval(e, env, template)?,
                    LetValue::Block(body) => self.eval_block_value(body, env, template)?,
                };
                env.bind(name.clone(), v);
                Ok(())
            }
            Stmt::If { arms, else_body } => self.exec_if(arms, else_body, env, template),
            Stmt::Switch { expr, cases, default } => self.exec_switch(expr, cases, default, env, template),
            Stmt::Foreach { var, iter, body } => self.exec_foreach(var, iter, body, env, template),
            Stmt::For { var, range, body } => self.exec_for(var, range, body, env, template),
            Stmt::Msg { body } => self.exec_stmts(body, env, template),
            Stmt::Call { target, params } => self.exec_call(target, params, env, template),
            Stmt::Break | Stmt::Continue => Ok(()),
            Stmt::Unsupported(detail) => Err(AnalysisError::UnsupportedConstruct {
                template: template.to_string(),
                detail: detail.clone(),
            }),
        }
    }

    fn exec_if(
        &mut self,
        arms: &[(Expr, Vec<Stmt>)],
        else_body: &Option<Vec<Stmt>>,
        env: &mut Environment,
        template: &str,
    ) -> Result<(), AnalysisError> {
        if arms.is_empty() {
            return Err(AnalysisError::MalformedAst {
                template: template.to_string(),
                detail: "if statement with no arms".to_string(),
            });
        }
        let mut joined: Option<Environment> = None;
        for (guard, body) in arms {
            let _ = self.eval(guard, env, template)?;
            let mut arm_env = env.clone();
            self.exec_stmts(body, &mut arm_env, template)?;
            joined = Some(match joined {
                None => arm_env,
                Some(acc) => Environment::join(acc, arm_env),
            });
        }
        let else_env = match else_body {
            Some(body) => {
                let mut e = env.clone();
                self.exec_stmts(body, &mut e, template)?;
                e
            }
            None => env.clone(),
        };
        *env = Environment::join(joined.expect("at least one arm"), else_env);
        Ok(())
    }

    fn exec_switch(
        &mut self,
        expr: &Expr,
        cases: &[(Vec<Expr>, Vec<Stmt>)],
        default: &Option<Vec<Stmt>>,
        env: &mut Environment,
        template: &str,
    ) -> Result<(), AnalysisError> {
        if cases.is_empty() {
            return Err(AnalysisError::MalformedAst {
                template: template.to_string(),
                detail: "switch statement with no cases".to_string(),
            });
        }
        let _ = self.eval(expr, env, template)?;
        let mut joined: Option<Environment> = None;
        for (case_exprs, body) in cases {
            for ce in case_exprs {
                let _ = self.eval(ce, env, template)?;
            }
            let mut arm_env = env.clone();
            self.exec_stmts(body, &mut arm_env, template)?;
            joined = Some(match joined {
                None => arm_env,
                Some(acc) => Environment::join(acc, arm_env),
            });
        }
        let default_env = match default {
            Some(body) => {
                let mut e = env.clone();
                self.exec_stmts(body, &mut e, template)?;
                e
            }
            None => env.clone(),
        };
        *env = Environment::join(joined.expect("at least one case"), default_env);
        Ok(())
    }

    fn exec_foreach(
        &mut self,
        var: &str,
        iter: &Expr,
        body: &[Stmt],
        env: &mut Environment,
        template: &str,
    ) -> Result<(), AnalysisError> {
        let iter_val = self.eval(iter, env, template)?;
        let element = value::index(&iter_val, &value::KeyUsage { element: true, ..Default::default() });
        let mut loop_env = env.clone();
        loop_env.bind(var.to_string(), element);
        self.exec_stmts(body, &mut loop_env, template)
    }

    fn exec_for(
        &mut self,
        var: &str,
        range: &Expr,
        body: &[Stmt],
        env: &mut Environment,
        template: &str,
    ) -> Result<(), AnalysisError> {
        let range_val = self.eval(range, env, template)?;
        let mut loop_env = env.clone();
        loop_env.bind(var.to_string(), range_val);
        self.exec_stmts(body, &mut loop_env, template)
    }

    /// The value of a `{let $x}...{/let}` block: the join of the values its
    /// text/expression/branching children contribute (§4.4). Non-value-bearing
    /// children (nested `let`s, `call`s, `foreach`s) still execute for their side
    /// effects but contribute nothing to the join.
    fn eval_block_value(
        &mut self,
        body: &[Stmt],
        env: &mut Environment,
        template: &str,
    ) -> Result<SymbolicValue, AnalysisError> {
        let mut acc: Option<SymbolicValue> = None;
        for stmt in body {
            if let Some(v) = self.block_value_of_stmt(stmt, env, template)? {
                acc = Some(match acc {
                    None => v,
                    Some(a) => value::join(a, v),
                });
            }
        }
        Ok(acc.unwrap_or(SymbolicValue::Unknown))
    }

    fn block_value_of_stmt(
        &mut self,
        stmt: &Stmt,
        env: &mut Environment,
        template: &str,
    ) -> Result<Option<SymbolicValue>, AnalysisError> {
        match stmt {
            Stmt::RawText(text) => Ok(Some(SymbolicValue::Concrete(Literal::Str(text.clone())))),
            Stmt::Print(expr) => Ok(Some(self.eval(expr, env, template)?)),
            Stmt::If { arms, else_body } => {
                let mut acc: Option<SymbolicValue> = None;
                for (guard, arm_body) in arms {
                    let _ = self.eval(guard, env, template)?;
                    let mut arm_env = env.clone();
                    let v = self.eval_block_value(arm_body, &mut arm_env, template)?;
                    acc = Some(match acc {
                        None => v,
                        Some(a) => value::join(a, v),
                    });
                }
                if let Some(else_b) = else_body {
                    let mut e = env.clone();
                    let v = self.eval_block_value(else_b, &mut e, template)?;
                    acc = Some(match acc {
                        None => v,
                        Some(a) => value::join(a, v),
                    });
                }
                Ok(acc)
            }
            Stmt::Switch { expr, cases, default } => {
                let _ = self.eval(expr, env, template)?;
                let mut acc: Option<SymbolicValue> = None;
                for (case_exprs, arm_body) in cases {
                    for ce in case_exprs {
                        let _ = self.eval(ce, env, template)?;
                    }
                    let mut arm_env = env.clone();
                    let v = self.eval_block_value(arm_body, &mut arm_env, template)?;
                    acc = Some(match acc {
                        None => v,
                        Some(a) => value::join(a, v),
                    });
                }
                if let Some(d) = default {
                    let mut e = env.clone();
                    let v = self.eval_block_value(d, &mut e, template)?;
                    acc = Some(match acc {
                        None => v,
                        Some(a) => value::join(a, v),
                    });
                }
                Ok(acc)
            }
            Stmt::Msg { body } => Ok(Some(self.eval_block_value(body, env, template)?)),
            other => {
                self.exec_stmt(other, env, template)?;
                Ok(None)
            }
        }
    }

    fn exec_call(
        &mut self,
        target: &str,
        params: &CallParams,
        env: &mut Environment,
        template: &str,
    ) -> Result<(), AnalysisError> {
        let Some(def) = self.registry.get(target) else {
            return Err(AnalysisError::UnknownTemplateCall {
                caller: template.to_string(),
                callee: target.to_string(),
            });
        };
        let bindings = self.build_bindings(def, params, env, template)?;
        let signature = call::signature_digest(target, &bindings);
        if self.in_progress.contains(&signature) {
            for v in bindings.values() {
                usage::consume_unknown(&mut self.tree, v);
            }
            return Ok(());
        }
        self.in_progress.insert(signature.clone());
        let mut callee_env = Environment::new();
        for (k, v) in bindings {
            callee_env.bind(k, v);
        }
        let result = self.exec_stmts(&def.body, &mut callee_env, target);
        self.in_progress.remove(&signature);
        result
    }

    fn build_bindings(
        &mut self,
        def: &TemplateDef,
        params: &CallParams,
        env: &mut Environment,
        template: &str,
    ) -> Result<IndexMap<String, SymbolicValue>, AnalysisError> {
        let mut bindings = IndexMap::new();
        match params {
            CallParams::Explicit(pairs) => {
                for (name, expr) in pairs {
                    let v = self.eval(expr, env, template)?;
                    bindings.insert(name.clone(), v);
                }
                for p in &def.params {
                    bindings.entry(p.name.clone()).or_insert(SymbolicValue::Unknown);
                }
            }
            CallParams::DataAll => {
                for p in &def.params {
                    let v = env.get_opt(&p.name).cloned().unwrap_or(SymbolicValue::Unknown);
                    bindings.insert(p.name.clone(), v);
                }
            }
            CallParams::Data(expr) => {
                let v = self.eval(expr, env, template)?;
                match v {
                    SymbolicValue::MapLiteral(m) => {
                        for p in &def.params {
                            bindings
                                .insert(p.name.clone(), m.get(&p.name).cloned().unwrap_or(SymbolicValue::Unknown));
                        }
                    }
                    _ => {
                        for p in &def.params {
                            bindings.insert(p.name.clone(), SymbolicValue::Unknown);
                        }
                    }
                }
            }
        }
        Ok(bindings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, Param};

    fn registry_with(name: &str, params: &[&str], body: Vec<Stmt>) -> TemplateRegistry {
        let mut reg = TemplateRegistry::new();
        reg.insert(TemplateDef {
            name: name.to_string(),
            params: params.iter().map(|p| Param::new(*p)).collect(),
            body,
        });
        reg
    }

    #[test]
    fn printing_a_field_records_full_usage() {
        let reg = registry_with("t", &["a"], vec![Stmt::Print(Expr::field(Expr::var("a"), "b"))]);
        let tree = analyze(&reg, "t", &AnalysisConfig::default()).unwrap();
        let expected = serde_json::json!({"a": {"b": "*"}});
        assert_eq!(serde_json::to_value(&tree).unwrap(), expected);
    }

    #[test]
    fn call_to_unknown_template_is_an_error() {
        let reg = registry_with(
            "t",
            &[],
            vec![Stmt::Call { target: "missing".to_string(), params: CallParams::DataAll }],
        );
        let err = analyze(&reg, "t", &AnalysisConfig::default()).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::UnknownTemplateCall { caller: "t".into(), callee: "missing".into() }
        );
    }

    #[test]
    fn self_recursive_call_terminates_and_marks_unknown() {
        let mut reg = TemplateRegistry::new();
        reg.insert(TemplateDef {
            name: "t".to_string(),
            params: vec![Param::new("node")],
            body: vec![
                Stmt::Print(Expr::field(Expr::var("node"), "label")),
                Stmt::Call {
                    target: "t".to_string(),
                    params: CallParams::Explicit(vec![(
                        "node".to_string(),
                        Expr::field(Expr::var("node"), "child"),
                    )]),
                },
            ],
        });
        let tree = analyze(&reg, "t", &AnalysisConfig::default()).unwrap();
        // First call charges node.label Full; the recursive call passes node.child,
        // a distinct signature, so it runs once more before the guard trips.
        match tree.params().get("node") {
            Some(crate::usage::UsageNode::Fields(_)) => {}
            other => panic!("expected a Fields node, got {other:?}"),
        }
    }

    #[test]
    fn foreach_over_a_param_inspects_elements_without_forcing_it_full() {
        let reg = registry_with(
            "t",
            &["list"],
            vec![Stmt::Foreach {
                var: "item".to_string(),
                iter: Expr::var("list"),
                body: vec![Stmt::Print(Expr::field(Expr::var("item"), "name"))],
            }],
        );
        let tree = analyze(&reg, "t", &AnalysisConfig::default()).unwrap();
        let expected = serde_json::json!({"list": {"name": "*"}});
        assert_eq!(serde_json::to_value(&tree).unwrap(), expected);
    }

    #[test]
    fn call_with_data_all_forwards_same_named_locals() {
        let mut reg = TemplateRegistry::new();
        reg.insert(TemplateDef {
            name: "callee".to_string(),
            params: vec![Param::new("x")],
            body: vec![Stmt::Print(Expr::field(Expr::var("x"), "y"))],
        });
        reg.insert(TemplateDef {
            name: "caller".to_string(),
            params: vec![Param::new("x")],
            body: vec![Stmt::Call { target: "callee".to_string(), params: CallParams::DataAll }],
        });
        let tree = analyze(&reg, "caller", &AnalysisConfig::default()).unwrap();
        let expected = serde_json::json!({"x": {"y": "*"}});
        assert_eq!(serde_json::to_value(&tree).unwrap(), expected);
    }
}
