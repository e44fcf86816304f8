#![doc = include_str!("../../../README.md")]

pub mod ast;
pub mod call;
pub mod config;
pub mod env;
pub mod error;
pub mod expressions;
pub mod interpreter;
pub mod usage;
pub mod value;

pub use ast::{BinOp, CallParams, Expr, LetValue, Literal, Param, Stmt, TemplateDef, TemplateRegistry};
pub use config::{AnalysisConfig, UnknownFunctionPolicy};
pub use error::AnalysisError;
pub use interpreter::analyze;
pub use usage::{UsageNode, UsageTree};
pub use value::{ChainStep, DataPath, SymbolicValue};
