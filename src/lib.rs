//! Compiles a nested filter/annotation tree over a document schema into a
//! staged document-database aggregation pipeline.
//!
//! The entry points are [`compile`], [`compile_with_projection`], and
//! [`compile_report`] (the same compile, with diagnostics returned as data
//! instead of only logged). [`format_pipeline`] renders a pipeline back to
//! canonical text; [`is_valid_pipeline`] runs the structural checks a
//! pipeline must satisfy before a consumer hands it to a database driver.
//!
//! The compiler never mutates its inputs and never panics on malformed
//! input — see the module-level docs on [`error`] for the diagnostic
//! taxonomy and [`pipeline`] for the stage-ordering algorithm itself.

pub mod block;
pub mod convert;
pub mod dependency;
pub mod error;
pub mod formatter;
pub mod list_ops;
pub mod mathexpr;
pub mod model;
pub mod partition;
pub mod pipeline;
pub mod predicate;
pub mod usage;
pub mod validator;

#[cfg(feature = "cli")]
pub mod cli;

pub use convert::{ConversionError, DbExpr, DefaultMathConverter, IdentResolver, MathConverter};
pub use error::Diagnostic;
pub use formatter::{format_pipeline, format_value};
pub use model::{
    normalize_field, parse_arithmetic_variable, parse_list_condition, parse_list_variable, parse_node, parse_schema,
    ArithmeticVariable, Block, CompilerConfig, Condition, FieldType, ListCondition, ListVariable, Logic, ModelError,
    Node, OpTag, PredicateValue, Schema,
};
pub use pipeline::{compile, compile_report, compile_with_projection, CompileReport, Pipeline, ProjectionField};
pub use validator::is_valid_pipeline;
