//! C2 — the math-notation-to-pipeline-expression converter.
//!
//! `MathConverter` is the seam for an external collaborator: something else
//! owns the grammar and the constant folding,
//! this crate only needs a `&str -> DbExpr` function and an identifier
//! resolver that knows whether a bare name is a document field, an
//! arithmetic variable already compiled to an expression, or a list
//! variable (only legal inside an array-scan context).

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::mathexpr::{self, MathExpr};

#[derive(Debug, Clone, PartialEq)]
pub enum ConversionError {
    Parse { expr: String, reason: String },
    UnknownIdent(String),
    ListVariableOutsideArrayContext(String),
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionError::Parse { expr, reason } => write!(f, "could not parse expression '{expr}': {reason}"),
            ConversionError::UnknownIdent(name) => write!(f, "unknown identifier '{name}'"),
            ConversionError::ListVariableOutsideArrayContext(name) => {
                write!(f, "list variable '{name}' referenced outside an array-scan context")
            }
        }
    }
}

impl std::error::Error for ConversionError {}

/// A compiled database expression tree — the `$expr`-land counterpart of
/// [`crate::model::PredicateValue`]. Produced only by [`MathConverter`]; every
/// other compiler stage treats it as opaque and just calls [`DbExpr::to_json`].
#[derive(Debug, Clone, PartialEq)]
pub enum DbExpr {
    Const(Value),
    /// An already-formatted reference string: `"$field.path"` in projection
    /// context, `"$$this.field"` inside an array scan, or `"$$varName"` for a
    /// previously-bound `$let` variable. Which form applies is the caller's
    /// decision, made at resolution time — this type carries it verbatim.
    FieldRef(String),
    Add(Vec<DbExpr>),
    Subtract(Box<DbExpr>, Box<DbExpr>),
    Multiply(Vec<DbExpr>),
    Divide(Box<DbExpr>, Box<DbExpr>),
    Modulo(Box<DbExpr>, Box<DbExpr>),
    Negate(Box<DbExpr>),
}

impl DbExpr {
    pub fn to_json(&self) -> Value {
        match self {
            DbExpr::Const(v) => v.clone(),
            DbExpr::FieldRef(path) => Value::String(path.clone()),
            DbExpr::Add(terms) => json!({"$add": terms.iter().map(DbExpr::to_json).collect::<Vec<_>>()}),
            DbExpr::Subtract(a, b) => json!({"$subtract": [a.to_json(), b.to_json()]}),
            DbExpr::Multiply(terms) => json!({"$multiply": terms.iter().map(DbExpr::to_json).collect::<Vec<_>>()}),
            DbExpr::Divide(a, b) => json!({"$divide": [a.to_json(), b.to_json()]}),
            DbExpr::Modulo(a, b) => json!({"$mod": [a.to_json(), b.to_json()]}),
            DbExpr::Negate(inner) => json!({"$multiply": [json!(-1), inner.to_json()]}),
        }
    }
}

/// Resolves a bare identifier encountered while converting a math-notation
/// expression. Implemented differently per emission context (document match,
/// array scan, projection) — see `predicate.rs`.
pub trait IdentResolver {
    fn resolve(&self, name: &str) -> Result<DbExpr, ConversionError>;
}

/// The external collaborator seam (§EXP). Anything implementing this trait
/// can stand in for the math-notation compiler; [`DefaultMathConverter`] is
/// the implementation this crate ships.
pub trait MathConverter {
    fn convert(&self, expr: &str, resolver: &dyn IdentResolver) -> Result<DbExpr, ConversionError>;

    /// Every bare identifier `expr` refers to, in whatever grammar this
    /// converter understands — the dependency analyzer's only window into an
    /// arithmetic variable's expression text. Overapproximates per invariant
    /// 3: duplicates and identifiers that turn out to be base fields rather
    /// than other variables are both fine, the dependency graph filters
    /// those out itself.
    fn dependencies(&self, expr: &str) -> Result<Vec<String>, ConversionError>;
}

/// The default [`MathConverter`]: a small recursive-descent parser
/// (`mathexpr`) plus exact constant folding over [`rust_decimal::Decimal`]
/// before any identifier is resolved, so `"2 + 2"` always folds to the
/// constant `4` regardless of what the resolver would have done with it.
///
/// Parsed ASTs are memoized by source text — the same arithmetic variable
/// expression is typically converted once per emission context (A, B, C),
/// and re-lexing it each time would be wasted work.
pub struct DefaultMathConverter {
    cache: RefCell<HashMap<String, MathExpr>>,
}

impl DefaultMathConverter {
    pub fn new() -> Self {
        DefaultMathConverter {
            cache: RefCell::new(HashMap::new()),
        }
    }

    fn parsed(&self, expr: &str) -> Result<MathExpr, ConversionError> {
        if let Some(ast) = self.cache.borrow().get(expr) {
            return Ok(ast.clone());
        }
        let ast = mathexpr::parse(expr).map_err(|e| ConversionError::Parse {
            expr: expr.to_string(),
            reason: e.to_string(),
        })?;
        self.cache.borrow_mut().insert(expr.to_string(), ast.clone());
        Ok(ast)
    }
}

impl Default for DefaultMathConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl MathConverter for DefaultMathConverter {
    fn convert(&self, expr: &str, resolver: &dyn IdentResolver) -> Result<DbExpr, ConversionError> {
        let ast = self.parsed(expr)?;
        to_db_expr(&ast, resolver)
    }

    fn dependencies(&self, expr: &str) -> Result<Vec<String>, ConversionError> {
        let ast = self.parsed(expr)?;
        Ok(collect_idents(&ast))
    }
}

/// Every bare identifier appearing anywhere in `ast`, in traversal order
/// (duplicates included — callers that need a set dedupe themselves).
pub(crate) fn collect_idents(ast: &MathExpr) -> Vec<String> {
    let mut out = Vec::new();
    fn walk(expr: &MathExpr, out: &mut Vec<String>) {
        match expr {
            MathExpr::Number(_) => {}
            MathExpr::Ident(name) => out.push(name.clone()),
            MathExpr::Neg(inner) => walk(inner, out),
            MathExpr::Add(a, b)
            | MathExpr::Sub(a, b)
            | MathExpr::Mul(a, b)
            | MathExpr::Div(a, b)
            | MathExpr::Mod(a, b) => {
                walk(a, out);
                walk(b, out);
            }
        }
    }
    walk(ast, &mut out);
    out
}

fn to_db_expr(ast: &MathExpr, resolver: &dyn IdentResolver) -> Result<DbExpr, ConversionError> {
    if let Some(folded) = fold_constant(ast) {
        return Ok(DbExpr::Const(decimal_to_json(folded)));
    }
    match ast {
        MathExpr::Number(n) => Ok(DbExpr::Const(decimal_to_json(*n))),
        MathExpr::Ident(name) => resolver.resolve(name),
        MathExpr::Neg(inner) => Ok(DbExpr::Negate(Box::new(to_db_expr(inner, resolver)?))),
        MathExpr::Add(..) => Ok(DbExpr::Add(flatten_add(ast, resolver)?)),
        MathExpr::Mul(..) => Ok(DbExpr::Multiply(flatten_mul(ast, resolver)?)),
        MathExpr::Sub(a, b) => Ok(DbExpr::Subtract(
            Box::new(to_db_expr(a, resolver)?),
            Box::new(to_db_expr(b, resolver)?),
        )),
        MathExpr::Div(a, b) => Ok(DbExpr::Divide(
            Box::new(to_db_expr(a, resolver)?),
            Box::new(to_db_expr(b, resolver)?),
        )),
        MathExpr::Mod(a, b) => Ok(DbExpr::Modulo(
            Box::new(to_db_expr(a, resolver)?),
            Box::new(to_db_expr(b, resolver)?),
        )),
    }
}

/// Flattens a left-leaning chain of `+` nodes into the variadic `$add` shape,
/// honoring `$subtract` where a leaf of the chain is itself a subtraction.
fn flatten_add(ast: &MathExpr, resolver: &dyn IdentResolver) -> Result<Vec<DbExpr>, ConversionError> {
    match ast {
        MathExpr::Add(a, b) => {
            let mut terms = flatten_add(a, resolver)?;
            terms.push(to_db_expr(b, resolver)?);
            Ok(terms)
        }
        other => Ok(vec![to_db_expr(other, resolver)?]),
    }
}

fn flatten_mul(ast: &MathExpr, resolver: &dyn IdentResolver) -> Result<Vec<DbExpr>, ConversionError> {
    match ast {
        MathExpr::Mul(a, b) => {
            let mut terms = flatten_mul(a, resolver)?;
            terms.push(to_db_expr(b, resolver)?);
            Ok(terms)
        }
        other => Ok(vec![to_db_expr(other, resolver)?]),
    }
}

/// Exact constant folding over pure-literal subtrees. Returns `None` as soon
/// as an identifier appears anywhere in the subtree — folding never touches
/// resolver-dependent terms.
fn fold_constant(ast: &MathExpr) -> Option<Decimal> {
    match ast {
        MathExpr::Number(n) => Some(*n),
        MathExpr::Ident(_) => None,
        MathExpr::Neg(inner) => fold_constant(inner).map(|v| -v),
        MathExpr::Add(a, b) => Some(fold_constant(a)? + fold_constant(b)?),
        MathExpr::Sub(a, b) => Some(fold_constant(a)? - fold_constant(b)?),
        MathExpr::Mul(a, b) => Some(fold_constant(a)? * fold_constant(b)?),
        MathExpr::Div(a, b) => {
            let denom = fold_constant(b)?;
            if denom.is_zero() {
                None
            } else {
                Some(fold_constant(a)? / denom)
            }
        }
        MathExpr::Mod(a, b) => {
            let denom = fold_constant(b)?;
            if denom.is_zero() {
                None
            } else {
                Some(fold_constant(a)? % denom)
            }
        }
    }
}

fn decimal_to_json(d: Decimal) -> Value {
    match d.to_string().parse::<f64>() {
        Ok(f) => json!(f),
        Err(_) => json!(d.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoResolver;
    impl IdentResolver for EchoResolver {
        fn resolve(&self, name: &str) -> Result<DbExpr, ConversionError> {
            Ok(DbExpr::FieldRef(format!("${name}")))
        }
    }

    #[test]
    fn folds_pure_literal_arithmetic() {
        let converter = DefaultMathConverter::new();
        let expr = converter.convert("2 + 2 * 3", &EchoResolver).unwrap();
        assert_eq!(expr, DbExpr::Const(json!(8.0)));
    }

    #[test]
    fn leaves_identifiers_unfolded() {
        let converter = DefaultMathConverter::new();
        let expr = converter.convert("a + 1", &EchoResolver).unwrap();
        match expr {
            DbExpr::Add(terms) => {
                assert_eq!(terms[0], DbExpr::FieldRef("$a".to_string()));
                assert_eq!(terms[1], DbExpr::Const(json!(1.0)));
            }
            other => panic!("expected Add, got {other:?}"),
        }
    }

    #[test]
    fn flattens_chained_additions() {
        let converter = DefaultMathConverter::new();
        let expr = converter.convert("a + b + c", &EchoResolver).unwrap();
        match expr {
            DbExpr::Add(terms) => assert_eq!(terms.len(), 3),
            other => panic!("expected Add, got {other:?}"),
        }
    }

    #[test]
    fn renders_to_mongo_shaped_json() {
        let converter = DefaultMathConverter::new();
        let expr = converter.convert("a - b", &EchoResolver).unwrap();
        assert_eq!(expr.to_json(), json!({"$subtract": ["$a", "$b"]}));
    }

    #[test]
    fn modulo_converts_to_mod_operator() {
        let converter = DefaultMathConverter::new();
        let expr = converter.convert("a % 2", &EchoResolver).unwrap();
        assert_eq!(expr.to_json(), json!({"$mod": ["$a", 2.0]}));
    }

    #[test]
    fn folds_constant_modulo() {
        let converter = DefaultMathConverter::new();
        let expr = converter.convert("7 % 3", &EchoResolver).unwrap();
        assert_eq!(expr, DbExpr::Const(json!(1.0)));
    }

    #[test]
    fn dependencies_lists_every_identifier_in_the_expression() {
        let converter = DefaultMathConverter::new();
        let idents = converter.dependencies("mag - zp + (offset * 2)").unwrap();
        assert_eq!(idents, vec!["mag".to_string(), "zp".to_string(), "offset".to_string()]);
    }

    #[test]
    fn dependencies_on_a_malformed_expression_is_an_error() {
        let converter = DefaultMathConverter::new();
        assert!(converter.dependencies("mag +").is_err());
    }
}
