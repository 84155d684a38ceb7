//! XPath service for YANG conditions
//!
//! This module provides the XPath interface the schema compiler and the
//! data validator depend on.
//!
//! ## Overview
//!
//! XPath is used in YANG for:
//! - `when` conditions
//! - `must` constraints
//! - leafref `path` arguments and instance-identifier values
//!
//! The core only talks to the [`XPathService`] trait. [`PathEngine`] is the
//! built-in implementation covering the subset YANG modules use: location
//! paths with predicates, comparisons, boolean and additive operators, and
//! the YANG function library (`current()`, `derived-from()`, `re-match()`).

mod eval;
mod parsers;

pub use parsers::{Axis, Expr, NodeTest, Step};

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::data::DataTree;
use crate::error::{Error, Result};
use crate::ids::{DataId, ModuleId};
use crate::schema::Context;

/// Prefix to module name mapping used while parsing an expression
pub type NamespaceMap = IndexMap<String, String>;

/// An expression compiled by an [`XPathService`]
///
/// The payload is opaque to the core; only the service that produced it
/// can evaluate it.
#[derive(Clone)]
pub struct CompiledExpr {
    /// Expression text as written
    pub text: String,
    /// Service-specific compiled form
    pub ast: Arc<dyn Any + Send + Sync>,
}

impl CompiledExpr {
    /// Wrap a compiled form
    pub fn new(text: impl Into<String>, ast: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            text: text.into(),
            ast,
        }
    }
}

impl fmt::Debug for CompiledExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledExpr").field("text", &self.text).finish()
    }
}

impl PartialEq for CompiledExpr {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

/// A node in an XPath node set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XNode {
    /// The document root above all top-level data nodes
    Root,
    /// A data node
    Data(DataId),
}

/// Result of XPath evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum XPathValue {
    /// A node set in document order
    Nodes(Vec<XNode>),
    /// A boolean result
    Boolean(bool),
    /// A number result
    Number(f64),
    /// A string result
    String(String),
}

impl XPathValue {
    /// Check if the result is true (for boolean or non-empty nodes)
    pub fn is_truthy(&self) -> bool {
        match self {
            XPathValue::Boolean(b) => *b,
            XPathValue::Nodes(nodes) => !nodes.is_empty(),
            XPathValue::Number(n) => *n != 0.0 && !n.is_nan(),
            XPathValue::String(s) => !s.is_empty(),
        }
    }

    /// Get as nodes if applicable
    pub fn as_nodes(&self) -> Option<&[XNode]> {
        if let XPathValue::Nodes(nodes) = self {
            Some(nodes)
        } else {
            None
        }
    }
}

/// Evaluation mode requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    /// `when` / `must`: any result type, converted to boolean by the caller
    WhenMust,
    /// leafref path or instance-identifier: the result must be a node set
    LeafrefPath,
}

/// Evaluation context handed to an [`XPathService`]
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    /// Compiled schema
    pub schema: &'a Context,
    /// Data tree being evaluated
    pub tree: &'a DataTree,
    /// Context node, `None` for the document root
    pub node: Option<DataId>,
    /// Node returned by `current()`
    pub current: Option<DataId>,
    /// Module of unprefixed names
    pub default_module: ModuleId,
}

impl fmt::Debug for EvalContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalContext")
            .field("node", &self.node)
            .field("current", &self.current)
            .field("default_module", &self.default_module)
            .finish()
    }
}

/// XPath collaborator used for `when`, `must` and leafref conditions
pub trait XPathService: Send + Sync + fmt::Debug {
    /// Parse an expression, resolving prefixes through `namespaces`
    fn parse(&self, expr: &str, namespaces: &NamespaceMap) -> Result<CompiledExpr>;

    /// Evaluate a compiled expression
    fn evaluate(
        &self,
        expr: &CompiledExpr,
        ctx: &EvalContext<'_>,
        mode: EvalMode,
    ) -> Result<XPathValue>;
}

/// Parsed expression together with the namespaces it was parsed with
#[derive(Debug, Clone)]
pub(crate) struct ParsedXPath {
    pub expr: Expr,
    pub namespaces: NamespaceMap,
}

/// Built-in XPath engine
#[derive(Debug, Clone, Copy, Default)]
pub struct PathEngine;

impl PathEngine {
    /// Create the engine
    pub fn new() -> Self {
        Self
    }
}

impl XPathService for PathEngine {
    fn parse(&self, expr: &str, namespaces: &NamespaceMap) -> Result<CompiledExpr> {
        let parsed = parsers::parse(expr, namespaces)?;
        Ok(CompiledExpr::new(
            expr,
            Arc::new(ParsedXPath {
                expr: parsed,
                namespaces: namespaces.clone(),
            }),
        ))
    }

    fn evaluate(
        &self,
        expr: &CompiledExpr,
        ctx: &EvalContext<'_>,
        mode: EvalMode,
    ) -> Result<XPathValue> {
        let parsed = expr.ast.downcast_ref::<ParsedXPath>().ok_or_else(|| {
            Error::XPath(format!(
                "Expression '{}' was not compiled by the built-in engine",
                expr.text
            ))
        })?;
        let value = eval::Evaluator::new(ctx, &parsed.namespaces).evaluate(&parsed.expr)?;
        if mode == EvalMode::LeafrefPath && value.as_nodes().is_none() {
            return Err(Error::XPath(format!(
                "Path '{}' does not evaluate to a node set",
                expr.text
            )));
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xpath_value_truthy() {
        assert!(XPathValue::Boolean(true).is_truthy());
        assert!(!XPathValue::Boolean(false).is_truthy());
        assert!(!XPathValue::Nodes(Vec::new()).is_truthy());
        assert!(XPathValue::Number(1.0).is_truthy());
        assert!(!XPathValue::Number(f64::NAN).is_truthy());
        assert!(XPathValue::String("test".to_string()).is_truthy());
        assert!(!XPathValue::String(String::new()).is_truthy());
    }

    #[test]
    fn test_compiled_expr_equality() {
        let engine = PathEngine::new();
        let ns = NamespaceMap::new();
        let a = engine.parse("../x = 1", &ns).unwrap();
        let b = engine.parse("../x = 1", &ns).unwrap();
        assert_eq!(a, b);
        assert!(engine.parse("../x = ", &ns).is_err());
    }

    #[test]
    fn test_unknown_prefix_rejected() {
        let engine = PathEngine::new();
        let mut ns = NamespaceMap::new();
        ns.insert("m".into(), "mod".into());
        assert!(engine.parse("/m:a/m:b", &ns).is_ok());
        assert!(engine.parse("/x:a", &ns).is_err());
    }
}
