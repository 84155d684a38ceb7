//! Features and if-feature expressions
//!
//! An `if-feature` argument is a boolean expression over feature names with
//! precedence `not` > `and` > `or` (YANG 1.1); YANG 1.0 only allows a single
//! feature name. Expressions are evaluated on every query against the live
//! enabled set, so enabling or disabling a feature is immediately visible
//! through every expression that references it.

use std::fmt;

use crate::error::SchemaError;
use crate::ids::{FeatureId, ModuleId};
use crate::statement::{SourcePos, Statement};

use super::node::Status;
use super::Unit;

/// Compiled if-feature expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IfFeatureExpr {
    /// A feature reference
    Feature(FeatureId),
    /// not
    Not(Box<IfFeatureExpr>),
    /// and
    And(Box<IfFeatureExpr>, Box<IfFeatureExpr>),
    /// or
    Or(Box<IfFeatureExpr>, Box<IfFeatureExpr>),
}

impl IfFeatureExpr {
    /// Features referenced by the expression
    pub fn features(&self) -> Vec<FeatureId> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect(&self, out: &mut Vec<FeatureId>) {
        match self {
            IfFeatureExpr::Feature(id) => out.push(*id),
            IfFeatureExpr::Not(inner) => inner.collect(out),
            IfFeatureExpr::And(a, b) | IfFeatureExpr::Or(a, b) => {
                a.collect(out);
                b.collect(out);
            }
        }
    }

    /// Evaluate with a feature valuation
    pub fn eval(&self, value: &dyn Fn(FeatureId) -> bool) -> bool {
        match self {
            IfFeatureExpr::Feature(id) => value(*id),
            IfFeatureExpr::Not(inner) => !inner.eval(value),
            IfFeatureExpr::And(a, b) => a.eval(value) && b.eval(value),
            IfFeatureExpr::Or(a, b) => a.eval(value) || b.eval(value),
        }
    }
}

/// An `if-feature` statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfFeature {
    /// Argument as written
    pub text: String,
    /// Compiled expression
    pub expr: IfFeatureExpr,
}

impl fmt::Display for IfFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// A `feature` definition
#[derive(Debug, Clone)]
pub struct Feature {
    /// Feature name
    pub name: String,
    /// Owning module
    pub module: ModuleId,
    /// Module or submodule where it is written
    pub unit: Unit,
    /// Gating if-features
    pub if_features: Vec<IfFeature>,
    /// Enabled flag
    pub enabled: bool,
    /// Status
    pub status: Status,
    /// The `feature` statement
    pub stmt: Statement,
    /// Source position
    pub position: SourcePos,
}

// =============================================================================
// Expression parsing
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    LParen,
    RParen,
    Not,
    And,
    Or,
    Name(String),
}

fn tokenize(text: &str) -> Result<Vec<Tok>, SchemaError> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '(' {
            tokens.push(Tok::LParen);
            chars.next();
        } else if c == ')' {
            tokens.push(Tok::RParen);
            chars.next();
        } else {
            let mut end = start;
            while let Some(&(i, ch)) = chars.peek() {
                if ch.is_whitespace() || ch == '(' || ch == ')' {
                    break;
                }
                end = i + ch.len_utf8();
                chars.next();
            }
            let word = &text[start..end];
            tokens.push(match word {
                "not" => Tok::Not,
                "and" => Tok::And,
                "or" => Tok::Or,
                _ => Tok::Name(word.to_string()),
            });
        }
    }
    Ok(tokens)
}

/// Parse an if-feature argument, resolving names through `resolve`
///
/// With `yang_1_1` false only a single feature name is accepted.
pub fn parse_if_feature(
    text: &str,
    yang_1_1: bool,
    resolve: &mut dyn FnMut(&str) -> Result<FeatureId, SchemaError>,
) -> Result<IfFeatureExpr, SchemaError> {
    let tokens = tokenize(text)?;
    if !yang_1_1 {
        return match tokens.as_slice() {
            [Tok::Name(name)] => Ok(IfFeatureExpr::Feature(resolve(name)?)),
            _ => Err(SchemaError::syntax(format!(
                "Invalid if-feature '{}': YANG 1.0 only allows a feature name",
                text
            ))),
        };
    }
    let mut parser = ExprParser {
        tokens,
        pos: 0,
        text,
        resolve,
    };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(parser.error());
    }
    Ok(expr)
}

struct ExprParser<'a> {
    tokens: Vec<Tok>,
    pos: usize,
    text: &'a str,
    resolve: &'a mut dyn FnMut(&str) -> Result<FeatureId, SchemaError>,
}

impl ExprParser<'_> {
    fn error(&self) -> SchemaError {
        SchemaError::syntax(format!("Invalid if-feature expression '{}'", self.text))
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.tokens.get(self.pos) == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<IfFeatureExpr, SchemaError> {
        let mut left = self.parse_and()?;
        while self.eat(&Tok::Or) {
            let right = self.parse_and()?;
            left = IfFeatureExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<IfFeatureExpr, SchemaError> {
        let mut left = self.parse_not()?;
        while self.eat(&Tok::And) {
            let right = self.parse_not()?;
            left = IfFeatureExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<IfFeatureExpr, SchemaError> {
        if self.eat(&Tok::Not) {
            let inner = self.parse_not()?;
            return Ok(IfFeatureExpr::Not(Box::new(inner)));
        }
        if self.eat(&Tok::LParen) {
            let inner = self.parse_or()?;
            if !self.eat(&Tok::RParen) {
                return Err(self.error());
            }
            return Ok(inner);
        }
        match self.tokens.get(self.pos).cloned() {
            Some(Tok::Name(name)) => {
                self.pos += 1;
                Ok(IfFeatureExpr::Feature((self.resolve)(&name)?))
            }
            _ => Err(self.error()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver<'a>(
        names: &'a [&'a str],
    ) -> impl FnMut(&str) -> Result<FeatureId, SchemaError> + 'a {
        move |name| {
            names
                .iter()
                .position(|n| *n == name)
                .map(FeatureId::from_index)
                .ok_or_else(|| SchemaError::unresolved(format!("feature '{}'", name)))
        }
    }

    #[test]
    fn test_precedence() {
        let names = ["a", "b", "c"];
        let mut r = resolver(&names);
        let expr = parse_if_feature("a or b and not c", true, &mut r).unwrap();
        let IfFeatureExpr::Or(_, right) = &expr else {
            panic!("or must be the root");
        };
        assert!(matches!(**right, IfFeatureExpr::And(_, _)));

        // a=false b=true c=false -> true
        let on = |id: FeatureId| id.to_index() == 1;
        assert!(expr.eval(&on));
        // c=true -> false
        let on = |id: FeatureId| id.to_index() != 0;
        assert!(!expr.eval(&on));
    }

    #[test]
    fn test_parentheses() {
        let names = ["a", "b", "c"];
        let mut r = resolver(&names);
        let expr = parse_if_feature("(a or b) and c", true, &mut r).unwrap();
        assert!(matches!(expr, IfFeatureExpr::And(_, _)));
        assert_eq!(expr.features().len(), 3);
    }

    #[test]
    fn test_yang_1_0_restriction() {
        let names = ["a", "b"];
        let mut r = resolver(&names);
        assert!(parse_if_feature("a", false, &mut r).is_ok());
        assert!(parse_if_feature("a and b", false, &mut r).is_err());
    }

    #[test]
    fn test_malformed() {
        let names = ["a", "b"];
        let mut r = resolver(&names);
        assert!(parse_if_feature("a and", true, &mut r).is_err());
        assert!(parse_if_feature("(a", true, &mut r).is_err());
        assert!(parse_if_feature("a b", true, &mut r).is_err());
        let err = parse_if_feature("zz", true, &mut r).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::UnresolvedReference);
    }
}
