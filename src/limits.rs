//! Limits and constraints for schema compilation and data validation
//!
//! This module defines various limits to prevent resource exhaustion
//! on hostile or runaway inputs (deep import chains, exploding grouping
//! expansion, very deep instance documents).

use crate::error::{Error, Result};

/// Global limits configuration
#[derive(Debug, Clone)]
pub struct Limits {
    /// Maximum depth of a data tree
    pub max_data_depth: usize,

    /// Maximum number of schema nodes in one context
    pub max_schema_nodes: usize,

    /// Maximum depth of the import chain
    pub max_import_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_data_depth: 1000,
            max_schema_nodes: 1_000_000,
            max_import_depth: 100,
        }
    }
}

impl Limits {
    /// Create a new Limits with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create strict limits (more restrictive)
    pub fn strict() -> Self {
        Self {
            max_data_depth: 100,
            max_schema_nodes: 100_000,
            max_import_depth: 20,
        }
    }

    /// Create permissive limits (less restrictive, use with caution)
    pub fn permissive() -> Self {
        Self {
            max_data_depth: 10_000,
            max_schema_nodes: 10_000_000,
            max_import_depth: 1000,
        }
    }

    /// Check if data tree depth is within limits
    pub fn check_data_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_data_depth {
            Err(Error::LimitExceeded(format!(
                "data tree depth {} exceeds maximum {}",
                depth, self.max_data_depth
            )))
        } else {
            Ok(())
        }
    }

    /// Check if the number of schema nodes is within limits
    pub fn check_schema_nodes(&self, count: usize) -> Result<()> {
        if count > self.max_schema_nodes {
            Err(Error::LimitExceeded(format!(
                "schema node count {} exceeds maximum {}",
                count, self.max_schema_nodes
            )))
        } else {
            Ok(())
        }
    }

    /// Check if the import chain depth is within limits
    pub fn check_import_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_import_depth {
            Err(Error::LimitExceeded(format!(
                "import depth {} exceeds maximum {}",
                depth, self.max_import_depth
            )))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = Limits::default();
        assert_eq!(limits.max_data_depth, 1000);
        assert!(limits.check_data_depth(500).is_ok());
        assert!(limits.check_data_depth(1500).is_err());
    }

    #[test]
    fn test_strict_limits() {
        let limits = Limits::strict();
        assert!(limits.max_data_depth < Limits::default().max_data_depth);
        assert!(limits.check_import_depth(21).is_err());
    }

    #[test]
    fn test_permissive_limits() {
        let limits = Limits::permissive();
        assert!(limits.max_schema_nodes > Limits::default().max_schema_nodes);
        assert!(limits.check_schema_nodes(5_000_000).is_ok());
    }
}
