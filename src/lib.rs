//! # yangkit
//!
//! A YANG (RFC 6020 / RFC 7950) schema compiler and instance data
//! validator.
//!
//! ## Features
//!
//! - YANG and YIN front ends producing a generic statement tree
//! - Module compilation into flat arenas: typedefs and restrictions,
//!   identities and features, grouping expansion with refine, augments and
//!   deviations
//! - Transactional compilation: a failed module leaves the context untouched
//! - Runtime feature enable/disable with if-feature re-evaluation
//! - Instance data loading from JSON (RFC 7951) and XML
//! - Data validation: keys, uniqueness, mandatory nodes, `when`, `must`,
//!   leafref and instance-identifier resolution
//! - A built-in XPath engine behind the [`xpath::XPathService`] trait
//!
//! ## Example
//!
//! ```rust,ignore
//! use yangkit::{validate, Context, DataTree, ValidateOptions};
//!
//! let mut ctx = Context::new();
//! ctx.load_file("interfaces.yang")?;
//!
//! let mut tree = DataTree::from_json_str(&ctx, &std::fs::read_to_string("config.json")?)?;
//! let report = validate(&ctx, &mut tree, &ValidateOptions::new())?;
//! println!("pruned: {:?}", report.pruned);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Foundation
pub mod error;
pub mod ids;
pub mod limits;
pub mod names;

// Front ends
pub mod parser;
pub mod statement;

// Schema compilation
pub mod plugins;
pub mod schema;

// XPath service
pub mod xpath;

// Instance data
pub mod data;

// Re-exports for convenience
pub use data::{validate, DataNode, DataTree, ValidateOptions, ValidationReport};
pub use error::{Error, ErrorKind, Result, SchemaError, ValidationError};
pub use ids::{DataId, FeatureId, IdentityId, ModuleId, NodeId, TypedefId};
pub use limits::Limits;
pub use schema::Context;
pub use statement::Statement;

/// Version of the yangkit library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Namespace of YIN documents
pub const YIN_NAMESPACE: &str = parser::YIN_NAMESPACE;
