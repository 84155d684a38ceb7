//! Statement-tree front ends
//!
//! Thin readers for the two concrete syntaxes. Both produce the generic
//! [`crate::statement::Statement`] tree consumed by the schema compiler.

mod yang;
mod yin;

pub use yang::parse_yang;
pub use yin::{parse_yin, YIN_NAMESPACE};

use crate::error::SchemaError;
use crate::statement::Statement;

/// Parse either syntax, guessing from the first non-blank character
pub fn parse_auto(text: &str) -> Result<Statement, SchemaError> {
    if text.trim_start().starts_with('<') {
        parse_yin(text)
    } else {
        parse_yang(text)
    }
}
