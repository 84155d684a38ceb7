//! Range and length expression compiler
//!
//! A range argument is a `|`-separated list of ascending, non-overlapping
//! parts, each `N`, `N..M`, `min` or `max`. Every part is checked against
//! the restriction of the base type: a derived restriction may only narrow.

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::SchemaError;

use super::types::{RangePart, Restriction};

/// Numeric flavour of the bounds being parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundKind {
    /// Integer bounds (integer types, lengths)
    Integer,
    /// Decimal bounds scaled by `10^fraction_digits`
    Decimal(u8),
}

/// Parse an integer literal as accepted in YANG arguments and defaults
///
/// Accepts an optional sign and decimal, `0x` hexadecimal or leading-zero
/// octal notation.
pub fn parse_integer(text: &str) -> Option<i128> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    if digits.is_empty() {
        return None;
    }
    let magnitude = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i128::from_str_radix(hex, 16).ok()?
    } else if digits.len() > 1 && digits.starts_with('0') {
        i128::from_str_radix(&digits[1..], 8).ok()?
    } else {
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        digits.parse::<i128>().ok()?
    };
    Some(if negative { -magnitude } else { magnitude })
}

/// Parse a decimal literal and scale it by `10^fraction_digits`
///
/// Fails when the literal carries more fraction digits than allowed.
pub fn parse_scaled_decimal(text: &str, fraction_digits: u8) -> Option<i128> {
    let text = text.trim();
    if text.is_empty() || text.contains(['e', 'E']) {
        return None;
    }
    let value = Decimal::from_str(text).ok()?;
    if value.scale() > u32::from(fraction_digits) {
        return None;
    }
    let mantissa = value.mantissa();
    let factor = 10i128.checked_pow(u32::from(fraction_digits) - value.scale())?;
    mantissa.checked_mul(factor)
}

fn parse_bound(
    token: &str,
    kind: BoundKind,
    base: &Restriction,
    expr: &str,
) -> Result<i128, SchemaError> {
    match token {
        "min" => Ok(base.lowest()),
        "max" => Ok(base.highest()),
        _ => {
            let value = match kind {
                BoundKind::Integer => parse_integer(token),
                BoundKind::Decimal(digits) => parse_scaled_decimal(token, digits),
            };
            value.ok_or_else(|| {
                SchemaError::syntax(format!("Invalid bound '{}' in restriction '{}'", token, expr))
            })
        }
    }
}

/// Compile a range/length argument against the base type's restriction
pub fn compile_restriction(
    expr: &str,
    kind: BoundKind,
    base: &Restriction,
) -> Result<Restriction, SchemaError> {
    let mut parts: Vec<RangePart> = Vec::new();

    for raw_part in expr.split('|') {
        let raw_part = raw_part.trim();
        if raw_part.is_empty() {
            return Err(SchemaError::syntax(format!("Empty part in restriction '{}'", expr)));
        }
        let (lo, hi) = match raw_part.split_once("..") {
            Some((lo, hi)) => (lo.trim(), hi.trim()),
            None => (raw_part, raw_part),
        };
        let min = parse_bound(lo, kind, base, expr)?;
        let max = parse_bound(hi, kind, base, expr)?;

        if min > max {
            return Err(SchemaError::constraint(format!(
                "Restriction part '{}' has its lower bound above its upper bound",
                raw_part
            )));
        }
        if let Some(prev) = parts.last() {
            if min <= prev.max {
                return Err(SchemaError::constraint(format!(
                    "Restriction '{}' parts are not ascending and disjoint",
                    expr
                )));
            }
        }
        parts.push(RangePart { min, max });
    }

    let restriction = Restriction {
        parts,
        text: expr.to_string(),
        error_message: None,
        error_app_tag: None,
    };

    if !base.covers(&restriction) {
        return Err(SchemaError::constraint(format!(
            "Restriction '{}' is not a narrowing of the base restriction '{}'",
            expr, base.text
        )));
    }

    Ok(restriction)
}
