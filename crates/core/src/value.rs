//! Value types for Tessera
//!
//! This module defines:
//! - Value: the runtime value handed to templates and read from entity fields
//! - RenderKind: the target textual encoding of a value inside a statement
//!
//! ## Runtime Categories
//!
//! Every `Value` variant belongs to one runtime category, and the category decides
//! the default rendering kind of a template parameter:
//!
//! | Variant | Category | Default kind |
//! |---|---|---|
//! | `Int` | integer-like | `Integer` |
//! | `Long`, `Char` | long-like | `Long` |
//! | `Float` | floating point | `Floating` |
//! | `Decimal`, `Raw` | other numeric / raw-tagged | `Raw` |
//! | `Date`, `Timestamp` | date/time | `Date` |
//! | `Bool` | boolean | `Boolean` |
//! | `Enum` | enumeration | `Integer` (ordinal) |
//! | `Text` | text | `Text` |
//!
//! `Null`, `Bytes` and `Array` never reach kind inference: templates render them
//! as `null`, an out-of-band placeholder, and a separated list respectively.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Runtime value bound to a template parameter or read from an entity field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Missing value
    Null,
    /// Boolean value
    Bool(bool),
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// Single character, rendered through its code point
    Char(char),
    /// 64-bit floating point
    Float(f64),
    /// Arbitrary-precision number in canonical decimal text form
    Decimal(String),
    /// Pre-formatted expression rendered without any coercion
    Raw(String),
    /// Calendar date
    Date(NaiveDate),
    /// Date and time without zone
    Timestamp(NaiveDateTime),
    /// Enumeration constant
    Enum {
        /// Position of the constant in its declaration
        ordinal: u32,
        /// Constant name
        name: String,
    },
    /// UTF-8 text
    Text(String),
    /// Streamable binary content
    Bytes(Vec<u8>),
    /// Ordered collection, expanded element by element
    Array(Vec<Value>),
}

impl Value {
    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Long(_) => "Long",
            Value::Char(_) => "Char",
            Value::Float(_) => "Float",
            Value::Decimal(_) => "Decimal",
            Value::Raw(_) => "Raw",
            Value::Date(_) => "Date",
            Value::Timestamp(_) => "Timestamp",
            Value::Enum { .. } => "Enum",
            Value::Text(_) => "Text",
            Value::Bytes(_) => "Bytes",
            Value::Array(_) => "Array",
        }
    }

    /// Rendering kind used when a parameter carries no explicit override
    ///
    /// Returns `None` for values that are not rendered through a kind
    /// (null, binary content, collections).
    pub fn default_render_kind(&self) -> Option<RenderKind> {
        match self {
            Value::Int(_) | Value::Enum { .. } => Some(RenderKind::Integer),
            Value::Long(_) | Value::Char(_) => Some(RenderKind::Long),
            Value::Float(_) => Some(RenderKind::Floating),
            Value::Decimal(_) | Value::Raw(_) => Some(RenderKind::Raw),
            Value::Date(_) | Value::Timestamp(_) => Some(RenderKind::Date),
            Value::Bool(_) => Some(RenderKind::Boolean),
            Value::Text(_) => Some(RenderKind::Text),
            Value::Null | Value::Bytes(_) | Value::Array(_) => None,
        }
    }

    /// Integer view used by integer and long coercion
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(i64::from(*i)),
            Value::Long(l) => Some(*l),
            Value::Char(c) => Some(i64::from(u32::from(*c))),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Enum { ordinal, .. } => Some(i64::from(*ordinal)),
            Value::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i64),
            Value::Decimal(s) | Value::Text(s) | Value::Raw(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Floating point view used by floating coercion
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Decimal(s) | Value::Text(s) | Value::Raw(s) => s.trim().parse().ok(),
            other => other.to_i64().map(|i| i as f64),
        }
    }

    /// Boolean view used by boolean coercion
    pub fn to_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Text(s) | Value::Raw(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            other => other.to_i64().map(|i| i != 0),
        }
    }

    /// Date/time view used by date coercion
    pub fn to_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            Value::Date(d) => d.and_hms_opt(0, 0, 0),
            Value::Text(s) => {
                let s = s.trim();
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                    .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
                    .ok()
                    .or_else(|| {
                        NaiveDate::parse_from_str(s, "%Y-%m-%d")
                            .ok()
                            .and_then(|d| d.and_hms_opt(0, 0, 0))
                    })
            }
            _ => None,
        }
    }
}

/// Plain textual form, used for lock keys and raw rendering
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Long(l) => write!(f, "{}", l),
            Value::Char(c) => write!(f, "{}", c),
            Value::Float(x) => write!(f, "{}", x),
            Value::Decimal(s) | Value::Raw(s) | Value::Text(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S%.f")),
            Value::Enum { name, .. } => write!(f, "{}", name),
            Value::Bytes(b) => {
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

// ============================================================================
// From implementations for ergonomic API usage
// ============================================================================

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i)
    }
}

impl From<i64> for Value {
    fn from(l: i64) -> Self {
        Value::Long(l)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::Char(c)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(ts: NaiveDateTime) -> Self {
        Value::Timestamp(ts)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

/// Target textual encoding of a value inside a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderKind {
    /// Quoted, escaped string literal
    Text,
    /// 32-bit integer literal
    Integer,
    /// 64-bit integer literal
    Long,
    /// Floating point literal
    Floating,
    /// Quoted date/time literal
    Date,
    /// Direct string conversion, no coercion
    Raw,
    /// Boolean literal
    Boolean,
}

impl RenderKind {
    /// Canonical lowercase name, as accepted in a parameter override
    pub fn name(&self) -> &'static str {
        match self {
            RenderKind::Text => "text",
            RenderKind::Integer => "integer",
            RenderKind::Long => "long",
            RenderKind::Floating => "floating",
            RenderKind::Date => "date",
            RenderKind::Raw => "raw",
            RenderKind::Boolean => "boolean",
        }
    }
}

impl fmt::Display for RenderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RenderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "string" | "varchar" => Ok(RenderKind::Text),
            "int" | "integer" => Ok(RenderKind::Integer),
            "long" | "bigint" => Ok(RenderKind::Long),
            "float" | "double" | "floating" => Ok(RenderKind::Floating),
            "date" | "datetime" | "timestamp" => Ok(RenderKind::Date),
            "raw" => Ok(RenderKind::Raw),
            "bool" | "boolean" => Ok(RenderKind::Boolean),
            _ => Err(Error::UnknownRenderKind(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_render_kind_by_category() {
        assert_eq!(Value::Int(7).default_render_kind(), Some(RenderKind::Integer));
        assert_eq!(Value::Long(7).default_render_kind(), Some(RenderKind::Long));
        assert_eq!(Value::Char('a').default_render_kind(), Some(RenderKind::Long));
        assert_eq!(Value::Float(1.5).default_render_kind(), Some(RenderKind::Floating));
        assert_eq!(
            Value::Decimal("1.50".into()).default_render_kind(),
            Some(RenderKind::Raw)
        );
        assert_eq!(Value::Raw("now()".into()).default_render_kind(), Some(RenderKind::Raw));
        assert_eq!(Value::Bool(true).default_render_kind(), Some(RenderKind::Boolean));
        assert_eq!(
            Value::Enum {
                ordinal: 2,
                name: "Closed".into()
            }
            .default_render_kind(),
            Some(RenderKind::Integer)
        );
        assert_eq!(Value::from("x").default_render_kind(), Some(RenderKind::Text));
        assert_eq!(Value::Null.default_render_kind(), None);
        assert_eq!(Value::Bytes(vec![1]).default_render_kind(), None);
    }

    #[test]
    fn test_render_kind_from_str() {
        assert_eq!("text".parse::<RenderKind>().unwrap(), RenderKind::Text);
        assert_eq!(" INT ".parse::<RenderKind>().unwrap(), RenderKind::Integer);
        assert_eq!("bigint".parse::<RenderKind>().unwrap(), RenderKind::Long);
        assert_eq!("double".parse::<RenderKind>().unwrap(), RenderKind::Floating);
        assert_eq!("timestamp".parse::<RenderKind>().unwrap(), RenderKind::Date);
        assert!(matches!(
            "blob".parse::<RenderKind>(),
            Err(Error::UnknownRenderKind(_))
        ));
    }

    #[test]
    fn test_numeric_views() {
        assert_eq!(Value::Enum { ordinal: 3, name: "C".into() }.to_i64(), Some(3));
        assert_eq!(Value::Char('A').to_i64(), Some(65));
        assert_eq!(Value::from(" 42 ").to_i64(), Some(42));
        assert_eq!(Value::Float(2.5).to_i64(), None);
        assert_eq!(Value::Int(2).to_f64(), Some(2.0));
        assert_eq!(Value::from("yes").to_bool(), Some(true));
    }

    #[test]
    fn test_timestamp_view_parses_text() {
        let ts = Value::from("2024-03-01 10:20:30").to_timestamp().unwrap();
        assert_eq!(ts.format("%H:%M").to_string(), "10:20");
        let midnight = Value::from("2024-03-01").to_timestamp().unwrap();
        assert_eq!(midnight.format("%H:%M:%S").to_string(), "00:00:00");
    }

    #[test]
    fn test_display_for_keys() {
        assert_eq!(Value::Int(5).to_string(), "5");
        assert_eq!(Value::from("abc").to_string(), "abc");
        assert_eq!(Value::Bytes(vec![0xde, 0xad]).to_string(), "dead");
        assert_eq!(
            Value::Array(vec![Value::Int(1), Value::from("b")]).to_string(),
            "1,b"
        );
    }

    #[test]
    fn test_from_option() {
        let none: Option<i32> = None;
        assert_eq!(Value::from(none), Value::Null);
        assert_eq!(Value::from(Some(3)), Value::Int(3));
    }
}
