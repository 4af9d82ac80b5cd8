//! Value rendering
//!
//! A `ValueRenderer` turns one typed value into statement text for a given
//! `RenderKind`. Only the text kind escapes; every other kind coerces the value and
//! writes a bare literal. Backing stores with different literal rules supply their
//! own renderer.

use serde::{Deserialize, Serialize};
use std::fmt;
use tessera_core::{Error, RenderKind, Result, Value};

/// Formats values as statement literals
pub trait ValueRenderer: Send + Sync + fmt::Debug {
    /// Append the literal for `value` rendered as `kind`
    ///
    /// # Errors
    ///
    /// Returns `Conversion` if the value cannot be coerced to `kind`.
    fn render(&self, value: &Value, kind: RenderKind, out: &mut String) -> Result<()>;

    /// Token emitted for a missing or null value
    fn null_literal(&self) -> &str {
        "null"
    }

    /// Token emitted in place of an out-of-band binary payload
    fn binary_placeholder(&self) -> &str {
        "?"
    }
}

/// Settings of the standard renderer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Delimiter of text and date literals
    pub quote: char,
    /// Also double backslashes inside text literals
    pub escape_backslash: bool,
    /// `chrono` format string for date literals
    pub date_format: String,
    /// Boolean true literal
    pub true_literal: String,
    /// Boolean false literal
    pub false_literal: String,
    /// Placeholder for binary payloads
    pub binary_placeholder: String,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            quote: '\'',
            escape_backslash: false,
            date_format: "%Y-%m-%d %H:%M:%S".to_string(),
            true_literal: "true".to_string(),
            false_literal: "false".to_string(),
            binary_placeholder: "?".to_string(),
        }
    }
}

/// ANSI-style renderer: single-quoted text with doubled quotes
#[derive(Debug, Clone, Default)]
pub struct StandardRenderer {
    config: RendererConfig,
}

impl StandardRenderer {
    /// Renderer with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Renderer with custom settings
    pub fn with_config(config: RendererConfig) -> Self {
        Self { config }
    }

    /// Current settings
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Append `text` as a quoted, escaped literal
    pub fn write_text_literal(&self, text: &str, out: &mut String) {
        let quote = self.config.quote;
        out.reserve(text.len() + 2);
        out.push(quote);
        for c in text.chars() {
            if c == quote {
                out.push(quote);
            } else if c == '\\' && self.config.escape_backslash {
                out.push('\\');
            }
            out.push(c);
        }
        out.push(quote);
    }
}

fn conversion(value: &Value, kind: RenderKind) -> Error {
    Error::Conversion {
        value: format!("{} {}", value.type_name(), value),
        kind: kind.to_string(),
    }
}

impl ValueRenderer for StandardRenderer {
    fn render(&self, value: &Value, kind: RenderKind, out: &mut String) -> Result<()> {
        match kind {
            RenderKind::Text => match value {
                Value::Text(s) => self.write_text_literal(s, out),
                other => self.write_text_literal(&other.to_string(), out),
            },
            RenderKind::Integer => {
                let i = value
                    .to_i64()
                    .and_then(|i| i32::try_from(i).ok())
                    .ok_or_else(|| conversion(value, kind))?;
                out.push_str(&i.to_string());
            }
            RenderKind::Long => {
                let l = value.to_i64().ok_or_else(|| conversion(value, kind))?;
                out.push_str(&l.to_string());
            }
            RenderKind::Floating => {
                let f = value
                    .to_f64()
                    .filter(|f| f.is_finite())
                    .ok_or_else(|| conversion(value, kind))?;
                out.push_str(&f.to_string());
            }
            RenderKind::Date => {
                let ts = value.to_timestamp().ok_or_else(|| conversion(value, kind))?;
                let formatted = ts.format(&self.config.date_format).to_string();
                self.write_text_literal(&formatted, out);
            }
            RenderKind::Raw => out.push_str(&value.to_string()),
            RenderKind::Boolean => {
                let b = value.to_bool().ok_or_else(|| conversion(value, kind))?;
                out.push_str(if b {
                    &self.config.true_literal
                } else {
                    &self.config.false_literal
                });
            }
        }
        Ok(())
    }

    fn binary_placeholder(&self) -> &str {
        &self.config.binary_placeholder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn render(value: Value, kind: RenderKind) -> Result<String> {
        let mut out = String::new();
        StandardRenderer::new().render(&value, kind, &mut out)?;
        Ok(out)
    }

    #[test]
    fn test_text_doubles_quote() {
        assert_eq!(render("O'Brien".into(), RenderKind::Text).unwrap(), "'O''Brien'");
        assert_eq!(render("plain".into(), RenderKind::Text).unwrap(), "'plain'");
    }

    #[test]
    fn test_text_of_non_text_value_is_quoted() {
        assert_eq!(render(Value::Int(5), RenderKind::Text).unwrap(), "'5'");
    }

    #[test]
    fn test_backslash_escaping_is_optional() {
        let renderer = StandardRenderer::with_config(RendererConfig {
            escape_backslash: true,
            ..RendererConfig::default()
        });
        let mut out = String::new();
        renderer
            .render(&Value::from(r"a\b"), RenderKind::Text, &mut out)
            .unwrap();
        assert_eq!(out, r"'a\\b'");

        assert_eq!(render(r"a\b".into(), RenderKind::Text).unwrap(), r"'a\b'");
    }

    #[test]
    fn test_integer_coercion() {
        assert_eq!(render(Value::Long(12), RenderKind::Integer).unwrap(), "12");
        assert_eq!(render("34".into(), RenderKind::Integer).unwrap(), "34");
        assert!(matches!(
            render(Value::Long(i64::MAX), RenderKind::Integer),
            Err(Error::Conversion { .. })
        ));
        let err = render("abc".into(), RenderKind::Integer).unwrap_err();
        assert!(matches!(err, Error::Conversion { .. }));
        assert!(err.to_string().contains("Text abc"));
    }

    #[test]
    fn test_long_and_floating() {
        assert_eq!(render(Value::Char('A'), RenderKind::Long).unwrap(), "65");
        assert_eq!(render(Value::Float(2.5), RenderKind::Floating).unwrap(), "2.5");
        assert!(render(Value::Float(f64::NAN), RenderKind::Floating).is_err());
    }

    #[test]
    fn test_date_is_quoted() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 31)
            .unwrap()
            .and_hms_opt(8, 5, 0)
            .unwrap();
        assert_eq!(
            render(Value::Timestamp(ts), RenderKind::Date).unwrap(),
            "'2024-01-31 08:05:00'"
        );
        let d = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(
            render(Value::Date(d), RenderKind::Date).unwrap(),
            "'2024-01-31 00:00:00'"
        );
    }

    #[test]
    fn test_raw_bypasses_coercion() {
        assert_eq!(
            render(Value::Decimal("10.500".into()), RenderKind::Raw).unwrap(),
            "10.500"
        );
        assert_eq!(render(Value::Raw("a + 1".into()), RenderKind::Raw).unwrap(), "a + 1");
    }

    #[test]
    fn test_boolean_literals() {
        assert_eq!(render(Value::Bool(true), RenderKind::Boolean).unwrap(), "true");
        assert_eq!(render(Value::Int(0), RenderKind::Boolean).unwrap(), "false");

        let renderer = StandardRenderer::with_config(RendererConfig {
            true_literal: "1".into(),
            false_literal: "0".into(),
            ..RendererConfig::default()
        });
        let mut out = String::new();
        renderer
            .render(&Value::Bool(true), RenderKind::Boolean, &mut out)
            .unwrap();
        assert_eq!(out, "1");
    }
}
