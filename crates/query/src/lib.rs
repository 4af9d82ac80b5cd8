//! Query template compiler for Tessera
//!
//! Templates are statement text with embedded parameters:
//!
//! ```
//! use std::collections::HashMap;
//! use tessera_core::Value;
//! use tessera_query::TemplateCompiler;
//!
//! let template = TemplateCompiler::strict()
//!     .compile("select * from t where id=$id$ and name=$name,text$")
//!     .unwrap();
//!
//! let mut values = HashMap::new();
//! values.insert("id".to_string(), Value::Int(7));
//! values.insert("name".to_string(), Value::from("O'Brien"));
//!
//! assert_eq!(
//!     template.render_values(&values).unwrap(),
//!     "select * from t where id=7 and name='O''Brien'"
//! );
//! ```
//!
//! This crate provides:
//! - TemplateCompiler: parses template text into a node tree
//! - CompiledTemplate: renders the tree against named values
//! - ValueRenderer: pluggable literal formatting per backing store

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compiler;
pub mod node;
pub mod renderer;
pub mod template;

pub use compiler::{CompilerOptions, FunctionAliases, FunctionRewriter, TemplateCompiler};
pub use node::{FunctionCall, Node, Parameter};
pub use renderer::{RendererConfig, StandardRenderer, ValueRenderer};
pub use template::{BinarySink, CompiledTemplate, ValueLookup};
