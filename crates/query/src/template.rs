//! Compiled templates
//!
//! A `CompiledTemplate` pairs the node tree with the renderer of the compiler that
//! built it. It is immutable and `Send + Sync`; one instance can be rendered from any
//! number of threads against different values.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tessera_core::{Result, Value};

use crate::node::{Node, RenderState};
use crate::renderer::ValueRenderer;

/// Source of named values for a render pass
pub trait ValueLookup {
    /// Value bound to `name`, if any
    fn lookup(&self, name: &str) -> Option<&Value>;
}

impl ValueLookup for HashMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl ValueLookup for BTreeMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

/// No values: every parameter renders as null
impl ValueLookup for () {
    fn lookup(&self, _name: &str) -> Option<&Value> {
        None
    }
}

/// Receiver of binary payloads bound positionally by the caller
pub trait BinarySink {
    /// Register a payload; returns its 1-based position
    fn push_binary(&mut self, payload: Vec<u8>) -> usize;
}

impl BinarySink for Vec<Vec<u8>> {
    fn push_binary(&mut self, payload: Vec<u8>) -> usize {
        self.push(payload);
        self.len()
    }
}

/// Parsed template ready for rendering
#[derive(Clone)]
pub struct CompiledTemplate {
    source: String,
    root: Node,
    renderer: Arc<dyn ValueRenderer>,
}

impl CompiledTemplate {
    pub(crate) fn new(source: String, root: Node, renderer: Arc<dyn ValueRenderer>) -> Self {
        Self {
            source,
            root,
            renderer,
        }
    }

    /// Render statement text
    ///
    /// Binary parameter values are registered with `sink` and replaced by the
    /// renderer's placeholder.
    ///
    /// # Errors
    ///
    /// - `UnsupportedContext` if a parameter resolves to binary content and no sink
    ///   was given
    /// - `Conversion` if a value cannot be rendered with its kind
    pub fn render(
        &self,
        values: &dyn ValueLookup,
        sink: Option<&mut dyn BinarySink>,
    ) -> Result<String> {
        let mut out = String::with_capacity(self.source.len());
        let mut state = RenderState {
            renderer: self.renderer.as_ref(),
            values,
            sink,
        };
        self.root.render_into(&mut state, &mut out)?;
        Ok(out)
    }

    /// Render without a binary sink
    pub fn render_values(&self, values: &dyn ValueLookup) -> Result<String> {
        self.render(values, None)
    }

    /// Parameter keys in first-occurrence order, without duplicates
    pub fn parameter_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.root.collect_parameters(&mut names);
        names
    }

    /// Template text the tree was compiled from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Root `Sequence` of the tree
    pub fn root(&self) -> &Node {
        &self.root
    }
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("source", &self.source)
            .field("root", &self.root)
            .finish()
    }
}
