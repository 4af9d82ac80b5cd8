//! Template node tree
//!
//! A compiled template is a tree of `Node`s rooted in a `Sequence`. Nodes are built
//! once by the compiler and never change afterwards; rendering only reads them.

use std::fmt;
use tessera_core::{Error, RenderKind, Result, Value};

use crate::renderer::ValueRenderer;
use crate::template::{BinarySink, ValueLookup};

/// One element of a compiled template
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Fixed text emitted verbatim
    Literal(String),
    /// Children emitted in order
    Sequence(Vec<Node>),
    /// Parenthesized expression inside a function argument
    Group(Vec<Node>),
    /// Numeric literal
    Number(String),
    /// Run of identifiers, operators, punctuation and whitespace
    Word(String),
    /// String literal
    Quoted {
        /// Decoded content, doubled delimiters already collapsed
        text: String,
        /// Delimiter that opened the literal (`'` or `"`)
        delimiter: char,
    },
    /// Function applied to argument expressions
    FunctionCall(FunctionCall),
    /// Named value placeholder
    Parameter(Parameter),
}

/// Function call with its argument expressions
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    /// Function name as written (or as rewritten)
    pub name: String,
    /// One node per comma-separated argument
    pub args: Vec<Node>,
}

impl FunctionCall {
    /// Build a call node
    pub fn new(name: impl Into<String>, args: Vec<Node>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// Parameter placeholder: `$key$`, `$key,kind$` or `$key,kind,separator$`
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    names: Vec<String>,
    kind: Option<RenderKind>,
}

impl Parameter {
    /// Build a parameter from its raw comma-split tokens
    ///
    /// # Errors
    ///
    /// Returns `UnknownRenderKind` if `names[1]` is not blank and not a kind name.
    pub fn new(names: Vec<String>) -> Result<Self> {
        let kind = match names.get(1) {
            Some(k) if !k.trim().is_empty() => Some(k.parse::<RenderKind>()?),
            _ => None,
        };
        Ok(Self { names, kind })
    }

    /// Key used to look the value up
    pub fn key(&self) -> &str {
        self.names.first().map(|n| n.trim()).unwrap_or("")
    }

    /// Explicit rendering kind, if given
    pub fn kind_override(&self) -> Option<RenderKind> {
        self.kind
    }

    /// Separator between collection elements, if given
    pub fn separator(&self) -> Option<&str> {
        self.names.get(2).map(String::as_str)
    }

    /// Raw tokens as written between the `$` delimiters
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Everything a render pass reads from or writes to besides the tree
pub(crate) struct RenderState<'r, 's> {
    pub(crate) renderer: &'r dyn ValueRenderer,
    pub(crate) values: &'r dyn ValueLookup,
    pub(crate) sink: Option<&'s mut dyn BinarySink>,
}

impl Node {
    /// Append the text of this node
    pub(crate) fn render_into(&self, state: &mut RenderState<'_, '_>, out: &mut String) -> Result<()> {
        match self {
            Node::Literal(text) | Node::Number(text) | Node::Word(text) => out.push_str(text),
            Node::Sequence(children) => {
                for child in children {
                    child.render_into(state, out)?;
                }
            }
            Node::Group(children) => {
                out.push('(');
                for child in children {
                    child.render_into(state, out)?;
                }
                out.push(')');
            }
            Node::Quoted { text, delimiter } => write_quoted(text, *delimiter, out),
            Node::FunctionCall(call) => {
                out.push_str(&call.name);
                out.push('(');
                for (i, arg) in call.args.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    arg.render_into(state, out)?;
                }
                out.push(')');
            }
            Node::Parameter(param) => {
                let values = state.values;
                render_parameter(param, values.lookup(param.key()), state, out)?;
            }
        }
        Ok(())
    }

    /// Collect parameter keys in first-occurrence order
    pub(crate) fn collect_parameters<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Node::Parameter(param) => {
                if !names.contains(&param.key()) {
                    names.push(param.key());
                }
            }
            Node::Sequence(children) | Node::Group(children) => {
                for child in children {
                    child.collect_parameters(names);
                }
            }
            Node::FunctionCall(call) => {
                for arg in &call.args {
                    arg.collect_parameters(names);
                }
            }
            _ => {}
        }
    }
}

fn write_quoted(text: &str, delimiter: char, out: &mut String) {
    out.push(delimiter);
    for c in text.chars() {
        if c == delimiter {
            out.push(delimiter);
        }
        out.push(c);
    }
    out.push(delimiter);
}

/// Render one resolved parameter value
///
/// Collections recurse element by element with the same names, so the kind
/// override and the separator apply to every element.
fn render_parameter(
    param: &Parameter,
    value: Option<&Value>,
    state: &mut RenderState<'_, '_>,
    out: &mut String,
) -> Result<()> {
    match value {
        None | Some(Value::Null) => out.push_str(state.renderer.null_literal()),
        Some(Value::Array(items)) => {
            let separator = param.separator().unwrap_or(",");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(separator);
                }
                render_parameter(param, Some(item), state, out)?;
            }
        }
        Some(Value::Bytes(payload)) => {
            let sink = state.sink.as_mut().ok_or_else(|| {
                Error::UnsupportedContext(format!(
                    "parameter {:?} holds binary content but the render context has no binary sink",
                    param.key()
                ))
            })?;
            sink.push_binary(payload.clone());
            out.push_str(state.renderer.binary_placeholder());
        }
        Some(value) => {
            let kind = param
                .kind_override()
                .or_else(|| value.default_render_kind())
                .unwrap_or(RenderKind::Text);
            state.renderer.render(value, kind, out)?;
        }
    }
    Ok(())
}

/// Source-like form, parameters shown as `$names$`
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Literal(text) if text == "$" => f.write_str("$$"),
            Node::Literal(text) | Node::Number(text) | Node::Word(text) => f.write_str(text),
            Node::Sequence(children) => children.iter().try_for_each(|c| write!(f, "{}", c)),
            Node::Group(children) => {
                f.write_str("(")?;
                children.iter().try_for_each(|c| write!(f, "{}", c))?;
                f.write_str(")")
            }
            Node::Quoted { text, delimiter } => {
                let mut out = String::new();
                write_quoted(text, *delimiter, &mut out);
                f.write_str(&out)
            }
            Node::FunctionCall(call) => {
                write!(f, "{}(", call.name)?;
                for (i, arg) in call.args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
            Node::Parameter(param) => write!(f, "${}$", param.names().join(",")),
        }
    }
}
