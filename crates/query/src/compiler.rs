//! Query template compiler
//!
//! Hand-written recursive descent over the template characters with one character of
//! lookahead. The grammar, informally:
//!
//! ```text
//! sequence  := item*
//! item      := number | word | identifier | call | quoted | parameter
//! number    := [0-9] [0-9.]*
//! word      := punctuation+              punctuation = - + ( ) * = > < ! / , . | & % and whitespace
//! call      := identifier "(" argument ("," argument)* ")"
//! argument  := (item | group)*           stops before "," or an unmatched ")"
//! group     := "(" (item | group)* ")"   commas inside do not end the argument
//! quoted    := "'" ([^'] | "''")* "'"  |  '"' ([^"] | '""')* '"'
//! parameter := "$" [^$]+ "$"            "$$" is a literal dollar sign
//! ```
//!
//! Whitespace outside quoted literals is normalized: every run of spaces, tabs and
//! line breaks becomes a single space.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tessera_core::{Error, Result};
use tracing::trace;

use crate::node::{FunctionCall, Node, Parameter};
use crate::renderer::{StandardRenderer, ValueRenderer};
use crate::template::CompiledTemplate;

/// Rewrites function calls into store-specific forms at compile time
pub trait FunctionRewriter: Send + Sync {
    /// Replacement node for a parsed call; return the call unchanged to keep it
    fn rewrite(&self, call: FunctionCall) -> Node;
}

/// Renames functions by case-insensitive name
#[derive(Debug, Clone, Default)]
pub struct FunctionAliases {
    aliases: HashMap<String, String>,
}

impl FunctionAliases {
    /// Empty alias table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an alias `from` → `to`
    pub fn alias(mut self, from: &str, to: impl Into<String>) -> Self {
        self.aliases.insert(from.to_ascii_lowercase(), to.into());
        self
    }
}

impl FunctionRewriter for FunctionAliases {
    fn rewrite(&self, mut call: FunctionCall) -> Node {
        if let Some(target) = self.aliases.get(&call.name.to_ascii_lowercase()) {
            call.name = target.clone();
        }
        Node::FunctionCall(call)
    }
}

/// Compiler behavior switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Fail on characters outside the grammar instead of keeping them as text
    pub strict: bool,
    /// Recognize `$name$` parameters
    pub parameters: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            strict: false,
            parameters: true,
        }
    }
}

/// Compiles template text into `CompiledTemplate`s
#[derive(Clone)]
pub struct TemplateCompiler {
    options: CompilerOptions,
    renderer: Arc<dyn ValueRenderer>,
    rewriter: Option<Arc<dyn FunctionRewriter>>,
}

impl Default for TemplateCompiler {
    fn default() -> Self {
        Self::new(CompilerOptions::default())
    }
}

impl fmt::Debug for TemplateCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateCompiler")
            .field("options", &self.options)
            .field("renderer", &self.renderer)
            .field("rewriter", &self.rewriter.is_some())
            .finish()
    }
}

impl TemplateCompiler {
    /// Compiler with the standard renderer
    pub fn new(options: CompilerOptions) -> Self {
        Self {
            options,
            renderer: Arc::new(StandardRenderer::new()),
            rewriter: None,
        }
    }

    /// Lenient compiler: unknown characters are kept as text
    pub fn lenient() -> Self {
        Self::new(CompilerOptions {
            strict: false,
            parameters: true,
        })
    }

    /// Strict compiler: unknown characters fail with `Syntax`
    pub fn strict() -> Self {
        Self::new(CompilerOptions {
            strict: true,
            parameters: true,
        })
    }

    /// Use a store-specific renderer
    pub fn with_renderer(mut self, renderer: Arc<dyn ValueRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Install a function rewrite hook
    pub fn with_rewriter(mut self, rewriter: Arc<dyn FunctionRewriter>) -> Self {
        self.rewriter = Some(rewriter);
        self
    }

    /// Behavior switches of this compiler
    pub fn options(&self) -> CompilerOptions {
        self.options
    }

    /// Parse a template into its root `Sequence`
    ///
    /// # Errors
    ///
    /// - `Syntax` for a character outside the grammar (strict compilers only)
    /// - `UnterminatedToken` if the input ends inside a literal, parameter or call
    /// - `UnknownRenderKind` for a parameter with an unknown kind override
    pub fn parse(&self, text: &str) -> Result<Node> {
        let mut parser = Parser {
            chars: text.chars().collect(),
            pos: 0,
            options: self.options,
            rewriter: self.rewriter.as_deref(),
        };
        let children = parser.parse_sequence(Stop::End)?;
        Ok(Node::Sequence(children))
    }

    /// Compile a template
    ///
    /// Errors are those of [`TemplateCompiler::parse`].
    pub fn compile(&self, text: &str) -> Result<CompiledTemplate> {
        let root = self.parse(text)?;
        trace!(target: "tessera::query", template = text, "Template compiled");
        Ok(CompiledTemplate::new(
            text.to_string(),
            root,
            Arc::clone(&self.renderer),
        ))
    }
}

/// Where a nested sequence ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    /// End of input
    End,
    /// Before a `,` or an unmatched `)`
    Argument,
    /// Before an unmatched `)`
    Group,
}

fn is_punctuation(c: char) -> bool {
    matches!(
        c,
        '-' | '+' | '(' | ')' | '*' | '=' | '>' | '<' | '!' | '/' | ',' | '.' | '|' | '&' | '%'
    )
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\n' | '\r' | '\t')
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_identifier_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Append text to the trailing `Word`, or start one
fn push_word(nodes: &mut Vec<Node>, text: &str) {
    match nodes.last_mut() {
        Some(Node::Word(word)) => word.push_str(text),
        _ => nodes.push(Node::Word(text.to_string())),
    }
}

/// Append one space unless the trailing `Word` already ends in one
fn push_space(nodes: &mut Vec<Node>) {
    match nodes.last_mut() {
        Some(Node::Word(word)) => {
            if !word.ends_with(' ') {
                word.push(' ');
            }
        }
        _ => nodes.push(Node::Word(" ".to_string())),
    }
}

struct Parser<'c> {
    chars: Vec<char>,
    pos: usize,
    options: CompilerOptions,
    rewriter: Option<&'c dyn FunctionRewriter>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn parse_sequence(&mut self, stop: Stop) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();
        while let Some(c) = self.peek() {
            match (stop, c) {
                (Stop::Argument, ',' | ')') | (Stop::Group, ')') => break,
                _ => {}
            }

            if c.is_ascii_digit() {
                let number = self.parse_number();
                nodes.push(Node::Number(number));
            } else if c == '(' && stop != Stop::End {
                let group = self.parse_group()?;
                nodes.push(group);
            } else if is_space(c) {
                self.bump();
                push_space(&mut nodes);
            } else if is_punctuation(c) {
                self.bump();
                push_word(&mut nodes, c.encode_utf8(&mut [0; 4]));
            } else if is_identifier_start(c) {
                let identifier = self.parse_identifier();
                if self.peek() == Some('(') {
                    let node = self.parse_call(identifier)?;
                    nodes.push(node);
                } else {
                    push_word(&mut nodes, &identifier);
                }
            } else if c == '\'' || c == '"' {
                let quoted = self.parse_quoted()?;
                nodes.push(quoted);
            } else if c == '$' && self.options.parameters {
                let node = self.parse_parameter()?;
                nodes.push(node);
            } else if self.options.strict {
                return Err(Error::Syntax {
                    ch: c,
                    position: self.pos,
                });
            } else {
                self.bump();
                push_word(&mut nodes, c.encode_utf8(&mut [0; 4]));
            }
        }
        Ok(nodes)
    }

    fn parse_number(&mut self) -> String {
        let mut number = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '.' {
                number.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        number
    }

    fn parse_identifier(&mut self) -> String {
        let mut identifier = String::new();
        while let Some(c) = self.peek() {
            if is_identifier_part(c) {
                identifier.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        identifier
    }

    /// Parse `( ... )` inside an argument; the cursor is on `(`
    fn parse_group(&mut self) -> Result<Node> {
        let start = self.pos;
        self.bump();
        let children = self.parse_sequence(Stop::Group)?;
        match self.bump() {
            Some(')') => Ok(Node::Group(children)),
            _ => Err(Error::UnterminatedToken {
                token: "parenthesized group",
                position: start,
            }),
        }
    }

    /// Parse the argument list of `name`; the cursor is on `(`
    fn parse_call(&mut self, name: String) -> Result<Node> {
        let start = self.pos - name.chars().count();
        self.bump();

        let mut args = Vec::new();
        if self.peek() == Some(')') {
            self.bump();
        } else {
            loop {
                let arg = self.parse_sequence(Stop::Argument)?;
                args.push(Node::Sequence(arg));
                match self.bump() {
                    Some(',') => continue,
                    Some(')') => break,
                    _ => {
                        return Err(Error::UnterminatedToken {
                            token: "function call",
                            position: start,
                        })
                    }
                }
            }
        }

        let call = FunctionCall::new(name, args);
        Ok(match self.rewriter {
            Some(rewriter) => rewriter.rewrite(call),
            None => Node::FunctionCall(call),
        })
    }

    /// Parse a quoted literal; the cursor is on the opening delimiter
    fn parse_quoted(&mut self) -> Result<Node> {
        let start = self.pos;
        let delimiter = self.bump().unwrap_or('\'');
        let mut text = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(Error::UnterminatedToken {
                        token: "quoted literal",
                        position: start,
                    })
                }
                Some(c) if c == delimiter => {
                    if self.peek() == Some(delimiter) {
                        self.bump();
                        text.push(delimiter);
                    } else {
                        return Ok(Node::Quoted { text, delimiter });
                    }
                }
                Some(c) => text.push(c),
            }
        }
    }

    /// Parse `$names$` or `$$`; the cursor is on the first `$`
    fn parse_parameter(&mut self) -> Result<Node> {
        let start = self.pos;
        self.bump();
        if self.peek() == Some('$') {
            self.bump();
            return Ok(Node::Literal("$".to_string()));
        }

        let mut buffer = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(Error::UnterminatedToken {
                        token: "parameter",
                        position: start,
                    })
                }
                Some('$') => break,
                Some(c) => buffer.push(c),
            }
        }

        let names: Vec<String> = buffer.split(',').map(str::to_string).collect();
        if names[0].trim().is_empty() {
            return Err(Error::Syntax {
                ch: '$',
                position: start,
            });
        }
        Ok(Node::Parameter(Parameter::new(names)?))
    }
}
