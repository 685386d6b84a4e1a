//! Structured block tree shared by the nginx and Apache dialects.
//!
//! The tree only knows directives, blocks and comments. Arguments are kept
//! exactly as written (quotes included) so an untouched file dumps back to
//! an equivalent text; use [`unquote`] to read an argument's value and
//! [`quote`] when writing one.

pub mod apache;
pub mod nginx;

use std::path::{Path, PathBuf};

use crate::error::WebserverError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Nginx,
    Apache,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Directive(Directive),
    Block(Block),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub name: String,
    pub args: Vec<String>,
}

impl Directive {
    pub fn new(name: &str, args: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            args: args.iter().map(|a| quote(a)).collect(),
        }
    }

    /// Case-insensitive name match.
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Argument `i` with surrounding quotes removed.
    pub fn arg(&self, i: usize) -> Option<String> {
        self.args.get(i).map(|a| unquote(a))
    }

    pub fn values(&self) -> Vec<String> {
        self.args.iter().map(|a| unquote(a)).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub name: String,
    pub args: Vec<String>,
    pub children: Vec<Node>,
}

impl Block {
    pub fn new(name: &str, args: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            args: args.iter().map(|a| quote(a)).collect(),
            children: Vec::new(),
        }
    }

    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn values(&self) -> Vec<String> {
        self.args.iter().map(|a| unquote(a)).collect()
    }

    pub fn directives<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Directive> + 'a {
        self.children.iter().filter_map(move |n| match n {
            Node::Directive(d) if d.is(name) => Some(d),
            _ => None,
        })
    }

    pub fn directive(&self, name: &str) -> Option<&Directive> {
        self.children.iter().find_map(|n| match n {
            Node::Directive(d) if d.is(name) => Some(d),
            _ => None,
        })
    }

    pub fn blocks<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Block> + 'a {
        self.children.iter().filter_map(move |n| match n {
            Node::Block(b) if b.is(name) => Some(b),
            _ => None,
        })
    }

    /// Set `name` to `args`: replaces a single existing directive, collapses
    /// several into the first one, or appends a new one.
    pub fn upsert_directive(&mut self, name: &str, args: &[&str]) {
        let replacement = Directive::new(name, args);
        let mut seen = false;
        self.children.retain_mut(|node| match node {
            Node::Directive(d) if d.is(name) => {
                if seen {
                    return false;
                }
                seen = true;
                *d = replacement.clone();
                true
            }
            _ => true,
        });
        if !seen {
            self.children.push(Node::Directive(replacement));
        }
    }

    /// Remove every direct child directive named `name`. Returns how many went.
    pub fn remove_directives(&mut self, name: &str) -> usize {
        let before = self.children.len();
        self.children
            .retain(|n| !matches!(n, Node::Directive(d) if d.is(name)));
        before - self.children.len()
    }

    pub fn remove_directives_where(&mut self, pred: impl Fn(&Directive) -> bool) -> usize {
        let before = self.children.len();
        self.children
            .retain(|n| !matches!(n, Node::Directive(d) if pred(d)));
        before - self.children.len()
    }

    pub fn remove_blocks_where(&mut self, pred: impl Fn(&Block) -> bool) -> usize {
        let before = self.children.len();
        self.children.retain(|n| !matches!(n, Node::Block(b) if pred(b)));
        before - self.children.len()
    }
}

/// Index path from the file's top-level nodes down to a block.
pub type BlockPath = Vec<usize>;

/// Every block named `name` under `nodes`, depth first, including nested ones.
pub fn find_blocks(nodes: &[Node], name: &str) -> Vec<BlockPath> {
    let mut out = Vec::new();
    walk_blocks(nodes, name, &mut Vec::new(), &mut out);
    out
}

fn walk_blocks(nodes: &[Node], name: &str, prefix: &mut Vec<usize>, out: &mut Vec<BlockPath>) {
    for (i, node) in nodes.iter().enumerate() {
        if let Node::Block(block) = node {
            prefix.push(i);
            if block.is(name) {
                out.push(prefix.clone());
            } else {
                walk_blocks(&block.children, name, prefix, out);
            }
            prefix.pop();
        }
    }
}

/// Every directive named `name` anywhere under `nodes`.
pub fn find_directives<'a>(nodes: &'a [Node], name: &str) -> Vec<&'a Directive> {
    let mut out = Vec::new();
    for node in nodes {
        match node {
            Node::Directive(d) if d.is(name) => out.push(d),
            Node::Block(b) => out.extend(find_directives(&b.children, name)),
            _ => {}
        }
    }
    out
}

/// One configuration file and its parsed tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub path: PathBuf,
    pub dialect: Dialect,
    pub nodes: Vec<Node>,
}

impl ConfigFile {
    pub fn load(path: &Path, dialect: Dialect) -> Result<Self, WebserverError> {
        let text = std::fs::read_to_string(path).map_err(|source| WebserverError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, dialect, &text)
    }

    pub fn parse(path: &Path, dialect: Dialect, text: &str) -> Result<Self, WebserverError> {
        let nodes = match dialect {
            Dialect::Nginx => nginx::parse(text),
            Dialect::Apache => apache::parse(text),
        }
        .map_err(|e| WebserverError::Parse {
            path: path.to_path_buf(),
            line: e.line,
            message: e.message,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            dialect,
            nodes,
        })
    }

    pub fn dump(&self) -> String {
        match self.dialect {
            Dialect::Nginx => nginx::dump(&self.nodes),
            Dialect::Apache => apache::dump(&self.nodes),
        }
    }

    pub fn save(&self) -> Result<(), WebserverError> {
        std::fs::write(&self.path, self.dump()).map_err(|source| WebserverError::Io {
            path: self.path.clone(),
            source,
        })
    }

    pub fn block(&self, path: &[usize]) -> Option<&Block> {
        let (first, rest) = path.split_first()?;
        let mut block = match self.nodes.get(*first)? {
            Node::Block(b) => b,
            _ => return None,
        };
        for i in rest {
            block = match block.children.get(*i)? {
                Node::Block(b) => b,
                _ => return None,
            };
        }
        Some(block)
    }

    pub fn block_mut(&mut self, path: &[usize]) -> Option<&mut Block> {
        let (first, rest) = path.split_first()?;
        let mut block = match self.nodes.get_mut(*first)? {
            Node::Block(b) => b,
            _ => return None,
        };
        for i in rest {
            block = match block.children.get_mut(*i)? {
                Node::Block(b) => b,
                _ => return None,
            };
        }
        Some(block)
    }
}

/// Parser failure position.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Strip one level of matching quotes and unescape `\"` / `\'`.
pub fn unquote(raw: &str) -> String {
    let bytes = raw.as_bytes();
    if bytes.len() >= 2 {
        let q = bytes[0];
        if (q == b'"' || q == b'\'') && bytes[bytes.len() - 1] == q {
            let inner = &raw[1..raw.len() - 1];
            let mut out = String::with_capacity(inner.len());
            let mut chars = inner.chars();
            while let Some(c) = chars.next() {
                if c == '\\' {
                    match chars.next() {
                        Some(next) if next == q as char || next == '\\' => out.push(next),
                        Some(next) => {
                            out.push('\\');
                            out.push(next);
                        }
                        None => out.push('\\'),
                    }
                } else {
                    out.push(c);
                }
            }
            return out;
        }
    }
    raw.to_string()
}

/// Quote `value` when it would not survive as a bare word.
pub fn quote(value: &str) -> String {
    let needs = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, ';' | '{' | '}' | '#' | '"' | '\''));
    if !needs {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}
