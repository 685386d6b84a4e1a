//! Apache tag syntax: `Name args` lines and `<Section args> ... </Section>`.

use super::{Block, Directive, Node, ParseError};

/// Split a directive line into words, keeping quoted words intact.
fn split_words(line: &str, line_no: usize) -> Result<Vec<String>, ParseError> {
    let mut words = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut word = String::new();
        if c == '"' || c == '\'' {
            let quote = c;
            word.push(c);
            chars.next();
            let mut closed = false;
            while let Some(q) = chars.next() {
                word.push(q);
                if q == '\\' {
                    if let Some(escaped) = chars.next() {
                        word.push(escaped);
                    }
                    continue;
                }
                if q == quote {
                    closed = true;
                    break;
                }
            }
            if !closed {
                return Err(ParseError::new(line_no, "unterminated quoted string"));
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                word.push(c);
                chars.next();
            }
        }
        words.push(word);
    }
    Ok(words)
}

/// Logical lines with `\` continuations joined; each keeps its first line number.
fn logical_lines(text: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = raw.trim_end();
        let (body, continues) = match trimmed.strip_suffix('\\') {
            Some(body) => (body, true),
            None => (trimmed, false),
        };
        let entry = match pending.take() {
            Some((start, mut acc)) => {
                acc.push(' ');
                acc.push_str(body.trim_start());
                (start, acc)
            }
            None => (line_no, body.to_string()),
        };
        if continues {
            pending = Some(entry);
        } else {
            out.push(entry);
        }
    }
    if let Some(entry) = pending {
        out.push(entry);
    }
    out
}

/// Parse Apache configuration text into a node list.
pub fn parse(text: &str) -> Result<Vec<Node>, ParseError> {
    // Stack of open sections; the bottom entry collects top-level nodes.
    let mut stack: Vec<(Block, usize)> = vec![(Block::new("", &[]), 0)];

    for (line_no, line) in logical_lines(text) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(comment) = line.strip_prefix('#') {
            push_node(&mut stack, Node::Comment(comment.trim().to_string()));
            continue;
        }

        if let Some(rest) = line.strip_prefix("</") {
            let name = rest.trim_end_matches('>').trim();
            let unexpected = || ParseError::new(line_no, format!("unexpected </{name}>"));
            if stack.len() < 2 {
                return Err(unexpected());
            }
            let Some((block, open_line)) = stack.pop() else {
                return Err(unexpected());
            };
            if !block.is(name) {
                return Err(ParseError::new(
                    line_no,
                    format!(
                        "</{name}> does not close <{}> opened on line {open_line}",
                        block.name
                    ),
                ));
            }
            push_node(&mut stack, Node::Block(block));
            continue;
        }

        if let Some(rest) = line.strip_prefix('<') {
            let inner = rest
                .strip_suffix('>')
                .ok_or_else(|| ParseError::new(line_no, "section tag is missing '>'"))?;
            let mut words = split_words(inner, line_no)?.into_iter();
            let name = words
                .next()
                .ok_or_else(|| ParseError::new(line_no, "empty section tag"))?;
            stack.push((
                Block {
                    name,
                    args: words.collect(),
                    children: Vec::new(),
                },
                line_no,
            ));
            continue;
        }

        let mut words = split_words(line, line_no)?.into_iter();
        if let Some(name) = words.next() {
            push_node(
                &mut stack,
                Node::Directive(Directive {
                    name,
                    args: words.collect(),
                }),
            );
        }
    }

    if stack.len() > 1 {
        let (block, open_line) = &stack[stack.len() - 1];
        return Err(ParseError::new(
            *open_line,
            format!("<{}> is never closed", block.name),
        ));
    }
    Ok(stack
        .pop()
        .map(|(root, _)| root.children)
        .unwrap_or_default())
}

fn push_node(stack: &mut [(Block, usize)], node: Node) {
    if let Some((top, _)) = stack.last_mut() {
        top.children.push(node);
    }
}

/// Render nodes back to Apache syntax with four-space indentation.
pub fn dump(nodes: &[Node]) -> String {
    let mut out = String::new();
    dump_into(nodes, 0, &mut out);
    out
}

fn dump_into(nodes: &[Node], depth: usize, out: &mut String) {
    let indent = "    ".repeat(depth);
    for node in nodes {
        out.push_str(&indent);
        match node {
            Node::Comment(c) => {
                out.push('#');
                if !c.is_empty() {
                    out.push(' ');
                    out.push_str(c);
                }
            }
            Node::Directive(d) => {
                out.push_str(&d.name);
                for arg in &d.args {
                    out.push(' ');
                    out.push_str(arg);
                }
            }
            Node::Block(b) => {
                out.push('<');
                out.push_str(&b.name);
                for arg in &b.args {
                    out.push(' ');
                    out.push_str(arg);
                }
                out.push_str(">\n");
                dump_into(&b.children, depth + 1, out);
                out.push_str(&indent);
                out.push_str("</");
                out.push_str(&b.name);
                out.push('>');
            }
        }
        out.push('\n');
    }
}
