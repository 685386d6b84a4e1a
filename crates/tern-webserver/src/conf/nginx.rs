//! nginx brace syntax: `name args;` and `name args { ... }`.

use super::{Block, Directive, Node, ParseError};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Open,
    Close,
    Semicolon,
    Comment(String),
}

fn tokenize(text: &str) -> Result<Vec<(Token, usize)>, ParseError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\n' => {
                line += 1;
                i += 1;
            }
            c if c.is_whitespace() => i += 1,
            '{' => {
                tokens.push((Token::Open, line));
                i += 1;
            }
            '}' => {
                tokens.push((Token::Close, line));
                i += 1;
            }
            ';' => {
                tokens.push((Token::Semicolon, line));
                i += 1;
            }
            '#' => {
                let start = i + 1;
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                let body: String = chars[start..i].iter().collect();
                tokens.push((Token::Comment(body.trim().to_string()), line));
            }
            _ => {
                let start_line = line;
                let mut word = String::new();
                while i < chars.len() {
                    let c = chars[i];
                    if c == '"' || c == '\'' {
                        let quote = c;
                        word.push(c);
                        i += 1;
                        let mut closed = false;
                        while i < chars.len() {
                            let q = chars[i];
                            word.push(q);
                            i += 1;
                            if q == '\\' && i < chars.len() {
                                word.push(chars[i]);
                                i += 1;
                                continue;
                            }
                            if q == '\n' {
                                line += 1;
                            }
                            if q == quote {
                                closed = true;
                                break;
                            }
                        }
                        if !closed {
                            return Err(ParseError::new(start_line, "unterminated quoted string"));
                        }
                        continue;
                    }
                    if c == '$' && chars.get(i + 1) == Some(&'{') {
                        while i < chars.len() {
                            word.push(chars[i]);
                            i += 1;
                            if chars[i - 1] == '}' {
                                break;
                            }
                        }
                        continue;
                    }
                    if c.is_whitespace() || matches!(c, '{' | '}' | ';') {
                        break;
                    }
                    word.push(c);
                    i += 1;
                }
                tokens.push((Token::Word(word), start_line));
            }
        }
    }
    Ok(tokens)
}

/// Parse nginx configuration text into a node list.
pub fn parse(text: &str) -> Result<Vec<Node>, ParseError> {
    let tokens = tokenize(text)?;
    let mut pos = 0;
    let nodes = parse_nodes(&tokens, &mut pos, false)?;
    Ok(nodes)
}

fn parse_nodes(
    tokens: &[(Token, usize)],
    pos: &mut usize,
    nested: bool,
) -> Result<Vec<Node>, ParseError> {
    let mut nodes = Vec::new();
    let mut words: Vec<String> = Vec::new();
    let mut words_line = 0;

    while *pos < tokens.len() {
        let (token, line) = &tokens[*pos];
        *pos += 1;
        match token {
            Token::Word(w) => {
                if words.is_empty() {
                    words_line = *line;
                }
                words.push(w.clone());
            }
            Token::Comment(c) => nodes.push(Node::Comment(c.clone())),
            Token::Semicolon => {
                let mut it = std::mem::take(&mut words).into_iter();
                let name = it
                    .next()
                    .ok_or_else(|| ParseError::new(*line, "unexpected ';'"))?;
                nodes.push(Node::Directive(Directive {
                    name,
                    args: it.collect(),
                }));
            }
            Token::Open => {
                let mut it = std::mem::take(&mut words).into_iter();
                let name = it
                    .next()
                    .ok_or_else(|| ParseError::new(*line, "unexpected '{'"))?;
                let children = parse_nodes(tokens, pos, true)?;
                nodes.push(Node::Block(Block {
                    name,
                    args: it.collect(),
                    children,
                }));
            }
            Token::Close => {
                if !nested {
                    return Err(ParseError::new(*line, "unexpected '}'"));
                }
                if !words.is_empty() {
                    return Err(ParseError::new(words_line, "directive is missing ';'"));
                }
                return Ok(nodes);
            }
        }
    }

    if !words.is_empty() {
        return Err(ParseError::new(words_line, "directive is missing ';'"));
    }
    if nested {
        let line = tokens.last().map(|(_, l)| *l).unwrap_or(1);
        return Err(ParseError::new(line, "unexpected end of file, expecting '}'"));
    }
    Ok(nodes)
}

/// Render nodes back to nginx syntax with four-space indentation.
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
                out.push(';');
            }
            Node::Block(b) => {
                out.push_str(&b.name);
                for arg in &b.args {
                    out.push(' ');
                    out.push_str(arg);
                }
                out.push_str(" {\n");
                dump_into(&b.children, depth + 1, out);
                out.push_str(&indent);
                out.push('}');
            }
        }
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::find_blocks;

    const SITE: &str = r#"
# default site
server {
    listen 80;
    listen [::]:80;
    server_name example.com www.example.com;
    root /var/www/example;

    location / {
        try_files $uri $uri/ =404;
    }

    location ~ \.php$ {
        fastcgi_param SCRIPT_FILENAME "${document_root}$fastcgi_script_name";
    }
    add_header X-Note "semi;colon {braces}";
}
"#;

    #[test]
    fn parses_blocks_directives_and_comments() {
        let nodes = parse(SITE).unwrap();
        assert!(matches!(&nodes[0], Node::Comment(c) if c == "default site"));

        let server = match &nodes[1] {
            Node::Block(b) => b,
            other => panic!("expected block, got {other:?}"),
        };
        assert!(server.is("server"));
        assert_eq!(server.directives("listen").count(), 2);
        assert_eq!(
            server.directive("server_name").unwrap().values(),
            vec!["example.com", "www.example.com"]
        );
        assert_eq!(server.blocks("location").count(), 2);

        let header = server.directive("add_header").unwrap();
        assert_eq!(header.arg(1).as_deref(), Some("semi;colon {braces}"));
    }

    #[test]
    fn variable_braces_stay_inside_words() {
        let nodes = parse("set $a ${b}c;\n").unwrap();
        match &nodes[0] {
            Node::Directive(d) => assert_eq!(d.args, vec!["$a", "${b}c"]),
            other => panic!("expected directive, got {other:?}"),
        }
    }

    #[test]
    fn dump_then_parse_gives_same_tree() {
        let nodes = parse(SITE).unwrap();
        let text = dump(&nodes);
        assert_eq!(parse(&text).unwrap(), nodes);
        assert!(text.contains("    listen 80;\n"));
    }

    #[test]
    fn nested_servers_are_found() {
        let nodes = parse("http {\n include mime.types;\n server { listen 80; }\n}\n").unwrap();
        assert_eq!(find_blocks(&nodes, "server"), vec![vec![0, 1]]);
    }

    #[test]
    fn reports_unbalanced_input() {
        let err = parse("server {\n listen 80;\n").unwrap_err();
        assert!(err.message.contains("expecting '}'"));

        let err = parse("listen 80;\n}\n").unwrap_err();
        assert_eq!(err.line, 2);

        let err = parse("server { listen 80 }").unwrap_err();
        assert!(err.message.contains("missing ';'"));

        assert!(parse("add_header X \"open").is_err());
    }
}
