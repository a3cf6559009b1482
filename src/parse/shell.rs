//! Invocation parser: turns one command line into an argument vector using the
//! tree-sitter bash grammar.
//!
//! Quoting follows shell rules, but nothing is ever evaluated: variable
//! references and command substitutions are rendered back as their literal
//! source text, unquoted backslash escapes are kept verbatim, and no
//! environment lookup or process spawn happens. Only a single simple command is
//! accepted; pipelines, lists, redirections, assignments and compound
//! statements are rejected.

use tree_sitter::{Node, Parser};

use super::types::{ArgumentVector, ParseError};

/// Parse a single command line into its words.
pub fn parse(line: &str) -> Result<ArgumentVector, ParseError> {
    if line.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_bash::LANGUAGE.into())
        .map_err(|e| ParseError::Grammar(e.to_string()))?;
    let tree = parser
        .parse(line, None)
        .ok_or_else(|| ParseError::Grammar("parser returned no tree".into()))?;

    let root = tree.root_node();
    if root.has_error() {
        return Err(ParseError::Malformed(describe_error(root)));
    }

    let statement = single_statement(root)?;
    if statement.kind() != "command" {
        return Err(ParseError::Unsupported(describe_kind(statement.kind())));
    }

    let words = command_words(statement, line)?;
    ArgumentVector::new(words).ok_or(ParseError::Empty)
}

/// The one statement in the program, ignoring comments and terminators.
fn single_statement(root: Node<'_>) -> Result<Node<'_>, ParseError> {
    let mut statement = None;
    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        if !child.is_named() {
            if child.kind() == "&" {
                return Err(ParseError::Unsupported("background job".into()));
            }
            continue;
        }
        if child.kind() == "comment" {
            continue;
        }
        if statement.is_some() {
            return Err(ParseError::MultipleStatements);
        }
        statement = Some(child);
    }
    statement.ok_or(ParseError::Empty)
}

fn command_words(command: Node<'_>, src: &str) -> Result<Vec<String>, ParseError> {
    let name = command
        .child_by_field_name("name")
        .ok_or_else(|| ParseError::Unsupported("command without a name".into()))?;

    let mut cursor = command.walk();
    let arguments: Vec<Node<'_>> = command
        .children_by_field_name("argument", &mut cursor)
        .collect();

    let mut cursor = command.walk();
    for child in command.named_children(&mut cursor) {
        if child == name || child.kind() == "comment" || arguments.contains(&child) {
            continue;
        }
        return Err(ParseError::Unsupported(describe_kind(child.kind())));
    }

    let mut words = Vec::with_capacity(arguments.len() + 1);
    words.push(render(name, src));
    words.extend(arguments.iter().map(|arg| render(*arg, src)));
    Ok(words)
}

/// Render a word node as literal text.
fn render(node: Node<'_>, src: &str) -> String {
    let text = &src[node.byte_range()];
    match node.kind() {
        "command_name" => match node.named_child(0) {
            Some(inner) => render(inner, src),
            None => text.to_string(),
        },
        "string" => unescape_double_quoted(strip_delimiters(text, "\"", "\"")),
        "raw_string" => strip_delimiters(text, "'", "'").to_string(),
        "translated_string" => match node.named_child(0) {
            Some(inner) => render(inner, src),
            None => text.to_string(),
        },
        "concatenation" => render_concatenation(node, src),
        // Words, expansions, substitutions and everything else stay verbatim.
        _ => text.to_string(),
    }
}

fn render_concatenation(node: Node<'_>, src: &str) -> String {
    let mut out = String::new();
    let mut pos = node.start_byte();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        out.push_str(&src[pos..child.start_byte()]);
        out.push_str(&render(child, src));
        pos = child.end_byte();
    }
    out.push_str(&src[pos..node.end_byte()]);
    out
}

fn strip_delimiters<'a>(text: &'a str, open: &str, close: &str) -> &'a str {
    text.strip_prefix(open)
        .and_then(|t| t.strip_suffix(close))
        .unwrap_or(text)
}

/// Inside double quotes a backslash only escapes `"`, `\`, `$`, a backtick or a
/// newline; before anything else it is kept.
fn unescape_double_quoted(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some(&next @ ('"' | '\\' | '$' | '`')) => {
                out.push(next);
                chars.next();
            }
            Some('\n') => {
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}

fn describe_kind(kind: &str) -> String {
    match kind {
        "pipeline" => "pipeline".into(),
        "list" => "command list (&&, ||)".into(),
        "redirected_statement" | "file_redirect" | "heredoc_redirect" | "herestring_redirect" => {
            "redirection".into()
        }
        "variable_assignment" | "variable_assignments" => "variable assignment".into(),
        other => other.replace('_', " "),
    }
}

fn describe_error(root: Node<'_>) -> String {
    match first_error(root) {
        Some(node) if node.is_missing() => format!(
            "missing {} at column {}",
            node.kind(),
            node.start_position().column + 1
        ),
        Some(node) => format!(
            "unexpected input at column {}",
            node.start_position().column + 1
        ),
        None => "syntax error".into(),
    }
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if (child.has_error() || child.is_missing())
            && let Some(found) = first_error(child)
        {
            return Some(found);
        }
    }
    None
}
