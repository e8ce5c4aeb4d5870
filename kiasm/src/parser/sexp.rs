//! Lossless S-expression tree.
//!
//! Whitespace is data here: every node carries the whitespace that preceded
//! it, and lists carry the whitespace before their closing parenthesis.
//! Rendering an untouched [`Document`] yields the exact source text.

use std::fmt;
use thiserror::Error;

use crate::parser::lexer::{tokenize, Token, TokenKind};

/// 1-based line and column in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Unterminated quoted atom starting at {0}")]
    UnterminatedString(Location),
    #[error("Unmatched ')' at {0}")]
    UnmatchedClose(Location),
    #[error("Unclosed '(' opened at {0}")]
    UnclosedList(Location),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    value: String,
    raw: Option<String>,
    pub quoted: bool,
    pub leading_whitespace: String,
    pub trailing_whitespace: String,
}

impl Atom {
    pub fn bare(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            raw: None,
            quoted: false,
            leading_whitespace: String::new(),
            trailing_whitespace: String::new(),
        }
    }

    pub fn quoted(value: impl Into<String>) -> Self {
        Self {
            quoted: true,
            ..Self::bare(value)
        }
    }

    pub fn with_leading(mut self, whitespace: impl Into<String>) -> Self {
        self.leading_whitespace = whitespace.into();
        self
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Rewrite the atom's value. Returns `false` when the value was already
    /// equal, in which case the atom (and its original spelling) is untouched.
    pub fn set_value(&mut self, value: impl Into<String>) -> bool {
        let value = value.into();
        if value == self.value {
            return false;
        }
        if !self.quoted && needs_quotes(&value) {
            self.quoted = true;
        }
        self.value = value;
        self.raw = None;
        true
    }
}

fn needs_quotes(value: &str) -> bool {
    value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '(' || c == ')' || c == '"')
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListNode {
    pub items: Vec<Node>,
    pub leading_whitespace: String,
    pub trailing_whitespace: String,
}

impl ListNode {
    pub fn new(items: Vec<Node>) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    pub fn with_leading(mut self, whitespace: impl Into<String>) -> Self {
        self.leading_whitespace = whitespace.into();
        self
    }

    pub fn with_trailing(mut self, whitespace: impl Into<String>) -> Self {
        self.trailing_whitespace = whitespace.into();
        self
    }

    /// Value of the first item when it is an atom, e.g. `symbol` in `(symbol ...)`.
    pub fn tag(&self) -> Option<&str> {
        self.atom(0).map(Atom::value)
    }

    pub fn is(&self, tag: &str) -> bool {
        self.tag() == Some(tag)
    }

    pub fn atom(&self, index: usize) -> Option<&Atom> {
        self.items.get(index).and_then(Node::as_atom)
    }

    pub fn atom_mut(&mut self, index: usize) -> Option<&mut Atom> {
        self.items.get_mut(index).and_then(Node::as_atom_mut)
    }

    /// Direct children tagged `tag`.
    pub fn children<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a ListNode> + 'a {
        self.items
            .iter()
            .filter_map(Node::as_list)
            .filter(move |list| list.is(tag))
    }

    pub fn child(&self, tag: &str) -> Option<&ListNode> {
        self.items
            .iter()
            .filter_map(Node::as_list)
            .find(|list| list.is(tag))
    }

    pub fn child_mut(&mut self, tag: &str) -> Option<&mut ListNode> {
        self.items
            .iter_mut()
            .filter_map(Node::as_list_mut)
            .find(|list| list.is(tag))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Atom(Atom),
    List(ListNode),
}

impl Node {
    pub fn as_atom(&self) -> Option<&Atom> {
        match self {
            Node::Atom(atom) => Some(atom),
            _ => None,
        }
    }

    pub fn as_atom_mut(&mut self) -> Option<&mut Atom> {
        match self {
            Node::Atom(atom) => Some(atom),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListNode> {
        match self {
            Node::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut ListNode> {
        match self {
            Node::List(list) => Some(list),
            _ => None,
        }
    }
}

impl From<Atom> for Node {
    fn from(atom: Atom) -> Self {
        Node::Atom(atom)
    }
}

impl From<ListNode> for Node {
    fn from(list: ListNode) -> Self {
        Node::List(list)
    }
}

/// Predicate matching lists whose first item is the atom `tag`.
pub fn is_element(tag: &str) -> impl Fn(&Node) -> bool + '_ {
    move |node| node.as_list().is_some_and(|list| list.is(tag))
}

/// A whole file: the implicit sequence of top-level forms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub items: Vec<Node>,
    pub trailing_whitespace: String,
}

impl Document {
    pub fn forms(&self) -> impl Iterator<Item = &ListNode> {
        self.items.iter().filter_map(Node::as_list)
    }

    pub fn forms_mut(&mut self) -> impl Iterator<Item = &mut ListNode> {
        self.items.iter_mut().filter_map(Node::as_list_mut)
    }
}

/// Build a tree from a token stream. A missing trailing `Eof` token is
/// treated as end of input with no trailing whitespace.
pub fn parse(tokens: impl IntoIterator<Item = Token>) -> Result<Document, ParseError> {
    let mut stack: Vec<(ListNode, Location)> = Vec::new();
    let mut top: Vec<Node> = Vec::new();
    let mut trailing_whitespace = String::new();

    for token in tokens {
        match token.kind {
            TokenKind::Open => {
                let frame = ListNode::default().with_leading(token.leading_whitespace);
                stack.push((frame, token.location));
            }
            TokenKind::Atom { value, quoted, raw } => {
                let atom = Atom {
                    value,
                    raw,
                    quoted,
                    leading_whitespace: token.leading_whitespace,
                    trailing_whitespace: String::new(),
                };
                push_node(&mut stack, &mut top, Node::Atom(atom));
            }
            TokenKind::Close => {
                let (mut list, _) = stack
                    .pop()
                    .ok_or(ParseError::UnmatchedClose(token.location))?;
                list.trailing_whitespace = token.leading_whitespace;
                push_node(&mut stack, &mut top, Node::List(list));
            }
            TokenKind::Eof => {
                trailing_whitespace = token.leading_whitespace;
                break;
            }
        }
    }

    if let Some((_, opened)) = stack.last() {
        return Err(ParseError::UnclosedList(*opened));
    }

    Ok(Document {
        items: top,
        trailing_whitespace,
    })
}

fn push_node(stack: &mut [(ListNode, Location)], top: &mut Vec<Node>, node: Node) {
    match stack.last_mut() {
        Some((parent, _)) => parent.items.push(node),
        None => top.push(node),
    }
}

/// Tokenize and parse in one step.
pub fn parse_str(text: &str) -> Result<Document, ParseError> {
    parse(tokenize(text)?)
}

/// Serialize a document back to text.
pub fn render(document: &Document) -> String {
    document.to_string()
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.leading_whitespace)?;
        if self.quoted {
            match &self.raw {
                Some(raw) => write!(f, "\"{}\"", raw)?,
                None => write!(f, "\"{}\"", escape(&self.value))?,
            }
        } else {
            f.write_str(&self.value)?;
        }
        f.write_str(&self.trailing_whitespace)
    }
}

impl fmt::Display for ListNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.leading_whitespace)?;
        for item in &self.items {
            write!(f, "{}", item)?;
        }
        write!(f, "{})", self.trailing_whitespace)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Atom(atom) => atom.fmt(f),
            Node::List(list) => list.fmt(f),
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for item in &self.items {
            write!(f, "{}", item)?;
        }
        f.write_str(&self.trailing_whitespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYMBOL: &str = r#"(kicad_sch (version 20230121) (generator eeschema)
  (symbol (lib_id "Device:R") (at 127 76.2 0) (unit 1)
    (in_bom yes) (on_board yes) (dnp no)
    (property "Reference" "R1" (at 129.54 74.93 0)
      (effects (font (size 1.27 1.27)) (justify left))
    )
  )
)
"#;

    #[test]
    fn test_round_trip() {
        let document = parse_str(SYMBOL).unwrap();
        assert_eq!(render(&document), SYMBOL);
    }

    #[test]
    fn test_round_trip_keeps_odd_spacing_and_escapes() {
        let text = "  ( a\t\"x \\q \\\"y\\\"\"(b)c )  \n\n(d)";
        let document = parse_str(text).unwrap();
        assert_eq!(document.items.len(), 2);
        assert_eq!(render(&document), text);
    }

    #[test]
    fn test_parse_structure() {
        let document = parse_str(SYMBOL).unwrap();
        let root = document.forms().next().unwrap();
        assert!(root.is("kicad_sch"));

        let symbol = root.child("symbol").unwrap();
        assert_eq!(symbol.child("at").unwrap().atom(1).unwrap().value(), "127");

        let property = symbol.child("property").unwrap();
        let name = property.atom(1).unwrap();
        assert_eq!(name.value(), "Reference");
        assert!(name.quoted);
        assert_eq!(property.leading_whitespace, "\n    ");
        assert_eq!(property.trailing_whitespace, "\n    ");
    }

    #[test]
    fn test_is_element() {
        let document = parse_str("((in_bom yes) in_bom (dnp no))").unwrap();
        let root = document.forms().next().unwrap();
        let matcher = is_element("in_bom");
        assert!(matcher(&root.items[0]));
        assert!(!matcher(&root.items[1]));
        assert!(!matcher(&root.items[2]));
    }

    #[test]
    fn test_set_value_rewrites_only_when_changed() {
        let mut document = parse_str(r#"(property "Value" "a\x")"#).unwrap();
        let property = document.forms_mut().next().unwrap();

        let atom = property.atom_mut(2).unwrap();
        assert!(!atom.set_value("a\\x"));
        assert_eq!(render(&document), r#"(property "Value" "a\x")"#);

        let property = document.forms_mut().next().unwrap();
        assert!(property.atom_mut(2).unwrap().set_value("say \"hi\""));
        assert_eq!(render(&document), r#"(property "Value" "say \"hi\"")"#);
    }

    #[test]
    fn test_set_value_quotes_bare_atoms_when_needed() {
        let mut atom = Atom::bare("yes");
        atom.set_value("two words");
        assert!(atom.quoted);
        assert_eq!(atom.to_string(), "\"two words\"");
    }

    #[test]
    fn test_parse_errors_from_token_stream() {
        let tokens = tokenize("(a b)").unwrap();
        let unbalanced: Vec<Token> = tokens.into_iter().skip(1).collect();
        assert!(matches!(
            parse(unbalanced),
            Err(ParseError::UnmatchedClose(_))
        ));

        let tokens = tokenize("(a b)").unwrap();
        let truncated: Vec<Token> = tokens.into_iter().take(2).collect();
        assert!(matches!(parse(truncated), Err(ParseError::UnclosedList(_))));
    }

    #[test]
    fn test_empty_document() {
        let document = parse_str("\n").unwrap();
        assert!(document.items.is_empty());
        assert_eq!(render(&document), "\n");
    }
}
