pub mod lexer;
pub mod sexp;

// Re-export for convenience
pub use lexer::{tokenize, Token, TokenKind};
pub use sexp::{
    is_element, parse, parse_str, render, Atom, Document, ListNode, Location, Node, ParseError,
};
