//! Tokenizer for KiCad S-expression text.
//!
//! Every token remembers the exact whitespace that preceded it, so the tree
//! builder can attach it to the node and the serializer can reproduce the
//! source byte-for-byte.

use crate::parser::sexp::{Location, ParseError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Open,
    Close,
    Atom {
        value: String,
        quoted: bool,
        /// Text between the quotes exactly as written, escapes included.
        raw: Option<String>,
    },
    /// End of input. Its leading whitespace is whatever follows the last form.
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub leading_whitespace: String,
    pub location: Location,
}

/// Split `text` into tokens, failing on unbalanced parentheses or an
/// unterminated quoted atom.
pub fn tokenize(text: &str) -> Result<Vec<Token>, ParseError> {
    Lexer::new(text).run()
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    open: Vec<Location>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
            column: 1,
            open: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();

        loop {
            let leading_whitespace = self.take_whitespace();
            let location = self.location();

            let Some(ch) = self.peek() else {
                if let Some(open) = self.open.last() {
                    return Err(ParseError::UnclosedList(*open));
                }
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    leading_whitespace,
                    location,
                });
                return Ok(tokens);
            };

            let kind = match ch {
                '(' => {
                    self.advance();
                    self.open.push(location);
                    TokenKind::Open
                }
                ')' => {
                    self.advance();
                    if self.open.pop().is_none() {
                        return Err(ParseError::UnmatchedClose(location));
                    }
                    TokenKind::Close
                }
                '"' => self.quoted(location)?,
                _ => self.bare(),
            };

            tokens.push(Token {
                kind,
                leading_whitespace,
                location,
            });
        }
    }

    fn quoted(&mut self, start: Location) -> Result<TokenKind, ParseError> {
        self.advance();
        let content_start = self.pos;
        let mut value = String::new();

        loop {
            let end = self.pos;
            match self.advance() {
                None => return Err(ParseError::UnterminatedString(start)),
                Some('"') => {
                    return Ok(TokenKind::Atom {
                        value,
                        quoted: true,
                        raw: Some(self.input[content_start..end].to_string()),
                    });
                }
                Some('\\') => match self.advance() {
                    None => return Err(ParseError::UnterminatedString(start)),
                    Some('"') => value.push('"'),
                    Some('\\') => value.push('\\'),
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some(other) => {
                        value.push('\\');
                        value.push(other);
                    }
                },
                Some(ch) => value.push(ch),
            }
        }
    }

    /// A bare atom ends at whitespace or an unescaped parenthesis. `\(`
    /// stays part of the atom and its text is kept as written.
    fn bare(&mut self) -> TokenKind {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() || ch == '(' || ch == ')' {
                break;
            }
            self.advance();
            if ch == '\\' {
                self.advance();
            }
        }

        TokenKind::Atom {
            value: self.input[start..self.pos].to_string(),
            quoted: false,
            raw: None,
        }
    }

    fn take_whitespace(&mut self) -> String {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.advance();
        }
        self.input[start..self.pos].to_string()
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn location(&self) -> Location {
        Location {
            line: self.line,
            column: self.column,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        tokenize(text)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_tokenize_list() {
        let tokens = tokenize("(at 1.27 -2.54)").unwrap();
        assert_eq!(tokens.len(), 6);
        assert_eq!(tokens[0].kind, TokenKind::Open);
        assert_eq!(
            tokens[1].kind,
            TokenKind::Atom {
                value: "at".to_string(),
                quoted: false,
                raw: None
            }
        );
        assert_eq!(tokens[2].leading_whitespace, " ");
        assert_eq!(tokens[4].kind, TokenKind::Close);
        assert_eq!(tokens[5].kind, TokenKind::Eof);
    }

    #[test]
    fn test_whitespace_is_captured() {
        let tokens = tokenize("(a\n\t  b )\n").unwrap();
        assert_eq!(tokens[2].leading_whitespace, "\n\t  ");
        assert_eq!(tokens[3].leading_whitespace, " ");
        assert_eq!(tokens[4].leading_whitespace, "\n");
    }

    #[test]
    fn test_quoted_escapes() {
        let tokens = tokenize(r#""say \"hi\" \\ \q""#).unwrap();
        assert_eq!(
            tokens[0].kind,
            TokenKind::Atom {
                value: r#"say "hi" \ \q"#.to_string(),
                quoted: true,
                raw: Some(r#"say \"hi\" \\ \q"#.to_string()),
            }
        );
    }

    #[test]
    fn test_quoted_atom_keeps_parens_and_spaces() {
        let kinds = kinds(r#"(property "asm (x) y" "")"#);
        assert!(matches!(
            &kinds[2],
            TokenKind::Atom { value, quoted: true, .. } if value == "asm (x) y"
        ));
        assert!(matches!(
            &kinds[3],
            TokenKind::Atom { value, quoted: true, .. } if value.is_empty()
        ));
    }

    #[test]
    fn test_bare_atom_with_escaped_parens() {
        let kinds = kinds(r"(x a\(b\) c)");
        assert_eq!(kinds.len(), 6);
        assert_eq!(
            kinds[2],
            TokenKind::Atom {
                value: r"a\(b\)".to_string(),
                quoted: false,
                raw: None
            }
        );
        assert!(matches!(
            &kinds[3],
            TokenKind::Atom { value, quoted: false, .. } if value == "c"
        ));
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("(property \"Value").unwrap_err();
        assert_eq!(
            err,
            ParseError::UnterminatedString(Location { line: 1, column: 11 })
        );
    }

    #[test]
    fn test_unmatched_close() {
        let err = tokenize("(a)\n)").unwrap_err();
        assert_eq!(err, ParseError::UnmatchedClose(Location { line: 2, column: 1 }));
    }

    #[test]
    fn test_unclosed_list() {
        let err = tokenize("(a\n  (b c)").unwrap_err();
        assert_eq!(err, ParseError::UnclosedList(Location { line: 1, column: 1 }));
    }
}
