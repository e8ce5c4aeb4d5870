//! Footprint value synchronization.
//!
//! After a schematic switch the board's footprint values must follow the
//! symbols' `Value` fields. The board is reached through the [`BoardStore`]
//! trait; [`KicadBoardStore`] edits `.kicad_pcb` text with the same lossless
//! S-expression tree used for schematics, so nothing but the values changes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::parser::sexp::{parse_str, render, Document, ListNode, ParseError};

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("S-expression parse error: {0}")]
    SExpParse(#[from] ParseError),
    #[error("Invalid board format: {0}")]
    InvalidFormat(String),
}

/// A footprint on a loaded board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FootprintRef {
    pub reference: String,
    pub value: Option<String>,
    /// Store-specific position of the footprint inside the board.
    pub locator: (usize, usize),
}

/// Access to a board file.
pub trait BoardStore {
    type Board;

    fn load_board(&self, path: &Path) -> Result<Self::Board, BoardError>;

    fn footprints(&self, board: &Self::Board) -> Vec<FootprintRef>;

    /// Set the footprint's value. Returns `true` when it changed.
    fn set_value(&self, board: &mut Self::Board, footprint: &FootprintRef, value: &str) -> bool;

    /// Serialized board contents, ready to be written back to its path.
    fn save(&self, board: &Self::Board) -> String;
}

/// Set every footprint's value to the value of the symbol with the same
/// reference. Footprints without a matching symbol are left alone.
pub fn update_board<S: BoardStore>(
    store: &S,
    board: &mut S::Board,
    values: &HashMap<String, String>,
) -> usize {
    let mut changed = 0;
    for footprint in store.footprints(board) {
        let Some(value) = values.get(&footprint.reference) else {
            continue;
        };
        if store.set_value(board, &footprint, value) {
            tracing::debug!(
                "Footprint {}: value {:?} -> {:?}",
                footprint.reference,
                footprint.value,
                value
            );
            changed += 1;
        }
    }
    changed
}

/// A parsed `.kicad_pcb` file.
#[derive(Debug, Clone)]
pub struct KicadBoard {
    pub path: PathBuf,
    pub document: Document,
}

/// [`BoardStore`] over KiCad 6+ board files.
#[derive(Debug, Clone, Copy, Default)]
pub struct KicadBoardStore;

#[derive(Clone, Copy)]
enum TextField {
    Reference,
    Value,
}

impl TextField {
    fn property_name(self) -> &'static str {
        match self {
            TextField::Reference => "Reference",
            TextField::Value => "Value",
        }
    }

    fn fp_text_kind(self) -> &'static str {
        match self {
            TextField::Reference => "reference",
            TextField::Value => "value",
        }
    }
}

/// Index of the child holding `field`: `(property "Value" "..." ...)` on
/// KiCad 8+, `(fp_text value "..." ...)` on KiCad 6/7. The text is item 2.
fn field_index(footprint: &ListNode, field: TextField) -> Option<usize> {
    footprint.items.iter().position(|node| {
        let Some(list) = node.as_list() else {
            return false;
        };
        let key = list.atom(1).map(|a| a.value());
        (list.is("property") && key == Some(field.property_name()))
            || (list.is("fp_text") && key == Some(field.fp_text_kind()))
    })
}

fn field_text(footprint: &ListNode, field: TextField) -> Option<&str> {
    let index = field_index(footprint, field)?;
    footprint.items[index]
        .as_list()
        .and_then(|list| list.atom(2))
        .map(|atom| atom.value())
}

impl KicadBoardStore {
    pub fn load_str(&self, content: &str, path: &Path) -> Result<KicadBoard, BoardError> {
        let document = parse_str(content)?;
        let is_board = document.forms().next().is_some_and(|root| root.is("kicad_pcb"));
        if !is_board {
            return Err(BoardError::InvalidFormat(
                "Expected kicad_pcb root".to_string(),
            ));
        }
        Ok(KicadBoard {
            path: path.to_path_buf(),
            document,
        })
    }

    fn footprint_mut<'a>(
        &self,
        board: &'a mut KicadBoard,
        locator: (usize, usize),
    ) -> Option<&'a mut ListNode> {
        board
            .document
            .items
            .get_mut(locator.0)?
            .as_list_mut()?
            .items
            .get_mut(locator.1)?
            .as_list_mut()
    }
}

impl BoardStore for KicadBoardStore {
    type Board = KicadBoard;

    fn load_board(&self, path: &Path) -> Result<KicadBoard, BoardError> {
        let content = std::fs::read_to_string(path)?;
        self.load_str(&content, path)
    }

    fn footprints(&self, board: &KicadBoard) -> Vec<FootprintRef> {
        let mut footprints = Vec::new();
        for (form_index, form) in board.document.items.iter().enumerate() {
            let Some(form) = form.as_list().filter(|list| list.is("kicad_pcb")) else {
                continue;
            };
            for (item_index, item) in form.items.iter().enumerate() {
                let Some(footprint) = item
                    .as_list()
                    .filter(|list| list.is("footprint") || list.is("module"))
                else {
                    continue;
                };
                let Some(reference) = field_text(footprint, TextField::Reference) else {
                    continue;
                };
                footprints.push(FootprintRef {
                    reference: reference.to_string(),
                    value: field_text(footprint, TextField::Value).map(str::to_string),
                    locator: (form_index, item_index),
                });
            }
        }
        footprints
    }

    fn set_value(&self, board: &mut KicadBoard, footprint: &FootprintRef, value: &str) -> bool {
        let Some(node) = self.footprint_mut(board, footprint.locator) else {
            return false;
        };
        let Some(index) = field_index(node, TextField::Value) else {
            tracing::warn!("Footprint {} has no value field", footprint.reference);
            return false;
        };
        node.items[index]
            .as_list_mut()
            .and_then(|list| list.atom_mut(2))
            .is_some_and(|atom| atom.set_value(value))
    }

    fn save(&self, board: &KicadBoard) -> String {
        render(&board.document)
    }
}
