//! KiAsm - assembly variants for KiCad projects
//!
//! This library switches a KiCad project between assembly variants. A
//! variant is a prefix; symbols carry per-variant values in properties
//! named `"<prefix> <field>"` (for example `"lite Value"` or `"lite dnp"`).
//! Switching copies the selected variant's values onto the live fields and
//! the board footprints, rewriting the files losslessly.
//!
//! # Quick Start
//!
//! ```no_run
//! use kiasm::{KiAsmCore, VariantOptions};
//! use std::path::Path;
//!
//! let report = KiAsmCore::switch_project(
//!     Path::new("my_board"),
//!     "lite",
//!     &VariantOptions::default(),
//! ).unwrap();
//!
//! println!("{} -> {}: {} fields updated", report.previous, report.variant, report.updated);
//! ```
//!
//! # Features
//!
//! - **Lossless S-expressions**: untouched text re-renders byte-for-byte
//! - **Reversible switching**: live values are stored back before switching
//! - **Board sync**: footprint values follow the schematic
//! - **Export**: one independent project copy per variant

pub mod board;
pub mod core;
pub mod parser;
pub mod project;
pub mod variant;

// Re-export main types
pub use core::{KiAsmCore, KiAsmError, SwitchReport, VariantOptions};
pub use parser::sexp::{Document, ParseError};
pub use project::{list_variants, VariantSummary};
pub use variant::{interpret_as_yes_no, SynthesisLayout, VariantError};

/// Parse a schematic or board file into a lossless tree (convenience wrapper).
pub fn parse_file(path: &std::path::Path) -> Result<Document, KiAsmError> {
    let content = std::fs::read_to_string(path)?;
    parser::parse_str(&content).map_err(|source| KiAsmError::MalformedInput {
        path: path.to_path_buf(),
        source,
    })
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        list_variants, KiAsmCore, KiAsmError, SwitchReport, SynthesisLayout, VariantOptions,
        VariantSummary,
    };
}
