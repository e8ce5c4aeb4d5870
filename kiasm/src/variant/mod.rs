//! Assembly variants on schematic trees.
//!
//! A variant is a prefix. Symbols declare per-variant values in properties
//! named `"<prefix> <field>"`; switching to a variant first stores the live
//! values into the active variant's slots ([`store`]) and then copies the
//! new variant's values onto the live fields ([`resolver`]).

pub mod resolver;
pub mod store;

use std::collections::HashMap;
use thiserror::Error;

use crate::parser::sexp::{Document, ListNode};

pub use resolver::{
    augment_symbol, collect_attributes, interpret_as_yes_no, split_scoped_name, AugmentReport,
    InvalidBooleanValue, Position, SynthesisLayout, VariantError, SPECIAL_FIELDS,
};
pub use store::{live_value, store_symbol};

/// Variant assumed active when the project records none.
pub const DEFAULT_VARIANT: &str = "def";

/// A [`VariantError`] together with the symbol it happened on.
#[derive(Debug, Error)]
#[error("symbol {reference}: {source}")]
pub struct SymbolError {
    pub reference: String,
    #[source]
    pub source: VariantError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchematicReport {
    pub symbols: usize,
    pub updated: usize,
    pub synthesized: usize,
}

/// Placed symbol instances: the `symbol` children of every top-level form.
/// Library definitions nested inside `lib_symbols` are not included.
pub fn symbols(document: &Document) -> impl Iterator<Item = &ListNode> {
    document
        .forms()
        .flat_map(|form| form.children("symbol"))
}

pub fn symbols_mut(document: &mut Document) -> impl Iterator<Item = &mut ListNode> {
    document.forms_mut().flat_map(|form| {
        form.items
            .iter_mut()
            .filter_map(|node| node.as_list_mut())
            .filter(|list| list.is("symbol"))
    })
}

/// The symbol's `Reference` property, or `?` when it has none.
pub fn symbol_reference(symbol: &ListNode) -> &str {
    live_value(symbol, "Reference").unwrap_or("?")
}

/// `Reference -> Value` for every symbol with a reference. A symbol
/// without a `Value` maps to an empty value.
pub fn symbol_values(document: &Document) -> HashMap<String, String> {
    symbols(document)
        .filter_map(|symbol| {
            let reference = live_value(symbol, "Reference")?;
            let value = live_value(symbol, "Value").unwrap_or_default();
            Some((reference.to_string(), value.to_string()))
        })
        .collect()
}

/// Apply `prefix` to every symbol of a schematic.
pub fn augment_schematic(
    document: &mut Document,
    prefix: &str,
    fields: &[String],
    layout: &SynthesisLayout,
) -> Result<SchematicReport, SymbolError> {
    let mut report = SchematicReport::default();
    for symbol in symbols_mut(document) {
        let result = augment_symbol(symbol, prefix, fields, layout).map_err(|source| {
            SymbolError {
                reference: symbol_reference(symbol).to_string(),
                source,
            }
        })?;
        report.symbols += 1;
        report.updated += result.updated;
        report.synthesized += result.synthesized.len();
    }
    Ok(report)
}

/// Store live values into the `current_prefix` slots of every symbol.
pub fn store_schematic(document: &mut Document, current_prefix: &str, fields: &[String]) -> usize {
    symbols_mut(document)
        .map(|symbol| store_symbol(symbol, current_prefix, fields))
        .sum()
}
