//! Reverse rewrite: record the live values of the currently active variant.
//!
//! Running this before [`augment_symbol`](super::resolver::augment_symbol)
//! makes switching reversible: edits made to live fields while a variant
//! was active end up in that variant's `"<prefix> <field>"` slots.

use crate::parser::sexp::ListNode;
use crate::variant::resolver::{
    field_allowed, interpret_as_yes_no, property_entry, split_scoped_name, SPECIAL_FIELDS,
};

/// Current live value of `field`: a property named exactly `field`, or the
/// flag of an `in_bom`/`on_board`/`dnp` node.
pub fn live_value<'a>(symbol: &'a ListNode, field: &str) -> Option<&'a str> {
    let property = symbol
        .items
        .iter()
        .filter_map(property_entry)
        .find(|(name, _)| *name == field)
        .map(|(_, value)| value);
    if property.is_some() {
        return property;
    }
    if SPECIAL_FIELDS.contains(&field) {
        return symbol.child(field)?.atom(1).map(|a| a.value());
    }
    None
}

/// Write live values back into the `"<current_prefix> <field>"` slots of
/// `symbol`. Blank slots are filled too: they still mark the field as
/// variant-scoped. Returns how many slots changed.
pub fn store_symbol(symbol: &mut ListNode, current_prefix: &str, fields: &[String]) -> usize {
    let mut pending: Vec<(usize, String)> = Vec::new();

    for (index, node) in symbol.items.iter().enumerate() {
        let Some((name, value)) = property_entry(node) else {
            continue;
        };
        let Some((scope, field)) = split_scoped_name(name) else {
            continue;
        };
        if scope != current_prefix || !field_allowed(fields, field) {
            continue;
        }
        let Some(live) = live_value(symbol, field) else {
            continue;
        };
        // "ano" already says "yes"; keep the user's spelling
        if SPECIAL_FIELDS.contains(&field) && interpret_as_yes_no(value).ok() == Some(live) {
            continue;
        }
        pending.push((index, live.to_string()));
    }

    let mut changed = 0;
    for (index, live) in pending {
        let slot = symbol.items[index]
            .as_list_mut()
            .and_then(|property| property.atom_mut(2));
        if let Some(atom) = slot {
            if atom.set_value(live) {
                changed += 1;
            }
        }
    }
    changed
}
