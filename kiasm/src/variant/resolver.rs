//! Forward rewrite of a single `symbol` sub-tree.
//!
//! Variant-scoped properties are named `"<prefix> <field>"`. Selecting a
//! prefix copies every non-blank scoped value onto the live field: an
//! existing `(property "<field>" ...)`, one of the `in_bom`/`on_board`/`dnp`
//! flags, or a newly synthesized property when neither exists.

use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::parser::sexp::{Atom, ListNode, Node};

/// Symbol flags that are stored as `(tag yes|no)` instead of as properties.
pub const SPECIAL_FIELDS: [&str; 3] = ["in_bom", "on_board", "dnp"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cannot interpret '{0}' as yes/no")]
pub struct InvalidBooleanValue(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VariantError {
    #[error("cannot place field '{field}': symbol has no '{anchor}' node to anchor it")]
    MissingPropertyAnchor { field: String, anchor: &'static str },
    #[error("invalid value for field '{field}': {source}")]
    InvalidBooleanValue {
        field: String,
        #[source]
        source: InvalidBooleanValue,
    },
}

/// Normalize a yes/no-like value (English or Czech, case-insensitive).
pub fn interpret_as_yes_no(value: &str) -> Result<&'static str, InvalidBooleanValue> {
    match value.to_lowercase().as_str() {
        "yes" | "ano" | "1" | "true" => Ok("yes"),
        "no" | "ne" | "0" | "false" => Ok("no"),
        _ => Err(InvalidBooleanValue(value.to_string())),
    }
}

/// Split `"<prefix> <field>"` into its two halves. Anything other than
/// exactly two non-empty space-separated tokens is not variant-scoped.
pub fn split_scoped_name(name: &str) -> Option<(&str, &str)> {
    let mut parts = name.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(prefix), Some(field), None) if !prefix.is_empty() && !field.is_empty() => {
            Some((prefix, field))
        }
        _ => None,
    }
}

/// An empty allow-list admits every field.
pub(crate) fn field_allowed(fields: &[String], field: &str) -> bool {
    fields.is_empty() || fields.iter().any(|f| f == field)
}

/// `(name, value)` of a well-formed `(property "<name>" "<value>" ...)` node.
pub(crate) fn property_entry(node: &Node) -> Option<(&str, &str)> {
    let list = node.as_list().filter(|list| list.is("property"))?;
    Some((list.atom(1)?.value(), list.atom(2)?.value()))
}

/// Symbol position, copied by value into every synthesized property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub x: String,
    pub y: String,
    pub angle: Option<String>,
}

impl Position {
    /// Read `(at X Y [ANGLE])`.
    pub fn from_node(node: &ListNode) -> Option<Self> {
        if !node.is("at") {
            return None;
        }
        Some(Self {
            x: node.atom(1)?.value().to_string(),
            y: node.atom(2)?.value().to_string(),
            angle: node.atom(3).map(|a| a.value().to_string()),
        })
    }

    pub fn to_node(&self) -> ListNode {
        let mut items = vec![
            Node::from(Atom::bare("at")),
            Atom::bare(self.x.as_str()).with_leading(" ").into(),
            Atom::bare(self.y.as_str()).with_leading(" ").into(),
        ];
        if let Some(angle) = &self.angle {
            items.push(Atom::bare(angle.as_str()).with_leading(" ").into());
        }
        ListNode::new(items).with_leading(" ")
    }
}

/// Formatting used for synthesized property nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisLayout {
    pub property_indent: String,
    pub effects_indent: String,
    pub closing_indent: String,
    pub font_size: String,
}

impl Default for SynthesisLayout {
    fn default() -> Self {
        Self {
            property_indent: "\n    ".to_string(),
            effects_indent: "\n      ".to_string(),
            closing_indent: "\n    ".to_string(),
            font_size: "1.27".to_string(),
        }
    }
}

impl SynthesisLayout {
    /// `(property "<field>" "<value>" (at ...) (effects (font (size S S)) hide))`
    pub fn property_node(&self, field: &str, value: &str, position: &Position) -> ListNode {
        let size = ListNode::new(vec![
            Atom::bare("size").into(),
            Atom::bare(self.font_size.as_str()).with_leading(" ").into(),
            Atom::bare(self.font_size.as_str()).with_leading(" ").into(),
        ])
        .with_leading(" ");
        let font = ListNode::new(vec![Atom::bare("font").into(), size.into()]).with_leading(" ");
        let effects = ListNode::new(vec![
            Atom::bare("effects").into(),
            font.into(),
            Atom::bare("hide").with_leading(" ").into(),
        ])
        .with_leading(self.effects_indent.as_str());

        ListNode::new(vec![
            Atom::bare("property").into(),
            Atom::quoted(field).with_leading(" ").into(),
            Atom::quoted(value).with_leading(" ").into(),
            position.to_node().into(),
            effects.into(),
        ])
        .with_leading(self.property_indent.as_str())
        .with_trailing(self.closing_indent.as_str())
    }
}

/// What one pass over a symbol found: the anchors for synthesis and the
/// attribute map for the selected prefix.
#[derive(Debug, Default)]
struct SymbolScan {
    position: Option<Position>,
    last_property: Option<usize>,
    attributes: BTreeMap<String, String>,
}

fn scan_symbol(symbol: &ListNode, prefix: &str, fields: &[String]) -> SymbolScan {
    let mut scan = SymbolScan::default();

    for (index, node) in symbol.items.iter().enumerate() {
        let Some(list) = node.as_list() else {
            continue;
        };
        if list.is("at") {
            scan.position = Position::from_node(list);
            continue;
        }
        if !list.is("property") {
            continue;
        }
        scan.last_property = Some(index);

        let Some((name, value)) = property_entry(node) else {
            continue;
        };
        let Some((scope, field)) = split_scoped_name(name) else {
            continue;
        };
        if scope == prefix && field_allowed(fields, field) && !value.trim().is_empty() {
            scan.attributes.insert(field.to_string(), value.to_string());
        }
    }

    scan
}

/// Attribute map `field -> value` declared on `symbol` for `prefix`.
pub fn collect_attributes(
    symbol: &ListNode,
    prefix: &str,
    fields: &[String],
) -> BTreeMap<String, String> {
    scan_symbol(symbol, prefix, fields).attributes
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AugmentReport {
    /// Live values that actually changed (properties and flags).
    pub updated: usize,
    /// Fields that had no live counterpart and were inserted as properties.
    pub synthesized: Vec<String>,
}

/// Apply the variant `prefix` to one symbol.
pub fn augment_symbol(
    symbol: &mut ListNode,
    prefix: &str,
    fields: &[String],
    layout: &SynthesisLayout,
) -> Result<AugmentReport, VariantError> {
    let scan = scan_symbol(symbol, prefix, fields);
    let mut report = AugmentReport::default();
    if scan.attributes.is_empty() {
        return Ok(report);
    }

    let mut applied = BTreeSet::new();
    for node in symbol.items.iter_mut() {
        let Some(property) = node.as_list_mut().filter(|list| list.is("property")) else {
            continue;
        };
        let Some(name) = property.atom(1).map(|a| a.value().to_string()) else {
            continue;
        };
        let Some(value) = scan.attributes.get(&name) else {
            continue;
        };
        if let Some(atom) = property.atom_mut(2) {
            if atom.set_value(value.as_str()) {
                report.updated += 1;
            }
            applied.insert(name);
        }
    }

    for special in SPECIAL_FIELDS {
        let Some(value) = scan.attributes.get(special) else {
            continue;
        };
        let Some(flag) = symbol.child_mut(special) else {
            continue;
        };
        let normalized =
            interpret_as_yes_no(value).map_err(|source| VariantError::InvalidBooleanValue {
                field: special.to_string(),
                source,
            })?;
        if let Some(atom) = flag.atom_mut(1) {
            if atom.set_value(normalized) {
                report.updated += 1;
            }
        }
        applied.insert(special.to_string());
    }

    let pending: Vec<(&String, &String)> = scan
        .attributes
        .iter()
        .filter(|(field, _)| !applied.contains(*field))
        .collect();
    let Some((first, _)) = pending.first() else {
        return Ok(report);
    };
    let index = scan
        .last_property
        .ok_or_else(|| VariantError::MissingPropertyAnchor {
            field: first.to_string(),
            anchor: "property",
        })?;
    let position = scan
        .position
        .as_ref()
        .ok_or_else(|| VariantError::MissingPropertyAnchor {
            field: first.to_string(),
            anchor: "at",
        })?;

    for (offset, (field, value)) in pending.into_iter().enumerate() {
        let node = layout.property_node(field, value, position);
        symbol.items.insert(index + 1 + offset, node.into());
        report.synthesized.push(field.clone());
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::sexp::parse_str;

    fn symbol(text: &str) -> ListNode {
        parse_str(text)
            .unwrap()
            .forms()
            .next()
            .cloned()
            .unwrap()
    }

    const RESISTOR: &str = r#"(symbol (lib_id "Device:R") (at 127 76.2 0) (unit 1)
    (in_bom yes) (on_board yes) (dnp no)
    (property "Reference" "R1" (at 129.54 74.93 0))
    (property "Value" "10k" (at 129.54 77.47 0))
    (property "asm Value" "4k7" (at 127 76.2 0))
    (property "asm DNP" "   " (at 127 76.2 0))
    (property "asm dnp" "ANO" (at 127 76.2 0))
    (property "asmfoo" "x" (at 127 76.2 0))
    (property "asm foo bar" "y" (at 127 76.2 0))
    (property "lite Value" "1k" (at 127 76.2 0))
  )"#;

    #[test]
    fn test_interpret_as_yes_no() {
        assert_eq!(interpret_as_yes_no("ANO"), Ok("yes"));
        assert_eq!(interpret_as_yes_no("True"), Ok("yes"));
        assert_eq!(interpret_as_yes_no("0"), Ok("no"));
        assert_eq!(interpret_as_yes_no("ne"), Ok("no"));
        assert_eq!(
            interpret_as_yes_no("maybe"),
            Err(InvalidBooleanValue("maybe".to_string()))
        );
    }

    #[test]
    fn test_split_scoped_name() {
        assert_eq!(split_scoped_name("asm Footprint"), Some(("asm", "Footprint")));
        assert_eq!(split_scoped_name("asmfoo"), None);
        assert_eq!(split_scoped_name("asm foo bar"), None);
        assert_eq!(split_scoped_name("asm  foo"), None);
        assert_eq!(split_scoped_name(" foo"), None);
        assert_eq!(split_scoped_name("asm "), None);
    }

    #[test]
    fn test_collect_attributes() {
        let attributes = collect_attributes(&symbol(RESISTOR), "asm", &[]);
        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes["Value"], "4k7");
        assert_eq!(attributes["dnp"], "ANO");
        assert!(!attributes.contains_key("DNP"));
        assert!(!attributes.contains_key("foo"));
    }

    #[test]
    fn test_collect_attributes_respects_allow_list() {
        let fields = vec!["dnp".to_string()];
        let attributes = collect_attributes(&symbol(RESISTOR), "asm", &fields);
        assert_eq!(attributes.keys().collect::<Vec<_>>(), vec!["dnp"]);
    }

    #[test]
    fn test_augment_applies_value_and_flag() {
        let mut node = symbol(RESISTOR);
        let report = augment_symbol(&mut node, "asm", &[], &SynthesisLayout::default()).unwrap();

        assert_eq!(report.updated, 2);
        assert!(report.synthesized.is_empty());

        let rendered = node.to_string();
        assert!(rendered.contains(r#"(property "Value" "4k7" (at 129.54 77.47 0))"#));
        assert!(rendered.contains("(dnp yes)"));
        assert!(rendered.contains("(in_bom yes) (on_board yes)"));
        assert_eq!(
            rendered,
            RESISTOR
                .replace(r#""Value" "10k""#, r#""Value" "4k7""#)
                .replace("(dnp no)", "(dnp yes)")
        );
    }

    #[test]
    fn test_augment_unknown_prefix_is_noop() {
        let mut node = symbol(RESISTOR);
        let report = augment_symbol(&mut node, "xyz", &[], &SynthesisLayout::default()).unwrap();
        assert_eq!(report, AugmentReport::default());
        assert_eq!(node.to_string(), RESISTOR);
    }

    #[test]
    fn test_augment_is_idempotent() {
        let layout = SynthesisLayout::default();
        let mut once = symbol(RESISTOR);
        augment_symbol(&mut once, "asm", &[], &layout).unwrap();
        let mut twice = once.clone();
        let report = augment_symbol(&mut twice, "asm", &[], &layout).unwrap();

        assert_eq!(report.updated, 0);
        assert_eq!(twice, once);
    }

    #[test]
    fn test_synthesis_after_last_property() {
        let text = r#"(symbol (lib_id "Device:C") (at 10 20 90)
    (property "Reference" "C1" (at 10 18 0))
    (property "asm Footprint" "0402" (at 10 20 0))
    (property "Value" "100n" (at 10 22 0))
    (uuid 1234)
  )"#;
        let mut node = symbol(text);
        let report = augment_symbol(&mut node, "asm", &[], &SynthesisLayout::default()).unwrap();
        assert_eq!(report.synthesized, vec!["Footprint".to_string()]);

        assert_eq!(property_entry(&node.items[5]), Some(("Value", "100n")));
        let inserted = node.items[6].as_list().unwrap();
        assert!(inserted.is("property"));
        assert_eq!(inserted.atom(1).unwrap().value(), "Footprint");
        assert_eq!(inserted.atom(2).unwrap().value(), "0402");
        assert_eq!(
            inserted.to_string(),
            "\n    (property \"Footprint\" \"0402\" (at 10 20 90)\n      (effects (font (size 1.27 1.27)) hide)\n    )"
        );
        assert!(node.items[7].as_list().unwrap().is("uuid"));
    }

    #[test]
    fn test_synthesized_fields_keep_sorted_order() {
        let text = r#"(symbol (at 0 0)
    (property "Reference" "U1" (at 0 0 0))
    (property "b Zeta" "z" (at 0 0 0))
    (property "b Alpha" "a" (at 0 0 0))
  )"#;
        let mut node = symbol(text);
        let report = augment_symbol(&mut node, "b", &[], &SynthesisLayout::default()).unwrap();
        assert_eq!(report.synthesized, vec!["Alpha", "Zeta"]);

        let names: Vec<&str> = node
            .items
            .iter()
            .filter_map(property_entry)
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["Reference", "b Zeta", "b Alpha", "Alpha", "Zeta"]);
        // at without angle stays without angle
        assert!(node.to_string().contains(r#"(property "Alpha" "a" (at 0 0)"#));
    }

    #[test]
    fn test_missing_position_anchor() {
        let text = r#"(symbol (property "asm MPN" "X1" (id 3)))"#;
        let mut node = symbol(text);
        let err = augment_symbol(&mut node, "asm", &[], &SynthesisLayout::default()).unwrap_err();
        assert_eq!(
            err,
            VariantError::MissingPropertyAnchor {
                field: "MPN".to_string(),
                anchor: "at",
            }
        );
    }

    #[test]
    fn test_invalid_flag_value() {
        let text = r#"(symbol (at 0 0) (in_bom yes)
    (property "asm in_bom" "maybe" (at 0 0 0)))"#;
        let mut node = symbol(text);
        let err = augment_symbol(&mut node, "asm", &[], &SynthesisLayout::default()).unwrap_err();
        assert!(matches!(
            err,
            VariantError::InvalidBooleanValue { ref field, .. } if field == "in_bom"
        ));
    }

    #[test]
    fn test_flag_without_node_is_synthesized_as_property() {
        let text = r#"(symbol (at 1 2 0)
    (property "Reference" "D1" (at 0 0 0))
    (property "asm dnp" "1" (at 0 0 0)))"#;
        let mut node = symbol(text);
        let report = augment_symbol(&mut node, "asm", &[], &SynthesisLayout::default()).unwrap();
        assert_eq!(report.synthesized, vec!["dnp"]);
        assert!(node
            .to_string()
            .contains(r#"(property "dnp" "1" (at 1 2 0)"#));
    }
}
