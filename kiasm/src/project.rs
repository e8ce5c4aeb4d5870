//! KiCad project layout and metadata.
//!
//! The active variant is recorded in the project file's text variables
//! (`text_variables.ASSEMBLY_VARIANT`), so title blocks can show it with
//! `${ASSEMBLY_VARIANT}`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::KiAsmError;
use crate::parser::sexp::parse_str;
use crate::variant::{split_scoped_name, symbols, DEFAULT_VARIANT};

pub const PROJECT_EXTENSION: &str = "kicad_pro";
pub const SCHEMATIC_EXTENSION: &str = "kicad_sch";
pub const BOARD_EXTENSION: &str = "kicad_pcb";
pub const VARIANT_TEXT_VARIABLE: &str = "ASSEMBLY_VARIANT";

fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, KiAsmError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(extension) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// The project file (`*.kicad_pro`) in `dir`.
pub fn locate_project(dir: &Path) -> Result<PathBuf, KiAsmError> {
    files_with_extension(dir, PROJECT_EXTENSION)?
        .into_iter()
        .next()
        .ok_or_else(|| KiAsmError::ProjectLayout(format!("No project in {}", dir.display())))
}

/// Every schematic sheet directly inside `dir`, sorted by path.
pub fn schematic_files(dir: &Path) -> Result<Vec<PathBuf>, KiAsmError> {
    files_with_extension(dir, SCHEMATIC_EXTENSION)
}

/// A `.kicad_pro` file. Unknown keys and their order are preserved.
#[derive(Debug, Clone)]
pub struct ProjectMetadata {
    pub path: PathBuf,
    root: Map<String, Value>,
}

impl ProjectMetadata {
    pub fn load(path: &Path) -> Result<Self, KiAsmError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self, KiAsmError> {
        let metadata_error = |source: serde_json::Error| KiAsmError::Metadata {
            path: path.to_path_buf(),
            source,
        };
        let value: Value = serde_json::from_str(content).map_err(metadata_error)?;
        let Value::Object(root) = value else {
            return Err(metadata_error(serde::de::Error::custom(
                "project file is not a JSON object",
            )));
        };
        Ok(Self {
            path: path.to_path_buf(),
            root,
        })
    }

    /// The recorded active variant, `def` when none is recorded.
    pub fn current_variant(&self) -> &str {
        self.root
            .get("text_variables")
            .and_then(|vars| vars.get(VARIANT_TEXT_VARIABLE))
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_VARIANT)
    }

    pub fn set_current_variant(&mut self, variant: &str) {
        let vars = self
            .root
            .entry("text_variables")
            .or_insert_with(|| Value::Object(Map::new()));
        if !vars.is_object() {
            *vars = Value::Object(Map::new());
        }
        if let Value::Object(vars) = vars {
            vars.insert(
                VARIANT_TEXT_VARIABLE.to_string(),
                Value::String(variant.to_string()),
            );
        }
    }

    /// Pretty JSON with a trailing newline, the way KiCad writes it.
    pub fn to_string_pretty(&self) -> Result<String, KiAsmError> {
        let mut text = serde_json::to_string_pretty(&self.root).map_err(|source| {
            KiAsmError::Metadata {
                path: self.path.clone(),
                source,
            }
        })?;
        text.push('\n');
        Ok(text)
    }
}

/// A variant prefix found in a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantSummary {
    pub prefix: String,
    /// Fields the variant declares on at least one symbol.
    pub fields: BTreeSet<String>,
    /// Number of symbols declaring at least one field.
    pub symbols: usize,
    pub active: bool,
}

/// Every variant prefix declared across the project's schematics.
pub fn list_variants(dir: &Path) -> Result<Vec<VariantSummary>, KiAsmError> {
    let project = locate_project(dir)?;
    let metadata = ProjectMetadata::load(&project)?;
    let active = metadata.current_variant().to_string();

    let mut found: BTreeMap<String, (BTreeSet<String>, usize)> = BTreeMap::new();
    for path in schematic_files(dir)? {
        let content = std::fs::read_to_string(&path)?;
        let document = parse_str(&content).map_err(|source| KiAsmError::MalformedInput {
            path: path.clone(),
            source,
        })?;
        for symbol in symbols(&document) {
            let mut seen = BTreeSet::new();
            for list in symbol.children("property") {
                let Some((prefix, field)) = list
                    .atom(1)
                    .and_then(|name| split_scoped_name(name.value()))
                else {
                    continue;
                };
                let entry = found.entry(prefix.to_string()).or_default();
                entry.0.insert(field.to_string());
                if seen.insert(prefix.to_string()) {
                    entry.1 += 1;
                }
            }
        }
    }

    Ok(found
        .into_iter()
        .map(|(prefix, (fields, symbols))| VariantSummary {
            active: prefix == active,
            prefix,
            fields,
            symbols,
        })
        .collect())
}
