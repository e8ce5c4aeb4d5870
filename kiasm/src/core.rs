//! Project-level variant switching shared by the CLI and library users.
//!
//! A switch is all-or-nothing: every schematic, the board and the project
//! file are transformed in memory first, and only then written back.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::board::{update_board, BoardError, BoardStore, KicadBoardStore};
use crate::parser::sexp::{parse_str, render, ParseError};
use crate::project::{
    locate_project, schematic_files, ProjectMetadata, BOARD_EXTENSION, SCHEMATIC_EXTENSION,
};
use crate::variant::{
    augment_schematic, store_schematic, symbol_values, SymbolError, SynthesisLayout,
};

#[derive(Debug, thiserror::Error)]
pub enum KiAsmError {
    #[error("Malformed input in {}: {source}", path.display())]
    MalformedInput {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
    #[error("{}: {source}", path.display())]
    Variant {
        path: PathBuf,
        #[source]
        source: SymbolError,
    },
    #[error("{0}")]
    ProjectLayout(String),
    #[error("Cannot load board {}: {source}", path.display())]
    BoardLoad {
        path: PathBuf,
        #[source]
        source: BoardError,
    },
    #[error("Invalid project file {}: {source}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid variant prefix '{0}': must be non-empty and contain no spaces")]
    InvalidPrefix(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Options for a switch or export.
#[derive(Clone, Debug)]
pub struct VariantOptions {
    /// Only switch these fields. Empty means every field.
    pub fields: Vec<String>,
    /// Copy symbol values onto board footprints.
    pub sync_board: bool,
    pub layout: SynthesisLayout,
}

impl Default for VariantOptions {
    fn default() -> Self {
        Self {
            fields: vec![],
            sync_board: true,
            layout: SynthesisLayout::default(),
        }
    }
}

/// Outcome of switching one project.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SwitchReport {
    pub project: PathBuf,
    pub previous: String,
    pub variant: String,
    /// Files that were rewritten.
    pub written: Vec<PathBuf>,
    pub symbols: usize,
    pub stored: usize,
    pub updated: usize,
    pub synthesized: usize,
    pub footprints: usize,
}

/// A file's new contents, kept in memory until the whole project succeeded.
struct StagedWrite {
    path: PathBuf,
    contents: String,
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.kiasm-tmp", name))
}

/// Write every staged file to a temporary sibling, then rename them all
/// into place. Nothing is renamed unless every temporary write succeeded.
fn commit(writes: &[StagedWrite]) -> Result<(), KiAsmError> {
    let mut temps = Vec::with_capacity(writes.len());
    for write in writes {
        let temp = temp_path(&write.path);
        if let Err(e) = std::fs::write(&temp, &write.contents) {
            for written in &temps {
                let _ = std::fs::remove_file(written);
            }
            let _ = std::fs::remove_file(&temp);
            return Err(e.into());
        }
        temps.push(temp);
    }
    for (index, (write, temp)) in writes.iter().zip(&temps).enumerate() {
        if let Err(e) = std::fs::rename(temp, &write.path) {
            for pending in &temps[index..] {
                let _ = std::fs::remove_file(pending);
            }
            return Err(e.into());
        }
    }
    Ok(())
}

fn validate_prefix(prefix: &str) -> Result<(), KiAsmError> {
    if prefix.is_empty() || prefix.contains(char::is_whitespace) {
        return Err(KiAsmError::InvalidPrefix(prefix.to_string()));
    }
    Ok(())
}

const MAX_COPY_DEPTH: usize = 20;

/// Recursively copy `src` into `dst`, skipping `skip` (the export root when
/// it lives inside the project).
fn copy_dir(src: &Path, dst: &Path, skip: &Path, depth: usize) -> Result<(), KiAsmError> {
    if depth > MAX_COPY_DEPTH {
        return Err(KiAsmError::ProjectLayout(format!(
            "Directory nesting too deep to export: {}",
            src.display()
        )));
    }
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let path = entry.path();
        let target = dst.join(entry.file_name());
        if path.is_dir() {
            if path.canonicalize()? == skip {
                continue;
            }
            copy_dir(&path, &target, skip, depth + 1)?;
        } else if path.is_file() {
            std::fs::copy(&path, &target)?;
        }
    }
    Ok(())
}

/// Core variant API used by the CLI.
pub struct KiAsmCore;

impl KiAsmCore {
    /// Switch the project in `dir` to `prefix`, in place.
    pub fn switch_project(
        dir: &Path,
        prefix: &str,
        options: &VariantOptions,
    ) -> Result<SwitchReport, KiAsmError> {
        validate_prefix(prefix)?;
        let project_file = locate_project(dir)?;
        let mut metadata = ProjectMetadata::load(&project_file)?;
        let previous = metadata.current_variant().to_string();

        let root_schematic = project_file.with_extension(SCHEMATIC_EXTENSION);
        if !root_schematic.is_file() {
            return Err(KiAsmError::ProjectLayout(format!(
                "No schematics for project {}",
                project_file.display()
            )));
        }
        let board_file = project_file.with_extension(BOARD_EXTENSION);
        if options.sync_board && !board_file.is_file() {
            return Err(KiAsmError::ProjectLayout(format!(
                "No board for project {}",
                project_file.display()
            )));
        }

        tracing::info!(
            "Switching {} from variant '{}' to '{}'",
            project_file.display(),
            previous,
            prefix
        );

        let mut report = SwitchReport {
            project: project_file.clone(),
            previous: previous.clone(),
            variant: prefix.to_string(),
            written: Vec::new(),
            symbols: 0,
            stored: 0,
            updated: 0,
            synthesized: 0,
            footprints: 0,
        };
        let mut staged = Vec::new();
        let mut values: HashMap<String, String> = HashMap::new();

        for path in schematic_files(dir)? {
            let content = std::fs::read_to_string(&path)?;
            let mut document = parse_str(&content).map_err(|source| KiAsmError::MalformedInput {
                path: path.clone(),
                source,
            })?;

            let stored = store_schematic(&mut document, &previous, &options.fields);
            let sheet = augment_schematic(&mut document, prefix, &options.fields, &options.layout)
                .map_err(|source| KiAsmError::Variant {
                    path: path.clone(),
                    source,
                })?;
            tracing::debug!(
                "{}: {} symbols, {} stored, {} updated, {} synthesized",
                path.display(),
                sheet.symbols,
                stored,
                sheet.updated,
                sheet.synthesized
            );

            report.symbols += sheet.symbols;
            report.stored += stored;
            report.updated += sheet.updated;
            report.synthesized += sheet.synthesized;
            values.extend(symbol_values(&document));

            let rendered = render(&document);
            if rendered != content {
                staged.push(StagedWrite {
                    path,
                    contents: rendered,
                });
            }
        }

        if options.sync_board {
            let store = KicadBoardStore;
            let mut board =
                store
                    .load_board(&board_file)
                    .map_err(|source| KiAsmError::BoardLoad {
                        path: board_file.clone(),
                        source,
                    })?;
            report.footprints = update_board(&store, &mut board, &values);
            if report.footprints > 0 {
                staged.push(StagedWrite {
                    path: board_file,
                    contents: store.save(&board),
                });
            }
        }

        if previous != prefix {
            metadata.set_current_variant(prefix);
            staged.push(StagedWrite {
                path: project_file,
                contents: metadata.to_string_pretty()?,
            });
        }

        commit(&staged)?;
        report.written = staged.into_iter().map(|w| w.path).collect();
        tracing::info!(
            "Variant '{}' active, {} files written",
            prefix,
            report.written.len()
        );
        Ok(report)
    }

    /// Copy the project in `dir` to `dest/<prefix>` for every prefix and
    /// switch each copy to its prefix.
    pub fn export_project(
        dir: &Path,
        dest: &Path,
        prefixes: &[String],
        options: &VariantOptions,
    ) -> Result<Vec<SwitchReport>, KiAsmError> {
        for prefix in prefixes {
            validate_prefix(prefix)?;
        }
        locate_project(dir)?;
        std::fs::create_dir_all(dest)?;
        let skip = dest.canonicalize()?;

        let mut reports = Vec::with_capacity(prefixes.len());
        for prefix in prefixes {
            let target = dest.join(prefix);
            tracing::info!("Exporting variant '{}' to {}", prefix, target.display());
            copy_dir(dir, &target, &skip, 0)?;
            reports.push(Self::switch_project(&target, prefix, options)?);
        }
        Ok(reports)
    }
}
