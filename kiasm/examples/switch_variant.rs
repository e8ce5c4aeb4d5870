//! Switch a project to a variant and print what changed.

use kiasm::prelude::*;
use std::path::Path;

fn main() -> Result<(), KiAsmError> {
    let mut args = std::env::args().skip(1);
    let (Some(dir), Some(prefix)) = (args.next(), args.next()) else {
        eprintln!("Usage: cargo run --example switch_variant <project_dir> <prefix>");
        std::process::exit(1);
    };

    let variants = list_variants(Path::new(&dir))?;
    println!("Variants in {}:", dir);
    for variant in &variants {
        let marker = if variant.active { "*" } else { " " };
        println!("  {} {} ({} symbols)", marker, variant.prefix, variant.symbols);
    }

    let report = KiAsmCore::switch_project(Path::new(&dir), &prefix, &VariantOptions::default())?;

    println!();
    println!("Switched from '{}' to '{}'", report.previous, report.variant);
    println!("  Fields updated:     {}", report.updated);
    println!("  Fields added:       {}", report.synthesized);
    println!("  Footprints updated: {}", report.footprints);
    for path in &report.written {
        println!("  wrote {}", path.display());
    }
    Ok(())
}
