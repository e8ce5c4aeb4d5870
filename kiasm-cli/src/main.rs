//! KiAsm CLI - switch and export KiCad assembly variants from the command line.

use clap::{Parser, Subcommand, ValueEnum};
use kiasm::{list_variants, KiAsmCore, SwitchReport, VariantOptions, VariantSummary};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "kiasm")]
#[command(about = "Manipulate assembly variants of KiCad projects", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Change assembly variant of a project in place
    Switch {
        /// Path to the project directory
        #[arg(value_name = "PROJECTDIR")]
        dir: PathBuf,

        /// Assembly variant prefix
        #[arg(short, long)]
        prefix: String,

        /// Fields to switch (repeatable, default: all)
        #[arg(short, long = "field")]
        fields: Vec<String>,

        /// Do not update footprint values on the board
        #[arg(long)]
        no_board: bool,

        /// Output format
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,
    },

    /// Export project in multiple assembly variants into a dedicated directory
    Export {
        /// Path to the project directory
        #[arg(value_name = "PROJECTDIR")]
        dir: PathBuf,

        /// Destination directory, one subdirectory per variant
        #[arg(value_name = "DESTDIR")]
        dest: PathBuf,

        /// Assembly variant prefix (repeatable)
        #[arg(short, long = "prefix", required = true)]
        prefixes: Vec<String>,

        /// Fields to switch (repeatable, default: all)
        #[arg(short, long = "field")]
        fields: Vec<String>,

        /// Do not update footprint values on the board
        #[arg(long)]
        no_board: bool,

        /// Output format
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,
    },

    /// List the assembly variants declared in a project
    Variants {
        /// Path to the project directory
        #[arg(value_name = "PROJECTDIR", default_value = ".")]
        dir: PathBuf,

        /// Show the fields each variant declares
        #[arg(long)]
        fields: bool,

        /// Output format
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output for scripts
    Json,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit_code = match cli.command {
        Commands::Switch {
            dir,
            prefix,
            fields,
            no_board,
            format,
        } => handle_switch(&dir, &prefix, options(fields, no_board), format),
        Commands::Export {
            dir,
            dest,
            prefixes,
            fields,
            no_board,
            format,
        } => handle_export(&dir, &dest, &prefixes, options(fields, no_board), format),
        Commands::Variants {
            dir,
            fields,
            format,
        } => handle_variants(&dir, fields, format),
    };

    process::exit(exit_code);
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn options(fields: Vec<String>, no_board: bool) -> VariantOptions {
    VariantOptions {
        fields,
        sync_board: !no_board,
        ..VariantOptions::default()
    }
}

fn handle_switch(dir: &Path, prefix: &str, options: VariantOptions, format: OutputFormat) -> i32 {
    match KiAsmCore::switch_project(dir, prefix, &options) {
        Ok(report) => {
            output_reports(&[report], &format);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn handle_export(
    dir: &Path,
    dest: &Path,
    prefixes: &[String],
    options: VariantOptions,
    format: OutputFormat,
) -> i32 {
    match KiAsmCore::export_project(dir, dest, prefixes, &options) {
        Ok(reports) => {
            output_reports(&reports, &format);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn handle_variants(dir: &Path, show_fields: bool, format: OutputFormat) -> i32 {
    match list_variants(dir) {
        Ok(variants) => {
            match format {
                OutputFormat::Human => output_variants_human(&variants, show_fields),
                OutputFormat::Json => print_json(&serde_json::json!({ "variants": variants })),
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn output_reports(reports: &[SwitchReport], format: &OutputFormat) {
    match format {
        OutputFormat::Human => output_reports_human(reports),
        OutputFormat::Json => print_json(&serde_json::json!({
            "results": reports,
            "summary": {
                "projects": reports.len(),
                "files_written": reports.iter().map(|r| r.written.len()).sum::<usize>(),
            }
        })),
    }
}

fn output_reports_human(reports: &[SwitchReport]) {
    for report in reports {
        println!("\nProject: {}", report.project.display());
        println!("{}", "─".repeat(60));
        println!("  Variant: {} -> {}", report.previous, report.variant);
        println!("  Symbols:            {}", report.symbols);
        println!("  Slots stored:       {}", report.stored);
        println!("  Fields updated:     {}", report.updated);
        println!("  Fields added:       {}", report.synthesized);
        println!("  Footprints updated: {}", report.footprints);

        if report.written.is_empty() {
            println!("\n  No files changed");
        } else {
            println!("\n  Written:");
            for path in &report.written {
                println!("    - {}", path.display());
            }
        }
    }
}

fn output_variants_human(variants: &[VariantSummary], show_fields: bool) {
    if variants.is_empty() {
        println!("No assembly variants declared");
        return;
    }
    println!("Assembly variants:\n");
    for variant in variants {
        let marker = if variant.active { " (active)" } else { "" };
        println!("  {}{}", variant.prefix, marker);
        println!("    {} symbols, {} fields", variant.symbols, variant.fields.len());
        if show_fields {
            for field in &variant.fields {
                println!("      - {}", field);
            }
        }
        println!();
    }
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Error: {}", e),
    }
}
