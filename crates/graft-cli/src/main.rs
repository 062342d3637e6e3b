use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "graft")]
#[command(about = "Runtime introspection and patching toolkit for managed engines")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a loaded module for a byte pattern
    Scan {
        /// Module to scan (e.g. coreclr.dll)
        module: String,
        /// Pattern, space-separated hex with ?? wildcards
        pattern: String,
        /// Restrict the scan to one segment
        #[arg(short, long, default_value = graft_core::TEXT_SEGMENT)]
        segment: String,
        /// Scan the whole mapped module instead of a segment
        #[arg(long)]
        whole_module: bool,
        /// Signed displacement added to the match address
        #[arg(short, long, default_value_t = 0)]
        offset_guess: i64,
        /// List every match instead of resolving one address
        #[arg(short, long)]
        all: bool,
    },
    /// Resolve a qualified symbol name against a symbol file
    Resolve {
        /// Module the symbol belongs to
        module: String,
        /// Qualified name (Scope::member)
        name: String,
        /// JSON symbol file
        #[arg(short, long)]
        symbols: std::path::PathBuf,
        /// Print the module-relative offset only; skip the loaded-module
        /// lookup
        #[arg(long)]
        rva_only: bool,
    },
    /// Dump a metadata record at an address in this process
    Inspect {
        /// Record kind: method-table, field-desc or method-desc
        kind: commands::inspect::RecordKind,
        /// Record address, hex
        address: String,
    },
    /// Validate a signature-set file and list its entries
    Signatures {
        /// JSON signature set
        file: std::path::PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("graft=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            module,
            pattern,
            segment,
            whole_module,
            offset_guess,
            all,
        } => commands::scan::run(&module, &pattern, &segment, whole_module, offset_guess, all),
        Commands::Resolve {
            module,
            name,
            symbols,
            rva_only,
        } => commands::resolve::run(&module, &name, &symbols, rva_only),
        Commands::Inspect { kind, address } => commands::inspect::run(kind, &address),
        Commands::Signatures { file } => commands::signatures::run(&file),
    }
}
