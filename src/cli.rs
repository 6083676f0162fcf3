//! CLI argument parsing for the component-setup workflow.
//!
//! The CLI is intentionally thin: it wires commands to the patch engine and
//! provisioner without embedding policy, so the same core logic can be reused
//! elsewhere.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default manifest location relative to the project root.
pub const DEFAULT_MANIFEST: &str = "components.json";

/// Root CLI entrypoint for the component-setup workflow.
///
/// Keeping a single `RootArgs` type makes command routing obvious and avoids
/// hidden defaults in subcommand constructors.
#[derive(Parser, Debug)]
#[command(
    name = "csetup",
    version,
    about = "Deterministic patch application and component provisioning",
    after_help = "Examples:\n  csetup apply -p fixes/lvgl.patch -t components/lvgl\n  csetup apply -p series.patch -t src --strip 1 --dry-run --json\n  csetup provision --manifest components.json --root .\n  csetup status --manifest components.json --json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level workflow commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    Apply(ApplyArgs),
    Provision(ProvisionArgs),
    Status(StatusArgs),
}

/// Apply a unified diff to a target directory.
#[derive(Parser, Debug)]
#[command(about = "Apply a unified diff to a directory tree")]
pub struct ApplyArgs {
    /// Patch file in unified diff format
    #[arg(short = 'p', long, value_name = "FILE")]
    pub patch: PathBuf,

    /// Directory the patched paths resolve against
    #[arg(short = 't', long, value_name = "DIR")]
    pub target: PathBuf,

    /// Leading path components to strip from diff paths (like patch -pN)
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub strip: usize,

    /// Maximum fuzz: context lines that may be ignored at each hunk edge
    #[arg(long, value_name = "N", default_value_t = crate::patch::DEFAULT_MAX_FUZZ)]
    pub fuzz: u8,

    /// Locate every hunk but write nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Emit the per-file report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Provision command inputs.
#[derive(Parser, Debug)]
#[command(about = "Clone, pin, and patch external components from a manifest")]
pub struct ProvisionArgs {
    /// Component manifest (JSON)
    #[arg(long, value_name = "FILE", default_value = DEFAULT_MANIFEST)]
    pub manifest: PathBuf,

    /// Root directory component paths resolve against
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub root: PathBuf,

    /// Worker count (defaults to available parallelism)
    #[arg(long, value_name = "N")]
    pub jobs: Option<usize>,
}

/// Status command inputs.
#[derive(Parser, Debug)]
#[command(about = "Summarize component provisioning state without changing it")]
pub struct StatusArgs {
    /// Component manifest (JSON)
    #[arg(long, value_name = "FILE", default_value = DEFAULT_MANIFEST)]
    pub manifest: PathBuf,

    /// Root directory component paths resolve against
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub root: PathBuf,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}
