use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use component_setup::cli::{ApplyArgs, Command, ProvisionArgs, RootArgs, StatusArgs};
use component_setup::manifest::Manifest;
use component_setup::patch::{apply_document, parse, ApplyOptions, FileOutcome};
use component_setup::provision::{provision, status, ProvisionOptions};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = RootArgs::parse();
    match args.command {
        Command::Apply(args) => cmd_apply(&args),
        Command::Provision(args) => cmd_provision(&args),
        Command::Status(args) => cmd_status(&args),
    }
}

fn cmd_apply(args: &ApplyArgs) -> Result<()> {
    let text = std::fs::read_to_string(&args.patch)
        .with_context(|| format!("read patch {}", args.patch.display()))?;
    let doc =
        parse(&text).with_context(|| format!("parse patch {}", args.patch.display()))?;
    if !args.target.is_dir() {
        bail!("target {} is not a directory", args.target.display());
    }

    let options = ApplyOptions {
        strip: args.strip,
        max_fuzz: args.fuzz,
        dry_run: args.dry_run,
    };
    let report = apply_document(&doc, &args.target, &options);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for file in &report.files {
            match &file.outcome {
                FileOutcome::Applied { hunks } => {
                    println!("patched {} ({} hunk(s))", file.path, hunks.len());
                }
                FileOutcome::AppliedWithOffset { hunks } => {
                    println!("patched {} ({} hunk(s))", file.path, hunks.len());
                    for hunk in hunks {
                        if hunk.offset != 0 || hunk.fuzz != 0 {
                            println!(
                                "  hunk #{} succeeded (offset {} lines, fuzz {})",
                                hunk.hunk, hunk.offset, hunk.fuzz
                            );
                        }
                    }
                }
                FileOutcome::Failed { hunk, reason } => match hunk {
                    Some(hunk) => println!("FAILED {}: hunk #{hunk}: {reason}", file.path),
                    None => println!("FAILED {}: {reason}", file.path),
                },
            }
        }
    }

    if !report.success() {
        bail!(
            "{} of {} file(s) failed to apply",
            report.failed_count(),
            report.files.len()
        );
    }
    if args.dry_run {
        tracing::info!("dry run: no files were written");
    }
    Ok(())
}

fn cmd_provision(args: &ProvisionArgs) -> Result<()> {
    let manifest = Manifest::load(&args.manifest)?;
    let manifest_dir = args
        .manifest
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."))
        .to_path_buf();
    let options = ProvisionOptions {
        root: args.root.clone(),
        jobs: args.jobs,
    };

    let outcomes = provision(&manifest, &manifest_dir, &options)?;
    let mut failed = 0usize;
    for outcome in &outcomes {
        if outcome.ok {
            println!("{}: {} ok", outcome.name, outcome.action);
        } else {
            failed += 1;
            println!(
                "{}: {} FAILED ({})",
                outcome.name,
                outcome.action,
                outcome.detail.as_deref().unwrap_or("no detail")
            );
        }
    }
    if failed > 0 {
        // Optional components may fail without aborting; the exit stays
        // clean so a partial environment is still usable.
        tracing::warn!(failed, "some optional components were not provisioned");
    }
    Ok(())
}

fn cmd_status(args: &StatusArgs) -> Result<()> {
    let manifest = Manifest::load(&args.manifest)?;
    let statuses = status(&manifest, &args.root);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    if let Some(toolchain) = manifest.toolchain_root() {
        match toolchain {
            Ok(root) => println!("toolchain: {root}"),
            Err(err) => println!("toolchain: MISSING ({err})"),
        }
    }
    for component in &statuses {
        let patch = if component.patch_declared { ", patch" } else { "" };
        let pin = component
            .pinned_commit
            .as_deref()
            .map(|commit| format!(", pinned {commit}"))
            .unwrap_or_default();
        println!(
            "{}: {} ({}{pin}{patch})",
            component.name,
            component.state.as_str(),
            component.path
        );
    }
    Ok(())
}
