//! Component provisioning: clone, checkout, and patch with marker-based
//! idempotency.
//!
//! Each component moves through an explicit state machine persisted as a
//! marker file inside its checkout: absent -> cloning -> present-unpatched ->
//! present-patched. Skip decisions are based on the marker, never on bare
//! directory existence, so an interrupted clone is detected and redone.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::git;
use crate::manifest::{Component, Manifest};
use crate::patch::{apply_document, parse, ApplyOptions, FileOutcome};
use crate::util::{display_path, truncate_string};

/// Marker file recording a component's provisioning state.
pub const STATE_MARKER: &str = ".csetup-state.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentState {
    Absent,
    /// Directory exists but carries no marker: an interrupted clone.
    Cloning,
    PresentUnpatched,
    PresentPatched,
}

impl ComponentState {
    pub fn as_str(self) -> &'static str {
        match self {
            ComponentState::Absent => "absent",
            ComponentState::Cloning => "cloning",
            ComponentState::PresentUnpatched => "present-unpatched",
            ComponentState::PresentPatched => "present-patched",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateMarker {
    state: ComponentState,
    branch: String,
    #[serde(default)]
    commit: Option<String>,
}

/// What happened to one component during a provisioning run.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentOutcome {
    pub name: String,
    pub action: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Read-only state summary for `csetup status`.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentStatus {
    pub name: String,
    pub path: String,
    pub state: ComponentState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned_commit: Option<String>,
    pub patch_declared: bool,
}

#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    /// Root directory component paths resolve against.
    pub root: PathBuf,
    /// Worker count; defaults to available parallelism.
    pub jobs: Option<usize>,
}

/// Provision every component in the manifest with a bounded worker pool.
///
/// Individual failures are recorded and do not stop other components; a
/// failure of a `required` component turns into an error after the run.
pub fn provision(
    manifest: &Manifest,
    manifest_dir: &Path,
    options: &ProvisionOptions,
) -> Result<Vec<ComponentOutcome>> {
    if let Some(toolchain) = manifest.toolchain_root() {
        match toolchain {
            Ok(root) => tracing::debug!(toolchain_root = %root, "toolchain env resolved"),
            Err(err) => tracing::warn!("{err}; downstream builds may fail"),
        }
    }

    let jobs = worker_count(options.jobs, manifest.components.len());
    tracing::info!(
        components = manifest.components.len(),
        jobs,
        "provisioning components"
    );

    let next = AtomicUsize::new(0);
    let results: Mutex<Vec<(usize, ComponentOutcome)>> = Mutex::new(Vec::new());
    std::thread::scope(|scope| {
        for _ in 0..jobs {
            scope.spawn(|| loop {
                let idx = next.fetch_add(1, Ordering::SeqCst);
                let Some(component) = manifest.components.get(idx) else {
                    break;
                };
                let outcome = provision_component(manifest, manifest_dir, component, options);
                results
                    .lock()
                    .expect("provisioning results lock")
                    .push((idx, outcome));
            });
        }
    });

    let mut results = results.into_inner().expect("provisioning results lock");
    results.sort_by_key(|(idx, _)| *idx);
    let outcomes: Vec<ComponentOutcome> = results.into_iter().map(|(_, o)| o).collect();

    for (component, outcome) in manifest.components.iter().zip(&outcomes) {
        if component.required && !outcome.ok {
            bail!(
                "required component {} failed: {}",
                component.name,
                outcome.detail.as_deref().unwrap_or(&outcome.action)
            );
        }
    }
    Ok(outcomes)
}

/// Summarize every component's marker state without touching anything.
pub fn status(manifest: &Manifest, root: &Path) -> Vec<ComponentStatus> {
    manifest
        .components
        .iter()
        .map(|component| ComponentStatus {
            name: component.name.clone(),
            path: component.path.clone(),
            state: read_state(&root.join(&component.path)),
            pinned_commit: component.commit.clone(),
            patch_declared: component.patch.is_some(),
        })
        .collect()
}

fn worker_count(requested: Option<usize>, components: usize) -> usize {
    let default = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    requested.unwrap_or(default).clamp(1, components.max(1))
}

fn read_state(dest: &Path) -> ComponentState {
    if !dest.exists() {
        return ComponentState::Absent;
    }
    match read_marker(dest) {
        Some(marker) => marker.state,
        None => ComponentState::Cloning,
    }
}

fn read_marker(dest: &Path) -> Option<StateMarker> {
    let text = std::fs::read_to_string(dest.join(STATE_MARKER)).ok()?;
    serde_json::from_str(&text).ok()
}

fn write_marker(dest: &Path, marker: &StateMarker) -> Result<()> {
    let json = serde_json::to_string_pretty(marker).context("serialize state marker")?;
    let path = dest.join(STATE_MARKER);
    std::fs::write(&path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn provision_component(
    manifest: &Manifest,
    manifest_dir: &Path,
    component: &Component,
    options: &ProvisionOptions,
) -> ComponentOutcome {
    let dest = options.root.join(&component.path);
    let shown = display_path(&dest, Some(&options.root));

    if dest.exists() {
        match read_marker(&dest) {
            Some(marker) if marker.state == ComponentState::PresentPatched => {
                tracing::info!(name = %component.name, path = %shown, "already provisioned");
                return outcome(component, "skip", true, Some("already provisioned".into()));
            }
            Some(marker) if marker.state == ComponentState::PresentUnpatched => {
                if component.patch.is_some() {
                    return patch_step(manifest, manifest_dir, component, &dest, marker);
                }
                tracing::info!(name = %component.name, path = %shown, "already present");
                return outcome(component, "skip", true, Some("already present".into()));
            }
            _ => {
                // No marker (or a stale cloning marker): an interrupted
                // clone. Remove and redo.
                tracing::warn!(
                    name = %component.name,
                    path = %shown,
                    "incomplete checkout; re-cloning"
                );
                if let Err(err) = std::fs::remove_dir_all(&dest) {
                    return outcome(
                        component,
                        "clean",
                        false,
                        Some(format!("remove {}: {err}", dest.display())),
                    );
                }
            }
        }
    }

    if let Err(detail) = fetch(component, &dest) {
        return outcome(component, "clone", false, Some(detail));
    }

    let marker = StateMarker {
        state: ComponentState::PresentUnpatched,
        branch: component.branch.clone(),
        commit: component.commit.clone(),
    };
    if let Err(err) = write_marker(&dest, &marker) {
        return outcome(component, "clone", false, Some(err.to_string()));
    }
    tracing::info!(
        name = %component.name,
        branch = %component.branch,
        path = %shown,
        "component cloned"
    );

    if component.patch.is_some() {
        return patch_step(manifest, manifest_dir, component, &dest, marker);
    }
    outcome(component, "clone", true, None)
}

/// Clone (and pin) a component, retrying the network step once. A failed
/// attempt removes the partial directory before the retry.
fn fetch(component: &Component, dest: &Path) -> std::result::Result<(), String> {
    let shallow = component.commit.is_none();
    let mut last_error = String::new();

    for attempt in 1..=2 {
        match git::clone(&component.url, &component.branch, dest, shallow) {
            Ok(output) if output.success() => {
                if let Some(commit) = &component.commit {
                    match git::checkout(dest, commit) {
                        Ok(output) if output.success() => return Ok(()),
                        Ok(output) => {
                            cleanup(dest);
                            return Err(format!(
                                "checkout {commit}: {}",
                                output.error_line()
                            ));
                        }
                        Err(err) => {
                            cleanup(dest);
                            return Err(format!("checkout {commit}: {err}"));
                        }
                    }
                }
                return Ok(());
            }
            Ok(output) if output.timed_out => {
                last_error = "clone timed out".to_string();
            }
            Ok(output) => {
                last_error = truncate_string(output.error_line(), 200);
            }
            Err(err) => {
                last_error = err.to_string();
            }
        }
        cleanup(dest);
        if attempt == 1 {
            tracing::warn!(
                name = %component.name,
                error = %last_error,
                "clone failed; retrying once"
            );
        }
    }
    Err(last_error)
}

fn cleanup(dest: &Path) {
    if dest.exists() {
        let _ = std::fs::remove_dir_all(dest);
    }
}

fn patch_step(
    manifest: &Manifest,
    manifest_dir: &Path,
    component: &Component,
    dest: &Path,
    marker: StateMarker,
) -> ComponentOutcome {
    let Some(patch_path) = manifest.patch_path(manifest_dir, component) else {
        return outcome(component, "patch", true, None);
    };
    let text = match std::fs::read_to_string(&patch_path) {
        Ok(text) => text,
        Err(err) => {
            return outcome(
                component,
                "patch",
                false,
                Some(format!("read {}: {err}", patch_path.display())),
            )
        }
    };
    let doc = match parse(&text) {
        Ok(doc) => doc,
        Err(err) => return outcome(component, "patch", false, Some(err.to_string())),
    };

    // Component patches are written against the checkout root directly.
    let report = apply_document(&doc, dest, &ApplyOptions::default());
    if !report.success() {
        let first_failure = report
            .files
            .iter()
            .find_map(|file| match &file.outcome {
                FileOutcome::Failed { reason, .. } => {
                    Some(format!("{}: {reason}", file.path))
                }
                _ => None,
            })
            .unwrap_or_else(|| "patch failed".to_string());
        return outcome(
            component,
            "patch",
            false,
            Some(format!(
                "{} of {} file(s) failed; first: {first_failure}",
                report.failed_count(),
                report.files.len()
            )),
        );
    }

    let patched = StateMarker {
        state: ComponentState::PresentPatched,
        ..marker
    };
    if let Err(err) = write_marker(dest, &patched) {
        return outcome(component, "patch", false, Some(err.to_string()));
    }
    tracing::info!(name = %component.name, "component patched");
    outcome(component, "patch", true, None)
}

fn outcome(
    component: &Component,
    action: &str,
    ok: bool,
    detail: Option<String>,
) -> ComponentOutcome {
    ComponentOutcome {
        name: component.name.clone(),
        action: action.to_string(),
        ok,
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(name: &str, path: &str) -> Component {
        Component {
            name: name.to_string(),
            url: "https://example.com/repo.git".to_string(),
            path: path.to_string(),
            branch: "main".to_string(),
            commit: None,
            patch: None,
            required: false,
        }
    }

    #[test]
    fn worker_count_is_bounded() {
        assert_eq!(worker_count(Some(8), 2), 2);
        assert_eq!(worker_count(Some(0), 4), 1);
        assert!(worker_count(None, 100) >= 1);
        assert_eq!(worker_count(Some(3), 0), 1);
    }

    #[test]
    fn state_reads_marker_or_infers_interruption() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("comp");

        assert_eq!(read_state(&dest), ComponentState::Absent);

        std::fs::create_dir_all(&dest).unwrap();
        assert_eq!(read_state(&dest), ComponentState::Cloning);

        write_marker(
            &dest,
            &StateMarker {
                state: ComponentState::PresentUnpatched,
                branch: "main".to_string(),
                commit: None,
            },
        )
        .unwrap();
        assert_eq!(read_state(&dest), ComponentState::PresentUnpatched);
    }

    #[test]
    fn corrupt_marker_counts_as_interrupted() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("comp");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join(STATE_MARKER), "not json").unwrap();
        assert_eq!(read_state(&dest), ComponentState::Cloning);
    }

    #[test]
    fn status_reflects_marker_states() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest {
            toolchain_env: None,
            patch_dir: PathBuf::from("patches"),
            components: vec![component("a", "components/a"), component("b", "components/b")],
        };
        let dest = dir.path().join("components/b");
        std::fs::create_dir_all(&dest).unwrap();
        write_marker(
            &dest,
            &StateMarker {
                state: ComponentState::PresentPatched,
                branch: "main".to_string(),
                commit: None,
            },
        )
        .unwrap();

        let statuses = status(&manifest, dir.path());
        assert_eq!(statuses[0].state, ComponentState::Absent);
        assert_eq!(statuses[1].state, ComponentState::PresentPatched);
    }
}
