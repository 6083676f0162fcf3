//! Transactional application of a parsed patch against a file tree.
//!
//! All edits for one file are staged in memory; the file on disk changes only
//! after every hunk has located and spliced cleanly, via a temp-file rename
//! that keeps the original permissions. A failure in any hunk leaves that
//! file untouched and is recorded in the report; sibling files still apply.

use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::document::{FileDiff, FileMode, Hunk, HunkLine, LineKind, PatchDocument};
use super::locate::{locate_hunk, search_radius, Located, DEFAULT_MAX_FUZZ};
use super::resolve::resolve;

/// Apply-time knobs. The parsed document itself is never mutated, so one
/// document can be replayed with different options.
#[derive(Debug, Clone, Copy)]
pub struct ApplyOptions {
    /// Leading path components dropped from declared paths.
    pub strip: usize,
    /// Context fuzz ceiling; 0 demands exact context.
    pub max_fuzz: u8,
    /// Locate and report only; write nothing.
    pub dry_run: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            strip: 0,
            max_fuzz: DEFAULT_MAX_FUZZ,
            dry_run: false,
        }
    }
}

/// Where one hunk actually landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HunkPlacement {
    /// 1-based hunk index within its file diff.
    pub hunk: usize,
    /// Signed line delta from the declared position.
    pub offset: i64,
    /// Context fuzz level needed for the match.
    pub fuzz: u8,
}

/// Per-file outcome of an apply attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    /// Every hunk matched at its declared position with exact context.
    Applied { hunks: Vec<HunkPlacement> },
    /// Every hunk applied, but at least one needed an offset or fuzz.
    AppliedWithOffset { hunks: Vec<HunkPlacement> },
    /// Nothing was written for this file.
    Failed {
        /// 1-based index of the failing hunk, when the failure is hunk-local.
        #[serde(skip_serializing_if = "Option::is_none")]
        hunk: Option<usize>,
        reason: String,
    },
}

impl FileOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, FileOutcome::Failed { .. })
    }

    fn from_placements(placements: Vec<HunkPlacement>) -> Self {
        if placements.iter().all(|p| p.offset == 0 && p.fuzz == 0) {
            FileOutcome::Applied { hunks: placements }
        } else {
            FileOutcome::AppliedWithOffset { hunks: placements }
        }
    }
}

/// Outcome for one file diff, keyed by the surviving declared path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileResult {
    pub path: String,
    #[serde(flatten)]
    pub outcome: FileOutcome,
}

/// Complete result of applying one document. Returned even under partial
/// failure; the caller decides whether partial success is acceptable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct ApplyReport {
    pub files: Vec<FileResult>,
}

impl ApplyReport {
    /// True iff every file applied (offsets and fuzz tolerated).
    pub fn success(&self) -> bool {
        self.files.iter().all(|f| !f.outcome.is_failure())
    }

    pub fn failed_count(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.outcome.is_failure())
            .count()
    }
}

/// Apply every file diff in `doc` under `root`.
pub fn apply_document(doc: &PatchDocument, root: &Path, options: &ApplyOptions) -> ApplyReport {
    let files = doc
        .files
        .iter()
        .map(|diff| {
            let outcome = apply_file(diff, root, options);
            if let FileOutcome::Failed { reason, .. } = &outcome {
                tracing::debug!(path = diff.display_path(), reason = %reason, "file diff failed");
            }
            FileResult {
                path: diff.display_path().to_string(),
                outcome,
            }
        })
        .collect();
    ApplyReport { files }
}

fn apply_file(diff: &FileDiff, root: &Path, options: &ApplyOptions) -> FileOutcome {
    match diff.mode() {
        FileMode::Create => apply_create(diff, root, options),
        _ => apply_existing(diff, root, options),
    }
}

fn apply_create(diff: &FileDiff, root: &Path, options: &ApplyOptions) -> FileOutcome {
    let target = match resolve(&diff.new_path, options.strip, root) {
        Ok(target) => target,
        Err(err) => return fail(None, err.to_string()),
    };
    if target.exists() {
        return fail(
            None,
            format!("cannot create {}: already exists", target.display()),
        );
    }

    let mut content = String::new();
    let mut placements = Vec::with_capacity(diff.hunks.len());
    for (idx, hunk) in diff.hunks.iter().enumerate() {
        for line in hunk.new_lines() {
            content.push_str(&render_line(line));
        }
        placements.push(HunkPlacement {
            hunk: idx + 1,
            offset: 0,
            fuzz: 0,
        });
    }

    if !options.dry_run {
        if let Err(err) = write_atomic(&target, content.as_bytes(), None) {
            return fail(None, format!("write {}: {err}", target.display()));
        }
    }
    FileOutcome::from_placements(placements)
}

fn apply_existing(diff: &FileDiff, root: &Path, options: &ApplyOptions) -> FileOutcome {
    let old_target = match resolve(&diff.old_path, options.strip, root) {
        Ok(target) => target,
        Err(err) => return fail(None, err.to_string()),
    };
    let deleting = diff.mode() == FileMode::Delete;
    let new_target = if deleting {
        old_target.clone()
    } else {
        match resolve(&diff.new_path, options.strip, root) {
            Ok(target) => target,
            Err(err) => return fail(None, err.to_string()),
        }
    };

    let bytes = match fs::read(&old_target) {
        Ok(bytes) => bytes,
        Err(err) => return fail(None, format!("read {}: {err}", old_target.display())),
    };
    let content = match String::from_utf8(bytes) {
        Ok(content) => content,
        Err(_) => {
            return fail(
                None,
                format!("{} is not valid UTF-8 text", old_target.display()),
            )
        }
    };

    // Raw lines keep their terminators so untouched regions round-trip
    // byte-for-byte, CRLF included.
    let mut current: Vec<String> = content
        .split_inclusive('\n')
        .map(str::to_string)
        .collect();

    let mut placements = Vec::with_capacity(diff.hunks.len());
    let mut delta: i64 = 0;
    for (idx, hunk) in diff.hunks.iter().enumerate() {
        let bare: Vec<&str> = current
            .iter()
            .map(|l| l.strip_suffix('\n').unwrap_or(l))
            .collect();
        let Some(located) = locate_hunk(&bare, hunk, delta, options.max_fuzz) else {
            return fail(
                Some(idx + 1),
                format!(
                    "no matching context within {} lines of line {}",
                    search_radius(hunk.old_count),
                    hunk.old_start
                ),
            );
        };
        current = splice(&current, hunk, &located);
        placements.push(HunkPlacement {
            hunk: idx + 1,
            offset: located.offset,
            fuzz: located.fuzz,
        });
        delta = located.offset + hunk.new_count as i64 - hunk.old_count as i64;
    }

    if deleting {
        if !current.is_empty() {
            return fail(
                None,
                format!(
                    "content remains after delete hunks; refusing to remove {}",
                    old_target.display()
                ),
            );
        }
        if !options.dry_run {
            if let Err(err) = fs::remove_file(&old_target) {
                return fail(None, format!("remove {}: {err}", old_target.display()));
            }
        }
        return FileOutcome::from_placements(placements);
    }

    if !options.dry_run {
        let permissions = fs::metadata(&old_target).ok().map(|m| m.permissions());
        let staged: String = current.concat();
        if let Err(err) = write_atomic(&new_target, staged.as_bytes(), permissions) {
            return fail(None, format!("write {}: {err}", new_target.display()));
        }
        if new_target != old_target {
            if let Err(err) = fs::remove_file(&old_target) {
                return fail(None, format!("remove {}: {err}", old_target.display()));
            }
        }
    }
    FileOutcome::from_placements(placements)
}

/// Produce the next file state: context lines keep the file's bytes, removed
/// lines drop out, added lines come from the patch.
fn splice(current: &[String], hunk: &Hunk, located: &Located) -> Vec<String> {
    let ops = &hunk.lines[located.lead_trim..hunk.lines.len() - located.tail_trim];
    let mut out = Vec::with_capacity(current.len() + hunk.new_count);
    out.extend_from_slice(&current[..located.core_position]);

    let mut file_idx = located.core_position;
    for op in ops {
        match op.kind {
            LineKind::Context => {
                out.push(current[file_idx].clone());
                file_idx += 1;
            }
            LineKind::Remove => file_idx += 1,
            LineKind::Add => out.push(render_line(op)),
        }
    }

    out.extend_from_slice(&current[file_idx..]);
    out
}

fn render_line(line: &HunkLine) -> String {
    if line.no_newline {
        line.content.clone()
    } else {
        format!("{}\n", line.content)
    }
}

fn fail(hunk: Option<usize>, reason: String) -> FileOutcome {
    FileOutcome::Failed { hunk, reason }
}

/// Stage-then-rename write, keeping the original file's permissions.
fn write_atomic(dest: &Path, bytes: &[u8], permissions: Option<fs::Permissions>) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let file_name = dest
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("patched");
    let tmp: PathBuf = dest
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!(".{file_name}.tmp"));
    fs::write(&tmp, bytes)?;
    if let Some(permissions) = permissions {
        fs::set_permissions(&tmp, permissions)?;
    }
    fs::rename(&tmp, dest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::document::{Hunk, HunkLine, LineKind};
    use crate::patch::locate::Located;

    fn line(kind: LineKind, content: &str) -> HunkLine {
        HunkLine::new(kind, content)
    }

    fn located(core_position: usize) -> Located {
        Located {
            core_position,
            offset: 0,
            fuzz: 0,
            lead_trim: 0,
            tail_trim: 0,
        }
    }

    #[test]
    fn splice_keeps_file_bytes_for_context() {
        let current = vec!["keep\r\n".to_string(), "old\n".to_string(), "tail\n".to_string()];
        let hunk = Hunk {
            old_start: 1,
            old_count: 2,
            new_start: 1,
            new_count: 2,
            lines: vec![
                line(LineKind::Context, "keep"),
                line(LineKind::Remove, "old"),
                line(LineKind::Add, "new"),
            ],
        };
        let out = splice(&current, &hunk, &located(0));
        assert_eq!(out, vec!["keep\r\n", "new\n", "tail\n"]);
    }

    #[test]
    fn splice_honors_fuzz_trims() {
        let current = vec!["EDITED\n".to_string(), "old\n".to_string(), "EDITED2\n".to_string()];
        let hunk = Hunk {
            old_start: 1,
            old_count: 3,
            new_start: 1,
            new_count: 3,
            lines: vec![
                line(LineKind::Context, "ctx1"),
                line(LineKind::Remove, "old"),
                line(LineKind::Add, "new"),
                line(LineKind::Context, "ctx2"),
            ],
        };
        let placement = Located {
            core_position: 1,
            offset: 0,
            fuzz: 1,
            lead_trim: 1,
            tail_trim: 1,
        };
        let out = splice(&current, &hunk, &placement);
        // Trimmed context stays as the file had it.
        assert_eq!(out, vec!["EDITED\n", "new\n", "EDITED2\n"]);
    }

    #[test]
    fn render_line_honors_no_newline_flag() {
        let mut l = line(LineKind::Add, "last");
        assert_eq!(render_line(&l), "last\n");
        l.no_newline = true;
        assert_eq!(render_line(&l), "last");
    }

    #[test]
    fn report_success_requires_no_failures() {
        let report = ApplyReport {
            files: vec![
                FileResult {
                    path: "a".to_string(),
                    outcome: FileOutcome::Applied { hunks: vec![] },
                },
                FileResult {
                    path: "b".to_string(),
                    outcome: FileOutcome::Failed {
                        hunk: Some(1),
                        reason: "mismatch".to_string(),
                    },
                },
            ],
        };
        assert!(!report.success());
        assert_eq!(report.failed_count(), 1);
    }

    #[test]
    fn outcome_classifies_offsets() {
        let clean = FileOutcome::from_placements(vec![HunkPlacement {
            hunk: 1,
            offset: 0,
            fuzz: 0,
        }]);
        assert!(matches!(clean, FileOutcome::Applied { .. }));

        let shifted = FileOutcome::from_placements(vec![HunkPlacement {
            hunk: 1,
            offset: 3,
            fuzz: 0,
        }]);
        assert!(matches!(shifted, FileOutcome::AppliedWithOffset { .. }));
    }
}
