//! Unified-diff text parser.
//!
//! File sections are delimited by `--- ` / `+++ ` header pairs; hunk bodies
//! are consumed strictly by the counts declared in their `@@` headers, so a
//! malformed hunk is rejected here rather than surfacing as a bad apply later.
//! Git metadata lines between sections (`diff --git`, `index`, mode and rename
//! headers) are skipped.

use regex::Regex;
use thiserror::Error;

use super::document::{FileDiff, Hunk, HunkLine, LineKind, PatchDocument};

const HUNK_HEADER: &str = r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@";

/// Malformed diff syntax. Fatal for the whole document; `line` is 1-based.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line}: hunk header outside a file section (missing ---/+++ pair)")]
    OrphanHunk { line: usize },
    #[error("line {line}: `--- ` header without a matching `+++ ` line")]
    UnpairedHeader { line: usize },
    #[error("line {line}: malformed hunk header")]
    BadHunkHeader { line: usize },
    #[error("line {line}: unexpected prefix {found:?} inside hunk body")]
    UnexpectedPrefix { line: usize, found: char },
    #[error("line {line}: hunk body ends before its declared line counts are met")]
    TruncatedHunk { line: usize },
    #[error("line {line}: hunk body exceeds its declared line counts")]
    CountOverflow { line: usize },
    #[error("line {line}: hunk overlaps the previous hunk in original numbering")]
    OverlappingHunks { line: usize },
    #[error("line {line}: `\\` marker without a preceding hunk line")]
    DanglingMarker { line: usize },
}

/// Parse a unified-diff document into its structured form.
pub fn parse(text: &str) -> Result<PatchDocument, ParseError> {
    let header_re = Regex::new(HUNK_HEADER).expect("static hunk header pattern");
    let mut lines: Vec<&str> = text.split('\n').collect();
    // A trailing newline yields one final "" element that is not a document
    // line; dropping it keeps the empty-context leniency below scoped to
    // lines the patch author actually wrote.
    if lines.last() == Some(&"") {
        lines.pop();
    }
    let mut files = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if let Some(old_raw) = line.strip_prefix("--- ") {
            let header_line = i + 1;
            let new_raw = lines
                .get(i + 1)
                .and_then(|l| l.strip_prefix("+++ "))
                .ok_or(ParseError::UnpairedHeader { line: header_line })?;
            let old_path = header_path(old_raw);
            let new_path = header_path(new_raw);
            i += 2;

            let mut hunks: Vec<Hunk> = Vec::new();
            while i < lines.len() && lines[i].starts_with("@@") {
                let hunk_line = i + 1;
                let (hunk, consumed) = parse_hunk(&lines, i, &header_re)?;
                if let Some(prev) = hunks.last() {
                    let prev_end = prev.old_start + prev.old_count.max(1);
                    if hunk.old_start < prev_end {
                        return Err(ParseError::OverlappingHunks { line: hunk_line });
                    }
                }
                hunks.push(hunk);
                i += consumed;
            }

            files.push(FileDiff {
                old_path,
                new_path,
                hunks,
            });
        } else if line.starts_with("@@") {
            return Err(ParseError::OrphanHunk { line: i + 1 });
        } else {
            // Git metadata, mail headers, or blank separators between sections.
            i += 1;
        }
    }

    Ok(PatchDocument { files })
}

/// Declared path from a header line: everything before the timestamp column.
fn header_path(raw: &str) -> String {
    raw.split('\t').next().unwrap_or(raw).to_string()
}

fn parse_hunk(
    lines: &[&str],
    start: usize,
    header_re: &Regex,
) -> Result<(Hunk, usize), ParseError> {
    let header_line = start + 1;
    let caps = header_re
        .captures(lines[start])
        .ok_or(ParseError::BadHunkHeader { line: header_line })?;
    let field = |idx: usize, default: usize| -> Result<usize, ParseError> {
        match caps.get(idx) {
            Some(m) => m
                .as_str()
                .parse()
                .map_err(|_| ParseError::BadHunkHeader { line: header_line }),
            None => Ok(default),
        }
    };
    let old_start = field(1, 1)?;
    let old_count = field(2, 1)?;
    let new_start = field(3, 1)?;
    let new_count = field(4, 1)?;

    let mut body: Vec<HunkLine> = Vec::with_capacity(old_count + new_count);
    let mut old_rem = old_count;
    let mut new_rem = new_count;
    let mut i = start + 1;

    while old_rem > 0 || new_rem > 0 {
        let Some(&raw) = lines.get(i) else {
            return Err(ParseError::TruncatedHunk { line: header_line });
        };
        if raw.starts_with('\\') {
            let last = body
                .last_mut()
                .ok_or(ParseError::DanglingMarker { line: i + 1 })?;
            last.no_newline = true;
            i += 1;
            continue;
        }
        let (kind, content) = match raw.chars().next() {
            Some(' ') => (LineKind::Context, &raw[1..]),
            Some('-') => (LineKind::Remove, &raw[1..]),
            Some('+') => (LineKind::Add, &raw[1..]),
            // Tools that strip trailing whitespace turn ` ` context lines
            // into empty lines; accept them as empty context.
            None => (LineKind::Context, ""),
            Some(found) => return Err(ParseError::UnexpectedPrefix { line: i + 1, found }),
        };
        match kind {
            LineKind::Context => {
                if old_rem == 0 || new_rem == 0 {
                    return Err(ParseError::CountOverflow { line: i + 1 });
                }
                old_rem -= 1;
                new_rem -= 1;
            }
            LineKind::Remove => {
                if old_rem == 0 {
                    return Err(ParseError::CountOverflow { line: i + 1 });
                }
                old_rem -= 1;
            }
            LineKind::Add => {
                if new_rem == 0 {
                    return Err(ParseError::CountOverflow { line: i + 1 });
                }
                new_rem -= 1;
            }
        }
        body.push(HunkLine::new(kind, content));
        i += 1;
    }

    // A trailing no-newline marker may follow the final body line.
    if let Some(raw) = lines.get(i) {
        if raw.starts_with('\\') {
            if let Some(last) = body.last_mut() {
                last.no_newline = true;
            }
            i += 1;
        }
    }

    Ok((
        Hunk {
            old_start,
            old_count,
            new_start,
            new_count,
            lines: body,
        },
        i - start,
    ))
}
