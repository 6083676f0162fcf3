//! Hunk location: exact-first widening search with bounded fuzz.
//!
//! The locator finds where a hunk's old-side lines sit in the current file,
//! tolerating line-number drift (offset) and, at higher fuzz levels, edited
//! context at the hunk edges. It mirrors patch(1) reporting: the position
//! closest to the declared start wins, and equidistant candidates prefer the
//! lower line number.

use super::document::{Hunk, HunkLine};

/// Default fuzz ceiling, matching the patch(1) convention.
pub const DEFAULT_MAX_FUZZ: u8 = 2;

/// Floor for the symmetric search window around the expected position.
const MIN_SEARCH_RADIUS: usize = 32;

/// A successful placement of one hunk in the current file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Located {
    /// 0-based index of the matched core (old-side minus trimmed context).
    pub(crate) core_position: usize,
    /// Full-hunk displacement from the declared starting line.
    pub(crate) offset: i64,
    /// Fuzz level that produced the match.
    pub(crate) fuzz: u8,
    /// Leading context lines excluded from matching (left untouched on apply).
    pub(crate) lead_trim: usize,
    /// Trailing context lines excluded from matching.
    pub(crate) tail_trim: usize,
}

/// Search window radius for a hunk of `old_len` old-side lines.
pub(crate) fn search_radius(old_len: usize) -> usize {
    (3 * old_len).max(MIN_SEARCH_RADIUS)
}

/// Locate `hunk` in `file` (bare line contents of the current file state).
///
/// `file_delta` maps original-file coordinates to current coordinates,
/// accumulated from the placements of prior hunks in the same file.
pub(crate) fn locate_hunk(
    file: &[&str],
    hunk: &Hunk,
    file_delta: i64,
    max_fuzz: u8,
) -> Option<Located> {
    let declared = declared_start(hunk);
    let expected = declared + file_delta;
    let old: Vec<&HunkLine> = hunk.old_lines().collect();

    if old.is_empty() {
        // Pure insertion: nothing to match, place at the expected position.
        let position = expected.clamp(0, file.len() as i64) as usize;
        return Some(Located {
            core_position: position,
            offset: position as i64 - declared,
            fuzz: 0,
            lead_trim: 0,
            tail_trim: 0,
        });
    }

    let lead_run = hunk.leading_context();
    let tail_run = hunk.trailing_context();

    for whitespace_insensitive in [false, true] {
        if whitespace_insensitive && max_fuzz == 0 {
            break;
        }
        let mut tried = (usize::MAX, usize::MAX);
        for fuzz in 0..=max_fuzz {
            let lead_trim = (fuzz as usize).min(lead_run);
            let tail_trim = (fuzz as usize).min(tail_run);
            if (lead_trim, tail_trim) == tried {
                continue;
            }
            tried = (lead_trim, tail_trim);

            let core = &old[lead_trim..old.len() - tail_trim];
            if core.is_empty() {
                continue;
            }
            let core_expected = expected + lead_trim as i64;
            if let Some(position) = search(file, core, core_expected, whitespace_insensitive) {
                // A whitespace-insensitive match is never exact; report at
                // least fuzz 1 so callers can tell it apart from a clean one.
                let reported_fuzz = if whitespace_insensitive { fuzz.max(1) } else { fuzz };
                return Some(Located {
                    core_position: position,
                    offset: position as i64 - lead_trim as i64 - declared,
                    fuzz: reported_fuzz,
                    lead_trim,
                    tail_trim,
                });
            }
        }
    }

    None
}

/// 0-based position a hunk declares for its old-side block. Zero-count hunks
/// follow the unified-diff convention of naming the line they insert after.
pub(crate) fn declared_start(hunk: &Hunk) -> i64 {
    if hunk.old_count == 0 {
        hunk.old_start as i64
    } else {
        hunk.old_start as i64 - 1
    }
}

fn search(
    file: &[&str],
    core: &[&HunkLine],
    expected: i64,
    whitespace_insensitive: bool,
) -> Option<usize> {
    if file.len() < core.len() {
        return None;
    }
    let last_valid = (file.len() - core.len()) as i64;
    let radius = search_radius(core.len()) as i64;

    for distance in 0..=radius {
        // Lower position first so equidistant candidates prefer earlier lines.
        for candidate in [expected - distance, expected + distance] {
            if candidate < 0 || candidate > last_valid {
                continue;
            }
            let position = candidate as usize;
            if matches_at(file, core, position, whitespace_insensitive) {
                return Some(position);
            }
            if distance == 0 {
                break;
            }
        }
    }
    None
}

fn matches_at(
    file: &[&str],
    core: &[&HunkLine],
    position: usize,
    whitespace_insensitive: bool,
) -> bool {
    core.iter().enumerate().all(|(idx, line)| {
        let actual = file[position + idx];
        if whitespace_insensitive {
            actual.trim_end() == line.content.trim_end()
        } else {
            actual == line.content
        }
    })
}
