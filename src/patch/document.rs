//! Data model for parsed unified-diff documents.
//!
//! A `PatchDocument` is an immutable value once parsed: declared paths are
//! stored exactly as written in the diff headers, and strip-level handling is
//! deferred to apply time so one document can be replayed against different
//! roots.

/// Old/new path used by diffs to mark file creation and deletion.
pub const DEV_NULL: &str = "/dev/null";

/// Role of a single hunk body line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Context,
    Add,
    Remove,
}

/// One body line of a hunk.
///
/// `content` excludes the trailing `\n` but keeps any `\r` verbatim so CRLF
/// content round-trips byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HunkLine {
    pub kind: LineKind,
    pub content: String,
    /// Set when a `\ No newline at end of file` marker followed this line.
    pub no_newline: bool,
}

impl HunkLine {
    pub fn new(kind: LineKind, content: &str) -> Self {
        Self {
            kind,
            content: content.to_string(),
            no_newline: false,
        }
    }
}

/// One change region: declared old/new line ranges plus the ordered body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    /// 1-based starting line in the original file (0 for pure insertions).
    pub old_start: usize,
    pub old_count: usize,
    /// 1-based starting line in the new file.
    pub new_start: usize,
    pub new_count: usize,
    pub lines: Vec<HunkLine>,
}

impl Hunk {
    /// Old-side lines: context plus removals, in order.
    pub fn old_lines(&self) -> impl Iterator<Item = &HunkLine> {
        self.lines.iter().filter(|l| l.kind != LineKind::Add)
    }

    /// New-side lines: context plus additions, in order.
    pub fn new_lines(&self) -> impl Iterator<Item = &HunkLine> {
        self.lines.iter().filter(|l| l.kind != LineKind::Remove)
    }

    /// Number of leading context lines before the first add/remove.
    pub fn leading_context(&self) -> usize {
        self.lines
            .iter()
            .take_while(|l| l.kind == LineKind::Context)
            .count()
    }

    /// Number of trailing context lines after the last add/remove.
    pub fn trailing_context(&self) -> usize {
        let lead = self.leading_context();
        if lead == self.lines.len() {
            // All-context hunk: avoid double-counting the same lines.
            return 0;
        }
        self.lines
            .iter()
            .rev()
            .take_while(|l| l.kind == LineKind::Context)
            .count()
    }
}

/// How a file diff affects the target tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Modify,
    Create,
    Delete,
    Rename,
}

/// All hunks declared against one file, in ascending original-line order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    /// Path from the `--- ` header, verbatim (timestamp column removed).
    pub old_path: String,
    /// Path from the `+++ ` header, verbatim.
    pub new_path: String,
    pub hunks: Vec<Hunk>,
}

impl FileDiff {
    /// Syntactic classification of this diff. Conventional `a/` / `b/`
    /// prefixes are tolerated: `a/x` -> `b/x` is a modification, not a
    /// rename. The applier makes the final rename decision on resolved,
    /// strip-adjusted paths.
    pub fn mode(&self) -> FileMode {
        match (self.old_path == DEV_NULL, self.new_path == DEV_NULL) {
            (true, _) => FileMode::Create,
            (_, true) => FileMode::Delete,
            _ if self.old_path != self.new_path
                && drop_first_component(&self.old_path) != drop_first_component(&self.new_path) =>
            {
                FileMode::Rename
            }
            _ => FileMode::Modify,
        }
    }

    /// Declared path the result refers to: the surviving side of the diff.
    pub fn display_path(&self) -> &str {
        if self.new_path == DEV_NULL {
            &self.old_path
        } else {
            &self.new_path
        }
    }
}

/// Path without its first component, or the whole path when it has only one.
fn drop_first_component(path: &str) -> &str {
    match path.split_once('/') {
        Some((_, rest)) if !rest.is_empty() => rest,
        _ => path,
    }
}

/// An ordered sequence of file diffs parsed from one unified-diff text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PatchDocument {
    pub files: Vec<FileDiff>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hunk(lines: Vec<HunkLine>) -> Hunk {
        Hunk {
            old_start: 1,
            old_count: lines.iter().filter(|l| l.kind != LineKind::Add).count(),
            new_start: 1,
            new_count: lines.iter().filter(|l| l.kind != LineKind::Remove).count(),
            lines,
        }
    }

    #[test]
    fn file_mode_from_paths() {
        let create = FileDiff {
            old_path: DEV_NULL.to_string(),
            new_path: "b/new.txt".to_string(),
            hunks: vec![],
        };
        assert_eq!(create.mode(), FileMode::Create);
        assert_eq!(create.display_path(), "b/new.txt");

        let delete = FileDiff {
            old_path: "a/old.txt".to_string(),
            new_path: DEV_NULL.to_string(),
            hunks: vec![],
        };
        assert_eq!(delete.mode(), FileMode::Delete);
        assert_eq!(delete.display_path(), "a/old.txt");

        let rename = FileDiff {
            old_path: "a/before.txt".to_string(),
            new_path: "b/after.txt".to_string(),
            hunks: vec![],
        };
        assert_eq!(rename.mode(), FileMode::Rename);

        let prefixed = FileDiff {
            old_path: "a/same.txt".to_string(),
            new_path: "b/same.txt".to_string(),
            hunks: vec![],
        };
        assert_eq!(prefixed.mode(), FileMode::Modify);
    }

    #[test]
    fn context_runs() {
        let h = hunk(vec![
            HunkLine::new(LineKind::Context, "a"),
            HunkLine::new(LineKind::Context, "b"),
            HunkLine::new(LineKind::Remove, "c"),
            HunkLine::new(LineKind::Add, "d"),
            HunkLine::new(LineKind::Context, "e"),
        ]);
        assert_eq!(h.leading_context(), 2);
        assert_eq!(h.trailing_context(), 1);
        assert_eq!(h.old_lines().count(), 4);
        assert_eq!(h.new_lines().count(), 4);
    }

    #[test]
    fn all_context_hunk_does_not_double_count() {
        let h = hunk(vec![
            HunkLine::new(LineKind::Context, "a"),
            HunkLine::new(LineKind::Context, "b"),
        ]);
        assert_eq!(h.leading_context(), 2);
        assert_eq!(h.trailing_context(), 0);
    }
}
