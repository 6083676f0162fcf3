//! Strip-level path resolution with target-root containment.
//!
//! Stripping removes exactly N leading components from the declared path,
//! regardless of what those components are. Resolution never consults the
//! filesystem; containment is enforced syntactically so a hostile patch
//! cannot write outside the target root.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Stripped path is unusable for this target root. Fatal for the file entry
/// only; sibling files in the same document may still be attempted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path {path:?} is empty after stripping {strip} component(s)")]
    EmptyAfterStrip { path: String, strip: usize },
    #[error("path {path:?} is absolute; declared patch paths must be relative")]
    Absolute { path: String },
    #[error("path {path:?} escapes the target root")]
    EscapesRoot { path: String },
}

/// Resolve a declared diff path against `root`, dropping `strip` leading
/// components first.
pub fn resolve(declared: &str, strip: usize, root: &Path) -> Result<PathBuf, PathError> {
    let path = Path::new(declared);
    if path.is_absolute() {
        return Err(PathError::Absolute {
            path: declared.to_string(),
        });
    }

    let mut components = path.components();
    for _ in 0..strip {
        if components.next().is_none() {
            return Err(PathError::EmptyAfterStrip {
                path: declared.to_string(),
                strip,
            });
        }
    }
    let stripped = components.as_path();
    if stripped.as_os_str().is_empty() {
        return Err(PathError::EmptyAfterStrip {
            path: declared.to_string(),
            strip,
        });
    }

    for component in stripped.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => {
                return Err(PathError::EscapesRoot {
                    path: declared.to_string(),
                })
            }
        }
    }

    Ok(root.join(stripped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_zero_keeps_path() {
        let resolved = resolve("sub/file.txt", 0, Path::new("/root")).unwrap();
        assert_eq!(resolved, PathBuf::from("/root/sub/file.txt"));
    }

    #[test]
    fn strip_one_removes_exactly_one_component() {
        // `a/sub/file.txt` at strip 1 resolves to `<root>/sub/file.txt`,
        // regardless of what the leading component is.
        let resolved = resolve("a/sub/file.txt", 1, Path::new("/root")).unwrap();
        assert_eq!(resolved, PathBuf::from("/root/sub/file.txt"));
    }

    #[test]
    fn strip_past_end_is_an_error() {
        let err = resolve("a/b", 3, Path::new("/root")).unwrap_err();
        assert!(matches!(err, PathError::EmptyAfterStrip { strip: 3, .. }));
    }

    #[test]
    fn strip_to_empty_is_an_error() {
        let err = resolve("a/b", 2, Path::new("/root")).unwrap_err();
        assert!(matches!(err, PathError::EmptyAfterStrip { .. }));
    }

    #[test]
    fn absolute_paths_are_rejected() {
        let err = resolve("/etc/passwd", 0, Path::new("/root")).unwrap_err();
        assert!(matches!(err, PathError::Absolute { .. }));
    }

    #[test]
    fn parent_traversal_is_rejected() {
        let err = resolve("a/../../escape.txt", 1, Path::new("/root")).unwrap_err();
        assert!(matches!(err, PathError::EscapesRoot { .. }));
    }
}
