//! Deterministic unified-diff patch engine.
//!
//! The engine is a pure function of (document, target root, options): parse a
//! diff with [`parser::parse`], then apply it with [`apply_document`]. It
//! performs no version-control operations and never force-applies a hunk
//! whose context does not match.

pub mod apply;
pub mod document;
pub mod locate;
pub mod parser;
pub mod resolve;

pub use apply::{
    apply_document, ApplyOptions, ApplyReport, FileOutcome, FileResult, HunkPlacement,
};
pub use document::{FileDiff, FileMode, Hunk, HunkLine, LineKind, PatchDocument, DEV_NULL};
pub use locate::DEFAULT_MAX_FUZZ;
pub use parser::{parse, ParseError};
pub use resolve::{resolve, PathError};
