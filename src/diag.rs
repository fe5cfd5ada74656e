//! Diagnostic logger.
//!
//! Mirrors `examples/original_source/src/util/logger.h`: a sink that accepts
//! error/warning/note messages keyed to a source mark, and exposes
//! `had_error`/`had_warning` queries the driver uses to pick the process
//! exit code (`spec.md` §7 — warnings never affect exit status, notes never
//! appear without a preceding error or warning).

use crate::mark::{FMark, MarkStore};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub mark: Option<MarkId>,
    pub message: String,
}

use crate::mark::MarkId;

impl Diagnostic {
    pub fn format(&self, marks: &MarkStore) -> String {
        match self.mark {
            Some(id) => {
                let mark: &FMark = marks.get(id);
                format!("{}: {}: {}", mark, self.severity, self.message)
            }
            None => format!("<unknown location>: {}: {}", self.severity, self.message),
        }
    }
}

/// Accumulates diagnostics for one compilation run.
#[derive(Debug, Default)]
pub struct Diag {
    diagnostics: Vec<Diagnostic>,
}

impl Diag {
    pub fn new() -> Self {
        Diag {
            diagnostics: Vec::new(),
        }
    }

    pub fn error(&mut self, mark: Option<MarkId>, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            mark,
            message: message.into(),
        });
    }

    pub fn warning(&mut self, mark: Option<MarkId>, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            mark,
            message: message.into(),
        });
    }

    pub fn note(&mut self, mark: Option<MarkId>, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Note,
            mark,
            message: message.into(),
        });
    }

    pub fn had_error(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn had_warning(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Warning)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Process exit code per `spec.md` §7: success iff no error was logged.
    pub fn exit_code(&self) -> i32 {
        if self.had_error() {
            1
        } else {
            0
        }
    }

    pub fn render_all(&self, marks: &MarkStore) -> String {
        self.diagnostics
            .iter()
            .map(|d| d.format(marks))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::rc::Rc;

    #[test]
    fn no_diagnostics_means_success() {
        let diag = Diag::new();
        assert_eq!(diag.exit_code(), 0);
        assert!(!diag.had_error());
    }

    #[test]
    fn warning_alone_does_not_affect_exit_code() {
        let mut diag = Diag::new();
        diag.warning(None, "just a warning");
        assert_eq!(diag.exit_code(), 0);
        assert!(diag.had_warning());
        assert!(!diag.had_error());
    }

    #[test]
    fn error_forces_failure_exit_code() {
        let mut diag = Diag::new();
        diag.error(None, "boom");
        assert_eq!(diag.exit_code(), 1);
    }

    #[test]
    fn format_matches_file_line_col_level_message() {
        let mut marks = MarkStore::new();
        let id = marks.root(Rc::new(PathBuf::from("a.c")), 3, 5);
        let mut diag = Diag::new();
        diag.error(Some(id), "undeclared identifier 'x'");
        let rendered = diag.render_all(&marks);
        assert_eq!(rendered, "a.c:3:5: error: undeclared identifier 'x'");
    }
}
