//! Compiler configuration.
//!
//! Plain data, built by `main.rs` from CLI flags and threaded down into the
//! preprocessor and driver (`spec.md` §0 "Crate shape"). Kept as an explicit
//! struct, independent of `clap`, so library callers (tests, `lib.rs`'s
//! `compile_to_ir`) can construct one without going through argument
//! parsing at all.

use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct CompilerConfig {
    /// `-I` search paths, in the order they should be tried.
    pub include_paths: Vec<PathBuf>,
    /// `-D NAME` or `-D NAME=VALUE` predefines, applied in order.
    pub defines: Vec<String>,
    /// `-U NAME` removals, applied after all defines.
    pub undefines: Vec<String>,
    /// `-o` output path; `None` means stdout.
    pub output: Option<PathBuf>,
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_defines_or_includes() {
        let cfg = CompilerConfig::default();
        assert!(cfg.include_paths.is_empty());
        assert!(cfg.defines.is_empty());
        assert!(cfg.undefines.is_empty());
        assert!(cfg.output.is_none());
    }
}
