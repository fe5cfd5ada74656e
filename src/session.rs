//! Process-wide ambient stores.
//!
//! `spec.md` §5: the interned string store and the file-mark store are the
//! only state shared across an entire run; everything else belongs to the
//! current translation unit or parser/lowering context. Bundling the two
//! into one `Session` struct is purely for convenient threading through
//! the stages — it owns no per-translation-unit state itself.

use crate::mark::MarkStore;
use crate::strtab::StrTab;

#[derive(Debug, Default)]
pub struct Session {
    pub marks: MarkStore,
    pub strtab: StrTab,
}

impl Session {
    pub fn new() -> Self {
        Session {
            marks: MarkStore::new(),
            strtab: StrTab::new(),
        }
    }
}
