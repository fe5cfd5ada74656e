//! Source marks.
//!
//! Every token, AST node and diagnostic carries a [`FMark`] identifying
//! where it came from. Marks are handed out by an append-only [`MarkStore`]
//! so a `MarkId` handed to any later stage stays valid for the life of the
//! compilation, even after the store has grown.

use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

/// Handle into a [`MarkStore`]. Cheap to copy, stable for the process
/// lifetime of the store that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkId(u32);

/// A source location: filename, line, column, and (for tokens produced by
/// macro expansion) the mark of the point the expansion was triggered from.
#[derive(Debug, Clone, PartialEq)]
pub struct FMark {
    pub file: Rc<PathBuf>,
    pub line: u32,
    pub col: u32,
    /// The mark in the expanding context, if this mark was produced while
    /// expanding a macro. Chasing this chain recovers the full expansion
    /// history for a token.
    pub prev: Option<MarkId>,
}

impl fmt::Display for FMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.col)
    }
}

/// Append-only arena of [`FMark`]s.
///
/// Marks are never removed or mutated once inserted, so a `MarkId` is valid
/// for as long as the `MarkStore` itself is alive; the store outlives every
/// other compiler structure (`spec.md` §5).
#[derive(Debug, Default)]
pub struct MarkStore {
    marks: Vec<FMark>,
}

impl MarkStore {
    pub fn new() -> Self {
        MarkStore { marks: Vec::new() }
    }

    pub fn insert(&mut self, mark: FMark) -> MarkId {
        let id = MarkId(self.marks.len() as u32);
        self.marks.push(mark);
        id
    }

    pub fn root(&mut self, file: Rc<PathBuf>, line: u32, col: u32) -> MarkId {
        self.insert(FMark {
            file,
            line,
            col,
            prev: None,
        })
    }

    pub fn expanded_from(
        &mut self,
        file: Rc<PathBuf>,
        line: u32,
        col: u32,
        prev: MarkId,
    ) -> MarkId {
        self.insert(FMark {
            file,
            line,
            col,
            prev: Some(prev),
        })
    }

    pub fn get(&self, id: MarkId) -> &FMark {
        &self.marks[id.0 as usize]
    }

    /// Walk the expansion chain starting at `id`, innermost first.
    pub fn chain(&self, id: MarkId) -> Vec<&FMark> {
        let mut out = Vec::new();
        let mut cur = Some(id);
        while let Some(m) = cur {
            let mark = self.get(m);
            out.push(mark);
            cur = mark.prev;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(name: &str) -> Rc<PathBuf> {
        Rc::new(PathBuf::from(name))
    }

    #[test]
    fn root_mark_has_no_prev() {
        let mut store = MarkStore::new();
        let id = store.root(path("a.c"), 1, 1);
        assert!(store.get(id).prev.is_none());
    }

    #[test]
    fn mark_ids_stay_valid_after_growth() {
        let mut store = MarkStore::new();
        let first = store.root(path("a.c"), 1, 1);
        for i in 0..1000 {
            store.root(path("a.c"), i, 1);
        }
        assert_eq!(store.get(first).line, 1);
    }

    #[test]
    fn expansion_chain_walks_to_root() {
        let mut store = MarkStore::new();
        let root = store.root(path("a.c"), 10, 1);
        let inner = store.expanded_from(path("a.c"), 10, 5, root);
        let chain = store.chain(inner);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[1].line, 10);
    }

    #[test]
    fn display_format_matches_file_line_col() {
        let mut store = MarkStore::new();
        let id = store.root(path("foo.c"), 3, 7);
        assert_eq!(format!("{}", store.get(id)), "foo.c:3:7");
    }
}
