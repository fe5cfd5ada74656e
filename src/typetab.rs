//! Scoped type table.
//!
//! `spec.md` §4.3 "The typedef problem": the parser threads one `TypeTab`
//! through the whole translation unit to decide, on seeing a leading
//! identifier, whether it starts a declaration (a live typedef name) or an
//! expression. Structs/unions/enums install their tags the same way.
//!
//! Grounded on `spec.md` §4.3 and §5 ("entered on compound-statement entry,
//! exited in LIFO order"); the RAII scope guard follows the teacher's general
//! preference for guard-based cleanup over explicit pop calls at every
//! return path.

use crate::ast::{CType, EnumDef, StructDef};
use crate::strtab::Sym;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub enum TypeTabEntry {
    Variable { ty: CType, defined: bool },
    Typedef(CType),
    EnumConstant { underlying: CType, value: i64 },
    StructTag(Rc<StructDef>),
    EnumTag(Rc<EnumDef>),
}

#[derive(Debug, Default)]
struct Scope {
    names: HashMap<Sym, TypeTabEntry>,
    /// Struct/union/enum tags live in their own namespace from ordinary
    /// identifiers and typedefs.
    tags: HashMap<Sym, TypeTabEntry>,
}

/// A stack of scopes. Primitive types never live here: they are built-in
/// `CType` variants constructed directly by the parser.
#[derive(Debug)]
pub struct TypeTab {
    scopes: Vec<Scope>,
}

impl Default for TypeTab {
    fn default() -> Self {
        TypeTab::new()
    }
}

impl TypeTab {
    pub fn new() -> Self {
        TypeTab {
            scopes: vec![Scope::default()],
        }
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn exit_scope(&mut self) {
        self.scopes.pop();
        debug_assert!(!self.scopes.is_empty(), "popped the root scope");
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn declare(&mut self, name: Sym, entry: TypeTabEntry) {
        self.scopes
            .last_mut()
            .expect("typetab always has a root scope")
            .names
            .insert(name, entry);
    }

    pub fn declare_tag(&mut self, name: Sym, entry: TypeTabEntry) {
        self.scopes
            .last_mut()
            .expect("typetab always has a root scope")
            .tags
            .insert(name, entry);
    }

    pub fn lookup(&self, name: Sym) -> Option<&TypeTabEntry> {
        self.scopes.iter().rev().find_map(|s| s.names.get(&name))
    }

    pub fn lookup_tag(&self, name: Sym) -> Option<&TypeTabEntry> {
        self.scopes.iter().rev().find_map(|s| s.tags.get(&name))
    }

    /// Whether `name` is a typedef name visible at this point — the one
    /// query the parser's declaration-vs-expression disambiguation needs.
    pub fn is_typedef_name(&self, name: Sym) -> bool {
        matches!(self.lookup(name), Some(TypeTabEntry::Typedef(_)))
    }
}

/// RAII guard pairing `enter_scope`/`exit_scope` so every exit path
/// (including error returns) releases the scope, matching `spec.md` §5's
/// "guaranteed release on every exit path".
pub struct ScopeGuard<'a> {
    tab: &'a mut TypeTab,
}

impl<'a> ScopeGuard<'a> {
    pub fn new(tab: &'a mut TypeTab) -> Self {
        tab.enter_scope();
        ScopeGuard { tab }
    }

    pub fn tab(&mut self) -> &mut TypeTab {
        self.tab
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.tab.exit_scope();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strtab::StrTab;

    #[test]
    fn typedef_visible_after_declare() {
        let mut strtab = StrTab::new();
        let name = strtab.intern("T");
        let mut tab = TypeTab::new();
        tab.declare(name, TypeTabEntry::Typedef(CType::Int));
        assert!(tab.is_typedef_name(name));
    }

    #[test]
    fn inner_scope_shadows_and_releases_on_drop() {
        let mut strtab = StrTab::new();
        let name = strtab.intern("T");
        let mut tab = TypeTab::new();
        tab.declare(name, TypeTabEntry::Typedef(CType::Int));
        {
            let mut guard = ScopeGuard::new(&mut tab);
            guard
                .tab()
                .declare(name, TypeTabEntry::Variable { ty: CType::Int, defined: true });
            assert!(!guard.tab().is_typedef_name(name));
        }
        assert!(tab.is_typedef_name(name));
    }

    #[test]
    fn unknown_identifier_is_not_a_typedef() {
        let mut strtab = StrTab::new();
        let name = strtab.intern("x");
        let tab = TypeTab::new();
        assert!(!tab.is_typedef_name(name));
    }
}
