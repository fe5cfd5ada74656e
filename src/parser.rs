//! Recursive-descent parser: `spec.md` §4.3.
//!
//! Grounded on `examples/original_source/src/parser/parser.c` and
//! `parser_priv.h` for grammar shape and the `(name, type-chain)`
//! declarator result; teacher's `crates/compiler/src/parser.rs` for Rust
//! idiom: a `Parser { tokens, pos }` struct, `check`/`consume`/`advance`
//! helpers, and one test per grammar construct.

use crate::ast::*;
use crate::mark::MarkId;
use crate::session::Session;
use crate::strtab::Sym;
use crate::token::{IntSuffix, Keyword, Punct, Token, TokenKind};
use crate::typetab::{TypeTab, TypeTabEntry};
use std::rc::Rc;

/// `spec.md` §4.3 "Backtracking policy": declaration-specifier, pointer,
/// declarator and qualifier helpers report "nothing matched" without
/// consuming input rather than throwing (`None`/no-advance), so callers
/// compose them cleanly instead of relying on general backtracking.
pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    session: &'a mut Session,
    diag: &'a mut crate::diag::Diag,
    pub typetab: TypeTab,
    /// Names parsed alongside the most recently parsed parameter list, kept
    /// so a function *definition* can re-declare them in the body's scope
    /// (`CType::Func::params` only carries types, per `spec.md` §3).
    last_param_names: Vec<Option<Sym>>,
}

pub fn parse(tokens: Vec<Token>, session: &mut Session, diag: &mut crate::diag::Diag) -> TranslationUnit {
    let mut p = Parser {
        tokens,
        pos: 0,
        session,
        diag,
        typetab: TypeTab::new(),
        last_param_names: Vec::new(),
    };
    p.parse_translation_unit()
}

impl<'a> Parser<'a> {
    fn cur(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn at_eof(&self) -> bool {
        matches!(self.cur().kind, TokenKind::Eof) || self.pos >= self.tokens.len()
    }

    fn mark(&self) -> Option<MarkId> {
        Some(self.cur().mark)
    }

    fn bump(&mut self) -> Token {
        let t = self.cur().clone();
        if !self.at_eof() {
            self.pos += 1;
        }
        t
    }

    fn text(&self, sym: Sym) -> String {
        self.session.strtab.resolve(sym).to_string()
    }

    fn error(&mut self, msg: impl Into<String>) {
        self.diag.error(self.mark(), msg.into());
    }

    fn check_punct(&self, p: Punct) -> bool {
        matches!(self.cur().kind, TokenKind::Punct(x) if x == p)
    }

    fn eat_punct(&mut self, p: Punct) -> bool {
        if self.check_punct(p) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: Punct) -> bool {
        if self.eat_punct(p) {
            true
        } else {
            self.error(format!("expected '{}'", p.spelling()));
            false
        }
    }

    fn check_kw(&self, k: Keyword) -> bool {
        matches!(self.cur().kind, TokenKind::Keyword(x) if x == k)
    }

    fn eat_kw(&mut self, k: Keyword) -> bool {
        if self.check_kw(k) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn ident_sym(&self) -> Option<Sym> {
        match self.cur().kind {
            TokenKind::Ident(s) => Some(s),
            _ => None,
        }
    }

    /// Consume tokens up to (and including) the next `;`, `}`, or the start
    /// of a new declaration-specifier, without emitting any AST node for
    /// the failed construct (`spec.md` §4.3 "Error recovery").
    fn synchronize(&mut self) {
        loop {
            if self.at_eof() {
                return;
            }
            if self.check_punct(Punct::Semi) {
                self.bump();
                return;
            }
            if self.check_punct(Punct::RBrace) {
                return;
            }
            if self.starts_decl_specifier() {
                return;
            }
            self.bump();
        }
    }

    // ---- translation unit -------------------------------------------------

    fn parse_translation_unit(&mut self) -> TranslationUnit {
        let mut tu = TranslationUnit::new();
        while !self.at_eof() {
            let start_pos = self.pos;
            self.parse_external_decl(&mut tu);
            if self.pos == start_pos {
                // Safety valve: a production that consumed nothing would
                // loop forever; force progress via synchronization.
                self.synchronize();
            }
        }
        tu
    }

    fn parse_external_decl(&mut self, tu: &mut TranslationUnit) {
        let start_pos = self.pos;
        let Some(base) = self.parse_decl_specifiers() else {
            return;
        };
        if self.eat_punct(Punct::Semi) {
            // `struct S { ... };` with no declarator.
            tu.decls.push(GDecl::Global { ty: base, declarators: Vec::new(), mark: self.mark() });
            return;
        }
        let (name, ty, mark) = match self.parse_declarator(base.clone()) {
            Some(d) => d,
            None => {
                self.error("expected declarator");
                if self.pos == start_pos {
                    self.bump();
                }
                return;
            }
        };

        let is_typedef = spec_is_typedef(&base);
        if is_typedef {
            if let Some(n) = name {
                self.typetab.declare(n, TypeTabEntry::Typedef(ty));
            }
            self.finish_declarator_list(base, mark, true);
            return;
        }

        if self.check_punct(Punct::LBrace) {
            // Function definition.
            if let Some(n) = name {
                self.typetab
                    .declare(n, TypeTabEntry::Variable { ty: ty.clone(), defined: true });
            }
            let param_names = if let CType::Func { params, .. } = &ty {
                let mut names = std::mem::take(&mut self.last_param_names);
                names.resize(params.len(), None);
                names
            } else {
                Vec::new()
            };
            let param_types = if let CType::Func { params, .. } = &ty { params.clone() } else { Vec::new() };
            // Params live in a scope that wraps the whole body, entered
            // manually (rather than via `ScopeGuard`) since it must stay
            // open across the nested `parse_compound_stmt` call, which opens
            // its own inner block scope on top of it.
            self.typetab.enter_scope();
            for (n, t) in param_names.iter().zip(param_types.iter()) {
                if let Some(n) = n {
                    self.typetab.declare(*n, TypeTabEntry::Variable { ty: t.clone(), defined: true });
                }
            }
            let body = self.parse_compound_stmt();
            self.typetab.exit_scope();
            let name = name.unwrap_or_else(|| self.session.strtab.intern("<anonymous>"));
            tu.decls.push(GDecl::Function {
                name,
                ty,
                param_names,
                body: Some(body),
                labels: std::cell::RefCell::new(Vec::new()),
                unresolved_gotos: std::cell::RefCell::new(Vec::new()),
                mark,
            });
            return;
        }

        // Global declaration, possibly with an initializer and further
        // comma-separated declarators.
        let init = if self.eat_punct(Punct::Assign) {
            Some(self.parse_initializer())
        } else {
            None
        };
        if let Some(n) = name {
            self.typetab
                .declare(n, TypeTabEntry::Variable { ty: ty.clone(), defined: init.is_some() });
        }
        let mut declarators = vec![Declarator { name, ty, init, mark }];
        while self.eat_punct(Punct::Comma) {
            let Some((n2, ty2, m2)) = self.parse_declarator(base.clone()) else {
                break;
            };
            let init2 = if self.eat_punct(Punct::Assign) {
                Some(self.parse_initializer())
            } else {
                None
            };
            if let Some(n) = n2 {
                self.typetab
                    .declare(n, TypeTabEntry::Variable { ty: ty2.clone(), defined: init2.is_some() });
            }
            declarators.push(Declarator { name: n2, ty: ty2, init: init2, mark: m2 });
        }
        self.expect_punct(Punct::Semi);
        tu.decls.push(GDecl::Global { ty: base, declarators, mark });
    }

    fn finish_declarator_list(&mut self, base: CType, _mark: Option<MarkId>, _is_typedef: bool) {
        while self.eat_punct(Punct::Comma) {
            if let Some((n, ty, _m)) = self.parse_declarator(base.clone()) {
                if let Some(n) = n {
                    self.typetab.declare(n, TypeTabEntry::Typedef(ty));
                }
            }
        }
        self.expect_punct(Punct::Semi);
    }

    // ---- declaration specifiers -------------------------------------------

    fn starts_decl_specifier(&self) -> bool {
        use Keyword::*;
        if let TokenKind::Keyword(k) = self.cur().kind {
            matches!(
                k,
                Void | Char | Short | Int | Long | Float | Double | Signed | Unsigned | Bool
                    | Complex | Imaginary | Struct | Union | Enum | Typedef | Extern | Static
                    | Auto | Register | ThreadLocal | Const | Volatile | Restrict | Inline
                    | Noreturn | Alignas | BuiltinVaList | StaticAssert
            )
        } else if let TokenKind::Ident(s) = self.cur().kind {
            self.typetab.is_typedef_name(s)
        } else {
            false
        }
    }

    /// Parses storage-class/qualifier/type-specifier keywords into a
    /// `CType`; returns `None` (backtrack, no input consumed) if the
    /// current token cannot start a declaration.
    fn parse_decl_specifiers(&mut self) -> Option<CType> {
        if !self.starts_decl_specifier() {
            return None;
        }
        let mut mods = TypeMods::default();
        let mut basic = BasicSpec::default();
        let mut agg: Option<CType> = None;

        loop {
            use Keyword::*;
            if let TokenKind::Keyword(k) = self.cur().kind {
                match k {
                    Typedef => { mods.is_typedef = true; self.bump(); }
                    Extern => { mods.is_extern = true; self.bump(); }
                    Static => { mods.is_static = true; self.bump(); }
                    Auto => { mods.is_auto = true; self.bump(); }
                    Register => { mods.is_register = true; self.bump(); }
                    ThreadLocal => { self.bump(); }
                    Const => { mods.is_const = true; self.bump(); }
                    Volatile => { mods.is_volatile = true; self.bump(); }
                    Restrict => { mods.is_restrict = true; self.bump(); }
                    Inline => { mods.is_inline = true; self.bump(); }
                    Noreturn => { mods.is_noreturn = true; self.bump(); }
                    Alignas => {
                        self.bump();
                        if self.expect_punct(Punct::LParen) {
                            if let Some(n) = self.try_const_int_expr() {
                                mods.alignas = Some(n as u32);
                            }
                            self.expect_punct(Punct::RParen);
                        }
                    }
                    Signed => { mods.is_signed = true; basic.saw_explicit = true; self.bump(); }
                    Unsigned => { mods.is_unsigned = true; basic.saw_explicit = true; self.bump(); }
                    Void if agg.is_none() => { basic.void_ += 1; basic.saw_explicit = true; self.bump(); }
                    Char if agg.is_none() => { basic.char_ += 1; basic.saw_explicit = true; self.bump(); }
                    Short if agg.is_none() => { basic.short_ += 1; basic.saw_explicit = true; self.bump(); }
                    Int if agg.is_none() => { basic.int_ += 1; basic.saw_explicit = true; self.bump(); }
                    Long if agg.is_none() => { basic.long_ += 1; basic.saw_explicit = true; self.bump(); }
                    Float if agg.is_none() => { basic.float_ += 1; basic.saw_explicit = true; self.bump(); }
                    Double if agg.is_none() => { basic.double_ += 1; basic.saw_explicit = true; self.bump(); }
                    Bool if agg.is_none() => { basic.bool_ += 1; basic.saw_explicit = true; self.bump(); }
                    BuiltinVaList if agg.is_none() => { agg = Some(CType::VaList); basic.saw_explicit = true; self.bump(); }
                    Complex | Imaginary => { self.bump(); }
                    Struct | Union if !basic.saw_explicit && agg.is_none() => {
                        agg = Some(self.parse_struct_or_union_specifier(k == Union));
                    }
                    Enum if !basic.saw_explicit && agg.is_none() => {
                        agg = Some(self.parse_enum_specifier());
                    }
                    StaticAssert => {
                        // Declaration-level `_Static_assert` is folded into
                        // the specifier slot as its own pseudo-type.
                        self.bump();
                        self.expect_punct(Punct::LParen);
                        let cond = self.parse_assignment_expr();
                        let msg = if self.eat_punct(Punct::Comma) {
                            match self.cur().kind {
                                TokenKind::StringLit(s) => { self.bump(); Some(s) }
                                _ => None,
                            }
                        } else {
                            None
                        };
                        self.expect_punct(Punct::RParen);
                        self.eat_punct(Punct::Semi);
                        agg = Some(CType::StaticAssert { cond: Box::new(cond), msg });
                    }
                    _ => break,
                }
            } else if let TokenKind::Ident(s) = self.cur().kind {
                if !basic.saw_explicit && agg.is_none() && self.typetab.is_typedef_name(s) {
                    self.bump();
                    agg = Some(CType::TypedefRef(s, Box::new(self.resolve_typedef(s))));
                } else {
                    break;
                }
            } else {
                break;
            }
        }

        let base = if let Some(a) = agg {
            a
        } else {
            basic_type_from_counts(&basic)
        };
        Some(CType::Modifier { mods, base: Box::new(base) })
    }

    fn resolve_typedef(&self, name: Sym) -> CType {
        match self.typetab.lookup(name) {
            Some(TypeTabEntry::Typedef(t)) => t.clone(),
            _ => CType::Int,
        }
    }

    fn parse_struct_or_union_specifier(&mut self, is_union: bool) -> CType {
        self.bump(); // struct/union
        let tag = self.ident_sym();
        if tag.is_some() {
            self.bump();
        }
        if self.eat_punct(Punct::LBrace) {
            let def = StructDef::incomplete(tag, is_union);
            if let Some(t) = tag {
                self.typetab.declare_tag(t, TypeTabEntry::StructTag(def.clone()));
            }
            let mut fields = Vec::new();
            while !self.check_punct(Punct::RBrace) && !self.at_eof() {
                let Some(fbase) = self.parse_decl_specifiers() else {
                    self.error("expected member declaration");
                    self.bump();
                    continue;
                };
                loop {
                    let (name, ty, _m) = match self.parse_declarator(fbase.clone()) {
                        Some(d) => d,
                        None => (None, fbase.clone(), None),
                    };
                    let bitfield = if self.eat_punct(Punct::Colon) {
                        self.try_const_int_expr().map(|v| v as u32)
                    } else {
                        None
                    };
                    fields.push(Field {
                        name,
                        ty,
                        bitfield,
                        offset: std::cell::Cell::new(0),
                    });
                    if !self.eat_punct(Punct::Comma) {
                        break;
                    }
                }
                self.expect_punct(Punct::Semi);
            }
            self.expect_punct(Punct::RBrace);
            *def.fields.borrow_mut() = fields;
            crate::types::layout_struct(&def);
            CType::Struct(def)
        } else if let Some(t) = tag {
            match self.typetab.lookup_tag(t) {
                Some(TypeTabEntry::StructTag(def)) => CType::Struct(def.clone()),
                _ => {
                    let def = StructDef::incomplete(Some(t), is_union);
                    self.typetab.declare_tag(t, TypeTabEntry::StructTag(def.clone()));
                    CType::Struct(def)
                }
            }
        } else {
            self.error("expected struct/union tag or body");
            CType::Struct(StructDef::incomplete(None, is_union))
        }
    }

    fn parse_enum_specifier(&mut self) -> CType {
        self.bump(); // enum
        let tag = self.ident_sym();
        if tag.is_some() {
            self.bump();
        }
        if self.eat_punct(Punct::LBrace) {
            let def = Rc::new(EnumDef {
                tag,
                underlying: CType::Int,
                constants: std::cell::RefCell::new(Vec::new()),
            });
            if let Some(t) = tag {
                self.typetab.declare_tag(t, TypeTabEntry::EnumTag(def.clone()));
            }
            let mut next_val: i64 = 0;
            while let Some(name) = self.ident_sym() {
                self.bump();
                if self.eat_punct(Punct::Assign) {
                    if let Some(v) = self.try_const_int_expr() {
                        next_val = v;
                    }
                }
                def.constants.borrow_mut().push((name, next_val));
                self.typetab.declare(
                    name,
                    TypeTabEntry::EnumConstant { underlying: CType::Int, value: next_val },
                );
                next_val += 1;
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
            self.expect_punct(Punct::RBrace);
            CType::Enum(def)
        } else if let Some(t) = tag {
            match self.typetab.lookup_tag(t) {
                Some(TypeTabEntry::EnumTag(def)) => CType::Enum(def.clone()),
                _ => {
                    self.error(format!("undefined enum tag '{}'", self.text(t)));
                    CType::Int
                }
            }
        } else {
            self.error("expected enum tag or body");
            CType::Int
        }
    }

    // ---- declarators -------------------------------------------------------

    /// Parses `*`-pointer prefixes, wrapping `base` from the inside out.
    fn parse_pointers(&mut self, mut base: CType) -> CType {
        while self.eat_punct(Punct::Star) {
            let mut mods = TypeMods::default();
            loop {
                if self.eat_kw(Keyword::Const) {
                    mods.is_const = true;
                } else if self.eat_kw(Keyword::Volatile) {
                    mods.is_volatile = true;
                } else if self.eat_kw(Keyword::Restrict) {
                    mods.is_restrict = true;
                } else {
                    break;
                }
            }
            base = CType::Ptr { base: Box::new(base), mods };
        }
        base
    }

    /// Returns `(name, full-type, mark)`. `base` is the declaration's base
    /// type; pointer/array/function wrappers compose around it in
    /// declarator-nesting order (`spec.md` §4.3 "Outputs per declarator").
    fn parse_declarator(&mut self, base: CType) -> Option<(Option<Sym>, CType, Option<MarkId>)> {
        let ty_after_ptrs = self.parse_pointers(base);
        self.parse_direct_declarator(ty_after_ptrs)
    }

    fn parse_direct_declarator(&mut self, base: CType) -> Option<(Option<Sym>, CType, Option<MarkId>)> {
        let mark = self.mark();
        let (name, inner_build): (Option<Sym>, Box<dyn FnOnce(&mut Self, CType) -> CType>) =
            if let Some(s) = self.ident_sym() {
                self.bump();
                (Some(s), Box::new(|_, t| t))
            } else if self.eat_punct(Punct::LParen) {
                // A parenthesized (possibly abstract) declarator nested
                // around further pointer/array/function suffixes.
                let save = self.pos;
                if let Some((n, build_ty, _)) = self.parse_paren_declarator() {
                    if !self.expect_punct(Punct::RParen) {
                        // fall through regardless
                    }
                    (n, Box::new(move |_, t| splice_innermost(build_ty, t)))
                } else {
                    self.pos = save;
                    return None;
                }
            } else {
                (None, Box::new(|_, t| t))
            };

        let mut ty = base;
        loop {
            if self.eat_punct(Punct::LBracket) {
                self.eat_kw(Keyword::Static);
                loop {
                    if self.eat_kw(Keyword::Const) || self.eat_kw(Keyword::Volatile) || self.eat_kw(Keyword::Restrict) {
                        continue;
                    }
                    break;
                }
                self.eat_punct(Punct::Star);
                let len_expr = if !self.check_punct(Punct::RBracket) {
                    Some(Box::new(self.parse_assignment_expr()))
                } else {
                    None
                };
                self.expect_punct(Punct::RBracket);
                let resolved = len_expr.as_ref().and_then(|e| crate::typecheck::const_eval_fold(e).map(|v| v as u64));
                ty = CType::Array { base: Box::new(ty), len_expr, resolved_nelems: resolved };
            } else if self.eat_punct(Punct::LParen) {
                let (params, variadic) = self.parse_param_list();
                self.expect_punct(Punct::RParen);
                ty = CType::Func { ret: Box::new(ty), params, variadic };
            } else {
                break;
            }
        }
        ty = inner_build(self, ty);
        Some((name, ty, mark))
    }

    /// Handles the ambiguous `(` inside a declarator: either a nested
    /// declarator (`(*f)(int)`) or the start of a function's parameter
    /// list when treated as direct-declarator suffix parsing already took
    /// the `(`. Returns the parsed inner declarator's `(name, fn-that-
    /// splices-the-eventual-base-type-in, mark)`.
    fn parse_paren_declarator(&mut self) -> Option<(Option<Sym>, CType, Option<MarkId>)> {
        // Re-enter through parse_declarator with a placeholder hole type
        // that `splice_innermost` will later replace with the real base.
        self.parse_declarator(CType::Void)
    }

    fn parse_param_list(&mut self) -> (Vec<CType>, bool) {
        let mut params = Vec::new();
        let mut names = Vec::new();
        if self.check_kw(Keyword::Void)
            && matches!(self.tokens.get(self.pos + 1).map(|t| &t.kind), Some(TokenKind::Punct(Punct::RParen)))
        {
            self.bump();
            self.last_param_names = names;
            return (params, false);
        }
        if self.check_punct(Punct::RParen) {
            self.last_param_names = names;
            return (params, false);
        }
        let variadic = loop {
            if self.eat_punct(Punct::Ellipsis) {
                break true;
            }
            let Some(base) = self.parse_decl_specifiers() else {
                break false;
            };
            let (name, ty) = match self.parse_declarator(base.clone()) {
                Some((n, t, _)) => (n, t),
                None => (None, base),
            };
            params.push(ty);
            names.push(name);
            if !self.eat_punct(Punct::Comma) {
                break false;
            }
        };
        self.last_param_names = names;
        (params, variadic)
    }

    // ---- statements ---------------------------------------------------------

    pub fn parse_compound_stmt(&mut self) -> Stmt {
        let mark = self.mark();
        self.expect_punct(Punct::LBrace);
        self.typetab.enter_scope();
        let mut stmts = Vec::new();
        while !self.check_punct(Punct::RBrace) && !self.at_eof() {
            stmts.push(self.parse_stmt());
        }
        self.typetab.exit_scope();
        self.expect_punct(Punct::RBrace);
        Stmt::new(StmtKind::Compound(stmts), mark)
    }

    fn parse_stmt(&mut self) -> Stmt {
        let mark = self.mark();
        use Keyword::*;
        if self.check_punct(Punct::LBrace) {
            return self.parse_compound_stmt();
        }
        if self.eat_punct(Punct::Semi) {
            return Stmt::new(StmtKind::Nop, mark);
        }
        if self.starts_decl_specifier() {
            return self.parse_decl_stmt();
        }
        if self.check_kw(If) {
            self.bump();
            self.expect_punct(Punct::LParen);
            let cond = Box::new(self.parse_expr());
            self.expect_punct(Punct::RParen);
            let then_s = Box::new(self.parse_stmt());
            let else_s = if self.eat_kw(Else) {
                Some(Box::new(self.parse_stmt()))
            } else {
                None
            };
            return Stmt::new(StmtKind::If { cond, then_s, else_s }, mark);
        }
        if self.check_kw(Switch) {
            self.bump();
            self.expect_punct(Punct::LParen);
            let cond = Box::new(self.parse_expr());
            self.expect_punct(Punct::RParen);
            let body = Box::new(self.parse_stmt());
            return Stmt::new(StmtKind::Switch { cond, body }, mark);
        }
        if self.check_kw(While) {
            self.bump();
            self.expect_punct(Punct::LParen);
            let cond = Box::new(self.parse_expr());
            self.expect_punct(Punct::RParen);
            let body = Box::new(self.parse_stmt());
            return Stmt::new(StmtKind::While { cond, body }, mark);
        }
        if self.check_kw(Do) {
            self.bump();
            let body = Box::new(self.parse_stmt());
            if !self.eat_kw(While) {
                self.error("expected 'while' after 'do' body");
            }
            self.expect_punct(Punct::LParen);
            let cond = Box::new(self.parse_expr());
            self.expect_punct(Punct::RParen);
            self.expect_punct(Punct::Semi);
            return Stmt::new(StmtKind::Do { body, cond }, mark);
        }
        if self.check_kw(For) {
            self.bump();
            self.expect_punct(Punct::LParen);
            self.typetab.enter_scope();
            let init = if self.eat_punct(Punct::Semi) {
                None
            } else if self.starts_decl_specifier() {
                Some(Box::new(self.parse_decl_stmt()))
            } else {
                let e = self.parse_expr();
                self.expect_punct(Punct::Semi);
                Some(Box::new(Stmt::new(StmtKind::Expr(Box::new(e)), mark)))
            };
            let cond = if self.check_punct(Punct::Semi) {
                None
            } else {
                Some(Box::new(self.parse_expr()))
            };
            self.expect_punct(Punct::Semi);
            let step = if self.check_punct(Punct::RParen) {
                None
            } else {
                Some(Box::new(self.parse_expr()))
            };
            self.expect_punct(Punct::RParen);
            let body = Box::new(self.parse_stmt());
            self.typetab.exit_scope();
            return Stmt::new(StmtKind::For { init, cond, step, body }, mark);
        }
        if self.check_kw(Goto) {
            self.bump();
            let name = self.ident_sym();
            if let Some(n) = name {
                self.bump();
            }
            self.expect_punct(Punct::Semi);
            return Stmt::new(StmtKind::Goto(name.unwrap_or_else(|| self.session.strtab.intern("<error>"))), mark);
        }
        if self.check_kw(Continue) {
            self.bump();
            self.expect_punct(Punct::Semi);
            return Stmt::new(StmtKind::Continue, mark);
        }
        if self.check_kw(Break) {
            self.bump();
            self.expect_punct(Punct::Semi);
            return Stmt::new(StmtKind::Break, mark);
        }
        if self.check_kw(Return) {
            self.bump();
            let e = if self.check_punct(Punct::Semi) {
                None
            } else {
                Some(Box::new(self.parse_expr()))
            };
            self.expect_punct(Punct::Semi);
            return Stmt::new(StmtKind::Return(e), mark);
        }
        if self.check_kw(Case) {
            self.bump();
            let val = Box::new(self.parse_conditional_expr());
            self.expect_punct(Punct::Colon);
            let body = Box::new(self.parse_stmt());
            return Stmt::new(StmtKind::Case { val, body }, mark);
        }
        if self.check_kw(Default) {
            self.bump();
            self.expect_punct(Punct::Colon);
            let body = Box::new(self.parse_stmt());
            return Stmt::new(StmtKind::Default(body), mark);
        }
        // Labeled statement: IDENT ':' stmt. Needs one-token lookahead past
        // the identifier to distinguish from an expression-statement.
        if let Some(name) = self.ident_sym() {
            if matches!(self.tokens.get(self.pos + 1).map(|t| &t.kind), Some(TokenKind::Punct(Punct::Colon))) {
                self.bump();
                self.bump();
                let body = Box::new(self.parse_stmt());
                return Stmt::new(StmtKind::Label { name, body }, mark);
            }
        }
        let e = self.parse_expr();
        self.expect_punct(Punct::Semi);
        Stmt::new(StmtKind::Expr(Box::new(e)), mark)
    }

    fn parse_decl_stmt(&mut self) -> Stmt {
        let mark = self.mark();
        let Some(base) = self.parse_decl_specifiers() else {
            self.error("expected declaration");
            self.synchronize();
            return Stmt::new(StmtKind::Nop, mark);
        };
        let mut declarators = Vec::new();
        if !self.check_punct(Punct::Semi) {
            loop {
                let Some((name, ty, m)) = self.parse_declarator(base.clone()) else {
                    break;
                };
                let init = if self.eat_punct(Punct::Assign) {
                    Some(self.parse_initializer())
                } else {
                    None
                };
                if let Some(n) = name {
                    self.typetab.declare(
                        n,
                        TypeTabEntry::Variable { ty: ty.clone(), defined: init.is_some() },
                    );
                }
                declarators.push(Declarator { name, ty, init, mark: m });
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
        }
        self.expect_punct(Punct::Semi);
        Stmt::new(StmtKind::Decl(declarators), mark)
    }

    // ---- initializers ---------------------------------------------------------

    fn parse_initializer(&mut self) -> Expr {
        let mark = self.mark();
        if self.eat_punct(Punct::LBrace) {
            let mut items = Vec::new();
            while !self.check_punct(Punct::RBrace) && !self.at_eof() {
                let mut designators = Vec::new();
                loop {
                    if self.eat_punct(Punct::Dot) {
                        if let Some(n) = self.ident_sym() {
                            self.bump();
                            designators.push(Designator::Field(n));
                        }
                    } else if self.eat_punct(Punct::LBracket) {
                        let idx = self.parse_conditional_expr();
                        self.expect_punct(Punct::RBracket);
                        designators.push(Designator::Index(Box::new(idx)));
                    } else {
                        break;
                    }
                }
                if !designators.is_empty() {
                    self.expect_punct(Punct::Assign);
                }
                let val = self.parse_initializer();
                if designators.is_empty() {
                    items.push(val);
                } else {
                    items.push(Expr::new(
                        ExprKind::DesignatedInit { designators, val: Box::new(val) },
                        mark,
                    ));
                }
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
            self.expect_punct(Punct::RBrace);
            Expr::new(ExprKind::InitList(items), mark)
        } else {
            self.parse_assignment_expr()
        }
    }

    // ---- expressions: precedence climb, `spec.md` §4.3 ------------------------

    pub fn parse_expr(&mut self) -> Expr {
        let mark = self.mark();
        let first = self.parse_assignment_expr();
        if self.check_punct(Punct::Comma) {
            let mut items = vec![first];
            while self.eat_punct(Punct::Comma) {
                items.push(self.parse_assignment_expr());
            }
            Expr::new(ExprKind::CompoundSeq(items), mark)
        } else {
            first
        }
    }

    fn parse_assignment_expr(&mut self) -> Expr {
        let mark = self.mark();
        let lhs = self.parse_conditional_expr();
        if let TokenKind::Punct(p) = self.cur().kind {
            if let Some(op) = crate::ast::AssignOp::from_punct(p) {
                self.bump();
                let rhs = self.parse_assignment_expr();
                return Expr::new(
                    ExprKind::Assign { op, dest: Box::new(lhs), rhs: Box::new(rhs) },
                    mark,
                );
            }
        }
        lhs
    }

    fn parse_conditional_expr(&mut self) -> Expr {
        let mark = self.mark();
        let c = self.parse_binary_expr(0);
        if self.eat_punct(Punct::Question) {
            let t = self.parse_expr();
            self.expect_punct(Punct::Colon);
            let f = self.parse_conditional_expr();
            Expr::new(ExprKind::Cond { c: Box::new(c), t: Box::new(t), f: Box::new(f) }, mark)
        } else {
            c
        }
    }

    /// Evaluates a precedence table, lowest-binding level last (`||` binds
    /// loosest at level 0, `* / %` binds tightest at level 9), left-to-right
    /// associative (`spec.md` §4.3 "Operator precedence").
    fn binop_prec(p: Punct) -> Option<u8> {
        use Punct::*;
        Some(match p {
            PipePipe => 0,
            AmpAmp => 1,
            Pipe => 2,
            Caret => 3,
            Amp => 4,
            EqEq | NotEq => 5,
            Lt | Gt | Le | Ge => 6,
            Shl | Shr => 7,
            Plus | Minus => 8,
            Star | Slash | Percent => 9,
            _ => return None,
        })
    }

    fn parse_binary_expr(&mut self, min_prec: u8) -> Expr {
        let mark = self.mark();
        let mut lhs = self.parse_cast_expr();
        loop {
            let TokenKind::Punct(p) = self.cur().kind else { break };
            let Some(prec) = Self::binop_prec(p) else { break };
            if prec < min_prec {
                break;
            }
            self.bump();
            let rhs = self.parse_binary_expr(prec + 1);
            let op = crate::ast::BinOp::from_punct(p).expect("prec table matches BinOp::from_punct");
            lhs = Expr::new(ExprKind::Bin { op, l: Box::new(lhs), r: Box::new(rhs) }, mark);
        }
        lhs
    }

    /// A `(` starting a cast vs. a parenthesized expression: a type-start
    /// after `(` is a cast; anything else (including an identifier that is
    /// not a live typedef name) is an expression (`spec.md` §4.3).
    fn parse_cast_expr(&mut self) -> Expr {
        let mark = self.mark();
        if self.check_punct(Punct::LParen) {
            let save = self.pos;
            self.bump();
            if self.starts_decl_specifier() {
                let Some(base) = self.parse_decl_specifiers() else {
                    self.pos = save;
                    return self.parse_unary_expr();
                };
                let ty = match self.parse_declarator(base.clone()) {
                    Some((_, t, _)) => t,
                    None => base,
                };
                self.expect_punct(Punct::RParen);
                if self.check_punct(Punct::LBrace) {
                    let init = self.parse_initializer();
                    return Expr::new(ExprKind::CompoundLiteral { ty, init: Box::new(init) }, mark);
                }
                let e = self.parse_cast_expr();
                return Expr::new(ExprKind::Cast { ty, e: Box::new(e) }, mark);
            }
            self.pos = save;
        }
        self.parse_unary_expr()
    }

    fn parse_unary_expr(&mut self) -> Expr {
        let mark = self.mark();
        use Punct::*;
        if self.eat_punct(PlusPlus) {
            let e = self.parse_unary_expr();
            return Expr::new(ExprKind::Unary { op: UnOp::PreInc, e: Box::new(e) }, mark);
        }
        if self.eat_punct(MinusMinus) {
            let e = self.parse_unary_expr();
            return Expr::new(ExprKind::Unary { op: UnOp::PreDec, e: Box::new(e) }, mark);
        }
        if let TokenKind::Punct(p) = self.cur().kind {
            let op = match p {
                Amp => Some(UnOp::AddrOf),
                Star => Some(UnOp::Deref),
                Plus => Some(UnOp::Plus),
                Minus => Some(UnOp::Neg),
                Tilde => Some(UnOp::BNot),
                Not => Some(UnOp::LNot),
                _ => None,
            };
            if let Some(op) = op {
                self.bump();
                let e = self.parse_cast_expr();
                return Expr::new(ExprKind::Unary { op, e: Box::new(e) }, mark);
            }
        }
        if self.check_kw(Keyword::Sizeof) {
            self.bump();
            if self.check_punct(LParen) {
                let save = self.pos;
                self.bump();
                if self.starts_decl_specifier() {
                    let Some(base) = self.parse_decl_specifiers() else {
                        self.pos = save;
                        let e = self.parse_unary_expr();
                        return Expr::new(ExprKind::SizeofExpr(Box::new(e)), mark);
                    };
                    let ty = match self.parse_declarator(base.clone()) {
                        Some((_, t, _)) => t,
                        None => base,
                    };
                    self.expect_punct(RParen);
                    return Expr::new(ExprKind::SizeofType(ty), mark);
                }
                self.pos = save;
            }
            let e = self.parse_unary_expr();
            return Expr::new(ExprKind::SizeofExpr(Box::new(e)), mark);
        }
        if self.check_kw(Keyword::Alignof) {
            self.bump();
            self.expect_punct(LParen);
            let Some(base) = self.parse_decl_specifiers() else {
                let e = self.parse_expr();
                self.expect_punct(RParen);
                return Expr::new(ExprKind::AlignofExpr(Box::new(e)), mark);
            };
            let ty = match self.parse_declarator(base.clone()) {
                Some((_, t, _)) => t,
                None => base,
            };
            self.expect_punct(RParen);
            return Expr::new(ExprKind::AlignofType(ty), mark);
        }
        if self.check_kw(Keyword::BuiltinOffsetof) {
            self.bump();
            self.expect_punct(LParen);
            let Some(base) = self.parse_decl_specifiers() else {
                self.error("expected type in offsetof");
                self.expect_punct(RParen);
                return Expr::new(ExprKind::Void, mark);
            };
            let ty = match self.parse_declarator(base.clone()) {
                Some((_, t, _)) => t,
                None => base,
            };
            self.expect_punct(Comma);
            let mut designators = Vec::new();
            if let Some(n) = self.ident_sym() {
                self.bump();
                designators.push(Designator::Field(n));
            }
            loop {
                if self.eat_punct(Dot) {
                    if let Some(n) = self.ident_sym() {
                        self.bump();
                        designators.push(Designator::Field(n));
                    }
                } else if self.eat_punct(LBracket) {
                    let idx = self.parse_expr();
                    self.expect_punct(RBracket);
                    designators.push(Designator::Index(Box::new(idx)));
                } else {
                    break;
                }
            }
            self.expect_punct(RParen);
            return Expr::new(ExprKind::Offsetof { ty, designators }, mark);
        }
        if self.check_kw(Keyword::BuiltinVaStart) {
            self.bump();
            self.expect_punct(LParen);
            let ap = self.parse_assignment_expr();
            self.expect_punct(Comma);
            let last = self.ident_sym().unwrap_or_else(|| self.session.strtab.intern("<error>"));
            if self.ident_sym().is_some() {
                self.bump();
            }
            self.expect_punct(RParen);
            return Expr::new(ExprKind::VaStart { ap: Box::new(ap), last }, mark);
        }
        if self.check_kw(Keyword::BuiltinVaArg) {
            self.bump();
            self.expect_punct(LParen);
            let ap = self.parse_assignment_expr();
            self.expect_punct(Comma);
            let ty = self.parse_decl_specifiers().unwrap_or(CType::Int);
            let ty = match self.parse_declarator(ty.clone()) {
                Some((_, t, _)) => t,
                None => ty,
            };
            self.expect_punct(RParen);
            return Expr::new(ExprKind::VaArg { ap: Box::new(ap), ty }, mark);
        }
        if self.check_kw(Keyword::BuiltinVaEnd) {
            self.bump();
            self.expect_punct(LParen);
            let ap = self.parse_assignment_expr();
            self.expect_punct(RParen);
            return Expr::new(ExprKind::VaEnd { ap: Box::new(ap) }, mark);
        }
        if self.check_kw(Keyword::BuiltinVaCopy) {
            self.bump();
            self.expect_punct(LParen);
            let dst = self.parse_assignment_expr();
            self.expect_punct(Comma);
            let src = self.parse_assignment_expr();
            self.expect_punct(RParen);
            return Expr::new(ExprKind::VaCopy { dst: Box::new(dst), src: Box::new(src) }, mark);
        }
        self.parse_postfix_expr()
    }

    fn parse_postfix_expr(&mut self) -> Expr {
        let mark = self.mark();
        let mut e = self.parse_primary_expr();
        loop {
            use Punct::*;
            if self.eat_punct(LBracket) {
                let idx = self.parse_expr();
                self.expect_punct(RBracket);
                e = Expr::new(ExprKind::Index { arr: Box::new(e), idx: Box::new(idx) }, mark);
            } else if self.eat_punct(LParen) {
                let mut args = Vec::new();
                if !self.check_punct(RParen) {
                    loop {
                        args.push(self.parse_assignment_expr());
                        if !self.eat_punct(Comma) {
                            break;
                        }
                    }
                }
                self.expect_punct(RParen);
                e = Expr::new(ExprKind::Call { func: Box::new(e), args }, mark);
            } else if self.eat_punct(Dot) {
                if let Some(n) = self.ident_sym() {
                    self.bump();
                    e = Expr::new(ExprKind::Member { base: Box::new(e), op: MemberOp::Dot, name: n }, mark);
                } else {
                    self.error("expected member name after '.'");
                }
            } else if self.eat_punct(Arrow) {
                if let Some(n) = self.ident_sym() {
                    self.bump();
                    e = Expr::new(ExprKind::Member { base: Box::new(e), op: MemberOp::Arrow, name: n }, mark);
                } else {
                    self.error("expected member name after '->'");
                }
            } else if self.eat_punct(PlusPlus) {
                e = Expr::new(ExprKind::Unary { op: UnOp::PostInc, e: Box::new(e) }, mark);
            } else if self.eat_punct(MinusMinus) {
                e = Expr::new(ExprKind::Unary { op: UnOp::PostDec, e: Box::new(e) }, mark);
            } else {
                break;
            }
        }
        e
    }

    fn parse_primary_expr(&mut self) -> Expr {
        let mark = self.mark();
        match self.cur().kind {
            TokenKind::IntLit { value, suffix } => {
                self.bump();
                Expr::new(ExprKind::IntConst { value: value as i64, suffix }, mark)
            }
            TokenKind::FloatLit { value, suffix } => {
                self.bump();
                Expr::new(
                    ExprKind::FloatConst { value, is_float: suffix.is_float, is_long_double: suffix.is_long_double },
                    mark,
                )
            }
            TokenKind::StringLit(s) => {
                self.bump();
                Expr::new(ExprKind::StrConst(s), mark)
            }
            TokenKind::CharLit(v) => {
                self.bump();
                Expr::new(ExprKind::IntConst { value: v, suffix: IntSuffix::default() }, mark)
            }
            TokenKind::Ident(s) => {
                self.bump();
                Expr::new(ExprKind::Var(s), mark)
            }
            TokenKind::Keyword(Keyword::Func) => {
                self.bump();
                Expr::new(ExprKind::Var(self.session.strtab.intern("__func__")), mark)
            }
            TokenKind::Keyword(Keyword::Generic) => self.parse_generic_expr(),
            TokenKind::Punct(Punct::LParen) => {
                self.bump();
                let e = self.parse_expr();
                self.expect_punct(Punct::RParen);
                Expr::new(ExprKind::Paren(Box::new(e)), mark)
            }
            _ => {
                self.error("expected expression");
                self.bump();
                Expr::new(ExprKind::Void, mark)
            }
        }
    }

    fn parse_generic_expr(&mut self) -> Expr {
        let mark = self.mark();
        self.bump(); // _Generic
        self.expect_punct(Punct::LParen);
        let controlling = self.parse_assignment_expr();
        let mut assocs = Vec::new();
        while self.eat_punct(Punct::Comma) {
            if self.eat_kw(Keyword::Default) {
                self.expect_punct(Punct::Colon);
                let e = self.parse_assignment_expr();
                assocs.push((None, e));
            } else if let Some(base) = self.parse_decl_specifiers() {
                let ty = match self.parse_declarator(base.clone()) {
                    Some((_, t, _)) => t,
                    None => base,
                };
                self.expect_punct(Punct::Colon);
                let e = self.parse_assignment_expr();
                assocs.push((Some(ty), e));
            } else {
                break;
            }
        }
        self.expect_punct(Punct::RParen);
        Expr::new(ExprKind::Generic { controlling: Box::new(controlling), assocs }, mark)
    }

    /// Evaluates a constant integer expression at parse time (array bounds,
    /// enum values, bit-field widths, `_Alignas`). Delegates to the
    /// checker's constant folder rather than duplicating it.
    fn try_const_int_expr(&mut self) -> Option<i64> {
        let e = self.parse_conditional_expr();
        crate::typecheck::const_eval_fold(&e)
    }
}

fn spec_is_typedef(ty: &CType) -> bool {
    matches!(ty, CType::Modifier { mods, .. } if mods.is_typedef)
}

/// Tally of basic-type-specifier keywords seen so far in one declaration
/// (`int`, `long long`, `unsigned short`, ...); combined into a concrete
/// `CType` once the specifier loop ends.
#[derive(Default)]
struct BasicSpec {
    void_: u8,
    char_: u8,
    short_: u8,
    int_: u8,
    long_: u8,
    float_: u8,
    double_: u8,
    bool_: u8,
    saw_explicit: bool,
}

fn basic_type_from_counts(b: &BasicSpec) -> CType {
    if b.bool_ > 0 {
        CType::Bool
    } else if b.float_ > 0 {
        CType::Float
    } else if b.double_ > 0 {
        if b.long_ > 0 {
            CType::LongDouble
        } else {
            CType::Double
        }
    } else if b.char_ > 0 {
        CType::Char
    } else if b.short_ > 0 {
        CType::Short
    } else if b.long_ >= 2 {
        CType::LongLong
    } else if b.long_ == 1 {
        CType::Long
    } else if b.void_ > 0 {
        CType::Void
    } else {
        CType::Int
    }
}

/// Replaces the `CType::Void` placeholder left by `parse_paren_declarator`
/// with the real base type, walking to the innermost non-placeholder slot.
fn splice_innermost(chain: CType, real_base: CType) -> CType {
    match chain {
        CType::Void => real_base,
        CType::Ptr { base, mods } => CType::Ptr { base: Box::new(splice_innermost(*base, real_base)), mods },
        CType::Array { base, len_expr, resolved_nelems } => CType::Array {
            base: Box::new(splice_innermost(*base, real_base)),
            len_expr,
            resolved_nelems,
        },
        CType::Func { ret, params, variadic } => CType::Func {
            ret: Box::new(splice_innermost(*ret, real_base)),
            params,
            variadic,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::diag::Diag;
    use crate::session::Session;
    use std::io::Write;

    fn parse_src(src: &str) -> (TranslationUnit, bool) {
        let mut session = Session::new();
        let mut diag = Diag::new();
        let config = CompilerConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.c");
        std::fs::File::create(&path).unwrap().write_all(src.as_bytes()).unwrap();
        let tokens = {
            let mut pp = crate::pp::Preprocessor::new(&mut session, &mut diag, &config);
            pp.process(&path)
        };
        let tu = parse(tokens, &mut session, &mut diag);
        (tu, diag.had_error())
    }

    #[test]
    fn typedef_disambiguates_declaration_from_multiplication() {
        let (tu, had_error) = parse_src("typedef int T;\nint f(void){ T x = 3; return x*2; }");
        assert!(!had_error);
        assert_eq!(tu.decls.len(), 2);
        let GDecl::Function { body: Some(body), .. } = &tu.decls[1] else {
            panic!("expected function");
        };
        let StmtKind::Compound(stmts) = &body.kind else {
            panic!("expected compound body")
        };
        assert!(matches!(stmts[0].kind, StmtKind::Decl(_)));
    }

    #[test]
    fn designated_struct_initializer_parses() {
        let (tu, had_error) = parse_src("struct S { int a; int b; int c; } s = { .c = 7, .a = 1 };");
        assert!(!had_error);
        let GDecl::Global { declarators, .. } = &tu.decls[0] else {
            panic!("expected global");
        };
        let init = declarators[0].init.as_ref().unwrap();
        assert!(matches!(init.kind, ExprKind::InitList(_)));
    }

    #[test]
    fn comma_in_parens_is_one_argument_to_macro_like_function_call_style_expr() {
        let (_tu, had_error) = parse_src("int f(void){ return (1,2)+1; }");
        assert!(!had_error);
    }

    #[test]
    fn pointer_declarator_parses() {
        let (tu, had_error) = parse_src("int *p;");
        assert!(!had_error);
        let GDecl::Global { declarators, .. } = &tu.decls[0] else {
            panic!("expected global");
        };
        assert!(matches!(declarators[0].ty, CType::Ptr { .. }));
    }

    #[test]
    fn function_pointer_declarator_parses() {
        let (_tu, had_error) = parse_src("int (*fp)(int, int);");
        assert!(!had_error);
    }
}
