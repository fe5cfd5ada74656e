//! Type checker and AST annotation pass: `spec.md` §4.4.1.
//!
//! Grounded on `examples/original_source/src/typecheck/typecheck.c` and
//! `typecheck_priv.h` for the per-expression/per-statement rules; teacher's
//! `crates/compiler/src/typechecker.rs` for the Rust shape (one struct
//! carrying ambient context stacks, a single recursive `check_*` family,
//! annotation written back into the node rather than returned).
//!
//! The checker keeps its own scoped symbol table rather than reusing the
//! parser's `typetab`: the parser's table also carries typedef names that
//! have no business being visible here, and the two passes' lifetimes don't
//! overlap (`spec.md` §2 "each stage consumes the prior stage's fully
//! materialized output").

use crate::ast::*;
use crate::diag::Diag;
use crate::session::Session;
use crate::strtab::Sym;
use crate::types;
use std::collections::HashMap;

#[derive(Default)]
struct Env {
    scopes: Vec<HashMap<Sym, CType>>,
}

impl Env {
    fn new() -> Self {
        Env { scopes: vec![HashMap::new()] }
    }

    fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: Sym, ty: CType) {
        self.scopes.last_mut().expect("env always has a root scope").insert(name, ty);
    }

    fn lookup(&self, name: Sym) -> Option<CType> {
        self.scopes.iter().rev().find_map(|s| s.get(&name).cloned())
    }
}

/// `size_t`/`ptrdiff_t`-shaped result for `sizeof`/`alignof`/`offsetof`: an
/// unsigned `long` on the x86-64 target this front end emits for.
fn size_t() -> CType {
    CType::Modifier {
        mods: TypeMods { is_unsigned: true, ..TypeMods::default() },
        base: Box::new(CType::Long),
    }
}

struct SwitchCtx {
    has_default: bool,
    seen_values: Vec<i64>,
}

pub struct TypeChecker<'a> {
    diag: &'a mut Diag,
    session: &'a Session,
    env: Env,
    func_ret: Vec<CType>,
    loop_depth: u32,
    switch_stack: Vec<SwitchCtx>,
}

/// Top-level entry point: annotates every expression in `tu` in place and
/// returns whether the translation unit type-checks cleanly (`spec.md` §4.4.1
/// "typecheck(translation-unit) → bool").
pub fn typecheck(tu: &TranslationUnit, session: &Session, diag: &mut Diag) -> bool {
    let had_error_before = diag.had_error();
    let mut tc = TypeChecker {
        diag,
        session,
        env: Env::new(),
        func_ret: Vec::new(),
        loop_depth: 0,
        switch_stack: Vec::new(),
    };

    for def in tu.derived_enums.borrow().iter() {
        let ty = CType::Enum(def.clone());
        for (name, _value) in def.constants.borrow().iter() {
            tc.env.declare(*name, ty.clone());
        }
    }

    for decl in &tu.decls {
        match decl {
            GDecl::Function { name, ty, .. } => tc.env.declare(*name, ty.clone()),
            GDecl::Global { declarators, .. } => {
                for d in declarators {
                    if let Some(n) = d.name {
                        tc.env.declare(n, d.ty.clone());
                    }
                }
            }
        }
    }

    for decl in &tu.decls {
        match decl {
            GDecl::Global { declarators, .. } => {
                for d in declarators {
                    if let Some(init) = &d.init {
                        tc.check_initializer(init, &d.ty);
                    }
                }
            }
            GDecl::Function { ty, param_names, body, labels, unresolved_gotos, mark, .. } => {
                let Some(body) = body else { continue };
                let CType::Func { ret, params, .. } = types::strip(ty) else {
                    tc.diag.error(*mark, "function declarator does not have function type");
                    continue;
                };
                tc.env.push();
                for (n, t) in param_names.iter().zip(params.iter()) {
                    if let Some(n) = n {
                        tc.env.declare(*n, t.clone());
                    }
                }
                tc.func_ret.push(ret.as_ref().clone());
                let mut collected_labels = Vec::new();
                let mut collected_gotos = Vec::new();
                tc.check_stmt(body, &mut collected_labels, &mut collected_gotos);
                tc.func_ret.pop();
                tc.env.pop();

                for g in &collected_gotos {
                    if !collected_labels.contains(&g.name) {
                        tc.diag.error(
                            g.mark,
                            format!("'goto' into unresolved label '{}'", tc.session.strtab.resolve(g.name)),
                        );
                    }
                }
                *labels.borrow_mut() = collected_labels;
                *unresolved_gotos.borrow_mut() =
                    collected_gotos.into_iter().filter(|g| !labels.borrow().contains(&g.name)).collect();
            }
        }
    }

    !diag.had_error() || had_error_before
}

impl<'a> TypeChecker<'a> {
    fn name_of(&self, s: Sym) -> &str {
        self.session.strtab.resolve(s)
    }

    // ---- statements ---------------------------------------------------------

    fn check_stmt(&mut self, s: &Stmt, labels: &mut Vec<Sym>, gotos: &mut Vec<GotoRef>) {
        match &s.kind {
            StmtKind::Nop | StmtKind::Continue | StmtKind::Break => {
                if matches!(s.kind, StmtKind::Continue) && self.loop_depth == 0 {
                    self.diag.error(s.mark, "'continue' statement not in a loop");
                }
                if matches!(s.kind, StmtKind::Break) && self.loop_depth == 0 && self.switch_stack.is_empty() {
                    self.diag.error(s.mark, "'break' statement not in a loop or switch");
                }
            }
            StmtKind::Decl(declarators) => {
                for d in declarators {
                    if let Some(init) = &d.init {
                        self.check_initializer(init, &d.ty);
                    }
                    if let Some(n) = d.name {
                        self.env.declare(n, d.ty.clone());
                    }
                }
            }
            StmtKind::Label { name, body } => {
                labels.push(*name);
                self.check_stmt(body, labels, gotos);
            }
            StmtKind::Case { val, body } => {
                self.check_expr(val);
                let value = self.const_eval(val);
                if self.switch_stack.is_empty() {
                    self.diag.error(s.mark, "'case' statement not in a switch");
                } else if let Some(v) = value {
                    let ctx = self.switch_stack.last_mut().unwrap();
                    if ctx.seen_values.contains(&v) {
                        self.diag.error(s.mark, format!("duplicate case value '{v}'"));
                    } else {
                        ctx.seen_values.push(v);
                    }
                } else {
                    self.diag.error(val.mark, "case label does not reduce to an integer constant");
                }
                self.check_stmt(body, labels, gotos);
            }
            StmtKind::Default(body) => {
                if self.switch_stack.is_empty() {
                    self.diag.error(s.mark, "'default' statement not in a switch");
                } else {
                    let ctx = self.switch_stack.last_mut().unwrap();
                    if ctx.has_default {
                        self.diag.error(s.mark, "multiple default labels in one switch");
                    }
                    ctx.has_default = true;
                }
                self.check_stmt(body, labels, gotos);
            }
            StmtKind::If { cond, then_s, else_s } => {
                self.check_expr(cond);
                self.check_stmt(then_s, labels, gotos);
                if let Some(e) = else_s {
                    self.check_stmt(e, labels, gotos);
                }
            }
            StmtKind::Switch { cond, body } => {
                self.check_expr(cond);
                if !types::is_integer(&cond.ty()) {
                    self.diag.error(cond.mark, "switch condition must have integer type");
                }
                self.switch_stack.push(SwitchCtx { has_default: false, seen_values: Vec::new() });
                self.check_stmt(body, labels, gotos);
                self.switch_stack.pop();
            }
            StmtKind::While { cond, body } => {
                self.check_expr(cond);
                self.loop_depth += 1;
                self.check_stmt(body, labels, gotos);
                self.loop_depth -= 1;
            }
            StmtKind::Do { body, cond } => {
                self.loop_depth += 1;
                self.check_stmt(body, labels, gotos);
                self.loop_depth -= 1;
                self.check_expr(cond);
            }
            StmtKind::For { init, cond, step, body } => {
                self.env.push();
                if let Some(init) = init {
                    self.check_stmt(init, labels, gotos);
                }
                if let Some(cond) = cond {
                    self.check_expr(cond);
                }
                if let Some(step) = step {
                    self.check_expr(step);
                }
                self.loop_depth += 1;
                self.check_stmt(body, labels, gotos);
                self.loop_depth -= 1;
                self.env.pop();
            }
            StmtKind::Goto(name) => gotos.push(GotoRef { name: *name, mark: s.mark }),
            StmtKind::Return(e) => {
                let expected = self.func_ret.last().cloned().unwrap_or(CType::Void);
                match e {
                    Some(e) => {
                        self.check_expr(e);
                        if expected.is_void() {
                            self.diag.error(s.mark, "'return' with a value in a function returning void");
                        } else if let Err(msg) = types::check_assignable(&expected, &e.ty()) {
                            self.diag.error(e.mark, format!("returning incompatible type: {msg}"));
                        }
                    }
                    None => {
                        if !expected.is_void() {
                            self.diag.error(s.mark, "'return' with no value in a function returning non-void");
                        }
                    }
                }
            }
            StmtKind::Compound(stmts) => {
                self.env.push();
                for st in stmts {
                    self.check_stmt(st, labels, gotos);
                }
                self.env.pop();
            }
            StmtKind::Expr(e) => self.check_expr(e),
        }
    }

    // ---- initializers ---------------------------------------------------------

    fn check_initializer(&mut self, init: &Expr, target: &CType) {
        let stripped = types::strip(target);
        match (&init.kind, &stripped) {
            (ExprKind::InitList(items), CType::Array { base, resolved_nelems, .. }) => {
                if let Some(n) = resolved_nelems {
                    if items.len() as u64 > *n {
                        self.diag.error(init.mark, "excess elements in array initializer");
                    }
                }
                for item in items {
                    self.check_initializer(item, base);
                }
            }
            (ExprKind::InitList(items), CType::Struct(def)) => {
                let fields = def.fields.borrow();
                if def.is_union {
                    if let Some(first) = items.first() {
                        if let Some(f) = fields.first() {
                            self.check_initializer(first, &f.ty);
                        }
                    }
                } else {
                    if items.len() > fields.len() {
                        self.diag.error(init.mark, "excess elements in struct initializer");
                    }
                    for (item, f) in items.iter().zip(fields.iter()) {
                        self.check_initializer(item, &f.ty);
                    }
                }
            }
            (ExprKind::DesignatedInit { designators, val }, CType::Struct(def)) => {
                if let Some(Designator::Field(name)) = designators.first() {
                    let fields = def.fields.borrow();
                    if let Some(f) = fields.iter().find(|f| f.name == Some(*name)) {
                        self.check_initializer(val, &f.ty);
                    } else {
                        self.diag.error(
                            init.mark,
                            format!("no member named '{}' in designated initializer", self.name_of(*name)),
                        );
                    }
                }
            }
            (ExprKind::StrConst(_), CType::Array { base, .. }) if matches!(types::strip(base), CType::Char) => {
                self.check_expr(init);
            }
            _ => {
                self.check_expr(init);
                if let Err(msg) = types::check_assignable(target, &init.ty()) {
                    self.diag.error(init.mark, format!("incompatible initializer: {msg}"));
                }
            }
        }
    }

    // ---- expressions ---------------------------------------------------------

    fn set(&self, e: &Expr, ty: CType, is_lvalue: bool) {
        *e.etype.borrow_mut() = Some(ty);
        e.is_lvalue.set(is_lvalue);
    }

    fn check_expr(&mut self, e: &Expr) {
        match &e.kind {
            ExprKind::Void => self.set(e, CType::Void, false),
            ExprKind::Paren(inner) => {
                self.check_expr(inner);
                self.set(e, inner.ty(), inner.is_lvalue.get());
            }
            ExprKind::Var(name) => match self.env.lookup(*name) {
                Some(ty) => {
                    let is_fn = types::is_function(&ty);
                    let is_enum_const = matches!(ty, CType::Enum(_));
                    self.set(e, ty, !is_fn && !is_enum_const);
                }
                None => {
                    self.diag.error(e.mark, format!("use of undeclared identifier '{}'", self.name_of(*name)));
                    self.set(e, CType::Int, false);
                }
            },
            ExprKind::IntConst { value: _, suffix } => {
                let base = match suffix.long_count {
                    2 => CType::LongLong,
                    1 => CType::Long,
                    _ => CType::Int,
                };
                let ty = if suffix.unsigned {
                    CType::Modifier { mods: TypeMods { is_unsigned: true, ..TypeMods::default() }, base: Box::new(base) }
                } else {
                    base
                };
                self.set(e, ty, false);
            }
            ExprKind::FloatConst { is_float, is_long_double, .. } => {
                let ty = if *is_long_double {
                    CType::LongDouble
                } else if *is_float {
                    CType::Float
                } else {
                    CType::Double
                };
                self.set(e, ty, false);
            }
            ExprKind::StrConst(sym) => {
                let len = self.session.strtab.resolve(*sym).len() as u64 + 1;
                self.set(
                    e,
                    CType::Array { base: Box::new(CType::Char), len_expr: None, resolved_nelems: Some(len) },
                    true,
                );
            }
            ExprKind::Assign { op, dest, rhs } => {
                self.check_expr(dest);
                self.check_expr(rhs);
                if !dest.is_lvalue.get() {
                    self.diag.error(dest.mark, "expression is not assignable");
                }
                let rhs_ty = rhs.ty();
                let dest_ty = dest.ty();
                let effective_rhs = if op.as_binop().is_some() {
                    types::usual_arithmetic_conversion(&dest_ty, &rhs_ty)
                } else {
                    rhs_ty
                };
                match types::check_assignable(&dest_ty, &effective_rhs) {
                    Ok(Some(warn)) => self.diag.warning(e.mark, warn),
                    Ok(None) => {}
                    Err(msg) => self.diag.error(e.mark, msg),
                }
                self.set(e, dest_ty, false);
            }
            ExprKind::Bin { op, l, r } => {
                self.check_expr(l);
                self.check_expr(r);
                let (lt, rt) = (l.ty(), r.ty());
                let ty = self.check_binop(*op, &lt, &rt, e.mark);
                self.set(e, ty, false);
            }
            ExprKind::Unary { op, e: operand } => {
                self.check_expr(operand);
                let ty = self.check_unop(*op, operand, e.mark);
                let is_lvalue = match op {
                    UnOp::Deref => true,
                    UnOp::PreInc | UnOp::PreDec | UnOp::PostInc | UnOp::PostDec => operand.is_lvalue.get(),
                    _ => false,
                };
                self.set(e, ty, is_lvalue);
            }
            ExprKind::Cond { c, t, f } => {
                self.check_expr(c);
                self.check_expr(t);
                self.check_expr(f);
                let (tt, ft) = (t.ty(), f.ty());
                let ty = if types::is_arithmetic(&tt) && types::is_arithmetic(&ft) {
                    types::usual_arithmetic_conversion(&tt, &ft)
                } else if types::is_pointer(&tt) {
                    tt
                } else {
                    ft
                };
                self.set(e, ty, false);
            }
            ExprKind::Cast { ty, e: inner } => {
                self.check_expr(inner);
                self.set(e, ty.clone(), false);
            }
            ExprKind::Call { func, args } => {
                self.check_expr(func);
                for a in args {
                    self.check_expr(a);
                }
                let stripped = types::strip(&func.ty());
                let ret = match &stripped {
                    CType::Func { ret, .. } => (**ret).clone(),
                    CType::Ptr { base, .. } if matches!(types::strip(base), CType::Func { .. }) => {
                        match types::strip(base) {
                            CType::Func { ret, .. } => *ret,
                            _ => unreachable!(),
                        }
                    }
                    _ => {
                        self.diag.error(func.mark, "called object is not a function or function pointer");
                        CType::Int
                    }
                };
                self.set(e, ret, false);
            }
            ExprKind::CompoundSeq(items) => {
                for item in items {
                    self.check_expr(item);
                }
                let last = items.last();
                match last {
                    Some(last) => self.set(e, last.ty(), last.is_lvalue.get()),
                    None => self.set(e, CType::Void, false),
                }
            }
            ExprKind::SizeofExpr(inner) => {
                self.check_expr(inner);
                if types::is_array(&inner.ty()) && !has_known_size(&inner.ty()) {
                    self.diag.error(e.mark, "sizeof applied to incomplete array type");
                }
                self.set(e, size_t(), false);
            }
            ExprKind::SizeofType(ty) => {
                if types::is_array(ty) && !has_known_size(ty) {
                    self.diag.error(e.mark, "sizeof applied to incomplete array type");
                }
                self.set(e, size_t(), false);
            }
            ExprKind::AlignofExpr(inner) => {
                self.check_expr(inner);
                self.set(e, size_t(), false);
            }
            ExprKind::AlignofType(_) => self.set(e, size_t(), false),
            ExprKind::Offsetof { ty, designators } => {
                self.check_offsetof_path(ty, designators, e.mark);
                self.set(e, size_t(), false);
            }
            ExprKind::Member { base, op, name } => {
                self.check_expr(base);
                let base_ty = base.ty();
                let struct_ty = match op {
                    MemberOp::Dot => types::strip(&base_ty),
                    MemberOp::Arrow => match types::strip(&base_ty) {
                        CType::Ptr { base, .. } => types::strip(&base),
                        other => other,
                    },
                };
                match &struct_ty {
                    CType::Struct(def) => {
                        let fields = def.fields.borrow();
                        match fields.iter().find(|f| f.name == Some(*name)) {
                            Some(f) => {
                                let is_lvalue = matches!(op, MemberOp::Arrow) || base.is_lvalue.get();
                                self.set(e, f.ty.clone(), is_lvalue);
                            }
                            None => {
                                self.diag.error(e.mark, format!("no member named '{}'", self.name_of(*name)));
                                self.set(e, CType::Int, false);
                            }
                        }
                    }
                    _ => {
                        self.diag.error(base.mark, "member reference base type is not a struct or union");
                        self.set(e, CType::Int, false);
                    }
                }
            }
            ExprKind::Index { arr, idx } => {
                self.check_expr(arr);
                self.check_expr(idx);
                let base = match types::strip(&arr.ty()) {
                    CType::Ptr { base, .. } | CType::Array { base, .. } => *base,
                    _ => {
                        self.diag.error(arr.mark, "subscripted value is not an array or pointer");
                        CType::Int
                    }
                };
                self.set(e, base, true);
            }
            ExprKind::InitList(items) => {
                for item in items {
                    self.check_expr(item);
                }
                self.set(e, CType::Void, false);
            }
            ExprKind::DesignatedInit { designators, val } => {
                for d in designators {
                    if let Designator::Index(idx) = d {
                        self.check_expr(idx);
                    }
                }
                self.check_expr(val);
                self.set(e, val.ty(), false);
            }
            ExprKind::CompoundLiteral { ty, init } => {
                self.check_initializer(init, ty);
                self.set(e, ty.clone(), true);
            }
            ExprKind::VaStart { ap, .. } => {
                self.check_expr(ap);
                self.set(e, CType::Void, false);
            }
            ExprKind::VaArg { ap, ty } => {
                self.check_expr(ap);
                self.set(e, ty.clone(), false);
            }
            ExprKind::VaEnd { ap } => {
                self.check_expr(ap);
                self.set(e, CType::Void, false);
            }
            ExprKind::VaCopy { dst, src } => {
                self.check_expr(dst);
                self.check_expr(src);
                self.set(e, CType::Void, false);
            }
            ExprKind::Generic { controlling, assocs } => {
                self.check_expr(controlling);
                let ctrl_ty = controlling.ty();
                let mut chosen: Option<usize> = None;
                for (i, (ty, _)) in assocs.iter().enumerate() {
                    if let Some(ty) = ty {
                        if types::types_equal(ty, &ctrl_ty) {
                            chosen = Some(i);
                            break;
                        }
                    }
                }
                let chosen = chosen.or_else(|| assocs.iter().position(|(ty, _)| ty.is_none()));
                for (_, expr) in assocs {
                    self.check_expr(expr);
                }
                match chosen {
                    Some(i) => self.set(e, assocs[i].1.ty(), assocs[i].1.is_lvalue.get()),
                    None => {
                        self.diag.error(e.mark, "'_Generic' selector of type not found in generic association list");
                        self.set(e, CType::Int, false);
                    }
                }
            }
        }
    }

    fn check_offsetof_path(&mut self, ty: &CType, designators: &[Designator], mark: Option<crate::mark::MarkId>) {
        let mut cur = types::strip(ty);
        for d in designators {
            match (&cur, d) {
                (CType::Struct(def), Designator::Field(name)) => {
                    let fields = def.fields.borrow();
                    match fields.iter().find(|f| f.name == Some(*name)) {
                        Some(f) => {
                            if f.bitfield.is_some() {
                                self.diag.error(mark, "cannot compute offset of bit-field");
                            }
                            cur = types::strip(&f.ty);
                        }
                        None => {
                            self.diag.error(mark, format!("no member named '{}'", self.name_of(*name)));
                            return;
                        }
                    }
                }
                (CType::Array { base, .. }, Designator::Index(idx)) => {
                    let idx_copy = (**idx).clone();
                    self.check_expr(&idx_copy);
                    cur = types::strip(base);
                }
                _ => {
                    self.diag.error(mark, "invalid offsetof designator");
                    return;
                }
            }
        }
    }

    fn check_unop(&mut self, op: UnOp, operand: &Expr, mark: Option<crate::mark::MarkId>) -> CType {
        let ty = operand.ty();
        match op {
            UnOp::AddrOf => {
                if !operand.is_lvalue.get() {
                    self.diag.error(mark, "cannot take the address of an rvalue");
                }
                CType::ptr_to(ty)
            }
            UnOp::Deref => match types::strip(&ty) {
                CType::Ptr { base, .. } => {
                    if matches!(types::strip(&base), CType::Void) {
                        self.diag.warning(mark, "dereferencing 'void *' pointer");
                    }
                    *base
                }
                _ => {
                    self.diag.error(mark, "indirection requires pointer operand");
                    CType::Int
                }
            },
            UnOp::LNot => CType::Int,
            UnOp::Plus | UnOp::Neg | UnOp::BNot => types::promote(&ty),
            UnOp::PreInc | UnOp::PreDec | UnOp::PostInc | UnOp::PostDec => {
                if !operand.is_lvalue.get() {
                    self.diag.error(mark, "expression is not assignable");
                }
                ty
            }
        }
    }

    fn check_binop(&mut self, op: BinOp, lt: &CType, rt: &CType, mark: Option<crate::mark::MarkId>) -> CType {
        use BinOp::*;
        match op {
            LAnd | LOr => CType::Int,
            Lt | Gt | Le | Ge | Eq | Ne => CType::Int,
            Add | Sub if types::is_pointer(lt) || types::is_array(lt) => {
                if op == Sub && (types::is_pointer(rt) || types::is_array(rt)) {
                    CType::Long
                } else if types::is_integer(rt) {
                    ptr_decay(lt)
                } else {
                    self.diag.error(mark, "invalid operands for pointer arithmetic");
                    ptr_decay(lt)
                }
            }
            Add if types::is_integer(lt) && (types::is_pointer(rt) || types::is_array(rt)) => ptr_decay(rt),
            _ => {
                if !types::is_arithmetic(lt) || !types::is_arithmetic(rt) {
                    self.diag.error(mark, "invalid operands to binary expression");
                }
                types::usual_arithmetic_conversion(lt, rt)
            }
        }
    }

    /// Folds a constant expression to an `i64`, per `spec.md` §4.4.1
    /// `const_eval`. Used for `case` labels, enum initializers, array bounds
    /// and `_Static_assert` conditions.
    fn const_eval(&self, e: &Expr) -> Option<i64> {
        const_eval_fold(e)
    }
}

fn has_known_size(ty: &CType) -> bool {
    matches!(types::strip(ty), CType::Array { resolved_nelems: Some(_), .. }) || !types::is_array(ty)
}

fn ptr_decay(ty: &CType) -> CType {
    match types::strip(ty) {
        CType::Array { base, .. } => CType::ptr_to(*base),
        other => other,
    }
}

/// Parse-time / type-independent constant folding: literals and the
/// arithmetic/bitwise/logical/comparison operators C11 allows in a constant
/// expression. Does not need `etype` to be filled in, so the parser can call
/// it directly for array bounds, bit-field widths, and enum values before
/// the checker ever runs.
pub fn const_eval_fold(e: &Expr) -> Option<i64> {
    match &e.kind {
        ExprKind::IntConst { value, .. } => Some(*value),
        ExprKind::Var(name) => match &*e.etype.borrow() {
            Some(CType::Enum(def)) => def.constants.borrow().iter().find(|(n, _)| n == name).map(|(_, v)| *v),
            _ => None,
        },
        ExprKind::Paren(inner) => const_eval_fold(inner),
        ExprKind::Cast { e: inner, .. } => const_eval_fold(inner),
        ExprKind::Unary { op, e: inner } => {
            let v = const_eval_fold(inner)?;
            Some(match op {
                UnOp::Neg => -v,
                UnOp::Plus => v,
                UnOp::BNot => !v,
                UnOp::LNot => (v == 0) as i64,
                _ => return None,
            })
        }
        ExprKind::Bin { op, l, r } => {
            let lv = const_eval_fold(l)?;
            if matches!(op, BinOp::LAnd) {
                if lv == 0 {
                    return Some(0);
                }
                return Some((const_eval_fold(r)? != 0) as i64);
            }
            if matches!(op, BinOp::LOr) {
                if lv != 0 {
                    return Some(1);
                }
                return Some((const_eval_fold(r)? != 0) as i64);
            }
            let rv = const_eval_fold(r)?;
            Some(match op {
                BinOp::Add => lv.wrapping_add(rv),
                BinOp::Sub => lv.wrapping_sub(rv),
                BinOp::Mul => lv.wrapping_mul(rv),
                BinOp::Div => lv.checked_div(rv)?,
                BinOp::Mod => lv.checked_rem(rv)?,
                BinOp::Shl => lv.wrapping_shl(rv as u32),
                BinOp::Shr => lv.wrapping_shr(rv as u32),
                BinOp::Lt => (lv < rv) as i64,
                BinOp::Gt => (lv > rv) as i64,
                BinOp::Le => (lv <= rv) as i64,
                BinOp::Ge => (lv >= rv) as i64,
                BinOp::Eq => (lv == rv) as i64,
                BinOp::Ne => (lv != rv) as i64,
                BinOp::BAnd => lv & rv,
                BinOp::BXor => lv ^ rv,
                BinOp::BOr => lv | rv,
                BinOp::LAnd | BinOp::LOr => unreachable!("handled above"),
            })
        }
        ExprKind::Cond { c, t, f } => {
            if const_eval_fold(c)? != 0 {
                const_eval_fold(t)
            } else {
                const_eval_fold(f)
            }
        }
        ExprKind::CompoundSeq(items) => items.last().and_then(const_eval_fold),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use std::io::Write;

    fn check_src(src: &str) -> (TranslationUnit, Session, bool) {
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
        let tu = crate::parser::parse(tokens, &mut session, &mut diag);
        let ok = typecheck(&tu, &session, &mut diag);
        (tu, session, ok && !diag.had_error())
    }

    #[test]
    fn well_typed_function_checks_clean() {
        let (_tu, _s, ok) = check_src("int f(int a, int b) { return a + b; }");
        assert!(ok);
    }

    #[test]
    fn undeclared_identifier_is_an_error() {
        let (_tu, _s, ok) = check_src("int f(void) { return x; }");
        assert!(!ok);
    }

    #[test]
    fn return_type_mismatch_with_void_is_an_error() {
        let (_tu, _s, ok) = check_src("void f(void) { return 1; }");
        assert!(!ok);
    }

    #[test]
    fn break_outside_loop_or_switch_is_an_error() {
        let (_tu, _s, ok) = check_src("void f(void) { break; }");
        assert!(!ok);
    }

    #[test]
    fn case_outside_switch_is_an_error() {
        let (_tu, _s, ok) = check_src("void f(void) { case 1: ; }");
        assert!(!ok);
    }

    #[test]
    fn assigning_through_dereferenced_pointer_checks_clean() {
        let (_tu, _s, ok) = check_src("void f(int *p) { *p = 3; }");
        assert!(ok);
    }

    #[test]
    fn const_eval_fold_handles_arithmetic_and_ternary() {
        let e = Expr::new(
            ExprKind::Cond {
                c: Box::new(Expr::new(ExprKind::IntConst { value: 1, suffix: Default::default() }, None)),
                t: Box::new(Expr::new(
                    ExprKind::Bin {
                        op: BinOp::Add,
                        l: Box::new(Expr::new(ExprKind::IntConst { value: 2, suffix: Default::default() }, None)),
                        r: Box::new(Expr::new(ExprKind::IntConst { value: 3, suffix: Default::default() }, None)),
                    },
                    None,
                )),
                f: Box::new(Expr::new(ExprKind::IntConst { value: 0, suffix: Default::default() }, None)),
            },
            None,
        );
        assert_eq!(const_eval_fold(&e), Some(5));
    }
}
