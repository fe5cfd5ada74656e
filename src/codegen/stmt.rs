//! Statement lowering: control flow, declarations, and `spec.md` §4.4.2's
//! "dead label after every terminator" discipline, which keeps every block
//! that follows a `goto`/`break`/`continue`/`return` well-formed even when
//! the source that follows it is unreachable.

use super::{storage_mods, CodeGen};
use crate::ast::*;
use crate::ir::*;
use crate::strtab::Sym;
use crate::types;

impl<'a> CodeGen<'a> {
    pub(super) fn lower_stmt(&mut self, s: &Stmt) {
        match &s.kind {
            StmtKind::Nop => {}
            StmtKind::Decl(declarators) => self.lower_local_decls(declarators),
            StmtKind::Label { name, body } => {
                let label = self.label_id(*name);
                self.body.push(IrStmt::Br { cond: None, then_label: label, else_label: None });
                self.set_label(label);
                self.lower_stmt(body);
            }
            StmtKind::Case { val, body } => {
                let v = crate::typecheck::const_eval_fold(val).unwrap_or(0);
                let label = self
                    .case_maps
                    .last()
                    .and_then(|(cases, _)| cases.get(&v).copied())
                    .expect("checker should have rejected: case label outside a switch");
                self.body.push(IrStmt::Br { cond: None, then_label: label, else_label: None });
                self.set_label(label);
                self.lower_stmt(body);
            }
            StmtKind::Default(body) => {
                let label = self
                    .case_maps
                    .last()
                    .and_then(|(_, default)| *default)
                    .expect("checker should have rejected: default label outside a switch");
                self.body.push(IrStmt::Br { cond: None, then_label: label, else_label: None });
                self.set_label(label);
                self.lower_stmt(body);
            }
            StmtKind::If { cond, then_s, else_s } => self.lower_if(cond, then_s, else_s.as_deref()),
            StmtKind::Switch { cond, body } => self.lower_switch(cond, body),
            StmtKind::While { cond, body } => self.lower_while(cond, body),
            StmtKind::Do { body, cond } => self.lower_do(body, cond),
            StmtKind::For { init, cond, step, body } => self.lower_for(init.as_deref(), cond.as_deref(), step.as_deref(), body),
            StmtKind::Goto(name) => {
                let label = self.label_id(*name);
                self.body.push(IrStmt::Br { cond: None, then_label: label, else_label: None });
                self.enter_dead_block();
            }
            StmtKind::Continue => {
                let target = *self.continue_targets.last().expect("checker should have rejected: continue outside a loop");
                self.body.push(IrStmt::Br { cond: None, then_label: target, else_label: None });
                self.enter_dead_block();
            }
            StmtKind::Break => {
                let target = *self.break_targets.last().expect("checker should have rejected: break outside a loop/switch");
                self.body.push(IrStmt::Br { cond: None, then_label: target, else_label: None });
                self.enter_dead_block();
            }
            StmtKind::Return(e) => {
                let ret_ty = self.cur_ret_ty.clone();
                match e {
                    Some(e) => {
                        let v = self.lower_expr(e);
                        let v = self.convert(v, &e.ty(), &ret_ty);
                        let irty = self.ctype_to_irtype(&ret_ty);
                        self.body.push(IrStmt::Ret(Some((irty, v))));
                    }
                    None => self.body.push(IrStmt::Ret(None)),
                }
                self.enter_dead_block();
            }
            StmtKind::Compound(stmts) => {
                self.locals.push(std::collections::HashMap::new());
                for inner in stmts {
                    self.lower_stmt(inner);
                }
                self.locals.pop();
            }
            StmtKind::Expr(e) => {
                self.lower_expr(e);
            }
        }
    }

    fn enter_dead_block(&mut self) {
        let label = self.fresh_label();
        self.set_label(label);
    }

    fn lower_local_decls(&mut self, declarators: &[Declarator]) {
        for d in declarators {
            let Some(name) = d.name else { continue };
            let mods = storage_mods(&d.ty);
            if mods.is_typedef || types::is_function(&d.ty) {
                continue;
            }
            if mods.is_extern {
                if let Some(slot) = self.globals.get(&name).cloned() {
                    self.locals.last_mut().unwrap().insert(name, slot);
                }
                continue;
            }
            if mods.is_static {
                self.lower_static_local(name, d);
                continue;
            }
            let irty = self.ctype_to_irtype(&d.ty);
            let (slot, ptr) = self.fresh_alloca(irty.clone());
            self.locals.last_mut().unwrap().insert(name, super::VarSlot { name: slot, local: true, ty: irty.clone() });
            if let Some(init) = &d.init {
                self.lower_aggregate_init(&ptr, &d.ty, init);
            }
        }
    }

    /// A function-scope `static` local keeps its storage across calls, so it
    /// becomes an ordinary module global with a name unique to this
    /// function, initialized once at link time rather than on every call
    /// (`spec.md` §4.4.2 "Storage duration").
    fn lower_static_local(&mut self, name: Sym, d: &Declarator) {
        let base = self.session.strtab.resolve(name).to_string();
        let n = self.module.fresh_anon_global();
        let mangled = self.session.strtab.intern(&format!("{base}.{n}"));
        let irty = self.ctype_to_irtype(&d.ty);
        let init = match &d.init {
            Some(e) => Some(self.lower_const_init(&d.ty, e)),
            None => Some(self.zero_value(&irty)),
        };
        let align = self.ir_align(&irty);
        self.module.decls.push(IrGDecl::Global(IrGlobal {
            name: mangled,
            linkage: Linkage::Internal,
            unnamed_addr: false,
            is_constant: false,
            ty: irty.clone(),
            init,
            align,
        }));
        self.locals.last_mut().unwrap().insert(name, super::VarSlot { name: mangled, local: false, ty: irty });
    }

    fn lower_if(&mut self, cond: &Expr, then_s: &Stmt, else_s: Option<&Stmt>) {
        let cond_i1 = self.lower_to_i1(cond);
        let then_label = self.fresh_label();
        let join_label = self.fresh_label();
        match else_s {
            Some(else_s) => {
                let else_label = self.fresh_label();
                self.body.push(IrStmt::Br { cond: Some(cond_i1), then_label, else_label: Some(else_label) });
                self.set_label(then_label);
                self.lower_stmt(then_s);
                self.body.push(IrStmt::Br { cond: None, then_label: join_label, else_label: None });
                self.set_label(else_label);
                self.lower_stmt(else_s);
                self.body.push(IrStmt::Br { cond: None, then_label: join_label, else_label: None });
            }
            None => {
                self.body.push(IrStmt::Br { cond: Some(cond_i1), then_label, else_label: Some(join_label) });
                self.set_label(then_label);
                self.lower_stmt(then_s);
                self.body.push(IrStmt::Br { cond: None, then_label: join_label, else_label: None });
            }
        }
        self.set_label(join_label);
    }

    fn lower_while(&mut self, cond: &Expr, body: &Stmt) {
        let cond_label = self.fresh_label();
        let body_label = self.fresh_label();
        let end_label = self.fresh_label();
        self.body.push(IrStmt::Br { cond: None, then_label: cond_label, else_label: None });
        self.set_label(cond_label);
        let cond_i1 = self.lower_to_i1(cond);
        self.body.push(IrStmt::Br { cond: Some(cond_i1), then_label: body_label, else_label: Some(end_label) });
        self.set_label(body_label);
        self.break_targets.push(end_label);
        self.continue_targets.push(cond_label);
        self.lower_stmt(body);
        self.continue_targets.pop();
        self.break_targets.pop();
        self.body.push(IrStmt::Br { cond: None, then_label: cond_label, else_label: None });
        self.set_label(end_label);
    }

    fn lower_do(&mut self, body: &Stmt, cond: &Expr) {
        let body_label = self.fresh_label();
        let cond_label = self.fresh_label();
        let end_label = self.fresh_label();
        self.body.push(IrStmt::Br { cond: None, then_label: body_label, else_label: None });
        self.set_label(body_label);
        self.break_targets.push(end_label);
        self.continue_targets.push(cond_label);
        self.lower_stmt(body);
        self.continue_targets.pop();
        self.break_targets.pop();
        self.body.push(IrStmt::Br { cond: None, then_label: cond_label, else_label: None });
        self.set_label(cond_label);
        let cond_i1 = self.lower_to_i1(cond);
        self.body.push(IrStmt::Br { cond: Some(cond_i1), then_label: body_label, else_label: Some(end_label) });
        self.set_label(end_label);
    }

    fn lower_for(&mut self, init: Option<&Stmt>, cond: Option<&Expr>, step: Option<&Expr>, body: &Stmt) {
        self.locals.push(std::collections::HashMap::new());
        if let Some(init) = init {
            self.lower_stmt(init);
        }
        let cond_label = self.fresh_label();
        let body_label = self.fresh_label();
        let step_label = self.fresh_label();
        let end_label = self.fresh_label();
        self.body.push(IrStmt::Br { cond: None, then_label: cond_label, else_label: None });
        self.set_label(cond_label);
        match cond {
            Some(cond) => {
                let cond_i1 = self.lower_to_i1(cond);
                self.body.push(IrStmt::Br { cond: Some(cond_i1), then_label: body_label, else_label: Some(end_label) });
            }
            None => self.body.push(IrStmt::Br { cond: None, then_label: body_label, else_label: None }),
        }
        self.set_label(body_label);
        self.break_targets.push(end_label);
        self.continue_targets.push(step_label);
        self.lower_stmt(body);
        self.continue_targets.pop();
        self.break_targets.pop();
        self.body.push(IrStmt::Br { cond: None, then_label: step_label, else_label: None });
        self.set_label(step_label);
        if let Some(step) = step {
            self.lower_expr(step);
        }
        self.body.push(IrStmt::Br { cond: None, then_label: cond_label, else_label: None });
        self.set_label(end_label);
        self.locals.pop();
    }

    /// `switch` pre-scans its body for every reachable `case`/`default`
    /// (including through nested `if`/loops, never through a nested
    /// `switch`'s own cases) so a case's label exists before the case is
    /// reached textually — required for Duff's-device-style jumps into the
    /// middle of a loop body.
    fn lower_switch(&mut self, cond: &Expr, body: &Stmt) {
        let mut cases = std::collections::HashMap::new();
        let mut default = None;
        self.collect_switch_labels(body, &mut cases, &mut default);

        let cond_cty = types::promote(&cond.ty());
        let v = self.lower_expr(cond);
        let v = self.convert(v, &cond.ty(), &cond_cty);
        let irty = self.ctype_to_irtype(&cond_cty);

        let end_label = self.fresh_label();
        let default_label = default.unwrap_or(end_label);
        let mut case_list: Vec<(i64, Sym)> = cases.iter().map(|(k, v)| (*k, *v)).collect();
        case_list.sort_by_key(|(k, _)| *k);
        self.body.push(IrStmt::Switch { ty: irty, val: v, default: default_label, cases: case_list });

        self.case_maps.push((cases, default));
        self.break_targets.push(end_label);
        let entry_label = self.fresh_label();
        self.set_label(entry_label);
        self.lower_stmt(body);
        self.break_targets.pop();
        self.case_maps.pop();

        self.body.push(IrStmt::Br { cond: None, then_label: end_label, else_label: None });
        self.set_label(end_label);
    }

    fn collect_switch_labels(&mut self, s: &Stmt, cases: &mut std::collections::HashMap<i64, Sym>, default: &mut Option<Sym>) {
        match &s.kind {
            StmtKind::Case { val, body } => {
                let v = crate::typecheck::const_eval_fold(val).unwrap_or(0);
                let label = self.fresh_label();
                cases.insert(v, label);
                self.collect_switch_labels(body, cases, default);
            }
            StmtKind::Default(body) => {
                *default = Some(self.fresh_label());
                self.collect_switch_labels(body, cases, default);
            }
            StmtKind::Label { body, .. } => self.collect_switch_labels(body, cases, default),
            StmtKind::If { then_s, else_s, .. } => {
                self.collect_switch_labels(then_s, cases, default);
                if let Some(else_s) = else_s {
                    self.collect_switch_labels(else_s, cases, default);
                }
            }
            StmtKind::While { body, .. } | StmtKind::Do { body, .. } | StmtKind::For { body, .. } => {
                self.collect_switch_labels(body, cases, default);
            }
            StmtKind::Compound(stmts) => {
                for inner in stmts {
                    self.collect_switch_labels(inner, cases, default);
                }
            }
            // A nested switch owns its own cases; don't recurse into its body.
            StmtKind::Switch { .. } => {}
            _ => {}
        }
    }
}
