//! Textual rendering of an [`IrModule`] into the small LLVM-IR dialect this
//! front end targets, grounded on `examples/original_source/src/ir/ir_print.c`
//! for the grammar (types before values, `%`/`@` sigils, `declare`/`define`).
//!
//! A call with a `void` return is the one instruction represented as an
//! `IrStmt::Assign` whose `ty` is [`IrType::Void`]; this printer is what
//! honors that convention, dropping the `%dest = ` prefix in that one case.

use crate::ir::*;
use crate::session::Session;
use crate::strtab::Sym;
use std::collections::HashMap;
use std::fmt::Write as _;

struct Ctx<'a> {
    session: &'a Session,
    struct_fields: HashMap<Sym, Vec<IrType>>,
}

impl<'a> Ctx<'a> {
    fn name(&self, s: Sym) -> &str {
        self.session.strtab.resolve(s)
    }
}

pub fn print_module(module: &IrModule, session: &Session) -> String {
    let mut struct_fields = HashMap::new();
    for decl in &module.decls {
        if let IrGDecl::IdentifiedStruct { name, fields } = decl {
            struct_fields.insert(*name, fields.clone());
        }
    }
    let ctx = Ctx { session, struct_fields };

    let mut out = String::new();
    let _ = writeln!(out, "; ModuleID = '{}'", module.name);
    let _ = writeln!(
        out,
        "target datalayout = \"e-m:e-i64:64-f80:128-n8:16:32:64-S128\""
    );
    let _ = writeln!(out, "target triple = \"x86_64-unknown-linux-gnu\"");
    out.push('\n');

    for decl in &module.decls {
        if let IrGDecl::IdentifiedStruct { name, fields } = decl {
            let field_strs: Vec<String> = fields.iter().map(|f| type_str(f, &ctx)).collect();
            let _ = writeln!(out, "%{} = type {{ {} }}", ctx.name(*name), field_strs.join(", "));
        }
    }
    out.push('\n');

    for decl in &module.decls {
        if let IrGDecl::Global(g) = decl {
            print_global(&mut out, g, &ctx);
        }
    }
    out.push('\n');

    for decl in &module.decls {
        if let IrGDecl::FunctionDecl(sig) = decl {
            print_decl(&mut out, sig, &ctx);
        }
    }
    out.push('\n');

    for decl in &module.decls {
        if let IrGDecl::FunctionDef(f) = decl {
            print_function(&mut out, f, &ctx);
            out.push('\n');
        }
    }

    out
}

fn print_global(out: &mut String, g: &IrGlobal, ctx: &Ctx) {
    let linkage = g.linkage.keyword();
    let linkage = if linkage.is_empty() { String::new() } else { format!("{linkage} ") };
    let unnamed = if g.unnamed_addr { "unnamed_addr " } else { "" };
    let kind = if g.is_constant { "constant" } else { "global" };
    let ty_str = type_str(&g.ty, ctx);
    match &g.init {
        Some(init) => {
            let init_str = print_const(init, &g.ty, ctx);
            let _ = writeln!(out, "@{} = {linkage}{unnamed}{kind} {ty_str} {init_str}, align {}", ctx.name(g.name), g.align);
        }
        None => {
            let _ = writeln!(out, "@{} = {linkage}external {kind} {ty_str}, align {}", ctx.name(g.name), g.align);
        }
    }
}

fn print_decl(out: &mut String, sig: &IrFunctionSig, ctx: &Ctx) {
    let params: Vec<String> = sig.params.iter().map(|t| type_str(t, ctx)).collect();
    let mut plist = params.join(", ");
    if sig.varargs {
        if !plist.is_empty() {
            plist.push_str(", ");
        }
        plist.push_str("...");
    }
    let _ = writeln!(out, "declare {} @{}({})", type_str(&sig.ret, ctx), ctx.name(sig.name), plist);
}

fn print_function(out: &mut String, f: &IrFunction, ctx: &Ctx) {
    let params: Vec<String> = f
        .sig
        .params
        .iter()
        .zip(f.param_names.iter())
        .map(|(t, n)| format!("{} %{}", type_str(t, ctx), ctx.name(*n)))
        .collect();
    let mut plist = params.join(", ");
    if f.sig.varargs {
        if !plist.is_empty() {
            plist.push_str(", ");
        }
        plist.push_str("...");
    }
    let _ = writeln!(out, "define {} @{}({}) {{", type_str(&f.sig.ret, ctx), ctx.name(f.sig.name), plist);
    out.push_str("entry:\n");
    for stmt in &f.prefix {
        print_stmt(out, stmt, ctx);
    }
    if let Some(IrStmt::Label(name)) = f.body.first() {
        let _ = writeln!(out, "  br label %{}", ctx.name(*name));
    }
    for stmt in &f.body {
        print_stmt(out, stmt, ctx);
    }
    out.push_str("}\n");
}

fn print_stmt(out: &mut String, stmt: &IrStmt, ctx: &Ctx) {
    match stmt {
        IrStmt::Label(name) => {
            let _ = writeln!(out, "{}:", ctx.name(*name));
        }
        IrStmt::Ret(None) => out.push_str("  ret void\n"),
        IrStmt::Ret(Some((ty, val))) => {
            let _ = writeln!(out, "  ret {} {}", type_str(ty, ctx), print_value(val, ty, ctx));
        }
        IrStmt::Br { cond: None, then_label, else_label: _ } => {
            let _ = writeln!(out, "  br label %{}", ctx.name(*then_label));
        }
        IrStmt::Br { cond: Some(c), then_label, else_label: Some(e) } => {
            let _ = writeln!(
                out,
                "  br i1 {}, label %{}, label %{}",
                print_value(c, &IrType::i1(), ctx),
                ctx.name(*then_label),
                ctx.name(*e)
            );
        }
        IrStmt::Br { cond: Some(_), else_label: None, .. } => unreachable!("a conditional branch always has an else target"),
        IrStmt::Switch { ty, val, default, cases } => {
            let _ = writeln!(out, "  switch {} {}, label %{} [", type_str(ty, ctx), print_value(val, ty, ctx), ctx.name(*default));
            for (v, label) in cases {
                let _ = writeln!(out, "    {} {}, label %{}", type_str(ty, ctx), v, ctx.name(*label));
            }
            out.push_str("  ]\n");
        }
        IrStmt::IndirectBr { addr, possible } => {
            let labels: Vec<String> = possible.iter().map(|l| format!("label %{}", ctx.name(*l))).collect();
            let _ = writeln!(out, "  indirectbr i8* {}, [ {} ]", print_value(addr, &IrType::Ptr(Box::new(IrType::i8())), ctx), labels.join(", "));
        }
        IrStmt::Store { ty, val, ptr } => {
            let ptr_ty = IrType::Ptr(Box::new(ty.clone()));
            let _ = writeln!(out, "  store {} {}, {} {}", type_str(ty, ctx), print_value(val, ty, ctx), type_str(&ptr_ty, ctx), print_value(ptr, &ptr_ty, ctx));
        }
        IrStmt::Assign { dest, ty, src } => print_assign(out, *dest, ty, src, ctx),
    }
}

fn print_assign(out: &mut String, dest: Sym, ty: &IrType, src: &IrExpr, ctx: &Ctx) {
    let rhs = print_rhs(src, ty, ctx);
    match src {
        IrExpr::Call { .. } if matches!(ty, IrType::Void) => {
            let _ = writeln!(out, "  {rhs}");
        }
        _ => {
            let _ = writeln!(out, "  %{} = {rhs}", ctx.name(dest));
        }
    }
}

fn print_rhs(e: &IrExpr, ty: &IrType, ctx: &Ctx) -> String {
    match e {
        IrExpr::Alloca { elem, nelem, align } => {
            let mut s = format!("alloca {}", type_str(elem, ctx));
            if let Some(n) = nelem {
                let _ = write!(s, ", i64 {}", print_value(n, &IrType::i64(), ctx));
            }
            let _ = write!(s, ", align {align}");
            s
        }
        IrExpr::Binop { op, ty: oty, l, r } => {
            format!("{} {} {}, {}", binop_mnemonic(*op), type_str(oty, ctx), print_value(l, oty, ctx), print_value(r, oty, ctx))
        }
        IrExpr::Load { ty: lty, ptr } => {
            let ptr_ty = IrType::Ptr(Box::new(lty.clone()));
            format!("load {}, {} {}", type_str(lty, ctx), type_str(&ptr_ty, ctx), print_value(ptr, &ptr_ty, ctx))
        }
        IrExpr::GetElementPtr { base_ty, base, indices } => {
            let base_ptr_ty = IrType::Ptr(Box::new(base_ty.clone()));
            let idx_strs: Vec<String> = indices.iter().map(|i| format!("i64 {}", print_value(i, &IrType::i64(), ctx))).collect();
            format!(
                "getelementptr inbounds {}, {} {}, {}",
                type_str(base_ty, ctx),
                type_str(&base_ptr_ty, ctx),
                print_value(base, &base_ptr_ty, ctx),
                idx_strs.join(", ")
            )
        }
        IrExpr::Convert { kind, src_ty, dst_ty, src } => {
            format!("{} {} {} to {}", kind.mnemonic(), type_str(src_ty, ctx), print_value(src, src_ty, ctx), type_str(dst_ty, ctx))
        }
        IrExpr::Icmp { cond, ty: oty, l, r } => {
            format!("icmp {} {} {}, {}", cond.mnemonic(), type_str(oty, ctx), print_value(l, oty, ctx), print_value(r, oty, ctx))
        }
        IrExpr::Fcmp { cond, ty: oty, l, r } => {
            format!("fcmp {} {} {}, {}", cond.mnemonic(), type_str(oty, ctx), print_value(l, oty, ctx), print_value(r, oty, ctx))
        }
        IrExpr::Phi { ty: pty, incoming } => {
            let entries: Vec<String> =
                incoming.iter().map(|(v, label)| format!("[ {}, %{} ]", print_value(v, pty, ctx), ctx.name(*label))).collect();
            format!("phi {} {}", type_str(pty, ctx), entries.join(", "))
        }
        IrExpr::Select { cond, t, f } => {
            format!("select i1 {}, {} {}, {} {}", print_value(cond, &IrType::i1(), ctx), type_str(ty, ctx), print_value(t, ty, ctx), type_str(ty, ctx), print_value(f, ty, ctx))
        }
        IrExpr::Call { ret_ty, param_tys, varargs, func, args } => {
            let arg_strs: Vec<String> =
                args.iter().zip(param_tys.iter()).map(|(a, t)| format!("{} {}", type_str(t, ctx), print_value(a, t, ctx))).collect();
            let func_ty = IrType::Func { ret: Box::new(ret_ty.clone()), params: param_tys.clone(), varargs: *varargs };
            format!("call {} {}({})", type_str(ret_ty, ctx), print_value(func, &func_ty, ctx), arg_strs.join(", "))
        }
        IrExpr::VaArg { ap, ty: vty } => {
            let ap_ty = IrType::Ptr(Box::new(IrType::i8()));
            format!("va_arg {} {}, {}", type_str(&ap_ty, ctx), print_value(ap, &ap_ty, ctx), type_str(vty, ctx))
        }
        IrExpr::Var { .. } | IrExpr::Const(_) => print_value(e, ty, ctx),
    }
}

/// Prints `e` as a bare operand (no leading type) in the position a `<ty>`
/// has already been written for.
fn print_value(e: &IrExpr, ty: &IrType, ctx: &Ctx) -> String {
    match e {
        IrExpr::Var { name, local } => format!("{}{}", if *local { "%" } else { "@" }, ctx.name(*name)),
        IrExpr::Const(c) => print_const(c, ty, ctx),
        other => format!("({})", print_rhs(other, ty, ctx)),
    }
}

fn print_const(c: &IrConst, ty: &IrType, ctx: &Ctx) -> String {
    match c {
        IrConst::Int(n) => n.to_string(),
        IrConst::Bool(b) => if *b { "true" } else { "false" }.to_string(),
        IrConst::Float(f) => hex_float(*f),
        IrConst::Null => "null".to_string(),
        IrConst::Zero => "zeroinitializer".to_string(),
        IrConst::Undef => "undef".to_string(),
        IrConst::Str(sym) => format!("c\"{}\"", escape_c_string(ctx.name(*sym))),
        IrConst::Array(items) => {
            let elem_ty = match ty {
                IrType::Arr(_, elem) => elem.as_ref(),
                _ => ty,
            };
            let parts: Vec<String> = items.iter().map(|i| format!("{} {}", type_str(elem_ty, ctx), print_value(i, elem_ty, ctx))).collect();
            format!("[ {} ]", parts.join(", "))
        }
        IrConst::Struct(items) => {
            let field_tys = struct_field_types(ty, ctx);
            let parts: Vec<String> = items
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    let fty = field_tys.get(i).cloned().unwrap_or(IrType::i32());
                    format!("{} {}", type_str(&fty, ctx), print_value(v, &fty, ctx))
                })
                .collect();
            format!("{{ {} }}", parts.join(", "))
        }
    }
}

fn struct_field_types(ty: &IrType, ctx: &Ctx) -> Vec<IrType> {
    match ty {
        IrType::StructLit(fields) => fields.clone(),
        IrType::IdStruct(name) => ctx.struct_fields.get(name).cloned().unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn type_str(ty: &IrType, ctx: &Ctx) -> String {
    match ty {
        IrType::Void => "void".to_string(),
        IrType::Int(n) => format!("i{n}"),
        IrType::Float => "float".to_string(),
        IrType::Double => "double".to_string(),
        IrType::X86Fp80 => "x86_fp80".to_string(),
        IrType::Ptr(inner) => format!("{}*", type_str(inner, ctx)),
        IrType::Arr(n, elem) => format!("[{n} x {}]", type_str(elem, ctx)),
        IrType::StructLit(fields) => {
            let parts: Vec<String> = fields.iter().map(|f| type_str(f, ctx)).collect();
            format!("{{ {} }}", parts.join(", "))
        }
        IrType::IdStruct(name) => format!("%{}", ctx.name(*name)),
        IrType::Func { ret, params, varargs } => {
            let mut parts: Vec<String> = params.iter().map(|p| type_str(p, ctx)).collect();
            if *varargs {
                parts.push("...".to_string());
            }
            format!("{} ({})", type_str(ret, ctx), parts.join(", "))
        }
        IrType::Opaque => "opaque".to_string(),
    }
}

fn binop_mnemonic(op: IrBinOp) -> &'static str {
    use IrBinOp::*;
    match op {
        Add => "add",
        Sub => "sub",
        Mul => "mul",
        UDiv => "udiv",
        SDiv => "sdiv",
        URem => "urem",
        SRem => "srem",
        And => "and",
        Or => "or",
        Xor => "xor",
        Shl => "shl",
        LShr => "lshr",
        AShr => "ashr",
        FAdd => "fadd",
        FSub => "fsub",
        FMul => "fmul",
        FDiv => "fdiv",
        FRem => "frem",
    }
}

/// LLVM prints a floating constant in hex whenever the decimal form
/// wouldn't round-trip; always using the hex form is simpler and always
/// legal, at the cost of readability (`spec.md` §6 "Constants").
fn hex_float(f: f64) -> String {
    format!("0x{:016X}", f.to_bits())
}

fn escape_c_string(s: &str) -> String {
    let mut out = String::new();
    for b in s.bytes() {
        match b {
            b'"' => out.push_str("\\22"),
            b'\\' => out.push_str("\\5C"),
            0x20..=0x7e => out.push(b as char),
            _ => {
                let _ = write!(out, "\\{:02X}", b);
            }
        }
    }
    out.push_str("\\00");
    out
}
