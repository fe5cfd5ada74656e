//! LLVM-subset IR: tagged unions mirroring the printed grammar.
//!
//! Grounded almost directly on `examples/original_source/src/ir/ir.h` — its
//! `ir_type_type_t`/`ir_oper_t`/`ir_const_type_t` enums map one-to-one onto
//! the Rust enums below (`spec.md` §3 "IR").

use crate::strtab::Sym;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum IrType {
    Void,
    Int(u32),
    Float,
    Double,
    X86Fp80,
    Ptr(Box<IrType>),
    Arr(u64, Box<IrType>),
    StructLit(Vec<IrType>),
    /// A module-scope `%name = type {...}` reference.
    IdStruct(Sym),
    Func {
        ret: Box<IrType>,
        params: Vec<IrType>,
        varargs: bool,
    },
    Opaque,
}

impl IrType {
    pub fn i1() -> IrType {
        IrType::Int(1)
    }
    pub fn i8() -> IrType {
        IrType::Int(8)
    }
    pub fn i32() -> IrType {
        IrType::Int(32)
    }
    pub fn i64() -> IrType {
        IrType::Int(64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrBinOp {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
    FAdd,
    FSub,
    FMul,
    FDiv,
    FRem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpCond {
    Eq,
    Ne,
    Ugt,
    Uge,
    Ult,
    Ule,
    Sgt,
    Sge,
    Slt,
    Sle,
}

impl IcmpCond {
    pub fn mnemonic(self) -> &'static str {
        use IcmpCond::*;
        match self {
            Eq => "eq",
            Ne => "ne",
            Ugt => "ugt",
            Uge => "uge",
            Ult => "ult",
            Ule => "ule",
            Sgt => "sgt",
            Sge => "sge",
            Slt => "slt",
            Sle => "sle",
        }
    }
}

/// `spec.md` §9 open question: the source's printer conflates `ule` with
/// `ult` in one branch; this front end always prints the mnemonic the
/// variant actually names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FcmpCond {
    Oeq,
    One,
    Ogt,
    Oge,
    Olt,
    Ole,
    Ueq,
    Une,
    Ugt,
    Uge,
    Ult,
    Ule,
}

impl FcmpCond {
    pub fn mnemonic(self) -> &'static str {
        use FcmpCond::*;
        match self {
            Oeq => "oeq",
            One => "one",
            Ogt => "ogt",
            Oge => "oge",
            Olt => "olt",
            Ole => "ole",
            Ueq => "ueq",
            Une => "une",
            Ugt => "ugt",
            Uge => "uge",
            Ult => "ult",
            Ule => "ule",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertKind {
    Trunc,
    Zext,
    Sext,
    FpTrunc,
    FpExt,
    FpToUi,
    FpToSi,
    UiToFp,
    SiToFp,
    PtrToInt,
    IntToPtr,
    Bitcast,
}

impl ConvertKind {
    pub fn mnemonic(self) -> &'static str {
        use ConvertKind::*;
        match self {
            Trunc => "trunc",
            Zext => "zext",
            Sext => "sext",
            FpTrunc => "fptrunc",
            FpExt => "fpext",
            FpToUi => "fptoui",
            FpToSi => "fptosi",
            UiToFp => "uitofp",
            SiToFp => "sitofp",
            PtrToInt => "ptrtoint",
            IntToPtr => "inttoptr",
            Bitcast => "bitcast",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IrConst {
    Int(i64),
    Bool(bool),
    Float(f64),
    /// `null` for a pointer-typed constant.
    Null,
    /// `zeroinitializer`.
    Zero,
    Undef,
    /// A global string constant's address (threaded through `var`).
    Str(Sym),
    Struct(Vec<IrExpr>),
    Array(Vec<IrExpr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum IrExpr {
    Var { name: Sym, local: bool },
    Const(IrConst),
    Binop {
        op: IrBinOp,
        ty: IrType,
        l: Box<IrExpr>,
        r: Box<IrExpr>,
    },
    Alloca {
        elem: IrType,
        nelem: Option<Box<IrExpr>>,
        align: u32,
    },
    Load {
        ty: IrType,
        ptr: Box<IrExpr>,
    },
    GetElementPtr {
        base_ty: IrType,
        base: Box<IrExpr>,
        indices: Vec<IrExpr>,
    },
    Convert {
        kind: ConvertKind,
        src_ty: IrType,
        dst_ty: IrType,
        src: Box<IrExpr>,
    },
    Icmp {
        cond: IcmpCond,
        ty: IrType,
        l: Box<IrExpr>,
        r: Box<IrExpr>,
    },
    Fcmp {
        cond: FcmpCond,
        ty: IrType,
        l: Box<IrExpr>,
        r: Box<IrExpr>,
    },
    /// `[value, %label]` pairs — must appear only immediately after a label
    /// statement (`spec.md` §3 invariants).
    Phi {
        ty: IrType,
        incoming: Vec<(IrExpr, Sym)>,
    },
    Select {
        cond: Box<IrExpr>,
        t: Box<IrExpr>,
        f: Box<IrExpr>,
    },
    Call {
        ret_ty: IrType,
        param_tys: Vec<IrType>,
        varargs: bool,
        func: Box<IrExpr>,
        args: Vec<IrExpr>,
    },
    VaArg {
        ap: Box<IrExpr>,
        ty: IrType,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum IrStmt {
    Label(Sym),
    Ret(Option<(IrType, IrExpr)>),
    Br {
        cond: Option<IrExpr>,
        then_label: Sym,
        else_label: Option<Sym>,
    },
    Switch {
        ty: IrType,
        val: IrExpr,
        default: Sym,
        cases: Vec<(i64, Sym)>,
    },
    IndirectBr {
        addr: IrExpr,
        possible: Vec<Sym>,
    },
    Assign {
        dest: Sym,
        ty: IrType,
        src: IrExpr,
    },
    Store {
        ty: IrType,
        val: IrExpr,
        ptr: IrExpr,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    Default,
    Private,
    Internal,
    Linkonce,
    Weak,
    LinkonceOdr,
    WeakOdr,
    External,
}

impl Linkage {
    pub fn keyword(self) -> &'static str {
        match self {
            Linkage::Default => "",
            Linkage::Private => "private",
            Linkage::Internal => "internal",
            Linkage::Linkonce => "linkonce",
            Linkage::Weak => "weak",
            Linkage::LinkonceOdr => "linkonce_odr",
            Linkage::WeakOdr => "weak_odr",
            Linkage::External => "external",
        }
    }
}

#[derive(Debug, Clone)]
pub struct IrGlobal {
    pub name: Sym,
    pub linkage: Linkage,
    pub unnamed_addr: bool,
    pub is_constant: bool,
    pub ty: IrType,
    pub init: Option<IrExpr>,
    pub align: u32,
}

#[derive(Debug, Clone)]
pub struct IrFunctionSig {
    pub name: Sym,
    pub ret: IrType,
    pub params: Vec<IrType>,
    pub varargs: bool,
    pub linkage: Linkage,
}

/// A function-scope fresh-name allocator: mints `%<n>` temps and labels from
/// one shared counter, per `spec.md` §4.4.2 "Naming".
#[derive(Debug, Default)]
pub struct TempAllocator {
    next: RefCell<u32>,
}

impl TempAllocator {
    pub fn new() -> Self {
        TempAllocator::default()
    }

    pub fn fresh(&self) -> u32 {
        let mut n = self.next.borrow_mut();
        let id = *n;
        *n += 1;
        id
    }
}

#[derive(Debug, Clone)]
pub struct IrFunction {
    pub sig: IrFunctionSig,
    pub param_names: Vec<Sym>,
    /// Allocas emitted for every local, materialised before `body` so every
    /// use is dominated (`spec.md` §4.4.2 "Function prologue").
    pub prefix: Vec<IrStmt>,
    pub body: Vec<IrStmt>,
}

#[derive(Debug, Clone)]
pub enum IrGDecl {
    Global(IrGlobal),
    IdentifiedStruct { name: Sym, fields: Vec<IrType> },
    FunctionDecl(IrFunctionSig),
    FunctionDef(IrFunction),
}

/// One module: identified structs, global data, and functions, plus the
/// module-level string-interning table so identical source strings share
/// one global (`spec.md` §3 invariants).
#[derive(Debug, Default)]
pub struct IrModule {
    pub name: String,
    pub decls: Vec<IrGDecl>,
    pub string_table: Rc<RefCell<std::collections::HashMap<String, Sym>>>,
    pub anon_global_counter: RefCell<u32>,
}

impl IrModule {
    pub fn new(name: String) -> Self {
        IrModule {
            name,
            decls: Vec::new(),
            string_table: Rc::new(RefCell::new(std::collections::HashMap::new())),
            anon_global_counter: RefCell::new(0),
        }
    }

    pub fn fresh_anon_global(&self) -> u32 {
        let mut n = self.anon_global_counter.borrow_mut();
        let id = *n;
        *n += 1;
        id
    }
}
