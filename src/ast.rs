//! Abstract syntax tree.
//!
//! `spec.md` §3: closed tagged unions for `type`/`expr`/`stmt`/`gdecl`, plus
//! a `TranslationUnit` aggregate. Struct/union/enum types are nominal, so
//! they are represented as `Rc<StructDef>`/`Rc<EnumDef>` handles compared by
//! pointer identity rather than by structural recursion.
//!
//! Grounded on `examples/original_source/src/parser/ast.c` for the node
//! catalogue; teacher's `crates/compiler/src/ast.rs` for the Rust shape
//! (doc-commented public enums, an owning aggregate at the top, `Option`
//! source-location fields — here a `MarkId` rather than a dedicated
//! `SourceLocation`, since `mark.rs` already gives every node that).

use crate::mark::MarkId;
use crate::strtab::Sym;
use crate::token::{IntSuffix, Punct};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Bit flags that decorate a base type at a single declarator level.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeMods {
    pub is_signed: bool,
    pub is_unsigned: bool,
    pub is_const: bool,
    pub is_volatile: bool,
    pub is_restrict: bool,
    pub is_auto: bool,
    pub is_register: bool,
    pub is_static: bool,
    pub is_extern: bool,
    pub is_typedef: bool,
    pub is_inline: bool,
    pub is_noreturn: bool,
    pub alignas: Option<u32>,
}

/// One struct/union member as parsed (offset/size are filled in by
/// `types::layout_struct` once the definition is complete).
#[derive(Debug, Clone)]
pub struct Field {
    pub name: Option<Sym>,
    pub ty: CType,
    /// Constant bit-field width, if declared `name : width`.
    pub bitfield: Option<u32>,
    pub offset: Cell<u32>,
}

/// A struct or union definition, shared by `Rc` so two references to the
/// same tag compare equal by pointer (`spec.md` §4.4.1 "nominal").
#[derive(Debug)]
pub struct StructDef {
    pub tag: Option<Sym>,
    pub is_union: bool,
    pub fields: RefCell<Vec<Field>>,
    pub size: Cell<u32>,
    pub align: Cell<u32>,
    pub complete: Cell<bool>,
}

impl StructDef {
    pub fn incomplete(tag: Option<Sym>, is_union: bool) -> Rc<StructDef> {
        Rc::new(StructDef {
            tag,
            is_union,
            fields: RefCell::new(Vec::new()),
            size: Cell::new(0),
            align: Cell::new(1),
            complete: Cell::new(false),
        })
    }
}

#[derive(Debug)]
pub struct EnumDef {
    pub tag: Option<Sym>,
    pub underlying: CType,
    pub constants: RefCell<Vec<(Sym, i64)>>,
}

/// `spec.md` §3 "type": a tagged union of C11 type forms. Modifiers
/// left-associate at the front (a `Modifier` wraps the type it decorates),
/// so there is no cycle through the chain.
#[derive(Debug, Clone)]
pub enum CType {
    Void,
    Bool,
    Char,
    Short,
    Int,
    Long,
    LongLong,
    Float,
    Double,
    LongDouble,
    VaList,
    Struct(Rc<StructDef>),
    Enum(Rc<EnumDef>),
    /// A `typedef` name as written; resolved against `typetab` to the type
    /// it denotes. Kept distinct from its target so diagnostics can name the
    /// typedef, while `types::strip` sees through it for equality checks.
    TypedefRef(Sym, Box<CType>),
    Modifier {
        mods: TypeMods,
        base: Box<CType>,
    },
    Paren(Box<CType>),
    Func {
        ret: Box<CType>,
        params: Vec<CType>,
        variadic: bool,
    },
    Array {
        base: Box<CType>,
        len_expr: Option<Box<Expr>>,
        resolved_nelems: Option<u64>,
    },
    Ptr {
        base: Box<CType>,
        mods: TypeMods,
    },
    StaticAssert {
        cond: Box<Expr>,
        msg: Option<Sym>,
    },
}

impl CType {
    pub fn ptr_to(base: CType) -> CType {
        CType::Ptr {
            base: Box::new(base),
            mods: TypeMods::default(),
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, CType::Void)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    BAnd,
    BXor,
    BOr,
    LAnd,
    LOr,
}

impl BinOp {
    pub fn from_punct(p: Punct) -> Option<BinOp> {
        use BinOp::*;
        Some(match p {
            Punct::Plus => Add,
            Punct::Minus => Sub,
            Punct::Star => Mul,
            Punct::Slash => Div,
            Punct::Percent => Mod,
            Punct::Shl => Shl,
            Punct::Shr => Shr,
            Punct::Lt => Lt,
            Punct::Gt => Gt,
            Punct::Le => Le,
            Punct::Ge => Ge,
            Punct::EqEq => Eq,
            Punct::NotEq => Ne,
            Punct::Amp => BAnd,
            Punct::Caret => BXor,
            Punct::Pipe => BOr,
            Punct::AmpAmp => LAnd,
            Punct::PipePipe => LOr,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Plus,
    Neg,
    BNot,
    LNot,
    AddrOf,
    Deref,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    And,
    Xor,
    Or,
}

impl AssignOp {
    pub fn from_punct(p: Punct) -> Option<AssignOp> {
        use AssignOp::*;
        Some(match p {
            Punct::Assign => Assign,
            Punct::PlusAssign => Add,
            Punct::MinusAssign => Sub,
            Punct::StarAssign => Mul,
            Punct::SlashAssign => Div,
            Punct::PercentAssign => Mod,
            Punct::ShlAssign => Shl,
            Punct::ShrAssign => Shr,
            Punct::AmpAssign => And,
            Punct::CaretAssign => Xor,
            Punct::PipeAssign => Or,
            _ => return None,
        })
    }

    /// The underlying binary op for a compound assignment (`+=` etc.), or
    /// `None` for plain `=`.
    pub fn as_binop(self) -> Option<BinOp> {
        use AssignOp::*;
        Some(match self {
            Assign => return None,
            Add => BinOp::Add,
            Sub => BinOp::Sub,
            Mul => BinOp::Mul,
            Div => BinOp::Div,
            Mod => BinOp::Mod,
            Shl => BinOp::Shl,
            Shr => BinOp::Shr,
            And => BinOp::BAnd,
            Xor => BinOp::BXor,
            Or => BinOp::BOr,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberOp {
    Dot,
    Arrow,
}

/// One step of an initializer/`offsetof` designator list.
#[derive(Debug, Clone)]
pub enum Designator {
    Field(Sym),
    Index(Box<Expr>),
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Void,
    Paren(Box<Expr>),
    Var(Sym),
    Assign {
        op: AssignOp,
        dest: Box<Expr>,
        rhs: Box<Expr>,
    },
    IntConst {
        value: i64,
        suffix: IntSuffix,
    },
    FloatConst {
        value: f64,
        is_float: bool,
        is_long_double: bool,
    },
    StrConst(Sym),
    Bin {
        op: BinOp,
        l: Box<Expr>,
        r: Box<Expr>,
    },
    Unary {
        op: UnOp,
        e: Box<Expr>,
    },
    Cond {
        c: Box<Expr>,
        t: Box<Expr>,
        f: Box<Expr>,
    },
    Cast {
        ty: CType,
        e: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    /// The comma operator: a left-to-right sequence whose value is its last
    /// element.
    CompoundSeq(Vec<Expr>),
    SizeofExpr(Box<Expr>),
    SizeofType(CType),
    AlignofExpr(Box<Expr>),
    AlignofType(CType),
    Offsetof {
        ty: CType,
        designators: Vec<Designator>,
    },
    Member {
        base: Box<Expr>,
        op: MemberOp,
        name: Sym,
    },
    Index {
        arr: Box<Expr>,
        idx: Box<Expr>,
    },
    InitList(Vec<Expr>),
    DesignatedInit {
        designators: Vec<Designator>,
        val: Box<Expr>,
    },
    /// `(T){ ... }`.
    CompoundLiteral {
        ty: CType,
        init: Box<Expr>,
    },
    VaStart {
        ap: Box<Expr>,
        last: Sym,
    },
    VaArg {
        ap: Box<Expr>,
        ty: CType,
    },
    VaEnd {
        ap: Box<Expr>,
    },
    VaCopy {
        dst: Box<Expr>,
        src: Box<Expr>,
    },
    /// `_Generic(controlling, T1: e1, ..., default: ek)`. `None` in an
    /// association's type slot marks the `default` arm.
    Generic {
        controlling: Box<Expr>,
        assocs: Vec<(Option<CType>, Expr)>,
    },
}

/// Every expr carries a nullable `etype`, filled in by the checker
/// (`spec.md` §3). `RefCell` lets annotation happen through a shared `&Expr`
/// during the tree-walking pass rather than needing `&mut` at every level.
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub mark: Option<MarkId>,
    pub etype: RefCell<Option<CType>>,
    /// Whether this expression denotes an lvalue; set alongside `etype`.
    pub is_lvalue: Cell<bool>,
}

impl Expr {
    pub fn new(kind: ExprKind, mark: Option<MarkId>) -> Expr {
        Expr {
            kind,
            mark,
            etype: RefCell::new(None),
            is_lvalue: Cell::new(false),
        }
    }

    pub fn ty(&self) -> CType {
        self.etype
            .borrow()
            .clone()
            .expect("expr used before type-checking")
    }
}

#[derive(Debug, Clone)]
pub struct Declarator {
    pub name: Option<Sym>,
    pub ty: CType,
    pub init: Option<Expr>,
    pub mark: Option<MarkId>,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Nop,
    Decl(Vec<Declarator>),
    Label {
        name: Sym,
        body: Box<Stmt>,
    },
    Case {
        val: Box<Expr>,
        body: Box<Stmt>,
    },
    Default(Box<Stmt>),
    If {
        cond: Box<Expr>,
        then_s: Box<Stmt>,
        else_s: Option<Box<Stmt>>,
    },
    Switch {
        cond: Box<Expr>,
        body: Box<Stmt>,
    },
    Do {
        body: Box<Stmt>,
        cond: Box<Expr>,
    },
    While {
        cond: Box<Expr>,
        body: Box<Stmt>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
        body: Box<Stmt>,
    },
    Goto(Sym),
    Continue,
    Break,
    Return(Option<Box<Expr>>),
    /// A brace-delimited block; the checker/parser enter a fresh `typetab`
    /// scope on entry and pop it in LIFO order on exit (`spec.md` §5).
    Compound(Vec<Stmt>),
    Expr(Box<Expr>),
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub mark: Option<MarkId>,
}

impl Stmt {
    pub fn new(kind: StmtKind, mark: Option<MarkId>) -> Stmt {
        Stmt { kind, mark }
    }
}

#[derive(Debug, Clone)]
pub struct GotoRef {
    pub name: Sym,
    pub mark: Option<MarkId>,
}

#[derive(Debug, Clone)]
pub enum GDecl {
    Function {
        name: Sym,
        ty: CType,
        /// Parameter names in declaration order, parallel to the `CType::Func`
        /// type's `params`; `None` for an unnamed parameter.
        param_names: Vec<Option<Sym>>,
        body: Option<Stmt>,
        /// Filled in by the checker's goto-resolution pass.
        labels: RefCell<Vec<Sym>>,
        unresolved_gotos: RefCell<Vec<GotoRef>>,
        mark: Option<MarkId>,
    },
    Global {
        ty: CType,
        declarators: Vec<Declarator>,
        mark: Option<MarkId>,
    },
}

/// One source file together with everything it `#include`d, plus the
/// per-translation-unit owning store of derived types the checker and
/// parser allocate along the way (`spec.md` §3 "Ownership & lifecycle").
#[derive(Debug, Default)]
pub struct TranslationUnit {
    pub decls: Vec<GDecl>,
    pub derived_structs: RefCell<Vec<Rc<StructDef>>>,
    pub derived_enums: RefCell<Vec<Rc<EnumDef>>>,
}

impl TranslationUnit {
    pub fn new() -> Self {
        TranslationUnit::default()
    }

    pub fn adopt_struct(&self, def: Rc<StructDef>) -> Rc<StructDef> {
        self.derived_structs.borrow_mut().push(def.clone());
        def
    }

    pub fn adopt_enum(&self, def: Rc<EnumDef>) -> Rc<EnumDef> {
        self.derived_enums.borrow_mut().push(def.clone());
        def
    }
}
