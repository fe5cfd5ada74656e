//! Token kinds and hidesets.
//!
//! `spec.md` §3: tokens are a tagged variant over the C11 token kinds, with
//! identifier/string payloads as interned handles so equality is handle
//! equality, and a hideset recording which macro names must not be
//! re-expanded at this token's position.

use crate::mark::MarkId;
use crate::strtab::Sym;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Void,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Signed,
    Unsigned,
    Bool,
    Complex,
    Imaginary,
    Struct,
    Union,
    Enum,
    Typedef,
    Extern,
    Static,
    Auto,
    Register,
    ThreadLocal,
    Const,
    Volatile,
    Restrict,
    Inline,
    Noreturn,
    Alignas,
    Alignof,
    Generic,
    StaticAssert,
    If,
    Else,
    Switch,
    Case,
    Default,
    While,
    Do,
    For,
    Goto,
    Continue,
    Break,
    Return,
    Sizeof,
    Func,
    BuiltinVaList,
    BuiltinVaStart,
    BuiltinVaArg,
    BuiltinVaEnd,
    BuiltinVaCopy,
    BuiltinOffsetof,
}

impl Keyword {
    /// Classify an identifier spelling as a keyword, if it is one.
    pub fn from_str(s: &str) -> Option<Keyword> {
        use Keyword::*;
        Some(match s {
            "void" => Void,
            "char" => Char,
            "short" => Short,
            "int" => Int,
            "long" => Long,
            "float" => Float,
            "double" => Double,
            "signed" => Signed,
            "unsigned" => Unsigned,
            "_Bool" => Bool,
            "_Complex" => Complex,
            "_Imaginary" => Imaginary,
            "struct" => Struct,
            "union" => Union,
            "enum" => Enum,
            "typedef" => Typedef,
            "extern" => Extern,
            "static" => Static,
            "auto" => Auto,
            "register" => Register,
            "_Thread_local" => ThreadLocal,
            "const" => Const,
            "volatile" => Volatile,
            "restrict" => Restrict,
            "inline" => Inline,
            "_Noreturn" => Noreturn,
            "_Alignas" => Alignas,
            "_Alignof" | "__alignof__" => Alignof,
            "_Generic" => Generic,
            "_Static_assert" => StaticAssert,
            "if" => If,
            "else" => Else,
            "switch" => Switch,
            "case" => Case,
            "default" => Default,
            "while" => While,
            "do" => Do,
            "for" => For,
            "goto" => Goto,
            "continue" => Continue,
            "break" => Break,
            "return" => Return,
            "sizeof" => Sizeof,
            "__func__" => Func,
            "__builtin_va_list" => BuiltinVaList,
            "__builtin_va_start" => BuiltinVaStart,
            "__builtin_va_arg" => BuiltinVaArg,
            "__builtin_va_end" => BuiltinVaEnd,
            "__builtin_va_copy" => BuiltinVaCopy,
            "__builtin_offsetof" => BuiltinOffsetof,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punct {
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semi,
    Comma,
    Colon,
    Question,
    Dot,
    Arrow,
    Ellipsis,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Not,
    Assign,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    NotEq,
    AmpAmp,
    PipePipe,
    Shl,
    Shr,
    PlusPlus,
    MinusMinus,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    AmpAssign,
    PipeAssign,
    CaretAssign,
    ShlAssign,
    ShrAssign,
}

impl Punct {
    pub fn spelling(self) -> &'static str {
        use Punct::*;
        match self {
            LParen => "(",
            RParen => ")",
            LBrace => "{",
            RBrace => "}",
            LBracket => "[",
            RBracket => "]",
            Semi => ";",
            Comma => ",",
            Colon => ":",
            Question => "?",
            Dot => ".",
            Arrow => "->",
            Ellipsis => "...",
            Plus => "+",
            Minus => "-",
            Star => "*",
            Slash => "/",
            Percent => "%",
            Amp => "&",
            Pipe => "|",
            Caret => "^",
            Tilde => "~",
            Not => "!",
            Assign => "=",
            Lt => "<",
            Gt => ">",
            Le => "<=",
            Ge => ">=",
            EqEq => "==",
            NotEq => "!=",
            AmpAmp => "&&",
            PipePipe => "||",
            Shl => "<<",
            Shr => ">>",
            PlusPlus => "++",
            MinusMinus => "--",
            PlusAssign => "+=",
            MinusAssign => "-=",
            StarAssign => "*=",
            SlashAssign => "/=",
            PercentAssign => "%=",
            AmpAssign => "&=",
            PipeAssign => "|=",
            CaretAssign => "^=",
            ShlAssign => "<<=",
            ShrAssign => ">>=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntSuffix {
    pub unsigned: bool,
    /// 0 = no `l`, 1 = `l`, 2 = `ll`.
    pub long_count: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FloatSuffix {
    pub is_float: bool,
    pub is_long_double: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Keyword(Keyword),
    Ident(Sym),
    IntLit { value: u64, suffix: IntSuffix },
    FloatLit { value: f64, suffix: FloatSuffix },
    StringLit(Sym),
    CharLit(i64),
    Punct(Punct),
    /// `#`, only meaningful at logical-line start or inside a macro body.
    Hash,
    HashHash,
    Whitespace,
    Newline,
    Eof,
    /// Internal sentinel carrying a diagnostic message in the token's
    /// `text` field (`spec.md` §3).
    Warn,
    Err,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    /// Verbatim spelling, needed for stringizing and token-pasting.
    pub text: Sym,
    pub mark: MarkId,
    pub hideset: HideSet,
}

impl Token {
    pub fn is_ident(&self) -> bool {
        matches!(self.kind, TokenKind::Ident(_))
    }

    pub fn is_whitespace_like(&self) -> bool {
        matches!(self.kind, TokenKind::Whitespace | TokenKind::Newline)
    }
}

/// Immutable, value-semantic set of macro names currently "in expansion"
/// along the path that produced a token. Empty sets are shared (`None`
/// payload); `add`/`union`/`intersect`/`copy` all produce new sets rather
/// than mutating their inputs, except the explicit `union_inplace`
/// variant used once at the tail of `substitute` (`spec.md` §3, §9).
#[derive(Debug, Clone, Default)]
pub struct HideSet(Option<Rc<Vec<Sym>>>);

impl HideSet {
    pub fn empty() -> Self {
        HideSet(None)
    }

    fn as_slice(&self) -> &[Sym] {
        match &self.0 {
            Some(v) => v,
            None => &[],
        }
    }

    pub fn contains(&self, name: Sym) -> bool {
        self.as_slice().contains(&name)
    }

    pub fn add(&self, name: Sym) -> HideSet {
        if self.contains(name) {
            return self.clone();
        }
        let mut v = self.as_slice().to_vec();
        v.push(name);
        HideSet(Some(Rc::new(v)))
    }

    pub fn union(&self, other: &HideSet) -> HideSet {
        let mut v = self.as_slice().to_vec();
        for &s in other.as_slice() {
            if !v.contains(&s) {
                v.push(s);
            }
        }
        if v.is_empty() {
            HideSet::empty()
        } else {
            HideSet(Some(Rc::new(v)))
        }
    }

    pub fn intersect(&self, other: &HideSet) -> HideSet {
        let v: Vec<Sym> = self
            .as_slice()
            .iter()
            .copied()
            .filter(|s| other.contains(*s))
            .collect();
        if v.is_empty() {
            HideSet::empty()
        } else {
            HideSet(Some(Rc::new(v)))
        }
    }

    /// Mutates `self` to be the union of `self` and `other`. The only
    /// in-place hideset operation, used once at the tail of `substitute`
    /// to stamp the invoking hideset onto every emitted token.
    pub fn union_inplace(&mut self, other: &HideSet) {
        *self = self.union(other);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(n: u32) -> Sym {
        // Sym has no public constructor; build one through StrTab in real
        // code. For unit tests of HideSet alone we fabricate via transmute
        // avoidance: intern through a scratch table instead.
        let mut tab = crate::strtab::StrTab::new();
        for i in 0..=n {
            tab.intern(&format!("s{i}"));
        }
        tab.intern(&format!("s{n}"))
    }

    #[test]
    fn empty_hideset_contains_nothing() {
        let h = HideSet::empty();
        assert!(!h.contains(sym(0)));
    }

    #[test]
    fn add_is_not_mutating() {
        let h0 = HideSet::empty();
        let h1 = h0.add(sym(1));
        assert!(!h0.contains(sym(1)));
        assert!(h1.contains(sym(1)));
    }

    #[test]
    fn union_combines_both_sets() {
        let a = HideSet::empty().add(sym(1));
        let b = HideSet::empty().add(sym(2));
        let u = a.union(&b);
        assert!(u.contains(sym(1)));
        assert!(u.contains(sym(2)));
    }

    #[test]
    fn intersect_keeps_only_common_members() {
        let a = HideSet::empty().add(sym(1)).add(sym(2));
        let b = HideSet::empty().add(sym(2)).add(sym(3));
        let i = a.intersect(&b);
        assert!(!i.contains(sym(1)));
        assert!(i.contains(sym(2)));
        assert!(!i.contains(sym(3)));
    }

    #[test]
    fn union_inplace_mutates_only_receiver() {
        let mut a = HideSet::empty().add(sym(1));
        let b = HideSet::empty().add(sym(2));
        a.union_inplace(&b);
        assert!(a.contains(sym(1)));
        assert!(a.contains(sym(2)));
        assert!(!b.contains(sym(1)));
    }

    #[test]
    fn keyword_lookup() {
        assert_eq!(Keyword::from_str("while"), Some(Keyword::While));
        assert_eq!(Keyword::from_str("not_a_keyword"), None);
    }
}
