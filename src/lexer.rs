//! Lexer: character stream → token stream (`spec.md` §4.2).
//!
//! Used both on raw source files and on short in-memory buffers produced by
//! macro replacement / token-pasting, so the entry point takes a plain
//! `&str` rather than anything file-specific.

use crate::mark::{MarkId, MarkStore};
use crate::strtab::StrTab;
use crate::token::{FloatSuffix, IntSuffix, Keyword, Punct, Token, TokenKind};
use std::path::PathBuf;
use std::rc::Rc;

/// Splice backslash-newline (translation phase 2) and normalize trigraphs
/// and digraphs (translation phase 1) before tokenizing.
pub fn normalize(src: &str) -> String {
    // Trigraphs.
    let trigraphs: &[(&str, &str)] = &[
        ("??=", "#"),
        ("??/", "\\"),
        ("??'", "^"),
        ("??(", "["),
        ("??)", "]"),
        ("??!", "|"),
        ("??<", "{"),
        ("??>", "}"),
        ("??-", "~"),
    ];
    let mut s = src.to_string();
    for (tri, repl) in trigraphs {
        s = s.replace(tri, repl);
    }

    // Backslash-newline splice (handles trailing whitespace before the
    // newline being tolerated as GNU does, but the strict form requires the
    // backslash to be immediately followed by `\n`).
    let mut spliced = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&'\n') {
            chars.next();
            continue;
        }
        if c == '\\' && chars.peek() == Some(&'\r') {
            chars.next();
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
            continue;
        }
        spliced.push(c);
    }
    spliced
}

/// Digraph spellings for bracket/brace punctuators (`%:` and `%:%:` are
/// handled separately by the caller since they map to `#`/`##`, not a
/// `Punct`).
fn digraph_to_punct(s: &str) -> Option<(Punct, usize)> {
    if s.starts_with("<:") && !s.starts_with("<::") {
        Some((Punct::LBracket, 2))
    } else if s.starts_with(":>") {
        Some((Punct::RBracket, 2))
    } else if s.starts_with("<%") {
        Some((Punct::LBrace, 2))
    } else if s.starts_with("%>") {
        Some((Punct::RBrace, 2))
    } else {
        None
    }
}

pub struct Lexer<'a> {
    src: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
    file: Rc<PathBuf>,
    marks: &'a mut MarkStore,
    strtab: &'a mut StrTab,
}

impl<'a> Lexer<'a> {
    pub fn new(
        src: &str,
        file: Rc<PathBuf>,
        marks: &'a mut MarkStore,
        strtab: &'a mut StrTab,
    ) -> Self {
        let normalized = normalize(src);
        Lexer {
            src: normalized.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            file,
            marks,
            strtab,
        }
    }

    fn peek(&self) -> Option<char> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.src.get(self.pos + offset).copied()
    }

    fn rest(&self) -> String {
        self.src[self.pos..].iter().collect()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn mark_here(&mut self) -> MarkId {
        self.marks.root(self.file.clone(), self.line, self.col)
    }

    fn make(&mut self, kind: TokenKind, text: &str, mark: MarkId) -> Token {
        let sym = self.strtab.intern(text);
        Token {
            kind,
            text: sym,
            mark,
            hideset: Default::default(),
        }
    }

    pub fn lex_all(mut self) -> Vec<Token> {
        let mut out = Vec::new();
        loop {
            let tok = self.next_token();
            let is_eof = matches!(tok.kind, TokenKind::Eof);
            out.push(tok);
            if is_eof {
                break;
            }
        }
        out
    }

    fn next_token(&mut self) -> Token {
        // Skip/emit comments as a single whitespace token (C11 phase 3).
        if self.peek() == Some('/') && self.peek_at(1) == Some('/') {
            let mark = self.mark_here();
            while let Some(c) = self.peek() {
                if c == '\n' {
                    break;
                }
                self.bump();
            }
            return self.make(TokenKind::Whitespace, " ", mark);
        }
        if self.peek() == Some('/') && self.peek_at(1) == Some('*') {
            let mark = self.mark_here();
            self.bump();
            self.bump();
            let mut closed = false;
            while let Some(c) = self.bump() {
                if c == '*' && self.peek() == Some('/') {
                    self.bump();
                    closed = true;
                    break;
                }
            }
            if !closed {
                return self.make(TokenKind::Err, "unterminated comment", mark);
            }
            return self.make(TokenKind::Whitespace, " ", mark);
        }

        let mark = self.mark_here();
        let c = match self.peek() {
            None => return self.make(TokenKind::Eof, "", mark),
            Some(c) => c,
        };

        if c == '\n' {
            self.bump();
            return self.make(TokenKind::Newline, "\n", mark);
        }
        if c.is_whitespace() {
            let mut s = String::new();
            while let Some(c) = self.peek() {
                if c == '\n' || !c.is_whitespace() {
                    break;
                }
                s.push(c);
                self.bump();
            }
            return self.make(TokenKind::Whitespace, &s, mark);
        }

        if c == '_' || c.is_alphabetic() {
            return self.lex_ident_or_keyword(mark);
        }

        if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()))
        {
            return self.lex_number(mark);
        }

        if c == '"' {
            return self.lex_string(mark);
        }
        if c == '\'' {
            return self.lex_char(mark);
        }

        self.lex_punct(mark)
    }

    fn lex_ident_or_keyword(&mut self, mark: MarkId) -> Token {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if c == '_' || c.is_alphanumeric() {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if let Some(kw) = Keyword::from_str(&s) {
            return self.make(TokenKind::Keyword(kw), &s, mark);
        }
        let sym = self.strtab.intern(&s);
        self.make(TokenKind::Ident(sym), &s, mark)
    }

    fn lex_number(&mut self, mark: MarkId) -> Token {
        let mut s = String::new();
        let is_hex = self.peek() == Some('0')
            && matches!(self.peek_at(1), Some('x') | Some('X'));
        if is_hex {
            s.push(self.bump().unwrap());
            s.push(self.bump().unwrap());
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_hexdigit() && is_hex {
                s.push(c);
                self.bump();
            } else if c.is_ascii_digit() {
                s.push(c);
                self.bump();
            } else if c == '.' {
                is_float = true;
                s.push(c);
                self.bump();
            } else if (c == 'e' || c == 'E') && !is_hex {
                is_float = true;
                s.push(c);
                self.bump();
                if matches!(self.peek(), Some('+') | Some('-')) {
                    s.push(self.bump().unwrap());
                }
            } else if (c == 'p' || c == 'P') && is_hex {
                is_float = true;
                s.push(c);
                self.bump();
                if matches!(self.peek(), Some('+') | Some('-')) {
                    s.push(self.bump().unwrap());
                }
            } else {
                break;
            }
        }
        let mut suffix = String::new();
        while let Some(c) = self.peek() {
            if matches!(c, 'u' | 'U' | 'l' | 'L' | 'f' | 'F') {
                suffix.push(c);
                self.bump();
            } else {
                break;
            }
        }
        let full = format!("{s}{suffix}");
        if is_float || suffix.to_lowercase().contains('f') {
            let value: f64 = if is_hex {
                parse_hex_float(&s)
            } else {
                s.parse().unwrap_or(0.0)
            };
            let fs = FloatSuffix {
                is_float: suffix.contains('f') || suffix.contains('F'),
                is_long_double: suffix.contains('l') || suffix.contains('L'),
            };
            self.make(TokenKind::FloatLit { value, suffix: fs }, &full, mark)
        } else {
            let value = if is_hex {
                u64::from_str_radix(&s[2..], 16).unwrap_or(0)
            } else if s.starts_with('0') && s.len() > 1 {
                u64::from_str_radix(&s[1..], 8).unwrap_or(0)
            } else {
                s.parse().unwrap_or(0)
            };
            let lower = suffix.to_lowercase();
            let is_unsigned = lower.contains('u');
            let long_count = if lower.matches('l').count() >= 2 {
                2
            } else if lower.contains('l') {
                1
            } else {
                0
            };
            let is = IntSuffix {
                unsigned: is_unsigned,
                long_count,
            };
            self.make(TokenKind::IntLit { value, suffix: is }, &full, mark)
        }
    }

    fn lex_escape(&mut self, out: &mut String) {
        // Assumes the leading backslash has already been consumed.
        match self.peek() {
            Some('n') => {
                out.push('\n');
                self.bump();
            }
            Some('t') => {
                out.push('\t');
                self.bump();
            }
            Some('r') => {
                out.push('\r');
                self.bump();
            }
            Some('0') => {
                out.push('\0');
                self.bump();
            }
            Some('\\') => {
                out.push('\\');
                self.bump();
            }
            Some('\'') => {
                out.push('\'');
                self.bump();
            }
            Some('"') => {
                out.push('"');
                self.bump();
            }
            Some('a') => {
                out.push('\u{7}');
                self.bump();
            }
            Some('b') => {
                out.push('\u{8}');
                self.bump();
            }
            Some('f') => {
                out.push('\u{c}');
                self.bump();
            }
            Some('v') => {
                out.push('\u{b}');
                self.bump();
            }
            Some('x') => {
                self.bump();
                let mut hex = String::new();
                while let Some(c) = self.peek() {
                    if c.is_ascii_hexdigit() {
                        hex.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                let v = u32::from_str_radix(&hex, 16).unwrap_or(0);
                out.push(char::from_u32(v & 0xFF).unwrap_or('\0'));
            }
            Some(c) => {
                out.push(c);
                self.bump();
            }
            None => {}
        }
    }

    fn lex_string(&mut self, mark: MarkId) -> Token {
        self.bump(); // opening quote
        let mut raw = String::from("\"");
        let mut value = String::new();
        let mut closed = false;
        while let Some(c) = self.peek() {
            if c == '"' {
                self.bump();
                raw.push('"');
                closed = true;
                break;
            }
            if c == '\n' {
                break;
            }
            if c == '\\' {
                raw.push('\\');
                self.bump();
                let before = value.len();
                self.lex_escape(&mut value);
                raw.push_str(&value[before..]);
                continue;
            }
            value.push(c);
            raw.push(c);
            self.bump();
        }
        if !closed {
            return self.make(TokenKind::Err, "unterminated string literal", mark);
        }
        let sym = self.strtab.intern(&value);
        self.make(TokenKind::StringLit(sym), &raw, mark)
    }

    fn lex_char(&mut self, mark: MarkId) -> Token {
        self.bump(); // opening quote
        let mut raw = String::from("'");
        let mut value = String::new();
        let mut closed = false;
        while let Some(c) = self.peek() {
            if c == '\'' {
                self.bump();
                raw.push('\'');
                closed = true;
                break;
            }
            if c == '\n' {
                break;
            }
            if c == '\\' {
                raw.push('\\');
                self.bump();
                let before = value.len();
                self.lex_escape(&mut value);
                raw.push_str(&value[before..]);
                continue;
            }
            value.push(c);
            raw.push(c);
            self.bump();
        }
        if !closed {
            return self.make(TokenKind::Err, "unterminated char literal", mark);
        }
        let code = value.chars().next().map(|c| c as i64).unwrap_or(0);
        self.make(TokenKind::CharLit(code), &raw, mark)
    }

    fn lex_punct(&mut self, mark: MarkId) -> Token {
        let rest = self.rest();

        // Digraphs for brackets/braces (translated immediately to their
        // canonical spelling so downstream code never sees them).
        if let Some((p, len)) = digraph_to_punct(&rest) {
            for _ in 0..len {
                self.bump();
            }
            return self.make(TokenKind::Punct(p), p.spelling(), mark);
        }
        if rest.starts_with("%:%:") {
            self.bump();
            self.bump();
            self.bump();
            self.bump();
            return self.make(TokenKind::HashHash, "##", mark);
        }
        if rest.starts_with("%:") {
            self.bump();
            self.bump();
            return self.make(TokenKind::Hash, "#", mark);
        }

        // Longest-match punctuators, 3/2/1 chars.
        const THREE: &[(&str, Punct)] = &[
            ("...", Punct::Ellipsis),
            ("<<=", Punct::ShlAssign),
            (">>=", Punct::ShrAssign),
        ];
        const TWO: &[(&str, Punct)] = &[
            ("->", Punct::Arrow),
            ("++", Punct::PlusPlus),
            ("--", Punct::MinusMinus),
            ("<<", Punct::Shl),
            (">>", Punct::Shr),
            ("<=", Punct::Le),
            (">=", Punct::Ge),
            ("==", Punct::EqEq),
            ("!=", Punct::NotEq),
            ("&&", Punct::AmpAmp),
            ("||", Punct::PipePipe),
            ("+=", Punct::PlusAssign),
            ("-=", Punct::MinusAssign),
            ("*=", Punct::StarAssign),
            ("/=", Punct::SlashAssign),
            ("%=", Punct::PercentAssign),
            ("&=", Punct::AmpAssign),
            ("|=", Punct::PipeAssign),
            ("^=", Punct::CaretAssign),
        ];
        if rest.starts_with("##") {
            self.bump();
            self.bump();
            return self.make(TokenKind::HashHash, "##", mark);
        }
        for (spelling, p) in THREE {
            if rest.starts_with(spelling) {
                for _ in 0..3 {
                    self.bump();
                }
                return self.make(TokenKind::Punct(*p), spelling, mark);
            }
        }
        for (spelling, p) in TWO {
            if rest.starts_with(spelling) {
                for _ in 0..2 {
                    self.bump();
                }
                return self.make(TokenKind::Punct(*p), spelling, mark);
            }
        }
        let c = self.bump().unwrap();
        if c == '#' {
            return self.make(TokenKind::Hash, "#", mark);
        }
        let p = match c {
            '(' => Punct::LParen,
            ')' => Punct::RParen,
            '{' => Punct::LBrace,
            '}' => Punct::RBrace,
            '[' => Punct::LBracket,
            ']' => Punct::RBracket,
            ';' => Punct::Semi,
            ',' => Punct::Comma,
            ':' => Punct::Colon,
            '?' => Punct::Question,
            '.' => Punct::Dot,
            '+' => Punct::Plus,
            '-' => Punct::Minus,
            '*' => Punct::Star,
            '/' => Punct::Slash,
            '%' => Punct::Percent,
            '&' => Punct::Amp,
            '|' => Punct::Pipe,
            '^' => Punct::Caret,
            '~' => Punct::Tilde,
            '!' => Punct::Not,
            '=' => Punct::Assign,
            '<' => Punct::Lt,
            '>' => Punct::Gt,
            other => {
                let s = other.to_string();
                return self.make(TokenKind::Err, &s, mark);
            }
        };
        let spelling = p.spelling().to_string();
        self.make(TokenKind::Punct(p), &spelling, mark)
    }
}

fn parse_hex_float(s: &str) -> f64 {
    // s like "0x1.8p3"; fall back to 0.0 on malformed input rather than
    // panicking — lexer errors for genuinely malformed floats are reported
    // by the caller via the `Err` sentinel path, this is a best-effort
    // decode for well-formed input only.
    let body = &s[2..];
    let (mantissa, exp) = match body.split_once(['p', 'P']) {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (body, 0),
    };
    let (int_part, frac_part) = match mantissa.split_once('.') {
        Some((i, f)) => (i, f),
        None => (mantissa, ""),
    };
    let mut value = i64::from_str_radix(int_part, 16).unwrap_or(0) as f64;
    let mut scale = 1.0 / 16.0;
    for c in frac_part.chars() {
        if let Some(d) = c.to_digit(16) {
            value += d as f64 * scale;
            scale /= 16.0;
        }
    }
    value * 2f64.powi(exp)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<Token> {
        let mut marks = MarkStore::new();
        let mut strtab = StrTab::new();
        let file = Rc::new(PathBuf::from("test.c"));
        Lexer::new(src, file, &mut marks, &mut strtab).lex_all()
    }

    fn non_trivial(src: &str) -> Vec<Token> {
        lex(src)
            .into_iter()
            .filter(|t| !t.is_whitespace_like() && !matches!(t.kind, TokenKind::Eof))
            .collect()
    }

    #[test]
    fn lexes_keyword_and_ident() {
        let toks = non_trivial("int x;");
        assert!(matches!(toks[0].kind, TokenKind::Keyword(Keyword::Int)));
        assert!(matches!(toks[1].kind, TokenKind::Ident(_)));
        assert!(matches!(toks[2].kind, TokenKind::Punct(Punct::Semi)));
    }

    #[test]
    fn lexes_suffixed_int_literal() {
        let toks = non_trivial("123ULL");
        match &toks[0].kind {
            TokenKind::IntLit { value, suffix } => {
                assert_eq!(*value, 123);
                assert!(suffix.unsigned);
                assert_eq!(suffix.long_count, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn lexes_hex_literal() {
        let toks = non_trivial("0x1A");
        match &toks[0].kind {
            TokenKind::IntLit { value, .. } => assert_eq!(*value, 26),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn lexes_octal_literal() {
        let toks = non_trivial("010");
        match &toks[0].kind {
            TokenKind::IntLit { value, .. } => assert_eq!(*value, 8),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn lexes_float_literal() {
        let toks = non_trivial("3.5f");
        match &toks[0].kind {
            TokenKind::FloatLit { value, suffix } => {
                assert!((value - 3.5).abs() < 1e-9);
                assert!(suffix.is_float);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn lexes_string_with_escape() {
        let toks = non_trivial(r#""a\nb""#);
        match &toks[0].kind {
            TokenKind::StringLit(_) => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unterminated_string_is_err_token() {
        let toks = non_trivial("\"abc");
        assert!(matches!(toks[0].kind, TokenKind::Err));
    }

    #[test]
    fn digraphs_normalize_to_brackets_and_hash() {
        let toks = non_trivial("int a<:3:>;");
        assert!(
            toks.iter()
                .any(|t| matches!(t.kind, TokenKind::Punct(Punct::LBracket)))
        );
    }

    #[test]
    fn trigraph_hash_normalizes() {
        let toks = non_trivial("??=define X 1");
        assert!(matches!(toks[0].kind, TokenKind::Hash));
    }

    #[test]
    fn line_continuation_splices() {
        let toks = non_trivial("int \\\nx;");
        assert!(matches!(toks[0].kind, TokenKind::Keyword(Keyword::Int)));
        assert!(toks[1].is_ident());
    }

    #[test]
    fn hash_hash_is_distinct_token() {
        let toks = non_trivial("a##b");
        assert!(matches!(toks[1].kind, TokenKind::HashHash));
    }

    #[test]
    fn block_comment_becomes_whitespace() {
        let toks = lex("a/* comment */b");
        let kinds: Vec<_> = toks
            .iter()
            .filter(|t| !matches!(t.kind, TokenKind::Eof))
            .map(|t| &t.kind)
            .collect();
        assert!(matches!(kinds[0], TokenKind::Ident(_)));
        assert!(matches!(kinds[1], TokenKind::Whitespace));
        assert!(matches!(kinds[2], TokenKind::Ident(_)));
    }
}
