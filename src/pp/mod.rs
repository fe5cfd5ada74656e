//! Preprocessor (`spec.md` §4.1).
//!
//! Implemented as a single driver loop over a flat token queue, in the style
//! of the classic token-substitution algorithm: macro expansions are pushed
//! back onto the front of the pending queue so that recursive expansion and
//! rescanning fall out of the same loop that handles plain pass-through,
//! rather than needing a separate recursive-call stack. Directive dispatch
//! and conditional-compilation skipping share that same loop, matching
//! `examples/original_source/src/lex/cpp.c`'s "ignore flag + if-stack"
//! design (`spec.md` §4.1 "Algorithm").

mod directives;
mod expand;
mod include;
pub mod macros;

use crate::config::CompilerConfig;
use crate::diag::Diag;
use crate::lexer::Lexer;
use crate::pp::macros::{MacroDef, MacroKind, MacroTable, SpecialMacro};
use crate::session::Session;
use crate::strtab::Sym;
use crate::token::{HideSet, Punct, Token, TokenKind};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// One pending token plus the whitespace that preceded it on its line.
/// `ws_before` only matters for `#` stringizing (`spec.md` §4.1
/// "Substitute" — whitespace collapses to a single space).
#[derive(Debug, Clone)]
pub struct PpTok {
    pub tok: Token,
    pub ws_before: bool,
}

/// A captured macro-call argument: its raw token sequence, pre-expansion.
pub type Arg = Vec<PpTok>;

struct IfFrame {
    /// True once some arm at this nesting level has been taken.
    any_taken: bool,
    /// `ignore` as it was when this level was entered, so `#endif`/a
    /// non-taken `#else` restores the right ambient state, and so a
    /// nested `#if` that was already inside an inactive arm stays
    /// inactive regardless of its own condition.
    outer_ignore: bool,
}

pub struct Preprocessor<'a> {
    pub macros: MacroTable,
    pub session: &'a mut Session,
    pub diag: &'a mut Diag,
    pub config: &'a CompilerConfig,
    ignore: bool,
    if_stack: Vec<IfFrame>,
    date: String,
    time: String,
    current_file: Rc<PathBuf>,
}

impl<'a> Preprocessor<'a> {
    pub fn new(session: &'a mut Session, diag: &'a mut Diag, config: &'a CompilerConfig) -> Self {
        let (date, time) = current_date_time();
        let mut pp = Preprocessor {
            macros: MacroTable::new(),
            session,
            diag,
            config,
            ignore: false,
            if_stack: Vec::new(),
            date,
            time,
            current_file: Rc::new(PathBuf::new()),
        };
        pp.install_predefined_macros();
        pp
    }

    fn install_predefined_macros(&mut self) {
        let simple: &[(&str, &str)] = &[
            ("__STDC__", "1"),
            ("__STDC_VERSION__", "201112L"),
            ("__STDC_HOSTED__", "1"),
            ("__x86_64__", "1"),
            ("__linux__", "1"),
            ("__LP64__", "1"),
            ("__STDC_NO_ATOMICS__", "1"),
            ("__STDC_NO_THREADS__", "1"),
        ];
        for (name, value) in simple {
            self.define_object_like(name, value);
        }
        // Compatibility shims (`spec.md` §4.1 "Predefined macros").
        self.define_function_alias("__alignof__", &["x"], "_Alignof(x)");
        self.define_object_like("__FUNCTION__", "__func__");
        self.define_function_alias("__attribute__", &["x"], "");
        self.define_object_like("_Noreturn", "");

        for (name, special) in [
            ("__FILE__", SpecialMacro::File),
            ("__LINE__", SpecialMacro::Line),
            ("__DATE__", SpecialMacro::Date),
            ("__TIME__", SpecialMacro::Time),
        ] {
            let sym = self.session.strtab.intern(name);
            self.macros.define(MacroDef {
                name: sym,
                kind: MacroKind::Special,
                special: Some(special),
                params: Vec::new(),
                variadic: false,
                replacement: Vec::new(),
            });
        }

        for d in &self.config.defines.clone() {
            let (name, value) = match d.split_once('=') {
                Some((n, v)) => (n.to_string(), v.to_string()),
                None => (d.clone(), "1".to_string()),
            };
            self.define_object_like(&name, &value);
        }
        for u in &self.config.undefines.clone() {
            let sym = self.session.strtab.intern(u);
            self.macros.undefine(sym);
        }
    }

    fn define_object_like(&mut self, name: &str, body: &str) {
        let sym = self.session.strtab.intern(name);
        let replacement = self.lex_fragment(body);
        self.macros.define(MacroDef {
            name: sym,
            kind: MacroKind::Object,
            special: None,
            params: Vec::new(),
            variadic: false,
            replacement,
        });
    }

    fn define_function_alias(&mut self, name: &str, params: &[&str], body: &str) {
        let sym = self.session.strtab.intern(name);
        let params: Vec<Sym> = params.iter().map(|p| self.session.strtab.intern(p)).collect();
        let replacement = self.lex_fragment(body);
        self.macros.define(MacroDef {
            name: sym,
            kind: MacroKind::Function,
            special: None,
            params,
            variadic: false,
            replacement,
        });
    }

    fn lex_fragment(&mut self, src: &str) -> Vec<Token> {
        let file = Rc::new(PathBuf::from("<builtin>"));
        let toks = Lexer::new(src, file, &mut self.session.marks, &mut self.session.strtab)
            .lex_all();
        toks.into_iter()
            .filter(|t| !matches!(t.kind, TokenKind::Whitespace | TokenKind::Newline | TokenKind::Eof))
            .collect()
    }

    /// Top-level entry point: `spec.md` §4.1 contract.
    pub fn process(&mut self, path: &Path) -> Vec<Token> {
        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                self.diag.error(None, format!("cannot read '{}': {e}", path.display()));
                return Vec::new();
            }
        };
        self.process_str(&source, path.to_path_buf())
    }

    fn process_str(&mut self, source: &str, path: PathBuf) -> Vec<Token> {
        let file = Rc::new(path);
        let prev_file = self.current_file.clone();
        self.current_file = file.clone();
        tracing::debug!(file = %file.display(), "preprocessing file");
        let tokens = Lexer::new(source, file, &mut self.session.marks, &mut self.session.strtab)
            .lex_all();
        let out = self.run(tokens);
        self.current_file = prev_file;
        out
    }

    fn to_pp_toks(tokens: Vec<Token>) -> VecDeque<PpTok> {
        let mut out = VecDeque::new();
        let mut ws_before = false;
        for t in tokens {
            match t.kind {
                TokenKind::Whitespace => ws_before = true,
                _ => {
                    out.push_back(PpTok { tok: t, ws_before });
                    ws_before = false;
                }
            }
        }
        out
    }

    fn run(&mut self, tokens: Vec<Token>) -> Vec<Token> {
        let mut input = Self::to_pp_toks(tokens);
        let mut output = Vec::new();
        let mut at_bol = true;
        let saved_if_depth = self.if_stack.len();
        while let Some(pt) = input.pop_front() {
            if matches!(pt.tok.kind, TokenKind::Newline) {
                at_bol = true;
                continue;
            }
            if matches!(pt.tok.kind, TokenKind::Eof) {
                break;
            }
            if at_bol && matches!(pt.tok.kind, TokenKind::Hash) {
                let line = self.take_line(&mut input);
                at_bol = true;
                self.dispatch_directive(line, &mut output);
                continue;
            }
            at_bol = false;
            if self.ignore {
                continue;
            }
            self.step(pt, &mut input, &mut output);
        }
        // `spec.md` §4.1: conditional state may not leak across an include
        // boundary — any dangling #if left open in this file is an error,
        // and we restore the stack to where it was before this call.
        if self.if_stack.len() != saved_if_depth {
            self.diag.error(None, "unterminated #if in included file");
            self.if_stack.truncate(saved_if_depth);
            self.ignore = false;
        }
        output
    }

    fn take_line(&mut self, input: &mut VecDeque<PpTok>) -> Vec<PpTok> {
        let mut line = Vec::new();
        while let Some(pt) = input.front() {
            if matches!(pt.tok.kind, TokenKind::Newline) {
                input.pop_front();
                break;
            }
            if matches!(pt.tok.kind, TokenKind::Eof) {
                break;
            }
            line.push(input.pop_front().unwrap());
        }
        line
    }

    /// Is `input` positioned right after `_Pragma` at a `( "..." )` operand?
    fn at_pragma_operator(&self, input: &VecDeque<PpTok>) -> bool {
        matches!(
            input.front().map(|p| &p.tok.kind),
            Some(TokenKind::Punct(Punct::LParen))
        ) && matches!(
            input.get(1).map(|p| &p.tok.kind),
            Some(TokenKind::StringLit(_))
        ) && matches!(
            input.get(2).map(|p| &p.tok.kind),
            Some(TokenKind::Punct(Punct::RParen))
        )
    }

    /// `_Pragma("...")` (`spec.md` Open Questions: treated as a no-op,
    /// equivalent to `#pragma ...`). Discards the `( string-literal )`.
    fn consume_pragma_operator(&mut self, input: &mut VecDeque<PpTok>) {
        input.pop_front();
        input.pop_front();
        input.pop_front();
    }

    fn step(&mut self, pt: PpTok, input: &mut VecDeque<PpTok>, output: &mut Vec<Token>) {
        match &pt.tok.kind {
            TokenKind::Ident(name)
                if self.session.strtab.resolve(*name) == "_Pragma" && self.at_pragma_operator(input) =>
            {
                self.consume_pragma_operator(input);
            }
            TokenKind::Ident(name) if !pt.tok.hideset.contains(*name) => {
                if let Some(def) = self.macros.get(*name).cloned() {
                    self.expand_macro(pt, def, input, output);
                } else {
                    self.emit(output, pt.tok);
                }
            }
            TokenKind::Err => {
                let msg = self.session.strtab.resolve(pt.tok.text).to_string();
                self.diag.error(Some(pt.tok.mark), msg);
            }
            TokenKind::Warn => {
                let msg = self.session.strtab.resolve(pt.tok.text).to_string();
                self.diag.warning(Some(pt.tok.mark), msg);
            }
            TokenKind::HashHash => {
                self.diag.error(Some(pt.tok.mark), "stray '##' in program");
            }
            _ => self.emit(output, pt.tok),
        }
    }

    /// Adjacent string-literal concatenation (`spec.md` §4.1 step 4).
    fn emit(&mut self, output: &mut Vec<Token>, tok: Token) {
        if let TokenKind::StringLit(cur) = tok.kind {
            if let Some(prev) = output.last() {
                if let TokenKind::StringLit(prev_sym) = prev.kind {
                    let merged = format!(
                        "{}{}",
                        self.session.strtab.resolve(prev_sym),
                        self.session.strtab.resolve(cur)
                    );
                    let sym = self.session.strtab.intern(&merged);
                    let mark = prev.mark;
                    output.pop();
                    output.push(Token {
                        kind: TokenKind::StringLit(sym),
                        text: sym,
                        mark,
                        hideset: HideSet::empty(),
                    });
                    return;
                }
            }
        }
        output.push(tok);
    }

    fn directive_name(&self, pt: &PpTok) -> Option<String> {
        match &pt.tok.kind {
            TokenKind::Ident(s) => Some(self.session.strtab.resolve(*s).to_string()),
            TokenKind::Keyword(k) => Some(format!("{k:?}").to_lowercase()),
            _ => None,
        }
    }

    fn dispatch_directive(&mut self, line: Vec<PpTok>, output: &mut Vec<Token>) {
        let Some(first) = line.first() else { return };
        let Some(name) = self.directive_name(first) else {
            self.diag.error(Some(first.tok.mark), "invalid preprocessing directive");
            return;
        };
        let rest = &line[1..];
        let conditional_toggling = matches!(
            name.as_str(),
            "if" | "ifdef" | "ifndef" | "elif" | "else" | "endif"
        );
        if self.ignore && !conditional_toggling {
            return;
        }
        match name.as_str() {
            "define" => self.handle_define(rest),
            "undef" => self.handle_undef(rest),
            "include" => self.handle_include(rest, output),
            "if" => self.handle_if(rest),
            "ifdef" => self.handle_ifdef(rest, false),
            "ifndef" => self.handle_ifdef(rest, true),
            "elif" => self.handle_elif(rest),
            "else" => self.handle_else(first.tok.mark),
            "endif" => self.handle_endif(first.tok.mark),
            "error" => self.handle_error(rest, first.tok.mark),
            "warning" => self.handle_warning(rest, first.tok.mark),
            "line" => self.handle_line(rest),
            "pragma" => {} // stub: no pragma affects this front end's output
            other => {
                self.diag
                    .error(Some(first.tok.mark), format!("unknown directive '#{other}'"));
            }
        }
    }
}

fn current_date_time() -> (String, String) {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let days = (secs / 86_400) as i64;
    let tod = secs % 86_400;
    let (h, m, s) = (tod / 3600, (tod % 3600) / 60, tod % 60);
    let (y, mo, d) = civil_from_days(days);
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    let date = format!("{} {:2} {}", MONTHS[(mo - 1) as usize], d, y);
    let time = format!("{h:02}:{m:02}:{s:02}");
    (date, time)
}

/// Howard Hinnant's `civil_from_days`: days-since-epoch to (year, month, day).
/// Self-contained so this crate doesn't need a calendar/date dependency just
/// to print `__DATE__`/`__TIME__`.
fn civil_from_days(z: i64) -> (i64, i64, i64) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as i64;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as i64;
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;

    fn run_pp(src: &str) -> (Vec<String>, bool) {
        let mut session = Session::new();
        let mut diag = Diag::new();
        let config = CompilerConfig::default();
        let toks = {
            let mut pp = Preprocessor::new(&mut session, &mut diag, &config);
            pp.process_str(src, PathBuf::from("t.c"))
        };
        let texts = toks
            .iter()
            .map(|t| session.strtab.resolve(t.text).to_string())
            .collect();
        (texts, diag.had_error())
    }

    #[test]
    fn plain_tokens_pass_through_unfiltered_of_whitespace() {
        let (texts, err) = run_pp("int x;");
        assert!(!err);
        assert_eq!(texts, vec!["int", "x", ";"]);
    }

    #[test]
    fn object_like_macro_expands() {
        let (texts, _) = run_pp("#define N 5\nint x = N;");
        assert_eq!(texts, vec!["int", "x", "=", "5", ";"]);
    }

    #[test]
    fn double_expansion_is_blocked_by_hideset() {
        let (texts, _) = run_pp("#define X X\nX");
        assert_eq!(texts, vec!["X"]);
    }

    #[test]
    fn function_like_macro_with_args() {
        let (texts, _) = run_pp("#define ADD(a,b) a+b\nADD(1,2)");
        assert_eq!(texts, vec!["1", "+", "2"]);
    }

    #[test]
    fn token_paste_produces_integer() {
        let (texts, _) = run_pp("#define CAT(a,b) a##b\nint x = CAT(12,34);");
        assert_eq!(texts, vec!["int", "x", "=", "1234", ";"]);
    }

    #[test]
    fn stringify_collapses_whitespace() {
        let (texts, _) = run_pp("#define STR(x) #x\nchar *s = STR( a  b );");
        assert_eq!(texts[4], "\"a b\"");
    }

    #[test]
    fn comma_inside_parens_is_one_argument() {
        let (texts, _) = run_pp("#define M(x) x+1\nM((1,2))");
        assert_eq!(texts, vec!["(", "1", ",", "2", ")", "+", "1"]);
    }

    #[test]
    fn empty_call_zero_params_is_zero_args() {
        let (_, err) = run_pp("#define Z() 1\nZ()");
        assert!(!err);
    }

    #[test]
    fn empty_call_one_param_is_one_empty_arg() {
        let (texts, err) = run_pp("#define ID(x) [x]\nID()");
        assert!(!err);
        assert_eq!(texts, vec!["[", "]"]);
    }

    #[test]
    fn if_zero_skips_body() {
        let (texts, _) = run_pp("#if 0\nint skipped;\n#endif\nint kept;");
        assert_eq!(texts, vec!["int", "kept", ";"]);
    }

    #[test]
    fn ifdef_true_branch() {
        let (texts, _) = run_pp("#define FOO\n#ifdef FOO\nint a;\n#else\nint b;\n#endif");
        assert_eq!(texts, vec!["int", "a", ";"]);
    }

    #[test]
    fn hash_not_at_line_start_is_not_a_directive() {
        let (texts, err) = run_pp("int x = 1 # 2;");
        assert!(!err);
        assert_eq!(texts, vec!["int", "x", "=", "1", "#", "2", ";"]);
    }

    #[test]
    fn predefined_stdc_macro_is_one() {
        let (texts, _) = run_pp("__STDC__");
        assert_eq!(texts, vec!["1"]);
    }

    #[test]
    fn line_and_file_macros_expand() {
        let (texts, _) = run_pp("__LINE__");
        assert_eq!(texts, vec!["1"]);
    }
}
