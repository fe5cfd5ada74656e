//! Macro substitution: `#`, `##`, argument capture and rescan.
//!
//! Grounded on the hideset algorithm in `examples/original_source/src/lex/
//! cpp.c` (`expand`/`subst`/`hsadd`), reshaped into a queue-driven loop
//! (`spec.md` §4.1 "Algorithm", steps 2-3) instead of the original's mutual
//! recursion, so `Preprocessor::run`'s single `while` loop can drive both
//! directive handling and macro rescanning.

use super::macros::{MacroDef, MacroKind, SpecialMacro};
use super::{Arg, PpTok, Preprocessor};
use crate::strtab::Sym;
use crate::token::{HideSet, Punct, Token, TokenKind};
use std::collections::{HashMap, VecDeque};

impl<'a> Preprocessor<'a> {
    /// Entry point used both by the top-level driver loop and recursively
    /// by argument pre-expansion; `pt` is the macro-name token already
    /// popped off `input`.
    pub(super) fn expand_macro(
        &mut self,
        pt: PpTok,
        def: MacroDef,
        input: &mut VecDeque<PpTok>,
        output: &mut Vec<Token>,
    ) {
        match def.kind {
            MacroKind::Special => {
                let tok = self.synthesize_special(def.special.unwrap(), &pt.tok);
                self.emit(output, tok);
            }
            MacroKind::Object => {
                let new_hideset = pt.tok.hideset.add(def.name);
                let bindings = HashMap::new();
                let substituted =
                    self.substitute(&def.replacement, &def.params, def.variadic, &bindings, &new_hideset);
                self.requeue(input, substituted);
            }
            MacroKind::Function => {
                if !matches!(
                    input.front().map(|p| &p.tok.kind),
                    Some(TokenKind::Punct(Punct::LParen))
                ) {
                    // No following `(`: not a macro invocation here, pass
                    // the name through untouched.
                    self.emit(output, pt.tok);
                    return;
                }
                input.pop_front(); // consume '('
                let (mut args, rparen_hideset) = self.parse_arglist(input, pt.tok.mark);

                if def.params.is_empty() && !def.variadic && args.len() == 1 && args[0].is_empty() {
                    args = Vec::new();
                }
                if def.variadic {
                    if args.len() < def.params.len() {
                        self.diag.error(
                            Some(pt.tok.mark),
                            format!(
                                "macro requires at least {} arguments, {} given",
                                def.params.len(),
                                args.len()
                            ),
                        );
                    }
                } else if args.len() != def.params.len() {
                    self.diag.error(
                        Some(pt.tok.mark),
                        format!(
                            "macro requires {} arguments, {} given",
                            def.params.len(),
                            args.len()
                        ),
                    );
                }

                let mut bindings: HashMap<Sym, Arg> = HashMap::new();
                for (i, &p) in def.params.iter().enumerate() {
                    bindings.insert(p, args.get(i).cloned().unwrap_or_default());
                }
                if def.variadic {
                    let va_sym = self.session.strtab.intern("__VA_ARGS__");
                    let tail = if args.len() > def.params.len() {
                        self.join_with_commas(&args[def.params.len()..], pt.tok.mark)
                    } else {
                        Vec::new()
                    };
                    bindings.insert(va_sym, tail);
                }

                let new_hideset = pt.tok.hideset.intersect(&rparen_hideset).add(def.name);
                let substituted = self.substitute(
                    &def.replacement,
                    &def.params,
                    def.variadic,
                    &bindings,
                    &new_hideset,
                );
                self.requeue(input, substituted);
            }
        }
    }

    fn requeue(&mut self, input: &mut VecDeque<PpTok>, tokens: Vec<Token>) {
        for t in tokens.into_iter().rev() {
            input.push_front(PpTok {
                tok: t,
                ws_before: false,
            });
        }
    }

    fn synthesize_special(&mut self, which: SpecialMacro, at: &Token) -> Token {
        let (line, file_display) = {
            let mark = self.session.marks.get(at.mark);
            (mark.line, mark.file.display().to_string())
        };
        let text = match which {
            SpecialMacro::File => format!("\"{file_display}\""),
            SpecialMacro::Line => line.to_string(),
            SpecialMacro::Date => format!("\"{}\"", self.date),
            SpecialMacro::Time => format!("\"{}\"", self.time),
        };
        let sym = self.session.strtab.intern(&text);
        let kind = match which {
            SpecialMacro::Line => TokenKind::IntLit {
                value: line as u64,
                suffix: Default::default(),
            },
            SpecialMacro::File | SpecialMacro::Date | SpecialMacro::Time => TokenKind::StringLit(sym),
        };
        Token {
            kind,
            text: sym,
            mark: at.mark,
            hideset: HideSet::empty(),
        }
    }

    /// Parse a parenthesized argument list, starting just after the `(`.
    /// Returns the arguments and the hideset of the consumed closing `)`,
    /// used to compute `H' = (H ∩ HS(')')) ∪ {name}` (`spec.md` §3).
    fn parse_arglist(
        &mut self,
        input: &mut VecDeque<PpTok>,
        call_mark: crate::mark::MarkId,
    ) -> (Vec<Arg>, HideSet) {
        let mut args: Vec<Arg> = Vec::new();
        let mut current: Arg = Vec::new();
        let mut depth: i32 = 0;
        loop {
            let Some(pt) = input.pop_front() else {
                self.diag
                    .error(Some(call_mark), "unterminated macro argument list");
                args.push(current);
                return (args, HideSet::empty());
            };
            match &pt.tok.kind {
                TokenKind::Eof => {
                    self.diag
                        .error(Some(call_mark), "unterminated macro argument list");
                    input.push_front(pt);
                    args.push(current);
                    return (args, HideSet::empty());
                }
                TokenKind::Punct(Punct::LParen) => {
                    depth += 1;
                    current.push(pt);
                }
                TokenKind::Punct(Punct::RParen) => {
                    if depth == 0 {
                        let hideset = pt.tok.hideset.clone();
                        args.push(current);
                        return (args, hideset);
                    }
                    depth -= 1;
                    current.push(pt);
                }
                TokenKind::Punct(Punct::Comma) if depth == 0 => {
                    args.push(std::mem::take(&mut current));
                }
                TokenKind::Newline | TokenKind::Whitespace => {}
                _ => current.push(pt),
            }
        }
    }

    fn join_with_commas(&mut self, parts: &[Arg], fallback_mark: crate::mark::MarkId) -> Arg {
        let comma_sym = self.session.strtab.intern(",");
        let mut out = Vec::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                let mark = part
                    .first()
                    .map(|a| a.tok.mark)
                    .unwrap_or(fallback_mark);
                out.push(PpTok {
                    tok: Token {
                        kind: TokenKind::Punct(Punct::Comma),
                        text: comma_sym,
                        mark,
                        hideset: HideSet::empty(),
                    },
                    ws_before: false,
                });
            }
            out.extend(part.iter().cloned());
        }
        out
    }

    /// Re-run macro expansion over a standalone token vector (used for
    /// argument pre-expansion and for `#if`/`#elif` expression lines).
    /// Unlike `run`, this never touches directive or conditional state.
    pub(super) fn expand_tokens(&mut self, tokens: Vec<Token>) -> Vec<Token> {
        let mut input: VecDeque<PpTok> = tokens
            .into_iter()
            .map(|tok| PpTok {
                tok,
                ws_before: false,
            })
            .collect();
        let mut output = Vec::new();
        while let Some(pt) = input.pop_front() {
            match &pt.tok.kind {
                TokenKind::Ident(name) if !pt.tok.hideset.contains(*name) => {
                    if let Some(def) = self.macros.get(*name).cloned() {
                        self.expand_macro(pt, def, &mut input, &mut output);
                    } else {
                        self.emit(&mut output, pt.tok);
                    }
                }
                TokenKind::Eof | TokenKind::Newline | TokenKind::Whitespace => {}
                _ => self.emit(&mut output, pt.tok),
            }
        }
        output
    }

    /// Build the replacement tokens for one macro use: stringize, paste,
    /// parameter substitution (with recursive re-expansion), and plain
    /// copy-through, followed by stamping `hideset` onto every result
    /// token (`spec.md` §3 "Substitute").
    fn substitute(
        &mut self,
        repl: &[Token],
        params: &[Sym],
        variadic: bool,
        bindings: &HashMap<Sym, Arg>,
        hideset: &HideSet,
    ) -> Vec<Token> {
        let _ = (params, variadic); // kept for signature symmetry/readability at call sites
        let mut out: Vec<Token> = Vec::new();
        let mut i = 0;
        while i < repl.len() {
            let t = &repl[i];
            match &t.kind {
                TokenKind::Hash => {
                    if let Some(next) = repl.get(i + 1) {
                        if let TokenKind::Ident(name) = next.kind {
                            if let Some(arg) = bindings.get(&name) {
                                let sym = self.stringize(arg);
                                out.push(Token {
                                    kind: TokenKind::StringLit(sym),
                                    text: sym,
                                    mark: next.mark,
                                    hideset: HideSet::empty(),
                                });
                                i += 2;
                                continue;
                            }
                        }
                    }
                    out.push(t.clone());
                    i += 1;
                }
                TokenKind::HashHash => {
                    i += 1;
                    let Some(next) = repl.get(i) else {
                        out.push(t.clone());
                        continue;
                    };
                    let right: Vec<Token> = if let TokenKind::Ident(name) = next.kind {
                        match bindings.get(&name) {
                            Some(arg) => arg.iter().map(|a| a.tok.clone()).collect(),
                            None => vec![next.clone()],
                        }
                    } else {
                        vec![next.clone()]
                    };
                    i += 1;
                    if let Some(first_right) = right.first() {
                        match out.pop() {
                            Some(left) => {
                                let glued = self.paste(&left, first_right);
                                out.push(glued);
                                out.extend(right[1..].iter().cloned());
                            }
                            None => out.extend(right),
                        }
                    }
                    // Right operand expands to nothing (empty argument not
                    // followed by the GNU special case below): `##` simply
                    // vanishes along with it.
                }
                TokenKind::Ident(name) => {
                    if let Some(arg) = bindings.get(name) {
                        let followed_by_paste =
                            matches!(repl.get(i + 1).map(|t| &t.kind), Some(TokenKind::HashHash));
                        if followed_by_paste && arg.is_empty() {
                            // GNU/C99 extension: `, ## __VA_ARGS__` with an
                            // empty variadic argument drops the paste
                            // entirely instead of gluing with nothing.
                            i += 2;
                        } else if followed_by_paste {
                            out.extend(arg.iter().map(|a| a.tok.clone()));
                            i += 1;
                        } else {
                            let raw: Vec<Token> = arg.iter().map(|a| a.tok.clone()).collect();
                            let expanded = self.expand_tokens(raw);
                            out.extend(expanded);
                            i += 1;
                        }
                    } else {
                        out.push(t.clone());
                        i += 1;
                    }
                }
                _ => {
                    out.push(t.clone());
                    i += 1;
                }
            }
        }
        for tok in out.iter_mut() {
            tok.hideset.union_inplace(hideset);
        }
        out
    }

    /// `#param`: concatenate the argument's raw spelling, collapsing any
    /// run of whitespace between tokens to a single space, and escaping
    /// backslashes/quotes that appear inside string/char literal spellings
    /// (`spec.md` §3 "Stringize").
    fn stringize(&mut self, arg: &Arg) -> Sym {
        let mut s = String::new();
        for (idx, a) in arg.iter().enumerate() {
            if idx > 0 && a.ws_before {
                s.push(' ');
            }
            let spelling = self.session.strtab.resolve(a.tok.text);
            if matches!(a.tok.kind, TokenKind::StringLit(_) | TokenKind::CharLit(_)) {
                for c in spelling.chars() {
                    if c == '\\' || c == '"' {
                        s.push('\\');
                    }
                    s.push(c);
                }
            } else {
                s.push_str(spelling);
            }
        }
        let quoted = format!("\"{s}\"");
        self.session.strtab.intern(&quoted)
    }

    /// `a ## b`: concatenate the two tokens' spellings and re-lex as a
    /// single token (`spec.md` §3 "Paste"). Pasting that does not yield a
    /// single valid token is a hard error; the left token is kept so
    /// recovery can continue.
    pub(super) fn paste(&mut self, left: &Token, right: &Token) -> Token {
        let ltext = self.session.strtab.resolve(left.text).to_string();
        let rtext = self.session.strtab.resolve(right.text).to_string();
        let combined = format!("{ltext}{rtext}");
        let file = self.session.marks.get(left.mark).file.clone();
        let toks = crate::lexer::Lexer::new(&combined, file, &mut self.session.marks, &mut self.session.strtab)
            .lex_all();
        let real: Vec<Token> = toks
            .into_iter()
            .filter(|t| !matches!(t.kind, TokenKind::Eof))
            .collect();
        if real.len() != 1 {
            self.diag.error(
                Some(left.mark),
                format!("pasting \"{ltext}\" and \"{rtext}\" does not give a valid token"),
            );
            return left.clone();
        }
        let mut glued = real.into_iter().next().unwrap();
        glued.mark = left.mark;
        glued
    }
}
