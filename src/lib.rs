//! C11 compiler front end.
//!
//! Provides compilation from C11 source to a textual, LLVM-subset IR.
//! The stages run in sequence (`spec.md` §0 "Crate shape"): preprocessor,
//! lexer, parser, type-checker, IR lowering and printing. Each stage is
//! its own module; [`compile_to_ir`] and [`compile_to_ir_with_config`]
//! wire them together for callers (tests, `main.rs`) that want the whole
//! pipeline without driving each stage by hand.

pub mod ast;
pub mod codegen;
pub mod config;
pub mod diag;
pub mod ir;
pub mod lexer;
pub mod mark;
pub mod parser;
pub mod pp;
pub mod session;
pub mod strtab;
pub mod token;
pub mod typecheck;
pub mod typetab;
pub mod types;

pub use codegen::{codegen_translation_unit, print_module};
pub use config::CompilerConfig;
pub use diag::Diag;
pub use session::Session;

use std::fs;
use std::io::Write;
use std::path::Path;

/// Compile a source string to textual IR, using a default configuration.
pub fn compile_to_ir(source: &str) -> Result<String, String> {
    compile_to_ir_with_config(source, &CompilerConfig::default())
}

/// Compile a source string to textual IR with a caller-supplied configuration.
///
/// `Preprocessor::process` works from a real path (so `#include` and the
/// `__FILE__`/`__LINE__` builtins have something to report), so the source
/// is first spilled to a temporary file.
pub fn compile_to_ir_with_config(source: &str, config: &CompilerConfig) -> Result<String, String> {
    let mut session = Session::new();
    let mut diag = Diag::new();

    let dir = tempfile::tempdir().map_err(|e| e.to_string())?;
    let path = dir.path().join("source.c");
    fs::File::create(&path)
        .and_then(|mut f| f.write_all(source.as_bytes()))
        .map_err(|e| e.to_string())?;

    let tokens = {
        let mut preprocessor = pp::Preprocessor::new(&mut session, &mut diag, config);
        preprocessor.process(&path)
    };
    if diag.had_error() {
        return Err(diag.render_all(&session.marks));
    }

    let tu = parser::parse(tokens, &mut session, &mut diag);
    if diag.had_error() {
        return Err(diag.render_all(&session.marks));
    }

    if !typecheck::typecheck(&tu, &session, &mut diag) {
        return Err(diag.render_all(&session.marks));
    }

    let module = codegen_translation_unit(&tu, &mut session);
    Ok(print_module(&module, &session))
}

/// Compile a source file to an IR file, using a default configuration.
pub fn compile_file(source_path: &Path, output_path: &Path) -> Result<(), String> {
    compile_file_with_config(source_path, output_path, &CompilerConfig::default())
}

/// Compile a source file to an IR file with a caller-supplied configuration.
pub fn compile_file_with_config(
    source_path: &Path,
    output_path: &Path,
    config: &CompilerConfig,
) -> Result<(), String> {
    let mut session = Session::new();
    let mut diag = Diag::new();

    let tokens = {
        let mut preprocessor = pp::Preprocessor::new(&mut session, &mut diag, config);
        preprocessor.process(source_path)
    };
    if diag.had_error() {
        return Err(diag.render_all(&session.marks));
    }

    let tu = parser::parse(tokens, &mut session, &mut diag);
    if diag.had_error() {
        return Err(diag.render_all(&session.marks));
    }

    if !typecheck::typecheck(&tu, &session, &mut diag) {
        return Err(diag.render_all(&session.marks));
    }

    let module = codegen_translation_unit(&tu, &mut session);
    let ir_text = print_module(&module, &session);

    fs::write(output_path, ir_text).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_a_trivial_function_to_ir_text() {
        let ir = compile_to_ir("int main(void) { return 0; }").expect("compilation succeeds");
        assert!(ir.contains("define i32 @main"), "{ir}");
        assert!(ir.contains("ret i32 0"), "{ir}");
    }

    #[test]
    fn reports_undeclared_identifiers_as_rendered_diagnostics() {
        let err = compile_to_ir("int f(void) { return undeclared_name; }")
            .expect_err("undeclared identifier is a type error");
        assert!(err.contains("undeclared"), "{err}");
    }

    #[test]
    fn compile_file_writes_ir_to_the_requested_path() {
        let dir = tempfile::tempdir().unwrap();
        let src_path = dir.path().join("in.c");
        let out_path = dir.path().join("out.ll");
        fs::write(&src_path, "int add(int a, int b) { return a + b; }\n").unwrap();

        compile_file(&src_path, &out_path).expect("compilation succeeds");
        let ir = fs::read_to_string(&out_path).unwrap();
        assert!(ir.contains("define i32 @add"), "{ir}");
    }
}
