//! c11c CLI
//!
//! Command-line front end for compiling one C11 source file to textual IR.
//! Linking and invoking the system linker are out of scope (`spec.md` §6):
//! this binary only drives the preprocessor/lexer/parser/type-checker/IR
//! pipeline and writes the resulting IR text to `-o` (or stdout).

use clap::Parser as ClapParser;
use std::io::Write as _;
use std::path::PathBuf;
use std::process;

use c11c::{codegen_translation_unit, print_module, pp, CompilerConfig, Diag, Session};

#[derive(ClapParser)]
#[command(name = "c11c")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "C11 to LLVM-style textual IR compiler front end", long_about = None)]
struct Cli {
    /// Source file to compile.
    input: PathBuf,

    /// Prepend an include search path (repeatable).
    #[arg(short = 'I', value_name = "path")]
    include_paths: Vec<PathBuf>,

    /// Predefine a macro, `NAME` or `NAME=VALUE` (repeatable).
    #[arg(short = 'D', value_name = "name[=value]")]
    defines: Vec<String>,

    /// Undefine a predefined macro (repeatable).
    #[arg(short = 'U', value_name = "name")]
    undefines: Vec<String>,

    /// Output path for the IR text; defaults to stdout.
    #[arg(short = 'o', value_name = "file")]
    output: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = CompilerConfig {
        include_paths: cli.include_paths,
        defines: cli.defines,
        undefines: cli.undefines,
        output: cli.output.clone(),
    };

    let mut session = Session::new();
    let mut diag = Diag::new();

    let tokens = {
        let mut preprocessor = pp::Preprocessor::new(&mut session, &mut diag, &config);
        tracing::debug!(file = %cli.input.display(), "preprocessing");
        preprocessor.process(&cli.input)
    };

    let ir_text = if diag.had_error() {
        None
    } else {
        tracing::debug!("parsing");
        let tu = c11c::parser::parse(tokens, &mut session, &mut diag);
        if diag.had_error() {
            None
        } else {
            tracing::debug!("type-checking");
            if c11c::typecheck::typecheck(&tu, &session, &mut diag) {
                tracing::debug!("lowering to IR");
                let module = codegen_translation_unit(&tu, &mut session);
                Some(print_module(&module, &session))
            } else {
                None
            }
        }
    };

    for d in diag.diagnostics() {
        eprintln!("{}", d.format(&session.marks));
    }

    if let Some(ir_text) = ir_text {
        match &cli.output {
            Some(path) => {
                if let Err(e) = std::fs::write(path, ir_text) {
                    eprintln!("error: could not write '{}': {e}", path.display());
                    process::exit(1);
                }
            }
            None => {
                let _ = std::io::stdout().write_all(ir_text.as_bytes());
            }
        }
    }

    process::exit(diag.exit_code());
}
