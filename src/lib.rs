//! This is the compiler back end as a library. See `src/bin` for the
//! executable program using this library.

pub mod back;
pub mod common;
pub mod error;
pub mod front;
pub mod middle;

pub use error::CompileError;

/// Lex, parse, and lower a full translation unit to GAS assembly text.
///
/// This is the crate's single entry point for "source in, assembly out".
/// Each returned line includes its trailing newline.
pub fn compile_source(src: &str) -> Result<Vec<String>, CompileError> {
    let program = front::parse(src)?;
    code_gen(&program)
}

/// Lower an already-parsed program straight to assembly text, skipping the
/// front end. Used by the CLI's `Ir`/`Ast` stages and by tests that build
/// ASTs by hand instead of through the lexer/parser.
pub fn code_gen(program: &front::Program) -> Result<Vec<String>, CompileError> {
    let sem_table = front::semantics::collect(program);
    let (steps, funcs) = middle::lower(program, &sem_table);
    back::emit(&steps, &funcs)
}
