//! Top-level back-end entry point: drives a [`GasEmitter`] over a whole
//! program's IR step list and collects the resulting GAS text.

use crate::error::CompileError;
use crate::middle::ir::{FuncInfoTable, StepList};

use super::asm::GasEmitter;

/// Lower an entire program's IR to GAS assembly text, one line per
/// `Vec` entry, each including its trailing newline.
pub fn emit(steps: &StepList, funcs: &FuncInfoTable) -> Result<Vec<String>, CompileError> {
    let mut lines = vec!["# generated by cflatc\n".to_string(), ".text\n".to_string()];

    let mut emitter = GasEmitter::new(funcs);
    for step in steps {
        emitter.visit(step)?;
    }
    lines.extend(emitter.into_lines());

    Ok(lines)
}
