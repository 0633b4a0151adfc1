//! Crate-wide error type.
//!
//! Follows the house style set by `front::parse::ParseError`:
//! `derive_more::Display` for the message, a manual `Debug` forwarding to
//! `Display` so `.unwrap()`/`?` in tests read naturally, and a
//! `std::error::Error` impl so it composes with `?` across front end and
//! core failures alike.

use derive_more::Display;

use crate::common::Id;
use crate::front::lex::LexError;
use crate::front::parse::ParseError;

#[derive(Display)]
pub enum CompileError {
    #[display("{_0}")]
    Lex(LexError),
    #[display("{_0}")]
    Parse(ParseError),
    /// A call site or function needs a 7th concurrent argument register;
    /// stack-passed arguments are unsupported.
    #[display("function '{callee}' needs more than 6 argument registers at once (stack-passed arguments are unsupported)")]
    TooManyArguments { callee: Id },
    /// An IR pseudo-address was used without ever being assigned a
    /// location.
    #[display("internal error: no register or stack slot is mapped for IR address '{addr}'")]
    UnresolvedAddress { addr: Id },
    /// A stack allocation was requested for a zero-sized (`VOID`/`UNKNOWN`)
    /// type.
    #[display("internal error: cannot allocate a stack slot for zero-sized address '{addr}'")]
    ZeroSizedAllocation { addr: Id },
}

impl std::fmt::Debug for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl std::error::Error for CompileError {}

impl From<LexError> for CompileError {
    fn from(e: LexError) -> Self {
        CompileError::Lex(e)
    }
}

impl From<ParseError> for CompileError {
    fn from(e: ParseError) -> Self {
        CompileError::Parse(e)
    }
}
