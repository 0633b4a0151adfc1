//! The three-address-code IR: step kinds, operator tags, and the
//! per-function metadata the back end needs to resolve pseudo-addresses to
//! real locations.
//!
//! Modeled as a closed `enum` matched exhaustively by the back end rather
//! than as a visitor hierarchy: the set of step kinds is fixed, so a sum
//! type gives the same decoupling between IR production and back-end
//! choice with compile-time exhaustiveness instead of dynamic dispatch.

use crate::common::Id;
use crate::front::ast::{BinOp, DataType};

/// An IR operand: either a pseudo-address or an immediate integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Addr(Id),
    Imm(i64),
}

impl From<Id> for Operand {
    fn from(addr: Id) -> Self {
        Operand::Addr(addr)
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Operand::Imm(value)
    }
}

/// The closed set of IR operator tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrOp {
    /// Kept for fidelity with the data model this mirrors; never
    /// constructed by `lower` — a call lowers to
    /// `PushArg`/`CallFunc`/`StoreYield`, never to an `Assign` carrying
    /// this tag.
    Call,
    Negate,
    Multiply,
    Divide,
    Add,
    Subtract,
    CompareEq,
    CompareNeq,
    CompareLt,
    CompareLte,
    CompareGt,
    CompareGte,
    SetValue,
    Nop,
}

impl IrOp {
    /// `AST_OP_IR_MATCHES` from the original IR generator.
    pub fn from_bin_op(op: BinOp) -> IrOp {
        match op {
            BinOp::Mul => IrOp::Multiply,
            BinOp::Div => IrOp::Divide,
            BinOp::Add => IrOp::Add,
            BinOp::Sub => IrOp::Subtract,
            BinOp::Eq => IrOp::CompareEq,
            BinOp::Neq => IrOp::CompareNeq,
            BinOp::Lt => IrOp::CompareLt,
            BinOp::Lte => IrOp::CompareLte,
            BinOp::Gt => IrOp::CompareGt,
            BinOp::Gte => IrOp::CompareGte,
            // Short-circuit operators are expanded by the emitter into
            // explicit branches rather than lowered as a single Assign.
            BinOp::LogicAnd | BinOp::LogicOr => IrOp::Nop,
        }
    }

    /// Is this tag one of the six comparison operators?
    pub fn is_compare(self) -> bool {
        matches!(
            self,
            IrOp::CompareEq
                | IrOp::CompareNeq
                | IrOp::CompareLt
                | IrOp::CompareLte
                | IrOp::CompareGt
                | IrOp::CompareGte
        )
    }

    /// `AST_OP_IR_INVERSES`: the boolean-inverse comparator, used by
    /// `generate_inverse_jump` to fold a materialize-and-test pair into a
    /// single conditional jump. Returns `None` for non-comparison tags.
    pub fn inverse(self) -> Option<IrOp> {
        Some(match self {
            IrOp::CompareEq => IrOp::CompareNeq,
            IrOp::CompareNeq => IrOp::CompareEq,
            IrOp::CompareLt => IrOp::CompareGte,
            IrOp::CompareLte => IrOp::CompareGt,
            IrOp::CompareGt => IrOp::CompareLte,
            IrOp::CompareGte => IrOp::CompareLt,
            _ => return None,
        })
    }
}

/// One step of the linear IR.
#[derive(Debug, Clone)]
pub enum IrStep {
    /// Defines a jump target. A function label (its name isn't `L<n>`)
    /// additionally marks the start of that function's prologue.
    Label(Id),
    /// Moves the next argument register into `dest`.
    LoadParam { dest: Id },
    /// `dest = op(arg0[, arg1])`. `op == Nop` means a plain copy of
    /// `arg0` into `dest`.
    Assign {
        dest: Id,
        op: IrOp,
        arg0: Operand,
        arg1: Option<Operand>,
    },
    /// Loads an immediate into `dest`.
    LoadConst { dest: Id, value: i64 },
    /// Unconditional jump.
    Jump(Id),
    /// Compare `arg0`/`arg1` and jump to `label` if the comparison holds.
    JumpIf {
        label: Id,
        op: IrOp,
        arg0: Operand,
        arg1: Operand,
    },
    /// Places one actual argument into the next argument register.
    PushArg {
        arg: Operand,
        immediate: bool,
        ty: DataType,
    },
    /// Emits the call sequence for `callee`.
    CallFunc(Id),
    /// Moves the return-value register into `dest`.
    StoreYield { dest: Id },
    /// Marks a function return; the back end produces the epilogue.
    Return(Id),
}

/// One function-local: its declared type, the IR pseudo-address it's
/// bound to, and whether it's a parameter.
#[derive(Debug, Clone, Copy)]
pub struct LocalRecord {
    pub data_type: DataType,
    pub addr: Id,
    pub is_param: bool,
}

/// Per-function local metadata, in declaration order: parameters first,
/// then locals in appearance order, then any synthetic return-temporary.
pub type FuncInfo = Vec<LocalRecord>;
pub type FuncInfoTable = crate::common::Map<Id, FuncInfo>;

pub type StepList = Vec<IrStep>;
