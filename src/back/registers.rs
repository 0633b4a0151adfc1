//! Physical-register bookkeeping: a general pool used for intermediate
//! values and an argument pool used to stage call arguments.
//!
//! Grounded on `gas_gen.py`'s `RegisterAllocator`, with one correction:
//! the original's `salvage_oldest_reg` silently reassigns the oldest
//! register without telling the caller who used to own it, corrupting
//! that address's backing storage. Here,
//! exhausting the general pool returns the evicted owner so the caller
//! (`back::asm::GasEmitter`, which owns the IR-address→location maps) can
//! spill its value to the stack before reusing the register.

use std::collections::VecDeque;

use crate::common::{Id, Map};

use super::asm::Register;

pub const GENERAL_REGS: [Register; 7] = [
    Register::R10,
    Register::R11,
    Register::Rbx,
    Register::R12,
    Register::R13,
    Register::R14,
    Register::R15,
];

pub const ARG_REGS: [Register; 6] = [
    Register::Rdi,
    Register::Rsi,
    Register::Rdx,
    Register::Rcx,
    Register::R8,
    Register::R9,
];

/// The result of requesting a general-purpose register.
pub enum GeneralAlloc {
    /// A free register, no spill required.
    Free(Register),
    /// The pool was full; `register` was reclaimed from `evicted`, whose
    /// value the caller must move to a stack slot before using it.
    Spill { register: Register, evicted: Id },
}

pub struct RegisterAllocator {
    general_used: Map<Register, bool>,
    general_owner: Map<Register, Id>,
    general_lru: VecDeque<Register>,
    arg_used: Map<Register, bool>,
    arg_lru: VecDeque<Register>,
}

impl RegisterAllocator {
    pub fn new() -> Self {
        let mut general_used = Map::new();
        for &reg in &GENERAL_REGS {
            general_used.insert(reg, false);
        }
        let mut arg_used = Map::new();
        for &reg in &ARG_REGS {
            arg_used.insert(reg, false);
        }

        RegisterAllocator {
            general_used,
            general_owner: Map::new(),
            general_lru: VecDeque::new(),
            arg_used,
            arg_lru: VecDeque::new(),
        }
    }

    /// Claim a general-purpose register for `owner`. Evicts and reports the
    /// least-recently-allocated register's previous owner if the pool is
    /// full.
    pub fn allocate_general(&mut self, owner: Id) -> GeneralAlloc {
        for &reg in &GENERAL_REGS {
            if !self.general_used[&reg] {
                self.general_used.insert(reg, true);
                self.general_owner.insert(reg, owner);
                self.general_lru.push_back(reg);
                return GeneralAlloc::Free(reg);
            }
        }

        let reg = self
            .general_lru
            .pop_front()
            .expect("the general pool always has at least one register");
        let evicted = *self
            .general_owner
            .get(&reg)
            .expect("every register in the LRU queue has a recorded owner");
        self.general_owner.insert(reg, owner);
        self.general_lru.push_back(reg);
        GeneralAlloc::Spill { register: reg, evicted }
    }

    pub fn release_general(&mut self, reg: Register) {
        self.general_used.insert(reg, false);
        self.general_owner.remove(&reg);
        self.general_lru.retain(|&r| r != reg);
    }

    /// Claim the next free argument register, in ABI order. `None` means
    /// all 6 are in use — stack-passed arguments are unsupported.
    pub fn allocate_arg(&mut self) -> Option<Register> {
        for &reg in &ARG_REGS {
            if !self.arg_used[&reg] {
                self.arg_used.insert(reg, true);
                self.arg_lru.push_back(reg);
                return Some(reg);
            }
        }
        None
    }

    pub fn release_arg(&mut self, reg: Register) {
        self.arg_used.insert(reg, false);
        self.arg_lru.retain(|&r| r != reg);
    }

    /// Drop all bookkeeping for both pools. Called once a function's
    /// epilogue has been emitted.
    pub fn release_all(&mut self) {
        for used in self.general_used.values_mut() {
            *used = false;
        }
        self.general_owner.clear();
        self.general_lru.clear();
        for used in self.arg_used.values_mut() {
            *used = false;
        }
        self.arg_lru.clear();
    }
}

impl Default for RegisterAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Id {
        Id::new(s.to_string())
    }

    #[test]
    fn exhausting_the_general_pool_reports_the_evicted_owner() {
        let mut alloc = RegisterAllocator::new();
        let mut owners = Vec::new();
        for n in 0..GENERAL_REGS.len() {
            match alloc.allocate_general(id(&format!("t{n}"))) {
                GeneralAlloc::Free(reg) => owners.push(reg),
                GeneralAlloc::Spill { .. } => panic!("pool should not be full yet"),
            }
        }

        match alloc.allocate_general(id("t_overflow")) {
            GeneralAlloc::Free(_) => panic!("the pool is full, this must spill"),
            GeneralAlloc::Spill { register, evicted } => {
                assert_eq!(register, owners[0], "the least-recently-allocated register is reused");
                assert_eq!(evicted, id("t0"), "the caller must be told who used to own it");
            }
        }
    }

    #[test]
    fn releasing_a_register_makes_it_available_again() {
        let mut alloc = RegisterAllocator::new();
        let reg = match alloc.allocate_general(id("a")) {
            GeneralAlloc::Free(reg) => reg,
            GeneralAlloc::Spill { .. } => unreachable!(),
        };
        alloc.release_general(reg);
        for n in 0..GENERAL_REGS.len() {
            match alloc.allocate_general(id(&format!("b{n}"))) {
                GeneralAlloc::Free(_) => {}
                GeneralAlloc::Spill { .. } => panic!("one slot was freed, so this must not spill"),
            }
        }
    }

    #[test]
    fn the_seventh_concurrent_argument_register_is_refused() {
        let mut alloc = RegisterAllocator::new();
        for _ in 0..ARG_REGS.len() {
            assert!(alloc.allocate_arg().is_some());
        }
        assert!(alloc.allocate_arg().is_none());
    }

    #[test]
    fn release_all_clears_both_pools() {
        let mut alloc = RegisterAllocator::new();
        alloc.allocate_general(id("a"));
        alloc.allocate_arg();
        alloc.release_all();
        assert!(matches!(alloc.allocate_general(id("b")), GeneralAlloc::Free(_)));
        assert!(alloc.allocate_arg().is_some());
    }
}
