//! End-to-end-through-the-back-end checks: parse a small C-like source,
//! lower it, and assert on properties of the emitted GAS text. Scenario
//! coverage that needs
//! only `compile_source` lives in `tests/end_to_end.rs`; these stay here
//! because they dig into the stack-slot/register shape the back end
//! chose, which only this module's own helpers can name.

use super::*;
use crate::front;

fn emit_lines(src: &str) -> Vec<String> {
    let program = front::parse(src).expect("source parses");
    crate::code_gen(&program).expect("codegen succeeds")
}

fn joined(src: &str) -> String {
    emit_lines(src).concat()
}

#[test]
fn scenario_a_simple_add_function() {
    let asm = joined("int f(int x) { return x + 1; }");
    assert!(asm.contains(".global f\n"));
    assert!(asm.contains("f:\n"));
    assert!(asm.contains("addl $1,"));
    assert!(asm.contains("movl "));
    assert!(asm.contains("%eax"));
    assert!(asm.trim_end().ends_with("ret"));
}

#[test]
fn scenario_b_local_variable_gets_a_stack_slot() {
    let asm = joined("int g() { int a = 2; return a; }");
    assert!(asm.contains("-4(%rbp)"));
    assert!(asm.contains("movl $2, -4(%rbp)"));
}

#[test]
fn scenario_c_if_materializes_the_condition_and_tests_it_for_zero() {
    // `if` lowers the condition to a value (via `cmovl`) and then emits a
    // single `JumpIf(COMPARE_EQ, 0, cond)` to skip the true branch — no
    // inverse-jump folding, which is only used inside `&&`/`||`.
    let asm = joined("int h(int a, int b) { if (a < b) return 1; return 0; }");
    assert!(asm.contains("cmpl "));
    assert!(asm.contains("cmovl $1,"));
    assert!(asm.contains("je L"));
}

#[test]
fn scenario_d_logical_and_short_circuits_through_two_jumps() {
    let asm = joined("int i(int a) { return a && a; }");
    let jump_count = asm.matches("\tje L").count() + asm.matches("\tjne L").count();
    assert!(jump_count >= 2, "expected at least two inverse-jumps, got:\n{asm}");
    assert!(asm.contains("$1,"));
    assert!(asm.contains("$0,"));
}

#[test]
fn scenario_e_seventh_concurrent_argument_register_is_rejected() {
    let program = front::parse(
        "int j(int a, int b, int c, int d, int e, int f, int g) { return g; }",
    )
    .expect("source parses");
    let err = crate::code_gen(&program).expect_err("a 7th parameter has no argument register");
    assert!(matches!(err, crate::CompileError::TooManyArguments { .. }));
}

#[test]
fn scenario_f_call_site_follows_the_abi() {
    let asm = joined("int f(int x) { return x; } int k() { return f(1); }");
    assert!(asm.contains("movl $1, %edi"));
    assert!(asm.contains("xor %rax, %rax"));
    assert!(asm.contains("pushq %r10"));
    assert!(asm.contains("pushq %r11"));
    assert!(asm.contains("popq %r11"));
    assert!(asm.contains("popq %r10"));
    assert!(asm.contains("call f"));
}

#[test]
fn callee_saved_push_order_is_r12_through_r15_only() {
    let asm = joined("int f(int x) { return x; }");
    let prologue_end = asm.find("subq").expect("prologue has a frame-size subtraction");
    let tail = &asm[prologue_end..];
    let positions: Vec<usize> = ["%r12", "%r13", "%r14", "%r15"]
        .iter()
        .map(|r| tail.find(&format!("pushq {r}")).expect("every callee-saved register is pushed"))
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "pushes must appear in r12..r15 order: {positions:?}");
    assert!(!asm.contains("pushq %rbx"), "rbx is never callee-saved, per spec");
}

#[test]
fn frame_size_subtracted_from_rsp_is_16_byte_aligned() {
    let asm = joined("int g() { int a = 1; return a; }");
    let line = asm
        .lines()
        .find(|l| l.contains("subq") && l.contains("%rsp"))
        .expect("prologue subtracts from %rsp, not %rbp");
    let amount: i32 = line
        .trim()
        .trim_start_matches("subq $")
        .trim_end_matches(", %rsp")
        .parse()
        .expect("subq operand is a plain immediate");
    assert_eq!(amount % 16, 0);
}

#[test]
fn multiply_and_divide_avoid_bare_nop() {
    let asm = joined("int f(int a, int b) { int c = a * b; int d = a / b; return c; }");
    assert!(asm.contains("imul"));
    assert!(asm.contains("idiv"));
    assert!(!asm.lines().any(|l| l.trim() == "nop"));
}

#[test]
fn deeply_nested_expression_compiles_without_register_exhaustion_panicking() {
    // A balanced tree of eight leaves keeps up to a few partial sums live
    // at once; this doesn't force a spill (see `registers::tests` for
    // that in isolation) but it does exercise `dest_location` reusing
    // freed registers across a realistic mix of live ranges.
    let src = "int f(int a, int b, int c, int d, int e, int g) {\n\
               return ((a + b) + (c + d)) + (e + g);\n\
               }";
    let asm = joined(src);
    assert!(asm.trim_end().ends_with("ret"));
}
