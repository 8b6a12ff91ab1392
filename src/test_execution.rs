//! End-to-end engine tests: hand-assembled programs executed through
//! the fetch-resolve-dispatch loop.

use crate::errors::ZlurkResult;
use crate::instruction::Instruction;
use crate::interpreter::{ExecutionResult, Interpreter};
use crate::test_utils::{
    blank_story, interpreter_with_capture, story_word, SharedBuffer, OBJECT_TABLE, START_PC,
};
use crate::trace::Trace;
use crate::vm::CallFrame;
use crate::zobject;
use test_log::test;

const START: u32 = START_PC as u32;

/// Place `code` at the starting PC of a fresh v3 story.
fn story_with_code(code: &[u8]) -> Vec<u8> {
    let mut story = blank_story(3);
    story[START as usize..START as usize + code.len()].copy_from_slice(code);
    story
}

/// Decode at the PC, advance it, execute; the run loop with the loop
/// unrolled.
fn step(interp: &mut Interpreter) -> ZlurkResult<ExecutionResult> {
    let pc = interp.vm.memory.pc;
    let version = interp.vm.memory.header.version;
    let inst = Instruction::decode(interp.vm.memory.bytes(), pc as usize, version)?;
    interp.vm.memory.pc = pc + inst.size as u32;
    interp.execute_instruction(&inst).map_err(|e| e.at(pc, inst.name))
}

/// Push a routine frame by hand, as if a call had just happened.
fn push_frame(interp: &mut Interpreter, return_store: Option<u8>, locals: &[u16]) {
    let mut frame = CallFrame {
        return_pc: 0x3100,
        return_store,
        num_locals: locals.len() as u8,
        locals: [0; 15],
        stack_floor: interp.vm.stack.len(),
    };
    frame.locals[..locals.len()].copy_from_slice(locals);
    interp.vm.call_stack.push(frame);
}

#[test]
fn test_add_stores_sum_of_variables() {
    // add V03, V04 -> V05 with V03=10, V04=20
    let (mut interp, _) = interpreter_with_capture(story_with_code(&[0x74, 0x03, 0x04, 0x05]));
    let frame = interp.vm.call_stack.last_mut().unwrap();
    frame.num_locals = 5;
    frame.locals[2] = 10;
    frame.locals[3] = 20;

    assert!(matches!(step(&mut interp).unwrap(), ExecutionResult::Continue));
    assert_eq!(interp.vm.read_variable(5).unwrap(), 30);
    assert_eq!(interp.vm.memory.pc, START + 4);
}

#[test]
fn test_signed_arithmetic_wraps_and_divides_toward_zero() {
    // sub #02, #05 -> V10: -3 stored as 0xFFFD
    let (mut interp, _) = interpreter_with_capture(story_with_code(&[0x15, 0x02, 0x05, 0x10]));
    step(&mut interp).unwrap();
    assert_eq!(interp.vm.read_variable(0x10).unwrap(), 0xFFFD);

    // div needs a large constant for -7: variable form of 2OP 0x17.
    // -7 / 2 truncates toward zero: -3.
    let (mut interp, _) = interpreter_with_capture(story_with_code(&[
        0xD7, 0x1F, 0xFF, 0xF9, 0x02, 0x10,
    ]));
    step(&mut interp).unwrap();
    assert_eq!(interp.vm.read_variable(0x10).unwrap() as i16, -3);

    // mod follows the dividend's sign: -7 mod 2 = -1
    let (mut interp, _) = interpreter_with_capture(story_with_code(&[
        0xD8, 0x1F, 0xFF, 0xF9, 0x02, 0x10,
    ]));
    step(&mut interp).unwrap();
    assert_eq!(interp.vm.read_variable(0x10).unwrap() as i16, -1);
}

#[test]
fn test_division_by_zero_faults() {
    let (mut interp, _) = interpreter_with_capture(story_with_code(&[0x17, 0x05, 0x00, 0x10]));
    let err = step(&mut interp).unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert!(format!("{err}").contains("division by zero"));
}

#[test]
fn test_je_rtrue_shortcut_returns_into_caller() {
    // je V01, #01 with a taken branch of offset 1: return true to the
    // caller's store variable.
    let (mut interp, _) = interpreter_with_capture(story_with_code(&[0x41, 0x01, 0x01, 0xC1]));
    interp.vm.call_stack.last_mut().unwrap().num_locals = 8;
    push_frame(&mut interp, Some(0x07), &[1, 0]);

    assert!(matches!(
        step(&mut interp).unwrap(),
        ExecutionResult::Returned(1)
    ));
    assert_eq!(interp.vm.memory.pc, 0x3100);
    assert_eq!(interp.vm.call_depth(), 1);
    assert_eq!(interp.vm.read_variable(0x07).unwrap(), 1);
}

#[test]
fn test_branch_offset_zero_returns_false() {
    // Same branch taken but with offset 0: return false.
    let (mut interp, _) = interpreter_with_capture(story_with_code(&[0x41, 0x01, 0x01, 0xC0]));
    interp.vm.call_stack.last_mut().unwrap().num_locals = 8;
    interp.vm.write_variable(0x07, 0xFFFF).unwrap();
    push_frame(&mut interp, Some(0x07), &[1, 0]);

    step(&mut interp).unwrap();
    assert_eq!(interp.vm.read_variable(0x07).unwrap(), 0);
}

#[test]
fn test_je_never_branches_on_single_operand() {
    // Variable-form je with one operand
    let (mut interp, _) = interpreter_with_capture(story_with_code(&[0xC1, 0x7F, 0x05, 0xC4]));
    assert!(matches!(step(&mut interp).unwrap(), ExecutionResult::Continue));
    assert_eq!(interp.vm.memory.pc, START + 4);
}

#[test]
fn test_je_matches_any_later_operand() {
    // je #05, #03, #05 branches (5 equals the third operand)
    let (mut interp, _) =
        interpreter_with_capture(story_with_code(&[0xC1, 0x57, 0x05, 0x03, 0x05, 0xC4]));
    assert!(matches!(step(&mut interp).unwrap(), ExecutionResult::Branched));
    assert_eq!(interp.vm.memory.pc, START + 6 + 4 - 2);
}

#[test]
fn test_call_enters_routine_with_header_locals() {
    // call #1a39, #0100 -> V10; the routine at 2*0x1a39 declares three
    // locals with initial values, and the argument overwrites the first.
    let mut story = story_with_code(&[0xE0, 0x0F, 0x1A, 0x39, 0x01, 0x00, 0x10]);
    let routine = 2 * 0x1A39usize;
    story[routine] = 3;
    story_word(&mut story, routine + 1, 0x1111);
    story_word(&mut story, routine + 3, 0x2222);
    story_word(&mut story, routine + 5, 0x3333);

    let (mut interp, _) = interpreter_with_capture(story);
    assert!(matches!(step(&mut interp).unwrap(), ExecutionResult::Called));

    assert_eq!(interp.vm.memory.pc, routine as u32 + 1 + 2 * 3);
    assert_eq!(interp.vm.call_depth(), 2);
    let frame = interp.vm.frame().unwrap();
    assert_eq!(frame.num_locals, 3);
    assert_eq!(&frame.locals[..3], &[0x0100, 0x2222, 0x3333]);
    assert_eq!(frame.return_pc, START + 7);
    assert_eq!(frame.return_store, Some(0x10));
}

#[test]
fn test_call_and_return_symmetry() {
    // call a routine that returns its (header-initialised) local;
    // afterwards the PC, the call depth and the stack reflect the caller.
    let mut story = story_with_code(&[0xE0, 0x3F, 0x1A, 0x00, 0x00, 0xBA]);
    let routine = 2 * 0x1A00usize; // 0x3400
    story[routine] = 1;
    story_word(&mut story, routine + 1, 5);
    story[routine + 3] = 0xAB; // ret V01
    story[routine + 4] = 0x01;

    let (mut interp, _) = interpreter_with_capture(story.clone());
    interp.run_with_limit(Some(2)).unwrap();
    assert_eq!(interp.vm.memory.pc, START + 5);
    assert_eq!(interp.vm.call_depth(), 1);
    assert_eq!(interp.vm.stack, vec![5]);

    // And the whole program runs to the quit cleanly.
    let (mut interp, _) = interpreter_with_capture(story);
    interp.run().unwrap();
}

#[test]
fn test_return_restores_stack_floor() {
    // The routine pushes three unbalanced words before returning; the
    // caller's stack height must be unchanged apart from the stored
    // result.
    let mut story = story_with_code(&[0xE0, 0x3F, 0x1A, 0x00, 0x10, 0xBA]);
    let routine = 2 * 0x1A00usize;
    let body = [
        0x00, // no locals
        0xE8, 0x7F, 0x01, // push #01
        0xE8, 0x7F, 0x02, // push #02
        0xE8, 0x7F, 0x03, // push #03
        0xB0, // rtrue
    ];
    story[routine..routine + body.len()].copy_from_slice(&body);

    let (mut interp, _) = interpreter_with_capture(story);
    interp.run().unwrap();
    assert!(interp.vm.stack.is_empty());
    assert_eq!(interp.vm.read_variable(0x10).unwrap(), 1);
}

#[test]
fn test_call_to_address_zero_stores_false() {
    let (mut interp, _) = interpreter_with_capture(story_with_code(&[
        0xE0, 0x3F, 0x00, 0x00, 0x10,
    ]));
    interp.vm.write_variable(0x10, 0xFFFF).unwrap();
    step(&mut interp).unwrap();
    assert_eq!(interp.vm.read_variable(0x10).unwrap(), 0);
    assert_eq!(interp.vm.call_depth(), 1);
    assert_eq!(interp.vm.memory.pc, START + 5);
}

#[test]
fn test_print_inline_literal() {
    // print "hello"; quit
    let (mut interp, captured) = interpreter_with_capture(story_with_code(&[
        0xB2, 0x35, 0x51, 0xC6, 0x85, 0xBA,
    ]));
    interp.run().unwrap();
    assert_eq!(*captured.borrow(), "hello");

    // The PC steps over the whole literal.
    let (mut interp, _) = interpreter_with_capture(story_with_code(&[
        0xB2, 0x35, 0x51, 0xC6, 0x85, 0xBA,
    ]));
    interp.run_with_limit(Some(1)).unwrap();
    assert_eq!(interp.vm.memory.pc, START + 5);
}

#[test]
fn test_print_ret_prints_and_returns_true() {
    let mut story = story_with_code(&[0xE0, 0x3F, 0x1A, 0x00, 0x10, 0xBA]);
    let routine = 2 * 0x1A00usize;
    // print_ret "hello"
    let body = [0x00, 0xB3, 0x35, 0x51, 0xC6, 0x85];
    story[routine..routine + body.len()].copy_from_slice(&body);

    let (mut interp, captured) = interpreter_with_capture(story);
    interp.run().unwrap();
    assert_eq!(*captured.borrow(), "hello\n");
    assert_eq!(interp.vm.read_variable(0x10).unwrap(), 1);
}

#[test]
fn test_inc_chk_branches_after_increment() {
    // inc_chk V02, #0a with V02=10: 11 > 10, branch offset 0 returns
    // false out of the routine.
    let (mut interp, _) = interpreter_with_capture(story_with_code(&[0x05, 0x02, 0x0A, 0xC0]));
    interp.vm.call_stack.last_mut().unwrap().num_locals = 8;
    push_frame(&mut interp, Some(0x08), &[0, 10]);

    assert!(matches!(
        step(&mut interp).unwrap(),
        ExecutionResult::Returned(0)
    ));
    assert_eq!(interp.vm.memory.pc, 0x3100);
    assert_eq!(interp.vm.read_variable(0x08).unwrap(), 0);
}

#[test]
fn test_inc_chk_falls_through_at_threshold() {
    // With V02=9 the incremented value equals the threshold, so no
    // branch; the local keeps its incremented value.
    let (mut interp, _) = interpreter_with_capture(story_with_code(&[0x05, 0x02, 0x0A, 0xC0]));
    interp.vm.call_stack.last_mut().unwrap().num_locals = 8;
    push_frame(&mut interp, Some(0x08), &[0, 9]);

    assert!(matches!(step(&mut interp).unwrap(), ExecutionResult::Continue));
    assert_eq!(interp.vm.memory.pc, START + 4);
    assert_eq!(interp.vm.read_variable(2).unwrap(), 10);
}

#[test]
fn test_dec_chk_branches_below_threshold() {
    // dec_chk V01, #05 with V01=5: 4 < 5 branches; offset 4 lands past
    // the next two bytes.
    let (mut interp, _) = interpreter_with_capture(story_with_code(&[0x04, 0x01, 0x05, 0xC4]));
    push_frame(&mut interp, None, &[5]);
    assert!(matches!(step(&mut interp).unwrap(), ExecutionResult::Branched));
    assert_eq!(interp.vm.memory.pc, START + 4 + 4 - 2);
    assert_eq!(interp.vm.read_variable(1).unwrap(), 4);
}

#[test]
fn test_storew_writes_word_into_array() {
    // storew #1000, #05, #002a
    let (mut interp, _) = interpreter_with_capture(story_with_code(&[
        0xE1, 0x13, 0x10, 0x00, 0x05, 0x00, 0x2A,
    ]));
    step(&mut interp).unwrap();
    assert_eq!(interp.vm.memory.read_word(0x100A).unwrap(), 0x002A);
    assert_eq!(interp.vm.memory.pc, START + 7);
}

#[test]
fn test_storeb_loadw_loadb_round_trip() {
    // The base address 0x1000 needs a large constant, so the loads use
    // the variable form of the 2OP opcodes.
    let (mut interp, _) = interpreter_with_capture(story_with_code(&[
        0xE2, 0x13, 0x10, 0x00, 0x03, 0x00, 0xAB, // storeb #1000, #03, #00ab
        0xD0, 0x1F, 0x10, 0x00, 0x03, 0x10, // loadb #1000, #03 -> V10
        0xCF, 0x1F, 0x10, 0x00, 0x01, 0x11, // loadw #1000, #01 -> V11
    ]));
    step(&mut interp).unwrap();
    assert_eq!(interp.vm.memory.read_byte(0x1003).unwrap(), 0xAB);
    step(&mut interp).unwrap();
    assert_eq!(interp.vm.read_variable(0x10).unwrap(), 0xAB);
    step(&mut interp).unwrap();
    // Word index 1 covers bytes 0x1002-0x1003, whose low byte we wrote.
    assert_eq!(interp.vm.read_variable(0x11).unwrap(), 0x00AB);
}

#[test]
fn test_store_and_load_move_variables() {
    // store #10, #2a then load #10 -> V11; both name variable 0x10
    let (mut interp, _) = interpreter_with_capture(story_with_code(&[
        0x0D, 0x10, 0x2A, // store
        0x9E, 0x10, 0x11, // load
    ]));
    step(&mut interp).unwrap();
    assert_eq!(interp.vm.read_variable(0x10).unwrap(), 0x2A);
    step(&mut interp).unwrap();
    assert_eq!(interp.vm.read_variable(0x11).unwrap(), 0x2A);
}

#[test]
fn test_push_pull_traffic() {
    let (mut interp, _) = interpreter_with_capture(story_with_code(&[
        0xE8, 0x7F, 0x2A, // push #2a
        0xE9, 0x7F, 0x10, // pull V10
    ]));
    step(&mut interp).unwrap();
    assert_eq!(interp.vm.stack, vec![0x2A]);
    step(&mut interp).unwrap();
    assert!(interp.vm.stack.is_empty());
    assert_eq!(interp.vm.read_variable(0x10).unwrap(), 0x2A);
}

#[test]
fn test_jump_is_relative_and_signed() {
    let mut story = story_with_code(&[0xBA]); // quit at START
    story[0x3010] = 0x8C; // jump with large constant
    story[0x3011] = 0xFF;
    story[0x3012] = 0xEF; // -17: back to START
    let (mut interp, _) = interpreter_with_capture(story);
    interp.vm.memory.pc = 0x3010;
    assert!(matches!(step(&mut interp).unwrap(), ExecutionResult::Branched));
    assert_eq!(interp.vm.memory.pc, START);
}

#[test]
fn test_bitwise_and_or() {
    let (mut interp, _) = interpreter_with_capture(story_with_code(&[
        0x09, 0x0F, 0x35, 0x10, // and #0f, #35 -> V10
        0x08, 0x0F, 0x30, 0x11, // or #0f, #30 -> V11
    ]));
    step(&mut interp).unwrap();
    step(&mut interp).unwrap();
    assert_eq!(interp.vm.read_variable(0x10).unwrap(), 0x05);
    assert_eq!(interp.vm.read_variable(0x11).unwrap(), 0x3F);
}

#[test]
fn test_print_num_and_char() {
    let (mut interp, captured) = interpreter_with_capture(story_with_code(&[
        0xE6, 0x7F, 0x2A, // print_num #2a
        0xE5, 0x7F, 0x41, // print_char 'A'
        0xBB, // new_line
        0xBA, // quit
    ]));
    interp.run().unwrap();
    assert_eq!(*captured.borrow(), "42A\n");
}

#[test]
fn test_print_num_is_signed() {
    let (mut interp, captured) = interpreter_with_capture(story_with_code(&[
        0xE6, 0x3F, 0xFF, 0xD6, // print_num #ffd6
        0xBA,
    ]));
    interp.run().unwrap();
    assert_eq!(*captured.borrow(), "-42");
}

#[test]
fn test_random_rolls_within_range() {
    let (mut interp, _) = interpreter_with_capture(story_with_code(&[0xE7, 0x7F, 0x06, 0x10]));
    step(&mut interp).unwrap();
    let value = interp.vm.read_variable(0x10).unwrap();
    assert!((1..=6).contains(&value));
}

#[test]
fn test_random_negative_reseeds_and_stores_zero() {
    let (mut interp, _) = interpreter_with_capture(story_with_code(&[
        0xE7, 0x3F, 0xFF, 0xFF, 0x10,
    ]));
    step(&mut interp).unwrap();
    assert_eq!(interp.vm.read_variable(0x10).unwrap(), 0);
}

fn story_with_one_object(code: &[u8]) -> Vec<u8> {
    let mut story = story_with_code(code);
    let tree = OBJECT_TABLE as usize + 31 * 2;
    story[tree] = 0b0100_0000; // attribute 1
    let props = tree + 9;
    story_word(&mut story, tree + 7, props as u16);
    story[props] = 0; // empty short name
    story[props + 1] = (1 << 5) | 18; // property 18, two bytes
    story_word(&mut story, props + 2, 0xABCD);
    story[props + 4] = 0;
    story
}

#[test]
fn test_test_attr_branches_on_set_attribute() {
    let (mut interp, _) =
        interpreter_with_capture(story_with_one_object(&[0x0A, 0x01, 0x01, 0xC4]));
    assert!(matches!(step(&mut interp).unwrap(), ExecutionResult::Branched));
    assert_eq!(interp.vm.memory.pc, START + 4 + 4 - 2);

    let (mut interp, _) =
        interpreter_with_capture(story_with_one_object(&[0x0A, 0x01, 0x05, 0xC4]));
    assert!(matches!(step(&mut interp).unwrap(), ExecutionResult::Continue));
    assert_eq!(interp.vm.memory.pc, START + 4);
}

#[test]
fn test_set_and_clear_attr() {
    let (mut interp, _) = interpreter_with_capture(story_with_one_object(&[
        0x0B, 0x01, 0x07, // set_attr obj 1, attr 7
        0x0C, 0x01, 0x01, // clear_attr obj 1, attr 1
    ]));
    step(&mut interp).unwrap();
    assert!(zobject::test_attr(&interp.vm.memory, 1, 7).unwrap());
    step(&mut interp).unwrap();
    assert!(!zobject::test_attr(&interp.vm.memory, 1, 1).unwrap());
}

#[test]
fn test_put_prop_rewrites_property() {
    let (mut interp, _) = interpreter_with_capture(story_with_one_object(&[
        0xE3, 0x15, 0x00, 0x01, 0x12, 0x7F,
    ]));
    step(&mut interp).unwrap();
    assert_eq!(zobject::get_property(&interp.vm.memory, 1, 18).unwrap(), 0x7F);
}

#[test]
fn test_put_prop_missing_property_faults() {
    let (mut interp, _) = interpreter_with_capture(story_with_one_object(&[
        0xE3, 0x15, 0x00, 0x01, 0x05, 0x7F,
    ]));
    let err = step(&mut interp).unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert!(format!("{err}").contains("no property"));
}

#[test]
fn test_get_prop_reads_and_defaults() {
    let mut story = story_with_one_object(&[
        0x11, 0x01, 0x12, 0x10, // get_prop obj 1, prop 18 -> V10
        0x11, 0x01, 0x07, 0x11, // get_prop obj 1, prop 7 -> V11 (default)
    ]);
    // Default for property 7
    story_word(&mut story, OBJECT_TABLE as usize + 2 * 6, 0x5555);
    let (mut interp, _) = interpreter_with_capture(story);
    step(&mut interp).unwrap();
    step(&mut interp).unwrap();
    assert_eq!(interp.vm.read_variable(0x10).unwrap(), 0xABCD);
    assert_eq!(interp.vm.read_variable(0x11).unwrap(), 0x5555);
}

#[test]
fn test_unimplemented_opcode_faults_with_exit_2() {
    // sread is outside the core
    let (mut interp, _) = interpreter_with_capture(story_with_code(&[
        0xE4, 0x0F, 0x01, 0x00, 0x02, 0x00,
    ]));
    let err = step(&mut interp).unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert!(format!("{err}").contains("sread"));
}

#[test]
fn test_unknown_opcode_faults_at_decode() {
    let (mut interp, _) = interpreter_with_capture(story_with_code(&[0x00, 0x01, 0x02]));
    let err = step(&mut interp).unwrap_err();
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn test_local_out_of_range_faults() {
    // jz V05 with no locals in scope
    let (mut interp, _) = interpreter_with_capture(story_with_code(&[0xA0, 0x05, 0xC0]));
    let err = step(&mut interp).unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert!(format!("{err}").contains("local"));
}

#[test]
fn test_pop_on_empty_stack_faults() {
    // ret_popped with nothing on the value stack
    let (mut interp, _) = interpreter_with_capture(story_with_code(&[0xB8]));
    let err = step(&mut interp).unwrap_err();
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn test_top_level_return_ends_story() {
    let (mut interp, _) = interpreter_with_capture(story_with_code(&[0xB0]));
    interp.run().unwrap();
    assert_eq!(interp.vm.call_depth(), 0);
}

#[test]
fn test_verify_branches_on_checksum_match() {
    // A zero-length file sums to zero, matching the zero checksum.
    let (mut interp, _) = interpreter_with_capture(story_with_code(&[0xBD, 0xC4]));
    assert!(matches!(step(&mut interp).unwrap(), ExecutionResult::Branched));
    assert_eq!(interp.vm.memory.pc, START + 2 + 4 - 2);

    // A wrong checksum falls through.
    let mut story = story_with_code(&[0xBD, 0xC4]);
    story[0x1C] = 0x12;
    story[0x1D] = 0x34;
    let (mut interp, _) = interpreter_with_capture(story);
    assert!(matches!(step(&mut interp).unwrap(), ExecutionResult::Continue));
}

#[test]
fn test_split_window_is_swallowed() {
    let (mut interp, _) = interpreter_with_capture(story_with_code(&[
        0xEA, 0x7F, 0x01, // split_window 1
        0xEB, 0x7F, 0x00, // set_window 0
        0xBA,
    ]));
    interp.run().unwrap();
}

#[test]
fn test_trace_records_each_instruction() {
    let (writer, buffer) = SharedBuffer::new();
    let (mut interp, _) = interpreter_with_capture(story_with_code(&[
        0xE8, 0x7F, 0x2A, // push #2a
        0xBA, // quit
    ]));
    interp.set_trace(Trace::to_writer(Box::new(writer)));
    interp.run().unwrap();

    let text = String::from_utf8(buffer.borrow().clone()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "03000: e8 7f 2a push #002a");
    assert_eq!(lines[1], "03003: ba quit");
}
