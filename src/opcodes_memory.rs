//! Loads, stores, variable traffic, and the increment/decrement
//! family. Array addresses wrap within the 64 KiB space so negative
//! word offsets behave.

use crate::errors::{ZlurkError, ZlurkResult};
use crate::instruction::{Instruction, OperandCount};
use crate::interpreter::{ExecutionResult, Interpreter};
use crate::opcodes_math::signed;

impl Interpreter {
    pub(crate) fn execute_memory_op(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> ZlurkResult<ExecutionResult> {
        match (inst.operand_count, inst.opcode) {
            (OperandCount::OP2, 0x04) => {
                // dec_chk: decrement the named variable, branch if it
                // went below the threshold (signed)
                let (var, threshold) = self.two_operands(inst, operands)?;
                let value = self.step_variable(var as u8, -1)?;
                self.do_branch(inst, signed(value) < signed(threshold))
            }
            (OperandCount::OP2, 0x05) => {
                // inc_chk
                let (var, threshold) = self.two_operands(inst, operands)?;
                let value = self.step_variable(var as u8, 1)?;
                self.do_branch(inst, signed(value) > signed(threshold))
            }
            (OperandCount::OP2, 0x0D) => {
                // store: the first operand names the variable
                let (var, value) = self.two_operands(inst, operands)?;
                self.vm.write_variable(var as u8, value)?;
                Ok(ExecutionResult::Continue)
            }
            (OperandCount::OP2, 0x0F) => {
                // loadw
                let (array, index) = self.two_operands(inst, operands)?;
                let addr = array.wrapping_add(index.wrapping_mul(2)) as u32;
                let value = self.vm.memory.read_word(addr)?;
                self.store_result(inst, value)?;
                Ok(ExecutionResult::Continue)
            }
            (OperandCount::OP2, 0x10) => {
                // loadb
                let (array, index) = self.two_operands(inst, operands)?;
                let addr = array.wrapping_add(index) as u32;
                let value = self.vm.memory.read_byte(addr)? as u16;
                self.store_result(inst, value)?;
                Ok(ExecutionResult::Continue)
            }
            (OperandCount::OP1, 0x05) => {
                let var = self.operand(inst, operands, 0)?;
                self.step_variable(var as u8, 1)?;
                Ok(ExecutionResult::Continue)
            }
            (OperandCount::OP1, 0x06) => {
                let var = self.operand(inst, operands, 0)?;
                self.step_variable(var as u8, -1)?;
                Ok(ExecutionResult::Continue)
            }
            (OperandCount::OP1, 0x0E) => {
                // load: fetch the named variable's value
                let var = self.operand(inst, operands, 0)?;
                let value = self.vm.read_variable(var as u8)?;
                self.store_result(inst, value)?;
                Ok(ExecutionResult::Continue)
            }
            (OperandCount::VAR, 0x01) => {
                // storew
                let array = self.operand(inst, operands, 0)?;
                let index = self.operand(inst, operands, 1)?;
                let value = self.operand(inst, operands, 2)?;
                let addr = array.wrapping_add(index.wrapping_mul(2)) as u32;
                self.vm.memory.write_word(addr, value)?;
                Ok(ExecutionResult::Continue)
            }
            (OperandCount::VAR, 0x02) => {
                // storeb
                let array = self.operand(inst, operands, 0)?;
                let index = self.operand(inst, operands, 1)?;
                let value = self.operand(inst, operands, 2)?;
                let addr = array.wrapping_add(index) as u32;
                self.vm.memory.write_byte(addr, value as u8)?;
                Ok(ExecutionResult::Continue)
            }
            (OperandCount::VAR, 0x08) => {
                let value = self.operand(inst, operands, 0)?;
                self.vm.push(value)?;
                Ok(ExecutionResult::Continue)
            }
            (OperandCount::VAR, 0x09) => {
                // pull into the named variable
                let var = self.operand(inst, operands, 0)?;
                let value = self.vm.pop()?;
                self.vm.write_variable(var as u8, value)?;
                Ok(ExecutionResult::Continue)
            }
            _ => Err(ZlurkError::Unimplemented(inst.name)),
        }
    }

    /// Add `delta` to a variable, wrapping, and return the new value.
    fn step_variable(&mut self, var: u8, delta: i16) -> ZlurkResult<u16> {
        let value = self.vm.read_variable(var)?.wrapping_add(delta as u16);
        self.vm.write_variable(var, value)?;
        Ok(value)
    }
}
