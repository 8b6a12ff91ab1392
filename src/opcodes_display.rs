//! Text-producing opcodes. Inline literals and memory strings are
//! decoded here, at execute time, and handed to the screen sink.

use crate::errors::{ZlurkError, ZlurkResult};
use crate::instruction::{Instruction, OperandCount};
use crate::interpreter::{ExecutionResult, Interpreter};
use crate::opcodes_math::signed;
use crate::text;

impl Interpreter {
    pub(crate) fn execute_display_op(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> ZlurkResult<ExecutionResult> {
        let abbrev_table = self.vm.memory.header.abbrev_table as usize;
        match (inst.operand_count, inst.opcode) {
            (OperandCount::OP0, 0x02) => {
                let words = inst.text_words.as_deref().unwrap_or(&[]);
                let string = text::decode_words(words, self.vm.memory.bytes(), abbrev_table)?;
                self.print_text(&string)?;
                Ok(ExecutionResult::Continue)
            }
            (OperandCount::OP0, 0x03) => {
                // print_ret: print, newline, return true
                let words = inst.text_words.as_deref().unwrap_or(&[]);
                let string = text::decode_words(words, self.vm.memory.bytes(), abbrev_table)?;
                self.print_text(&string)?;
                self.print_text("\n")?;
                self.do_return(1)
            }
            (OperandCount::OP0, 0x0B) => {
                self.print_text("\n")?;
                Ok(ExecutionResult::Continue)
            }
            (OperandCount::OP1, 0x07) => {
                // print_addr: string at a byte address
                let addr = self.operand(inst, operands, 0)?;
                let (string, _) =
                    text::decode_string(self.vm.memory.bytes(), addr as usize, abbrev_table)?;
                self.print_text(&string)?;
                Ok(ExecutionResult::Continue)
            }
            (OperandCount::OP1, 0x0D) => {
                // print_paddr: string at a packed address
                let packed = self.operand(inst, operands, 0)?;
                let addr = self.vm.memory.unpack_string(packed);
                let (string, _) =
                    text::decode_string(self.vm.memory.bytes(), addr as usize, abbrev_table)?;
                self.print_text(&string)?;
                Ok(ExecutionResult::Continue)
            }
            (OperandCount::VAR, 0x05) => {
                // print_char: unmapped ZSCII codes are dropped, not faults
                let code = self.operand(inst, operands, 0)?;
                if let Some(c) = text::zscii_to_char(code) {
                    self.screen.print_char(c)?;
                }
                Ok(ExecutionResult::Continue)
            }
            (OperandCount::VAR, 0x06) => {
                let value = self.operand(inst, operands, 0)?;
                self.print_text(&signed(value).to_string())?;
                Ok(ExecutionResult::Continue)
            }
            _ => Err(ZlurkError::Unimplemented(inst.name)),
        }
    }
}
