//! Arithmetic and bitwise opcodes. All arithmetic is signed 16-bit
//! two's complement, reduced modulo 2^16 before storing.

use crate::errors::{ZlurkError, ZlurkResult};
use crate::instruction::{Instruction, OperandCount};
use crate::interpreter::{ExecutionResult, Interpreter};

/// Reinterpret a machine word as a signed value: words above 0x7FFF
/// represent `value - 0x10000`.
pub(crate) fn signed(value: u16) -> i16 {
    value as i16
}

pub(crate) fn unsigned(value: i16) -> u16 {
    value as u16
}

impl Interpreter {
    pub(crate) fn execute_math_op(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> ZlurkResult<ExecutionResult> {
        let value = match (inst.operand_count, inst.opcode) {
            (OperandCount::OP2, 0x08) => {
                let (a, b) = self.two_operands(inst, operands)?;
                a | b
            }
            (OperandCount::OP2, 0x09) => {
                let (a, b) = self.two_operands(inst, operands)?;
                a & b
            }
            (OperandCount::OP2, 0x14) => {
                let (a, b) = self.two_operands(inst, operands)?;
                unsigned(signed(a).wrapping_add(signed(b)))
            }
            (OperandCount::OP2, 0x15) => {
                let (a, b) = self.two_operands(inst, operands)?;
                unsigned(signed(a).wrapping_sub(signed(b)))
            }
            (OperandCount::OP2, 0x16) => {
                let (a, b) = self.two_operands(inst, operands)?;
                unsigned(signed(a).wrapping_mul(signed(b)))
            }
            (OperandCount::OP2, 0x17) => {
                let (a, b) = self.two_operands(inst, operands)?;
                if b == 0 {
                    return Err(ZlurkError::DivisionByZero);
                }
                unsigned(signed(a).wrapping_div(signed(b)))
            }
            (OperandCount::OP2, 0x18) => {
                let (a, b) = self.two_operands(inst, operands)?;
                if b == 0 {
                    return Err(ZlurkError::DivisionByZero);
                }
                unsigned(signed(a).wrapping_rem(signed(b)))
            }
            // Bitwise not, 1OP in v1-4 and VAR in v5+
            (OperandCount::OP1, 0x0F) | (OperandCount::VAR, 0x18) => {
                !self.operand(inst, operands, 0)?
            }
            _ => return Err(ZlurkError::Unimplemented(inst.name)),
        };

        self.store_result(inst, value)?;
        Ok(ExecutionResult::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_conversion() {
        assert_eq!(signed(0x0000), 0);
        assert_eq!(signed(0x7FFF), 32767);
        assert_eq!(signed(0x8000), -32768);
        assert_eq!(signed(0xFFFF), -1);
    }

    #[test]
    fn test_unsigned_round_trip() {
        for value in [-32768i16, -1, 0, 1, 32767] {
            assert_eq!(signed(unsigned(value)), value);
        }
    }
}
