use crate::errors::{ZlurkError, ZlurkResult};
use crate::opcode_tables;
use std::fmt::{Display, Error, Formatter, Write};

/// Operand types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    /// Large constant (2 bytes)
    LargeConstant,
    /// Small constant (1 byte)
    SmallConstant,
    /// Variable number
    Variable,
    /// Omitted (not present)
    Omitted,
}

impl OperandType {
    /// Parse operand type from a 2-bit field
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0b00 => OperandType::LargeConstant,
            0b01 => OperandType::SmallConstant,
            0b10 => OperandType::Variable,
            _ => OperandType::Omitted,
        }
    }
}

/// Instruction forms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionForm {
    Long,
    Short,
    Extended,
    Variable,
}

/// Operand count categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandCount {
    /// 0 operands
    OP0,
    /// 1 operand
    OP1,
    /// 2 operands (possibly more when encoded in variable form, e.g. `je`)
    OP2,
    /// Variable number of operands (0-8)
    VAR,
}

impl OperandCount {
    fn encoding(&self) -> &'static str {
        match self {
            OperandCount::OP0 => "0OP",
            OperandCount::OP1 => "1OP",
            OperandCount::OP2 => "2OP",
            OperandCount::VAR => "VAR",
        }
    }
}

/// Branch descriptor trailing a branch instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchInfo {
    /// Branch when the condition matches this polarity.
    pub on_true: bool,
    /// Offset relative to the instruction after the branch data.
    /// 0 and 1 mean "return false" / "return true" instead of a jump.
    pub offset: i16,
}

/// A decoded Z-Machine instruction.
///
/// A pure value record: it holds raw operand values, not resolved ones,
/// and raw encoded text words, not characters. Resolution against the
/// variable file and text decoding both happen at execute time.
#[derive(Debug, Clone)]
pub struct Instruction {
    /// Address the instruction was decoded from
    pub addr: u32,
    /// Opcode number within its operand-count set
    pub opcode: u8,
    /// Second opcode byte for extended-form instructions
    pub ext_opcode: Option<u8>,
    pub form: InstructionForm,
    pub operand_count: OperandCount,
    /// Mnemonic from the opcode catalogue
    pub name: &'static str,
    /// Operand types, in operand order (up to 8)
    pub operand_types: Vec<OperandType>,
    /// Raw operand values; `Variable` operands hold the variable number
    pub operands: Vec<u16>,
    /// Variable to store the result into, if the opcode stores
    pub store_var: Option<u8>,
    /// Branch descriptor, if the opcode branches
    pub branch: Option<BranchInfo>,
    /// Raw encoded words of the inline string for `print`/`print_ret`
    pub text_words: Option<Vec<u16>>,
    /// Total size of the instruction in bytes
    pub size: usize,
}

impl Instruction {
    /// Decode one instruction from the image at the given address.
    pub fn decode(memory: &[u8], addr: usize, version: u8) -> ZlurkResult<Self> {
        let start = addr as u32;
        let byte_at = |offset: usize| -> ZlurkResult<u8> {
            memory
                .get(offset)
                .copied()
                .ok_or(ZlurkError::InstructionOverrun(start))
        };

        let mut offset = addr;
        let opcode_byte = byte_at(offset)?;
        offset += 1;

        // Form comes from the top bits of the first byte, except for the
        // extended marker 0xBE in v5+.
        let form = if version >= 5 && opcode_byte == 0xBE {
            InstructionForm::Extended
        } else {
            match opcode_byte >> 6 {
                0b11 => InstructionForm::Variable,
                0b10 => InstructionForm::Short,
                _ => InstructionForm::Long,
            }
        };

        let (opcode, ext_opcode, operand_count) = match form {
            InstructionForm::Long => (opcode_byte & 0x1F, None, OperandCount::OP2),
            InstructionForm::Short => {
                let operand_count = if (opcode_byte >> 4) & 0x03 == 0x03 {
                    OperandCount::OP0
                } else {
                    OperandCount::OP1
                };
                (opcode_byte & 0x0F, None, operand_count)
            }
            InstructionForm::Variable => {
                let operand_count = if opcode_byte & 0x20 == 0 {
                    OperandCount::OP2
                } else {
                    OperandCount::VAR
                };
                (opcode_byte & 0x1F, None, operand_count)
            }
            InstructionForm::Extended => {
                let ext = byte_at(offset)?;
                offset += 1;
                (opcode_byte, Some(ext), OperandCount::VAR)
            }
        };

        let name = opcode_tables::instruction_name(opcode, ext_opcode, form, operand_count, version)
            .ok_or(ZlurkError::UnknownOpcode {
                encoding: operand_count.encoding(),
                number: ext_opcode.unwrap_or(opcode),
                version,
            })?;

        // Operand types
        let mut operand_types = Vec::new();
        match form {
            InstructionForm::Long => {
                // Bit 6 types the first operand, bit 5 the second.
                // Long-form operands are never large constants.
                for bit in [0x40, 0x20] {
                    operand_types.push(if opcode_byte & bit != 0 {
                        OperandType::Variable
                    } else {
                        OperandType::SmallConstant
                    });
                }
            }
            InstructionForm::Short => {
                if operand_count == OperandCount::OP1 {
                    operand_types.push(OperandType::from_bits((opcode_byte >> 4) & 0x03));
                }
            }
            InstructionForm::Variable | InstructionForm::Extended => {
                let mut type_bytes = vec![byte_at(offset)?];
                offset += 1;
                if opcode_tables::takes_double_type_byte(opcode, form, operand_count) {
                    type_bytes.push(byte_at(offset)?);
                    offset += 1;
                }

                // Four 2-bit fields per byte, high to low; the first
                // omitted field ends the list.
                'fields: for type_byte in type_bytes {
                    for shift in [6u8, 4, 2, 0] {
                        let operand_type = OperandType::from_bits(type_byte >> shift);
                        if operand_type == OperandType::Omitted {
                            break 'fields;
                        }
                        operand_types.push(operand_type);
                    }
                }
            }
        }

        // Operand values, left to right
        let mut operands = Vec::with_capacity(operand_types.len());
        for operand_type in &operand_types {
            match operand_type {
                OperandType::LargeConstant => {
                    let high = byte_at(offset)?;
                    let low = byte_at(offset + 1)?;
                    operands.push(((high as u16) << 8) | low as u16);
                    offset += 2;
                }
                OperandType::SmallConstant | OperandType::Variable => {
                    operands.push(byte_at(offset)? as u16);
                    offset += 1;
                }
                OperandType::Omitted => unreachable!("omitted operands never reach the list"),
            }
        }

        let store_var =
            if opcode_tables::stores_result(opcode, ext_opcode, form, operand_count, version) {
                let var = byte_at(offset)?;
                offset += 1;
                Some(var)
            } else {
                None
            };

        let branch = if opcode_tables::has_branch(opcode, ext_opcode, form, operand_count, version)
        {
            let first = byte_at(offset)?;
            offset += 1;
            let on_true = first & 0x80 != 0;
            let branch_offset = if first & 0x40 != 0 {
                // One-byte form: 6-bit unsigned offset.
                (first & 0x3F) as i16
            } else {
                // Two-byte form: 14-bit offset, sign-extended from bit 13.
                let second = byte_at(offset)?;
                offset += 1;
                let raw = (((first & 0x3F) as i16) << 8) | second as i16;
                if raw & 0x2000 != 0 {
                    raw | 0xC000u16 as i16
                } else {
                    raw
                }
            };
            Some(BranchInfo {
                on_true,
                offset: branch_offset,
            })
        } else {
            None
        };

        // Inline text: encoded words up to and including the first word
        // with the high bit set.
        let text_words =
            if opcode_tables::has_text(opcode, ext_opcode, form, operand_count, version) {
                let mut words = Vec::new();
                loop {
                    let high = byte_at(offset)?;
                    let low = byte_at(offset + 1)?;
                    offset += 2;
                    let word = ((high as u16) << 8) | low as u16;
                    words.push(word);
                    if word & 0x8000 != 0 {
                        break;
                    }
                }
                Some(words)
            } else {
                None
            };

        Ok(Instruction {
            addr: start,
            opcode,
            ext_opcode,
            form,
            operand_count,
            name,
            operand_types,
            operands,
            store_var,
            branch,
            text_words,
            size: offset - addr,
        })
    }
}

impl Display for Instruction {
    /// Disassembly-style rendering: mnemonic, operands, store target,
    /// branch descriptor.
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        let mut line = String::from(self.name);

        for (i, operand) in self.operands.iter().enumerate() {
            line.push_str(if i == 0 { " " } else { ", " });
            match self.operand_types[i] {
                OperandType::Variable => write!(line, "V{operand:02x}")?,
                _ => write!(line, "#{operand:04x}")?,
            }
        }

        if let Some(var) = self.store_var {
            write!(line, " -> V{var:02x}")?;
        }

        if let Some(ref branch) = self.branch {
            write!(
                line,
                " [{}{}]",
                if branch.on_true { "TRUE" } else { "FALSE" },
                match branch.offset {
                    0 => " RFALSE".to_string(),
                    1 => " RTRUE".to_string(),
                    n => format!(" {n:+}"),
                }
            )?;
        }

        f.write_str(&line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operand_type_from_bits() {
        assert_eq!(OperandType::from_bits(0b00), OperandType::LargeConstant);
        assert_eq!(OperandType::from_bits(0b01), OperandType::SmallConstant);
        assert_eq!(OperandType::from_bits(0b10), OperandType::Variable);
        assert_eq!(OperandType::from_bits(0b11), OperandType::Omitted);
    }

    #[test]
    fn test_decode_long_form() {
        // je #34 #78 [TRUE RFALSE]
        let memory = vec![0x41, 0x34, 0x78, 0xC0, 0x00, 0x00];
        let inst = Instruction::decode(&memory, 0, 3).unwrap();
        assert_eq!(inst.form, InstructionForm::Long);
        assert_eq!(inst.operand_count, OperandCount::OP2);
        assert_eq!(inst.name, "je");
        assert_eq!(
            inst.operand_types,
            vec![OperandType::Variable, OperandType::SmallConstant]
        );
        assert_eq!(inst.operands, vec![0x34, 0x78]);
        let branch = inst.branch.unwrap();
        assert!(branch.on_true);
        assert_eq!(branch.offset, 0);
        assert_eq!(inst.size, 4);
    }

    #[test]
    fn test_decode_short_form_jump() {
        // jump #0034
        let memory = vec![0x9C, 0x34, 0x00];
        let inst = Instruction::decode(&memory, 0, 3).unwrap();
        assert_eq!(inst.form, InstructionForm::Short);
        assert_eq!(inst.operand_count, OperandCount::OP1);
        assert_eq!(inst.name, "jump");
        assert_eq!(inst.operands, vec![0x34]);
        assert_eq!(inst.size, 2);
    }

    #[test]
    fn test_decode_short_form_0op() {
        let memory = vec![0xB0];
        let inst = Instruction::decode(&memory, 0, 3).unwrap();
        assert_eq!(inst.operand_count, OperandCount::OP0);
        assert_eq!(inst.name, "rtrue");
        assert_eq!(inst.size, 1);
    }

    #[test]
    fn test_decode_variable_form_call() {
        // call #1234, V01, V02, V03 -> V00
        let memory = vec![0xE0, 0x2A, 0x12, 0x34, 0x01, 0x02, 0x03, 0x00];
        let inst = Instruction::decode(&memory, 0, 3).unwrap();
        assert_eq!(inst.form, InstructionForm::Variable);
        assert_eq!(inst.operand_count, OperandCount::VAR);
        assert_eq!(inst.name, "call");
        assert_eq!(inst.operands, vec![0x1234, 0x01, 0x02, 0x03]);
        assert_eq!(inst.store_var, Some(0x00));
        assert_eq!(inst.size, 8);
    }

    #[test]
    fn test_operand_type_byte_truth_table() {
        // storew with type byte 0b00_01_10_11: Large, Small, Variable,
        // terminated at the fourth field.
        let memory = vec![0xE1, 0b0001_1011, 0x10, 0x00, 0x05, 0x07];
        let inst = Instruction::decode(&memory, 0, 3).unwrap();
        assert_eq!(
            inst.operand_types,
            vec![
                OperandType::LargeConstant,
                OperandType::SmallConstant,
                OperandType::Variable
            ]
        );

        // 0b11_00_00_00 terminates immediately: no operands.
        let memory = vec![0xE0, 0b1100_0000, 0x00];
        let inst = Instruction::decode(&memory, 0, 3).unwrap();
        assert!(inst.operand_types.is_empty());
        assert!(inst.operands.is_empty());

        // 0b00_00_00_00 yields four large constants.
        let memory = vec![0xE0, 0x00, 0x10, 0x00, 0x10, 0x02, 0x10, 0x04, 0x10, 0x06, 0x00];
        let inst = Instruction::decode(&memory, 0, 3).unwrap();
        assert_eq!(inst.operand_types, vec![OperandType::LargeConstant; 4]);
        assert_eq!(inst.operands, vec![0x1000, 0x1002, 0x1004, 0x1006]);
    }

    #[test]
    fn test_branch_descriptor_two_byte_negative() {
        // jz V05 with branch bytes 3F FF: on_false, offset -1.
        let memory = vec![0xA0, 0x05, 0x3F, 0xFF];
        let inst = Instruction::decode(&memory, 0, 3).unwrap();
        let branch = inst.branch.unwrap();
        assert!(!branch.on_true);
        assert_eq!(branch.offset, -1);
        assert_eq!(inst.size, 4);
    }

    #[test]
    fn test_branch_descriptor_one_byte_rfalse() {
        // jz V05 with branch byte C0: on_true, offset 0 (return false).
        let memory = vec![0xA0, 0x05, 0xC0, 0x00];
        let inst = Instruction::decode(&memory, 0, 3).unwrap();
        let branch = inst.branch.unwrap();
        assert!(branch.on_true);
        assert_eq!(branch.offset, 0);
        assert_eq!(inst.size, 3);
    }

    #[test]
    fn test_decode_inline_text() {
        // print followed by two encoded words, second with the high bit.
        let memory = vec![0xB2, 0x35, 0x51, 0xC6, 0x85];
        let inst = Instruction::decode(&memory, 0, 3).unwrap();
        assert_eq!(inst.name, "print");
        assert_eq!(inst.text_words, Some(vec![0x3551, 0xC685]));
        assert_eq!(inst.size, 5);
    }

    #[test]
    fn test_double_type_byte_call() {
        // call_vs2 in v5 with 8 small-constant operands.
        let memory = vec![
            0xEC, // VAR form, opcode 0x0C
            0b0101_0101,
            0b0101_0101, // two type bytes, all small constants
            1, 2, 3, 4, 5, 6, 7, 8,
            0x00, // store
        ];
        let inst = Instruction::decode(&memory, 0, 5).unwrap();
        assert_eq!(inst.name, "call_vs2");
        assert_eq!(inst.operands, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(inst.store_var, Some(0));
        assert_eq!(inst.size, 12);
    }

    #[test]
    fn test_extended_form_gated_by_version() {
        // 0xBE is only the extended marker in v5+.
        let memory = vec![0xBE, 0x02, 0b0101_1111, 0x03, 0x02, 0x00];
        let inst = Instruction::decode(&memory, 0, 5).unwrap();
        assert_eq!(inst.form, InstructionForm::Extended);
        assert_eq!(inst.name, "log_shift");
        assert_eq!(inst.ext_opcode, Some(0x02));
        assert_eq!(inst.operands, vec![0x03, 0x02]);
        assert_eq!(inst.store_var, Some(0x00));
        assert_eq!(inst.size, 6);
    }

    #[test]
    fn test_unknown_opcode_is_decode_fault() {
        // 2OP 0x00 does not exist.
        let memory = vec![0x00, 0x01, 0x02];
        assert!(matches!(
            Instruction::decode(&memory, 0, 3),
            Err(crate::errors::ZlurkError::UnknownOpcode { .. })
        ));
    }

    #[test]
    fn test_truncated_instruction_is_decode_fault() {
        // call with a large operand cut off by the end of memory.
        let memory = vec![0xE0, 0x2A, 0x12];
        assert!(matches!(
            Instruction::decode(&memory, 0, 3),
            Err(crate::errors::ZlurkError::InstructionOverrun(_))
        ));
    }

    #[test]
    fn test_catalogue_round_trip() {
        // Hand-assembled byte sequences for the v3 catalogue; each must
        // decode to the expected mnemonic and consume the expected length.
        let cases: &[(&[u8], &str, usize)] = &[
            (&[0x54, 0x03, 0x04, 0x05], "add", 4),
            (&[0x55, 0x03, 0x04, 0x05], "sub", 4),
            (&[0x56, 0x03, 0x04, 0x05], "mul", 4),
            (&[0x57, 0x03, 0x04, 0x05], "div", 4),
            (&[0x58, 0x03, 0x04, 0x05], "mod", 4),
            (&[0x48, 0x03, 0x04, 0x05], "or", 4),
            (&[0x49, 0x03, 0x04, 0x05], "and", 4),
            (&[0x41, 0x01, 0x02, 0xC0], "je", 4),
            (&[0x42, 0x01, 0x02, 0xC0], "jl", 4),
            (&[0x43, 0x01, 0x02, 0xC0], "jg", 4),
            (&[0x44, 0x01, 0x02, 0xC0], "dec_chk", 4),
            (&[0x45, 0x01, 0x02, 0xC0], "inc_chk", 4),
            (&[0x46, 0x01, 0x02, 0xC0], "jin", 4),
            (&[0x47, 0x01, 0x02, 0xC0], "test", 4),
            (&[0x4A, 0x01, 0x02, 0xC0], "test_attr", 4),
            (&[0x4B, 0x01, 0x02], "set_attr", 3),
            (&[0x4C, 0x01, 0x02], "clear_attr", 3),
            (&[0x4D, 0x01, 0x02], "store", 3),
            (&[0x4F, 0x01, 0x02, 0x05], "loadw", 4),
            (&[0x50, 0x01, 0x02, 0x05], "loadb", 4),
            (&[0x51, 0x01, 0x02, 0x05], "get_prop", 4),
            (&[0xA0, 0x05, 0xC0], "jz", 3),
            (&[0x9B, 0x01], "ret", 2),
            (&[0x9C, 0x34], "jump", 2),
            (&[0xB0], "rtrue", 1),
            (&[0xB1], "rfalse", 1),
            (&[0xB2, 0x94, 0xA5], "print", 3),
            (&[0xB3, 0x94, 0xA5], "print_ret", 3),
            (&[0xBB], "new_line", 1),
            (&[0xBA], "quit", 1),
            (&[0xB8], "ret_popped", 1),
            (&[0xE0, 0x3F, 0x12, 0x34, 0x00], "call", 5),
            (&[0xE1, 0x17, 0x10, 0x00, 0x05, 0x2A], "storew", 6),
            (&[0xE2, 0x17, 0x10, 0x00, 0x05, 0x2A], "storeb", 6),
            (&[0xE3, 0x17, 0x01, 0x00, 0x12, 0x07], "put_prop", 6),
            (&[0xE5, 0x7F, 0x41], "print_char", 3),
            (&[0xE6, 0x7F, 0x2A], "print_num", 3),
            (&[0xE7, 0x7F, 0x64, 0x00], "random", 4),
            (&[0xE8, 0x7F, 0x2A], "push", 3),
            (&[0xE9, 0x7F, 0x10], "pull", 3),
        ];
        for (bytes, name, size) in cases {
            let inst = Instruction::decode(bytes, 0, 3)
                .unwrap_or_else(|e| panic!("decoding {name}: {e}"));
            assert_eq!(inst.name, *name);
            assert_eq!(inst.size, *size, "length of {name}");
        }
    }

    #[test]
    fn test_v5_call_variants_decode() {
        let cases: &[(&[u8], &str)] = &[
            (&[0xF9, 0x3F, 0x12, 0x34], "call_vn"),
            (&[0xFA, 0x3F, 0xFF, 0x12, 0x34], "call_vn2"),
            (&[0xEC, 0x3F, 0xFF, 0x12, 0x34, 0x00], "call_vs2"),
        ];
        for (bytes, name) in cases {
            let inst = Instruction::decode(bytes, 0, 5).unwrap();
            assert_eq!(inst.name, *name);
        }
    }

    #[test]
    fn test_display_formatting() {
        let memory = vec![0x54, 0x03, 0x04, 0x05];
        let inst = Instruction::decode(&memory, 0, 3).unwrap();
        assert_eq!(format!("{inst}"), "add V03, #0004 -> V05");

        let memory = vec![0xA0, 0x05, 0xC1];
        let inst = Instruction::decode(&memory, 0, 3).unwrap();
        assert_eq!(format!("{inst}"), "jz V05 [TRUE RTRUE]");
    }
}
