//! The opcode catalogue: for a `(form, operand count, opcode number,
//! version)` key, what is the instruction called, does it store a result,
//! does it branch, and is it followed by inline text?
//!
//! The decoder consults this table; an unknown key is a decode fault.

use crate::instruction::{InstructionForm, OperandCount};

/// Get the name of an opcode, or `None` if the combination does not exist
/// in the given version.
pub fn instruction_name(
    opcode: u8,
    ext_opcode: Option<u8>,
    form: InstructionForm,
    operand_count: OperandCount,
    version: u8,
) -> Option<&'static str> {
    match form {
        InstructionForm::Extended => ext_opcode.and_then(|op| ext_op_name(op, version)),
        InstructionForm::Variable => match operand_count {
            OperandCount::OP2 => two_op_name(opcode, version),
            _ => var_op_name(opcode, version),
        },
        InstructionForm::Short => match operand_count {
            OperandCount::OP0 => zero_op_name(opcode, version),
            _ => one_op_name(opcode, version),
        },
        InstructionForm::Long => two_op_name(opcode, version),
    }
}

fn two_op_name(opcode: u8, version: u8) -> Option<&'static str> {
    match opcode {
        0x01 => Some("je"),
        0x02 => Some("jl"),
        0x03 => Some("jg"),
        0x04 => Some("dec_chk"),
        0x05 => Some("inc_chk"),
        0x06 => Some("jin"),
        0x07 => Some("test"),
        0x08 => Some("or"),
        0x09 => Some("and"),
        0x0A => Some("test_attr"),
        0x0B => Some("set_attr"),
        0x0C => Some("clear_attr"),
        0x0D => Some("store"),
        0x0E => Some("insert_obj"),
        0x0F => Some("loadw"),
        0x10 => Some("loadb"),
        0x11 => Some("get_prop"),
        0x12 => Some("get_prop_addr"),
        0x13 => Some("get_next_prop"),
        0x14 => Some("add"),
        0x15 => Some("sub"),
        0x16 => Some("mul"),
        0x17 => Some("div"),
        0x18 => Some("mod"),
        0x19 if version >= 4 => Some("call_2s"),
        0x1A if version >= 5 => Some("call_2n"),
        0x1B if version >= 5 => Some("set_colour"),
        0x1C if version >= 5 => Some("throw"),
        _ => None,
    }
}

fn one_op_name(opcode: u8, version: u8) -> Option<&'static str> {
    match opcode {
        0x00 => Some("jz"),
        0x01 => Some("get_sibling"),
        0x02 => Some("get_child"),
        0x03 => Some("get_parent"),
        0x04 => Some("get_prop_len"),
        0x05 => Some("inc"),
        0x06 => Some("dec"),
        0x07 => Some("print_addr"),
        0x08 if version >= 4 => Some("call_1s"),
        0x09 => Some("remove_obj"),
        0x0A => Some("print_obj"),
        0x0B => Some("ret"),
        0x0C => Some("jump"),
        0x0D => Some("print_paddr"),
        0x0E => Some("load"),
        0x0F => Some(if version >= 5 { "call_1n" } else { "not" }),
        _ => None,
    }
}

fn zero_op_name(opcode: u8, version: u8) -> Option<&'static str> {
    match opcode {
        0x00 => Some("rtrue"),
        0x01 => Some("rfalse"),
        0x02 => Some("print"),
        0x03 => Some("print_ret"),
        0x04 => Some("nop"),
        0x05 if version <= 4 => Some("save"),
        0x06 if version <= 4 => Some("restore"),
        0x07 => Some("restart"),
        0x08 => Some("ret_popped"),
        0x09 => Some(if version >= 5 { "catch" } else { "pop" }),
        0x0A => Some("quit"),
        0x0B => Some("new_line"),
        0x0C if version == 3 => Some("show_status"),
        0x0D => Some("verify"),
        // 0x0E is the extended-form marker, never a 0OP opcode.
        0x0F if version >= 5 => Some("piracy"),
        _ => None,
    }
}

fn var_op_name(opcode: u8, version: u8) -> Option<&'static str> {
    match opcode {
        0x00 => Some(if version >= 4 { "call_vs" } else { "call" }),
        0x01 => Some("storew"),
        0x02 => Some("storeb"),
        0x03 => Some("put_prop"),
        0x04 => Some(if version >= 5 { "aread" } else { "sread" }),
        0x05 => Some("print_char"),
        0x06 => Some("print_num"),
        0x07 => Some("random"),
        0x08 => Some("push"),
        0x09 => Some("pull"),
        0x0A if version >= 3 => Some("split_window"),
        0x0B if version >= 3 => Some("set_window"),
        0x0C if version >= 4 => Some("call_vs2"),
        0x0D if version >= 4 => Some("erase_window"),
        0x0E if version >= 4 => Some("erase_line"),
        0x0F if version >= 4 => Some("set_cursor"),
        0x10 if version >= 4 => Some("get_cursor"),
        0x11 if version >= 4 => Some("set_text_style"),
        0x12 if version >= 4 => Some("buffer_mode"),
        0x13 if version >= 3 => Some("output_stream"),
        0x14 if version >= 3 => Some("input_stream"),
        0x15 if version >= 3 => Some("sound_effect"),
        0x16 if version >= 4 => Some("read_char"),
        0x17 if version >= 4 => Some("scan_table"),
        0x18 if version >= 5 => Some("not"),
        0x19 if version >= 5 => Some("call_vn"),
        0x1A if version >= 5 => Some("call_vn2"),
        0x1B if version >= 5 => Some("tokenise"),
        0x1C if version >= 5 => Some("encode_text"),
        0x1D if version >= 5 => Some("copy_table"),
        0x1E if version >= 5 => Some("print_table"),
        0x1F if version >= 5 => Some("check_arg_count"),
        _ => None,
    }
}

fn ext_op_name(ext_opcode: u8, _version: u8) -> Option<&'static str> {
    match ext_opcode {
        0x00 => Some("save"),
        0x01 => Some("restore"),
        0x02 => Some("log_shift"),
        0x03 => Some("art_shift"),
        0x04 => Some("set_font"),
        0x09 => Some("save_undo"),
        0x0A => Some("restore_undo"),
        0x0B => Some("print_unicode"),
        0x0C => Some("check_unicode"),
        _ => None,
    }
}

/// Does the instruction end with a store-variable byte?
pub fn stores_result(
    opcode: u8,
    ext_opcode: Option<u8>,
    form: InstructionForm,
    operand_count: OperandCount,
    version: u8,
) -> bool {
    match form {
        InstructionForm::Extended => matches!(ext_opcode, Some(0x00..=0x04) | Some(0x09..=0x0C)),
        InstructionForm::Variable => match operand_count {
            OperandCount::OP2 => stores_result_2op(opcode),
            _ => match opcode {
                // call / call_vs, random, pull (v6 only), call_vs2,
                // read_char, scan_table, not, aread (v5+)
                0x00 | 0x07 | 0x0C | 0x16 | 0x17 | 0x18 => true,
                0x04 => version >= 5,
                0x09 => version >= 6,
                _ => false,
            },
        },
        InstructionForm::Short => match operand_count {
            OperandCount::OP0 => match opcode {
                0x05 | 0x06 => version == 4, // save/restore store in v4
                0x09 => version >= 5,        // catch
                _ => false,
            },
            _ => match opcode {
                // get_sibling, get_child, get_parent, get_prop_len
                0x01..=0x04 => true,
                0x08 => version >= 4, // call_1s
                0x0E => true,         // load
                0x0F => version <= 4, // not
                _ => false,
            },
        },
        InstructionForm::Long => stores_result_2op(opcode),
    }
}

fn stores_result_2op(opcode: u8) -> bool {
    match opcode {
        0x08 | 0x09 => true, // or, and
        0x0F..=0x13 => true, // loadw, loadb, get_prop, get_prop_addr, get_next_prop
        0x14..=0x18 => true, // add, sub, mul, div, mod
        0x19 => true,        // call_2s
        _ => false,
    }
}

/// Does the instruction end with a branch descriptor?
pub fn has_branch(
    opcode: u8,
    _ext_opcode: Option<u8>,
    form: InstructionForm,
    operand_count: OperandCount,
    version: u8,
) -> bool {
    match form {
        InstructionForm::Extended => false,
        InstructionForm::Variable => match operand_count {
            OperandCount::OP2 => has_branch_2op(opcode),
            _ => match opcode {
                0x17 => version >= 4, // scan_table
                0x1F => version >= 5, // check_arg_count
                _ => false,
            },
        },
        InstructionForm::Short => match operand_count {
            OperandCount::OP0 => match opcode {
                0x05 | 0x06 => version <= 3, // save/restore branch in v1-3
                0x0D => true,                // verify
                0x0F => version >= 5,        // piracy
                _ => false,
            },
            _ => matches!(opcode, 0x00..=0x02), // jz, get_sibling, get_child
        },
        InstructionForm::Long => has_branch_2op(opcode),
    }
}

fn has_branch_2op(opcode: u8) -> bool {
    match opcode {
        0x01..=0x07 => true, // je, jl, jg, dec_chk, inc_chk, jin, test
        0x0A => true,        // test_attr
        _ => false,
    }
}

/// Does the instruction carry an inline encoded string? Only `print` and
/// `print_ret` do.
pub fn has_text(
    opcode: u8,
    _ext_opcode: Option<u8>,
    form: InstructionForm,
    operand_count: OperandCount,
    _version: u8,
) -> bool {
    form == InstructionForm::Short
        && operand_count == OperandCount::OP0
        && matches!(opcode, 0x02 | 0x03)
}

/// The double-variable calls carry two operand-type bytes, for up to
/// eight operands.
pub fn takes_double_type_byte(opcode: u8, form: InstructionForm, operand_count: OperandCount) -> bool {
    form == InstructionForm::Variable
        && operand_count == OperandCount::VAR
        && matches!(opcode, 0x0C | 0x1A) // call_vs2, call_vn2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{InstructionForm, OperandCount};

    #[test]
    fn test_call_naming_tracks_version() {
        let name = |v| instruction_name(0x00, None, InstructionForm::Variable, OperandCount::VAR, v);
        assert_eq!(name(3), Some("call"));
        assert_eq!(name(4), Some("call_vs"));
        assert_eq!(name(5), Some("call_vs"));
    }

    #[test]
    fn test_version_gated_opcodes() {
        // call_vn does not exist before v5
        assert_eq!(
            instruction_name(0x19, None, InstructionForm::Variable, OperandCount::VAR, 3),
            None
        );
        assert_eq!(
            instruction_name(0x19, None, InstructionForm::Variable, OperandCount::VAR, 5),
            Some("call_vn")
        );
        // 2OP 0x00 is illegal everywhere
        assert_eq!(
            instruction_name(0x00, None, InstructionForm::Long, OperandCount::OP2, 3),
            None
        );
        // show_status is v3 only
        assert_eq!(
            instruction_name(0x0C, None, InstructionForm::Short, OperandCount::OP0, 3),
            Some("show_status")
        );
        assert_eq!(
            instruction_name(0x0C, None, InstructionForm::Short, OperandCount::OP0, 4),
            None
        );
    }

    #[test]
    fn test_store_and_branch_flags() {
        // add stores, never branches
        assert!(stores_result(0x14, None, InstructionForm::Long, OperandCount::OP2, 3));
        assert!(!has_branch(0x14, None, InstructionForm::Long, OperandCount::OP2, 3));
        // je branches, never stores
        assert!(has_branch(0x01, None, InstructionForm::Long, OperandCount::OP2, 3));
        assert!(!stores_result(0x01, None, InstructionForm::Long, OperandCount::OP2, 3));
        // call stores in VAR count, and its 2OP-count twin `je` keeps
        // its own flags when encoded in variable form
        assert!(stores_result(0x00, None, InstructionForm::Variable, OperandCount::VAR, 3));
        assert!(has_branch(0x01, None, InstructionForm::Variable, OperandCount::OP2, 3));
        // call_vn discards
        assert!(!stores_result(0x19, None, InstructionForm::Variable, OperandCount::VAR, 5));
    }

    #[test]
    fn test_inline_text_flag() {
        assert!(has_text(0x02, None, InstructionForm::Short, OperandCount::OP0, 3));
        assert!(has_text(0x03, None, InstructionForm::Short, OperandCount::OP0, 3));
        assert!(!has_text(0x02, None, InstructionForm::Long, OperandCount::OP2, 3));
    }

    #[test]
    fn test_double_type_byte_calls() {
        assert!(takes_double_type_byte(0x0C, InstructionForm::Variable, OperandCount::VAR));
        assert!(takes_double_type_byte(0x1A, InstructionForm::Variable, OperandCount::VAR));
        assert!(!takes_double_type_byte(0x00, InstructionForm::Variable, OperandCount::VAR));
    }
}
