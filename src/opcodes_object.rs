//! Opcodes over the object table: attributes, tree readers, and the
//! property list.

use crate::errors::{ZlurkError, ZlurkResult};
use crate::instruction::{Instruction, OperandCount};
use crate::interpreter::{ExecutionResult, Interpreter};
use crate::zobject;

impl Interpreter {
    pub(crate) fn execute_object_op(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> ZlurkResult<ExecutionResult> {
        match (inst.operand_count, inst.opcode) {
            (OperandCount::OP2, 0x06) => {
                // jin: is the first object a child of the second?
                let (obj, parent) = self.two_operands(inst, operands)?;
                let actual = zobject::parent(&self.vm.memory, obj)?;
                self.do_branch(inst, actual == parent)
            }
            (OperandCount::OP2, 0x0A) => {
                let (obj, attr) = self.two_operands(inst, operands)?;
                let set = zobject::test_attr(&self.vm.memory, obj, attr)?;
                self.do_branch(inst, set)
            }
            (OperandCount::OP2, 0x0B) => {
                let (obj, attr) = self.two_operands(inst, operands)?;
                zobject::set_attr(&mut self.vm.memory, obj, attr, true)?;
                Ok(ExecutionResult::Continue)
            }
            (OperandCount::OP2, 0x0C) => {
                let (obj, attr) = self.two_operands(inst, operands)?;
                zobject::set_attr(&mut self.vm.memory, obj, attr, false)?;
                Ok(ExecutionResult::Continue)
            }
            (OperandCount::OP2, 0x11) => {
                let (obj, prop) = self.two_operands(inst, operands)?;
                let value = zobject::get_property(&self.vm.memory, obj, prop)?;
                self.store_result(inst, value)?;
                Ok(ExecutionResult::Continue)
            }
            (OperandCount::OP2, 0x12) => {
                let (obj, prop) = self.two_operands(inst, operands)?;
                let addr = zobject::property_addr(&self.vm.memory, obj, prop)?;
                self.store_result(inst, addr)?;
                Ok(ExecutionResult::Continue)
            }
            (OperandCount::OP2, 0x13) => {
                let (obj, prop) = self.two_operands(inst, operands)?;
                let next = zobject::next_property(&self.vm.memory, obj, prop)?;
                self.store_result(inst, next)?;
                Ok(ExecutionResult::Continue)
            }
            (OperandCount::OP1, 0x01) => {
                // get_sibling stores, then branches on non-zero
                let obj = self.operand(inst, operands, 0)?;
                let sibling = zobject::sibling(&self.vm.memory, obj)?;
                self.store_result(inst, sibling)?;
                self.do_branch(inst, sibling != 0)
            }
            (OperandCount::OP1, 0x02) => {
                let obj = self.operand(inst, operands, 0)?;
                let child = zobject::child(&self.vm.memory, obj)?;
                self.store_result(inst, child)?;
                self.do_branch(inst, child != 0)
            }
            (OperandCount::OP1, 0x03) => {
                let obj = self.operand(inst, operands, 0)?;
                let parent = zobject::parent(&self.vm.memory, obj)?;
                self.store_result(inst, parent)?;
                Ok(ExecutionResult::Continue)
            }
            (OperandCount::OP1, 0x04) => {
                let data_addr = self.operand(inst, operands, 0)?;
                let len = zobject::property_len(&self.vm.memory, data_addr)?;
                self.store_result(inst, len)?;
                Ok(ExecutionResult::Continue)
            }
            (OperandCount::OP1, 0x0A) => {
                // print_obj: the short name from the property table head
                let obj = self.operand(inst, operands, 0)?;
                let name = zobject::short_name(&self.vm.memory, obj)?;
                self.print_text(&name)?;
                Ok(ExecutionResult::Continue)
            }
            (OperandCount::VAR, 0x03) => {
                let obj = self.operand(inst, operands, 0)?;
                let prop = self.operand(inst, operands, 1)?;
                let value = self.operand(inst, operands, 2)?;
                zobject::put_property(&mut self.vm.memory, obj, prop, value)?;
                Ok(ExecutionResult::Continue)
            }
            _ => Err(ZlurkError::Unimplemented(inst.name)),
        }
    }
}
