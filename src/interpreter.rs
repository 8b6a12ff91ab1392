use crate::display::{ScreenOutput, StdoutScreen};
use crate::errors::{ZlurkError, ZlurkResult};
use crate::instruction::{Instruction, InstructionForm, OperandCount, OperandType};
use crate::opcodes_math::signed;
use crate::trace::Trace;
use crate::vm::{CallFrame, MAX_LOCALS, VM};
use crate::zrand::ZRand;
use log::{debug, info};

/// Result of executing one instruction
#[derive(Debug, Clone)]
pub enum ExecutionResult {
    /// Fall through to the next instruction
    Continue,
    /// Branch taken, PC already updated
    Branched,
    /// Routine called, PC updated
    Called,
    /// Routine returned with this value
    Returned(u16),
    /// The quit opcode ran
    Quit,
    /// The top-level routine returned; the story is over
    GameOver,
}

/// The execution engine: decodes at the program counter, resolves
/// operands against the variable file, dispatches on the mnemonic, and
/// moves the program counter.
pub struct Interpreter {
    pub vm: VM,
    pub screen: Box<dyn ScreenOutput>,
    trace: Trace,
    rng: ZRand,
    instruction_count: u64,
}

impl Interpreter {
    pub fn new(vm: VM) -> Self {
        Interpreter::with_screen(vm, Box::new(StdoutScreen))
    }

    pub fn with_screen(vm: VM, screen: Box<dyn ScreenOutput>) -> Self {
        Interpreter {
            vm,
            screen,
            trace: Trace::disabled(),
            rng: ZRand::new_uniform(),
            instruction_count: 0,
        }
    }

    pub fn set_trace(&mut self, trace: Trace) {
        self.trace = trace;
    }

    /// Run until the story quits, the top routine returns, or a fault
    /// stops the machine.
    pub fn run(&mut self) -> ZlurkResult<()> {
        self.run_with_limit(None)
    }

    /// Run with an optional instruction limit; tests use the limit to
    /// exercise a few instructions of a fragment.
    pub fn run_with_limit(&mut self, max_instructions: Option<u64>) -> ZlurkResult<()> {
        info!("starting execution at {:05x}", self.vm.memory.pc);

        loop {
            let pc = self.vm.memory.pc;
            let version = self.vm.memory.header.version;
            let instruction = Instruction::decode(self.vm.memory.bytes(), pc as usize, version)
                .map_err(|e| e.at(pc, "?"))?;

            let disassembly = instruction.to_string();
            let raw = &self.vm.memory.bytes()[pc as usize..pc as usize + instruction.size];
            self.trace.record(pc, raw, &disassembly)?;
            debug!("{pc:05x}: {disassembly}");

            // Fall-through position; control transfers overwrite it.
            self.vm.memory.pc = pc + instruction.size as u32;

            match self
                .execute_instruction(&instruction)
                .map_err(|e| e.at(pc, instruction.name))?
            {
                ExecutionResult::Quit => {
                    info!("quit after {} instructions", self.instruction_count);
                    return Ok(());
                }
                ExecutionResult::GameOver => {
                    info!("story over after {} instructions", self.instruction_count);
                    return Ok(());
                }
                _ => {}
            }

            self.instruction_count += 1;
            if let Some(limit) = max_instructions {
                if self.instruction_count >= limit {
                    return Ok(());
                }
            }
        }
    }

    /// Execute a single decoded instruction.
    pub fn execute_instruction(&mut self, inst: &Instruction) -> ZlurkResult<ExecutionResult> {
        let operands = self.resolve_operands(inst)?;

        if inst.form == InstructionForm::Extended {
            return Err(ZlurkError::Unimplemented(inst.name));
        }

        match inst.operand_count {
            OperandCount::OP0 => self.execute_0op(inst),
            OperandCount::OP1 => {
                let a = self.operand(inst, &operands, 0)?;
                self.execute_1op(inst, a)
            }
            OperandCount::OP2 => self.execute_2op(inst, &operands),
            OperandCount::VAR => self.execute_var(inst, &operands),
        }
    }

    /// Materialise operand values, left to right, reading the variable
    /// file exactly once per `Variable` operand.
    fn resolve_operands(&mut self, inst: &Instruction) -> ZlurkResult<Vec<u16>> {
        let mut values = Vec::with_capacity(inst.operands.len());
        for (i, &operand) in inst.operands.iter().enumerate() {
            let value = match inst.operand_types[i] {
                OperandType::Variable => self.vm.read_variable(operand as u8)?,
                _ => operand,
            };
            values.push(value);
        }
        Ok(values)
    }

    pub(crate) fn operand(
        &self,
        inst: &Instruction,
        operands: &[u16],
        index: usize,
    ) -> ZlurkResult<u16> {
        operands
            .get(index)
            .copied()
            .ok_or(ZlurkError::BadOperandCount {
                name: inst.name,
                got: operands.len(),
            })
    }

    pub(crate) fn store_result(&mut self, inst: &Instruction, value: u16) -> ZlurkResult<()> {
        if let Some(var) = inst.store_var {
            self.vm.write_variable(var, value)?;
        }
        Ok(())
    }

    pub(crate) fn print_text(&mut self, text: &str) -> ZlurkResult<()> {
        self.screen.print(text)
    }

    fn execute_0op(&mut self, inst: &Instruction) -> ZlurkResult<ExecutionResult> {
        match inst.opcode {
            0x00 => self.do_return(1),
            0x01 => self.do_return(0),
            0x02 | 0x03 | 0x0B => self.execute_display_op(inst, &[]),
            0x04 => Ok(ExecutionResult::Continue),
            0x08 => {
                let value = self.vm.pop()?;
                self.do_return(value)
            }
            0x09 => {
                if self.vm.memory.header.version <= 4 {
                    // pop: discard the top of the value stack
                    self.vm.pop()?;
                } else {
                    // catch: the current call depth
                    let depth = self.vm.call_depth() as u16;
                    self.store_result(inst, depth)?;
                }
                Ok(ExecutionResult::Continue)
            }
            0x0A => Ok(ExecutionResult::Quit),
            0x0C => {
                // The status line belongs to the screen model, outside
                // the core.
                debug!("show_status ignored");
                Ok(ExecutionResult::Continue)
            }
            0x0D => {
                let matched = self.verify_checksum()?;
                self.do_branch(inst, matched)
            }
            0x0F => {
                // piracy: be gullible
                self.do_branch(inst, true)
            }
            _ => Err(ZlurkError::Unimplemented(inst.name)),
        }
    }

    fn execute_1op(&mut self, inst: &Instruction, a: u16) -> ZlurkResult<ExecutionResult> {
        match inst.opcode {
            0x00 => self.do_branch(inst, a == 0),
            0x01..=0x04 | 0x0A => self.execute_object_op(inst, &[a]),
            0x05 | 0x06 | 0x0E => self.execute_memory_op(inst, &[a]),
            0x07 | 0x0D => self.execute_display_op(inst, &[a]),
            0x08 => {
                // call_1s
                self.do_call(a, &[], inst.store_var)?;
                Ok(ExecutionResult::Called)
            }
            0x0B => self.do_return(a),
            0x0C => {
                // jump: a signed offset from the next instruction
                let new_pc = (self.vm.memory.pc as i32 + signed(a) as i32 - 2) as u32;
                self.vm.memory.pc = new_pc;
                Ok(ExecutionResult::Branched)
            }
            0x0F => {
                if self.vm.memory.header.version >= 5 {
                    // call_1n
                    self.do_call(a, &[], None)?;
                    Ok(ExecutionResult::Called)
                } else {
                    self.execute_math_op(inst, &[a])
                }
            }
            _ => Err(ZlurkError::Unimplemented(inst.name)),
        }
    }

    fn execute_2op(&mut self, inst: &Instruction, operands: &[u16]) -> ZlurkResult<ExecutionResult> {
        match inst.opcode {
            0x01 => {
                // je branches when the first operand equals any other;
                // with a single operand it never branches.
                let a = self.operand(inst, operands, 0)?;
                let condition = operands[1..].contains(&a);
                self.do_branch(inst, condition)
            }
            0x02 => {
                let (a, b) = self.two_operands(inst, operands)?;
                self.do_branch(inst, signed(a) < signed(b))
            }
            0x03 => {
                let (a, b) = self.two_operands(inst, operands)?;
                self.do_branch(inst, signed(a) > signed(b))
            }
            0x07 => {
                let (a, b) = self.two_operands(inst, operands)?;
                self.do_branch(inst, a & b == b)
            }
            0x04 | 0x05 | 0x0D | 0x0F | 0x10 => self.execute_memory_op(inst, operands),
            0x06 | 0x0A..=0x0C | 0x11..=0x13 => self.execute_object_op(inst, operands),
            0x08 | 0x09 | 0x14..=0x18 => self.execute_math_op(inst, operands),
            0x19 => {
                // call_2s
                let (routine, arg) = self.two_operands(inst, operands)?;
                self.do_call(routine, &[arg], inst.store_var)?;
                Ok(ExecutionResult::Called)
            }
            0x1A => {
                // call_2n
                let (routine, arg) = self.two_operands(inst, operands)?;
                self.do_call(routine, &[arg], None)?;
                Ok(ExecutionResult::Called)
            }
            _ => Err(ZlurkError::Unimplemented(inst.name)),
        }
    }

    fn execute_var(&mut self, inst: &Instruction, operands: &[u16]) -> ZlurkResult<ExecutionResult> {
        match inst.opcode {
            0x00 | 0x0C => {
                // call / call_vs / call_vs2
                let routine = self.operand(inst, operands, 0)?;
                self.do_call(routine, &operands[1..], inst.store_var)?;
                Ok(ExecutionResult::Called)
            }
            0x19 | 0x1A => {
                // call_vn / call_vn2: the result is discarded
                let routine = self.operand(inst, operands, 0)?;
                self.do_call(routine, &operands[1..], None)?;
                Ok(ExecutionResult::Called)
            }
            0x01 | 0x02 | 0x08 | 0x09 => self.execute_memory_op(inst, operands),
            0x03 => self.execute_object_op(inst, operands),
            0x05 | 0x06 => self.execute_display_op(inst, operands),
            0x07 => {
                let range = self.operand(inst, operands, 0)?;
                let value = self.random(range);
                self.store_result(inst, value)?;
                Ok(ExecutionResult::Continue)
            }
            0x0A | 0x0B => {
                // Window control belongs to the screen model.
                debug!("{} ignored", inst.name);
                Ok(ExecutionResult::Continue)
            }
            0x18 => self.execute_math_op(inst, operands),
            _ => Err(ZlurkError::Unimplemented(inst.name)),
        }
    }

    pub(crate) fn two_operands(
        &self,
        inst: &Instruction,
        operands: &[u16],
    ) -> ZlurkResult<(u16, u16)> {
        Ok((
            self.operand(inst, operands, 0)?,
            self.operand(inst, operands, 1)?,
        ))
    }

    /// The random opcode: positive rolls, non-positive reseeds.
    fn random(&mut self, range: u16) -> u16 {
        let range = signed(range);
        if range > 0 {
            self.rng.roll(range as u16)
        } else {
            self.rng = if range == 0 {
                ZRand::new_uniform()
            } else {
                ZRand::new_predictable(-(range as i64) as u64)
            };
            0
        }
    }

    /// Sum the file outside the header and compare against the header
    /// checksum.
    fn verify_checksum(&self) -> ZlurkResult<bool> {
        let end = self.vm.memory.header.len_file.min(self.vm.memory.len());
        let mut sum = 0u16;
        for &byte in &self.vm.memory.bytes()[0x40.min(end)..end] {
            sum = sum.wrapping_add(byte as u16);
        }
        Ok(sum == self.vm.memory.header.checksum_file)
    }

    /// Decide a branch. Taken offsets of 0 and 1 return false/true from
    /// the current routine; anything else lands relative to the
    /// instruction after the branch data.
    pub(crate) fn do_branch(
        &mut self,
        inst: &Instruction,
        condition: bool,
    ) -> ZlurkResult<ExecutionResult> {
        if let Some(ref branch) = inst.branch {
            if condition == branch.on_true {
                return match branch.offset {
                    0 => self.do_return(0),
                    1 => self.do_return(1),
                    offset => {
                        let new_pc = (self.vm.memory.pc as i32 + offset as i32 - 2) as u32;
                        self.vm.memory.pc = new_pc;
                        Ok(ExecutionResult::Branched)
                    }
                };
            }
        }
        Ok(ExecutionResult::Continue)
    }

    /// Enter a routine. A packed address of zero stores false and does
    /// not call.
    pub(crate) fn do_call(
        &mut self,
        packed_addr: u16,
        args: &[u16],
        return_store: Option<u8>,
    ) -> ZlurkResult<()> {
        if packed_addr == 0 {
            if let Some(var) = return_store {
                self.vm.write_variable(var, 0)?;
            }
            return Ok(());
        }

        let addr = self.vm.memory.unpack_routine(packed_addr);
        let num_locals = self.vm.memory.read_byte(addr)?;
        if num_locals as usize > MAX_LOCALS {
            return Err(ZlurkError::InvalidRoutineHeader {
                addr,
                count: num_locals,
            });
        }
        debug!("call {:05x} with {:?}", addr, args);

        let mut frame = CallFrame {
            return_pc: self.vm.memory.pc,
            return_store,
            num_locals,
            locals: [0; MAX_LOCALS],
            stack_floor: self.vm.stack.len(),
        };

        // In v1-4 the routine header carries initial local values;
        // v5+ locals start at zero.
        let mut entry = addr + 1;
        if self.vm.memory.header.version <= 4 {
            for i in 0..num_locals as usize {
                frame.locals[i] = self.vm.memory.read_word(entry)?;
                entry += 2;
            }
        }

        // Arguments overwrite the first locals.
        for (i, &arg) in args.iter().enumerate().take(num_locals as usize) {
            frame.locals[i] = arg;
        }

        self.vm.call_stack.push(frame);
        self.vm.memory.pc = entry;
        Ok(())
    }

    /// Leave the current routine: drop anything it left on the value
    /// stack, restore the caller's PC, and deliver the result.
    pub(crate) fn do_return(&mut self, value: u16) -> ZlurkResult<ExecutionResult> {
        let frame = self
            .vm
            .call_stack
            .pop()
            .ok_or(ZlurkError::CallStackUnderflow)?;

        self.vm.stack.truncate(frame.stack_floor);
        self.vm.memory.pc = frame.return_pc;

        if let Some(var) = frame.return_store {
            self.vm.write_variable(var, value)?;
        }

        if self.vm.call_stack.is_empty() {
            return Ok(ExecutionResult::GameOver);
        }
        Ok(ExecutionResult::Returned(value))
    }
}
