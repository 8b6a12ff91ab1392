//! Shared builders for unit tests: a minimal but well-formed story image
//! and an interpreter wired to a capturing screen.

use crate::display::CaptureScreen;
use crate::interpreter::Interpreter;
use crate::memory::Memory;
use crate::vm::VM;
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

pub const ABBREV_TABLE: u16 = 0x0040;
pub const GLOBAL_TABLE: u16 = 0x0100;
pub const OBJECT_TABLE: u16 = 0x0300;
pub const STATIC_BASE: u16 = 0x2000;
pub const START_PC: u16 = 0x3000;

pub fn story_word(story: &mut [u8], addr: usize, value: u16) {
    story[addr] = (value >> 8) as u8;
    story[addr + 1] = (value & 0xFF) as u8;
}

/// A 16 KiB story with a sane header: dynamic memory up to 0x2000,
/// code from 0x3000, the usual tables in between.
pub fn blank_story(version: u8) -> Vec<u8> {
    let mut story = vec![0u8; 0x4000];
    story[0x00] = version;
    story_word(&mut story, 0x04, STATIC_BASE); // high memory base
    story_word(&mut story, 0x06, START_PC);
    story_word(&mut story, 0x0A, OBJECT_TABLE);
    story_word(&mut story, 0x0C, GLOBAL_TABLE);
    story_word(&mut story, 0x0E, STATIC_BASE);
    story_word(&mut story, 0x18, ABBREV_TABLE);
    story
}

/// Build an interpreter over `story` whose screen output is captured
/// into the returned buffer.
pub fn interpreter_with_capture(story: Vec<u8>) -> (Interpreter, Rc<RefCell<String>>) {
    let memory = Memory::load(story).expect("story must load");
    let vm = VM::new(memory).expect("vm must build");
    let (screen, captured) = CaptureScreen::new();
    let interp = Interpreter::with_screen(vm, Box::new(screen));
    (interp, captured)
}

/// A writer that shares its buffer, for capturing trace output.
pub struct SharedBuffer(pub Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> (SharedBuffer, Rc<RefCell<Vec<u8>>>) {
        let buffer = Rc::new(RefCell::new(Vec::new()));
        (SharedBuffer(buffer.clone()), buffer)
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
