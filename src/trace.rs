//! The trace channel: one disassembly-style line per executed
//! instruction, written to a file beside the story, for eyeballing runs
//! against `txd` output.
//!
//! Line format: `HEXADDR: HEXBYTES MNEMONIC [OPERANDS]`, with the raw
//! instruction bytes in lowercase hex.

use crate::errors::ZlurkResult;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub struct Trace {
    out: Option<Box<dyn Write>>,
}

impl Trace {
    pub fn disabled() -> Trace {
        Trace { out: None }
    }

    /// Trace into the conventional sibling of the story file.
    pub fn for_story(story_path: &Path) -> ZlurkResult<Trace> {
        let file = File::create(Self::sibling_path(story_path))?;
        Ok(Trace {
            out: Some(Box::new(BufWriter::new(file))),
        })
    }

    /// Trace into any writer; tests capture into a buffer this way.
    pub fn to_writer(writer: Box<dyn Write>) -> Trace {
        Trace { out: Some(writer) }
    }

    pub fn sibling_path(story_path: &Path) -> PathBuf {
        story_path.with_extension("trace")
    }

    /// Record one instruction. `bytes` are the raw instruction bytes and
    /// `disassembly` the mnemonic-and-operands rendering.
    pub fn record(&mut self, addr: u32, bytes: &[u8], disassembly: &str) -> ZlurkResult<()> {
        if let Some(out) = self.out.as_mut() {
            let hex_bytes = bytes
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(out, "{addr:05x}: {hex_bytes} {disassembly}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::SharedBuffer;

    #[test]
    fn test_record_format() {
        let (writer, buffer) = SharedBuffer::new();
        let mut trace = Trace::to_writer(Box::new(writer));
        trace
            .record(0x4f05, &[0x54, 0x03, 0x04, 0x05], "add V03, #0004 -> V05")
            .unwrap();
        let line = String::from_utf8(buffer.borrow().clone()).unwrap();
        assert_eq!(line, "04f05: 54 03 04 05 add V03, #0004 -> V05\n");
    }

    #[test]
    fn test_disabled_trace_is_silent() {
        let mut trace = Trace::disabled();
        trace.record(0, &[0xBA], "quit").unwrap();
    }

    #[test]
    fn test_sibling_path() {
        assert_eq!(
            Trace::sibling_path(Path::new("games/zork1.z3")),
            PathBuf::from("games/zork1.trace")
        );
    }
}
