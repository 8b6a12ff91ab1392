use crate::errors::{ZlurkError, ZlurkResult};
use crate::header::Header;
use log::debug;

/// The addressable story space is 64 KiB minus two bytes.
pub const MAX_STORY_SIZE: usize = 65534;

/// Minimum story size, enough to hold the header.
pub const HEADER_SIZE: usize = 64;

/// The two kinds of packed address, unpacked by different formulae in
/// v6 and v7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackedKind {
    Routine,
    String,
}

/// The story image: an owned, mutable byte buffer partitioned into
/// dynamic, static and high regions by header words, plus the program
/// counter.
///
/// All byte and word access is big-endian and bounds-checked; writes are
/// additionally confined to dynamic memory. The program counter lives
/// here but is mutated only by the execution engine.
pub struct Memory {
    bytes: Vec<u8>,
    pub header: Header,
    pub pc: u32,
}

impl Memory {
    /// Take ownership of a story file and validate its shape.
    ///
    /// Stories larger than the addressable space are rejected at load,
    /// not truncated to the addressable window.
    pub fn load(bytes: Vec<u8>) -> ZlurkResult<Memory> {
        if bytes.len() < HEADER_SIZE {
            return Err(ZlurkError::StoryTooSmall(bytes.len()));
        }
        if bytes.len() > MAX_STORY_SIZE {
            return Err(ZlurkError::StoryTooLarge(bytes.len()));
        }

        let header = Header::new(&bytes);
        if !(3..=8).contains(&header.version) {
            return Err(ZlurkError::UnsupportedVersion(header.version));
        }
        if (header.base_static_mem as usize) < HEADER_SIZE {
            return Err(ZlurkError::StaticBelowHeader(header.base_static_mem));
        }

        // Dynamic memory runs from 0 to the static base.
        let dynamic_size = header.base_static_mem as usize;
        if dynamic_size + header.base_static_mem as usize > MAX_STORY_SIZE {
            return Err(ZlurkError::AddressSpaceExhausted);
        }

        let mut memory = Memory {
            bytes,
            pc: 0,
            header,
        };
        memory.pc = memory.starting_pc();

        debug!(
            "loaded v{} story: {} bytes, static at {:#06x}, pc {:#06x}",
            memory.header.version,
            memory.bytes.len(),
            memory.header.base_static_mem,
            memory.pc
        );

        Ok(memory)
    }

    /// The starting PC is a byte address, except in v6 where the header
    /// holds a packed routine address.
    fn starting_pc(&self) -> u32 {
        if self.header.version == 6 {
            self.unpack(self.header.initial_pc, PackedKind::Routine)
        } else {
            self.header.initial_pc as u32
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Immutable view of the image, for the decoder and text reader.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn read_byte(&self, addr: u32) -> ZlurkResult<u8> {
        self.bytes
            .get(addr as usize)
            .copied()
            .ok_or(ZlurkError::AddressOutOfRange(addr))
    }

    pub fn read_word(&self, addr: u32) -> ZlurkResult<u16> {
        let high = self.read_byte(addr)?;
        let low = self.read_byte(addr + 1)?;
        Ok(((high as u16) << 8) | low as u16)
    }

    pub fn write_byte(&mut self, addr: u32, value: u8) -> ZlurkResult<()> {
        if addr >= self.header.base_static_mem as u32 {
            return Err(ZlurkError::WriteOutsideDynamic(addr));
        }
        match self.bytes.get_mut(addr as usize) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(ZlurkError::AddressOutOfRange(addr)),
        }
    }

    pub fn write_word(&mut self, addr: u32, value: u16) -> ZlurkResult<()> {
        self.write_byte(addr, (value >> 8) as u8)?;
        self.write_byte(addr + 1, (value & 0xFF) as u8)
    }

    /// Expand a packed address into a byte address using the
    /// version-specific formula.
    pub fn unpack(&self, packed: u16, kind: PackedKind) -> u32 {
        let packed = packed as u32;
        match self.header.version {
            1..=3 => 2 * packed,
            4..=5 => 4 * packed,
            6 | 7 => {
                let offset = match kind {
                    PackedKind::Routine => self.header.routine_offset as u32,
                    PackedKind::String => self.header.strings_offset as u32,
                };
                4 * packed + 8 * offset
            }
            _ => 8 * packed,
        }
    }

    pub fn unpack_routine(&self, packed: u16) -> u32 {
        self.unpack(packed, PackedKind::Routine)
    }

    pub fn unpack_string(&self, packed: u16) -> u32 {
        self.unpack(packed, PackedKind::String)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::blank_story;

    #[test]
    fn test_word_round_trip() {
        let mut memory = Memory::load(blank_story(3)).unwrap();
        for addr in [0x40u32, 0x41, 0x100, 0x1fc] {
            memory.write_word(addr, 0xbeef).unwrap();
            assert_eq!(memory.read_word(addr).unwrap(), 0xbeef);
            assert_eq!(
                (memory.read_word(addr).unwrap() >> 8) & 0xFF,
                memory.read_byte(addr).unwrap() as u16
            );
        }
    }

    #[test]
    fn test_write_outside_dynamic_rejected() {
        let mut memory = Memory::load(blank_story(3)).unwrap();
        let static_base = memory.header.base_static_mem as u32;
        assert!(matches!(
            memory.write_byte(static_base, 1),
            Err(ZlurkError::WriteOutsideDynamic(_))
        ));
        assert!(matches!(
            memory.write_word(static_base - 1, 1),
            Err(ZlurkError::WriteOutsideDynamic(_))
        ));
        assert!(memory.write_byte(static_base - 1, 1).is_ok());
    }

    #[test]
    fn test_read_out_of_range_rejected() {
        let memory = Memory::load(blank_story(3)).unwrap();
        let end = memory.len() as u32;
        assert!(matches!(
            memory.read_byte(end),
            Err(ZlurkError::AddressOutOfRange(_))
        ));
        assert!(matches!(
            memory.read_word(end - 1),
            Err(ZlurkError::AddressOutOfRange(_))
        ));
    }

    #[test]
    fn test_unpack_per_version() {
        let memory = Memory::load(blank_story(3)).unwrap();
        assert_eq!(memory.unpack_routine(0x2a39), 2 * 0x2a39);
        assert_eq!(memory.unpack_string(0x1000), 2 * 0x1000);

        let memory = Memory::load(blank_story(5)).unwrap();
        assert_eq!(memory.unpack_routine(0x1000), 4 * 0x1000);

        let memory = Memory::load(blank_story(8)).unwrap();
        assert_eq!(memory.unpack_routine(0x1000), 8 * 0x1000);
    }

    #[test]
    fn test_unpack_v7_applies_offsets() {
        let mut story = blank_story(7);
        story[0x28] = 0x00;
        story[0x29] = 0x10; // routine offset 0x10
        story[0x2a] = 0x00;
        story[0x2b] = 0x20; // strings offset 0x20
        let memory = Memory::load(story).unwrap();
        assert_eq!(memory.unpack_routine(0x100), 4 * 0x100 + 8 * 0x10);
        assert_eq!(memory.unpack_string(0x100), 4 * 0x100 + 8 * 0x20);
    }

    #[test]
    fn test_load_rejects_short_file() {
        assert!(matches!(
            Memory::load(vec![3u8; 32]),
            Err(ZlurkError::StoryTooSmall(32))
        ));
    }

    #[test]
    fn test_load_rejects_oversize_file() {
        let mut story = blank_story(3);
        story.resize(MAX_STORY_SIZE + 1, 0);
        assert!(matches!(
            Memory::load(story),
            Err(ZlurkError::StoryTooLarge(_))
        ));
    }

    #[test]
    fn test_load_rejects_bad_version() {
        let mut story = blank_story(3);
        story[0] = 0;
        assert!(matches!(
            Memory::load(story.clone()),
            Err(ZlurkError::UnsupportedVersion(0))
        ));
        story[0] = 9;
        assert!(matches!(
            Memory::load(story),
            Err(ZlurkError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_load_rejects_static_inside_header() {
        let mut story = blank_story(3);
        story[0x0e] = 0x00;
        story[0x0f] = 0x20; // static base 0x20 < 64
        assert!(matches!(
            Memory::load(story),
            Err(ZlurkError::StaticBelowHeader(0x20))
        ));
    }

    #[test]
    fn test_load_rejects_exhausted_address_space() {
        let mut story = blank_story(3);
        story[0x0e] = 0x80;
        story[0x0f] = 0x01; // static base 0x8001: twice that tops 65534
        assert!(matches!(
            Memory::load(story),
            Err(ZlurkError::AddressSpaceExhausted)
        ));
    }
}
