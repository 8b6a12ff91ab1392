//! Object table access: attributes, tree links, and property lists.
//!
//! Object entries are 9 bytes in v3 (4 attribute bytes, byte-sized tree
//! links, property pointer at offset 7) and 14 bytes in v4+ (6 attribute
//! bytes, word-sized links, property pointer at offset 12). The table is
//! preceded by the property defaults: 31 words in v3, 63 in v4+.

use crate::errors::{ZlurkError, ZlurkResult};
use crate::memory::Memory;
use crate::text;

fn entry_size(version: u8) -> u32 {
    if version <= 3 {
        9
    } else {
        14
    }
}

fn attribute_count(version: u8) -> u16 {
    if version <= 3 {
        32
    } else {
        48
    }
}

fn max_objects(version: u8) -> u16 {
    if version <= 3 {
        255
    } else {
        65535
    }
}

pub fn max_properties(version: u8) -> u16 {
    if version <= 3 {
        31
    } else {
        63
    }
}

/// Byte address of the first object entry.
fn tree_base(memory: &Memory) -> u32 {
    let defaults_len = max_properties(memory.header.version) as u32 * 2;
    memory.header.object_table as u32 + defaults_len
}

/// Byte address of an object's entry. Object numbers are 1-based.
pub fn object_addr(memory: &Memory, obj: u16) -> ZlurkResult<u32> {
    let version = memory.header.version;
    if obj == 0 || obj > max_objects(version) {
        return Err(ZlurkError::InvalidObject(obj));
    }
    Ok(tree_base(memory) + (obj as u32 - 1) * entry_size(version))
}

/// Test attribute `attr`: bit `7 - (attr % 8)` of attribute byte
/// `attr / 8`.
pub fn test_attr(memory: &Memory, obj: u16, attr: u16) -> ZlurkResult<bool> {
    let addr = attr_byte_addr(memory, obj, attr)?;
    let byte = memory.read_byte(addr)?;
    Ok(byte & (0x80 >> (attr % 8)) != 0)
}

pub fn set_attr(memory: &mut Memory, obj: u16, attr: u16, on: bool) -> ZlurkResult<()> {
    let addr = attr_byte_addr(memory, obj, attr)?;
    let byte = memory.read_byte(addr)?;
    let mask = 0x80 >> (attr % 8);
    let updated = if on { byte | mask } else { byte & !mask };
    memory.write_byte(addr, updated)
}

fn attr_byte_addr(memory: &Memory, obj: u16, attr: u16) -> ZlurkResult<u32> {
    if attr >= attribute_count(memory.header.version) {
        return Err(ZlurkError::InvalidAttribute(attr));
    }
    Ok(object_addr(memory, obj)? + attr as u32 / 8)
}

pub fn parent(memory: &Memory, obj: u16) -> ZlurkResult<u16> {
    tree_link(memory, obj, 0)
}

pub fn sibling(memory: &Memory, obj: u16) -> ZlurkResult<u16> {
    tree_link(memory, obj, 1)
}

pub fn child(memory: &Memory, obj: u16) -> ZlurkResult<u16> {
    tree_link(memory, obj, 2)
}

/// Tree links sit after the attribute bytes: three bytes in v3, three
/// words in v4+.
fn tree_link(memory: &Memory, obj: u16, slot: u32) -> ZlurkResult<u16> {
    let addr = object_addr(memory, obj)?;
    if memory.header.version <= 3 {
        Ok(memory.read_byte(addr + 4 + slot)? as u16)
    } else {
        memory.read_word(addr + 6 + slot * 2)
    }
}

/// Byte address of an object's property table.
pub fn property_table_addr(memory: &Memory, obj: u16) -> ZlurkResult<u32> {
    let addr = object_addr(memory, obj)?;
    let pointer_offset = if memory.header.version <= 3 { 7 } else { 12 };
    Ok(memory.read_word(addr + pointer_offset)? as u32)
}

/// Decode the short name at the head of the property table. Objects with
/// an empty name yield an empty string.
pub fn short_name(memory: &Memory, obj: u16) -> ZlurkResult<String> {
    let table = property_table_addr(memory, obj)?;
    let word_count = memory.read_byte(table)?;
    if word_count == 0 {
        return Ok(String::new());
    }
    let (name, _) = text::decode_string(
        memory.bytes(),
        table as usize + 1,
        memory.header.abbrev_table as usize,
    )?;
    Ok(name)
}

/// One entry in a property list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyEntry {
    pub number: u16,
    /// Byte address of the property data (after the size byte or bytes).
    pub data_addr: u32,
    pub len: u16,
}

/// Parse the property entry whose size byte sits at `addr`. Returns
/// `None` at the zero terminator.
fn property_entry_at(memory: &Memory, addr: u32) -> ZlurkResult<Option<PropertyEntry>> {
    let size_byte = memory.read_byte(addr)?;
    if size_byte == 0 {
        return Ok(None);
    }
    if memory.header.version <= 3 {
        Ok(Some(PropertyEntry {
            number: (size_byte & 0x1F) as u16,
            data_addr: addr + 1,
            len: ((size_byte >> 5) & 0x07) as u16 + 1,
        }))
    } else if size_byte & 0x80 != 0 {
        // Two-byte form: the second byte carries the length in its low
        // six bits, with 0 meaning 64.
        let second = memory.read_byte(addr + 1)?;
        let len = match second & 0x3F {
            0 => 64,
            n => n as u16,
        };
        Ok(Some(PropertyEntry {
            number: (size_byte & 0x3F) as u16,
            data_addr: addr + 2,
            len,
        }))
    } else {
        Ok(Some(PropertyEntry {
            number: (size_byte & 0x3F) as u16,
            data_addr: addr + 1,
            len: if size_byte & 0x40 != 0 { 2 } else { 1 },
        }))
    }
}

/// Address of the first property entry, past the short name.
fn first_property_addr(memory: &Memory, obj: u16) -> ZlurkResult<u32> {
    let table = property_table_addr(memory, obj)?;
    let name_words = memory.read_byte(table)? as u32;
    Ok(table + 1 + 2 * name_words)
}

/// Walk the property list looking for `prop`. Entries are stored in
/// descending number order and end at a zero size byte.
pub fn find_property(memory: &Memory, obj: u16, prop: u16) -> ZlurkResult<Option<PropertyEntry>> {
    if prop == 0 || prop > max_properties(memory.header.version) {
        return Err(ZlurkError::InvalidProperty(prop));
    }
    let mut addr = first_property_addr(memory, obj)?;
    while let Some(entry) = property_entry_at(memory, addr)? {
        if entry.number == prop {
            return Ok(Some(entry));
        }
        if entry.number < prop {
            break;
        }
        addr = entry.data_addr + entry.len as u32;
    }
    Ok(None)
}

/// Read a property value, falling back to the defaults table when the
/// object does not provide it.
pub fn get_property(memory: &Memory, obj: u16, prop: u16) -> ZlurkResult<u16> {
    match find_property(memory, obj, prop)? {
        Some(entry) => match entry.len {
            1 => Ok(memory.read_byte(entry.data_addr)? as u16),
            2 => memory.read_word(entry.data_addr),
            len => Err(ZlurkError::OversizeProperty { obj, prop, len }),
        },
        None => memory.read_word(memory.header.object_table as u32 + 2 * (prop as u32 - 1)),
    }
}

/// Write into an existing property. Writing a missing property is fatal.
pub fn put_property(memory: &mut Memory, obj: u16, prop: u16, value: u16) -> ZlurkResult<()> {
    match find_property(memory, obj, prop)? {
        Some(entry) => match entry.len {
            1 => memory.write_byte(entry.data_addr, value as u8),
            2 => memory.write_word(entry.data_addr, value),
            len => Err(ZlurkError::OversizeProperty { obj, prop, len }),
        },
        None => Err(ZlurkError::MissingProperty { obj, prop }),
    }
}

/// Data address of a property, or 0 when the object lacks it.
pub fn property_addr(memory: &Memory, obj: u16, prop: u16) -> ZlurkResult<u16> {
    Ok(find_property(memory, obj, prop)?
        .map(|entry| entry.data_addr as u16)
        .unwrap_or(0))
}

/// Length of the property whose data starts at `data_addr`, recovered
/// from the size byte(s) just before it. Address 0 yields 0.
pub fn property_len(memory: &Memory, data_addr: u16) -> ZlurkResult<u16> {
    if data_addr == 0 {
        return Ok(0);
    }
    let size_byte = memory.read_byte(data_addr as u32 - 1)?;
    if memory.header.version <= 3 {
        Ok(((size_byte >> 5) & 0x07) as u16 + 1)
    } else if size_byte & 0x80 != 0 {
        // data_addr - 1 is the second size byte here.
        Ok(match size_byte & 0x3F {
            0 => 64,
            n => n as u16,
        })
    } else {
        Ok(if size_byte & 0x40 != 0 { 2 } else { 1 })
    }
}

/// The number of the property after `prop`, in list order. Property 0
/// asks for the first; a property the object lacks is a fault.
pub fn next_property(memory: &Memory, obj: u16, prop: u16) -> ZlurkResult<u16> {
    if prop == 0 {
        let addr = first_property_addr(memory, obj)?;
        return Ok(property_entry_at(memory, addr)?
            .map(|entry| entry.number)
            .unwrap_or(0));
    }
    match find_property(memory, obj, prop)? {
        Some(entry) => {
            let next_addr = entry.data_addr + entry.len as u32;
            Ok(property_entry_at(memory, next_addr)?
                .map(|next| next.number)
                .unwrap_or(0))
        }
        None => Err(ZlurkError::MissingProperty { obj, prop }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{blank_story, OBJECT_TABLE};

    /// Lay out a two-object v3 table. Object 1 carries attributes 2 and
    /// 11, properties 18 (word) and 5 (byte), and the short name "box".
    fn story_with_objects() -> Vec<u8> {
        let mut story = blank_story(3);
        let table = OBJECT_TABLE as usize;

        // Default for property 7 is 0x1234.
        story[table + 2 * 6] = 0x12;
        story[table + 2 * 6 + 1] = 0x34;

        let tree = table + 31 * 2;

        // Object 1: attributes 2 and 11.
        story[tree] = 0b0010_0000;
        story[tree + 1] = 0b0001_0000;
        story[tree + 4] = 0; // parent
        story[tree + 5] = 2; // sibling
        story[tree + 6] = 0; // child
        let props1 = tree + 9 + 9; // after both entries
        story[tree + 7] = (props1 >> 8) as u8;
        story[tree + 8] = (props1 & 0xFF) as u8;

        // Object 2: bare, with object 1 as parent.
        story[tree + 9 + 4] = 1;
        let props2 = props1 + 32;
        story[tree + 9 + 7] = (props2 >> 8) as u8;
        story[tree + 9 + 8] = (props2 & 0xFF) as u8;

        // Property table 1: short name "box" (2 words), then properties
        // 18 (len 2) and 5 (len 1), then the terminator.
        story[props1] = 2;
        // "box": 7, 20, 29 + pad -> 0x1E9D, 0x94A5 with high bit.
        story[props1 + 1] = 0x1E;
        story[props1 + 2] = 0x9D;
        story[props1 + 3] = 0x94;
        story[props1 + 4] = 0xA5;
        let mut p = props1 + 5;
        story[p] = (1 << 5) | 18; // len 2, property 18
        story[p + 1] = 0xAB;
        story[p + 2] = 0xCD;
        p += 3;
        story[p] = 5; // len 1, property 5
        story[p + 1] = 0x42;
        p += 2;
        story[p] = 0; // terminator

        // Property table 2: empty name, no properties.
        story[props2] = 0;
        story[props2 + 1] = 0;

        story
    }

    fn memory() -> Memory {
        Memory::load(story_with_objects()).unwrap()
    }

    #[test]
    fn test_attributes() {
        let memory = memory();
        assert!(test_attr(&memory, 1, 2).unwrap());
        assert!(test_attr(&memory, 1, 11).unwrap());
        assert!(!test_attr(&memory, 1, 3).unwrap());
        assert!(!test_attr(&memory, 2, 2).unwrap());
    }

    #[test]
    fn test_attribute_mutation() {
        let mut memory = memory();
        set_attr(&mut memory, 2, 7, true).unwrap();
        assert!(test_attr(&memory, 2, 7).unwrap());
        set_attr(&mut memory, 2, 7, false).unwrap();
        assert!(!test_attr(&memory, 2, 7).unwrap());
    }

    #[test]
    fn test_attribute_range_checked() {
        let memory = memory();
        assert!(matches!(
            test_attr(&memory, 1, 32),
            Err(ZlurkError::InvalidAttribute(32))
        ));
    }

    #[test]
    fn test_tree_links() {
        let memory = memory();
        assert_eq!(parent(&memory, 2).unwrap(), 1);
        assert_eq!(sibling(&memory, 1).unwrap(), 2);
        assert_eq!(child(&memory, 1).unwrap(), 0);
    }

    #[test]
    fn test_object_zero_rejected() {
        let memory = memory();
        assert!(matches!(
            parent(&memory, 0),
            Err(ZlurkError::InvalidObject(0))
        ));
    }

    #[test]
    fn test_get_property() {
        let memory = memory();
        assert_eq!(get_property(&memory, 1, 18).unwrap(), 0xABCD);
        assert_eq!(get_property(&memory, 1, 5).unwrap(), 0x42);
        // Missing property 7 falls back to the defaults table.
        assert_eq!(get_property(&memory, 1, 7).unwrap(), 0x1234);
    }

    #[test]
    fn test_put_property() {
        let mut memory = memory();
        put_property(&mut memory, 1, 18, 0x5678).unwrap();
        assert_eq!(get_property(&memory, 1, 18).unwrap(), 0x5678);
        // Byte-sized property keeps only the low byte.
        put_property(&mut memory, 1, 5, 0x01FF).unwrap();
        assert_eq!(get_property(&memory, 1, 5).unwrap(), 0xFF);
    }

    #[test]
    fn test_put_missing_property_is_fault() {
        let mut memory = memory();
        assert!(matches!(
            put_property(&mut memory, 1, 7, 1),
            Err(ZlurkError::MissingProperty { obj: 1, prop: 7 })
        ));
    }

    #[test]
    fn test_property_addr_and_len() {
        let memory = memory();
        let addr = property_addr(&memory, 1, 18).unwrap();
        assert_ne!(addr, 0);
        assert_eq!(property_len(&memory, addr).unwrap(), 2);
        let addr5 = property_addr(&memory, 1, 5).unwrap();
        assert_eq!(property_len(&memory, addr5).unwrap(), 1);
        assert_eq!(property_addr(&memory, 1, 7).unwrap(), 0);
        assert_eq!(property_len(&memory, 0).unwrap(), 0);
    }

    #[test]
    fn test_next_property_walks_in_order() {
        let memory = memory();
        assert_eq!(next_property(&memory, 1, 0).unwrap(), 18);
        assert_eq!(next_property(&memory, 1, 18).unwrap(), 5);
        assert_eq!(next_property(&memory, 1, 5).unwrap(), 0);
        assert!(next_property(&memory, 1, 7).is_err());
    }

    #[test]
    fn test_short_name() {
        let memory = memory();
        assert_eq!(short_name(&memory, 1).unwrap(), "box");
        assert_eq!(short_name(&memory, 2).unwrap(), "");
    }
}
