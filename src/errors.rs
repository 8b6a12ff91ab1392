use thiserror::Error;

pub type ZlurkResult<T> = Result<T, ZlurkError>;

/// Every way the interpreter can fail.
///
/// Load faults abort before the first instruction runs and map to exit
/// code 1; decode and execution faults map to exit code 2. There is no
/// recovery path: once an error reaches the run loop the machine stops.
#[derive(Debug, Error)]
pub enum ZlurkError {
    // ---- Load faults ----
    #[error("story file I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("story file is {0} bytes, smaller than the 64-byte header")]
    StoryTooSmall(usize),

    #[error("story file is {0} bytes, beyond the 65534-byte addressable space")]
    StoryTooLarge(usize),

    #[error("unsupported story version {0}")]
    UnsupportedVersion(u8),

    #[error("static memory begins at {0:#06x}, inside the header")]
    StaticBelowHeader(u16),

    #[error("dynamic plus static memory exceeds the addressable space")]
    AddressSpaceExhausted,

    // ---- Decode faults ----
    #[error("unknown {encoding} opcode {number:#04x} for version {version}")]
    UnknownOpcode {
        encoding: &'static str,
        number: u8,
        version: u8,
    },

    #[error("instruction at {0:#07x} runs past the end of the story")]
    InstructionOverrun(u32),

    // ---- Execution faults ----
    #[error("address {0:#07x} is outside the story")]
    AddressOutOfRange(u32),

    #[error("write to non-dynamic memory at {0:#06x}")]
    WriteOutsideDynamic(u32),

    #[error("pop from an empty value stack")]
    StackUnderflow,

    #[error("value stack overflow")]
    StackOverflow,

    #[error("return with no active routine")]
    CallStackUnderflow,

    #[error("variable {var:#04x} names local {local} but the routine has {count} locals")]
    InvalidLocal { var: u8, local: u8, count: u8 },

    #[error("invalid object number {0}")]
    InvalidObject(u16),

    #[error("invalid attribute number {0}")]
    InvalidAttribute(u16),

    #[error("invalid property number {0}")]
    InvalidProperty(u16),

    #[error("object {obj} has no property {prop}")]
    MissingProperty { obj: u16, prop: u16 },

    #[error("property {prop} of object {obj} is {len} bytes, neither byte nor word")]
    OversizeProperty { obj: u16, prop: u16, len: u16 },

    #[error("routine at {addr:#07x} claims {count} locals")]
    InvalidRoutineHeader { addr: u32, count: u8 },

    #[error("division by zero")]
    DivisionByZero,

    #[error("{name} expects more operands (got {got})")]
    BadOperandCount { name: &'static str, got: usize },

    #[error("opcode {0} is not implemented")]
    Unimplemented(&'static str),

    /// Wrapper added by the run loop so a diagnostic always carries the
    /// program counter and mnemonic of the faulting instruction.
    #[error("{source} (pc {pc:05x}, {mnemonic})")]
    Fault {
        pc: u32,
        mnemonic: &'static str,
        #[source]
        source: Box<ZlurkError>,
    },
}

impl ZlurkError {
    /// Attach instruction context to an error bubbling out of the engine.
    pub fn at(self, pc: u32, mnemonic: &'static str) -> ZlurkError {
        match self {
            // Never double-wrap.
            fault @ ZlurkError::Fault { .. } => fault,
            other => ZlurkError::Fault {
                pc,
                mnemonic,
                source: Box::new(other),
            },
        }
    }

    /// Process exit code for this fault: 1 for load faults, 2 for decode
    /// and execution faults.
    pub fn exit_code(&self) -> i32 {
        match self {
            ZlurkError::Io(_)
            | ZlurkError::StoryTooSmall(_)
            | ZlurkError::StoryTooLarge(_)
            | ZlurkError::UnsupportedVersion(_)
            | ZlurkError::StaticBelowHeader(_)
            | ZlurkError::AddressSpaceExhausted => 1,
            ZlurkError::Fault { source, .. } => source.exit_code(),
            _ => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ZlurkError::StoryTooSmall(10).exit_code(), 1);
        assert_eq!(ZlurkError::UnsupportedVersion(9).exit_code(), 1);
        assert_eq!(ZlurkError::StackUnderflow.exit_code(), 2);
        assert_eq!(
            ZlurkError::UnknownOpcode {
                encoding: "0OP",
                number: 0x0e,
                version: 3
            }
            .exit_code(),
            2
        );
    }

    #[test]
    fn test_fault_wrapper_keeps_source_exit_code() {
        let err = ZlurkError::DivisionByZero.at(0x47d9, "div");
        assert_eq!(err.exit_code(), 2);
        let msg = format!("{err}");
        assert!(msg.contains("047d9"));
        assert!(msg.contains("div"));
    }

    #[test]
    fn test_fault_wrapper_does_not_nest() {
        let err = ZlurkError::StackUnderflow.at(0x100, "pull").at(0x200, "je");
        match err {
            ZlurkError::Fault { pc, mnemonic, .. } => {
                assert_eq!(pc, 0x100);
                assert_eq!(mnemonic, "pull");
            }
            other => panic!("expected Fault, got {other:?}"),
        }
    }
}
