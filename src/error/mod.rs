//! Error taxonomy for DSO loading
//!
//! Every fallible operation in the crate reports through this single
//! enum, carrying the data needed to reconstruct what went wrong.

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Error type for errors during DSO loading
pub enum Error {
    #[error("An I/O error occurred: {kind}")]
    /// An underlying I/O operation on the object file failed
    Io {
        /// The kind of I/O error which occurred
        kind: std::io::ErrorKind,
    },
    #[error("Invalid ELF identification {found:02x?}")]
    /// The identification prefix is not a little-endian 32-bit current-version ELF
    InvalidIdentification {
        /// The first bytes of the file
        found: [u8; 7],
    },
    #[error("Invalid value {value} for ELF object type, expected a shared object")]
    /// The object is not a shared object
    InvalidObjectKind {
        /// The `e_type` value found in the header
        value: u16,
    },
    #[error("Invalid value {value} for ELF machine, expected i386")]
    /// The object does not target i386
    InvalidMachine {
        /// The `e_machine` value found in the header
        value: u16,
    },
    #[error("Invalid section header entry size {value}, expected {expected}")]
    /// The section header entry size does not match the ELF32 layout
    InvalidSectionEntrySize {
        /// The `e_shentsize` value found in the header
        value: u16,
        /// The entry size the ELF32 layout requires
        expected: u16,
    },
    #[error("Range [{offset:#x}, {offset:#x}+{size:#x}) escapes a buffer of {len:#x} bytes")]
    /// A derived offset or size escapes the underlying buffer or image
    OutOfRange {
        /// Start of the requested range
        offset: usize,
        /// Size of the requested range
        size: usize,
        /// Size of the buffer the range was checked against
        len: usize,
    },
    #[error("Invalid section type {found} for {accessor}")]
    /// A section of the wrong type was passed to a typed accessor
    SectionKindMismatch {
        /// The accessor which rejected the section
        accessor: &'static str,
        /// The `sh_type` value of the rejected section
        found: u32,
    },
    #[error("Section size {size:#x} is not a multiple of the {entry_size}-byte entry size")]
    /// A table section's size is not a whole number of entries
    InvalidSectionLayout {
        /// The `sh_size` value of the section
        size: u32,
        /// The size of one entry in the table
        entry_size: u32,
    },
    #[error("Unsupported relocation type {kind} at offset {offset:#x}")]
    /// A relocation entry uses a type outside the handled set
    UnsupportedRelocation {
        /// The relocation type extracted from `r_info`
        kind: u8,
        /// The `r_offset` of the entry
        offset: u32,
    },
    #[error("{operation} failed with errno {errno}")]
    /// A memory mapping or protection syscall failed
    Allocation {
        /// The syscall which failed
        operation: &'static str,
        /// The errno reported by the host
        errno: i32,
    },
    #[error("Mapping at {addr:#x} with size {size:#x} escapes the 32-bit address space")]
    /// The host placed a mapping outside the low 32-bit range
    NotLowMemory {
        /// Base address of the mapping
        addr: usize,
        /// Size of the mapping
        size: usize,
    },
    #[error("No loadable segment in object")]
    /// The object has no program header of type LOAD
    NoLoadSegment,
    #[error("No dynamic symbol table in object")]
    /// The object has no section of type DYNSYM
    NoDynamicSymbolTable,
    #[error("Symbol {name} is not exported by the object")]
    /// A symbol lookup on a loaded object failed
    NotFound {
        /// The symbol name that was requested
        name: String,
    },
    #[error("Code region base {addr:#x} is not aligned to {align} bytes")]
    /// The emitted-code region does not satisfy the trampoline alignment
    CodeRegionMisaligned {
        /// Base address of the region
        addr: usize,
        /// The required alignment
        align: usize,
    },
    #[error("Code region exhausted while emitting {name}")]
    /// The emitted-code region is too small for the configured entries
    CodeRegionFull {
        /// The entry being emitted when space ran out
        name: &'static str,
    },
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io { kind: value.kind() }
    }
}

/// Result type for DSO loading operations
pub type Result<T> = std::result::Result<T, Error>;
