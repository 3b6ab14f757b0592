//! On-disk structures of an ELF32 object file
//!
//! Every structure here is a plain value decoded from (and encodable back
//! to) the little-endian wire layout of the System V ABI, i386 supplement.
//! Decoding never borrows from the input buffer; the zero-copy views over
//! tables of these structures live in the parser.

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;

use crate::error::{Error, Result};

/// A 16-bit unsigned value in an ELF32 file
pub type Half = u16;
/// A 32-bit unsigned value in an ELF32 file
pub type Word = u32;
/// A 32-bit signed value in an ELF32 file
pub type Sword = i32;
/// A 32-bit virtual address in an ELF32 file
pub type Addr = u32;
/// A 32-bit file offset in an ELF32 file
pub type Off = u32;

/// The number of identification bytes at the start of the file
pub const EI_NIDENT: usize = 16;

/// The required leading identification bytes: magic, 32-bit class,
/// little-endian data encoding, current version
pub const IDENT_PREFIX: [u8; 7] = [0x7f, b'E', b'L', b'F', 1, 1, 1];

/// Decode an owned instance of a structure from the front of a byte slice
pub trait FromBytes: Sized {
    /// The wire size of the structure
    const SIZE: usize;

    /// Decode an instance from the first [`Self::SIZE`] bytes of `data`
    fn from_bytes(data: &[u8]) -> Result<Self>;
}

/// Encode an instance of a structure to its wire layout
pub trait ToBytes {
    /// Append the wire encoding of `self` to `out`
    fn to_bytes(&self, out: &mut Vec<u8>);
}

fn check_len(data: &[u8], size: usize) -> Result<()> {
    if data.len() < size {
        return Err(Error::OutOfRange {
            offset: 0,
            size,
            len: data.len(),
        });
    }
    Ok(())
}

fn half(data: &[u8], offset: usize) -> Half {
    Half::from_le_bytes([data[offset], data[offset + 1]])
}

fn word(data: &[u8], offset: usize) -> Word {
    Word::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[non_exhaustive]
/// The ELF object type
pub enum ObjectKind {
    /// No file type
    None = 0,
    /// Relocatable file
    Relocatable = 1,
    /// Executable file
    Executable = 2,
    /// Shared object file
    Dynamic = 3,
    /// Core file
    Core = 4,
}

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[non_exhaustive]
/// The ELF object's machine
pub enum Machine {
    /// No machine
    None = 0,
    /// AT&T WE 32100
    M32 = 1,
    /// SPARC
    Sparc = 2,
    /// Intel 80386
    I386 = 3,
    /// Motorola 68000
    M68k = 4,
    /// Motorola 88000
    M88k = 5,
    /// Intel 80860
    I860 = 7,
    /// MIPS RS3000
    Mips = 8,
}

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[non_exhaustive]
/// The type of a program header
pub enum SegmentKind {
    /// Unused entry
    Null = 0,
    /// Loadable segment
    Load = 1,
    /// Dynamic linking information
    Dynamic = 2,
    /// Interpreter path
    Interp = 3,
    /// Auxiliary information
    Note = 4,
    /// Reserved with unspecified semantics
    Shlib = 5,
    /// The program header table itself
    Phdr = 6,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Permission flags of a program header
    pub struct SegmentFlags: Word {
        /// The segment is executable
        const EXEC = 0x1;
        /// The segment is writable
        const WRITE = 0x2;
        /// The segment is readable
        const READ = 0x4;
    }
}

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[non_exhaustive]
/// The type of a section header
pub enum SectionKind {
    /// Inactive section header
    Null = 0,
    /// Program-defined contents
    ProgBits = 1,
    /// Full symbol table
    SymTab = 2,
    /// String table
    StrTab = 3,
    /// Relocations with explicit addends
    RelA = 4,
    /// Symbol hash table
    Hash = 5,
    /// Dynamic linking information
    Dynamic = 6,
    /// File mark
    Note = 7,
    /// Zero-initialized contents occupying no file space
    NoBits = 8,
    /// Relocations without explicit addends
    Rel = 9,
    /// Reserved with unspecified semantics
    Shlib = 10,
    /// Minimal symbol table for dynamic linking
    DynSym = 11,
}

impl SectionKind {
    /// Start of the processor-specific section type range
    pub const LOPROC: Word = 0x7000_0000;
    /// End of the processor-specific section type range
    pub const HIPROC: Word = 0x7fff_ffff;
    /// Start of the application-specific section type range
    pub const LOUSER: Word = 0x8000_0000;
    /// End of the application-specific section type range
    pub const HIUSER: Word = 0xffff_ffff;
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[non_exhaustive]
/// i386 relocation types
pub enum RelocationKind {
    /// No action
    None = 0,
    /// `S + A`
    Abs32 = 1,
    /// `S + A - P`
    Pc32 = 2,
    /// `G + A - P`
    Got32 = 3,
    /// `L + A - P`
    Plt32 = 4,
    /// Copy the symbol at load time
    Copy = 5,
    /// `S`, into a GOT entry
    GlobDat = 6,
    /// `S`, into a PLT entry
    JmpSlot = 7,
    /// `B + A`
    Relative = 8,
    /// `S + A - GOT`
    GotOff = 9,
    /// `GOT + A - P`
    GotPc = 10,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// The ELF32 file header
pub struct FileHeader {
    /// Identification bytes
    pub e_ident: [u8; EI_NIDENT],
    /// The object file type
    pub e_type: Half,
    /// The required machine
    pub e_machine: Half,
    /// The file's version
    pub e_version: Word,
    /// Virtual address of the entry point
    pub e_entry: Addr,
    /// File offset of the program header table
    pub e_phoff: Off,
    /// File offset of the section header table
    pub e_shoff: Off,
    /// Processor-specific flags
    pub e_flags: Word,
    /// Size of this header in bytes
    pub e_ehsize: Half,
    /// Size of one program header table entry
    pub e_phentsize: Half,
    /// Number of program header table entries
    pub e_phnum: Half,
    /// Size of one section header table entry
    pub e_shentsize: Half,
    /// Number of section header table entries
    pub e_shnum: Half,
    /// Section header table index of the section name string table
    pub e_shstrndx: Half,
}

impl FileHeader {
    /// The object file type, if it is a known type
    pub fn kind(&self) -> Option<ObjectKind> {
        ObjectKind::from_u16(self.e_type)
    }

    /// The machine, if it is a known machine
    pub fn machine(&self) -> Option<Machine> {
        Machine::from_u16(self.e_machine)
    }
}

impl FromBytes for FileHeader {
    const SIZE: usize = 52;

    fn from_bytes(data: &[u8]) -> Result<Self> {
        check_len(data, Self::SIZE)?;
        let mut e_ident = [0u8; EI_NIDENT];
        e_ident.copy_from_slice(&data[..EI_NIDENT]);
        Ok(Self {
            e_ident,
            e_type: half(data, 16),
            e_machine: half(data, 18),
            e_version: word(data, 20),
            e_entry: word(data, 24),
            e_phoff: word(data, 28),
            e_shoff: word(data, 32),
            e_flags: word(data, 36),
            e_ehsize: half(data, 40),
            e_phentsize: half(data, 42),
            e_phnum: half(data, 44),
            e_shentsize: half(data, 46),
            e_shnum: half(data, 48),
            e_shstrndx: half(data, 50),
        })
    }
}

impl ToBytes for FileHeader {
    fn to_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.e_ident);
        out.extend_from_slice(&self.e_type.to_le_bytes());
        out.extend_from_slice(&self.e_machine.to_le_bytes());
        out.extend_from_slice(&self.e_version.to_le_bytes());
        out.extend_from_slice(&self.e_entry.to_le_bytes());
        out.extend_from_slice(&self.e_phoff.to_le_bytes());
        out.extend_from_slice(&self.e_shoff.to_le_bytes());
        out.extend_from_slice(&self.e_flags.to_le_bytes());
        out.extend_from_slice(&self.e_ehsize.to_le_bytes());
        out.extend_from_slice(&self.e_phentsize.to_le_bytes());
        out.extend_from_slice(&self.e_phnum.to_le_bytes());
        out.extend_from_slice(&self.e_shentsize.to_le_bytes());
        out.extend_from_slice(&self.e_shnum.to_le_bytes());
        out.extend_from_slice(&self.e_shstrndx.to_le_bytes());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// An ELF32 program header
pub struct ProgramHeader {
    /// The kind of segment this header describes
    pub p_type: Word,
    /// File offset of the segment's contents
    pub p_offset: Off,
    /// Virtual address of the segment's contents
    pub p_vaddr: Addr,
    /// Physical address of the segment's contents, ignored on this host
    pub p_paddr: Addr,
    /// Size of the segment's contents in the file
    pub p_filesz: Word,
    /// Size of the segment's contents in memory
    pub p_memsz: Word,
    /// Permission flags
    pub p_flags: Word,
    /// Alignment constraint
    pub p_align: Word,
}

impl ProgramHeader {
    /// The segment kind, if it is a known kind
    pub fn kind(&self) -> Option<SegmentKind> {
        SegmentKind::from_u32(self.p_type)
    }

    /// The permission flags, with unknown bits dropped
    pub fn flags(&self) -> SegmentFlags {
        SegmentFlags::from_bits_truncate(self.p_flags)
    }
}

impl FromBytes for ProgramHeader {
    const SIZE: usize = 32;

    fn from_bytes(data: &[u8]) -> Result<Self> {
        check_len(data, Self::SIZE)?;
        Ok(Self {
            p_type: word(data, 0),
            p_offset: word(data, 4),
            p_vaddr: word(data, 8),
            p_paddr: word(data, 12),
            p_filesz: word(data, 16),
            p_memsz: word(data, 20),
            p_flags: word(data, 24),
            p_align: word(data, 28),
        })
    }
}

impl ToBytes for ProgramHeader {
    fn to_bytes(&self, out: &mut Vec<u8>) {
        for field in [
            self.p_type,
            self.p_offset,
            self.p_vaddr,
            self.p_paddr,
            self.p_filesz,
            self.p_memsz,
            self.p_flags,
            self.p_align,
        ] {
            out.extend_from_slice(&field.to_le_bytes());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// An ELF32 section header
pub struct SectionHeader {
    /// Offset of the section's name in the section name string table
    pub sh_name: Word,
    /// The type of the section
    pub sh_type: Word,
    /// Section flags
    pub sh_flags: Word,
    /// Virtual address of the section during execution
    pub sh_addr: Addr,
    /// File offset of the section's contents
    pub sh_offset: Off,
    /// Size of the section's contents in bytes
    pub sh_size: Word,
    /// Section header table index link, meaning depends on the type
    pub sh_link: Word,
    /// Extra information, meaning depends on the type
    pub sh_info: Word,
    /// Alignment constraint
    pub sh_addralign: Word,
    /// Size of one entry, for sections holding a table
    pub sh_entsize: Word,
}

impl SectionHeader {
    /// The section kind, if it is a known kind
    pub fn kind(&self) -> Option<SectionKind> {
        SectionKind::from_u32(self.sh_type)
    }
}

impl FromBytes for SectionHeader {
    const SIZE: usize = 40;

    fn from_bytes(data: &[u8]) -> Result<Self> {
        check_len(data, Self::SIZE)?;
        Ok(Self {
            sh_name: word(data, 0),
            sh_type: word(data, 4),
            sh_flags: word(data, 8),
            sh_addr: word(data, 12),
            sh_offset: word(data, 16),
            sh_size: word(data, 20),
            sh_link: word(data, 24),
            sh_info: word(data, 28),
            sh_addralign: word(data, 32),
            sh_entsize: word(data, 36),
        })
    }
}

impl ToBytes for SectionHeader {
    fn to_bytes(&self, out: &mut Vec<u8>) {
        for field in [
            self.sh_name,
            self.sh_type,
            self.sh_flags,
            self.sh_addr,
            self.sh_offset,
            self.sh_size,
            self.sh_link,
            self.sh_info,
            self.sh_addralign,
            self.sh_entsize,
        ] {
            out.extend_from_slice(&field.to_le_bytes());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// An entry in an ELF32 symbol table
pub struct Symbol {
    /// Offset of the symbol's name in the linked string table
    pub st_name: Word,
    /// The symbol's value, a virtual address for shared objects
    pub st_value: Addr,
    /// The symbol's size
    pub st_size: Word,
    /// Type and binding attributes
    pub st_info: u8,
    /// Reserved
    pub st_other: u8,
    /// Index of the section the symbol is defined in
    pub st_shndx: Half,
}

impl FromBytes for Symbol {
    const SIZE: usize = 16;

    fn from_bytes(data: &[u8]) -> Result<Self> {
        check_len(data, Self::SIZE)?;
        Ok(Self {
            st_name: word(data, 0),
            st_value: word(data, 4),
            st_size: word(data, 8),
            st_info: data[12],
            st_other: data[13],
            st_shndx: half(data, 14),
        })
    }
}

impl ToBytes for Symbol {
    fn to_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.st_name.to_le_bytes());
        out.extend_from_slice(&self.st_value.to_le_bytes());
        out.extend_from_slice(&self.st_size.to_le_bytes());
        out.push(self.st_info);
        out.push(self.st_other);
        out.extend_from_slice(&self.st_shndx.to_le_bytes());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A relocation entry without an explicit addend
pub struct Rel {
    /// Virtual address of the word the relocation patches
    pub r_offset: Addr,
    /// Packed relocation type and symbol table index
    pub r_info: Word,
}

impl Rel {
    /// The raw relocation type, the low 8 bits of `r_info`
    pub fn kind_raw(&self) -> u8 {
        (self.r_info & 0xff) as u8
    }

    /// The relocation kind, if it is a known kind
    pub fn kind(&self) -> Option<RelocationKind> {
        RelocationKind::from_u8(self.kind_raw())
    }

    /// The symbol table index, the upper 24 bits of `r_info`
    pub fn sym(&self) -> u32 {
        self.r_info >> 8
    }
}

impl FromBytes for Rel {
    const SIZE: usize = 8;

    fn from_bytes(data: &[u8]) -> Result<Self> {
        check_len(data, Self::SIZE)?;
        Ok(Self {
            r_offset: word(data, 0),
            r_info: word(data, 4),
        })
    }
}

impl ToBytes for Rel {
    fn to_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.r_offset.to_le_bytes());
        out.extend_from_slice(&self.r_info.to_le_bytes());
    }
}
