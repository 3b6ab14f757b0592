//! A hand-assembled ELF32-i386 shared object for tests
//!
//! The object exports three functions, written directly in machine code:
//!
//! - `ident` returns its argument
//! - `twice` returns its argument doubled
//! - `call_abs` pushes its argument and calls the host `abs` through a
//!   GOT slot, exercising the RELATIVE and JMP_SLOT relocations
//!
//! It also carries a PC32 call site and an Abs32 word referencing the
//! imported `abs`, and a GLOB_DAT slot naming the imported `atoi`, so
//! every handled relocation type appears at a known address with a known
//! addend.

use std::path::PathBuf;

use crate::format::{
    FileHeader, ProgramHeader, Rel, SectionHeader, SectionKind, SegmentFlags, SegmentKind, Symbol,
    ToBytes, EI_NIDENT, IDENT_PREFIX,
};

/// Virtual address of `ident`
pub const IDENT_VADDR: u32 = 0x100;
/// Virtual address of `twice`
pub const TWICE_VADDR: u32 = 0x110;
/// Virtual address of `call_abs`
pub const CALL_ABS_VADDR: u32 = 0x120;
/// Virtual address of the GOT-slot displacement inside `call_abs`
pub const CALL_ABS_DISP_VADDR: u32 = 0x127;
/// Virtual address of the PC32-relocated call displacement
pub const PC32_SITE_VADDR: u32 = 0x141;
/// Addend stored at the PC32 site
pub const PC32_ADDEND: i32 = -4;
/// Virtual address of the Abs32-relocated word
pub const ABS32_SITE_VADDR: u32 = 0x150;
/// Addend stored at the Abs32 site
pub const ABS32_ADDEND: u32 = 0x10;
/// Virtual address of the GOT slot for the imported `abs`
pub const GOT_ABS_VADDR: u32 = 0x200;
/// Virtual address of the GLOB_DAT slot naming `atoi`
pub const GLOB_SLOT_VADDR: u32 = 0x204;
/// Virtual address of the slot carrying the unsupported relocation
pub const UNSUPPORTED_SLOT_VADDR: u32 = 0x208;
/// Initial content of the unsupported-relocation slot
pub const UNSUPPORTED_SLOT_CONTENT: u32 = 0xaaaa_5555;

const PHDR_OFFSET: u32 = 0x34;
const TEXT_OFFSET: u32 = 0x100;
const GOT_OFFSET: u32 = 0x200;
const DYNSYM_OFFSET: u32 = 0x300;
const DYNSTR_OFFSET: u32 = 0x3a0;
const REL_OFFSET: u32 = 0x3e0;
const SHDR_OFFSET: u32 = 0x440;
const FILE_SIZE: usize = 0x530;

const DYNSTR: &[u8] = b"\0ident\0twice\0call_abs\0abs\0atoi\0";
const NAME_IDENT: u32 = 1;
const NAME_TWICE: u32 = 7;
const NAME_CALL_ABS: u32 = 13;
const NAME_ABS: u32 = 22;
const NAME_ATOI: u32 = 26;
const SYM_ABS: u32 = 4;
const SYM_ATOI: u32 = 5;

/// STB_GLOBAL function symbol
const GLOBAL_FUNC: u8 = 0x12;

/// A built object image plus the indices the tests need
pub struct TestObject {
    /// The complete file contents
    pub bytes: Vec<u8>,
    /// Section header index of `.dynsym`
    pub dynsym_index: u32,
    /// Section header index of `.dynstr`
    pub dynstr_index: u32,
    /// Section header index of `.rel.dyn`
    pub rel_index: u32,
    /// File offset of the `.dynsym` section header
    pub dynsym_header_offset: usize,
    /// Number of relocation entries in `.rel.dyn`
    pub relocation_count: usize,
}

impl TestObject {
    /// The standard object with every handled relocation type
    pub fn build() -> Self {
        Self::assemble(false, true)
    }

    /// The standard object plus one GOT32 entry, which the loader does not
    /// handle
    pub fn build_with_unsupported_relocation() -> Self {
        Self::assemble(true, true)
    }

    /// A well-formed object whose segments are all non-loadable
    pub fn build_without_load_segments() -> Self {
        Self::assemble(false, false)
    }

    fn assemble(unsupported: bool, loadable: bool) -> Self {
        let mut bytes = vec![0u8; FILE_SIZE];

        let mut e_ident = [0u8; EI_NIDENT];
        e_ident[..IDENT_PREFIX.len()].copy_from_slice(&IDENT_PREFIX);
        put(
            &mut bytes,
            0,
            &FileHeader {
                e_ident,
                e_type: 3,
                e_machine: 3,
                e_version: 1,
                e_entry: 0,
                e_phoff: PHDR_OFFSET,
                e_shoff: SHDR_OFFSET,
                e_flags: 0,
                e_ehsize: 52,
                e_phentsize: 32,
                e_phnum: 2,
                e_shentsize: 40,
                e_shnum: 6,
                e_shstrndx: 0,
            },
        );

        let segment_kind = if loadable {
            SegmentKind::Load
        } else {
            SegmentKind::Note
        };
        put(
            &mut bytes,
            PHDR_OFFSET as usize,
            &ProgramHeader {
                p_type: segment_kind as u32,
                p_offset: 0,
                p_vaddr: 0,
                p_paddr: 0,
                p_filesz: 0x200,
                p_memsz: 0x200,
                p_flags: (SegmentFlags::READ | SegmentFlags::EXEC).bits(),
                p_align: 0x1000,
            },
        );
        put(
            &mut bytes,
            PHDR_OFFSET as usize + 32,
            &ProgramHeader {
                p_type: segment_kind as u32,
                p_offset: 0x200,
                p_vaddr: 0x200,
                p_paddr: 0,
                p_filesz: 0x100,
                p_memsz: 0x180,
                p_flags: (SegmentFlags::READ | SegmentFlags::WRITE).bits(),
                p_align: 0x1000,
            },
        );

        // ident: mov 4(%esp), %eax; ret
        bytes[IDENT_VADDR as usize..IDENT_VADDR as usize + 5]
            .copy_from_slice(&[0x8b, 0x44, 0x24, 0x04, 0xc3]);
        // twice: mov 4(%esp), %eax; add %eax, %eax; ret
        bytes[TWICE_VADDR as usize..TWICE_VADDR as usize + 7]
            .copy_from_slice(&[0x8b, 0x44, 0x24, 0x04, 0x01, 0xc0, 0xc3]);
        // call_abs: mov 4(%esp), %eax; push %eax; call *got_abs;
        //           add $4, %esp; ret
        // The call operand holds the link-time slot address, the addend of
        // its RELATIVE relocation
        let mut call_abs = vec![0x8b, 0x44, 0x24, 0x04, 0x50, 0xff, 0x15];
        call_abs.extend_from_slice(&GOT_ABS_VADDR.to_le_bytes());
        call_abs.extend_from_slice(&[0x83, 0xc4, 0x04, 0xc3]);
        bytes[CALL_ABS_VADDR as usize..CALL_ABS_VADDR as usize + call_abs.len()]
            .copy_from_slice(&call_abs);
        // An unreached call to the imported abs, relocated with PC32
        bytes[PC32_SITE_VADDR as usize - 1] = 0xe8;
        bytes[PC32_SITE_VADDR as usize..PC32_SITE_VADDR as usize + 4]
            .copy_from_slice(&PC32_ADDEND.to_le_bytes());
        // An absolute word referencing the imported abs
        bytes[ABS32_SITE_VADDR as usize..ABS32_SITE_VADDR as usize + 4]
            .copy_from_slice(&ABS32_ADDEND.to_le_bytes());

        bytes[UNSUPPORTED_SLOT_VADDR as usize..UNSUPPORTED_SLOT_VADDR as usize + 4]
            .copy_from_slice(&UNSUPPORTED_SLOT_CONTENT.to_le_bytes());

        let symbols = [
            Symbol {
                st_name: 0,
                st_value: 0,
                st_size: 0,
                st_info: 0,
                st_other: 0,
                st_shndx: 0,
            },
            Symbol {
                st_name: NAME_IDENT,
                st_value: IDENT_VADDR,
                st_size: 5,
                st_info: GLOBAL_FUNC,
                st_other: 0,
                st_shndx: 1,
            },
            Symbol {
                st_name: NAME_TWICE,
                st_value: TWICE_VADDR,
                st_size: 7,
                st_info: GLOBAL_FUNC,
                st_other: 0,
                st_shndx: 1,
            },
            Symbol {
                st_name: NAME_CALL_ABS,
                st_value: CALL_ABS_VADDR,
                st_size: 15,
                st_info: GLOBAL_FUNC,
                st_other: 0,
                st_shndx: 1,
            },
            Symbol {
                st_name: NAME_ABS,
                st_value: 0,
                st_size: 0,
                st_info: GLOBAL_FUNC,
                st_other: 0,
                st_shndx: 0,
            },
            Symbol {
                st_name: NAME_ATOI,
                st_value: 0,
                st_size: 0,
                st_info: GLOBAL_FUNC,
                st_other: 0,
                st_shndx: 0,
            },
        ];
        for (index, symbol) in symbols.iter().enumerate() {
            put(&mut bytes, DYNSYM_OFFSET as usize + index * 16, symbol);
        }

        bytes[DYNSTR_OFFSET as usize..DYNSTR_OFFSET as usize + DYNSTR.len()]
            .copy_from_slice(DYNSTR);

        let mut relocations = vec![
            Rel {
                r_offset: CALL_ABS_DISP_VADDR,
                r_info: 8,
            },
            Rel {
                r_offset: GOT_ABS_VADDR,
                r_info: (SYM_ABS << 8) | 7,
            },
            Rel {
                r_offset: GLOB_SLOT_VADDR,
                r_info: (SYM_ATOI << 8) | 6,
            },
            Rel {
                r_offset: PC32_SITE_VADDR,
                r_info: (SYM_ABS << 8) | 2,
            },
            Rel {
                r_offset: ABS32_SITE_VADDR,
                r_info: (SYM_ABS << 8) | 1,
            },
        ];
        if unsupported {
            relocations.push(Rel {
                r_offset: UNSUPPORTED_SLOT_VADDR,
                r_info: (SYM_ABS << 8) | 3,
            });
        }
        for (index, relocation) in relocations.iter().enumerate() {
            put(&mut bytes, REL_OFFSET as usize + index * 8, relocation);
        }

        let sections = [
            SectionHeader {
                sh_name: 0,
                sh_type: SectionKind::Null as u32,
                sh_flags: 0,
                sh_addr: 0,
                sh_offset: 0,
                sh_size: 0,
                sh_link: 0,
                sh_info: 0,
                sh_addralign: 0,
                sh_entsize: 0,
            },
            SectionHeader {
                sh_name: 0,
                sh_type: SectionKind::ProgBits as u32,
                sh_flags: 0x6,
                sh_addr: TEXT_OFFSET,
                sh_offset: TEXT_OFFSET,
                sh_size: 0x100,
                sh_link: 0,
                sh_info: 0,
                sh_addralign: 16,
                sh_entsize: 0,
            },
            SectionHeader {
                sh_name: 0,
                sh_type: SectionKind::ProgBits as u32,
                sh_flags: 0x3,
                sh_addr: GOT_OFFSET,
                sh_offset: GOT_OFFSET,
                sh_size: 0x10,
                sh_link: 0,
                sh_info: 0,
                sh_addralign: 4,
                sh_entsize: 4,
            },
            SectionHeader {
                sh_name: 0,
                sh_type: SectionKind::DynSym as u32,
                sh_flags: 0x2,
                sh_addr: DYNSYM_OFFSET,
                sh_offset: DYNSYM_OFFSET,
                sh_size: (symbols.len() * 16) as u32,
                sh_link: 4,
                sh_info: 1,
                sh_addralign: 4,
                sh_entsize: 16,
            },
            SectionHeader {
                sh_name: 0,
                sh_type: SectionKind::StrTab as u32,
                sh_flags: 0x2,
                sh_addr: DYNSTR_OFFSET,
                sh_offset: DYNSTR_OFFSET,
                sh_size: DYNSTR.len() as u32,
                sh_link: 0,
                sh_info: 0,
                sh_addralign: 1,
                sh_entsize: 0,
            },
            SectionHeader {
                sh_name: 0,
                sh_type: SectionKind::Rel as u32,
                sh_flags: 0x2,
                sh_addr: REL_OFFSET,
                sh_offset: REL_OFFSET,
                sh_size: (relocations.len() * 8) as u32,
                sh_link: 3,
                sh_info: 0,
                sh_addralign: 4,
                sh_entsize: 8,
            },
        ];
        for (index, section) in sections.iter().enumerate() {
            put(&mut bytes, SHDR_OFFSET as usize + index * 40, section);
        }

        Self {
            bytes,
            dynsym_index: 3,
            dynstr_index: 4,
            rel_index: 5,
            dynsym_header_offset: SHDR_OFFSET as usize + 3 * 40,
            relocation_count: relocations.len(),
        }
    }

    /// Write the object to a unique temporary file and return its path
    pub fn write_temp(&self, tag: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "e32ld-test-{}-{}.so",
            tag,
            std::process::id()
        ));
        #[allow(clippy::unwrap_used)]
        std::fs::write(&path, &self.bytes).unwrap();
        path
    }
}

fn put(bytes: &mut [u8], offset: usize, value: &impl ToBytes) {
    let mut encoded = Vec::new();
    value.to_bytes(&mut encoded);
    bytes[offset..offset + encoded.len()].copy_from_slice(&encoded);
}
