//! Runtime-emitted bridges between 32-bit guest code and the host libc
//!
//! A guest object imports libc functions it cannot link against: the
//! host's libc is 64-bit code reached through a different calling
//! convention. For each configured entry this module emits a small
//! trampoline into a low-memory executable region. The trampoline is
//! entered by a near call from 32-bit code, switches to the host's 64-bit
//! code segment with a far call, moves the guest's stack-passed argument
//! into the register the host convention expects, calls the real libc
//! function, and far-returns into the guest's segment.
//!
//! The emission happens once per process. While trampolines are being
//! written the region is briefly writable and executable; write permission
//! is revoked before the table is published.

use std::sync::OnceLock;

use crate::{
    error::{Error, Result},
    mem::{LowRegion, Prot},
};

/// Selector of the host's 64-bit code segment descriptor
///
/// Both selectors are fixed by the host kernel's GDT layout; this crate
/// assumes the Linux x86_64 arrangement, where 0x33 is the 64-bit user
/// code segment and 0x23 the 32-bit compatibility segment.
pub const HOST_CODE_SELECTOR: u16 = 0x33;

/// Selector of the host's 32-bit compatibility code segment descriptor
pub const COMPAT_CODE_SELECTOR: u16 = 0x23;

/// Every emitted entry starts on a boundary of this many bytes
pub const TRAMPOLINE_ALIGN: usize = 0x20;

/// Size of the emitted-code region
pub const REGION_SIZE: usize = 8192;

/// Prologue moving the first 32-bit stack argument into `%edi`
///
/// At this point the stack holds the guest's near return address and the
/// far call's 8-byte segment-and-offset return frame, so the first
/// argument sits 12 bytes up.
pub const MOV_STACK_ARG0_EDI: [u8; 4] = [0x8b, 0x7c, 0x24, 0x0c];

/// Size of the segment-switching entry sequence of a trampoline
const ENTER_SIZE: usize = 8;

/// Size of a near call with a 32-bit displacement
const CALL_NEAR_SIZE: usize = 5;

/// One libc entry to emit a trampoline for
#[derive(Debug, Clone, Copy)]
pub struct ShimSpec {
    /// The guest-visible symbol name
    pub name: &'static str,
    /// Address of the host function the trampoline calls
    pub target: usize,
    /// 64-bit code run before the call, typically argument shuffling
    pub prologue: &'static [u8],
    /// 64-bit code run after the call returns
    pub epilogue: &'static [u8],
}

/// The default entry set: the libc functions the stock guest objects
/// import
pub fn default_specs() -> [ShimSpec; 3] {
    [
        ShimSpec {
            name: "abort",
            target: libc::abort as usize,
            prologue: &[],
            epilogue: &[],
        },
        ShimSpec {
            name: "abs",
            target: libc::abs as usize,
            prologue: &MOV_STACK_ARG0_EDI,
            epilogue: &[],
        },
        ShimSpec {
            name: "atoi",
            target: libc::atoi as usize,
            prologue: &MOV_STACK_ARG0_EDI,
            epilogue: &[],
        },
    ]
}

/// Render the trampoline for `spec`, assuming it will be placed at `base`
///
/// Layout:
///
/// ```text
/// enter_64:   9a <imm32 base+8> <imm16 0x0033>   lcall into the host segment
///             c3                                 landing pad for direct entry
/// prologue:   per-entry bytes
/// call:       e8 <rel32 target>                  near call to the host function
/// epilogue:   per-entry bytes
/// exit_64:    cb                                 far return to the guest segment
/// ```
///
/// The `lcall` operand is patched with the absolute address of the byte
/// following `enter_64`. When the host function is outside `rel32` range
/// of the region, the near call is replaced with an absolute call through
/// `%rax`.
pub fn render(spec: &ShimSpec, base: u32) -> Vec<u8> {
    let mut code = Vec::with_capacity(TRAMPOLINE_ALIGN);
    code.push(0x9a);
    code.extend_from_slice(&(base + ENTER_SIZE as u32).to_le_bytes());
    code.extend_from_slice(&HOST_CODE_SELECTOR.to_le_bytes());
    code.push(0xc3);

    code.extend_from_slice(spec.prologue);

    let next = u64::from(base) + code.len() as u64 + CALL_NEAR_SIZE as u64;
    match i32::try_from(spec.target as i64 - next as i64) {
        Ok(displacement) => {
            code.push(0xe8);
            code.extend_from_slice(&displacement.to_le_bytes());
        }
        Err(_) => {
            code.extend_from_slice(&[0x48, 0xb8]);
            code.extend_from_slice(&(spec.target as u64).to_le_bytes());
            code.extend_from_slice(&[0xff, 0xd0]);
        }
    }

    code.extend_from_slice(spec.epilogue);
    code.push(0xcb);
    code
}

/// Render the 64-to-32 entry thunk, assuming it will be placed at `base`
///
/// The thunk is the inverse bridge: 64-bit host code calls it with a
/// 32-bit entry point in `%edi` and an argument in `%esi`; it far-calls a
/// 32-bit fragment of itself which pushes the argument the way a cdecl
/// caller would and near-calls the entry. It must be emitted into low
/// memory because the far call's return slot holds only a 32-bit
/// instruction pointer.
fn render_enter_thunk(base: u32) -> Vec<u8> {
    let mut code = vec![
        0x53, // push rbx
        0x89, 0xfb, // mov ebx, edi
        0xff, 0x1d, 0x03, 0x00, 0x00, 0x00, // lcall [rip + 3]
        0x5b, // pop rbx
        0xc3, // ret
        0x90, // pad so the far pointer sits at base + 12
    ];
    // Far pointer to the 32-bit fragment below
    code.extend_from_slice(&(base + 18).to_le_bytes());
    code.extend_from_slice(&COMPAT_CODE_SELECTOR.to_le_bytes());
    // The fragment, entered with the compatibility code segment: the
    // argument is pushed four times to keep the frame shape the stock
    // guest prologues expect
    code.extend_from_slice(&[
        0x56, 0x56, 0x56, 0x56, // push esi x4
        0xff, 0xd3, // call *ebx
        0x83, 0xc4, 0x10, // add esp, 16
        0xcb, // lret
    ]);
    code
}

fn emit(region: &LowRegion, cursor: &mut usize, code: &[u8], name: &'static str) -> Result<()> {
    let aligned = code.len().next_multiple_of(TRAMPOLINE_ALIGN);
    if *cursor + aligned > region.len() {
        return Err(Error::CodeRegionFull { name });
    }
    unsafe {
        std::ptr::copy_nonoverlapping(code.as_ptr(), region.at(*cursor)?, code.len());
        if aligned > code.len() {
            // NOP pad up to the next trampoline boundary
            std::ptr::write_bytes(region.at(*cursor + code.len())?, 0x90, aligned - code.len());
        }
    }
    *cursor += aligned;
    Ok(())
}

/// The emitted trampolines and their published entry addresses
#[derive(Debug)]
pub struct ShimTable {
    region: LowRegion,
    enter32: u32,
    entries: Vec<(&'static str, u32)>,
}

impl ShimTable {
    /// Emit a trampoline per spec into a fresh low-memory region, plus the
    /// 64-to-32 entry thunk, then revoke write permission on the region
    pub fn new(specs: &[ShimSpec]) -> Result<Self> {
        let region = LowRegion::map(REGION_SIZE, Prot::READ | Prot::WRITE | Prot::EXEC)?;
        let base = region.base() as usize;
        if base % TRAMPOLINE_ALIGN != 0 {
            return Err(Error::CodeRegionMisaligned {
                addr: base,
                align: TRAMPOLINE_ALIGN,
            });
        }

        let mut cursor = 0usize;
        let enter32 = (base + cursor) as u32;
        let thunk = render_enter_thunk(enter32);
        emit(&region, &mut cursor, &thunk, "enter32")?;

        let mut entries = Vec::with_capacity(specs.len());
        for spec in specs {
            let address = (base + cursor) as u32;
            let code = render(spec, address);
            emit(&region, &mut cursor, &code, spec.name)?;
            entries.push((spec.name, address));
        }

        region.protect(0, REGION_SIZE, Prot::READ | Prot::EXEC)?;
        Ok(Self {
            region,
            enter32,
            entries,
        })
    }

    /// The published entry address for `name`
    pub fn get(&self, name: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == name)
            .map(|(_, address)| *address)
    }

    /// Every published `(name, entry address)` pair, in emission order
    pub fn entries(&self) -> &[(&'static str, u32)] {
        &self.entries
    }

    /// The 64-to-32 entry thunk
    pub fn enter32(&self) -> u32 {
        self.enter32
    }

    /// A symbol resolver over the table, returning zero for unknown names
    pub fn resolve(&self, name: &[u8]) -> u32 {
        std::str::from_utf8(name)
            .ok()
            .and_then(|name| self.get(name))
            .unwrap_or(0)
    }
}

static SHIMS: OnceLock<Result<ShimTable>> = OnceLock::new();

/// The process-wide shim table over the default entry set, built on first
/// use and read-only afterwards
pub fn shims() -> Result<&'static ShimTable> {
    SHIMS
        .get_or_init(|| ShimTable::new(&default_specs()))
        .as_ref()
        .map_err(Clone::clone)
}

/// Resolve a guest import against the process-wide shim table
///
/// Suitable as the host resolver for a loader; returns zero for unknown
/// names or if the table failed to initialize.
pub fn resolve_libc(name: &[u8]) -> u32 {
    shims().map(|table| table.resolve(name)).unwrap_or(0)
}
