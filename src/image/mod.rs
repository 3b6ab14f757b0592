//! Materialization of a parsed object into a low-memory image
//!
//! The image places byte `v` of the object's virtual address space at
//! offset `v` from the mapping base, so the load base coincides with
//! virtual address zero of the object. All patching of the image goes
//! through the checked 32-bit read/write primitives here; the rest of the
//! crate stays free of raw pointer arithmetic.

use crate::{
    error::{Error, Result},
    format::SegmentKind,
    mem::{page_size, LowRegion, Prot},
    parser::Parser,
};

/// An owned, loaded copy of a shared object in low memory
#[derive(Debug)]
pub struct Image {
    region: LowRegion,
}

impl Image {
    /// Copy every LOAD segment of `parser`'s object into a fresh
    /// readable-and-writable low-memory mapping
    ///
    /// The mapping covers the object's virtual address space rounded up to
    /// the page size. Bytes between a segment's file size and its memory
    /// size stay zero from the anonymous mapping.
    pub fn build(parser: &Parser) -> Result<Self> {
        let total = parser
            .program_headers()?
            .filter(|ph| ph.kind() == Some(SegmentKind::Load))
            .map(|ph| ph.p_vaddr as usize + ph.p_memsz as usize)
            .max()
            .ok_or(Error::NoLoadSegment)?;
        let allocated = total.next_multiple_of(page_size());
        let region = LowRegion::map(allocated, Prot::READ | Prot::WRITE)?;

        for ph in parser
            .program_headers()?
            .filter(|ph| ph.kind() == Some(SegmentKind::Load))
        {
            if ph.p_filesz == 0 {
                continue;
            }
            let src = parser.raw_block(ph.p_offset, ph.p_filesz)?;
            let offset = ph.p_vaddr as usize;
            if offset + src.len() > region.len() {
                return Err(Error::OutOfRange {
                    offset,
                    size: src.len(),
                    len: region.len(),
                });
            }
            unsafe {
                std::ptr::copy_nonoverlapping(src.as_ptr(), region.at(offset)?, src.len());
            }
        }

        Ok(Self { region })
    }

    /// The region backing the image
    pub fn region(&self) -> &LowRegion {
        &self.region
    }

    /// The load base as a 32-bit address
    pub fn base_addr(&self) -> u32 {
        self.region.base_addr()
    }

    /// The size of the image in bytes, a multiple of the page size
    pub fn len(&self) -> usize {
        self.region.len()
    }

    /// Whether the image is empty
    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    /// The host address of the byte at virtual address `vaddr`
    pub fn at(&self, vaddr: u32) -> Result<*mut u8> {
        self.region.at(vaddr as usize)
    }

    /// Read the little-endian 32-bit word at virtual address `vaddr`
    ///
    /// The access is a byte-wise copy, so it has no alignment requirement.
    pub fn read_u32(&self, vaddr: u32) -> Result<u32> {
        self.check_word(vaddr)?;
        let mut buf = [0u8; 4];
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.region.base().add(vaddr as usize),
                buf.as_mut_ptr(),
                4,
            );
        }
        Ok(u32::from_le_bytes(buf))
    }

    /// Write `value` as a little-endian 32-bit word at virtual address
    /// `vaddr`
    pub fn write_u32(&mut self, vaddr: u32, value: u32) -> Result<()> {
        self.check_word(vaddr)?;
        let buf = value.to_le_bytes();
        unsafe {
            std::ptr::copy_nonoverlapping(
                buf.as_ptr(),
                self.region.base().add(vaddr as usize),
                4,
            );
        }
        Ok(())
    }

    fn check_word(&self, vaddr: u32) -> Result<()> {
        let offset = vaddr as usize;
        if offset + 4 > self.region.len() {
            return Err(Error::OutOfRange {
                offset,
                size: 4,
                len: self.region.len(),
            });
        }
        Ok(())
    }
}
