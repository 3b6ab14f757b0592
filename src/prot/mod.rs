//! Page-granular segment protections
//!
//! Segment permissions are declared with byte granularity but can only be
//! applied per page. The effective protection of a page is the union of
//! the flags of every LOAD segment touching it, the standard ELF loading
//! contract: a page shared by read-only data and executable code ends up
//! readable and executable.

use crate::{
    error::{Error, Result},
    format::{ProgramHeader, SegmentFlags, SegmentKind},
    image::Image,
    mem::{page_size, Prot},
    parser::Parser,
};

/// The host protection corresponding to a segment's permission flags
pub fn segment_prot(flags: SegmentFlags) -> Prot {
    let mut prot = Prot::empty();
    if flags.contains(SegmentFlags::READ) {
        prot |= Prot::READ;
    }
    if flags.contains(SegmentFlags::WRITE) {
        prot |= Prot::WRITE;
    }
    if flags.contains(SegmentFlags::EXEC) {
        prot |= Prot::EXEC;
    }
    prot
}

/// Compute the per-page protection union over the LOAD segments
///
/// `pages` is the number of pages in the image. Fails if a segment extends
/// past the last page.
pub fn page_protections<I>(segments: I, page_size: usize, pages: usize) -> Result<Vec<Prot>>
where
    I: IntoIterator<Item = ProgramHeader>,
{
    let mut flags = vec![Prot::empty(); pages];
    for ph in segments {
        if ph.kind() != Some(SegmentKind::Load) {
            continue;
        }
        let start = ph.p_vaddr as usize;
        let end = start + ph.p_memsz as usize;
        let first = start / page_size;
        let last = end.div_ceil(page_size);
        if last > pages {
            return Err(Error::OutOfRange {
                offset: start,
                size: end - start,
                len: pages * page_size,
            });
        }
        for page in &mut flags[first..last] {
            *page |= segment_prot(ph.flags());
        }
    }
    Ok(flags)
}

/// Apply the per-page protection union of `parser`'s LOAD segments to the
/// image
///
/// Applying twice with the same inputs yields the same protections.
pub fn apply(parser: &Parser, image: &Image) -> Result<()> {
    let page_size = page_size();
    assert_eq!(image.len() % page_size, 0);
    assert_eq!(image.region().base() as usize % page_size, 0);

    let pages = image.len() / page_size;
    let flags = page_protections(parser.program_headers()?, page_size, pages)?;
    for (index, prot) in flags.iter().enumerate() {
        image.region().protect(index * page_size, page_size, *prot)?;
    }
    Ok(())
}
