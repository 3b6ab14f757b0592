//! REL relocation processing
//!
//! Relocations are applied eagerly, in place, against the loaded image.
//! Following the REL convention the addend is the word already stored at
//! the target, and the image base stands in for the object's virtual
//! address zero.

use crate::{
    error::{Error, Result},
    format::{RelocationKind, SectionHeader, SectionKind},
    image::Image,
    parser::Parser,
};

/// A symbol resolution callback: maps a symbol name to a 32-bit address,
/// with zero meaning "unknown"
pub type Resolver<'a> = dyn Fn(&[u8]) -> u32 + 'a;

#[derive(Debug, Clone, PartialEq, Eq)]
/// What to write for a GLOB_DAT relocation
///
/// The conventional semantics write the resolved address of the symbol the
/// entry names. The alias policy instead resolves a fixed name for every
/// GLOB_DAT entry, so that a guest reading an unimplemented global lands
/// somewhere deliberate instead of at zero.
pub enum GlobDatPolicy {
    /// Write the resolved address of the named symbol
    Resolve,
    /// Write the resolved address of the alias, whatever the entry names
    MapTo(String),
}

impl Default for GlobDatPolicy {
    fn default() -> Self {
        Self::MapTo("abort".into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// What to do with a relocation type outside the handled set
pub enum Strictness {
    #[default]
    /// Fail the load
    Abort,
    /// Log the entry and continue
    Skip,
}

/// Apply every REL section of the object to the image
pub fn apply(
    parser: &Parser,
    image: &mut Image,
    resolve: &Resolver<'_>,
    glob_dat: &GlobDatPolicy,
    strictness: Strictness,
) -> Result<()> {
    for section in parser.section_headers()? {
        if section.kind() == Some(SectionKind::Rel) {
            apply_section(parser, &section, image, resolve, glob_dat, strictness)?;
        }
    }
    Ok(())
}

/// Apply one REL section to the image
pub fn apply_section(
    parser: &Parser,
    section: &SectionHeader,
    image: &mut Image,
    resolve: &Resolver<'_>,
    glob_dat: &GlobDatPolicy,
    strictness: Strictness,
) -> Result<()> {
    let symtab = parser.section_header(section.sh_link)?;
    let symbols = parser.symbols(&symtab)?;
    let strtab = parser.string_table_at(symtab.sh_link)?;

    let base = image.base_addr();
    for rel in parser.relocations(section)? {
        let symbol = symbols.get(rel.sym() as usize)?;
        let name = if symbol.st_name == 0 {
            &[][..]
        } else {
            strtab.get(symbol.st_name)?
        };

        let addend = image.read_u32(rel.r_offset)?;
        let place = rel.r_offset.wrapping_add(base);
        let target = resolve(name);

        let value = match rel.kind() {
            Some(RelocationKind::None) => continue,
            Some(RelocationKind::Abs32) => target.wrapping_add(addend),
            Some(RelocationKind::Pc32) => target.wrapping_add(addend).wrapping_sub(place),
            Some(RelocationKind::JmpSlot) => target,
            Some(RelocationKind::Relative) => addend.wrapping_add(base),
            Some(RelocationKind::GlobDat) => match glob_dat {
                GlobDatPolicy::Resolve => target,
                GlobDatPolicy::MapTo(alias) => resolve(alias.as_bytes()),
            },
            _ => match strictness {
                Strictness::Abort => {
                    return Err(Error::UnsupportedRelocation {
                        kind: rel.kind_raw(),
                        offset: rel.r_offset,
                    })
                }
                Strictness::Skip => {
                    log::warn!(
                        "skipping unsupported relocation type {} at {:#x}",
                        rel.kind_raw(),
                        rel.r_offset
                    );
                    continue;
                }
            },
        };
        image.write_u32(rel.r_offset, value)?;
    }
    Ok(())
}
