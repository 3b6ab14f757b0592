//! Loading a shared object end to end
//!
//! The façade over the parser, image builder, relocator and protection
//! applier. A successful load yields a handle owning the low-memory image
//! and a map from exported symbol name to its runtime 32-bit address; a
//! failed load releases everything it acquired and exposes nothing.

use std::{collections::HashMap, path::Path};

use crate::{
    error::{Error, Result},
    format::SectionKind,
    image::Image,
    parser::Parser,
    prot,
    reloc::{self, Resolver},
    Config,
};

/// A loaded shared object
///
/// Addresses returned by [`Loader::get_sym`] stay valid for the lifetime
/// of the handle; dropping it releases the image and invalidates them.
#[derive(Debug)]
pub struct Loader {
    image: Image,
    symbols: HashMap<Vec<u8>, u32>,
}

impl Loader {
    /// Load the shared object at `path` with the default configuration
    ///
    /// `resolve` supplies host addresses for the object's imports; it is
    /// consulted before the object's own exports, and returning zero means
    /// "unknown".
    pub fn load(path: impl AsRef<Path>, resolve: &Resolver<'_>) -> Result<Self> {
        Self::load_with(path, resolve, Config::default())
    }

    /// Load the shared object at `path` with an explicit configuration
    pub fn load_with(path: impl AsRef<Path>, resolve: &Resolver<'_>, config: Config) -> Result<Self> {
        let file = std::fs::read(path)?;
        let parser = Parser::new(&file)?;

        let mut image = Image::build(&parser)?;
        log::debug!(
            "loaded {} byte image at {:#x}",
            image.len(),
            image.base_addr()
        );

        let symbols = read_dynamic_symbols(&parser, &image)?;

        // Host symbols shadow the object's own exports; zero falls through
        // to the relocator
        let composite = |name: &[u8]| -> u32 {
            let host = resolve(name);
            if host != 0 {
                return host;
            }
            symbols.get(name).copied().unwrap_or(0)
        };
        reloc::apply(
            &parser,
            &mut image,
            &composite,
            config.glob_dat(),
            config.strictness(),
        )?;

        prot::apply(&parser, &image)?;
        log::debug!("relocated and protected {} symbols", symbols.len());

        Ok(Self { image, symbols })
    }

    /// The runtime 32-bit address of the exported symbol `name`
    pub fn get_sym(&self, name: impl AsRef<[u8]>) -> Result<u32> {
        let name = name.as_ref();
        self.symbols
            .get(name)
            .copied()
            .ok_or_else(|| Error::NotFound {
                name: String::from_utf8_lossy(name).into_owned(),
            })
    }

    /// The loaded image backing the handle
    pub fn image(&self) -> &Image {
        &self.image
    }
}

/// Record every dynamic symbol as `(name, base + st_value)`
fn read_dynamic_symbols(parser: &Parser, image: &Image) -> Result<HashMap<Vec<u8>, u32>> {
    let dynsym = parser
        .section_headers()?
        .find(|section| section.kind() == Some(SectionKind::DynSym))
        .ok_or(Error::NoDynamicSymbolTable)?;
    let strtab = parser.string_table_at(dynsym.sh_link)?;

    let mut symbols = HashMap::new();
    for symbol in parser.symbols(&dynsym)? {
        let name = if symbol.st_name == 0 {
            &[][..]
        } else {
            strtab.get(symbol.st_name)?
        };
        symbols.insert(
            name.to_vec(),
            image.base_addr().wrapping_add(symbol.st_value),
        );
    }
    Ok(symbols)
}
