// Copyright (c) 2026 C64-Debug Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! ELF container reader with lazily decoded DWARF 5 sections.
//!
//! The [`Elf`] value owns the whole file. Section headers are read eagerly,
//! section payloads are decoded on first access and cached.

pub mod abbrev;
pub mod debug_info;
pub mod debug_line;
pub mod deserializer;
pub mod section;
pub mod symbol_table;
pub mod tables;

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::debug;

use crate::error::{DecodeError, LoadError};
use abbrev::AbbreviationTable;
use debug_info::{DebugInfoSection, DebugInfoTables};
use debug_line::DebugLineSection;
use deserializer::{Deserializer, Endian, Format};
pub use section::{ElfSection, ElfSectionHeader, SectionContent, SectionKind};
use symbol_table::SymbolTable;
use tables::{IndexTable, IndexTableKind, StringTable};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElfHeader {
    pub format: Format,
    pub endian: Endian,
    pub ident_version: u8,
    pub os_abi: u8,
    pub abi_version: u8,
    pub elf_type: u16,
    pub machine: u16,
    pub version: u32,
    pub entry: u64,
    pub program_header_offset: u64,
    pub section_header_offset: u64,
    pub flags: u32,
    pub header_size: u16,
    pub program_header_entry_size: u16,
    pub program_header_count: u16,
    pub section_header_entry_size: u16,
    pub section_header_count: u16,
    pub section_name_index: u16,
}

impl ElfHeader {
    fn read(d: &mut Deserializer) -> Result<Self, DecodeError> {
        let magic = d.read_raw(4)?;
        if magic != object::elf::ELFMAG {
            return Err(DecodeError::InvalidElf("bad magic"));
        }

        let format = match d.read8()? {
            object::elf::ELFCLASS32 => Format::Bits32,
            object::elf::ELFCLASS64 => Format::Bits64,
            _ => return Err(DecodeError::InvalidElf("unknown class")),
        };
        let endian = match d.read8()? {
            object::elf::ELFDATA2LSB => Endian::Little,
            object::elf::ELFDATA2MSB => Endian::Big,
            _ => return Err(DecodeError::InvalidElf("unknown data encoding")),
        };
        let ident_version = d.read8()?;
        if ident_version != object::elf::EV_CURRENT {
            return Err(DecodeError::InvalidElf("unsupported identification version"));
        }
        let os_abi = d.read8()?;
        let abi_version = d.read8()?;
        d.skip(7)?;

        d.set_format(format);
        d.set_endian(endian);

        let elf_type = d.read16()?;
        let machine = d.read16()?;
        let version = d.read32()?;
        if version != object::elf::EV_CURRENT as u32 {
            return Err(DecodeError::InvalidElf("unsupported version"));
        }

        Ok(Self {
            format,
            endian,
            ident_version,
            os_abi,
            abi_version,
            elf_type,
            machine,
            version,
            entry: d.read_addr()?,
            program_header_offset: d.read_offs()?,
            section_header_offset: d.read_offs()?,
            flags: d.read32()?,
            header_size: d.read16()?,
            program_header_entry_size: d.read16()?,
            program_header_count: d.read16()?,
            section_header_entry_size: d.read16()?,
            section_header_count: d.read16()?,
            section_name_index: d.read16()?,
        })
    }
}

#[derive(Debug)]
pub struct Elf {
    data: Vec<u8>,
    header: ElfHeader,
    sections: Vec<ElfSection>,
    section_map: HashMap<String, usize>,
}

impl Elf {
    pub fn load(filename: &Path) -> Result<Self, LoadError> {
        let data = fs::read(filename).map_err(|e| LoadError::from_io("ELF", filename, e))?;
        Self::parse(data).map_err(|e| LoadError::format("ELF", filename, e))
    }

    pub fn parse(data: Vec<u8>) -> Result<Self, DecodeError> {
        let mut d = Deserializer::new(&data, Endian::Big);
        let header = ElfHeader::read(&mut d)?;

        let mut headers = Vec::with_capacity(header.section_header_count as usize);
        let stride = header.section_header_entry_size as usize;
        let table_ofs =
            usize::try_from(header.section_header_offset).map_err(|_| DecodeError::OutOfBounds)?;
        for index in 0..header.section_header_count as usize {
            d.set_offset(table_ofs + index * stride)?;
            headers.push(ElfSectionHeader::read(&mut d)?);
        }

        // names can only be resolved once the name table header is known
        let name_table = headers
            .get(header.section_name_index as usize)
            .map(|h| section_bytes(&data, h))
            .transpose()?
            .map(StringTable::new);
        if let Some(names) = name_table {
            for h in headers.iter_mut() {
                h.name = names.get(h.name_offset as u64).unwrap_or_default();
            }
        }

        let mut sections = Vec::with_capacity(headers.len());
        let mut section_map = HashMap::new();
        for h in headers {
            let section = ElfSection::new(h);
            if section.kind == SectionKind::Generic {
                debug!("generic section '{}'", section.name());
            }
            if !section.name().is_empty() {
                section_map.insert(section.name().to_string(), sections.len());
            }
            sections.push(section);
        }

        Ok(Self {
            data,
            header,
            sections,
            section_map,
        })
    }

    pub fn header(&self) -> &ElfHeader {
        &self.header
    }

    pub fn sections(&self) -> &[ElfSection] {
        &self.sections
    }

    /// Section by name, without decoding it.
    pub fn section(&self, name: &str) -> Option<&ElfSection> {
        self.section_map.get(name).map(|&i| &self.sections[i])
    }

    pub fn section_data(&self, section: &ElfSection) -> Result<&[u8], DecodeError> {
        section_bytes(&self.data, &section.header)
    }

    /// Section by name, decoding its payload on first access.
    pub fn get_section(&self, name: &str) -> Result<Option<&SectionContent>, DecodeError> {
        match self.section(name) {
            Some(section) => self.resolve(section).map(Some),
            None => Ok(None),
        }
    }

    pub fn resolve<'s>(&'s self, section: &'s ElfSection) -> Result<&'s SectionContent, DecodeError> {
        section
            .content
            .get_or_try_init(|| self.decode_section(section))
    }

    pub fn string_table(&self, name: &str) -> Option<StringTable<'_>> {
        let section = self.section(name)?;
        self.section_data(section).ok().map(StringTable::new)
    }

    pub fn symbol_table(&self) -> Result<Option<&SymbolTable>, DecodeError> {
        let symtab = self
            .sections
            .iter()
            .find(|s| s.kind == SectionKind::SymbolTable);
        match symtab {
            Some(section) => match self.resolve(section)? {
                SectionContent::Symbols(table) => Ok(Some(table)),
                _ => Ok(None),
            },
            None => Ok(None),
        }
    }

    pub fn debug_line(&self) -> Result<Option<&DebugLineSection>, DecodeError> {
        match self.get_section(".debug_line")? {
            Some(SectionContent::Lines(lines)) => Ok(Some(lines)),
            _ => Ok(None),
        }
    }

    pub fn debug_info(&self) -> Result<Option<&DebugInfoSection>, DecodeError> {
        match self.get_section(".debug_info")? {
            Some(SectionContent::Info(info)) => Ok(Some(info)),
            _ => Ok(None),
        }
    }

    pub fn abbreviations(&self) -> Result<Option<&AbbreviationTable>, DecodeError> {
        match self.get_section(".debug_abbrev")? {
            Some(SectionContent::Abbreviations(table)) => Ok(Some(table)),
            _ => Ok(None),
        }
    }

    fn index_table(&self, name: &str) -> Result<Option<&IndexTable>, DecodeError> {
        match self.get_section(name)? {
            Some(SectionContent::Index(table)) => Ok(Some(table)),
            _ => Ok(None),
        }
    }

    fn decode_section(&self, section: &ElfSection) -> Result<SectionContent, DecodeError> {
        let data = self.section_data(section)?;
        let endian = self.header.endian;
        debug!("decoding section '{}' ({:?})", section.name(), section.kind);

        let content = match section.kind {
            SectionKind::Generic => SectionContent::Raw,
            SectionKind::StringTable => SectionContent::Strings,
            SectionKind::SymbolTable => {
                let names = self
                    .sections
                    .get(section.header.link as usize)
                    .and_then(|s| self.section_data(s).ok())
                    .map(StringTable::new)
                    .or_else(|| self.string_table(".strtab"));
                SectionContent::Symbols(SymbolTable::decode(
                    data,
                    endian,
                    self.header.format,
                    section.header.entsize,
                    names,
                )?)
            }
            SectionKind::DebugAbbrev => {
                SectionContent::Abbreviations(AbbreviationTable::decode(data, endian)?)
            }
            SectionKind::DebugStringOffsets => SectionContent::Index(IndexTable::decode(
                IndexTableKind::StringOffsets,
                data,
                endian,
            )?),
            SectionKind::DebugAddr => {
                SectionContent::Index(IndexTable::decode(IndexTableKind::Addresses, data, endian)?)
            }
            SectionKind::DebugRangeLists | SectionKind::DebugLocationLists => SectionContent::Index(
                IndexTable::decode(IndexTableKind::ListOffsets, data, endian)?,
            ),
            SectionKind::DebugLine => SectionContent::Lines(DebugLineSection::decode(
                data,
                endian,
                self.string_table(".debug_str"),
                self.string_table(".debug_line_str"),
            )?),
            SectionKind::DebugInfo => {
                let empty = AbbreviationTable::default();
                let abbreviations = self.abbreviations()?.unwrap_or(&empty);
                let tables = DebugInfoTables {
                    abbreviations,
                    string_table: self.string_table(".debug_str"),
                    line_string_table: self.string_table(".debug_line_str"),
                    string_offsets: self.index_table(".debug_str_offsets")?,
                    addresses: self.index_table(".debug_addr")?,
                    range_lists: self.index_table(".debug_rnglists")?,
                    location_lists: self.index_table(".debug_loclists")?,
                };
                SectionContent::Info(DebugInfoSection::decode(data, endian, &tables)?)
            }
        };

        Ok(content)
    }
}

fn section_bytes<'d>(data: &'d [u8], header: &ElfSectionHeader) -> Result<&'d [u8], DecodeError> {
    if header.section_type == object::elf::SHT_NOBITS {
        return Ok(&[]);
    }
    let start = usize::try_from(header.offset).map_err(|_| DecodeError::OutOfBounds)?;
    let size = usize::try_from(header.size).map_err(|_| DecodeError::OutOfBounds)?;
    let end = start.checked_add(size).ok_or(DecodeError::OutOfBounds)?;
    data.get(start..end).ok_or(DecodeError::OutOfBounds)
}
