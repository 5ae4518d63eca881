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

use once_cell::unsync::OnceCell;

use super::abbrev::AbbreviationTable;
use super::debug_info::DebugInfoSection;
use super::debug_line::DebugLineSection;
use super::deserializer::Deserializer;
use super::symbol_table::SymbolTable;
use super::tables::IndexTable;
use crate::error::DecodeError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElfSectionHeader {
    pub name_offset: u32,
    pub name: String,
    pub section_type: u32,
    pub flags: u64,
    pub addr: u64,
    pub offset: u64,
    pub size: u64,
    pub link: u32,
    pub info: u32,
    pub addralign: u64,
    pub entsize: u64,
}

impl ElfSectionHeader {
    /// Reads one section header entry. Address sized fields follow the
    /// deserializer's format.
    pub fn read(d: &mut Deserializer) -> Result<Self, DecodeError> {
        Ok(Self {
            name_offset: d.read32()?,
            name: String::new(),
            section_type: d.read32()?,
            flags: d.read_size()?,
            addr: d.read_addr()?,
            offset: d.read_offs()?,
            size: d.read_size()?,
            link: d.read32()?,
            info: d.read32()?,
            addralign: d.read_size()?,
            entsize: d.read_size()?,
        })
    }
}

/// What a section decodes into, picked by name or type when the section
/// table is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Generic,
    StringTable,
    SymbolTable,
    DebugLine,
    DebugInfo,
    DebugAbbrev,
    DebugStringOffsets,
    DebugAddr,
    DebugRangeLists,
    DebugLocationLists,
}

impl SectionKind {
    pub fn classify(name: &str, section_type: u32) -> Self {
        match name {
            ".debug_line" => SectionKind::DebugLine,
            ".debug_info" => SectionKind::DebugInfo,
            ".debug_abbrev" => SectionKind::DebugAbbrev,
            ".debug_str" | ".debug_line_str" => SectionKind::StringTable,
            ".debug_str_offsets" => SectionKind::DebugStringOffsets,
            ".debug_addr" => SectionKind::DebugAddr,
            ".debug_rnglists" => SectionKind::DebugRangeLists,
            ".debug_loclists" => SectionKind::DebugLocationLists,
            _ => match section_type {
                object::elf::SHT_STRTAB => SectionKind::StringTable,
                object::elf::SHT_SYMTAB => SectionKind::SymbolTable,
                _ => SectionKind::Generic,
            },
        }
    }
}

/// Decoded payload of a section. String tables are read in place and
/// carry no decoded state.
#[derive(Debug)]
pub enum SectionContent {
    Raw,
    Strings,
    Symbols(SymbolTable),
    Lines(DebugLineSection),
    Info(DebugInfoSection),
    Abbreviations(AbbreviationTable),
    Index(IndexTable),
}

#[derive(Debug)]
pub struct ElfSection {
    pub header: ElfSectionHeader,
    pub kind: SectionKind,
    pub(super) content: OnceCell<SectionContent>,
}

impl ElfSection {
    pub fn new(header: ElfSectionHeader) -> Self {
        let kind = SectionKind::classify(&header.name, header.section_type);
        Self {
            header,
            kind,
            content: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.header.name
    }

    pub fn is_resolved(&self) -> bool {
        self.content.get().is_some()
    }
}
