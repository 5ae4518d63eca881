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

use super::deserializer::{Deserializer, Endian, Format};
use super::tables::StringTable;
use crate::error::DecodeError;

#[derive(Debug, Clone, PartialEq)]
pub struct ElfSymbol {
    pub name: String,
    pub value: u64,
    pub size: u64,
    pub info: u8,
    pub other: u8,
    pub section_index: u16,
}

impl ElfSymbol {
    pub fn binding(&self) -> u8 {
        self.info >> 4
    }

    pub fn symbol_type(&self) -> u8 {
        self.info & 0xf
    }

    pub fn is_object(&self) -> bool {
        self.symbol_type() == object::elf::STT_OBJECT
    }

    pub fn is_function(&self) -> bool {
        self.symbol_type() == object::elf::STT_FUNC
    }
}

/// `.symtab` entries with names resolved through the linked string table.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: Vec<ElfSymbol>,
}

impl SymbolTable {
    pub fn decode(
        data: &[u8],
        endian: Endian,
        format: Format,
        entry_size: u64,
        names: Option<StringTable>,
    ) -> Result<Self, DecodeError> {
        let default_size = match format {
            Format::Bits32 => 16,
            Format::Bits64 => 24,
        };
        let entry_size = match entry_size {
            0 => default_size,
            n => usize::try_from(n).map_err(|_| DecodeError::OutOfBounds)?,
        };
        if entry_size < default_size {
            return Err(DecodeError::InvalidElf("symbol entry size too small"));
        }

        let mut d = Deserializer::new(data, endian);
        d.set_format(format);
        let count = data.len() / entry_size;
        let mut symbols = Vec::with_capacity(count);

        for index in 0..count {
            d.set_offset(index * entry_size)?;
            let name_offset = d.read32()?;
            let (value, size, info, other, section_index) = match format {
                Format::Bits32 => {
                    let value = d.read32()? as u64;
                    let size = d.read32()? as u64;
                    let info = d.read8()?;
                    let other = d.read8()?;
                    let shndx = d.read16()?;
                    (value, size, info, other, shndx)
                }
                Format::Bits64 => {
                    let info = d.read8()?;
                    let other = d.read8()?;
                    let shndx = d.read16()?;
                    let value = d.read64()?;
                    let size = d.read64()?;
                    (value, size, info, other, shndx)
                }
            };

            let name = match (names, name_offset) {
                (_, 0) | (None, _) => String::new(),
                (Some(table), ofs) => table.get(ofs as u64).unwrap_or_default(),
            };

            symbols.push(ElfSymbol {
                name,
                value,
                size,
                info,
                other,
                section_index,
            });
        }

        Ok(Self { symbols })
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ElfSymbol> {
        self.symbols.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ElfSymbol> {
        self.symbols.iter()
    }

    pub fn find(&self, name: &str) -> Option<&ElfSymbol> {
        self.symbols.iter().find(|s| s.name == name)
    }
}
