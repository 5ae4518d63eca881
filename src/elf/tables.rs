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

//! Flat lookup tables: string sections and the indexed offset/address tables
//! that `DW_FORM_strx*`, `DW_FORM_addrx*` and the list index forms go through.

use super::deserializer::{Deserializer, Endian};
use crate::error::DecodeError;

/// View over a NUL separated string section (`.strtab`, `.debug_str`, ...).
#[derive(Debug, Clone, Copy)]
pub struct StringTable<'a> {
    data: &'a [u8],
}

impl<'a> StringTable<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn get(&self, ofs: u64) -> Result<String, DecodeError> {
        let ofs = usize::try_from(ofs).map_err(|_| DecodeError::OutOfBounds)?;
        if ofs >= self.data.len() {
            return Err(DecodeError::OutOfBounds);
        }
        let mut d = Deserializer::new(self.data, Endian::Little);
        d.set_offset(ofs)?;
        d.read_cstring()
    }
}

/// One per-unit block of entries inside an indexed table.
#[derive(Debug, Clone, Default)]
pub struct Contribution {
    /// Section offset of the first entry, the value `DW_AT_*_base` points at.
    pub base: u64,
    pub entries: Vec<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexTableKind {
    StringOffsets,
    Addresses,
    ListOffsets,
}

/// Decoded `.debug_str_offsets`, `.debug_addr`, `.debug_rnglists` or
/// `.debug_loclists` offset arrays.
#[derive(Debug, Clone)]
pub struct IndexTable {
    kind: IndexTableKind,
    contributions: Vec<Contribution>,
}

impl IndexTable {
    pub fn decode(kind: IndexTableKind, data: &[u8], endian: Endian) -> Result<Self, DecodeError> {
        let mut d = Deserializer::new(data, endian);
        let mut contributions = Vec::new();

        while d.remaining() >= 4 {
            let header = d.read_unit_header()?;
            if header.end_ofs <= header.start_ofs {
                break;
            }
            if header.version != 5 {
                return Err(DecodeError::UnsupportedVersion(header.version));
            }
            d.set_format(header.format);

            let mut entries = Vec::new();
            match kind {
                IndexTableKind::StringOffsets => {
                    d.skip(2)?; // padding
                    let base = d.ofs() as u64;
                    while d.ofs() + d.format().word_size() <= header.end_ofs {
                        entries.push(d.read_offs()?);
                    }
                    contributions.push(Contribution { base, entries });
                }
                IndexTableKind::Addresses => {
                    let address_size = d.read8()? as usize;
                    let _segment_selector_size = d.read8()?;
                    let base = d.ofs() as u64;
                    if address_size > 0 {
                        while d.ofs() + address_size <= header.end_ofs {
                            entries.push(d.read_uint(address_size)?);
                        }
                    }
                    contributions.push(Contribution { base, entries });
                }
                IndexTableKind::ListOffsets => {
                    let _address_size = d.read8()?;
                    let _segment_selector_size = d.read8()?;
                    let count = d.read32()?;
                    let base = d.ofs() as u64;
                    for _ in 0..count {
                        // stored relative to the first offset entry
                        entries.push(base + d.read_offs()?);
                    }
                    contributions.push(Contribution { base, entries });
                }
            }

            d.set_offset(header.end_ofs)?;
        }

        Ok(Self {
            kind,
            contributions,
        })
    }

    pub fn kind(&self) -> IndexTableKind {
        self.kind
    }

    pub fn contributions(&self) -> &[Contribution] {
        &self.contributions
    }

    /// Base offset of the n-th contribution, used when a unit carries no
    /// explicit base attribute.
    pub fn base_of(&self, ordinal: usize) -> Option<u64> {
        self.contributions.get(ordinal).map(|c| c.base)
    }

    /// Entry `index` of the contribution starting at `base`, or of the
    /// first contribution when no base is known.
    pub fn get(&self, base: Option<u64>, index: u64) -> Option<u64> {
        let contribution = match base {
            Some(base) => self.contributions.iter().find(|c| c.base == base)?,
            None => self.contributions.first()?,
        };
        let index = usize::try_from(index).ok()?;
        contribution.entries.get(index).copied()
    }
}
