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

//! `.debug_info` decoding into an arena of tags. Nesting is kept as parent
//! and child indices into [`DebugInfoSection::tags`].

use gimli::{DwAt, DwForm, DwTag, DwUt};

use super::abbrev::AbbreviationTable;
use super::deserializer::{AttributeParams, AttributeValue, Deserializer, Endian, Format};
use super::tables::{IndexTable, StringTable};
use crate::error::DecodeError;

#[derive(Debug, Clone, PartialEq)]
pub struct DwarfAttribute {
    pub name: DwAt,
    pub form: DwForm,
    pub value: AttributeValue,
}

#[derive(Debug, Clone)]
pub struct DwarfTag {
    /// Section offset of the entry.
    pub offset: u64,
    pub unit: usize,
    pub tag: DwTag,
    pub attributes: Vec<DwarfAttribute>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

impl DwarfTag {
    pub fn attribute(&self, name: DwAt) -> Option<&AttributeValue> {
        self.find(name).map(|attr| &attr.value)
    }

    fn find(&self, name: DwAt) -> Option<&DwarfAttribute> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    pub fn name(&self) -> Option<&str> {
        self.attribute(gimli::DW_AT_name)?.as_str()
    }

    /// `[low_pc, high_pc)`. A `high_pc` of constant class is an offset from `low_pc`.
    pub fn pc_range(&self) -> Option<(u64, u64)> {
        let low = self.attribute(gimli::DW_AT_low_pc)?.as_u64()?;
        let high = self.find(gimli::DW_AT_high_pc)?;
        let value = high.value.as_u64()?;
        let is_address = matches!(
            high.form,
            gimli::DW_FORM_addr
                | gimli::DW_FORM_addrx
                | gimli::DW_FORM_addrx1
                | gimli::DW_FORM_addrx2
                | gimli::DW_FORM_addrx3
                | gimli::DW_FORM_addrx4
        );
        let end = if is_address { value } else { low.checked_add(value)? };
        Some((low, end))
    }
}

#[derive(Debug, Clone)]
pub struct DwarfUnit {
    /// Section offset of the unit header.
    pub offset: u64,
    pub format: Format,
    pub version: u16,
    pub unit_type: DwUt,
    pub address_size: u8,
    pub abbrev_offset: u64,
    /// Top level tags, normally a single compile unit entry.
    pub roots: Vec<usize>,
}

/// Sections `.debug_info` attributes can point into.
#[derive(Debug, Clone, Copy)]
pub struct DebugInfoTables<'t> {
    pub abbreviations: &'t AbbreviationTable,
    pub string_table: Option<StringTable<'t>>,
    pub line_string_table: Option<StringTable<'t>>,
    pub string_offsets: Option<&'t IndexTable>,
    pub addresses: Option<&'t IndexTable>,
    pub range_lists: Option<&'t IndexTable>,
    pub location_lists: Option<&'t IndexTable>,
}

#[derive(Debug, Clone, Default)]
pub struct DebugInfoSection {
    pub units: Vec<DwarfUnit>,
    pub tags: Vec<DwarfTag>,
}

impl DebugInfoSection {
    pub fn decode(data: &[u8], endian: Endian, tables: &DebugInfoTables) -> Result<Self, DecodeError> {
        let mut d = Deserializer::new(data, endian);
        let mut section = DebugInfoSection::default();

        while d.remaining() >= 4 {
            let unit_offset = d.ofs() as u64;
            let header = d.read_unit_header()?;
            if header.end_ofs <= header.start_ofs {
                break;
            }
            if header.version != 5 {
                return Err(DecodeError::UnsupportedVersion(header.version));
            }
            d.set_format(header.format);

            let unit_type = DwUt(d.read8()?);
            let address_size = d.read8()?;
            let abbrev_offset = d.read_offs()?;
            match unit_type {
                gimli::DW_UT_skeleton | gimli::DW_UT_split_compile => d.skip(8)?,
                gimli::DW_UT_type | gimli::DW_UT_split_type => {
                    d.skip(8)?;
                    d.read_offs()?;
                }
                _ => {}
            }

            let unit_index = section.units.len();
            let mut params = AttributeParams {
                address_size: Some(address_size),
                string_table: tables.string_table,
                line_string_table: tables.line_string_table,
                string_offset_table: tables.string_offsets,
                str_offsets_base: tables.string_offsets.and_then(|t| t.base_of(unit_index)),
                address_table: tables.addresses,
                addr_base: tables.addresses.and_then(|t| t.base_of(unit_index)),
                range_table: tables.range_lists,
                rnglists_base: tables.range_lists.and_then(|t| t.base_of(unit_index)),
                location_table: tables.location_lists,
                loclists_base: tables.location_lists.and_then(|t| t.base_of(unit_index)),
            };

            section.units.push(DwarfUnit {
                offset: unit_offset,
                format: header.format,
                version: header.version,
                unit_type,
                address_size,
                abbrev_offset,
                roots: Vec::new(),
            });

            let mut parent: Option<usize> = None;
            let mut stack: Vec<Option<usize>> = Vec::new();

            while d.ofs() < header.end_ofs {
                let tag_offset = d.ofs() as u64;
                let code = d.read_uleb128()?;
                if code == 0 {
                    if let Some(outer) = stack.pop() {
                        parent = outer;
                    }
                    continue;
                }

                let abbrev = tables
                    .abbreviations
                    .get(abbrev_offset, code)
                    .ok_or(DecodeError::MissingAbbreviation {
                        code,
                        offset: tag_offset,
                    })?;

                let mut attributes = Vec::with_capacity(abbrev.attributes.len());
                for spec in &abbrev.attributes {
                    let mut value = d.read_attribute(spec.form, &params)?;
                    if value == AttributeValue::Implicit {
                        value = AttributeValue::Signed(spec.implicit_const.unwrap_or(0));
                    }
                    match spec.name {
                        gimli::DW_AT_str_offsets_base => params.str_offsets_base = value.as_u64(),
                        gimli::DW_AT_addr_base => params.addr_base = value.as_u64(),
                        gimli::DW_AT_rnglists_base => params.rnglists_base = value.as_u64(),
                        gimli::DW_AT_loclists_base => params.loclists_base = value.as_u64(),
                        _ => {}
                    }
                    attributes.push(DwarfAttribute {
                        name: spec.name,
                        form: spec.form,
                        value,
                    });
                }

                let index = section.tags.len();
                section.tags.push(DwarfTag {
                    offset: tag_offset,
                    unit: unit_index,
                    tag: abbrev.tag,
                    attributes,
                    parent,
                    children: Vec::new(),
                });
                match parent {
                    Some(p) => section.tags[p].children.push(index),
                    None => section.units[unit_index].roots.push(index),
                }

                if abbrev.has_children {
                    stack.push(parent);
                    parent = Some(index);
                }
            }

            d.set_offset(header.end_ofs)?;
        }

        Ok(section)
    }

    pub fn tag(&self, index: usize) -> Option<&DwarfTag> {
        self.tags.get(index)
    }

    pub fn children(&self, index: usize) -> impl Iterator<Item = &DwarfTag> {
        self.tags
            .get(index)
            .into_iter()
            .flat_map(move |tag| tag.children.iter().filter_map(move |&c| self.tags.get(c)))
    }

    /// Resolves a unit relative reference (`DW_FORM_ref*`) to a tag index.
    pub fn find_reference(&self, unit: usize, value: u64) -> Option<usize> {
        let target = self.units.get(unit)?.offset + value;
        self.tags.binary_search_by_key(&target, |t| t.offset).ok()
    }

    pub fn tags_of(&self, tag: DwTag) -> impl Iterator<Item = &DwarfTag> {
        self.tags.iter().filter(move |t| t.tag == tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abbreviations() -> AbbreviationTable {
        let data = [
            // 1: compile_unit, children, name:string
            0x01, 0x11, 0x01, 0x03, 0x08, 0x00, 0x00, //
            // 2: subprogram, children, name:string, low_pc:addr, high_pc:data2
            0x02, 0x2e, 0x01, 0x03, 0x08, 0x11, 0x01, 0x12, 0x05, 0x00, 0x00, //
            // 3: variable, no children, name:string
            0x03, 0x34, 0x00, 0x03, 0x08, 0x00, 0x00, //
            0x00,
        ];
        AbbreviationTable::decode(&data, Endian::Little).unwrap()
    }

    fn unit_bytes(body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let length = (2 + 1 + 1 + 4 + body.len()) as u32;
        out.extend_from_slice(&length.to_le_bytes());
        out.extend_from_slice(&5u16.to_le_bytes());
        out.push(gimli::DW_UT_compile.0);
        out.push(2);
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn test_tag_tree_nesting() {
        let mut body = Vec::new();
        body.extend_from_slice(b"\x01cu\0");
        body.extend_from_slice(b"\x02main\0\x00\x08\x10\x00");
        body.extend_from_slice(b"\x03i\0");
        body.push(0); // end of main's children
        body.extend_from_slice(b"\x03g\0");
        body.push(0); // end of cu's children

        let abbrevs = abbreviations();
        let tables = DebugInfoTables {
            abbreviations: &abbrevs,
            string_table: None,
            line_string_table: None,
            string_offsets: None,
            addresses: None,
            range_lists: None,
            location_lists: None,
        };
        let data = unit_bytes(&body);
        let section = DebugInfoSection::decode(&data, Endian::Little, &tables).unwrap();

        assert_eq!(section.units.len(), 1);
        assert_eq!(section.units[0].roots, vec![0]);
        assert_eq!(section.tags.len(), 4);

        let cu = &section.tags[0];
        assert_eq!(cu.name(), Some("cu"));
        assert_eq!(cu.children, vec![1, 3]);

        let main = &section.tags[1];
        assert_eq!(main.tag, gimli::DW_TAG_subprogram);
        assert_eq!(main.parent, Some(0));
        assert_eq!(main.pc_range(), Some((0x0800, 0x0810)));
        let locals: Vec<_> = section.children(1).filter_map(|t| t.name()).collect();
        assert_eq!(locals, vec!["i"]);

        assert_eq!(section.tags[3].name(), Some("g"));
        assert_eq!(section.tags[3].parent, Some(0));
        assert_eq!(section.find_reference(0, section.tags[1].offset), Some(1));
    }

    #[test]
    fn test_unknown_abbreviation_is_fatal() {
        let abbrevs = abbreviations();
        let tables = DebugInfoTables {
            abbreviations: &abbrevs,
            string_table: None,
            line_string_table: None,
            string_offsets: None,
            addresses: None,
            range_lists: None,
            location_lists: None,
        };
        let data = unit_bytes(&[0x09]);
        let result = DebugInfoSection::decode(&data, Endian::Little, &tables);
        assert!(matches!(
            result,
            Err(DecodeError::MissingAbbreviation { code: 9, .. })
        ));
    }
}
