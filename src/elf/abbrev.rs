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

use std::collections::HashMap;

use gimli::{DwAt, DwForm, DwTag};

use super::deserializer::{Deserializer, Endian};
use crate::error::DecodeError;

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSpec {
    pub name: DwAt,
    pub form: DwForm,
    /// Only set for `DW_FORM_implicit_const`.
    pub implicit_const: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Abbreviation {
    pub code: u64,
    pub tag: DwTag,
    pub has_children: bool,
    pub attributes: Vec<AttributeSpec>,
}

/// `.debug_abbrev`: abbreviation sets keyed by their section offset, each a
/// map from abbreviation code to declaration.
#[derive(Debug, Clone, Default)]
pub struct AbbreviationTable {
    sets: HashMap<u64, HashMap<u64, Abbreviation>>,
}

impl AbbreviationTable {
    pub fn decode(data: &[u8], endian: Endian) -> Result<Self, DecodeError> {
        let mut d = Deserializer::new(data, endian);
        let mut sets = HashMap::new();

        while !d.is_eof() {
            let set_offset = d.ofs() as u64;
            let mut set = HashMap::new();

            loop {
                if d.is_eof() {
                    break;
                }
                let code = d.read_uleb128()?;
                if code == 0 {
                    break;
                }

                let tag = DwTag(d.read_uleb128()? as u16);
                let has_children = d.read8()? == gimli::DW_CHILDREN_yes.0;

                let mut attributes = Vec::new();
                loop {
                    let name = d.read_uleb128()?;
                    let form = d.read_uleb128()?;
                    if name == 0 && form == 0 {
                        break;
                    }
                    let form = DwForm(form as u16);
                    let implicit_const = if form == gimli::DW_FORM_implicit_const {
                        Some(d.read_leb128()?)
                    } else {
                        None
                    };
                    attributes.push(AttributeSpec {
                        name: DwAt(name as u16),
                        form,
                        implicit_const,
                    });
                }

                set.insert(
                    code,
                    Abbreviation {
                        code,
                        tag,
                        has_children,
                        attributes,
                    },
                );
            }

            sets.insert(set_offset, set);
        }

        Ok(Self { sets })
    }

    pub fn get(&self, set_offset: u64, code: u64) -> Option<&Abbreviation> {
        self.sets.get(&set_offset)?.get(&code)
    }

    pub fn set_count(&self) -> usize {
        self.sets.len()
    }
}
