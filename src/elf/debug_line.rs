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

//! `.debug_line` decoding: one line number program per compilation unit,
//! executed into a flat list of statement rows.

use std::path::{Path, PathBuf};

use gimli::{DwForm, DwLnct};
use log::debug;

use super::deserializer::{AttributeParams, AttributeValue, Deserializer, Endian, Format};
use super::tables::StringTable;
use crate::error::DecodeError;
use crate::utils::normalize_path;

/// One emitted statement row.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugLineEntry {
    pub address: u64,
    /// Last address covered before the next row of the same sequence.
    pub address_end: u64,
    pub source: Option<String>,
    pub line: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileEntry {
    pub path: String,
    pub directory_index: u64,
    pub timestamp: u64,
    pub size: u64,
    pub md5: Option<Vec<u8>>,
    /// Absolute path once found on disk.
    pub resolved: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineProgramHeader {
    pub format: Format,
    pub version: u16,
    pub address_size: u8,
    pub segment_selector_size: u8,
    pub header_length: u64,
    pub minimum_instruction_length: u8,
    pub maximum_operations_per_instruction: u8,
    pub default_is_stmt: bool,
    pub line_base: i8,
    pub line_range: u8,
    pub opcode_base: u8,
    pub standard_opcode_lengths: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct LineProgramUnit {
    pub header: LineProgramHeader,
    pub include_directories: Vec<FileEntry>,
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct DebugLineSection {
    pub units: Vec<LineProgramUnit>,
    pub entries: Vec<DebugLineEntry>,
}

#[derive(Debug, Clone)]
struct LineState {
    address: u64,
    op_index: u64,
    file: u64,
    line: i64,
    column: u64,
    is_stmt: bool,
    basic_block: bool,
    end_sequence: bool,
    prologue_end: bool,
    epilogue_begin: bool,
    isa: u64,
    discriminator: u64,
}

impl LineState {
    fn new(default_is_stmt: bool) -> Self {
        Self {
            address: 0,
            op_index: 0,
            file: 1,
            line: 1,
            column: 0,
            is_stmt: default_is_stmt,
            basic_block: false,
            end_sequence: false,
            prologue_end: false,
            epilogue_begin: false,
            isa: 0,
            discriminator: 0,
        }
    }
}

/// State machine for a single unit's line program.
pub struct DwarfDebugLineProgram<'u> {
    header: &'u LineProgramHeader,
    files: &'u [FileEntry],
    state: LineState,
    last_row: Option<(u64, i64)>,
    open_entry: Option<usize>,
}

impl<'u> DwarfDebugLineProgram<'u> {
    pub fn new(header: &'u LineProgramHeader, files: &'u [FileEntry]) -> Self {
        Self {
            header,
            files,
            state: LineState::new(header.default_is_stmt),
            last_row: None,
            open_entry: None,
        }
    }

    fn reset(&mut self) {
        self.state = LineState::new(self.header.default_is_stmt);
        self.last_row = None;
        self.open_entry = None;
    }

    fn advance(&mut self, operation_advance: u64) -> Result<(), DecodeError> {
        let max_ops = (self.header.maximum_operations_per_instruction as u64).max(1);
        let min_len = self.header.minimum_instruction_length as u64;
        let ops = self
            .state
            .op_index
            .checked_add(operation_advance)
            .ok_or(DecodeError::OutOfBounds)?;
        let delta = min_len.checked_mul(ops / max_ops).ok_or(DecodeError::OutOfBounds)?;
        self.state.address = self.state.address.wrapping_add(delta);
        self.state.op_index = ops % max_ops;
        Ok(())
    }

    /// Appends a row unless it repeats the (file, line) of the previous one.
    fn commit(&mut self, entries: &mut Vec<DebugLineEntry>) {
        let address = self.state.address;
        if let Some(open) = self.open_entry {
            let entry = &mut entries[open];
            if address > entry.address {
                entry.address_end = entry.address_end.max(address - 1);
            }
        }

        if !self.state.is_stmt {
            return;
        }

        let row = (self.state.file, self.state.line);
        if self.last_row == Some(row) {
            return;
        }
        self.last_row = Some(row);

        let source = usize::try_from(self.state.file)
            .ok()
            .and_then(|idx| self.files.get(idx))
            .map(|file| file.resolved.clone().unwrap_or_else(|| file.path.clone()));

        entries.push(DebugLineEntry {
            address,
            address_end: address,
            source,
            line: self.state.line.max(0) as u64,
        });
        self.open_entry = Some(entries.len() - 1);
    }

    /// Runs the program between the cursor and `end_ofs`.
    pub fn run(
        &mut self,
        d: &mut Deserializer,
        end_ofs: usize,
        entries: &mut Vec<DebugLineEntry>,
    ) -> Result<(), DecodeError> {
        let opcode_base = self.header.opcode_base;
        let line_range = self.header.line_range.max(1) as u64;

        while d.ofs() < end_ofs {
            let opcode = d.read8()?;

            if opcode >= opcode_base {
                let adjusted = (opcode - opcode_base) as u64;
                self.advance(adjusted / line_range)?;
                let delta = self.header.line_base as i64 + (adjusted % line_range) as i64;
                self.state.line = self.state.line.saturating_add(delta);
                self.commit(entries);
                self.state.basic_block = false;
                self.state.prologue_end = false;
                self.state.epilogue_begin = false;
                self.state.discriminator = 0;
                continue;
            }

            match gimli::DwLns(opcode) {
                gimli::DwLns(0) => self.run_extended(d, entries)?,
                gimli::DW_LNS_copy => {
                    self.commit(entries);
                    self.state.discriminator = 0;
                    self.state.basic_block = false;
                    self.state.prologue_end = false;
                    self.state.epilogue_begin = false;
                }
                gimli::DW_LNS_advance_pc => {
                    let steps = d.read_uleb128()?;
                    self.advance(steps)?;
                }
                gimli::DW_LNS_advance_line => {
                    self.state.line = self.state.line.saturating_add(d.read_leb128()?);
                }
                gimli::DW_LNS_set_file => self.state.file = d.read_uleb128()?,
                gimli::DW_LNS_set_column => self.state.column = d.read_uleb128()?,
                gimli::DW_LNS_negate_stmt => self.state.is_stmt = !self.state.is_stmt,
                gimli::DW_LNS_set_basic_block => self.state.basic_block = true,
                gimli::DW_LNS_const_add_pc => {
                    let adjusted = (255 - opcode_base) as u64;
                    self.advance(adjusted / line_range)?;
                }
                gimli::DW_LNS_fixed_advance_pc => {
                    self.state.address = self.state.address.wrapping_add(d.read16()? as u64);
                    self.state.op_index = 0;
                }
                gimli::DW_LNS_set_prologue_end => self.state.prologue_end = true,
                gimli::DW_LNS_set_epilogue_begin => self.state.epilogue_begin = true,
                gimli::DW_LNS_set_isa => self.state.isa = d.read_uleb128()?,
                _ => {
                    // unknown standard opcode: skip its operands
                    let count = self
                        .header
                        .standard_opcode_lengths
                        .get(opcode as usize - 1)
                        .copied()
                        .unwrap_or(0);
                    for _ in 0..count {
                        d.read_uleb128()?;
                    }
                }
            }
        }

        Ok(())
    }

    fn run_extended(
        &mut self,
        d: &mut Deserializer,
        entries: &mut Vec<DebugLineEntry>,
    ) -> Result<(), DecodeError> {
        let size = usize::try_from(d.read_uleb128()?).map_err(|_| DecodeError::InstructionSize)?;
        if size == 0 || size > d.remaining() {
            return Err(DecodeError::InstructionSize);
        }
        let next_ofs = d.ofs() + size;
        let opcode = gimli::DwLne(d.read8()?);

        match opcode {
            gimli::DW_LNE_end_sequence => {
                self.state.end_sequence = true;
                self.commit(entries);
                self.reset();
            }
            gimli::DW_LNE_set_address => {
                let address_size = size - 1;
                if address_size == 0 || address_size > 8 {
                    return Err(DecodeError::InstructionSize);
                }
                self.state.address = d.read_uint(address_size)?;
                self.state.op_index = 0;
            }
            gimli::DW_LNE_define_file => {
                // removed in DWARF 5, payload is skipped below
            }
            gimli::DW_LNE_set_discriminator => {
                self.state.discriminator = d.read_uleb128()?;
            }
            other => debug!("skipping extended line opcode 0x{:02x}", other.0),
        }

        d.set_offset(next_ofs)
    }
}

impl DebugLineSection {
    pub fn decode(
        data: &[u8],
        endian: Endian,
        string_table: Option<StringTable>,
        line_string_table: Option<StringTable>,
    ) -> Result<Self, DecodeError> {
        let mut d = Deserializer::new(data, endian);
        let mut section = DebugLineSection::default();

        while d.remaining() >= 4 {
            let unit = d.read_unit_header()?;
            if unit.end_ofs <= unit.start_ofs {
                break;
            }
            if unit.version != 5 {
                return Err(DecodeError::UnsupportedVersion(unit.version));
            }
            d.set_format(unit.format);

            let address_size = d.read8()?;
            let segment_selector_size = d.read8()?;
            let header_length = d.read_offs()?;
            let program_ofs = usize::try_from(header_length)
                .ok()
                .and_then(|len| d.ofs().checked_add(len))
                .ok_or(DecodeError::OutOfBounds)?;

            let minimum_instruction_length = d.read8()?;
            let maximum_operations_per_instruction = d.read8()?;
            let default_is_stmt = d.read8()? != 0;
            let line_base = d.read8s()?;
            let line_range = d.read8()?;
            let opcode_base = d.read8()?;
            let standard_opcode_lengths = d
                .read_raw(opcode_base.saturating_sub(1) as usize)?
                .to_vec();

            let header = LineProgramHeader {
                format: unit.format,
                version: unit.version,
                address_size,
                segment_selector_size,
                header_length,
                minimum_instruction_length,
                maximum_operations_per_instruction,
                default_is_stmt,
                line_base,
                line_range,
                opcode_base,
                standard_opcode_lengths,
            };

            let params = AttributeParams {
                address_size: Some(address_size),
                string_table,
                line_string_table,
                ..Default::default()
            };

            let mut include_directories = read_entry_table(&mut d, &params)?;
            let mut files = read_entry_table(&mut d, &params)?;

            resolve_paths(&mut include_directories, None);
            resolve_paths(&mut files, Some(&include_directories));

            d.set_offset(program_ofs.min(unit.end_ofs))?;
            let mut program = DwarfDebugLineProgram::new(&header, &files);
            program.run(&mut d, unit.end_ofs, &mut section.entries)?;

            section.units.push(LineProgramUnit {
                header,
                include_directories,
                files,
            });

            d.set_offset(unit.end_ofs)?;
        }

        Ok(section)
    }
}

/// Reads a DWARF 5 directory or file name table: an entry format list of
/// (content type, form) pairs followed by the entries themselves.
fn read_entry_table(d: &mut Deserializer, params: &AttributeParams) -> Result<Vec<FileEntry>, DecodeError> {
    let format_count = d.read8()?;
    let mut formats: Vec<(DwLnct, DwForm)> = Vec::with_capacity(format_count as usize);
    for _ in 0..format_count {
        let content_type = DwLnct(d.read_uleb128()? as u16);
        let form = DwForm(d.read_uleb128()? as u16);
        formats.push((content_type, form));
    }

    let count = d.read_uleb128()?;
    let mut entries = Vec::new();
    for _ in 0..count {
        let mut entry = FileEntry::default();
        for &(content_type, form) in &formats {
            let value = d.read_attribute(form, params)?;
            match content_type {
                gimli::DW_LNCT_path => {
                    entry.path = value.as_str().unwrap_or_default().to_string();
                }
                gimli::DW_LNCT_directory_index => {
                    entry.directory_index = value.as_u64().unwrap_or(0);
                }
                gimli::DW_LNCT_timestamp => {
                    entry.timestamp = value.as_u64().unwrap_or(0);
                }
                gimli::DW_LNCT_size => entry.size = value.as_u64().unwrap_or(0),
                gimli::DW_LNCT_MD5 => {
                    if let AttributeValue::Block(bytes) = value {
                        entry.md5 = Some(bytes);
                    }
                }
                _ => {}
            }
        }
        entries.push(entry);
    }

    Ok(entries)
}

/// Finds each relative entry on disk, first next to the base entry (index 0),
/// then in each of `lookup` in turn.
fn resolve_paths(entries: &mut [FileEntry], lookup: Option<&[FileEntry]>) {
    let Some(base) = entries.first().map(|e| PathBuf::from(&e.path)) else {
        return;
    };

    let base_dir = if base.is_absolute() {
        if base.is_file() {
            base.parent().map(Path::to_path_buf)
        } else {
            Some(base.clone())
        }
    } else {
        None
    };

    for entry in entries.iter_mut() {
        let path = Path::new(&entry.path);
        if path.is_absolute() {
            entry.resolved = Some(normalize_path(path));
            continue;
        }

        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(dir) = &base_dir {
            candidates.push(dir.join(path));
        }
        if let Some(dirs) = lookup {
            for dir in dirs {
                let dir_path = dir.resolved.as_deref().unwrap_or(&dir.path);
                candidates.push(Path::new(dir_path).join(path));
            }
        }

        entry.resolved = candidates
            .into_iter()
            .find(|candidate| candidate.exists())
            .map(|found| normalize_path(&found));
    }
}
