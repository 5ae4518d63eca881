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

use std::path::Path;

use log::{debug, warn};

use super::project::Project;
use super::{DebugInfo, MAX_ADDRESS};
use crate::elf::Elf;
use crate::error::{DecodeError, LoadError};
use crate::symbols::{DebugAddressInfo, DebugSymbol};

const KIND: &str = "ELF";

/// Narrows a DWARF address pair to the target's address width. The store
/// rejects anything past the top of memory.
fn to_range(address: u64, end: u64) -> Option<(u32, u32)> {
    Some((u32::try_from(address).ok()?, u32::try_from(end).ok()?))
}

/// Loads line info, object symbols and functions from an ELF file with
/// DWARF 5 debug sections (llvm-mos).
pub fn load(store: &mut DebugInfo, _project: &dyn Project, filename: &Path) -> Result<(), LoadError> {
    let elf = Elf::load(filename)?;
    let format_error = |e: DecodeError| LoadError::format(KIND, filename, e);

    if let Some(lines) = elf.debug_line().map_err(format_error)? {
        for entry in &lines.entries {
            let Some((address, end)) = to_range(entry.address, entry.address_end) else {
                warn!(
                    "skipping line entry at 0x{:x}..0x{:x} outside the address space",
                    entry.address, entry.address_end
                );
                continue;
            };
            let line = u32::try_from(entry.line).unwrap_or(u32::MAX);
            let info = DebugAddressInfo::new(address, Some(end), entry.source.as_deref(), line);
            store.add_address_range(info);
        }
    }

    if let Some(symbols) = elf.symbol_table().map_err(format_error)? {
        for sym in symbols.iter().filter(|s| s.is_object() && !s.name.is_empty()) {
            let Ok(value) = i64::try_from(sym.value) else {
                continue;
            };
            let size = u32::try_from(sym.size).unwrap_or(0);
            store.add_symbol(DebugSymbol::new(sym.name.clone(), value, true).with_sizes(0, size));
        }
    }

    if let Some(info) = elf.debug_info().map_err(format_error)? {
        for tag in info.tags_of(gimli::DW_TAG_subprogram) {
            let (Some(name), Some((low, high))) = (tag.name(), tag.pc_range()) else {
                continue;
            };
            let Some((address, end)) = to_range(low, high.saturating_sub(1).max(low))
                .filter(|&(_, end)| end <= MAX_ADDRESS)
            else {
                debug!("skipping function {} at 0x{:x}", name, low);
                continue;
            };

            let first_line = store.get_address_info(address);
            let function = DebugAddressInfo::new(
                address,
                Some(end),
                first_line.and_then(|l| l.source.as_deref()),
                first_line.map_or(0, |l| l.line),
            )
            .with_name(name);
            store.add_function(function);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug_info::project::ProjectContext;

    #[test]
    fn test_range_narrowing() {
        assert_eq!(to_range(0x0801, 0x0803), Some((0x0801, 0x0803)));
        assert_eq!(to_range(0, 0x10000), Some((0, 0x10000)));
        assert_eq!(to_range(0x1_0000_0000, 0x1_0000_0001), None);
        assert_eq!(to_range(0, u64::MAX), None);
    }

    #[test]
    fn test_missing_and_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DebugInfo::new();
        let project = ProjectContext::default();

        let err = load(&mut store, &project, &dir.path().join("none.elf")).unwrap_err();
        assert!(err.to_string().starts_with("ELF file"), "{}", err);
        assert!(err.to_string().ends_with("does not exist"), "{}", err);

        let path = dir.path().join("bad.elf");
        std::fs::write(&path, b"not an elf file").unwrap();
        let err = load(&mut store, &project, &path).unwrap_err();
        assert!(err.to_string().contains("invalid ELF file"), "{}", err);
    }
}
