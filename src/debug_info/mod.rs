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

//! The unified debug-info store.
//!
//! Every toolchain loader feeds the same [`DebugInfo`] through its append
//! API. The store keeps three views of the address ranges:
//! - a flat list indexed by `global_ref`,
//! - a sparse map from every covered address to its range,
//! - one address ordered list per source file, indexed by `local_ref`.

pub mod acme;
pub mod basic;
pub mod cc65;
pub mod elf;
pub mod kick;
pub mod oscar64;
pub mod project;
pub mod toolchain;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::{info, warn};

use crate::error::LoadError;
use crate::memory::DebugMemory;
use crate::symbols::{
    DebugAddressInfo, DebugLabel, DebugLineType, DebugSymbol, ScopeInfo, ScopeSpan,
};
use crate::utils::normalize_path;
use project::Project;
use toolchain::ToolchainKind;

/// Highest address on the 16-bit target.
pub const MAX_ADDRESS: u32 = 0xFFFF;

#[derive(Debug, Default)]
pub struct DebugInfo {
    addresses: Vec<DebugAddressInfo>,
    address_map: HashMap<u32, usize>,
    line_lists: HashMap<String, Vec<usize>>,
    symbols: Vec<DebugSymbol>,
    symbol_map: HashMap<String, usize>,
    labels: HashMap<String, DebugLabel>,
    functions: Vec<DebugAddressInfo>,
    memblocks: Vec<DebugMemory>,
    scope_spans: Vec<ScopeSpan>,
    scopes: Vec<ScopeInfo>,
    supports_scopes: bool,
    has_c_stack: bool,
    filename: Option<PathBuf>,
    timestamp: Option<SystemTime>,
}

impl DebugInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `filename` with the loader registered for `kind`. A failed load
    /// yields no store at all.
    pub fn load(kind: ToolchainKind, project: &dyn Project, filename: &Path) -> Result<Self, LoadError> {
        let loader = kind
            .loader()
            .ok_or_else(|| LoadError::format("debug database", filename, "no loader for toolchain"))?;

        let mut store = DebugInfo::new();
        loader(&mut store, project, filename)?;
        store.finalize();
        store.filename = Some(filename.to_path_buf());
        store.timestamp = fs::metadata(filename).and_then(|m| m.modified()).ok();

        info!(
            "loaded {} debug info from {}: {} address ranges, {} symbols, {} labels",
            kind,
            filename.display(),
            store.addresses.len(),
            store.symbols.len(),
            store.labels.len()
        );

        Ok(store)
    }

    fn finalize(&mut self) {
        for (index, symbol) in self.symbols.iter_mut().enumerate() {
            symbol.index = Some(index);
        }
    }

    // ---- append API ----

    /// Appends an address range, covering each of its addresses in the
    /// address map and placing it in its source file's line list. Returns the
    /// range's `global_ref`, or `None` if the range leaves the 64K address
    /// space and was dropped.
    pub fn add_address_range(&mut self, mut info: DebugAddressInfo) -> Option<usize> {
        if info.address_end > MAX_ADDRESS || info.address > info.address_end {
            warn!(
                "skipping address range 0x{:x}..0x{:x} of {} line {}",
                info.address,
                info.address_end,
                info.source.as_deref().unwrap_or("<unknown>"),
                info.line
            );
            return None;
        }

        let global = self.addresses.len();
        info.global_ref = Some(global);

        for addr in info.address..=info.address_end {
            self.address_map.insert(addr, global);
        }

        let Some(key) = info.normalized_path.clone() else {
            self.addresses.push(info);
            return Some(global);
        };

        let list = self.line_lists.entry(key).or_default();
        let rank = |a: &DebugAddressInfo| (a.address, DebugLineType::sort_rank(a.line_type));
        let new_rank = rank(&info);
        let pos = list.partition_point(|&g| rank(&self.addresses[g]) <= new_rank);
        list.insert(pos, global);
        info.local_ref = Some(pos);
        self.addresses.push(info);

        for (local, &g) in list.iter().enumerate().skip(pos + 1) {
            self.addresses[g].local_ref = Some(local);
        }

        Some(global)
    }

    /// Returns the line list of an already normalized path, creating it if needed.
    pub fn get_or_create_line_list(&mut self, normalized_path: &str) -> &[usize] {
        self.line_lists
            .entry(normalized_path.to_string())
            .or_default()
    }

    pub fn add_symbol(&mut self, symbol: DebugSymbol) -> usize {
        match self.symbol_map.get(&symbol.name) {
            Some(&index) => {
                self.symbols[index] = symbol;
                index
            }
            None => {
                let index = self.symbols.len();
                self.symbol_map.insert(symbol.name.clone(), index);
                self.symbols.push(symbol);
                index
            }
        }
    }

    pub fn add_label(&mut self, label: DebugLabel) {
        self.labels.insert(label.name.clone(), label);
    }

    pub fn add_function(&mut self, function: DebugAddressInfo) -> usize {
        self.functions.push(function);
        self.functions.len() - 1
    }

    pub fn add_memory_block(&mut self, block: DebugMemory) {
        self.memblocks.push(block);
    }

    pub fn attach_symbol(&mut self, global_ref: usize, symbol: DebugSymbol) {
        if let Some(info) = self.addresses.get_mut(global_ref) {
            info.add_debug_symbol(symbol);
        }
    }

    pub fn attach_label(&mut self, global_ref: usize, label: DebugLabel) {
        if let Some(info) = self.addresses.get_mut(global_ref) {
            info.add_debug_label(label);
        }
    }

    pub fn set_scopes(&mut self, spans: Vec<ScopeSpan>, scopes: Vec<ScopeInfo>) {
        self.scope_spans = spans;
        self.scopes = scopes;
    }

    pub fn set_supports_scopes(&mut self, value: bool) {
        self.supports_scopes = value;
    }

    pub fn set_has_c_stack(&mut self, value: bool) {
        self.has_c_stack = value;
    }

    // ---- lookups ----

    pub fn get_address_info(&self, addr: u32) -> Option<&DebugAddressInfo> {
        self.address_map.get(&addr).map(|&g| &self.addresses[g])
    }

    pub fn address(&self, global_ref: usize) -> Option<&DebugAddressInfo> {
        self.addresses.get(global_ref)
    }

    pub fn addresses(&self) -> &[DebugAddressInfo] {
        &self.addresses
    }

    pub fn has_addresses(&self) -> bool {
        !self.addresses.is_empty()
    }

    /// The address ordered line list of `filename`.
    pub fn line_list(&self, filename: &str) -> Option<Vec<&DebugAddressInfo>> {
        let list = self.line_lists.get(&self.get_ref_name(filename))?;
        Some(list.iter().map(|&g| &self.addresses[g]).collect())
    }

    fn list_of(&self, info: &DebugAddressInfo) -> Option<&Vec<usize>> {
        self.line_lists.get(info.normalized_path.as_ref()?)
    }

    pub fn find_next_line(&self, addr: u32) -> Option<&DebugAddressInfo> {
        let info = self.get_address_info(addr)?;
        let list = self.list_of(info)?;
        let next = list.get(info.local_ref? + 1)?;
        self.addresses.get(*next)
    }

    /// First code line at or after `line` in `filename`, lowest address first.
    pub fn find_nearest_code_line(&self, filename: &str, line: u32) -> Option<&DebugAddressInfo> {
        let list = self.line_lists.get(&self.get_ref_name(filename))?;
        list.iter()
            .map(|&g| &self.addresses[g])
            .filter(|info| info.line >= line)
            .min_by_key(|info| (info.line, info.address))
    }

    /// Walks back through the file's line list from `addr` to the nearest
    /// range carrying a label.
    pub fn find_label(&self, addr: u32) -> Option<&DebugLabel> {
        let mut item = self.get_address_info(addr)?;
        loop {
            if let Some(label) = item.debug_labels.first() {
                return Some(label);
            }
            let local = item.local_ref.filter(|&l| l > 0)?;
            let list = self.list_of(item)?;
            item = self.addresses.get(*list.get(local - 1)?)?;
        }
    }

    pub fn get_symbol(&self, name: &str) -> Option<&DebugSymbol> {
        self.symbol_map.get(name).map(|&i| &self.symbols[i])
    }

    pub fn get_symbol_by_index(&self, index: usize) -> Option<&DebugSymbol> {
        self.symbols.get(index)
    }

    pub fn symbols(&self) -> &[DebugSymbol] {
        &self.symbols
    }

    pub fn has_symbols(&self) -> bool {
        !self.symbols.is_empty()
    }

    pub fn get_label(&self, name: &str) -> Option<&DebugLabel> {
        self.labels.get(name)
    }

    pub fn labels(&self) -> impl Iterator<Item = &DebugLabel> {
        self.labels.values()
    }

    pub fn functions(&self) -> &[DebugAddressInfo] {
        &self.functions
    }

    pub fn get_function_by_addr(&self, addr: u32) -> Option<&DebugAddressInfo> {
        self.functions.iter().find(|f| f.contains(addr))
    }

    pub fn memblocks(&self) -> &[DebugMemory] {
        &self.memblocks
    }

    pub fn has_memblocks(&self) -> bool {
        !self.memblocks.is_empty()
    }

    /// Scopes of the code span holding `addr`, or of the closest preceding
    /// span that has any.
    pub fn get_scopes(&self, addr: u32) -> Option<Vec<&ScopeInfo>> {
        if !self.supports_scopes {
            return None;
        }
        let span = self.get_address_info(addr)?.span?;
        self.scope_spans
            .get(..=span)?
            .iter()
            .rev()
            .find(|s| !s.scopes.is_empty())
            .map(|s| s.scopes.iter().filter_map(|&i| self.scopes.get(i)).collect())
    }

    /// Name of the function whose scope covers `addr`.
    pub fn get_scope_name(&self, addr: u32) -> Option<&str> {
        self.get_scopes(addr)?
            .into_iter()
            .flat_map(|scope| scope.csyms.iter())
            .find(|csym| csym.storage_class == "ext" && csym.type_id == 0)
            .map(|csym| csym.name.as_str())
    }

    /// Stack relative local `name` visible at `addr`. The symbol value is the
    /// offset from the C stack pointer.
    pub fn get_scoped_symbol(&self, addr: u32, name: &str) -> Option<DebugSymbol> {
        self.get_scopes(addr)?
            .into_iter()
            .flat_map(|scope| scope.csyms.iter())
            .find(|csym| csym.storage_class == "auto" && csym.type_id == 0 && csym.name == name)
            .map(|csym| DebugSymbol::new(name, csym.offset, true))
    }

    pub fn get_ref_name(&self, filename: &str) -> String {
        normalize_path(filename)
    }

    pub fn supports_scopes(&self) -> bool {
        self.supports_scopes
    }

    pub fn has_c_stack(&self) -> bool {
        self.has_c_stack
    }

    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    pub fn timestamp(&self) -> Option<SystemTime> {
        self.timestamp
    }
}

/// Reads a whole text debug file, mapping I/O failures to the loader's wording.
pub(crate) fn read_text(kind: &'static str, filename: &Path) -> Result<String, LoadError> {
    fs::read_to_string(filename).map_err(|e| LoadError::from_io(kind, filename, e))
}
