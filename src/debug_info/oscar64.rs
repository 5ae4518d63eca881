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

//! Oscar64 debug files (`-g`, `.dbj`).
//!
//! The compiler writes JSON with unquoted object keys. Keys are quoted with a
//! regular expression before the text is handed to `serde_json`.

use std::path::Path;

use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::project::Project;
use super::{read_text, DebugInfo};
use crate::error::LoadError;
use crate::memory::DebugMemory;
use crate::symbols::{DebugAddressInfo, DebugDataType, DebugSymbol};

const KIND: &str = "debug info";

/// Nesting limit for struct and array expansion.
const MAX_DEPTH: usize = 16;

static RELAXED_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([{,])\s*([a-zA-Z_][a-zA-Z0-9_]*)\s*:").expect("valid key pattern"));

fn quote_keys(text: &str) -> String {
    RELAXED_KEY.replace_all(text, r#"${1}"${2}":"#).into_owned()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DebugFile {
    types: Vec<TypeEntry>,
    functions: Vec<FunctionEntry>,
    variables: Vec<VariableEntry>,
    memory: Vec<MemoryEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TypeEntry {
    name: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    size: u32,
    eid: Option<usize>,
    members: Vec<MemberEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MemberEntry {
    name: String,
    offset: u32,
    typeid: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VariableEntry {
    name: String,
    start: i64,
    end: i64,
    typeid: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LineEntry {
    start: i64,
    end: i64,
    source: Option<String>,
    line: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FunctionEntry {
    name: String,
    source: Option<String>,
    line: u32,
    start: i64,
    end: i64,
    lines: Vec<LineEntry>,
    variables: Vec<VariableEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MemoryEntry {
    name: String,
    start: i64,
    end: i64,
    #[serde(rename = "type")]
    kind: String,
    source: Option<String>,
    line: u32,
}

#[derive(Debug, Clone, PartialEq)]
struct Member {
    name: String,
    offset: u32,
    type_index: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum Shape {
    Plain,
    Struct(Vec<Member>),
    Array { element: usize, count: u32 },
    Pointer(Option<usize>),
}

#[derive(Debug, Clone, PartialEq)]
struct TypeInfo {
    name: String,
    data_type: Option<DebugDataType>,
    size: u32,
    shape: Shape,
}

fn data_type_of(kind: &str, size: u32) -> Option<DebugDataType> {
    match (kind, size) {
        ("int", _) => DebugDataType::integer(size, true),
        ("uint", _) | ("enum", _) => DebugDataType::integer(size, false),
        ("bool", 1) => Some(DebugDataType::Bool),
        ("float", 4) => Some(DebugDataType::Float32),
        ("double", 8) => Some(DebugDataType::Float64),
        ("array", _) => Some(DebugDataType::Array),
        ("struct", _) | ("union", _) => Some(DebugDataType::Struct),
        ("ptr", _) => Some(DebugDataType::Pointer),
        _ => None,
    }
}

/// Type table; entries refer to each other by position.
#[derive(Debug, Default)]
struct TypeTable(Vec<TypeInfo>);

impl TypeTable {
    fn decode(entries: &[TypeEntry]) -> Self {
        let mut types: Vec<TypeInfo> = entries
            .iter()
            .map(|entry| TypeInfo {
                name: entry.name.clone().unwrap_or_default(),
                data_type: data_type_of(&entry.kind, entry.size),
                size: entry.size,
                shape: Shape::Plain,
            })
            .collect();

        for (index, entry) in entries.iter().enumerate() {
            let shape = match types[index].data_type {
                Some(DebugDataType::Struct) => Shape::Struct(
                    entry
                        .members
                        .iter()
                        .filter_map(|m| {
                            let type_index = m.typeid.filter(|&t| t < types.len())?;
                            Some(Member {
                                name: m.name.clone(),
                                offset: m.offset,
                                type_index,
                            })
                        })
                        .collect(),
                ),
                Some(DebugDataType::Array) => match entry.eid.filter(|&e| e < types.len()) {
                    Some(element) => {
                        let element_size = types[element].size.max(1);
                        Shape::Array {
                            element,
                            count: entry.size / element_size,
                        }
                    }
                    None => {
                        debug!("array type {} without element type", index);
                        Shape::Plain
                    }
                },
                Some(DebugDataType::Pointer) => Shape::Pointer(entry.eid.filter(|&e| e < types.len())),
                _ => Shape::Plain,
            };
            types[index].shape = shape;
        }

        TypeTable(types)
    }

    fn get(&self, index: usize) -> Option<&TypeInfo> {
        self.0.get(index)
    }

    /// Builds the symbol for a value of type `type_index` stored at
    /// `address..end`, expanding struct members and arrays of structs.
    fn symbol(&self, name: &str, type_index: usize, address: i64, end: i64, depth: usize) -> Option<DebugSymbol> {
        let info = self.get(type_index)?;
        let memory_size = u32::try_from(end - address).unwrap_or(0);

        let mut data_type = info.data_type.unwrap_or(DebugDataType::Void);
        let mut data_size = info.size;
        let mut type_name = None;
        let mut children = None;
        let mut num_children = None;
        let mut type_ref = None;

        match &info.shape {
            Shape::Array { element, count } => {
                let element_info = self.get(*element)?;
                data_type = element_info.data_type.unwrap_or(DebugDataType::Void);
                data_size = element_info.size;
                num_children = Some(*count);

                if data_type.is_struct() && depth < MAX_DEPTH {
                    let step = i64::from(element_info.size);
                    children = Some(
                        (0..i64::from(*count))
                            .filter_map(|i| {
                                let start = address + i * step;
                                self.symbol(&format!("[{}]", i), *element, start, start + step, depth + 1)
                            })
                            .collect(),
                    );
                }
            }
            Shape::Struct(members) => {
                type_name = Some(info.name.clone());
                data_size = 0;
                if depth < MAX_DEPTH {
                    children = Some(
                        members
                            .iter()
                            .filter_map(|member| {
                                let member_size = i64::from(self.get(member.type_index)?.size);
                                let start = address + i64::from(member.offset);
                                self.symbol(&member.name, member.type_index, start, start + member_size, depth + 1)
                            })
                            .collect(),
                    );
                }
            }
            Shape::Pointer(target) => {
                type_ref = *target;
                type_name = target.and_then(|t| self.get(t)).map(|t| t.name.clone());
            }
            Shape::Plain => {}
        }

        let mut symbol = DebugSymbol::new(name, address, true)
            .with_sizes(data_size, memory_size)
            .with_type(data_type);
        symbol.type_name = type_name.filter(|n| !n.is_empty());
        if let Some(t) = type_ref {
            symbol.set_type_ref(t);
        }
        match children {
            Some(children) => symbol.set_children(children),
            None => symbol.num_children = num_children,
        }
        Some(symbol)
    }

    fn variable(&self, variable: &VariableEntry) -> Option<DebugSymbol> {
        if variable.name.is_empty() {
            return None;
        }
        self.symbol(&variable.name, variable.typeid?, variable.start, variable.end, 0)
    }
}

fn to_address(value: i64) -> Option<u32> {
    u32::try_from(value).ok()
}

pub fn load(store: &mut DebugInfo, _project: &dyn Project, filename: &Path) -> Result<(), LoadError> {
    let text = read_text(KIND, filename)?;
    let dbg: DebugFile =
        serde_json::from_str(&quote_keys(&text)).map_err(|e| LoadError::format(KIND, filename, e))?;

    let types = TypeTable::decode(&dbg.types);

    for func in &dbg.functions {
        if func.name.is_empty() {
            continue;
        }
        let Some(start) = to_address(func.start) else {
            warn!("function {} has invalid start address {}", func.name, func.start);
            continue;
        };

        let mut function = DebugAddressInfo::new(
            start,
            to_address(func.end.saturating_sub(1)),
            func.source.as_deref(),
            func.line,
        )
        .with_name(func.name.clone());
        for symbol in func.variables.iter().filter_map(|v| types.variable(v)) {
            function.add_debug_symbol(symbol);
        }
        store.add_function(function);

        for line in &func.lines {
            let Some(address) = to_address(line.start) else {
                continue;
            };
            let end = to_address(line.end.saturating_sub(1)).unwrap_or(address).max(address);
            let info = DebugAddressInfo::new(address, Some(end), line.source.as_deref(), line.line);
            store.add_address_range(info);
        }
    }

    for symbol in dbg.variables.iter().filter_map(|v| types.variable(v)) {
        store.add_symbol(symbol);
    }

    for block in dbg.memory.iter().filter(|m| !m.name.is_empty() && m.kind == "DATA") {
        let (Some(start), Some(end)) = (to_address(block.start), to_address(block.end.saturating_sub(1))) else {
            continue;
        };
        store.add_memory_block(DebugMemory::new(
            block.name.clone(),
            start,
            end,
            block.source.as_deref(),
            block.line,
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug_info::project::ProjectContext;
    use std::fs;

    const DEBUG_FILE: &str = r#"{
	memory: [
		{name: "main", start: 2061, end: 2100, type: "NATIVE_CODE", source: "/src/main.c", line: 10},
		{name: "pos", start: 2200, end: 2204, type: "DATA", source: "/src/main.c", line: 4}
	],
	variables: [
		{name: "pos", start: 2200, end: 2204, typeid: 2},
		{name: "points", start: 2300, end: 2308, typeid: 3},
		{name: "counter", start: 2400, end: 2402, typeid: 1},
		{name: "ptr", start: 2402, end: 2404, typeid: 4},
		{name: "line", start: 2500, end: 2508, typeid: 5}
	],
	functions: [
		{name: "main", source: "/src/main.c", line: 10, start: 2061, end: 2100,
			lines: [
				{start: 2061, end: 2064, source: "/src/main.c", line: 11},
				{start: 2064, end: 2070, source: "/src/main.c", line: 12}
			],
			variables: [
				{name: "i", start: 2450, end: 2451, typeid: 0}
			]}
	],
	types: [
		{name: "char", typeid: 0, size: 1, type: "uint"},
		{name: "int", typeid: 1, size: 2, type: "int"},
		{name: "Point", typeid: 2, size: 4, type: "struct", members: [
			{name: "x", offset: 0, typeid: 1},
			{name: "y", offset: 2, typeid: 1}
		]},
		{typeid: 3, size: 8, type: "array", eid: 2},
		{typeid: 4, size: 2, type: "ptr", eid: 2},
		{name: "Line", typeid: 5, size: 8, type: "struct", members: [
			{name: "from", offset: 0, typeid: 2},
			{name: "to", offset: 4, typeid: 2}
		]}
	]
}"#;

    fn load_file() -> DebugInfo {
        load_text(DEBUG_FILE)
    }

    fn load_text(text: &str) -> DebugInfo {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.dbj");
        fs::write(&path, text).unwrap();
        let mut store = DebugInfo::new();
        load(&mut store, &ProjectContext::default(), &path).unwrap();
        store
    }

    #[test]
    fn test_relaxed_keys_are_quoted() {
        let quoted = quote_keys(r#"{name: "a", size:2, "kept": 1}"#);
        assert_eq!(quoted, r#"{"name": "a","size":2, "kept": 1}"#);
        let value: serde_json::Value = serde_json::from_str(&quoted).unwrap();
        assert_eq!(value["size"], 2);
    }

    #[test]
    fn test_struct_members() {
        let store = load_file();
        let pos = store.get_symbol("pos").unwrap();
        assert_eq!(pos.data_type, Some(DebugDataType::Struct));
        assert_eq!(pos.type_name.as_deref(), Some("Point"));
        assert_eq!(pos.memory_size, 4);

        let children = pos.children.as_ref().unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!((children[1].name.as_str(), children[1].value), ("y", 2202));
        assert_eq!(children[1].data_type, Some(DebugDataType::Int16));
        assert_eq!(children[1].memory_size, 2);
    }

    #[test]
    fn test_nested_struct_offsets_accumulate() {
        let store = load_file();
        let line = store.get_symbol("line").unwrap();
        let to = &line.children.as_ref().unwrap()[1];
        let y = &to.children.as_ref().unwrap()[1];
        assert_eq!(to.value, 2504);
        assert_eq!(y.value, 2506);
    }

    #[test]
    fn test_array_of_structs() {
        let store = load_file();
        let points = store.get_symbol("points").unwrap();
        assert_eq!(points.data_type, Some(DebugDataType::Struct));
        assert_eq!(points.num_children, Some(2));
        assert_eq!(points.data_size, 4);
        let second = &points.children.as_ref().unwrap()[1];
        assert_eq!((second.name.as_str(), second.value), ("[1]", 2304));
        assert_eq!(second.children.as_ref().unwrap()[0].value, 2304);
    }

    #[test]
    fn test_pointer_and_primitives() {
        let store = load_file();
        let ptr = store.get_symbol("ptr").unwrap();
        assert!(ptr.data_type.unwrap().is_pointer());
        assert_eq!(ptr.type_ref, Some(2));
        assert_eq!(ptr.type_name.as_deref(), Some("Point"));
        assert_eq!(store.get_symbol("counter").unwrap().data_type, Some(DebugDataType::Int16));
    }

    #[test]
    fn test_functions_lines_and_memory() {
        let store = load_file();
        let main = store.get_function_by_addr(2070).unwrap();
        assert_eq!(main.name.as_deref(), Some("main"));
        assert_eq!(main.address_end, 2099);
        assert_eq!(main.debug_symbols[0].name, "i");
        assert_eq!(main.debug_symbols[0].data_type, Some(DebugDataType::UInt8));

        let info = store.get_address_info(2063).unwrap();
        assert_eq!((info.address, info.address_end, info.line), (2061, 2063, 11));
        assert_eq!(store.get_address_info(2064).unwrap().line, 12);

        assert_eq!(store.memblocks().len(), 1);
        assert_eq!(store.memblocks()[0].name, "pos");
        assert_eq!(store.memblocks()[0].end_address, 2203);
    }

    #[test]
    fn test_lines_outside_address_space_are_dropped() {
        let text = DEBUG_FILE.replace(
            r#"{start: 2064, end: 2070, source: "/src/main.c", line: 12}"#,
            r#"{start: 2064, end: 2070, source: "/src/main.c", line: 12},
				{start: 0, end: 4294967296, source: "/src/main.c", line: 13},
				{start: 65530, end: 70000, source: "/src/main.c", line: 14},
				{start: 2070, end: -9223372036854775808, source: "/src/main.c", line: 15}"#,
        );
        let store = load_text(&text);

        assert!(store.get_address_info(0).is_none());
        assert!(store.get_address_info(65530).is_none());
        assert_eq!(store.get_address_info(2063).unwrap().line, 11);
        // an end before the start collapses to a single address
        let info = store.get_address_info(2070).unwrap();
        assert_eq!((info.address_end, info.line), (2070, 15));
        assert_eq!(store.line_list("/src/main.c").unwrap().len(), 3);
    }

    #[test]
    fn test_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.dbj");
        fs::write(&path, "{types: [").unwrap();
        let mut store = DebugInfo::new();
        let err = load(&mut store, &ProjectContext::default(), &path).unwrap_err();
        assert!(err.to_string().starts_with("unable to read debug info file"), "{}", err);
    }
}
