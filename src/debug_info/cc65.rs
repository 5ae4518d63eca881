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

//! cc65 debug databases (`ld65 --dbgfile`).
//!
//! The file is a list of records, one per line:
//!
//! ```text
//! seg   id=0,name="CODE",start=0x000801,size=0x0100,addrsize=absolute
//! span  id=3,seg=0,start=16,size=3
//! line  id=7,file=0,line=5,type=1,span=3
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use log::{debug, warn};

use super::project::Project;
use super::{read_text, DebugInfo};
use crate::error::LoadError;
use crate::symbols::{
    CSymInfo, DebugAddressInfo, DebugDataType, DebugLineType, DebugSymbol, ScopeInfo, ScopeSpan,
};
use crate::utils::parse_int;

const KIND: &str = "debug database";

/// Used when the database has no ZEROPAGE segment.
const DEFAULT_ZEROPAGE_START: i64 = 0x02;

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Str(String),
    Int(i64),
    List(Vec<i64>),
}

#[derive(Debug, Default)]
struct Record {
    key: String,
    attributes: HashMap<String, Value>,
}

impl Record {
    fn int(&self, name: &str) -> Option<i64> {
        match self.attributes.get(name)? {
            Value::Int(v) => Some(*v),
            Value::List(list) => list.first().copied(),
            Value::Str(s) => s.parse().ok(),
        }
    }

    fn ints(&self, name: &str) -> Vec<i64> {
        match self.attributes.get(name) {
            Some(Value::List(list)) => list.clone(),
            Some(Value::Int(v)) => vec![*v],
            _ => Vec::new(),
        }
    }

    fn string(&self, name: &str) -> Option<String> {
        match self.attributes.get(name)? {
            Value::Str(s) => Some(s.clone()),
            Value::Int(v) => Some(v.to_string()),
            Value::List(_) => None,
        }
    }
}

fn decode_value(key: &str, raw: &str) -> Option<Value> {
    if raw.is_empty() {
        return None;
    }
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return Some(Value::Str(raw[1..raw.len() - 1].to_string()));
    }
    if key == "name" || key == "addrsize" {
        return Some(Value::Str(raw.to_string()));
    }
    if raw.contains('+') {
        let list: Vec<i64> = raw.split('+').filter_map(parse_int).collect();
        return (!list.is_empty()).then_some(Value::List(list));
    }
    Some(match parse_int(raw) {
        Some(v) => Value::Int(v),
        None => Value::Str(raw.to_string()),
    })
}

/// Splits `a=1,name="x,y",b=2` on the commas outside of quotes.
fn split_attributes(data: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in data.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => {
                parts.push(&data[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&data[start..]);
    parts
}

fn parse_record(line: &str) -> Option<Record> {
    let pos = line.find('\t').or_else(|| line.find(' '))?;
    let key = line[..pos].trim();
    if key.is_empty() {
        return None;
    }

    let mut record = Record {
        key: key.to_string(),
        ..Default::default()
    };
    for element in split_attributes(&line[pos + 1..]) {
        let Some((name, raw)) = element.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if let Some(value) = decode_value(name, raw.trim()) {
            record.attributes.insert(name.to_string(), value);
        }
    }
    Some(record)
}

#[derive(Debug)]
struct FileRecord {
    name: String,
}

#[derive(Debug)]
struct LineRecord {
    file: Option<i64>,
    line: u32,
    line_type: Option<DebugLineType>,
    spans: Vec<i64>,
}

#[derive(Debug)]
struct SegRecord {
    name: String,
    start: i64,
}

#[derive(Debug)]
struct SpanRecord {
    seg: Option<i64>,
    start: i64,
    size: i64,
}

#[derive(Debug)]
struct ScopeRecord {
    name: String,
    spans: Vec<i64>,
}

#[derive(Debug)]
struct SymRecord {
    name: String,
    scope: Option<i64>,
    seg: Option<i64>,
    val: Option<i64>,
    sym_type: Option<String>,
}

#[derive(Debug)]
struct CSymRecord {
    name: String,
    scope: Option<i64>,
    sym: Option<i64>,
    offset: i64,
    storage_class: String,
    type_id: i64,
}

/// All records of a database, keyed by id.
#[derive(Debug, Default)]
struct Database {
    files: BTreeMap<i64, FileRecord>,
    lines: BTreeMap<i64, LineRecord>,
    segs: BTreeMap<i64, SegRecord>,
    spans: BTreeMap<i64, SpanRecord>,
    scopes: BTreeMap<i64, ScopeRecord>,
    syms: BTreeMap<i64, SymRecord>,
    csyms: BTreeMap<i64, CSymRecord>,
}

impl Database {
    fn parse(text: &str) -> Self {
        let mut db = Database::default();

        for record in text.lines().filter(|l| !l.trim().is_empty()).filter_map(parse_record) {
            let Some(id) = record.int("id") else {
                if !matches!(record.key.as_str(), "version" | "info") {
                    debug!("skipping '{}' record without id", record.key);
                }
                continue;
            };
            let name = record.string("name").unwrap_or_default();

            match record.key.as_str() {
                "file" => {
                    db.files.insert(id, FileRecord { name });
                }
                "line" => {
                    db.lines.insert(
                        id,
                        LineRecord {
                            file: record.int("file"),
                            line: record.int("line").and_then(|l| u32::try_from(l).ok()).unwrap_or(0),
                            line_type: record.int("type").and_then(DebugLineType::from_code),
                            spans: record.ints("span"),
                        },
                    );
                }
                "seg" => {
                    db.segs.insert(
                        id,
                        SegRecord {
                            name,
                            start: record.int("start").unwrap_or(0),
                        },
                    );
                }
                "span" => {
                    db.spans.insert(
                        id,
                        SpanRecord {
                            seg: record.int("seg"),
                            start: record.int("start").unwrap_or(0),
                            size: record.int("size").unwrap_or(0),
                        },
                    );
                }
                "scope" => {
                    db.scopes.insert(
                        id,
                        ScopeRecord {
                            name,
                            spans: record.ints("span"),
                        },
                    );
                }
                "sym" => {
                    db.syms.insert(
                        id,
                        SymRecord {
                            name,
                            scope: record.int("scope"),
                            seg: record.int("seg"),
                            val: record.int("val"),
                            sym_type: record.string("type"),
                        },
                    );
                }
                "csym" => {
                    db.csyms.insert(
                        id,
                        CSymRecord {
                            name,
                            scope: record.int("scope"),
                            sym: record.int("sym"),
                            offset: record.int("offs").unwrap_or(0),
                            storage_class: record.string("sc").unwrap_or_default(),
                            type_id: record.int("type").unwrap_or(0),
                        },
                    );
                }
                "lib" | "mod" | "type" => {}
                other => debug!("unknown record type '{}'", other),
            }
        }

        db
    }

    fn segment_id(&self, name: &str) -> Option<i64> {
        self.segs.iter().find(|(_, s)| s.name == name).map(|(&id, _)| id)
    }

    fn span_address(&self, span: &SpanRecord) -> Option<u32> {
        let seg = self.segs.get(&span.seg?)?;
        u32::try_from(seg.start + span.start).ok()
    }
}

fn span_end(address: u32, size: i64) -> u32 {
    let size = u32::try_from(size).unwrap_or(0);
    address.saturating_add(size.saturating_sub(1))
}

pub fn load(store: &mut DebugInfo, project: &dyn Project, filename: &Path) -> Result<(), LoadError> {
    let text = read_text(KIND, filename)?;
    let db = Database::parse(&text);

    let code_seg = db.segment_id("CODE").unwrap_or(0);
    let data_seg = db.segment_id("DATA");
    let zeropage_start = db
        .segment_id("ZEROPAGE")
        .and_then(|id| db.segs.get(&id))
        .map_or(DEFAULT_ZEROPAGE_START, |s| s.start);
    let Ok(stack_pointer) = u32::try_from(zeropage_start) else {
        return Err(LoadError::format(KIND, filename, "invalid ZEROPAGE segment start"));
    };

    let scope_index: HashMap<i64, usize> = db.scopes.keys().enumerate().map(|(i, &id)| (id, i)).collect();

    // code spans in address order, each with the scopes that cover it
    let mut code_spans: Vec<(i64, ScopeSpan)> = db
        .spans
        .iter()
        .filter(|(_, span)| span.seg == Some(code_seg))
        .filter_map(|(&id, span)| {
            let address = db.span_address(span)?;
            let size = u32::try_from(span.size).unwrap_or(0);
            Some((
                id,
                ScopeSpan {
                    address,
                    size,
                    scopes: Vec::new(),
                },
            ))
        })
        .collect();
    code_spans.sort_by_key(|(_, span)| span.address);
    let span_index: HashMap<i64, usize> = code_spans.iter().enumerate().map(|(i, (id, _))| (*id, i)).collect();

    for (scope_id, scope) in &db.scopes {
        for span_id in &scope.spans {
            if let Some(&i) = span_index.get(span_id) {
                code_spans[i].1.scopes.push(scope_index[scope_id]);
            }
        }
    }

    let mut infos = Vec::new();
    for line in db.lines.values() {
        let Some(file) = line.file.and_then(|f| db.files.get(&f)) else {
            continue;
        };
        if !project.is_source(&file.name) {
            continue;
        }
        let source = project
            .resolve_file(&file.name)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.name.clone());

        for span_id in &line.spans {
            let Some(&index) = span_index.get(span_id) else {
                continue;
            };
            let span = &code_spans[index].1;
            let mut info = DebugAddressInfo::new(
                span.address,
                Some(span_end(span.address, span.size as i64)),
                Some(&source),
                line.line,
            );
            info.line_type = line.line_type;
            info.size = Some(span.size);
            info.span = Some(index);
            infos.push(info);
        }
    }
    infos.sort_by_key(|info| (info.address, DebugLineType::sort_rank(info.line_type)));

    let mut stack_symbol = DebugSymbol::new("Stack Pointer", zeropage_start, true)
        .with_sizes(2, 2)
        .with_type(DebugDataType::UInt16);
    stack_symbol.type_name = Some("uint16".to_string());
    store.add_symbol(stack_symbol);

    for sym in db.syms.values() {
        if sym.scope == Some(0) && data_seg.is_some() && sym.seg == data_seg && sym.sym_type.as_deref() == Some("lab") {
            if let Some(val) = sym.val {
                store.add_symbol(DebugSymbol::new(sym.name.clone(), val, true));
            }
        }
    }

    // functions: csyms bound to a CODE label, spanning their scope
    let mut functions: HashMap<i64, DebugAddressInfo> = HashMap::new();
    for csym in db.csyms.values() {
        let (Some(scope_id), Some(sym_id)) = (csym.scope, csym.sym) else {
            continue;
        };
        let Some(scope) = db.scopes.get(&scope_id) else {
            continue;
        };
        if db.syms.get(&sym_id).map(|s| s.seg) != Some(Some(code_seg)) {
            continue;
        }
        let ranges: Vec<(u32, u32)> = scope
            .spans
            .iter()
            .filter_map(|id| db.spans.get(id))
            .filter_map(|span| db.span_address(span).map(|a| (a, span_end(a, span.size))))
            .collect();
        let (Some(address), Some(address_end)) = (
            ranges.iter().map(|r| r.0).min(),
            ranges.iter().map(|r| r.1).max(),
        ) else {
            continue;
        };

        let first_line = infos.iter().find(|info| info.address == address);
        let function = DebugAddressInfo::new(
            address,
            Some(address_end),
            first_line.and_then(|info| info.source.as_deref()),
            first_line.map_or(0, |info| info.line),
        )
        .with_name(csym.name.clone());
        functions.insert(scope_id, function);
    }

    // locals: csyms without a label, relative to the C stack pointer
    let mut scopes: Vec<ScopeInfo> = db
        .scopes
        .values()
        .map(|s| ScopeInfo {
            name: s.name.clone(),
            csyms: Vec::new(),
        })
        .collect();
    for csym in db.csyms.values() {
        let Some(scope_id) = csym.scope else {
            continue;
        };
        let Some(&index) = scope_index.get(&scope_id) else {
            continue;
        };
        scopes[index].csyms.push(CSymInfo {
            name: csym.name.clone(),
            storage_class: csym.storage_class.clone(),
            type_id: csym.type_id,
            offset: csym.offset,
        });

        if csym.sym.is_some() {
            continue;
        }
        if let Some(function) = functions.get_mut(&scope_id) {
            let mut symbol = DebugSymbol::new(csym.name.clone(), csym.offset, true);
            symbol.set_stack_pointer_address(stack_pointer);
            function.add_debug_symbol(symbol);

            let deepest = function
                .debug_symbols
                .iter()
                .map(|s| -s.value)
                .max()
                .unwrap_or(0);
            for symbol in &mut function.debug_symbols {
                symbol.stack_pointer_offset = symbol.stack_pointer_offset.max(deepest);
            }
        }
    }

    if infos.is_empty() {
        warn!("no source lines of the project found in {}", filename.display());
    }
    for info in infos {
        store.add_address_range(info);
    }

    let mut functions: Vec<DebugAddressInfo> = functions.into_values().collect();
    functions.sort_by_key(|f| f.address);
    for function in functions {
        store.add_function(function);
    }

    store.set_scopes(code_spans.into_iter().map(|(_, span)| span).collect(), scopes);
    store.set_supports_scopes(true);
    store.set_has_c_stack(true);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug_info::project::ProjectContext;
    use std::fs;
    use std::path::PathBuf;

    const DATABASE: &str = "\
version\tmajor=2,minor=0
info\tcsym=3,file=2,lib=0,line=3,mod=1,scope=2,seg=3,span=3,sym=3,type=1
file\tid=0,name=\"main.c\",size=120,mtime=0x5F3E1234,mod=0
file\tid=1,name=\"crt0.s\",size=300,mtime=0x5F3E1234,mod=0
line\tid=0,file=0,line=5,type=1,span=0
line\tid=1,file=0,line=6,type=1,span=1
line\tid=2,file=1,line=12,span=2
seg\tid=0,name=\"CODE\",start=0x00C000,size=0x0100,addrsize=absolute,type=ro
seg\tid=1,name=\"DATA\",start=0x00D000,size=0x0010,addrsize=absolute,type=rw
seg\tid=2,name=\"ZEROPAGE\",start=0x000002,size=0x001A,addrsize=zeropage,type=rw
span\tid=0,seg=0,start=16,size=3
span\tid=1,seg=0,start=19,size=2
span\tid=2,seg=0,start=0,size=16
scope\tid=0,name=\"\",mod=0,size=21,span=0+1+2
scope\tid=1,name=\"_main\",mod=0,type=scope,size=5,parent=0,span=0+1
sym\tid=0,name=\"_main\",addrsize=absolute,scope=0,def=5,val=0xC010,seg=0,type=lab
sym\tid=1,name=\"_counter\",addrsize=absolute,scope=0,def=9,val=0xD000,seg=1,type=lab
sym\tid=2,name=\"_local\",addrsize=absolute,scope=1,def=9,val=0xD004,seg=1,type=lab
csym\tid=0,name=\"main\",scope=1,type=0,sc=ext,sym=0
csym\tid=1,name=\"i\",scope=1,type=0,offs=-2,sc=auto
csym\tid=2,name=\"j\",scope=1,type=0,offs=-4,sc=auto
";

    fn load_database() -> (DebugInfo, PathBuf, tempfile::TempDir) {
        load_text(DATABASE)
    }

    fn load_text(database: &str) -> (DebugInfo, PathBuf, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.c"), "").unwrap();
        fs::write(dir.path().join("crt0.s"), "").unwrap();
        let path = dir.path().join("prog.dbg");
        fs::write(&path, database).unwrap();

        let mut project = ProjectContext::new(dir.path());
        project.sources.push(PathBuf::from("main.c"));

        let mut store = DebugInfo::new();
        load(&mut store, &project, &path).unwrap();
        let main = dir.path().join("main.c");
        (store, main, dir)
    }

    #[test]
    fn test_decode_value() {
        assert_eq!(decode_value("name", "\"CODE\""), Some(Value::Str("CODE".into())));
        assert_eq!(decode_value("start", "0x00C000"), Some(Value::Int(0xc000)));
        assert_eq!(decode_value("span", "0+1+2"), Some(Value::List(vec![0, 1, 2])));
        assert_eq!(decode_value("offs", "-2"), Some(Value::Int(-2)));
        assert_eq!(decode_value("type", "lab"), Some(Value::Str("lab".into())));
        assert_eq!(decode_value("name", ""), None);
    }

    #[test]
    fn test_span_address_is_segment_relative() {
        let (store, main, _dir) = load_database();
        let info = store.get_address_info(0xc010).unwrap();
        assert_eq!(info.line, 5);
        assert_eq!(info.address_end, 0xc012);
        assert!(info.is_high_level());
        assert_eq!(info.size, Some(3));

        let list = store.line_list(&main.to_string_lossy()).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(store.find_next_line(0xc010).unwrap().line, 6);
    }

    #[test]
    fn test_oversized_spans_are_dropped() {
        let database = DATABASE.replace(
            "span\tid=1,seg=0,start=19,size=2",
            "span\tid=1,seg=0,start=19,size=0x1000000",
        );
        let (store, main, _dir) = load_text(&database);

        assert!(store.get_address_info(0xc013).is_none());
        assert!(store.get_address_info(0xffff).is_none());
        assert_eq!(store.get_address_info(0xc010).unwrap().line, 5);
        assert_eq!(store.line_list(&main.to_string_lossy()).unwrap().len(), 1);
    }

    #[test]
    fn test_non_project_files_are_skipped() {
        let (store, _main, _dir) = load_database();
        assert!(store.get_address_info(0xc000).is_none());
    }

    #[test]
    fn test_symbols_and_functions() {
        let (store, _main, _dir) = load_database();

        let sp = store.get_symbol("Stack Pointer").unwrap();
        assert_eq!(sp.value, 0x02);
        assert_eq!(sp.data_type, Some(DebugDataType::UInt16));
        assert_eq!(store.get_symbol("_counter").unwrap().value, 0xd000);
        assert!(store.get_symbol("_local").is_none());

        let main = store.get_function_by_addr(0xc013).unwrap();
        assert_eq!(main.name.as_deref(), Some("main"));
        assert_eq!((main.address, main.address_end), (0xc010, 0xc014));
        assert_eq!(main.line, 5);
        assert_eq!(main.debug_symbols.len(), 2);
        for local in &main.debug_symbols {
            assert_eq!(local.stack_pointer_address, Some(0x02));
            assert_eq!(local.stack_pointer_offset, 4);
        }
        assert!(store.has_c_stack());
    }

    #[test]
    fn test_scopes() {
        let (store, _main, _dir) = load_database();
        assert!(store.supports_scopes());
        assert_eq!(store.get_scope_name(0xc011), Some("main"));
        assert_eq!(store.get_scoped_symbol(0xc011, "j").unwrap().value, -4);
    }
}
