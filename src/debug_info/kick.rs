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

//! KickAssembler debug files (`-debugdump`) and assembler info files
//! (`-asminfo`).

use std::collections::HashMap;
use std::path::Path;

use log::debug;
use roxmltree::{Document, Node};
use serde::Serialize;

use super::project::Project;
use super::{read_text, DebugInfo};
use crate::error::LoadError;
use crate::symbols::{DebugAddressInfo, DebugLabel, DebugSymbol};
use crate::utils::normalize_path;

const KIND: &str = "debug database";
const INFO_KIND: &str = "assembler info";

/// Sources bundled inside the assembler jar; these are never on disk.
const JAR_PREFIX: &str = "kickass.jar:";

/// Column positions of one comma separated mini table, taken from the
/// element's `values` attribute (`values="START,END,FILE_IDX,..."`).
struct Columns(HashMap<String, usize>);

impl Columns {
    fn of(node: Node) -> Self {
        let map = node
            .attribute("values")
            .map(|values| {
                values
                    .split(',')
                    .enumerate()
                    .map(|(i, name)| (name.trim().to_ascii_uppercase(), i))
                    .collect()
            })
            .unwrap_or_default();
        Columns(map)
    }

    fn get<'r>(&self, row: &[&'r str], name: &str, default: usize) -> Option<&'r str> {
        let index = self.0.get(name).copied().unwrap_or(default);
        row.get(index).map(|s| s.trim())
    }
}

fn rows(text: Option<&str>) -> impl Iterator<Item = Vec<&str>> {
    text.unwrap_or_default()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| l.split(',').collect())
}

/// Library sources live inside the assembler's jar and have no file on disk.
fn is_jar_source(path: &str) -> bool {
    path.to_ascii_lowercase().starts_with(JAR_PREFIX)
}

fn parse_hex(s: &str) -> Option<u32> {
    let s = s.trim();
    let digits = s.strip_prefix('$').unwrap_or(s);
    u32::from_str_radix(digits, 16).ok()
}

#[derive(Debug, Clone, PartialEq)]
struct Block {
    start: u32,
    end: u32,
    file_index: i64,
    line: u32,
}

#[derive(Debug, Clone, PartialEq)]
struct Label {
    segment: String,
    address: u32,
    name: String,
    file_index: Option<i64>,
    line: u32,
}

#[derive(Debug, Default)]
struct KickDebugFile {
    sources: HashMap<i64, String>,
    blocks: Vec<Block>,
    labels: Vec<Label>,
}

impl KickDebugFile {
    fn parse(text: &str) -> Result<Self, String> {
        let doc = Document::parse(text).map_err(|e| e.to_string())?;
        let root = doc.root_element();
        if !root.has_tag_name("C64debugger") {
            return Err(format!("unexpected root element <{}>", root.tag_name().name()));
        }

        let mut file = KickDebugFile::default();

        for node in root.children().filter(|n| n.has_tag_name("Sources")) {
            let columns = Columns::of(node);
            for row in rows(node.text()) {
                let (Some(index), Some(path)) = (columns.get(&row, "INDEX", 0), columns.get(&row, "FILE", 1))
                else {
                    continue;
                };
                let Ok(index) = index.parse::<i64>() else {
                    debug!("ignoring source entry '{}'", row.join(","));
                    continue;
                };
                let path = if is_jar_source(path) {
                    path.to_string()
                } else {
                    normalize_path(path)
                };
                file.sources.insert(index, path);
            }
        }

        for segment in root.children().filter(|n| n.has_tag_name("Segment")) {
            let columns = Columns::of(segment);
            for block in segment.children().filter(|n| n.has_tag_name("Block")) {
                for row in rows(block.text()) {
                    if row.len() < 7 {
                        debug!("ignoring block entry '{}'", row.join(","));
                        continue;
                    }
                    let start = columns.get(&row, "START", 0).and_then(parse_hex);
                    let end = columns.get(&row, "END", 1).and_then(parse_hex);
                    let file_index = columns.get(&row, "FILE_IDX", 2).and_then(|s| s.parse::<i64>().ok());
                    let line = columns.get(&row, "LINE1", 3).and_then(|s| s.parse::<u32>().ok());
                    let (Some(start), Some(end), Some(file_index), Some(line)) = (start, end, file_index, line)
                    else {
                        debug!("ignoring block entry '{}'", row.join(","));
                        continue;
                    };
                    file.blocks.push(Block {
                        start,
                        end,
                        file_index,
                        line,
                    });
                }
            }
        }

        for node in root.children().filter(|n| n.has_tag_name("Labels")) {
            let columns = Columns::of(node);
            let has_location = columns.0.contains_key("FILE_IDX");
            for row in rows(node.text()) {
                if row.len() < 3 {
                    continue;
                }
                let Some(address) = columns.get(&row, "ADDRESS", 1).and_then(parse_hex) else {
                    debug!("ignoring label entry '{}'", row.join(","));
                    continue;
                };
                let (file_index, line) = if has_location {
                    (
                        columns.get(&row, "FILE_IDX", 0).and_then(|s| s.parse::<i64>().ok()),
                        columns.get(&row, "LINE1", 0).and_then(|s| s.parse::<u32>().ok()).unwrap_or(0),
                    )
                } else {
                    (None, 0)
                };
                file.labels.push(Label {
                    segment: columns.get(&row, "SEGMENT", 0).unwrap_or_default().to_ascii_lowercase(),
                    address,
                    name: columns.get(&row, "NAME", 2).unwrap_or_default().to_string(),
                    file_index,
                    line,
                });
            }
        }

        Ok(file)
    }
}

pub fn load(store: &mut DebugInfo, _project: &dyn Project, filename: &Path) -> Result<(), LoadError> {
    let text = read_text(KIND, filename)?;
    let dbg = KickDebugFile::parse(&text).map_err(|e| LoadError::format(KIND, filename, e))?;

    for source in dbg.sources.values().filter(|s| !is_jar_source(s)) {
        let key = store.get_ref_name(source);
        store.get_or_create_line_list(&key);
    }

    for block in &dbg.blocks {
        let source = dbg.sources.get(&block.file_index).map(String::as_str);
        let info = match source {
            Some(jar) if is_jar_source(jar) => {
                // kept verbatim and out of the line lists
                let mut info = DebugAddressInfo::new(block.start, Some(block.end), None, block.line);
                info.source = Some(jar.to_string());
                info
            }
            _ => DebugAddressInfo::new(block.start, Some(block.end), source, block.line),
        };
        store.add_address_range(info);
    }

    for label in &dbg.labels {
        if label.name.is_empty() {
            continue;
        }
        store.add_symbol(DebugSymbol::new(label.name.clone(), label.address as i64, true));

        let source = label.file_index.and_then(|i| dbg.sources.get(&i)).map(String::as_str);
        let debug_label = match source {
            Some(jar) if is_jar_source(jar) => DebugLabel {
                source: Some(jar.to_string()),
                ..DebugLabel::new(label.name.clone(), label.address, None, label.line)
            },
            _ => DebugLabel::new(label.name.clone(), label.address, source, label.line),
        };
        if let Some(global) = store.get_address_info(label.address).and_then(|i| i.global_ref) {
            store.attach_label(global, debug_label.clone());
        }
        store.add_label(debug_label);
        debug!("label {} in segment '{}'", label.name, label.segment);
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KickSection {
    Libraries,
    Directives,
    PpDirectives,
    Errors,
    Syntax,
    Files,
    Version,
}

impl KickSection {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "libraries" => Some(KickSection::Libraries),
            "directives" => Some(KickSection::Directives),
            "ppdirectives" => Some(KickSection::PpDirectives),
            "errors" => Some(KickSection::Errors),
            "syntax" => Some(KickSection::Syntax),
            "files" => Some(KickSection::Files),
            "version" => Some(KickSection::Version),
            _ => None,
        }
    }
}

/// `startLine,startPosition,endLine,endPosition,fileIndex`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KickRange {
    pub start_line: u32,
    pub start_position: u32,
    pub end_line: u32,
    pub end_position: u32,
    pub file_index: i64,
}

impl KickRange {
    fn parse(spec: &str) -> Option<Self> {
        let fields: Vec<&str> = spec.split(',').map(str::trim).collect();
        if fields.len() < 5 {
            return None;
        }
        Some(KickRange {
            start_line: fields[0].parse().ok()?,
            start_position: fields[1].parse().ok()?,
            end_line: fields[2].parse().ok()?,
            end_position: fields[3].parse().ok()?,
            file_index: fields[4].parse().ok()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KickError {
    pub level: String,
    pub range: Option<KickRange>,
    pub message: String,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KickSyntax {
    pub operator: String,
    pub range: Option<KickRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KickFile {
    pub index: i64,
    pub path: String,
}

/// Diagnostics from a KickAssembler `-asminfo` file.
///
/// ```text
/// [files]
/// 0;KickAss.jar:/include/autoinclude.asm
/// 1;/home/user/project/main.asm
/// [errors]
/// Error;15,5,15,10,1;Invalid directive
/// ```
#[derive(Debug, Default)]
pub struct KickAssemblerInfo {
    sections: Vec<KickSection>,
    files: Vec<KickFile>,
    errors: Vec<KickError>,
    syntax: Vec<KickSyntax>,
}

impl KickAssemblerInfo {
    pub fn read(filename: &Path) -> Result<Self, LoadError> {
        let text = read_text(INFO_KIND, filename)?;
        Ok(Self::parse(&text))
    }

    pub fn parse(text: &str) -> Self {
        let mut info = KickAssemblerInfo::default();
        let mut current: Option<KickSection> = None;

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Some(name) = line.strip_prefix('[') {
                let name = name.strip_suffix(']').unwrap_or(name);
                current = KickSection::from_name(name);
                match current {
                    Some(section) => info.sections.push(section),
                    None => debug!("unknown assembler info section [{}]", name),
                }
                continue;
            }

            match current {
                Some(KickSection::Files) => info.parse_file(line),
                Some(KickSection::Syntax) => info.parse_syntax(line),
                Some(KickSection::Errors) => info.parse_error(line),
                _ => {}
            }
        }

        for error in &mut info.errors {
            error.filename = error
                .range
                .and_then(|r| info.files.iter().find(|f| f.index == r.file_index))
                .map(|f| f.path.clone());
        }

        info
    }

    fn parse_file(&mut self, line: &str) {
        let Some((index, path)) = line.split_once(';') else {
            return;
        };
        let Ok(index) = index.trim().parse::<i64>() else {
            return;
        };
        if index < 0 {
            return;
        }
        self.files.push(KickFile {
            index,
            path: path.to_string(),
        });
    }

    fn parse_syntax(&mut self, line: &str) {
        let Some((operator, range)) = line.split_once(';') else {
            return;
        };
        self.syntax.push(KickSyntax {
            operator: operator.to_string(),
            range: KickRange::parse(range),
        });
    }

    fn parse_error(&mut self, line: &str) {
        let mut parts = line.splitn(3, ';');
        let (Some(level), Some(range), Some(message)) = (parts.next(), parts.next(), parts.next()) else {
            return;
        };
        self.errors.push(KickError {
            level: level.trim().to_string(),
            range: KickRange::parse(range.trim()),
            message: message.trim().to_string(),
            filename: None,
        });
    }

    pub fn has_section(&self, section: KickSection) -> bool {
        self.sections.contains(&section)
    }

    pub fn errors(&self) -> &[KickError] {
        &self.errors
    }

    pub fn syntax(&self) -> &[KickSyntax] {
        &self.syntax
    }

    pub fn files(&self) -> &[KickFile] {
        &self.files
    }
}
