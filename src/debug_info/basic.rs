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

//! BASIC line maps written by the BASIC compiler.
//!
//! ```text
//! # comment
//! /home/user/prog.bas
//! 2049,2060,10,0,12
//! ```
//!
//! A non-numeric line names the current source. Numeric lines are
//! `start,end,basicLine,sourceLine,length` with a zero based source line.

use std::path::Path;

use log::debug;

use super::project::Project;
use super::{read_text, DebugInfo};
use crate::error::LoadError;
use crate::symbols::DebugAddressInfo;
use crate::utils::resolve_path;

const KIND: &str = "debug database";

#[derive(Debug, Clone, PartialEq)]
struct LineRecord {
    start: u32,
    end: u32,
    source_index: usize,
    source_line: u32,
}

#[derive(Debug, Default)]
struct LineMap {
    sources: Vec<String>,
    records: Vec<LineRecord>,
}

impl LineMap {
    fn parse(text: &str) -> Self {
        let mut map = LineMap::default();
        let mut current: Option<usize> = None;

        for raw in text.lines() {
            let line = raw.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }

            if !line.starts_with(|c: char| c.is_ascii_digit()) {
                let index = match map.sources.iter().position(|s| s == line) {
                    Some(index) => index,
                    None => {
                        map.sources.push(line.to_string());
                        map.sources.len() - 1
                    }
                };
                current = Some(index);
                continue;
            }

            let Some(source_index) = current else {
                continue;
            };
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != 5 {
                debug!("ignoring line map entry '{}'", line);
                continue;
            }
            let (Ok(start), Ok(end), Ok(source_line)) = (
                fields[0].parse::<u32>(),
                fields[1].parse::<u32>(),
                fields[3].parse::<u32>(),
            )
            else {
                debug!("ignoring line map entry '{}'", line);
                continue;
            };
            map.records.push(LineRecord {
                start,
                end,
                source_index,
                source_line,
            });
        }

        map
    }
}

pub fn load(store: &mut DebugInfo, project: &dyn Project, filename: &Path) -> Result<(), LoadError> {
    let text = read_text(KIND, filename)?;
    let map = LineMap::parse(&text);

    let base_dir = filename.parent().unwrap_or_else(|| Path::new("."));
    let sources: Vec<String> = map
        .sources
        .iter()
        .map(|name| match project.resolve_file(name) {
            Some(found) => resolve_path(found),
            None => resolve_path(base_dir.join(name)),
        })
        .collect();

    for source in &sources {
        let key = store.get_ref_name(source);
        store.get_or_create_line_list(&key);
    }

    for record in &map.records {
        let source = sources.get(record.source_index).map(String::as_str);
        let line = record.source_line.saturating_add(1);
        let info = DebugAddressInfo::new(record.start, Some(record.end), source, line);
        store.add_address_range(info);
    }

    Ok(())
}
