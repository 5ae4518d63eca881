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

//! ACME report files (`acme -r`).
//!
//! Each report line runs through three steps: [`AcmeReportParser::scan`]
//! splits it into tokens, [`AcmeReportParser::lex`] types the tokens by
//! position, and [`AcmeReportParser::parse_line`] matches the element
//! sequence against the known line shapes.

use std::path::{Path, PathBuf};

use log::{debug, warn};

use super::project::Project;
use super::{read_text, DebugInfo};
use crate::error::LoadError;
use crate::symbols::{is_opcode, DebugAddressInfo, DebugLabel, DebugSymbol};
use crate::utils::{normalize_path, resolve_path};

/// Written by ACME in front of the first line of each new source file.
const NEW_FILE_MARKER: char = '\u{FFFD}';

#[derive(Debug, Clone, PartialEq)]
enum Element {
    Asterisk,
    Equals,
    Comma,
    ScopeBegin,
    ScopeEnd,
    Macro,
    KeywordAddr,
    KeywordSet,
    DataSize(u32),
    Number(i64),
    Address(i64),
    Data(String),
    Symbol(String),
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Statement {
    Source(String),
    Label {
        name: String,
        line: u32,
    },
    Symbol {
        name: String,
        value: i64,
        is_address: bool,
        data_size: u32,
        line: u32,
    },
    Address {
        value: i64,
        line: u32,
        symbol: Option<String>,
        data_size: u32,
        byte_count: u32,
    },
    ScopeEnd,
    MacroBegin,
}

#[derive(Debug, Default)]
struct ScanResult {
    tokens: Vec<String>,
    source: Option<String>,
    comment: Option<String>,
}

struct AcmeReportParser<'p> {
    project: &'p dyn Project,
    sources: Vec<PathBuf>,
    source_index: usize,
}

impl<'p> AcmeReportParser<'p> {
    fn new(project: &'p dyn Project) -> Self {
        Self {
            project,
            sources: project.asm_source_files(),
            source_index: 0,
        }
    }

    fn scan(&mut self, line: &str) -> ScanResult {
        let chars: Vec<char> = line.chars().collect();
        let mut result = ScanResult::default();
        let is_space = |c: char| " \t\r\n".contains(c);
        let is_delimiter = |c: char| " \t\r\n,=;:".contains(c);

        let mut i = 0;
        while i < chars.len() {
            while i < chars.len() && is_space(chars[i]) {
                i += 1;
            }
            if i >= chars.len() {
                break;
            }

            let c = chars[i];
            if c == ';' {
                let rest: String = chars[i + 1..].iter().collect();
                match rest.find("Source:") {
                    Some(pos) => {
                        let name = rest[pos + "Source:".len()..].trim();
                        if !name.is_empty() {
                            result.source = Some(name.to_string());
                        }
                    }
                    None => result.comment = Some(rest),
                }
                break;
            }

            if c == NEW_FILE_MARKER {
                i += 1;
                if self.source_index + 1 < self.sources.len() {
                    self.source_index += 1;
                    result.source = Some(resolve_path(&self.sources[self.source_index]));
                }
            } else if c == '=' || c == ',' {
                result.tokens.push(c.to_string());
                i += 1;
            } else if c == ':' {
                i += 1;
            } else {
                let start = i;
                while i < chars.len() && !is_delimiter(chars[i]) {
                    i += 1;
                }

                // long data columns are cut with "..." right before the label:
                //    22  081b c4554d4220455841....string  !pet "Dumb example", 13, 0
                if result.tokens.len() == 2 {
                    if let Some(dots) = find_dots(&chars[start..i]) {
                        i = start + dots + 3;
                    }
                }

                let token: String = chars[start..i].iter().collect();
                // a lone "..." only marks truncated data
                if !token.is_empty() && !token.chars().all(|c| c == '.') {
                    result.tokens.push(token);
                }
            }
        }

        result
    }

    fn lex(&self, tokens: &[String]) -> Vec<Element> {
        let mut elements = Vec::new();
        let mut is_code_line = false;

        for (index, token) in tokens.iter().enumerate() {
            let position = index + 1;
            let element = match token.as_str() {
                "*" => Element::Asterisk,
                "=" => Element::Equals,
                "," => Element::Comma,
                "{" => Element::ScopeBegin,
                "}" => Element::ScopeEnd,
                "!macro" => Element::Macro,
                "!addr" => Element::KeywordAddr,
                "!set" => Element::KeywordSet,
                "!pet" | "!byte" | "!08" => Element::DataSize(1),
                "!word" | "!16" => Element::DataSize(2),
                "!24" => Element::DataSize(3),
                "!32" => Element::DataSize(4),
                _ => {
                    let num = parse_number(token, false);
                    if position == 1 {
                        match num {
                            Some(value) => Element::Number(value),
                            None => break, // comment or junk line
                        }
                    } else if position == 2
                        && num.is_some()
                        && position < tokens.len()
                        && tokens[position] != "="
                    {
                        // a token of only hex letters ("cafe") followed by "=" stays unknown
                        is_code_line = true;
                        match parse_number(token, true) {
                            Some(value) => Element::Address(value),
                            None => Element::Unknown(token.clone()),
                        }
                    } else if position == 3 && is_code_line {
                        Element::Data(token.clone())
                    } else if position == 4 && is_code_line && is_valid_symbol(token) {
                        Element::Symbol(token.clone())
                    } else {
                        Element::Unknown(token.clone())
                    }
                }
            };
            elements.push(element);
        }

        elements
    }

    fn parse_line(&mut self, line: &str) -> Vec<Statement> {
        let scanned = self.scan(line);
        let elements = self.lex(&scanned.tokens);
        let mut statements = Vec::new();

        if let Some(source) = scanned.source {
            statements.push(Statement::Source(source));
        }

        let line_number = match elements.first() {
            Some(Element::Number(n)) => u32::try_from(*n).unwrap_or(0),
            _ => 0,
        };

        let statement = match elements.as_slice() {
            [_, Element::Unknown(name)] => Some(Statement::Label {
                name: name.clone(),
                line: line_number,
            }),
            [_, Element::Macro, _, .., Element::ScopeBegin] if elements.len() >= 4 => {
                Some(Statement::MacroBegin)
            }
            [_, Element::ScopeEnd, ..] => Some(Statement::ScopeEnd),
            [_, Element::Unknown(name), Element::Equals, Element::Unknown(value), ..] => {
                parse_number(value, false).map(|value| Statement::Symbol {
                    name: name.clone(),
                    value,
                    is_address: value >= 0x100,
                    data_size: 0,
                    line: line_number,
                })
            }
            [_, Element::KeywordAddr, Element::Unknown(name), Element::Equals, Element::Unknown(value), ..] => {
                parse_number(value, false).map(|value| Statement::Symbol {
                    name: name.clone(),
                    value,
                    is_address: true,
                    data_size: 0,
                    line: line_number,
                })
            }
            [_, Element::KeywordSet, Element::Unknown(name), Element::Equals, Element::Unknown(value), ..] => {
                parse_number(value, false).map(|value| Statement::Symbol {
                    name: name.clone(),
                    value,
                    is_address: false,
                    data_size: 1,
                    line: line_number,
                })
            }
            [_, Element::Unknown(value), ..] => {
                parse_number(value, true).map(|value| Statement::Address {
                    value,
                    line: line_number,
                    symbol: None,
                    data_size: 0,
                    byte_count: 1,
                })
            }
            [_, Element::Address(value), rest @ ..] => {
                let byte_count = match rest.first() {
                    Some(Element::Data(data)) => data_byte_count(data),
                    _ => 1,
                };
                let (symbol, data_size) = match (rest.get(1), rest.get(2)) {
                    (Some(Element::Symbol(name)), Some(Element::DataSize(size))) => {
                        (Some(name.clone()), *size)
                    }
                    (Some(Element::Symbol(name)), _) => (Some(name.clone()), 0),
                    _ => (None, 0),
                };
                Some(Statement::Address {
                    value: *value,
                    line: line_number,
                    symbol,
                    data_size,
                    byte_count,
                })
            }
            _ => None,
        };

        statements.extend(statement);
        statements
    }
}

fn find_dots(chars: &[char]) -> Option<usize> {
    chars.windows(3).position(|w| w == ['.', '.', '.']).filter(|&pos| pos > 0)
}

/// Number of bytes in a data column such as `a9008d` or `c4554d42...`.
fn data_byte_count(data: &str) -> u32 {
    let digits = data.trim_end_matches('.');
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return 1;
    }
    (digits.len() as u32 / 2).max(1)
}

fn is_valid_symbol(token: &str) -> bool {
    let Some(first) = token.chars().next() else {
        return false;
    };
    if first == '.' || first == '_' {
        return true;
    }
    let first = first.to_ascii_lowercase();
    if !first.is_ascii_lowercase() {
        return false;
    }
    !(token.len() == 3 && is_opcode(token))
}

/// Parses decimal, `$hex` or `0xhex` numbers. Any of the digits a-f switches
/// to hex, as does `hex`.
fn parse_number(s: &str, hex: bool) -> Option<i64> {
    if s.len() > 16 {
        return None;
    }

    let mut rest = s;
    let mut negative = false;
    if let Some(r) = rest.strip_prefix('-') {
        negative = true;
        rest = r;
    } else if let Some(r) = rest.strip_prefix('+') {
        rest = r;
    }

    let mut is_hex = hex;
    if let Some(r) = rest.strip_prefix('$') {
        is_hex = true;
        rest = r;
    } else if let Some(r) = rest.strip_prefix("0x") {
        is_hex = true;
        rest = r;
    }

    let mut value: i64 = 0;
    let mut hex_value: i64 = 0;
    for c in rest.chars() {
        let digit = match c {
            '0'..='9' => c as i64 - '0' as i64,
            'a'..='f' => {
                is_hex = true;
                10 + (c as i64 - 'a' as i64)
            }
            'A'..='F' => {
                is_hex = true;
                10 + (c as i64 - 'A' as i64)
            }
            _ => return None,
        };
        if !is_hex {
            value = value.checked_mul(10)?.checked_add(digit)?;
        }
        hex_value = hex_value.checked_mul(16)?.checked_add(digit)?;
    }

    let result = if is_hex { hex_value } else { value };
    Some(if negative { -result } else { result })
}

pub fn load(store: &mut DebugInfo, project: &dyn Project, filename: &Path) -> Result<(), LoadError> {
    let text = read_text("label", filename)?;

    let mut parser = AcmeReportParser::new(project);
    let mut pending_labels: Vec<(String, u32)> = Vec::new();
    let mut base_dir: Option<PathBuf> = None;
    let mut source: Option<String> = None;
    let mut inside_macro = false;

    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        for statement in parser.parse_line(line) {
            if inside_macro {
                if statement == Statement::ScopeEnd {
                    inside_macro = false;
                }
                continue;
            }

            match statement {
                Statement::MacroBegin => inside_macro = true,
                Statement::Source(name) => {
                    let path = Path::new(&name);
                    let resolved = if path.is_absolute() {
                        Some(resolve_path(path))
                    } else {
                        project
                            .resolve_file(&name)
                            .map(resolve_path)
                            .or_else(|| base_dir.as_ref().map(|dir| resolve_path(dir.join(path))))
                    };
                    let Some(resolved) = resolved else {
                        warn!("unable to resolve report source '{}'", name);
                        continue;
                    };
                    if base_dir.is_none() {
                        base_dir = Path::new(&resolved).parent().map(Path::to_path_buf);
                    }
                    store.get_or_create_line_list(&normalize_path(&resolved));
                    source = Some(resolved);
                }
                Statement::Label { name, line } => pending_labels.push((name, line)),
                Statement::Address {
                    value,
                    line,
                    symbol,
                    data_size,
                    byte_count,
                } => {
                    let Ok(address) = u32::try_from(value) else {
                        debug!("skipping negative address {} in line {}", value, line);
                        continue;
                    };
                    let end = address.saturating_add(byte_count.saturating_sub(1));
                    let info = DebugAddressInfo::new(address, Some(end), source.as_deref(), line);
                    let global = store.add_address_range(info);

                    if let Some(name) = symbol {
                        let symbol = DebugSymbol::new(name, value, true)
                            .with_source(source.as_deref(), line)
                            .with_sizes(data_size, data_size);
                        store.add_symbol(symbol.clone());
                        if let Some(global) = global {
                            store.attach_symbol(global, symbol);
                        }
                    }

                    for (name, label_line) in pending_labels.drain(..) {
                        let label = DebugLabel::new(name, address, source.as_deref(), label_line);
                        store.add_label(label.clone());
                        if let Some(global) = global {
                            store.attach_label(global, label);
                        }
                    }
                }
                Statement::Symbol {
                    name,
                    value,
                    is_address,
                    data_size,
                    line,
                } => {
                    let symbol = DebugSymbol::new(name, value, is_address)
                        .with_source(source.as_deref(), line)
                        .with_sizes(data_size, data_size);
                    store.add_symbol(symbol);
                }
                Statement::ScopeEnd => {}
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug_info::project::ProjectContext;
    use std::fs;

    fn load_str(report: &str, project: &ProjectContext) -> DebugInfo {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prog.report");
        fs::write(&path, report).unwrap();
        let mut store = DebugInfo::new();
        load(&mut store, project, &path).unwrap();
        store
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("123", false), Some(123));
        assert_eq!(parse_number("$ff", false), Some(255));
        assert_eq!(parse_number("0x10", false), Some(16));
        assert_eq!(parse_number("1f", false), Some(31));
        assert_eq!(parse_number("10", true), Some(16));
        assert_eq!(parse_number("-$10", false), Some(-16));
        assert_eq!(parse_number("loop", false), None);
        assert_eq!(parse_number("12345678901234567", false), None);
    }

    #[test]
    fn test_valid_symbols() {
        assert!(is_valid_symbol("loop"));
        assert!(is_valid_symbol(".local"));
        assert!(is_valid_symbol("_tmp"));
        assert!(!is_valid_symbol("lda"));
        assert!(!is_valid_symbol("9lives"));
    }

    #[test]
    fn test_scan_cuts_data_before_label() {
        let project = ProjectContext::default();
        let mut parser = AcmeReportParser::new(&project);
        let scanned = parser.scan("   22  081b c4554d4220455841...string  !pet \"Dumb\", 13, 0");
        assert_eq!(scanned.tokens[..4], ["22", "081b", "c4554d4220455841...", "string"]);

        let scanned = parser.scan("   13  081b ea ... symbol");
        assert_eq!(scanned.tokens, vec!["13", "081b", "ea", "symbol"]);

        let scanned = parser.scan("; just a comment");
        assert!(scanned.tokens.is_empty());
        assert_eq!(scanned.comment.as_deref(), Some(" just a comment"));
    }

    #[test]
    fn test_label_bound_to_next_address() {
        let project = ProjectContext::default();
        let store = load_str("12 label\n13 081b ea ... symbol\n14 081c ea\n", &project);

        assert_eq!(store.get_label("label").unwrap().address, 0x081b);
        let info = store.get_address_info(0x081b).unwrap();
        assert_eq!(info.line, 13);
        assert_eq!(info.debug_labels.len(), 1);
        assert_eq!(info.debug_labels[0].name, "label");
        assert!(store.get_address_info(0x081c).unwrap().debug_labels.is_empty());
        assert_eq!(store.get_symbol("symbol").unwrap().value, 0x081b);
    }

    #[test]
    fn test_symbol_assignments() {
        let project = ProjectContext::default();
        let report = "\
     5                          SCREEN = $0400
     6                          count = 3
     7                          !addr zp = $fb
     8                          !set flag = 1
";
        let store = load_str(report, &project);

        let screen = store.get_symbol("SCREEN").unwrap();
        assert_eq!(screen.value, 0x0400);
        assert!(screen.is_address);
        assert!(!store.get_symbol("count").unwrap().is_address);
        assert!(store.get_symbol("zp").unwrap().is_address);
        let flag = store.get_symbol("flag").unwrap();
        assert!(!flag.is_address);
        assert_eq!(flag.data_size, 1);
    }

    #[test]
    fn test_ranges_past_top_of_memory_are_dropped() {
        let project = ProjectContext::default();
        let report = "\
    12                          edge
    13  fffe a9000000           lda #0 : lda #0
    14  1ffff ea                nop
    15  0801 ea                 nop
";
        let store = load_str(report, &project);
        assert!(store.get_address_info(0xfffe).is_none());
        assert!(store.get_address_info(0xffff).is_none());
        assert_eq!(store.get_address_info(0x0801).unwrap().line, 15);
        // the label is still known, just not bound to a range
        assert_eq!(store.get_label("edge").unwrap().address, 0xfffe);
    }

    #[test]
    fn test_macro_bodies_are_skipped() {
        let project = ProjectContext::default();
        let report = "\
    10                          !macro inc16 .addr {
    11  c000 ee                     inc .addr
    12                          }
    13  0801 a900               lda #0
";
        let store = load_str(report, &project);
        assert!(store.get_address_info(0xc000).is_none());
        let info = store.get_address_info(0x0801).unwrap();
        assert_eq!((info.address, info.address_end), (0x0801, 0x0802));
        assert!(store.get_address_info(0x0802).is_some());
    }

    #[test]
    fn test_source_annotation_sets_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.asm"), "").unwrap();
        let project = ProjectContext::new(dir.path());

        let report = "\
; ******** Source: main.asm
     1  0801 a9 00              lda #0
";
        let store = load_str(report, &project);
        let info = store.get_address_info(0x0801).unwrap();
        assert_eq!(
            info.normalized_path.as_deref(),
            Some(normalize_path(dir.path().join("main.asm")).as_str())
        );
        let list = store
            .line_list(&dir.path().join("main.asm").to_string_lossy())
            .unwrap();
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_missing_and_unreadable_report() {
        let dir = tempfile::tempdir().unwrap();
        let project = ProjectContext::default();
        let mut store = DebugInfo::new();

        let err = load(&mut store, &project, &dir.path().join("none.report")).unwrap_err();
        assert!(err.to_string().contains("does not exist"), "{}", err);

        let err = load(&mut store, &project, dir.path()).unwrap_err();
        assert!(err.to_string().contains("unable to read"), "{}", err);
    }
}
