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

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use super::project::Project;
use super::{acme, basic, cc65, elf, kick, oscar64, DebugInfo};
use crate::error::LoadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolchainKind {
    Acme,
    Cc65,
    KickAssembler,
    Oscar64,
    Basic,
    Elf,
}

pub type LoadFn = fn(&mut DebugInfo, &dyn Project, &Path) -> Result<(), LoadError>;

const LOADERS: &[(ToolchainKind, LoadFn)] = &[
    (ToolchainKind::Acme, acme::load),
    (ToolchainKind::Cc65, cc65::load),
    (ToolchainKind::KickAssembler, kick::load),
    (ToolchainKind::Oscar64, oscar64::load),
    (ToolchainKind::Basic, basic::load),
    (ToolchainKind::Elf, elf::load),
];

impl ToolchainKind {
    pub fn loader(self) -> Option<LoadFn> {
        LOADERS
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|&(_, load)| load)
    }

    /// Picks the toolchain from the debug file extension. `.dbg` is shared by
    /// KickAssembler and cc65, `kick` selects between them. BASIC line maps
    /// have no extension of their own.
    pub fn from_path(path: &Path, kick: bool) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
        match ext.as_str() {
            "report" => Some(ToolchainKind::Acme),
            "elf" => Some(ToolchainKind::Elf),
            "dbj" => Some(ToolchainKind::Oscar64),
            "dbg" if kick => Some(ToolchainKind::KickAssembler),
            "dbg" => Some(ToolchainKind::Cc65),
            _ => None,
        }
    }
}

impl fmt::Display for ToolchainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ToolchainKind::Acme => "acme",
            ToolchainKind::Cc65 => "cc65",
            ToolchainKind::KickAssembler => "kick",
            ToolchainKind::Oscar64 => "oscar64",
            ToolchainKind::Basic => "basic",
            ToolchainKind::Elf => "elf",
        };
        f.write_str(name)
    }
}

impl FromStr for ToolchainKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "acme" => Ok(ToolchainKind::Acme),
            "cc65" | "ca65" => Ok(ToolchainKind::Cc65),
            "kick" | "kickassembler" => Ok(ToolchainKind::KickAssembler),
            "oscar64" => Ok(ToolchainKind::Oscar64),
            "basic" => Ok(ToolchainKind::Basic),
            "elf" | "llvm-mos" => Ok(ToolchainKind::Elf),
            other => Err(format!("unknown toolchain '{}'", other)),
        }
    }
}
