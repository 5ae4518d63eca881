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

//! Error types for binary decoding and debug-info loading.

use std::io;
use std::path::Path;
use thiserror::Error;

/// Failures raised while decoding ELF containers and DWARF sections.
///
/// All of these are fatal for the file being decoded. The one tolerated
/// anomaly, a truncated LEB128 value, never produces an error.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// A read needed more bytes than the buffer holds.
    #[error("index beyond end of data")]
    EndOfData,

    /// A seek targeted a position past the end of the buffer.
    #[error("index out of bounds")]
    OutOfBounds,

    /// The ELF identification bytes, class, or version are not supported.
    #[error("invalid ELF file: {0}")]
    InvalidElf(&'static str),

    /// DWARF unit or line program with a version other than 5.
    #[error("unsupported DWARF version {0}")]
    UnsupportedVersion(u16),

    /// An attribute form code outside the known DWARF 5 set.
    #[error("unhandled form code 0x{0:02x}")]
    UnhandledForm(u16),

    /// An indirect string index was found but no string offset table is available.
    #[error("unresolved offset")]
    UnresolvedOffset,

    /// An indirect reference needs a lookup table that is missing, or the
    /// table has no entry for the index.
    #[error("unresolved reference")]
    UnresolvedReference,

    /// A `.debug_info` entry uses an abbreviation code that is not declared.
    #[error("missing abbreviation code {code} at offset 0x{offset:x}")]
    MissingAbbreviation { code: u64, offset: u64 },

    /// An extended line opcode declared a size that does not fit its payload.
    #[error("unexpected instruction size")]
    InstructionSize,
}

/// Failures raised while loading a toolchain debug file into the store.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("{kind} file {path} does not exist")]
    NotFound { kind: &'static str, path: String },

    #[error("unable to read {kind} file '{path}'")]
    Unreadable {
        kind: &'static str,
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("unable to read {kind} file '{path}': {reason}")]
    Format {
        kind: &'static str,
        path: String,
        reason: String,
    },
}

impl LoadError {
    /// Classify an I/O error the way every loader reports it: "not found"
    /// gets its own message, everything else is "unable to read".
    pub fn from_io(kind: &'static str, path: &Path, err: io::Error) -> Self {
        let path = path.display().to_string();
        if err.kind() == io::ErrorKind::NotFound {
            LoadError::NotFound { kind, path }
        } else {
            LoadError::Unreadable {
                kind,
                path,
                source: err,
            }
        }
    }

    pub fn format(kind: &'static str, path: &Path, reason: impl ToString) -> Self {
        LoadError::Format {
            kind,
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}
