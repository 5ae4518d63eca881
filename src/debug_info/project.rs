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

use std::path::{Path, PathBuf};

use crate::utils::{absolute_path, normalize_path};

/// What the loaders need to know about the project that produced a debug file.
pub trait Project {
    /// Finds `filename` on disk, trying the project directory and then each
    /// include directory.
    fn resolve_file(&self, filename: &str) -> Option<PathBuf>;

    /// True if `filename` is one of the project's own sources.
    fn is_source(&self, filename: &str) -> bool;

    /// Assembler sources in build order.
    fn asm_source_files(&self) -> Vec<PathBuf>;
}

#[derive(Debug, Clone, Default)]
pub struct ProjectContext {
    pub basedir: Option<PathBuf>,
    pub includes: Vec<PathBuf>,
    pub sources: Vec<PathBuf>,
    pub asm_sources: Vec<PathBuf>,
}

impl ProjectContext {
    pub fn new(basedir: impl Into<PathBuf>) -> Self {
        Self {
            basedir: Some(basedir.into()),
            ..Default::default()
        }
    }

    fn base(&self) -> PathBuf {
        match &self.basedir {
            Some(dir) => absolute_path(dir),
            None => absolute_path("."),
        }
    }
}

impl Project for ProjectContext {
    fn resolve_file(&self, filename: &str) -> Option<PathBuf> {
        let path = Path::new(filename);
        if path.is_absolute() {
            return path.exists().then(|| absolute_path(path));
        }

        let base = self.base();
        let direct = base.join(path);
        if direct.exists() {
            return Some(absolute_path(direct));
        }

        self.includes
            .iter()
            .map(|include| {
                if include.is_absolute() {
                    include.join(path)
                } else {
                    base.join(include).join(path)
                }
            })
            .find(|candidate| candidate.exists())
            .map(absolute_path)
    }

    fn is_source(&self, filename: &str) -> bool {
        if filename.is_empty() {
            return false;
        }
        let target = match self.resolve_file(filename) {
            Some(found) => normalize_path(found),
            None => normalize_path(self.base().join(filename)),
        };
        self.sources
            .iter()
            .any(|src| normalize_path(self.base().join(src)) == target)
    }

    fn asm_source_files(&self) -> Vec<PathBuf> {
        let base = self.base();
        self.asm_sources.iter().map(|src| absolute_path(base.join(src))).collect()
    }
}
