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

//! Loads a toolchain debug file and prints what it contains as JSON.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::info;
use serde_json::{json, Value};

use c64_debug_helper::debug::init_logging;
use c64_debug_helper::utils::parse_int;
use c64_debug_helper::{DebugInfo, KickAssemblerInfo, ProjectContext, ToolchainKind};

#[derive(Parser, Debug)]
#[command(
    name = "c64-debug-helper",
    version,
    about = "Inspect 6502/C64 debug information from ACME, cc65, KickAssembler, Oscar64, BASIC and ELF builds"
)]
struct Args {
    /// Debug file to load (.report, .dbg, .dbj, .elf or a BASIC line map)
    #[arg(value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    file: PathBuf,

    /// Toolchain that produced FILE; guessed from the extension when omitted
    #[arg(short = 't', long = "toolchain")]
    toolchain: Option<ToolchainKind>,

    /// Include directory used to resolve sources (repeatable)
    #[arg(short = 'I', long = "include")]
    include: Vec<PathBuf>,

    /// Project source file (repeatable)
    #[arg(short = 's', long = "source")]
    source: Vec<PathBuf>,

    /// Assembler source in build order, for ACME reports (repeatable)
    #[arg(long = "asm-source")]
    asm_source: Vec<PathBuf>,

    /// Project base directory
    #[arg(short = 'b', long = "basedir")]
    basedir: Option<PathBuf>,

    /// Address to look up, decimal, $hex or 0xhex (repeatable)
    #[arg(short = 'a', long = "address", value_parser = parse_address)]
    address: Vec<u32>,

    /// KickAssembler assembler info file to print diagnostics from
    #[arg(long = "kick-info")]
    kick_info: Option<PathBuf>,

    /// Enable debug output
    #[arg(short = 'd', long = "debug", default_value_t = false)]
    debug: bool,
}

fn parse_address(text: &str) -> Result<u32, String> {
    parse_int(text)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| format!("invalid address '{}'", text))
}

fn lookup(store: &DebugInfo, addr: u32) -> Value {
    json!({
        "address": format!("${:04x}", addr),
        "line": store.get_address_info(addr),
        "label": store.find_label(addr),
        "function": store.get_function_by_addr(addr).and_then(|f| f.name.clone()),
        "scope": store.get_scope_name(addr),
    })
}

fn summary(store: &DebugInfo, kind: ToolchainKind) -> Value {
    let mut labels: Vec<_> = store.labels().collect();
    labels.sort_by_key(|l| l.address);

    json!({
        "file": store.filename(),
        "toolchain": kind.to_string(),
        "addresses": store.addresses().len(),
        "symbols": store.symbols(),
        "labels": labels,
        "functions": store.functions(),
        "memory": store.memblocks().iter().map(|m| m.to_json()).collect::<Vec<_>>(),
        "supportsScopes": store.supports_scopes(),
        "hasCStack": store.has_c_stack(),
    })
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _logger = init_logging(args.debug).context("failed to start logger")?;

    if let Some(path) = &args.kick_info {
        let kick_info = KickAssemblerInfo::read(path)?;
        let report = json!({
            "files": kick_info.files(),
            "errors": kick_info.errors(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    let kind = match args.toolchain {
        Some(kind) => kind,
        None => ToolchainKind::from_path(&args.file, args.kick_info.is_some())
            .ok_or_else(|| anyhow!("cannot tell the toolchain of {}, use --toolchain", args.file.display()))?,
    };

    let mut project = match &args.basedir {
        Some(dir) => ProjectContext::new(dir),
        None => ProjectContext::default(),
    };
    project.includes = args.include;
    project.sources = args.source;
    project.asm_sources = args.asm_source;

    info!("loading {} as {}", args.file.display(), kind);
    let store = DebugInfo::load(kind, &project, &args.file)?;

    let output = if args.address.is_empty() {
        summary(&store, kind)
    } else {
        Value::Array(args.address.iter().map(|&addr| lookup(&store, addr)).collect())
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
