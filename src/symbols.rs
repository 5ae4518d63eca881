use std::cmp::Ordering;

use serde::Serialize;

use crate::utils::{normalize_path, resolve_path};

/// 6502 mnemonics, used to tell labels from instructions in listings.
pub const DEBUG_OPCODES: &[&str] = &[
    "adc", "and", "asl", "bcc", "bcs", "beq", "bit", "bmi", "bne", "bpl", "brk", "bvc", "bvs",
    "clc", "cld", "cli", "clv", "cmp", "cpx", "cpy", "dec", "dex", "dey", "eor", "inc", "inx",
    "iny", "jmp", "jsr", "lda", "ldx", "ldy", "lsr", "nop", "ora", "pha", "php", "pla", "plp",
    "rol", "ror", "rti", "rts", "sbc", "sec", "sed", "sei", "sta", "stx", "sty", "tax", "tay",
    "tsx", "txa", "txs", "tya",
];

pub fn is_opcode(name: &str) -> bool {
    DEBUG_OPCODES.contains(&name.to_ascii_lowercase().as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DebugDataType {
    Void,
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    Array,
    Struct,
    Pointer,
}

impl DebugDataType {
    /// Numeric code of the type, as shown to the debugger front end.
    pub fn code(self) -> u32 {
        match self {
            DebugDataType::Void => 0,
            DebugDataType::Bool => 1,
            DebugDataType::Int8 => 2,
            DebugDataType::UInt8 => 3,
            DebugDataType::Int16 => 4,
            DebugDataType::UInt16 => 5,
            DebugDataType::Int32 => 6,
            DebugDataType::UInt32 => 7,
            DebugDataType::Int64 => 8,
            DebugDataType::UInt64 => 9,
            DebugDataType::Float32 => 10,
            DebugDataType::Float64 => 11,
            DebugDataType::Array => 100,
            DebugDataType::Struct => 101,
            DebugDataType::Pointer => 102,
        }
    }

    pub fn integer(size: u32, signed: bool) -> Option<Self> {
        let ty = match (size, signed) {
            (1, true) => DebugDataType::Int8,
            (1, false) => DebugDataType::UInt8,
            (2, true) => DebugDataType::Int16,
            (2, false) => DebugDataType::UInt16,
            (4, true) => DebugDataType::Int32,
            (4, false) => DebugDataType::UInt32,
            (8, true) => DebugDataType::Int64,
            (8, false) => DebugDataType::UInt64,
            _ => return None,
        };
        Some(ty)
    }

    pub fn is_primitive(self) -> bool {
        (1..=11).contains(&self.code())
    }

    pub fn is_array(self) -> bool {
        self == DebugDataType::Array
    }

    pub fn is_struct(self) -> bool {
        self == DebugDataType::Struct
    }

    pub fn is_pointer(self) -> bool {
        self == DebugDataType::Pointer
    }
}

/// Kind of source a line entry came from. Sorting puts C before assembly at
/// the same address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum DebugLineType {
    Asm,
    C,
    Macro,
}

impl DebugLineType {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(DebugLineType::Asm),
            1 => Some(DebugLineType::C),
            2 => Some(DebugLineType::Macro),
            _ => None,
        }
    }

    pub(crate) fn sort_rank(line_type: Option<Self>) -> u8 {
        match line_type {
            Some(DebugLineType::C) => 0,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugSymbol {
    pub name: String,
    pub value: i64,
    pub is_address: bool,
    pub source: Option<String>,
    pub line: u32,
    pub data_size: u32,
    pub memory_size: u32,
    pub num_children: Option<u32>,
    pub data_type: Option<DebugDataType>,
    pub type_name: Option<String>,
    pub children: Option<Vec<DebugSymbol>>,
    pub type_ref: Option<usize>,
    pub stack_pointer_address: Option<u32>,
    pub stack_pointer_offset: i64,
    /// Position in the store's symbol list, set when the load completes.
    pub index: Option<usize>,
}

impl DebugSymbol {
    pub fn new(name: impl Into<String>, value: i64, is_address: bool) -> Self {
        Self {
            name: name.into(),
            value,
            is_address,
            source: None,
            line: 0,
            data_size: 0,
            memory_size: 0,
            num_children: None,
            data_type: None,
            type_name: None,
            children: None,
            type_ref: None,
            stack_pointer_address: None,
            stack_pointer_offset: 0,
            index: None,
        }
    }

    pub fn with_source(mut self, source: Option<&str>, line: u32) -> Self {
        self.source = source.map(resolve_path);
        self.line = line;
        self
    }

    pub fn with_sizes(mut self, data_size: u32, memory_size: u32) -> Self {
        self.data_size = data_size;
        self.memory_size = memory_size;
        self
    }

    pub fn with_type(mut self, data_type: DebugDataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    pub fn set_children(&mut self, children: Vec<DebugSymbol>) {
        self.num_children = Some(children.len() as u32);
        self.children = Some(children);
    }

    pub fn set_type_ref(&mut self, type_ref: usize) {
        self.type_ref = Some(type_ref);
    }

    pub fn set_stack_pointer_address(&mut self, address: u32) {
        self.stack_pointer_address = Some(address);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugLabel {
    pub name: String,
    pub address: u32,
    pub source: Option<String>,
    pub line: u32,
}

impl DebugLabel {
    pub fn new(name: impl Into<String>, address: u32, source: Option<&str>, line: u32) -> Self {
        Self {
            name: name.into(),
            address,
            source: source.map(resolve_path),
            line,
        }
    }
}

/// One address range mapped to one source line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugAddressInfo {
    pub address: u32,
    /// Inclusive.
    pub address_end: u32,
    pub source: Option<String>,
    #[serde(skip)]
    pub normalized_path: Option<String>,
    pub line: u32,
    pub name: Option<String>,
    pub global_ref: Option<usize>,
    pub local_ref: Option<usize>,
    pub debug_symbols: Vec<DebugSymbol>,
    pub debug_labels: Vec<DebugLabel>,
    pub line_type: Option<DebugLineType>,
    pub size: Option<u32>,
    /// Index into the store's scope spans.
    pub span: Option<usize>,
}

impl DebugAddressInfo {
    pub fn new(address: u32, address_end: Option<u32>, source: Option<&str>, line: u32) -> Self {
        Self {
            address,
            address_end: address_end.unwrap_or(address).max(address),
            source: source.map(resolve_path),
            normalized_path: source.map(normalize_path),
            line,
            name: None,
            global_ref: None,
            local_ref: None,
            debug_symbols: Vec::new(),
            debug_labels: Vec::new(),
            line_type: None,
            size: None,
            span: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn is_high_level(&self) -> bool {
        self.line_type == Some(DebugLineType::C)
    }

    pub fn contains(&self, address: u32) -> bool {
        address >= self.address && address <= self.address_end
    }

    /// Position of this range relative to `address`: `Greater` if the range
    /// starts after it, `Less` if it ends before it.
    pub fn compare(&self, address: u32) -> Ordering {
        if self.address > address {
            Ordering::Greater
        } else if self.address_end < address {
            Ordering::Less
        } else {
            Ordering::Equal
        }
    }

    pub fn compare_line(&self, line: u32) -> Ordering {
        self.line.cmp(&line)
    }

    pub fn add_debug_symbol(&mut self, symbol: DebugSymbol) {
        self.debug_symbols.push(symbol);
    }

    pub fn add_debug_label(&mut self, label: DebugLabel) {
        self.debug_labels.push(label);
    }
}

/// C symbol attached to a scope (cc65 `csym` records).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CSymInfo {
    pub name: String,
    pub storage_class: String,
    pub type_id: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScopeInfo {
    pub name: String,
    pub csyms: Vec<CSymInfo>,
}

/// Code range with the scopes that cover it, ordered by address in the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScopeSpan {
    pub address: u32,
    pub size: u32,
    pub scopes: Vec<usize>,
}
