use serde::Serialize;
use serde_json::{json, Value};

use crate::utils::resolve_path;

/// Named memory block, displayed next to symbols.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugMemory {
    pub name: String,
    pub start_address: u32,
    /// Inclusive.
    pub end_address: u32,
    pub source: Option<String>,
    pub line: u32,
}

impl DebugMemory {
    pub fn new(
        name: impl Into<String>,
        start_address: u32,
        end_address: u32,
        source: Option<&str>,
        line: u32,
    ) -> Self {
        Self {
            name: name.into(),
            start_address,
            end_address: end_address.max(start_address),
            source: source.map(resolve_path),
            line,
        }
    }

    pub fn value(&self) -> i64 {
        self.start_address as i64
    }

    pub fn memory_size(&self) -> u32 {
        (self.end_address - self.start_address).saturating_add(1)
    }

    pub fn is_address(&self) -> bool {
        true
    }

    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.start_address && addr <= self.end_address
    }

    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "start": format!("${:04x}", self.start_address),
            "end": format!("${:04x}", self.end_address),
            "size": self.memory_size(),
            "source": self.source,
            "line": self.line,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_compatible_view() {
        let block = DebugMemory::new("screen", 0x0400, 0x07e7, None, 3);
        assert_eq!(block.value(), 0x0400);
        assert_eq!(block.memory_size(), 1000);
        assert!(block.is_address());
        assert!(block.contains(0x07e7));
        assert!(!block.contains(0x07e8));
        assert_eq!(block.to_json()["start"], "$0400");
    }
}
