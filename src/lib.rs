// Crate root: declare modules and control visibility
pub mod debug;
pub mod debug_info;
pub mod elf;
pub mod error;
pub mod memory;
pub mod symbols;
pub mod utils;

// Re-export commonly used API from the library for binaries/tests
pub use debug_info::kick::KickAssemblerInfo;
pub use debug_info::project::{Project, ProjectContext};
pub use debug_info::toolchain::ToolchainKind;
pub use debug_info::DebugInfo;
pub use elf::Elf;
pub use error::{DecodeError, LoadError};
pub use memory::DebugMemory;
pub use symbols::{DebugAddressInfo, DebugDataType, DebugLabel, DebugLineType, DebugSymbol};
pub use utils::normalize_path;
