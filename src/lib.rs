// Export modules for library usage
pub mod asm;
pub mod build;
pub mod cli;
pub mod commands;
pub mod config;
pub mod preprocess;
pub mod tools;

// Re-export commonly used types
pub use crate::asm::{parse_asm, FunctionAsm};
pub use crate::build::{resolve_build_command, AssemblerInvocation, CompileInvocation, ResolvedBuild};
pub use crate::config::ToolchainConfig;
pub use crate::preprocess::preprocess;
pub use crate::tools::{
    format_command, ScriptedToolRunner, SystemToolRunner, ToolError, ToolOutput, ToolRunner,
};
