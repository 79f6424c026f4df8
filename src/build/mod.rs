//! Build command recovery from the project's build system.

mod command;
mod resolver;

pub use command::{AssemblerInvocation, CompileInvocation};
pub use resolver::{resolve_build_command, ResolvedBuild};
