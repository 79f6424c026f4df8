use anyhow::Result;
use clap::Parser;
use matchprep::cli::Cli;
use matchprep::commands::{handle_import, ImportConfig};
use matchprep::config::ToolchainConfig;
use matchprep::tools::SystemToolRunner;

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = ImportConfig {
        c_file: cli.c_file,
        asm_file: cli.asm_file,
        build_flags: cli.build_flags,
        keep_on_error: cli.keep,
        preserve_macros: cli.preserve_macros,
    };

    handle_import(&config, &ToolchainConfig::default(), &SystemToolRunner)
}
