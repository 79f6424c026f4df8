use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "matchprep")]
#[command(
    about = "Import a function into a self-contained recompilation directory for match searching",
    long_about = None
)]
#[command(version)]
pub struct Cli {
    /// File containing the function. Assumes the file can be built with
    /// 'make' to create an .o file.
    pub c_file: PathBuf,

    /// File containing assembly for the function. Must start with
    /// 'glabel <function_name>' and contain no other functions.
    pub asm_file: PathBuf,

    /// Arguments to pass through to 'make' (PERMUTER=1 is always added)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub build_flags: Vec<String>,

    /// Keep the output directory on error
    #[arg(long)]
    pub keep: bool,

    /// Don't expand function-like macros
    #[arg(long = "preserve-macros")]
    pub preserve_macros: bool,
}
