//! End-to-end import of one function into a recompilation directory.

use crate::asm::{parse_asm, FunctionAsm};
use crate::build::{resolve_build_command, AssemblerInvocation, CompileInvocation, ResolvedBuild};
use crate::config::ToolchainConfig;
use crate::preprocess::preprocess;
use crate::tools::{quote, run_checked, ToolRunner};
use anyhow::{Context, Result};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};

/// Inputs for one import run.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub c_file: PathBuf,
    pub asm_file: PathBuf,
    pub build_flags: Vec<String>,
    pub keep_on_error: bool,
    pub preserve_macros: bool,
}

/// Runs the whole pipeline: extract the function, recover the build
/// commands, preprocess, then materialize the recompilation directory.
/// On a fatal error after the directory exists, it is removed again
/// unless `keep_on_error` is set.
pub fn handle_import(
    config: &ImportConfig,
    toolchain: &ToolchainConfig,
    runner: &dyn ToolRunner,
) -> Result<()> {
    let listing = fs::read_to_string(&config.asm_file)
        .with_context(|| format!("could not open assembly file {}", config.asm_file.display()))?;
    let function = parse_asm(&listing)?;
    println!("Function name: {}", function.name);

    let build = resolve_build_command(&config.c_file, &config.build_flags, toolchain, runner)?;
    println!("Compiler: {} {{input}} -o {{output}}", build.compiler);
    println!("Assembler: {} {{input}} -o {{output}}", build.assembler);

    let source = preprocess(
        &build.compiler,
        &build.working_dir,
        &config.c_file,
        config.preserve_macros,
        toolchain,
        runner,
    )?;

    let dir = create_function_dir(&toolchain.output_root, &function.name)?;

    match materialize(&dir, &function, &source, &build, toolchain, runner) {
        Ok(()) => {
            println!("\nDone. Imported into {}", dir.display());
            Ok(())
        }
        Err(err) => {
            if !config.keep_on_error {
                println!(
                    "\nDeleting directory {} (run with --keep to preserve it).",
                    dir.display()
                );
                if let Err(cleanup) = fs::remove_dir_all(&dir) {
                    log::warn!("could not remove {}: {cleanup}", dir.display());
                }
            }
            Err(err)
        }
    }
}

/// First `<root>/<name>` or `<root>/<name>-N` that does not exist yet;
/// `create_dir` arbitrates races between separate runs.
fn create_function_dir(root: &Path, func_name: &str) -> Result<PathBuf> {
    fs::create_dir_all(root)
        .with_context(|| format!("could not create {}", root.display()))?;
    let mut ctr: u32 = 0;
    loop {
        ctr += 1;
        let dirname = if ctr > 1 {
            format!("{func_name}-{ctr}")
        } else {
            func_name.to_string()
        };
        let dir = root.join(dirname);
        match fs::create_dir(&dir) {
            Ok(()) => return Ok(dir),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(err) => {
                return Err(err).with_context(|| format!("could not create {}", dir.display()))
            }
        }
    }
}

fn materialize(
    dir: &Path,
    function: &FunctionAsm,
    source: &str,
    build: &ResolvedBuild,
    toolchain: &ToolchainConfig,
    runner: &dyn ToolRunner,
) -> Result<()> {
    let base_c = dir.join("base.c");
    let base_o = dir.join("base.o");
    let target_s = dir.join("target.s");
    let target_o = dir.join("target.o");
    let compile_script = dir.join("compile.sh");

    write_file(&base_c, source)?;
    write_file(&dir.join("function.txt"), &function.name)?;
    write_compile_script(&compile_script, &build.compiler, &build.working_dir)?;
    write_file(
        &target_s,
        &format!("{}{}", toolchain.asm_prelude, function.text),
    )?;

    assemble(
        &build.assembler,
        &build.working_dir,
        &target_s,
        &target_o,
        runner,
    )?;
    compile_base(&compile_script, &base_c, &base_o, runner);
    Ok(())
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).with_context(|| format!("could not write {}", path.display()))
}

/// Replay script: resolves its input/output arguments, enters the build
/// directory, and reruns the recovered compile command.
fn write_compile_script(
    path: &Path,
    compiler: &CompileInvocation,
    working_dir: &Path,
) -> Result<()> {
    let mut script = String::from("#!/usr/bin/env bash\n");
    script.push_str("INPUT=\"$(readlink -f \"$1\")\"\n");
    script.push_str("OUTPUT=\"$(readlink -f \"$3\")\"\n");
    script.push_str(&format!("cd {}\n", quote(&working_dir.to_string_lossy())));
    script.push_str(&format!("{compiler} \"$INPUT\" -o \"$OUTPUT\"\n"));
    write_file(path, &script)?;
    set_executable(path)
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("could not mark {} executable", path.display()))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}

fn assemble(
    assembler: &AssemblerInvocation,
    working_dir: &Path,
    input: &Path,
    output: &Path,
    runner: &dyn ToolRunner,
) -> Result<()> {
    let mut command = assembler.tokens.clone();
    command.push(path_str(input)?);
    command.push("-o".to_string());
    command.push(path_str(output)?);
    run_checked(runner, &command, working_dir, None)
        .context("failed to assemble the reference listing")?;
    Ok(())
}

/// Best effort only; the reconstructed source usually needs hand edits
/// before it compiles, so failure here never fails the import.
fn compile_base(script: &Path, input: &Path, output: &Path, runner: &dyn ToolRunner) {
    let outcome = (|| -> Result<()> {
        let command = vec![
            path_str(script)?,
            path_str(input)?,
            "-o".to_string(),
            path_str(output)?,
        ];
        run_checked(runner, &command, Path::new("."), None)?;
        Ok(())
    })();
    if let Err(err) = outcome {
        eprintln!(
            "{} failed to compile base.c, you'll need to adjust it manually: {err}",
            "Warning:".yellow().bold()
        );
    }
}

fn path_str(path: &Path) -> Result<String> {
    Ok(std::path::absolute(path)
        .with_context(|| format!("cannot resolve path {}", path.display()))?
        .to_string_lossy()
        .into_owned())
}
