//! Recovery of the exact compile command a build system uses.
//!
//! Replays the build in dry-run trace mode and filters the logged
//! commands down to the single one producing the target object.

use super::command::{fixup_build_command, AssemblerInvocation, CompileInvocation};
use crate::config::ToolchainConfig;
use crate::tools::{format_command, run_checked, ToolRunner};
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

/// Everything the rest of the pipeline needs from the build system.
#[derive(Debug)]
pub struct ResolvedBuild {
    pub compiler: CompileInvocation,
    pub assembler: AssemblerInvocation,
    /// Manifest directory; compile and assemble runs happen here.
    pub working_dir: PathBuf,
}

/// Locates the governing makefile, replays the build in trace mode, and
/// extracts the unique compile command for `source`.
pub fn resolve_build_command(
    source: &Path,
    build_flags: &[String],
    config: &ToolchainConfig,
    runner: &dyn ToolRunner,
) -> Result<ResolvedBuild> {
    let source = std::path::absolute(source)
        .with_context(|| format!("cannot resolve path {}", source.display()))?;
    let manifest_dir = find_manifest_dir(&source)?;
    let rel_source = pathdiff::diff_paths(&source, &manifest_dir)
        .unwrap_or_else(|| source.clone())
        .to_string_lossy()
        .into_owned();

    let mut trace_command = config.make_command.clone();
    trace_command.extend(build_flags.iter().cloned());
    trace_command.push(config.trace_signal.clone());

    log::debug!("replaying build: {}", format_command(&trace_command));
    let trace = run_checked(runner, &trace_command, &manifest_dir, None)
        .context("failed to replay the build in trace mode")?;

    let mut candidates: Vec<Vec<String>> = Vec::new();
    let mut assembler: Option<Vec<String>> = None;
    let mut close_match = false;

    for raw_line in trace.stdout.lines() {
        let line = normalize_path_artifacts(raw_line);
        if !line.contains(&rel_source) {
            continue;
        }
        close_match = true;
        let Some(parts) = shlex::split(&line) else {
            continue;
        };
        if !parts.iter().any(|p| p == &rel_source) {
            continue;
        }
        if !parts.iter().any(|p| p == "-o") {
            continue;
        }
        if parts.iter().any(|p| p == "-fsyntax-only") {
            continue;
        }
        let (tokens, recovered) = fixup_build_command(&parts, &rel_source);
        if recovered.is_some() {
            assembler = recovered;
        }
        candidates.push(tokens);
    }

    if candidates.is_empty() {
        let close_extra = if close_match {
            "\n(Found one possible candidate, but it was rejected for having spaces \
             in paths, carrying -fsyntax-only, or missing an -o flag.)"
        } else {
            ""
        };
        bail!(
            "failed to find a compile command in the build trace; ensure `{}` \
             emits a line containing '{}'{}",
            format_command(&trace_command),
            rel_source,
            close_extra
        );
    }
    if candidates.len() > 1 {
        let listing = candidates
            .iter()
            .map(|c| format_command(c))
            .collect::<Vec<_>>()
            .join("\n");
        bail!(
            "found multiple compile commands for {rel_source}:\n{listing}\n\
             Modify the makefile so that under {} only a single compile \
             command is emitted.",
            config.trace_signal
        );
    }

    let compiler = CompileInvocation::new(candidates.swap_remove(0));
    let assembler =
        AssemblerInvocation::new(assembler.unwrap_or_else(|| config.default_assembler.clone()));

    Ok(ResolvedBuild {
        compiler,
        assembler,
        working_dir: manifest_dir,
    })
}

/// Walks from the source file's directory toward the filesystem root,
/// stopping at the first directory holding a makefile.
fn find_manifest_dir(source: &Path) -> Result<PathBuf> {
    let mut current = source.parent();
    while let Some(dir) = current {
        for name in ["makefile", "Makefile"] {
            if dir.join(name).is_file() {
                return Ok(dir.to_path_buf());
            }
        }
        current = dir.parent();
    }
    bail!("missing makefile for file {}", source.display())
}

/// Collapses doubled separators and current-directory segments so textual
/// matching survives the path spellings make tends to emit.
fn normalize_path_artifacts(line: &str) -> String {
    let mut line = line.to_string();
    while line.contains("//") {
        line = line.replace("//", "/");
    }
    while line.contains("/./") {
        line = line.replace("/./", "/");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ScriptedToolRunner, ToolOutput};
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn project_with_makefile() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Makefile"), "all:\n").unwrap();
        let src_dir = dir.path().join("src");
        fs::create_dir(&src_dir).unwrap();
        let source = src_dir.join("code.c");
        fs::write(&source, "int x;\n").unwrap();
        (dir, source)
    }

    fn resolve_with_trace(trace: &str) -> Result<ResolvedBuild> {
        let (dir, source) = project_with_makefile();
        let runner = ScriptedToolRunner::new();
        runner.respond("make", ToolOutput::ok(trace));
        let result = resolve_build_command(&source, &[], &ToolchainConfig::default(), &runner);
        drop(dir);
        result
    }

    #[test]
    fn test_single_matching_line_resolves() {
        let build = resolve_with_trace(
            "echo building\ncc -O2 -mips2 -o build/code.o src/code.c\nranlib lib.a\n",
        )
        .unwrap();
        assert_eq!(
            build.compiler.tokens,
            vec!["cc", "-O2", "-mips2"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
        // No wrapper in the trace: the configured baseline applies.
        assert_eq!(build.assembler.tokens[0], "mips-linux-gnu-as");
    }

    #[test]
    fn test_trace_command_carries_signal_flag() {
        let (dir, source) = project_with_makefile();
        let runner = ScriptedToolRunner::new();
        runner.respond("make", ToolOutput::ok("cc -o code.o src/code.c\n"));
        let flags = vec!["VERSION=us".to_string()];
        resolve_build_command(&source, &flags, &ToolchainConfig::default(), &runner).unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].cwd, dir.path());
        let argv = &calls[0].argv;
        assert_eq!(argv[0], "make");
        assert!(argv.contains(&"--dry-run".to_string()));
        assert!(argv.contains(&"VERSION=us".to_string()));
        assert_eq!(argv.last().unwrap(), "PERMUTER=1");
    }

    #[test]
    fn test_doubled_separators_are_collapsed() {
        let build =
            resolve_with_trace("cc -o build/code.o src//.//code.c\n").unwrap();
        assert_eq!(build.compiler.tokens, vec!["cc".to_string()]);
    }

    #[test]
    fn test_syntax_check_lines_are_rejected() {
        let err = resolve_with_trace("cc -fsyntax-only -o /dev/null src/code.c\n").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("failed to find a compile command"));
        assert!(message.contains("rejected"), "close-match hint missing: {message}");
    }

    #[test]
    fn test_substring_match_without_token_is_rejected() {
        // The path appears inside a larger token, never as a whole word.
        let err = resolve_with_trace("cc -o build/code.o wrapped/src/code.c\n").unwrap_err();
        assert!(err.to_string().contains("rejected"));
    }

    #[test]
    fn test_missing_output_flag_is_rejected() {
        let err = resolve_with_trace("cc -c src/code.c\n").unwrap_err();
        assert!(err.to_string().contains("failed to find a compile command"));
    }

    #[test]
    fn test_no_mention_gives_bare_diagnostic() {
        let err = resolve_with_trace("echo nothing to do\n").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("src/code.c"));
        assert!(!message.contains("rejected"));
    }

    #[test]
    fn test_multiple_matches_are_ambiguous() {
        let err = resolve_with_trace(
            "cc -O1 -o a.o src/code.c\ncc -O2 -o b.o src/code.c\n",
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("multiple compile commands"));
        assert!(message.contains("PERMUTER=1"));
        assert!(message.contains("cc -O1"));
        assert!(message.contains("cc -O2"));
    }

    #[test]
    fn test_asm_processor_wrapper_recovers_assembler() {
        let build = resolve_with_trace(
            "python3 tools/asm_processor.py cc-ido -- as -march=vr4300 -mabi=32 -- \
             -O2 -o build/code.o src/code.c\n",
        )
        .unwrap();
        assert_eq!(
            build.assembler.tokens,
            vec!["as", "-march=vr4300", "-mabi=32"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
        assert_eq!(
            build.compiler.tokens,
            vec!["python3", "-O2"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_missing_makefile_is_fatal() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src").join("code.c");
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::write(&source, "int x;\n").unwrap();

        let runner = ScriptedToolRunner::new();
        let err = resolve_build_command(&source, &[], &ToolchainConfig::default(), &runner)
            .unwrap_err();
        assert!(err.to_string().contains("missing makefile"));
    }

    #[test]
    fn test_makefile_found_in_ancestor_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("makefile"), "all:\n").unwrap();
        let nested = dir.path().join("src").join("overlays").join("area");
        fs::create_dir_all(&nested).unwrap();
        let source = nested.join("code.c");
        fs::write(&source, "int x;\n").unwrap();

        let runner = ScriptedToolRunner::new();
        runner.respond(
            "make",
            ToolOutput::ok("cc -o build/code.o src/overlays/area/code.c\n"),
        );
        let build =
            resolve_build_command(&source, &[], &ToolchainConfig::default(), &runner).unwrap();
        assert_eq!(build.working_dir, dir.path());
    }

    #[test]
    fn test_failed_trace_run_is_fatal() {
        let (_dir, source) = project_with_makefile();
        let runner = ScriptedToolRunner::new();
        runner.respond("make", ToolOutput::failed(2));
        let err = resolve_build_command(&source, &[], &ToolchainConfig::default(), &runner)
            .unwrap_err();
        assert!(err.to_string().contains("trace mode"));
    }
}
