//! Macro-preserving preprocessing.
//!
//! Directives and ordinary macros resolve through an external,
//! standards-compliant preprocessor; what this module controls is what
//! each invocation gets to see. In preserving mode the preprocessor runs
//! twice: a directives-only pass emits every definition verbatim, a
//! sentinel rewrite hides the function-like definitions that should stay
//! literal, and the real pass then leaves their invocations untouched.
//! Hidden definitions are re-declared in a demarcated block for a later
//! pragma-aware compile stage, pruned by call-graph reachability.

mod graph;

pub use graph::CallGraph;

use crate::build::CompileInvocation;
use crate::config::ToolchainConfig;
use crate::tools::{run_checked, ToolRunner};
use anyhow::{Context, Result};
use graph::ROOT;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashSet;
use std::path::Path;

/// Marker hiding a deferred definition from the second pass.
const SENTINEL: &str = "_matchprep";

static CALL_SYNTAX: Lazy<Regex> = Lazy::new(|| Regex::new(r"([A-Za-z0-9_]+)\(").unwrap());
static UNINDENTED_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^([A-Za-z0-9_]+)\(").unwrap());
static FUNCTION_DEFINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^#define ([A-Za-z0-9_]+)\(").unwrap());
static CONFORMANCE_DEFINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^#define __STDC_.*\n").unwrap());

/// Preprocessed text for `source`, honoring the include/define context of
/// the recovered compile command.
///
/// With `preserve_macros` unset this is a single preprocessor run; set,
/// the two-pass pipeline keeps function-like macro invocations literal.
/// Either pass failing is fatal and surfaces the failing command.
pub fn preprocess(
    compiler: &CompileInvocation,
    working_dir: &Path,
    source: &Path,
    preserve_macros: bool,
    config: &ToolchainConfig,
    runner: &dyn ToolRunner,
) -> Result<String> {
    let source = std::path::absolute(source)
        .with_context(|| format!("cannot resolve path {}", source.display()))?;
    let rel_source = pathdiff::diff_paths(&source, working_dir)
        .unwrap_or_else(|| source.clone())
        .to_string_lossy()
        .into_owned();

    let mut context_command = config.cpp_command.clone();
    context_command.push(rel_source);
    context_command.extend(config.fixed_defines.iter().cloned());
    context_command.extend(context_flags(&compiler.tokens));

    if !preserve_macros {
        let mut plain = context_command;
        plain.extend(config.stub_defines.iter().cloned());
        let output = run_checked(runner, &plain, working_dir, None)
            .context("failed to preprocess input file")?;
        return Ok(output.stdout);
    }

    preprocess_preserving_macros(&context_command, working_dir, config, runner)
}

/// Include/define/undef context drawn from the compile command. Carries
/// `-D`/`-U`/`-I` (with a separate value token where used), their glued
/// forms, and `-nostdinc`; everything else is compiler business.
fn context_flags(compiler_tokens: &[String]) -> Vec<String> {
    let mut flags = Vec::new();
    let mut carry_value = false;
    for arg in compiler_tokens {
        if carry_value {
            carry_value = false;
            flags.push(arg.clone());
            continue;
        }
        if matches!(arg.as_str(), "-D" | "-U" | "-I") {
            flags.push(arg.clone());
            carry_value = true;
            continue;
        }
        if arg.starts_with("-D")
            || arg.starts_with("-U")
            || arg.starts_with("-I")
            || arg == "-nostdinc"
        {
            flags.push(arg.clone());
        }
    }
    flags
}

fn preprocess_preserving_macros(
    context_command: &[String],
    working_dir: &Path,
    config: &ToolchainConfig,
    runner: &dyn ToolRunner,
) -> Result<String> {
    // Directives-only pass: inclusion and conditionals resolve, every
    // macro definition comes through verbatim, nothing expands.
    let mut first_pass = context_command.to_vec();
    first_pass.extend(["-dD".to_string(), "-fdirectives-only".to_string()]);
    let source = run_checked(runner, &first_pass, working_dir, None)
        .context("failed to preprocess input file")?
        .stdout;

    let expand_set = classify_expand_macros(&source);
    let rewritten = hide_deferred_definitions(&source, &expand_set);

    // Real pass over the rewritten text, not the original file. Hidden
    // definitions' invocations survive as literal call syntax.
    let mut second_pass = config.cpp_command.clone();
    second_pass.extend(config.stub_defines.iter().cloned());
    let expanded = run_checked(runner, &second_pass, working_dir, Some(&rewritten))
        .context("failed to preprocess input file")?
        .stdout;

    Ok(recover_late_definitions(&expanded))
}

/// Call syntax at column zero is invalid as a real function call, so a
/// macro invoked there has to expand normally. Calls at column zero
/// inside multi-line statements misclassify; accepted, and a macro never
/// observed unindented stays deferred.
fn classify_expand_macros(source: &str) -> HashSet<String> {
    UNINDENTED_CALL
        .captures_iter(source)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Rewrites each deferral candidate's definition so the next pass does
/// not recognize it, keeping the name and parameter/body text intact for
/// recovery. Some of the rewritten lines may sit inside comments; the
/// recovery pass sorts that out once comments are gone.
fn hide_deferred_definitions(source: &str, expand_set: &HashSet<String>) -> String {
    let hidden = FUNCTION_DEFINE.replace_all(source, |caps: &Captures| {
        let name = &caps[1];
        if expand_set.contains(name) {
            caps[0].to_string()
        } else {
            format!("{SENTINEL} define {name}(")
        }
    });
    // The second pass warns about redefining the conformance macros the
    // environment injects; drop them.
    CONFORMANCE_DEFINE.replace_all(&hidden, "").into_owned()
}

/// Separates sentinel-rewritten definitions from output code, prunes the
/// ones nothing reachable invokes, and emits the demarcated block a
/// downstream compile stage re-expands.
fn recover_late_definitions(source: &str) -> String {
    let late_prefix = format!("{SENTINEL} define ");
    let mut late_defines: Vec<(String, String)> = Vec::new();
    let mut kept: Vec<&str> = Vec::new();
    let mut graph = CallGraph::new();

    for line in source.lines() {
        let context = match line
            .strip_prefix(&late_prefix)
            .and_then(|rest| rest.split_once('('))
        {
            Some((name, after)) => {
                late_defines.push((name.to_string(), after.to_string()));
                name.to_string()
            }
            None => {
                kept.push(line);
                ROOT.to_string()
            }
        };
        for caps in CALL_SYNTAX.captures_iter(line) {
            graph.add_edge(&context, &caps[1]);
        }
    }

    let used = graph.reachable_from(ROOT);
    let used_directly = graph.successors(ROOT);

    let mut output: Vec<String> = Vec::new();
    output.push(format!("#pragma {SENTINEL} latedefine start"));
    for (name, after) in &late_defines {
        if used.contains(name) {
            output.push(format!("#pragma {SENTINEL} define {name}({after}"));
        }
    }
    for (name, _) in &late_defines {
        if used_directly.contains(name) {
            // Keeps bare calls syntactically valid until the deferred
            // definitions are re-expanded downstream.
            output.push(format!("int {name}();"));
        }
    }
    output.push(format!("#pragma {SENTINEL} latedefine end"));
    output.extend(kept.iter().map(|line| line.to_string()));
    output.push(String::new());
    output.join("\n")
}
