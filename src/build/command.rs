//! Recovered compiler and assembler invocations.

use crate::tools::format_command;
use std::fmt;

/// Flags whose following token names a file the import regenerates itself.
const DROPPED_FLAG_PAIRS: [&str; 2] = ["-MF", "-o"];

/// Substrings identifying an assembler-substitution wrapper token.
const ASM_WRAPPER_MARKERS: [&str; 3] = ["asm_processor", "asm-processor", "preprocess.py"];

/// Compiler command for the target source, stripped of source/output
/// naming so it can be replayed against new inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileInvocation {
    pub tokens: Vec<String>,
}

impl CompileInvocation {
    pub fn new(tokens: Vec<String>) -> Self {
        Self { tokens }
    }
}

impl fmt::Display for CompileInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_command(&self.tokens))
    }
}

/// Assembler command recovered from an asm-processor wrapper, or the
/// configured architecture baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblerInvocation {
    pub tokens: Vec<String>,
}

impl AssemblerInvocation {
    pub fn new(tokens: Vec<String>) -> Self {
        Self { tokens }
    }
}

impl fmt::Display for AssemblerInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_command(&self.tokens))
    }
}

/// Drops `ignore_part` (the source path) and output/dependency flag pairs
/// from a tokenized trace line, then unwraps an asm-processor indirection
/// when one is present. Returns the compiler tokens plus the inner
/// assembler tokens, if any were recovered.
pub(crate) fn fixup_build_command(
    parts: &[String],
    ignore_part: &str,
) -> (Vec<String>, Option<Vec<String>>) {
    let mut tokens: Vec<String> = Vec::with_capacity(parts.len());
    let mut skip_next = false;
    for part in parts {
        if skip_next {
            skip_next = false;
            continue;
        }
        if DROPPED_FLAG_PAIRS.contains(&part.as_str()) {
            skip_next = true;
            continue;
        }
        if part == ignore_part {
            continue;
        }
        tokens.push(part.clone());
    }

    let assembler = unwrap_asm_processor(&mut tokens);
    (tokens, assembler)
}

/// Splits `<prefix...> <wrapper> ... -- <assembler...> -- <suffix...>`
/// into prefix+suffix (the real compiler) and the assembler between the
/// separators. Leaves `tokens` untouched when the pattern is incomplete.
fn unwrap_asm_processor(tokens: &mut Vec<String>) -> Option<Vec<String>> {
    let wrapper = tokens
        .iter()
        .position(|t| ASM_WRAPPER_MARKERS.iter().any(|marker| t.contains(marker)))?;
    let first = position_of(tokens, "--", wrapper + 1)?;
    let second = position_of(tokens, "--", first + 1)?;

    let assembler = tokens[first + 1..second].to_vec();
    let mut compiler = tokens[..wrapper].to_vec();
    compiler.extend_from_slice(&tokens[second + 1..]);
    *tokens = compiler;
    Some(assembler)
}

fn position_of(tokens: &[String], needle: &str, from: usize) -> Option<usize> {
    tokens[from..].iter().position(|t| t == needle).map(|i| i + from)
}
