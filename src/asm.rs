//! Reference assembly listing scanning.

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// Sections recognized when a directive appears bare on a line.
const SECTION_DIRECTIVES: [&str; 6] = [
    ".text",
    ".rdata",
    ".rodata",
    ".late_rodata",
    ".bss",
    ".data",
];

static FUNCTION_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_$]+$").unwrap());

/// One function's worth of executable-section assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionAsm {
    pub name: String,
    /// Concatenated `.text` lines, newline-terminated.
    pub text: String,
}

/// Scans `listing`, keeping every line that falls in the `.text` section
/// and naming the function from the first `glabel` directive seen there.
///
/// The active section starts as `.text` and follows `.section` directives
/// as well as bare section switches (`.data`, `.rodata`, ...). Lines in
/// other sections only move the boundary; they are not collected.
pub fn parse_asm(listing: &str) -> Result<FunctionAsm> {
    let mut func_name: Option<String> = None;
    let mut text = String::new();
    let mut cur_section = ".text".to_string();

    for line in listing.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with(".section") {
            if let Some(section) = trimmed.split_whitespace().nth(1) {
                cur_section = section.to_string();
            }
        } else if SECTION_DIRECTIVES.contains(&trimmed) {
            cur_section = trimmed.to_string();
        }

        if cur_section == ".text" {
            if func_name.is_none() {
                if let Some(rest) = trimmed.strip_prefix("glabel ") {
                    func_name = rest.split_whitespace().next().map(str::to_string);
                }
            }
            text.push_str(line);
            text.push('\n');
        }
    }

    let Some(name) = func_name else {
        bail!(
            "missing function name in assembly file; \
             the file should start with 'glabel function_name'"
        );
    };
    if !FUNCTION_NAME.is_match(&name) {
        bail!("bad function name: {name}");
    }

    Ok(FunctionAsm { name, text })
}
