//! Trace canonicalizer (spec §4.5, §8 I5/I6).
//!
//! Extracts the stack-trace block from captured simulator output and
//! normalizes it so two replays of the same seed/commit on different
//! machines yield byte-identical canonical traces.

use std::sync::LazyLock;

use regex::Regex;

/// Hexadecimal address literals: `0x` followed by 4 or more hex digits.
/// Shorter runs are left alone since they are more likely to be meaningful
/// small integers (line numbers, small counters) than addresses.
static HEX_ADDRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"0x[0-9a-fA-F]{4,}").expect("static pattern is valid"));

/// Lines that open a stack-trace block. The simulator's panic/assertion
/// output always begins the trace with one of these markers.
const TRACE_START_MARKERS: &[&str] = &["stack backtrace:", "panicked at", "SIGSEGV", "SIGABRT"];

/// Strip everything up to and including an absolute path prefix that ends at
/// the source root directory, leaving a repository-relative path.
fn strip_source_root(line: &str, source_root: &str) -> String {
    let Some(root_idx) = line.find(source_root) else {
        return line.to_string();
    };

    // Walk back from the source-root occurrence to the start of the
    // whitespace-delimited path token it is part of.
    let path_start = line[..root_idx]
        .rfind(|c: char| c.is_whitespace())
        .map(|ws_idx| ws_idx + 1)
        .unwrap_or(0);

    let relative = line[root_idx + source_root.len()..].trim_start_matches('/');
    format!("{}{}", &line[..path_start], relative)
}

fn strip_hex_addresses(line: &str) -> String {
    HEX_ADDRESS_RE.replace_all(line, "0xADDR").into_owned()
}

fn is_trace_start(line: &str) -> bool {
    TRACE_START_MARKERS
        .iter()
        .any(|marker| line.contains(marker))
}

/// Lines that belong to the trace body: indented frame lines (`  at ...`,
/// `    0: ...`) or the marker line itself. The block ends at the first
/// blank line or non-indented, non-marker line following the start marker.
fn is_trace_body_line(line: &str) -> bool {
    if line.trim().is_empty() {
        return false;
    }
    line.starts_with(' ') || line.starts_with('\t') || is_trace_start(line)
}

/// Select the contiguous block of lines that constitutes the stack trace.
/// Returns `None` ("no trace") if no recognizable block is found.
fn select_trace_block(output: &str) -> Option<Vec<&str>> {
    let lines: Vec<&str> = output.lines().collect();
    let start = lines.iter().position(|l| is_trace_start(l))?;

    let mut end = start + 1;
    while end < lines.len() && is_trace_body_line(lines[end]) {
        end += 1;
    }

    Some(lines[start..end].to_vec())
}

/// Canonicalize captured simulator output into a deterministic byte string,
/// or `None` if no stack trace block was found.
pub fn canonicalize(output: &str, source_root: &str) -> Option<String> {
    let block = select_trace_block(output)?;
    let normalized: Vec<String> = block
        .into_iter()
        .map(|line| strip_hex_addresses(&strip_source_root(line, source_root)))
        .collect();
    Some(normalized.join("\n"))
}
