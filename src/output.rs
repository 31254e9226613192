//! CLI output formatting.
//!
//! # Information-First Display
//!
//! Every page is shown by its location first, with filesystem paths as
//! indented context lines. Plugins are shown by name and kind, with the
//! module they were loaded from as context.
//!
//! # Output Format
//!
//! ## Build
//!
//! ```text
//! Pages
//! 001 index → index.html
//!     Source: index.org
//! 002 notes/rust → notes/rust.html
//!     Source: notes/rust.org
//!
//! Failed
//! 001 boom
//!     Error: boom: transform `picky` failed: refusing this page
//!
//! Plugins
//!     picky
//!
//! Built 2 pages, 1 failed → dist
//! ```
//!
//! ## Check
//!
//! ```text
//! Config
//!     nocturne.toml
//! Pages
//!     2 sources (*.org)
//! Plugins
//! 001 toc (content-provider)
//!     Source: native:/site/plugins/libtoc.so (sha256 3fa1…)
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::generate::BuildSummary;
use crate::plugin::Registry;
use crate::scan::SourceFile;
use std::path::Path;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `path` relative to `root` when possible, `/`-separated.
fn relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

// ============================================================================
// Build output
// ============================================================================

/// Format the result of a directory build.
pub fn format_build_output(summary: &BuildSummary, source_root: &Path) -> Vec<String> {
    let mut lines = Vec::new();

    let built: Vec<_> = summary.built().collect();
    if !built.is_empty() {
        lines.push("Pages".to_string());
        for (i, page) in built.iter().enumerate() {
            lines.push(format!(
                "{} {} → {}",
                format_index(i + 1),
                page.location,
                relative(&page.output, &summary.output_dir)
            ));
            lines.push(format!(
                "{}Source: {}",
                indent(1),
                relative(&page.source, source_root)
            ));
        }
    }

    let failed: Vec<_> = summary.failed().collect();
    if !failed.is_empty() {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push("Failed".to_string());
        for (i, err) in failed.iter().enumerate() {
            lines.push(format!("{} {}", format_index(i + 1), err.location()));
            lines.push(format!("{}Error: {}", indent(1), err));
        }
    }

    if !summary.plugins.is_empty() {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push("Plugins".to_string());
        for name in &summary.plugins {
            lines.push(format!("{}{}", indent(1), name));
        }
    }

    if !lines.is_empty() {
        lines.push(String::new());
    }
    let mut total = format!("Built {}", plural(built.len(), "page"));
    if !failed.is_empty() {
        total.push_str(&format!(", {} failed", failed.len()));
    }
    total.push_str(&format!(" → {}", summary.output_dir.display()));
    lines.push(total);
    lines
}

pub fn print_build_output(summary: &BuildSummary, source_root: &Path) {
    for line in format_build_output(summary, source_root) {
        println!("{}", line);
    }
}

// ============================================================================
// Check output
// ============================================================================

/// Format the registered plugins, one entity per plugin.
pub fn format_plugins(registry: &Registry) -> Vec<String> {
    let mut lines = vec!["Plugins".to_string()];
    if registry.is_empty() {
        lines.push(format!("{}(none)", indent(1)));
    }
    for (i, provider) in registry.providers().iter().enumerate() {
        let mut header = format!("{} {} ({})", format_index(i + 1), provider.name(), provider.kind());
        if let Some(slot) = provider.slot() {
            header.push_str(&format!(" @ {}", format!("{slot:?}").to_lowercase()));
        }
        lines.push(header);
        lines.push(format!("{}Source: {}", indent(1), provider.origin()));
    }
    lines
}

/// Format a successful `check`: config found, sources counted, plugins loaded.
pub fn format_check_output(
    config_file: Option<&Path>,
    sources: &[SourceFile],
    extension: &str,
    registry: &Registry,
) -> Vec<String> {
    let mut lines = vec!["Config".to_string()];
    match config_file {
        Some(path) => lines.push(format!("{}{}", indent(1), path.display())),
        None => lines.push(format!("{}(stock defaults)", indent(1))),
    }
    lines.push("Pages".to_string());
    lines.push(format!(
        "{}{} (*.{})",
        indent(1),
        plural(sources.len(), "source"),
        extension
    ));
    lines.extend(format_plugins(registry));
    lines
}

pub fn print_check_output(
    config_file: Option<&Path>,
    sources: &[SourceFile],
    extension: &str,
    registry: &Registry,
) {
    for line in format_check_output(config_file, sources, extension, registry) {
        println!("{}", line);
    }
}
