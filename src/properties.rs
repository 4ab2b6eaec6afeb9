//! Parses the `<name>.properties` sidecar file: a Java-properties-style
//! key/value text format with `#`/`!` comments, `:`/`=` separators, line
//! continuations and backslash escapes, plus the bespoke `compressionflags`
//! sub-grammar.
//!
//! The reference crate leans on the `java-properties` crate for its
//! all-defaults load path and hand-rolls the `compressionflags` grammar
//! separately; this parser folds both into one pass so every key in the
//! table below (including the `zetak`/`graphclass`/`version` checks) is
//! validated uniformly in one place, matching `§4.2` of the specification.

use std::collections::HashMap;

use anyhow::Context;

use crate::error::{GraphError, Result};

/// A per-field universal code selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    Unary,
    Gamma,
    Delta,
    Zeta { k: u32 },
    Nibble,
}

/// The six per-field code selections plus the compression window parameters,
/// as recognized by the `compressionflags` property.
#[derive(Debug, Clone, Copy)]
pub struct CompFlags {
    pub outdegrees: Code,
    pub references: Code,
    pub blocks: Code,
    pub residuals: Code,
    pub block_count: Code,
    pub offsets: Code,
}

impl Default for CompFlags {
    fn default() -> Self {
        CompFlags {
            outdegrees: Code::Gamma,
            references: Code::Unary,
            blocks: Code::Gamma,
            residuals: Code::Zeta { k: 3 },
            block_count: Code::Gamma,
            offsets: Code::Gamma,
        }
    }
}

const ACCEPTED_GRAPH_CLASSES: [&str; 2] = [
    "it.unimi.dsi.webgraph.BVGraph",
    "class it.unimi.dsi.webgraph.BVGraph",
];

/// The parsed contents of a `.properties` file, ready to build a
/// [`crate::metadata::GraphMetadata`] from.
#[derive(Debug, Clone)]
pub struct Properties {
    pub nodes: u64,
    pub arcs: u64,
    pub window_size: u32,
    pub max_ref_count: u32,
    pub min_interval_length: u32,
    pub zeta_k: u32,
    pub comp_flags: CompFlags,
}

impl Properties {
    /// Parses the raw contents of a `<name>.properties` file.
    pub fn parse(text: &str) -> Result<Properties> {
        let map = parse_key_values(text)?;

        let version = map.get("version").map(|s| s.as_str()).unwrap_or("0");
        if version.trim() != "0" {
            return Err(GraphError::UnsupportedVersion);
        }
        if let Some(class) = map.get("graphclass") {
            if !ACCEPTED_GRAPH_CLASSES.contains(&class.trim()) {
                return Err(GraphError::UnsupportedVersion);
            }
        }

        let nodes = parse_required_u64(&map, "nodes").map_err(to_property_error)?;
        let arcs = parse_required_u64(&map, "arcs").map_err(to_property_error)?;
        let window_size = parse_optional_u32(&map, "windowsize", 7).map_err(to_property_error)?;
        let max_ref_count =
            parse_optional_u32(&map, "maxrefcount", 3).map_err(to_property_error)?;
        let min_interval_length =
            parse_optional_u32(&map, "minintervallength", 3).map_err(to_property_error)?;
        let zeta_k = parse_optional_u32(&map, "zetak", 3).map_err(to_property_error)?;

        let comp_flags = match map.get("compressionflags") {
            Some(flags) if !flags.trim().is_empty() => parse_compression_flags(flags, zeta_k)?,
            _ => CompFlags::default(),
        };

        Ok(Properties {
            nodes,
            arcs,
            window_size,
            max_ref_count,
            min_interval_length,
            zeta_k,
            comp_flags,
        })
    }
}

/// Folds an internal `anyhow` failure into the public error vocabulary at the
/// parser's boundary, the same way the reference loader funnels its
/// `java_properties`/`anyhow` failures into a handful of outcomes.
fn to_property_error(e: anyhow::Error) -> GraphError {
    GraphError::PropertyFileError(format!("{e:#}"))
}

fn parse_required_u64(map: &HashMap<String, String>, key: &str) -> anyhow::Result<u64> {
    map.get(key)
        .with_context(|| format!("missing required key `{key}`"))?
        .trim()
        .parse::<u64>()
        .with_context(|| format!("bad value for `{key}`"))
}

fn parse_optional_u32(
    map: &HashMap<String, String>,
    key: &str,
    default: u32,
) -> anyhow::Result<u32> {
    match map.get(key) {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse::<u32>()
            .with_context(|| format!("bad value for `{key}`")),
    }
}

fn parse_compression_flags(flags: &str, zeta_k: u32) -> Result<CompFlags> {
    let mut cf = CompFlags::default();
    for token in flags.split('|') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        match token {
            "OUTDEGREES_GAMMA" => cf.outdegrees = Code::Gamma,
            "OUTDEGREES_DELTA" => cf.outdegrees = Code::Delta,
            "BLOCKS_GAMMA" => cf.blocks = Code::Gamma,
            "BLOCKS_DELTA" => cf.blocks = Code::Delta,
            "RESIDUALS_GAMMA" => cf.residuals = Code::Gamma,
            "RESIDUALS_DELTA" => cf.residuals = Code::Delta,
            "RESIDUALS_ZETA" => cf.residuals = Code::Zeta { k: zeta_k },
            "RESIDUALS_NIBBLE" => cf.residuals = Code::Nibble,
            "REFERENCES_GAMMA" => cf.references = Code::Gamma,
            "REFERENCES_DELTA" => cf.references = Code::Delta,
            "REFERENCES_UNARY" => cf.references = Code::Unary,
            "BLOCK_COUNT_GAMMA" => cf.block_count = Code::Gamma,
            "BLOCK_COUNT_DELTA" => cf.block_count = Code::Delta,
            "BLOCK_COUNT_UNARY" => cf.block_count = Code::Unary,
            "OFFSETS_GAMMA" => cf.offsets = Code::Gamma,
            "OFFSETS_DELTA" => cf.offsets = Code::Delta,
            other => return Err(GraphError::PropertyCompressionFlagError(other.to_string())),
        }
    }
    Ok(cf)
}

/// Hand-rolled Java-properties-style parser: `#`/`!` comment lines, `:` or
/// `=` (or bare whitespace) as the key/value separator, trailing-backslash
/// line continuation, and `\\ \= \: \r \n \f \t` escapes.
fn parse_key_values(text: &str) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    let mut lines = text.lines().peekable();

    while let Some(raw_line) = lines.next() {
        let mut logical_line = raw_line.to_string();
        // Join continuation lines: a line ending in an odd number of
        // trailing backslashes continues onto the next physical line.
        while trailing_backslash_count(&logical_line) % 2 == 1 {
            logical_line.pop(); // drop the continuation backslash
            match lines.next() {
                Some(next) => logical_line.push_str(next.trim_start()),
                None => break,
            }
        }

        let trimmed = logical_line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
            continue;
        }

        let (key, value) = split_key_value(trimmed)?;
        map.insert(unescape(&key), unescape(&value));
    }

    Ok(map)
}

fn trailing_backslash_count(s: &str) -> usize {
    s.chars().rev().take_while(|&c| c == '\\').count()
}

fn split_key_value(line: &str) -> Result<(String, String)> {
    let bytes = line.as_bytes();
    let mut i = 0;
    let mut escaped = false;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == ':' || c == '=' || c.is_whitespace() {
            let key = &line[..i];
            let rest = line[i..].trim_start_matches([' ', '\t', ':', '=']);
            return Ok((key.to_string(), rest.trim().to_string()));
        }
        i += 1;
    }
    Ok((line.to_string(), String::new()))
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('\\') => out.push('\\'),
                Some('=') => out.push('='),
                Some(':') => out.push(':'),
                Some('r') => out.push('\r'),
                Some('n') => out.push('\n'),
                Some('f') => out.push('\u{000C}'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_properties() {
        let text = "nodes=10\narcs=20\n";
        let props = Properties::parse(text).unwrap();
        assert_eq!(props.nodes, 10);
        assert_eq!(props.arcs, 20);
        assert_eq!(props.window_size, 7);
        assert_eq!(props.min_interval_length, 3);
        assert!(matches!(props.comp_flags.residuals, Code::Zeta { k: 3 }));
    }

    #[test]
    fn parses_comments_and_continuation() {
        let text = "# a comment\n! another\nnodes : 5\narcs=\\\n7\n";
        let props = Properties::parse(text).unwrap();
        assert_eq!(props.nodes, 5);
        assert_eq!(props.arcs, 7);
    }

    #[test]
    fn rejects_unknown_compression_flag() {
        let text = "nodes=1\narcs=0\ncompressionflags=BOGUS_TOKEN\n";
        let err = Properties::parse(text).unwrap_err();
        assert_eq!(err.code(), 23);
    }

    #[test]
    fn rejects_bad_version() {
        let text = "nodes=1\narcs=0\nversion=1\n";
        let err = Properties::parse(text).unwrap_err();
        assert_eq!(err.code(), 22);
    }

    #[test]
    fn parses_compression_flags_overrides() {
        let text = "nodes=1\narcs=0\ncompressionflags=OUTDEGREES_DELTA|RESIDUALS_NIBBLE\n";
        let props = Properties::parse(text).unwrap();
        assert!(matches!(props.comp_flags.outdegrees, Code::Delta));
        assert!(matches!(props.comp_flags.residuals, Code::Nibble));
        assert!(matches!(props.comp_flags.references, Code::Unary));
    }
}
