//! Effect declarations and their taint source/sink mapping
//!
//! Functions declare effects as strings. Two spellings are accepted and map
//! identically:
//!
//! - short form `resource:access`, e.g. `db:w`, `net:r`, `fs:rw`
//! - the binder's normalized form `category:resource_access`, e.g.
//!   `io:database_write`, `console:stdin_read`
//!
//! Resources are grouped into families by alias or substring. Read access
//! makes an effect a taint source, write access a sink, read-write both.

use serde::{Deserialize, Serialize};

use crate::diagnostics::DiagnosticCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessMode {
    Read,
    Write,
    ReadWrite,
}

impl AccessMode {
    pub fn reads(self) -> bool {
        matches!(self, AccessMode::Read | AccessMode::ReadWrite)
    }

    pub fn writes(self) -> bool {
        matches!(self, AccessMode::Write | AccessMode::ReadWrite)
    }

    fn suffix(self) -> &'static str {
        match self {
            AccessMode::Read => "read",
            AccessMode::Write => "write",
            AccessMode::ReadWrite => "readwrite",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectKind {
    Io,
    Process,
    Memory,
    Console,
}

impl EffectKind {
    fn category(self) -> &'static str {
        match self {
            EffectKind::Io => "io",
            EffectKind::Process => "process",
            EffectKind::Memory => "memory",
            EffectKind::Console => "console",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaintSource {
    UserInput,
    NetworkInput,
    FileRead,
    DatabaseResult,
    Environment,
}

impl std::fmt::Display for TaintSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaintSource::UserInput => "user input",
            TaintSource::NetworkInput => "network input",
            TaintSource::FileRead => "file read",
            TaintSource::DatabaseResult => "database result",
            TaintSource::Environment => "environment",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaintSink {
    SqlQuery,
    CommandExecution,
    FilePath,
    UrlRedirect,
    HtmlOutput,
}

impl TaintSink {
    pub fn code(self) -> DiagnosticCode {
        sink_diagnostic_code(self)
    }
}

impl std::fmt::Display for TaintSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaintSink::SqlQuery => "SQL query",
            TaintSink::CommandExecution => "command execution",
            TaintSink::FilePath => "file path",
            TaintSink::UrlRedirect => "URL redirect",
            TaintSink::HtmlOutput => "HTML output",
        };
        write!(f, "{name}")
    }
}

/// Each sink has exactly one diagnostic code
pub fn sink_diagnostic_code(sink: TaintSink) -> DiagnosticCode {
    match sink {
        TaintSink::SqlQuery => DiagnosticCode::SqlInjection,
        TaintSink::CommandExecution => DiagnosticCode::CommandInjection,
        TaintSink::FilePath => DiagnosticCode::PathTraversal,
        TaintSink::UrlRedirect => DiagnosticCode::OpenRedirect,
        TaintSink::HtmlOutput => DiagnosticCode::CrossSiteScripting,
    }
}

// ============================================================================
// Resource families
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Database,
    FileSystem,
    Network,
    Html,
    Process,
    Console,
    Environment,
    Memory,
}

/// Checked in order; the first family with a matching alias wins
const FAMILIES: &[(Family, &[&str])] = &[
    (Family::Database, &["db", "database", "sql"]),
    (Family::FileSystem, &["fs", "filesystem", "file"]),
    (Family::Network, &["net", "network", "http"]),
    (Family::Html, &["html", "web", "response"]),
    (Family::Process, &["process", "system", "exec", "shell"]),
    (Family::Console, &["console", "stdin", "input", "terminal"]),
    (Family::Environment, &["env", "environment"]),
    (Family::Memory, &["memory", "mem", "heap"]),
];

const CATEGORIES: &[&str] = &["io", "process", "memory", "console", "fs", "net", "db", "env"];

fn family_of(resource: &str) -> Option<Family> {
    let resource = resource.to_ascii_lowercase();
    FAMILIES
        .iter()
        .find(|(_, aliases)| aliases.iter().any(|alias| resource == *alias || resource.contains(alias)))
        .map(|(family, _)| *family)
}

fn kind_of(family: Option<Family>) -> EffectKind {
    match family {
        Some(Family::Process | Family::Environment) => EffectKind::Process,
        Some(Family::Console) => EffectKind::Console,
        Some(Family::Memory) => EffectKind::Memory,
        _ => EffectKind::Io,
    }
}

fn sink_for(family: Family) -> Option<TaintSink> {
    match family {
        Family::Database => Some(TaintSink::SqlQuery),
        Family::FileSystem => Some(TaintSink::FilePath),
        Family::Network => Some(TaintSink::UrlRedirect),
        Family::Html => Some(TaintSink::HtmlOutput),
        Family::Process => Some(TaintSink::CommandExecution),
        Family::Console | Family::Environment | Family::Memory => None,
    }
}

fn source_for(family: Family) -> Option<TaintSource> {
    match family {
        Family::Database => Some(TaintSource::DatabaseResult),
        Family::FileSystem => Some(TaintSource::FileRead),
        Family::Network => Some(TaintSource::NetworkInput),
        Family::Console => Some(TaintSource::UserInput),
        Family::Environment => Some(TaintSource::Environment),
        Family::Html | Family::Process | Family::Memory => None,
    }
}

// ============================================================================
// Declarations
// ============================================================================

/// A parsed effect: which resource, how it is accessed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EffectDeclaration {
    /// Lower-cased resource name
    pub resource: String,
    pub access: AccessMode,
    pub kind: EffectKind,
}

impl EffectDeclaration {
    pub fn new(resource: impl Into<String>, access: AccessMode) -> Self {
        let resource = resource.into().to_ascii_lowercase();
        let kind = kind_of(family_of(&resource));
        Self { resource, access, kind }
    }

    /// Taint sink this effect writes to, if any
    pub fn sink(&self) -> Option<TaintSink> {
        if self.kind == EffectKind::Memory || !self.access.writes() {
            return None;
        }
        family_of(&self.resource).and_then(sink_for)
    }

    /// Taint source this effect reads from, if any
    pub fn source(&self) -> Option<TaintSource> {
        if self.kind == EffectKind::Memory || !self.access.reads() {
            return None;
        }
        family_of(&self.resource).and_then(source_for)
    }
}

impl std::fmt::Display for EffectDeclaration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}_{}", self.kind.category(), self.resource, self.access.suffix())
    }
}

fn parse_short_access(access: &str) -> Option<AccessMode> {
    match access.to_ascii_lowercase().as_str() {
        "r" => Some(AccessMode::Read),
        "w" => Some(AccessMode::Write),
        "rw" => Some(AccessMode::ReadWrite),
        _ => None,
    }
}

/// Split `database_write` into (`database`, Write)
fn split_access_suffix(value: &str) -> Option<(&str, AccessMode)> {
    let lower = value.to_ascii_lowercase();
    let (cut, access) = if lower.ends_with("_readwrite") {
        ("_readwrite".len(), AccessMode::ReadWrite)
    } else if lower.ends_with("_write") {
        ("_write".len(), AccessMode::Write)
    } else if lower.ends_with("_read") {
        ("_read".len(), AccessMode::Read)
    } else {
        return None;
    };
    let resource = &value[..value.len() - cut];
    if resource.is_empty() {
        None
    } else {
        Some((resource, access))
    }
}

/// Parse an effect string in either accepted spelling.
///
/// Malformed strings (no colon, extra segments, empty parts, unknown access)
/// yield `None` and are skipped by callers.
pub fn parse_effect(effect: &str) -> Option<EffectDeclaration> {
    let mut parts = effect.split(':');
    let head = parts.next()?.trim();
    let tail = parts.next()?.trim();
    if parts.next().is_some() || head.is_empty() || tail.is_empty() {
        return None;
    }

    if let Some(access) = parse_short_access(tail) {
        return Some(EffectDeclaration::new(head, access));
    }

    let category = head.to_ascii_lowercase();
    if !CATEGORIES.contains(&category.as_str()) {
        return None;
    }
    let (resource, access) = split_access_suffix(tail)?;
    let mut declaration = EffectDeclaration::new(resource, access);
    if category == "memory" {
        declaration.kind = EffectKind::Memory;
    }
    Some(declaration)
}

/// Map a `resource_access` value of the given kind to a sink
pub fn map_effect_to_sink(kind: EffectKind, value: &str) -> Option<TaintSink> {
    if kind == EffectKind::Memory {
        return None;
    }
    let (resource, access) = split_access_suffix(value)?;
    EffectDeclaration::new(resource, access).sink()
}

/// Map a `resource_access` value of the given kind to a source
pub fn map_effect_to_source(kind: EffectKind, value: &str) -> Option<TaintSource> {
    if kind == EffectKind::Memory {
        return None;
    }
    let (resource, access) = split_access_suffix(value)?;
    EffectDeclaration::new(resource, access).source()
}

fn distinct<T: PartialEq>(items: impl Iterator<Item = T>) -> Vec<T> {
    let mut out = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

/// Distinct sinks declared by `effects`, in first-seen order
pub fn get_sinks_from_effects<I, S>(effects: I) -> Vec<TaintSink>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    distinct(
        effects
            .into_iter()
            .filter_map(|e| parse_effect(e.as_ref()))
            .filter_map(|d| d.sink()),
    )
}

/// Distinct sources declared by `effects`, in first-seen order
pub fn get_sources_from_effects<I, S>(effects: I) -> Vec<TaintSource>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    distinct(
        effects
            .into_iter()
            .filter_map(|e| parse_effect(e.as_ref()))
            .filter_map(|d| d.source()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Parsing
    // ========================================================================

    #[test]
    fn test_parse_short_form() {
        let d = parse_effect("DB:W").unwrap();
        assert_eq!(d.resource, "db");
        assert_eq!(d.access, AccessMode::Write);
        assert_eq!(d.kind, EffectKind::Io);

        assert_eq!(parse_effect("net:r").map(|d| d.access), Some(AccessMode::Read));
        assert_eq!(parse_effect("fs:Rw").map(|d| d.access), Some(AccessMode::ReadWrite));
        assert_eq!(parse_effect("shell:w").map(|d| d.kind), Some(EffectKind::Process));
        assert_eq!(parse_effect("stdin:r").map(|d| d.kind), Some(EffectKind::Console));
        assert_eq!(parse_effect("env:r").map(|d| d.kind), Some(EffectKind::Process));
    }

    #[test]
    fn test_parse_normalized_form() {
        let d = parse_effect("io:database_write").unwrap();
        assert_eq!(d.resource, "database");
        assert_eq!(d.access, AccessMode::Write);
        assert_eq!(d.to_string(), "io:database_write");

        let d = parse_effect("console:stdin_read").unwrap();
        assert_eq!(d.kind, EffectKind::Console);
        assert_eq!(d.source(), Some(TaintSource::UserInput));

        let d = parse_effect("memory:buffer_readwrite").unwrap();
        assert_eq!(d.kind, EffectKind::Memory);
    }

    #[test]
    fn test_parse_malformed() {
        for bad in ["", "db", "db:", ":w", "db:w:x", "db:x", "io:database", "bogus:database_write", "io:_write"] {
            assert!(parse_effect(bad).is_none(), "{bad:?} should not parse");
        }
    }

    // ========================================================================
    // Mapping
    // ========================================================================

    #[test]
    fn test_map_effect_to_sink() {
        assert_eq!(map_effect_to_sink(EffectKind::Io, "database_write"), Some(TaintSink::SqlQuery));
        assert_eq!(map_effect_to_sink(EffectKind::Io, "database_read"), None);
        assert_eq!(map_effect_to_sink(EffectKind::Io, "file_readwrite"), Some(TaintSink::FilePath));
        assert_eq!(map_effect_to_sink(EffectKind::Process, "exec_write"), Some(TaintSink::CommandExecution));
        assert_eq!(map_effect_to_sink(EffectKind::Io, "web_write"), Some(TaintSink::HtmlOutput));
        assert_eq!(map_effect_to_sink(EffectKind::Memory, "database_write"), None);
        assert_eq!(map_effect_to_sink(EffectKind::Io, "unicorn_write"), None);
    }

    #[test]
    fn test_map_effect_to_source() {
        assert_eq!(map_effect_to_source(EffectKind::Io, "http_read"), Some(TaintSource::NetworkInput));
        assert_eq!(map_effect_to_source(EffectKind::Io, "http_write"), None);
        assert_eq!(map_effect_to_source(EffectKind::Console, "terminal_read"), Some(TaintSource::UserInput));
        assert_eq!(map_effect_to_source(EffectKind::Process, "environment_read"), Some(TaintSource::Environment));
        assert_eq!(map_effect_to_source(EffectKind::Io, "response_read"), None);
    }

    #[test]
    fn test_substring_matching() {
        assert_eq!(parse_effect("mongodb:w").and_then(|d| d.sink()), Some(TaintSink::SqlQuery));
        assert_eq!(parse_effect("configfile:r").and_then(|d| d.source()), Some(TaintSource::FileRead));
    }

    #[test]
    fn test_short_and_normalized_forms_agree() {
        let pairs = [
            ("db:w", "io:database_write"),
            ("net:r", "io:network_read"),
            ("fs:rw", "fs:file_readwrite"),
            ("process:w", "process:shell_write"),
        ];
        for (short, normalized) in pairs {
            let a = parse_effect(short).unwrap();
            let b = parse_effect(normalized).unwrap();
            assert_eq!(a.sink(), b.sink(), "{short} vs {normalized}");
            assert_eq!(a.source(), b.source(), "{short} vs {normalized}");
        }
    }

    #[test]
    fn test_memory_never_maps() {
        let d = parse_effect("heap:rw").unwrap();
        assert_eq!(d.kind, EffectKind::Memory);
        assert!(d.sink().is_none());
        assert!(d.source().is_none());
    }

    #[test]
    fn test_sinks_are_distinct() {
        assert_eq!(get_sinks_from_effects(["db:w", "database:w", "sql:rw"]), vec![TaintSink::SqlQuery]);
        assert_eq!(
            get_sinks_from_effects(["html:w", "db:r", "shell:w", "web:w"]),
            vec![TaintSink::HtmlOutput, TaintSink::CommandExecution]
        );
    }

    #[test]
    fn test_sources_skip_malformed_and_write_only() {
        let effects = vec!["net:r".to_string(), "garbage".to_string(), "db:w".to_string(), "stdin:r".to_string()];
        assert_eq!(
            get_sources_from_effects(&effects),
            vec![TaintSource::NetworkInput, TaintSource::UserInput]
        );
    }

    #[test]
    fn test_every_sink_has_a_taint_code() {
        for sink in [
            TaintSink::SqlQuery,
            TaintSink::CommandExecution,
            TaintSink::FilePath,
            TaintSink::UrlRedirect,
            TaintSink::HtmlOutput,
        ] {
            assert!(sink_diagnostic_code(sink).is_taint());
        }
        assert_eq!(TaintSink::UrlRedirect.code(), DiagnosticCode::OpenRedirect);
    }
}
