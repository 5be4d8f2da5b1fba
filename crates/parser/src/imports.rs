use crate::language::Language;
use crate::types::ImportStyle;
use once_cell::sync::Lazy;
use regex::Regex;

static JVM_IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^import\s+(?:static\s+)?([A-Za-z_][\w.]*)").expect("valid regex"));

static CSHARP_USING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^using\s+(?:static\s+)?(?:\w+\s*=\s*)?([A-Za-z_][\w.]*)\s*;").expect("valid regex")
});

static SWIFT_IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^import\s+(?:\w+\s+)?([A-Za-z_][\w.]*)").expect("valid regex"));

static RUBY_REQUIRE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(require|require_relative|load)\s*\(?\s*['"]([^'"]+)['"]"#).expect("valid regex")
});

static C_INCLUDE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^#\s*include\s*"([^"]+)""#).expect("valid regex"));

static GO_SINGLE_IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^import\s+(?:[\w.]+\s+)?"([^"]+)""#).expect("valid regex"));

static GO_SPEC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^(?:[\w.]+\s+)?"([^"]+)""#).expect("valid regex"));

/// Remove surrounding quotes from a string literal
pub(crate) fn strip_quotes(literal: &str) -> &str {
    literal
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
}

/// Classify a JS/TS/Ruby/C style specifier
pub(crate) fn specifier_style(specifier: &str) -> ImportStyle {
    if specifier.starts_with('.') || specifier.starts_with('/') {
        ImportStyle::Relative
    } else {
        ImportStyle::Module
    }
}

/// Module path named by a Rust `use` argument
///
/// `crate::a::b::{C, D}` -> `crate::a::b`, `super::x as y` -> `super::x`, `a::*` -> `a`
pub(crate) fn rust_use_path(argument: &str) -> String {
    let mut path = argument.trim();
    if let Some(idx) = path.find('{') {
        path = &path[..idx];
    }
    if let Some(idx) = path.find(" as ") {
        path = &path[..idx];
    }
    let path = path.trim().trim_end_matches('*').trim_end_matches("::");
    path.split_whitespace().collect()
}

/// Import target declared on a single line, for languages scanned lexically
pub(crate) fn extract_import(language: Language, line: &str) -> Option<(String, ImportStyle)> {
    let line = line.trim();
    match language {
        Language::Java | Language::Kotlin => JVM_IMPORT_RE.captures(line).map(|caps| {
            let target = caps[1].trim_end_matches(".*").trim_end_matches('.');
            (target.to_string(), ImportStyle::Module)
        }),
        Language::CSharp => CSHARP_USING_RE
            .captures(line)
            .map(|caps| (caps[1].to_string(), ImportStyle::Module)),
        Language::Swift => SWIFT_IMPORT_RE
            .captures(line)
            .map(|caps| (caps[1].to_string(), ImportStyle::Module)),
        Language::Ruby => RUBY_REQUIRE_RE.captures(line).map(|caps| {
            let target = caps[2].to_string();
            if &caps[1] == "require_relative" && !target.starts_with('.') {
                (format!("./{target}"), ImportStyle::Relative)
            } else {
                let style = specifier_style(&target);
                (target, style)
            }
        }),
        Language::C | Language::Cpp => C_INCLUDE_RE.captures(line).map(|caps| {
            let target = &caps[1];
            if target.starts_with('.') {
                (target.to_string(), ImportStyle::Relative)
            } else {
                (format!("./{target}"), ImportStyle::Relative)
            }
        }),
        Language::Go => GO_SINGLE_IMPORT_RE
            .captures(line)
            .map(|caps| (caps[1].to_string(), ImportStyle::Module)),
        _ => None,
    }
}

/// One entry of a Go `import ( ... )` block
pub(crate) fn extract_go_import_spec(line: &str) -> Option<String> {
    GO_SPEC_RE
        .captures(line.trim())
        .map(|caps| caps[1].to_string())
}
