//! Per-file symbol extraction for the code graph
//!
//! Every supported file yields its declarations (functions, classes, interfaces,
//! types, module-level variables) and the unresolved mentions it makes (imports
//! and call sites). Rust, Python, JavaScript and TypeScript are parsed with
//! tree-sitter grammars; the remaining languages go through a lexical scanner.
//! Failures never escape: a file that cannot be parsed comes back empty with a
//! [`ParseFailure`] attached.

mod error;
mod imports;
mod keywords;
mod language;
mod lexical;
mod structural;
mod types;

pub use error::{FailureReason, ParseFailure};
pub use language::Language;
pub use types::{DeclKind, Declaration, ImportStyle, Mention, ParsedFile};

/// Extract declarations and mentions from one file
pub fn parse_source(path: &str, language: Language, content: &str) -> ParsedFile {
    if content.contains('\0') {
        log::debug!("{path}: binary content, skipping extraction");
        return ParsedFile::failed(path, language, FailureReason::BinaryContent);
    }

    let extraction = if language.supports_ast() {
        structural::extract(language, path, content)
    } else if language == Language::Unknown {
        return ParsedFile::empty(path, language);
    } else {
        Ok(lexical::extract(language, content))
    };

    match extraction {
        Ok(extraction) => ParsedFile {
            path: path.to_string(),
            language,
            declarations: extraction.declarations,
            mentions: extraction.mentions,
            failure: None,
        },
        Err(reason) => {
            log::debug!("{path}: {reason}");
            ParsedFile::failed(path, language, reason)
        }
    }
}
