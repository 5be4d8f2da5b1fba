use serde::{Deserialize, Serialize};
use std::path::Path;

/// Source language of a repository file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    Java,
    Kotlin,
    CSharp,
    Ruby,
    Swift,
    C,
    Cpp,
    Unknown,
}

impl Language {
    /// Detect language from file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "rs" => Self::Rust,
            "py" | "pyw" | "pyi" => Self::Python,
            "js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
            "ts" | "tsx" | "mts" | "cts" => Self::TypeScript,
            "go" => Self::Go,
            "java" => Self::Java,
            "kt" | "kts" => Self::Kotlin,
            "cs" => Self::CSharp,
            "rb" => Self::Ruby,
            "swift" => Self::Swift,
            "c" | "h" => Self::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => Self::Cpp,
            _ => Self::Unknown,
        }
    }

    /// Detect language from file path
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(Self::Unknown, Self::from_extension)
    }

    /// Interpret a language tag as reported by a repository host
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "rust" | "rs" => Self::Rust,
            "python" | "py" => Self::Python,
            "javascript" | "js" | "jsx" => Self::JavaScript,
            "typescript" | "ts" | "tsx" => Self::TypeScript,
            "go" | "golang" => Self::Go,
            "java" => Self::Java,
            "kotlin" | "kt" => Self::Kotlin,
            "csharp" | "c#" | "cs" => Self::CSharp,
            "ruby" | "rb" => Self::Ruby,
            "swift" => Self::Swift,
            "c" => Self::C,
            "cpp" | "c++" | "cxx" => Self::Cpp,
            _ => Self::Unknown,
        }
    }

    /// Prefer a recognised tag, fall back to the file extension
    pub fn detect(tag: &str, path: impl AsRef<Path>) -> Self {
        match Self::from_tag(tag) {
            Self::Unknown => Self::from_path(path),
            language => language,
        }
    }

    /// Get language name as string
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Go => "go",
            Self::Java => "java",
            Self::Kotlin => "kotlin",
            Self::CSharp => "csharp",
            Self::Ruby => "ruby",
            Self::Swift => "swift",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::Unknown => "unknown",
        }
    }

    /// Check if this language is parsed structurally with a tree-sitter grammar
    pub const fn supports_ast(self) -> bool {
        matches!(
            self,
            Self::Rust | Self::Python | Self::JavaScript | Self::TypeScript
        )
    }

    /// Get Tree-sitter language instance. `tsx` selects the TSX dialect for TypeScript.
    pub fn tree_sitter_language(self, tsx: bool) -> Option<tree_sitter::Language> {
        match self {
            Self::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            Self::Python => Some(tree_sitter_python::LANGUAGE.into()),
            Self::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            Self::TypeScript if tsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
            Self::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            _ => None,
        }
    }

    /// Line comment prefixes used by the lexical scanner
    pub fn comment_prefixes(self) -> &'static [&'static str] {
        match self {
            Self::Rust
            | Self::JavaScript
            | Self::TypeScript
            | Self::Go
            | Self::Java
            | Self::C
            | Self::Cpp
            | Self::CSharp
            | Self::Swift
            | Self::Kotlin => &["//", "/*", "*"],
            Self::Python | Self::Ruby => &["#"],
            Self::Unknown => &[],
        }
    }

    /// File extensions tried when a module path or extensionless import is mapped to a file
    pub fn module_extensions(self) -> &'static [&'static str] {
        match self {
            Self::Rust => &["rs"],
            Self::Python => &["py", "pyi"],
            Self::JavaScript | Self::TypeScript => &["ts", "tsx", "js", "jsx", "mjs", "cjs"],
            Self::Go => &["go"],
            Self::Java => &["java"],
            Self::Kotlin => &["kt", "kts"],
            Self::CSharp => &["cs"],
            Self::Ruby => &["rb"],
            Self::Swift => &["swift"],
            Self::C | Self::Cpp => &["h", "hpp", "c", "cc", "cpp"],
            Self::Unknown => &[],
        }
    }

    /// Separator between segments of a module path (`a.b.c`, `a::b::c`)
    pub const fn module_separator(self) -> &'static str {
        match self {
            Self::Rust => "::",
            Self::Go | Self::Ruby | Self::C | Self::Cpp => "/",
            _ => ".",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
