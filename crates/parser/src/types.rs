use crate::error::{FailureReason, ParseFailure};
use crate::language::Language;
use serde::{Deserialize, Serialize};

/// Kind of a declared symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclKind {
    Function,
    Class,
    Interface,
    Type,
    Variable,
}

impl DeclKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Type => "type",
            Self::Variable => "variable",
        }
    }
}

/// A symbol declared in a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub kind: DeclKind,
    pub name: String,
    /// 1-based line of the declaration
    pub line: u32,
    /// Enclosing class, impl or trait
    pub container: Option<String>,
}

impl Declaration {
    pub fn new(kind: DeclKind, name: impl Into<String>, line: u32) -> Self {
        Self {
            kind,
            name: name.into(),
            line,
            container: None,
        }
    }

    #[must_use]
    pub fn in_container(mut self, container: Option<String>) -> Self {
        self.container = container;
        self
    }

    /// `Container.name` for members, `name` otherwise
    pub fn qualified_name(&self) -> String {
        match &self.container {
            Some(container) => format!("{container}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// How an import target should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportStyle {
    /// Path specifier relative to the importing file (`./b`, `../lib/x`)
    Relative,
    /// Module path or bare specifier (`a.b.c`, `crate::a::b`, `@/lib/x`)
    Module,
    /// Rust `mod name;`
    Submodule,
}

/// An unresolved reference found in a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mention {
    Import {
        target: String,
        style: ImportStyle,
        line: u32,
    },
    Call {
        name: String,
        line: u32,
        /// Index into the file's declarations of the enclosing symbol; `None` is file scope
        scope: Option<usize>,
    },
}

/// Everything the parser extracted from one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFile {
    pub path: String,
    pub language: Language,
    pub declarations: Vec<Declaration>,
    pub mentions: Vec<Mention>,
    pub failure: Option<ParseFailure>,
}

impl ParsedFile {
    pub fn empty(path: impl Into<String>, language: Language) -> Self {
        Self {
            path: path.into(),
            language,
            declarations: Vec::new(),
            mentions: Vec::new(),
            failure: None,
        }
    }

    /// File-only result carrying the failure reason
    pub fn failed(path: impl Into<String>, language: Language, reason: FailureReason) -> Self {
        let path = path.into();
        Self {
            failure: Some(ParseFailure {
                path: path.clone(),
                reason,
            }),
            ..Self::empty(path, language)
        }
    }
}

/// Declarations and mentions produced by one extraction strategy
#[derive(Debug, Default)]
pub(crate) struct Extraction {
    pub declarations: Vec<Declaration>,
    pub mentions: Vec<Mention>,
}

impl Extraction {
    pub fn declare(&mut self, declaration: Declaration) -> usize {
        self.declarations.push(declaration);
        self.declarations.len() - 1
    }

    pub fn import(&mut self, target: impl Into<String>, style: ImportStyle, line: u32) {
        let target = target.into();
        if target.is_empty() {
            return;
        }
        self.mentions.push(Mention::Import {
            target,
            style,
            line,
        });
    }

    pub fn call(&mut self, name: &str, line: u32, scope: Option<usize>) {
        if name.is_empty() || crate::keywords::is_not_a_call(name) {
            return;
        }
        self.mentions.push(Mention::Call {
            name: name.to_string(),
            line,
            scope,
        });
    }
}
