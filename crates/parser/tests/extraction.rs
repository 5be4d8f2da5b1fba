use codemap_parser::{
    parse_source, DeclKind, FailureReason, ImportStyle, Language, Mention, ParsedFile,
};
use pretty_assertions::assert_eq;

fn declared(parsed: &ParsedFile) -> Vec<(DeclKind, String)> {
    parsed
        .declarations
        .iter()
        .map(|decl| (decl.kind, decl.qualified_name()))
        .collect()
}

fn imports(parsed: &ParsedFile) -> Vec<(String, ImportStyle)> {
    parsed
        .mentions
        .iter()
        .filter_map(|mention| match mention {
            Mention::Import { target, style, .. } => Some((target.clone(), *style)),
            Mention::Call { .. } => None,
        })
        .collect()
}

/// Calls as (callee, qualified name of the enclosing declaration)
fn calls(parsed: &ParsedFile) -> Vec<(String, Option<String>)> {
    let mut calls: Vec<_> = parsed
        .mentions
        .iter()
        .filter_map(|mention| match mention {
            Mention::Call { name, scope, .. } => {
                let owner = scope.map(|idx| parsed.declarations[idx].qualified_name());
                Some((name.clone(), owner))
            }
            Mention::Import { .. } => None,
        })
        .collect();
    calls.sort();
    calls
}

#[test]
fn typescript_imports_and_scoped_calls() {
    let source = "import { g } from './b';\nexport function f() { g(); }\n";
    let parsed = parse_source("src/a.ts", Language::TypeScript, source);

    assert!(parsed.failure.is_none());
    assert_eq!(declared(&parsed), vec![(DeclKind::Function, "f".to_string())]);
    assert_eq!(
        imports(&parsed),
        vec![("./b".to_string(), ImportStyle::Relative)]
    );
    assert_eq!(calls(&parsed), vec![("g".to_string(), Some("f".to_string()))]);
}

#[test]
fn javascript_arrow_functions_requires_and_constructors() {
    let source = r#"
const util = require('./util');
const handler = async (req) => {
    const router = new Router();
    return render(req);
};
"#;
    let parsed = parse_source("server.js", Language::JavaScript, source);

    assert_eq!(
        declared(&parsed),
        vec![
            (DeclKind::Variable, "util".to_string()),
            (DeclKind::Function, "handler".to_string()),
        ]
    );
    assert_eq!(
        imports(&parsed),
        vec![("./util".to_string(), ImportStyle::Relative)]
    );
    assert_eq!(
        calls(&parsed),
        vec![
            ("Router".to_string(), Some("handler".to_string())),
            ("render".to_string(), Some("handler".to_string())),
        ]
    );
}

#[test]
fn python_classes_methods_and_relative_imports() {
    let source = r#"
from .models import User
import os.path as p

class Repo:
    def save(self, user):
        validate(user)
        self.store.put(user)

DEFAULT = Repo()
"#;
    let parsed = parse_source("pkg/repo.py", Language::Python, source);

    assert_eq!(
        declared(&parsed),
        vec![
            (DeclKind::Class, "Repo".to_string()),
            (DeclKind::Function, "Repo.save".to_string()),
            (DeclKind::Variable, "DEFAULT".to_string()),
        ]
    );
    assert_eq!(
        imports(&parsed),
        vec![
            (".models".to_string(), ImportStyle::Relative),
            ("os.path".to_string(), ImportStyle::Module),
        ]
    );
    assert_eq!(
        calls(&parsed),
        vec![
            ("Repo".to_string(), Some("DEFAULT".to_string())),
            ("put".to_string(), Some("Repo.save".to_string())),
            ("validate".to_string(), Some("Repo.save".to_string())),
        ]
    );
}

#[test]
fn rust_impl_blocks_scope_methods_under_their_type() {
    let source = r#"
mod config;
use crate::store::{Store, MemoryStore};

pub struct Engine {
    store: Store,
}

impl Engine {
    pub fn run(&self) -> usize {
        let n = helper(1);
        self.store.flush();
        Store::open().count() + n
    }
}

fn helper(x: usize) -> usize {
    x
}
"#;
    let parsed = parse_source("src/engine.rs", Language::Rust, source);

    assert_eq!(
        declared(&parsed),
        vec![
            (DeclKind::Class, "Engine".to_string()),
            (DeclKind::Function, "Engine.run".to_string()),
            (DeclKind::Function, "helper".to_string()),
        ]
    );
    assert_eq!(
        imports(&parsed),
        vec![
            ("config".to_string(), ImportStyle::Submodule),
            ("crate::store".to_string(), ImportStyle::Module),
        ]
    );
    let run = Some("Engine.run".to_string());
    assert_eq!(
        calls(&parsed),
        vec![
            ("count".to_string(), run.clone()),
            ("flush".to_string(), run.clone()),
            ("helper".to_string(), run.clone()),
            ("open".to_string(), run),
        ]
    );
}

#[test]
fn go_files_go_through_the_lexical_scanner() {
    let source = "package main\n\nimport \"github.com/acme/app/server\"\n\nfunc main() {\n    server.Run()\n}\n";
    let parsed = parse_source("cmd/main.go", Language::Go, source);

    assert_eq!(declared(&parsed), vec![(DeclKind::Function, "main".to_string())]);
    assert_eq!(
        imports(&parsed),
        vec![(
            "github.com/acme/app/server".to_string(),
            ImportStyle::Module
        )]
    );
    assert_eq!(calls(&parsed), vec![("Run".to_string(), Some("main".to_string()))]);
}

#[test]
fn binary_content_is_reported_not_thrown() {
    let parsed = parse_source("assets/logo.ts", Language::TypeScript, "GIF89a\0\0\u{1}");

    assert_eq!(
        parsed.failure.as_ref().map(|failure| failure.reason),
        Some(FailureReason::BinaryContent)
    );
    assert!(parsed.declarations.is_empty());
    assert!(parsed.mentions.is_empty());
}

#[test]
fn unknown_languages_yield_an_empty_file() {
    let parsed = parse_source("README", Language::Unknown, "fn main() { run(); }");

    assert!(parsed.failure.is_none());
    assert!(parsed.declarations.is_empty());
    assert!(parsed.mentions.is_empty());
}

#[test]
fn garbage_never_produces_partial_symbols_with_a_failure() {
    let parsed = parse_source("broken.rs", Language::Rust, "}}}}}}}}}}}}}}}}}}}} ))))) ]]]]]");

    if let Some(failure) = &parsed.failure {
        assert_eq!(failure.reason, FailureReason::SyntaxUnrecoverable);
        assert!(parsed.declarations.is_empty());
    }
    assert!(!parsed
        .mentions
        .iter()
        .any(|mention| matches!(mention, Mention::Import { .. })));
}
