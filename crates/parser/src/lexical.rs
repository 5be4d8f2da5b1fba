//! Line-oriented scanner for languages without a bundled grammar.
//!
//! Declarations are recognised with per-language patterns, brace depth tracks
//! which class and function a line belongs to (Ruby closes scopes at the `end`
//! aligned with their opener instead), and call sites are any `identifier(`
//! left after comments and string literals are removed.

use crate::imports::{extract_go_import_spec, extract_import};
use crate::language::Language;
use crate::types::{DeclKind, Declaration, Extraction, ImportStyle};
use once_cell::sync::Lazy;
use regex::Regex;

static CALL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("valid regex"));

static STRING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""(?:\\.|[^"\\])*"|'(?:\\.|[^'\\])*'|`[^`]*`"#).expect("valid regex")
});

/// A declaration pattern. Group `name` is the symbol, optional group `owner` its container.
struct DeclPattern {
    kind: DeclKind,
    regex: Regex,
    top_level_only: bool,
}

impl DeclPattern {
    fn new(kind: DeclKind, pattern: &str) -> Self {
        Self {
            kind,
            regex: Regex::new(pattern).expect("valid regex"),
            top_level_only: false,
        }
    }

    fn top_level(mut self) -> Self {
        self.top_level_only = true;
        self
    }
}

static GO_PATTERNS: Lazy<Vec<DeclPattern>> = Lazy::new(|| {
    vec![
        DeclPattern::new(
            DeclKind::Function,
            r"^func\s+\(\s*(?:\w+\s+)?\*?\s*(?P<owner>\w+)[^)]*\)\s*(?P<name>\w+)\s*[\[(]",
        ),
        DeclPattern::new(DeclKind::Function, r"^func\s+(?P<name>\w+)\s*[\[(]"),
        DeclPattern::new(DeclKind::Class, r"^type\s+(?P<name>\w+)(?:\[[^\]]*\])?\s+struct\b"),
        DeclPattern::new(DeclKind::Interface, r"^type\s+(?P<name>\w+)(?:\[[^\]]*\])?\s+interface\b"),
        DeclPattern::new(DeclKind::Type, r"^type\s+(?P<name>\w+)\s+\S"),
        DeclPattern::new(DeclKind::Variable, r"^(?:var|const)\s+(?P<name>\w+)\b").top_level(),
    ]
});

const MODIFIERS: &str = r"(?:(?:public|private|protected|internal|static|final|abstract|sealed|open|override|virtual|async|native|synchronized|extern|unsafe|partial|data|inline|suspend|fileprivate|mutating|required|convenience|readonly|export)\s+)*";

static JVM_PATTERNS: Lazy<Vec<DeclPattern>> = Lazy::new(|| {
    vec![
        DeclPattern::new(
            DeclKind::Type,
            &format!(r"^{MODIFIERS}enum\s+(?:class\s+)?(?P<name>[A-Za-z_]\w*)"),
        ),
        DeclPattern::new(
            DeclKind::Interface,
            &format!(r"^{MODIFIERS}(?:interface|protocol|@interface)\s+(?P<name>[A-Za-z_]\w*)"),
        ),
        DeclPattern::new(
            DeclKind::Class,
            &format!(r"^{MODIFIERS}(?:class|struct|record|object|actor)\s+(?P<name>[A-Za-z_]\w*)"),
        ),
        DeclPattern::new(
            DeclKind::Function,
            &format!(
                r"^{MODIFIERS}(?:fun|func)\s+(?:<[^>]*>\s*)?(?:(?P<owner>[A-Z]\w*)\.)?(?P<name>[A-Za-z_]\w*)\s*[(<]"
            ),
        ),
        DeclPattern::new(
            DeclKind::Function,
            &format!(
                r"^{MODIFIERS}(?:<[^>]*>\s*)?[\w<>\[\],.?]+\s+(?P<name>[A-Za-z_]\w*)\s*\([^;]*$"
            ),
        ),
        DeclPattern::new(
            DeclKind::Type,
            &format!(r"^{MODIFIERS}typealias\s+(?P<name>[A-Za-z_]\w*)"),
        ),
    ]
});

/// `def x = value` or `def x; ...; end`
static RUBY_ONE_LINE_DEF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^def\s+[\w.]+[?!]?\s*(?:\([^)]*\))?\s*(?:=[^=~>]|;.*\bend$)").expect("valid regex")
});

static RUBY_PATTERNS: Lazy<Vec<DeclPattern>> = Lazy::new(|| {
    vec![
        DeclPattern::new(
            DeclKind::Function,
            r"^def\s+(?:self\.)?(?P<name>[A-Za-z_]\w*[?!]?)",
        ),
        DeclPattern::new(DeclKind::Class, r"^class\s+(?:\w+::)*(?P<name>[A-Z]\w*)"),
        DeclPattern::new(DeclKind::Type, r"^module\s+(?:\w+::)*(?P<name>[A-Z]\w*)"),
    ]
});

static C_PATTERNS: Lazy<Vec<DeclPattern>> = Lazy::new(|| {
    vec![
        DeclPattern::new(
            DeclKind::Type,
            r"^(?:typedef\s+)?enum\s+(?:class\s+)?(?P<name>[A-Za-z_]\w*)",
        ),
        DeclPattern::new(
            DeclKind::Class,
            r"^(?:typedef\s+)?(?:struct|class|union)\s+(?P<name>[A-Za-z_]\w*)\s*(?:[:{]|$)",
        ),
        DeclPattern::new(
            DeclKind::Function,
            r"^(?:(?:static|inline|extern|virtual|constexpr|const)\s+)*[A-Za-z_][\w:<>,]*[\s\*&]+(?:(?P<owner>[A-Za-z_]\w*)::)?(?P<name>[A-Za-z_]\w*)\s*\([^;]*$",
        ),
        DeclPattern::new(
            DeclKind::Type,
            r"^typedef\s+.*\b(?P<name>[A-Za-z_]\w*)\s*;$",
        )
        .top_level(),
    ]
});

fn patterns_for(language: Language) -> &'static [DeclPattern] {
    match language {
        Language::Go => &GO_PATTERNS,
        Language::Java | Language::Kotlin | Language::CSharp | Language::Swift => &JVM_PATTERNS,
        Language::Ruby => &RUBY_PATTERNS,
        Language::C | Language::Cpp => &C_PATTERNS,
        _ => &[],
    }
}

/// Words that look like a return type followed by a call, such as `return foo(x)`
fn is_statement_keyword(word: &str) -> bool {
    matches!(
        word,
        "return" | "else" | "new" | "throw" | "await" | "case" | "goto" | "delete" | "yield"
    )
}

#[derive(Debug)]
struct OpenClass {
    name: String,
    index: usize,
    /// Brace depth of the class body
    body_depth: i32,
    indent: usize,
}

#[derive(Debug)]
struct OpenFunction {
    index: usize,
    /// Brace depth at the declaration line
    base_depth: i32,
    opened: bool,
    indent: usize,
}

/// Ruby's `end`, optionally followed by a comment
fn is_block_end(code: &str) -> bool {
    let mut words = code.split_whitespace();
    words.next() == Some("end") && words.next().map_or(true, |rest| rest.starts_with('#'))
}

/// Scan `source` line by line
pub(crate) fn extract(language: Language, source: &str) -> Extraction {
    let patterns = patterns_for(language);
    let c_style = language.comment_prefixes().contains(&"//");
    let line_comment = if c_style { "//" } else { "#" };
    let keyword_blocks = language == Language::Ruby;

    let mut out = Extraction::default();
    let mut depth: i32 = 0;
    let mut classes: Vec<OpenClass> = Vec::new();
    let mut function: Option<OpenFunction> = None;
    let mut in_block_comment = false;
    let mut in_go_imports = false;

    for (idx, raw) in source.lines().enumerate() {
        let line_no = u32::try_from(idx + 1).unwrap_or(u32::MAX);
        let mut line = raw.trim();

        if in_block_comment {
            match line.find("*/") {
                Some(end) => {
                    in_block_comment = false;
                    line = line[end + 2..].trim();
                }
                None => continue,
            }
        }
        if c_style && line.starts_with("/*") {
            match line.find("*/") {
                Some(end) => line = line[end + 2..].trim(),
                None => {
                    in_block_comment = true;
                    continue;
                }
            }
        }
        if line.is_empty() || (c_style && line.starts_with('*')) {
            continue;
        }
        if language.comment_prefixes().iter().any(|p| line.starts_with(p)) {
            continue;
        }

        if language == Language::Go {
            if in_go_imports {
                if line.starts_with(')') {
                    in_go_imports = false;
                } else if let Some(target) = extract_go_import_spec(line) {
                    out.import(target, ImportStyle::Module, line_no);
                }
                continue;
            }
            if line.starts_with("import (") || line == "import(" {
                in_go_imports = true;
                continue;
            }
        }

        if let Some((target, style)) = extract_import(language, line) {
            out.import(target, style, line_no);
            continue;
        }

        let without_strings = STRING_RE.replace_all(line, "\"\"");
        let code = match without_strings.find(line_comment) {
            Some(start) if c_style => &without_strings[..start],
            _ => &without_strings[..],
        };

        let indent = raw.len() - raw.trim_start().len();
        if keyword_blocks {
            if is_block_end(code) {
                if function.as_ref().is_some_and(|f| f.indent == indent) {
                    function = None;
                } else if classes.last().is_some_and(|class| class.indent == indent) {
                    classes.pop();
                }
                continue;
            }
            // a new definition closes anything left open at its level
            if matches!(code.split_whitespace().next(), Some("def" | "class" | "module")) {
                if function.as_ref().is_some_and(|f| f.indent >= indent) {
                    function = None;
                }
                while classes.last().is_some_and(|class| class.indent >= indent) {
                    classes.pop();
                }
            }
        } else {
            while classes.last().is_some_and(|class| depth < class.body_depth) {
                classes.pop();
            }
        }

        let mut declared_name = None;
        let mut one_liner = false;
        if let Some(declaration) = match_declaration(patterns, code, line_no, depth, classes.last()) {
            let kind = declaration.kind;
            let name = declaration.name.clone();
            let index = out.declare(declaration);
            match kind {
                DeclKind::Class | DeclKind::Interface | DeclKind::Type => {
                    classes.push(OpenClass {
                        name: name.clone(),
                        index,
                        body_depth: depth + 1,
                        indent,
                    });
                }
                DeclKind::Function => {
                    function = Some(OpenFunction {
                        index,
                        base_depth: depth,
                        opened: false,
                        indent,
                    });
                    one_liner = keyword_blocks && RUBY_ONE_LINE_DEF.is_match(code);
                }
                DeclKind::Variable => {}
            }
            declared_name = Some(name);
        }

        let scope = function
            .as_ref()
            .map(|f| f.index)
            .or_else(|| classes.last().map(|class| class.index));
        let mut skipped_own_name = false;
        for caps in CALL_RE.captures_iter(code) {
            let name = &caps[1];
            if !skipped_own_name && declared_name.as_deref() == Some(name) {
                skipped_own_name = true;
                continue;
            }
            out.call(name, line_no, scope);
        }

        let opens = i32::try_from(code.matches('{').count()).unwrap_or(i32::MAX);
        let closes = i32::try_from(code.matches('}').count()).unwrap_or(i32::MAX);
        depth = (depth + opens - closes).max(0);

        let function_ended = if keyword_blocks {
            one_liner
        } else {
            function.as_mut().is_some_and(|f| {
                if opens > 0 || depth > f.base_depth {
                    f.opened = true;
                }
                f.opened && depth <= f.base_depth
            })
        };
        if function_ended {
            function = None;
        }
    }

    out
}

fn match_declaration(
    patterns: &[DeclPattern],
    code: &str,
    line: u32,
    depth: i32,
    class: Option<&OpenClass>,
) -> Option<Declaration> {
    patterns.iter().find_map(|pattern| {
        if pattern.top_level_only && depth > 0 {
            return None;
        }
        let caps = pattern.regex.captures(code)?;
        let name = caps.name("name")?.as_str();
        if crate::keywords::is_not_a_call(name) || is_statement_keyword(name) {
            return None;
        }
        if code
            .split_whitespace()
            .next()
            .is_some_and(is_statement_keyword)
        {
            return None;
        }

        let owner = caps
            .name("owner")
            .map(|owner| owner.as_str().to_string())
            .or_else(|| class.map(|class| class.name.clone()));
        Some(Declaration::new(pattern.kind, name, line).in_container(owner))
    })
}
