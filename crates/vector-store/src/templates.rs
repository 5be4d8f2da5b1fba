use crate::error::{EmbeddingError, Result};
use codemap_graph::{text::split_words, CodeNode};
use serde::{Deserialize, Serialize};

/// Text templates rendered before embedding.
///
/// Placeholders use `{name}`; `{{` and `}}` escape literal braces.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingTemplates {
    /// Upper bound on rendered bytes, cut at a char boundary
    pub max_chars: usize,
    pub query: String,
    pub node: String,
}

impl Default for EmbeddingTemplates {
    fn default() -> Self {
        Self {
            max_chars: 2048,
            query: "{text}".to_string(),
            node: "{kind} {label} ({words}) in {path}".to_string(),
        }
    }
}

const ALLOWED_PLACEHOLDERS: &str = "text, label, kind, path, directory, language, words";

fn is_allowed_placeholder(name: &str) -> bool {
    matches!(
        name,
        "text" | "label" | "kind" | "path" | "directory" | "language" | "words"
    )
}

impl EmbeddingTemplates {
    pub fn validate(&self) -> Result<()> {
        if !(64..=200_000).contains(&self.max_chars) {
            return Err(EmbeddingError::Template(format!(
                "max_chars must be in [64, 200000] (got {})",
                self.max_chars
            )));
        }
        for template in [self.query.as_str(), self.node.as_str()] {
            for name in extract_placeholders(template)? {
                if !is_allowed_placeholder(&name) {
                    return Err(unsupported(&name));
                }
            }
        }
        Ok(())
    }

    pub fn render_query(&self, text: &str) -> Result<String> {
        render_template(&self.query, self.max_chars, |key| match key {
            "text" => Some(text),
            _ => None,
        })
    }

    pub fn render_node(&self, node: &CodeNode) -> Result<String> {
        let words = split_words(&node.label).join(" ");

        render_template(&self.node, self.max_chars, |key| match key {
            "text" | "label" => Some(node.label.as_str()),
            "kind" => Some(node.kind.as_str()),
            "path" => Some(node.file_path.as_str()),
            "directory" => Some(node.directory.as_str()),
            "language" => Some(node.language.as_str()),
            "words" => Some(words.as_str()),
            _ => None,
        })
    }
}

fn unsupported(name: &str) -> EmbeddingError {
    EmbeddingError::Template(format!(
        "unsupported placeholder '{{{name}}}'. Allowed: {ALLOWED_PLACEHOLDERS}"
    ))
}

/// Read a placeholder name after its opening brace
fn read_placeholder(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<String> {
    let mut name = String::new();
    loop {
        match chars.next() {
            Some('}') => break,
            Some('{') => {
                return Err(EmbeddingError::Template(
                    "nested '{' inside placeholder".into(),
                ));
            }
            Some(c) => name.push(c),
            None => {
                return Err(EmbeddingError::Template(
                    "unterminated '{...}' placeholder".into(),
                ));
            }
        }
    }
    let name = name.trim();
    if name.is_empty() {
        return Err(EmbeddingError::Template("empty placeholder '{}'".into()));
    }
    Ok(name.to_string())
}

fn extract_placeholders(template: &str) -> Result<Vec<String>> {
    let mut placeholders = Vec::new();
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
            }
            '{' => placeholders.push(read_placeholder(&mut chars)?),
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
            }
            '}' => return Err(EmbeddingError::Template("stray '}'".into())),
            _ => {}
        }
    }
    Ok(placeholders)
}

fn render_template<'a>(
    template: &str,
    max_chars: usize,
    resolve: impl Fn(&str) -> Option<&'a str>,
) -> Result<String> {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        if out.len() >= max_chars {
            break;
        }
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                push_bounded(&mut out, "{", max_chars);
            }
            '{' => {
                let name = read_placeholder(&mut chars)?;
                if !is_allowed_placeholder(&name) {
                    return Err(unsupported(&name));
                }
                push_bounded(&mut out, resolve(&name).unwrap_or(""), max_chars);
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                push_bounded(&mut out, "}", max_chars);
            }
            '}' => return Err(EmbeddingError::Template("stray '}'".into())),
            other => {
                let mut buf = [0u8; 4];
                push_bounded(&mut out, other.encode_utf8(&mut buf), max_chars);
            }
        }
    }
    Ok(out)
}

fn push_bounded(out: &mut String, value: &str, max_chars: usize) {
    let remaining = max_chars.saturating_sub(out.len());
    out.push_str(utf8_prefix(value, remaining));
}

/// Longest prefix of `value` within `max_bytes` ending on a char boundary
pub(crate) fn utf8_prefix(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use codemap_graph::{Language, NodeKind};

    fn node() -> CodeNode {
        CodeNode {
            id: "function:src/auth/token.ts:verifyToken".to_string(),
            kind: NodeKind::Function,
            label: "verifyToken".to_string(),
            file_path: "src/auth/token.ts".to_string(),
            directory: "src/auth".to_string(),
            language: Language::TypeScript,
            line_start: Some(3),
        }
    }

    #[test]
    fn renders_node_documents() {
        let templates = EmbeddingTemplates::default();
        assert_eq!(
            templates.render_node(&node()).unwrap(),
            "function verifyToken (verify token) in src/auth/token.ts"
        );
        assert_eq!(templates.render_query("auth").unwrap(), "auth");
    }

    #[test]
    fn escapes_and_bounds() {
        let templates = EmbeddingTemplates {
            max_chars: 64,
            query: "{{q}} {text}".to_string(),
            ..EmbeddingTemplates::default()
        };
        assert_eq!(templates.render_query("x").unwrap(), "{q} x");

        let long = "é".repeat(100);
        let rendered = templates.render_query(&long).unwrap();
        assert!(rendered.len() <= 64);
        assert!(rendered.starts_with("{q} é"));
    }

    #[test]
    fn rejects_unknown_placeholders() {
        let templates = EmbeddingTemplates {
            node: "{body}".to_string(),
            ..EmbeddingTemplates::default()
        };
        assert!(matches!(
            templates.validate(),
            Err(EmbeddingError::Template(_))
        ));
        assert!(templates.render_node(&node()).is_err());

        let broken = EmbeddingTemplates {
            query: "{text".to_string(),
            ..EmbeddingTemplates::default()
        };
        assert!(broken.validate().is_err());
        assert!(EmbeddingTemplates::default().validate().is_ok());
    }
}
