use crate::error::FailureReason;
use crate::imports::{rust_use_path, specifier_style, strip_quotes};
use crate::language::Language;
use crate::types::{DeclKind, Declaration, Extraction, ImportStyle};
use tree_sitter::{Node, Parser};

/// Share of the file that may sit under error nodes before the file is rejected
const MAX_ERROR_RATIO: f64 = 0.5;

#[derive(Debug, Clone, Default)]
struct Scope {
    /// Index of the enclosing declaration
    decl: Option<usize>,
    /// Enclosing class, impl or trait name
    container: Option<String>,
}

/// Parse with a tree-sitter grammar and walk the error-tolerant tree
pub(crate) fn extract(
    language: Language,
    path: &str,
    source: &str,
) -> Result<Extraction, FailureReason> {
    let ts_language = language
        .tree_sitter_language(path.ends_with(".tsx"))
        .ok_or(FailureReason::ParserUnavailable)?;

    let mut parser = Parser::new();
    parser
        .set_language(&ts_language)
        .map_err(|_| FailureReason::ParserUnavailable)?;

    let tree = parser
        .parse(source, None)
        .ok_or(FailureReason::ParserUnavailable)?;
    let root = tree.root_node();

    if root.is_error() || error_ratio(root, source.len()) > MAX_ERROR_RATIO {
        return Err(FailureReason::SyntaxUnrecoverable);
    }

    let mut walker = Walker {
        language,
        source: source.as_bytes(),
        out: Extraction::default(),
    };
    walker.visit(root, &Scope::default());
    Ok(walker.out)
}

#[allow(clippy::cast_precision_loss)]
fn error_ratio(root: Node<'_>, total: usize) -> f64 {
    if total == 0 || !root.has_error() {
        return 0.0;
    }

    let mut error_bytes = 0usize;
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() {
            error_bytes += node.end_byte().saturating_sub(node.start_byte());
            continue;
        }
        if !node.has_error() {
            continue;
        }
        let mut cursor = node.walk();
        stack.extend(node.children(&mut cursor));
    }

    error_bytes as f64 / total as f64
}

struct Walker<'a> {
    language: Language,
    source: &'a [u8],
    out: Extraction,
}

impl<'a> Walker<'a> {
    fn text(&self, node: Node<'_>) -> &'a str {
        node.utf8_text(self.source).unwrap_or_default()
    }

    fn line(node: Node<'_>) -> u32 {
        u32::try_from(node.start_position().row + 1).unwrap_or(u32::MAX)
    }

    fn is_script(&self) -> bool {
        matches!(self.language, Language::JavaScript | Language::TypeScript)
    }

    fn visit(&mut self, node: Node<'_>, scope: &Scope) {
        if let Some((kind, name)) = self.declaration(node, scope) {
            let declaration = Declaration::new(kind, name, Self::line(node))
                .in_container(scope.container.clone());
            let index = self.out.declare(declaration);

            let container = if matches!(kind, DeclKind::Class | DeclKind::Interface) {
                Some(name.to_string())
            } else {
                scope.container.clone()
            };
            let inner = Scope {
                decl: Some(index),
                container,
            };
            self.visit_children(node, &inner);
            return;
        }

        if self.import(node) {
            return;
        }

        if let Some(name) = self.call_target(node) {
            self.out.call(name, Self::line(node), scope.decl);
        }

        if let Some(container) = self.impl_container(node) {
            let inner = Scope {
                decl: scope.decl,
                container: Some(container),
            };
            self.visit_children(node, &inner);
            return;
        }

        self.visit_children(node, scope);
    }

    fn visit_children(&mut self, node: Node<'_>, scope: &Scope) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.visit(child, scope);
        }
    }

    /// Declaration kind and name, when `node` declares a symbol
    fn declaration(&self, node: Node<'_>, scope: &Scope) -> Option<(DeclKind, &'a str)> {
        let module_level = scope.decl.is_none() && scope.container.is_none();

        let kind = match self.language {
            Language::JavaScript | Language::TypeScript => match node.kind() {
                "function_declaration" | "generator_function_declaration" | "method_definition" => {
                    DeclKind::Function
                }
                "class_declaration" | "abstract_class_declaration" => DeclKind::Class,
                "interface_declaration" => DeclKind::Interface,
                "type_alias_declaration" | "enum_declaration" => DeclKind::Type,
                "variable_declarator" if module_level => {
                    let is_function = node.child_by_field_name("value").is_some_and(|value| {
                        matches!(
                            value.kind(),
                            "arrow_function"
                                | "function_expression"
                                | "function"
                                | "generator_function"
                        )
                    });
                    if is_function {
                        DeclKind::Function
                    } else {
                        DeclKind::Variable
                    }
                }
                _ => return None,
            },
            Language::Python => match node.kind() {
                "function_definition" => DeclKind::Function,
                "class_definition" => DeclKind::Class,
                "assignment" if module_level => DeclKind::Variable,
                _ => return None,
            },
            Language::Rust => match node.kind() {
                "function_item" => DeclKind::Function,
                "struct_item" | "union_item" => DeclKind::Class,
                "enum_item" | "type_item" => DeclKind::Type,
                "trait_item" => DeclKind::Interface,
                "const_item" | "static_item" if scope.decl.is_none() => DeclKind::Variable,
                _ => return None,
            },
            _ => return None,
        };

        let name_field = if node.kind() == "assignment" {
            "left"
        } else {
            "name"
        };
        let name_node = node.child_by_field_name(name_field)?;
        if !matches!(
            name_node.kind(),
            "identifier" | "type_identifier" | "property_identifier" | "private_property_identifier"
        ) {
            return None;
        }

        let name = self.text(name_node).trim_start_matches('#');
        (!name.is_empty()).then_some((kind, name))
    }

    /// Record import mentions. Returns true when the subtree needs no further walking.
    fn import(&mut self, node: Node<'_>) -> bool {
        let line = Self::line(node);

        match (self.language, node.kind()) {
            (Language::JavaScript | Language::TypeScript, "import_statement") => {
                if let Some(source) = node.child_by_field_name("source") {
                    let specifier = strip_quotes(self.text(source));
                    self.out.import(specifier, specifier_style(specifier), line);
                }
                true
            }
            (Language::JavaScript | Language::TypeScript, "export_statement") => {
                // `export { x } from './y'`; plain exports wrap declarations and are walked
                match node.child_by_field_name("source") {
                    Some(source) => {
                        let specifier = strip_quotes(self.text(source));
                        self.out.import(specifier, specifier_style(specifier), line);
                        true
                    }
                    None => false,
                }
            }
            (Language::JavaScript | Language::TypeScript, "call_expression") => {
                let Some(function) = node.child_by_field_name("function") else {
                    return false;
                };
                let is_require = function.kind() == "identifier" && self.text(function) == "require";
                if !is_require && function.kind() != "import" {
                    return false;
                }
                if let Some(arguments) = node.child_by_field_name("arguments") {
                    let mut cursor = arguments.walk();
                    let first = arguments.named_children(&mut cursor).next();
                    if let Some(argument) = first.filter(|arg| arg.kind() == "string") {
                        let specifier = strip_quotes(self.text(argument));
                        self.out.import(specifier, specifier_style(specifier), line);
                    }
                }
                true
            }
            (Language::Python, "import_statement") => {
                let mut cursor = node.walk();
                for name in node.children_by_field_name("name", &mut cursor) {
                    let module = if name.kind() == "aliased_import" {
                        name.child_by_field_name("name")
                    } else {
                        Some(name)
                    };
                    if let Some(module) = module {
                        let target = self.text(module);
                        self.out.import(target, ImportStyle::Module, line);
                    }
                }
                true
            }
            (Language::Python, "import_from_statement") => {
                let Some(module) = node.child_by_field_name("module_name") else {
                    return true;
                };
                let module = self.text(module);
                if module.chars().all(|c| c == '.') {
                    // `from . import a, b` names sibling modules
                    let mut cursor = node.walk();
                    for name in node.children_by_field_name("name", &mut cursor) {
                        let name = if name.kind() == "aliased_import" {
                            name.child_by_field_name("name")
                        } else {
                            Some(name)
                        };
                        if let Some(name) = name {
                            let target = format!("{module}{}", self.text(name));
                            self.out.import(target, ImportStyle::Relative, line);
                        }
                    }
                } else {
                    let style = if module.starts_with('.') {
                        ImportStyle::Relative
                    } else {
                        ImportStyle::Module
                    };
                    self.out.import(module, style, line);
                }
                true
            }
            (Language::Rust, "use_declaration") => {
                if let Some(argument) = node.child_by_field_name("argument") {
                    let path = rust_use_path(self.text(argument));
                    self.out.import(path, ImportStyle::Module, line);
                }
                true
            }
            (Language::Rust, "mod_item") => {
                if node.child_by_field_name("body").is_some() {
                    return false;
                }
                if let Some(name) = node.child_by_field_name("name") {
                    let target = self.text(name);
                    self.out.import(target, ImportStyle::Submodule, line);
                }
                true
            }
            (Language::Rust, "extern_crate_declaration") => true,
            _ => false,
        }
    }

    /// Name invoked by a call-like node
    fn call_target(&self, node: Node<'_>) -> Option<&'a str> {
        let callee = match (node.kind(), self.language) {
            ("call_expression", Language::Rust) => node.child_by_field_name("function")?,
            ("call_expression", _) if self.is_script() => node.child_by_field_name("function")?,
            ("new_expression", _) if self.is_script() => node.child_by_field_name("constructor")?,
            ("call", Language::Python) => node.child_by_field_name("function")?,
            _ => return None,
        };
        self.callee_name(callee)
    }

    fn callee_name(&self, callee: Node<'_>) -> Option<&'a str> {
        let target = match callee.kind() {
            "identifier" | "type_identifier" => callee,
            "member_expression" => callee.child_by_field_name("property")?,
            "attribute" => callee.child_by_field_name("attribute")?,
            "scoped_identifier" => callee.child_by_field_name("name")?,
            "field_expression" => callee.child_by_field_name("field")?,
            "generic_function" => return self.callee_name(callee.child_by_field_name("function")?),
            _ => return None,
        };
        Some(self.text(target).trim_start_matches('#'))
    }

    /// `impl Foo<T>` and `impl Trait for Foo` scope their functions under `Foo`
    fn impl_container(&self, node: Node<'_>) -> Option<String> {
        if self.language != Language::Rust || node.kind() != "impl_item" {
            return None;
        }
        let ty = self.text(node.child_by_field_name("type")?);
        let base = ty.split('<').next().unwrap_or(ty);
        let base = base.rsplit("::").next().unwrap_or(base).trim();
        (!base.is_empty()).then(|| base.to_string())
    }
}
