//! Resolution-phase lookups: import specifiers to file nodes, call names to symbols.
//!
//! Both tables are built once from the collected node set and only read afterwards.

use crate::builder::{CallWeights, ImportWeights};
use crate::types::CodeNode;
use codemap_parser::{ImportStyle, Language};
use std::collections::HashMap;

/// A resolved reference: target node index and confidence
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Resolved {
    pub node: usize,
    pub weight: f32,
}

/// Normalise to forward slashes, drop `.` segments, fold `..` and strip leading slashes
pub(crate) fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            part => parts.push(part),
        }
    }
    parts.join("/")
}

/// Directory part of a normalised path, `""` at the repository root
pub(crate) fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// Last path segment
pub(crate) fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

fn join(dir: &str, rel: &str) -> String {
    if dir.is_empty() {
        normalize_path(rel)
    } else {
        normalize_path(&format!("{dir}/{rel}"))
    }
}

fn strip_extension(path: &str) -> &str {
    match path.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.contains('/') && !stem.ends_with('/') => stem,
        _ => path,
    }
}

fn extension(path: &str) -> Option<&str> {
    let name = file_name(path);
    name.rsplit_once('.').map(|(_, ext)| ext)
}

/// File names that stand for their directory as a module
fn index_names(language: Language) -> &'static [&'static str] {
    match language {
        Language::JavaScript | Language::TypeScript => &[
            "index.ts",
            "index.tsx",
            "index.js",
            "index.jsx",
            "index.mjs",
        ],
        Language::Python => &["__init__.py"],
        Language::Rust => &["mod.rs"],
        _ => &[],
    }
}

/// Import specifier prefixes that alias the source root in bundler configs
const ALIAS_PREFIXES: &[&str] = &["@/", "~/", "#/"];

/// Repository files by normalised path
pub(crate) struct FileTable<'a> {
    /// Sorted
    paths: Vec<&'a str>,
    nodes: HashMap<&'a str, usize>,
}

impl<'a> FileTable<'a> {
    pub fn new(files: impl IntoIterator<Item = (&'a str, usize)>) -> Self {
        let nodes: HashMap<&'a str, usize> = files.into_iter().collect();
        let mut paths: Vec<&'a str> = nodes.keys().copied().collect();
        paths.sort_unstable();
        Self { paths, nodes }
    }

    fn get(&self, path: &str) -> Option<&'a str> {
        self.nodes.get_key_value(path).map(|(path, _)| *path)
    }

    /// Resolve one import mention of `from` to a file node. Self-imports resolve to nothing.
    pub fn resolve(
        &self,
        from: &str,
        language: Language,
        target: &str,
        style: ImportStyle,
        weights: &ImportWeights,
    ) -> Option<Resolved> {
        let (path, weight) = match style {
            ImportStyle::Relative => self.resolve_relative(from, language, target, weights),
            ImportStyle::Submodule => {
                let base = join(&rust_module_dir(from), target);
                self.complete(&base, Language::Rust)
                    .map(|path| (path, weights.completed))
            }
            ImportStyle::Module => self.resolve_module(from, language, target, weights),
        }?;

        if path == from {
            return None;
        }
        self.nodes.get(path).map(|&node| Resolved { node, weight })
    }

    fn resolve_relative(
        &self,
        from: &str,
        language: Language,
        target: &str,
        weights: &ImportWeights,
    ) -> Option<(&'a str, f32)> {
        if language == Language::Python {
            let base = python_relative(from, target);
            return self
                .complete(&base, language)
                .map(|path| (path, weights.completed));
        }

        let joined = if target.starts_with('/') {
            normalize_path(target)
        } else {
            join(parent_dir(from), target)
        };

        if let Some(path) = self.get(&joined) {
            return Some((path, weights.exact));
        }
        if let Some(path) = self.complete(&joined, language) {
            return Some((path, weights.completed));
        }
        if matches!(language, Language::C | Language::Cpp) {
            // quoted includes also search the include directories
            return self.suffix_match(target.trim_start_matches("./"), language, weights);
        }
        None
    }

    fn resolve_module(
        &self,
        from: &str,
        language: Language,
        target: &str,
        weights: &ImportWeights,
    ) -> Option<(&'a str, f32)> {
        match language {
            Language::Rust => return self.resolve_rust_path(from, target, weights),
            Language::Go => return self.resolve_go_package(target, weights),
            _ => {}
        }

        let module_path = match language {
            Language::JavaScript | Language::TypeScript => {
                let aliased = ALIAS_PREFIXES
                    .iter()
                    .find_map(|prefix| target.strip_prefix(prefix));
                match aliased {
                    Some(rest) => rest.to_string(),
                    // bare package names never name a repository file
                    None if !target.contains('/') => return None,
                    None => target.to_string(),
                }
            }
            _ => target.replace(language.module_separator(), "/"),
        };
        let module_path = normalize_path(&module_path);
        if module_path.is_empty() {
            return None;
        }

        for root in module_roots(from) {
            if let Some(path) = self.complete(&join(&root, &module_path), language) {
                return Some((path, weights.module));
            }
        }

        self.suffix_match(&module_path, language, weights).or_else(|| {
            // member imports (`a.b.Class.member`, `pkg.mod.func`) name an item inside a module
            let (parent, _) = module_path.rsplit_once('/')?;
            self.suffix_match(parent, language, weights)
        })
    }

    /// `crate::`, `self::` and `super::` paths mapped onto module files
    fn resolve_rust_path(
        &self,
        from: &str,
        target: &str,
        weights: &ImportWeights,
    ) -> Option<(&'a str, f32)> {
        let mut segments: Vec<&str> = target.split("::").filter(|s| !s.is_empty()).collect();
        let crate_root = self.rust_crate_root(from);

        let mut anchored = true;
        let base = match segments.first().copied() {
            Some("crate") => {
                segments.remove(0);
                crate_root.clone()
            }
            Some("self") => {
                segments.remove(0);
                rust_module_dir(from)
            }
            Some("super") => {
                let mut dir = rust_module_dir(from);
                while segments.first() == Some(&"super") {
                    segments.remove(0);
                    dir = parent_dir(&dir).to_string();
                }
                dir
            }
            _ => {
                anchored = false;
                crate_root.clone()
            }
        };

        for len in (1..=segments.len()).rev() {
            let candidate = join(&base, &segments[..len].join("/"));
            if let Some(path) = self.complete(&candidate, Language::Rust) {
                return Some((path, weights.module));
            }
        }

        if !anchored {
            return None;
        }
        // items re-exported from the anchor module itself
        let module_file = if base == crate_root {
            ["lib.rs", "main.rs"]
                .iter()
                .find_map(|root| self.get(&join(&base, root)))
        } else {
            self.complete(&base, Language::Rust)
        };
        module_file.map(|path| (path, weights.module))
    }

    /// Nearest ancestor directory holding `lib.rs` or `main.rs`
    fn rust_crate_root(&self, from: &str) -> String {
        let mut dir = parent_dir(from);
        loop {
            let has_root = ["lib.rs", "main.rs"]
                .iter()
                .any(|root| self.get(&join(dir, root)).is_some());
            if has_root {
                return dir.to_string();
            }
            if dir.is_empty() {
                return parent_dir(from).to_string();
            }
            dir = parent_dir(dir);
        }
    }

    /// Go imports name a package directory; the module prefix is unknown, so trailing
    /// segments are matched against repository directories, longest first.
    fn resolve_go_package(&self, target: &str, weights: &ImportWeights) -> Option<(&'a str, f32)> {
        let segments: Vec<&str> = target.split('/').filter(|s| !s.is_empty()).collect();
        for start in 0..segments.len() {
            let dir = segments[start..].join("/");
            let nested = format!("/{dir}");
            let files: Vec<&'a str> = self
                .paths
                .iter()
                .copied()
                .filter(|path| path.ends_with(".go") && !path.ends_with("_test.go"))
                .filter(|path| {
                    let parent = parent_dir(path);
                    parent == dir || parent.ends_with(&nested)
                })
                .collect();
            if let Some(found) = pick(&files, weights) {
                return Some(found);
            }
        }
        None
    }

    /// Try the language's extensions, then its index files
    fn complete(&self, base: &str, language: Language) -> Option<&'a str> {
        let base = base.trim_end_matches('/');
        if base.is_empty() {
            return None;
        }
        language
            .module_extensions()
            .iter()
            .map(|ext| format!("{base}.{ext}"))
            .chain(
                index_names(language)
                    .iter()
                    .map(|index| format!("{base}/{index}")),
            )
            .find_map(|candidate| self.get(&candidate))
    }

    /// Files whose module path ends with `module_path`
    fn suffix_match(
        &self,
        module_path: &str,
        language: Language,
        weights: &ImportWeights,
    ) -> Option<(&'a str, f32)> {
        let module_path = module_path.trim_matches('/');
        if module_path.is_empty() {
            return None;
        }
        let nested = format!("/{module_path}");
        let matches = |candidate: &str| candidate == module_path || candidate.ends_with(&nested);

        let candidates: Vec<&'a str> = self
            .paths
            .iter()
            .copied()
            .filter(|path| {
                extension(path).is_some_and(|ext| language.module_extensions().contains(&ext))
            })
            .filter(|path| {
                let path: &str = path;
                let is_index = index_names(language).contains(&file_name(path));
                matches(path)
                    || matches(strip_extension(path))
                    || (is_index && matches(parent_dir(path)))
            })
            .collect();

        pick(&candidates, weights)
    }
}

fn pick<'a>(candidates: &[&'a str], weights: &ImportWeights) -> Option<(&'a str, f32)> {
    match candidates {
        [] => None,
        [only] => Some((*only, weights.alias_unique)),
        [first, ..] => Some((*first, weights.alias_ambiguous)),
    }
}

/// Python `.mod`, `..pkg.mod` relative to the importing file's package
fn python_relative(from: &str, target: &str) -> String {
    let dots = target.chars().take_while(|c| *c == '.').count();
    let rest = target[dots..].replace('.', "/");
    let mut dir = parent_dir(from);
    for _ in 1..dots {
        dir = parent_dir(dir);
    }
    join(dir, &rest)
}

/// Directory holding the children of the Rust module defined by `path`
fn rust_module_dir(path: &str) -> String {
    let dir = parent_dir(path);
    match file_name(path) {
        "mod.rs" | "lib.rs" | "main.rs" => dir.to_string(),
        name => join(dir, strip_extension(name)),
    }
}

/// Roots a dotted module path may be anchored at: the repository root, common
/// source roots, then the importing file's ancestors nearest first
fn module_roots(from: &str) -> Vec<String> {
    let mut roots = vec![String::new(), "src".to_string(), "lib".to_string()];
    let mut dir = parent_dir(from);
    while !dir.is_empty() {
        if !roots.iter().any(|root| root == dir) {
            roots.push(dir.to_string());
        }
        dir = parent_dir(dir);
    }
    roots
}

/// Callable symbols by bare name, each list in node order
pub(crate) struct SymbolTable<'a> {
    by_name: HashMap<&'a str, Vec<usize>>,
}

impl<'a> SymbolTable<'a> {
    pub fn new(nodes: &'a [CodeNode]) -> Self {
        let mut by_name: HashMap<&'a str, Vec<usize>> = HashMap::new();
        for (idx, node) in nodes.iter().enumerate() {
            if node.kind.is_callable() {
                by_name.entry(node.label.as_str()).or_default().push(idx);
            }
        }
        Self { by_name }
    }

    /// Resolve a call from `origin`: same file, then same directory, then global
    pub fn resolve(
        &self,
        nodes: &[CodeNode],
        origin: usize,
        name: &str,
        weights: &CallWeights,
    ) -> Option<Resolved> {
        let candidates: Vec<usize> = self
            .by_name
            .get(name)?
            .iter()
            .copied()
            .filter(|&candidate| candidate != origin)
            .collect();
        let from = &nodes[origin];

        let same_file = candidates
            .iter()
            .find(|&&c| nodes[c].file_path == from.file_path)
            .map(|&node| Resolved {
                node,
                weight: weights.same_file,
            });
        let same_directory = || {
            candidates
                .iter()
                .find(|&&c| nodes[c].directory == from.directory)
                .map(|&node| Resolved {
                    node,
                    weight: weights.same_directory,
                })
        };
        let global = || match candidates.as_slice() {
            [] => None,
            [only] => Some(Resolved {
                node: *only,
                weight: weights.global_unique,
            }),
            [first, ..] => Some(Resolved {
                node: *first,
                weight: weights.global_ambiguous,
            }),
        };

        same_file.or_else(same_directory).or_else(global)
    }
}
