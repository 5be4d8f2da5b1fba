use crate::error::RepoAccessError;
use crate::key::RepoKey;
use async_trait::async_trait;
use codemap_graph::{Language, SourceFile};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::WalkBuilder;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Branch reported for checkouts without a readable `.git/HEAD`
pub const FALLBACK_BRANCH: &str = "main";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoMetadata {
    pub default_branch: String,
    pub visibility: Visibility,
}

/// Repository content collaborator
#[async_trait]
pub trait RepositorySource: Send + Sync {
    async fn metadata(&self, owner: &str, repo: &str) -> Result<RepoMetadata, RepoAccessError>;

    /// Every source file of one branch
    async fn fetch(&self, key: &RepoKey) -> Result<Vec<SourceFile>, RepoAccessError>;
}

/// Serves registered local checkouts
pub struct LocalRepositorySource {
    max_file_bytes: u64,
    roots: RwLock<HashMap<(String, String), PathBuf>>,
}

impl LocalRepositorySource {
    pub fn new(max_file_bytes: u64) -> Self {
        Self {
            max_file_bytes,
            roots: RwLock::new(HashMap::new()),
        }
    }

    /// Make `path` available as `owner/repo`
    pub fn register(&self, owner: impl Into<String>, repo: impl Into<String>, path: impl Into<PathBuf>) {
        self.roots
            .write()
            .insert((owner.into(), repo.into()), path.into());
    }

    fn root(&self, owner: &str, repo: &str) -> Result<PathBuf, RepoAccessError> {
        let root = self
            .roots
            .read()
            .get(&(owner.to_string(), repo.to_string()))
            .cloned()
            .ok_or_else(|| RepoAccessError::NotFound(format!("{owner}/{repo} is not registered")))?;
        if !root.is_dir() {
            return Err(RepoAccessError::NotFound(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        Ok(root)
    }
}

#[async_trait]
impl RepositorySource for LocalRepositorySource {
    async fn metadata(&self, owner: &str, repo: &str) -> Result<RepoMetadata, RepoAccessError> {
        let root = self.root(owner, repo)?;
        Ok(RepoMetadata {
            default_branch: checked_out_branch(&root).await,
            visibility: Visibility::Private,
        })
    }

    async fn fetch(&self, key: &RepoKey) -> Result<Vec<SourceFile>, RepoAccessError> {
        let root = self.root(&key.owner, &key.repo)?;
        let branch = checked_out_branch(&root).await;
        if branch != key.branch {
            return Err(RepoAccessError::NotFound(format!(
                "{} has {branch} checked out, not {}",
                root.display(),
                key.branch
            )));
        }

        let max_file_bytes = self.max_file_bytes;
        tokio::task::spawn_blocking(move || walk_checkout(&root, max_file_bytes))
            .await
            .map_err(|err| RepoAccessError::Io(err.to_string()))?
    }
}

/// Branch named by `.git/HEAD`, or [`FALLBACK_BRANCH`] when detached or absent
async fn checked_out_branch(root: &Path) -> String {
    match tokio::fs::read_to_string(root.join(".git").join("HEAD")).await {
        Ok(head) => head
            .trim()
            .strip_prefix("ref: refs/heads/")
            .filter(|branch| !branch.is_empty())
            .map_or_else(|| FALLBACK_BRANCH.to_string(), ToString::to_string),
        Err(_) => FALLBACK_BRANCH.to_string(),
    }
}

/// `linguist-language` attributes from a checkout's root `.gitattributes`
struct LanguageOverrides {
    /// In file order; the last matching rule wins
    rules: Vec<(Gitignore, String)>,
}

impl LanguageOverrides {
    fn load(root: &Path) -> Self {
        let rules = match std::fs::read_to_string(root.join(".gitattributes")) {
            Ok(text) => Self::parse(root, &text),
            Err(_) => Vec::new(),
        };
        Self { rules }
    }

    fn parse(root: &Path, text: &str) -> Vec<(Gitignore, String)> {
        let mut rules = Vec::new();
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let Some(pattern) = fields.next() else {
                continue;
            };
            let Some(tag) = fields.find_map(|attr| attr.strip_prefix("linguist-language=")) else {
                continue;
            };

            let mut builder = GitignoreBuilder::new(root);
            let matcher = builder
                .add_line(None, pattern)
                .map_err(|err| err.to_string())
                .and_then(|builder| builder.build().map_err(|err| err.to_string()));
            match matcher {
                Ok(matcher) => rules.push((matcher, tag.to_string())),
                Err(err) => log::debug!("Ignoring .gitattributes pattern {pattern}: {err}"),
            }
        }
        rules
    }

    /// Language tag assigned to `path`, empty when none applies
    fn tag_for(&self, path: &Path) -> &str {
        self.rules
            .iter()
            .rev()
            .find(|(matcher, _)| matcher.matched(path, false).is_ignore())
            .map_or("", |(_, tag)| tag.as_str())
    }
}

fn walk_checkout(root: &Path, max_file_bytes: u64) -> Result<Vec<SourceFile>, RepoAccessError> {
    let overrides = LanguageOverrides::load(root);
    let walker = WalkBuilder::new(root)
        .follow_links(false)
        .hidden(true)
        .git_ignore(true)
        .git_exclude(true)
        .require_git(false)
        .build();

    let mut files = Vec::new();
    let mut skipped = 0usize;
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                log::debug!("Skipping unreadable entry under {}: {err}", root.display());
                continue;
            }
        };
        if !entry.file_type().is_some_and(|kind| kind.is_file()) {
            continue;
        }

        let path = entry.path();
        let tag = overrides.tag_for(path);
        if Language::detect(tag, path) == Language::Unknown {
            continue;
        }
        let Some(relative) = relative_path(root, path) else {
            continue;
        };

        let size = entry.metadata().map(|meta| meta.len()).unwrap_or(u64::MAX);
        if size > max_file_bytes {
            log::debug!("Skipping {relative}: {size} bytes");
            skipped += 1;
            continue;
        }

        let bytes = std::fs::read(path)?;
        match String::from_utf8(bytes) {
            Ok(content) => files.push(SourceFile::detect(relative, tag, content)),
            Err(_) => {
                log::debug!("Skipping {relative}: not UTF-8");
                skipped += 1;
            }
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    log::debug!(
        "Read {} files from {} ({skipped} skipped)",
        files.len(),
        root.display()
    );
    Ok(files)
}

/// Forward-slash path of `path` below `root`
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|part| part.as_os_str().to_string_lossy().into_owned())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn checkout() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/nested")).unwrap();
        fs::create_dir_all(root.join("build")).unwrap();
        fs::write(root.join("src/main.rs"), "fn main() {}\n").unwrap();
        fs::write(root.join("src/nested/util.py"), "def util():\n    pass\n").unwrap();
        fs::write(root.join("README.md"), "# readme\n").unwrap();
        fs::write(root.join("src/big.ts"), "x".repeat(2048)).unwrap();
        fs::write(root.join("src/bin.js"), [0xff_u8, 0xfe, 0x00, 0x41]).unwrap();
        fs::write(root.join(".gitignore"), "build/\n").unwrap();
        fs::write(root.join("build/out.js"), "export const x = 1;\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn walks_source_files_relative_to_the_root() {
        let dir = checkout();
        let source = LocalRepositorySource::new(1024);
        source.register("local", "demo", dir.path());

        let files = source
            .fetch(&RepoKey::new("local", "demo", FALLBACK_BRANCH))
            .await
            .unwrap();
        let paths: Vec<&str> = files.iter().map(|file| file.path.as_str()).collect();

        assert_eq!(paths, vec!["src/main.rs", "src/nested/util.py"]);
        assert_eq!(files[0].language, Language::Rust);
        assert_eq!(files[1].language, Language::Python);
    }

    #[tokio::test]
    async fn gitattributes_languages_override_extensions() {
        let dir = checkout();
        let root = dir.path();
        fs::create_dir_all(root.join("scripts")).unwrap();
        fs::write(root.join("scripts/deploy.js"), "function deploy() {}\n").unwrap();
        fs::write(root.join("Rakefile.task"), "def task\nend\n").unwrap();
        fs::write(
            root.join(".gitattributes"),
            "# generated\n*.task linguist-language=Ruby\nscripts/*.js linguist-language=TypeScript\n*.md text\n",
        )
        .unwrap();

        let source = LocalRepositorySource::new(1024);
        source.register("local", "demo", root);
        let files = source
            .fetch(&RepoKey::new("local", "demo", FALLBACK_BRANCH))
            .await
            .unwrap();
        let languages: Vec<(&str, Language)> = files
            .iter()
            .map(|file| (file.path.as_str(), file.language))
            .collect();

        assert_eq!(
            languages,
            vec![
                ("Rakefile.task", Language::Ruby),
                ("scripts/deploy.js", Language::TypeScript),
                ("src/main.rs", Language::Rust),
                ("src/nested/util.py", Language::Python),
            ]
        );
    }

    #[tokio::test]
    async fn branch_comes_from_git_head() {
        let dir = checkout();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/HEAD"), "ref: refs/heads/develop\n").unwrap();

        let source = LocalRepositorySource::new(1024);
        source.register("local", "demo", dir.path());

        let metadata = source.metadata("local", "demo").await.unwrap();
        assert_eq!(metadata.default_branch, "develop");
        assert_eq!(metadata.visibility, Visibility::Private);

        let err = source
            .fetch(&RepoKey::new("local", "demo", "main"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoAccessError::NotFound(_)));
        assert!(source
            .fetch(&RepoKey::new("local", "demo", "develop"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn unknown_repositories_are_not_found() {
        let source = LocalRepositorySource::new(1024);
        assert!(matches!(
            source.metadata("local", "ghost").await,
            Err(RepoAccessError::NotFound(_))
        ));

        source.register("local", "gone", "/definitely/not/a/real/path");
        assert!(matches!(
            source.fetch(&RepoKey::new("local", "gone", "main")).await,
            Err(RepoAccessError::NotFound(_))
        ));
    }
}
