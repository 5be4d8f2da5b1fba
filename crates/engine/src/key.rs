use serde::{Deserialize, Serialize};

/// One repository branch; displayed `owner/repo@branch`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoKey {
    pub owner: String,
    pub repo: String,
    pub branch: String,
}

impl RepoKey {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            branch: branch.into(),
        }
    }

    /// `(owner, repo)` ignoring the branch
    pub(crate) fn repo_ref(&self) -> (String, String) {
        (self.owner.clone(), self.repo.clone())
    }
}

impl std::fmt::Display for RepoKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.repo, self.branch)
    }
}
