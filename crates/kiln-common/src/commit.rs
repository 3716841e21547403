use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Repository coordinates a build is requested against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
    pub branch: String,
    /// Private repositories need a credential token to build and are listed
    /// through the backend proxy instead of the public host API.
    #[serde(default)]
    pub private: bool,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            branch: branch.into(),
            private: false,
        }
    }

    pub fn private(mut self, private: bool) -> Self {
        self.private = private;
        self
    }

    /// `owner/name` slug.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Read-only projection of a commit. Not persisted by kiln.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Commit {
    pub hash: String,
    pub message: String,
    pub author: String,
    pub date: Option<DateTime<Utc>>,
}

impl Commit {
    pub fn short_hash(&self) -> &str {
        let end = self
            .hash
            .char_indices()
            .nth(7)
            .map(|(idx, _)| idx)
            .unwrap_or(self.hash.len());
        &self.hash[..end]
    }

    /// First line of the commit message.
    pub fn title(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(hash: &str, message: &str) -> Commit {
        Commit {
            hash: hash.to_string(),
            message: message.to_string(),
            author: "dev".to_string(),
            date: None,
        }
    }

    #[test]
    fn test_short_hash_truncates_to_seven() {
        assert_eq!(commit("abc1234def5678", "x").short_hash(), "abc1234");
    }

    #[test]
    fn test_short_hash_keeps_short_input() {
        assert_eq!(commit("abc", "x").short_hash(), "abc");
    }

    #[test]
    fn test_title_is_first_line() {
        assert_eq!(commit("a", "Fix login\n\nLonger body").title(), "Fix login");
    }

    #[test]
    fn test_repo_slug() {
        let repo = RepoRef::new("acme", "web", "main").private(true);
        assert_eq!(repo.slug(), "acme/web");
        assert!(repo.private);
    }
}
