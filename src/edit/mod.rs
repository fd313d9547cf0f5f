//! File edit engine: locate a target span in a file's text, replace it, and
//! commit the change.
//!
//! Matching cascades through [`replacers`] from exact substring search to
//! progressively more whitespace-tolerant strategies. Ambiguity is never
//! guessed away: with `replace_all` off, a strategy that matches more than
//! once fails the edit. The file is rewritten only after a strategy has
//! unambiguously resolved, and the commit hash is the only state returned —
//! callers never observe intermediate file states.

pub mod replacers;

use crate::error::{EditError, SandboxError};
use crate::sandbox::service::{FsApi, GitApi};
use serde::Serialize;

/// What an edit produced.
#[derive(Debug, Clone, Serialize)]
pub struct EditOutcome {
    pub commit_hash: String,
    /// Occurrences replaced; 0 for file creation.
    pub replacements: usize,
    pub created: bool,
}

/// Edits files through the sandbox filesystem and commits through the
/// version-control collaborator.
pub struct EditEngine {
    fs: FsApi,
    git: GitApi,
}

impl EditEngine {
    pub fn new(fs: FsApi, git: GitApi) -> Self {
        Self { fs, git }
    }

    /// Replace `old` with `new` in `path`, or create the file when `old` is
    /// empty and the path has no existing content.
    pub async fn apply(
        &self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> Result<EditOutcome, SandboxError> {
        if old == new {
            return Err(EditError::InvalidArgument(
                "old and new text are identical".to_string(),
            )
            .into());
        }

        if old.is_empty() {
            return self.create(path, new).await;
        }

        let content = match self.fs.read_file(path).await {
            Ok(content) => content,
            Err(SandboxError::FileNotFound { .. }) => {
                return Err(EditError::NotFound {
                    path: path.to_string(),
                }
                .into());
            }
            Err(e) => return Err(e),
        };

        let located = replacers::locate(&content, old).ok_or_else(|| EditError::NotFound {
            path: path.to_string(),
        })?;

        if !replace_all && located.spans.len() > 1 {
            return Err(EditError::AmbiguousMatch {
                path: path.to_string(),
                count: located.spans.len(),
            }
            .into());
        }

        let spans = if replace_all {
            located.spans
        } else {
            located.spans[..1].to_vec()
        };
        let updated = replacers::apply(&content, &spans, new);
        tracing::debug!(
            path,
            strategy = located.strategy,
            replacements = spans.len(),
            "resolved edit"
        );

        self.fs.write_file(path, &updated).await?;
        self.git.init_if_needed().await?;
        let commit_hash = self.git.commit_all("updated").await?;

        Ok(EditOutcome {
            commit_hash,
            replacements: spans.len(),
            created: false,
        })
    }

    async fn create(&self, path: &str, content: &str) -> Result<EditOutcome, SandboxError> {
        // Empty old text means creation, which only makes sense when the
        // path has no content yet.
        if self.fs.exists(path).await? && !self.fs.read_file(path).await?.is_empty() {
            return Err(EditError::InvalidArgument(format!(
                "old text is empty but {path} already has content"
            ))
            .into());
        }

        self.fs.write_file(path, content).await?;
        self.git.init_if_needed().await?;
        let commit_hash = self.git.commit_all("created").await?;

        Ok(EditOutcome {
            commit_hash,
            replacements: 0,
            created: true,
        })
    }
}
