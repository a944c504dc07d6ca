use std::path::Path;

use crate::error::GitError;

pub const SHORT_SHA_LEN: usize = 7;

/// Source of the commit a build is tagged with.
pub trait RevisionSource {
    /// Abbreviated SHA of `HEAD` in the repository containing `path`.
    ///
    /// # Errors
    ///
    /// Returns an error when the revision cannot be determined.
    fn short_sha(&self, path: &Path) -> Result<String, GitError>;
}

/// [`RevisionSource`] that reads the repository discovered from `path`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitRepository;

impl RevisionSource for GitRepository {
    fn short_sha(&self, path: &Path) -> Result<String, GitError> {
        let repo = gix::discover(path).map_err(|source| GitError::Discover {
            path: path.to_path_buf(),
            source: Box::new(source),
        })?;
        let head = repo.head_id().map_err(|source| GitError::Head {
            path: path.to_path_buf(),
            source: Box::new(source),
        })?;
        Ok(head.to_hex_with_len(SHORT_SHA_LEN).to_string())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::{GitRepository, RevisionSource};
    use crate::error::GitError;

    #[test]
    fn plain_directory_is_not_a_repository() {
        let dir = tempfile::tempdir().expect("tempdir");
        let error = GitRepository
            .short_sha(dir.path())
            .expect_err("not a repository");
        assert!(matches!(error, GitError::Discover { .. }));
    }

    #[test]
    fn unborn_head_has_no_sha() {
        let dir = tempfile::tempdir().expect("tempdir");
        gix::init(dir.path()).expect("init repository");

        let error = GitRepository
            .short_sha(dir.path())
            .expect_err("no commits yet");
        assert!(matches!(error, GitError::Head { .. }));
    }
}
