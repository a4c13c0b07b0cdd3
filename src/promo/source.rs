use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("promo source {source_name} is unreadable: {error}")]
    Unreadable {
        source_name: String,
        #[source]
        error: std::io::Error,
    },

    #[error("promo source {source_name} did not answer within {limit:?}")]
    Timeout {
        source_name: String,
        limit: std::time::Duration,
    },
}

/// One authoritative list of promo codes.
///
/// `Ok(false)` means the list was read and does not contain the code. A list
/// that cannot be read is an error, never a negative answer.
#[async_trait]
pub trait PromoSource: Send + Sync {
    fn name(&self) -> &str;

    async fn contains(&self, code: &str) -> Result<bool, SourceError>;
}

// ============================================================================
// File Source
// ============================================================================

/// Line-delimited code list on disk, scanned on every lookup.
pub struct FileSource {
    name: String,
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { name, path }
    }

    /// One source per file name, resolved against `dir`.
    pub fn from_dir<S: AsRef<str>>(dir: &Path, files: &[S]) -> Vec<Self> {
        files
            .iter()
            .map(|file| Self::new(dir.join(file.as_ref())))
            .collect()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn unreadable(&self, error: std::io::Error) -> SourceError {
        SourceError::Unreadable {
            source_name: self.name.clone(),
            error,
        }
    }
}

#[async_trait]
impl PromoSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn contains(&self, code: &str) -> Result<bool, SourceError> {
        let file = File::open(&self.path)
            .await
            .map_err(|e| self.unreadable(e))?;

        let mut lines = BufReader::new(file).lines();
        while let Some(line) = lines.next_line().await.map_err(|e| self.unreadable(e))? {
            if line.trim() == code {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

// ============================================================================
// In-Memory Source
// ============================================================================

/// Fixed code list held in memory.
pub struct ListSource {
    name: String,
    codes: HashSet<String>,
}

impl ListSource {
    pub fn new<I, S>(name: impl Into<String>, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            codes: codes.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl PromoSource for ListSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn contains(&self, code: &str) -> Result<bool, SourceError> {
        Ok(self.codes.contains(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_file_source_matches_trimmed_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "HELLO1234").unwrap();
        writeln!(file, "  PROMO1234  ").unwrap();
        writeln!(file).unwrap();

        let source = FileSource::new(file.path());
        assert!(source.contains("PROMO1234").await.unwrap());
        assert!(!source.contains("PROMO123").await.unwrap());
        assert!(!source.contains("PROMO12345").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSource::new(dir.path().join("couponbase9.txt"));

        let err = source.contains("PROMO1234").await.unwrap_err();
        assert!(matches!(
            err,
            SourceError::Unreadable { ref source_name, .. } if source_name == "couponbase9.txt"
        ));
    }

    #[test]
    fn test_from_dir_keeps_file_order() {
        let sources = FileSource::from_dir(Path::new("/data"), &["a.txt", "b.txt", "c.txt"]);
        let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
        assert_eq!(names, ["a.txt", "b.txt", "c.txt"]);
        assert_eq!(sources[1].path(), Path::new("/data/b.txt"));
    }
}
