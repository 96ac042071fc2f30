//! File records - what the pipeline knows about files it has touched

use serde::{Deserialize, Serialize};

use patternstore::now_ms;

/// Last observed status of a tracked file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Created,
    Modified,
    QaPassed,
    QaFailed,
}

/// Hash file content with FNV-1a 64 (stable, dependency-free)
pub fn hash_content(content: &str) -> String {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET;
    for byte in content.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    format!("{:016x}", hash)
}

/// A file the pipeline created or modified
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Project-relative path
    pub path: String,

    /// Content hash at last observation
    pub content_hash: String,

    pub status: FileStatus,

    /// Bumped on every observed change
    pub revision: u32,

    /// True when the pipeline itself created the file
    pub pipeline_created: bool,

    pub updated_at: i64,
}

impl FileRecord {
    /// Record a file the pipeline just created
    pub fn created(path: impl Into<String>, content: &str) -> Self {
        Self {
            path: path.into(),
            content_hash: hash_content(content),
            status: FileStatus::Created,
            revision: 1,
            pipeline_created: true,
            updated_at: now_ms(),
        }
    }

    /// Record a pre-existing file the pipeline modified
    pub fn modified(path: impl Into<String>, content: &str) -> Self {
        Self {
            path: path.into(),
            content_hash: hash_content(content),
            status: FileStatus::Modified,
            revision: 1,
            pipeline_created: false,
            updated_at: now_ms(),
        }
    }

    /// Note a new observation of the file's content
    pub fn observe(&mut self, content: &str, status: FileStatus) {
        let hash = hash_content(content);
        if hash != self.content_hash {
            self.revision += 1;
            self.content_hash = hash;
        }
        self.status = status;
        self.updated_at = now_ms();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_content_stable() {
        assert_eq!(hash_content("hello"), hash_content("hello"));
        assert_ne!(hash_content("hello"), hash_content("hello!"));
    }

    #[test]
    fn test_created_record() {
        let record = FileRecord::created("src/api.rs", "fn main() {}");
        assert_eq!(record.status, FileStatus::Created);
        assert_eq!(record.revision, 1);
        assert!(record.pipeline_created);
    }

    #[test]
    fn test_observe_bumps_revision_on_change() {
        let mut record = FileRecord::created("a.rs", "v1");
        record.observe("v2", FileStatus::Modified);
        assert_eq!(record.revision, 2);

        // Same content does not bump
        record.observe("v2", FileStatus::QaPassed);
        assert_eq!(record.revision, 2);
        assert_eq!(record.status, FileStatus::QaPassed);
    }
}
