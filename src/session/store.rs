use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_ARTIFACT_NAME: &str = "converted.step";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create download directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Writes downloaded artifacts into a single directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        let file_name = sanitize_file_name(file_name);
        let final_path = self.dir.join(&file_name);
        let tmp_path = self.dir.join(format!("{file_name}.tmp"));
        let write_err = |source| StoreError::Write {
            path: final_path.clone(),
            source,
        };

        fs::write(&tmp_path, bytes).map_err(write_err)?;
        match fs::rename(&tmp_path, &final_path) {
            Ok(()) => {}
            Err(rename_err) => {
                if final_path.exists() {
                    fs::remove_file(&final_path).map_err(write_err)?;
                    fs::rename(&tmp_path, &final_path).map_err(write_err)?;
                } else {
                    return Err(write_err(rename_err));
                }
            }
        }
        Ok(final_path)
    }
}

fn sanitize_file_name(raw: &str) -> String {
    let name = Path::new(raw.trim())
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    if name.is_empty() || name == "." || name == ".." {
        DEFAULT_ARTIFACT_NAME.to_string()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "meshstep_store_{prefix}_{}_{}",
            std::process::id(),
            nanos
        ))
    }

    #[test]
    fn save_creates_directory_and_writes_bytes() {
        let dir = temp_dir("create");
        let store = ArtifactStore::new(&dir);

        let path = store
            .save("part.step", b"ISO-10303-21;")
            .expect("artifact should save");

        assert_eq!(path, dir.join("part.step"));
        assert_eq!(fs::read(&path).expect("artifact should read"), b"ISO-10303-21;");
        assert!(!dir.join("part.step.tmp").exists());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn save_replaces_existing_artifact() {
        let dir = temp_dir("replace");
        let store = ArtifactStore::new(&dir);

        store.save("part.step", b"old").expect("first save");
        let path = store.save("part.step", b"new").expect("second save");

        assert_eq!(fs::read(path).expect("artifact should read"), b"new");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn sanitize_strips_directories_and_defaults_empty_names() {
        assert_eq!(sanitize_file_name("../../etc/part.step"), "part.step");
        assert_eq!(sanitize_file_name("  "), DEFAULT_ARTIFACT_NAME);
        assert_eq!(sanitize_file_name(".."), DEFAULT_ARTIFACT_NAME);
    }
}
