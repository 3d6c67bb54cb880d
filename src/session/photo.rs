use std::io;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::llm::media::extension_for;

/// An image file owned by one session. The file is removed when the handle is dropped.
#[derive(Debug)]
pub struct SessionPhoto {
    path: PathBuf,
}

impl SessionPhoto {
    pub async fn store(dir: &Path, bytes: &[u8]) -> io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!(
            "photo_{}.{}",
            Uuid::new_v4().simple(),
            extension_for(bytes)
        ));
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        debug!("Stored session photo at {}", path.display());
        Ok(SessionPhoto { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SessionPhoto {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed session photo {}", self.path.display()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!("Failed to remove session photo {}: {err}", self.path.display()),
        }
    }
}
