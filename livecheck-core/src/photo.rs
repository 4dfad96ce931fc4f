//! Persisting the verified photo ("download").

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::error::LiveCheckError;
use crate::protocol::EncodedImage;

/// File name for a photo captured at `at`.
pub fn photo_file_name(at: DateTime<Local>) -> String {
    format!("liveliness-verified-{}.jpg", at.format("%Y%m%d-%H%M%S"))
}

/// Write `image` into `dir` under a generated name and return the path.
///
/// The directory is created if needed. An existing file is never
/// overwritten; a numeric suffix is appended instead.
pub async fn save_photo(dir: &Path, image: &EncodedImage) -> Result<PathBuf, LiveCheckError> {
    tokio::fs::create_dir_all(dir).await?;

    let (path, mut file) = create_unique(dir, &photo_file_name(Local::now())).await?;
    file.write_all(image.as_bytes()).await?;
    file.flush().await?;

    info!("saved verified photo to {}", path.display());
    Ok(path)
}

/// Atomically create a new file named `name`, or `stem-N.jpg` if taken.
async fn create_unique(dir: &Path, name: &str) -> Result<(PathBuf, File), LiveCheckError> {
    let stem = name.trim_end_matches(".jpg");
    let mut path = dir.join(name);
    let mut n = 1;
    loop {
        match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                path = dir.join(format!("{stem}-{n}.jpg"));
                n += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}
