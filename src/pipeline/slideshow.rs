//! Packaging slideshow images into a zip archive

use crate::error::Error;
use crate::types::JobId;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Scratch directory the images of job `id` are downloaded into
pub(crate) fn scratch_dir(download_dir: &Path, id: JobId) -> PathBuf {
    download_dir.join(format!("_slideshow_{id}"))
}

/// Store `images` (uncompressed) in a new archive at `zip_path`
///
/// Entries keep their file names, in the order given.
pub(crate) async fn write_archive(images: Vec<PathBuf>, zip_path: PathBuf) -> crate::Result<PathBuf> {
    tokio::task::spawn_blocking(move || write_archive_blocking(&images, &zip_path).map(|()| zip_path))
        .await
        .map_err(|e| Error::Other(format!("zip task failed: {e}")))?
}

fn write_archive_blocking(images: &[PathBuf], zip_path: &Path) -> crate::Result<()> {
    let file = std::fs::File::create(zip_path)?;
    let mut writer = zip::ZipWriter::new(file);
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);

    for image in images {
        let Some(name) = image.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        writer.start_file(name, options).map_err(zip_error)?;
        let bytes = std::fs::read(image)?;
        writer.write_all(&bytes)?;
    }
    writer.finish().map_err(zip_error)?;
    Ok(())
}

fn zip_error(e: zip::result::ZipError) -> Error {
    Error::Io(std::io::Error::other(format!("failed to write zip archive: {e}")))
}

/// Remove the scratch directory, logging instead of failing
pub(crate) async fn remove_scratch(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(dir = ?dir, error = %e, "failed to remove slideshow scratch directory");
    }
}
