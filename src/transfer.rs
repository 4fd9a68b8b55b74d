//! Recursive directory upload

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::container::UploadSummary;
use crate::error::{EdgeError, Result};
use crate::service::ContainerService;

/// A local file and where it goes in the container
#[derive(Debug, Clone, PartialEq, Eq)]
struct Planned {
    local: PathBuf,
    remote: String,
}

/// Every regular file under `root`, mapped below `remote_root`. Sorted so
/// uploads happen in a stable order.
fn plan(root: &Path, remote_root: &str) -> Result<Vec<Planned>> {
    if !root.is_dir() {
        return Err(EdgeError::Transfer(format!("{} is not a directory", root.display())));
    }

    let mut planned = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir).map_err(|e| transfer_error(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| transfer_error(&dir, e))?;
            let path = entry.path();
            let mut file_type = entry.file_type().map_err(|e| transfer_error(&path, e))?;

            // file symlinks upload their target; directory symlinks are refused
            if file_type.is_symlink() {
                file_type = fs::metadata(&path).map_err(|e| transfer_error(&path, e))?.file_type();
                if file_type.is_dir() {
                    return Err(EdgeError::Transfer(format!(
                        "{}: symlinked directories are not uploaded",
                        path.display()
                    )));
                }
            }

            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let relative = path
                    .strip_prefix(root)
                    .map_err(|e| EdgeError::Transfer(e.to_string()))?;
                let parts: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                planned.push(Planned {
                    remote: format!("{}/{}", remote_root.trim_end_matches('/'), parts.join("/")),
                    local: path,
                });
            }
        }
    }

    planned.sort_by(|a, b| a.remote.cmp(&b.remote));
    Ok(planned)
}

fn transfer_error(path: &Path, e: std::io::Error) -> EdgeError {
    EdgeError::Transfer(format!("{}: {}", path.display(), e))
}

#[cfg(unix)]
fn file_mode(path: &Path) -> Result<u32> {
    use std::os::unix::fs::PermissionsExt;
    let metadata = fs::metadata(path).map_err(|e| transfer_error(path, e))?;
    Ok(metadata.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> Result<u32> {
    Ok(0o644)
}

/// Copy `local` into the container at `remote`, recursively.
///
/// # Errors
///
/// Any local I/O failure or failed upload is an [`EdgeError::Transfer`].
#[instrument(skip(service))]
pub async fn upload_directory<S>(service: &S, container_id: &str, local: &Path, remote: &str) -> Result<UploadSummary>
where
    S: ContainerService + ?Sized,
{
    let files = plan(local, remote)?;
    let mut summary = UploadSummary::default();

    for file in &files {
        let content = tokio::fs::read(&file.local)
            .await
            .map_err(|e| transfer_error(&file.local, e))?;
        let mode = file_mode(&file.local)?;
        debug!(remote = %file.remote, bytes = content.len(), "Uploading");

        service
            .upload_file(container_id, &file.remote, &content, mode)
            .await
            .map_err(|e| match e {
                EdgeError::Transfer(_) => e,
                other => EdgeError::Transfer(format!("{}: {}", file.remote, other)),
            })?;

        summary.files += 1;
        summary.bytes += content.len() as u64;
    }

    info!(files = summary.files, bytes = summary.bytes, "Upload complete");
    Ok(summary)
}
