//! Filesystem operations
//!
//! Handles file and directory operations.

use std::path::Path;

use crate::error::FilesystemError;

/// Create a directory and all parent directories
pub fn create_dir_all(path: &Path) -> Result<(), FilesystemError> {
    std::fs::create_dir_all(path).map_err(|e| FilesystemError::CreateDir {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Remove a directory and all its contents
pub fn remove_dir_all(path: &Path) -> Result<(), FilesystemError> {
    if path.exists() {
        std::fs::remove_dir_all(path).map_err(|e| FilesystemError::RemoveDir {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
    }
    Ok(())
}

/// Write content to a file
pub fn write_file(path: &Path, content: &str) -> Result<(), FilesystemError> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    std::fs::write(path, content).map_err(|e| FilesystemError::WriteFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Write content next to `path` and rename it into place
///
/// Readers observe either the old or the new content, never a partial write.
pub fn write_file_atomic(path: &Path, content: &str) -> Result<(), FilesystemError> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    write_file(&tmp, content)?;
    std::fs::rename(&tmp, path).map_err(|e| FilesystemError::WriteFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Read content from a file
pub fn read_file(path: &Path) -> Result<String, FilesystemError> {
    std::fs::read_to_string(path).map_err(|e| FilesystemError::ReadFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Copy a file into `dest_dir`, keeping its file name
pub fn copy_into(file: &Path, dest_dir: &Path) -> Result<std::path::PathBuf, FilesystemError> {
    create_dir_all(dest_dir)?;
    let dest = dest_dir.join(file.file_name().unwrap_or_default());
    std::fs::copy(file, &dest).map_err(|e| FilesystemError::CopyFile {
        from: file.to_path_buf(),
        to: dest.clone(),
        error: e.to_string(),
    })?;
    Ok(dest)
}
