// src/device/chardev.rs
//! Character special device validation

use std::{fmt, io, path::Path};

#[derive(Debug)]
pub enum PathError {
    NotFound(String),
    WrongType { path: String, kind: &'static str },
    Inaccessible { path: String, source: io::Error },
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::NotFound(path) => write!(f, "file {} doesn't exist", path),
            PathError::WrongType { path, kind } => {
                write!(f, "{} should be a char device (got: {})", path, kind)
            }
            PathError::Inaccessible { path, source } => {
                write!(f, "unable to use {} as input: {}", path, source)
            }
        }
    }
}

impl std::error::Error for PathError {}

/// Confirm `path` is a character device node and nothing else
pub fn validate(path: &Path) -> Result<(), PathError> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(PathError::NotFound(path.display().to_string()));
        }
        Err(source) => {
            return Err(PathError::Inaccessible {
                path: path.display().to_string(),
                source,
            });
        }
    };

    let kind = node_kind(&metadata.file_type());
    if kind != "char device" {
        return Err(PathError::WrongType {
            path: path.display().to_string(),
            kind,
        });
    }

    Ok(())
}

#[cfg(unix)]
fn node_kind(file_type: &std::fs::FileType) -> &'static str {
    use std::os::unix::fs::FileTypeExt;

    if file_type.is_char_device() {
        "char device"
    } else if file_type.is_block_device() {
        "block device"
    } else if file_type.is_dir() {
        "directory"
    } else if file_type.is_fifo() {
        "fifo"
    } else if file_type.is_socket() {
        "socket"
    } else {
        "regular file"
    }
}

#[cfg(not(unix))]
fn node_kind(file_type: &std::fs::FileType) -> &'static str {
    if file_type.is_dir() {
        "directory"
    } else {
        "regular file"
    }
}
