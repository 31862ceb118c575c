use serde::{Deserialize, Serialize};
use std::{
    fmt,
    fs::File,
    io::{self, Write},
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::render::RenderedImage;

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("destination '{0}' does not name a file")]
    InvalidDestination(PathBuf),

    #[error("Failed to create temporary file in {}", dir.display())]
    CreateTemp {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write output for {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to set mode {mode} for {}", path.display())]
    Permissions {
        path: PathBuf,
        mode: FileMode,
        #[source]
        source: io::Error,
    },

    #[error("Failed to move output into place at {}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Unix permission bits for the installed file, written in octal (`"644"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileMode(u32);

impl FileMode {
    pub const MAX: u32 = 0o7777;

    pub fn new(bits: u32) -> Result<Self, String> {
        if bits > Self::MAX {
            return Err(format!("file mode {bits:o} is out of range (max 7777)"));
        }
        Ok(Self(bits))
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl Default for FileMode {
    fn default() -> Self {
        Self(0o644)
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04o}", self.0)
    }
}

impl FromStr for FileMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0o")
            .or_else(|| trimmed.strip_prefix("0O"))
            .unwrap_or(trimmed);

        let invalid = || format!("invalid file mode '{s}': expected octal digits like 644");

        // from_str_radix would also take a leading sign.
        if digits.is_empty() || !digits.bytes().all(|b| (b'0'..=b'7').contains(&b)) {
            return Err(invalid());
        }
        let bits = u32::from_str_radix(digits, 8).map_err(|_| invalid())?;
        Self::new(bits)
    }
}

impl TryFrom<String> for FileMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FileMode> for String {
    fn from(mode: FileMode) -> Self {
        mode.to_string()
    }
}

/// Writes the rendered image to its destination.
///
/// The bytes go to a temporary file next to the destination, which is then
/// renamed over it. A failed run leaves the previous file untouched.
#[derive(Debug, Clone)]
pub struct Installer {
    destination: PathBuf,
    mode: FileMode,
}

impl Installer {
    pub fn new(destination: impl Into<PathBuf>, mode: FileMode) -> Self {
        Self { destination: destination.into(), mode }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn install(&self, image: &RenderedImage) -> Result<PathBuf, InstallError> {
        let path = self.destination.as_path();
        if path.file_name().is_none() {
            return Err(InstallError::InvalidDestination(path.to_path_buf()));
        }

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::Builder::new()
            .prefix(".kindle-weather-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|source| InstallError::CreateTemp { dir: dir.to_path_buf(), source })?;

        debug!(tmp = %tmp.path().display(), bytes = image.bytes.len(), "writing temporary output");

        let write_err = |source| InstallError::Write { path: path.to_path_buf(), source };
        tmp.write_all(&image.bytes).map_err(write_err)?;
        tmp.flush().map_err(write_err)?;

        set_mode(tmp.as_file(), self.mode).map_err(|source| InstallError::Permissions {
            path: path.to_path_buf(),
            mode: self.mode,
            source,
        })?;
        tmp.as_file().sync_all().map_err(write_err)?;

        tmp.persist(path)
            .map_err(|e| InstallError::Persist { path: path.to_path_buf(), source: e.error })?;

        info!(destination = %path.display(), mode = %self.mode, format = %image.format, "installed weather image");

        Ok(path.to_path_buf())
    }
}

#[cfg(unix)]
fn set_mode(file: &File, mode: FileMode) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    file.set_permissions(std::fs::Permissions::from_mode(mode.bits()))
}

#[cfg(not(unix))]
fn set_mode(_file: &File, mode: FileMode) -> io::Result<()> {
    debug!(%mode, "file modes are not supported on this platform, skipping");
    Ok(())
}
