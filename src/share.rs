use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Platform share facility
pub trait ShareTarget: Send + Sync + 'static {
    fn is_available(&self) -> bool;

    /// Hand the file off; returns where it ended up.
    fn share(&self, path: &Path) -> io::Result<PathBuf>;
}

/// Result of handing the log artifact to a share target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Shared(PathBuf),
    Unavailable,
    Failed(String),
}

impl ExportOutcome {
    pub fn is_shared(&self) -> bool {
        matches!(self, ExportOutcome::Shared(_))
    }

    /// User-facing message
    pub fn message(&self) -> String {
        match self {
            ExportOutcome::Shared(path) => format!("Log file shared to {}", path.display()),
            ExportOutcome::Unavailable => "Sharing is not available on this device".to_string(),
            ExportOutcome::Failed(_) => "An error occurred while sharing the log file".to_string(),
        }
    }
}

/// Share target that copies the artifact into a directory
pub struct DirectoryShare {
    dir: PathBuf,
}

impl DirectoryShare {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ShareTarget for DirectoryShare {
    fn is_available(&self) -> bool {
        self.dir.is_dir()
    }

    fn share(&self, path: &Path) -> io::Result<PathBuf> {
        let name = path.file_name().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "log path has no file name")
        })?;
        let dest = self.dir.join(name);
        fs::copy(path, &dest)?;
        Ok(dest)
    }
}

/// Run an export, mapping every failure to an outcome instead of an error.
pub fn export(target: Option<&dyn ShareTarget>, path: Option<&Path>) -> ExportOutcome {
    let target = match target {
        Some(t) if t.is_available() => t,
        _ => return ExportOutcome::Unavailable,
    };
    let path = match path {
        Some(p) if p.is_file() => p,
        Some(p) => return ExportOutcome::Failed(format!("{} does not exist", p.display())),
        None => return ExportOutcome::Failed("no log file yet".to_string()),
    };

    match target.share(path) {
        Ok(dest) => {
            log::info!("[share] exported {} to {}", path.display(), dest.display());
            ExportOutcome::Shared(dest)
        }
        Err(e) => {
            log::error!("[share] export of {} failed: {}", path.display(), e);
            ExportOutcome::Failed(e.to_string())
        }
    }
}
