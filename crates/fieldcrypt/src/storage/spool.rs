use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::LedgerError;
use crate::sanitize;

const INPUT_PREFIX: &str = "input_";

/// Move a file from `src` to `dst`. Uses `rename` first and falls back to
/// copy + delete when the two paths are on different filesystems.
fn move_file(src: &Path, dst: &Path) -> io::Result<()> {
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    fs::copy(src, dst)?;
    fs::remove_file(src)
}

/// Per-job working directories under the configured work dir.
///
/// Layout: `<root>/<job_id>/input_<name>` for the spooled upload and
/// `<root>/<job_id>/<mode>_<name>` for the result.
#[derive(Debug, Clone)]
pub struct UploadSpool {
    root: PathBuf,
}

impl UploadSpool {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.root.join(job_id)
    }

    pub fn output_path(&self, job_id: &str, output_filename: &str) -> PathBuf {
        self.job_dir(job_id)
            .join(sanitize::safe_filename(output_filename))
    }

    /// Copies an upload stream into the job directory.
    pub fn persist_reader<R: Read>(
        &self,
        job_id: &str,
        filename: &str,
        mut upload: R,
    ) -> Result<PathBuf, LedgerError> {
        let path = self.input_path(job_id, filename)?;
        let persist_err = |source| LedgerError::PersistUpload {
            path: path.clone(),
            source,
        };

        let file = File::create(&path).map_err(persist_err)?;
        let mut writer = BufWriter::new(file);
        let bytes = io::copy(&mut upload, &mut writer).map_err(persist_err)?;
        writer.flush().map_err(persist_err)?;

        debug!(
            "Spooled {} bytes for job {} to {}",
            bytes,
            job_id,
            sanitize::redact_path(&path)
        );
        Ok(path)
    }

    /// Moves an already-written upload into the job directory.
    pub fn persist_file(
        &self,
        job_id: &str,
        filename: &str,
        src: &Path,
    ) -> Result<PathBuf, LedgerError> {
        let path = self.input_path(job_id, filename)?;
        move_file(src, &path).map_err(|source| LedgerError::PersistUpload {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Deletes a spooled input. Missing files are fine.
    pub fn discard(&self, path: &Path) {
        match fs::remove_file(path) {
            Ok(()) => debug!("Removed spooled input {}", sanitize::redact_path(path)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove spooled input {}: {}",
                sanitize::redact_path(path),
                e
            ),
        }
    }

    /// Removes a job directory once nothing is left in it.
    pub fn remove_job_dir(&self, job_id: &str) {
        let dir = self.job_dir(job_id);
        if let Err(e) = fs::remove_dir(&dir) {
            if e.kind() != io::ErrorKind::NotFound {
                debug!("Job directory for {} not removed: {}", job_id, e);
            }
        }
    }

    fn input_path(&self, job_id: &str, filename: &str) -> Result<PathBuf, LedgerError> {
        let dir = self.job_dir(job_id);
        fs::create_dir_all(&dir).map_err(|source| LedgerError::CreateDirectory {
            path: dir.clone(),
            source,
        })?;
        Ok(dir.join(format!(
            "{}{}",
            INPUT_PREFIX,
            sanitize::safe_filename(filename)
        )))
    }
}
