//! Run and rollback slots for one site.
//!
//! Workers are never executed from their build output. The image is copied
//! into a per-site run slot, so a rebuild can overwrite the build output while
//! the old image keeps running. Each slot has a sidecar file with the
//! fingerprint of the build it was copied from.
//!
//! ```text
//! <run_dir>/<site>/<site>                      run slot
//! <run_dir>/<site>/<site>.fingerprint
//! <run_dir>/<site>/<site>.rollback             last image confirmed running
//! <run_dir>/<site>/<site>.rollback.fingerprint
//! ```
//!
//! Images are copied to a temporary file and renamed into place. The rename
//! swaps the directory entry without touching an inode that may be executing.

use std::fs::{self, Permissions};
use std::io::{self, ErrorKind};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::fingerprint::Fingerprint;

const EXECUTABLE_MODE: u32 = 0o755;

#[derive(Debug, Clone)]
pub struct SiteSlots {
    dir: PathBuf,
    run: PathBuf,
    rollback: PathBuf,
}

impl SiteSlots {
    pub fn new(run_dir: &Path, site: &str) -> Self {
        let dir = run_dir.join(site);
        Self {
            run: dir.join(site),
            rollback: dir.join(format!("{site}.rollback")),
            dir,
        }
    }

    /// Path the worker is executed from.
    pub fn run_path(&self) -> &Path {
        &self.run
    }

    pub fn rollback_path(&self) -> &Path {
        &self.rollback
    }

    /// Fingerprint of the image in the run slot, if one is deployed.
    pub fn deployed_fingerprint(&self) -> io::Result<Option<Fingerprint>> {
        read_fingerprint(&self.run)
    }

    /// Fingerprint of the image in the rollback slot, if one exists.
    pub fn rollback_fingerprint(&self) -> io::Result<Option<Fingerprint>> {
        read_fingerprint(&self.rollback)
    }

    /// Copy `source` into the run slot and record its fingerprint.
    pub fn deploy(&self, source: &Path, fingerprint: &Fingerprint) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        self.install(source, &self.run, fingerprint)
    }

    /// Copy the run slot image into the rollback slot.
    ///
    /// Returns the backed-up fingerprint, or `None` if nothing is deployed.
    pub fn backup(&self) -> io::Result<Option<Fingerprint>> {
        let Some(fingerprint) = self.deployed_fingerprint()? else {
            return Ok(None);
        };
        self.install(&self.run, &self.rollback, &fingerprint)?;
        Ok(Some(fingerprint))
    }

    /// Copy the rollback image back into the run slot.
    ///
    /// Returns the restored fingerprint, or `None` if there is no rollback
    /// image.
    pub fn restore(&self) -> io::Result<Option<Fingerprint>> {
        let Some(fingerprint) = self.rollback_fingerprint()? else {
            return Ok(None);
        };
        self.install(&self.rollback, &self.run, &fingerprint)?;
        Ok(Some(fingerprint))
    }

    fn install(&self, source: &Path, target: &Path, fingerprint: &Fingerprint) -> io::Result<()> {
        // Closed before the copy so no writable descriptor survives into exec
        let temp = tempfile::Builder::new()
            .prefix(".deploy-")
            .tempfile_in(&self.dir)?
            .into_temp_path();
        fs::copy(source, &temp)?;
        fs::set_permissions(&temp, Permissions::from_mode(EXECUTABLE_MODE))?;
        temp.persist(target).map_err(|e| e.error)?;
        fs::write(sidecar(target), fingerprint.as_str())
    }
}

fn sidecar(image: &Path) -> PathBuf {
    let mut name = image.as_os_str().to_owned();
    name.push(".fingerprint");
    PathBuf::from(name)
}

fn read_fingerprint(image: &Path) -> io::Result<Option<Fingerprint>> {
    if !image.is_file() {
        return Ok(None);
    }
    match fs::read_to_string(sidecar(image)) {
        Ok(raw) => Ok(Some(Fingerprint::from_raw(raw.trim()))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fp(raw: &str) -> Fingerprint {
        Fingerprint::from_raw(raw)
    }

    #[test]
    fn test_layout() {
        let slots = SiteSlots::new(Path::new("/state/run"), "api");
        assert_eq!(slots.run_path(), Path::new("/state/run/api/api"));
        assert_eq!(slots.rollback_path(), Path::new("/state/run/api/api.rollback"));
    }

    #[test]
    fn test_empty_slots() {
        let temp = TempDir::new().unwrap();
        let slots = SiteSlots::new(temp.path(), "api");

        assert_eq!(slots.deployed_fingerprint().unwrap(), None);
        assert_eq!(slots.backup().unwrap(), None);
        assert_eq!(slots.restore().unwrap(), None);
    }

    #[test]
    fn test_deploy_is_executable_copy() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("build");
        fs::write(&source, "v1").unwrap();
        let slots = SiteSlots::new(&temp.path().join("run"), "api");

        slots.deploy(&source, &fp("sha256:1")).unwrap();

        assert_eq!(fs::read_to_string(slots.run_path()).unwrap(), "v1");
        assert_eq!(slots.deployed_fingerprint().unwrap(), Some(fp("sha256:1")));
        let mode = fs::metadata(slots.run_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, EXECUTABLE_MODE);

        // The build output can change without touching the run slot
        fs::write(&source, "v2").unwrap();
        assert_eq!(fs::read_to_string(slots.run_path()).unwrap(), "v1");
    }

    #[test]
    fn test_backup_then_restore() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("build");
        let slots = SiteSlots::new(&temp.path().join("run"), "api");

        fs::write(&source, "v1").unwrap();
        slots.deploy(&source, &fp("sha256:1")).unwrap();
        assert_eq!(slots.backup().unwrap(), Some(fp("sha256:1")));

        fs::write(&source, "v2").unwrap();
        slots.deploy(&source, &fp("sha256:2")).unwrap();
        assert_eq!(fs::read_to_string(slots.run_path()).unwrap(), "v2");
        assert_eq!(slots.rollback_fingerprint().unwrap(), Some(fp("sha256:1")));

        assert_eq!(slots.restore().unwrap(), Some(fp("sha256:1")));
        assert_eq!(fs::read_to_string(slots.run_path()).unwrap(), "v1");
        assert_eq!(slots.deployed_fingerprint().unwrap(), Some(fp("sha256:1")));
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("build");
        fs::write(&source, "v1").unwrap();
        let slots = SiteSlots::new(&temp.path().join("run"), "api");

        slots.deploy(&source, &fp("sha256:1")).unwrap();
        slots.backup().unwrap();

        let leftovers: Vec<_> = fs::read_dir(temp.path().join("run").join("api"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".deploy-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_deploy_missing_source_fails() {
        let temp = TempDir::new().unwrap();
        let slots = SiteSlots::new(temp.path(), "api");
        assert!(slots
            .deploy(&temp.path().join("missing"), &fp("sha256:1"))
            .is_err());
        assert_eq!(slots.deployed_fingerprint().unwrap(), None);
    }
}
