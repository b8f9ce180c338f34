//! Binary fingerprints: the comparable value used to tell builds apart.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::time::UNIX_EPOCH;

/// How a fingerprint is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintMode {
    /// Modification time in nanoseconds since the epoch
    #[default]
    Mtime,
    /// SHA-256 of the file contents
    Sha256,
}

/// Identifies which build of a binary a file holds.
///
/// The value carries its mode as a prefix (`mtime:` or `sha256:`), so
/// fingerprints taken in different modes never compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint the file at `path`.
    pub fn of(path: &Path, mode: FingerprintMode) -> io::Result<Self> {
        match mode {
            FingerprintMode::Mtime => {
                let modified = path.metadata()?.modified()?;
                let nanos = modified
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_nanos())
                    .unwrap_or(0);
                Ok(Self(format!("mtime:{nanos}")))
            }
            FingerprintMode::Sha256 => {
                let mut reader = BufReader::new(File::open(path)?);
                let mut hasher = Sha256::new();
                let mut buffer = [0u8; 8192];
                loop {
                    let n = reader.read(&mut buffer)?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buffer[..n]);
                }
                Ok(Self(format!("sha256:{}", hex::encode(hasher.finalize()))))
            }
        }
    }

    /// Wrap an already computed fingerprint string.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    #[test]
    fn test_sha256_follows_content() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bin");

        fs::write(&path, "v1").unwrap();
        let first = Fingerprint::of(&path, FingerprintMode::Sha256).unwrap();
        assert!(first.as_str().starts_with("sha256:"));

        fs::write(&path, "v1").unwrap();
        assert_eq!(first, Fingerprint::of(&path, FingerprintMode::Sha256).unwrap());

        fs::write(&path, "v2").unwrap();
        assert_ne!(first, Fingerprint::of(&path, FingerprintMode::Sha256).unwrap());
    }

    #[test]
    fn test_mtime_follows_modification_time() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bin");
        fs::write(&path, "v1").unwrap();

        let file = File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000))
            .unwrap();
        let first = Fingerprint::of(&path, FingerprintMode::Mtime).unwrap();
        assert_eq!(first.as_str(), "mtime:1000000000000");

        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(2_000))
            .unwrap();
        assert_ne!(first, Fingerprint::of(&path, FingerprintMode::Mtime).unwrap());
    }

    #[test]
    fn test_modes_never_collide() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bin");
        fs::write(&path, "v1").unwrap();

        let mtime = Fingerprint::of(&path, FingerprintMode::Mtime).unwrap();
        let sha = Fingerprint::of(&path, FingerprintMode::Sha256).unwrap();
        assert_ne!(mtime, sha);
    }

    #[test]
    fn test_missing_file_is_error() {
        let temp = TempDir::new().unwrap();
        assert!(Fingerprint::of(&temp.path().join("nope"), FingerprintMode::Mtime).is_err());
    }
}
