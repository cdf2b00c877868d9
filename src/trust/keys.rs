//! Local cluster key pair management.

use std::ffi::OsString;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::info;

use crate::exec::{CommandRunner, ExecError};
use crate::files;

use super::TrustError;

/// Cluster-wide key pair installed on every node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyPair {
    /// Local path of the private key.
    pub private_key_path: Utf8PathBuf,
    /// Public key line, trimmed.
    pub public_key: String,
}

impl KeyPair {
    /// Local path of the public key (`<private>.pub`).
    #[must_use]
    pub fn public_key_path(&self) -> Utf8PathBuf {
        public_key_path(&self.private_key_path)
    }
}

fn public_key_path(private_key_path: &Utf8Path) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{private_key_path}.pub"))
}

fn key_file_error(path: &Utf8Path) -> impl FnOnce(std::io::Error) -> TrustError + '_ {
    move |err| TrustError::KeyFile {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Returns the key pair at `path`, generating an RSA key pair without a
/// passphrase when the private key is absent.
///
/// An existing private key is never regenerated. When only its public half
/// is missing, the public key is derived with `ssh-keygen -y`.
///
/// # Errors
///
/// Returns [`TrustError::KeyGeneration`] when `ssh-keygen` fails and
/// [`TrustError::KeyFile`] when key files cannot be read, written, or
/// restricted.
pub async fn ensure_local_key_pair<R: CommandRunner>(
    runner: &R,
    keygen_bin: &str,
    path: &Utf8Path,
) -> Result<KeyPair, TrustError> {
    let public_path = public_key_path(path);

    if files::exists(path).map_err(key_file_error(path))? {
        if !files::exists(&public_path).map_err(key_file_error(&public_path))? {
            derive_public_key(runner, keygen_bin, path, &public_path).await?;
        }
        let public_key = files::read_text(&public_path).map_err(key_file_error(&public_path))?;
        return Ok(KeyPair {
            private_key_path: path.to_path_buf(),
            public_key: public_key.trim().to_owned(),
        });
    }

    files::create_parent(path).map_err(key_file_error(path))?;
    let args = [
        "-t",
        "rsa",
        "-b",
        "4096",
        "-N",
        "",
        "-q",
        "-C",
        "ecsfleet-cluster",
        "-f",
        path.as_str(),
    ]
    .map(OsString::from);
    let output = runner.run(keygen_bin, &args).await?;
    if !output.is_success() {
        return Err(TrustError::KeyGeneration(ExecError::failure(keygen_bin, output)));
    }
    files::set_mode(path, 0o600).map_err(key_file_error(path))?;
    files::set_mode(&public_path, 0o644).map_err(key_file_error(&public_path))?;
    info!(path = %path, "generated cluster key pair");

    let public_key = files::read_text(&public_path).map_err(key_file_error(&public_path))?;
    Ok(KeyPair {
        private_key_path: path.to_path_buf(),
        public_key: public_key.trim().to_owned(),
    })
}

async fn derive_public_key<R: CommandRunner>(
    runner: &R,
    keygen_bin: &str,
    path: &Utf8Path,
    public_path: &Utf8Path,
) -> Result<(), TrustError> {
    let args = ["-y", "-f", path.as_str()].map(OsString::from);
    let output = runner.run(keygen_bin, &args).await?;
    if !output.is_success() {
        return Err(TrustError::KeyGeneration(ExecError::failure(keygen_bin, output)));
    }
    let rendered = format!("{}\n", output.stdout.trim());
    files::write_text(public_path, &rendered).map_err(key_file_error(public_path))?;
    files::set_mode(public_path, 0o644).map_err(key_file_error(public_path))?;
    info!(path = %public_path, "derived missing public key");
    Ok(())
}
