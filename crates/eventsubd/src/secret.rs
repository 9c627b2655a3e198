use crate::error::ServerError;
use std::path::Path;
use tracing::info;
use zeroize::Zeroizing;

/// Shortest secret accepted when creating a subscription.
pub const MIN_SECRET_LEN: usize = 10;
/// Longest secret accepted when creating a subscription.
pub const MAX_SECRET_LEN: usize = 100;

/// Holder of the shared secret used to sign webhook messages.
pub trait SecretSource: Send + Sync {
    /// The secret bytes used as the HMAC key.
    fn signing_secret(&self) -> &[u8];
}

/// A secret held in memory that is wiped on drop.
pub struct StaticSecret(Zeroizing<Vec<u8>>);

impl StaticSecret {
    /// Wraps `secret`, checking its length.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Secret`] if the secret is outside
    /// [`MIN_SECRET_LEN`]..=[`MAX_SECRET_LEN`] bytes.
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self, ServerError> {
        let secret = Zeroizing::new(secret.into());
        if !(MIN_SECRET_LEN..=MAX_SECRET_LEN).contains(&secret.len()) {
            return Err(ServerError::Secret(format!(
                "secret must be {MIN_SECRET_LEN} to {MAX_SECRET_LEN} bytes, got {}",
                secret.len()
            )));
        }
        Ok(Self(secret))
    }

    /// Reads the secret from a file, trimming a trailing newline.
    ///
    /// On unix the file must not be readable by group or others.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Secret`] if the file is too permissive or the
    /// secret has the wrong length, [`ServerError::Io`] if it cannot be read.
    pub fn from_file(path: &Path) -> Result<Self, ServerError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(path)?.permissions().mode();
            if mode & 0o077 != 0 {
                return Err(ServerError::Secret(format!(
                    "secret file permissions too open: {:o}. Expected 0600",
                    mode & 0o777
                )));
            }
        }

        let mut data = Zeroizing::new(std::fs::read(path)?);
        while matches!(data.last(), Some(b'\n' | b'\r')) {
            data.pop();
        }
        let secret = Self::new(data.to_vec())?;
        info!("loaded signing secret from {}", path.display());
        Ok(secret)
    }
}

impl SecretSource for StaticSecret {
    fn signing_secret(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for StaticSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StaticSecret").field(&"<redacted>").finish()
    }
}
