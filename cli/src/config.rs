use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

use heft_core::auth::{AuthState, UserId};

pub const DATA_DIR_ENV: &str = "HEFT_DATA_DIR";

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        let data_dir = match std::env::var_os(DATA_DIR_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => ProjectDirs::from("", "", "heft")
                .context("Could not determine home directory")?
                .data_dir()
                .to_path_buf(),
        };
        Self::at(&data_dir)
    }

    pub fn at(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Ok(Config {
            db_path: data_dir.join("heft.db"),
            data_dir: data_dir.to_path_buf(),
        })
    }

    fn session_path(&self) -> PathBuf {
        self.data_dir.join("session")
    }

    /// The signed-in identity persisted by `heft login`, if any.
    pub fn load_session(&self) -> Result<AuthState> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(AuthState::Unauthenticated);
        }
        let raw = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(AuthState::Unauthenticated);
        }
        let user = UserId::parse(raw)
            .with_context(|| format!("Corrupt session file: {}", path.display()))?;
        Ok(AuthState::SignedIn(user))
    }

    pub fn save_session(&self, user: &UserId) -> Result<()> {
        std::fs::write(self.session_path(), user.as_str()).context("Failed to write session file")
    }

    /// Returns whether a session file was removed.
    pub fn clear_session(&self) -> Result<bool> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path).context("Failed to remove session file")?;
        Ok(true)
    }

    /// Load the API key from disk, or generate a new one.
    ///
    /// Returns `(key, newly_created)`.
    pub fn load_or_create_api_key(&self) -> Result<(String, bool)> {
        use rand::Rng;
        use std::fmt::Write;

        let path = self.data_dir.join("api_key");

        if path.exists() {
            let key = std::fs::read_to_string(&path).context("Failed to read API key file")?;
            let key = key.trim().to_string();
            if !key.is_empty() {
                return Ok((key, false));
            }
        }

        let bytes: [u8; 32] = rand::rng().random();
        let key = bytes
            .iter()
            .fold(String::with_capacity(64), |mut acc: String, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            });
        std::fs::write(&path, &key).context("Failed to write API key file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set API key file permissions")?;
        }
        Ok((key, true))
    }
}
