// Config handling: a TOML file under the user's config directory, overlaid
// with command-line flags and environment variables (resolved by clap).
//
// Priority: flag/env > config file > built-in defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::{Error, Result};

pub const DEFAULT_API_URL: &str = "http://vega.ii.uam.es:8080/api";
pub const DEFAULT_FILES_DIR: &str = "files";
pub const DEFAULT_SIGNED_PREFIX: &str = "signed_";
pub const DEFAULT_ENC_PREFIX: &str = "enc_";

/// REST endpoint paths, relative to the API base URL.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Endpoints {
    pub upload: String,
    pub download: String,
    pub list: String,
    pub delete_file: String,
    pub public_key: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints {
            upload: "upload".into(),
            download: "download".into(),
            list: "list".into(),
            delete_file: "delete_file".into(),
            public_key: "getPublicKey".into(),
        }
    }
}

/// On-disk shape of `config.toml`. Every field is optional.
#[derive(Deserialize, Debug, Default)]
pub struct ConfigFile {
    pub api_url: Option<String>,
    pub token: Option<String>,
    pub files_dir: Option<PathBuf>,
    pub private_key: Option<PathBuf>,
    pub signed_prefix: Option<String>,
    pub enc_prefix: Option<String>,
    #[serde(default)]
    pub endpoints: Endpoints,
}

impl ConfigFile {
    /// Load the config file, returning defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("no config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::io(format!("reading {}", path.display()), e))?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }
}

/// Values given on the command line or through the environment.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub api_url: Option<String>,
    pub token: Option<String>,
    pub files_dir: Option<PathBuf>,
}

/// Fully resolved settings used by the commands.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_url: String,
    token: Option<String>,
    pub files_dir: PathBuf,
    pub private_key: PathBuf,
    pub signed_prefix: String,
    pub enc_prefix: String,
    pub endpoints: Endpoints,
}

impl Settings {
    pub fn resolve(file: ConfigFile, overrides: Overrides) -> Self {
        let private_key = match file.private_key {
            Some(p) => expand_home(&p),
            None => config_dir()
                .map(|d| d.join("private_key.pem"))
                .unwrap_or_else(|_| PathBuf::from("private_key.pem")),
        };
        Settings {
            api_url: overrides
                .api_url
                .or(file.api_url)
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            token: overrides.token.or(file.token).filter(|t| !t.is_empty()),
            files_dir: overrides
                .files_dir
                .or(file.files_dir)
                .map(|p| expand_home(&p))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FILES_DIR)),
            private_key,
            signed_prefix: file
                .signed_prefix
                .unwrap_or_else(|| DEFAULT_SIGNED_PREFIX.to_string()),
            enc_prefix: file
                .enc_prefix
                .unwrap_or_else(|| DEFAULT_ENC_PREFIX.to_string()),
            endpoints: file.endpoints,
        }
    }

    /// The bearer token; remote actions cannot run without one.
    pub fn token(&self) -> Result<&str> {
        self.token.as_deref().ok_or_else(|| {
            Error::Config(
                "no API token configured. Set `token` in config.toml, SECUREBOX_TOKEN or --token"
                    .into(),
            )
        })
    }

    /// Make sure the files directory exists and return it.
    pub fn ensure_files_dir(&self) -> Result<&Path> {
        std::fs::create_dir_all(&self.files_dir)
            .map_err(|e| Error::io(format!("creating {}", self.files_dir.display()), e))?;
        Ok(&self.files_dir)
    }
}

pub fn config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join("securebox"))
        .ok_or_else(|| Error::Config("could not determine config directory".into()))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}
