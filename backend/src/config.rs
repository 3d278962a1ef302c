use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
const DEFAULT_SIGNED_URL_TTL_SECS: u64 = 60 * 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
    #[error("failed to read model config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse model config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StorageConfig {
    S3 {
        bucket: String,
    },
    Local {
        root: PathBuf,
        public_base_url: String,
        signing_key: String,
    },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub history_file: PathBuf,
    pub model_path: PathBuf,
    pub model_config: Option<PathBuf>,
    pub max_upload_bytes: usize,
    pub signed_url_ttl: Duration,
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let port = parse_or(get("PORT"), "PORT", DEFAULT_PORT)?;
        let max_upload_bytes =
            parse_or(get("MAX_UPLOAD_BYTES"), "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;
        let ttl_secs: u64 = parse_or(
            get("SIGNED_URL_TTL_SECS"),
            "SIGNED_URL_TTL_SECS",
            DEFAULT_SIGNED_URL_TTL_SECS,
        )?;
        if ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "SIGNED_URL_TTL_SECS",
                value: ttl_secs.to_string(),
            });
        }

        let storage = match get("STORAGE_BACKEND").as_deref().unwrap_or("s3") {
            "s3" => StorageConfig::S3 {
                bucket: get("S3_BUCKET_NAME").ok_or(ConfigError::Missing("S3_BUCKET_NAME"))?,
            },
            "local" => StorageConfig::Local {
                root: PathBuf::from(get("LOCAL_BUCKET_DIR").unwrap_or_else(|| "./bucket".into())),
                public_base_url: get("PUBLIC_BASE_URL")
                    .unwrap_or_else(|| format!("http://localhost:{}", port))
                    .trim_end_matches('/')
                    .to_string(),
                signing_key: get("URL_SIGNING_KEY").ok_or(ConfigError::Missing("URL_SIGNING_KEY"))?,
            },
            other => {
                return Err(ConfigError::Invalid {
                    key: "STORAGE_BACKEND",
                    value: other.to_string(),
                });
            }
        };

        Ok(Self {
            host: get("BIND_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            upload_dir: PathBuf::from(get("UPLOAD_DIR").unwrap_or_else(|| "./uploads".into())),
            history_file: PathBuf::from(
                get("HISTORY_FILE").unwrap_or_else(|| "prediction_history.json".into()),
            ),
            model_path: PathBuf::from(get("MODEL_PATH").unwrap_or_else(|| "model.pt".into())),
            model_config: get("MODEL_CONFIG").map(PathBuf::from),
            max_upload_bytes,
            signed_url_ttl: Duration::from_secs(ttl_secs),
            storage,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    #[default]
    Nhwc,
    Nchw,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub image_size: u32,
    pub labels: Option<Vec<String>>,
    pub layout: TensorLayout,
    pub apply_softmax: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            image_size: 150,
            labels: None,
            layout: TensorLayout::Nhwc,
            apply_softmax: false,
        }
    }
}

impl ModelConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&config_str)
    }

    pub fn from_yaml(config_str: &str) -> Result<Self, ConfigError> {
        let config: ModelConfig = serde_yaml::from_str(config_str)?;
        if config.image_size == 0 {
            return Err(ConfigError::Invalid {
                key: "image_size",
                value: "0".into(),
            });
        }
        Ok(config)
    }
}
