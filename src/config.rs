use serde::Deserialize;
use std::env;
use std::path::PathBuf;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub temp_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub lm_studio: LmStudioConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LmStudioConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub embedding_batch_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub version: String,
    pub chunk_target_tokens: usize,
    pub chunk_min_tokens: usize,
    pub chunk_max_tokens: usize,
    pub chunk_overlap_tokens: usize,
    pub max_file_size_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = env::var("KR_DATA_DIR").map(PathBuf::from).unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".knowledge-refinery")
        });

        Self {
            db_path: data_dir.join("refinery.db"),
            temp_dir: data_dir.join("tmp"),
            data_dir,
            host: env::var("KR_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_env_or("KR_PORT", 8742),
            lm_studio: LmStudioConfig {
                base_url: env::var("KR_LM_STUDIO_URL")
                    .unwrap_or_else(|_| "http://127.0.0.1:1234/v1".to_string()),
                timeout_secs: parse_env_or("KR_LM_TIMEOUT_SECS", 120),
                embedding_batch_size: parse_env_or("KR_EMBED_BATCH_SIZE", 32),
            },
            pipeline: PipelineConfig {
                version: env::var("KR_PIPELINE_VERSION").unwrap_or_else(|_| "v1.0".to_string()),
                chunk_target_tokens: parse_env_or("KR_CHUNK_TARGET_TOKENS", 600),
                chunk_min_tokens: parse_env_or("KR_CHUNK_MIN_TOKENS", 400),
                chunk_max_tokens: parse_env_or("KR_CHUNK_MAX_TOKENS", 800),
                chunk_overlap_tokens: parse_env_or("KR_CHUNK_OVERLAP_TOKENS", 50),
                max_file_size_bytes: parse_env_or("KR_MAX_FILE_SIZE_BYTES", 500 * 1024 * 1024),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Point the workspace at a different directory, recomputing derived paths.
    pub fn set_data_dir(&mut self, data_dir: PathBuf) {
        self.db_path = data_dir.join("refinery.db");
        self.temp_dir = data_dir.join("tmp");
        self.data_dir = data_dir;
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.temp_dir)?;
        Ok(())
    }

    pub fn pid_path(&self) -> PathBuf {
        self.data_dir.join("daemon.pid")
    }
}
