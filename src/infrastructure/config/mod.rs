use crate::error::{AppError, AppResult};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub aws_region: String,
    pub environment: Environment,
    pub log_format: LogFormat,
    // Object stores
    pub r2: R2Config,
    pub cos: CosConfig,
    // Audio pipeline
    pub pipeline: PipelineConfig,
    pub staging: StagingConfig,
    // Episode documents
    pub episodes: EpisodeStoreConfig,
    pub batch_input_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Cloudflare R2 credentials (store A)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct R2Config {
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub endpoint_url: String,
    pub account_id: String,
}

impl R2Config {
    /// All fields needed to list, check and upload are present
    pub fn require(&self) -> AppResult<()> {
        require_fields(
            "R2",
            &[
                ("R2_BUCKET_NAME", &self.bucket),
                ("R2_ACCESS_KEY_ID", &self.access_key_id),
                ("R2_SECRET_ACCESS_KEY", &self.secret_access_key),
                ("R2_ENDPOINT_URL", &self.endpoint_url),
            ],
        )
    }

    pub fn is_usable(&self) -> bool {
        self.require().is_ok()
    }

    pub fn public_url(&self, object_key: &str) -> Option<String> {
        if self.account_id.is_empty() || self.bucket.is_empty() {
            return None;
        }
        Some(format!(
            "https://{}.{}.r2.cloudflarestorage.com/{}",
            self.bucket, self.account_id, object_key
        ))
    }
}

/// Tencent Cloud COS credentials (store B)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CosConfig {
    pub secret_id: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
}

impl CosConfig {
    pub fn require(&self) -> AppResult<()> {
        require_fields(
            "COS",
            &[
                ("COS_SECRET_ID", &self.secret_id),
                ("COS_SECRET_KEY", &self.secret_key),
                ("COS_BUCKET", &self.bucket),
                ("COS_REGION", &self.region),
            ],
        )
    }

    pub fn is_usable(&self) -> bool {
        self.require().is_ok()
    }

    /// Virtual-hosted bucket host, e.g. `media-1250000000.cos.ap-shanghai.myqcloud.com`
    pub fn host(&self) -> String {
        format!("{}.cos.{}.myqcloud.com", self.bucket, self.region)
    }

    pub fn public_url(&self, object_key: &str) -> Option<String> {
        if self.bucket.is_empty() || self.region.is_empty() {
            return None;
        }
        Some(format!("https://{}/{}", self.host(), object_key))
    }
}

fn require_fields(store: &str, fields: &[(&str, &String)]) -> AppResult<()> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| *name)
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(AppError::ConfigurationIncomplete(format!(
        "{} missing {}",
        store,
        missing.join(", ")
    )))
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub max_concurrent_audio: usize,
    pub max_concurrent_r2: usize,
    pub max_workers_cos: usize,
    /// Blocking pool size for sentence enhancement calls
    pub max_workers_enhancement: usize,
    pub audio_timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub r2_teardown_grace_ms: u64,
    pub voice: String,
}

impl PipelineConfig {
    pub fn audio_timeout(&self) -> Duration {
        Duration::from_secs(self.audio_timeout_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn r2_teardown_grace(&self) -> Duration {
        Duration::from_millis(self.r2_teardown_grace_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_audio: 3,
            max_concurrent_r2: 10,
            max_workers_cos: 4,
            max_workers_enhancement: 4,
            audio_timeout_seconds: 30,
            max_retries: 2,
            retry_delay_ms: 1000,
            r2_teardown_grace_ms: 2000,
            voice: "Joanna".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StagingConfig {
    pub sentence_dir: PathBuf,
    pub phrase_dir: PathBuf,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            sentence_dir: PathBuf::from("audio/sentences"),
            phrase_dir: PathBuf::from("audio/expressionss"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EpisodeStoreConfig {
    pub storage_dir: PathBuf,
    pub write_lock_timeout_secs: u64,
    pub read_lock_timeout_secs: u64,
    pub lock_poll_interval_ms: u64,
}

impl EpisodeStoreConfig {
    pub fn write_lock_timeout(&self) -> Duration {
        Duration::from_secs(self.write_lock_timeout_secs)
    }

    pub fn read_lock_timeout(&self) -> Duration {
        Duration::from_secs(self.read_lock_timeout_secs)
    }

    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock_poll_interval_ms)
    }
}

impl Default for EpisodeStoreConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("data/episodes"),
            write_lock_timeout_secs: 10,
            read_lock_timeout_secs: 5,
            lock_poll_interval_ms: 50,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::from_filename(".env.local").ok();
        dotenvy::dotenv().ok();

        let pipeline_defaults = PipelineConfig::default();
        let episode_defaults = EpisodeStoreConfig::default();

        let config = Config {
            aws_region: env::var("AWS_REGION").unwrap_or_else(|_| "eu-west-1".to_string()),
            environment: env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string())
                .parse::<String>()
                .map(|s| match s.as_str() {
                    "production" => Environment::Production,
                    _ => Environment::Development,
                })?,
            log_format: env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .parse::<String>()
                .map(|s| match s.as_str() {
                    "json" => LogFormat::Json,
                    _ => LogFormat::Pretty,
                })?,
            r2: R2Config {
                bucket: env_or_empty("R2_BUCKET_NAME"),
                access_key_id: env_or_empty("R2_ACCESS_KEY_ID"),
                secret_access_key: env_or_empty("R2_SECRET_ACCESS_KEY"),
                endpoint_url: env_or_empty("R2_ENDPOINT_URL"),
                account_id: env_or_empty("R2_ACCOUNT_ID"),
            },
            cos: CosConfig {
                secret_id: env_or_empty("COS_SECRET_ID"),
                secret_key: env_or_empty("COS_SECRET_KEY"),
                bucket: env_or_empty("COS_BUCKET"),
                region: env_or_empty("COS_REGION"),
            },
            pipeline: PipelineConfig {
                max_concurrent_audio: env_parse("MAX_CONCURRENT_AUDIO", pipeline_defaults.max_concurrent_audio)?,
                max_concurrent_r2: env_parse("MAX_CONCURRENT_R2", pipeline_defaults.max_concurrent_r2)?,
                max_workers_cos: env_parse("MAX_WORKERS_COS", pipeline_defaults.max_workers_cos)?,
                max_workers_enhancement: env_parse("MAX_WORKERS", pipeline_defaults.max_workers_enhancement)?,
                audio_timeout_seconds: env_parse("AUDIO_TIMEOUT_SECONDS", pipeline_defaults.audio_timeout_seconds)?,
                max_retries: env_parse("AUDIO_MAX_RETRIES", pipeline_defaults.max_retries)?,
                retry_delay_ms: env_parse("AUDIO_RETRY_DELAY_MS", pipeline_defaults.retry_delay_ms)?,
                r2_teardown_grace_ms: env_parse("R2_TEARDOWN_GRACE_MS", pipeline_defaults.r2_teardown_grace_ms)?,
                voice: env::var("TTS_VOICE").unwrap_or(pipeline_defaults.voice),
            },
            staging: StagingConfig {
                sentence_dir: env::var("AUDIO_OUTPUT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| StagingConfig::default().sentence_dir),
                phrase_dir: env::var("PHRASE_AUDIO_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| StagingConfig::default().phrase_dir),
            },
            episodes: EpisodeStoreConfig {
                storage_dir: env::var("EPISODE_STORAGE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(episode_defaults.storage_dir),
                write_lock_timeout_secs: env_parse("EPISODE_WRITE_LOCK_TIMEOUT", episode_defaults.write_lock_timeout_secs)?,
                read_lock_timeout_secs: env_parse("EPISODE_READ_LOCK_TIMEOUT", episode_defaults.read_lock_timeout_secs)?,
                lock_poll_interval_ms: episode_defaults.lock_poll_interval_ms,
            },
            batch_input_file: env::var("BATCH_INPUT_FILE").ok().map(PathBuf::from),
        };

        Ok(config)
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }
}

fn env_or_empty(key: &str) -> String {
    env::var(key).unwrap_or_default()
}

fn env_parse<T>(key: &str, default: T) -> Result<T, Box<dyn std::error::Error>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + 'static,
{
    match env::var(key) {
        Ok(raw) => Ok(raw.trim().parse::<T>()?),
        Err(_) => Ok(default),
    }
}
