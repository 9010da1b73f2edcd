use common::{Environment, LogLevel};
use crate::routes::{DEFAULT_MAX_CANVAS_SIZE, RouterConfig};
use inference::{BackendOptions, ClassifierConfig, ClassifierKind, ServiceConfig, UploadPolicy};
use preprocess::PreprocessConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

const ENV_PREFIX: &str = "URDU";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub log_level: LogLevel,
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    /// Empty means any origin.
    pub cors_origins: Vec<String>,
    pub otel_endpoint: Option<String>,
    pub character_model_path: PathBuf,
    pub character_labels_path: PathBuf,
    pub digit_model_path: PathBuf,
    pub digit_labels_path: PathBuf,
    pub image_width: u32,
    pub image_height: u32,
    pub max_file_size: usize,
    /// Canvas requests are JSON, so this bounds the whole request body.
    pub max_canvas_size: usize,
    pub allowed_extensions: Vec<String>,
    pub top_k: usize,
    /// Threads per forward pass, for each model.
    pub intra_threads: usize,
}

impl Config {
    pub fn bind_address(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            cors_origins: self.cors_origins.clone(),
            max_canvas_size: self.max_canvas_size,
        }
    }

    pub fn service_config(&self) -> ServiceConfig {
        let backend = BackendOptions {
            intra_threads: self.intra_threads,
        };

        ServiceConfig {
            preprocess: PreprocessConfig {
                input_size: (self.image_width, self.image_height),
                ..PreprocessConfig::default()
            },
            upload: UploadPolicy {
                allowed_extensions: self
                    .allowed_extensions
                    .iter()
                    .map(|e| normalize_extension(e))
                    .collect(),
                max_file_size: self.max_file_size,
            },
            top_k: self.top_k,
            characters: ClassifierConfig {
                kind: ClassifierKind::Character,
                model_path: self.character_model_path.clone(),
                labels_path: self.character_labels_path.clone(),
                backend,
            },
            digits: ClassifierConfig {
                kind: ClassifierKind::Digit,
                model_path: self.digit_model_path.clone(),
                labels_path: self.digit_labels_path.clone(),
                backend,
            },
        }
    }
}

/// "PNG" and ".png" both become ".png".
fn normalize_extension(extension: &str) -> String {
    let extension = extension.trim().to_lowercase();
    if extension.starts_with('.') {
        extension
    } else {
        format!(".{extension}")
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let defaults = ServiceConfig::default();
    let path = |p: &PathBuf| p.to_string_lossy().into_owned();

    let config = config::Config::builder()
        .set_default("log_level", "info")?
        .set_default("environment", "development")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", 8000)?
        .set_default("cors_origins", Vec::<String>::new())?
        .set_default(
            "character_model_path",
            path(&defaults.characters.model_path),
        )?
        .set_default(
            "character_labels_path",
            path(&defaults.characters.labels_path),
        )?
        .set_default("digit_model_path", path(&defaults.digits.model_path))?
        .set_default("digit_labels_path", path(&defaults.digits.labels_path))?
        .set_default("image_width", defaults.preprocess.input_size.0)?
        .set_default("image_height", defaults.preprocess.input_size.1)?
        .set_default("max_file_size", defaults.upload.max_file_size as u64)?
        .set_default("max_canvas_size", DEFAULT_MAX_CANVAS_SIZE as u64)?
        .set_default("allowed_extensions", defaults.upload.allowed_extensions)?
        .set_default("top_k", defaults.top_k as u64)?
        .set_default(
            "intra_threads",
            defaults.characters.backend.intra_threads as u64,
        )?
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("cors_origins")
                .with_list_parse_key("allowed_extensions")
                .try_parsing(true),
        )
        .build()?;

    let config: Config = config.try_deserialize::<Config>()?;

    Ok(config)
}
