use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config/screening.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreeningConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub labels: LabelConfig,
    pub image: ImageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelBackend {
    #[default]
    Onnx,
    Torch,
}

/// Memory layout the base classifiers expect for their image input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputLayout {
    #[default]
    Nhwc,
    Nchw,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub backend: ModelBackend,
    pub efficientnet: PathBuf,
    pub resnet: PathBuf,
    pub meta_model: PathBuf,
    pub input_layout: InputLayout,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            backend: ModelBackend::Onnx,
            efficientnet: PathBuf::from("models/efficientnet_model.onnx"),
            resnet: PathBuf::from("models/resnet_model.onnx"),
            meta_model: PathBuf::from("models/meta_model.json"),
            input_layout: InputLayout::Nhwc,
        }
    }
}

impl ModelsConfig {
    /// Re-roots relative artifact paths under `dir`.
    pub fn with_model_dir(mut self, dir: &Path) -> Self {
        for path in [&mut self.efficientnet, &mut self.resnet, &mut self.meta_model] {
            if path.is_relative() {
                let file_name = path.file_name().map(PathBuf::from).unwrap_or_default();
                *path = dir.join(file_name);
            }
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    /// Label value the secondary classifier was trained with for the anemic class.
    pub anemic_label: i64,
    /// Checked against the artifact's `class_names` when it carries them.
    pub anemic_class_name: String,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            anemic_label: 0,
            anemic_class_name: "Anemic".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub size: Vec<u32>,
    pub channels: u32,
    pub preprocessing: PreprocessingConfig,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            size: vec![224, 224],
            channels: 3,
            preprocessing: PreprocessingConfig::default(),
        }
    }
}

impl ImageConfig {
    pub fn width(&self) -> u32 {
        self.size.first().copied().unwrap_or(224)
    }

    pub fn height(&self) -> u32 {
        self.size.get(1).copied().unwrap_or(224)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    pub resize_method: String,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            resize_method: "bicubic".to_string(),
        }
    }
}

impl PreprocessingConfig {
    pub fn filter(&self) -> Result<FilterType, ConfigError> {
        match self.resize_method.to_ascii_lowercase().as_str() {
            "nearest" => Ok(FilterType::Nearest),
            "triangle" | "bilinear" => Ok(FilterType::Triangle),
            "bicubic" | "catmullrom" => Ok(FilterType::CatmullRom),
            "gaussian" => Ok(FilterType::Gaussian),
            "lanczos3" | "lanczos" => Ok(FilterType::Lanczos3),
            other => Err(ConfigError::Invalid {
                key: "image.preprocessing.resize_method".into(),
                reason: format!("unknown filter '{}'", other),
            }),
        }
    }
}

impl ScreeningConfig {
    /// Reads the YAML file named by `SCREENING_CONFIG` (or the default path),
    /// then applies `HOST`, `PORT` and `MODEL_DIR` overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("SCREENING_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let config = if path.exists() {
            log::info!("Loading configuration from {}", path.display());
            Self::from_file(&path)?
        } else {
            log::warn!(
                "Config file {} not found, using built-in defaults",
                path.display()
            );
            Self::default()
        };

        config.with_env_overrides(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&config_str).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(config_str: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(config_str)
    }

    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::Invalid {
                key: "PORT".into(),
                reason: format!("'{}' is not a valid port", port),
            })?;
        }
        if let Some(dir) = lookup("MODEL_DIR") {
            self.models = self.models.with_model_dir(Path::new(&dir));
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.image.size.len() != 2 || self.image.size.contains(&0) {
            return Err(ConfigError::Invalid {
                key: "image.size".into(),
                reason: format!("expected two positive values, got {:?}", self.image.size),
            });
        }
        if self.image.channels != 3 {
            return Err(ConfigError::Invalid {
                key: "image.channels".into(),
                reason: format!("only RGB input is supported, got {}", self.image.channels),
            });
        }
        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid {
                key: "server.max_upload_bytes".into(),
                reason: "must be greater than zero".into(),
            });
        }
        self.image.preprocessing.filter()?;
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
