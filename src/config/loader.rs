use crate::config::config::AppConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use std::path::PathBuf;

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从默认路径加载配置
    ///
    /// 合并顺序：
    /// 1. 开发环境默认值
    /// 2. ./config.yaml
    /// 3. `TREE_NOTES_` 前缀的环境变量（如 `TREE_NOTES_BACKEND__URL`）
    pub fn load() -> Result<AppConfig, figment::Error> {
        Self::load_from(default_config_path())
    }

    /// 从指定路径加载配置
    pub fn load_from(path: PathBuf) -> Result<AppConfig, figment::Error> {
        Self::figment(path).extract()
    }

    fn figment(path: PathBuf) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::development()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("TREE_NOTES_").split("__"))
    }

    /// 验证配置
    pub fn validate(config: &AppConfig) -> Result<(), ConfigValidationError> {
        if config.backend.url.is_empty() {
            return Err(ConfigValidationError::MissingBackendUrl);
        }

        if config.backend.anon_key.is_empty() {
            return Err(ConfigValidationError::MissingAnonKey);
        }

        if config.notes.max_text_chars == 0 {
            return Err(ConfigValidationError::InvalidTextLimit);
        }

        if config.feed.channel_capacity == 0 {
            return Err(ConfigValidationError::InvalidChannelCapacity);
        }

        Ok(())
    }
}

/// 配置验证错误
#[derive(thiserror::Error, Debug)]
pub enum ConfigValidationError {
    #[error("后端服务 URL 未配置")]
    MissingBackendUrl,

    #[error("后端访问密钥未配置")]
    MissingAnonKey,

    #[error("便签长度上限无效，必须大于 0")]
    InvalidTextLimit,

    #[error("广播通道容量无效，必须大于 0")]
    InvalidChannelCapacity,
}

/// 获取默认配置文件路径
pub fn default_config_path() -> PathBuf {
    PathBuf::from("config.yaml")
}

/// 检查配置文件是否存在
pub fn config_exists() -> bool {
    default_config_path().exists()
}
