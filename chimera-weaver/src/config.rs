//! 织入器配置
//!
//! ```toml
//! lock_after_load = true
//! warn_on_replace = true
//! anonymous_prefix = "AnonymousAspect"
//!
//! [logging]
//! level = "debug"
//! format = "compact"
//! ```

use crate::constants::DEFAULT_ANONYMOUS_ASPECT_PREFIX;
use crate::error::{WeaverError, WeaverResult};
use crate::logging::LoggingConfig;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// 织入器配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WeaverConfig {
    /// 织入器开始产出执行计划后，禁止再启用/禁用切面
    ///
    /// 关闭后，启用/禁用会丢弃已缓存的执行计划，需要重新织入才会生效
    pub lock_after_load: bool,

    /// 同一 id 的切面被替换时输出警告
    pub warn_on_replace: bool,

    /// 匿名切面 id 的前缀
    pub anonymous_prefix: String,

    pub logging: LoggingConfig,
}

impl Default for WeaverConfig {
    fn default() -> Self {
        Self {
            lock_after_load: true,
            warn_on_replace: true,
            anonymous_prefix: DEFAULT_ANONYMOUS_ASPECT_PREFIX.to_string(),
            logging: LoggingConfig::default(),
        }
    }
}

impl WeaverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_after_load(mut self, lock: bool) -> Self {
        self.lock_after_load = lock;
        self
    }

    pub fn warn_on_replace(mut self, warn: bool) -> Self {
        self.warn_on_replace = warn;
        self
    }

    pub fn anonymous_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.anonymous_prefix = prefix.into();
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// 从 TOML 文本解析
    pub fn from_toml_str(content: &str) -> WeaverResult<Self> {
        toml::from_str(content)
            .map_err(|e| WeaverError::Config(format!("Failed to parse weaver config: {}", e)))
    }

    /// 从 TOML 文件加载
    pub fn from_file(path: impl AsRef<Path>) -> WeaverResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            WeaverError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        tracing::debug!("Loaded weaver config from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// 默认配置叠加环境变量
    ///
    /// `WEAVER_LOCK_AFTER_LOAD`、`WEAVER_WARN_ON_REPLACE`，以及日志相关的
    /// `RUST_LOG`、`LOG_LEVEL`、`LOG_FORMAT`
    pub fn from_env() -> WeaverResult<Self> {
        Self::default().apply_env()
    }

    /// 用环境变量覆盖当前配置
    pub fn apply_env(mut self) -> WeaverResult<Self> {
        if let Some(lock) = env_bool("WEAVER_LOCK_AFTER_LOAD")? {
            self.lock_after_load = lock;
        }
        if let Some(warn) = env_bool("WEAVER_WARN_ON_REPLACE")? {
            self.warn_on_replace = warn;
        }
        self.logging = self.logging.apply_env();
        Ok(self)
    }
}

fn env_bool(key: &str) -> WeaverResult<Option<bool>> {
    let Ok(value) = std::env::var(key) else {
        return Ok(None);
    };
    parse_bool(&value)
        .map(Some)
        .ok_or_else(|| WeaverError::Config(format!("{} is not a boolean: {}", key, value)))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}
