//! 织入上下文
//!
//! 把通知注册表、Target 注册表和织入器组装在一起，显式传递给需要它们的组件。
//! 测试通常各自创建独立的上下文；[`WeaverContext::global`] 提供进程级默认实例

use crate::config::WeaverConfig;
use crate::error::WeaverResult;
use crate::registry::AdviceRegistry;
use crate::target::TargetRegistry;
use crate::weaver::Weaver;
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::Arc;

static GLOBAL: Lazy<WeaverContext> = Lazy::new(|| {
    let context = WeaverContext::new();
    if let Err(e) = context.registry().load_registered() {
        tracing::error!("Failed to load registered aspects: {}", e);
    }
    context
});

/// 织入上下文
pub struct WeaverContext {
    config: WeaverConfig,
    registry: Arc<AdviceRegistry>,
    targets: Arc<TargetRegistry>,
    weaver: Weaver,
}

impl WeaverContext {
    /// 使用默认配置创建
    pub fn new() -> Self {
        Self::with_config(WeaverConfig::default())
    }

    pub fn with_config(config: WeaverConfig) -> Self {
        let registry = Arc::new(AdviceRegistry::with_anonymous_prefix(
            config.anonymous_prefix.clone(),
        ));
        let targets = Arc::new(TargetRegistry::new());
        let weaver = Weaver::new(registry.clone(), targets.clone(), config.clone());
        Self {
            config,
            registry,
            targets,
            weaver,
        }
    }

    /// 创建上下文并加载所有通过 `#[aspect]` 注册的切面
    pub fn with_registered_aspects(config: WeaverConfig) -> WeaverResult<Self> {
        let context = Self::with_config(config);
        let count = context.registry.load_registered()?;
        tracing::info!("Weaver context ready with {} registered aspect(s)", count);
        Ok(context)
    }

    /// 进程级默认上下文
    pub fn global() -> &'static WeaverContext {
        &GLOBAL
    }

    pub fn config(&self) -> &WeaverConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<AdviceRegistry> {
        &self.registry
    }

    pub fn targets(&self) -> &Arc<TargetRegistry> {
        &self.targets
    }

    pub fn weaver(&self) -> &Weaver {
        &self.weaver
    }
}

impl Default for WeaverContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WeaverContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeaverContext")
            .field("config", &self.config)
            .field("aspects", &self.registry.len())
            .field("targets", &self.targets.len())
            .field("weaver", &self.weaver)
            .finish()
    }
}
