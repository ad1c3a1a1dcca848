//! 通知注册表
//!
//! 按切面类型记录切面元数据（id、优先级）以及该类型声明的全部通知，
//! 通知按声明顺序保存

use crate::advice::Advice;
use crate::aspect::{get_all_aspect_registrations, AspectInstance, AspectOptions};
use crate::constants::DEFAULT_ANONYMOUS_ASPECT_PREFIX;
use crate::error::{WeaverError, WeaverResult};
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// 切面元数据
#[derive(Debug, Clone)]
pub struct AspectMetadata {
    type_id: TypeId,
    type_name: &'static str,
    options: AspectOptions,
}

impl AspectMetadata {
    pub fn new(type_id: TypeId, type_name: &'static str, options: AspectOptions) -> Self {
        Self {
            type_id,
            type_name,
            options,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn id(&self) -> Option<&str> {
        self.options.id.as_deref()
    }

    pub fn priority(&self) -> Option<i32> {
        self.options.priority
    }
}

struct AspectEntry {
    metadata: AspectMetadata,
    advices: Vec<Arc<Advice>>,
}

/// 通知注册表
pub struct AdviceRegistry {
    aspects: RwLock<HashMap<TypeId, AspectEntry>>,
    anonymous_prefix: String,
    anonymous_count: AtomicUsize,
}

impl AdviceRegistry {
    pub fn new() -> Self {
        Self::with_anonymous_prefix(DEFAULT_ANONYMOUS_ASPECT_PREFIX)
    }

    pub fn with_anonymous_prefix(prefix: impl Into<String>) -> Self {
        Self {
            aspects: RwLock::new(HashMap::new()),
            anonymous_prefix: prefix.into(),
            anonymous_count: AtomicUsize::new(0),
        }
    }

    /// 登记切面及其通知，已存在时整体替换
    pub fn declare(&self, metadata: AspectMetadata, advices: Vec<Advice>) {
        let mut aspects = self.aspects.write();
        let replaced = aspects.contains_key(&metadata.type_id);
        tracing::debug!(
            "{} aspect {} with {} advice(s)",
            if replaced { "Redeclaring" } else { "Declaring" },
            metadata.type_name,
            advices.len()
        );

        let mut metadata = metadata;
        if metadata.options.id.is_none() {
            // 重新声明时沿用之前生成的匿名 id
            let previous = aspects
                .get(&metadata.type_id)
                .and_then(|entry| entry.metadata.options.id.clone());
            metadata.options.id = Some(previous.unwrap_or_else(|| self.next_anonymous_id()));
        }

        aspects.insert(
            metadata.type_id,
            AspectEntry {
                metadata,
                advices: advices.into_iter().map(Arc::new).collect(),
            },
        );
    }

    fn next_anonymous_id(&self) -> String {
        let n = self.anonymous_count.fetch_add(1, Ordering::Relaxed);
        format!("{}#{}", self.anonymous_prefix, n)
    }

    fn not_an_aspect(aspect: &AspectInstance) -> WeaverError {
        WeaverError::Type(format!("{} is not an Aspect", aspect.type_name()))
    }

    /// 切面元数据，未声明的类型返回 TypeError
    pub fn metadata(&self, aspect: &AspectInstance) -> WeaverResult<AspectMetadata> {
        self.aspects
            .read()
            .get(&aspect.type_id())
            .map(|entry| entry.metadata.clone())
            .ok_or_else(|| Self::not_an_aspect(aspect))
    }

    /// 解析切面 id
    pub fn resolve_id(&self, aspect: &AspectInstance) -> WeaverResult<String> {
        let metadata = self.metadata(aspect)?;
        metadata
            .id()
            .map(str::to_string)
            .ok_or_else(|| Self::not_an_aspect(aspect))
    }

    /// 切面类型上声明的全部通知，按声明顺序
    pub fn get_advices_by_aspect(&self, aspect: &AspectInstance) -> WeaverResult<Vec<Arc<Advice>>> {
        let aspects = self.aspects.read();
        let entry = aspects
            .get(&aspect.type_id())
            .ok_or_else(|| Self::not_an_aspect(aspect))?;

        if entry.advices.is_empty() {
            return Err(WeaverError::weaving(format!(
                "Aspect {} does not declare any advice",
                aspect.type_name()
            )));
        }

        Ok(entry.advices.clone())
    }

    pub fn is_aspect(&self, aspect: &AspectInstance) -> bool {
        self.aspects.read().contains_key(&aspect.type_id())
    }

    /// 从 inventory 自动加载所有注册的切面
    ///
    /// 这个方法会扫描所有通过 `#[aspect]` 宏自动注册的切面
    pub fn load_registered(&self) -> WeaverResult<usize> {
        let registrations: Vec<_> = get_all_aspect_registrations().collect();
        tracing::info!("Auto-loading {} aspect(s) from registry", registrations.len());

        for registration in &registrations {
            tracing::debug!("  ├─ Loading aspect: {}", registration.name);
            registration.declare(self)?;
        }

        Ok(registrations.len())
    }

    /// 已声明的切面数量
    pub fn len(&self) -> usize {
        self.aspects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.aspects.read().is_empty()
    }
}

impl Default for AdviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
