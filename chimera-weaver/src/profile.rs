//! 织入配置集（Weaver Profile）
//!
//! 记录"已启用的切面"：`id -> 切面实例`，保持启用顺序。
//! 相同 id 再次启用会替换之前的实例（并给出警告），而不是报错

use crate::aspect::AspectInstance;
use crate::error::WeaverResult;
use crate::registry::AdviceRegistry;
use std::fmt;
use std::sync::Arc;

/// 织入配置集
#[derive(Clone)]
pub struct WeaverProfile {
    registry: Arc<AdviceRegistry>,
    aspects: Vec<(String, AspectInstance)>,
    warn_on_replace: bool,
}

impl WeaverProfile {
    pub fn new(registry: Arc<AdviceRegistry>) -> Self {
        Self {
            registry,
            aspects: Vec::new(),
            warn_on_replace: true,
        }
    }

    /// 替换已启用切面时是否输出警告
    pub fn warn_on_replace(mut self, warn: bool) -> Self {
        self.warn_on_replace = warn;
        self
    }

    /// 启用切面
    pub fn enable<I>(&mut self, aspects: I) -> WeaverResult<&mut Self>
    where
        I: IntoIterator<Item = AspectInstance>,
    {
        for aspect in aspects {
            let id = self.registry.resolve_id(&aspect)?;
            match self.aspects.iter_mut().find(|(existing, _)| *existing == id) {
                Some(entry) => {
                    if self.warn_on_replace && !entry.1.ptr_eq(&aspect) {
                        tracing::warn!(
                            "Aspect {} overrides aspect \"{}\" already registered as {}",
                            aspect.type_name(),
                            id,
                            entry.1.type_name()
                        );
                    }
                    entry.1 = aspect;
                }
                None => {
                    tracing::debug!("Enabling aspect \"{}\" ({})", id, aspect.type_name());
                    self.aspects.push((id, aspect));
                }
            }
        }
        Ok(self)
    }

    /// 禁用切面（按 id）
    pub fn disable<I>(&mut self, aspects: I) -> WeaverResult<&mut Self>
    where
        I: IntoIterator<Item = AspectInstance>,
    {
        for aspect in aspects {
            let id = self.registry.resolve_id(&aspect)?;
            let before = self.aspects.len();
            self.aspects.retain(|(existing, _)| *existing != id);
            if self.aspects.len() < before {
                tracing::debug!("Disabled aspect \"{}\"", id);
            }
        }
        Ok(self)
    }

    /// 合并其他配置集中的全部切面
    pub fn merge<'a, I>(&mut self, profiles: I) -> WeaverResult<&mut Self>
    where
        I: IntoIterator<Item = &'a WeaverProfile>,
    {
        for profile in profiles {
            let aspects: Vec<AspectInstance> = profile.aspects().cloned().collect();
            self.enable(aspects)?;
        }
        Ok(self)
    }

    /// 清空
    pub fn reset(&mut self) -> &mut Self {
        self.aspects.clear();
        self
    }

    /// 按启用顺序遍历切面
    pub fn aspects(&self) -> impl Iterator<Item = &AspectInstance> {
        self.aspects.iter().map(|(_, aspect)| aspect)
    }

    pub fn get(&self, id: &str) -> Option<&AspectInstance> {
        self.aspects
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, aspect)| aspect)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.aspects.iter().map(|(id, _)| id.as_str()).collect()
    }

    pub fn is_enabled(&self, aspect: &AspectInstance) -> bool {
        self.aspects.iter().any(|(_, existing)| existing.ptr_eq(aspect))
    }

    pub fn len(&self) -> usize {
        self.aspects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aspects.is_empty()
    }
}

impl fmt::Debug for WeaverProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeaverProfile")
            .field("aspects", &self.ids())
            .finish()
    }
}
