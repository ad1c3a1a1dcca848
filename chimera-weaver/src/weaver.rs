//! 织入器（Weaver）
//!
//! 对外入口：启用/禁用切面，并在声明首次出现时织入类、属性、方法和参数。
//!
//! 织入器开始产出执行计划后即视为"已加载"；默认配置下，此后再启用或禁用切面会失败。
//! 同一声明再次织入时，使用新的原始代码替换缓存，不会在旧的织入结果上层层包装

use crate::aspect::AspectInstance;
use crate::config::WeaverConfig;
use crate::constants::WEAVER_ALREADY_LOADED;
use crate::descriptor::{Compiled, Constructor, Method, PropertyDescriptor};
use crate::error::{WeaverError, WeaverResult};
use crate::hooks::{ClassHooks, MethodHooks, PropertyGetHooks, PropertySetHooks, WeaverHooks};
use crate::plan::{PlanFactory, WovenCallable};
use crate::pointcut::JoinPointKind;
use crate::profile::WeaverProfile;
use crate::registry::AdviceRegistry;
use crate::target::{TargetKey, TargetRef, TargetRegistry};
use crate::value::{ObjectRef, Value};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 织入后的类
#[derive(Debug, Clone)]
pub struct WovenClass {
    target: TargetRef,
    constructor: WovenCallable,
}

impl WovenClass {
    pub fn target(&self) -> &TargetRef {
        &self.target
    }

    /// 构造实例
    pub fn construct(&self, args: Vec<Value>) -> WeaverResult<ObjectRef> {
        match self.constructor.invoke(None, args)? {
            Value::Object(instance) => Ok(instance),
            other => Err(WeaverError::weaving(format!(
                "{} constructed a non-instance value: {:?}",
                self.target.label(),
                other
            ))),
        }
    }
}

/// 织入后的属性
#[derive(Debug, Clone)]
pub struct WovenProperty {
    target: TargetRef,
    getter: WovenCallable,
    setter: WovenCallable,
}

impl WovenProperty {
    pub fn target(&self) -> &TargetRef {
        &self.target
    }

    pub fn get(&self, instance: &ObjectRef) -> WeaverResult<Value> {
        self.getter.invoke(Some(instance.clone()), Vec::new())
    }

    pub fn set(&self, instance: &ObjectRef, value: impl Into<Value>) -> WeaverResult<()> {
        self.setter.invoke(Some(instance.clone()), vec![value.into()])?;
        Ok(())
    }
}

/// 织入后的方法
#[derive(Debug, Clone)]
pub struct WovenMethod {
    target: TargetRef,
    method: WovenCallable,
}

impl WovenMethod {
    pub fn target(&self) -> &TargetRef {
        &self.target
    }

    pub fn invoke(&self, instance: &ObjectRef, args: Vec<Value>) -> WeaverResult<Value> {
        self.method.invoke(Some(instance.clone()), args)
    }
}

/// 任一种织入结果
#[derive(Debug, Clone)]
pub enum Woven {
    Class(WovenClass),
    Property(WovenProperty),
    Method(WovenMethod),
}

struct WeaverState {
    profile: WeaverProfile,
    plans: Arc<PlanFactory>,
    loaded: bool,
    /// 每个声明最近一次织入时的原始代码
    originals: HashMap<TargetKey, Compiled>,
}

/// 织入器
pub struct Weaver {
    registry: Arc<AdviceRegistry>,
    targets: Arc<TargetRegistry>,
    config: WeaverConfig,
    state: Mutex<WeaverState>,
}

impl Weaver {
    pub fn new(
        registry: Arc<AdviceRegistry>,
        targets: Arc<TargetRegistry>,
        config: WeaverConfig,
    ) -> Self {
        let profile = WeaverProfile::new(registry.clone()).warn_on_replace(config.warn_on_replace);
        let plans = Arc::new(PlanFactory::new(registry.clone(), targets.clone()));
        Self {
            registry,
            targets,
            config,
            state: Mutex::new(WeaverState {
                profile,
                plans,
                loaded: false,
                originals: HashMap::new(),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<AdviceRegistry> {
        &self.registry
    }

    pub fn targets(&self) -> &Arc<TargetRegistry> {
        &self.targets
    }

    /// 是否已经开始产出执行计划
    pub fn is_loaded(&self) -> bool {
        self.state.lock().loaded
    }

    /// 当前启用的切面
    pub fn profile(&self) -> WeaverProfile {
        self.state.lock().profile.clone()
    }

    /// 启用切面
    pub fn enable<I>(&self, aspects: I) -> WeaverResult<()>
    where
        I: IntoIterator<Item = AspectInstance>,
    {
        let aspects: Vec<AspectInstance> = aspects.into_iter().collect();
        self.reconfigure(|profile| {
            profile.enable(aspects)?;
            Ok(())
        })
    }

    /// 启用单个切面实例
    pub fn enable_aspect<T: Any + Send + Sync>(&self, aspect: T) -> WeaverResult<()> {
        self.enable([AspectInstance::new(aspect)])
    }

    /// 禁用切面
    pub fn disable<I>(&self, aspects: I) -> WeaverResult<()>
    where
        I: IntoIterator<Item = AspectInstance>,
    {
        let aspects: Vec<AspectInstance> = aspects.into_iter().collect();
        self.reconfigure(|profile| {
            profile.disable(aspects)?;
            Ok(())
        })
    }

    /// 启用其他配置集中的全部切面
    pub fn merge<'a, I>(&self, profiles: I) -> WeaverResult<()>
    where
        I: IntoIterator<Item = &'a WeaverProfile>,
    {
        let profiles: Vec<&WeaverProfile> = profiles.into_iter().collect();
        self.reconfigure(|profile| {
            profile.merge(profiles)?;
            Ok(())
        })
    }

    /// 清空切面、执行计划和加载状态
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.profile.reset();
        state.plans = Arc::new(PlanFactory::new(self.registry.clone(), self.targets.clone()));
        state.loaded = false;
        state.originals.clear();
        tracing::info!("Weaver reset");
    }

    fn reconfigure(
        &self,
        f: impl FnOnce(&mut WeaverProfile) -> WeaverResult<()>,
    ) -> WeaverResult<()> {
        let mut state = self.state.lock();
        if state.loaded {
            if self.config.lock_after_load {
                return Err(WeaverError::weaving(WEAVER_ALREADY_LOADED));
            }
            tracing::warn!("Reconfiguring a loaded weaver: join points must be woven again");
        }

        let mut profile = state.profile.clone();
        f(&mut profile)?;

        let mut plans = PlanFactory::new(self.registry.clone(), self.targets.clone());
        plans.enable(profile.aspects().cloned())?;

        tracing::info!("Enabled aspects: [{}]", profile.ids().join(", "));
        state.profile = profile;
        state.plans = Arc::new(plans);
        Ok(())
    }

    /// 当前的执行计划工厂；再次织入的目标先丢弃旧的执行计划
    fn plans_for(&self, target: &TargetRef) -> Arc<PlanFactory> {
        let state = self.state.lock();
        if state.originals.contains_key(target.key()) {
            tracing::debug!("Re-weaving {}", target.label());
            state.plans.invalidate(target);
        }
        state.plans.clone()
    }

    /// 织入成功后记录原始代码，织入器进入已加载状态
    fn load(&self, target: &TargetRef, original: Compiled) {
        let mut state = self.state.lock();
        if !state.loaded {
            tracing::debug!("Weaver loaded by {}", target.label());
            state.loaded = true;
        }
        state.originals.insert(target.key().clone(), original);
    }

    fn expect_kind(target: &TargetRef, kind: JoinPointKind) -> WeaverResult<()> {
        if target.kind() == kind {
            Ok(())
        } else {
            Err(WeaverError::weaving(format!(
                "{} is not a {} target",
                target.label(),
                kind
            )))
        }
    }

    fn weave(
        plans: &PlanFactory,
        target: &TargetRef,
        hooks: Arc<dyn WeaverHooks>,
        original: Compiled,
    ) -> WeaverResult<WovenCallable> {
        let plan = plans.create(target, hooks.filter())?;
        plan.execute(hooks, original)
    }

    /// 织入类
    pub fn enhance_class(&self, target: &TargetRef, constructor: Constructor) -> WeaverResult<WovenClass> {
        Self::expect_kind(target, JoinPointKind::Class)?;
        let plans = self.plans_for(target);
        let woven = Self::weave(&plans, target, Arc::new(ClassHooks), constructor.clone().into())?;
        self.load(target, constructor.into());
        Ok(WovenClass {
            target: target.clone(),
            constructor: woven,
        })
    }

    /// 织入属性
    ///
    /// getter 计划执行 Compile 通知，setter 共享编译后的描述符
    pub fn enhance_property(
        &self,
        target: &TargetRef,
        descriptor: PropertyDescriptor,
    ) -> WeaverResult<WovenProperty> {
        Self::expect_kind(target, JoinPointKind::Property)?;
        let plans = self.plans_for(target);
        let getter = Self::weave(
            &plans,
            target,
            Arc::new(PropertyGetHooks),
            descriptor.clone().into(),
        )?;
        let setter = Self::weave(
            &plans,
            target,
            Arc::new(PropertySetHooks),
            getter.compiled().clone(),
        )?;
        self.load(target, descriptor.into());
        Ok(WovenProperty {
            target: target.clone(),
            getter,
            setter,
        })
    }

    /// 织入方法
    pub fn enhance_method(&self, target: &TargetRef, method: Method) -> WeaverResult<WovenMethod> {
        Self::expect_kind(target, JoinPointKind::Method)?;
        let plans = self.plans_for(target);
        let woven = Self::weave(&plans, target, Arc::new(MethodHooks), method.clone().into())?;
        self.load(target, method.into());
        Ok(WovenMethod {
            target: target.clone(),
            method: woven,
        })
    }

    /// 织入参数：重新织入参数所属的方法
    pub fn enhance_parameter(&self, target: &TargetRef, method: Method) -> WeaverResult<WovenMethod> {
        Self::expect_kind(target, JoinPointKind::Parameter)?;
        let owner = target.parent().cloned().ok_or_else(|| {
            WeaverError::weaving(format!("{} has no declaring method", target.label()))
        })?;
        self.enhance_method(&owner, method)
    }

    /// 使用缓存的原始代码重新织入
    pub fn reweave(&self, target: &TargetRef) -> WeaverResult<Woven> {
        let original = self
            .state
            .lock()
            .originals
            .get(target.key())
            .cloned()
            .ok_or_else(|| WeaverError::weaving(format!("{} has not been woven", target.label())))?;

        match original {
            Compiled::Constructor(constructor) => {
                self.enhance_class(target, constructor).map(Woven::Class)
            }
            Compiled::Property(descriptor) => {
                self.enhance_property(target, descriptor).map(Woven::Property)
            }
            Compiled::Method(method) => self.enhance_method(target, method).map(Woven::Method),
        }
    }

    /// 最近一次织入时的原始代码
    pub fn original(&self, target: &TargetRef) -> Option<Compiled> {
        self.state.lock().originals.get(target.key()).cloned()
    }
}

impl fmt::Debug for Weaver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Weaver")
            .field("profile", &state.profile)
            .field("loaded", &state.loaded)
            .field("woven", &state.originals.len())
            .finish()
    }
}
