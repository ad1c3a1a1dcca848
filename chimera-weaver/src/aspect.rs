//! 切面（Aspect）定义
//!
//! 切面是一组相关通知的载体，可以独立启用或禁用。
//! 声明方式有两种：
//! - 直接使用 [`AspectBuilder`]，配合 `Compile` / `Before` / `Around` /
//!   `AfterReturn` / `AfterThrow` / `After` 装饰器
//! - 在 `impl` 块上使用 `#[aspect]` 宏（见 `chimera-weaver-macros`），
//!   宏会实现 [`Aspect`] 并通过 inventory 自动注册

use crate::advice::{AdviceCallable, AdviceFactory, AspectAny};
use crate::context::{AdviceContext, CompileContext};
use crate::descriptor::Compiled;
use crate::error::{WeaverError, WeaverResult};
use crate::joinpoint::JoinPoint;
use crate::pointcut::{AdviceOptions, AdvicePhase, Pointcut, PointcutExpression};
use crate::registry::{AdviceRegistry, AspectMetadata};
use crate::value::Value;
use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// 切面选项
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AspectOptions {
    /// 切面 id，未设置时生成 `AnonymousAspect#<n>`
    pub id: Option<String>,
    /// 切面内通知的默认优先级
    pub priority: Option<i32>,
}

impl AspectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            priority: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }
}

impl From<&str> for AspectOptions {
    fn from(id: &str) -> Self {
        Self::id(id)
    }
}

impl From<String> for AspectOptions {
    fn from(id: String) -> Self {
        Self::id(id)
    }
}

/// 类型名的最后一段，去掉模块路径与泛型参数
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// 类型擦除的切面实例
#[derive(Clone)]
pub struct AspectInstance {
    type_id: TypeId,
    type_name: &'static str,
    instance: Arc<AspectAny>,
}

impl AspectInstance {
    pub fn new<T: Any + Send + Sync>(aspect: T) -> Self {
        Self::from_arc(Arc::new(aspect))
    }

    pub fn from_arc<T: Any + Send + Sync>(aspect: Arc<T>) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: short_type_name::<T>(),
            instance: aspect,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn as_any(&self) -> &AspectAny {
        &*self.instance
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.instance.downcast_ref::<T>()
    }

    /// 是否为同一个实例
    pub fn ptr_eq(&self, other: &AspectInstance) -> bool {
        Arc::ptr_eq(&self.instance, &other.instance)
    }
}

impl fmt::Debug for AspectInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AspectInstance")
            .field("type_name", &self.type_name)
            .finish()
    }
}

macro_rules! advice_decorator {
    ($(#[$meta:meta])* $name:ident => $phase:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            expressions: Vec<PointcutExpression>,
            options: AdviceOptions,
        }

        impl $name {
            pub fn new<I, E>(expressions: I) -> Self
            where
                I: IntoIterator<Item = E>,
                E: Into<PointcutExpression>,
            {
                Self {
                    expressions: expressions.into_iter().map(Into::into).collect(),
                    options: AdviceOptions::default(),
                }
            }

            /// 单条表达式
            pub fn on(expression: impl Into<PointcutExpression>) -> Self {
                Self::new([expression.into()])
            }

            pub fn priority(mut self, priority: i32) -> Self {
                self.options.priority = Some(priority);
                self
            }

            pub fn options(mut self, options: AdviceOptions) -> Self {
                self.options = options;
                self
            }

            fn into_parts(self) -> (AdvicePhase, Vec<PointcutExpression>, AdviceOptions) {
                ($phase, self.expressions, self.options)
            }
        }
    };
}

advice_decorator!(
    /// Compile 装饰器：每个声明执行一次，可替换构造函数或描述符
    Compile => AdvicePhase::Compile
);
advice_decorator!(
    /// Before 装饰器
    Before => AdvicePhase::Before
);
advice_decorator!(
    /// Around 装饰器
    Around => AdvicePhase::Around
);
advice_decorator!(
    /// AfterReturn 装饰器
    AfterReturn => AdvicePhase::AfterReturn
);
advice_decorator!(
    /// AfterThrow 装饰器
    AfterThrow => AdvicePhase::AfterThrow
);
advice_decorator!(
    /// After 装饰器
    After => AdvicePhase::After
);

struct PendingAdvice {
    phase: AdvicePhase,
    expressions: Vec<PointcutExpression>,
    options: AdviceOptions,
    method: String,
    callable: AdviceCallable,
}

fn downcast<T: Any>(aspect: &AspectAny) -> WeaverResult<&T> {
    aspect
        .downcast_ref::<T>()
        .ok_or_else(|| WeaverError::Type(format!("expected an instance of {}", short_type_name::<T>())))
}

/// 切面声明构造器
///
/// ```ignore
/// AspectBuilder::<LabelAspect>::new(AspectOptions::id("LabelAspect").with_priority(10))
///     .before(Before::on(on::class().with_annotation(&ACLASS)), "before", |aspect, ctxt| {
///         ctxt.data().push("labels", "before");
///         Ok(Value::Undefined)
///     })
///     .register(context.registry())?;
/// ```
pub struct AspectBuilder<T> {
    options: AspectOptions,
    pending: Vec<PendingAdvice>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> AspectBuilder<T> {
    pub fn new(options: impl Into<AspectOptions>) -> Self {
        Self {
            options: options.into(),
            pending: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// 未指定 id 的切面
    pub fn anonymous() -> Self {
        Self::new(AspectOptions::default())
    }

    fn push(
        mut self,
        parts: (AdvicePhase, Vec<PointcutExpression>, AdviceOptions),
        method: &str,
        callable: AdviceCallable,
    ) -> Self {
        let (phase, expressions, options) = parts;
        self.pending.push(PendingAdvice {
            phase,
            expressions,
            options,
            method: method.to_string(),
            callable,
        });
        self
    }

    fn simple<F>(f: F) -> AdviceCallable
    where
        F: Fn(&T, &AdviceContext) -> WeaverResult<Value> + Send + Sync + 'static,
    {
        AdviceCallable::Simple(Arc::new(
            move |aspect: &AspectAny, ctxt: &AdviceContext| -> WeaverResult<Value> {
                f(downcast::<T>(aspect)?, ctxt)
            },
        ))
    }

    pub fn compile<F>(self, decorator: Compile, method: &str, f: F) -> Self
    where
        F: Fn(&T, &CompileContext) -> WeaverResult<Option<Compiled>> + Send + Sync + 'static,
    {
        let callable = AdviceCallable::Compile(Arc::new(
            move |aspect: &AspectAny, ctxt: &CompileContext| -> WeaverResult<Option<Compiled>> {
                f(downcast::<T>(aspect)?, ctxt)
            },
        ));
        self.push(decorator.into_parts(), method, callable)
    }

    pub fn before<F>(self, decorator: Before, method: &str, f: F) -> Self
    where
        F: Fn(&T, &AdviceContext) -> WeaverResult<Value> + Send + Sync + 'static,
    {
        self.push(decorator.into_parts(), method, Self::simple(f))
    }

    pub fn around<F>(self, decorator: Around, method: &str, f: F) -> Self
    where
        F: Fn(&T, &mut AdviceContext, &JoinPoint<'_>) -> WeaverResult<Value> + Send + Sync + 'static,
    {
        let callable = AdviceCallable::Around(Arc::new(
            move |aspect: &AspectAny,
                  ctxt: &mut AdviceContext,
                  joinpoint: &JoinPoint<'_>|
                  -> WeaverResult<Value> { f(downcast::<T>(aspect)?, ctxt, joinpoint) },
        ));
        self.push(decorator.into_parts(), method, callable)
    }

    pub fn after_return<F>(self, decorator: AfterReturn, method: &str, f: F) -> Self
    where
        F: Fn(&T, &AdviceContext) -> WeaverResult<Value> + Send + Sync + 'static,
    {
        self.push(decorator.into_parts(), method, Self::simple(f))
    }

    pub fn after_throw<F>(self, decorator: AfterThrow, method: &str, f: F) -> Self
    where
        F: Fn(&T, &AdviceContext) -> WeaverResult<Value> + Send + Sync + 'static,
    {
        self.push(decorator.into_parts(), method, Self::simple(f))
    }

    pub fn after<F>(self, decorator: After, method: &str, f: F) -> Self
    where
        F: Fn(&T, &AdviceContext) -> WeaverResult<Value> + Send + Sync + 'static,
    {
        self.push(decorator.into_parts(), method, Self::simple(f))
    }

    /// 创建全部通知并写入通知注册表
    ///
    /// 再次注册同一类型会替换之前的声明
    pub fn register(self, registry: &AdviceRegistry) -> WeaverResult<()> {
        let aspect_name = short_type_name::<T>();
        let mut advices = Vec::new();

        for pending in self.pending {
            for expression in &pending.expressions {
                let pointcut = Pointcut::of(pending.phase, expression, pending.options)?;
                advices.push(AdviceFactory::create(
                    pointcut,
                    aspect_name,
                    pending.method.clone(),
                    pending.callable.clone(),
                )?);
            }
        }

        registry.declare(
            AspectMetadata::new(TypeId::of::<T>(), aspect_name, self.options),
            advices,
        );
        Ok(())
    }
}

/// 由 `#[aspect]` 宏实现的切面声明
pub trait Aspect: Any + Send + Sync + Sized {
    fn aspect() -> AspectBuilder<Self>;
}

/// 声明一个实现了 [`Aspect`] 的切面
pub fn declare_aspect<T: Aspect>(registry: &AdviceRegistry) -> WeaverResult<()> {
    T::aspect().register(registry)
}

/// 切面注册器
///
/// 用于 inventory 自动收集和注册切面
pub struct AspectRegistration {
    /// 切面名称
    pub name: &'static str,

    declare: fn(&AdviceRegistry) -> WeaverResult<()>,
}

impl AspectRegistration {
    pub const fn new(name: &'static str, declare: fn(&AdviceRegistry) -> WeaverResult<()>) -> Self {
        Self { name, declare }
    }

    /// 将切面声明写入注册表
    pub fn declare(&self, registry: &AdviceRegistry) -> WeaverResult<()> {
        (self.declare)(registry)
    }
}

// 使用 inventory 收集所有切面注册器
inventory::collect!(AspectRegistration);

/// 获取所有注册的切面注册器
pub fn get_all_aspect_registrations() -> impl Iterator<Item = &'static AspectRegistration> {
    inventory::iter::<AspectRegistration>()
}
