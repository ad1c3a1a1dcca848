//! Chimera Weaver - 面向切面的织入引擎
//!
//! 提供：
//! - 切点表达式（`on::class()` / `on::property()` / `on::method()` / `on::parameter()`）
//! - 通知注册表与切面声明（[`AspectBuilder`]，或 `chimera-weaver-macros` 的 `#[aspect]`）
//! - 按 Target 缓存的执行计划，把 Compile / Before / Around / AfterReturn /
//!   AfterThrow / After 通知串成一次调用
//! - 类构造、属性读写、方法调用和参数注解的织入
//!
//! 宿主的类系统由适配层提供：适配层把声明登记为 [`Target`]、附上 [`Annotation`]，
//! 再通过 [`Weaver`] 的 `enhance_*` 方法拿到织入后的可调用对象

pub mod advice;
pub mod annotation;
pub mod aspect;
pub mod config;
pub mod constants;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod hooks;
pub mod joinpoint;
pub mod logging;
pub mod plan;
pub mod pointcut;
pub mod profile;
pub mod registry;
pub mod target;
pub mod value;
pub mod weaver;
pub mod weaver_context;

// 重新导出核心类型
pub use advice::{Advice, AdviceCallable, AdviceFactory, BoundAdvice};
pub use annotation::{Annotation, AnnotationRef};
pub use aspect::{
    declare_aspect, get_all_aspect_registrations, After, AfterReturn, AfterThrow, Around, Aspect,
    AspectBuilder, AspectInstance, AspectOptions, AspectRegistration, Before, Compile,
};
pub use config::WeaverConfig;
pub use context::{AdviceContext, AdviceData, CompileContext};
pub use descriptor::{Compiled, Constructor, Method, PropertyDescriptor};
pub use error::{AdviceError, WeaverError, WeaverResult};
pub use joinpoint::JoinPoint;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use plan::{AdviceFilter, ExecutionPlan, PlanFactory, WovenCallable};
pub use pointcut::{on, AdviceOptions, AdvicePhase, JoinPointKind, Pointcut, PointcutExpression};
pub use profile::WeaverProfile;
pub use registry::{AdviceRegistry, AspectMetadata};
pub use target::{Target, TargetKey, TargetRef, TargetRegistry};
pub use value::{Fields, Object, ObjectRef, Value};
pub use weaver::{Weaver, Woven, WovenClass, WovenMethod, WovenProperty};
pub use weaver_context::WeaverContext;

// 导出 inventory 供宏使用
pub use inventory;

/// 预导入模块
pub mod prelude {
    pub use crate::annotation::{Annotation, AnnotationRef};
    pub use crate::aspect::{
        After, AfterReturn, AfterThrow, Around, Aspect, AspectBuilder, AspectInstance,
        AspectOptions, Before, Compile,
    };
    pub use crate::context::{AdviceContext, CompileContext};
    pub use crate::descriptor::{Compiled, Constructor, Method, PropertyDescriptor};
    pub use crate::error::{WeaverError, WeaverResult};
    pub use crate::joinpoint::JoinPoint;
    pub use crate::pointcut::on;
    pub use crate::value::{Object, ObjectRef, Value};
    pub use crate::weaver_context::WeaverContext;
}
