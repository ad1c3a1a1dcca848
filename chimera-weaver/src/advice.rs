//! 通知（Advice）定义
//!
//! 通知 = 切面上的一个函数 + 它的切点。[`AdviceFactory`] 负责创建并校验通知，
//! [`BoundAdvice`] 是绑定到某个已启用切面实例、并匹配到具体注解后的通知

use crate::annotation::Annotation;
use crate::aspect::AspectInstance;
use crate::constants::COMPILE_ON_SETTER_NOT_SUPPORTED;
use crate::context::{AdviceContext, CompileContext};
use crate::descriptor::Compiled;
use crate::error::{AdviceError, WeaverError, WeaverResult};
use crate::joinpoint::JoinPoint;
use crate::pointcut::{AdvicePhase, Pointcut};
use crate::value::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 类型擦除后的切面实例
pub type AspectAny = dyn Any + Send + Sync;

pub type CompileAdviceFn =
    Arc<dyn Fn(&AspectAny, &CompileContext) -> WeaverResult<Option<Compiled>> + Send + Sync>;
pub type AdviceFn = Arc<dyn Fn(&AspectAny, &AdviceContext) -> WeaverResult<Value> + Send + Sync>;
pub type AroundAdviceFn =
    Arc<dyn Fn(&AspectAny, &mut AdviceContext, &JoinPoint<'_>) -> WeaverResult<Value> + Send + Sync>;

/// 通知函数的三种形态
#[derive(Clone)]
pub enum AdviceCallable {
    /// Compile 阶段
    Compile(CompileAdviceFn),
    /// Before / AfterReturn / AfterThrow / After 阶段
    Simple(AdviceFn),
    /// Around 阶段
    Around(AroundAdviceFn),
}

impl AdviceCallable {
    fn accepts(&self, phase: AdvicePhase) -> bool {
        match self {
            AdviceCallable::Compile(_) => phase == AdvicePhase::Compile,
            AdviceCallable::Around(_) => phase == AdvicePhase::Around,
            AdviceCallable::Simple(_) => {
                !matches!(phase, AdvicePhase::Compile | AdvicePhase::Around)
            }
        }
    }
}

/// 通知
pub struct Advice {
    pointcut: Pointcut,
    aspect_name: &'static str,
    method: String,
    tag: String,
    callable: AdviceCallable,
}

impl Advice {
    pub fn pointcut(&self) -> &Pointcut {
        &self.pointcut
    }

    pub fn phase(&self) -> AdvicePhase {
        self.pointcut.phase()
    }

    /// 所属切面的类型名
    pub fn aspect_name(&self) -> &'static str {
        self.aspect_name
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// 可读标签，例如 `@Before(@test:AClass) LabelAspect.before()`
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl fmt::Display for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag)
    }
}

impl fmt::Debug for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Advice")
            .field("tag", &self.tag)
            .field("pointcut", &self.pointcut.reference())
            .finish()
    }
}

/// 通知工厂
pub struct AdviceFactory;

impl AdviceFactory {
    /// 创建通知
    ///
    /// Compile 通知不能作用于属性 setter；通知函数的形态必须与阶段一致
    pub fn create(
        pointcut: Pointcut,
        aspect_name: &'static str,
        method: impl Into<String>,
        callable: AdviceCallable,
    ) -> WeaverResult<Advice> {
        let method = method.into();
        let tag = format!(
            "@{}({}) {}.{}()",
            pointcut.phase(),
            pointcut.annotation(),
            aspect_name,
            method
        );

        if pointcut.phase() == AdvicePhase::Compile && pointcut.is_setter() {
            return Err(AdviceError::new(&tag, COMPILE_ON_SETTER_NOT_SUPPORTED).into());
        }

        if !callable.accepts(pointcut.phase()) {
            return Err(WeaverError::weaving(format!(
                "{}: function shape does not match the {} phase",
                tag,
                pointcut.phase()
            )));
        }

        Ok(Advice {
            pointcut,
            aspect_name,
            method,
            tag,
            callable,
        })
    }
}

/// 绑定到切面实例与注解上的通知
#[derive(Clone)]
pub struct BoundAdvice {
    advice: Arc<Advice>,
    aspect: AspectInstance,
    annotation: Annotation,
    priority: i32,
}

impl BoundAdvice {
    pub(crate) fn new(
        advice: Arc<Advice>,
        aspect: AspectInstance,
        annotation: Annotation,
        priority: i32,
    ) -> Self {
        Self {
            advice,
            aspect,
            annotation,
            priority,
        }
    }

    pub fn advice(&self) -> &Arc<Advice> {
        &self.advice
    }

    pub fn aspect(&self) -> &AspectInstance {
        &self.aspect
    }

    /// 触发本通知的注解
    pub fn annotation(&self) -> &Annotation {
        &self.annotation
    }

    /// 生效的优先级
    pub fn priority(&self) -> i32 {
        self.priority
    }

    fn shape_mismatch(&self) -> WeaverError {
        WeaverError::weaving(format!("{}: unexpected advice function shape", self.advice))
    }

    pub(crate) fn invoke(&self, ctxt: &mut AdviceContext) -> WeaverResult<Value> {
        let AdviceCallable::Simple(f) = &self.advice.callable else {
            return Err(self.shape_mismatch());
        };
        tracing::trace!("Invoking {} on {}", self.advice, ctxt.target().label());

        let previous = ctxt.set_annotation(Some(self.annotation.clone()));
        let result = f(self.aspect.as_any(), ctxt);
        ctxt.set_annotation(previous);
        result
    }

    pub(crate) fn invoke_around(
        &self,
        ctxt: &mut AdviceContext,
        joinpoint: &JoinPoint<'_>,
    ) -> WeaverResult<Value> {
        let AdviceCallable::Around(f) = &self.advice.callable else {
            return Err(self.shape_mismatch());
        };
        tracing::trace!("Invoking {} on {}", self.advice, ctxt.target().label());

        let previous = ctxt.set_annotation(Some(self.annotation.clone()));
        let result = f(self.aspect.as_any(), ctxt, joinpoint);
        ctxt.set_annotation(previous);
        result
    }

    pub(crate) fn invoke_compile(&self, ctxt: &mut CompileContext) -> WeaverResult<Option<Compiled>> {
        let AdviceCallable::Compile(f) = &self.advice.callable else {
            return Err(self.shape_mismatch());
        };
        tracing::trace!("Compiling {} with {}", ctxt.target().label(), self.advice);

        ctxt.set_annotation(Some(self.annotation.clone()));
        f(self.aspect.as_any(), ctxt)
    }
}

impl fmt::Debug for BoundAdvice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundAdvice")
            .field("advice", &self.advice.tag())
            .field("annotation", &self.annotation)
            .field("priority", &self.priority)
            .finish()
    }
}
