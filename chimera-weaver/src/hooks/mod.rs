//! 各类连接点的织入策略
//!
//! 通用流程由 [`crate::plan::WovenCallable`] 驱动：
//! `COMPILE(一次) → BEFORE → AROUND(嵌套) → ORIGINAL → (AFTER_RETURN | AFTER_THROW) → AFTER`，
//! 不同连接点在以下几处有差异，由 [`WeaverHooks`] 实现：
//! - 如何建立上下文、如何执行原始代码
//! - 各阶段通知的返回值如何处理（替换结果、替换实例，或者视为违规）

mod class;
mod method;
mod property;

pub use class::ClassHooks;
pub use method::MethodHooks;
pub use property::{PropertyGetHooks, PropertySetHooks};

use crate::advice::BoundAdvice;
use crate::constants::RETURNING_FROM_ADVICE_NOT_SUPPORTED;
use crate::context::AdviceContext;
use crate::descriptor::Compiled;
use crate::error::{AdviceError, WeaverError, WeaverResult};
use crate::plan::AdviceFilter;
use crate::target::TargetRef;
use crate::value::{ObjectRef, Value};

/// 连接点织入策略
pub trait WeaverHooks: Send + Sync {
    /// 策略名称
    fn name(&self) -> &'static str;

    /// 本策略适用的通知
    fn filter(&self) -> AdviceFilter {
        AdviceFilter::All
    }

    /// Compile 通知的产物是否可用于本连接点
    fn accepts(&self, compiled: &Compiled) -> bool;

    /// 为一次调用建立上下文
    fn create_context(
        &self,
        target: TargetRef,
        instance: Option<ObjectRef>,
        args: Vec<Value>,
    ) -> WeaverResult<AdviceContext>;

    /// 执行编译后的原始代码
    fn invoke_original(&self, compiled: &Compiled, ctxt: &mut AdviceContext) -> WeaverResult<Value>;

    /// 处理环绕通知的返回值，返回本层的结果
    fn around_returned(
        &self,
        advice: &BoundAdvice,
        ctxt: &mut AdviceContext,
        returned: Value,
    ) -> WeaverResult<Value>;

    /// 处理 AfterReturn 通知的返回值
    fn after_returned(
        &self,
        advice: &BoundAdvice,
        ctxt: &mut AdviceContext,
        returned: Value,
    ) -> WeaverResult<()>;

    /// 处理 AfterThrow 通知的返回值（通知没有重新抛出错误）
    fn after_thrown(
        &self,
        advice: &BoundAdvice,
        ctxt: &mut AdviceContext,
        returned: Value,
    ) -> WeaverResult<()>;

    /// 调用的最终结果
    fn finish(&self, ctxt: &mut AdviceContext) -> WeaverResult<Value>;
}

/// 不允许返回值的阶段
pub(crate) fn forbid_return(advice: &BoundAdvice, returned: &Value) -> WeaverResult<()> {
    if returned.is_undefined() {
        Ok(())
    } else {
        Err(AdviceError::new(advice.advice().tag(), RETURNING_FROM_ADVICE_NOT_SUPPORTED).into())
    }
}

pub(crate) fn descriptor_mismatch(hooks: &dyn WeaverHooks, compiled: &Compiled) -> WeaverError {
    WeaverError::weaving(format!(
        "{} cannot invoke {:?}",
        hooks.name(),
        compiled
    ))
}

/// 属性与方法必须在实例上调用
pub(crate) fn require_instance(target: &TargetRef, instance: Option<ObjectRef>) -> WeaverResult<ObjectRef> {
    instance.ok_or_else(|| WeaverError::weaving(format!("{} requires an instance", target.label())))
}
