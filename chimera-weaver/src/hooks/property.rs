//! 属性访问连接点
//!
//! getter 的参数在 Before 通知执行前被清空，AfterReturn 可以替换读到的值；
//! setter 的值由连接点写入实例，AfterReturn / AfterThrow 都不允许返回值

use super::{descriptor_mismatch, forbid_return, require_instance, WeaverHooks};
use crate::advice::BoundAdvice;
use crate::context::{AdviceContext, InstanceSlot};
use crate::descriptor::Compiled;
use crate::error::WeaverResult;
use crate::plan::AdviceFilter;
use crate::target::TargetRef;
use crate::value::{ObjectRef, Value};

/// 属性 getter
#[derive(Debug, Default)]
pub struct PropertyGetHooks;

impl WeaverHooks for PropertyGetHooks {
    fn name(&self) -> &'static str {
        "PropertyGetHooks"
    }

    fn filter(&self) -> AdviceFilter {
        AdviceFilter::Getter
    }

    fn accepts(&self, compiled: &Compiled) -> bool {
        compiled.as_property().is_some()
    }

    fn create_context(
        &self,
        target: TargetRef,
        instance: Option<ObjectRef>,
        _args: Vec<Value>,
    ) -> WeaverResult<AdviceContext> {
        let instance = require_instance(&target, instance)?;
        Ok(AdviceContext::new(target, InstanceSlot::Ready(instance), Vec::new()))
    }

    fn invoke_original(&self, compiled: &Compiled, ctxt: &mut AdviceContext) -> WeaverResult<Value> {
        let descriptor = compiled
            .as_property()
            .ok_or_else(|| descriptor_mismatch(self, compiled))?;
        let instance = ctxt.instance()?.clone();
        descriptor.get(&instance)
    }

    fn around_returned(
        &self,
        _advice: &BoundAdvice,
        _ctxt: &mut AdviceContext,
        returned: Value,
    ) -> WeaverResult<Value> {
        Ok(returned)
    }

    fn after_returned(
        &self,
        _advice: &BoundAdvice,
        ctxt: &mut AdviceContext,
        returned: Value,
    ) -> WeaverResult<()> {
        if !returned.is_undefined() {
            ctxt.value = returned;
        }
        Ok(())
    }

    fn after_thrown(
        &self,
        advice: &BoundAdvice,
        _ctxt: &mut AdviceContext,
        returned: Value,
    ) -> WeaverResult<()> {
        forbid_return(advice, &returned)
    }

    fn finish(&self, ctxt: &mut AdviceContext) -> WeaverResult<Value> {
        Ok(ctxt.value.clone())
    }
}

/// 属性 setter
#[derive(Debug, Default)]
pub struct PropertySetHooks;

impl WeaverHooks for PropertySetHooks {
    fn name(&self) -> &'static str {
        "PropertySetHooks"
    }

    fn filter(&self) -> AdviceFilter {
        AdviceFilter::Setter
    }

    fn accepts(&self, compiled: &Compiled) -> bool {
        compiled.as_property().is_some()
    }

    fn create_context(
        &self,
        target: TargetRef,
        instance: Option<ObjectRef>,
        args: Vec<Value>,
    ) -> WeaverResult<AdviceContext> {
        let instance = require_instance(&target, instance)?;
        Ok(AdviceContext::new(target, InstanceSlot::Ready(instance), args))
    }

    fn invoke_original(&self, compiled: &Compiled, ctxt: &mut AdviceContext) -> WeaverResult<Value> {
        let descriptor = compiled
            .as_property()
            .ok_or_else(|| descriptor_mismatch(self, compiled))?;
        let instance = ctxt.instance()?.clone();
        let value = ctxt.args.first().cloned().unwrap_or_default();
        descriptor.set(&instance, value)?;
        Ok(Value::Undefined)
    }

    fn around_returned(
        &self,
        advice: &BoundAdvice,
        _ctxt: &mut AdviceContext,
        returned: Value,
    ) -> WeaverResult<Value> {
        if !returned.is_undefined() {
            tracing::trace!("Ignoring value returned by {} on a setter", advice.advice());
        }
        Ok(Value::Undefined)
    }

    fn after_returned(
        &self,
        advice: &BoundAdvice,
        _ctxt: &mut AdviceContext,
        returned: Value,
    ) -> WeaverResult<()> {
        forbid_return(advice, &returned)
    }

    fn after_thrown(
        &self,
        advice: &BoundAdvice,
        _ctxt: &mut AdviceContext,
        returned: Value,
    ) -> WeaverResult<()> {
        forbid_return(advice, &returned)
    }

    fn finish(&self, _ctxt: &mut AdviceContext) -> WeaverResult<Value> {
        Ok(Value::Undefined)
    }
}
