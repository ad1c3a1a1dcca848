//! 方法调用连接点
//!
//! 参数注解的通知也在这里触发：参数切点只是"方法上有被注解的参数"，
//! 并不是独立的连接点

use super::{descriptor_mismatch, require_instance, WeaverHooks};
use crate::advice::BoundAdvice;
use crate::context::{AdviceContext, InstanceSlot};
use crate::descriptor::Compiled;
use crate::error::WeaverResult;
use crate::target::TargetRef;
use crate::value::{ObjectRef, Value};

#[derive(Debug, Default)]
pub struct MethodHooks;

impl WeaverHooks for MethodHooks {
    fn name(&self) -> &'static str {
        "MethodHooks"
    }

    fn accepts(&self, compiled: &Compiled) -> bool {
        compiled.as_method().is_some()
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
        let method = compiled
            .as_method()
            .ok_or_else(|| descriptor_mismatch(self, compiled))?;
        let instance = ctxt.instance()?.clone();
        method.call(&instance, &ctxt.args)
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
        _advice: &BoundAdvice,
        ctxt: &mut AdviceContext,
        returned: Value,
    ) -> WeaverResult<()> {
        ctxt.value = returned;
        Ok(())
    }

    fn finish(&self, ctxt: &mut AdviceContext) -> WeaverResult<Value> {
        Ok(ctxt.value.clone())
    }
}
