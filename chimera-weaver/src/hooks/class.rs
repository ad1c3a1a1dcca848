//! 类构造连接点
//!
//! 实例身份在调用开始时就已分配，但在原始构造函数执行前对通知不可见；
//! 构造函数产出的状态合并进这个身份，`is_instance_of` 因而始终成立。
//! AfterReturn / AfterThrow / Around 通知可以返回一个全新的实例来替换它

use super::{descriptor_mismatch, WeaverHooks};
use crate::advice::BoundAdvice;
use crate::constants::{
    CANNOT_CALL_CONSTRUCTOR_AFTER_INSTANCE_USED, RETURNING_NON_INSTANCE_FROM_CLASS_ADVICE,
};
use crate::context::{AdviceContext, InstanceSlot};
use crate::descriptor::Compiled;
use crate::error::{AdviceError, WeaverError, WeaverResult};
use crate::target::TargetRef;
use crate::value::{Object, ObjectRef, Value};

#[derive(Debug, Default)]
pub struct ClassHooks;

impl ClassHooks {
    fn current_instance(ctxt: &AdviceContext) -> Value {
        match &ctxt.instance {
            InstanceSlot::Ready(instance) | InstanceSlot::Replaced(instance) => {
                Value::Object(instance.clone())
            }
            InstanceSlot::Pending(_) | InstanceSlot::Absent => Value::Undefined,
        }
    }

    /// 用通知返回的实例替换当前实例
    fn replace_instance(
        advice: &BoundAdvice,
        ctxt: &mut AdviceContext,
        returned: Value,
        settled: bool,
    ) -> WeaverResult<()> {
        match returned {
            Value::Undefined => Ok(()),
            Value::Object(instance) => {
                ctxt.instance = match &ctxt.instance {
                    InstanceSlot::Pending(_) | InstanceSlot::Replaced(_) if !settled => {
                        InstanceSlot::Replaced(instance.clone())
                    }
                    _ => InstanceSlot::Ready(instance.clone()),
                };
                ctxt.value = Value::Object(instance);
                Ok(())
            }
            Value::Json(_) => Err(AdviceError::new(
                advice.advice().tag(),
                RETURNING_NON_INSTANCE_FROM_CLASS_ADVICE,
            )
            .into()),
        }
    }
}

impl WeaverHooks for ClassHooks {
    fn name(&self) -> &'static str {
        "ClassHooks"
    }

    fn accepts(&self, compiled: &Compiled) -> bool {
        compiled.as_constructor().is_some()
    }

    fn create_context(
        &self,
        target: TargetRef,
        _instance: Option<ObjectRef>,
        args: Vec<Value>,
    ) -> WeaverResult<AdviceContext> {
        let instance = Object::new(target.declaring_class());
        Ok(AdviceContext::new(target, InstanceSlot::Pending(instance), args))
    }

    fn invoke_original(&self, compiled: &Compiled, ctxt: &mut AdviceContext) -> WeaverResult<Value> {
        let constructor = compiled
            .as_constructor()
            .ok_or_else(|| descriptor_mismatch(self, compiled))?;

        let instance = match &ctxt.instance {
            InstanceSlot::Pending(instance) | InstanceSlot::Ready(instance) => instance.clone(),
            InstanceSlot::Replaced(_) => {
                return Err(WeaverError::weaving(CANNOT_CALL_CONSTRUCTOR_AFTER_INSTANCE_USED))
            }
            InstanceSlot::Absent => Object::new(ctxt.target().declaring_class()),
        };

        let fields = constructor.call(&ctxt.args)?;
        instance.merge(fields);
        ctxt.instance = InstanceSlot::Ready(instance.clone());
        Ok(Value::Object(instance))
    }

    fn around_returned(
        &self,
        advice: &BoundAdvice,
        ctxt: &mut AdviceContext,
        returned: Value,
    ) -> WeaverResult<Value> {
        Self::replace_instance(advice, ctxt, returned, false)?;
        Ok(Self::current_instance(ctxt))
    }

    fn after_returned(
        &self,
        advice: &BoundAdvice,
        ctxt: &mut AdviceContext,
        returned: Value,
    ) -> WeaverResult<()> {
        Self::replace_instance(advice, ctxt, returned, true)
    }

    fn after_thrown(
        &self,
        advice: &BoundAdvice,
        ctxt: &mut AdviceContext,
        returned: Value,
    ) -> WeaverResult<()> {
        if returned.is_undefined() {
            // 错误被吞掉：未完成构造的实例按原样交给调用方
            if let InstanceSlot::Pending(instance) = &ctxt.instance {
                ctxt.instance = InstanceSlot::Ready(instance.clone());
            }
            ctxt.value = Self::current_instance(ctxt);
            return Ok(());
        }
        Self::replace_instance(advice, ctxt, returned, true)
    }

    fn finish(&self, ctxt: &mut AdviceContext) -> WeaverResult<Value> {
        match &ctxt.instance {
            InstanceSlot::Ready(instance) | InstanceSlot::Replaced(instance) => {
                Ok(Value::Object(instance.clone()))
            }
            InstanceSlot::Pending(instance) => {
                tracing::debug!(
                    "Constructor of {} was skipped by an around advice",
                    ctxt.target().label()
                );
                let instance = instance.clone();
                ctxt.instance = InstanceSlot::Ready(instance.clone());
                Ok(Value::Object(instance))
            }
            InstanceSlot::Absent => Err(WeaverError::weaving(format!(
                "{} produced no instance",
                ctxt.target().label()
            ))),
        }
    }
}
