//! 通知上下文
//!
//! 每次具体调用（一次构造、一次属性访问、一次方法调用）创建一个
//! [`AdviceContext`]，该调用触发的所有通知共享同一个 `data`

use crate::annotation::Annotation;
use crate::constants::CANNOT_GET_THIS_BEFORE_JOINPOINT;
use crate::descriptor::Compiled;
use crate::error::{WeaverError, WeaverResult};
use crate::target::TargetRef;
use crate::value::{ObjectRef, Value};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 同一次调用内所有通知共享的数据
#[derive(Clone, Default)]
pub struct AdviceData(Arc<Mutex<HashMap<String, serde_json::Value>>>);

impl AdviceData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.0.lock().get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.lock().insert(key.into(), value.into());
    }

    /// 向数组条目追加元素
    pub fn push(&self, key: &str, item: impl Into<serde_json::Value>) {
        let mut data = self.0.lock();
        let entry = data
            .entry(key.to_string())
            .or_insert_with(|| serde_json::Value::Array(Vec::new()));
        match entry {
            serde_json::Value::Array(items) => items.push(item.into()),
            other => *other = serde_json::Value::Array(vec![item.into()]),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut HashMap<String, serde_json::Value>) -> R) -> R {
        f(&mut self.0.lock())
    }

    /// 是否为同一份数据
    pub fn ptr_eq(&self, other: &AdviceData) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for AdviceData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.lock().iter()).finish()
    }
}

/// 实例所处的状态
#[derive(Debug, Clone)]
pub(crate) enum InstanceSlot {
    /// 本连接点没有实例
    Absent,
    /// 已分配身份，构造函数尚未执行
    Pending(ObjectRef),
    Ready(ObjectRef),
    /// 构造函数执行前就被通知替换
    Replaced(ObjectRef),
}

/// 通知上下文
///
/// 通知通过只读访问器观察上下文；参数只能经由 [`crate::JoinPoint::proceed_with`] 修改，
/// 结果只能通过通知的返回值替换
pub struct AdviceContext {
    target: TargetRef,
    annotation: Option<Annotation>,
    pub(crate) instance: InstanceSlot,
    pub(crate) args: Vec<Value>,
    pub(crate) value: Value,
    pub(crate) error: Option<WeaverError>,
    data: AdviceData,
}

impl AdviceContext {
    pub(crate) fn new(target: TargetRef, instance: InstanceSlot, args: Vec<Value>) -> Self {
        Self {
            target,
            annotation: None,
            instance,
            args,
            value: Value::Undefined,
            error: None,
            data: AdviceData::new(),
        }
    }

    pub fn target(&self) -> &TargetRef {
        &self.target
    }

    /// 触发当前通知的注解
    pub fn annotation(&self) -> Option<&Annotation> {
        self.annotation.as_ref()
    }

    pub(crate) fn set_annotation(&mut self, annotation: Option<Annotation>) -> Option<Annotation> {
        std::mem::replace(&mut self.annotation, annotation)
    }

    /// 当前实例
    ///
    /// 类构造过程中，原始构造函数执行之前访问实例会失败
    pub fn instance(&self) -> WeaverResult<&ObjectRef> {
        match &self.instance {
            InstanceSlot::Ready(instance) | InstanceSlot::Replaced(instance) => Ok(instance),
            InstanceSlot::Pending(_) => Err(WeaverError::weaving(CANNOT_GET_THIS_BEFORE_JOINPOINT)),
            InstanceSlot::Absent => Err(WeaverError::weaving(format!(
                "{} has no instance",
                self.target.label()
            ))),
        }
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// 当前结果：类为实例，属性/方法为返回值
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// 本次调用抛出的错误，AfterThrow 与 After 阶段可见
    pub fn error(&self) -> Option<&WeaverError> {
        self.error.as_ref()
    }

    pub fn data(&self) -> &AdviceData {
        &self.data
    }
}

impl fmt::Debug for AdviceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdviceContext")
            .field("target", &self.target.reference())
            .field("annotation", &self.annotation)
            .field("args", &self.args)
            .field("value", &self.value)
            .field("error", &self.error)
            .field("data", &self.data)
            .finish()
    }
}

/// Compile 通知的上下文
///
/// `compiled` 是上一个 Compile 通知（或原始声明）的产物
pub struct CompileContext {
    target: TargetRef,
    annotation: Option<Annotation>,
    compiled: Compiled,
}

impl CompileContext {
    pub(crate) fn new(target: TargetRef, compiled: Compiled) -> Self {
        Self {
            target,
            annotation: None,
            compiled,
        }
    }

    pub fn target(&self) -> &TargetRef {
        &self.target
    }

    pub fn annotation(&self) -> Option<&Annotation> {
        self.annotation.as_ref()
    }

    pub(crate) fn set_annotation(&mut self, annotation: Option<Annotation>) {
        self.annotation = annotation;
    }

    pub fn compiled(&self) -> &Compiled {
        &self.compiled
    }

    pub(crate) fn replace(&mut self, compiled: Compiled) {
        self.compiled = compiled;
    }

    pub(crate) fn into_compiled(self) -> Compiled {
        self.compiled
    }
}
