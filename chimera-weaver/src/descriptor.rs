//! 可被织入的原始可调用对象
//!
//! 声明端适配器把原始构造函数、属性访问器和方法交给织入器，
//! 织入器在编译阶段产出替换后的版本（[`Compiled`]）

use crate::error::WeaverResult;
use crate::value::{Fields, ObjectRef, Value};
use std::fmt;
use std::sync::Arc;

type ConstructorFn = dyn Fn(&[Value]) -> WeaverResult<Fields> + Send + Sync;
type GetterFn = dyn Fn(&ObjectRef) -> WeaverResult<Value> + Send + Sync;
type SetterFn = dyn Fn(&ObjectRef, Value) -> WeaverResult<()> + Send + Sync;
type MethodFn = dyn Fn(&ObjectRef, &[Value]) -> WeaverResult<Value> + Send + Sync;

/// 构造函数：根据参数产出实例状态
///
/// 产出的字段由织入器合并进预先分配好的实例身份中
#[derive(Clone)]
pub struct Constructor(Arc<ConstructorFn>);

impl Constructor {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> WeaverResult<Fields> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// 不设置任何字段的构造函数
    pub fn empty() -> Self {
        Self::new(|_| Ok(Fields::new()))
    }

    pub fn call(&self, args: &[Value]) -> WeaverResult<Fields> {
        (self.0)(args)
    }
}

/// 属性描述符
#[derive(Clone)]
pub struct PropertyDescriptor {
    getter: Arc<GetterFn>,
    setter: Option<Arc<SetterFn>>,
}

impl PropertyDescriptor {
    pub fn new<G>(getter: G) -> Self
    where
        G: Fn(&ObjectRef) -> WeaverResult<Value> + Send + Sync + 'static,
    {
        Self {
            getter: Arc::new(getter),
            setter: None,
        }
    }

    pub fn with_setter<S>(mut self, setter: S) -> Self
    where
        S: Fn(&ObjectRef, Value) -> WeaverResult<()> + Send + Sync + 'static,
    {
        self.setter = Some(Arc::new(setter));
        self
    }

    /// 直接读写实例字段的描述符
    pub fn field(key: impl Into<String>) -> Self {
        let key: Arc<str> = Arc::from(key.into());
        let read_key = key.clone();
        Self::new(move |instance| Ok(instance.get(&read_key).unwrap_or_default()))
            .with_setter(move |instance, value| {
                instance.set(key.to_string(), value);
                Ok(())
            })
    }

    pub fn get(&self, instance: &ObjectRef) -> WeaverResult<Value> {
        (self.getter)(instance)
    }

    /// 只读属性的 setter 什么都不做
    pub fn set(&self, instance: &ObjectRef, value: Value) -> WeaverResult<()> {
        match &self.setter {
            Some(setter) => setter(instance, value),
            None => Ok(()),
        }
    }

    pub fn is_writable(&self) -> bool {
        self.setter.is_some()
    }
}

/// 方法
#[derive(Clone)]
pub struct Method(Arc<MethodFn>);

impl Method {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&ObjectRef, &[Value]) -> WeaverResult<Value> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, instance: &ObjectRef, args: &[Value]) -> WeaverResult<Value> {
        (self.0)(instance, args)
    }
}

/// 编译阶段的产物
#[derive(Clone)]
pub enum Compiled {
    Constructor(Constructor),
    Property(PropertyDescriptor),
    Method(Method),
}

impl Compiled {
    pub fn as_constructor(&self) -> Option<&Constructor> {
        match self {
            Compiled::Constructor(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_property(&self) -> Option<&PropertyDescriptor> {
        match self {
            Compiled::Property(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_method(&self) -> Option<&Method> {
        match self {
            Compiled::Method(m) => Some(m),
            _ => None,
        }
    }

    fn variant(&self) -> &'static str {
        match self {
            Compiled::Constructor(_) => "Constructor",
            Compiled::Property(_) => "Property",
            Compiled::Method(_) => "Method",
        }
    }

    /// 是否与另一个产物属于同一种描述符
    pub fn same_variant(&self, other: &Compiled) -> bool {
        self.variant() == other.variant()
    }
}

impl fmt::Debug for Compiled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Compiled::{}", self.variant())
    }
}

impl From<Constructor> for Compiled {
    fn from(c: Constructor) -> Self {
        Compiled::Constructor(c)
    }
}

impl From<PropertyDescriptor> for Compiled {
    fn from(p: PropertyDescriptor) -> Self {
        Compiled::Property(p)
    }
}

impl From<Method> for Compiled {
    fn from(m: Method) -> Self {
        Compiled::Method(m)
    }
}
