//! 动态值与对象模型
//!
//! 织入核心不依赖任何真实的类系统：构造出的实例用 [`Object`] 表示，
//! 它拥有稳定的身份（`id`）、所属类名以及可变字段

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 对象字段
pub type Fields = BTreeMap<String, Value>;

/// 对象引用
pub type ObjectRef = Arc<Object>;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// 动态值
///
/// `Undefined` 表示"没有返回值"，通知返回 `Undefined` 即不替换任何结果
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Json(serde_json::Value),
    Object(ObjectRef),
}

impl Value {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(json) => Some(json),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_json().and_then(|json| json.as_str())
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_json().and_then(|json| json.as_i64())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Json(a), Value::Json(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Json(json) => write!(f, "{}", json),
            Value::Object(object) => write!(f, "{:?}", object),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Undefined
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::Json(json)
    }
}

impl From<ObjectRef> for Value {
    fn from(object: ObjectRef) -> Self {
        Value::Object(object)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Json(serde_json::Value::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Json(serde_json::Value::from(s))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Json(serde_json::Value::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Json(serde_json::Value::from(b))
    }
}

/// 被织入类的实例
pub struct Object {
    id: u64,
    class_name: String,
    fields: RwLock<Fields>,
}

impl Object {
    /// 创建一个没有字段的新实例
    pub fn new(class_name: impl Into<String>) -> ObjectRef {
        Arc::new(Self {
            id: NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed),
            class_name: class_name.into(),
            fields: RwLock::new(Fields::new()),
        })
    }

    /// 使用初始字段创建实例
    pub fn with_fields(class_name: impl Into<String>, fields: Fields) -> ObjectRef {
        let object = Self::new(class_name);
        object.merge(fields);
        object
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// 相当于 `instanceof`
    pub fn is_instance_of(&self, class_name: &str) -> bool {
        self.class_name == class_name
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.fields.read().get(key).cloned()
    }

    /// 读取 JSON 字段
    pub fn get_json(&self, key: &str) -> Option<serde_json::Value> {
        self.fields.read().get(key).and_then(|v| v.as_json().cloned())
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.write().insert(key.into(), value.into());
    }

    /// 向数组字段追加元素，字段不存在或不是数组时先置为空数组
    pub fn push(&self, key: &str, item: impl Into<serde_json::Value>) {
        let mut fields = self.fields.write();
        let entry = fields
            .entry(key.to_string())
            .or_insert_with(|| Value::Json(serde_json::Value::Array(Vec::new())));
        if !matches!(entry, Value::Json(serde_json::Value::Array(_))) {
            *entry = Value::Json(serde_json::Value::Array(Vec::new()));
        }
        if let Value::Json(serde_json::Value::Array(items)) = entry {
            items.push(item.into());
        }
    }

    /// 将新构造出的状态合并进当前身份
    pub fn merge(&self, fields: Fields) {
        self.fields.write().extend(fields);
    }

    /// 字段快照
    pub fn fields(&self) -> Fields {
        self.fields.read().clone()
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut Fields) -> R) -> R {
        f(&mut self.fields.write())
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.id)
            .field("class_name", &self.class_name)
            .field("fields", &*self.fields.read())
            .finish()
    }
}
