//! 织入目标（声明点）与目标注册表
//!
//! 目标按 `(声明类型, 成员类型, 成员名, 参数下标)` 记忆化：
//! 同一声明点总是得到同一个 `Arc<Target>`，执行计划和上下文都以此为缓存键

use crate::annotation::{Annotation, AnnotationRef};
use crate::pointcut::JoinPointKind;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 目标引用
pub type TargetRef = Arc<Target>;

/// 目标的身份键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetKey {
    pub declaring_type: String,
    pub kind: JoinPointKind,
    pub member: Option<String>,
    pub parameter_index: Option<usize>,
}

/// 织入目标
pub struct Target {
    key: TargetKey,
    label: String,
    reference: String,
    parent: Option<TargetRef>,
    annotations: RwLock<Vec<Annotation>>,
}

impl Target {
    fn new(key: TargetKey, parent: Option<TargetRef>) -> Self {
        let class = &key.declaring_type;
        let member = key.member.as_deref().unwrap_or_default();
        let (label, reference) = match key.kind {
            JoinPointKind::Class => (format!("class {}", class), format!("c[{}]", class)),
            JoinPointKind::Property => (
                format!("property {}.{}", class, member),
                format!("c[{}].p[{}]", class, member),
            ),
            JoinPointKind::Method => (
                format!("method {}.{}", class, member),
                format!("c[{}].m[{}]", class, member),
            ),
            JoinPointKind::Parameter => {
                let index = key.parameter_index.unwrap_or_default();
                (
                    format!("parameter {}.{}(#{})", class, member, index),
                    format!("c[{}].m[{}].a[{}]", class, member, index),
                )
            }
        };

        Self {
            key,
            label,
            reference,
            parent,
            annotations: RwLock::new(Vec::new()),
        }
    }

    pub fn kind(&self) -> JoinPointKind {
        self.key.kind
    }

    pub fn key(&self) -> &TargetKey {
        &self.key
    }

    /// 声明所在的类
    pub fn declaring_class(&self) -> &str {
        &self.key.declaring_type
    }

    /// 属性名或方法名，类目标为 `None`
    pub fn property_key(&self) -> Option<&str> {
        self.key.member.as_deref()
    }

    pub fn parameter_index(&self) -> Option<usize> {
        self.key.parameter_index
    }

    /// 切点成员模式匹配的名称：类目标为类名，其余为成员名
    pub fn member_name(&self) -> &str {
        self.key.member.as_deref().unwrap_or(&self.key.declaring_type)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// 稳定引用，例如 `c[A].m[run]`
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// 父目标：成员的父目标是所在类，参数的父目标是所在方法
    pub fn parent(&self) -> Option<&TargetRef> {
        self.parent.as_ref()
    }

    /// 附加注解
    pub fn annotate(&self, annotation: Annotation) -> &Self {
        self.annotations.write().push(annotation);
        self
    }

    pub fn annotations(&self) -> Vec<Annotation> {
        self.annotations.read().clone()
    }

    /// 指定注解的全部实例
    pub fn annotations_of(&self, reference: &AnnotationRef) -> Vec<Annotation> {
        self.annotations
            .read()
            .iter()
            .filter(|a| a.is(reference))
            .cloned()
            .collect()
    }

    pub fn has_annotation(&self, reference: &AnnotationRef) -> bool {
        self.annotations.read().iter().any(|a| a.is(reference))
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("ref", &self.reference)
            .field("annotations", &*self.annotations.read())
            .finish()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

/// 目标注册表
#[derive(Default)]
pub struct TargetRegistry {
    targets: RwLock<HashMap<TargetKey, TargetRef>>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_or_insert(&self, key: TargetKey, parent: Option<TargetRef>) -> TargetRef {
        if let Some(target) = self.targets.read().get(&key) {
            return target.clone();
        }

        let mut targets = self.targets.write();
        targets
            .entry(key.clone())
            .or_insert_with(|| {
                let target = Arc::new(Target::new(key, parent));
                tracing::trace!("Registered target {}", target.reference());
                target
            })
            .clone()
    }

    /// 类目标
    pub fn class(&self, class_name: &str) -> TargetRef {
        self.get_or_insert(
            TargetKey {
                declaring_type: class_name.to_string(),
                kind: JoinPointKind::Class,
                member: None,
                parameter_index: None,
            },
            None,
        )
    }

    /// 属性目标
    pub fn property(&self, class_name: &str, property_key: &str) -> TargetRef {
        let parent = self.class(class_name);
        self.get_or_insert(
            TargetKey {
                declaring_type: class_name.to_string(),
                kind: JoinPointKind::Property,
                member: Some(property_key.to_string()),
                parameter_index: None,
            },
            Some(parent),
        )
    }

    /// 方法目标
    pub fn method(&self, class_name: &str, method_name: &str) -> TargetRef {
        let parent = self.class(class_name);
        self.get_or_insert(
            TargetKey {
                declaring_type: class_name.to_string(),
                kind: JoinPointKind::Method,
                member: Some(method_name.to_string()),
                parameter_index: None,
            },
            Some(parent),
        )
    }

    /// 参数目标
    pub fn parameter(&self, class_name: &str, method_name: &str, index: usize) -> TargetRef {
        let parent = self.method(class_name, method_name);
        self.get_or_insert(
            TargetKey {
                declaring_type: class_name.to_string(),
                kind: JoinPointKind::Parameter,
                member: Some(method_name.to_string()),
                parameter_index: Some(index),
            },
            Some(parent),
        )
    }

    pub fn get(&self, key: &TargetKey) -> Option<TargetRef> {
        self.targets.read().get(key).cloned()
    }

    /// 方法的全部已登记参数目标，按下标排序
    pub fn parameters_of(&self, method: &Target) -> Vec<TargetRef> {
        let mut parameters: Vec<TargetRef> = self
            .targets
            .read()
            .values()
            .filter(|t| {
                t.kind() == JoinPointKind::Parameter
                    && t.declaring_class() == method.declaring_class()
                    && t.property_key() == method.property_key()
            })
            .cloned()
            .collect();
        parameters.sort_by_key(|t| t.parameter_index());
        parameters
    }

    pub fn len(&self) -> usize {
        self.targets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.read().is_empty()
    }
}
