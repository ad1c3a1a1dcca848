//! 注解引用与注解实例
//!
//! 注解的声明与元数据采集由外部注解子系统负责，织入核心只需要：
//! 注解的稳定引用（分组 + 名称）以及声明点上附带的注解实例

use crate::value::Value;
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// 注解引用，渲染为 `@group:name`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnnotationRef {
    group_id: Cow<'static, str>,
    name: Cow<'static, str>,
}

impl AnnotationRef {
    /// 用于 `const` 声明
    pub const fn of(group_id: &'static str, name: &'static str) -> Self {
        Self {
            group_id: Cow::Borrowed(group_id),
            name: Cow::Borrowed(name),
        }
    }

    pub fn new(group_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group_id: Cow::Owned(group_id.into()),
            name: Cow::Owned(name.into()),
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 以无参数的形式应用到声明点
    pub fn annotation(&self) -> Annotation {
        Annotation::new(self.clone())
    }
}

impl fmt::Display for AnnotationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}:{}", self.group_id, self.name)
    }
}

impl FromStr for AnnotationRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix('@')
            .ok_or_else(|| format!("Invalid annotation reference: {}", s))?;
        match body.split_once(':') {
            Some((group, name)) if !group.is_empty() && !name.is_empty() => {
                Ok(Self::new(group, name))
            }
            _ => Err(format!("Invalid annotation reference: {}", s)),
        }
    }
}

/// 应用在某个声明点上的注解
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    reference: AnnotationRef,
    args: Vec<Value>,
}

impl Annotation {
    pub fn new(reference: AnnotationRef) -> Self {
        Self {
            reference,
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn reference(&self) -> &AnnotationRef {
        &self.reference
    }

    /// 注解参数
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn is(&self, reference: &AnnotationRef) -> bool {
        &self.reference == reference
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reference)
    }
}
