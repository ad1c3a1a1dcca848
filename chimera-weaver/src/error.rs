//! 织入错误类型
//!
//! - `Weaving`：配置或协议违规（非法切点、加载后修改切面、过早访问实例等）
//! - `Advice`：某个通知违反了所在阶段的返回值约定，同样属于织入错误
//! - `Type`：对象不是切面
//! - `Config`：配置或日志初始化失败
//! - `Thrown`：业务代码（原始构造函数/访问器/方法或通知）抛出的错误

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// 织入结果类型
pub type WeaverResult<T> = Result<T, WeaverError>;

/// 织入错误
#[derive(Debug, Clone, Error)]
pub enum WeaverError {
    #[error("{0}")]
    Weaving(String),

    #[error(transparent)]
    Advice(#[from] AdviceError),

    #[error("{0}")]
    Type(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Thrown(Arc<anyhow::Error>),
}

impl WeaverError {
    pub fn weaving(message: impl Into<String>) -> Self {
        Self::Weaving(message.into())
    }

    /// 包装一个业务错误
    pub fn thrown<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self::Thrown(Arc::new(anyhow::Error::msg(message)))
    }

    /// `Weaving` 与 `Advice` 都是织入错误
    pub fn is_weaving_error(&self) -> bool {
        matches!(self, Self::Weaving(_) | Self::Advice(_))
    }

    /// 框架错误不会交给 AfterThrow 通知处理
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Thrown(_))
    }

    /// 获取业务错误
    pub fn as_thrown(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Thrown(error) => Some(error),
            _ => None,
        }
    }

    /// 判断两个错误是否为同一个被抛出的业务错误
    pub fn same_thrown(&self, other: &WeaverError) -> bool {
        match (self, other) {
            (Self::Thrown(a), Self::Thrown(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<anyhow::Error> for WeaverError {
    fn from(error: anyhow::Error) -> Self {
        Self::Thrown(Arc::new(error))
    }
}

/// 通知违规错误
///
/// 消息格式：`<通知标签>: <原因>`，例如
/// `@After(@test:AClass) LabelAspect.after(): Returning from advice is not supported`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{advice}: {message}")]
pub struct AdviceError {
    advice: String,
    message: String,
}

impl AdviceError {
    pub fn new(advice: impl fmt::Display, message: impl Into<String>) -> Self {
        Self {
            advice: advice.to_string(),
            message: message.into(),
        }
    }

    /// 出错通知的标签
    pub fn advice(&self) -> &str {
        &self.advice
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
