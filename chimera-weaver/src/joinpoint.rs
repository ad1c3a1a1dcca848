//! 连接点（JoinPoint）定义
//!
//! 环绕通知拿到的可调用连接点：调用它会执行环绕链中的下一个通知，
//! 最内层则执行（编译后的）原始构造函数/访问器/方法。
//!
//! 连接点可以被重复调用；但原始构造函数或 setter 执行多次不受支持，
//! 可能破坏实例状态

use crate::advice::BoundAdvice;
use crate::context::AdviceContext;
use crate::error::WeaverResult;
use crate::hooks::WeaverHooks;
use crate::value::Value;
use std::fmt;

/// 执行原始代码的函数
pub type OriginalFn<'a> = dyn Fn(&mut AdviceContext) -> WeaverResult<Value> + 'a;

/// 环绕通知的连接点
pub struct JoinPoint<'a> {
    arounds: &'a [BoundAdvice],
    original: &'a OriginalFn<'a>,
    hooks: &'a dyn WeaverHooks,
}

impl<'a> JoinPoint<'a> {
    /// 以 `arounds[0]` 为最外层构造连接点
    pub(crate) fn new(
        arounds: &'a [BoundAdvice],
        original: &'a OriginalFn<'a>,
        hooks: &'a dyn WeaverHooks,
    ) -> Self {
        Self {
            arounds,
            original,
            hooks,
        }
    }

    /// 使用当前参数继续执行
    pub fn proceed(&self, ctxt: &mut AdviceContext) -> WeaverResult<Value> {
        let value = match self.arounds.split_first() {
            Some((advice, inner)) => {
                let next = JoinPoint::new(inner, self.original, self.hooks);
                let returned = advice.invoke_around(ctxt, &next)?;
                self.hooks.around_returned(advice, ctxt, returned)?
            }
            None => (self.original)(ctxt)?,
        };

        ctxt.value = value.clone();
        Ok(value)
    }

    /// 替换参数后继续执行
    pub fn proceed_with(&self, ctxt: &mut AdviceContext, args: Vec<Value>) -> WeaverResult<Value> {
        ctxt.args = args;
        self.proceed(ctxt)
    }

    /// 剩余的环绕通知数量
    pub fn depth(&self) -> usize {
        self.arounds.len()
    }
}

impl fmt::Debug for JoinPoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinPoint")
            .field("arounds", &self.arounds)
            .field("hooks", &self.hooks.name())
            .finish()
    }
}
