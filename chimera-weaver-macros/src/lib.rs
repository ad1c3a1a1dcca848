//! Chimera Weaver 过程宏
//!
//! - `#[aspect]` - 在 `impl` 块上声明切面，实现 `chimera_weaver::Aspect` 并自动注册
//! - `#[compile]` / `#[before]` / `#[around]` / `#[after_return]` / `#[after_throw]` /
//!   `#[after]` - 在 `#[aspect]` 块内把方法标记为通知

extern crate proc_macro;

use proc_macro::TokenStream;
use syn::{parse_macro_input, ItemImpl};

mod advice;
mod aspect;

/// `#[aspect]` 宏
///
/// 参数：可选的切面 id（`"id"` 或 `id = ...`）以及 `priority = ...`
///
/// 使用示例：
/// ```ignore
/// use chimera_weaver::prelude::*;
/// use chimera_weaver_macros::aspect;
///
/// pub struct LabelAspect;
///
/// #[aspect("LabelAspect", priority = 10)]
/// impl LabelAspect {
///     #[before("class @test:AClass *")]
///     fn before(&self, ctxt: &AdviceContext) -> WeaverResult<Value> {
///         ctxt.data().push("labels", "before");
///         Ok(Value::Undefined)
///     }
///
///     #[around(on::method().with_annotation(&AMETHOD), priority = 1)]
///     fn around(&self, ctxt: &mut AdviceContext, jp: &JoinPoint<'_>) -> WeaverResult<Value> {
///         jp.proceed(ctxt)
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn aspect(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as aspect::AspectArgs);
    let item = parse_macro_input!(item as ItemImpl);
    aspect::impl_aspect(args, item)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

macro_rules! advice_attribute {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[proc_macro_attribute]
        pub fn $name(_attr: TokenStream, item: TokenStream) -> TokenStream {
            advice::outside_aspect(stringify!($name), item.into()).into()
        }
    };
}

advice_attribute!(
    /// `#[compile]` 属性宏：Compile 通知
    compile
);
advice_attribute!(
    /// `#[before]` 属性宏：前置通知
    before
);
advice_attribute!(
    /// `#[around]` 属性宏：环绕通知
    around
);
advice_attribute!(
    /// `#[after_return]` 属性宏：返回后通知
    after_return
);
advice_attribute!(
    /// `#[after_throw]` 属性宏：异常通知
    after_throw
);
advice_attribute!(
    /// `#[after]` 属性宏：后置通知
    after
);
