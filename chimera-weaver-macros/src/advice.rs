//! 通知方法属性的解析

use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::punctuated::Punctuated;
use syn::{Attribute, Error, Expr, FnArg, ImplItemFn, Meta, Result, Token};

/// 通知阶段，对应 `AspectBuilder` 上的方法和装饰器类型
#[derive(Clone, Copy)]
pub enum Phase {
    Compile,
    Before,
    Around,
    AfterReturn,
    AfterThrow,
    After,
}

impl Phase {
    const ALL: [(&'static str, Phase); 6] = [
        ("compile", Phase::Compile),
        ("before", Phase::Before),
        ("around", Phase::Around),
        ("after_return", Phase::AfterReturn),
        ("after_throw", Phase::AfterThrow),
        ("after", Phase::After),
    ];

    fn of(attr: &Attribute) -> Option<Phase> {
        Self::ALL
            .iter()
            .find(|(name, _)| attr.path().is_ident(name))
            .map(|(_, phase)| *phase)
    }

    fn builder_method(&self) -> syn::Ident {
        let name = match self {
            Phase::Compile => "compile",
            Phase::Before => "before",
            Phase::Around => "around",
            Phase::AfterReturn => "after_return",
            Phase::AfterThrow => "after_throw",
            Phase::After => "after",
        };
        syn::Ident::new(name, Span::call_site())
    }

    fn decorator(&self) -> syn::Ident {
        let name = match self {
            Phase::Compile => "Compile",
            Phase::Before => "Before",
            Phase::Around => "Around",
            Phase::AfterReturn => "AfterReturn",
            Phase::AfterThrow => "AfterThrow",
            Phase::After => "After",
        };
        syn::Ident::new(name, Span::call_site())
    }
}

/// 一个通知方法上的一个通知属性
pub struct AdviceMethod {
    phase: Phase,
    method: syn::Ident,
    expressions: Vec<Expr>,
    priority: Option<Expr>,
}

impl AdviceMethod {
    /// 提取并移除方法上的通知属性
    pub fn take_from(item: &mut ImplItemFn) -> Result<Vec<AdviceMethod>> {
        let mut advices = Vec::new();
        let mut kept = Vec::new();

        for attr in item.attrs.drain(..) {
            match Phase::of(&attr) {
                Some(phase) => advices.push((phase, attr)),
                None => kept.push(attr),
            }
        }
        item.attrs = kept;

        if advices.is_empty() {
            return Ok(Vec::new());
        }
        check_receiver(item)?;

        advices
            .into_iter()
            .map(|(phase, attr)| Self::parse(phase, &attr, item.sig.ident.clone()))
            .collect()
    }

    fn parse(phase: Phase, attr: &Attribute, method: syn::Ident) -> Result<AdviceMethod> {
        let Meta::List(_) = &attr.meta else {
            return Err(Error::new_spanned(
                attr,
                "advice attribute expects at least one pointcut expression",
            ));
        };

        let args = attr.parse_args_with(Punctuated::<Expr, Token![,]>::parse_terminated)?;
        let mut expressions = Vec::new();
        let mut priority = None;

        for arg in args {
            match arg {
                Expr::Assign(assign) => {
                    let is_priority =
                        matches!(&*assign.left, Expr::Path(p) if p.path.is_ident("priority"));
                    if !is_priority {
                        return Err(Error::new_spanned(
                            assign.left,
                            "unknown advice option, expected `priority`",
                        ));
                    }
                    priority = Some(*assign.right);
                }
                expression => expressions.push(expression),
            }
        }

        if expressions.is_empty() {
            return Err(Error::new_spanned(
                attr,
                "advice attribute expects at least one pointcut expression",
            ));
        }

        Ok(AdviceMethod {
            phase,
            method,
            expressions,
            priority,
        })
    }

    /// 生成 `AspectBuilder` 上的一次链式调用
    pub fn to_builder_call(&self) -> TokenStream {
        let builder_method = self.phase.builder_method();
        let decorator = self.phase.decorator();
        let method = &self.method;
        let method_name = method.to_string();
        let expressions = &self.expressions;
        let priority = self
            .priority
            .as_ref()
            .map(|priority| quote! { .priority(#priority) });

        let decorator = quote! {
            ::chimera_weaver::#decorator::new(::std::vec![
                #(::chimera_weaver::PointcutExpression::from(#expressions)),*
            ]) #priority
        };

        let callback = match self.phase {
            Phase::Compile => quote! {
                |aspect: &Self, ctxt: &::chimera_weaver::CompileContext| aspect.#method(ctxt)
            },
            Phase::Around => quote! {
                |aspect: &Self,
                 ctxt: &mut ::chimera_weaver::AdviceContext,
                 joinpoint: &::chimera_weaver::JoinPoint<'_>| aspect.#method(ctxt, joinpoint)
            },
            _ => quote! {
                |aspect: &Self, ctxt: &::chimera_weaver::AdviceContext| aspect.#method(ctxt)
            },
        };

        quote! {
            .#builder_method(#decorator, #method_name, #callback)
        }
    }
}

fn check_receiver(item: &ImplItemFn) -> Result<()> {
    match item.sig.inputs.first() {
        Some(FnArg::Receiver(receiver))
            if receiver.reference.is_some() && receiver.mutability.is_none() =>
        {
            Ok(())
        }
        _ => Err(Error::new_spanned(
            &item.sig,
            "advice methods must take `&self` as their first parameter",
        )),
    }
}

/// 在 `#[aspect]` 之外使用通知属性
pub fn outside_aspect(name: &str, item: TokenStream) -> TokenStream {
    let message = format!("#[{}] can only be used inside an #[aspect] impl block", name);
    quote! {
        ::core::compile_error!(#message);
        #item
    }
}
