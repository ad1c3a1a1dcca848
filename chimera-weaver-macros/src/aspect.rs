//! `#[aspect]` 宏实现

use crate::advice::AdviceMethod;
use proc_macro2::TokenStream;
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{Error, Expr, ImplItem, ItemImpl, Result, Token, Type};

/// `#[aspect(...)]` 参数
#[derive(Default)]
pub struct AspectArgs {
    id: Option<Expr>,
    priority: Option<Expr>,
}

impl Parse for AspectArgs {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut args = AspectArgs::default();
        for arg in Punctuated::<Expr, Token![,]>::parse_terminated(input)? {
            match arg {
                Expr::Assign(assign) => {
                    let Expr::Path(key) = &*assign.left else {
                        return Err(Error::new_spanned(assign.left, "expected `id` or `priority`"));
                    };
                    if key.path.is_ident("id") {
                        args.id = Some(*assign.right);
                    } else if key.path.is_ident("priority") {
                        args.priority = Some(*assign.right);
                    } else {
                        return Err(Error::new_spanned(key, "expected `id` or `priority`"));
                    }
                }
                id if args.id.is_none() => args.id = Some(id),
                other => return Err(Error::new_spanned(other, "aspect id is already set")),
            }
        }
        Ok(args)
    }
}

pub fn impl_aspect(args: AspectArgs, mut item: ItemImpl) -> Result<TokenStream> {
    if !item.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &item.generics,
            "#[aspect] does not support generic aspects",
        ));
    }
    if let Some((_, path, _)) = &item.trait_ {
        return Err(Error::new_spanned(
            path,
            "#[aspect] must be placed on an inherent impl block",
        ));
    }

    let self_ty = item.self_ty.clone();
    let name = aspect_name(&self_ty);

    let mut advices = Vec::new();
    for impl_item in item.items.iter_mut() {
        if let ImplItem::Fn(method) = impl_item {
            advices.extend(AdviceMethod::take_from(method)?);
        }
    }

    let mut options = quote! { ::chimera_weaver::AspectOptions::new() };
    if let Some(id) = &args.id {
        options = quote! {
            ::chimera_weaver::AspectOptions::id(#id)
        };
    }
    if let Some(priority) = &args.priority {
        options = quote! { #options.with_priority(#priority) };
    }

    let calls = advices.iter().map(AdviceMethod::to_builder_call);

    Ok(quote! {
        #item

        impl ::chimera_weaver::Aspect for #self_ty {
            fn aspect() -> ::chimera_weaver::AspectBuilder<Self> {
                ::chimera_weaver::AspectBuilder::<Self>::new(#options)
                    #(#calls)*
            }
        }

        // 自动注册到 inventory
        ::chimera_weaver::inventory::submit! {
            ::chimera_weaver::AspectRegistration::new(
                #name,
                ::chimera_weaver::declare_aspect::<#self_ty>
            )
        }
    })
}

fn aspect_name(ty: &Type) -> String {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .map(|segment| segment.ident.to_string())
            .unwrap_or_else(|| quote!(#ty).to_string()),
        _ => quote!(#ty).to_string(),
    }
}
