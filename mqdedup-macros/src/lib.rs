use proc_macro::TokenStream;
use quote::quote;
use syn::{parse::Parser, parse_macro_input, Expr, FnArg, Ident, ItemFn, Meta, Pat, ReturnType};

/// Procedural macro to consume messages through an mqdedup `Coordinator`.
///
/// # Example
///
/// ```rust,ignore
/// #[deduplicate(coordinator = self.coordinator, message = order, context = ctx)]
/// async fn handle_order(&self, ctx: Context, order: Order) -> Result<(), Error> {
///     // Your processing logic here
///     Ok(())
/// }
/// ```
///
/// This will expand to code that calls
/// `coordinator.invoke_with(&ctx, order, |ctx, order| async move { ... })`.
///
/// # Requirements
///
/// - The function must be `async`
/// - The function must return `Result<(), mqdedup::Error>`
/// - `message` must name a parameter of the coordinator's message type, taken by value
/// - `context`, when given, must name a `mqdedup::Context` parameter taken by value;
///   without it the body runs under `Context::new()`
#[proc_macro_attribute]
pub fn deduplicate(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);

    let parser = syn::punctuated::Punctuated::<Meta, syn::Token![,]>::parse_terminated;
    let args = match parser.parse(attr) {
        Ok(args) => args,
        Err(e) => return e.to_compile_error().into(),
    };

    let mut coordinator_expr = None;
    let mut message_ident = None;
    let mut context_ident = None;

    for arg in args {
        match arg {
            Meta::NameValue(nv) => {
                let name = nv.path.get_ident().map(|i| i.to_string());
                match name.as_deref() {
                    Some("coordinator") => {
                        coordinator_expr = Some(nv.value);
                    }
                    Some("message") => match param_ident(&nv.value) {
                        Some(ident) => message_ident = Some(ident),
                        None => {
                            return syn::Error::new_spanned(
                                nv.value,
                                "`message` must name a function parameter",
                            )
                            .to_compile_error()
                            .into();
                        }
                    },
                    Some("context") => match param_ident(&nv.value) {
                        Some(ident) => context_ident = Some(ident),
                        None => {
                            return syn::Error::new_spanned(
                                nv.value,
                                "`context` must name a function parameter",
                            )
                            .to_compile_error()
                            .into();
                        }
                    },
                    _ => {
                        return syn::Error::new_spanned(
                            nv.path,
                            "Unknown attribute parameter. Expected 'coordinator', 'message' or 'context'",
                        )
                        .to_compile_error()
                        .into();
                    }
                }
            }
            _ => {
                return syn::Error::new_spanned(
                    arg,
                    "Expected name-value pair like `coordinator = self.coordinator` or `message = order`",
                )
                .to_compile_error()
                .into();
            }
        }
    }

    let Some(coordinator) = coordinator_expr else {
        return syn::Error::new(
            proc_macro2::Span::call_site(),
            "Missing required 'coordinator' parameter",
        )
        .to_compile_error()
        .into();
    };

    let Some(message) = message_ident else {
        return syn::Error::new(
            proc_macro2::Span::call_site(),
            "Missing required 'message' parameter",
        )
        .to_compile_error()
        .into();
    };

    if input.sig.asyncness.is_none() {
        return syn::Error::new_spanned(
            input.sig.fn_token,
            "The #[deduplicate] macro can only be applied to async functions",
        )
        .to_compile_error()
        .into();
    }

    let fn_inputs = &input.sig.inputs;

    // Every named parameter must exist on the function
    let param_names: Vec<&Ident> = fn_inputs
        .iter()
        .filter_map(|arg| match arg {
            FnArg::Typed(pat_type) => match &*pat_type.pat {
                Pat::Ident(pat_ident) => Some(&pat_ident.ident),
                _ => None,
            },
            FnArg::Receiver(_) => None,
        })
        .collect();

    for ident in std::iter::once(&message).chain(context_ident.as_ref()) {
        if !param_names.contains(&ident) {
            return syn::Error::new_spanned(ident, "No function parameter with this name")
                .to_compile_error()
                .into();
        }
    }

    let return_type = match &input.sig.output {
        ReturnType::Default => {
            return syn::Error::new_spanned(
                &input.sig,
                "Function must return Result<(), mqdedup::Error>",
            )
            .to_compile_error()
            .into();
        }
        ReturnType::Type(_, ty) => ty,
    };

    let fn_vis = &input.vis;
    let fn_name = &input.sig.ident;
    let fn_generics = &input.sig.generics;
    let fn_where = &input.sig.generics.where_clause;
    let fn_block = &input.block;
    let fn_attrs = &input.attrs;

    let (context_value, context_param) = match &context_ident {
        Some(ctx) => (quote! { ::std::clone::Clone::clone(&#ctx) }, quote! { #ctx }),
        None => (quote! { ::mqdedup::Context::new() }, quote! { _ }),
    };

    let expanded = quote! {
        #(#fn_attrs)*
        #fn_vis async fn #fn_name #fn_generics(#fn_inputs) -> #return_type #fn_where {
            let __mqdedup_context = #context_value;
            let __mqdedup_coordinator = &#coordinator;

            __mqdedup_coordinator
                .invoke_with(&__mqdedup_context, #message, move |#context_param, #message| async move {
                    let __mqdedup_result: #return_type = async move #fn_block.await;
                    __mqdedup_result
                })
                .await
        }
    };

    TokenStream::from(expanded)
}

/// `order` in `message = order`
fn param_ident(expr: &Expr) -> Option<Ident> {
    match expr {
        Expr::Path(path) if path.qself.is_none() => path.path.get_ident().cloned(),
        _ => None,
    }
}
