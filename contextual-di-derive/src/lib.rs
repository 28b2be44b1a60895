//! Derive macro for contextual-di
//!
//! `#[derive(Autowire)]` turns a struct with named fields into a constructable:
//! each field becomes a [`ParameterRequest`] named after the field, and the
//! generated `construct()` reads the resolved arguments back.
//!
//! | field type          | parameter                              |
//! |---------------------|----------------------------------------|
//! | `Arc<T>`            | required `T`                           |
//! | `Option<Arc<T>>`    | nullable `T`                           |
//! | `Proxy<T>`          | deferred `T`                           |
//! | `Vec<Arc<T>>`       | variadic `T` (explicit arguments only) |
//! | anything else `V`   | `V` by value (`V: Clone`)              |
//!
//! # Example
//!
//! ```rust,ignore
//! use contextual_di::{Autowire, Container};
//! use std::sync::Arc;
//!
//! #[derive(Autowire)]
//! #[autowire(singleton)]
//! struct Database {
//!     #[inject(default = String::from("postgres://localhost"))]
//!     url: String,
//! }
//!
//! #[derive(Autowire)]
//! #[autowire(scope = "request", finalize = flush)]
//! struct UserService {
//!     db: Arc<Database>,
//!     #[inject(hint = "cache.redis")]
//!     cache: Option<Arc<Cache>>,
//!     #[inject(skip)]
//!     hits: u64,
//! }
//! ```
//!
//! [`ParameterRequest`]: https://docs.rs/contextual-di/latest/contextual_di/struct.ParameterRequest.html

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Expr, Fields, GenericArgument, LitStr, PathArguments, Type, parse_macro_input};

/// Derive `Autowire` for a struct with named fields.
///
/// # Struct attributes
///
/// - `#[autowire(singleton)]` - cache one instance per owning scope
/// - `#[autowire(scope = "name")]` - require resolution inside scope `name`
/// - `#[autowire(finalize = method)]` - call `self.method()` when the owning
///   scope is left
///
/// # Field attributes
///
/// - `#[inject(default = expr)]` - value used when nothing resolves
/// - `#[inject(id = "alias")]` - resolve this identifier instead of the field type
/// - `#[inject(hint = "alias")]` - resolve this identifier in place of the field type;
///   explicit arguments are still checked against the field type
/// - `#[inject(proxy)]` / `#[inject(variadic)]` - assert the field shape
/// - `#[inject(skip)]` - not a parameter; filled with `Default::default()`
#[proc_macro_derive(Autowire, attributes(autowire, inject))]
pub fn derive_autowire(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            Fields::Unit => return expand_unit(input),
            Fields::Unnamed(_) => {
                return Err(syn::Error::new_spanned(
                    input,
                    "Autowire can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Autowire can only be derived for structs",
            ));
        }
    };

    let options = StructOptions::parse(&input.attrs)?;
    let mut parameters = Vec::new();
    let mut field_inits = Vec::new();

    for field in fields {
        let Some(field_name) = field.ident.as_ref() else {
            continue;
        };
        let key = field_name.to_string();
        let attr = FieldOptions::parse(&field.attrs)?;

        if attr.skip {
            field_inits.push(quote! { #field_name: ::std::default::Default::default() });
            continue;
        }

        let shape = Shape::of(&field.ty);
        if attr.proxy && !matches!(shape, Shape::Proxy(_)) {
            return Err(syn::Error::new_spanned(
                &field.ty,
                "#[inject(proxy)] fields must have type Proxy<T>",
            ));
        }
        if attr.variadic && !matches!(shape, Shape::Variadic(_)) {
            return Err(syn::Error::new_spanned(
                &field.ty,
                "#[inject(variadic)] fields must have type Vec<Arc<T>>",
            ));
        }

        let declared = shape.declared();
        let request = match &attr.id {
            Some(id) => quote! {
                ::contextual_di::ParameterRequest::typed(#key, ::contextual_di::Identifier::alias(#id))
            },
            None => quote! { ::contextual_di::ParameterRequest::of::<#declared>(#key) },
        };
        let mut request = match shape {
            Shape::Required(_) | Shape::Value(_) => request,
            Shape::Optional(_) => quote! { #request.nullable() },
            Shape::Proxy(_) => quote! { #request.proxy() },
            Shape::Variadic(_) => quote! { #request.variadic() },
        };
        if let Some(hint) = &attr.hint {
            request = quote! { #request.hint(::contextual_di::Identifier::alias(#hint)) };
        }
        if let Some(default) = &attr.default {
            request = quote! { #request.with_default::<#declared>(#default) };
        }
        parameters.push(request);

        let read = match shape {
            Shape::Required(ty) => quote! { args.get::<#ty>(#key)? },
            Shape::Optional(ty) => quote! { args.optional::<#ty>(#key)? },
            Shape::Proxy(ty) => quote! { args.proxy::<#ty>(#key)? },
            Shape::Variadic(ty) => quote! { args.variadic::<#ty>(#key)? },
            Shape::Value(ty) => quote! { args.value::<#ty>(#key)? },
        };
        field_inits.push(quote! { #field_name: #read });
    }

    let consts = options.consts();
    let finalize = options.finalize_fn();

    Ok(quote! {
        impl #impl_generics ::contextual_di::Autowire for #name #ty_generics #where_clause {
            #consts

            fn parameters() -> ::std::vec::Vec<::contextual_di::ParameterRequest> {
                ::std::vec![#(#parameters),*]
            }

            fn construct(
                args: &::contextual_di::Arguments,
            ) -> ::std::result::Result<Self, ::contextual_di::BoxError> {
                ::std::result::Result::Ok(Self {
                    #(#field_inits),*
                })
            }

            #finalize
        }
    })
}

fn expand_unit(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let options = StructOptions::parse(&input.attrs)?;
    let consts = options.consts();
    let finalize = options.finalize_fn();

    Ok(quote! {
        impl #impl_generics ::contextual_di::Autowire for #name #ty_generics #where_clause {
            #consts

            fn parameters() -> ::std::vec::Vec<::contextual_di::ParameterRequest> {
                ::std::vec::Vec::new()
            }

            fn construct(
                _args: &::contextual_di::Arguments,
            ) -> ::std::result::Result<Self, ::contextual_di::BoxError> {
                ::std::result::Result::Ok(Self)
            }

            #finalize
        }
    })
}

/// `#[autowire(...)]` on the struct
#[derive(Default)]
struct StructOptions {
    singleton: bool,
    scope: Option<LitStr>,
    finalize: Option<syn::Ident>,
}

impl StructOptions {
    fn parse(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut options = Self::default();
        for attr in attrs.iter().filter(|a| a.path().is_ident("autowire")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("singleton") {
                    options.singleton = true;
                } else if meta.path.is_ident("finalize") {
                    options.finalize = Some(meta.value()?.parse()?);
                } else if meta.path.is_ident("scope") {
                    options.scope = Some(meta.value()?.parse()?);
                } else {
                    return Err(meta.error("expected `singleton`, `scope = \"..\"` or `finalize = method`"));
                }
                Ok(())
            })?;
        }
        Ok(options)
    }

    fn consts(&self) -> TokenStream2 {
        let singleton = self.singleton;
        let finalize = self.finalize.is_some();
        let scope = match &self.scope {
            Some(scope) => quote! { ::std::option::Option::Some(#scope) },
            None => quote! { ::std::option::Option::None },
        };
        quote! {
            const SINGLETON: bool = #singleton;
            const SCOPE: ::std::option::Option<&'static str> = #scope;
            const FINALIZE: bool = #finalize;
        }
    }

    fn finalize_fn(&self) -> TokenStream2 {
        match &self.finalize {
            Some(method) => quote! {
                fn finalize(&self) {
                    self.#method();
                }
            },
            None => TokenStream2::new(),
        }
    }
}

/// `#[inject(...)]` on a field
#[derive(Default)]
struct FieldOptions {
    default: Option<Expr>,
    id: Option<LitStr>,
    hint: Option<LitStr>,
    proxy: bool,
    variadic: bool,
    skip: bool,
}

impl FieldOptions {
    fn parse(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut options = Self::default();
        for attr in attrs.iter().filter(|a| a.path().is_ident("inject")) {
            if attr.meta.require_path_only().is_ok() {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("default") {
                    options.default = Some(meta.value()?.parse()?);
                } else if meta.path.is_ident("id") {
                    options.id = Some(meta.value()?.parse()?);
                } else if meta.path.is_ident("hint") {
                    options.hint = Some(meta.value()?.parse()?);
                } else if meta.path.is_ident("proxy") {
                    options.proxy = true;
                } else if meta.path.is_ident("variadic") {
                    options.variadic = true;
                } else if meta.path.is_ident("skip") {
                    options.skip = true;
                } else {
                    return Err(meta.error(
                        "expected `default`, `id`, `hint`, `proxy`, `variadic` or `skip`",
                    ));
                }
                Ok(())
            })?;
        }
        Ok(options)
    }
}

/// How a field maps onto a parameter.
enum Shape<'a> {
    Required(&'a Type),
    Optional(&'a Type),
    Proxy(&'a Type),
    Variadic(&'a Type),
    Value(&'a Type),
}

impl<'a> Shape<'a> {
    fn of(ty: &'a Type) -> Self {
        if let Some(inner) = generic_inner(ty, "Arc") {
            return Shape::Required(inner);
        }
        if let Some(inner) = generic_inner(ty, "Option").and_then(|t| generic_inner(t, "Arc")) {
            return Shape::Optional(inner);
        }
        if let Some(inner) = generic_inner(ty, "Proxy") {
            return Shape::Proxy(inner);
        }
        if let Some(inner) = generic_inner(ty, "Vec").and_then(|t| generic_inner(t, "Arc")) {
            return Shape::Variadic(inner);
        }
        Shape::Value(ty)
    }

    /// Type the parameter is declared with.
    fn declared(&self) -> &'a Type {
        match self {
            Shape::Required(ty)
            | Shape::Optional(ty)
            | Shape::Proxy(ty)
            | Shape::Variadic(ty)
            | Shape::Value(ty) => ty,
        }
    }
}

/// Extract `T` from `Wrapper<T>`
fn generic_inner<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}
