use heck::ToSnakeCase;
use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, LitInt, LitStr};

use crate::types::{data_type_tokens, rust_type_to_data_type};

/// Column flags read from `#[flex(...)]` on a field.
#[derive(Default)]
struct FieldFlags {
    primary_key: bool,
    unique: bool,
    index: bool,
    required: bool,
    hidden: bool,
    source: bool,
    index_field: bool,
    attrib: bool,
    memo: bool,
    rename: Option<String>,
}

/// Expands `#[derive(Entity)]`.
///
/// Struct attributes: `#[flex(schema = "...", name = "...", version = N, locked)]`.
/// Field attributes: `primary_key`, `unique`, `index`, `required`, `hidden`,
/// `source`, `index_field`, `attrib`, `memo` and `rename = "..."`.
pub fn expand(ast: DeriveInput) -> syn::Result<TokenStream> {
    let struct_name = &ast.ident;

    let fields = match &ast.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => fields,
            _ => return Err(syn::Error::new_spanned(struct_name, "Entity must have named fields")),
        },
        _ => return Err(syn::Error::new_spanned(struct_name, "Entity must be a struct")),
    };

    let mut schema = "public".to_string();
    let mut name = struct_name.to_string().to_snake_case();
    let mut version = 1i32;
    let mut locked = false;

    for attr in &ast.attrs {
        if !attr.path().is_ident("flex") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("schema") {
                schema = meta.value()?.parse::<LitStr>()?.value();
            } else if meta.path.is_ident("name") {
                name = meta.value()?.parse::<LitStr>()?.value();
            } else if meta.path.is_ident("version") {
                version = meta.value()?.parse::<LitInt>()?.base10_parse()?;
            } else if meta.path.is_ident("locked") {
                locked = true;
            } else {
                return Err(meta.error("unknown flex attribute"));
            }
            Ok(())
        })?;
    }

    let mut defines = Vec::new();
    let mut primary_keys = Vec::new();
    let mut unique = Vec::new();
    let mut indexes = Vec::new();
    let mut required = Vec::new();
    let mut hidden = Vec::new();

    for field in &fields.named {
        let Some(ident) = &field.ident else { continue };
        let mut flags = FieldFlags::default();

        for attr in &field.attrs {
            if !attr.path().is_ident("flex") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                let path = &meta.path;
                if path.is_ident("primary_key") {
                    flags.primary_key = true;
                } else if path.is_ident("unique") {
                    flags.unique = true;
                } else if path.is_ident("index") {
                    flags.index = true;
                } else if path.is_ident("required") {
                    flags.required = true;
                } else if path.is_ident("hidden") {
                    flags.hidden = true;
                } else if path.is_ident("source") {
                    flags.source = true;
                } else if path.is_ident("index_field") {
                    flags.index_field = true;
                } else if path.is_ident("attrib") {
                    flags.attrib = true;
                } else if path.is_ident("memo") {
                    flags.memo = true;
                } else if path.is_ident("rename") {
                    flags.rename = Some(meta.value()?.parse::<LitStr>()?.value());
                } else {
                    return Err(meta.error("unknown flex field attribute"));
                }
                Ok(())
            })?;
        }

        let column = flags.rename.clone().unwrap_or_else(|| ident.to_string().trim_start_matches("r#").to_string());
        let variant = if flags.memo { "Memo" } else { rust_type_to_data_type(&field.ty) };
        let data_type = data_type_tokens(variant);

        let define = if flags.source {
            quote! { model.define_source_field(#column)?; }
        } else if flags.index_field {
            quote! { model.define_index_field(#column)?; }
        } else if flags.attrib {
            quote! { model.define_attribute(#column, #data_type, bottle_flex::Value::Null)?; }
        } else {
            quote! { model.define_column(#column, #data_type, bottle_flex::Value::Null)?; }
        };
        defines.push(define);

        if flags.primary_key {
            primary_keys.push(column.clone());
        }
        if flags.unique {
            unique.push(column.clone());
        }
        if flags.index {
            indexes.push(column.clone());
        }
        if flags.required {
            required.push(column.clone());
        }
        if flags.hidden {
            hidden.push(column);
        }
    }

    Ok(quote! {
        impl bottle_flex::Entity for #struct_name {
            fn schema() -> &'static str {
                #schema
            }

            fn name() -> &'static str {
                #name
            }

            fn version() -> i32 {
                #version
            }

            fn define(model: &mut bottle_flex::Model) -> Result<(), bottle_flex::Error> {
                #(#defines)*
                model.define_primary_keys(&[#(#primary_keys),*]);
                model.define_unique(&[#(#unique),*]);
                model.define_index(&[#(#indexes),*]);
                model.define_required(&[#(#required),*]);
                model.define_hidden(&[#(#hidden),*]);
                model.is_locked = #locked;
                Ok(())
            }
        }
    })
}
