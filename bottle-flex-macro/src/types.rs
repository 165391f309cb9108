use proc_macro2::TokenStream;
use quote::quote;
use syn::{GenericArgument, PathArguments, Type};

/// Maps a Rust field type to a `bottle_flex::DataType` variant name.
///
/// `Option<T>` maps like `T`. Unknown types map to `Any`.
pub fn rust_type_to_data_type(ty: &Type) -> &'static str {
    let Type::Path(type_path) = ty else {
        return "Any";
    };
    let Some(segment) = type_path.path.segments.last() else {
        return "Any";
    };
    let type_name = segment.ident.to_string();

    if type_name == "Option" || type_name == "Box" {
        if let PathArguments::AngleBracketed(args) = &segment.arguments {
            if let Some(GenericArgument::Type(inner_ty)) = args.args.first() {
                return rust_type_to_data_type(inner_ty);
            }
        }
    }

    if type_name == "Vec" {
        if let PathArguments::AngleBracketed(args) = &segment.arguments {
            if let Some(GenericArgument::Type(Type::Path(inner))) = args.args.first() {
                if inner.path.is_ident("u8") {
                    return "Bytes";
                }
            }
        }
        return "Json";
    }

    match type_name.as_str() {
        "i8" | "i16" | "i32" | "i64" | "u8" | "u16" | "u32" | "u64" | "isize" | "usize" => "Int",
        "f32" | "f64" => "Float",
        "String" | "str" | "char" => "Text",
        "bool" => "Boolean",
        "DateTime" | "NaiveDateTime" | "NaiveDate" | "NaiveTime" => "DateTime",
        "Uuid" => "Key",
        "Value" | "Map" | "HashMap" | "BTreeMap" | "IndexMap" => "Json",
        _ => "Any",
    }
}

/// `bottle_flex::DataType::<variant>` tokens.
pub fn data_type_tokens(variant: &str) -> TokenStream {
    let ident = syn::Ident::new(variant, proc_macro2::Span::call_site());
    quote! { bottle_flex::DataType::#ident }
}
