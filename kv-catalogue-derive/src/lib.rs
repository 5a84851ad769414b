use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Field, Fields, LitStr, parse_macro_input};

/// 为结构体生成 `HashRecord` 实现：字段 <-> KV hash 的编码与带类型校验的解码
///
/// 支持的字段属性：
/// - `#[record(rename = "name")]` 指定 hash 中的字段名
/// - `#[record(skip)]` 不写入 hash，解码时使用 `Default::default()`
#[proc_macro_derive(HashRecord, attributes(record))]
pub fn derive_hash_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let struct_name = &input.ident;

    let fields = match &input.data {
        Data::Struct(data_struct) => match &data_struct.fields {
            Fields::Named(fields) => fields.named.iter().collect::<Vec<_>>(),
            _ => {
                let error_msg = format!(
                    "HashRecord can only be derived for structs with named fields, '{}' is not",
                    struct_name
                );
                return TokenStream::from(quote! { compile_error!(#error_msg); });
            }
        },
        _ => {
            let error_msg = format!("HashRecord can only be derived for structs, '{}' is not", struct_name);
            return TokenStream::from(quote! { compile_error!(#error_msg); });
        }
    };

    // 解析每个字段的 #[record(...)] 属性
    let mut stored = Vec::new();
    let mut skipped = Vec::new();
    for field in fields {
        match parse_field_options(field) {
            Ok(FieldOptions { skip: true, .. }) => skipped.push(field),
            Ok(FieldOptions { rename, .. }) => {
                let Some(ident) = field.ident.as_ref() else {
                    continue;
                };
                let name = rename.unwrap_or_else(|| ident.to_string());
                stored.push((field, name));
            }
            Err(e) => return TokenStream::from(e.to_compile_error()),
        }
    }

    let encode_fields = stored.iter().map(|(field, name)| {
        let ident = &field.ident;
        quote! {
            if let Some(value) = kv_catalogue::FieldCodec::encode_field(&self.#ident) {
                result.push((#name.to_string(), value));
            }
        }
    });

    let decode_fields = stored.iter().map(|(field, name)| {
        let ident = &field.ident;
        let ty = &field.ty;
        quote! {
            #ident: <#ty as kv_catalogue::FieldCodec>::decode_field(
                #name,
                fields.get(#name).map(::std::string::String::as_str),
            )?,
        }
    });

    let default_fields = skipped.iter().map(|field| {
        let ident = &field.ident;
        quote! { #ident: ::std::default::Default::default(), }
    });

    let expanded = quote! {
        impl kv_catalogue::HashRecord for #struct_name {
            fn to_fields(&self) -> Vec<(String, String)> {
                let mut result = Vec::new();
                #(#encode_fields)*
                result
            }

            fn from_fields(
                fields: &::std::collections::HashMap<String, String>,
            ) -> Result<Self, kv_catalogue::Error> {
                Ok(Self {
                    #(#decode_fields)*
                    #(#default_fields)*
                })
            }
        }
    };

    TokenStream::from(expanded)
}

#[derive(Default)]
struct FieldOptions {
    skip: bool,
    rename: Option<String>,
}

fn parse_field_options(field: &Field) -> syn::Result<FieldOptions> {
    let mut options = FieldOptions::default();
    for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("record")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                options.skip = true;
                Ok(())
            } else if meta.path.is_ident("rename") {
                let value: LitStr = meta.value()?.parse()?;
                options.rename = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("unsupported record attribute, expected `skip` or `rename = \"...\"`"))
            }
        })?;
    }
    Ok(options)
}
