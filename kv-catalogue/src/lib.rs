extern crate self as kv_catalogue;

mod catalogue;
mod config;
mod conn;
mod error;
mod hydrate;
mod id;
mod index;
pub mod keys;
mod memory;
mod model;
mod query;
mod tikv;
mod utils;

use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::Decimal;

pub use catalogue::Catalogue;
pub use config::CatalogueConfig;
pub use conn::{Cmd, Connection, LexBound, Pipeline, Value};
pub use error::{Error, ErrorKind};
pub use hydrate::hydrate;
pub use id::next_id;
pub use index::{IndexEntry, add_to_ordering, move_category, remove_from_ordering};
pub use kv_catalogue_derive::HashRecord;
pub use memory::MemoryStore;
pub use model::{Category, Image, NewProduct, Page, Product, ProductRecord};
pub use query::{ListQuery, QueryPlan, Range};
pub use tikv::TikvStore;
pub use utils::{normalize, parse_sort_key, sort_key};

/// HashRecord trait 定义了以 KV hash 保存的记录的编码/解码接口
pub trait HashRecord: Sized {
    /// 返回字段名和对应的值，值为 `None` 的可选字段不会出现
    fn to_fields(&self) -> Vec<(String, String)>;

    /// 从 HGETALL 的结果解码，缺失或格式错误的字段返回错误
    fn from_fields(fields: &HashMap<String, String>) -> Result<Self, Error>;
}

/// 单个字段的编码方式
pub trait FieldCodec: Sized {
    fn encode_field(&self) -> Option<String>;

    fn decode_field(field: &'static str, raw: Option<&str>) -> Result<Self, Error>;
}

impl FieldCodec for String {
    fn encode_field(&self) -> Option<String> {
        Some(self.clone())
    }

    fn decode_field(field: &'static str, raw: Option<&str>) -> Result<Self, Error> {
        raw.map(str::to_owned).ok_or(Error::MissingField(field))
    }
}

macro_rules! impl_field_codec_from_str {
    ($($T:ty),+) => {
        $(
            impl FieldCodec for $T {
                fn encode_field(&self) -> Option<String> {
                    Some(self.to_string())
                }

                fn decode_field(field: &'static str, raw: Option<&str>) -> Result<Self, Error> {
                    let raw = raw.ok_or(Error::MissingField(field))?;
                    <$T>::from_str(raw).map_err(|_| Error::InvalidField {
                        field,
                        value: raw.to_string(),
                    })
                }
            }
        )+
    };
}

impl_field_codec_from_str!(u32, u64, i64, Decimal);

impl<T: FieldCodec> FieldCodec for Option<T> {
    fn encode_field(&self) -> Option<String> {
        self.as_ref().and_then(FieldCodec::encode_field)
    }

    fn decode_field(field: &'static str, raw: Option<&str>) -> Result<Self, Error> {
        match raw {
            None => Ok(None),
            Some(raw) => T::decode_field(field, Some(raw)).map(Some),
        }
    }
}
