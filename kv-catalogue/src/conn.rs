use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::Error;

/// ZRANGEBYLEX 的区间端点，按字节序比较
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LexBound {
    NegInf,
    PosInf,
    Inclusive(Vec<u8>),
    Exclusive(Vec<u8>),
}

impl LexBound {
    pub(crate) fn above_min(&self, member: &[u8]) -> bool {
        match self {
            LexBound::NegInf => true,
            LexBound::PosInf => false,
            LexBound::Inclusive(bound) => member >= bound.as_slice(),
            LexBound::Exclusive(bound) => member > bound.as_slice(),
        }
    }

    pub(crate) fn below_max(&self, member: &[u8]) -> bool {
        match self {
            LexBound::NegInf => false,
            LexBound::PosInf => true,
            LexBound::Inclusive(bound) => member <= bound.as_slice(),
            LexBound::Exclusive(bound) => member < bound.as_slice(),
        }
    }
}

/// 核心使用的 KV 原语
#[derive(Clone, Debug, PartialEq)]
pub enum Cmd {
    Get { key: String },
    Set { key: String, value: Vec<u8> },
    Del { key: String },
    Exists { key: String },
    Incr { key: String },
    HGet { key: String, field: String },
    HGetAll { key: String },
    HSet { key: String, fields: Vec<(String, String)> },
    HDel { key: String, field: String },
    SAdd { key: String, member: String },
    SRem { key: String, member: String },
    SMembers { key: String },
    ZAdd { key: String, score: f64, member: String },
    ZRem { key: String, member: String },
    /// 按位置取，`start`/`stop` 都包含在内，负数从末尾计
    ZRange { key: String, start: i64, stop: i64 },
    /// `limit` 为 (offset, count)，在区间匹配之后再截取
    ZRangeByLex {
        key: String,
        min: LexBound,
        max: LexBound,
        limit: Option<(usize, usize)>,
    },
}

impl Cmd {
    pub fn get(key: impl Into<String>) -> Self {
        Cmd::Get { key: key.into() }
    }

    pub fn set(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Cmd::Set {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn del(key: impl Into<String>) -> Self {
        Cmd::Del { key: key.into() }
    }

    pub fn exists(key: impl Into<String>) -> Self {
        Cmd::Exists { key: key.into() }
    }

    pub fn incr(key: impl Into<String>) -> Self {
        Cmd::Incr { key: key.into() }
    }

    pub fn hget(key: impl Into<String>, field: impl ToString) -> Self {
        Cmd::HGet {
            key: key.into(),
            field: field.to_string(),
        }
    }

    pub fn hgetall(key: impl Into<String>) -> Self {
        Cmd::HGetAll { key: key.into() }
    }

    pub fn hset(key: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        Cmd::HSet {
            key: key.into(),
            fields,
        }
    }

    pub fn hdel(key: impl Into<String>, field: impl ToString) -> Self {
        Cmd::HDel {
            key: key.into(),
            field: field.to_string(),
        }
    }

    pub fn sadd(key: impl Into<String>, member: impl ToString) -> Self {
        Cmd::SAdd {
            key: key.into(),
            member: member.to_string(),
        }
    }

    pub fn srem(key: impl Into<String>, member: impl ToString) -> Self {
        Cmd::SRem {
            key: key.into(),
            member: member.to_string(),
        }
    }

    pub fn smembers(key: impl Into<String>) -> Self {
        Cmd::SMembers { key: key.into() }
    }

    pub fn zadd(key: impl Into<String>, score: f64, member: impl Into<String>) -> Self {
        Cmd::ZAdd {
            key: key.into(),
            score,
            member: member.into(),
        }
    }

    pub fn zrem(key: impl Into<String>, member: impl Into<String>) -> Self {
        Cmd::ZRem {
            key: key.into(),
            member: member.into(),
        }
    }

    pub fn zrange(key: impl Into<String>, start: i64, stop: i64) -> Self {
        Cmd::ZRange {
            key: key.into(),
            start,
            stop,
        }
    }

    pub fn zrangebylex(
        key: impl Into<String>,
        min: LexBound,
        max: LexBound,
        limit: Option<(usize, usize)>,
    ) -> Self {
        Cmd::ZRangeByLex {
            key: key.into(),
            min,
            max,
            limit,
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Cmd::Set { .. }
                | Cmd::Del { .. }
                | Cmd::Incr { .. }
                | Cmd::HSet { .. }
                | Cmd::HDel { .. }
                | Cmd::SAdd { .. }
                | Cmd::SRem { .. }
                | Cmd::ZAdd { .. }
                | Cmd::ZRem { .. }
        )
    }
}

/// 存储返回的应答
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Nil,
    Int(i64),
    Data(Vec<u8>),
    Array(Vec<Value>),
    Okay,
}

impl Value {
    fn describe(&self) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Int(n) => format!("int({})", n),
            Value::Data(data) => format!("data({} bytes)", data.len()),
            Value::Array(items) => format!("array({} items)", items.len()),
            Value::Okay => "ok".to_string(),
        }
    }

    fn unexpected(self, expected: &'static str) -> Error {
        Error::UnexpectedReply {
            expected,
            got: self.describe(),
        }
    }

    pub fn into_int(self) -> Result<i64, Error> {
        match self {
            Value::Int(n) => Ok(n),
            other => Err(other.unexpected("int")),
        }
    }

    pub fn into_bool(self) -> Result<bool, Error> {
        Ok(self.into_int()? != 0)
    }

    pub fn into_optional_bytes(self) -> Result<Option<Vec<u8>>, Error> {
        match self {
            Value::Nil => Ok(None),
            Value::Data(data) => Ok(Some(data)),
            other => Err(other.unexpected("data or nil")),
        }
    }

    pub fn into_optional_string(self) -> Result<Option<String>, Error> {
        self.into_optional_bytes()?
            .map(|data| String::from_utf8(data).map_err(Error::InvalidUtf8))
            .transpose()
    }

    fn into_items(self) -> Result<Vec<Value>, Error> {
        match self {
            Value::Array(items) => Ok(items),
            Value::Nil => Ok(Vec::new()),
            other => Err(other.unexpected("array")),
        }
    }

    pub fn into_strings(self) -> Result<Vec<String>, Error> {
        self.into_items()?
            .into_iter()
            .map(|item| item.into_optional_string()?.ok_or(Error::UnexpectedReply {
                expected: "data",
                got: "nil".to_string(),
            }))
            .collect()
    }

    /// HGETALL 应答：字段和值交替排列
    pub fn into_map(self) -> Result<HashMap<String, String>, Error> {
        let items = self.into_strings()?;
        if items.len() % 2 != 0 {
            return Err(Error::UnexpectedReply {
                expected: "field/value pairs",
                got: format!("{} items", items.len()),
            });
        }
        let mut map = HashMap::with_capacity(items.len() / 2);
        let mut items = items.into_iter();
        while let (Some(field), Some(value)) = (items.next(), items.next()) {
            map.insert(field, value);
        }
        Ok(map)
    }
}

/// 一批命令；`atomic` 时整体生效或整体不生效
#[derive(Clone, Debug, Default)]
pub struct Pipeline {
    commands: Vec<Cmd>,
    atomic: bool,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn atomic() -> Self {
        Self {
            commands: Vec::new(),
            atomic: true,
        }
    }

    pub fn push(&mut self, cmd: Cmd) -> &mut Self {
        self.commands.push(cmd);
        self
    }

    pub fn is_atomic(&self) -> bool {
        self.atomic
    }

    pub fn is_read_only(&self) -> bool {
        !self.commands.iter().any(Cmd::is_write)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[Cmd] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<Cmd> {
        self.commands
    }
}

/// 调用方注入的存储句柄。实现方负责传输、连接池与认证
pub trait Connection: Send + Sync {
    /// 一次提交整批命令，按提交顺序返回应答
    fn exec(&self, pipeline: Pipeline) -> impl Future<Output = Result<Vec<Value>, Error>> + Send;

    fn query(&self, cmd: Cmd) -> impl Future<Output = Result<Value, Error>> + Send {
        async move {
            let mut pipeline = Pipeline::new();
            pipeline.push(cmd);
            self.exec(pipeline)
                .await?
                .pop()
                .ok_or_else(|| Error::Store("empty reply".to_string()))
        }
    }
}

impl<T: Connection> Connection for Arc<T> {
    fn exec(&self, pipeline: Pipeline) -> impl Future<Output = Result<Vec<Value>, Error>> + Send {
        (**self).exec(pipeline)
    }

    fn query(&self, cmd: Cmd) -> impl Future<Output = Result<Value, Error>> + Send {
        (**self).query(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hgetall_reply_decodes_to_map() {
        let reply = Value::Array(vec![
            Value::Data(b"id".to_vec()),
            Value::Data(b"5".to_vec()),
            Value::Data(b"name".to_vec()),
            Value::Data(b"Warp Drive".to_vec()),
        ]);
        let map = reply.into_map().unwrap();
        assert_eq!(map.get("id").map(String::as_str), Some("5"));
        assert_eq!(map.get("name").map(String::as_str), Some("Warp Drive"));
    }

    #[test]
    fn odd_hgetall_reply_is_rejected() {
        let reply = Value::Array(vec![Value::Data(b"id".to_vec())]);
        assert!(matches!(
            reply.into_map(),
            Err(Error::UnexpectedReply { .. })
        ));
    }

    #[test]
    fn lex_bounds_compare_bytes() {
        let min = LexBound::Inclusive(b"warp".to_vec());
        let mut max = b"warp".to_vec();
        max.push(0xff);
        let max = LexBound::Inclusive(max);
        for member in ["warp core::6", "warp drive::5", "warp"] {
            assert!(min.above_min(member.as_bytes()) && max.below_max(member.as_bytes()));
        }
        assert!(!min.above_min(b"cold fusion::7"));
        assert!(!max.below_max(b"warq::1"));
    }

    #[test]
    fn pipeline_tracks_writes() {
        let mut pipeline = Pipeline::new();
        pipeline.push(Cmd::hgetall("product:1"));
        assert!(pipeline.is_read_only());
        pipeline.push(Cmd::zadd("products", 0.0, "a::1"));
        assert!(!pipeline.is_read_only());
        assert!(!pipeline.is_atomic());
        assert!(Pipeline::atomic().is_atomic());
    }
}
