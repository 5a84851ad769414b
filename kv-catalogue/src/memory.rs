use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    Error,
    conn::{Cmd, Connection, LexBound, Pipeline, Value},
};

/// 进程内的确定性存储，用于测试和嵌入式场景
///
/// 克隆得到的句柄共享同一份数据；原子批次先在副本上执行，全部成功后才替换。
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Keyspace>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Connection for MemoryStore {
    async fn exec(&self, pipeline: Pipeline) -> Result<Vec<Value>, Error> {
        let mut keyspace = self.inner.lock().await;
        if pipeline.is_atomic() {
            let mut staged = keyspace.clone();
            let replies = pipeline
                .into_commands()
                .into_iter()
                .map(|cmd| staged.apply(cmd))
                .collect::<Result<Vec<_>, _>>()?;
            *keyspace = staged;
            Ok(replies)
        } else {
            pipeline
                .into_commands()
                .into_iter()
                .map(|cmd| keyspace.apply(cmd))
                .collect()
        }
    }
}

#[derive(Clone)]
enum Entry {
    Bytes(Vec<u8>),
    Hash(BTreeMap<String, String>),
    Set(BTreeSet<String>),
    SortedSet(HashMap<String, f64>),
}

#[derive(Clone, Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
}

fn wrong_type(key: &str) -> Error {
    Error::Store(format!(
        "WRONGTYPE operation against key '{}' holding the wrong kind of value",
        key
    ))
}

fn data(value: impl Into<Vec<u8>>) -> Value {
    Value::Data(value.into())
}

fn flag(changed: bool) -> Value {
    Value::Int(i64::from(changed))
}

macro_rules! entry_accessors {
    ($get:ident, $get_mut:ident, $variant:ident, $ty:ty) => {
        fn $get(&self, key: &str) -> Result<Option<&$ty>, Error> {
            match self.entries.get(key) {
                None => Ok(None),
                Some(Entry::$variant(value)) => Ok(Some(value)),
                Some(_) => Err(wrong_type(key)),
            }
        }

        fn $get_mut(&mut self, key: &str) -> Result<&mut $ty, Error> {
            match self
                .entries
                .entry(key.to_string())
                .or_insert_with(|| Entry::$variant(Default::default()))
            {
                Entry::$variant(value) => Ok(value),
                _ => Err(wrong_type(key)),
            }
        }
    };
}

impl Keyspace {
    entry_accessors!(hash, hash_mut, Hash, BTreeMap<String, String>);
    entry_accessors!(set, set_mut, Set, BTreeSet<String>);
    entry_accessors!(sorted_set, sorted_set_mut, SortedSet, HashMap<String, f64>);

    /// 容器被清空后键随之消失
    fn drop_if_empty(&mut self, key: &str) {
        let empty = match self.entries.get(key) {
            Some(Entry::Hash(hash)) => hash.is_empty(),
            Some(Entry::Set(set)) => set.is_empty(),
            Some(Entry::SortedSet(zset)) => zset.is_empty(),
            _ => false,
        };
        if empty {
            self.entries.remove(key);
        }
    }

    /// 按 (score, member) 排序后的成员
    fn sorted_members(&self, key: &str) -> Result<Vec<String>, Error> {
        let Some(zset) = self.sorted_set(key)? else {
            return Ok(Vec::new());
        };
        let mut members = zset.iter().collect::<Vec<_>>();
        members.sort_by(|(a, sa), (b, sb)| sa.total_cmp(sb).then_with(|| a.as_bytes().cmp(b.as_bytes())));
        Ok(members.into_iter().map(|(member, _)| member.clone()).collect())
    }

    fn apply(&mut self, cmd: Cmd) -> Result<Value, Error> {
        match cmd {
            Cmd::Get { key } => match self.entries.get(&key) {
                None => Ok(Value::Nil),
                Some(Entry::Bytes(value)) => Ok(data(value.clone())),
                Some(_) => Err(wrong_type(&key)),
            },
            Cmd::Set { key, value } => {
                self.entries.insert(key, Entry::Bytes(value));
                Ok(Value::Okay)
            }
            Cmd::Del { key } => Ok(flag(self.entries.remove(&key).is_some())),
            Cmd::Exists { key } => Ok(flag(self.entries.contains_key(&key))),
            Cmd::Incr { key } => {
                let current = match self.entries.get(&key) {
                    None => 0,
                    Some(Entry::Bytes(value)) => std::str::from_utf8(value)
                        .ok()
                        .and_then(|s| s.parse::<i64>().ok())
                        .ok_or_else(|| Error::Store(format!("value at '{}' is not an integer", key)))?,
                    Some(_) => return Err(wrong_type(&key)),
                };
                let next = current
                    .checked_add(1)
                    .ok_or_else(|| Error::Store(format!("increment at '{}' would overflow", key)))?;
                self.entries
                    .insert(key, Entry::Bytes(next.to_string().into_bytes()));
                Ok(Value::Int(next))
            }
            Cmd::HGet { key, field } => Ok(self
                .hash(&key)?
                .and_then(|hash| hash.get(&field))
                .map_or(Value::Nil, |value| data(value.as_str()))),
            Cmd::HGetAll { key } => {
                let items = self
                    .hash(&key)?
                    .into_iter()
                    .flatten()
                    .flat_map(|(field, value)| [data(field.as_str()), data(value.as_str())])
                    .collect();
                Ok(Value::Array(items))
            }
            Cmd::HSet { key, fields } => {
                let hash = self.hash_mut(&key)?;
                let added = fields
                    .into_iter()
                    .filter(|(field, value)| hash.insert(field.clone(), value.clone()).is_none())
                    .count();
                self.drop_if_empty(&key);
                Ok(Value::Int(added as i64))
            }
            Cmd::HDel { key, field } => {
                if self.hash(&key)?.is_none() {
                    return Ok(flag(false));
                }
                let removed = self.hash_mut(&key)?.remove(&field).is_some();
                self.drop_if_empty(&key);
                Ok(flag(removed))
            }
            Cmd::SAdd { key, member } => Ok(flag(self.set_mut(&key)?.insert(member))),
            Cmd::SRem { key, member } => {
                if self.set(&key)?.is_none() {
                    return Ok(flag(false));
                }
                let removed = self.set_mut(&key)?.remove(&member);
                self.drop_if_empty(&key);
                Ok(flag(removed))
            }
            Cmd::SMembers { key } => Ok(Value::Array(
                self.set(&key)?
                    .into_iter()
                    .flatten()
                    .map(|member| data(member.as_str()))
                    .collect(),
            )),
            Cmd::ZAdd { key, score, member } => Ok(flag(
                self.sorted_set_mut(&key)?.insert(member, score).is_none(),
            )),
            Cmd::ZRem { key, member } => {
                if self.sorted_set(&key)?.is_none() {
                    return Ok(flag(false));
                }
                let removed = self.sorted_set_mut(&key)?.remove(&member).is_some();
                self.drop_if_empty(&key);
                Ok(flag(removed))
            }
            Cmd::ZRange { key, start, stop } => {
                let members = self.sorted_members(&key)?;
                let len = members.len() as i64;
                let start = if start < 0 { (len + start).max(0) } else { start };
                let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
                if start > stop || start >= len {
                    return Ok(Value::Array(Vec::new()));
                }
                Ok(Value::Array(
                    members[start as usize..=stop as usize]
                        .iter()
                        .map(|member| data(member.as_str()))
                        .collect(),
                ))
            }
            Cmd::ZRangeByLex {
                key,
                min,
                max,
                limit,
            } => {
                let (offset, count) = limit.unwrap_or((0, usize::MAX));
                Ok(Value::Array(
                    self.sorted_members(&key)?
                        .into_iter()
                        .filter(|member| in_lex_range(member, &min, &max))
                        .skip(offset)
                        .take(count)
                        .map(data)
                        .collect(),
                ))
            }
        }
    }
}

fn in_lex_range(member: &str, min: &LexBound, max: &LexBound) -> bool {
    min.above_min(member.as_bytes()) && max.below_max(member.as_bytes())
}
