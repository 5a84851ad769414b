use tikv_client::{Key, KvPair, Transaction, TransactionClient};

use crate::{
    Error,
    conn::{Cmd, Connection, LexBound, Pipeline, Value},
    utils::{key_after, key_to_bytes, next_key, sortable_score},
};

const PAGE_SIZE: u32 = 128;

/// 集合成员、有序集合条目占位用的值，TiKV 不保存空值
const PRESENT: &[u8] = b"1";

/// 基于 TiKV 的存储：每个批次在一个乐观事务里执行并提交
///
/// 数据结构按前缀展开到 TiKV 键上（键名中不能含 `/`）：
/// - 字符串 `s/{key}`
/// - hash 字段 `h/{key}/{field}`
/// - 集合成员 `e/{key}/{member}`
/// - 有序集合 `z/{key}/{score}/{member}`，以及成员到分值的反查 `y/{key}/{member}`
#[derive(Clone)]
pub struct TikvStore {
    client: TransactionClient,
}

impl TikvStore {
    pub async fn new(pd_endpoints: Vec<String>) -> Result<Self, Error> {
        let client = TransactionClient::new(pd_endpoints)
            .await
            .map_err(Error::TikvError)?;
        Ok(Self { client })
    }

    pub fn from_client(client: TransactionClient) -> Self {
        Self { client }
    }
}

impl Connection for TikvStore {
    async fn exec(&self, pipeline: Pipeline) -> Result<Vec<Value>, Error> {
        let mut txn = self
            .client
            .begin_optimistic()
            .await
            .map_err(Error::TikvError)?;

        let read_only = pipeline.is_read_only();
        let mut replies = Vec::with_capacity(pipeline.len());
        for cmd in pipeline.into_commands() {
            match apply(&mut txn, cmd).await {
                Ok(reply) => replies.push(reply),
                Err(e) => {
                    txn.rollback().await.map_err(Error::TikvError)?;
                    return Err(e);
                }
            }
        }

        // 只读批次没有可提交的写入
        if read_only {
            txn.rollback().await.map_err(Error::TikvError)?;
        } else {
            txn.commit().await.map_err(Error::TikvError)?;
        }
        Ok(replies)
    }
}

fn string_key(key: &str) -> Vec<u8> {
    format!("s/{}", key).into_bytes()
}

fn hash_prefix(key: &str) -> Vec<u8> {
    format!("h/{}/", key).into_bytes()
}

fn set_prefix(key: &str) -> Vec<u8> {
    format!("e/{}/", key).into_bytes()
}

fn zset_prefix(key: &str) -> Vec<u8> {
    format!("z/{}/", key).into_bytes()
}

fn zset_score_prefix(key: &str) -> Vec<u8> {
    format!("y/{}/", key).into_bytes()
}

fn child(prefix: &[u8], suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + suffix.len());
    key.extend_from_slice(prefix);
    key.extend_from_slice(suffix);
    key
}

fn zset_entry_key(key: &str, score: &str, member: &str) -> Vec<u8> {
    child(&zset_prefix(key), format!("{}/{}", score, member).as_bytes())
}

fn suffix_string(pair: &KvPair, prefix_len: usize) -> Result<String, Error> {
    let key = key_to_bytes(pair.key());
    String::from_utf8(key[prefix_len.min(key.len())..].to_vec()).map_err(Error::InvalidUtf8)
}

/// z 键后缀为 `{score}/{member}`，score 定长
fn zset_member(pair: &KvPair, prefix_len: usize) -> Result<String, Error> {
    let suffix = suffix_string(pair, prefix_len)?;
    match suffix.split_once('/') {
        Some((_, member)) => Ok(member.to_string()),
        None => Err(Error::Store(format!("malformed sorted set entry: {}", suffix))),
    }
}

fn data(value: impl Into<Vec<u8>>) -> Value {
    Value::Data(value.into())
}

fn flag(changed: bool) -> Value {
    Value::Int(i64::from(changed))
}

async fn scan_range(
    txn: &mut Transaction,
    start: Key,
    end: Key,
    limit: Option<usize>,
) -> Result<Vec<KvPair>, Error> {
    let mut start_key = start;
    let mut pairs = Vec::new();
    loop {
        let kvs = txn
            .scan(start_key.clone()..end.clone(), PAGE_SIZE)
            .await
            .map_err(Error::TikvError)?
            .collect::<Vec<_>>();

        if kvs.is_empty() {
            break;
        }

        start_key = key_after(kvs.last().ok_or(Error::NotFound)?.key());
        let len = kvs.len();
        pairs.extend(kvs);

        if let Some(limit) = limit {
            if pairs.len() >= limit {
                pairs.truncate(limit);
                break;
            }
        }
        if len < PAGE_SIZE as usize {
            break;
        }
    }
    Ok(pairs)
}

async fn scan_prefix(
    txn: &mut Transaction,
    prefix: &[u8],
    limit: Option<usize>,
) -> Result<Vec<KvPair>, Error> {
    let start = Key::from(prefix.to_vec());
    let end = next_key(&start);
    scan_range(txn, start, end, limit).await
}

async fn delete_prefix(txn: &mut Transaction, prefix: &[u8]) -> Result<bool, Error> {
    let pairs = scan_prefix(txn, prefix, None).await?;
    let deleted = !pairs.is_empty();
    for pair in pairs {
        txn.delete(pair.into_key()).await.map_err(Error::TikvError)?;
    }
    Ok(deleted)
}

async fn has_prefix(txn: &mut Transaction, prefix: &[u8]) -> Result<bool, Error> {
    Ok(!scan_prefix(txn, prefix, Some(1)).await?.is_empty())
}

async fn sorted_members(
    txn: &mut Transaction,
    key: &str,
    limit: Option<usize>,
) -> Result<Vec<String>, Error> {
    let prefix = zset_prefix(key);
    scan_prefix(txn, &prefix, limit)
        .await?
        .iter()
        .map(|pair| zset_member(pair, prefix.len()))
        .collect()
}

async fn apply(txn: &mut Transaction, cmd: Cmd) -> Result<Value, Error> {
    match cmd {
        Cmd::Get { key } => Ok(txn
            .get(string_key(&key))
            .await
            .map_err(Error::TikvError)?
            .map_or(Value::Nil, Value::Data)),
        Cmd::Set { key, value } => {
            txn.put(string_key(&key), value)
                .await
                .map_err(Error::TikvError)?;
            Ok(Value::Okay)
        }
        Cmd::Del { key } => {
            let mut deleted = false;
            if txn
                .get(string_key(&key))
                .await
                .map_err(Error::TikvError)?
                .is_some()
            {
                txn.delete(string_key(&key))
                    .await
                    .map_err(Error::TikvError)?;
                deleted = true;
            }
            for prefix in [
                hash_prefix(&key),
                set_prefix(&key),
                zset_prefix(&key),
                zset_score_prefix(&key),
            ] {
                deleted |= delete_prefix(txn, &prefix).await?;
            }
            Ok(flag(deleted))
        }
        Cmd::Exists { key } => {
            if txn
                .key_exists(string_key(&key))
                .await
                .map_err(Error::TikvError)?
            {
                return Ok(flag(true));
            }
            for prefix in [hash_prefix(&key), set_prefix(&key), zset_prefix(&key)] {
                if has_prefix(txn, &prefix).await? {
                    return Ok(flag(true));
                }
            }
            Ok(flag(false))
        }
        Cmd::Incr { key } => {
            let current = match txn
                .get(string_key(&key))
                .await
                .map_err(Error::TikvError)?
            {
                None => 0,
                Some(value) => String::from_utf8(value)
                    .ok()
                    .and_then(|s| s.parse::<i64>().ok())
                    .ok_or_else(|| Error::Store(format!("value at '{}' is not an integer", key)))?,
            };
            let next = current
                .checked_add(1)
                .ok_or_else(|| Error::Store(format!("increment at '{}' would overflow", key)))?;
            txn.put(string_key(&key), next.to_string().into_bytes())
                .await
                .map_err(Error::TikvError)?;
            Ok(Value::Int(next))
        }
        Cmd::HGet { key, field } => Ok(txn
            .get(child(&hash_prefix(&key), field.as_bytes()))
            .await
            .map_err(Error::TikvError)?
            .map_or(Value::Nil, Value::Data)),
        Cmd::HGetAll { key } => {
            let prefix = hash_prefix(&key);
            let mut items = Vec::new();
            for pair in scan_prefix(txn, &prefix, None).await? {
                items.push(data(suffix_string(&pair, prefix.len())?));
                items.push(data(pair.into_value()));
            }
            Ok(Value::Array(items))
        }
        Cmd::HSet { key, fields } => {
            let prefix = hash_prefix(&key);
            let mut added = 0;
            for (field, value) in fields {
                let field_key = child(&prefix, field.as_bytes());
                if !txn
                    .key_exists(field_key.clone())
                    .await
                    .map_err(Error::TikvError)?
                {
                    added += 1;
                }
                txn.put(field_key, value.into_bytes())
                    .await
                    .map_err(Error::TikvError)?;
            }
            Ok(Value::Int(added))
        }
        Cmd::HDel { key, field } => {
            let field_key = child(&hash_prefix(&key), field.as_bytes());
            remove_if_present(txn, field_key).await
        }
        Cmd::SAdd { key, member } => {
            let member_key = child(&set_prefix(&key), member.as_bytes());
            let added = !txn
                .key_exists(member_key.clone())
                .await
                .map_err(Error::TikvError)?;
            txn.put(member_key, PRESENT.to_vec())
                .await
                .map_err(Error::TikvError)?;
            Ok(flag(added))
        }
        Cmd::SRem { key, member } => {
            let member_key = child(&set_prefix(&key), member.as_bytes());
            remove_if_present(txn, member_key).await
        }
        Cmd::SMembers { key } => {
            let prefix = set_prefix(&key);
            let mut members = Vec::new();
            for pair in scan_prefix(txn, &prefix, None).await? {
                members.push(data(suffix_string(&pair, prefix.len())?));
            }
            Ok(Value::Array(members))
        }
        Cmd::ZAdd { key, score, member } => {
            let score_key = child(&zset_score_prefix(&key), member.as_bytes());
            let score = sortable_score(score);
            let old = txn
                .get(score_key.clone())
                .await
                .map_err(Error::TikvError)?;
            if let Some(old) = &old {
                let old = String::from_utf8(old.clone()).map_err(Error::InvalidUtf8)?;
                if old != score {
                    txn.delete(zset_entry_key(&key, &old, &member))
                        .await
                        .map_err(Error::TikvError)?;
                }
            }
            txn.put(zset_entry_key(&key, &score, &member), PRESENT.to_vec())
                .await
                .map_err(Error::TikvError)?;
            txn.put(score_key, score.into_bytes())
                .await
                .map_err(Error::TikvError)?;
            Ok(flag(old.is_none()))
        }
        Cmd::ZRem { key, member } => {
            let score_key = child(&zset_score_prefix(&key), member.as_bytes());
            let Some(score) = txn
                .get(score_key.clone())
                .await
                .map_err(Error::TikvError)?
            else {
                return Ok(flag(false));
            };
            let score = String::from_utf8(score).map_err(Error::InvalidUtf8)?;
            txn.delete(zset_entry_key(&key, &score, &member))
                .await
                .map_err(Error::TikvError)?;
            txn.delete(score_key).await.map_err(Error::TikvError)?;
            Ok(flag(true))
        }
        Cmd::ZRange { key, start, stop } => {
            let members = if start >= 0 && stop >= 0 {
                if start > stop {
                    return Ok(Value::Array(Vec::new()));
                }
                let skip = usize::try_from(start).unwrap_or(usize::MAX);
                let members = sorted_members(txn, &key, position_scan_limit(stop)).await?;
                members.into_iter().skip(skip).collect()
            } else {
                let members = sorted_members(txn, &key, None).await?;
                let len = members.len() as i64;
                let start = if start < 0 { (len + start).max(0) } else { start };
                let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
                if start > stop || start >= len {
                    Vec::new()
                } else {
                    members[start as usize..=stop as usize].to_vec()
                }
            };
            Ok(Value::Array(members.into_iter().map(data).collect()))
        }
        Cmd::ZRangeByLex {
            key,
            min,
            max,
            limit,
        } => zrange_by_lex(txn, &key, &min, &max, limit).await,
    }
}

/// 非负 `stop` 对应的扫描条数；超出 usize 时不设上限
fn position_scan_limit(stop: i64) -> Option<usize> {
    usize::try_from(stop).ok().and_then(|stop| stop.checked_add(1))
}

async fn remove_if_present(txn: &mut Transaction, key: Vec<u8>) -> Result<Value, Error> {
    if !txn
        .key_exists(key.clone())
        .await
        .map_err(Error::TikvError)?
    {
        return Ok(flag(false));
    }
    txn.delete(key).await.map_err(Error::TikvError)?;
    Ok(flag(true))
}

/// 与 ZRANGEBYLEX 相同，要求集合内成员分值一致；取第一个条目的分值所在区段扫描
async fn zrange_by_lex(
    txn: &mut Transaction,
    key: &str,
    min: &LexBound,
    max: &LexBound,
    limit: Option<(usize, usize)>,
) -> Result<Value, Error> {
    let prefix = zset_prefix(key);
    let Some(first) = scan_prefix(txn, &prefix, Some(1)).await?.into_iter().next() else {
        return Ok(Value::Array(Vec::new()));
    };
    let suffix = suffix_string(&first, prefix.len())?;
    let Some((score, _)) = suffix.split_once('/') else {
        return Err(Error::Store(format!("malformed sorted set entry: {}", suffix)));
    };
    let bucket = child(&prefix, format!("{}/", score).as_bytes());

    let start = match min {
        LexBound::NegInf => Key::from(bucket.clone()),
        LexBound::PosInf => return Ok(Value::Array(Vec::new())),
        LexBound::Inclusive(bound) => Key::from(child(&bucket, bound)),
        LexBound::Exclusive(bound) => key_after(&Key::from(child(&bucket, bound))),
    };
    let end = match max {
        LexBound::NegInf => return Ok(Value::Array(Vec::new())),
        LexBound::PosInf => next_key(&Key::from(bucket.clone())),
        LexBound::Inclusive(bound) => key_after(&Key::from(child(&bucket, bound))),
        LexBound::Exclusive(bound) => Key::from(child(&bucket, bound)),
    };
    if key_to_bytes(&start) >= key_to_bytes(&end) {
        return Ok(Value::Array(Vec::new()));
    }

    let (offset, count) = limit.unwrap_or((0, usize::MAX));
    let scan_limit = limit.map(|(offset, count)| offset.saturating_add(count));
    let mut members = Vec::new();
    for pair in scan_range(txn, start, end, scan_limit)
        .await?
        .iter()
        .skip(offset)
        .take(count)
    {
        members.push(data(zset_member(pair, prefix.len())?));
    }
    Ok(Value::Array(members))
}
