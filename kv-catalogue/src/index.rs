//! 排序集合的同步维护。这里只往调用方的原子批次里追加命令，不做任何 I/O，
//! 商品的增删改都必须经过这里修改 `products` 与 `products:cat:{id}`。

use crate::{
    conn::{Cmd, Pipeline},
    keys,
    model::ProductRecord,
};

/// 排序集合中所有成员的分值一致，位置顺序与字典序相同（按名称）
pub(crate) const ORDERING_SCORE: f64 = 0.0;

/// 一个商品在排序集合里的位置
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    pub id: u64,
    pub sort_key: String,
    pub category_id: Option<u64>,
}

impl From<&ProductRecord> for IndexEntry {
    fn from(record: &ProductRecord) -> Self {
        Self {
            id: record.id,
            sort_key: record.sort_key(),
            category_id: record.category_id,
        }
    }
}

pub fn add_to_ordering(pipeline: &mut Pipeline, entry: &IndexEntry) {
    pipeline.push(Cmd::zadd(
        keys::ordering_key(),
        ORDERING_SCORE,
        entry.sort_key.clone(),
    ));
    if let Some(category_id) = entry.category_id {
        pipeline.push(Cmd::zadd(
            keys::category_ordering_key(category_id),
            ORDERING_SCORE,
            entry.sort_key.clone(),
        ));
    }
}

pub fn remove_from_ordering(pipeline: &mut Pipeline, entry: &IndexEntry) {
    pipeline.push(Cmd::zrem(keys::ordering_key(), entry.sort_key.clone()));
    if let Some(category_id) = entry.category_id {
        pipeline.push(Cmd::zrem(
            keys::category_ordering_key(category_id),
            entry.sort_key.clone(),
        ));
    }
}

/// 分类或名称变化时移动条目；排序键变化时全局集合的条目也要替换
pub fn move_category(pipeline: &mut Pipeline, old: &IndexEntry, new: &IndexEntry) {
    debug_assert_eq!(old.id, new.id);

    let sort_key_changed = old.sort_key != new.sort_key;
    if sort_key_changed {
        pipeline.push(Cmd::zrem(keys::ordering_key(), old.sort_key.clone()));
        pipeline.push(Cmd::zadd(
            keys::ordering_key(),
            ORDERING_SCORE,
            new.sort_key.clone(),
        ));
    }

    if sort_key_changed || old.category_id != new.category_id {
        if let Some(category_id) = old.category_id {
            pipeline.push(Cmd::zrem(
                keys::category_ordering_key(category_id),
                old.sort_key.clone(),
            ));
        }
        if let Some(category_id) = new.category_id {
            pipeline.push(Cmd::zadd(
                keys::category_ordering_key(category_id),
                ORDERING_SCORE,
                new.sort_key.clone(),
            ));
        }
    }
}
