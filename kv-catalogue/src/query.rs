use std::collections::BTreeMap;

use crate::{
    Error,
    conn::{Cmd, LexBound, Value},
    keys,
    model::Category,
    utils::{normalize, parse_sort_key},
};

/// 前缀区间上界追加的字节，大于任何 UTF-8 字节
const LEX_SENTINEL: u8 = 0xff;

/// 列表请求：分类过滤、页码（从 1 开始）和名称前缀
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub category_id: Option<u64>,
    pub page: i64,
    pub search: Option<String>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, category_id: u64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn page(mut self, page: i64) -> Self {
        self.page = page;
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// 小于 1 的页码按第 1 页处理
    pub fn page_number(&self) -> u64 {
        u64::try_from(self.page).unwrap_or(0).max(1)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Range {
    /// ZRANGE key start stop，两端都包含
    Position { start: i64, stop: i64 },
    /// ZRANGEBYLEX key [min [max LIMIT offset count
    Lex {
        min: Vec<u8>,
        max: Vec<u8>,
        offset: usize,
        count: usize,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryPlan {
    pub key: String,
    pub range: Range,
    pub page: u64,
    pub per_page: usize,
}

impl QueryPlan {
    pub fn new(query: &ListQuery, categories: &BTreeMap<u64, Category>, per_page: usize) -> Self {
        // 未知分类静默回退到全局集合
        let key = match query.category_id {
            Some(category_id) if categories.contains_key(&category_id) => {
                keys::category_ordering_key(category_id)
            }
            _ => keys::ordering_key().to_string(),
        };

        // 每页至少一条，否则 stop 会变成 -1 取回整个集合
        let per_page = per_page.max(1);
        let page = query.page_number();
        let offset = (page - 1).saturating_mul(per_page as u64);

        let range = match query.search.as_deref() {
            Some(search) if !search.is_empty() => {
                let prefix = normalize(search).into_bytes();
                let mut max = prefix.clone();
                max.push(LEX_SENTINEL);
                Range::Lex {
                    min: prefix,
                    max,
                    offset: usize::try_from(offset).unwrap_or(usize::MAX),
                    count: per_page,
                }
            }
            _ => {
                let start = i64::try_from(offset).unwrap_or(i64::MAX);
                Range::Position {
                    start,
                    stop: start.saturating_add(per_page as i64 - 1),
                }
            }
        };

        Self {
            key,
            range,
            page,
            per_page,
        }
    }

    pub fn to_cmd(&self) -> Cmd {
        match &self.range {
            Range::Position { start, stop } => Cmd::zrange(self.key.clone(), *start, *stop),
            Range::Lex {
                min,
                max,
                offset,
                count,
            } => Cmd::zrangebylex(
                self.key.clone(),
                LexBound::Inclusive(min.clone()),
                LexBound::Inclusive(max.clone()),
                Some((*offset, *count)),
            ),
        }
    }

    /// 从排序键中取出商品 id，保持顺序
    pub fn ids(reply: Value) -> Result<Vec<u64>, Error> {
        reply
            .into_strings()?
            .iter()
            .map(|member| parse_sort_key(member))
            .collect()
    }
}
