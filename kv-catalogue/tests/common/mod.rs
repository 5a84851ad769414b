#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use kv_catalogue::{
    Catalogue, CatalogueConfig, Cmd, Connection, Error, MemoryStore, NewProduct, Pipeline, Value,
};
use rust_decimal::Decimal;

pub const CATEGORIES: &[(u64, &str)] = &[
    (1, "Science vessels"),
    (2, "Warships"),
    (3, "Freighters"),
    (4, "Colony Ships"),
];

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub async fn seeded<C: Connection + Clone>(conn: C) -> Catalogue<C> {
    init_logger();
    let catalogue = Catalogue::with_config(
        conn,
        CatalogueConfig::default().with_base_uri("http://shop.test/"),
    );
    catalogue.seed_categories(CATEGORIES).await.unwrap();
    catalogue
}

pub fn product(name: &str, price: &str, category_id: Option<u64>) -> NewProduct {
    NewProduct {
        name: name.to_string(),
        description: format!("{} description", name),
        vendor: "Yoyodyne".to_string(),
        price: Decimal::from_str(price).unwrap(),
        currency: "EUR".to_string(),
        category_id,
    }
}

pub async fn members<C: Connection>(conn: &C, key: &str) -> Vec<String> {
    conn.query(Cmd::zrange(key, 0, -1))
        .await
        .unwrap()
        .into_strings()
        .unwrap()
}

/// 统计 exec 调用次数
#[derive(Clone, Default)]
pub struct CountingStore {
    pub inner: MemoryStore,
    pub calls: Arc<AtomicUsize>,
}

impl CountingStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Connection for CountingStore {
    async fn exec(&self, pipeline: Pipeline) -> Result<Vec<Value>, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.exec(pipeline).await
    }
}

/// 原子批次一律失败，模拟事务被中止
#[derive(Clone, Default)]
pub struct AbortingStore {
    pub inner: MemoryStore,
}

impl Connection for AbortingStore {
    async fn exec(&self, pipeline: Pipeline) -> Result<Vec<Value>, Error> {
        if pipeline.is_atomic() {
            return Err(Error::Store("EXECABORT transaction discarded".to_string()));
        }
        self.inner.exec(pipeline).await
    }
}

#[derive(Clone, Copy)]
pub enum Shuffle {
    /// 整批应答倒序
    Reverse,
    /// 按商品成对交换，每对内部顺序不变
    SwapPairs,
    /// 只交换前两个商品的图片集合应答
    SwapImageSets,
}

/// 多命令的非原子批次按 `Shuffle` 打乱应答顺序
#[derive(Clone)]
pub struct ReorderingStore {
    pub inner: MemoryStore,
    pub shuffle: Shuffle,
}

impl Connection for ReorderingStore {
    async fn exec(&self, pipeline: Pipeline) -> Result<Vec<Value>, Error> {
        let batched = !pipeline.is_atomic() && pipeline.len() > 1;
        let mut replies = self.inner.exec(pipeline).await?;
        if batched {
            match self.shuffle {
                Shuffle::Reverse => replies.reverse(),
                Shuffle::SwapPairs => {
                    let pairs = replies
                        .chunks(2)
                        .map(<[Value]>::to_vec)
                        .collect::<Vec<_>>();
                    replies = pairs.into_iter().rev().flatten().collect();
                }
                Shuffle::SwapImageSets => {
                    if replies.len() >= 4 {
                        replies.swap(1, 3);
                    }
                }
            }
        }
        Ok(replies)
    }
}
