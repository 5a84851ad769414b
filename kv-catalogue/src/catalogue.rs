use std::collections::BTreeMap;
use std::pin::Pin;

use async_stream::try_stream;
use futures::Stream;
use log::{debug, info, warn};

use crate::{
    CatalogueConfig, Error, HashRecord,
    conn::{Cmd, Connection, Pipeline},
    hydrate::hydrate,
    id::next_id,
    index::{self, IndexEntry},
    keys,
    model::{Category, Image, NewProduct, Page, Product, ProductRecord, images_from_members},
    query::{ListQuery, QueryPlan},
};

/// 商品目录：主记录的增删改查，以及排序集合与图片集合的一致性维护
///
/// 持有调用方注入的存储句柄，本身不保存跨调用的状态。
#[derive(Clone)]
pub struct Catalogue<C> {
    conn: C,
    config: CatalogueConfig,
}

impl<C: Connection + Clone> Catalogue<C> {
    pub fn new(conn: C) -> Self {
        Self::with_config(conn, CatalogueConfig::default())
    }

    pub fn with_config(conn: C, config: CatalogueConfig) -> Self {
        Self { conn, config }
    }

    pub fn config(&self) -> &CatalogueConfig {
        &self.config
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    // ---------------------------------------------------------------------
    // 分类
    // ---------------------------------------------------------------------

    /// 分类不由本库管理，这里只用于初始化
    pub async fn seed_categories(&self, categories: &[(u64, &str)]) -> Result<(), Error> {
        if categories.is_empty() {
            return Ok(());
        }
        let fields = categories
            .iter()
            .map(|(id, name)| (id.to_string(), name.to_string()))
            .collect();
        self.conn
            .query(Cmd::hset(keys::categories_key(), fields))
            .await?;
        info!("seeded {} categories", categories.len());
        Ok(())
    }

    pub async fn categories(&self) -> Result<BTreeMap<u64, Category>, Error> {
        self.conn
            .query(Cmd::hgetall(keys::categories_key()))
            .await?
            .into_map()?
            .into_iter()
            .map(|(id, name)| {
                let id = id.parse::<u64>().map_err(|_| Error::InvalidField {
                    field: "category id",
                    value: id,
                })?;
                Ok((id, Category { id, name }))
            })
            .collect()
    }

    async fn lookup_category_name(&self, category_id: u64) -> Result<Option<String>, Error> {
        self.conn
            .query(Cmd::hget(keys::categories_key(), category_id))
            .await?
            .into_optional_string()
    }

    pub async fn category_exists(&self, category_id: u64) -> Result<bool, Error> {
        Ok(self.lookup_category_name(category_id).await?.is_some())
    }

    pub async fn category_name(&self, category_id: u64) -> Result<String, Error> {
        self.lookup_category_name(category_id)
            .await?
            .ok_or(Error::NotFound)
    }

    /// 写入路径上的分类校验，顺便拿到名称
    async fn validate_category(&self, category_id: Option<u64>) -> Result<Option<Category>, Error> {
        let Some(category_id) = category_id else {
            return Ok(None);
        };
        match self.lookup_category_name(category_id).await? {
            Some(name) => Ok(Some(Category {
                id: category_id,
                name,
            })),
            None => Err(Error::Validation(format!(
                "category {} does not exist",
                category_id
            ))),
        }
    }

    /// 读取路径上的分类解析；分类被移除时保留 id、名称为空
    async fn resolve_category(&self, category_id: Option<u64>) -> Result<Option<Category>, Error> {
        let Some(category_id) = category_id else {
            return Ok(None);
        };
        let name = match self.lookup_category_name(category_id).await? {
            Some(name) => name,
            None => {
                warn!("product references missing category {}", category_id);
                String::new()
            }
        };
        Ok(Some(Category {
            id: category_id,
            name,
        }))
    }

    // ---------------------------------------------------------------------
    // 商品
    // ---------------------------------------------------------------------

    async fn product_record(&self, id: u64) -> Result<ProductRecord, Error> {
        let fields = self
            .conn
            .query(Cmd::hgetall(keys::product_key(id)))
            .await?
            .into_map()?;
        if fields.is_empty() {
            return Err(Error::NotFound);
        }
        ProductRecord::from_fields(&fields)
    }

    async fn product_image_ids(&self, id: u64) -> Result<Vec<String>, Error> {
        self.conn
            .query(Cmd::smembers(keys::product_images_key(id)))
            .await?
            .into_strings()
    }

    async fn product_images(&self, id: u64) -> Result<Vec<Image>, Error> {
        images_from_members(id, self.product_image_ids(id).await?, &self.config.base_uri)
    }

    pub async fn product_exists(&self, id: u64) -> Result<bool, Error> {
        self.conn
            .query(Cmd::exists(keys::product_key(id)))
            .await?
            .into_bool()
    }

    pub async fn create_product(&self, data: NewProduct) -> Result<Product, Error> {
        data.validate()?;
        let category = self.validate_category(data.category_id).await?;

        let id = next_id(&self.conn, keys::product_counter_key()).await?;
        let record = ProductRecord::from_new(id, data);

        // 主记录与索引在同一个原子批次里写入
        let mut pipeline = Pipeline::atomic();
        pipeline.push(Cmd::hset(keys::product_key(id), record.to_fields()));
        index::add_to_ordering(&mut pipeline, &IndexEntry::from(&record));
        self.conn.exec(pipeline).await?;

        debug!("created product {} ({})", id, record.sort_key());
        Ok(record.into_product(category, Vec::new()))
    }

    pub async fn update_product(&self, id: u64, data: NewProduct) -> Result<Product, Error> {
        let old = self.product_record(id).await?;
        data.validate()?;
        let category = self.validate_category(data.category_id).await?;

        let record = ProductRecord::from_new(id, data);

        // 先删后写，清除变为 None 的可选字段
        let mut pipeline = Pipeline::atomic();
        pipeline.push(Cmd::del(keys::product_key(id)));
        pipeline.push(Cmd::hset(keys::product_key(id), record.to_fields()));
        index::move_category(
            &mut pipeline,
            &IndexEntry::from(&old),
            &IndexEntry::from(&record),
        );
        self.conn.exec(pipeline).await?;

        if old.category_id != record.category_id {
            debug!(
                "moved product {} from category {:?} to {:?}",
                id, old.category_id, record.category_id
            );
        }

        let images = self.product_images(id).await?;
        Ok(record.into_product(category, images))
    }

    pub async fn get_product(&self, id: u64) -> Result<Product, Error> {
        let record = self.product_record(id).await?;
        let category = self.resolve_category(record.category_id).await?;
        let images = self.product_images(id).await?;
        Ok(record.into_product(category, images))
    }

    /// 级联删除：图片、图片集合、排序条目和主记录在同一个原子批次中删除
    ///
    /// 图片集合在批次之前读取；读取与提交之间新增的图片不在删除范围内。
    pub async fn delete_product(&self, id: u64) -> Result<(), Error> {
        let record = self.product_record(id).await?;
        let images = self.product_images(id).await?;

        let mut pipeline = Pipeline::atomic();
        for image in &images {
            pipeline.push(Cmd::del(keys::image_key(image.id)));
            pipeline.push(Cmd::hdel(keys::images_key(), image.id));
        }
        pipeline.push(Cmd::del(keys::product_images_key(id)));
        index::remove_from_ordering(&mut pipeline, &IndexEntry::from(&record));
        pipeline.push(Cmd::del(keys::product_key(id)));
        self.conn.exec(pipeline).await?;

        debug!("deleted product {} with {} images", id, images.len());
        Ok(())
    }

    // ---------------------------------------------------------------------
    // 图片
    // ---------------------------------------------------------------------

    pub async fn create_image(&self, product_id: u64, data: Vec<u8>) -> Result<Image, Error> {
        if !self.product_exists(product_id).await? {
            return Err(Error::NotFound);
        }

        let id = next_id(&self.conn, keys::image_counter_key()).await?;

        let mut pipeline = Pipeline::atomic();
        pipeline
            .push(Cmd::set(keys::image_key(id), data))
            .push(Cmd::hset(
                keys::images_key(),
                vec![(id.to_string(), product_id.to_string())],
            ))
            .push(Cmd::sadd(keys::product_images_key(product_id), id));
        self.conn.exec(pipeline).await?;

        debug!("attached image {} to product {}", id, product_id);
        Ok(Image::new(id, product_id, &self.config.base_uri))
    }

    async fn image_owner(&self, id: u64) -> Result<u64, Error> {
        let Some(product_id) = self
            .conn
            .query(Cmd::hget(keys::images_key(), id))
            .await?
            .into_optional_string()?
        else {
            return Err(Error::NotFound);
        };
        product_id.parse().map_err(|_| Error::InvalidField {
            field: "image owner",
            value: product_id,
        })
    }

    pub async fn image(&self, id: u64) -> Result<Image, Error> {
        let product_id = self.image_owner(id).await?;
        Ok(Image::new(id, product_id, &self.config.base_uri))
    }

    pub async fn image_data(&self, id: u64) -> Result<Vec<u8>, Error> {
        self.conn
            .query(Cmd::get(keys::image_key(id)))
            .await?
            .into_optional_bytes()?
            .ok_or(Error::NotFound)
    }

    pub async fn delete_image(&self, id: u64) -> Result<(), Error> {
        let product_id = self.image_owner(id).await?;

        let mut pipeline = Pipeline::atomic();
        pipeline
            .push(Cmd::srem(keys::product_images_key(product_id), id))
            .push(Cmd::hdel(keys::images_key(), id))
            .push(Cmd::del(keys::image_key(id)));
        self.conn.exec(pipeline).await?;

        debug!("deleted image {} of product {}", id, product_id);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // 列表
    // ---------------------------------------------------------------------

    pub async fn list_products(&self, query: &ListQuery) -> Result<Page<Product>, Error> {
        Ok(self.list_page(query).await?.0)
    }

    /// 返回页面以及范围查询命中的条目数；后者不受水合时跳过的商品影响
    async fn list_page(&self, query: &ListQuery) -> Result<(Page<Product>, usize), Error> {
        // 分类表只读一次，同时用于过滤和填充商品分类
        let categories = self.categories().await?;
        let plan = QueryPlan::new(query, &categories, self.config.results_per_page);

        let ids = QueryPlan::ids(self.conn.query(plan.to_cmd()).await?)?;
        let data = hydrate(&self.conn, &ids, &categories, &self.config).await?;

        let page = Page {
            data,
            current_page: plan.page,
            per_page: plan.per_page,
        };
        Ok((page, ids.len()))
    }
}

impl<C: Connection + Clone + 'static> Catalogue<C> {
    /// 从 `query` 指定的页开始逐页读取，直到范围查询返回的条目不满一页
    pub fn products_stream(
        &self,
        query: ListQuery,
    ) -> Pin<Box<dyn Stream<Item = Result<Product, Error>> + Send>> {
        let catalogue = self.clone();

        Box::pin(try_stream! {
            let mut query = query;
            query.page = query.page_number() as i64;
            loop {
                let (page, hits) = catalogue.list_page(&query).await?;
                let full = hits >= page.per_page;
                for product in page.data {
                    yield product;
                }
                if !full || query.page == i64::MAX {
                    break;
                }
                query.page += 1;
            }
        })
    }
}
