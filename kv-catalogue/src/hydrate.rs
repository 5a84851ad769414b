use std::collections::BTreeMap;

use log::debug;

use crate::{
    CatalogueConfig, Error, HashRecord,
    conn::{Cmd, Connection, Pipeline},
    keys,
    model::{Category, Product, ProductRecord, images_from_members},
};

/// 一次往返取回一页商品及其图片，输出顺序与 `ids` 一致
///
/// 每个 id 排入 HGETALL 与 SMEMBERS 两条命令，整批提交后按提交顺序读回 2×N 条应答。
/// 应答顺序必须与提交顺序一致；记录 id 与请求 id 不符时返回 [`Error::ResponseOrder`]。
/// 图片集合的应答不带归属信息，集合之间互换无法识别，只能依赖传输层保序。
pub async fn hydrate<C: Connection>(
    conn: &C,
    ids: &[u64],
    categories: &BTreeMap<u64, Category>,
    config: &CatalogueConfig,
) -> Result<Vec<Product>, Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut pipeline = Pipeline::new();
    for &id in ids {
        pipeline.push(Cmd::hgetall(keys::product_key(id)));
        pipeline.push(Cmd::smembers(keys::product_images_key(id)));
    }

    let replies = conn.exec(pipeline).await?;
    if replies.len() != ids.len() * 2 {
        return Err(Error::UnexpectedReply {
            expected: "two replies per product",
            got: format!("{} replies for {} products", replies.len(), ids.len()),
        });
    }

    let mut products = Vec::with_capacity(ids.len());
    let mut replies = replies.into_iter();
    for &id in ids {
        let (Some(record), Some(images)) = (replies.next(), replies.next()) else {
            break;
        };
        let fields = record.into_map()?;
        let image_ids = images.into_strings()?;

        if fields.is_empty() {
            if image_ids.is_empty() {
                // 范围查询之后被删除
                debug!("product {} vanished before hydration", id);
                continue;
            }
            return Err(Error::UnexpectedReply {
                expected: "product record",
                got: format!("empty record with {} images for product {}", image_ids.len(), id),
            });
        }

        let record = ProductRecord::from_fields(&fields)?;
        if record.id != id {
            return Err(Error::ResponseOrder {
                expected: id,
                got: record.id,
            });
        }

        let images = images_from_members(id, image_ids, &config.base_uri)?;
        let category = record.category_id.map(|category_id| {
            categories.get(&category_id).cloned().unwrap_or(Category {
                id: category_id,
                name: String::new(),
            })
        });
        products.push(record.into_product(category, images));
    }

    Ok(products)
}
