use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Error, HashRecord, keys, utils::sort_key};

/// `product:{id}` hash 中保存的商品记录
#[derive(HashRecord, Clone, Debug, PartialEq)]
pub struct ProductRecord {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub vendor: String,
    pub price: Decimal,
    pub currency: String,
    #[record(rename = "main_category_id")]
    pub category_id: Option<u64>,
}

impl ProductRecord {
    pub fn from_new(id: u64, data: NewProduct) -> Self {
        Self {
            id,
            name: data.name,
            description: data.description,
            vendor: data.vendor,
            price: data.price,
            currency: data.currency,
            category_id: data.category_id,
        }
    }

    /// 排序集合中的成员：`规范化名称::id`
    pub fn sort_key(&self) -> String {
        sort_key(&self.name, self.id)
    }

    pub fn into_product(self, category: Option<Category>, images: Vec<Image>) -> Product {
        Product {
            id: self.id,
            name: self.name,
            description: self.description,
            vendor: self.vendor,
            price: self.price,
            currency: self.currency,
            category,
            images,
        }
    }
}

/// 创建或更新商品时的输入
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub currency: String,
    #[serde(rename = "main_category_id", default)]
    pub category_id: Option<u64>,
}

impl NewProduct {
    pub fn validate(&self) -> Result<(), Error> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("the name field is required".to_string()));
        }
        if self.price.is_sign_negative() && !self.price.is_zero() {
            return Err(Error::Validation(format!(
                "price must not be negative, got {}",
                self.price
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: u64,
    pub product_id: u64,
    pub url: String,
}

impl Image {
    pub fn new(id: u64, product_id: u64, base_uri: &str) -> Self {
        Self {
            id,
            product_id,
            url: keys::image_url(base_uri, id),
        }
    }
}

/// 由 `product:{id}:images` 的成员构造图片列表，按 id 排序
pub(crate) fn images_from_members(
    product_id: u64,
    members: Vec<String>,
    base_uri: &str,
) -> Result<Vec<Image>, Error> {
    let mut ids = members
        .into_iter()
        .map(|member| {
            member.parse::<u64>().map_err(|_| Error::InvalidField {
                field: "image id",
                value: member,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    ids.sort_unstable();
    Ok(ids
        .into_iter()
        .map(|id| Image::new(id, product_id, base_uri))
        .collect())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub vendor: String,
    pub price: Decimal,
    pub currency: String,
    #[serde(rename = "main_category")]
    pub category: Option<Category>,
    pub images: Vec<Image>,
}

/// 分页结果
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub current_page: u64,
    pub per_page: usize,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn warp_drive() -> NewProduct {
        NewProduct {
            name: "Warp Drive".to_string(),
            description: "Faster than light".to_string(),
            vendor: "Cochrane".to_string(),
            price: Decimal::from_str("1999.99").unwrap(),
            currency: "EUR".to_string(),
            category_id: Some(1),
        }
    }

    #[test]
    fn validation_rejects_missing_name_and_negative_price() {
        assert!(warp_drive().validate().is_ok());

        let mut blank = warp_drive();
        blank.name = "   ".to_string();
        assert!(matches!(blank.validate(), Err(Error::Validation(_))));

        let mut negative = warp_drive();
        negative.price = Decimal::from_str("-0.01").unwrap();
        assert!(matches!(negative.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn record_round_trips_through_hash_fields() {
        let record = ProductRecord::from_new(5, warp_drive());
        let fields = record.to_fields().into_iter().collect();
        assert_eq!(ProductRecord::from_fields(&fields).unwrap(), record);
        assert_eq!(record.sort_key(), "warp drive::5");
    }

    #[test]
    fn uncategorised_record_omits_category_field() {
        let mut data = warp_drive();
        data.category_id = None;
        let record = ProductRecord::from_new(5, data);
        assert!(
            record
                .to_fields()
                .iter()
                .all(|(field, _)| field != "main_category_id")
        );
    }

    #[test]
    fn images_are_sorted_and_get_urls() {
        let images =
            images_from_members(5, vec!["12".to_string(), "3".to_string()], "http://shop").unwrap();
        assert_eq!(
            images,
            vec![
                Image::new(3, 5, "http://shop"),
                Image::new(12, 5, "http://shop"),
            ]
        );
        assert_eq!(images[0].url, "http://shop/images/3");
        assert!(images_from_members(5, vec!["x".to_string()], "").is_err());
    }

    #[test]
    fn product_serialises_with_main_category() {
        let product = ProductRecord::from_new(5, warp_drive()).into_product(
            Some(Category {
                id: 1,
                name: "Science vessels".to_string(),
            }),
            Vec::new(),
        );
        let json = serde_json::to_value(&product).unwrap();
        assert_eq!(json["main_category"]["name"], "Science vessels");
        assert_eq!(json["price"], "1999.99");
        assert_eq!(json["images"], serde_json::json!([]));
    }
}
