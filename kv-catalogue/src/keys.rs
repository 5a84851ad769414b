//! KV 中所有键名的唯一来源，修改格式会使已持久化的数据失效

pub fn categories_key() -> &'static str {
    "categories"
}

pub fn product_counter_key() -> &'static str {
    "product_counter"
}

pub fn image_counter_key() -> &'static str {
    "image_counter"
}

pub fn product_key(product_id: u64) -> String {
    format!("product:{}", product_id)
}

pub fn product_images_key(product_id: u64) -> String {
    format!("product:{}:images", product_id)
}

pub fn image_key(image_id: u64) -> String {
    format!("image:{}", image_id)
}

/// 图片 id -> 商品 id
pub fn images_key() -> &'static str {
    "images"
}

pub fn ordering_key() -> &'static str {
    "products"
}

pub fn category_ordering_key(category_id: u64) -> String {
    format!("products:cat:{}", category_id)
}

pub fn image_url(base_uri: &str, image_id: u64) -> String {
    format!("{}/images/{}", base_uri, image_id)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn keys_do_not_collide_across_kinds() {
        let mut keys = HashSet::new();
        for id in [1, 5, 12] {
            assert!(keys.insert(product_key(id)));
            assert!(keys.insert(product_images_key(id)));
            assert!(keys.insert(image_key(id)));
            assert!(keys.insert(category_ordering_key(id)));
        }
        for key in [
            categories_key(),
            product_counter_key(),
            image_counter_key(),
            images_key(),
            ordering_key(),
        ] {
            assert!(keys.insert(key.to_string()));
        }
    }

    #[test]
    fn key_formats_are_stable() {
        assert_eq!(product_key(78), "product:78");
        assert_eq!(product_images_key(78), "product:78:images");
        assert_eq!(image_key(78), "image:78");
        assert_eq!(category_ordering_key(2), "products:cat:2");
        assert_eq!(image_url("http://shop", 78), "http://shop/images/78");
    }
}
