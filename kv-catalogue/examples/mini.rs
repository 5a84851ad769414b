use std::str::FromStr;

use futures::TryStreamExt;
use kv_catalogue::{Catalogue, CatalogueConfig, Error, ListQuery, NewProduct, TikvStore};
use rust_decimal::Decimal;

const CATEGORIES: &[(u64, &str)] = &[
    (1, "Science vessels"),
    (2, "Warships"),
    (3, "Freighters"),
    (4, "Colony Ships"),
];

fn product(name: &str, price: &str, category_id: u64) -> NewProduct {
    NewProduct {
        name: name.to_string(),
        description: String::new(),
        vendor: "Yoyodyne".to_string(),
        price: Decimal::from_str(price).unwrap_or_default(),
        currency: "EUR".to_string(),
        category_id: Some(category_id),
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    let store = TikvStore::new(vec!["127.0.0.1:2379".to_string()]).await?;
    let catalogue = Catalogue::with_config(
        store,
        CatalogueConfig::default().with_base_uri("http://localhost:8080"),
    );

    catalogue.seed_categories(CATEGORIES).await?;

    let drive = catalogue
        .create_product(product("Warp Drive", "1999.99", 1))
        .await?;
    catalogue
        .create_product(product("Warp Core", "499.00", 1))
        .await?;
    catalogue
        .create_product(product("Cold Fusion", "89.50", 3))
        .await?;

    catalogue.create_image(drive.id, b"\x89PNG".to_vec()).await?;

    let found = catalogue
        .list_products(&ListQuery::new().search("warp"))
        .await?;
    for p in &found.data {
        println!("{} {} {}", p.id, p.name, p.price);
    }

    let moved = catalogue
        .update_product(drive.id, product("Warp Drive", "1999.99", 2))
        .await?;
    println!("{:?}", moved);

    let all = catalogue
        .products_stream(ListQuery::new())
        .try_collect::<Vec<_>>()
        .await?;
    println!("{} products", all.len());

    for p in all {
        catalogue.delete_product(p.id).await?;
    }

    Ok(())
}
