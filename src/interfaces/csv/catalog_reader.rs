use crate::domain::catalog::{Platform, ProductCatalog, ProductDescriptor, ProductType};
use crate::error::{IapError, Result};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize)]
struct CatalogRow {
    id: String,
    r#type: ProductType,
    platform: Option<Platform>,
    store_id: Option<String>,
}

/// Reads a product catalog from CSV with columns `id, type, platform, store_id`.
///
/// A product may span several rows, one per platform store id; rows for the
/// same id must agree on the type. Products keep the order of their first row.
pub struct CatalogReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CatalogReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn read(self) -> Result<ProductCatalog> {
        let mut products: Vec<ProductDescriptor> = Vec::new();
        for row in self.reader.into_deserialize::<CatalogRow>() {
            let row = row?;
            let index = match products.iter().position(|p| p.id == row.id) {
                Some(index) => {
                    if products[index].product_type != row.r#type {
                        return Err(IapError::InvalidCatalog(format!(
                            "product {} has conflicting types",
                            row.id
                        )));
                    }
                    index
                }
                None => {
                    products.push(ProductDescriptor::new(row.id.clone(), row.r#type));
                    products.len() - 1
                }
            };
            match (row.platform, row.store_id) {
                (Some(platform), Some(store_id)) => {
                    products[index].set_store_id(platform, store_id);
                }
                (None, None) => {}
                _ => {
                    return Err(IapError::InvalidCatalog(format!(
                        "product {} needs both platform and store_id or neither",
                        row.id
                    )));
                }
            }
        }
        ProductCatalog::new(products)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_merge_into_products() {
        let data = "id, type, platform, store_id\n\
                    coin_100, consumable, android, gp.coin_100\n\
                    coin_100, consumable, ios, as.coin_100\n\
                    no_ads, non_consumable, ,\n\
                    vip, subscription, android, gp.vip";
        let catalog = CatalogReader::new(data.as_bytes()).read().unwrap();

        let ids: Vec<&str> = catalog.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["coin_100", "no_ads", "vip"]);
        let coin = catalog.get("coin_100").unwrap();
        assert_eq!(coin.store_id(Platform::Ios), Some("as.coin_100"));
        assert_eq!(coin.store_id(Platform::Android), Some("gp.coin_100"));
        assert_eq!(catalog.get("no_ads").unwrap().product_type, ProductType::NonConsumable);
    }

    #[test]
    fn test_conflicting_types_rejected() {
        let data = "id, type, platform, store_id\n\
                    gems, consumable, ,\n\
                    gems, subscription, ,";
        let result = CatalogReader::new(data.as_bytes()).read();
        assert!(matches!(result, Err(IapError::InvalidCatalog(_))));
    }

    #[test]
    fn test_half_store_mapping_rejected() {
        let data = "id, type, platform, store_id\ngems, consumable, android,";
        let result = CatalogReader::new(data.as_bytes()).read();
        assert!(matches!(result, Err(IapError::InvalidCatalog(_))));
    }

    #[test]
    fn test_unknown_type_is_csv_error() {
        let data = "id, type, platform, store_id\ngems, rental, ,";
        let result = CatalogReader::new(data.as_bytes()).read();
        assert!(matches!(result, Err(IapError::CsvError(_))));
    }
}
