//! Conversion from wire format to domain types.
//!
//! The API serves prices as floats; anything that does not survive the
//! conversion to a decimal price is dropped here with a warning rather
//! than failing the whole listing.

use serde::Deserialize;
use tracing::warn;

use shopez_core::{Price, ProductId};

use crate::types::{Product, Rating};

/// A product as the Fake Store API serves it.
#[derive(Debug, Deserialize)]
pub(crate) struct ProductData {
    pub id: u32,
    pub title: String,
    pub price: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub image: String,
    pub rating: Option<RatingData>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RatingData {
    pub rate: f64,
    pub count: u32,
}

pub(crate) fn convert_product(data: ProductData) -> Option<Product> {
    let Some(price) = Price::from_f64(data.price) else {
        warn!(
            product = data.id,
            price = data.price,
            "Skipping product with unusable price"
        );
        return None;
    };
    Some(Product {
        id: ProductId::new(data.id),
        title: data.title,
        price,
        description: data.description,
        category: data.category,
        image: data.image,
        rating: data.rating.map_or_else(Rating::default, convert_rating),
    })
}

pub(crate) fn convert_products(data: Vec<ProductData>) -> Vec<Product> {
    data.into_iter().filter_map(convert_product).collect()
}

fn convert_rating(data: RatingData) -> Rating {
    Rating {
        rate: data.rate,
        count: data.count,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn converts_a_fake_store_payload() {
        let json = r#"{
            "id": 1,
            "title": "Fjallraven - Foldsack No. 1 Backpack",
            "price": 109.95,
            "description": "Your perfect pack for everyday use",
            "category": "men's clothing",
            "image": "https://fakestoreapi.com/img/81fPKd-2AYL._AC_SL1500_.jpg",
            "rating": { "rate": 3.9, "count": 120 }
        }"#;

        let data: ProductData = serde_json::from_str(json).unwrap();
        let product = convert_product(data).unwrap();

        assert_eq!(product.id, ProductId::new(1));
        assert_eq!(product.price.to_string(), "$109.95");
        assert_eq!(product.category, "men's clothing");
        assert_eq!(product.rating.count, 120);
    }

    #[test]
    fn missing_optional_fields_default() {
        let json = r#"{"id": 5, "title": "Bare", "price": 9.5}"#;
        let data: ProductData = serde_json::from_str(json).unwrap();
        let product = convert_product(data).unwrap();

        assert!(product.description.is_empty());
        assert_eq!(product.rating, Rating::default());
    }

    #[test]
    fn negative_price_drops_the_product() {
        let data = ProductData {
            id: 2,
            title: "Broken".to_owned(),
            price: -1.0,
            description: String::new(),
            category: String::new(),
            image: String::new(),
            rating: None,
        };
        assert!(convert_product(data).is_none());
    }

    #[test]
    fn list_conversion_skips_bad_entries() {
        let good = ProductData {
            id: 1,
            title: "Good".to_owned(),
            price: 5.0,
            description: String::new(),
            category: String::new(),
            image: String::new(),
            rating: None,
        };
        let bad = ProductData {
            id: 2,
            title: "Bad".to_owned(),
            price: f64::NAN,
            description: String::new(),
            category: String::new(),
            image: String::new(),
            rating: None,
        };
        let products = convert_products(vec![good, bad]);
        assert_eq!(products.len(), 1);
        assert_eq!(products.first().unwrap().title, "Good");
    }
}
