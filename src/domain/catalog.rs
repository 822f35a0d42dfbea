use crate::error::{IapError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// The runtime platform a build targets. Store identifiers and restore
/// strategies are resolved against it.
#[derive(Debug, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
    TvOs,
    VisionOs,
    MacOs,
    Windows,
    Linux,
    WebGl,
}

impl Platform {
    /// The platform this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(target_os = "android") {
            Platform::Android
        } else if cfg!(target_os = "ios") {
            Platform::Ios
        } else if cfg!(target_os = "tvos") {
            Platform::TvOs
        } else if cfg!(target_os = "visionos") {
            Platform::VisionOs
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_arch = "wasm32") {
            Platform::WebGl
        } else {
            Platform::Linux
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::TvOs => "tvos",
            Platform::VisionOs => "visionos",
            Platform::MacOs => "macos",
            Platform::Windows => "windows",
            Platform::Linux => "linux",
            Platform::WebGl => "webgl",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "android" => Ok(Platform::Android),
            "ios" => Ok(Platform::Ios),
            "tvos" => Ok(Platform::TvOs),
            "visionos" => Ok(Platform::VisionOs),
            "macos" => Ok(Platform::MacOs),
            "windows" => Ok(Platform::Windows),
            "linux" => Ok(Platform::Linux),
            "webgl" => Ok(Platform::WebGl),
            other => Err(format!("unknown platform '{other}'")),
        }
    }
}

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Consumable,
    NonConsumable,
    Subscription,
}

/// An immutable catalog entry.
#[derive(Debug, PartialEq, Clone)]
pub struct ProductDescriptor {
    /// Catalog-wide unique identifier used by callers.
    pub id: String,
    pub product_type: ProductType,
    store_ids: HashMap<Platform, String>,
}

impl ProductDescriptor {
    pub fn new(id: impl Into<String>, product_type: ProductType) -> Self {
        Self {
            id: id.into(),
            product_type,
            store_ids: HashMap::new(),
        }
    }

    /// Adds a platform-specific store identifier. A later call for the same
    /// platform replaces the earlier one.
    pub fn with_store_id(mut self, platform: Platform, store_id: impl Into<String>) -> Self {
        self.set_store_id(platform, store_id);
        self
    }

    pub fn set_store_id(&mut self, platform: Platform, store_id: impl Into<String>) {
        self.store_ids.insert(platform, store_id.into());
    }

    /// Resolves the store identifier for `platform`, if one was registered.
    pub fn store_id(&self, platform: Platform) -> Option<&str> {
        self.store_ids.get(&platform).map(String::as_str)
    }
}

/// One product as handed to the billing backend at initialization.
#[derive(Debug, PartialEq, Clone)]
pub struct ProductDefinition {
    pub id: String,
    pub product_type: ProductType,
    pub store_specific_id: Option<String>,
}

/// The product set the backend is initialized with.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct BackendConfig {
    pub products: Vec<ProductDefinition>,
}

/// Ordered, read-only collection of product descriptors.
#[derive(Debug, Clone, Default)]
pub struct ProductCatalog {
    products: Vec<ProductDescriptor>,
}

impl ProductCatalog {
    /// Builds a catalog, keeping insertion order. Ids must be unique.
    pub fn new(products: Vec<ProductDescriptor>) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        for product in &products {
            if !seen.insert(product.id.as_str()) {
                return Err(IapError::DuplicateProduct(product.id.clone()));
            }
        }
        Ok(Self { products })
    }

    pub fn get(&self, id: &str) -> Option<&ProductDescriptor> {
        self.products.iter().find(|p| p.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProductDescriptor> {
        self.products.iter()
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Builds the backend configuration with store ids resolved for `platform`.
    pub fn backend_config(&self, platform: Platform) -> BackendConfig {
        BackendConfig {
            products: self
                .products
                .iter()
                .map(|p| ProductDefinition {
                    id: p.id.clone(),
                    product_type: p.product_type,
                    store_specific_id: p.store_id(platform).map(str::to_string),
                })
                .collect(),
        }
    }
}
