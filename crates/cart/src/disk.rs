//! Disk-backed cart cache.
//!
//! One JSON file per user under a data directory. Writes go through a
//! temporary file and a rename so a crash mid-write cannot leave a
//! half-written cart behind.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::fs;
use tracing::debug;

use shopez_core::{Cart, UserId};

use crate::cache::CartCache;
use crate::error::CacheError;

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// A [`CartCache`] storing `cart-{uid}.json` files in a directory.
#[derive(Debug, Clone)]
pub struct DiskCartCache {
    dir: PathBuf,
}

impl DiskCartCache {
    /// Cache carts under `dir`. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, uid: &UserId) -> PathBuf {
        self.dir.join(format!("cart-{}.json", sanitize(uid.as_str())))
    }
}

// UIDs are opaque strings; keep only filename-safe characters.
fn sanitize(uid: &str) -> String {
    uid.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl CartCache for DiskCartCache {
    async fn load(&self, uid: &UserId) -> Result<Option<Cart>, CacheError> {
        let path = self.path_for(uid);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let cart: Cart = serde_json::from_slice(&bytes)?;
        debug!(path = %path.display(), "loaded cached cart");
        Ok(Some(cart.normalized()))
    }

    async fn store(&self, uid: &UserId, cart: &Cart) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(uid);
        let tmp = path.with_extension(format!(
            "json.tmp{}",
            TMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        let bytes = serde_json::to_vec(cart)?;
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use shopez_core::{CartItem, Price, ProductId};

    struct ScratchDir(PathBuf);

    impl ScratchDir {
        fn new(tag: &str) -> Self {
            let dir = std::env::temp_dir().join(format!(
                "shopez-cart-cache-{tag}-{}-{}",
                std::process::id(),
                TMP_SEQ.fetch_add(1, Ordering::Relaxed)
            ));
            Self(dir)
        }
    }

    impl Drop for ScratchDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    fn sample_cart() -> Cart {
        let mut cart = Cart::new();
        cart.insert_or_increment(CartItem {
            id: ProductId::new(1),
            title: "Backpack".to_owned(),
            price: Price::from_f64(109.95).unwrap(),
            image: String::new(),
            quantity: 2,
        });
        cart
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let scratch = ScratchDir::new("missing");
        let cache = DiskCartCache::new(&scratch.0);
        assert!(cache.load(&UserId::new("u1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stores_and_loads_per_user() {
        let scratch = ScratchDir::new("roundtrip");
        let cache = DiskCartCache::new(&scratch.0);
        let uid = UserId::new("u1");

        cache.store(&uid, &sample_cart()).await.unwrap();
        let loaded = cache.load(&uid).await.unwrap().unwrap();
        assert_eq!(loaded, sample_cart());

        assert!(cache.load(&UserId::new("u2")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_file_surfaces_a_decode_error() {
        let scratch = ScratchDir::new("corrupt");
        let cache = DiskCartCache::new(&scratch.0);
        let uid = UserId::new("u1");

        std::fs::create_dir_all(&scratch.0).unwrap();
        std::fs::write(scratch.0.join("cart-u1.json"), b"{not json").unwrap();

        assert!(matches!(
            cache.load(&uid).await,
            Err(CacheError::Encode(_))
        ));
    }

    #[tokio::test]
    async fn uid_is_sanitized_for_the_filesystem() {
        let scratch = ScratchDir::new("sanitize");
        let cache = DiskCartCache::new(&scratch.0);
        let uid = UserId::new("../evil/uid");

        cache.store(&uid, &sample_cart()).await.unwrap();
        assert!(cache.load(&uid).await.unwrap().is_some());
        assert!(!scratch.0.parent().unwrap().join("evil").exists());
    }
}
