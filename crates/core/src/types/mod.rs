//! Common types used across ShopEZ crates.

mod cart;
mod email;
mod id;
mod identity;
mod price;

pub use cart::*;
pub use email::*;
pub use id::*;
pub use identity::*;
pub use price::*;
