//! Terminal rendering for catalog listings and the live cart.
//!
//! Rendering is split from printing so the layouts are testable: the
//! `render` functions return strings, and [`emit`]/[`prompt`] are the only
//! places that touch stdout.

use std::io::{self, Write};

use shopez_cart::CartState;
use shopez_catalog::Product;

/// Command summary shown when the interactive session starts.
pub const HELP: &str = "\
Commands:
  products [category]   List products, optionally by category
  categories            List the catalog categories
  show <id>             Show one product in detail
  add <id> [qty]        Add a product to the cart
  qty <id> <n>          Set a line's quantity (0 or less removes it)
  remove <id>           Remove a line from the cart
  clear                 Empty the cart
  cart                  Show the cart
  whoami                Show who is signed in
  signout               Sign out and leave
  quit                  Leave the shop";

/// One line per product: id, price, title, category.
pub fn product_list(products: &[Product]) -> String {
    if products.is_empty() {
        return "No products found".to_owned();
    }
    let lines: Vec<String> = products
        .iter()
        .map(|product| {
            format!(
                "{:>4}  {:>9}  {} [{}]",
                product.id.to_string(),
                product.price.to_string(),
                product.title,
                product.category
            )
        })
        .collect();
    lines.join("\n")
}

pub fn category_list(categories: &[String]) -> String {
    if categories.is_empty() {
        return "No categories found".to_owned();
    }
    categories
        .iter()
        .map(|category| format!("  {category}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn product_detail(product: &Product) -> String {
    format!(
        "{}\n{}  [{}]\nRating: {:.1} ({} ratings)\n\n{}",
        product.title,
        product.price,
        product.category,
        product.rating.rate,
        product.rating.count,
        product.description
    )
}

/// Renders the cart the way the cart screen does: a loading line until the
/// first snapshot lands, an empty-cart line, or one line per item plus the
/// total.
pub fn cart(state: &CartState) -> String {
    if state.loading {
        return "Loading cart...".to_owned();
    }
    if state.cart.is_empty() {
        return "Your cart is empty".to_owned();
    }
    let mut lines: Vec<String> = state
        .cart
        .items
        .values()
        .map(|item| {
            format!(
                "{:>4}  {}  {} x {} = {}",
                item.id.to_string(),
                item.title,
                item.price,
                item.quantity,
                item.line_total()
            )
        })
        .collect();
    lines.push(format!("Total: {}", state.cart.subtotal()));
    lines.join("\n")
}

/// Writes a line to stdout.
pub fn emit(text: &str) -> io::Result<()> {
    let mut out = io::stdout().lock();
    writeln!(out, "{text}")
}

/// Writes a prompt without a trailing newline and flushes.
pub fn prompt(label: &str) -> io::Result<()> {
    let mut out = io::stdout().lock();
    write!(out, "{label}")?;
    out.flush()
}
