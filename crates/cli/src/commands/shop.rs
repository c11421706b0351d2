//! Interactive shopping session.
//!
//! Reproduces the mobile app's flow in a terminal: sign in (or register, or
//! continue as a guest), browse the catalog, and mutate a cart that syncs
//! live against the remote store. The session renders the cart whenever a
//! new snapshot lands on the watch channel, so a second session signed into
//! the same account shows changes as they happen.
//!
//! # Usage
//!
//! ```bash
//! shopez shop
//! shopez shop --guest
//! shopez shop --offline
//! ```
//!
//! # Environment Variables
//!
//! - `SHOPEZ_FIREBASE_API_KEY` - Firebase project web API key
//! - `SHOPEZ_FIREBASE_DATABASE_URL` - Realtime Database URL
//! - `SHOPEZ_CATALOG_URL` - Catalog API base URL (optional)
//! - `SHOPEZ_DATA_DIR` - Session and cart cache directory (optional)

use secrecy::ExposeSecret;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use shopez_cart::{
    CartCache, CartSyncService, DiskCartCache, MemoryCartCache, MemoryCartStore, RemoteCartStore,
};
use shopez_catalog::CatalogClient;
use shopez_core::{Email, Identity, ProductId, UserId};
use shopez_firebase::{AuthClient, AuthError, AuthSession, RtdbCartStore, RtdbClient};

use crate::config::{ConfigError, FirebaseConfig, ShopEzConfig};
use crate::render;

const MIN_PASSWORD_LENGTH: usize = 6;

/// Errors that end the shopping session.
///
/// Recoverable problems (a wrong password, a failed add, an unreachable
/// catalog) are printed and the session continues; only configuration,
/// session-storage, and terminal failures land here.
#[derive(Debug, Error)]
pub enum ShopError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The persisted session could not be read or written.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Reading from or writing to the terminal failed.
    #[error("Terminal error: {0}")]
    Io(#[from] std::io::Error),
}

type Input = Lines<BufReader<Stdin>>;

fn input() -> Input {
    BufReader::new(tokio::io::stdin()).lines()
}

async fn read_line(lines: &mut Input, label: &str) -> Result<Option<String>, ShopError> {
    render::prompt(label)?;
    Ok(lines.next_line().await?.map(|line| line.trim().to_owned()))
}

/// Start an interactive shopping session.
pub async fn run(guest: bool, offline: bool) -> Result<(), ShopError> {
    let config = ShopEzConfig::from_env()?;
    let catalog = CatalogClient::new(&config.catalog_url);
    let mut lines = input();

    if offline {
        let service = CartSyncService::new(MemoryCartStore::new(), MemoryCartCache::new());
        service
            .set_identity(Some(Identity::anonymous(UserId::new("offline"))))
            .await;
        render::emit("Offline mode: the cart lives in memory for this session only.")?;
        return repl(&service, &catalog, None, &mut lines).await;
    }

    let firebase = FirebaseConfig::from_env()?;
    let auth = AuthClient::new(firebase.api_key.expose_secret());
    let session = AuthSession::new(auth, config.data_dir.join("session.json"));

    let Some(identity) = authenticate(&session, guest, &mut lines).await? else {
        return Ok(());
    };
    render::emit(&format!("Signed in as {}", display_name(&identity)))?;

    let store = RtdbCartStore::new(RtdbClient::new(&firebase.database_url), session.clone());
    let cache = DiskCartCache::new(config.data_dir.join("carts"));
    let service = CartSyncService::new(store, cache);
    service.set_identity(Some(identity)).await;

    repl(&service, &catalog, Some(&session), &mut lines).await
}

// ============================================================================
// Sign-in flow
// ============================================================================

enum AuthStep {
    Done(Identity),
    Again,
    Quit,
}

/// Resolve an identity: resume the persisted session if one exists,
/// otherwise walk the sign-in / register / guest menu. `None` means the
/// user bailed out (end of input).
async fn authenticate(
    session: &AuthSession,
    guest: bool,
    lines: &mut Input,
) -> Result<Option<Identity>, ShopError> {
    if let Some(identity) = session.restore().await? {
        render::emit(&format!("Welcome back, {}", display_name(&identity)))?;
        return Ok(Some(identity));
    }

    if guest {
        return Ok(Some(session.sign_in_anonymously().await?));
    }

    loop {
        let Some(choice) = read_line(lines, "[1] Sign in  [2] Register  [3] Guest > ").await?
        else {
            return Ok(None);
        };
        let step = match choice.as_str() {
            "1" => credentials(session, lines, false).await?,
            "2" => credentials(session, lines, true).await?,
            "3" => match session.sign_in_anonymously().await {
                Ok(identity) => AuthStep::Done(identity),
                Err(error) => {
                    render::emit(&format!("Could not sign in as a guest: {error}"))?;
                    AuthStep::Again
                }
            },
            "" => AuthStep::Again,
            _ => {
                render::emit("Pick 1, 2, or 3")?;
                AuthStep::Again
            }
        };
        match step {
            AuthStep::Done(identity) => return Ok(Some(identity)),
            AuthStep::Again => {}
            AuthStep::Quit => return Ok(None),
        }
    }
}

async fn credentials(
    session: &AuthSession,
    lines: &mut Input,
    register: bool,
) -> Result<AuthStep, ShopError> {
    let Some(raw_email) = read_line(lines, "email> ").await? else {
        return Ok(AuthStep::Quit);
    };
    let Ok(email) = Email::parse(&raw_email) else {
        render::emit("Enter a valid email address")?;
        return Ok(AuthStep::Again);
    };

    let Some(password) = read_line(lines, "password> ").await? else {
        return Ok(AuthStep::Quit);
    };
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        render::emit("Password must be at least 6 characters")?;
        return Ok(AuthStep::Again);
    }

    let result = if register {
        session.sign_up(&email, &password).await
    } else {
        session.sign_in(&email, &password).await
    };
    match result {
        Ok(identity) => Ok(AuthStep::Done(identity)),
        Err(error) => {
            let label = if register { "Registration" } else { "Login" };
            render::emit(&format!("{label} failed: {error}"))?;
            Ok(AuthStep::Again)
        }
    }
}

fn display_name(identity: &Identity) -> String {
    identity.email.as_ref().map_or_else(
        || format!("guest {}", identity.uid),
        ToString::to_string,
    )
}

// ============================================================================
// Shopping loop
// ============================================================================

async fn repl<R, C>(
    service: &CartSyncService<R, C>,
    catalog: &CatalogClient,
    session: Option<&AuthSession>,
    lines: &mut Input,
) -> Result<(), ShopError>
where
    R: RemoteCartStore,
    C: CartCache,
{
    render::emit(render::HELP)?;
    render::emit("")?;
    render::emit(&render::cart(&service.current()))?;

    let mut state = service.state();
    loop {
        render::prompt("shopez> ")?;
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !command(line.trim(), service, catalog, session).await? {
                    break;
                }
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = state.borrow_and_update().clone();
                render::emit("")?;
                render::emit(&render::cart(&snapshot))?;
            }
        }
    }
    Ok(())
}

/// Handle one line of input. Returns `false` when the session should end.
async fn command<R, C>(
    line: &str,
    service: &CartSyncService<R, C>,
    catalog: &CatalogClient,
    session: Option<&AuthSession>,
) -> Result<bool, ShopError>
where
    R: RemoteCartStore,
    C: CartCache,
{
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return Ok(true);
    };
    let args: Vec<&str> = parts.collect();

    match verb {
        "help" => render::emit(render::HELP)?,
        "products" => {
            let result = if args.is_empty() {
                catalog.get_products().await
            } else {
                catalog.get_products_in_category(&args.join(" ")).await
            };
            match result {
                Ok(products) => render::emit(&render::product_list(&products))?,
                Err(error) => render::emit(&format!("Could not load products: {error}"))?,
            }
        }
        "categories" => match catalog.get_categories().await {
            Ok(categories) => render::emit(&render::category_list(&categories))?,
            Err(error) => render::emit(&format!("Could not load categories: {error}"))?,
        },
        "show" => match parse_id(&args) {
            Some(id) => match catalog.get_product(id).await {
                Ok(product) => render::emit(&render::product_detail(&product))?,
                Err(error) => render::emit(&format!("Could not load product: {error}"))?,
            },
            None => render::emit("Usage: show <id>")?,
        },
        "add" => {
            let Some(id) = parse_id(&args) else {
                render::emit("Usage: add <id> [qty]")?;
                return Ok(true);
            };
            let quantity = args.get(1).and_then(|raw| raw.parse::<u32>().ok()).unwrap_or(1);
            match catalog.get_product(id).await {
                Ok(product) => {
                    let title = product.title.clone();
                    match service.add_to_cart(product.to_cart_item(quantity)).await {
                        Ok(()) => render::emit(&format!("Added {title}"))?,
                        Err(error) => render::emit(&format!("Could not add {title}: {error}"))?,
                    }
                }
                Err(error) => render::emit(&format!("Could not load product: {error}"))?,
            }
        }
        "qty" => {
            let parsed = (
                parse_id(&args),
                args.get(1).and_then(|raw| raw.parse::<i64>().ok()),
            );
            let (Some(id), Some(quantity)) = parsed else {
                render::emit("Usage: qty <id> <n>")?;
                return Ok(true);
            };
            if let Err(error) = service.update_quantity(id, quantity).await {
                render::emit(&format!("Could not update the quantity: {error}"))?;
            }
        }
        "remove" => match parse_id(&args) {
            Some(id) => {
                if let Err(error) = service.remove_item(id).await {
                    render::emit(&format!("Could not remove the item: {error}"))?;
                }
            }
            None => render::emit("Usage: remove <id>")?,
        },
        "clear" => {
            if let Err(error) = service.clear_cart().await {
                render::emit(&format!("Could not clear the cart: {error}"))?;
            }
        }
        "cart" => render::emit(&render::cart(&service.current()))?,
        "whoami" => {
            let name = match session {
                Some(session) => session
                    .identity()
                    .await
                    .map_or_else(|| "not signed in".to_owned(), |id| display_name(&id)),
                None => "guest (offline)".to_owned(),
            };
            render::emit(&name)?;
        }
        "signout" => {
            if let Some(session) = session {
                service.set_identity(None).await;
                if let Err(error) = session.sign_out().await {
                    render::emit(&format!("Sign out failed: {error}"))?;
                }
                render::emit("Signed out")?;
            } else {
                render::emit("Offline session, nothing to sign out of")?;
            }
            return Ok(false);
        }
        "quit" | "exit" => return Ok(false),
        _ => render::emit("Unknown command; try 'help'")?,
    }
    Ok(true)
}

fn parse_id(args: &[&str]) -> Option<ProductId> {
    args.first()
        .and_then(|raw| raw.parse::<u32>().ok())
        .map(ProductId::new)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_id_reads_the_first_argument() {
        assert_eq!(parse_id(&["7", "2"]), Some(ProductId::new(7)));
        assert_eq!(parse_id(&["x"]), None);
        assert_eq!(parse_id(&[]), None);
    }

    #[test]
    fn display_name_prefers_the_email() {
        let account = Identity::account(
            UserId::new("u1"),
            Email::parse("ada@example.com").unwrap(),
        );
        assert_eq!(display_name(&account), "ada@example.com");

        let guest = Identity::anonymous(UserId::new("anon-42"));
        assert_eq!(display_name(&guest), "guest anon-42");
    }
}
