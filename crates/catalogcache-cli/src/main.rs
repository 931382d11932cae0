//! catalogcache - sync and inspect the product catalog from the command line.
//!
//! The catalog is synced into a local store so every listing also works
//! offline. Favorites and the cart live in the same store.

use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use catalogcache_core::utils::{format_date, format_price, truncate};
use catalogcache_core::{
    ApiClient, CatalogOrchestrator, CatalogStore, Config, ImageCache, Product, ProductFilter,
    SortOption,
};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ============================================================================
// Constants
// ============================================================================

/// Column width for product names in listings
const NAME_WIDTH: usize = 32;

const USAGE: &str = "\
Usage: catalogcache [OPTIONS]

Sync the product catalog and list it. Without a network connection the
last synced catalog is shown.

Options:
  --offline               Do not contact the catalog service
  --search <text>         Only products whose name contains <text>
  --brand <brand>         Only products of <brand> (repeatable)
  --sort <order>          old-to-new, new-to-old, price-high-to-low, price-low-to-high
  --favorite <id>         Toggle <id> as a favorite (repeatable)
  --add-to-cart <id>      Add one <id> to the cart (repeatable)
  --checkout              Empty the cart
  --favorites             List favorited products
  --cart                  List the cart
  --images                Probe image size for each listed product
  --dump                  Print listed products as JSON
  -h, --help              Show this help";

#[derive(Debug, Default, PartialEq, Eq)]
struct Options {
    offline: bool,
    search: Option<String>,
    brands: Vec<String>,
    sort: Option<SortOption>,
    toggle_favorites: Vec<String>,
    add_to_cart: Vec<String>,
    checkout: bool,
    favorites: bool,
    cart: bool,
    images: bool,
    dump: bool,
    help: bool,
}

impl Options {
    fn filter(&self) -> Option<ProductFilter> {
        if self.sort.is_none() && self.brands.is_empty() {
            return None;
        }
        Some(ProductFilter::new(self.sort.unwrap_or_default()).with_brands(self.brands.iter().cloned()))
    }
}

fn parse_args<I>(args: I) -> Result<Options>
where
    I: IntoIterator<Item = String>,
{
    let mut options = Options::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .with_context(|| format!("{} requires a value", name))
        };
        match arg.as_str() {
            "--offline" => options.offline = true,
            "--search" => options.search = Some(value("--search")?),
            "--brand" => options.brands.push(value("--brand")?),
            "--sort" => {
                let raw = value("--sort")?;
                options.sort = Some(raw.parse().map_err(anyhow::Error::msg)?);
            }
            "--favorite" => options.toggle_favorites.push(value("--favorite")?),
            "--add-to-cart" => options.add_to_cart.push(value("--add-to-cart")?),
            "--checkout" => options.checkout = true,
            "--favorites" => options.favorites = true,
            "--cart" => options.cart = true,
            "--images" => options.images = true,
            "--dump" => options.dump = true,
            "-h" | "--help" => options.help = true,
            other => bail!("unknown argument '{}'\n\n{}", other, USAGE),
        }
    }

    Ok(options)
}

/// Initialize the tracing subscriber: stderr plus a daily log file in `log_dir`.
fn init_tracing(log_dir: &Path) -> Result<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("catalogcache")
        .filename_suffix("log")
        .build(log_dir)
        .context("Failed to create log file appender")?;
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .with(filter)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let options = parse_args(std::env::args().skip(1))?;
    if options.help {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = Config::load()?;
    let data_dir = config.data_dir()?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;
    let _log_guard = init_tracing(&data_dir.join("logs"))?;
    info!(data_dir = %data_dir.display(), "catalogcache starting");

    let store = CatalogStore::open(data_dir.clone())?;
    let client = Arc::new(ApiClient::with_base_url(
        config.api_base_url(),
        config.request_timeout(),
    )?);
    let (catalog, mut events) = CatalogOrchestrator::new(client.clone(), store.clone());

    catalog.load_cached().await?;
    if !options.offline {
        if let Err(e) = catalog.trigger_load().await {
            warn!(error = %e, "Sync failed, using cached catalog");
            eprintln!("Sync failed: {} (showing cached catalog)", e);
        }
    }
    while let Ok(event) = events.try_recv() {
        debug!(event = ?event, "Catalog event");
    }

    for id in &options.toggle_favorites {
        let now = store.toggle_favorite(id);
        println!("{} {}", if now { "Favorited" } else { "Unfavorited" }, id);
    }
    for id in &options.add_to_cart {
        store.add_to_cart(id);
        println!("{} in cart: {}", id, store.cart_quantity(id));
    }
    if options.checkout {
        store.clear_cart();
        println!("Cart emptied");
    }

    if let Some(search) = &options.search {
        catalog.search(search);
    }
    if let Some(filter) = options.filter() {
        catalog.apply_filter(filter);
    }

    if options.cart {
        print_cart(&store);
        return Ok(());
    }

    let products = if options.favorites {
        catalog.favorited_products()
    } else {
        catalog.visible_products()
    };

    if options.dump {
        println!("{}", serde_json::to_string_pretty(&products)?);
    } else {
        print_products(&products, &store);
    }

    if options.images {
        let cache = ImageCache::with_config(client, config.image_cache_config());
        print_images(&cache, &products).await;
    }

    Ok(())
}

fn print_products(products: &[Product], store: &CatalogStore) {
    if products.is_empty() {
        println!("No products.");
        return;
    }
    for product in products {
        let marker = if store.is_favorited(&product.id) { "*" } else { " " };
        println!(
            "{} {:>4}  {:<width$}  {:<14} {:>10}  {}",
            marker,
            product.id,
            truncate(&product.name, NAME_WIDTH),
            truncate(&product.brand, 14),
            format_price(product.price_value()),
            format_date(&product.created_at),
            width = NAME_WIDTH,
        );
    }
    println!("{} products, {} in cart", products.len(), store.cart_item_count());
}

fn print_cart(store: &CatalogStore) {
    let items = store.cart_contents();
    if items.is_empty() {
        println!("Cart is empty.");
        return;
    }
    for item in &items {
        println!(
            "{:>3} x {:<width$} {:>10}",
            item.quantity,
            truncate(&item.product.name, NAME_WIDTH),
            format_price(item.line_total()),
            width = NAME_WIDTH,
        );
    }
    println!("Total: {}", format_price(store.cart_total_price()));
}

async fn print_images(cache: &ImageCache, products: &[Product]) {
    let fetches = products.iter().map(|p| cache.fetch(&p.image_url));
    let results = futures::future::join_all(fetches).await;
    for (product, result) in products.iter().zip(results) {
        match result {
            Ok(image) => println!(
                "{:>4}  {:?} {}x{}",
                product.id, image.format, image.width, image.height
            ),
            Err(e) => println!("{:>4}  {}", product.id, e),
        }
    }
}
