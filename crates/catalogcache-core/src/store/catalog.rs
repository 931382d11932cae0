use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::models::{CartItem, CartLine, FavoriteMark, Product};
use crate::utils::lock::{MutexExt, RwLockExt};

use super::persist::{Backing, Table};
use super::StoreError;

/// Products in catalog order with an id index.
/// Known ids keep their position on upsert; new ids are appended.
#[derive(Debug, Clone, Default)]
struct ProductTable {
    rows: Vec<Product>,
    index: HashMap<String, usize>,
}

impl ProductTable {
    fn from_rows(rows: Vec<Product>) -> Self {
        let mut table = Self::default();
        for product in rows {
            table.upsert(product);
        }
        table
    }

    fn get(&self, id: &str) -> Option<&Product> {
        self.index.get(id).and_then(|&i| self.rows.get(i))
    }

    fn upsert(&mut self, product: Product) {
        match self.index.get(&product.id).copied() {
            Some(i) => {
                if let Some(slot) = self.rows.get_mut(i) {
                    *slot = product;
                }
            }
            None => {
                self.index.insert(product.id.clone(), self.rows.len());
                self.rows.push(product);
            }
        }
    }
}

/// Committed state. Tables sit behind `Arc` so snapshots are cheap and a
/// write only copies the table it touches.
#[derive(Debug, Clone, Default)]
struct Tables {
    products: Arc<ProductTable>,
    favorites: Arc<HashMap<String, FavoriteMark>>,
    cart: Arc<HashMap<String, CartLine>>,
    last_stamp: Option<DateTime<Utc>>,
}

impl Tables {
    fn favorites_newest_first(&self) -> Vec<&FavoriteMark> {
        let mut marks: Vec<&FavoriteMark> = self.favorites.values().collect();
        marks.sort_by(|a, b| {
            b.added_at
                .cmp(&a.added_at)
                .then_with(|| a.product_id.cmp(&b.product_id))
        });
        marks
    }

    fn cart_newest_first(&self) -> Vec<&CartLine> {
        let mut lines: Vec<&CartLine> = self.cart.values().collect();
        lines.sort_by(|a, b| {
            b.added_at
                .cmp(&a.added_at)
                .then_with(|| a.product_id.cmp(&b.product_id))
        });
        lines
    }
}

/// Strictly increasing insertion timestamps, even if the clock stalls or steps back.
fn next_stamp(last: &mut Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    let stamp = match *last {
        Some(prev) if now <= prev => prev + Duration::microseconds(1),
        _ => now,
    };
    *last = Some(stamp);
    stamp
}

struct Inner {
    backing: Backing,
    tables: RwLock<Tables>,
    /// Held by a writer across compute and commit. `tables` is only
    /// write-locked for the final swap, so readers never wait on disk I/O.
    writer: Mutex<()>,
}

/// Catalog snapshot plus favorites and cart.
///
/// Clone is cheap and every clone shares the same tables. Mutations are
/// serialized by a writer lock held across compute and commit; reads work
/// on a consistent snapshot and proceed while a commit is on disk. I/O failures never escape: reads degrade to
/// empty results and failed writes are logged and leave state untouched.
#[derive(Clone)]
pub struct CatalogStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CatalogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogStore")
            .field("backing", &self.inner.backing)
            .finish_non_exhaustive()
    }
}

impl CatalogStore {
    /// Open (or create) a file-backed store in `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let backing = Backing::disk(dir.into())?;
        Ok(Self::with_backing(backing))
    }

    /// A store that keeps everything in memory for the session.
    pub fn in_memory() -> Self {
        Self::with_backing(Backing::Memory)
    }

    fn with_backing(backing: Backing) -> Self {
        let products = ProductTable::from_rows(backing.load(Table::Products));
        let favorites: HashMap<String, FavoriteMark> = backing
            .load::<FavoriteMark>(Table::Favorites)
            .into_iter()
            .map(|mark| (mark.product_id.clone(), mark))
            .collect();
        let cart: HashMap<String, CartLine> = backing
            .load::<CartLine>(Table::Cart)
            .into_iter()
            .filter(|line| line.quantity > 0)
            .map(|line| (line.product_id.clone(), line))
            .collect();

        let last_stamp = favorites
            .values()
            .map(|m| m.added_at)
            .chain(cart.values().map(|l| l.added_at))
            .max();

        debug!(
            products = products.rows.len(),
            favorites = favorites.len(),
            cart_lines = cart.len(),
            "Catalog store opened"
        );

        Self {
            inner: Arc::new(Inner {
                backing,
                tables: RwLock::new(Tables {
                    products: Arc::new(products),
                    favorites: Arc::new(favorites),
                    cart: Arc::new(cart),
                    last_stamp,
                }),
                writer: Mutex::new(()),
            }),
        }
    }

    fn snapshot(&self, op: &'static str) -> Tables {
        self.inner.tables.read_or_recover(op).clone()
    }

    /// Apply `f` to a draft of the tables and commit `table` if it reports a change.
    /// Returns true only when the change was committed.
    fn write<F>(&self, op: &'static str, table: Table, f: F) -> bool
    where
        F: FnOnce(&mut Tables) -> bool,
    {
        let _writer = self.inner.writer.lock_or_recover(op);
        let mut draft = self.snapshot(op);
        if !f(&mut draft) {
            return false;
        }

        let committed = match table {
            Table::Products => self.inner.backing.commit(table, &draft.products.rows),
            Table::Favorites => {
                let rows: Vec<&FavoriteMark> = draft.favorites_newest_first();
                self.inner.backing.commit(table, &rows)
            }
            Table::Cart => {
                let rows: Vec<&CartLine> = draft.cart_newest_first();
                self.inner.backing.commit(table, &rows)
            }
        };

        match committed {
            Ok(()) => {
                *self.inner.tables.write_or_recover(op) = draft;
                true
            }
            Err(e) => {
                warn!(op, table = table.name(), error = %e, "Store write dropped");
                false
            }
        }
    }

    /// Run `f` against this store on the blocking pool.
    pub async fn with_blocking<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&CatalogStore) -> R + Send + 'static,
        R: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| StoreError::Worker(e.to_string()))
    }

    // ===== Products =====

    /// Merge a fetched batch into the catalog in a single commit.
    /// Products missing from the batch are kept.
    pub fn upsert_products(&self, products: &[Product]) {
        if products.is_empty() {
            return;
        }
        let committed = self.write("upsert_products", Table::Products, |t| {
            let table = Arc::make_mut(&mut t.products);
            for product in products {
                table.upsert(product.clone());
            }
            true
        });
        if committed {
            debug!(count = products.len(), "Products upserted");
        }
    }

    /// All known products in catalog order.
    pub fn all_products(&self) -> Vec<Product> {
        self.snapshot("all_products").products.rows.clone()
    }

    pub fn product_by_id(&self, id: &str) -> Option<Product> {
        self.snapshot("product_by_id").products.get(id).cloned()
    }

    // ===== Favorites =====

    pub fn is_favorited(&self, id: &str) -> bool {
        self.snapshot("is_favorited").favorites.contains_key(id)
    }

    pub fn add_favorite(&self, id: &str) {
        self.write("add_favorite", Table::Favorites, |t| {
            if t.favorites.contains_key(id) {
                return false;
            }
            let added_at = next_stamp(&mut t.last_stamp);
            Arc::make_mut(&mut t.favorites).insert(
                id.to_string(),
                FavoriteMark {
                    product_id: id.to_string(),
                    added_at,
                },
            );
            true
        });
    }

    pub fn remove_favorite(&self, id: &str) {
        self.write("remove_favorite", Table::Favorites, |t| {
            if !t.favorites.contains_key(id) {
                return false;
            }
            Arc::make_mut(&mut t.favorites).remove(id);
            true
        });
    }

    /// Flip the favorite mark and return the resulting state.
    pub fn toggle_favorite(&self, id: &str) -> bool {
        let mut favorited = false;
        let committed = self.write("toggle_favorite", Table::Favorites, |t| {
            if Arc::make_mut(&mut t.favorites).remove(id).is_none() {
                let added_at = next_stamp(&mut t.last_stamp);
                Arc::make_mut(&mut t.favorites).insert(
                    id.to_string(),
                    FavoriteMark {
                        product_id: id.to_string(),
                        added_at,
                    },
                );
                favorited = true;
            }
            true
        });
        if committed {
            favorited
        } else {
            self.is_favorited(id)
        }
    }

    /// Favorited products, most recently favorited first.
    /// Marks whose product is not in the catalog are skipped.
    pub fn favorited_products(&self) -> Vec<Product> {
        let tables = self.snapshot("favorited_products");
        tables
            .favorites_newest_first()
            .into_iter()
            .filter_map(|mark| tables.products.get(&mark.product_id).cloned())
            .collect()
    }

    /// Favorited ids, most recently favorited first.
    pub fn favorite_ids(&self) -> Vec<String> {
        self.snapshot("favorite_ids")
            .favorites_newest_first()
            .into_iter()
            .map(|mark| mark.product_id.clone())
            .collect()
    }

    /// The favorited members of `products`, in the order given.
    pub fn favorited_subset(&self, products: &[Product]) -> Vec<Product> {
        let tables = self.snapshot("favorited_subset");
        let ids: HashSet<&str> = tables.favorites.keys().map(String::as_str).collect();
        products
            .iter()
            .filter(|p| ids.contains(p.id.as_str()))
            .cloned()
            .collect()
    }

    // ===== Cart =====

    pub fn cart_quantity(&self, id: &str) -> u32 {
        self.snapshot("cart_quantity")
            .cart
            .get(id)
            .map(|line| line.quantity)
            .unwrap_or(0)
    }

    pub fn add_to_cart(&self, id: &str) {
        self.write("add_to_cart", Table::Cart, |t| {
            let added_at = next_stamp(&mut t.last_stamp);
            let cart = Arc::make_mut(&mut t.cart);
            match cart.get_mut(id) {
                Some(line) => line.quantity = line.quantity.saturating_add(1),
                None => {
                    cart.insert(
                        id.to_string(),
                        CartLine {
                            product_id: id.to_string(),
                            quantity: 1,
                            added_at,
                        },
                    );
                }
            }
            true
        });
    }

    /// Take one off the line, deleting it when it would reach zero.
    pub fn decrement_cart(&self, id: &str) {
        self.write("decrement_cart", Table::Cart, |t| {
            let Some(quantity) = t.cart.get(id).map(|line| line.quantity) else {
                return false;
            };
            let cart = Arc::make_mut(&mut t.cart);
            if quantity <= 1 {
                cart.remove(id);
            } else if let Some(line) = cart.get_mut(id) {
                line.quantity = quantity - 1;
            }
            true
        });
    }

    pub fn remove_from_cart(&self, id: &str) {
        self.write("remove_from_cart", Table::Cart, |t| {
            if !t.cart.contains_key(id) {
                return false;
            }
            Arc::make_mut(&mut t.cart).remove(id);
            true
        });
    }

    /// Set the quantity for a product. Negative values are ignored, zero
    /// removes the line, and an existing line keeps its `added_at`.
    pub fn set_cart_quantity(&self, id: &str, quantity: i64) {
        let Ok(quantity) = u32::try_from(quantity) else {
            debug!(product_id = id, quantity, "Rejected cart quantity");
            return;
        };

        self.write("set_cart_quantity", Table::Cart, |t| {
            if quantity == 0 {
                if !t.cart.contains_key(id) {
                    return false;
                }
                Arc::make_mut(&mut t.cart).remove(id);
                return true;
            }

            if t.cart.get(id).map(|line| line.quantity) == Some(quantity) {
                return false;
            }
            let added_at = next_stamp(&mut t.last_stamp);
            let cart = Arc::make_mut(&mut t.cart);
            match cart.get_mut(id) {
                Some(line) => line.quantity = quantity,
                None => {
                    cart.insert(
                        id.to_string(),
                        CartLine {
                            product_id: id.to_string(),
                            quantity,
                            added_at,
                        },
                    );
                }
            }
            true
        });
    }

    /// Raw cart rows, newest line first.
    pub fn cart_lines(&self) -> Vec<CartLine> {
        self.snapshot("cart_lines")
            .cart_newest_first()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Cart lines joined with their products, newest line first.
    /// Lines whose product is not in the catalog are skipped.
    pub fn cart_contents(&self) -> Vec<CartItem> {
        let tables = self.snapshot("cart_contents");
        tables
            .cart_newest_first()
            .into_iter()
            .filter_map(|line| {
                tables.products.get(&line.product_id).map(|product| CartItem {
                    product: product.clone(),
                    quantity: line.quantity,
                    added_at: line.added_at,
                })
            })
            .collect()
    }

    /// Total number of units across all lines.
    pub fn cart_item_count(&self) -> u32 {
        self.snapshot("cart_item_count")
            .cart
            .values()
            .fold(0u32, |sum, line| sum.saturating_add(line.quantity))
    }

    pub fn cart_total_price(&self) -> Decimal {
        self.cart_contents().iter().map(CartItem::line_total).sum()
    }

    /// Empty the cart in one commit.
    pub fn clear_cart(&self) {
        let committed = self.write("clear_cart", Table::Cart, |t| {
            if t.cart.is_empty() {
                return false;
            }
            t.cart = Arc::new(HashMap::new());
            true
        });
        if committed {
            debug!("Cart cleared");
        }
    }
}
