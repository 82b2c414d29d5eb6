use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;

use vendedor_core::domain::cart::{Cart, NewCartItem};
use vendedor_core::domain::customer::CustomerId;
use vendedor_core::domain::product::ProductId;
use vendedor_core::errors::ApplicationError;

use crate::repositories::{DocumentStore, Namespace, RepositoryError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CartSummary {
    pub item_count: u32,
    pub total: Decimal,
    pub discount_pct: u8,
    pub final_total: Decimal,
    pub last_updated: DateTime<Utc>,
}

pub struct CartManager {
    store: Arc<dyn DocumentStore>,
}

impl CartManager {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    async fn read(&self, customer_id: &CustomerId) -> Result<Option<Cart>, RepositoryError> {
        let document = self.store.get(Namespace::Carts, customer_id.as_str()).await?;
        document.map(serde_json::from_value).transpose().map_err(RepositoryError::from)
    }

    pub async fn save(&self, cart: &Cart) -> Result<(), RepositoryError> {
        let document = serde_json::to_value(cart)?;
        self.store.put(Namespace::Carts, cart.customer_id.as_str(), &document).await
    }

    pub async fn get_cart(&self, customer_id: &CustomerId) -> Cart {
        self.get_cart_at(customer_id, Utc::now()).await
    }

    /// Missing or unreadable carts come back empty.
    pub async fn get_cart_at(&self, customer_id: &CustomerId, now: DateTime<Utc>) -> Cart {
        match self.read(customer_id).await {
            Ok(Some(cart)) => cart,
            Ok(None) => Cart::empty(customer_id.clone(), now),
            Err(error) => {
                warn!(
                    event_name = "store.cart.read_failed",
                    customer_id = %customer_id,
                    error = %error,
                    "cart document unreadable, using empty cart"
                );
                Cart::empty(customer_id.clone(), now)
            }
        }
    }

    pub async fn add_item(
        &self,
        customer_id: &CustomerId,
        item: NewCartItem,
    ) -> Result<Cart, ApplicationError> {
        self.add_item_at(customer_id, item, Utc::now()).await
    }

    pub async fn add_item_at(
        &self,
        customer_id: &CustomerId,
        item: NewCartItem,
        now: DateTime<Utc>,
    ) -> Result<Cart, ApplicationError> {
        let mut cart = self.get_cart_at(customer_id, now).await;
        cart.add_item(item, now)?;
        self.save(&cart).await?;
        Ok(cart)
    }

    pub async fn update_quantity(
        &self,
        customer_id: &CustomerId,
        product_id: &ProductId,
        size: Option<&str>,
        quantity: i64,
    ) -> Result<Cart, ApplicationError> {
        self.update_quantity_at(customer_id, product_id, size, quantity, Utc::now()).await
    }

    /// A quantity of zero or less removes the line; unknown lines leave the cart untouched.
    pub async fn update_quantity_at(
        &self,
        customer_id: &CustomerId,
        product_id: &ProductId,
        size: Option<&str>,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> Result<Cart, ApplicationError> {
        let mut cart = self.get_cart_at(customer_id, now).await;
        if cart.update_quantity(product_id, size, quantity, now) {
            self.save(&cart).await?;
        }
        Ok(cart)
    }

    pub async fn remove_item(
        &self,
        customer_id: &CustomerId,
        product_id: &ProductId,
        size: Option<&str>,
    ) -> Result<Cart, ApplicationError> {
        let now = Utc::now();
        let mut cart = self.get_cart_at(customer_id, now).await;
        if cart.remove_item(product_id, size, now) {
            self.save(&cart).await?;
        }
        Ok(cart)
    }

    pub async fn clear_cart(&self, customer_id: &CustomerId) -> Result<Cart, ApplicationError> {
        self.clear_cart_at(customer_id, Utc::now()).await
    }

    pub async fn clear_cart_at(
        &self,
        customer_id: &CustomerId,
        now: DateTime<Utc>,
    ) -> Result<Cart, ApplicationError> {
        let cart = Cart::empty(customer_id.clone(), now);
        self.save(&cart).await?;
        Ok(cart)
    }

    pub async fn apply_discount(
        &self,
        customer_id: &CustomerId,
        discount_pct: u8,
    ) -> Result<Cart, ApplicationError> {
        self.apply_discount_at(customer_id, discount_pct, Utc::now()).await
    }

    pub async fn apply_discount_at(
        &self,
        customer_id: &CustomerId,
        discount_pct: u8,
        now: DateTime<Utc>,
    ) -> Result<Cart, ApplicationError> {
        let mut cart = self.get_cart_at(customer_id, now).await;
        cart.set_discount(discount_pct, now)?;
        self.save(&cart).await?;
        Ok(cart)
    }

    pub async fn remove_discount(&self, customer_id: &CustomerId) -> Result<Cart, ApplicationError> {
        self.apply_discount(customer_id, 0).await
    }

    pub async fn summary(&self, customer_id: &CustomerId) -> CartSummary {
        let cart = self.get_cart(customer_id).await;
        CartSummary {
            item_count: cart.item_count(),
            total: cart.total,
            discount_pct: cart.discount_pct,
            final_total: cart.final_total,
            last_updated: cart.last_updated,
        }
    }

    pub async fn is_empty(&self, customer_id: &CustomerId) -> bool {
        self.get_cart(customer_id).await.is_empty()
    }

    pub async fn cart_total(&self, customer_id: &CustomerId) -> Decimal {
        self.get_cart(customer_id).await.final_total
    }

    pub async fn cart_age_hours_at(&self, customer_id: &CustomerId, now: DateTime<Utc>) -> f64 {
        self.get_cart_at(customer_id, now).await.age_hours(now)
    }

    pub async fn abandoned_carts(&self, threshold: Duration) -> Result<Vec<Cart>, RepositoryError> {
        self.abandoned_carts_at(threshold, Utc::now()).await
    }

    /// Scans every persisted cart; non-empty carts idle for at least `threshold` qualify.
    pub async fn abandoned_carts_at(
        &self,
        threshold: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<Cart>, RepositoryError> {
        let mut keys = self.store.keys(Namespace::Carts).await?;
        keys.sort();

        let mut abandoned = Vec::new();
        for key in keys {
            let customer_id = CustomerId(key);
            match self.read(&customer_id).await {
                Ok(Some(cart)) if cart.is_abandoned(now, threshold) => abandoned.push(cart),
                Ok(_) => {}
                Err(error) => warn!(
                    event_name = "store.cart.scan_skipped",
                    customer_id = %customer_id,
                    error = %error,
                    "skipping unreadable cart during abandoned-cart scan"
                ),
            }
        }
        Ok(abandoned)
    }
}

/// Customer-facing cart listing.
pub fn render(cart: &Cart) -> String {
    if cart.is_empty() {
        return "🛒 *Seu carrinho está vazio*\n\nAdicione produtos para começar suas compras! 🙏"
            .to_string();
    }

    let mut message = String::from("🛒 *Seu Carrinho*\n\n");
    for (index, item) in cart.items.iter().enumerate() {
        let size = item.size.as_deref().map(|size| format!(" ({size})")).unwrap_or_default();
        let _ = writeln!(message, "{}. *{}*{size}", index + 1, item.name);
        let _ = writeln!(
            message,
            "   💰 R$ {:.2} x {} = R$ {:.2}\n",
            item.price,
            item.quantity,
            item.line_total()
        );
    }

    message.push_str("📊 *Resumo:*\n");
    let _ = writeln!(message, "Subtotal: R$ {:.2}", cart.total);
    if cart.discount_pct > 0 {
        let _ = writeln!(
            message,
            "Desconto ({}%): -R$ {:.2}",
            cart.discount_pct,
            cart.discount_amount()
        );
    }
    let _ = writeln!(message, "*Total: R$ {:.2}*\n", cart.final_total);
    message.push_str("💡 *Comandos:*\n");
    message.push_str("• \"finalizar\" - Finalizar compra\n");
    message.push_str("• \"limpar\" - Limpar carrinho\n");
    message.push_str("• \"produtos\" - Ver catálogo\n");
    message
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use serde_json::json;

    use vendedor_core::domain::cart::NewCartItem;
    use vendedor_core::domain::customer::CustomerId;
    use vendedor_core::domain::product::ProductId;
    use vendedor_core::errors::{ApplicationError, DomainError};

    use super::{render, CartManager};
    use crate::repositories::{DocumentStore, InMemoryDocumentStore, Namespace};

    fn item(id: &str, price: i64, quantity: u32) -> NewCartItem {
        NewCartItem {
            id: ProductId(id.to_string()),
            name: format!("Produto {id}"),
            price: Decimal::new(price, 0),
            quantity,
            category: "biblia".to_string(),
            size: None,
        }
    }

    fn manager() -> (Arc<InMemoryDocumentStore>, CartManager) {
        let store = Arc::new(InMemoryDocumentStore::default());
        (store.clone(), CartManager::new(store))
    }

    #[tokio::test]
    async fn discount_scenario_persists_exact_totals() {
        let (_, carts) = manager();
        let id = CustomerId::new("u1");

        carts.add_item(&id, item("A", 100, 2)).await.expect("add");
        let cart = carts.apply_discount(&id, 15).await.expect("discount");
        assert_eq!(cart.total, Decimal::new(200, 0));
        assert_eq!(cart.final_total, Decimal::new(17000, 2));

        let reloaded = carts.get_cart(&id).await;
        assert_eq!(reloaded, cart);
        assert_eq!(carts.cart_total(&id).await, Decimal::new(170, 0));

        let cleared = carts.remove_discount(&id).await.expect("remove discount");
        assert_eq!(cleared.final_total, Decimal::new(200, 0));
    }

    #[tokio::test]
    async fn invalid_mutation_keeps_persisted_state() {
        let (_, carts) = manager();
        let id = CustomerId::new("u1");
        let before = carts.add_item(&id, item("A", 10, 1)).await.expect("add");

        let error = carts.add_item(&id, item("B", -5, 1)).await;
        assert!(matches!(error, Err(ApplicationError::Domain(DomainError::Validation(_)))));
        assert!(carts.apply_discount(&id, 120).await.is_err());

        assert_eq!(carts.get_cart(&id).await, before);
    }

    #[tokio::test]
    async fn abandoned_scan_finds_idle_non_empty_carts() {
        let (_, carts) = manager();
        let now = Utc::now();
        let three_hours_ago = now - Duration::hours(3);

        carts.add_item_at(&CustomerId::new("idle"), item("A", 10, 1), three_hours_ago).await.expect("add");
        carts.add_item_at(&CustomerId::new("busy"), item("A", 10, 1), now).await.expect("add");
        carts.clear_cart_at(&CustomerId::new("empty"), three_hours_ago).await.expect("clear");

        let abandoned = carts.abandoned_carts_at(Duration::hours(2), now).await.expect("scan");
        assert_eq!(abandoned.len(), 1);
        assert_eq!(abandoned[0].customer_id, CustomerId::new("idle"));

        carts.clear_cart(&CustomerId::new("idle")).await.expect("clear");
        assert!(carts.abandoned_carts_at(Duration::hours(2), now).await.expect("scan").is_empty());
        assert!(carts.is_empty(&CustomerId::new("idle")).await);
    }

    #[tokio::test]
    async fn unreadable_cart_is_synthesized_empty_and_skipped_by_scan() {
        let (store, carts) = manager();
        store.put(Namespace::Carts, "broken", &json!({ "items": "nope" })).await.expect("put");

        assert!(carts.get_cart(&CustomerId::new("broken")).await.is_empty());
        let abandoned = carts.abandoned_carts(Duration::hours(0)).await.expect("scan");
        assert!(abandoned.is_empty());
    }

    #[tokio::test]
    async fn quantity_updates_and_summary() {
        let (_, carts) = manager();
        let id = CustomerId::new("u1");
        let now = Utc::now();
        carts.add_item_at(&id, item("A", 10, 1), now - Duration::hours(5)).await.expect("add");
        carts.add_item_at(&id, item("B", 3, 2), now).await.expect("add");

        carts.update_quantity(&id, &ProductId("A".to_string()), None, 4).await.expect("update");
        let summary = carts.summary(&id).await;
        assert_eq!(summary.item_count, 6);
        assert_eq!(summary.total, Decimal::new(46, 0));

        let age = carts.cart_age_hours_at(&id, now).await;
        assert!((age - 5.0).abs() < 1e-6);

        let cart = carts.remove_item(&id, &ProductId("A".to_string()), None).await.expect("remove");
        assert_eq!(cart.items.len(), 1);
        let cart =
            carts.update_quantity(&id, &ProductId("B".to_string()), None, 0).await.expect("update");
        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn render_lists_lines_and_discount() {
        let (_, carts) = manager();
        let id = CustomerId::new("u1");
        let mut shirt = item("camiseta-fe-m", 39, 2);
        shirt.size = Some("M".to_string());
        carts.add_item(&id, shirt).await.expect("add");
        let cart = carts.apply_discount(&id, 10).await.expect("discount");

        let text = render(&cart);
        assert!(text.contains("1. *Produto camiseta-fe-m* (M)"));
        assert!(text.contains("R$ 39.00 x 2 = R$ 78.00"));
        assert!(text.contains("Desconto (10%): -R$ 7.80"));
        assert!(text.contains("*Total: R$ 70.20*"));

        let empty = render(&carts.clear_cart(&id).await.expect("clear"));
        assert!(empty.contains("vazio"));
    }
}
