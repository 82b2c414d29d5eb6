use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::customer::CustomerId;
use crate::domain::product::ProductId;
use crate::errors::DomainError;

/// A line as requested by a caller; `added_at` is stamped on insertion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCartItem {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub quantity: u32,
    pub category: String,
    pub size: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub quantity: u32,
    pub category: String,
    pub size: Option<String>,
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }

    fn matches(&self, id: &ProductId, size: Option<&str>) -> bool {
        &self.id == id && self.size.as_deref() == size
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub customer_id: CustomerId,
    pub items: Vec<CartItem>,
    pub total: Decimal,
    pub discount_pct: u8,
    pub final_total: Decimal,
    pub last_updated: DateTime<Utc>,
}

impl Cart {
    pub fn empty(customer_id: CustomerId, now: DateTime<Utc>) -> Self {
        Self {
            customer_id,
            items: Vec::new(),
            total: Decimal::ZERO,
            discount_pct: 0,
            final_total: Decimal::ZERO,
            last_updated: now,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    pub fn discount_amount(&self) -> Decimal {
        self.total - self.final_total
    }

    /// Merges into an existing `(id, size)` line or appends a new one.
    pub fn add_item(&mut self, item: NewCartItem, now: DateTime<Utc>) -> Result<(), DomainError> {
        if item.price < Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "price for `{}` must not be negative",
                item.id.0
            )));
        }
        if item.quantity == 0 {
            return Err(DomainError::validation(format!(
                "quantity for `{}` must be at least 1",
                item.id.0
            )));
        }

        match self.items.iter_mut().find(|line| line.matches(&item.id, item.size.as_deref())) {
            Some(line) => line.quantity = line.quantity.saturating_add(item.quantity),
            None => self.items.push(CartItem {
                id: item.id,
                name: item.name,
                price: item.price,
                quantity: item.quantity,
                category: item.category,
                size: item.size,
                added_at: now,
            }),
        }

        self.recalculate(now);
        Ok(())
    }

    /// Returns false when no line matched. A quantity of zero or less removes the line.
    pub fn update_quantity(
        &mut self,
        id: &ProductId,
        size: Option<&str>,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(index) = self.items.iter().position(|line| line.matches(id, size)) else {
            return false;
        };

        if quantity <= 0 {
            self.items.remove(index);
        } else {
            self.items[index].quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        }
        self.recalculate(now);
        true
    }

    pub fn remove_item(&mut self, id: &ProductId, size: Option<&str>, now: DateTime<Utc>) -> bool {
        let Some(index) = self.items.iter().position(|line| line.matches(id, size)) else {
            return false;
        };
        self.items.remove(index);
        self.recalculate(now);
        true
    }

    pub fn set_discount(&mut self, discount_pct: u8, now: DateTime<Utc>) -> Result<(), DomainError> {
        if discount_pct > 100 {
            return Err(DomainError::validation(format!(
                "discount {discount_pct}% is outside 0..=100"
            )));
        }
        self.discount_pct = discount_pct;
        self.recalculate(now);
        Ok(())
    }

    pub fn recalculate(&mut self, now: DateTime<Utc>) {
        self.total = self.items.iter().map(CartItem::line_total).sum();
        self.final_total = final_total_for(self.total, self.discount_pct);
        self.last_updated = now;
    }

    /// `final_total` derived from `items` and `discount_pct` alone.
    pub fn recomputed_final_total(&self) -> Decimal {
        let total = self.items.iter().map(CartItem::line_total).sum();
        final_total_for(total, self.discount_pct)
    }

    /// Hours since the oldest line was added; zero for an empty cart.
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        self.items
            .iter()
            .map(|item| item.added_at)
            .min()
            .map(|oldest| hours_between(oldest, now))
            .unwrap_or(0.0)
    }

    pub fn hours_since_update(&self, now: DateTime<Utc>) -> f64 {
        hours_between(self.last_updated, now)
    }

    pub fn is_abandoned(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        !self.is_empty() && now - self.last_updated >= threshold
    }
}

fn final_total_for(total: Decimal, discount_pct: u8) -> Decimal {
    total * (Decimal::ONE_HUNDRED - Decimal::from(discount_pct)) / Decimal::ONE_HUNDRED
}

fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 3_600_000.0
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use super::{Cart, NewCartItem};
    use crate::domain::customer::CustomerId;
    use crate::domain::product::ProductId;
    use crate::errors::DomainError;

    fn item(id: &str, price: i64, quantity: u32, size: Option<&str>) -> NewCartItem {
        NewCartItem {
            id: ProductId(id.to_owned()),
            name: id.to_owned(),
            price: Decimal::new(price, 0),
            quantity,
            category: "biblia".to_owned(),
            size: size.map(str::to_owned),
        }
    }

    fn cart() -> Cart {
        Cart::empty(CustomerId::new("u1"), Utc::now())
    }

    #[test]
    fn totals_follow_discount() {
        let now = Utc::now();
        let mut cart = cart();
        cart.add_item(item("A", 100, 2, None), now).expect("add");
        cart.set_discount(15, now).expect("discount");

        assert_eq!(cart.total, Decimal::new(200, 0));
        assert_eq!(cart.final_total, Decimal::new(17000, 2));
        assert_eq!(cart.discount_amount(), Decimal::new(30, 0));
    }

    #[test]
    fn merges_lines_sharing_id_and_size() {
        let now = Utc::now();
        let mut cart = cart();
        cart.add_item(item("shirt", 39, 1, Some("M")), now).expect("add");
        cart.add_item(item("shirt", 39, 2, Some("M")), now).expect("add");
        cart.add_item(item("shirt", 39, 1, Some("G")), now).expect("add");

        assert_eq!(cart.items.len(), 2);
        assert_eq!(cart.items[0].quantity, 3);
        assert_eq!(cart.items[1].size.as_deref(), Some("G"));
        assert_eq!(cart.item_count(), 4);
    }

    #[test]
    fn update_to_zero_or_less_removes_line() {
        let now = Utc::now();
        let mut cart = cart();
        cart.add_item(item("A", 10, 1, None), now).expect("add");
        cart.add_item(item("B", 5, 1, None), now).expect("add");

        assert!(cart.update_quantity(&ProductId("A".to_owned()), None, -3, now));
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.total, Decimal::new(5, 0));
        assert!(!cart.update_quantity(&ProductId("missing".to_owned()), None, 2, now));
    }

    #[test]
    fn rejects_invalid_lines_and_keeps_prior_state() {
        let now = Utc::now();
        let mut cart = cart();
        cart.add_item(item("A", 10, 1, None), now).expect("add");
        let before = cart.clone();

        let negative = cart.add_item(item("B", -1, 1, None), now);
        assert!(matches!(negative, Err(DomainError::Validation(_))));
        let zero = cart.add_item(item("C", 1, 0, None), now);
        assert!(matches!(zero, Err(DomainError::Validation(_))));
        assert!(cart.set_discount(101, now).is_err());

        assert_eq!(cart, before);
    }

    #[test]
    fn incremental_totals_match_recomputation_across_mutations() {
        let now = Utc::now();
        let mut cart = cart();
        cart.add_item(item("A", 89, 2, None), now).expect("add");
        cart.set_discount(35, now).expect("discount");
        cart.add_item(item("B", 39, 3, Some("P")), now).expect("add");
        cart.update_quantity(&ProductId("A".to_owned()), None, 5, now);
        cart.add_item(item("C", 67, 1, None), now).expect("add");
        cart.remove_item(&ProductId("B".to_owned()), Some("P"), now);
        cart.set_discount(7, now).expect("discount");

        assert_eq!(cart.final_total, cart.recomputed_final_total());
    }

    #[test]
    fn abandonment_requires_items_and_idle_time() {
        let now = Utc::now();
        let mut cart = cart();
        assert!(!cart.is_abandoned(now + Duration::hours(5), Duration::hours(2)));

        cart.add_item(item("A", 10, 1, None), now - Duration::hours(3)).expect("add");
        assert!(cart.is_abandoned(now, Duration::hours(2)));
        assert!(!cart.is_abandoned(now, Duration::hours(4)));
        assert!((cart.age_hours(now) - 3.0).abs() < 1e-9);
    }
}
