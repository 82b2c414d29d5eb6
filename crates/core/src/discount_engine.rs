//! Discount quotes derived from profile, calendar, and cart state.
//!
//! Every entry point returns an independent [`DiscountQuote`]; quotes are
//! never summed together.

use chrono::{DateTime, Datelike, Duration, Utc};
use rust_decimal::Decimal;

use crate::domain::cart::CartItem;
use crate::domain::customer::CustomerProfile;
use crate::domain::discount::{AppliedDiscount, DiscountQuote};
use crate::domain::segment::Segment;

const HIGH_CONFIDENCE_BONUS: u32 = 5;
const FIRST_PURCHASE_BONUS: u32 = 15;
const HOLIDAY_BONUS: u32 = 20;
const ANNIVERSARY_BONUS: u32 = 15;
const ABANDONED_CART_BASE: u32 = 15;
const RECOMMENDED_CAP: u32 = 35;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiscountPolicy {
    pub max_discount_pct: u8,
    pub max_abandoned_cart_pct: u8,
    pub quote_validity: Duration,
    pub abandoned_cart_validity: Duration,
    pub bulk_validity: Duration,
}

impl Default for DiscountPolicy {
    fn default() -> Self {
        Self {
            max_discount_pct: 40,
            max_abandoned_cart_pct: 30,
            quote_validity: Duration::days(7),
            abandoned_cart_validity: Duration::hours(24),
            bulk_validity: Duration::days(30),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct DiscountEngine {
    policy: DiscountPolicy,
}

impl DiscountEngine {
    pub fn new(policy: DiscountPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &DiscountPolicy {
        &self.policy
    }

    pub fn quote(&self, profile: &CustomerProfile) -> DiscountQuote {
        self.quote_at(profile, Utc::now())
    }

    pub fn quote_at(&self, profile: &CustomerProfile, now: DateTime<Utc>) -> DiscountQuote {
        let mut pct = 0_u32;
        let mut reasons = Vec::new();
        let mut conditions = Vec::new();

        let base = u32::from(profile.segment.base_discount());
        if base > 0 {
            pct += base;
            reasons.push(profile.segment.discount_reason().to_owned());
        }

        if profile.confidence > 80 {
            pct += HIGH_CONFIDENCE_BONUS;
            reasons.push(format!("Cliente fiel ({}% confiança)", profile.confidence));
            conditions.push("Confiança alta detectada".to_owned());
        }

        if profile.total_purchases > 0 {
            pct += profile.total_purchases.saturating_mul(2).min(10);
            reasons.push(format!("Cliente recorrente ({} compras)", profile.total_purchases));
            conditions.push("Histórico de compras".to_owned());
        }

        let seasonal = seasonal_bonus(now);
        if seasonal > 0 {
            pct += seasonal;
            reasons.push(format!("Oferta sazonal ({seasonal}%)"));
            conditions.push("Promoção sazonal ativa".to_owned());
        }

        if profile.total_purchases == 0 {
            pct += FIRST_PURCHASE_BONUS;
            reasons.push("Primeira compra".to_owned());
            conditions.push("Cliente novo".to_owned());
        }

        let pct = clamp_pct(pct, self.policy.max_discount_pct);
        DiscountQuote {
            discount_pct: pct,
            reasons,
            code: discount_code(profile.segment, pct, now),
            valid_until: now + self.policy.quote_validity,
            conditions,
        }
    }

    /// Segment quote nudged up for larger carts, capped below the normal maximum.
    pub fn recommended_quote_at(
        &self,
        profile: &CustomerProfile,
        cart_value: Decimal,
        item_count: u32,
        now: DateTime<Utc>,
    ) -> DiscountQuote {
        let mut quote = self.quote_at(profile, now);
        let mut pct = u32::from(quote.discount_pct);
        if cart_value > Decimal::from(150) {
            pct += 5;
        }
        if item_count > 3 {
            pct += 3;
        }
        let cap = RECOMMENDED_CAP.min(u32::from(self.policy.max_discount_pct));
        quote.discount_pct = pct.min(cap) as u8;
        quote.code = discount_code(profile.segment, quote.discount_pct, now);
        quote
    }

    pub fn abandoned_cart_quote(&self, cart_value: Decimal, hours_abandoned: f64) -> DiscountQuote {
        self.abandoned_cart_quote_at(cart_value, hours_abandoned, Utc::now())
    }

    pub fn abandoned_cart_quote_at(
        &self,
        cart_value: Decimal,
        hours_abandoned: f64,
        now: DateTime<Utc>,
    ) -> DiscountQuote {
        let mut pct = ABANDONED_CART_BASE;
        if hours_abandoned > 24.0 {
            pct += 5;
        }
        if hours_abandoned > 48.0 {
            pct += 5;
        }
        if cart_value > Decimal::from(100) {
            pct += 5;
        }
        if cart_value > Decimal::from(200) {
            pct += 5;
        }

        let pct = clamp_pct(pct, self.policy.max_abandoned_cart_pct);
        DiscountQuote {
            discount_pct: pct,
            reasons: vec![format!("Carrinho abandonado há {} horas", hours_abandoned.floor())],
            code: format!("ABANDON{pct:02}"),
            valid_until: now + self.policy.abandoned_cart_validity,
            conditions: vec!["Carrinho abandonado".to_owned(), "Oferta por tempo limitado".to_owned()],
        }
    }

    pub fn bulk_quote(&self, items: &[CartItem]) -> DiscountQuote {
        self.bulk_quote_at(items, Utc::now())
    }

    pub fn bulk_quote_at(&self, items: &[CartItem], now: DateTime<Utc>) -> DiscountQuote {
        let units: u32 = items.iter().map(|item| item.quantity).sum();
        let pct = match units {
            20.. => 15,
            10.. => 10,
            5.. => 5,
            _ => 0,
        };

        DiscountQuote {
            discount_pct: pct,
            reasons: vec![format!("Compra em volume ({units} itens)")],
            code: format!("BULK{pct:02}"),
            valid_until: now + self.policy.bulk_validity,
            conditions: vec![format!("Mínimo {units} itens")],
        }
    }
}

pub fn apply(original_price: Decimal, quote: &DiscountQuote) -> AppliedDiscount {
    let discount_amount =
        original_price * Decimal::from(quote.discount_pct) / Decimal::ONE_HUNDRED;
    AppliedDiscount {
        original_price,
        discount_amount,
        final_price: original_price - discount_amount,
        discount_pct: quote.discount_pct,
    }
}

/// Short block appended to a chat reply.
pub fn offer_block(quote: &DiscountQuote) -> String {
    format!(
        "\n\n🎉 *OFERTA ESPECIAL:* {}% de desconto para você! {}",
        quote.discount_pct,
        quote.reason()
    )
}

/// Standalone offer message with code and expiry.
pub fn offer_message(quote: &DiscountQuote, segment: Segment) -> String {
    let mut message = String::from("🎉 *OFERTA ESPECIAL PARA VOCÊ!*\n\n");
    message.push_str(&format!("💰 *{}% de desconto*\n", quote.discount_pct));
    message.push_str(&format!("📝 Motivo: {}\n", quote.reason()));
    if !quote.code.is_empty() {
        message.push_str(&format!("🎫 Código: *{}*\n", quote.code));
    }
    message.push_str(&format!("⏰ Válido até: {}\n\n", quote.valid_until.format("%d/%m/%Y")));
    message.push_str(segment.offer_blessing());
    message
}

/// Easter window and December earn the holiday bonus; August is the anniversary month.
pub fn seasonal_bonus(now: DateTime<Utc>) -> u32 {
    let (month, day) = (now.month(), now.day());
    let easter = (month == 3 && day >= 20) || (month == 4 && day <= 10);
    if easter || month == 12 {
        HOLIDAY_BONUS
    } else if month == 8 {
        ANNIVERSARY_BONUS
    } else {
        0
    }
}

fn clamp_pct(pct: u32, cap: u8) -> u8 {
    pct.min(u32::from(cap)) as u8
}

fn discount_code(segment: Segment, pct: u8, now: DateTime<Utc>) -> String {
    let suffix = now.timestamp_millis().rem_euclid(10_000);
    format!("{}{pct:02}{suffix:04}", segment.code_prefix()).to_uppercase()
}
