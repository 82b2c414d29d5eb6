pub mod catalog;
pub mod config;
pub mod discount_engine;
pub mod domain;
pub mod errors;
pub mod profile;
pub mod rate_limit;

pub use catalog::Catalog;
pub use config::{AppConfig, ConfigError, LoadOptions};
pub use discount_engine::{DiscountEngine, DiscountPolicy};
pub use domain::cart::{Cart, CartItem, NewCartItem};
pub use domain::conversation::{ConversationContext, Role, Turn, DEFAULT_HISTORY_CAP};
pub use domain::customer::{CustomerId, CustomerProfile};
pub use domain::discount::{AppliedDiscount, DiscountQuote};
pub use domain::product::{Product, ProductId};
pub use domain::segment::Segment;
pub use errors::{ApplicationError, DomainError, InterfaceError, APOLOGY_MESSAGE};
pub use profile::{profile_changed, ProfileDetector, SegmentKeywords};
pub use rate_limit::{RateLimitPolicy, RateLimiter};
