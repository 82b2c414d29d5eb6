use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use vendedor_core::config::AppConfig;
use vendedor_core::discount_engine::DiscountEngine;
use vendedor_core::domain::cart::Cart;
use vendedor_core::domain::conversation::{Turn, DEFAULT_HISTORY_CAP};
use vendedor_core::domain::customer::{CustomerId, CustomerProfile};
use vendedor_core::domain::discount::DiscountQuote;
use vendedor_core::domain::segment::Segment;
use vendedor_core::errors::ApplicationError;
use vendedor_core::profile::{profile_changed, ProfileDetector};
use vendedor_core::rate_limit::RateLimiter;
use vendedor_db::{CartManager, ConversationManager, DocumentStore, KeyedLocks};
use vendedor_transport::{
    InboundHandler, InboundMessage, MessagePayload, MessageRef, OutboundContent, OutboundSender,
    SupervisorError,
};

use crate::llm::{GenerationError, GenerationRequest, TextGenerator};
use crate::prompt::build_request;
use crate::replies::{compose_reply, fallback_reply, personalize_blessings, EMPTY_REPLY};

const PREVIEW_CHARS: usize = 50;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub history_cap: usize,
    pub prompt_history: usize,
    pub abandoned_cart_threshold: chrono::Duration,
    pub generation_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            history_cap: DEFAULT_HISTORY_CAP,
            prompt_history: 10,
            abandoned_cart_threshold: chrono::Duration::hours(2),
            generation_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&AppConfig> for OrchestratorSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            history_cap: config.engagement.history_cap,
            prompt_history: config.engagement.prompt_history,
            abandoned_cart_threshold: config.engagement.abandoned_cart_threshold(),
            generation_timeout: config.llm.timeout(),
        }
    }
}

pub struct Collaborators {
    pub store: Arc<dyn DocumentStore>,
    pub generator: Arc<dyn TextGenerator>,
    pub sender: Arc<dyn OutboundSender>,
    pub rate_limiter: Arc<RateLimiter>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReplySummary {
    pub reply: String,
    pub profile: CustomerProfile,
    pub quote: DiscountQuote,
    pub cart_cleared: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MessageOutcome {
    /// The payload carried no text.
    Ignored,
    RateLimited,
    Replied(ReplySummary),
    /// The pipeline failed and the customer got the apology.
    Apologized,
}

/// Per-message pipeline from inbound text to a persisted, answered turn.
pub struct MessageOrchestrator {
    conversations: ConversationManager,
    carts: CartManager,
    detector: ProfileDetector,
    discounts: DiscountEngine,
    generator: Arc<dyn TextGenerator>,
    sender: Arc<dyn OutboundSender>,
    rate_limiter: Arc<RateLimiter>,
    locks: KeyedLocks,
    settings: OrchestratorSettings,
}

impl MessageOrchestrator {
    pub fn new(
        collaborators: Collaborators,
        detector: ProfileDetector,
        discounts: DiscountEngine,
        settings: OrchestratorSettings,
    ) -> Self {
        let Collaborators { store, generator, sender, rate_limiter } = collaborators;
        Self {
            conversations: ConversationManager::with_history_cap(
                Arc::clone(&store),
                settings.history_cap,
            ),
            carts: CartManager::new(store),
            detector,
            discounts,
            generator,
            sender,
            rate_limiter,
            locks: KeyedLocks::default(),
            settings,
        }
    }

    pub fn from_config(collaborators: Collaborators, config: &AppConfig) -> Self {
        Self::new(
            collaborators,
            ProfileDetector::new(config.keywords.clone()),
            DiscountEngine::new(config.engagement.discount_policy()),
            OrchestratorSettings::from(config),
        )
    }

    pub fn conversations(&self) -> &ConversationManager {
        &self.conversations
    }

    pub fn carts(&self) -> &CartManager {
        &self.carts
    }

    pub fn discounts(&self) -> &DiscountEngine {
        &self.discounts
    }

    pub async fn process(&self, message: &InboundMessage) -> MessageOutcome {
        self.process_at(message, Utc::now()).await
    }

    pub async fn process_at(&self, message: &InboundMessage, now: DateTime<Utc>) -> MessageOutcome {
        self.process_with(self.sender.as_ref(), message, now).await
    }

    /// Runs the full pipeline, state included, without delivering the reply.
    pub async fn simulate(&self, sender: &CustomerId, text: &str) -> MessageOutcome {
        self.simulate_at(sender, text, Utc::now()).await
    }

    pub async fn simulate_at(
        &self,
        sender: &CustomerId,
        text: &str,
        now: DateTime<Utc>,
    ) -> MessageOutcome {
        let message = InboundMessage {
            id: MessageRef(format!("sim-{}", uuid::Uuid::new_v4())),
            sender: sender.clone(),
            payload: MessagePayload::text(text),
            from_me: false,
        };
        self.process_with(&SimulatedSender, &message, now).await
    }

    async fn process_with(
        &self,
        outbound: &dyn OutboundSender,
        message: &InboundMessage,
        now: DateTime<Utc>,
    ) -> MessageOutcome {
        let correlation_id = message.id.0.as_str();
        let customer_id = &message.sender;
        let Some(text) = message.payload.extract_text() else {
            debug!(
                event_name = "pipeline.message.ignored",
                correlation_id,
                customer_id = %customer_id,
                "message carries no text"
            );
            return MessageOutcome::Ignored;
        };
        info!(
            event_name = "pipeline.message.received",
            correlation_id,
            customer_id = %customer_id,
            preview = %preview(text),
            "processing inbound message"
        );

        if !self.rate_limiter.allow(customer_id.as_str()) {
            warn!(
                event_name = "pipeline.message.rate_limited",
                correlation_id,
                customer_id = %customer_id,
                "sender exceeded the request window, dropping message"
            );
            return MessageOutcome::RateLimited;
        }

        let _guard = self.locks.lock(customer_id.as_str()).await;
        match self.respond(outbound, message, text, now).await {
            Ok(summary) => {
                info!(
                    event_name = "pipeline.message.replied",
                    correlation_id,
                    customer_id = %customer_id,
                    segment = %summary.profile.segment,
                    discount_pct = summary.quote.discount_pct,
                    "message processed"
                );
                MessageOutcome::Replied(summary)
            }
            Err(failure) => {
                let interface = failure.into_interface(correlation_id);
                error!(
                    event_name = "pipeline.message.failed",
                    correlation_id,
                    customer_id = %customer_id,
                    error = %interface,
                    operator_message = interface.operator_message(),
                    "message pipeline failed, sending apology"
                );
                let apology = OutboundContent::Text(interface.customer_message().to_owned());
                if let Err(send_error) = outbound.send_message(customer_id, apology, None).await {
                    warn!(
                        event_name = "pipeline.apology.send_failed",
                        correlation_id,
                        customer_id = %customer_id,
                        error = %send_error,
                        "apology could not be delivered"
                    );
                }
                MessageOutcome::Apologized
            }
        }
    }

    async fn respond(
        &self,
        outbound: &dyn OutboundSender,
        message: &InboundMessage,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<ReplySummary, ApplicationError> {
        let customer_id = &message.sender;
        let correlation_id = message.id.0.as_str();
        let mut context = self.conversations.load_or_new(customer_id, now).await;
        let cart = self.carts.get_cart_at(customer_id, now).await;

        let profile = self.detector.detect_at(text, &context, &cart.items, now);
        if profile_changed(&context.profile, &profile) {
            info!(
                event_name = "pipeline.profile.changed",
                correlation_id,
                customer_id = %customer_id,
                from = %context.profile.segment,
                to = %profile.segment,
                confidence = profile.confidence,
                "customer profile updated"
            );
        }
        context.profile = profile;

        let request = build_request(text, &context, &cart, self.settings.prompt_history, now);
        let generated =
            self.generate(&request, text, context.profile.segment, correlation_id).await;
        let quote = self.discounts.quote_at(&context.profile, now);
        let reply = compose_reply(context.profile.segment, &generated, &quote);

        outbound
            .send_message(customer_id, OutboundContent::Text(reply.clone()), Some(&message.id))
            .await
            .map_err(integration_error)?;

        context.append_turns(
            [Turn::user(text, now), Turn::assistant(reply.clone(), now)],
            self.settings.history_cap,
            now,
        );
        if let Err(error) = self.conversations.save(&context).await {
            warn!(
                event_name = "store.conversation.write_failed",
                correlation_id,
                customer_id = %customer_id,
                error = %error,
                "conversation not persisted, reply already sent"
            );
        }

        let cart_cleared = self.clear_if_abandoned(&cart, correlation_id, now).await;
        Ok(ReplySummary { reply, profile: context.profile, quote, cart_cleared })
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        text: &str,
        segment: Segment,
        correlation_id: &str,
    ) -> String {
        let timeout = self.settings.generation_timeout;
        let failure = match tokio::time::timeout(timeout, self.generator.generate(request)).await {
            Ok(Ok(reply)) if reply.trim().is_empty() => {
                return personalize_blessings(EMPTY_REPLY, segment);
            }
            Ok(Ok(reply)) => return personalize_blessings(&reply, segment),
            Ok(Err(error)) => error,
            Err(_) => GenerationError::Timeout { timeout_secs: timeout.as_secs() },
        };

        if failure == GenerationError::Disabled {
            debug!(
                event_name = "llm.generation.disabled",
                correlation_id,
                "no text generator configured, using canned reply"
            );
        } else {
            warn!(
                event_name = "llm.generation.failed",
                correlation_id,
                error = %failure,
                "text generation failed, using canned reply"
            );
        }
        fallback_reply(text).to_owned()
    }

    async fn clear_if_abandoned(
        &self,
        cart: &Cart,
        correlation_id: &str,
        now: DateTime<Utc>,
    ) -> bool {
        if !cart.is_abandoned(now, self.settings.abandoned_cart_threshold) {
            return false;
        }
        let hours = cart.hours_since_update(now);
        let quote = self.discounts.abandoned_cart_quote_at(cart.final_total, hours, now);
        info!(
            event_name = "pipeline.cart.abandoned",
            correlation_id,
            customer_id = %cart.customer_id,
            items = cart.item_count(),
            total = %cart.final_total,
            idle_hours = hours.floor() as i64,
            offer_pct = quote.discount_pct,
            "abandoned cart detected, clearing"
        );
        match self.carts.clear_cart_at(&cart.customer_id, now).await {
            Ok(_) => true,
            Err(error) => {
                warn!(
                    event_name = "store.cart.write_failed",
                    correlation_id,
                    customer_id = %cart.customer_id,
                    error = %error,
                    "abandoned cart could not be cleared"
                );
                false
            }
        }
    }
}

#[async_trait]
impl InboundHandler for MessageOrchestrator {
    async fn handle_message(&self, message: InboundMessage) {
        self.process(&message).await;
    }
}

fn integration_error(error: SupervisorError) -> ApplicationError {
    ApplicationError::Integration(error.to_string())
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

/// Accepts every message without delivering it.
struct SimulatedSender;

#[async_trait]
impl OutboundSender for SimulatedSender {
    async fn send_message(
        &self,
        _to: &CustomerId,
        _content: OutboundContent,
        _quoted: Option<&MessageRef>,
    ) -> Result<MessageRef, SupervisorError> {
        Ok(MessageRef("simulated".to_owned()))
    }
}
