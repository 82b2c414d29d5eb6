use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::warn;

use vendedor_core::domain::conversation::{ConversationContext, Role, Turn, DEFAULT_HISTORY_CAP};
use vendedor_core::domain::customer::CustomerId;

use crate::repositories::{DocumentStore, Namespace, RepositoryError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CustomerStats {
    pub total_messages: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub first_interaction: Option<DateTime<Utc>>,
    pub last_interaction: Option<DateTime<Utc>>,
    /// Mean gap between a user turn and the assistant turn right after it.
    pub average_response_ms: i64,
}

pub struct ConversationManager {
    store: Arc<dyn DocumentStore>,
    history_cap: usize,
}

impl ConversationManager {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_history_cap(store, DEFAULT_HISTORY_CAP)
    }

    pub fn with_history_cap(store: Arc<dyn DocumentStore>, history_cap: usize) -> Self {
        Self { store, history_cap: history_cap.max(1) }
    }

    pub fn history_cap(&self) -> usize {
        self.history_cap
    }

    /// `None` when no document exists for the customer.
    pub async fn load(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<ConversationContext>, RepositoryError> {
        let document = self.store.get(Namespace::Conversations, customer_id.as_str()).await?;
        document.map(serde_json::from_value).transpose().map_err(RepositoryError::from)
    }

    /// Unreadable documents are treated as absent so the conversation keeps flowing.
    pub async fn load_or_new(
        &self,
        customer_id: &CustomerId,
        now: DateTime<Utc>,
    ) -> ConversationContext {
        match self.load(customer_id).await {
            Ok(Some(context)) => context,
            Ok(None) => ConversationContext::new(customer_id.clone(), now),
            Err(error) => {
                warn!(
                    event_name = "store.conversation.read_failed",
                    customer_id = %customer_id,
                    error = %error,
                    "conversation document unreadable, starting fresh context"
                );
                ConversationContext::new(customer_id.clone(), now)
            }
        }
    }

    pub async fn save(&self, context: &ConversationContext) -> Result<(), RepositoryError> {
        let document = serde_json::to_value(context)?;
        self.store.put(Namespace::Conversations, context.customer_id.as_str(), &document).await
    }

    /// Loads (or creates), appends, trims to the cap, and persists.
    pub async fn append_turns<I>(
        &self,
        customer_id: &CustomerId,
        turns: I,
        now: DateTime<Utc>,
    ) -> Result<ConversationContext, RepositoryError>
    where
        I: IntoIterator<Item = Turn> + Send,
    {
        let mut context = self.load_or_new(customer_id, now).await;
        context.append_turns(turns, self.history_cap, now);
        self.save(&context).await?;
        Ok(context)
    }

    pub async fn history(
        &self,
        customer_id: &CustomerId,
        limit: usize,
    ) -> Result<Vec<Turn>, RepositoryError> {
        Ok(self
            .load(customer_id)
            .await?
            .map(|context| context.recent(limit).to_vec())
            .unwrap_or_default())
    }

    /// Keeps the profile, drops the turns. Returns false when there was nothing to clear.
    pub async fn clear_history(&self, customer_id: &CustomerId) -> Result<bool, RepositoryError> {
        let Some(mut context) = self.load(customer_id).await? else {
            return Ok(false);
        };
        context.history.clear();
        self.save(&context).await?;
        Ok(true)
    }

    pub async fn all_customers(&self) -> Result<Vec<CustomerId>, RepositoryError> {
        let mut keys = self.store.keys(Namespace::Conversations).await?;
        keys.sort();
        Ok(keys.into_iter().map(CustomerId).collect())
    }

    pub async fn active_customers(&self, hours: i64) -> Result<Vec<CustomerId>, RepositoryError> {
        self.active_customers_at(hours, Utc::now()).await
    }

    /// Full scan filtered on `last_activity`; unreadable documents are skipped.
    pub async fn active_customers_at(
        &self,
        hours: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<CustomerId>, RepositoryError> {
        let cutoff = now - Duration::hours(hours.max(0));
        let mut active = Vec::new();
        for customer_id in self.all_customers().await? {
            match self.load(&customer_id).await {
                Ok(Some(context)) if context.last_activity >= cutoff => active.push(customer_id),
                Ok(_) => {}
                Err(error) => warn!(
                    event_name = "store.conversation.scan_skipped",
                    customer_id = %customer_id,
                    error = %error,
                    "skipping unreadable conversation during scan"
                ),
            }
        }
        Ok(active)
    }

    pub async fn delete_customer(&self, customer_id: &CustomerId) -> Result<bool, RepositoryError> {
        self.store.delete(Namespace::Conversations, customer_id.as_str()).await
    }

    pub async fn customer_stats(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<CustomerStats>, RepositoryError> {
        Ok(self.load(customer_id).await?.map(|context| stats_for(&context.history)))
    }
}

fn stats_for(history: &[Turn]) -> CustomerStats {
    let user_messages = history.iter().filter(|turn| turn.role == Role::User).count();
    let gaps = history
        .windows(2)
        .filter(|pair| pair[0].role == Role::User && pair[1].role == Role::Assistant)
        .map(|pair| (pair[1].timestamp - pair[0].timestamp).num_milliseconds())
        .collect::<Vec<_>>();
    let average_response_ms =
        if gaps.is_empty() { 0 } else { gaps.iter().sum::<i64>() / gaps.len() as i64 };

    CustomerStats {
        total_messages: history.len(),
        user_messages,
        assistant_messages: history.len() - user_messages,
        first_interaction: history.first().map(|turn| turn.timestamp),
        last_interaction: history.last().map(|turn| turn.timestamp),
        average_response_ms,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use serde_json::json;

    use vendedor_core::domain::conversation::Turn;
    use vendedor_core::domain::customer::CustomerId;
    use vendedor_core::domain::segment::Segment;

    use super::ConversationManager;
    use crate::repositories::{DocumentStore, InMemoryDocumentStore, Namespace};

    fn manager() -> (Arc<InMemoryDocumentStore>, ConversationManager) {
        let store = Arc::new(InMemoryDocumentStore::default());
        let manager = ConversationManager::new(store.clone());
        (store, manager)
    }

    #[tokio::test]
    async fn load_returns_none_for_unknown_customer() {
        let (_, manager) = manager();
        let loaded = manager.load(&CustomerId::new("ghost")).await.expect("load");
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn appended_context_round_trips_with_profile() {
        let (_, manager) = manager();
        let id = CustomerId::new("u1");
        let now = Utc::now();

        let mut context = manager
            .append_turns(&id, [Turn::user("oi", now), Turn::assistant("olá", now)], now)
            .await
            .expect("append");
        context.profile.segment = Segment::Faithful;
        manager.save(&context).await.expect("save");

        let loaded = manager.load(&id).await.expect("load").expect("present");
        assert_eq!(loaded, context);
        assert_eq!(manager.history(&id, 1).await.expect("history")[0].text, "olá");
    }

    #[tokio::test]
    async fn persisted_history_is_capped_to_most_recent_turns() {
        let (_, manager) = manager();
        let id = CustomerId::new("u1");
        let start = Utc::now();

        for index in 0..15 {
            let at = start + Duration::seconds(index);
            manager
                .append_turns(
                    &id,
                    [Turn::user(format!("q{index}"), at), Turn::assistant(format!("a{index}"), at)],
                    at,
                )
                .await
                .expect("append");
        }

        let context = manager.load(&id).await.expect("load").expect("present");
        assert_eq!(context.history.len(), 20);
        assert_eq!(context.history[0].text, "q5");
        assert_eq!(context.history[19].text, "a14");
    }

    #[tokio::test]
    async fn unreadable_document_yields_fresh_context() {
        let (store, manager) = manager();
        store.put(Namespace::Conversations, "u1", &json!({ "unexpected": true })).await.expect("put");

        let id = CustomerId::new("u1");
        assert!(manager.load(&id).await.is_err());

        let context = manager.load_or_new(&id, Utc::now()).await;
        assert!(context.history.is_empty());
        assert_eq!(context.profile.segment, Segment::New);
    }

    #[tokio::test]
    async fn active_customers_filter_on_last_activity() {
        let (_, manager) = manager();
        let now = Utc::now();
        manager
            .append_turns(&CustomerId::new("recent"), [Turn::user("oi", now)], now)
            .await
            .expect("append");
        let old = now - Duration::hours(30);
        manager
            .append_turns(&CustomerId::new("stale"), [Turn::user("oi", old)], old)
            .await
            .expect("append");

        let all = manager.all_customers().await.expect("all");
        assert_eq!(all, vec![CustomerId::new("recent"), CustomerId::new("stale")]);

        let active = manager.active_customers_at(24, now).await.expect("active");
        assert_eq!(active, vec![CustomerId::new("recent")]);
    }

    #[tokio::test]
    async fn stats_average_user_to_assistant_gaps() {
        let (_, manager) = manager();
        let id = CustomerId::new("u1");
        let start = Utc::now();
        let turns = [
            Turn::user("q1", start),
            Turn::assistant("a1", start + Duration::milliseconds(400)),
            Turn::user("q2", start + Duration::seconds(10)),
            Turn::assistant("a2", start + Duration::seconds(10) + Duration::milliseconds(800)),
            Turn::user("q3", start + Duration::seconds(20)),
        ];
        manager.append_turns(&id, turns, start).await.expect("append");

        let stats = manager.customer_stats(&id).await.expect("stats").expect("present");
        assert_eq!(stats.total_messages, 5);
        assert_eq!(stats.user_messages, 3);
        assert_eq!(stats.assistant_messages, 2);
        assert_eq!(stats.average_response_ms, 600);
        assert_eq!(stats.first_interaction, Some(start));
    }

    #[tokio::test]
    async fn clear_and_delete() {
        let (_, manager) = manager();
        let id = CustomerId::new("u1");
        let now = Utc::now();
        assert!(!manager.clear_history(&id).await.expect("clear missing"));

        manager.append_turns(&id, [Turn::user("oi", now)], now).await.expect("append");
        assert!(manager.clear_history(&id).await.expect("clear"));
        assert!(manager.history(&id, 10).await.expect("history").is_empty());

        assert!(manager.delete_customer(&id).await.expect("delete"));
        assert!(manager.load(&id).await.expect("load").is_none());
    }
}
