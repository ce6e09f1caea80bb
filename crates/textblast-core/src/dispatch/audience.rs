//! Audience resolution
//!
//! A mailing targets the union of clients matching any of its tags and
//! clients matching any of its operator codes. A client matching both
//! filters receives one message only.

use std::collections::BTreeMap;

use textblast_common::Result;
use textblast_storage::models::{Client, Mailing};
use textblast_storage::MailingStore;
use tracing::debug;

/// Resolve the set of clients a mailing targets, ordered by client ID
pub async fn resolve_audience(store: &dyn MailingStore, mailing: &Mailing) -> Result<Vec<Client>> {
    let mut by_id = BTreeMap::new();

    for client in store.clients_by_tags(&mailing.tags).await? {
        by_id.insert(client.id, client);
    }
    for client in store.clients_by_operator_codes(&mailing.operator_codes).await? {
        by_id.insert(client.id, client);
    }

    debug!(
        mailing_id = mailing.id,
        clients = by_id.len(),
        "Resolved mailing audience"
    );

    Ok(by_id.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use textblast_common::types::PhoneNumber;
    use textblast_storage::models::{CreateClient, CreateMailing};
    use textblast_storage::MemoryStore;

    async fn seed_client(
        store: &Arc<MemoryStore>,
        phone: i64,
        code: i32,
        tag: &str,
    ) -> Client {
        store
            .create_client(CreateClient {
                phone_number: PhoneNumber::new(phone).unwrap(),
                operator_code: code,
                tag: tag.to_string(),
                timezone: "Europe/Amsterdam".to_string(),
            })
            .await
            .unwrap()
    }

    fn mailing_with(tags: Vec<&str>, codes: Vec<i32>) -> Mailing {
        let now = Utc::now();
        Mailing {
            id: 1,
            text: "Hi".to_string(),
            tags: tags.into_iter().map(String::from).collect(),
            operator_codes: codes,
            start_time: now,
            end_time: now + Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn test_audience_is_union_of_tag_and_code_matches() {
        let store = Arc::new(MemoryStore::new());
        let by_tag = seed_client(&store, 70000000001, 900, "Promo").await;
        let by_code = seed_client(&store, 70000000002, 901, "Other").await;
        seed_client(&store, 70000000003, 902, "Unrelated").await;

        let mailing = mailing_with(vec!["Promo"], vec![901]);
        let audience = resolve_audience(store.as_ref(), &mailing).await.unwrap();

        let ids: Vec<_> = audience.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![by_tag.id, by_code.id]);
    }

    #[tokio::test]
    async fn test_audience_deduplicates_double_matches() {
        let store = Arc::new(MemoryStore::new());
        // Matches both the tag and the code filter
        seed_client(&store, 70000000001, 900, "Promo").await;

        let mailing = mailing_with(vec!["Promo"], vec![900]);
        let audience = resolve_audience(store.as_ref(), &mailing).await.unwrap();
        assert_eq!(audience.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_filters_match_nobody() {
        let store = Arc::new(MemoryStore::new());
        seed_client(&store, 70000000001, 900, "Promo").await;

        let mailing = mailing_with(vec![], vec![]);
        let audience = resolve_audience(store.as_ref(), &mailing).await.unwrap();
        assert!(audience.is_empty());
    }

    #[tokio::test]
    async fn test_seed_mailing_unused_fields_ignored() {
        // Audience depends only on tags and operator codes, not the window.
        let store = Arc::new(MemoryStore::new());
        seed_client(&store, 70000000001, 900, "Promo").await;

        let now = Utc::now();
        let expired = store
            .create_mailing(CreateMailing {
                text: "old".to_string(),
                tags: vec!["Promo".to_string()],
                operator_codes: vec![],
                start_time: now - Duration::hours(2),
                end_time: now - Duration::hours(1),
            })
            .await
            .unwrap();

        let audience = resolve_audience(store.as_ref(), &expired).await.unwrap();
        assert_eq!(audience.len(), 1);
    }
}
