//! Login and report-view tracking
//!
//! Recording is best effort: a store failure is logged and never fails the
//! request that triggered it.

use chrono::Utc;
use ulid::Ulid;

use crate::auth::{extractors::ClientMeta, session::SessionUser};
use crate::reporting::Report;
use crate::store::{ActivityRecord, ActivityType, ConfigStore};

/// Number of records shown on the admin page
pub const RECENT_ACTIVITY_LIMIT: usize = 100;

fn new_record(user: &SessionUser, activity_type: ActivityType, meta: &ClientMeta) -> ActivityRecord {
    ActivityRecord {
        id: Ulid::new().to_string(),
        user_email: user.email.clone(),
        user_name: user.name.clone(),
        activity_type,
        report_id: None,
        report_name: None,
        timestamp: Utc::now(),
        ip_address: meta.ip_address.clone(),
        user_agent: meta.user_agent.clone(),
    }
}

async fn record(store: &dyn ConfigStore, record: ActivityRecord) {
    if let Err(e) = store.record_activity(&record).await {
        tracing::warn!(
            email = %record.user_email,
            activity = %record.activity_type,
            error = %e,
            "Failed to record activity"
        );
    }
}

pub async fn record_login(store: &dyn ConfigStore, user: &SessionUser, meta: &ClientMeta) {
    record(store, new_record(user, ActivityType::Login, meta)).await;
}

pub async fn record_view(
    store: &dyn ConfigStore,
    user: &SessionUser,
    report: &Report,
    meta: &ClientMeta,
) {
    let mut entry = new_record(user, ActivityType::ViewReport, meta);
    entry.report_id = Some(report.id.clone());
    entry.report_name = Some(report.name.clone());
    record(store, entry).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn user() -> SessionUser {
        SessionUser {
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn test_record_view_carries_report_and_client() {
        let store = MemoryStore::default();
        let report = Report {
            id: "r1".to_string(),
            name: "Sales".to_string(),
            dataset_id: "ds-1".to_string(),
            embed_url: "https://embed".to_string(),
            web_url: None,
        };
        let meta = ClientMeta {
            ip_address: Some("203.0.113.7".to_string()),
            user_agent: Some("test-agent".to_string()),
        };

        record_login(&store, &user(), &meta).await;
        record_view(&store, &user(), &report, &meta).await;

        let records = store.recent_activity(10).await.unwrap();
        assert_eq!(records.len(), 2);
        let view = records
            .iter()
            .find(|r| r.activity_type == ActivityType::ViewReport)
            .unwrap();
        assert_eq!(view.report_id.as_deref(), Some("r1"));
        assert_eq!(view.report_name.as_deref(), Some("Sales"));
        assert_eq!(view.ip_address.as_deref(), Some("203.0.113.7"));
        assert_ne!(records[0].id, records[1].id);
    }

    #[tokio::test]
    async fn test_store_failure_is_swallowed() {
        let store = MemoryStore::failing();
        // Must not panic or propagate
        record_login(&store, &user(), &ClientMeta::default()).await;
        assert_eq!(store.call_count(), 1);
    }
}
