use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::core::errors::ApiError;
use crate::db::MemoryStore;

/// Delete every memory turn that has expired by `now`.
pub async fn reap_once(memory: &MemoryStore, now: DateTime<Utc>) -> Result<u64, ApiError> {
    let deleted = memory.purge_expired(now).await?;
    if deleted > 0 {
        tracing::info!(deleted, "expired_memory_purged");
    }
    Ok(deleted)
}

/// Spawn the periodic memory purge. The first sweep runs immediately.
pub fn spawn_memory_reaper(memory: MemoryStore, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = reap_once(&memory, Utc::now()).await {
                tracing::warn!("Memory reaper sweep failed: {}", e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::types::MessageRole;

    #[tokio::test]
    async fn reaper_removes_only_expired_turns() {
        let db = Database::in_memory().await.expect("db");
        let memory = db.memory();
        memory
            .append("s", None, MessageRole::User, "stale", Some(chrono::Duration::seconds(-5)))
            .await
            .expect("append");
        memory
            .append("s", None, MessageRole::User, "fresh", Some(chrono::Duration::hours(1)))
            .await
            .expect("append");
        memory
            .append("s", None, MessageRole::User, "forever", None)
            .await
            .expect("append");

        let deleted = reap_once(&memory, Utc::now()).await.expect("reap");

        assert_eq!(deleted, 1);
        let turns = memory.recent("s", 10, Utc::now()).await.expect("recent");
        let mut contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        contents.sort();
        assert_eq!(contents, vec!["forever", "fresh"]);
    }
}
