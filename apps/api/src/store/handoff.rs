//! The handoff slot: one JSON `InterviewData` per user, written when a session
//! finishes and read when the assessment runs. No schema version; anything
//! unreadable counts as absent.

use tracing::warn;

use crate::interview::models::InterviewData;
use crate::store::{KeyValueStore, StoreError};

pub const TRANSCRIPT_KEY: &str = "simu-interview-transcript";

pub fn slot_key(user_id: &str) -> String {
    format!("{TRANSCRIPT_KEY}:{user_id}")
}

pub async fn save(
    store: &dyn KeyValueStore,
    user_id: &str,
    data: &InterviewData,
) -> Result<(), StoreError> {
    let json = serde_json::to_string(data)?;
    store.set(&slot_key(user_id), &json).await
}

pub async fn load(
    store: &dyn KeyValueStore,
    user_id: &str,
) -> Result<Option<InterviewData>, StoreError> {
    let Some(raw) = store.get(&slot_key(user_id)).await? else {
        return Ok(None);
    };
    match serde_json::from_str::<InterviewData>(&raw) {
        Ok(data) => Ok(Some(data)),
        Err(e) => {
            warn!("Ignoring malformed handoff record for {user_id}: {e}");
            Ok(None)
        }
    }
}
