//! Session tickets: a paid scenario submission buys exactly one live session.
//!
//! Issued after the credit is spent, redeemed (and deleted) when the session
//! is created. A ticket is bound to the user it was issued to.

use chrono::Utc;
use uuid::Uuid;

use crate::store::{KeyValueStore, StoreError};

pub const TICKET_KEY: &str = "simu-session-ticket";

fn ticket_key(user_id: &str, ticket: Uuid) -> String {
    format!("{TICKET_KEY}:{user_id}:{ticket}")
}

pub async fn issue(store: &dyn KeyValueStore, user_id: &str) -> Result<Uuid, StoreError> {
    let ticket = Uuid::new_v4();
    store
        .set(&ticket_key(user_id, ticket), &Utc::now().to_rfc3339())
        .await?;
    Ok(ticket)
}

/// True if the ticket was outstanding for this user. It is gone afterwards.
pub async fn redeem(
    store: &dyn KeyValueStore,
    user_id: &str,
    ticket: Uuid,
) -> Result<bool, StoreError> {
    Ok(store.take(&ticket_key(user_id, ticket)).await?.is_some())
}
