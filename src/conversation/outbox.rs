use std::{collections::VecDeque, path::Path};

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::warn;
use uuid::Uuid;

use crate::{
    error::{ChatError, ChatResult},
    hub::Hub,
};

use super::{message::Draft, store::append_message};

/// Messages composed while the store was unreachable, kept in send order.
///
/// Every queued draft carries a client token, so flushing the same draft twice
/// (e.g. after a crash between send and save) stores it once.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outbox {
    pending: VecDeque<Draft>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load(path: impl AsRef<Path>) -> ChatResult<Outbox> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Outbox::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> ChatResult<()> {
        tokio::fs::write(path, serde_json::to_vec(self)?).await?;
        Ok(())
    }

    /// Queues a draft, giving it a client token if it has none. Returns the token.
    pub fn enqueue(&mut self, mut draft: Draft) -> String {
        let token = draft
            .client_token
            .get_or_insert_with(|| Uuid::now_v7().to_string())
            .clone();
        self.pending.push_back(draft);
        token
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Sends queued drafts in order. Stops at the first transport failure, or when the
    /// sender is no longer paired, and keeps the rest queued; drafts the store refuses
    /// for any other reason are dropped.
    /// Returns how many were stored.
    pub async fn flush(&mut self, db_pool: &SqlitePool, hub: &Hub, pairing_id: &str, sender_id: &str) -> ChatResult<usize> {
        let mut sent = 0;
        while let Some(draft) = self.pending.front() {
            match append_message(db_pool, hub, pairing_id, sender_id, draft.clone()).await {
                Ok(_) => sent += 1,
                Err(e) if e.is_transport() || matches!(e, ChatError::NotPaired) => return Err(e),
                Err(e) => warn!(pairing_id, sender_id, "dropping queued message: {e}"),
            }
            self.pending.pop_front();
        }
        Ok(sent)
    }
}
