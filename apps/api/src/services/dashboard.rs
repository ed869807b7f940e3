//! # Dashboard Service
//!
//! Read-model snapshots for screens that poll. Each payload carries a
//! `version` derived from its content, so a client can skip re-rendering
//! when two polls return the same version.
//!
//! ```text
//! data ──serde_json──► bytes ──SHA-256──► first 8 bytes, hex ──► version
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use sgir_core::dashboard::{AlertView, DayStats, KanbanBoard, PendingPayment, TableMapEntry};
use sgir_db::Repositories;

use crate::error::ApiResult;
use crate::AppState;

/// A versioned read-model payload.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot<T> {
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub data: T,
}

impl<T: Serialize> Snapshot<T> {
    pub fn new(data: T) -> ApiResult<Self> {
        let bytes = serde_json::to_vec(&data)?;
        Ok(Snapshot {
            version: content_version(&bytes),
            generated_at: Utc::now(),
            data,
        })
    }
}

fn content_version(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .take(8)
        .map(|b| format!("{:02x}", b))
        .collect()
}

pub async fn table_map(state: &AppState) -> ApiResult<Snapshot<Vec<TableMapEntry>>> {
    let data = {
        let mut unit = state.db.read().await?;
        unit.dashboard().table_map().await?
    };
    Snapshot::new(data)
}

pub async fn kanban(state: &AppState) -> ApiResult<Snapshot<KanbanBoard>> {
    let data = {
        let mut unit = state.db.read().await?;
        unit.dashboard().kanban().await?
    };
    Snapshot::new(data)
}

pub async fn pending_payments(state: &AppState) -> ApiResult<Snapshot<Vec<PendingPayment>>> {
    let data = {
        let mut unit = state.db.read().await?;
        unit.dashboard()
            .pending_payments(state.config.default_tip_suggestion_pct)
            .await?
    };
    Snapshot::new(data)
}

pub async fn day_stats(state: &AppState, date: NaiveDate) -> ApiResult<Snapshot<DayStats>> {
    let data = {
        let mut unit = state.db.read().await?;
        unit.dashboard()
            .day_stats(date, state.config.default_tax_pct)
            .await?
    };
    Snapshot::new(data)
}

pub async fn stock_alerts(state: &AppState, active_only: bool) -> ApiResult<Snapshot<Vec<AlertView>>> {
    let data = {
        let mut unit = state.db.read().await?;
        unit.alerts().list_views(active_only).await?
    };
    Snapshot::new(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_stable_and_content_sensitive() {
        let a = Snapshot::new(vec![1, 2, 3]).unwrap();
        let b = Snapshot::new(vec![1, 2, 3]).unwrap();
        let c = Snapshot::new(vec![1, 2, 4]).unwrap();
        assert_eq!(a.version, b.version);
        assert_ne!(a.version, c.version);
        assert_eq!(a.version.len(), 16);
    }
}
