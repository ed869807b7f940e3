//! Shift-liveness gate.
//!
//! The work day is open while at least one cashier shift dated today is
//! open. The answer is cached for a short TTL (never above 60 s) and
//! dropped whenever a shift opens or closes.

use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use sgir_db::{Database, DbResult, Repositories};

/// Business date used for shifts, the work day and day stats (UTC).
pub fn business_date() -> NaiveDate {
    Utc::now().date_naive()
}

/// Cached "is any shift open today?".
pub struct WorkDayGate {
    ttl: Duration,
    cached: RwLock<Option<(NaiveDate, bool, Instant)>>,
}

impl WorkDayGate {
    pub fn new(ttl_secs: u64) -> Self {
        WorkDayGate {
            ttl: Duration::from_secs(ttl_secs.min(60)),
            cached: RwLock::new(None),
        }
    }

    /// Must not be called while the caller holds a write unit.
    pub async fn is_open(&self, db: &Database) -> DbResult<bool> {
        let today = business_date();
        if let Some((date, open, at)) = *self.cached.read().await {
            if date == today && at.elapsed() < self.ttl {
                return Ok(open);
            }
        }

        let open = {
            let mut unit = db.read().await?;
            unit.shifts().any_open_on(today).await?
        };
        debug!(%today, open, "Work day state refreshed");
        *self.cached.write().await = Some((today, open, Instant::now()));
        Ok(open)
    }

    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sgir_core::{Money, ShiftTurn};
    use sgir_db::repository::NewPrincipal;
    use sgir_db::DbConfig;

    #[tokio::test]
    async fn test_cache_until_invalidated() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let gate = WorkDayGate::new(60);
        assert!(!gate.is_open(&db).await.unwrap());

        let mut unit = db.write().await.unwrap();
        let cashier = unit
            .principals()
            .insert(
                &NewPrincipal {
                    username: "caja".to_string(),
                    display_name: "Caja".to_string(),
                    role: sgir_core::Role::Cashier,
                    password_hash: None,
                    pin_hash: None,
                    secondary_pin_hash: None,
                    areas: vec![sgir_core::Area::Cash],
                },
                Utc::now(),
            )
            .await
            .unwrap();
        unit.shifts()
            .open(cashier.id, business_date(), ShiftTurn::Full, Money::zero(), "", Utc::now())
            .await
            .unwrap();
        unit.commit().await.unwrap();

        assert!(!gate.is_open(&db).await.unwrap());
        gate.invalidate().await;
        assert!(gate.is_open(&db).await.unwrap());
    }
}
