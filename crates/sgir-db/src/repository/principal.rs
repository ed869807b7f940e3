//! # Principal Repository
//!
//! Principals (staff and customers) and their one-shot QR login tokens.
//!
//! ## QR Token Lifecycle
//! ```text
//!   issue ──► issued ──consume (conditional)──► consumed
//!               │
//!               └── any failed login / re-issue ──► invalidated
//! ```
//!
//! Consumption is a conditional update on `state = 'issued'`: of two racing
//! logins with the same token exactly one sees an affected row.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnection;
use sqlx::FromRow;
use tracing::debug;

use crate::error::{DbError, DbResult};
use sgir_core::{Area, Principal, QrToken, QrTokenState, Role};

const PRINCIPAL_COLUMNS: &str = "id, username, display_name, role, active, password_hash, \
     pin_hash, secondary_pin_hash, areas, last_qr_issued, created_at";

/// Raw `principals` row. Areas are stored as a comma separated list.
#[derive(Debug, FromRow)]
struct PrincipalRow {
    id: i64,
    username: String,
    display_name: String,
    role: Role,
    active: bool,
    password_hash: Option<String>,
    pin_hash: Option<String>,
    secondary_pin_hash: Option<String>,
    areas: String,
    last_qr_issued: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PrincipalRow> for Principal {
    type Error = DbError;

    fn try_from(row: PrincipalRow) -> Result<Self, Self::Error> {
        Ok(Principal {
            id: row.id,
            username: row.username,
            display_name: row.display_name,
            role: row.role,
            active: row.active,
            password_hash: row.password_hash,
            pin_hash: row.pin_hash,
            secondary_pin_hash: row.secondary_pin_hash,
            areas: decode_areas(&row.areas)?,
            last_qr_issued: row.last_qr_issued,
            created_at: row.created_at,
        })
    }
}

fn decode_areas(raw: &str) -> DbResult<Vec<Area>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<Area>().map_err(|e| DbError::corrupt("principals.areas", e)))
        .collect()
}

fn encode_areas(areas: &[Area]) -> String {
    areas
        .iter()
        .map(|a| a.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// Fields needed to provision a principal. Hashes are computed by the caller.
#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub username: String,
    pub display_name: String,
    pub role: Role,
    pub password_hash: Option<String>,
    pub pin_hash: Option<String>,
    pub secondary_pin_hash: Option<String>,
    pub areas: Vec<Area>,
}

/// Repository for principals and QR tokens.
pub struct PrincipalRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> PrincipalRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        PrincipalRepository { conn }
    }

    // =========================================================================
    // Principals
    // =========================================================================

    /// Inserts a principal.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - username (or PIN hash) already taken
    /// * `Err(DbError::ConstraintViolation)` - PIN on a non-cashier role
    pub async fn insert(&mut self, new: &NewPrincipal, now: DateTime<Utc>) -> DbResult<Principal> {
        debug!(username = %new.username, role = %new.role, "Inserting principal");

        let result = sqlx::query(
            r#"
            INSERT INTO principals (
                username, display_name, role, active,
                password_hash, pin_hash, secondary_pin_hash, areas, created_at
            ) VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&new.username)
        .bind(&new.display_name)
        .bind(new.role)
        .bind(&new.password_hash)
        .bind(&new.pin_hash)
        .bind(&new.secondary_pin_hash)
        .bind(encode_areas(&new.areas))
        .bind(now)
        .execute(&mut *self.conn)
        .await?;

        self.require(result.last_insert_rowid()).await
    }

    pub async fn get(&mut self, id: i64) -> DbResult<Option<Principal>> {
        let sql = format!("SELECT {PRINCIPAL_COLUMNS} FROM principals WHERE id = ?1");
        let row = sqlx::query_as::<_, PrincipalRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        row.map(Principal::try_from).transpose()
    }

    pub async fn require(&mut self, id: i64) -> DbResult<Principal> {
        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Principal", id))
    }

    pub async fn get_by_username(&mut self, username: &str) -> DbResult<Option<Principal>> {
        let sql = format!("SELECT {PRINCIPAL_COLUMNS} FROM principals WHERE username = ?1");
        let row = sqlx::query_as::<_, PrincipalRow>(&sql)
            .bind(username)
            .fetch_optional(&mut *self.conn)
            .await?;
        row.map(Principal::try_from).transpose()
    }

    pub async fn list(&mut self) -> DbResult<Vec<Principal>> {
        let sql = format!("SELECT {PRINCIPAL_COLUMNS} FROM principals ORDER BY id");
        self.fetch_many(&sql).await
    }

    /// Active cashiers carrying a PIN hash: the candidates of a PIN login.
    pub async fn active_pin_holders(&mut self) -> DbResult<Vec<Principal>> {
        let sql = format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM principals
             WHERE role = 'cashier' AND active = 1 AND pin_hash IS NOT NULL
             ORDER BY id"
        );
        self.fetch_many(&sql).await
    }

    /// Every cashier PIN hash, active or not (PIN uniqueness check).
    pub async fn all_pin_hashes(&mut self) -> DbResult<Vec<String>> {
        let hashes = sqlx::query_scalar::<_, String>(
            "SELECT pin_hash FROM principals WHERE pin_hash IS NOT NULL",
        )
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(hashes)
    }

    /// Active managers and admins carrying a secondary PIN.
    pub async fn active_authorisers(&mut self) -> DbResult<Vec<Principal>> {
        let sql = format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM principals
             WHERE role IN ('manager', 'admin') AND active = 1
               AND secondary_pin_hash IS NOT NULL
             ORDER BY id"
        );
        self.fetch_many(&sql).await
    }

    pub async fn set_active(&mut self, id: i64, active: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE principals SET active = ?2 WHERE id = ?1")
            .bind(id)
            .bind(active)
            .execute(&mut *self.conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Principal", id));
        }
        Ok(())
    }

    pub async fn count(&mut self) -> DbResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM principals")
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(count)
    }

    async fn fetch_many(&mut self, sql: &str) -> DbResult<Vec<Principal>> {
        let rows = sqlx::query_as::<_, PrincipalRow>(sql)
            .fetch_all(&mut *self.conn)
            .await?;
        rows.into_iter().map(Principal::try_from).collect()
    }

    // =========================================================================
    // QR Tokens
    // =========================================================================

    /// Stores a freshly issued token, invalidating the principal's earlier
    /// issued tokens first so exactly one is live.
    pub async fn rotate_qr_token(&mut self, token: &QrToken) -> DbResult<()> {
        debug!(principal_id = token.principal_id, "Rotating QR token");

        sqlx::query(
            "UPDATE qr_tokens SET state = 'invalidated'
             WHERE principal_id = ?1 AND state = 'issued'",
        )
        .bind(token.principal_id)
        .execute(&mut *self.conn)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO qr_tokens (token, principal_id, issued_at, expires_at, issuer_address, state)
            VALUES (?1, ?2, ?3, ?4, ?5, 'issued')
            "#,
        )
        .bind(&token.token)
        .bind(token.principal_id)
        .bind(token.issued_at)
        .bind(token.expires_at)
        .bind(&token.issuer_address)
        .execute(&mut *self.conn)
        .await?;

        sqlx::query("UPDATE principals SET last_qr_issued = ?2 WHERE id = ?1")
            .bind(token.principal_id)
            .bind(token.issued_at)
            .execute(&mut *self.conn)
            .await?;

        Ok(())
    }

    pub async fn get_qr_token(&mut self, token: &str) -> DbResult<Option<QrToken>> {
        let row = sqlx::query_as::<_, QrToken>(
            "SELECT token, principal_id, issued_at, expires_at, issuer_address, state, consumed_at
             FROM qr_tokens WHERE token = ?1",
        )
        .bind(token)
        .fetch_optional(&mut *self.conn)
        .await?;
        Ok(row)
    }

    /// Marks an issued token consumed. Returns `false` if another login got
    /// there first (or the token is no longer issued).
    pub async fn consume_qr_token(&mut self, token: &str, now: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE qr_tokens SET state = ?3, consumed_at = ?2
             WHERE token = ?1 AND state = 'issued'",
        )
        .bind(token)
        .bind(now)
        .bind(QrTokenState::Consumed)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Invalidates a token unless it was already consumed.
    pub async fn invalidate_qr_token(&mut self, token: &str) -> DbResult<()> {
        sqlx::query(
            "UPDATE qr_tokens SET state = 'invalidated'
             WHERE token = ?1 AND state = 'issued'",
        )
        .bind(token)
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area_csv() {
        let areas = vec![Area::Cash, Area::Waiter];
        let encoded = encode_areas(&areas);
        assert_eq!(encoded, "cash,waiter");
        assert_eq!(decode_areas(&encoded).unwrap(), areas);
        assert!(decode_areas("").unwrap().is_empty());
        assert!(decode_areas("cash,bar").is_err());
    }
}
