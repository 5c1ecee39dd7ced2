//! Postgres-backed grant store.
//!
//! Schema lives in `crates/infra/migrations`; [`PostgresAccessStore::migrate`]
//! applies it idempotently.
//!
//! ## Concurrency
//!
//! Every compare-and-set is a single conditional statement, so the row lock
//! taken by `UPDATE` serializes competing writers under the default
//! READ COMMITTED isolation:
//!
//! | Operation | Statement |
//! |-----------|-----------|
//! | status transition | `UPDATE ... WHERE id = $1 AND status = $2` |
//! | redemption counter | `UPDATE ... WHERE redeemed_count < max_redemptions` |
//! | first redemption per email | `INSERT ... ON CONFLICT (code_id, email) DO NOTHING` |
//! | one open portal request per email | partial unique index + `ON CONFLICT DO NOTHING` |
//! | longer-lived grant wins | `ON CONFLICT DO UPDATE ... WHERE` the new expiry is later |
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Duplicate` |
//! | Database (other) | any other | `Backend` |
//! | PoolClosed / Io / other | N/A | `Backend` |
//! | ColumnDecode | N/A | `Corrupt` |

use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use trustgate_access::{
    Bundle, GatedAccessGrant, GatedAccessRequest, GrantSource, NdaSignature, PortalGrants,
    Redemption, RedemptionCode, SimpleAccessRequest,
};
use trustgate_auth::{AccessToken, TokenOrigin};
use trustgate_core::{
    Affected, AgreementId, BundleId, CodeId, Email, GatedRequestId, GrantId, ItemId, ItemKind,
    ItemRef, RequestId, RequestStatus, SignatureId, StaffId,
};

use super::{AccessStore, Review, StoreError, StoreResult, TransitionTarget, UnitOfWork};

const SCHEMA: &str = include_str!("../../migrations/0001_access.sql");

const SIMPLE_COLUMNS: &str = "id, email, name, company, status, full_access, grant_items, \
     created_at, reviewed_at, reviewed_by";

const GATED_COLUMNS: &str = "id, email, name, company, nda_signature_id, status, \
     requested_items, created_at, reviewed_at, reviewed_by, rejection_reason";

const CODE_COLUMNS: &str =
    "id, bundle_id, code, expires_at, max_redemptions, redeemed_count, created_at";

#[derive(Debug, Clone)]
pub struct PostgresAccessStore {
    pool: Arc<PgPool>,
}

impl PostgresAccessStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the schema. Safe to run on every start.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn fetch_simple(&self, sql: &str, bind: Option<String>) -> StoreResult<Vec<SimpleAccessRequest>> {
        let mut query = sqlx::query(sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        let rows = query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_simple", e))?;
        rows.iter().map(decode::<SimpleRow, _>).collect()
    }

    async fn fetch_gated(&self, sql: &str, bind: Option<String>) -> StoreResult<Vec<GatedAccessRequest>> {
        let mut query = sqlx::query(sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        let rows = query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_gated", e))?;
        rows.iter().map(decode::<GatedRow, _>).collect()
    }
}

#[async_trait]
impl AccessStore for PostgresAccessStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(Box::new(PostgresUnitOfWork { tx }))
    }

    #[instrument(skip(self), fields(request_id = %id), err)]
    async fn find_simple_request(&self, id: RequestId) -> StoreResult<Option<SimpleAccessRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {SIMPLE_COLUMNS} FROM simple_access_requests WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_simple_request", e))?;
        row.as_ref().map(decode::<SimpleRow, _>).transpose()
    }

    async fn list_simple_requests(
        &self,
        status: Option<RequestStatus>,
    ) -> StoreResult<Vec<SimpleAccessRequest>> {
        match status {
            Some(status) => {
                self.fetch_simple(
                    &format!(
                        "SELECT {SIMPLE_COLUMNS} FROM simple_access_requests \
                         WHERE status = $1 ORDER BY created_at DESC"
                    ),
                    Some(status.as_str().to_string()),
                )
                .await
            }
            None => {
                self.fetch_simple(
                    &format!(
                        "SELECT {SIMPLE_COLUMNS} FROM simple_access_requests ORDER BY created_at DESC"
                    ),
                    None,
                )
                .await
            }
        }
    }

    async fn simple_requests_for(&self, email: &Email) -> StoreResult<Vec<SimpleAccessRequest>> {
        self.fetch_simple(
            &format!(
                "SELECT {SIMPLE_COLUMNS} FROM simple_access_requests \
                 WHERE email = $1 ORDER BY created_at DESC"
            ),
            Some(email.as_str().to_string()),
        )
        .await
    }

    #[instrument(skip(self), fields(request_id = %id), err)]
    async fn find_gated_request(
        &self,
        id: GatedRequestId,
    ) -> StoreResult<Option<GatedAccessRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {GATED_COLUMNS} FROM gated_access_requests WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_gated_request", e))?;
        row.as_ref().map(decode::<GatedRow, _>).transpose()
    }

    async fn list_gated_requests(
        &self,
        status: Option<RequestStatus>,
    ) -> StoreResult<Vec<GatedAccessRequest>> {
        match status {
            Some(status) => {
                self.fetch_gated(
                    &format!(
                        "SELECT {GATED_COLUMNS} FROM gated_access_requests \
                         WHERE status = $1 ORDER BY created_at DESC"
                    ),
                    Some(status.as_str().to_string()),
                )
                .await
            }
            None => {
                self.fetch_gated(
                    &format!(
                        "SELECT {GATED_COLUMNS} FROM gated_access_requests ORDER BY created_at DESC"
                    ),
                    None,
                )
                .await
            }
        }
    }

    async fn find_signature(&self, id: SignatureId) -> StoreResult<Option<NdaSignature>> {
        let row = sqlx::query(
            r#"
            SELECT id, email, name, company, agreement_id, signed_at, ip_address
            FROM nda_signatures
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_signature", e))?;
        row.as_ref().map(decode::<SignatureRow, _>).transpose()
    }

    async fn grants_for(&self, email: &Email) -> StoreResult<Vec<GatedAccessGrant>> {
        let rows = sqlx::query(
            r#"
            SELECT id, email, item_kind, item_id, expires_at, granted_by, source, created_at
            FROM gated_access_grants
            WHERE email = $1
            "#,
        )
        .bind(email.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("grants_for", e))?;
        rows.iter().map(decode::<GrantRow, _>).collect()
    }

    #[instrument(skip(self), fields(item = %item), err)]
    async fn delete_grant(&self, email: &Email, item: ItemRef) -> StoreResult<Affected> {
        let result = sqlx::query(
            r#"
            DELETE FROM gated_access_grants
            WHERE email = $1 AND item_kind = $2 AND item_id = $3
            "#,
        )
        .bind(email.as_str())
        .bind(item.kind().as_str())
        .bind(item.id().as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete_grant", e))?;
        Ok(Affected::from(result.rows_affected()))
    }

    async fn find_token(&self, token: &str) -> StoreResult<Option<AccessToken>> {
        let row = sqlx::query(
            r#"
            SELECT token, email, origin_flow, origin_request_id, issued_at, expires_at
            FROM access_tokens
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_token", e))?;
        row.as_ref().map(decode::<TokenRow, _>).transpose()
    }

    #[instrument(skip(self, bundle), fields(bundle_id = %bundle.id), err)]
    async fn insert_bundle(&self, bundle: &Bundle) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bundles (id, name, items, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(bundle.id.as_uuid())
        .bind(&bundle.name)
        .bind(items_json(&bundle.items)?)
        .bind(bundle.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_bundle", e))?;
        Ok(())
    }

    async fn find_bundle(&self, id: BundleId) -> StoreResult<Option<Bundle>> {
        let row = sqlx::query("SELECT id, name, items, created_at FROM bundles WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_bundle", e))?;
        row.as_ref().map(decode::<BundleRow, _>).transpose()
    }

    async fn list_bundles(&self) -> StoreResult<Vec<Bundle>> {
        let rows = sqlx::query("SELECT id, name, items, created_at FROM bundles ORDER BY created_at DESC")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_bundles", e))?;
        rows.iter().map(decode::<BundleRow, _>).collect()
    }

    #[instrument(skip(self, code), fields(code_id = %code.id, bundle_id = %code.bundle_id), err)]
    async fn insert_code(&self, code: &RedemptionCode) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO redemption_codes (
                id, bundle_id, code, expires_at, max_redemptions, redeemed_count, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(code.id.as_uuid())
        .bind(code.bundle_id.as_uuid())
        .bind(&code.code)
        .bind(code.expires_at)
        .bind(code.max_redemptions.map(|m| to_i32("max_redemptions", m)).transpose()?)
        .bind(to_i32("redeemed_count", code.redeemed_count)?)
        .bind(code.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_code", e))?;
        Ok(())
    }

    async fn find_code(&self, id: CodeId) -> StoreResult<Option<RedemptionCode>> {
        let row = sqlx::query(&format!("SELECT {CODE_COLUMNS} FROM redemption_codes WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_code", e))?;
        row.as_ref().map(decode::<CodeRow, _>).transpose()
    }

    async fn find_code_by_value(&self, code: &str) -> StoreResult<Option<RedemptionCode>> {
        let row = sqlx::query(&format!("SELECT {CODE_COLUMNS} FROM redemption_codes WHERE code = $1"))
            .bind(code)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_code_by_value", e))?;
        row.as_ref().map(decode::<CodeRow, _>).transpose()
    }

    async fn list_codes(&self, bundle_id: BundleId) -> StoreResult<Vec<RedemptionCode>> {
        let rows = sqlx::query(&format!(
            "SELECT {CODE_COLUMNS} FROM redemption_codes WHERE bundle_id = $1 ORDER BY created_at DESC"
        ))
        .bind(bundle_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_codes", e))?;
        rows.iter().map(decode::<CodeRow, _>).collect()
    }

    #[instrument(skip(self), fields(code_id = %id), err)]
    async fn delete_code(&self, id: CodeId) -> StoreResult<Affected> {
        // redemptions cascade
        let result = sqlx::query("DELETE FROM redemption_codes WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_code", e))?;
        Ok(Affected::from(result.rows_affected()))
    }

    async fn redemptions_for(&self, code_id: CodeId) -> StoreResult<Vec<Redemption>> {
        let rows = sqlx::query(
            r#"
            SELECT code_id, email, redeemed_at
            FROM redemptions
            WHERE code_id = $1
            ORDER BY redeemed_at ASC
            "#,
        )
        .bind(code_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("redemptions_for", e))?;
        rows.iter().map(decode::<RedemptionRow, _>).collect()
    }
}

/// One database transaction. Dropped without `commit` = rolled back by sqlx.
struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    #[instrument(skip(self, review), fields(target = ?target, from = %expected, to = %next), err)]
    async fn compare_and_transition(
        &mut self,
        target: TransitionTarget,
        expected: RequestStatus,
        next: RequestStatus,
        review: &Review,
    ) -> StoreResult<Affected> {
        let result = match target {
            TransitionTarget::Simple(id) => {
                sqlx::query(
                    r#"
                    UPDATE simple_access_requests
                    SET status = $1, reviewed_at = $2, reviewed_by = $3
                    WHERE id = $4 AND status = $5
                    "#,
                )
                .bind(next.as_str())
                .bind(review.reviewed_at)
                .bind(review.reviewed_by.as_uuid())
                .bind(id.as_uuid())
                .bind(expected.as_str())
                .execute(&mut *self.tx)
                .await
            }
            TransitionTarget::Gated(id) => {
                sqlx::query(
                    r#"
                    UPDATE gated_access_requests
                    SET status = $1, reviewed_at = $2, reviewed_by = $3, rejection_reason = $4
                    WHERE id = $5 AND status = $6
                    "#,
                )
                .bind(next.as_str())
                .bind(review.reviewed_at)
                .bind(review.reviewed_by.as_uuid())
                .bind(review.rejection_reason.as_deref())
                .bind(id.as_uuid())
                .bind(expected.as_str())
                .execute(&mut *self.tx)
                .await
            }
        }
        .map_err(|e| map_sqlx_error("compare_and_transition", e))?;

        Ok(Affected::from(result.rows_affected()))
    }

    async fn update_simple_grants(
        &mut self,
        id: RequestId,
        grants: &PortalGrants,
    ) -> StoreResult<Affected> {
        let items: Vec<ItemRef> = grants.items.iter().copied().collect();
        let result = sqlx::query(
            r#"
            UPDATE simple_access_requests
            SET full_access = $1, grant_items = $2
            WHERE id = $3 AND status = 'approved'
            "#,
        )
        .bind(grants.full_access)
        .bind(items_json(&items)?)
        .bind(id.as_uuid())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_simple_grants", e))?;
        Ok(Affected::from(result.rows_affected()))
    }

    async fn insert_simple_request(&mut self, request: &SimpleAccessRequest) -> StoreResult<bool> {
        let items: Vec<ItemRef> = request.grants.items.iter().copied().collect();
        let result = sqlx::query(
            r#"
            INSERT INTO simple_access_requests (
                id, email, name, company, status, full_access, grant_items, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (email) WHERE status IN ('pending', 'approved') DO NOTHING
            "#,
        )
        .bind(request.id.as_uuid())
        .bind(request.email.as_str())
        .bind(request.name.as_deref())
        .bind(request.company.as_deref())
        .bind(request.status.as_str())
        .bind(request.grants.full_access)
        .bind(items_json(&items)?)
        .bind(request.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_simple_request", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_signature(&mut self, signature: &NdaSignature) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO nda_signatures (
                id, email, name, company, agreement_id, signed_at, ip_address
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(signature.id.as_uuid())
        .bind(signature.email.as_str())
        .bind(&signature.name)
        .bind(signature.company.as_deref())
        .bind(signature.agreement_id.as_uuid())
        .bind(signature.signed_at)
        .bind(signature.ip_address.as_deref())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_signature", e))?;
        Ok(())
    }

    async fn insert_gated_request(&mut self, request: &GatedAccessRequest) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO gated_access_requests (
                id, email, name, company, nda_signature_id, status, requested_items, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(request.id.as_uuid())
        .bind(request.email.as_str())
        .bind(&request.name)
        .bind(request.company.as_deref())
        .bind(request.nda_signature_id.as_uuid())
        .bind(request.status.as_str())
        .bind(items_json(&request.requested_items)?)
        .bind(request.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_gated_request", e))?;
        Ok(())
    }

    async fn insert_token(&mut self, token: &AccessToken) -> StoreResult<()> {
        let (flow, request_id) = origin_columns(token.origin);
        sqlx::query(
            r#"
            INSERT INTO access_tokens (
                token, email, origin_flow, origin_request_id, issued_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&token.token)
        .bind(token.email.as_str())
        .bind(flow)
        .bind(request_id)
        .bind(token.issued_at)
        .bind(token.expires_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_token", e))?;
        Ok(())
    }

    async fn delete_tokens_for(&mut self, origin: TokenOrigin) -> StoreResult<u64> {
        let (flow, request_id) = origin_columns(origin);
        let result = sqlx::query(
            "DELETE FROM access_tokens WHERE origin_flow = $1 AND origin_request_id = $2",
        )
        .bind(flow)
        .bind(request_id)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("delete_tokens_for", e))?;
        Ok(result.rows_affected())
    }

    async fn merge_grant(&mut self, grant: &GatedAccessGrant) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO gated_access_grants (
                id, email, item_kind, item_id, expires_at, granted_by, source, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (email, item_kind, item_id)
            DO UPDATE SET
                expires_at = EXCLUDED.expires_at,
                granted_by = EXCLUDED.granted_by,
                source = EXCLUDED.source,
                created_at = EXCLUDED.created_at
            WHERE gated_access_grants.expires_at IS NOT NULL
              AND (
                  EXCLUDED.expires_at IS NULL
                  OR EXCLUDED.expires_at > gated_access_grants.expires_at
              )
            "#,
        )
        .bind(grant.id.as_uuid())
        .bind(grant.email.as_str())
        .bind(grant.item.kind().as_str())
        .bind(grant.item.id().as_uuid())
        .bind(grant.expires_at)
        .bind(grant.granted_by.map(Uuid::from))
        .bind(grant.source.as_str())
        .bind(grant.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("merge_grant", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_redemption_if_absent(&mut self, redemption: &Redemption) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO redemptions (code_id, email, redeemed_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (code_id, email) DO NOTHING
            "#,
        )
        .bind(redemption.code_id.as_uuid())
        .bind(redemption.email.as_str())
        .bind(redemption.redeemed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_redemption_if_absent", e))?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), fields(code_id = %code_id), err)]
    async fn increment_redemptions(&mut self, code_id: CodeId) -> StoreResult<Affected> {
        let result = sqlx::query(
            r#"
            UPDATE redemption_codes
            SET redeemed_count = redeemed_count + 1
            WHERE id = $1
              AND (max_redemptions IS NULL OR redeemed_count < max_redemptions)
            "#,
        )
        .bind(code_id.as_uuid())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("increment_redemptions", e))?;
        Ok(Affected::from(result.rows_affected()))
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

fn origin_columns(origin: TokenOrigin) -> (&'static str, Uuid) {
    match origin {
        TokenOrigin::Portal(id) => ("portal", *id.as_uuid()),
        TokenOrigin::TrustCenter(id) => ("trust_center", *id.as_uuid()),
        TokenOrigin::Redemption(id) => ("redemption", *id.as_uuid()),
    }
}

fn items_json(items: &[ItemRef]) -> StoreResult<JsonValue> {
    serde_json::to_value(items).map_err(|e| StoreError::Corrupt(format!("item list: {e}")))
}

fn items_from_json(value: JsonValue) -> StoreResult<Vec<ItemRef>> {
    serde_json::from_value(value).map_err(|e| StoreError::Corrupt(format!("item list: {e}")))
}

fn parse<T>(field: &str, raw: &str) -> StoreResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse()
        .map_err(|e| StoreError::Corrupt(format!("{field}: {e}")))
}

fn to_i32(field: &str, value: u32) -> StoreResult<i32> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{field}: {value} exceeds INTEGER")))
}

/// Row -> raw row struct -> domain type.
fn decode<R, T>(row: &PgRow) -> StoreResult<T>
where
    R: for<'r> FromRow<'r, PgRow>,
    T: TryFrom<R, Error = StoreError>,
{
    let raw = R::from_row(row).map_err(|e| map_sqlx_error("decode_row", e))?;
    T::try_from(raw)
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code() {
                Some(code) if code.as_ref() == "23505" => StoreError::Duplicate(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::ColumnDecode { index, source } => {
            StoreError::Corrupt(format!("column {index} in {operation}: {source}"))
        }
        sqlx::Error::ColumnNotFound(column) => {
            StoreError::Corrupt(format!("column {column} missing in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

// SQLx row types

struct SimpleRow {
    id: Uuid,
    email: String,
    name: Option<String>,
    company: Option<String>,
    status: String,
    full_access: bool,
    grant_items: JsonValue,
    created_at: DateTime<Utc>,
    reviewed_at: Option<DateTime<Utc>>,
    reviewed_by: Option<Uuid>,
}

impl<'r> FromRow<'r, PgRow> for SimpleRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(SimpleRow {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            name: row.try_get("name")?,
            company: row.try_get("company")?,
            status: row.try_get("status")?,
            full_access: row.try_get("full_access")?,
            grant_items: row.try_get("grant_items")?,
            created_at: row.try_get("created_at")?,
            reviewed_at: row.try_get("reviewed_at")?,
            reviewed_by: row.try_get("reviewed_by")?,
        })
    }
}

impl TryFrom<SimpleRow> for SimpleAccessRequest {
    type Error = StoreError;

    fn try_from(row: SimpleRow) -> StoreResult<Self> {
        Ok(SimpleAccessRequest {
            id: RequestId::from_uuid(row.id),
            email: parse("email", &row.email)?,
            name: row.name,
            company: row.company,
            status: parse("status", &row.status)?,
            grants: PortalGrants {
                full_access: row.full_access,
                items: items_from_json(row.grant_items)?.into_iter().collect(),
            },
            created_at: row.created_at,
            reviewed_at: row.reviewed_at,
            reviewed_by: row.reviewed_by.map(StaffId::from_uuid),
        })
    }
}

struct GatedRow {
    id: Uuid,
    email: String,
    name: String,
    company: Option<String>,
    nda_signature_id: Uuid,
    status: String,
    requested_items: JsonValue,
    created_at: DateTime<Utc>,
    reviewed_at: Option<DateTime<Utc>>,
    reviewed_by: Option<Uuid>,
    rejection_reason: Option<String>,
}

impl<'r> FromRow<'r, PgRow> for GatedRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(GatedRow {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            name: row.try_get("name")?,
            company: row.try_get("company")?,
            nda_signature_id: row.try_get("nda_signature_id")?,
            status: row.try_get("status")?,
            requested_items: row.try_get("requested_items")?,
            created_at: row.try_get("created_at")?,
            reviewed_at: row.try_get("reviewed_at")?,
            reviewed_by: row.try_get("reviewed_by")?,
            rejection_reason: row.try_get("rejection_reason")?,
        })
    }
}

impl TryFrom<GatedRow> for GatedAccessRequest {
    type Error = StoreError;

    fn try_from(row: GatedRow) -> StoreResult<Self> {
        Ok(GatedAccessRequest {
            id: GatedRequestId::from_uuid(row.id),
            email: parse("email", &row.email)?,
            name: row.name,
            company: row.company,
            nda_signature_id: SignatureId::from_uuid(row.nda_signature_id),
            status: parse("status", &row.status)?,
            requested_items: items_from_json(row.requested_items)?,
            created_at: row.created_at,
            reviewed_at: row.reviewed_at,
            reviewed_by: row.reviewed_by.map(StaffId::from_uuid),
            rejection_reason: row.rejection_reason,
        })
    }
}

struct SignatureRow {
    id: Uuid,
    email: String,
    name: String,
    company: Option<String>,
    agreement_id: Uuid,
    signed_at: DateTime<Utc>,
    ip_address: Option<String>,
}

impl<'r> FromRow<'r, PgRow> for SignatureRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(SignatureRow {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            name: row.try_get("name")?,
            company: row.try_get("company")?,
            agreement_id: row.try_get("agreement_id")?,
            signed_at: row.try_get("signed_at")?,
            ip_address: row.try_get("ip_address")?,
        })
    }
}

impl TryFrom<SignatureRow> for NdaSignature {
    type Error = StoreError;

    fn try_from(row: SignatureRow) -> StoreResult<Self> {
        Ok(NdaSignature {
            id: SignatureId::from_uuid(row.id),
            email: parse("email", &row.email)?,
            name: row.name,
            company: row.company,
            agreement_id: AgreementId::from_uuid(row.agreement_id),
            signed_at: row.signed_at,
            ip_address: row.ip_address,
        })
    }
}

struct GrantRow {
    id: Uuid,
    email: String,
    item_kind: String,
    item_id: Uuid,
    expires_at: Option<DateTime<Utc>>,
    granted_by: Option<Uuid>,
    source: String,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for GrantRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(GrantRow {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            item_kind: row.try_get("item_kind")?,
            item_id: row.try_get("item_id")?,
            expires_at: row.try_get("expires_at")?,
            granted_by: row.try_get("granted_by")?,
            source: row.try_get("source")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<GrantRow> for GatedAccessGrant {
    type Error = StoreError;

    fn try_from(row: GrantRow) -> StoreResult<Self> {
        let kind: ItemKind = parse("item_kind", &row.item_kind)?;
        let source: GrantSource = parse("source", &row.source)?;
        Ok(GatedAccessGrant {
            id: GrantId::from_uuid(row.id),
            email: parse("email", &row.email)?,
            item: ItemRef::new(kind, ItemId::from_uuid(row.item_id)),
            expires_at: row.expires_at,
            granted_by: row.granted_by.map(StaffId::from_uuid),
            source,
            created_at: row.created_at,
        })
    }
}

struct TokenRow {
    token: String,
    email: String,
    origin_flow: String,
    origin_request_id: Uuid,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for TokenRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(TokenRow {
            token: row.try_get("token")?,
            email: row.try_get("email")?,
            origin_flow: row.try_get("origin_flow")?,
            origin_request_id: row.try_get("origin_request_id")?,
            issued_at: row.try_get("issued_at")?,
            expires_at: row.try_get("expires_at")?,
        })
    }
}

impl TryFrom<TokenRow> for AccessToken {
    type Error = StoreError;

    fn try_from(row: TokenRow) -> StoreResult<Self> {
        let origin = match row.origin_flow.as_str() {
            "portal" => TokenOrigin::Portal(RequestId::from_uuid(row.origin_request_id)),
            "trust_center" => {
                TokenOrigin::TrustCenter(GatedRequestId::from_uuid(row.origin_request_id))
            }
            "redemption" => TokenOrigin::Redemption(CodeId::from_uuid(row.origin_request_id)),
            other => return Err(StoreError::Corrupt(format!("origin_flow: unknown '{other}'"))),
        };
        Ok(AccessToken {
            token: row.token,
            email: parse("email", &row.email)?,
            origin,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
        })
    }
}

struct BundleRow {
    id: Uuid,
    name: String,
    items: JsonValue,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for BundleRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(BundleRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            items: row.try_get("items")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<BundleRow> for Bundle {
    type Error = StoreError;

    fn try_from(row: BundleRow) -> StoreResult<Self> {
        Ok(Bundle {
            id: BundleId::from_uuid(row.id),
            name: row.name,
            items: items_from_json(row.items)?,
            created_at: row.created_at,
        })
    }
}

struct CodeRow {
    id: Uuid,
    bundle_id: Uuid,
    code: String,
    expires_at: Option<DateTime<Utc>>,
    max_redemptions: Option<i32>,
    redeemed_count: i32,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for CodeRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(CodeRow {
            id: row.try_get("id")?,
            bundle_id: row.try_get("bundle_id")?,
            code: row.try_get("code")?,
            expires_at: row.try_get("expires_at")?,
            max_redemptions: row.try_get("max_redemptions")?,
            redeemed_count: row.try_get("redeemed_count")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<CodeRow> for RedemptionCode {
    type Error = StoreError;

    fn try_from(row: CodeRow) -> StoreResult<Self> {
        let non_negative = |field: &str, v: i32| {
            u32::try_from(v).map_err(|_| StoreError::Corrupt(format!("{field}: negative value {v}")))
        };
        Ok(RedemptionCode {
            id: CodeId::from_uuid(row.id),
            bundle_id: BundleId::from_uuid(row.bundle_id),
            code: row.code,
            expires_at: row.expires_at,
            max_redemptions: row
                .max_redemptions
                .map(|m| non_negative("max_redemptions", m))
                .transpose()?,
            redeemed_count: non_negative("redeemed_count", row.redeemed_count)?,
            created_at: row.created_at,
        })
    }
}

struct RedemptionRow {
    code_id: Uuid,
    email: String,
    redeemed_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for RedemptionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(RedemptionRow {
            code_id: row.try_get("code_id")?,
            email: row.try_get("email")?,
            redeemed_at: row.try_get("redeemed_at")?,
        })
    }
}

impl TryFrom<RedemptionRow> for Redemption {
    type Error = StoreError;

    fn try_from(row: RedemptionRow) -> StoreResult<Self> {
        Ok(Redemption {
            code_id: CodeId::from_uuid(row.code_id),
            email: parse("email", &row.email)?,
            redeemed_at: row.redeemed_at,
        })
    }
}
