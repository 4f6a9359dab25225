//! Postgres-backed identity store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::{IdentityStore, StoreError};
use crate::identity::model::{
    AccountKind, FederatedGrant, LinkedAccount, NewSession, NewUser, ProviderTokens, Session,
    User, VerificationToken,
};

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

const USER_COLUMNS: &str = "id, email, password, name, image, email_verified";
const ACCOUNT_COLUMNS: &str = "id, user_id, type, provider, provider_account_id, refresh_token, \
     access_token, expires_at, token_type, scope, id_token, session_state";

fn db_span(operation: &'static str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    sqlstate(err).is_some_and(|code| code == "23505")
}

pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    sqlstate(err).is_some_and(|code| code == "23503")
}

fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|code| code.to_string()),
        _ => None,
    }
}

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password")?,
        name: row.try_get("name")?,
        image: row.try_get("image")?,
        email_verified: row.try_get("email_verified")?,
    })
}

fn account_from_row(row: &PgRow) -> Result<LinkedAccount, StoreError> {
    let kind: String = row.try_get("type")?;
    let kind = kind
        .parse::<AccountKind>()
        .map_err(|err| sqlx::Error::Decode(err.into()))?;
    Ok(LinkedAccount {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        kind,
        provider: row.try_get("provider")?,
        provider_account_id: row.try_get("provider_account_id")?,
        tokens: ProviderTokens {
            access_token: row.try_get("access_token")?,
            refresh_token: row.try_get("refresh_token")?,
            id_token: row.try_get("id_token")?,
            expires_at: row.try_get("expires_at")?,
            token_type: row.try_get("token_type")?,
            scope: row.try_get("scope")?,
        },
        session_state: row.try_get("session_state")?,
    })
}

fn session_from_row(row: &PgRow) -> Result<Session, StoreError> {
    Ok(Session {
        id: row.try_get("id")?,
        token_hash: row.try_get("session_token_hash")?,
        user_id: row.try_get("user_id")?,
        account_id: row.try_get("account_id")?,
        expires: row.try_get("expires")?,
    })
}

/// Split the schema file into individual statements for `sqlx::query`.
fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("--") || trimmed.is_empty() {
            continue;
        }
        current.push_str(line);
        current.push('\n');

        if trimmed.ends_with(';') {
            statements.push(current.trim().to_string());
            current.clear();
        }
    }

    let leftover = current.trim();
    if !leftover.is_empty() {
        statements.push(leftover.to_string());
    }

    statements
}

#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply `sql/schema.sql`. Safe to run repeatedly.
    ///
    /// # Errors
    /// Returns an error if any schema statement fails.
    pub async fn apply_schema(&self) -> Result<(), StoreError> {
        for statement in split_sql_statements(SCHEMA_SQL) {
            sqlx::query(&statement)
                .execute(&self.pool)
                .instrument(db_span("DDL", &statement))
                .await?;
        }
        Ok(())
    }
}

async fn insert_user<'e, E>(executor: E, user: NewUser) -> Result<User, StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let query = r"
        INSERT INTO users (id, email, password, name, image, email_verified)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, email, password, name, image, email_verified
    ";
    let row = sqlx::query(query)
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(&user.image)
        .bind(user.email_verified)
        .fetch_one(executor)
        .instrument(db_span("INSERT", query))
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::Conflict("users.email")
            } else {
                StoreError::Database(err)
            }
        })?;
    user_from_row(&row)
}

async fn insert_account<'e, E>(
    executor: E,
    user_id: Uuid,
    grant: &FederatedGrant,
) -> Result<LinkedAccount, StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let query = r"
        INSERT INTO accounts
            (id, user_id, type, provider, provider_account_id, refresh_token,
             access_token, expires_at, token_type, scope, id_token, session_state)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING id, user_id, type, provider, provider_account_id, refresh_token,
                  access_token, expires_at, token_type, scope, id_token, session_state
    ";
    let tokens = &grant.tokens;
    let row = sqlx::query(query)
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(grant.kind.as_str())
        .bind(&grant.provider)
        .bind(&grant.provider_account_id)
        .bind(&tokens.refresh_token)
        .bind(&tokens.access_token)
        .bind(tokens.expires_at)
        .bind(&tokens.token_type)
        .bind(&tokens.scope)
        .bind(&tokens.id_token)
        .bind(&grant.session_state)
        .fetch_one(executor)
        .instrument(db_span("INSERT", query))
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::Conflict("accounts.provider_account_id")
            } else if is_foreign_key_violation(&err) {
                StoreError::OrphanReference(user_id)
            } else {
                StoreError::Database(err)
            }
        })?;
    account_from_row(&row)
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let query = "SELECT 1";
        sqlx::query(query)
            .execute(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        Ok(())
    }

    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1 LIMIT 1");
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        insert_user(&self.pool, user).await
    }

    async fn user_by_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<Option<(User, LinkedAccount)>, StoreError> {
        let query = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE provider = $1 AND provider_account_id = $2"
        );
        let row = sqlx::query(&query)
            .bind(provider)
            .bind(provider_account_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let account = account_from_row(&row)?;
        let user = self.user_by_id(account.user_id).await?;
        Ok(user.map(|user| (user, account)))
    }

    async fn create_user_with_account(
        &self,
        user: NewUser,
        grant: &FederatedGrant,
    ) -> Result<(User, LinkedAccount), StoreError> {
        // Either both rows land or neither does.
        let mut tx = self.pool.begin().await?;
        let user = match insert_user(&mut *tx, user).await {
            Ok(user) => user,
            Err(err) => {
                let _ = tx.rollback().await;
                return Err(err);
            }
        };
        let account = match insert_account(&mut *tx, user.id, grant).await {
            Ok(account) => account,
            Err(err) => {
                let _ = tx.rollback().await;
                return Err(err);
            }
        };
        tx.commit().await?;
        Ok((user, account))
    }

    async fn link_account(
        &self,
        user_id: Uuid,
        grant: &FederatedGrant,
    ) -> Result<LinkedAccount, StoreError> {
        insert_account(&self.pool, user_id, grant).await
    }

    async fn account_by_id(&self, id: Uuid) -> Result<Option<LinkedAccount>, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn update_account_tokens(
        &self,
        account_id: Uuid,
        tokens: &ProviderTokens,
    ) -> Result<(), StoreError> {
        let query = r"
            UPDATE accounts
            SET access_token = $2,
                refresh_token = COALESCE($3, refresh_token),
                id_token = $4,
                expires_at = $5,
                token_type = $6,
                scope = $7
            WHERE id = $1
        ";
        sqlx::query(query)
            .bind(account_id)
            .bind(&tokens.access_token)
            .bind(&tokens.refresh_token)
            .bind(&tokens.id_token)
            .bind(tokens.expires_at)
            .bind(&tokens.token_type)
            .bind(&tokens.scope)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await?;
        Ok(())
    }

    async fn create_session(&self, session: NewSession) -> Result<Session, StoreError> {
        let query = r"
            INSERT INTO sessions (id, session_token_hash, user_id, account_id, expires)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, session_token_hash, user_id, account_id, expires
        ";
        let row = sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(&session.token_hash)
            .bind(session.user_id)
            .bind(session.account_id)
            .bind(session.expires)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", query))
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    StoreError::Conflict("sessions.session_token_hash")
                } else if is_foreign_key_violation(&err) {
                    StoreError::OrphanReference(session.user_id)
                } else {
                    StoreError::Database(err)
                }
            })?;
        session_from_row(&row)
    }

    async fn session_by_token_hash(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<Session>, StoreError> {
        let query = r"
            SELECT id, session_token_hash, user_id, account_id, expires
            FROM sessions
            WHERE session_token_hash = $1
            LIMIT 1
        ";
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        row.as_ref().map(session_from_row).transpose()
    }

    async fn delete_session(&self, token_hash: &[u8]) -> Result<(), StoreError> {
        let query = "DELETE FROM sessions WHERE session_token_hash = $1";
        sqlx::query(query)
            .bind(token_hash)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await?;
        Ok(())
    }

    async fn create_verification_token(&self, token: VerificationToken) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO verification_tokens (identifier, token_hash, expires)
            VALUES ($1, $2, $3)
        ";
        sqlx::query(query)
            .bind(&token.identifier)
            .bind(&token.token_hash)
            .bind(token.expires)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    StoreError::Conflict("verification_tokens.pkey")
                } else {
                    StoreError::Database(err)
                }
            })?;
        Ok(())
    }

    async fn use_verification_token(
        &self,
        identifier: &str,
        token_hash: &[u8],
    ) -> Result<Option<VerificationToken>, StoreError> {
        let query = r"
            DELETE FROM verification_tokens
            WHERE identifier = $1 AND token_hash = $2
            RETURNING identifier, token_hash, expires
        ";
        let row = sqlx::query(query)
            .bind(identifier)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(db_span("DELETE", query))
            .await?;
        row.map(|row| {
            Ok(VerificationToken {
                identifier: row.try_get("identifier")?,
                token_hash: row.try_get("token_hash")?,
                expires: row.try_get("expires")?,
            })
        })
        .transpose()
    }

    async fn mark_email_verified(
        &self,
        email: &str,
        verified_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let query = "UPDATE users SET email_verified = $2 WHERE email = $1";
        let result = sqlx::query(query)
            .bind(email)
            .bind(verified_at)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
