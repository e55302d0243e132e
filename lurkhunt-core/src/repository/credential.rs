use sqlx::{postgres::PgRow, PgPool, Row};

use crate::{models::CredentialRow, Result};

/// Credential repository for the singleton token row.
///
/// The table carries a constant `enforce_one_row` primary key so the upsert
/// can only ever touch one row.
#[derive(Clone)]
pub struct CredentialRepository {
    pool: PgPool,
}

impl CredentialRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn load(&self) -> Result<Option<CredentialRow>> {
        let row = sqlx::query(
            r"
            SELECT access_token, refresh_token, expires_at, token_type, scope, updated_at
            FROM credentials
            WHERE enforce_one_row = 'enforce_one_row'
            ",
        )
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_credential(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn upsert(&self, credential: &CredentialRow) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO credentials (enforce_one_row, access_token, refresh_token,
                                     expires_at, token_type, scope, updated_at)
            VALUES ('enforce_one_row', $1, $2, $3, $4, $5, $6)
            ON CONFLICT (enforce_one_row)
            DO UPDATE SET access_token = EXCLUDED.access_token,
                          refresh_token = EXCLUDED.refresh_token,
                          expires_at = EXCLUDED.expires_at,
                          token_type = EXCLUDED.token_type,
                          scope = EXCLUDED.scope,
                          updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(&credential.access_token)
        .bind(&credential.refresh_token)
        .bind(credential.expires_at)
        .bind(&credential.token_type)
        .bind(&credential.scope)
        .bind(credential.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_credential(row: &PgRow) -> Result<CredentialRow> {
    Ok(CredentialRow {
        access_token: row.try_get("access_token")?,
        refresh_token: row.try_get("refresh_token")?,
        expires_at: row.try_get("expires_at")?,
        token_type: row.try_get("token_type")?,
        scope: row.try_get("scope")?,
        updated_at: row.try_get("updated_at")?,
    })
}
