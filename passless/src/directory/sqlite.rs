use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::{Pool, Row, Sqlite, sqlite::SqliteRow};

use crate::secret::{OtpSecret, Ticket};

use super::errors::DirectoryError;
use super::store::UserDirectory;
use super::types::{Authenticator, User, UserUpdate};

/// SQLite-backed directory.
pub struct SqliteDirectory {
    pool: Pool<Sqlite>,
}

impl SqliteDirectory {
    /// Connect and create the tables if they do not exist yet.
    pub async fn connect(url: &str) -> Result<Self, DirectoryError> {
        let pool = SqlitePool::connect(url)
            .await
            .map_err(|e| DirectoryError::Storage(e.to_string()))?;
        create_tables(&pool).await?;
        Ok(Self { pool })
    }
}

async fn create_tables(pool: &Pool<Sqlite>) -> Result<(), DirectoryError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY NOT NULL,
            email TEXT UNIQUE,
            new_email TEXT,
            display_name TEXT NOT NULL,
            locale TEXT NOT NULL,
            default_role TEXT NOT NULL,
            allowed_roles TEXT NOT NULL,
            disabled INTEGER NOT NULL,
            email_verified INTEGER NOT NULL,
            is_anonymous INTEGER NOT NULL,
            ticket TEXT,
            ticket_expires_at TIMESTAMP,
            otp_hash TEXT,
            otp_hash_expires_at TIMESTAMP,
            otp_method_last_used TEXT,
            current_challenge TEXT,
            active_mfa_type TEXT,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DirectoryError::Storage(e.to_string()))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS authenticators (
            credential_id TEXT PRIMARY KEY NOT NULL,
            user_id TEXT NOT NULL,
            public_key BLOB NOT NULL,
            alg INTEGER NOT NULL,
            counter INTEGER NOT NULL,
            nickname TEXT,
            created_at TIMESTAMP NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users (id)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DirectoryError::Storage(e.to_string()))?;

    Ok(())
}

fn user_from_row(row: &SqliteRow) -> Result<User, DirectoryError> {
    let allowed_roles: String = row
        .try_get("allowed_roles")
        .map_err(|e| DirectoryError::Storage(e.to_string()))?;
    let allowed_roles: Vec<String> = serde_json::from_str(&allowed_roles)?;

    let ticket = match (
        get::<Option<String>>(row, "ticket")?,
        get::<Option<DateTime<Utc>>>(row, "ticket_expires_at")?,
    ) {
        (Some(value), Some(expires_at)) => Some(Ticket { value, expires_at }),
        _ => None,
    };
    let otp = match (
        get::<Option<String>>(row, "otp_hash")?,
        get::<Option<DateTime<Utc>>>(row, "otp_hash_expires_at")?,
    ) {
        (Some(hash), Some(expires_at)) => Some(OtpSecret { hash, expires_at }),
        _ => None,
    };

    Ok(User {
        id: get(row, "id")?,
        email: get(row, "email")?,
        new_email: get(row, "new_email")?,
        display_name: get(row, "display_name")?,
        locale: get(row, "locale")?,
        default_role: get(row, "default_role")?,
        allowed_roles,
        disabled: get(row, "disabled")?,
        email_verified: get(row, "email_verified")?,
        is_anonymous: get(row, "is_anonymous")?,
        ticket,
        otp,
        otp_method_last_used: get(row, "otp_method_last_used")?,
        current_challenge: get(row, "current_challenge")?,
        active_mfa_type: get(row, "active_mfa_type")?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

fn get<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T, DirectoryError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(column)
        .map_err(|e| DirectoryError::Storage(e.to_string()))
}

fn authenticator_from_row(row: &SqliteRow) -> Result<Authenticator, DirectoryError> {
    Ok(Authenticator {
        credential_id: get(row, "credential_id")?,
        user_id: get(row, "user_id")?,
        public_key: get(row, "public_key")?,
        alg: get(row, "alg")?,
        counter: get::<i64>(row, "counter")? as u32,
        nickname: get(row, "nickname")?,
        created_at: get(row, "created_at")?,
    })
}

async fn write_user(pool: &Pool<Sqlite>, user: &User) -> Result<(), DirectoryError> {
    let allowed_roles = serde_json::to_string(&user.allowed_roles)?;
    let result = sqlx::query(
        r#"
        INSERT INTO users (
            id, email, new_email, display_name, locale, default_role,
            allowed_roles, disabled, email_verified, is_anonymous,
            ticket, ticket_expires_at, otp_hash, otp_hash_expires_at,
            otp_method_last_used, current_challenge, active_mfa_type,
            created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (id) DO UPDATE SET
            email = excluded.email,
            new_email = excluded.new_email,
            display_name = excluded.display_name,
            locale = excluded.locale,
            default_role = excluded.default_role,
            allowed_roles = excluded.allowed_roles,
            disabled = excluded.disabled,
            email_verified = excluded.email_verified,
            is_anonymous = excluded.is_anonymous,
            ticket = excluded.ticket,
            ticket_expires_at = excluded.ticket_expires_at,
            otp_hash = excluded.otp_hash,
            otp_hash_expires_at = excluded.otp_hash_expires_at,
            otp_method_last_used = excluded.otp_method_last_used,
            current_challenge = excluded.current_challenge,
            active_mfa_type = excluded.active_mfa_type,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&user.id)
    .bind(&user.email)
    .bind(&user.new_email)
    .bind(&user.display_name)
    .bind(&user.locale)
    .bind(&user.default_role)
    .bind(allowed_roles)
    .bind(user.disabled)
    .bind(user.email_verified)
    .bind(user.is_anonymous)
    .bind(user.ticket.as_ref().map(|t| t.value.clone()))
    .bind(user.ticket.as_ref().map(|t| t.expires_at))
    .bind(user.otp.as_ref().map(|o| o.hash.clone()))
    .bind(user.otp.as_ref().map(|o| o.expires_at))
    .bind(&user.otp_method_last_used)
    .bind(&user.current_challenge)
    .bind(&user.active_mfa_type)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(e) => Err(classify_sqlx_error(e)),
    }
}

fn classify_sqlx_error(err: sqlx::Error) -> DirectoryError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            return DirectoryError::DuplicateEmail;
        }
    }
    DirectoryError::Storage(err.to_string())
}

#[async_trait]
impl UserDirectory for SqliteDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DirectoryError> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DirectoryError::Storage(e.to_string()))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, DirectoryError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DirectoryError::Storage(e.to_string()))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_by_ticket(&self, ticket: &str) -> Result<Option<User>, DirectoryError> {
        let row = sqlx::query("SELECT * FROM users WHERE ticket = ?")
            .bind(ticket)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DirectoryError::Storage(e.to_string()))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn insert_user(&self, user: User) -> Result<User, DirectoryError> {
        if self.find_by_id(&user.id).await?.is_some() {
            return Err(DirectoryError::Storage("duplicate user id".to_string()));
        }
        write_user(&self.pool, &user).await?;
        Ok(user)
    }

    async fn update_user(&self, id: &str, update: UserUpdate) -> Result<(), DirectoryError> {
        // Read-modify-write; no CAS by design, completion paths re-read
        // before comparing secrets.
        let mut user = self.find_by_id(id).await?.ok_or(DirectoryError::NotFound)?;
        update.apply(&mut user);
        write_user(&self.pool, &user).await
    }

    async fn add_authenticator(&self, authenticator: Authenticator) -> Result<(), DirectoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO authenticators (
                credential_id, user_id, public_key, alg, counter, nickname, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&authenticator.credential_id)
        .bind(&authenticator.user_id)
        .bind(&authenticator.public_key)
        .bind(authenticator.alg)
        .bind(authenticator.counter as i64)
        .bind(&authenticator.nickname)
        .bind(authenticator.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                if let Some(db_err) = e.as_database_error() {
                    if db_err.is_unique_violation() {
                        return Err(DirectoryError::DuplicateCredential);
                    }
                }
                Err(DirectoryError::Storage(e.to_string()))
            }
        }
    }

    async fn authenticators_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Authenticator>, DirectoryError> {
        let rows =
            sqlx::query("SELECT * FROM authenticators WHERE user_id = ? ORDER BY created_at")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| DirectoryError::Storage(e.to_string()))?;
        rows.iter().map(authenticator_from_row).collect()
    }

    async fn find_authenticator(
        &self,
        credential_id: &str,
    ) -> Result<Option<Authenticator>, DirectoryError> {
        let row = sqlx::query("SELECT * FROM authenticators WHERE credential_id = ?")
            .bind(credential_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DirectoryError::Storage(e.to_string()))?;
        row.as_ref().map(authenticator_from_row).transpose()
    }

    async fn update_authenticator_counter(
        &self,
        credential_id: &str,
        counter: u32,
    ) -> Result<(), DirectoryError> {
        sqlx::query("UPDATE authenticators SET counter = ? WHERE credential_id = ?")
            .bind(counter as i64)
            .bind(credential_id)
            .execute(&self.pool)
            .await
            .map_err(|e| DirectoryError::Storage(e.to_string()))?;
        Ok(())
    }
}
