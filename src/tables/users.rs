use std::fmt::{Display, Formatter};
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use crate::impl_sqlx_text_type_encode_decode;
use crate::tables::ParseEnumError;

pub type UserId = i64;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Administrator,
    Instructor,
    Member,
}
impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Administrator => f.write_str("Administrator"),
            Role::Instructor => f.write_str("Instructor"),
            Role::Member => f.write_str("Member"),
        }
    }
}
impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Administrator" => Ok(Role::Administrator),
            "Instructor" => Ok(Role::Instructor),
            "Member" => Ok(Role::Member),
            _ => Err(ParseEnumError { what: "role", value: s.to_string() }),
        }
    }
}
impl_sqlx_text_type_encode_decode!(Role);

#[derive(FromRow, Clone, Debug)]
pub struct UsersRecord {
    pub id: UserId,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

pub async fn load_user_by_email(pool: &SqlitePool, email: &str) -> sqlx::Result<Option<UsersRecord>> {
    sqlx::query_as::<_, UsersRecord>("SELECT id, email, password_hash, role FROM users WHERE email=?")
        .bind(email)
        .fetch_optional(pool)
        .await
}

pub async fn insert_user<'e, E>(executor: E, email: &str, password_hash: &str, role: Role) -> sqlx::Result<UserId>
where E: sqlx::Executor<'e, Database = sqlx::Sqlite>
{
    let id: (UserId,) = sqlx::query_as("INSERT INTO users (email, password_hash, role) VALUES (?, ?, ?) RETURNING id")
        .bind(email)
        .bind(password_hash)
        .bind(role)
        .fetch_one(executor)
        .await?;
    Ok(id.0)
}

/// Updates login email and, when given, the password hash.
pub async fn update_credentials(conn: &mut SqliteConnection, user_id: UserId, email: &str, password_hash: Option<&str>) -> sqlx::Result<()> {
    if let Some(password_hash) = password_hash {
        sqlx::query("UPDATE users SET email=?, password_hash=? WHERE id=?")
            .bind(email)
            .bind(password_hash)
            .bind(user_id)
            .execute(&mut *conn)
            .await?;
    } else {
        sqlx::query("UPDATE users SET email=? WHERE id=?")
            .bind(email)
            .bind(user_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// True when another user than `except` already uses `email`.
pub async fn email_taken(pool: &SqlitePool, email: &str, except: Option<UserId>) -> sqlx::Result<bool> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE email=? AND id<>?")
        .bind(email)
        .bind(except.unwrap_or(0))
        .fetch_one(pool)
        .await?;
    Ok(count.0 > 0)
}

pub async fn delete_user<'e, E>(executor: E, user_id: UserId) -> sqlx::Result<u64>
where E: sqlx::Executor<'e, Database = sqlx::Sqlite>
{
    let res = sqlx::query("DELETE FROM users WHERE id=?")
        .bind(user_id)
        .execute(executor)
        .await?;
    Ok(res.rows_affected())
}
