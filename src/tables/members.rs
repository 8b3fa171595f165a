use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use crate::gymdatetime::GymDateTime;
use crate::tables::users::{self, Role, UserId};

pub type MemberId = i64;

#[derive(Serialize, Deserialize, FromRow, Clone, Debug)]
pub struct MembersRecord {
    pub id: MemberId,
    pub user_id: UserId,
    pub name: String,
    pub email: String,
    pub birth_date: String,
    pub gender: String,
    pub registered: GymDateTime,
}

const SELECT_MEMBERS: &str = "SELECT m.id, m.user_id, m.name, u.email, m.birth_date, m.gender, m.registered
    FROM members m JOIN users u ON m.user_id = u.id";

#[derive(Debug, Clone)]
pub struct MemberProfile<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub birth_date: &'a str,
    pub gender: &'a str,
}

pub async fn list_members(pool: &SqlitePool) -> sqlx::Result<Vec<MembersRecord>> {
    sqlx::query_as::<_, MembersRecord>(&format!("{SELECT_MEMBERS} ORDER BY m.name"))
        .fetch_all(pool)
        .await
}

pub async fn load_member(pool: &SqlitePool, member_id: MemberId) -> sqlx::Result<Option<MembersRecord>> {
    sqlx::query_as::<_, MembersRecord>(&format!("{SELECT_MEMBERS} WHERE m.id=?"))
        .bind(member_id)
        .fetch_optional(pool)
        .await
}

pub async fn load_member_by_user(pool: &SqlitePool, user_id: UserId) -> sqlx::Result<Option<MembersRecord>> {
    sqlx::query_as::<_, MembersRecord>(&format!("{SELECT_MEMBERS} WHERE m.user_id=?"))
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

/// Creates the login account and the member profile together.
pub async fn create_member(pool: &SqlitePool, profile: &MemberProfile<'_>, password_hash: &str) -> sqlx::Result<MemberId> {
    let mut txn = pool.begin().await?;
    let user_id = users::insert_user(&mut *txn, profile.email, password_hash, Role::Member).await?;
    let id: (MemberId,) = sqlx::query_as("INSERT INTO members (user_id, name, birth_date, gender) VALUES (?, ?, ?, ?) RETURNING id")
        .bind(user_id)
        .bind(profile.name)
        .bind(profile.birth_date)
        .bind(profile.gender)
        .fetch_one(&mut *txn)
        .await?;
    txn.commit().await?;
    info!("Member created, id: {}, email: {}", id.0, profile.email);
    Ok(id.0)
}

pub async fn update_member(pool: &SqlitePool, member: &MembersRecord, profile: &MemberProfile<'_>, password_hash: Option<&str>) -> sqlx::Result<()> {
    let mut txn = pool.begin().await?;
    users::update_credentials(&mut txn, member.user_id, profile.email, password_hash).await?;
    sqlx::query("UPDATE members SET name=?, birth_date=?, gender=? WHERE id=?")
        .bind(profile.name)
        .bind(profile.birth_date)
        .bind(profile.gender)
        .bind(member.id)
        .execute(&mut *txn)
        .await?;
    txn.commit().await?;
    Ok(())
}

/// Deletes the member's user account; the profile and reservations go with it.
pub async fn delete_member(pool: &SqlitePool, member_id: MemberId) -> sqlx::Result<bool> {
    let Some(member) = load_member(pool, member_id).await? else {
        return Ok(false);
    };
    let deleted = users::delete_user(pool, member.user_id).await?;
    Ok(deleted > 0)
}

pub async fn count_members(pool: &SqlitePool) -> sqlx::Result<i64> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM members")
        .fetch_one(pool)
        .await?;
    Ok(count.0)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::test::memory_pool;

    fn profile<'a>(name: &'a str, email: &'a str) -> MemberProfile<'a> {
        MemberProfile { name, email, birth_date: "1990-05-01", gender: "F" }
    }

    #[rocket::async_test]
    async fn test_create_update_delete() {
        let pool = memory_pool().await;
        let id = create_member(&pool, &profile("Anna", "anna@gym.local"), "hash").await.unwrap();
        let member = load_member(&pool, id).await.unwrap().unwrap();
        assert_eq!(member.email, "anna@gym.local");

        update_member(&pool, &member, &profile("Anna K.", "anna.k@gym.local"), None).await.unwrap();
        let member = load_member_by_user(&pool, member.user_id).await.unwrap().unwrap();
        assert_eq!(member.name, "Anna K.");
        assert_eq!(member.email, "anna.k@gym.local");

        assert!(delete_member(&pool, id).await.unwrap());
        assert!(load_member(&pool, id).await.unwrap().is_none());
        assert!(users::load_user_by_email(&pool, "anna.k@gym.local").await.unwrap().is_none());
        assert!(!delete_member(&pool, id).await.unwrap());
    }

    #[rocket::async_test]
    async fn test_duplicate_email_leaves_nothing_behind() {
        let pool = memory_pool().await;
        create_member(&pool, &profile("Anna", "anna@gym.local"), "hash").await.unwrap();
        let err = create_member(&pool, &profile("Other Anna", "anna@gym.local"), "hash").await.unwrap_err();
        assert!(crate::util::is_unique_violation(&err));
        assert_eq!(count_members(&pool).await.unwrap(), 1);
    }
}
