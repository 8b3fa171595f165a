use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use crate::tables::users::{self, Role, UserId};

pub type InstructorId = i64;

#[derive(Serialize, Deserialize, FromRow, Clone, Debug)]
pub struct InstructorsRecord {
    pub id: InstructorId,
    pub user_id: UserId,
    pub name: String,
    pub email: String,
    pub specialty: String,
    pub hired: String,
}

const SELECT_INSTRUCTORS: &str = "SELECT i.id, i.user_id, i.name, u.email, i.specialty, i.hired
    FROM instructors i JOIN users u ON i.user_id = u.id";

pub async fn list_instructors(pool: &SqlitePool) -> sqlx::Result<Vec<InstructorsRecord>> {
    sqlx::query_as::<_, InstructorsRecord>(&format!("{SELECT_INSTRUCTORS} ORDER BY i.name"))
        .fetch_all(pool)
        .await
}

pub async fn load_instructor(pool: &SqlitePool, instructor_id: InstructorId) -> sqlx::Result<Option<InstructorsRecord>> {
    sqlx::query_as::<_, InstructorsRecord>(&format!("{SELECT_INSTRUCTORS} WHERE i.id=?"))
        .bind(instructor_id)
        .fetch_optional(pool)
        .await
}

pub async fn load_instructor_by_user(pool: &SqlitePool, user_id: UserId) -> sqlx::Result<Option<InstructorsRecord>> {
    sqlx::query_as::<_, InstructorsRecord>(&format!("{SELECT_INSTRUCTORS} WHERE i.user_id=?"))
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

pub async fn create_instructor(pool: &SqlitePool, name: &str, email: &str, specialty: &str, password_hash: &str) -> sqlx::Result<InstructorId> {
    let mut txn = pool.begin().await?;
    let user_id = users::insert_user(&mut *txn, email, password_hash, Role::Instructor).await?;
    let id: (InstructorId,) = sqlx::query_as("INSERT INTO instructors (user_id, name, specialty) VALUES (?, ?, ?) RETURNING id")
        .bind(user_id)
        .bind(name)
        .bind(specialty)
        .fetch_one(&mut *txn)
        .await?;
    txn.commit().await?;
    info!("Instructor created, id: {}, email: {email}", id.0);
    Ok(id.0)
}

pub async fn update_instructor(pool: &SqlitePool, instructor: &InstructorsRecord, name: &str, email: &str, specialty: &str, password_hash: Option<&str>) -> sqlx::Result<()> {
    let mut txn = pool.begin().await?;
    users::update_credentials(&mut txn, instructor.user_id, email, password_hash).await?;
    sqlx::query("UPDATE instructors SET name=?, specialty=? WHERE id=?")
        .bind(name)
        .bind(specialty)
        .bind(instructor.id)
        .execute(&mut *txn)
        .await?;
    txn.commit().await?;
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    StillTeaching,
}

/// Deletes the instructor together with their login, unless some class still names them.
pub async fn delete_instructor(pool: &SqlitePool, instructor_id: InstructorId) -> sqlx::Result<DeleteOutcome> {
    let mut txn = pool.begin().await?;
    let user_id: Option<(UserId,)> = sqlx::query_as("SELECT user_id FROM instructors WHERE id=?")
        .bind(instructor_id)
        .fetch_optional(&mut *txn)
        .await?;
    let Some((user_id,)) = user_id else {
        return Ok(DeleteOutcome::NotFound);
    };
    let teaching: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM classes WHERE instructor_id=?)")
        .bind(instructor_id)
        .fetch_one(&mut *txn)
        .await?;
    if teaching.0 {
        return Ok(DeleteOutcome::StillTeaching);
    }
    users::delete_user(&mut *txn, user_id).await?;
    txn.commit().await?;
    Ok(DeleteOutcome::Deleted)
}

pub async fn count_instructors(pool: &SqlitePool) -> sqlx::Result<i64> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM instructors")
        .fetch_one(pool)
        .await?;
    Ok(count.0)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::test::{add_class, memory_pool};
    use crate::gymdatetime::GymDateTime;

    #[rocket::async_test]
    async fn test_delete_refused_while_teaching() {
        let pool = memory_pool().await;
        let id = create_instructor(&pool, "Carlos", "carlos@gym.local", "Yoga", "hash").await.unwrap();
        let class_id = add_class(&pool, id, GymDateTime::now(), 10).await;

        assert_eq!(delete_instructor(&pool, id).await.unwrap(), DeleteOutcome::StillTeaching);
        assert!(load_instructor(&pool, id).await.unwrap().is_some());
        assert!(users::load_user_by_email(&pool, "carlos@gym.local").await.unwrap().is_some());

        sqlx::query("DELETE FROM classes WHERE id=?").bind(class_id).execute(&pool).await.unwrap();
        assert_eq!(delete_instructor(&pool, id).await.unwrap(), DeleteOutcome::Deleted);
        assert_eq!(count_instructors(&pool).await.unwrap(), 0);
        assert!(users::load_user_by_email(&pool, "carlos@gym.local").await.unwrap().is_none());
        assert_eq!(delete_instructor(&pool, id).await.unwrap(), DeleteOutcome::NotFound);
    }

    #[rocket::async_test]
    async fn test_update_password_optional() {
        let pool = memory_pool().await;
        let id = create_instructor(&pool, "Carlos", "carlos@gym.local", "Yoga", "hash1").await.unwrap();
        let instructor = load_instructor(&pool, id).await.unwrap().unwrap();
        update_instructor(&pool, &instructor, "Carlos R.", "carlos@gym.local", "Pilates", None).await.unwrap();
        let user = users::load_user_by_email(&pool, "carlos@gym.local").await.unwrap().unwrap();
        assert_eq!(user.password_hash, "hash1");
        update_instructor(&pool, &instructor, "Carlos R.", "carlos@gym.local", "Pilates", Some("hash2")).await.unwrap();
        let user = users::load_user_by_email(&pool, "carlos@gym.local").await.unwrap().unwrap();
        assert_eq!(user.password_hash, "hash2");
        let instructor = load_instructor_by_user(&pool, user.id).await.unwrap().unwrap();
        assert_eq!(instructor.specialty, "Pilates");
    }
}
