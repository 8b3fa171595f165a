use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use crate::gymdatetime::GymDateTime;
use crate::tables::facilities::FacilityId;
use crate::tables::instructors::InstructorId;

pub type ClassId = i64;

#[derive(Serialize, Deserialize, FromRow, Clone, Debug)]
pub struct ClassesRecord {
    pub id: ClassId,
    pub name: String,
    pub kind: String,
    pub instructor_id: InstructorId,
    pub facility_id: FacilityId,
    pub start_time: GymDateTime,
    pub duration_min: i64,
    pub max_capacity: i64,
}

/// Class joined with its instructor, facility and confirmed seat count.
#[derive(Serialize, Deserialize, FromRow, Clone, Debug)]
pub struct ClassOverview {
    pub id: ClassId,
    pub name: String,
    pub kind: String,
    pub instructor_id: InstructorId,
    pub instructor_name: String,
    pub facility_id: FacilityId,
    pub facility_name: String,
    pub start_time: GymDateTime,
    pub duration_min: i64,
    pub max_capacity: i64,
    pub confirmed: i64,
    pub remaining: i64,
}

const SELECT_OVERVIEW: &str = "SELECT c.id, c.name, c.kind,
        c.instructor_id, i.name AS instructor_name,
        c.facility_id, f.name AS facility_name,
        c.start_time, c.duration_min, c.max_capacity,
        COUNT(r.id) AS confirmed,
        c.max_capacity - COUNT(r.id) AS remaining
    FROM classes c
    JOIN instructors i ON c.instructor_id = i.id
    JOIN facilities f ON c.facility_id = f.id
    LEFT JOIN reservations r ON r.class_id = c.id AND r.status = 'Confirmed'";

/// Validated values of a class form.
#[derive(Debug, Clone)]
pub struct ClassDraft {
    pub name: String,
    pub kind: String,
    pub instructor_id: InstructorId,
    pub facility_id: FacilityId,
    pub start_time: GymDateTime,
    pub duration_min: i64,
    pub max_capacity: i64,
}

pub async fn load_class(pool: &SqlitePool, class_id: ClassId) -> sqlx::Result<Option<ClassesRecord>> {
    sqlx::query_as::<_, ClassesRecord>("SELECT * FROM classes WHERE id=?")
        .bind(class_id)
        .fetch_optional(pool)
        .await
}

pub async fn load_class_overview(pool: &SqlitePool, class_id: ClassId) -> sqlx::Result<Option<ClassOverview>> {
    sqlx::query_as::<_, ClassOverview>(&format!("{SELECT_OVERVIEW} WHERE c.id=? GROUP BY c.id"))
        .bind(class_id)
        .fetch_optional(pool)
        .await
}

pub async fn list_classes(pool: &SqlitePool) -> sqlx::Result<Vec<ClassOverview>> {
    sqlx::query_as::<_, ClassOverview>(&format!("{SELECT_OVERVIEW} GROUP BY c.id ORDER BY c.start_time DESC"))
        .fetch_all(pool)
        .await
}

/// Classes starting after `now` with at least one free seat, soonest first.
pub async fn list_bookable_classes(pool: &SqlitePool, now: GymDateTime) -> sqlx::Result<Vec<ClassOverview>> {
    sqlx::query_as::<_, ClassOverview>(&format!("{SELECT_OVERVIEW}
        WHERE c.start_time > ?
        GROUP BY c.id
        HAVING remaining > 0
        ORDER BY c.start_time"))
        .bind(now)
        .fetch_all(pool)
        .await
}

pub async fn list_instructor_classes(pool: &SqlitePool, instructor_id: InstructorId) -> sqlx::Result<Vec<ClassOverview>> {
    sqlx::query_as::<_, ClassOverview>(&format!("{SELECT_OVERVIEW} WHERE c.instructor_id=? GROUP BY c.id ORDER BY c.start_time"))
        .bind(instructor_id)
        .fetch_all(pool)
        .await
}

/// Most booked classes by confirmed reservations.
pub async fn list_top_classes(pool: &SqlitePool, limit: i64) -> sqlx::Result<Vec<ClassOverview>> {
    sqlx::query_as::<_, ClassOverview>(&format!("{SELECT_OVERVIEW}
        GROUP BY c.id
        HAVING confirmed > 0
        ORDER BY confirmed DESC, c.start_time
        LIMIT ?"))
        .bind(limit)
        .fetch_all(pool)
        .await
}

pub async fn insert_class(pool: &SqlitePool, draft: &ClassDraft) -> sqlx::Result<ClassId> {
    let id: (ClassId,) = sqlx::query_as("INSERT INTO classes (name, kind, instructor_id, facility_id, start_time, duration_min, max_capacity)
        VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id")
        .bind(&draft.name)
        .bind(&draft.kind)
        .bind(draft.instructor_id)
        .bind(draft.facility_id)
        .bind(draft.start_time)
        .bind(draft.duration_min)
        .bind(draft.max_capacity)
        .fetch_one(pool)
        .await?;
    info!("Class created, id: {}, name: {}, start: {}", id.0, draft.name, draft.start_time);
    Ok(id.0)
}

pub async fn update_class(pool: &SqlitePool, class_id: ClassId, draft: &ClassDraft) -> sqlx::Result<()> {
    sqlx::query("UPDATE classes SET name=?, kind=?, instructor_id=?, facility_id=?, start_time=?, duration_min=?, max_capacity=? WHERE id=?")
        .bind(&draft.name)
        .bind(&draft.kind)
        .bind(draft.instructor_id)
        .bind(draft.facility_id)
        .bind(draft.start_time)
        .bind(draft.duration_min)
        .bind(draft.max_capacity)
        .bind(class_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Reservations of the class are deleted with it.
pub async fn delete_class(pool: &SqlitePool, class_id: ClassId) -> sqlx::Result<bool> {
    let res = sqlx::query("DELETE FROM classes WHERE id=?")
        .bind(class_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn count_upcoming_classes(pool: &SqlitePool, now: GymDateTime, instructor_id: Option<InstructorId>) -> sqlx::Result<i64> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM classes WHERE start_time > ? AND (? IS NULL OR instructor_id = ?)")
        .bind(now)
        .bind(instructor_id)
        .bind(instructor_id)
        .fetch_one(pool)
        .await?;
    Ok(count.0)
}

pub async fn count_classes(pool: &SqlitePool) -> sqlx::Result<i64> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM classes")
        .fetch_one(pool)
        .await?;
    Ok(count.0)
}

#[cfg(test)]
mod test {
    use chrono::TimeDelta;
    use super::*;
    use crate::db::test::{add_class, add_instructor, add_member, memory_pool};

    async fn confirm(pool: &SqlitePool, member_id: i64, class_id: ClassId) {
        sqlx::query("INSERT INTO reservations (member_id, class_id, status, created) VALUES (?, ?, 'Confirmed', ?)")
            .bind(member_id)
            .bind(class_id)
            .bind(GymDateTime::now())
            .execute(pool).await.unwrap();
    }

    #[rocket::async_test]
    async fn test_bookable_classes() {
        let pool = memory_pool().await;
        let now = GymDateTime::now();
        let instructor = add_instructor(&pool, "carlos@gym.local").await;
        let past = add_class(&pool, instructor, now.checked_sub(TimeDelta::hours(1)).unwrap(), 5).await;
        let later = add_class(&pool, instructor, now.checked_add(TimeDelta::days(2)).unwrap(), 5).await;
        let soon = add_class(&pool, instructor, now.checked_add(TimeDelta::hours(2)).unwrap(), 5).await;
        let full = add_class(&pool, instructor, now.checked_add(TimeDelta::hours(3)).unwrap(), 1).await;
        let member = add_member(&pool, "anna@gym.local").await;
        confirm(&pool, member, full).await;
        confirm(&pool, member, later).await;

        let bookable = list_bookable_classes(&pool, now).await.unwrap();
        let ids = bookable.iter().map(|c| c.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![soon, later]);
        assert_eq!(bookable[1].confirmed, 1);
        assert_eq!(bookable[1].remaining, 4);
        assert!(!ids.contains(&past));

        let top = list_top_classes(&pool, 5).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(count_upcoming_classes(&pool, now, Some(instructor)).await.unwrap(), 3);
        assert_eq!(count_upcoming_classes(&pool, now, None).await.unwrap(), 3);
        assert_eq!(count_classes(&pool).await.unwrap(), 4);
    }

    #[rocket::async_test]
    async fn test_delete_class_cascades() {
        let pool = memory_pool().await;
        let instructor = add_instructor(&pool, "carlos@gym.local").await;
        let class_id = add_class(&pool, instructor, GymDateTime::now(), 3).await;
        let member = add_member(&pool, "anna@gym.local").await;
        confirm(&pool, member, class_id).await;
        assert!(delete_class(&pool, class_id).await.unwrap());
        let left: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM reservations")
            .fetch_one(&pool).await.unwrap();
        assert_eq!(left.0, 0);
        assert!(!delete_class(&pool, class_id).await.unwrap());
    }
}
