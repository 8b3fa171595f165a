use std::fmt::{Display, Formatter};
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;
use crate::gymdatetime::GymDateTime;
use crate::impl_sqlx_text_type_encode_decode;
use crate::tables::ParseEnumError;
use crate::tables::classes::ClassId;
use crate::tables::members::MemberId;

pub type ReservationId = i64;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReservationStatus {
    Confirmed,
    Cancelled,
    Completed,
}
impl ReservationStatus {
    pub const ALL: [ReservationStatus; 3] = [Self::Confirmed, Self::Cancelled, Self::Completed];

    /// Confirmed may end as Cancelled or Completed, both terminal.
    pub fn can_become(self, next: ReservationStatus) -> bool {
        self == next || self == ReservationStatus::Confirmed
    }
}
impl Display for ReservationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ReservationStatus::Confirmed => f.write_str("Confirmed"),
            ReservationStatus::Cancelled => f.write_str("Cancelled"),
            ReservationStatus::Completed => f.write_str("Completed"),
        }
    }
}
impl FromStr for ReservationStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Confirmed" => Ok(ReservationStatus::Confirmed),
            "Cancelled" => Ok(ReservationStatus::Cancelled),
            "Completed" => Ok(ReservationStatus::Completed),
            _ => Err(ParseEnumError { what: "reservation status", value: s.to_string() }),
        }
    }
}
impl_sqlx_text_type_encode_decode!(ReservationStatus);

#[derive(Error, Debug)]
pub enum StatusError {
    #[error("Reservation {0} not found")]
    NotFound(ReservationId),
    #[error("A {from} reservation cannot become {to}")]
    InvalidTransition { from: ReservationStatus, to: ReservationStatus },
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// Reservation joined with member and class names.
#[derive(Serialize, Deserialize, FromRow, Clone, Debug)]
pub struct ReservationOverview {
    pub id: ReservationId,
    pub member_id: MemberId,
    pub member_name: String,
    pub member_email: String,
    pub class_id: ClassId,
    pub class_name: String,
    pub class_start_time: GymDateTime,
    pub duration_min: i64,
    pub instructor_name: String,
    pub facility_name: String,
    pub status: ReservationStatus,
    pub created: GymDateTime,
}

const SELECT_OVERVIEW: &str = "SELECT r.id, r.member_id, m.name AS member_name, u.email AS member_email,
        r.class_id, c.name AS class_name, c.start_time AS class_start_time, c.duration_min,
        i.name AS instructor_name, f.name AS facility_name,
        r.status, r.created
    FROM reservations r
    JOIN members m ON r.member_id = m.id
    JOIN users u ON m.user_id = u.id
    JOIN classes c ON r.class_id = c.id
    JOIN instructors i ON c.instructor_id = i.id
    JOIN facilities f ON c.facility_id = f.id";

pub async fn list_reservations(pool: &SqlitePool) -> sqlx::Result<Vec<ReservationOverview>> {
    sqlx::query_as::<_, ReservationOverview>(&format!("{SELECT_OVERVIEW} ORDER BY r.created DESC, r.id DESC"))
        .fetch_all(pool)
        .await
}

pub async fn load_reservation(pool: &SqlitePool, reservation_id: ReservationId) -> sqlx::Result<Option<ReservationOverview>> {
    sqlx::query_as::<_, ReservationOverview>(&format!("{SELECT_OVERVIEW} WHERE r.id=?"))
        .bind(reservation_id)
        .fetch_optional(pool)
        .await
}

pub async fn list_member_reservations(pool: &SqlitePool, member_id: MemberId) -> sqlx::Result<Vec<ReservationOverview>> {
    sqlx::query_as::<_, ReservationOverview>(&format!("{SELECT_OVERVIEW} WHERE r.member_id=? ORDER BY c.start_time DESC"))
        .bind(member_id)
        .fetch_all(pool)
        .await
}

pub async fn list_upcoming_member_reservations(pool: &SqlitePool, member_id: MemberId, now: GymDateTime) -> sqlx::Result<Vec<ReservationOverview>> {
    sqlx::query_as::<_, ReservationOverview>(&format!("{SELECT_OVERVIEW}
        WHERE r.member_id=? AND r.status='Confirmed' AND c.start_time > ?
        ORDER BY c.start_time"))
        .bind(member_id)
        .bind(now)
        .fetch_all(pool)
        .await
}

/// Members holding a confirmed seat in the class.
pub async fn list_enrolled(pool: &SqlitePool, class_id: ClassId) -> sqlx::Result<Vec<ReservationOverview>> {
    sqlx::query_as::<_, ReservationOverview>(&format!("{SELECT_OVERVIEW}
        WHERE r.class_id=? AND r.status='Confirmed'
        ORDER BY m.name"))
        .bind(class_id)
        .fetch_all(pool)
        .await
}

pub async fn count_confirmed(pool: &SqlitePool) -> sqlx::Result<i64> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM reservations WHERE status='Confirmed'")
        .fetch_one(pool)
        .await?;
    Ok(count.0)
}

/// Applies an administrator's status change.
pub async fn change_status(pool: &SqlitePool, reservation_id: ReservationId, next: ReservationStatus) -> Result<ReservationStatus, StatusError> {
    let mut txn = pool.begin().await?;
    let current: Option<(ReservationStatus,)> = sqlx::query_as("SELECT status FROM reservations WHERE id=?")
        .bind(reservation_id)
        .fetch_optional(&mut *txn)
        .await?;
    let Some((current,)) = current else {
        return Err(StatusError::NotFound(reservation_id));
    };
    if !current.can_become(next) {
        return Err(StatusError::InvalidTransition { from: current, to: next });
    }
    if current != next {
        sqlx::query("UPDATE reservations SET status=? WHERE id=?")
            .bind(next)
            .bind(reservation_id)
            .execute(&mut *txn)
            .await?;
        info!("Reservation {reservation_id} status changed: {current} -> {next}");
    }
    txn.commit().await?;
    Ok(next)
}

pub async fn delete_reservation(pool: &SqlitePool, reservation_id: ReservationId) -> sqlx::Result<bool> {
    let res = sqlx::query("DELETE FROM reservations WHERE id=?")
        .bind(reservation_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}
