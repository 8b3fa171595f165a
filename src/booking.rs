//! Reservation booking.
//!
//! A booking is admitted only when the class exists, has not started yet, still
//! has a free seat, and the member does not already hold a confirmed seat in it.
//! All checks and the insert run inside one `BEGIN IMMEDIATE` transaction, which
//! takes the SQLite write lock up front, so concurrent bookings are serialized and
//! the last free seat cannot be sold twice.

use log::{error, info, warn};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use thiserror::Error;
use crate::gymdatetime::GymDateTime;
use crate::tables::classes::ClassId;
use crate::tables::members::MemberId;
use crate::tables::reservations::{ReservationId, ReservationStatus};
use crate::util::is_unique_violation;

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("Class {0} does not exist")]
    ClassNotFound(ClassId),
    #[error("Class {0} has already started")]
    ClassStarted(ClassId),
    #[error("Class {0} is full")]
    ClassFull(ClassId),
    #[error("Member {member_id} already holds a confirmed reservation for class {class_id}")]
    AlreadyBooked { member_id: MemberId, class_id: ClassId },
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// Seat situation of a class at one instant.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Availability {
    pub class_id: ClassId,
    pub max_capacity: i64,
    pub confirmed: i64,
    pub remaining: i64,
    pub started: bool,
}

/// Reads the seat situation without judging it; `None` when the class does not exist.
pub async fn availability(conn: &mut SqliteConnection, class_id: ClassId, now: GymDateTime) -> sqlx::Result<Option<Availability>> {
    let row: Option<(i64, GymDateTime, i64)> = sqlx::query_as("SELECT c.max_capacity, c.start_time,
            (SELECT COUNT(*) FROM reservations r WHERE r.class_id = c.id AND r.status = ?)
        FROM classes c WHERE c.id = ?")
        .bind(ReservationStatus::Confirmed)
        .bind(class_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(|(max_capacity, start_time, confirmed)| Availability {
        class_id,
        max_capacity,
        confirmed,
        remaining: max_capacity - confirmed,
        started: !start_time.is_after(&now),
    }))
}

/// Fails unless the class exists, starts strictly after `now` and has a free seat.
/// Returns the number of free seats.
pub async fn check_capacity(conn: &mut SqliteConnection, class_id: ClassId, now: GymDateTime) -> Result<i64, BookingError> {
    let Some(avail) = availability(conn, class_id, now).await? else {
        return Err(BookingError::ClassNotFound(class_id));
    };
    if avail.started {
        return Err(BookingError::ClassStarted(class_id));
    }
    if avail.remaining <= 0 {
        return Err(BookingError::ClassFull(class_id));
    }
    Ok(avail.remaining)
}

pub async fn check_not_booked(conn: &mut SqliteConnection, member_id: MemberId, class_id: ClassId) -> Result<(), BookingError> {
    let found: Option<(i64,)> = sqlx::query_as("SELECT id FROM reservations WHERE member_id = ? AND class_id = ? AND status = ? LIMIT 1")
        .bind(member_id)
        .bind(class_id)
        .bind(ReservationStatus::Confirmed)
        .fetch_optional(&mut *conn)
        .await?;
    match found {
        Some(_) => Err(BookingError::AlreadyBooked { member_id, class_id }),
        None => Ok(()),
    }
}

/// Existence and start time are judged before the member's own booking, the seat count last.
async fn admit(conn: &mut SqliteConnection, member_id: MemberId, class_id: ClassId, now: GymDateTime) -> Result<ReservationId, BookingError> {
    let Some(avail) = availability(conn, class_id, now).await? else {
        return Err(BookingError::ClassNotFound(class_id));
    };
    if avail.started {
        return Err(BookingError::ClassStarted(class_id));
    }
    check_not_booked(conn, member_id, class_id).await?;
    check_capacity(conn, class_id, now).await?;

    // the seat condition is repeated in the insert itself
    let inserted: Option<(ReservationId,)> = sqlx::query_as("INSERT INTO reservations (member_id, class_id, status, created)
        SELECT ?, c.id, ?, ? FROM classes c
        WHERE c.id = ?
          AND (SELECT COUNT(*) FROM reservations r WHERE r.class_id = c.id AND r.status = ?) < c.max_capacity
        RETURNING id")
        .bind(member_id)
        .bind(ReservationStatus::Confirmed)
        .bind(now)
        .bind(class_id)
        .bind(ReservationStatus::Confirmed)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| if is_unique_violation(&e) {
            BookingError::AlreadyBooked { member_id, class_id }
        } else {
            BookingError::Storage(e)
        })?;
    inserted.map(|id| id.0).ok_or(BookingError::ClassFull(class_id))
}

/// Books a seat in `class_id` for `member_id` and returns the new reservation id.
///
/// The member id is taken as given; callers resolve it from the request's identity.
pub async fn book_class(pool: &SqlitePool, member_id: MemberId, class_id: ClassId, now: GymDateTime) -> Result<ReservationId, BookingError> {
    let mut txn = pool.begin_with("BEGIN IMMEDIATE").await?;
    let result = match admit(&mut *txn, member_id, class_id, now).await {
        Ok(id) => txn.commit().await.map(|_| id).map_err(BookingError::Storage),
        Err(e) => {
            if let Err(rollback_err) = txn.rollback().await {
                warn!("Rollback of booking member: {member_id}, class: {class_id} failed: {rollback_err}");
            }
            Err(e)
        }
    };
    match &result {
        Ok(id) => info!("Reservation {id} confirmed, member: {member_id}, class: {class_id}"),
        Err(e @ BookingError::Storage(_)) => error!("Booking member: {member_id}, class: {class_id} failed: {e}"),
        Err(e) => info!("Booking member: {member_id}, class: {class_id} rejected: {e}"),
    }
    result
}
