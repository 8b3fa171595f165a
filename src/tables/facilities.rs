use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

pub type FacilityId = i64;

#[derive(Serialize, Deserialize, FromRow, Clone, Debug)]
pub struct FacilitiesRecord {
    pub id: FacilityId,
    pub name: String,
    pub kind: String,
    pub capacity: i64,
    pub description: String,
}

pub async fn list_facilities(pool: &SqlitePool) -> sqlx::Result<Vec<FacilitiesRecord>> {
    sqlx::query_as::<_, FacilitiesRecord>("SELECT * FROM facilities ORDER BY name")
        .fetch_all(pool)
        .await
}

pub async fn facility_exists(pool: &SqlitePool, facility_id: FacilityId) -> sqlx::Result<bool> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM facilities WHERE id=?")
        .bind(facility_id)
        .fetch_one(pool)
        .await?;
    Ok(count.0 > 0)
}
