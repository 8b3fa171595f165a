use rocket::serde::json::Json;
use rocket::response::status::Custom;
use rocket::{Build, Rocket, State};
use crate::auth::UserInfo;
use crate::booking::{self, Availability};
use crate::db::DbPool;
use crate::gymdatetime::GymDateTime;
use crate::tables::classes::ClassId;
use crate::util::{not_found, sqlx_to_custom_error};

#[get("/api/classes/<class_id>/availability")]
async fn get_availability(class_id: ClassId, _user: UserInfo, db: &State<DbPool>) -> Result<Json<Availability>, Custom<String>> {
    let mut conn = db.0.acquire().await.map_err(sqlx_to_custom_error)?;
    let availability = booking::availability(&mut conn, class_id, GymDateTime::now())
        .await
        .map_err(sqlx_to_custom_error)?
        .ok_or_else(|| not_found(&format!("Class {class_id}")))?;
    Ok(Json(availability))
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/", routes![
            get_availability,
        ])
}
