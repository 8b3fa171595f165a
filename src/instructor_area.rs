use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::{Build, Rocket, State};
use rocket_dyn_templates::{context, Template};
use sqlx::SqlitePool;
use crate::auth::{InstructorUser, UserInfo};
use crate::db::DbPool;
use crate::gymdatetime::GymDateTime;
use crate::tables::classes::{self, ClassId};
use crate::tables::instructors::{self, InstructorsRecord};
use crate::tables::reservations;
use crate::util::{not_found, sqlx_to_custom_error};

async fn current_instructor(pool: &SqlitePool, user: &UserInfo) -> Result<InstructorsRecord, Custom<String>> {
    instructors::load_instructor_by_user(pool, user.user_id).await
        .map_err(sqlx_to_custom_error)?
        .ok_or_else(|| not_found("Instructor profile"))
}

#[get("/my-schedule")]
async fn get_my_schedule(instructor: InstructorUser, db: &State<DbPool>) -> Result<Template, Custom<String>> {
    let profile = current_instructor(&db.0, &instructor.0).await?;
    let now = GymDateTime::now();
    let (past, upcoming): (Vec<_>, Vec<_>) = classes::list_instructor_classes(&db.0, profile.id).await
        .map_err(sqlx_to_custom_error)?
        .into_iter()
        .partition(|c| !c.start_time.is_after(&now));
    Ok(Template::render("instructor/schedule", context! {
        user: instructor.0,
        instructor: profile,
        upcoming,
        past,
    }))
}

#[get("/my-classes")]
async fn get_my_classes(instructor: InstructorUser, db: &State<DbPool>) -> Result<Template, Custom<String>> {
    let profile = current_instructor(&db.0, &instructor.0).await?;
    let classes = classes::list_instructor_classes(&db.0, profile.id).await.map_err(sqlx_to_custom_error)?;
    Ok(Template::render("instructor/classes", context! {
        user: instructor.0,
        instructor: profile,
        classes,
    }))
}

#[get("/my-classes/<class_id>/enrolled")]
async fn get_enrolled(class_id: ClassId, instructor: InstructorUser, db: &State<DbPool>) -> Result<Template, Custom<String>> {
    let profile = current_instructor(&db.0, &instructor.0).await?;
    let class = classes::load_class_overview(&db.0, class_id).await
        .map_err(sqlx_to_custom_error)?
        .ok_or_else(|| not_found(&format!("Class {class_id}")))?;
    if class.instructor_id != profile.id {
        warn!("Instructor {} asked for enrolment of class {class_id} taught by someone else", profile.id);
        return Err(Custom(Status::Forbidden, "This class is taught by another instructor".to_string()));
    }
    let enrolled = reservations::list_enrolled(&db.0, class_id).await.map_err(sqlx_to_custom_error)?;
    Ok(Template::render("instructor/enrolled", context! {
        user: instructor.0,
        class,
        enrolled,
    }))
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/", routes![
            get_my_schedule,
            get_my_classes,
            get_enrolled,
        ])
}
