use rocket::request::FlashMessage;
use rocket::response::status::Custom;
use rocket::{Build, Rocket, State};
use rocket_dyn_templates::{context, Template};
use crate::auth::UserInfo;
use crate::db::DbPool;
use crate::gymdatetime::GymDateTime;
use crate::tables::users::Role;
use crate::tables::{classes, instructors, members, reservations};
use crate::util::{not_found, sqlx_to_custom_error, Notice};

const TOP_CLASSES: i64 = 5;

#[get("/dashboard")]
async fn get_dashboard(user: UserInfo, flash: Option<FlashMessage<'_>>, db: &State<DbPool>) -> Result<Template, Custom<String>> {
    let pool = &db.0;
    let notice = flash.map(Notice::from);
    let now = GymDateTime::now();
    match user.role {
        Role::Administrator => {
            let member_count = members::count_members(pool).await.map_err(sqlx_to_custom_error)?;
            let instructor_count = instructors::count_instructors(pool).await.map_err(sqlx_to_custom_error)?;
            let class_count = classes::count_classes(pool).await.map_err(sqlx_to_custom_error)?;
            let upcoming_count = classes::count_upcoming_classes(pool, now, None).await.map_err(sqlx_to_custom_error)?;
            let confirmed_count = reservations::count_confirmed(pool).await.map_err(sqlx_to_custom_error)?;
            let top_classes = classes::list_top_classes(pool, TOP_CLASSES).await.map_err(sqlx_to_custom_error)?;
            Ok(Template::render("dashboard_admin", context! {
                user,
                notice,
                member_count,
                instructor_count,
                class_count,
                upcoming_count,
                confirmed_count,
                top_classes,
            }))
        }
        Role::Instructor => {
            let instructor = instructors::load_instructor_by_user(pool, user.user_id).await
                .map_err(sqlx_to_custom_error)?
                .ok_or_else(|| not_found("Instructor profile"))?;
            let upcoming_count = classes::count_upcoming_classes(pool, now, Some(instructor.id)).await.map_err(sqlx_to_custom_error)?;
            Ok(Template::render("dashboard_instructor", context! {
                user,
                notice,
                instructor,
                upcoming_count,
            }))
        }
        Role::Member => {
            let member = members::load_member_by_user(pool, user.user_id).await
                .map_err(sqlx_to_custom_error)?
                .ok_or_else(|| not_found("Member profile"))?;
            let upcoming = reservations::list_upcoming_member_reservations(pool, member.id, now).await.map_err(sqlx_to_custom_error)?;
            Ok(Template::render("dashboard_member", context! {
                user,
                notice,
                member,
                upcoming,
            }))
        }
    }
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/", routes![
            get_dashboard,
        ])
}
