use rocket::form::{Contextual, Form};
use rocket::http::Status;
use rocket::request::FlashMessage;
use rocket::response::{Flash, Redirect};
use rocket::response::status::Custom;
use rocket::{Build, Rocket, State};
use rocket_dyn_templates::{context, Template};
use sqlx::SqlitePool;
use crate::auth::{hash_password, refresh_sessions, MemberUser, UserInfo};
use crate::booking::{book_class, BookingError};
use crate::db::DbPool;
use crate::gymdatetime::GymDateTime;
use crate::members::{check_member_form, MemberFormValues, MemberFormView, GENDERS};
use crate::SharedGymState;
use crate::tables::classes::{self, ClassId};
use crate::tables::members::{self, MembersRecord};
use crate::tables::reservations;
use crate::util::{booking_refusal, form_errors, not_found, sqlx_to_custom_error, FormOutcome, Notice};

async fn current_member(pool: &SqlitePool, user: &UserInfo) -> Result<MembersRecord, Custom<String>> {
    members::load_member_by_user(pool, user.user_id).await
        .map_err(sqlx_to_custom_error)?
        .ok_or_else(|| not_found("Member profile"))
}

#[derive(Debug, FromForm)]
struct BookValues {
    class_id: ClassId,
}

#[derive(Debug, FromForm)]
struct ProfileValues<'v> {
    #[field(validate = len(1..))]
    name: &'v str,
    email: &'v str,
    birth_date: &'v str,
    gender: &'v str,
    password: &'v str,
    password_confirm: &'v str,
}

#[get("/book")]
async fn get_book(member: MemberUser, flash: Option<FlashMessage<'_>>, db: &State<DbPool>) -> Result<Template, Custom<String>> {
    let classes = classes::list_bookable_classes(&db.0, GymDateTime::now()).await.map_err(sqlx_to_custom_error)?;
    Ok(Template::render("member/book", context! {
        user: member.0,
        notice: flash.map(Notice::from),
        classes,
    }))
}

#[post("/book", data = "<form>")]
async fn post_book(member: MemberUser, form: Form<BookValues>, db: &State<DbPool>) -> Result<Flash<Redirect>, Custom<String>> {
    let profile = current_member(&db.0, &member.0).await?;
    match book_class(&db.0, profile.id, form.class_id, GymDateTime::now()).await {
        Ok(_) => {
            let class_name = classes::load_class(&db.0, form.class_id).await
                .map_err(sqlx_to_custom_error)?
                .map(|c| c.name)
                .unwrap_or_default();
            Ok(Flash::success(Redirect::to("/my-reservations"), format!("Your seat in {class_name} is booked.")))
        }
        Err(BookingError::AlreadyBooked { .. }) => {
            Ok(Flash::error(Redirect::to("/book"), "You already have a confirmed reservation for this class."))
        }
        Err(err) => Ok(Flash::error(Redirect::to("/book"), booking_refusal(err)?)),
    }
}

#[get("/my-reservations")]
async fn get_my_reservations(member: MemberUser, flash: Option<FlashMessage<'_>>, db: &State<DbPool>) -> Result<Template, Custom<String>> {
    let profile = current_member(&db.0, &member.0).await?;
    let reservations = reservations::list_member_reservations(&db.0, profile.id).await.map_err(sqlx_to_custom_error)?;
    Ok(Template::render("member/my_reservations", context! {
        user: member.0,
        notice: flash.map(Notice::from),
        reservations,
    }))
}

#[get("/profile")]
async fn get_profile(member: MemberUser, flash: Option<FlashMessage<'_>>, db: &State<DbPool>) -> Result<Template, Custom<String>> {
    let profile = current_member(&db.0, &member.0).await?;
    Ok(Template::render("member/profile", context! {
        user: member.0,
        notice: flash.map(Notice::from),
        values: MemberFormView::from_record(&profile),
        genders: GENDERS,
        errors: Vec::<String>::new(),
    }))
}

#[post("/profile", data = "<form>")]
async fn post_profile<'r>(member: MemberUser, form: Form<Contextual<'r, ProfileValues<'r>>>, state: &State<SharedGymState>, db: &State<DbPool>) -> Result<FormOutcome, Custom<String>> {
    let current = current_member(&db.0, &member.0).await?;
    let errors = match &form.value {
        Some(vals) => {
            let member_vals = MemberFormValues {
                name: vals.name,
                email: vals.email,
                birth_date: vals.birth_date,
                gender: vals.gender,
                password: vals.password,
            };
            let mut errors = check_member_form(&db.0, &member_vals, Some(current.user_id)).await?;
            if vals.password != vals.password_confirm {
                errors.push("password_confirm: passwords do not match".to_string());
            }
            if errors.is_empty() {
                let profile = member_vals.profile();
                let password_hash = (!vals.password.is_empty()).then(|| hash_password(vals.password));
                members::update_member(&db.0, &current, &profile, password_hash.as_deref()).await.map_err(sqlx_to_custom_error)?;
                refresh_sessions(state, current.user_id, profile.email);
                info!("Member {} updated own profile", current.id);
                return Ok(Ok(Flash::success(Redirect::to("/profile"), "Profile saved.")));
            }
            errors
        }
        None => form_errors(&form.context),
    };
    let page = Template::render("member/profile", context! {
        user: member.0,
        values: MemberFormView::from_context(&form.context),
        genders: GENDERS,
        errors,
    });
    Ok(Err((Status::UnprocessableEntity, page)))
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/", routes![
            get_book,
            post_book,
            get_my_reservations,
            get_profile,
            post_profile,
        ])
}
