use rocket::form::{Context, Contextual, Form};
use rocket::http::Status;
use rocket::request::FlashMessage;
use rocket::response::{Flash, Redirect};
use rocket::response::status::Custom;
use rocket::{Build, Rocket, State};
use rocket_dyn_templates::{context, Template};
use serde::Serialize;
use crate::auth::{check_account, hash_password, refresh_sessions, AdminUser, UserInfo};
use crate::db::DbPool;
use crate::SharedGymState;
use crate::tables::instructors::{self, DeleteOutcome, InstructorId, InstructorsRecord};
use crate::util::{form_errors, form_value, not_found, sqlx_to_custom_error, FormOutcome, Notice};

#[derive(Debug, FromForm)]
struct InstructorFormValues<'v> {
    #[field(validate = len(1..))]
    name: &'v str,
    email: &'v str,
    specialty: &'v str,
    password: &'v str,
}

#[derive(Serialize, Debug, Default)]
struct InstructorFormView {
    name: String,
    email: String,
    specialty: String,
}
impl InstructorFormView {
    fn from_record(instructor: &InstructorsRecord) -> Self {
        Self {
            name: instructor.name.clone(),
            email: instructor.email.clone(),
            specialty: instructor.specialty.clone(),
        }
    }
    fn from_context(ctx: &Context<'_>) -> Self {
        Self {
            name: form_value(ctx, "name"),
            email: form_value(ctx, "email"),
            specialty: form_value(ctx, "specialty"),
        }
    }
}

fn render_form(user: UserInfo, instructor_id: Option<InstructorId>, values: InstructorFormView, errors: Vec<String>) -> Template {
    Template::render("admin/instructor_form", context! {
        user,
        instructor_id,
        values,
        errors,
    })
}

#[get("/admin/instructors")]
async fn get_instructors(admin: AdminUser, flash: Option<FlashMessage<'_>>, db: &State<DbPool>) -> Result<Template, Custom<String>> {
    let instructors = instructors::list_instructors(&db.0).await.map_err(sqlx_to_custom_error)?;
    Ok(Template::render("admin/instructors", context! {
        user: admin.0,
        notice: flash.map(Notice::from),
        instructors,
    }))
}

#[get("/admin/instructors/new")]
fn get_instructor_new(admin: AdminUser) -> Template {
    render_form(admin.0, None, InstructorFormView::default(), vec![])
}

#[post("/admin/instructors", data = "<form>")]
async fn post_instructor_new<'r>(admin: AdminUser, form: Form<Contextual<'r, InstructorFormValues<'r>>>, db: &State<DbPool>) -> Result<FormOutcome, Custom<String>> {
    let errors = match &form.value {
        Some(vals) => {
            let (name, email) = (vals.name.trim(), vals.email.trim());
            let mut errors = check_account(&db.0, email, vals.password, true, None).await.map_err(sqlx_to_custom_error)?;
            if name.is_empty() {
                errors.push("name: must not be blank".to_string());
            }
            if errors.is_empty() {
                instructors::create_instructor(&db.0, name, email, vals.specialty.trim(), &hash_password(vals.password)).await
                    .map_err(sqlx_to_custom_error)?;
                return Ok(Ok(Flash::success(Redirect::to("/admin/instructors"), format!("Instructor {name} created."))));
            }
            errors
        }
        None => form_errors(&form.context),
    };
    let page = render_form(admin.0, None, InstructorFormView::from_context(&form.context), errors);
    Ok(Err((Status::UnprocessableEntity, page)))
}

#[get("/admin/instructors/<instructor_id>/edit")]
async fn get_instructor_edit(instructor_id: InstructorId, admin: AdminUser, db: &State<DbPool>) -> Result<Template, Custom<String>> {
    let instructor = instructors::load_instructor(&db.0, instructor_id).await
        .map_err(sqlx_to_custom_error)?
        .ok_or_else(|| not_found(&format!("Instructor {instructor_id}")))?;
    Ok(render_form(admin.0, Some(instructor_id), InstructorFormView::from_record(&instructor), vec![]))
}

#[post("/admin/instructors/<instructor_id>", data = "<form>")]
async fn post_instructor_edit<'r>(instructor_id: InstructorId, admin: AdminUser, form: Form<Contextual<'r, InstructorFormValues<'r>>>, state: &State<SharedGymState>, db: &State<DbPool>) -> Result<FormOutcome, Custom<String>> {
    let instructor = instructors::load_instructor(&db.0, instructor_id).await
        .map_err(sqlx_to_custom_error)?
        .ok_or_else(|| not_found(&format!("Instructor {instructor_id}")))?;
    let errors = match &form.value {
        Some(vals) => {
            let (name, email) = (vals.name.trim(), vals.email.trim());
            let mut errors = check_account(&db.0, email, vals.password, false, Some(instructor.user_id)).await.map_err(sqlx_to_custom_error)?;
            if name.is_empty() {
                errors.push("name: must not be blank".to_string());
            }
            if errors.is_empty() {
                let password_hash = (!vals.password.is_empty()).then(|| hash_password(vals.password));
                instructors::update_instructor(&db.0, &instructor, name, email, vals.specialty.trim(), password_hash.as_deref()).await
                    .map_err(sqlx_to_custom_error)?;
                refresh_sessions(state, instructor.user_id, email);
                info!("Instructor updated, id: {instructor_id}, by: {}", admin.0.email);
                return Ok(Ok(Flash::success(Redirect::to("/admin/instructors"), format!("Instructor {name} updated."))));
            }
            errors
        }
        None => form_errors(&form.context),
    };
    let page = render_form(admin.0, Some(instructor_id), InstructorFormView::from_context(&form.context), errors);
    Ok(Err((Status::UnprocessableEntity, page)))
}

#[post("/admin/instructors/<instructor_id>/delete")]
async fn post_instructor_delete(instructor_id: InstructorId, admin: AdminUser, db: &State<DbPool>) -> Result<Flash<Redirect>, Custom<String>> {
    match instructors::delete_instructor(&db.0, instructor_id).await.map_err(sqlx_to_custom_error)? {
        DeleteOutcome::Deleted => {
            info!("Instructor deleted, id: {instructor_id}, by: {}", admin.0.email);
            Ok(Flash::success(Redirect::to("/admin/instructors"), "Instructor deleted."))
        }
        DeleteOutcome::NotFound => Ok(Flash::error(Redirect::to("/admin/instructors"), format!("Instructor {instructor_id} does not exist."))),
        DeleteOutcome::StillTeaching => {
            warn!("Instructor {instructor_id} still teaches classes, not deleted");
            Ok(Flash::error(Redirect::to("/admin/instructors"), "The instructor still teaches classes, reassign or delete them first."))
        }
    }
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/", routes![
            get_instructors,
            get_instructor_new,
            post_instructor_new,
            get_instructor_edit,
            post_instructor_edit,
            post_instructor_delete,
        ])
}
