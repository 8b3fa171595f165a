use chrono::{Local, NaiveDate};
use rocket::form::{Context, Contextual, Form};
use rocket::http::Status;
use rocket::request::FlashMessage;
use rocket::response::{Flash, Redirect};
use rocket::response::status::Custom;
use rocket::{Build, Rocket, State};
use rocket_dyn_templates::{context, Template};
use serde::Serialize;
use sqlx::SqlitePool;
use crate::auth::{check_account, hash_password, refresh_sessions, AdminUser, UserInfo};
use crate::db::DbPool;
use crate::SharedGymState;
use crate::tables::members::{self, MemberId, MemberProfile, MembersRecord};
use crate::tables::users::UserId;
use crate::util::{form_errors, form_value, not_found, sqlx_to_custom_error, FormOutcome, Notice};

pub(crate) const GENDERS: [&str; 3] = ["Female", "Male", "Other"];

#[derive(Debug, FromForm)]
pub(crate) struct MemberFormValues<'v> {
    #[field(validate = len(1..))]
    pub name: &'v str,
    pub email: &'v str,
    pub birth_date: &'v str,
    pub gender: &'v str,
    pub password: &'v str,
}
impl<'v> MemberFormValues<'v> {
    pub(crate) fn profile(&self) -> MemberProfile<'v> {
        MemberProfile {
            name: self.name.trim(),
            email: self.email.trim(),
            birth_date: self.birth_date.trim(),
            gender: self.gender.trim(),
        }
    }
}

/// Member form contents for re-rendering, passwords are never echoed.
#[derive(Serialize, Debug, Default)]
pub(crate) struct MemberFormView {
    name: String,
    email: String,
    birth_date: String,
    gender: String,
}
impl MemberFormView {
    pub(crate) fn from_record(member: &MembersRecord) -> Self {
        Self {
            name: member.name.clone(),
            email: member.email.clone(),
            birth_date: member.birth_date.clone(),
            gender: member.gender.clone(),
        }
    }
    pub(crate) fn from_context(ctx: &Context<'_>) -> Self {
        Self {
            name: form_value(ctx, "name"),
            email: form_value(ctx, "email"),
            birth_date: form_value(ctx, "birth_date"),
            gender: form_value(ctx, "gender"),
        }
    }
}

/// Personal data checks; the birth date is optional but must lie in the past.
pub(crate) fn check_profile(profile: &MemberProfile<'_>) -> Vec<String> {
    let mut errors = Vec::new();
    if profile.name.is_empty() {
        errors.push("name: must not be blank".to_string());
    }
    if !profile.birth_date.is_empty() {
        match NaiveDate::parse_from_str(profile.birth_date, "%Y-%m-%d") {
            Ok(date) if date >= Local::now().date_naive() => errors.push("birth_date: must be in the past".to_string()),
            Ok(_) => {}
            Err(err) => errors.push(format!("birth_date: {err}")),
        }
    }
    if !profile.gender.is_empty() && !GENDERS.contains(&profile.gender) {
        errors.push(format!("gender: unknown value '{}'", profile.gender));
    }
    errors
}

/// All validation of a member form, `user_id` is the account being edited.
pub(crate) async fn check_member_form(pool: &SqlitePool, vals: &MemberFormValues<'_>, user_id: Option<UserId>) -> Result<Vec<String>, Custom<String>> {
    let profile = vals.profile();
    let mut errors = check_profile(&profile);
    errors.extend(check_account(pool, profile.email, vals.password, user_id.is_none(), user_id).await.map_err(sqlx_to_custom_error)?);
    Ok(errors)
}

fn render_form(user: UserInfo, member_id: Option<MemberId>, values: MemberFormView, errors: Vec<String>) -> Template {
    Template::render("admin/member_form", context! {
        user,
        member_id,
        values,
        genders: GENDERS,
        errors,
    })
}

#[get("/admin/members")]
async fn get_members(admin: AdminUser, flash: Option<FlashMessage<'_>>, db: &State<DbPool>) -> Result<Template, Custom<String>> {
    let members = members::list_members(&db.0).await.map_err(sqlx_to_custom_error)?;
    Ok(Template::render("admin/members", context! {
        user: admin.0,
        notice: flash.map(Notice::from),
        members,
    }))
}

#[get("/admin/members/new")]
fn get_member_new(admin: AdminUser) -> Template {
    render_form(admin.0, None, MemberFormView::default(), vec![])
}

#[post("/admin/members", data = "<form>")]
async fn post_member_new<'r>(admin: AdminUser, form: Form<Contextual<'r, MemberFormValues<'r>>>, db: &State<DbPool>) -> Result<FormOutcome, Custom<String>> {
    let errors = match &form.value {
        Some(vals) => {
            let errors = check_member_form(&db.0, vals, None).await?;
            if errors.is_empty() {
                let profile = vals.profile();
                members::create_member(&db.0, &profile, &hash_password(vals.password)).await.map_err(sqlx_to_custom_error)?;
                return Ok(Ok(Flash::success(Redirect::to("/admin/members"), format!("Member {} created.", profile.name))));
            }
            errors
        }
        None => form_errors(&form.context),
    };
    let page = render_form(admin.0, None, MemberFormView::from_context(&form.context), errors);
    Ok(Err((Status::UnprocessableEntity, page)))
}

#[get("/admin/members/<member_id>/edit")]
async fn get_member_edit(member_id: MemberId, admin: AdminUser, db: &State<DbPool>) -> Result<Template, Custom<String>> {
    let member = members::load_member(&db.0, member_id).await
        .map_err(sqlx_to_custom_error)?
        .ok_or_else(|| not_found(&format!("Member {member_id}")))?;
    Ok(render_form(admin.0, Some(member_id), MemberFormView::from_record(&member), vec![]))
}

#[post("/admin/members/<member_id>", data = "<form>")]
async fn post_member_edit<'r>(member_id: MemberId, admin: AdminUser, form: Form<Contextual<'r, MemberFormValues<'r>>>, state: &State<SharedGymState>, db: &State<DbPool>) -> Result<FormOutcome, Custom<String>> {
    let member = members::load_member(&db.0, member_id).await
        .map_err(sqlx_to_custom_error)?
        .ok_or_else(|| not_found(&format!("Member {member_id}")))?;
    let errors = match &form.value {
        Some(vals) => {
            let errors = check_member_form(&db.0, vals, Some(member.user_id)).await?;
            if errors.is_empty() {
                let profile = vals.profile();
                let password_hash = (!vals.password.is_empty()).then(|| hash_password(vals.password));
                members::update_member(&db.0, &member, &profile, password_hash.as_deref()).await.map_err(sqlx_to_custom_error)?;
                refresh_sessions(state, member.user_id, profile.email);
                info!("Member updated, id: {member_id}, by: {}", admin.0.email);
                return Ok(Ok(Flash::success(Redirect::to("/admin/members"), format!("Member {} updated.", profile.name))));
            }
            errors
        }
        None => form_errors(&form.context),
    };
    let page = render_form(admin.0, Some(member_id), MemberFormView::from_context(&form.context), errors);
    Ok(Err((Status::UnprocessableEntity, page)))
}

#[post("/admin/members/<member_id>/delete")]
async fn post_member_delete(member_id: MemberId, admin: AdminUser, db: &State<DbPool>) -> Result<Flash<Redirect>, Custom<String>> {
    if members::delete_member(&db.0, member_id).await.map_err(sqlx_to_custom_error)? {
        info!("Member deleted, id: {member_id}, by: {}", admin.0.email);
        Ok(Flash::success(Redirect::to("/admin/members"), "Member and their reservations deleted."))
    } else {
        Ok(Flash::error(Redirect::to("/admin/members"), format!("Member {member_id} does not exist.")))
    }
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/", routes![
            get_members,
            get_member_new,
            post_member_new,
            get_member_edit,
            post_member_edit,
            post_member_delete,
        ])
}
