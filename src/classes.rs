use rocket::form::{Context, Contextual, Form};
use rocket::http::Status;
use rocket::request::FlashMessage;
use rocket::response::{Flash, Redirect};
use rocket::response::status::Custom;
use rocket::{Build, Rocket, State};
use rocket_dyn_templates::{context, Template};
use serde::Serialize;
use sqlx::SqlitePool;
use crate::auth::{AdminUser, UserInfo};
use crate::db::DbPool;
use crate::gymdatetime::GymDateTime;
use crate::tables::classes::{self, ClassDraft, ClassId, ClassesRecord};
use crate::tables::facilities::{self, FacilityId};
use crate::tables::instructors::{self, InstructorId};
use crate::util::{form_errors, form_value, not_found, sqlx_to_custom_error, FormOutcome, Notice, SelectOption};

#[derive(Debug, FromForm)]
struct ClassFormValues<'v> {
    #[field(validate = len(1..))]
    name: &'v str,
    #[field(validate = len(1..))]
    kind: &'v str,
    instructor_id: InstructorId,
    facility_id: FacilityId,
    #[field(validate = len(1..))]
    start_time: &'v str,
    #[field(validate = range(1..))]
    duration_min: i64,
    #[field(validate = range(1..))]
    max_capacity: i64,
}

/// Values shown in the class form, either loaded or as submitted.
#[derive(Serialize, Debug, Default)]
struct ClassFormView {
    name: String,
    kind: String,
    start_time: String,
    duration_min: String,
    max_capacity: String,
    #[serde(skip)]
    instructor_id: Option<InstructorId>,
    #[serde(skip)]
    facility_id: Option<FacilityId>,
}
impl ClassFormView {
    fn from_record(class: &ClassesRecord) -> Self {
        Self {
            name: class.name.clone(),
            kind: class.kind.clone(),
            start_time: class.start_time.to_local_input(),
            duration_min: class.duration_min.to_string(),
            max_capacity: class.max_capacity.to_string(),
            instructor_id: Some(class.instructor_id),
            facility_id: Some(class.facility_id),
        }
    }
    fn from_context(ctx: &Context<'_>) -> Self {
        Self {
            name: form_value(ctx, "name"),
            kind: form_value(ctx, "kind"),
            start_time: form_value(ctx, "start_time"),
            duration_min: form_value(ctx, "duration_min"),
            max_capacity: form_value(ctx, "max_capacity"),
            instructor_id: form_value(ctx, "instructor_id").parse().ok(),
            facility_id: form_value(ctx, "facility_id").parse().ok(),
        }
    }
}

/// Checks what field validation cannot: references exist and the class starts in the future.
/// An edited class may keep its original start time even when that has already passed.
async fn check_draft(pool: &SqlitePool, vals: &ClassFormValues<'_>, current: Option<&ClassesRecord>, now: GymDateTime) -> Result<Result<ClassDraft, Vec<String>>, Custom<String>> {
    let mut errors = Vec::new();
    let name = vals.name.trim();
    let kind = vals.kind.trim();
    if name.is_empty() {
        errors.push("name: must not be blank".to_string());
    }
    if kind.is_empty() {
        errors.push("kind: must not be blank".to_string());
    }
    if instructors::load_instructor(pool, vals.instructor_id).await.map_err(sqlx_to_custom_error)?.is_none() {
        errors.push(format!("instructor_id: instructor {} does not exist", vals.instructor_id));
    }
    if !facilities::facility_exists(pool, vals.facility_id).await.map_err(sqlx_to_custom_error)? {
        errors.push(format!("facility_id: facility {} does not exist", vals.facility_id));
    }
    let start_time = match GymDateTime::from_local_input(vals.start_time) {
        Ok(start_time) => match current {
            Some(class) if class.start_time.to_local_input() == start_time.to_local_input() => Some(class.start_time),
            _ if !start_time.is_after(&now) => {
                errors.push("start_time: must be in the future".to_string());
                None
            }
            _ => Some(start_time),
        },
        Err(err) => {
            errors.push(format!("start_time: {err}"));
            None
        }
    };
    match start_time {
        Some(start_time) if errors.is_empty() => Ok(Ok(ClassDraft {
            name: name.to_string(),
            kind: kind.to_string(),
            instructor_id: vals.instructor_id,
            facility_id: vals.facility_id,
            start_time,
            duration_min: vals.duration_min,
            max_capacity: vals.max_capacity,
        })),
        _ => Ok(Err(errors)),
    }
}

async fn render_form(pool: &SqlitePool, user: UserInfo, class_id: Option<ClassId>, values: ClassFormView, errors: Vec<String>) -> Result<Template, Custom<String>> {
    let instructors = instructors::list_instructors(pool).await.map_err(sqlx_to_custom_error)?
        .into_iter()
        .map(|i| SelectOption {
            id: i.id,
            selected: values.instructor_id == Some(i.id),
            label: format!("{} ({})", i.name, i.specialty),
        })
        .collect::<Vec<_>>();
    let facilities = facilities::list_facilities(pool).await.map_err(sqlx_to_custom_error)?
        .into_iter()
        .map(|f| SelectOption {
            id: f.id,
            selected: values.facility_id == Some(f.id),
            label: format!("{} ({}, {} places)", f.name, f.kind, f.capacity),
        })
        .collect::<Vec<_>>();
    Ok(Template::render("admin/class_form", context! {
        user,
        class_id,
        values,
        instructors,
        facilities,
        errors,
    }))
}

async fn submit_class<'r>(form: Form<Contextual<'r, ClassFormValues<'r>>>, class_id: Option<ClassId>, user: UserInfo, pool: &SqlitePool) -> Result<FormOutcome, Custom<String>> {
    let current = match class_id {
        Some(class_id) => Some(classes::load_class(pool, class_id).await
            .map_err(sqlx_to_custom_error)?
            .ok_or_else(|| not_found(&format!("Class {class_id}")))?),
        None => None,
    };
    let checked = match &form.value {
        Some(vals) => check_draft(pool, vals, current.as_ref(), GymDateTime::now()).await?,
        None => Err(form_errors(&form.context)),
    };
    let draft = match checked {
        Ok(draft) => draft,
        Err(errors) => {
            let view = ClassFormView::from_context(&form.context);
            let page = render_form(pool, user, class_id, view, errors).await?;
            return Ok(Err((Status::UnprocessableEntity, page)));
        }
    };
    let message = match class_id {
        Some(class_id) => {
            classes::update_class(pool, class_id, &draft).await.map_err(sqlx_to_custom_error)?;
            info!("Class updated, id: {class_id}, by: {}", user.email);
            format!("Class '{}' updated.", draft.name)
        }
        None => {
            classes::insert_class(pool, &draft).await.map_err(sqlx_to_custom_error)?;
            format!("Class '{}' created.", draft.name)
        }
    };
    Ok(Ok(Flash::success(Redirect::to("/admin/classes"), message)))
}

#[get("/admin/classes")]
async fn get_classes(admin: AdminUser, flash: Option<FlashMessage<'_>>, db: &State<DbPool>) -> Result<Template, Custom<String>> {
    let classes = classes::list_classes(&db.0).await.map_err(sqlx_to_custom_error)?;
    Ok(Template::render("admin/classes", context! {
        user: admin.0,
        notice: flash.map(Notice::from),
        classes,
    }))
}

#[get("/admin/classes/new")]
async fn get_class_new(admin: AdminUser, db: &State<DbPool>) -> Result<Template, Custom<String>> {
    let values = ClassFormView {
        duration_min: "60".to_string(),
        max_capacity: "10".to_string(),
        ..Default::default()
    };
    render_form(&db.0, admin.0, None, values, vec![]).await
}

#[post("/admin/classes", data = "<form>")]
async fn post_class_new<'r>(admin: AdminUser, form: Form<Contextual<'r, ClassFormValues<'r>>>, db: &State<DbPool>) -> Result<FormOutcome, Custom<String>> {
    submit_class(form, None, admin.0, &db.0).await
}

#[get("/admin/classes/<class_id>/edit")]
async fn get_class_edit(class_id: ClassId, admin: AdminUser, db: &State<DbPool>) -> Result<Template, Custom<String>> {
    let class = classes::load_class(&db.0, class_id).await
        .map_err(sqlx_to_custom_error)?
        .ok_or_else(|| not_found(&format!("Class {class_id}")))?;
    render_form(&db.0, admin.0, Some(class_id), ClassFormView::from_record(&class), vec![]).await
}

#[post("/admin/classes/<class_id>", data = "<form>")]
async fn post_class_edit<'r>(class_id: ClassId, admin: AdminUser, form: Form<Contextual<'r, ClassFormValues<'r>>>, db: &State<DbPool>) -> Result<FormOutcome, Custom<String>> {
    submit_class(form, Some(class_id), admin.0, &db.0).await
}

#[post("/admin/classes/<class_id>/delete")]
async fn post_class_delete(class_id: ClassId, admin: AdminUser, db: &State<DbPool>) -> Result<Flash<Redirect>, Custom<String>> {
    if classes::delete_class(&db.0, class_id).await.map_err(sqlx_to_custom_error)? {
        info!("Class deleted, id: {class_id}, by: {}", admin.0.email);
        Ok(Flash::success(Redirect::to("/admin/classes"), "Class deleted."))
    } else {
        Ok(Flash::error(Redirect::to("/admin/classes"), format!("Class {class_id} does not exist.")))
    }
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/", routes![
            get_classes,
            get_class_new,
            post_class_new,
            get_class_edit,
            post_class_edit,
            post_class_delete,
        ])
}
