use rocket::form::{Contextual, Form};
use rocket::http::Status;
use rocket::request::FlashMessage;
use rocket::response::{Flash, Redirect};
use rocket::response::status::Custom;
use rocket::{Build, Rocket, State};
use rocket_dyn_templates::{context, Template};
use serde::Serialize;
use sqlx::SqlitePool;
use crate::auth::{AdminUser, UserInfo};
use crate::booking::book_class;
use crate::db::DbPool;
use crate::gymdatetime::GymDateTime;
use crate::tables::classes::{self, ClassId};
use crate::tables::members::{self, MemberId};
use crate::tables::reservations::{self, ReservationId, ReservationStatus, StatusError};
use crate::util::{booking_refusal, form_errors, form_value, not_found, sqlx_to_custom_error, FormOutcome, Notice, SelectOption};

#[derive(Debug, FromForm)]
struct NewReservationValues {
    member_id: MemberId,
    class_id: ClassId,
}

#[derive(Debug, FromForm)]
struct StatusValues<'v> {
    status: &'v str,
}

#[derive(Serialize, Debug)]
struct StatusOption {
    status: ReservationStatus,
    selected: bool,
}

async fn render_new_form(pool: &SqlitePool, user: UserInfo, member_id: Option<MemberId>, class_id: Option<ClassId>, errors: Vec<String>) -> Result<Template, Custom<String>> {
    let members = members::list_members(pool).await.map_err(sqlx_to_custom_error)?
        .into_iter()
        .map(|m| SelectOption {
            id: m.id,
            selected: member_id == Some(m.id),
            label: format!("{} <{}>", m.name, m.email),
        })
        .collect::<Vec<_>>();
    let classes = classes::list_bookable_classes(pool, GymDateTime::now()).await.map_err(sqlx_to_custom_error)?
        .into_iter()
        .map(|c| SelectOption {
            id: c.id,
            selected: class_id == Some(c.id),
            label: format!("{} - {} ({} of {} free)", c.start_time.to_display_string(), c.name, c.remaining, c.max_capacity),
        })
        .collect::<Vec<_>>();
    Ok(Template::render("admin/reservation_new", context! {
        user,
        members,
        classes,
        errors,
    }))
}

#[get("/admin/reservations")]
async fn get_reservations(admin: AdminUser, flash: Option<FlashMessage<'_>>, db: &State<DbPool>) -> Result<Template, Custom<String>> {
    let reservations = reservations::list_reservations(&db.0).await.map_err(sqlx_to_custom_error)?;
    Ok(Template::render("admin/reservations", context! {
        user: admin.0,
        notice: flash.map(Notice::from),
        reservations,
    }))
}

#[get("/admin/reservations/new")]
async fn get_reservation_new(admin: AdminUser, db: &State<DbPool>) -> Result<Template, Custom<String>> {
    render_new_form(&db.0, admin.0, None, None, vec![]).await
}

#[post("/admin/reservations", data = "<form>")]
async fn post_reservation_new(admin: AdminUser, form: Form<Contextual<'_, NewReservationValues>>, db: &State<DbPool>) -> Result<FormOutcome, Custom<String>> {
    let pool = &db.0;
    let errors = match &form.value {
        Some(vals) => {
            let member = members::load_member(pool, vals.member_id).await.map_err(sqlx_to_custom_error)?;
            match member {
                None => vec![format!("member_id: member {} does not exist", vals.member_id)],
                Some(member) => match book_class(pool, member.id, vals.class_id, GymDateTime::now()).await {
                    Ok(id) => {
                        info!("Reservation {id} created by administrator {} for {}", admin.0.email, member.email);
                        let message = format!("Reservation created for {}.", member.name);
                        return Ok(Ok(Flash::success(Redirect::to("/admin/reservations"), message)));
                    }
                    Err(err) => vec![booking_refusal(err)?],
                },
            }
        }
        None => form_errors(&form.context),
    };
    let member_id = form_value(&form.context, "member_id").parse().ok();
    let class_id = form_value(&form.context, "class_id").parse().ok();
    let page = render_new_form(pool, admin.0, member_id, class_id, errors).await?;
    Ok(Err((Status::UnprocessableEntity, page)))
}

#[get("/admin/reservations/<reservation_id>/edit")]
async fn get_reservation_edit(reservation_id: ReservationId, admin: AdminUser, flash: Option<FlashMessage<'_>>, db: &State<DbPool>) -> Result<Template, Custom<String>> {
    let reservation = reservations::load_reservation(&db.0, reservation_id).await
        .map_err(sqlx_to_custom_error)?
        .ok_or_else(|| not_found(&format!("Reservation {reservation_id}")))?;
    let statuses = ReservationStatus::ALL.into_iter()
        .filter(|s| reservation.status.can_become(*s))
        .map(|status| StatusOption { status, selected: status == reservation.status })
        .collect::<Vec<_>>();
    Ok(Template::render("admin/reservation_edit", context! {
        user: admin.0,
        notice: flash.map(Notice::from),
        reservation,
        statuses,
    }))
}

#[post("/admin/reservations/<reservation_id>", data = "<form>")]
async fn post_reservation_edit(reservation_id: ReservationId, admin: AdminUser, form: Form<StatusValues<'_>>, db: &State<DbPool>) -> Result<Flash<Redirect>, Custom<String>> {
    let edit_page = format!("/admin/reservations/{reservation_id}/edit");
    let next = match form.status.parse::<ReservationStatus>() {
        Ok(next) => next,
        Err(err) => return Ok(Flash::error(Redirect::to(edit_page), err.to_string())),
    };
    match reservations::change_status(&db.0, reservation_id, next).await {
        Ok(status) => {
            debug!("Reservation {reservation_id} set to {status} by {}", admin.0.email);
            Ok(Flash::success(Redirect::to("/admin/reservations"), format!("Reservation {reservation_id} is {status}.")))
        }
        Err(err @ StatusError::InvalidTransition { .. }) => Ok(Flash::error(Redirect::to(edit_page), err.to_string())),
        Err(StatusError::NotFound(_)) => Err(not_found(&format!("Reservation {reservation_id}"))),
        Err(StatusError::Storage(err)) => Err(sqlx_to_custom_error(err)),
    }
}

#[post("/admin/reservations/<reservation_id>/delete")]
async fn post_reservation_delete(reservation_id: ReservationId, admin: AdminUser, db: &State<DbPool>) -> Result<Flash<Redirect>, Custom<String>> {
    if reservations::delete_reservation(&db.0, reservation_id).await.map_err(sqlx_to_custom_error)? {
        info!("Reservation deleted, id: {reservation_id}, by: {}", admin.0.email);
        Ok(Flash::success(Redirect::to("/admin/reservations"), "Reservation deleted."))
    } else {
        Ok(Flash::error(Redirect::to("/admin/reservations"), format!("Reservation {reservation_id} does not exist.")))
    }
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/", routes![
            get_reservations,
            get_reservation_new,
            post_reservation_new,
            get_reservation_edit,
            post_reservation_edit,
            post_reservation_delete,
        ])
}
