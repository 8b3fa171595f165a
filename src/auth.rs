use base64::Engine;
use base64::engine::general_purpose;
use hmac::{Hmac, Mac};
use rocket::form::Form;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::request::{self, FlashMessage, FromRequest};
use rocket::response::{Flash, Redirect};
use rocket::response::status::Custom;
use rocket::{Build, Request, Rocket, State};
use rocket_dyn_templates::{context, Template};
use serde::Serialize;
use sha2::Sha256;
use sqlx::SqlitePool;
use crate::db::DbPool;
use crate::tables::users::{self, Role, UserId};
use crate::util::{generate_random_string, is_valid_email, sqlx_to_custom_error, Notice};
use crate::{GymSession, SessionId, SharedGymState};

type HmacSha256 = Hmac<Sha256>;

pub const GYM_SESSION_ID: &str = "gym_session_id";
pub const MIN_PASSWORD_LEN: usize = 6;
const SALT_LEN: usize = 16;

/// Identity of the logged-in user, resolved per request from the session cookie.
#[derive(Clone, Debug, Serialize)]
pub struct UserInfo {
    pub user_id: UserId,
    pub email: String,
    pub role: Role,
}

fn password_tag(salt: &str, password: &str) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(salt.as_bytes()).expect("HMAC can take key of any size");
    mac.update(password.as_bytes());
    mac
}
/// Salted HMAC-SHA256, stored as `salt$base64(tag)`.
pub fn hash_password(password: &str) -> String {
    let salt = generate_random_string(SALT_LEN);
    let tag = password_tag(&salt, password).finalize().into_bytes();
    format!("{salt}${}", general_purpose::STANDARD.encode(tag))
}
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt, tag)) = stored.split_once('$') else {
        return false;
    };
    let Ok(tag) = general_purpose::STANDARD.decode(tag) else {
        return false;
    };
    password_tag(salt, password).verify_slice(&tag).is_ok()
}

/// Checks the login part of an account form. An empty password is accepted when not `password_required`,
/// meaning the current one is kept.
pub(crate) async fn check_account(pool: &SqlitePool, email: &str, password: &str, password_required: bool, user_id: Option<UserId>) -> sqlx::Result<Vec<String>> {
    let mut errors = Vec::new();
    if !is_valid_email(email) {
        errors.push(format!("email: '{email}' is not a valid email address"));
    } else if users::email_taken(pool, email, user_id).await? {
        errors.push(format!("email: '{email}' is already used by another account"));
    }
    if password.is_empty() {
        if password_required {
            errors.push("password: must be set".to_string());
        }
    } else if password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(format!("password: must have at least {MIN_PASSWORD_LEN} characters"));
    }
    Ok(errors)
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for SessionId {
    type Error = ();
    async fn from_request(request: &'r Request<'_>) -> request::Outcome<SessionId, ()> {
        if let Some(cookie) = request.cookies().get_private(GYM_SESSION_ID) {
            return request::Outcome::Success(SessionId(cookie.value().to_string()));
        }
        request::Outcome::Forward(Status::Unauthorized)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for UserInfo {
    type Error = ();
    async fn from_request(request: &'r Request<'_>) -> request::Outcome<UserInfo, ()> {
        let session_id = match request.guard::<SessionId>().await {
            request::Outcome::Success(id) => id,
            request::Outcome::Error(e) => return request::Outcome::Error(e),
            request::Outcome::Forward(status) => return request::Outcome::Forward(status),
        };
        let state = match request.guard::<&State<SharedGymState>>().await {
            request::Outcome::Success(state) => state,
            _ => return request::Outcome::Error((Status::InternalServerError, ())),
        };
        let user = state.read()
            .ok()
            .and_then(|s| s.sessions.get(&session_id).map(|s| s.user_info.clone()));
        match user {
            Some(user) => request::Outcome::Success(user),
            None => request::Outcome::Forward(Status::Unauthorized),
        }
    }
}

macro_rules! role_guard {
    ($name:ident, $role:expr) => {
        pub struct $name(pub UserInfo);

        #[rocket::async_trait]
        impl<'r> FromRequest<'r> for $name {
            type Error = ();
            async fn from_request(request: &'r Request<'_>) -> request::Outcome<$name, ()> {
                match request.guard::<UserInfo>().await {
                    request::Outcome::Success(user) if user.role == $role => request::Outcome::Success($name(user)),
                    request::Outcome::Success(_) => request::Outcome::Error((Status::Forbidden, ())),
                    request::Outcome::Error(e) => request::Outcome::Error(e),
                    request::Outcome::Forward(status) => request::Outcome::Forward(status),
                }
            }
        }
    };
}
role_guard!(AdminUser, Role::Administrator);
role_guard!(InstructorUser, Role::Instructor);
role_guard!(MemberUser, Role::Member);

#[derive(Debug, FromForm)]
struct LoginForm<'v> {
    email: &'v str,
    password: &'v str,
}

#[get("/login")]
fn get_login(flash: Option<FlashMessage<'_>>) -> Template {
    Template::render("login", context! {
        notice: flash.map(Notice::from),
    })
}

#[post("/login", data = "<form>")]
async fn post_login(form: Form<LoginForm<'_>>, cookies: &CookieJar<'_>, state: &State<SharedGymState>, db: &State<DbPool>) -> Result<Flash<Redirect>, Custom<String>> {
    let email = form.email.trim();
    let user = users::load_user_by_email(&db.0, email).await.map_err(sqlx_to_custom_error)?;
    let Some(user) = user.filter(|u| verify_password(form.password, &u.password_hash)) else {
        warn!("Failed login attempt for: {email}");
        return Ok(Flash::error(Redirect::to("/login"), "Wrong email or password."));
    };
    let user_info = UserInfo {
        user_id: user.id,
        email: user.email,
        role: user.role,
    };
    let session_id = generate_random_string(32);
    info!("User log in, email: {}, role: {}", user_info.email, user_info.role);
    state.write()
        .map_err(|e| Custom(Status::InternalServerError, e.to_string()))?
        .sessions.insert(SessionId(session_id.clone()), GymSession { user_info });
    cookies.add_private(
        Cookie::build((GYM_SESSION_ID, session_id))
            .same_site(SameSite::Lax)
            .http_only(true)
            .build()
    );
    Ok(Flash::success(Redirect::to("/dashboard"), "Welcome back!"))
}

#[get("/logout")]
fn logout(session_id: Option<SessionId>, cookies: &CookieJar<'_>, state: &State<SharedGymState>) -> Flash<Redirect> {
    if let Some(session_id) = session_id {
        if let Ok(mut state) = state.write() {
            if let Some(session) = state.sessions.remove(&session_id) {
                info!("User log out, email: {}", session.user_info.email);
            }
        }
    }
    cookies.remove_private(Cookie::from(GYM_SESSION_ID));
    Flash::success(Redirect::to("/login"), "You have been logged out.")
}

/// Replaces the cached identity of every session of `user_id`, e.g. after an email change.
pub(crate) fn refresh_sessions(state: &State<SharedGymState>, user_id: UserId, email: &str) {
    if let Ok(mut state) = state.write() {
        state.sessions.values_mut()
            .filter(|s| s.user_info.user_id == user_id)
            .for_each(|s| s.user_info.email = email.to_string());
    }
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/", routes![
            get_login,
            post_login,
            logout,
        ])
}
