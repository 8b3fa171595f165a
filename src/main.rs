#[macro_use] extern crate rocket;

use std::collections::HashMap;
use std::sync::RwLock;
use rocket::figment::Figment;
use rocket::fs::FileServer;
use rocket::http::Status;
use rocket::response::Redirect;
use rocket::{Build, Request, Rocket};
use rocket_dyn_templates::{context, handlebars, Template};
use rocket_dyn_templates::handlebars::{Handlebars, Helper};
use crate::auth::UserInfo;
use crate::db::DbPoolFairing;
use crate::gymdatetime::{dtinput, dtstr};

#[cfg(test)]
mod tests;
mod db;
mod auth;
mod util;
mod gymdatetime;
mod tables;
mod booking;
mod api;
mod dashboard;
mod classes;
mod reservations;
mod members;
mod instructors;
mod member_area;
mod instructor_area;

struct GymSession {
    user_info: UserInfo,
}
#[derive(Eq, Hash, PartialEq)]
struct SessionId(String);

#[derive(Default)]
struct GymState {
    sessions: HashMap<SessionId, GymSession>,
}
type SharedGymState = RwLock<GymState>;

#[get("/")]
fn index(user: Option<UserInfo>) -> Redirect {
    match user {
        Some(_) => Redirect::to("/dashboard"),
        None => Redirect::to("/login"),
    }
}

#[catch(401)]
fn unauthorized() -> Redirect {
    Redirect::to("/login")
}
#[catch(default)]
async fn default_catcher(status: Status, req: &Request<'_>) -> Template {
    let user = req.guard::<UserInfo>().await.succeeded();
    Template::render("error", context! {
        code: status.code,
        reason: status.reason().unwrap_or("Error"),
        path: req.uri().path().to_string(),
        user,
    })
}

fn register_helpers(handlebars: &mut Handlebars<'static>) {
    handlebars.register_helper("dtstr",
                               Box::new(|h: &Helper, _r: &Handlebars, _: &handlebars::Context, _rc: &mut handlebars::RenderContext, out: &mut dyn handlebars::Output| -> handlebars::HelperResult {
                                   let val = h.param(0).ok_or(handlebars::RenderErrorReason::ParamNotFoundForIndex("dtstr", 0))?.value();
                                   out.write(&dtstr(val.as_str()))?;
                                   Ok(())
                               }));
    handlebars.register_helper("dtinput",
                               Box::new(|h: &Helper, _r: &Handlebars, _: &handlebars::Context, _rc: &mut handlebars::RenderContext, out: &mut dyn handlebars::Output| -> handlebars::HelperResult {
                                   let val = h.param(0).ok_or(handlebars::RenderErrorReason::ParamNotFoundForIndex("dtinput", 0))?.value();
                                   out.write(&dtinput(val.as_str()))?;
                                   Ok(())
                               }));
}

pub fn build_rocket(figment: Figment) -> Rocket<Build> {
    let rocket = rocket::custom(figment)
        .attach(Template::custom(|engines| register_helpers(&mut engines.handlebars)))
        .attach(DbPoolFairing())
        .mount("/static", FileServer::from("./static"))
        .mount("/", routes![
            index,
        ])
        .register("/", catchers![
            unauthorized,
            default_catcher,
        ]);
    let rocket = auth::extend(rocket);
    let rocket = dashboard::extend(rocket);
    let rocket = classes::extend(rocket);
    let rocket = reservations::extend(rocket);
    let rocket = members::extend(rocket);
    let rocket = instructors::extend(rocket);
    let rocket = member_area::extend(rocket);
    let rocket = instructor_area::extend(rocket);
    let rocket = api::extend(rocket);

    rocket.manage(SharedGymState::new(GymState::default()))
}

#[launch]
fn rocket() -> _ {
    build_rocket(rocket::Config::figment())
}
