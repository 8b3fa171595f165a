use chrono::TimeDelta;
use rocket::http::{ContentType, Status};
use rocket::local::blocking::{Client, LocalResponse};
use crate::db::DbPool;
use crate::gymdatetime::GymDateTime;

const ADMIN_EMAIL: &str = "boss@gym.local";
const ADMIN_PASSWORD: &str = "boss-secret";
const PASSWORD: &str = "secret1";

fn create_test_server() -> Client {
    let figment = rocket::Config::figment()
        .merge(("database_url", "sqlite::memory:"))
        .merge(("admin_email", ADMIN_EMAIL))
        .merge(("admin_password", ADMIN_PASSWORD));
    Client::tracked(super::build_rocket(figment)).unwrap()
}

fn encode(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c.to_string(),
            ' ' => "+".to_string(),
            c => format!("%{:02X}", c as u32),
        })
        .collect()
}
fn form(fields: &[(&str, &str)]) -> String {
    fields.iter()
        .map(|(k, v)| format!("{k}={}", encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}
fn post_form<'c>(client: &'c Client, uri: &str, fields: &[(&str, &str)]) -> LocalResponse<'c> {
    client.post(uri.to_string())
        .header(ContentType::Form)
        .body(form(fields))
        .dispatch()
}
fn location(resp: &LocalResponse<'_>) -> Option<String> {
    resp.headers().get_one("Location").map(ToString::to_string)
}

fn login(client: &Client, email: &str, password: &str) {
    client.get("/logout").dispatch();
    let resp = post_form(client, "/login", &[("email", email), ("password", password)]);
    assert_eq!(resp.status(), Status::SeeOther);
    assert_eq!(location(&resp).as_deref(), Some("/dashboard"), "login of {email}");
}

fn add_instructor(client: &Client, name: &str, email: &str) {
    let resp = post_form(client, "/admin/instructors", &[
        ("name", name), ("email", email), ("specialty", "Cycling"), ("password", PASSWORD),
    ]);
    assert_eq!(resp.status(), Status::SeeOther);
}
fn add_member(client: &Client, name: &str, email: &str) {
    let resp = post_form(client, "/admin/members", &[
        ("name", name), ("email", email), ("birth_date", "1990-05-01"), ("gender", "Female"), ("password", PASSWORD),
    ]);
    assert_eq!(resp.status(), Status::SeeOther);
    assert_eq!(location(&resp).as_deref(), Some("/admin/members"));
}
fn class_fields(start_time: &str, max_capacity: &'static str) -> Vec<(&'static str, String)> {
    vec![
        ("name", "Spinning".to_string()),
        ("kind", "Cardio".to_string()),
        ("instructor_id", "1".to_string()),
        ("facility_id", "2".to_string()),
        ("start_time", start_time.to_string()),
        ("duration_min", "45".to_string()),
        ("max_capacity", max_capacity.to_string()),
    ]
}
fn post_class<'c>(client: &'c Client, start_time: GymDateTime, max_capacity: &'static str) -> LocalResponse<'c> {
    post_class_to(client, "/admin/classes", start_time, max_capacity)
}
fn post_class_to<'c>(client: &'c Client, uri: &str, start_time: GymDateTime, max_capacity: &'static str) -> LocalResponse<'c> {
    let fields = class_fields(&start_time.to_local_input(), max_capacity);
    let fields = fields.iter().map(|(k, v)| (*k, v.as_str())).collect::<Vec<_>>();
    post_form(client, uri, &fields)
}
fn availability(client: &Client, class_id: i64) -> serde_json::Value {
    let resp = client.get(format!("/api/classes/{class_id}/availability")).dispatch();
    assert_eq!(resp.status(), Status::Ok);
    assert_eq!(resp.content_type(), Some(ContentType::JSON));
    resp.into_json::<serde_json::Value>().unwrap()
}
fn book(client: &Client, class_id: i64) -> Option<String> {
    let class_id = class_id.to_string();
    let resp = post_form(client, "/book", &[("class_id", class_id.as_str())]);
    assert_eq!(resp.status(), Status::SeeOther);
    location(&resp)
}

fn set_start_time(client: &Client, class_id: i64, start_time: GymDateTime) {
    let pool = &client.rocket().state::<DbPool>().unwrap().0;
    let runtime = rocket::tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    runtime.block_on(async {
        sqlx::query("UPDATE classes SET start_time=? WHERE id=?")
            .bind(start_time)
            .bind(class_id)
            .execute(pool).await.unwrap();
    });
}

/// Admin with one instructor, three members and a two-seat class starting tomorrow.
fn create_gym() -> Client {
    let client = create_test_server();
    login(&client, ADMIN_EMAIL, ADMIN_PASSWORD);
    add_instructor(&client, "Carlos", "carlos@gym.local");
    add_member(&client, "Anna", "anna@gym.local");
    add_member(&client, "Bob", "bob@gym.local");
    add_member(&client, "Cecil", "cecil@gym.local");
    let tomorrow = GymDateTime::now().checked_add(TimeDelta::days(1)).unwrap();
    let resp = post_class(&client, tomorrow, "2");
    assert_eq!(resp.status(), Status::SeeOther);
    assert_eq!(location(&resp).as_deref(), Some("/admin/classes"));
    drop(resp);
    client
}

#[test]
fn anonymous_user_is_sent_to_login() {
    let client = create_test_server();
    for uri in ["/", "/dashboard", "/admin/classes", "/book", "/api/classes/1/availability"] {
        let resp = client.get(uri).dispatch();
        assert_eq!(resp.status(), Status::SeeOther, "{uri}");
        assert_eq!(location(&resp).as_deref(), Some("/login"), "{uri}");
    }
    let resp = client.get("/login").dispatch();
    assert_eq!(resp.status(), Status::Ok);
}

#[test]
fn wrong_password_is_refused() {
    let client = create_test_server();
    let resp = post_form(&client, "/login", &[("email", ADMIN_EMAIL), ("password", "guess")]);
    assert_eq!(resp.status(), Status::SeeOther);
    assert_eq!(location(&resp).as_deref(), Some("/login"));
    let body = client.get("/login").dispatch().into_string().unwrap();
    assert!(body.contains("Wrong email or password."));
    let resp = client.get("/dashboard").dispatch();
    assert_eq!(location(&resp).as_deref(), Some("/login"));
}

#[test]
fn admin_dashboard_counts() {
    let client = create_gym();
    let resp = client.get("/dashboard").dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let body = resp.into_string().unwrap();
    assert!(body.contains(r#"<span class="num">3</span> members"#));
    assert!(body.contains(r#"<span class="num">1</span> instructors"#));
}

#[test]
fn class_in_the_past_is_rejected() {
    let client = create_gym();
    let an_hour_ago = GymDateTime::now().checked_sub(TimeDelta::hours(1)).unwrap();
    let resp = post_class(&client, an_hour_ago, "5");
    assert_eq!(resp.status(), Status::UnprocessableEntity);
    let body = resp.into_string().unwrap();
    assert!(body.contains("start_time: must be in the future"));

    let tomorrow = GymDateTime::now().checked_add(TimeDelta::days(1)).unwrap();
    let resp = post_class(&client, tomorrow, "0");
    assert_eq!(resp.status(), Status::UnprocessableEntity);
    let body = client.get("/admin/classes").dispatch().into_string().unwrap();
    assert!(body.contains("/admin/classes/1/edit"));
    assert!(!body.contains("/admin/classes/2/edit"));
}

#[test]
fn started_class_keeps_its_start_time_on_edit() {
    let client = create_gym();
    let two_hours_ago = GymDateTime::now().checked_sub(TimeDelta::hours(2)).unwrap();
    set_start_time(&client, 1, two_hours_ago);

    let resp = post_class_to(&client, "/admin/classes/1", two_hours_ago, "3");
    assert_eq!(resp.status(), Status::SeeOther);
    assert_eq!(location(&resp).as_deref(), Some("/admin/classes"));
    let seats = availability(&client, 1);
    assert_eq!(seats["max_capacity"], 3);
    assert_eq!(seats["started"], true);

    let three_hours_ago = GymDateTime::now().checked_sub(TimeDelta::hours(3)).unwrap();
    let resp = post_class_to(&client, "/admin/classes/1", three_hours_ago, "3");
    assert_eq!(resp.status(), Status::UnprocessableEntity);
    assert!(resp.into_string().unwrap().contains("start_time: must be in the future"));
}

#[test]
fn duplicate_email_is_rejected() {
    let client = create_gym();
    let resp = post_form(&client, "/admin/members", &[
        ("name", "Anna Again"), ("email", "anna@gym.local"), ("birth_date", ""), ("gender", ""), ("password", PASSWORD),
    ]);
    assert_eq!(resp.status(), Status::UnprocessableEntity);
    assert!(resp.into_string().unwrap().contains("already used by another account"));
}

#[test]
fn booking_flow() {
    let client = create_gym();

    login(&client, "anna@gym.local", PASSWORD);
    assert_eq!(book(&client, 1).as_deref(), Some("/my-reservations"));
    let body = client.get("/my-reservations").dispatch().into_string().unwrap();
    assert!(body.contains("Your seat in Spinning is booked."));
    assert!(body.contains("Confirmed"));

    // same member, same class
    assert_eq!(book(&client, 1).as_deref(), Some("/book"));
    let body = client.get("/book").dispatch().into_string().unwrap();
    assert!(body.contains("You already have a confirmed reservation for this class."));

    let seats = availability(&client, 1);
    assert_eq!(seats["confirmed"], 1);
    assert_eq!(seats["remaining"], 1);
    assert_eq!(seats["started"], false);

    login(&client, "bob@gym.local", PASSWORD);
    assert_eq!(book(&client, 1).as_deref(), Some("/my-reservations"));
    assert_eq!(availability(&client, 1)["remaining"], 0);

    login(&client, "cecil@gym.local", PASSWORD);
    let body = client.get("/book").dispatch().into_string().unwrap();
    assert!(body.contains("No upcoming classes with free seats."));
    assert_eq!(book(&client, 1).as_deref(), Some("/book"));
    let body = client.get("/book").dispatch().into_string().unwrap();
    assert!(body.contains("Class 1 is full"));

    login(&client, "carlos@gym.local", PASSWORD);
    let resp = client.get("/my-classes/1/enrolled").dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let body = resp.into_string().unwrap();
    assert!(body.contains("anna@gym.local"));
    assert!(body.contains("bob@gym.local"));
    assert!(!body.contains("cecil@gym.local"));
}

#[test]
fn cancelled_reservation_frees_the_seat() {
    let client = create_gym();
    login(&client, "anna@gym.local", PASSWORD);
    book(&client, 1);
    login(&client, "bob@gym.local", PASSWORD);
    book(&client, 1);

    login(&client, ADMIN_EMAIL, ADMIN_PASSWORD);
    let resp = post_form(&client, "/admin/reservations/1", &[("status", "Cancelled")]);
    assert_eq!(location(&resp).as_deref(), Some("/admin/reservations"));
    assert_eq!(availability(&client, 1)["remaining"], 1);

    // terminal
    let resp = post_form(&client, "/admin/reservations/1", &[("status", "Confirmed")]);
    assert_eq!(location(&resp).as_deref(), Some("/admin/reservations/1/edit"));
    let body = client.get("/admin/reservations/1/edit").dispatch().into_string().unwrap();
    assert!(body.contains("A Cancelled reservation cannot become Confirmed"));

    // admin books through the same rules
    let resp = post_form(&client, "/admin/reservations", &[("member_id", "2"), ("class_id", "1")]);
    assert_eq!(resp.status(), Status::UnprocessableEntity);
    assert!(resp.into_string().unwrap().contains("Member 2 already holds a confirmed reservation for class 1"));
    let resp = post_form(&client, "/admin/reservations", &[("member_id", "3"), ("class_id", "1")]);
    assert_eq!(location(&resp).as_deref(), Some("/admin/reservations"));
    assert_eq!(availability(&client, 1)["remaining"], 0);
}

#[test]
fn roles_are_enforced() {
    let client = create_gym();
    add_instructor(&client, "Dana", "dana@gym.local");

    login(&client, "anna@gym.local", PASSWORD);
    for uri in ["/admin/classes", "/admin/members", "/my-schedule"] {
        assert_eq!(client.get(uri).dispatch().status(), Status::Forbidden, "{uri}");
    }

    login(&client, "dana@gym.local", PASSWORD);
    assert_eq!(client.get("/book").dispatch().status(), Status::Forbidden);
    assert_eq!(client.get("/my-classes/1/enrolled").dispatch().status(), Status::Forbidden);
    assert_eq!(client.get("/my-schedule").dispatch().status(), Status::Ok);
    assert_eq!(client.get("/api/classes/99/availability").dispatch().status(), Status::NotFound);
}

#[test]
fn instructor_teaching_classes_is_kept() {
    let client = create_gym();
    let resp = client.post("/admin/instructors/1/delete").dispatch();
    assert_eq!(location(&resp).as_deref(), Some("/admin/instructors"));
    let body = client.get("/admin/instructors").dispatch().into_string().unwrap();
    assert!(body.contains("The instructor still teaches classes"));
    assert!(body.contains("carlos@gym.local"));

    let resp = client.post("/admin/classes/1/delete").dispatch();
    assert_eq!(location(&resp).as_deref(), Some("/admin/classes"));
    client.post("/admin/instructors/1/delete").dispatch();
    let body = client.get("/admin/instructors").dispatch().into_string().unwrap();
    assert!(!body.contains("carlos@gym.local"));
}

#[test]
fn member_edits_own_profile() {
    let client = create_gym();
    login(&client, "anna@gym.local", PASSWORD);
    let resp = post_form(&client, "/profile", &[
        ("name", "Anna K"), ("email", "anna.k@gym.local"), ("birth_date", "1990-05-01"), ("gender", "Female"),
        ("password", "newpass"), ("password_confirm", "other"),
    ]);
    assert_eq!(resp.status(), Status::UnprocessableEntity);
    assert!(resp.into_string().unwrap().contains("passwords do not match"));

    let resp = post_form(&client, "/profile", &[
        ("name", "Anna K"), ("email", "anna.k@gym.local"), ("birth_date", "1990-05-01"), ("gender", "Female"),
        ("password", "newpass"), ("password_confirm", "newpass"),
    ]);
    assert_eq!(location(&resp).as_deref(), Some("/profile"));
    let body = client.get("/dashboard").dispatch().into_string().unwrap();
    assert!(body.contains("anna.k@gym.local"));

    login(&client, "anna.k@gym.local", "newpass");
}
