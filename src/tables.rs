pub mod users;
pub mod members;
pub mod instructors;
pub mod facilities;
pub mod classes;
pub mod reservations;

use thiserror::Error;

#[derive(Error, Debug)]
#[error("Unknown {what}: {value}")]
pub struct ParseEnumError {
    pub what: &'static str,
    pub value: String,
}
