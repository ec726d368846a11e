pub mod api;
pub mod channels;
pub mod config;
pub mod db;
pub mod errors;
pub mod hub;
pub mod models;
pub mod observability;
pub mod schema;
pub mod tasks;
#[cfg(test)]
pub mod test_helpers;
pub mod youtube;

// Type definitions
use actix_web::web;
use diesel::r2d2::{self, ConnectionManager};
use diesel::sqlite::SqliteConnection;

pub type DbPool = r2d2::Pool<ConnectionManager<SqliteConnection>>;
pub type RqDbPool = web::Data<DbPool>;
