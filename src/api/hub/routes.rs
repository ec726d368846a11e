use super::handlers;
use actix_web::{web, Scope};

pub fn routes() -> Scope {
    web::scope("/hub")
        .service(handlers::verify_intent)
        .service(handlers::receive_notification)
}
