use super::handlers;
use actix_web::{web, Scope};

pub fn routes() -> Scope {
    web::scope("/videos").service(handlers::get_video)
}
