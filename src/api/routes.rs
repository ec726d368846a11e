use super::{callbacks, channels, hub, users, videos};
use actix_web::{web, Scope};

pub fn routes() -> Scope {
    web::scope("/api")
        .service(hub::routes())
        .service(channels::routes())
        .service(callbacks::routes())
        .service(videos::routes())
        .service(users::routes())
}
