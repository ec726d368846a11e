use super::handlers;
use actix_web::{web, Scope};

pub fn routes() -> Scope {
    web::scope("/channels")
        .service(handlers::list_channels)
        .service(handlers::create_channel)
        .service(handlers::renew_all)
        .service(handlers::get_channel)
        .service(handlers::update_channel)
        .service(handlers::delete_channel)
        .service(handlers::refresh_status)
        .service(handlers::refresh_metadata)
        .service(handlers::fetch_videos)
        .service(handlers::channel_callbacks)
        .service(handlers::channel_videos)
}
