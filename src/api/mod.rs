pub mod callbacks;
pub mod channels;
pub mod health;
pub mod hub;
pub mod routes;
pub mod users;
pub mod videos;
