pub mod callback;
pub mod channel;
pub mod channel_repository;
pub mod hub_info;
pub mod subscription;
pub mod video;
