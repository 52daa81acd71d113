pub mod events;
pub mod model;
pub mod publisher;
pub mod repository;
pub mod service;
pub mod transcoder;
