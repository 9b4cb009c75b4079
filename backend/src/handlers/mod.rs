pub mod admin;
pub mod analysis;
pub mod data;
pub mod export;
pub mod user;
