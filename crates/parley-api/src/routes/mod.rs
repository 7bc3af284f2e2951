pub mod auth;
pub mod file_shares;
pub mod rooms;
