pub mod file_share;
pub mod message;
pub mod protocol;
pub mod room;
