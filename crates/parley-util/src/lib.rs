pub mod sanitize;
pub mod snowflake;
pub mod token;
pub mod validation;
