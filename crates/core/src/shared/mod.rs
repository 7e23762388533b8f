pub mod constants;
pub mod sanitize;
