pub mod catalog;
pub mod config;
pub mod paths;
pub mod schema;
pub mod source;
pub mod status;
