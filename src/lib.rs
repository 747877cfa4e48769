pub mod batch;
pub mod config;
pub mod driver;
pub mod errors;
pub mod operator;
pub mod phone;
pub mod retry;
pub mod roster;
pub mod session;
pub mod store;
pub mod ui;
