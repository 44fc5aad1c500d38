pub mod analysis;
pub mod backup_exchange;
pub mod core;
pub mod groups;
pub mod institutions;
pub mod questions;
pub mod reports;
pub mod responses;
pub mod students;
