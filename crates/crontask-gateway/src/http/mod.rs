pub mod error;
pub mod health;
pub mod logs;
pub mod tasks;
