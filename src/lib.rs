pub mod config;
pub mod manager;
pub mod scheduler;
pub mod tasks;
pub mod worker;
