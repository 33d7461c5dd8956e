pub mod config;
pub mod metadata;
pub mod outcome;
pub mod resource;
pub mod task;
