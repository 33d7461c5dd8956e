pub mod builder;
pub mod guard;
pub mod lifecycle;
pub mod logs;
pub mod waiter;
pub mod watcher;
