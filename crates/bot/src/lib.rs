pub mod commands;
pub mod keep_alive;
pub mod notifier;
pub mod registry;
pub mod scheduler;
pub mod telegram;
pub mod webhook;
