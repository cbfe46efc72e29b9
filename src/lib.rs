pub mod commands;
pub mod config;
pub mod content_filter;
pub mod data;
pub mod gateway;
pub mod handlers;
pub mod logging;
pub mod media_only;
pub mod moderation;

pub const BOT_NAME: &str = "warden_daemon";
pub const COMMAND_TARGET: &str = "warden_daemon::command";
pub const ERROR_TARGET: &str = "warden_daemon::error";
pub const EVENT_TARGET: &str = "warden_daemon::handlers";
pub const CONSOLE_TARGET: &str = "warden_daemon";

pub use config::BotConfig;
pub use data::{Data, DataInner};
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
