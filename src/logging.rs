use crate::{COMMAND_TARGET, CONSOLE_TARGET, Data, ERROR_TARGET, Error};
use poise::{Context, FrameworkError};
use std::path::Path;
use std::time::Instant;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log directory name
pub const LOG_DIR: &str = "logs";
/// Moderation log file name
pub const MODERATION_LOG_FILE: &str = "moderation";

/// Initialize the logging system with console and file outputs
///
/// # Errors
/// Returns an error if the log directory cannot be created or the default
/// filter does not parse
pub fn init() -> Result<(), Error> {
    if !Path::new(LOG_DIR).exists() {
        std::fs::create_dir_all(LOG_DIR)?;
    }

    let log_file = RollingFileAppender::new(Rotation::DAILY, LOG_DIR, MODERATION_LOG_FILE);

    let console_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(true);

    // JSON so the moderation log can be grepped by member or record id
    let file_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(false)
        .json()
        .with_writer(log_file);

    // RUST_LOG wins; otherwise info with serenity's heartbeat noise cut
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("info").add_directive("serenity=error".parse()?),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging system initialized");
    Ok(())
}

fn guild_label(ctx: Context<'_, Data, Error>) -> String {
    ctx.guild_id()
        .map_or_else(|| "DM".to_string(), |id| id.get().to_string())
}

/// Log the start of a command execution (pre-command hook)
pub async fn log_command_start(ctx: Context<'_, Data, Error>) {
    ctx.set_invocation_data(Instant::now()).await;

    info!(
        target: COMMAND_TARGET,
        command = %ctx.command().qualified_name,
        guild_id = %guild_label(ctx),
        user_id = ctx.author().id.get(),
        arguments = %ctx.invocation_string(),
        event = "start",
        "Command execution started"
    );
}

/// Log the end of a command execution (post-command hook)
pub async fn log_command_end(ctx: Context<'_, Data, Error>) {
    let elapsed = ctx
        .invocation_data::<Instant>()
        .await
        .map(|start| start.elapsed());
    let duration_ms = u64::try_from(elapsed.map_or(0, |d| d.as_millis())).unwrap_or_default();

    info!(
        target: COMMAND_TARGET,
        command = %ctx.command().qualified_name,
        guild_id = %guild_label(ctx),
        user_id = ctx.author().id.get(),
        duration_ms,
        event = "end",
        "Command execution completed"
    );
}

/// Log errors that occur during command execution
pub fn log_command_error(error: &FrameworkError<'_, Data, Error>) {
    match error {
        FrameworkError::Command { error, ctx, .. } => {
            error!(
                target: ERROR_TARGET,
                command = %ctx.command().qualified_name,
                guild_id = %guild_label(*ctx),
                user_id = ctx.author().id.get(),
                error = %error,
                "Command error"
            );
        }
        // Messages the moderation policies are about to delete
        FrameworkError::CommandCheckFailed { error: None, ctx, .. } => {
            info!(
                target: COMMAND_TARGET,
                command = %ctx.command().qualified_name,
                guild_id = %guild_label(*ctx),
                user_id = ctx.author().id.get(),
                "Command blocked by check"
            );
        }
        FrameworkError::CommandCheckFailed { error, ctx, .. } => {
            let error_msg = error
                .as_ref()
                .map_or_else(|| "Check failed".to_string(), ToString::to_string);

            error!(
                target: ERROR_TARGET,
                command = %ctx.command().qualified_name,
                guild_id = %guild_label(*ctx),
                user_id = ctx.author().id.get(),
                error = %error_msg,
                "Command check failed"
            );
        }
        err => {
            error!(
                target: ERROR_TARGET,
                error = ?err,
                "Other framework error"
            );
        }
    }
}

pub fn log_console(message: &str) {
    info!(
        target: CONSOLE_TARGET,
        message = %message,
        event = "console",
    );
}
