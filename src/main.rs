use std::env;
use std::sync::{Arc, OnceLock};

use poise::serenity_prelude::{self as serenity};
use serenity::GatewayIntents;
use tracing::{error, info};
use warden_daemon::{BOT_NAME, BotConfig, Data, Error, commands, handlers, logging};

/// Main function to run the bot
async fn async_main() -> Result<(), Error> {
    logging::init()?;

    let config = BotConfig::load().await?;
    let token = env::var("DISCORD_TOKEN").map_err(|_| "DISCORD_TOKEN must be set")?;

    // Filled in by setup so the signal handler can reach the expiry task
    let shared: Arc<OnceLock<Data>> = Arc::new(OnceLock::new());
    let setup_slot = shared.clone();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some("!".to_string()),
                ..Default::default()
            },
            event_handler: |ctx, event, framework, data| {
                Box::pin(handlers::event_handler(ctx, event, framework, data))
            },
            command_check: Some(|ctx| Box::pin(handlers::command_check(ctx))),
            pre_command: |ctx| Box::pin(logging::log_command_start(ctx)),
            post_command: |ctx| Box::pin(logging::log_command_end(ctx)),
            on_error: |error| {
                Box::pin(async move {
                    logging::log_command_error(&error);
                    if let Err(e) = poise::builtins::on_error(error).await {
                        error!("Failed to report command error: {e}");
                    }
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                logging::log_console("Registering commands");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                let data = Data::connect(config, ctx.http.clone(), ctx.cache.clone()).await?;
                let _ = setup_slot.set(data.clone());
                Ok(data)
            })
        })
        .build();

    let intents = GatewayIntents::non_privileged()
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS;
    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {e}");
            return;
        }
        info!("Shutting down");
        if let Some(data) = shared.get() {
            data.shutdown().await;
        }
        shard_manager.shutdown_all().await;
    });

    info!("Starting {BOT_NAME}...");
    client.start().await?;

    Ok(())
}

fn main() {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to build runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(async_main()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
