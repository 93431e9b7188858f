use std::{sync::Arc, time::Duration};

use {
    anyhow::{Context, Result},
    async_trait::async_trait,
    clap::Args,
    parley_auto_reply::{ReplyHooks, ReplyOptions, ReplyPipeline, resolve_heartbeat_minutes},
    parley_common::{ChatType, MsgContext},
    parley_config::ParleyConfig,
    tracing::{debug, info, warn},
};

#[derive(Args)]
pub struct ReplyArgs {
    /// Sender address (e.g. `+15551234567` or `whatsapp:+15551234567`).
    #[arg(long)]
    from: String,
    /// Recipient address; the bot's own number.
    #[arg(long)]
    to: Option<String>,
    /// Message text.
    #[arg(long)]
    body: String,
    /// Treat the message as coming from a group chat.
    #[arg(long, default_value_t = false)]
    group: bool,
    #[arg(long)]
    group_subject: Option<String>,
    /// Comma separated member list of the group.
    #[arg(long)]
    group_members: Option<String>,
    #[arg(long)]
    sender_name: Option<String>,
    /// Local path of inbound media.
    #[arg(long)]
    media_path: Option<String>,
    #[arg(long)]
    media_type: Option<String>,
    #[arg(long)]
    media_url: Option<String>,
    /// Transcript of inbound audio.
    #[arg(long)]
    transcript: Option<String>,
}

#[derive(Args)]
pub struct HeartbeatArgs {
    /// Recipient; defaults to the most recently active session.
    #[arg(long)]
    to: Option<String>,
    /// Keep running heartbeats at the configured interval.
    #[arg(long, default_value_t = false)]
    watch: bool,
    /// Interval override in minutes (`0` disables).
    #[arg(long)]
    minutes: Option<u64>,
}

/// Typing indicators only show up in the logs when run from the terminal.
struct LogTyping;

#[async_trait]
impl ReplyHooks for LogTyping {
    async fn on_reply_start(&self) {
        debug!("typing…");
    }
}

pub async fn handle_reply(config: ParleyConfig, args: ReplyArgs) -> Result<()> {
    let ctx = MsgContext {
        from: Some(args.from),
        to: args.to,
        chat_type: if args.group {
            ChatType::Group
        } else {
            ChatType::Direct
        },
        group_subject: args.group_subject,
        group_members: args.group_members,
        sender_name: args.sender_name,
        media_path: args.media_path,
        media_type: args.media_type,
        media_url: args.media_url,
        transcript: args.transcript,
        ..MsgContext::new(args.body)
    };
    let pipeline = ReplyPipeline::from_config(config);
    let opts = ReplyOptions {
        hooks: Some(Arc::new(LogTyping)),
        is_heartbeat: false,
    };
    let payloads = pipeline.get_reply(&ctx, &opts).await?;
    if payloads.is_empty() {
        info!("no reply");
    }
    println!("{}", serde_json::to_string_pretty(&payloads)?);
    Ok(())
}

pub async fn handle_heartbeat(config: ParleyConfig, args: HeartbeatArgs) -> Result<()> {
    let minutes = resolve_heartbeat_minutes(&config, args.minutes);
    let pipeline = ReplyPipeline::from_config(config);

    if !args.watch {
        return heartbeat_once(&pipeline, args.to.as_deref()).await;
    }

    let minutes = minutes.context("heartbeats are disabled (command mode with heartbeat_minutes > 0 required)")?;
    info!(minutes, "starting heartbeat loop");
    let mut ticker = tokio::time::interval(Duration::from_secs(minutes * 60));
    loop {
        ticker.tick().await;
        if let Err(e) = heartbeat_once(&pipeline, args.to.as_deref()).await {
            warn!(error = %e, "heartbeat failed");
        }
    }
}

async fn heartbeat_once(pipeline: &ReplyPipeline, to: Option<&str>) -> Result<()> {
    let outcome = pipeline.run_heartbeat_once(to).await?;
    if outcome.skipped() {
        info!(recipient = ?outcome.recipient, "heartbeat ok");
        return Ok(());
    }
    println!(
        "{}",
        serde_json::json!({
            "to": outcome.recipient,
            "payloads": outcome.payloads,
        })
    );
    Ok(())
}
