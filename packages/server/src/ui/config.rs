//! Command-line configuration of the server binary.

use std::{sync::Arc, time::Duration};

use clap::Parser;

use crate::{
    actor::{PresenceSettings, RoomSettings},
    domain::ReplyGenerator,
    infrastructure::{
        auth::DEFAULT_SESSION_TTL,
        reply::{CannedReplyGenerator, OpenAiReplyGenerator},
    },
    usecase::BotSettings,
};

use super::{error::ServerError, state::StateConfig};

#[derive(Debug, Clone, Parser)]
#[command(name = "hiroba-server", version, about = "Room and presence chat server")]
pub struct ServerArgs {
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    /// Default level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Base URL of an OpenAI-compatible API; canned replies when omitted
    #[arg(long)]
    pub reply_api_base: Option<String>,

    #[arg(long)]
    pub reply_api_key: Option<String>,

    #[arg(long, default_value = "gpt-4o-mini")]
    pub reply_model: String,

    #[arg(long, default_value_t = 20)]
    pub reply_timeout_secs: u64,

    #[arg(long, default_value_t = 4000)]
    pub global_bot_quota: i64,

    #[arg(long, default_value_t = 50)]
    pub user_bot_quota: i64,

    /// Lifetime of sessions issued by the login endpoint
    #[arg(long, default_value_t = DEFAULT_SESSION_TTL.as_secs())]
    pub session_ttl_secs: u64,
}

impl ServerArgs {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn state_config(&self) -> StateConfig {
        StateConfig {
            room: RoomSettings::default(),
            presence: PresenceSettings::default(),
            bots: BotSettings {
                global_daily_limit: self.global_bot_quota,
                user_daily_limit: self.user_bot_quota,
                reply_timeout: Duration::from_secs(self.reply_timeout_secs),
                ..BotSettings::default()
            },
            session_ttl: Duration::from_secs(self.session_ttl_secs),
        }
    }

    pub fn reply_generator(&self) -> Result<Arc<dyn ReplyGenerator>, ServerError> {
        match &self.reply_api_base {
            Some(base) => {
                let generator = OpenAiReplyGenerator::new(
                    base.clone(),
                    self.reply_api_key.clone(),
                    self.reply_model.clone(),
                    Duration::from_secs(self.reply_timeout_secs),
                )?;
                Ok(Arc::new(generator))
            }
            None => {
                tracing::info!("no reply API configured, bots answer with canned replies");
                Ok(Arc::new(CannedReplyGenerator))
            }
        }
    }
}
