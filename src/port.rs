//! Outbound seam to the chat platforms.
//!
//! The engine never talks to a chat API directly. Platform adapters
//! implement `ChatPort` and translate `Outbound` values into whatever
//! their platform renders; button presses come back as `ChatEvent::Button`
//! with the opaque token unchanged.

use std::path::PathBuf;

use async_trait::async_trait;
use golem_core_types::ChannelId;
use tracing::info;

/// One button the platform should render. `token` round-trips verbatim.
#[derive(Clone, Debug, PartialEq)]
pub struct ButtonSpec {
    pub label: String,
    pub token: String,
}

/// Everything the engine can emit toward a channel.
#[derive(Clone, Debug, PartialEq)]
pub enum Outbound {
    Text(String),
    /// Prompt text plus the buttons to render under it.
    Buttons { text: String, buttons: Vec<ButtonSpec> },
    /// A file for review, e.g. a staged patch candidate.
    Attachment { caption: String, path: PathBuf },
}

#[async_trait]
pub trait ChatPort: Send + Sync {
    async fn deliver(&self, channel: &ChannelId, outbound: Outbound);
}

/// Stdout port used by the CLI and as a last-resort fallback. Buttons are
/// rendered as their tokens so they can be typed back by hand.
pub struct ConsolePort;

#[async_trait]
impl ChatPort for ConsolePort {
    async fn deliver(&self, channel: &ChannelId, outbound: Outbound) {
        match outbound {
            Outbound::Text(text) => {
                println!("[{channel}] {text}");
            }
            Outbound::Buttons { text, buttons } => {
                println!("[{channel}] {text}");
                for button in buttons {
                    println!("[{channel}]   ({}) -> type: {}", button.label, button.token);
                }
            }
            Outbound::Attachment { caption, path } => {
                info!(%channel, path = %path.display(), "attachment staged");
                println!("[{channel}] {caption} (file: {})", path.display());
            }
        }
    }
}
