//! Protocol message logging with per-tag severity.

use codec::{Body, Message, Tag};
use std::collections::HashMap;
use tracing::Level;

/// Logs sent and received protocol messages through `tracing`.
///
/// All messages are logged at a default level, with optional per-tag
/// overrides so that high-rate data commands (CW_provision, ECM_response,
/// data_provision) can be demoted below session management messages.
#[derive(Clone, Debug)]
pub struct ProtocolLogger {
    default_level: Option<Level>,
    overrides: HashMap<Tag, Option<Level>>,
}

impl ProtocolLogger {
    /// Log every message at `level`.
    pub fn new(level: Level) -> Self {
        ProtocolLogger { default_level: Some(level), overrides: HashMap::new() }
    }

    /// Discard all messages (per-tag overrides still apply).
    pub fn silent() -> Self {
        ProtocolLogger { default_level: None, overrides: HashMap::new() }
    }

    pub fn set_default_level(&mut self, level: Option<Level>) {
        self.default_level = level;
    }

    /// Override the level for one command tag. `None` silences it.
    pub fn set_tag_level(&mut self, tag: Tag, level: Option<Level>) {
        self.overrides.insert(tag, level);
    }

    fn level_for(&self, tag: Tag) -> Option<Level> {
        self.overrides.get(&tag).copied().unwrap_or(self.default_level)
    }

    /// Log one message with a short context line, e.g.
    /// `sending message to 10.0.0.1:4567`.
    pub fn log<B: Body>(&self, msg: &Message<B>, context: &str) {
        let Some(level) = self.level_for(msg.tag()) else {
            return;
        };
        let dump = msg.dump(2);
        match level {
            Level::ERROR => tracing::error!("{context}\n{dump}"),
            Level::WARN => tracing::warn!("{context}\n{dump}"),
            Level::INFO => tracing::info!("{context}\n{dump}"),
            Level::DEBUG => tracing::debug!("{context}\n{dump}"),
            Level::TRACE => tracing::trace!("{context}\n{dump}"),
        }
    }
}

impl Default for ProtocolLogger {
    fn default() -> Self {
        ProtocolLogger::new(Level::DEBUG)
    }
}
