use crate::channel::ChannelError;
use rdt_lab_abstract::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("{role} lost its link: {source}")]
    Channel {
        role: &'static str,
        #[source]
        source: ChannelError,
    },
    #[error("application feed failed: {0:#}")]
    Feed(anyhow::Error),
    #[error("sender in phase {phase} has no outstanding packet")]
    NothingOutstanding { phase: u8 },
    #[error("no acknowledgement within the {0} ms session budget")]
    Deadline(u64),
    #[error("{role} task failed: {message}")]
    Task { role: &'static str, message: String },
}
