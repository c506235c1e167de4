pub mod checksum;
pub mod config;
pub mod generation;
pub mod interface;
pub mod packet;
pub mod scenario;

pub use generation::{Generation, PacketFormat, ReplyStyle};
pub use interface::{
    AppFeed, AppSink, Direction, LinkFate, NullObserver, ReceiverAction, RetransmitReason,
    SenderAction, SessionEvent, SessionObserver, TimerAction,
};
pub use packet::{ACK, NAK, NO_SEQUENCE, Packet};

pub use config::{ConfigError, SimConfig};
pub use scenario::{SimConfigOverride, TestAction, TestAssertion, TestScenario};
