pub mod automaton;
pub mod channel;
pub mod engine;
pub mod error;
pub mod feed;
pub mod observer;
pub mod receiver;
pub mod scenario_runner;
pub mod sender;
pub mod timer;
pub mod trace;

pub use automaton::Transition;
pub use channel::{ChannelError, FaultPlan, LinkReceiver, LinkSender, LinkStats, link};
pub use engine::Simulator;
pub use error::SessionError;
pub use feed::{CollectingSink, LineFeed, LogSink, ScriptedFeed, SyntheticFeed};
pub use observer::{EventRecorder, Fanout, LinkEventSummary, TracingObserver};
pub use receiver::{ReceiverMachine, ReceiverState, ReceiverStats};
pub use sender::{SenderMachine, SenderState, SenderStats};
pub use timer::{TimedReceiver, TimerState};
pub use trace::SimulationReport;
