use crate::packet::Packet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source of application messages for the sender.
pub trait AppFeed: Send {
    /// Next message to transmit on `stream`, or `None` once exhausted.
    /// May block. An error ends the session.
    fn pull_outbound(&mut self, stream: u32) -> anyhow::Result<Option<String>>;
}

/// Destination of payloads the receiver has accepted.
pub trait AppSink: Send {
    /// Must not block indefinitely.
    fn push_inbound(&mut self, payload: &str);
}

/// Observer notified of every link fate, timer action and transition.
///
/// The automata behave identically whether or not anything listens.
pub trait SessionObserver: Send + Sync {
    fn on_event(&self, event: &SessionEvent);
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl SessionObserver for NullObserver {
    fn on_event(&self, _event: &SessionEvent) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Sender to receiver (data).
    Forward,
    /// Receiver to sender (acknowledgements).
    Backward,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => f.write_str("Sender->Receiver"),
            Direction::Backward => f.write_str("Receiver->Sender"),
        }
    }
}

/// What the channel did with one transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkFate {
    Queued { latency_ms: u64 },
    Dropped { scripted: bool },
    Corrupted { scripted: bool, wire: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetransmitReason {
    CorruptReply,
    NegativeAck,
    /// 2.2/3.0: an ACK for the wrong sequence.
    StaleAck { carried: Option<char> },
    Timeout,
}

impl fmt::Display for RetransmitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetransmitReason::CorruptReply => f.write_str("corrupt acknowledgement"),
            RetransmitReason::NegativeAck => f.write_str("NAK"),
            RetransmitReason::StaleAck { carried } => {
                write!(f, "wrong acknowledgement (ACK/{})", carried.unwrap_or('?'))
            }
            RetransmitReason::Timeout => f.write_str("timeout"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SenderAction {
    Transmitted { packet: Packet },
    Acknowledged { reply: Packet },
    Retransmitted { packet: Packet, reason: RetransmitReason },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverAction {
    Accepted { packet: Packet, reply: Packet },
    Duplicate { packet: Packet, reply: Packet },
    Corrupt { packet: Packet, reply: Packet },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    Started { duration_ms: u64 },
    Stopped,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Link {
        direction: Direction,
        transmission: u64,
        fate: LinkFate,
    },
    Sender {
        from: u8,
        to: u8,
        action: SenderAction,
    },
    Receiver {
        from: u8,
        to: u8,
        action: ReceiverAction,
    },
    Timer(TimerAction),
    Delivered {
        payload: String,
    },
    FeedExhausted,
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::Link {
                direction,
                transmission,
                fate,
            } => match fate {
                LinkFate::Queued { latency_ms } => {
                    write!(f, "[{direction}] #{transmission} SEND (latency={latency_ms}ms)")
                }
                LinkFate::Dropped { scripted: true } => {
                    write!(f, "[{direction}] #{transmission} DROP (scripted)")
                }
                LinkFate::Dropped { scripted: false } => {
                    write!(f, "[{direction}] #{transmission} DROP (random loss)")
                }
                LinkFate::Corrupted { scripted, wire } => {
                    let cause = if *scripted { "scripted" } else { "random" };
                    write!(f, "[{direction}] #{transmission} CORRUPT ({cause}) -> {wire:?}")
                }
            },
            SessionEvent::Sender { from, to, action } => match action {
                SenderAction::Transmitted { packet } => {
                    write!(f, "Sender({from}->{to}): send {packet}")
                }
                SenderAction::Acknowledged { reply } => {
                    write!(f, "Sender({from}->{to}): acknowledged by {reply}")
                }
                SenderAction::Retransmitted { packet, reason } => {
                    write!(f, "Sender({from}->{to}): {reason}; resending {packet}")
                }
            },
            SessionEvent::Receiver { from, to, action } => match action {
                ReceiverAction::Accepted { packet, reply } => write!(
                    f,
                    "Receiver({from}->{to}): ok data {packet}; replying {}",
                    reply_label(reply)
                ),
                ReceiverAction::Duplicate { packet, reply } => write!(
                    f,
                    "Receiver({from}->{to}): duplicate {packet}; discarding; replying {}",
                    reply_label(reply)
                ),
                ReceiverAction::Corrupt { packet, reply } => write!(
                    f,
                    "Receiver({from}->{to}): corrupt data {packet}; replying {}",
                    reply_label(reply)
                ),
            },
            SessionEvent::Timer(TimerAction::Started { duration_ms }) => {
                write!(f, "Timer armed for {duration_ms}ms")
            }
            SessionEvent::Timer(TimerAction::Stopped) => f.write_str("Timer stopped"),
            SessionEvent::Timer(TimerAction::Expired) => f.write_str("Timer expired"),
            SessionEvent::Delivered { payload } => write!(f, "DELIVERED {payload:?}"),
            SessionEvent::FeedExhausted => f.write_str("Application feed exhausted"),
        }
    }
}

fn reply_label(reply: &Packet) -> String {
    match reply.sequence() {
        Some(seq) if seq != crate::packet::NO_SEQUENCE => format!("{}/{seq}", reply.payload()),
        _ => reply.payload().to_string(),
    }
}
