use crate::automaton::Transition;
use crate::channel::{ChannelError, LinkSender, LinkStats};
use crate::error::SessionError;
use crate::feed::pull_blocking;
use crate::timer::TimedReceiver;
use rdt_lab_abstract::{
    AppFeed, Generation, Packet, ReplyStyle, RetransmitReason, SenderAction, SessionEvent,
    SessionObserver, TimerAction,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::{Duration, Instant, timeout};
use tracing::{error, info};

/// Everything the sender carries from one step to the next.
///
/// Even phases wait for application data, odd phases wait for an
/// acknowledgement of `outstanding`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderState {
    pub phase: u8,
    pub outstanding: Option<Packet>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SenderStats {
    /// Application messages taken from the feed.
    pub messages: u32,
    /// Every data transmission, retransmissions included.
    pub packets_sent: u32,
    pub retransmissions: u32,
    pub timeouts: u32,
    pub corrupt_replies: u32,
    /// NAKs and wrong-sequence ACKs.
    pub negative_replies: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SenderSummary {
    pub stats: SenderStats,
    pub link: LinkStats,
}

/// Stop-and-wait sender for every generation.
pub struct SenderMachine {
    generation: Generation,
    forward: LinkSender,
    backward: TimedReceiver,
    /// Out on the blocking pool while a pull is in flight.
    feed: Option<Box<dyn AppFeed>>,
    observer: Arc<dyn SessionObserver>,
    timeout: Duration,
    /// Total time allowed for awaiting acknowledgements.
    budget: Duration,
    awaited: Duration,
    stats: SenderStats,
}

impl SenderMachine {
    pub fn new(
        generation: Generation,
        forward: LinkSender,
        backward: TimedReceiver,
        feed: Box<dyn AppFeed>,
        observer: Arc<dyn SessionObserver>,
        timeout: Duration,
        budget: Duration,
    ) -> Self {
        Self {
            generation,
            forward,
            backward,
            feed: Some(feed),
            observer,
            timeout,
            budget,
            awaited: Duration::ZERO,
            stats: SenderStats::default(),
        }
    }

    /// Drive the automaton until the feed is exhausted and the last
    /// message has been acknowledged.
    pub async fn run(mut self) -> Result<SenderSummary, SessionError> {
        let mut state = SenderState::default();
        while let Transition::Next(next) = self.advance(state).await? {
            state = next;
        }
        info!(
            "{} sender done: {} messages, {} packets, {} retransmissions",
            self.generation,
            self.stats.messages,
            self.stats.packets_sent,
            self.stats.retransmissions
        );
        Ok(SenderSummary {
            stats: self.stats,
            link: self.forward.stats().clone(),
        })
    }

    /// Perform exactly one transition from `state`.
    pub async fn advance(
        &mut self,
        state: SenderState,
    ) -> Result<Transition<SenderState>, SessionError> {
        let SenderState { phase, outstanding } = state;
        if phase % 2 == 0 {
            return self.send_next(phase).await;
        }
        let packet = outstanding.ok_or(SessionError::NothingOutstanding { phase })?;

        let reason = match self.await_reply().await? {
            Ok(wire) => {
                let reply = Packet::deserialize(&wire, self.generation.packet_format());
                match self.judge(&reply, &packet) {
                    Ok(()) => return Ok(self.acknowledged(phase, reply)),
                    Err(reason) => reason,
                }
            }
            Err(ChannelError::TimedOut) => {
                self.stats.timeouts += 1;
                self.observer
                    .on_event(&SessionEvent::Timer(TimerAction::Expired));
                RetransmitReason::Timeout
            }
            Err(source) => {
                return Err(SessionError::Channel {
                    role: "sender",
                    source,
                });
            }
        };

        self.transmit(&packet)?;
        self.stats.retransmissions += 1;
        self.observer.on_event(&SessionEvent::Sender {
            from: phase,
            to: phase,
            action: SenderAction::Retransmitted {
                packet: packet.clone(),
                reason,
            },
        });
        Ok(Transition::Next(SenderState {
            phase,
            outstanding: Some(packet),
        }))
    }

    pub fn stats(&self) -> &SenderStats {
        &self.stats
    }

    /// Wait for the next reply, charging the wait against the budget.
    async fn await_reply(&mut self) -> Result<Result<String, ChannelError>, SessionError> {
        let remaining = self.budget.saturating_sub(self.awaited);
        let started = Instant::now();
        let received = timeout(remaining, self.backward.receive()).await;
        self.awaited += started.elapsed();
        received.map_err(|_| {
            let budget_ms = self.budget.as_millis() as u64;
            error!(
                "{} sender spent {} ms awaiting acknowledgements, giving up",
                self.generation, budget_ms
            );
            SessionError::Deadline(budget_ms)
        })
    }

    async fn send_next(&mut self, phase: u8) -> Result<Transition<SenderState>, SessionError> {
        let feed = self.feed.take().ok_or_else(|| SessionError::Task {
            role: "feed",
            message: "feed was lost by an earlier failed pull".to_string(),
        })?;
        let (feed, next) = pull_blocking(feed).await.map_err(|e| SessionError::Task {
            role: "feed",
            message: e.to_string(),
        })?;
        self.feed = Some(feed);
        let Some(payload) = next.map_err(SessionError::Feed)? else {
            self.observer.on_event(&SessionEvent::FeedExhausted);
            return Ok(Transition::Finished);
        };
        self.stats.messages += 1;

        let packet = Packet::build(
            self.generation.packet_format(),
            payload,
            sequence_for(phase),
        );
        self.transmit(&packet)?;
        self.observer.on_event(&SessionEvent::Sender {
            from: phase,
            to: phase + 1,
            action: SenderAction::Transmitted {
                packet: packet.clone(),
            },
        });
        Ok(Transition::Next(SenderState {
            phase: phase + 1,
            outstanding: Some(packet),
        }))
    }

    fn acknowledged(&mut self, phase: u8, reply: Packet) -> Transition<SenderState> {
        if self.generation.retransmits_on_timeout() {
            self.backward.stop_timer();
            self.observer
                .on_event(&SessionEvent::Timer(TimerAction::Stopped));
        }
        let next = (phase + 1) % self.generation.sender_phases();
        self.observer.on_event(&SessionEvent::Sender {
            from: phase,
            to: next,
            action: SenderAction::Acknowledged { reply },
        });
        Transition::Next(SenderState {
            phase: next,
            outstanding: None,
        })
    }

    /// Put `packet` on the forward link and, for timed generations, arm
    /// the timer immediately after.
    fn transmit(&mut self, packet: &Packet) -> Result<(), SessionError> {
        self.forward
            .send(packet)
            .map_err(|source| SessionError::Channel {
                role: "sender",
                source,
            })?;
        self.stats.packets_sent += 1;
        if self.generation.retransmits_on_timeout() {
            self.backward.start_timer(self.timeout);
            self.observer.on_event(&SessionEvent::Timer(TimerAction::Started {
                duration_ms: self.timeout.as_millis() as u64,
            }));
        }
        Ok(())
    }

    /// Decide whether `reply` acknowledges `outstanding`.
    fn judge(&mut self, reply: &Packet, outstanding: &Packet) -> Result<(), RetransmitReason> {
        if reply.is_corrupt() {
            self.stats.corrupt_replies += 1;
            return Err(RetransmitReason::CorruptReply);
        }
        let verdict = match self.generation.reply_style() {
            ReplyStyle::AckNak if reply.is_ack() => Ok(()),
            ReplyStyle::AckNak => Err(RetransmitReason::NegativeAck),
            ReplyStyle::SequencedAck
                if reply.is_ack() && reply.sequence() == outstanding.sequence() =>
            {
                Ok(())
            }
            ReplyStyle::SequencedAck => Err(RetransmitReason::StaleAck {
                carried: reply.sequence(),
            }),
        };
        if verdict.is_err() {
            self.stats.negative_replies += 1;
        }
        verdict
    }
}

/// Alternating bit for a sender phase: phases 0-1 carry '0', 2-3 carry '1'.
pub fn sequence_for(phase: u8) -> char {
    if phase < 2 { '0' } else { '1' }
}
