use crate::automaton::Transition;
use crate::channel::{ChannelError, LinkReceiver, LinkSender, LinkStats};
use crate::error::SessionError;
use rdt_lab_abstract::{
    ACK, AppSink, Generation, NAK, Packet, ReceiverAction, ReplyStyle, SessionEvent,
    SessionObserver,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Everything the receiver carries from one step to the next.
///
/// `phase` is the index of the expected sequence value ('0' or '1'); 2.0
/// has a single phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiverState {
    pub phase: u8,
    pub last_accepted: Option<char>,
}

impl ReceiverState {
    fn expected(&self) -> char {
        if self.phase == 0 { '0' } else { '1' }
    }

    /// The sequence a 2.2 receiver re-acknowledges when it cannot accept.
    fn previous(&self) -> char {
        self.last_accepted
            .unwrap_or(if self.phase == 0 { '1' } else { '0' })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReceiverStats {
    pub packets_received: u32,
    pub delivered: u32,
    pub duplicates: u32,
    pub corrupt: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceiverSummary {
    pub stats: ReceiverStats,
    pub delivered: Vec<String>,
    pub link: LinkStats,
}

enum Verdict {
    Fresh,
    Duplicate,
    Corrupt,
}

/// Stop-and-wait receiver for every generation.
pub struct ReceiverMachine {
    generation: Generation,
    forward: LinkReceiver,
    backward: LinkSender,
    sink: Box<dyn AppSink>,
    observer: Arc<dyn SessionObserver>,
    stats: ReceiverStats,
    delivered: Vec<String>,
}

impl ReceiverMachine {
    pub fn new(
        generation: Generation,
        forward: LinkReceiver,
        backward: LinkSender,
        sink: Box<dyn AppSink>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self {
            generation,
            forward,
            backward,
            sink,
            observer,
            stats: ReceiverStats::default(),
            delivered: Vec::new(),
        }
    }

    /// Drive the automaton until the sender hangs up.
    pub async fn run(mut self) -> Result<ReceiverSummary, SessionError> {
        let mut state = ReceiverState::default();
        while let Transition::Next(next) = self.advance(state).await? {
            state = next;
        }
        info!(
            "{} receiver done: {} packets, {} delivered, {} duplicates, {} corrupt",
            self.generation,
            self.stats.packets_received,
            self.stats.delivered,
            self.stats.duplicates,
            self.stats.corrupt
        );
        Ok(ReceiverSummary {
            stats: self.stats,
            delivered: self.delivered,
            link: self.backward.stats().clone(),
        })
    }

    /// Perform exactly one transition from `state`: take one packet off the
    /// forward link, maybe deliver it, and reply.
    pub async fn advance(
        &mut self,
        state: ReceiverState,
    ) -> Result<Transition<ReceiverState>, SessionError> {
        let wire = match self.forward.receive().await {
            Ok(wire) => wire,
            Err(ChannelError::Closed(_)) => return Ok(Transition::Finished),
            Err(source) => {
                return Err(SessionError::Channel {
                    role: "receiver",
                    source,
                });
            }
        };
        self.stats.packets_received += 1;
        let format = self.generation.packet_format();
        let packet = Packet::deserialize(&wire, format);

        let verdict = if packet.is_corrupt() {
            Verdict::Corrupt
        } else if self.generation.detects_duplicates() && packet.sequence() != Some(state.expected())
        {
            Verdict::Duplicate
        } else {
            Verdict::Fresh
        };

        let style = self.generation.reply_style();
        let from = state.phase;
        let (next, reply, action) = match verdict {
            Verdict::Fresh => {
                self.deliver(packet.payload());
                let reply = match style {
                    ReplyStyle::AckNak => Packet::control(format, ACK),
                    ReplyStyle::SequencedAck => Packet::with_sequence(ACK, state.expected()),
                };
                let next = ReceiverState {
                    phase: (state.phase + 1) % self.generation.receiver_phases(),
                    last_accepted: packet.sequence(),
                };
                (next, reply.clone(), ReceiverAction::Accepted { packet, reply })
            }
            Verdict::Duplicate => {
                self.stats.duplicates += 1;
                let reply = match style {
                    ReplyStyle::AckNak => Packet::control(format, ACK),
                    ReplyStyle::SequencedAck => Packet::with_sequence(ACK, state.previous()),
                };
                (state, reply.clone(), ReceiverAction::Duplicate { packet, reply })
            }
            Verdict::Corrupt => {
                self.stats.corrupt += 1;
                let reply = match style {
                    ReplyStyle::AckNak => Packet::control(format, NAK),
                    ReplyStyle::SequencedAck => Packet::with_sequence(ACK, state.previous()),
                };
                (state, reply.clone(), ReceiverAction::Corrupt { packet, reply })
            }
        };

        self.observer.on_event(&SessionEvent::Receiver {
            from,
            to: next.phase,
            action,
        });

        match self.backward.send(&reply) {
            Ok(()) => Ok(Transition::Next(next)),
            // The sender has already finished; nobody is waiting for this reply.
            Err(ChannelError::Closed(_)) => Ok(Transition::Finished),
            Err(source) => Err(SessionError::Channel {
                role: "receiver",
                source,
            }),
        }
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }

    pub fn delivered(&self) -> &[String] {
        &self.delivered
    }

    fn deliver(&mut self, payload: &str) {
        self.stats.delivered += 1;
        self.sink.push_inbound(payload);
        self.delivered.push(payload.to_string());
        self.observer.on_event(&SessionEvent::Delivered {
            payload: payload.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{FaultPlan, link};
    use crate::feed::CollectingSink;
    use rdt_lab_abstract::{Direction, NullObserver, SimConfig};

    struct Harness {
        receiver: ReceiverMachine,
        wire_in: LinkSender,
        wire_out: LinkReceiver,
        sink: CollectingSink,
    }

    fn harness(generation: Generation) -> Harness {
        let config = SimConfig {
            min_latency: 0,
            max_latency: 0,
            ..Default::default()
        };
        let observer: Arc<dyn SessionObserver> = Arc::new(NullObserver);
        let (forward_tx, forward_rx) =
            link(Direction::Forward, &config, FaultPlan::default(), observer.clone());
        let (backward_tx, backward_rx) =
            link(Direction::Backward, &config, FaultPlan::default(), observer.clone());
        let sink = CollectingSink::default();
        let receiver = ReceiverMachine::new(
            generation,
            forward_rx,
            backward_tx,
            Box::new(sink.clone()),
            observer,
        );
        Harness {
            receiver,
            wire_in: forward_tx,
            wire_out: backward_rx,
            sink,
        }
    }

    async fn step(h: &mut Harness, state: ReceiverState) -> (ReceiverState, Packet) {
        let next = match h.receiver.advance(state).await.unwrap() {
            Transition::Next(next) => next,
            Transition::Finished => panic!("receiver finished early"),
        };
        let format = h.receiver.generation.packet_format();
        let reply = Packet::deserialize(&h.wire_out.receive().await.unwrap(), format);
        (next, reply)
    }

    #[tokio::test(start_paused = true)]
    async fn rdt20_acks_valid_and_naks_corrupt() {
        let mut h = harness(Generation::Rdt20);
        h.wire_in.send(&Packet::new("hello")).unwrap();
        let (state, reply) = step(&mut h, ReceiverState::default()).await;
        assert!(reply.is_ack() && !reply.is_corrupt());
        assert_eq!(state.phase, 0);

        h.wire_in
            .send(&Packet::from_parts("hello", None, "0000"))
            .unwrap();
        let (_, reply) = step(&mut h, state).await;
        assert!(reply.is_nak());
        assert_eq!(h.sink.delivered(), vec!["hello"]);
    }

    #[tokio::test(start_paused = true)]
    async fn rdt20_delivers_retransmissions_again() {
        let mut h = harness(Generation::Rdt20);
        let packet = Packet::new("same");
        h.wire_in.send(&packet).unwrap();
        h.wire_in.send(&packet).unwrap();
        let (state, _) = step(&mut h, ReceiverState::default()).await;
        step(&mut h, state).await;
        assert_eq!(h.sink.delivered(), vec!["same", "same"]);
    }

    #[tokio::test(start_paused = true)]
    async fn rdt21_suppresses_duplicates() {
        let mut h = harness(Generation::Rdt21);
        let packet = Packet::with_sequence("once", '0');
        h.wire_in.send(&packet).unwrap();
        h.wire_in.send(&packet).unwrap();

        let (state, first) = step(&mut h, ReceiverState::default()).await;
        assert_eq!(state.phase, 1);
        assert_eq!(state.last_accepted, Some('0'));
        let (state, second) = step(&mut h, state).await;
        assert_eq!(state.phase, 1);

        assert!(first.is_ack() && second.is_ack());
        assert_eq!(second.sequence(), Some(' '));
        assert_eq!(h.sink.delivered(), vec!["once"]);
        assert_eq!(h.receiver.stats().duplicates, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rdt21_naks_corrupt_data() {
        let mut h = harness(Generation::Rdt21);
        h.wire_in
            .send(&Packet::from_parts("bad", Some('0'), "ffff"))
            .unwrap();
        let (state, reply) = step(&mut h, ReceiverState::default()).await;
        assert!(reply.is_nak());
        assert_eq!(state, ReceiverState::default());
        assert!(h.sink.delivered().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rdt22_acks_previous_sequence_on_trouble() {
        let mut h = harness(Generation::Rdt22);

        // Corrupt before anything was accepted: ACK/1.
        h.wire_in
            .send(&Packet::from_parts("bad", Some('0'), "ffff"))
            .unwrap();
        let (state, reply) = step(&mut h, ReceiverState::default()).await;
        assert!(reply.is_ack());
        assert_eq!(reply.sequence(), Some('1'));

        h.wire_in.send(&Packet::with_sequence("good", '0')).unwrap();
        let (state, reply) = step(&mut h, state).await;
        assert_eq!(reply.sequence(), Some('0'));
        assert_eq!(state.phase, 1);

        // Duplicate of '0': re-ACK '0', never NAK.
        h.wire_in.send(&Packet::with_sequence("good", '0')).unwrap();
        let (state, reply) = step(&mut h, state).await;
        assert!(reply.is_ack());
        assert_eq!(reply.sequence(), Some('0'));
        assert_eq!(state.phase, 1);
        assert_eq!(h.sink.delivered(), vec!["good"]);
    }

    #[tokio::test(start_paused = true)]
    async fn finishes_when_sender_hangs_up() {
        let mut h = harness(Generation::Rdt30);
        h.wire_in.send(&Packet::with_sequence("last", '0')).unwrap();
        drop(h.wire_in);

        let state = match h.receiver.advance(ReceiverState::default()).await.unwrap() {
            Transition::Next(state) => state,
            Transition::Finished => panic!("queued packet must still be delivered"),
        };
        assert_eq!(
            h.receiver.advance(state).await.unwrap(),
            Transition::Finished
        );
        assert_eq!(h.receiver.delivered(), ["last".to_string()]);
    }
}
