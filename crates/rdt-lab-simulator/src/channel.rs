//! One-directional unreliable link.
//!
//! [`link`] returns a writer half and a reader half. The writer decides the
//! fate of every transmission (scripted fault, random loss, random munge)
//! and stamps surviving packets with a delivery time; the reader blocks until
//! the head of the queue is due. Each half has exactly one owner, so the
//! single-writer/single-reader discipline is enforced by the type system.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rdt_lab_abstract::{Direction, LinkFate, Packet, SessionEvent, SessionObserver, SimConfig};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, sleep_until};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The other half of the link is gone.
    #[error("{0} channel closed")]
    Closed(Direction),
    /// The timer fired before a packet was ready.
    #[error("timer expired before a packet arrived")]
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fault {
    Drop,
    Corrupt,
}

/// Deterministic faults keyed by transmission number (1-based).
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    faults: BTreeMap<u64, Fault>,
}

impl FaultPlan {
    pub fn drop_nth(&mut self, nth: u64) {
        self.faults.insert(nth, Fault::Drop);
    }

    pub fn corrupt_nth(&mut self, nth: u64) {
        self.faults.insert(nth, Fault::Corrupt);
    }

    pub fn has_drops(&self) -> bool {
        self.faults.values().any(|fault| *fault == Fault::Drop)
    }

    fn take(&mut self, nth: u64) -> Option<Fault> {
        self.faults.remove(&nth)
    }
}

/// Per-direction counters, reported at session end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub transmissions: u32,
    pub dropped: u32,
    pub corrupted: u32,
}

#[derive(Debug)]
struct Datagram {
    wire: String,
    ready_at: Instant,
}

/// Writer half of a link.
pub struct LinkSender {
    direction: Direction,
    tx: mpsc::UnboundedSender<Datagram>,
    rng: StdRng,
    loss_rate: f64,
    corrupt_rate: f64,
    min_latency: u64,
    max_latency: u64,
    faults: FaultPlan,
    last_ready_at: Option<Instant>,
    observer: Arc<dyn SessionObserver>,
    stats: LinkStats,
}

/// Reader half of a link.
pub struct LinkReceiver {
    direction: Direction,
    rx: mpsc::UnboundedReceiver<Datagram>,
    // Head of the queue while its latency elapses; kept here so that an
    // abandoned wait leaves it queued.
    pending: Option<Datagram>,
}

/// Create a link for `direction` using the rates and latency in `config`.
pub fn link(
    direction: Direction,
    config: &SimConfig,
    faults: FaultPlan,
    observer: Arc<dyn SessionObserver>,
) -> (LinkSender, LinkReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sender = LinkSender {
        direction,
        tx,
        rng: StdRng::seed_from_u64(seed_for(config.seed, direction)),
        loss_rate: config.loss_rate,
        corrupt_rate: config.corrupt_rate,
        min_latency: config.min_latency,
        max_latency: config.max_latency,
        faults,
        last_ready_at: None,
        observer,
        stats: LinkStats::default(),
    };
    let receiver = LinkReceiver {
        direction,
        rx,
        pending: None,
    };
    (sender, receiver)
}

fn seed_for(seed: u64, direction: Direction) -> u64 {
    match direction {
        Direction::Forward => seed,
        Direction::Backward => seed.rotate_left(32) ^ 0x9E37_79B9_7F4A_7C15,
    }
}

impl LinkSender {
    /// Put `packet` on the wire. Loss is decided first; a lost packet is
    /// never corrupted. Only a vanished reader is an error.
    pub fn send(&mut self, packet: &Packet) -> Result<(), ChannelError> {
        self.stats.transmissions += 1;
        let transmission = u64::from(self.stats.transmissions);
        let scripted = self.faults.take(transmission);

        let lost = self.rng.random::<f64>() < self.loss_rate;
        if scripted == Some(Fault::Drop) || (scripted.is_none() && lost) {
            self.stats.dropped += 1;
            self.emit(
                transmission,
                LinkFate::Dropped {
                    scripted: scripted.is_some(),
                },
            );
            return Ok(());
        }

        let mut wire = packet.serialize();
        let munged = self.rng.random::<f64>() < self.corrupt_rate;
        if scripted == Some(Fault::Corrupt) || (scripted.is_none() && munged) {
            let damaged = munge(&mut self.rng, &wire);
            debug!("Packet corrupted in channel: {:?} -> {:?}", wire, damaged);
            wire = damaged;
            self.stats.corrupted += 1;
            self.emit(
                transmission,
                LinkFate::Corrupted {
                    scripted: scripted.is_some(),
                    wire: wire.clone(),
                },
            );
        }

        let latency = self.rng.random_range(self.min_latency..=self.max_latency);
        let mut ready_at = Instant::now() + Duration::from_millis(latency);
        // A link never reorders.
        if let Some(previous) = self.last_ready_at
            && previous > ready_at
        {
            ready_at = previous;
        }
        self.last_ready_at = Some(ready_at);

        self.tx
            .send(Datagram { wire, ready_at })
            .map_err(|_| ChannelError::Closed(self.direction))?;
        self.emit(transmission, LinkFate::Queued { latency_ms: latency });
        Ok(())
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    fn emit(&self, transmission: u64, fate: LinkFate) {
        self.observer.on_event(&SessionEvent::Link {
            direction: self.direction,
            transmission,
            fate,
        });
    }
}

impl LinkReceiver {
    /// Wait for the next packet and return its raw wire form.
    ///
    /// Cancel safe: if the returned future is dropped, no packet is lost.
    pub async fn receive(&mut self) -> Result<String, ChannelError> {
        if self.pending.is_none() {
            let datagram = self
                .rx
                .recv()
                .await
                .ok_or(ChannelError::Closed(self.direction))?;
            self.pending = Some(datagram);
        }
        if let Some(ready_at) = self.pending.as_ref().map(|d| d.ready_at) {
            sleep_until(ready_at).await;
        }
        self.pending
            .take()
            .map(|datagram| datagram.wire)
            .ok_or(ChannelError::Closed(self.direction))
    }
}

/// Damage exactly one character: flip a low bit of an ASCII character, or
/// replace a non-ASCII one with `'?'`. The result always differs from the
/// input when the input is non-empty. A single-bit flip is always
/// visible to the Internet checksum, unlike a swap of two aligned 16-bit words.
fn munge(rng: &mut StdRng, wire: &str) -> String {
    let mut chars: Vec<char> = wire.chars().collect();
    if chars.is_empty() {
        return String::new();
    }
    let index = rng.random_range(0..chars.len());
    let bit = rng.random_range(0..7u32);
    chars[index] = match chars[index] {
        c if c.is_ascii() => char::from(c as u8 ^ (1u8 << bit)),
        _ => '?',
    };
    chars.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdt_lab_abstract::{NullObserver, PacketFormat};

    fn config(loss_rate: f64, corrupt_rate: f64) -> SimConfig {
        SimConfig {
            loss_rate,
            corrupt_rate,
            min_latency: 0,
            max_latency: 0,
            ..Default::default()
        }
    }

    fn pair(config: &SimConfig, faults: FaultPlan) -> (LinkSender, LinkReceiver) {
        link(Direction::Forward, config, faults, Arc::new(NullObserver))
    }

    #[tokio::test(start_paused = true)]
    async fn clean_link_delivers_exact_copies_in_order() {
        let (mut tx, mut rx) = pair(&config(0.0, 0.0), FaultPlan::default());
        let packets: Vec<_> = (0..5)
            .map(|i| Packet::with_sequence(format!("msg-{i}"), if i % 2 == 0 { '0' } else { '1' }))
            .collect();
        for packet in &packets {
            tx.send(packet).unwrap();
        }
        for packet in &packets {
            assert_eq!(rx.receive().await.unwrap(), packet.serialize());
        }
        assert_eq!(tx.stats().transmissions, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn scripted_drop_and_corrupt() {
        let mut faults = FaultPlan::default();
        faults.drop_nth(1);
        faults.corrupt_nth(2);
        let (mut tx, mut rx) = pair(&config(0.0, 0.0), faults);

        tx.send(&Packet::new("first")).unwrap();
        tx.send(&Packet::new("second")).unwrap();
        tx.send(&Packet::new("third")).unwrap();

        let damaged = Packet::deserialize(&rx.receive().await.unwrap(), PacketFormat::Checksummed);
        assert!(damaged.is_corrupt());
        let clean = Packet::deserialize(&rx.receive().await.unwrap(), PacketFormat::Checksummed);
        assert_eq!(clean.payload(), "third");
        assert!(!clean.is_corrupt());

        let stats = tx.stats();
        assert_eq!((stats.transmissions, stats.dropped, stats.corrupted), (3, 1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn certain_loss_drops_everything() {
        let (mut tx, mut rx) = pair(&config(1.0, 1.0), FaultPlan::default());
        for _ in 0..10 {
            tx.send(&Packet::new("gone")).unwrap();
        }
        assert_eq!(tx.stats().dropped, 10);
        assert_eq!(tx.stats().corrupted, 0);
        drop(tx);
        assert_eq!(
            rx.receive().await,
            Err(ChannelError::Closed(Direction::Forward))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn certain_corruption_is_always_detectable() {
        let (mut tx, mut rx) = pair(&config(0.0, 1.0), FaultPlan::default());
        for i in 0..50 {
            tx.send(&Packet::with_sequence(format!("payload {i}"), '0')).unwrap();
        }
        for _ in 0..50 {
            let raw = rx.receive().await.unwrap();
            assert!(Packet::deserialize(&raw, PacketFormat::Sequenced).is_corrupt());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn latency_holds_packets_without_reordering() {
        let config = SimConfig {
            min_latency: 10,
            max_latency: 100,
            seed: 9,
            ..Default::default()
        };
        let (mut tx, mut rx) = pair(&config, FaultPlan::default());
        let start = Instant::now();
        for i in 0..20 {
            tx.send(&Packet::new(format!("{i}"))).unwrap();
        }
        for i in 0..20 {
            let raw = rx.receive().await.unwrap();
            assert_eq!(Packet::deserialize(&raw, PacketFormat::Checksummed).payload(), i.to_string());
        }
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(10), "{elapsed:?}");
        assert!(elapsed <= Duration::from_millis(100), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn send_to_dropped_reader_fails() {
        let (mut tx, rx) = pair(&config(0.0, 0.0), FaultPlan::default());
        drop(rx);
        assert_eq!(
            tx.send(&Packet::new("late")),
            Err(ChannelError::Closed(Direction::Forward))
        );
    }

    #[test]
    fn munge_changes_exactly_one_character() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let damaged = munge(&mut rng, "abcd0payload");
            let differing = damaged
                .chars()
                .zip("abcd0payload".chars())
                .filter(|(a, b)| a != b)
                .count();
            assert_eq!(differing, 1);
            assert_ne!(
                rdt_lab_abstract::checksum::gen_check(&damaged),
                rdt_lab_abstract::checksum::gen_check("abcd0payload")
            );
        }
        assert_eq!(munge(&mut rng, "é"), "?");
        assert_eq!(munge(&mut rng, ""), "");
    }
}
