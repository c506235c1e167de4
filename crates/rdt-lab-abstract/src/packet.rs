use crate::checksum::{DIGEST_WIDTH, gen_check};
use crate::generation::PacketFormat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload of a positive acknowledgement.
pub const ACK: &str = "ACK";
/// Payload of a negative acknowledgement (2.0 and 2.1 only).
pub const NAK: &str = "NAK";
/// Sequence placeholder for control packets that carry no real sequence.
pub const NO_SEQUENCE: char = ' ';

/// A single transmission unit.
///
/// Wire layout is positional: checksum (4 chars), sequence (1 char, only in
/// [`PacketFormat::Sequenced`]), then the payload. Field boundaries are never
/// delimiter based, so damage to any byte shows up as a checksum mismatch
/// rather than a parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    payload: String,
    sequence: Option<char>,
    checksum: String,
}

impl Packet {
    /// Checksummed packet without a sequence field (2.0).
    pub fn new(payload: impl Into<String>) -> Self {
        let payload = payload.into();
        let checksum = gen_check(&payload);
        Self {
            payload,
            sequence: None,
            checksum,
        }
    }

    /// Sequenced packet; the checksum covers `sequence ++ payload`.
    pub fn with_sequence(payload: impl Into<String>, sequence: char) -> Self {
        let payload = payload.into();
        let checksum = gen_check(&covered(Some(sequence), &payload));
        Self {
            payload,
            sequence: Some(sequence),
            checksum,
        }
    }

    /// Build a packet in the given format. `sequence` is ignored for
    /// [`PacketFormat::Checksummed`].
    pub fn build(format: PacketFormat, payload: impl Into<String>, sequence: char) -> Self {
        match format {
            PacketFormat::Checksummed => Self::new(payload),
            PacketFormat::Sequenced => Self::with_sequence(payload, sequence),
        }
    }

    /// Control packet ("ACK"/"NAK") with the placeholder sequence.
    pub fn control(format: PacketFormat, payload: &str) -> Self {
        Self::build(format, payload, NO_SEQUENCE)
    }

    /// Assemble a packet from received fields, trusting `checksum` as given.
    pub fn from_parts(
        payload: impl Into<String>,
        sequence: Option<char>,
        checksum: impl Into<String>,
    ) -> Self {
        Self {
            payload: payload.into(),
            sequence,
            checksum: checksum.into(),
        }
    }

    pub fn serialize(&self) -> String {
        let mut wire = String::with_capacity(DIGEST_WIDTH + 1 + self.payload.len());
        wire.push_str(&self.checksum);
        if let Some(sequence) = self.sequence {
            wire.push(sequence);
        }
        wire.push_str(&self.payload);
        wire
    }

    /// Slice `raw` into its fields. Performs no validation: use
    /// [`Packet::is_corrupt`] to find out whether the result can be trusted.
    pub fn deserialize(raw: &str, format: PacketFormat) -> Self {
        let mut chars = raw.chars();
        let checksum: String = chars.by_ref().take(DIGEST_WIDTH).collect();
        let sequence = match format {
            PacketFormat::Checksummed => None,
            PacketFormat::Sequenced => Some(chars.next().unwrap_or(NO_SEQUENCE)),
        };
        Self {
            payload: chars.collect(),
            sequence,
            checksum,
        }
    }

    /// True iff the stored checksum does not match the content.
    pub fn is_corrupt(&self) -> bool {
        self.recomputed_checksum() != self.checksum
    }

    pub fn recomputed_checksum(&self) -> String {
        gen_check(&covered(self.sequence, &self.payload))
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn sequence(&self) -> Option<char> {
        self.sequence
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn format(&self) -> PacketFormat {
        match self.sequence {
            Some(_) => PacketFormat::Sequenced,
            None => PacketFormat::Checksummed,
        }
    }

    pub fn is_ack(&self) -> bool {
        self.payload == ACK
    }

    pub fn is_nak(&self) -> bool {
        self.payload == NAK
    }
}

fn covered(sequence: Option<char>, payload: &str) -> String {
    match sequence {
        Some(sequence) => {
            let mut s = String::with_capacity(payload.len() + 1);
            s.push(sequence);
            s.push_str(payload);
            s
        }
        None => payload.to_string(),
    }
}

/// Log form: `payload seq (stored/recomputed)`.
impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}/{})",
            self.payload,
            self.sequence.unwrap_or(NO_SEQUENCE),
            self.checksum,
            self.recomputed_checksum()
        )
    }
}
