use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The four stop-and-wait protocol generations.
///
/// Each generation is a descriptor: the sender and receiver automata ask it
/// which packet format to use, how replies are shaped, and whether a timer
/// drives retransmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Generation {
    /// Checksum plus ACK/NAK. No sequence numbers, assumes no loss.
    #[serde(rename = "2.0")]
    Rdt20,
    /// Adds the alternating bit so duplicates can be recognised.
    #[serde(rename = "2.1")]
    Rdt21,
    /// Drops NAK: every reply is an ACK carrying a sequence number.
    #[serde(rename = "2.2")]
    Rdt22,
    /// 2.2 plus a retransmission timer on the sender.
    #[serde(rename = "3.0")]
    Rdt30,
}

/// Layout of a serialized packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketFormat {
    /// checksum · payload
    Checksummed,
    /// checksum · sequence · payload
    Sequenced,
}

/// How a receiver shapes its replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyStyle {
    /// Positive "ACK" or negative "NAK"; neither carries a real sequence.
    AckNak,
    /// Always "ACK", carrying the sequence the receiver last accepted.
    SequencedAck,
}

impl Generation {
    pub const ALL: [Generation; 4] = [
        Generation::Rdt20,
        Generation::Rdt21,
        Generation::Rdt22,
        Generation::Rdt30,
    ];

    pub fn packet_format(self) -> PacketFormat {
        match self {
            Generation::Rdt20 => PacketFormat::Checksummed,
            _ => PacketFormat::Sequenced,
        }
    }

    pub fn reply_style(self) -> ReplyStyle {
        match self {
            Generation::Rdt20 | Generation::Rdt21 => ReplyStyle::AckNak,
            Generation::Rdt22 | Generation::Rdt30 => ReplyStyle::SequencedAck,
        }
    }

    /// Whether the receiver compares sequence numbers to suppress duplicates.
    pub fn detects_duplicates(self) -> bool {
        self.packet_format() == PacketFormat::Sequenced
    }

    /// Whether the sender arms a timer after each transmission.
    pub fn retransmits_on_timeout(self) -> bool {
        self == Generation::Rdt30
    }

    /// Number of sender phases: one send/wait pair per sequence value.
    pub fn sender_phases(self) -> u8 {
        if self.detects_duplicates() { 4 } else { 2 }
    }

    /// Number of receiver phases: one per expected sequence value.
    pub fn receiver_phases(self) -> u8 {
        if self.detects_duplicates() { 2 } else { 1 }
    }

    pub fn version(self) -> &'static str {
        match self {
            Generation::Rdt20 => "2.0",
            Generation::Rdt21 => "2.1",
            Generation::Rdt22 => "2.2",
            Generation::Rdt30 => "3.0",
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rdt{}", self.version())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown protocol generation '{0}' (expected 2.0, 2.1, 2.2 or 3.0)")]
pub struct UnknownGeneration(pub String);

impl FromStr for Generation {
    type Err = UnknownGeneration;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().to_ascii_lowercase();
        let version = trimmed.strip_prefix("rdt").unwrap_or(&trimmed);
        match version {
            "2.0" | "20" => Ok(Generation::Rdt20),
            "2.1" | "21" => Ok(Generation::Rdt21),
            "2.2" | "22" => Ok(Generation::Rdt22),
            "3.0" | "30" => Ok(Generation::Rdt30),
            _ => Err(UnknownGeneration(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_spellings() {
        assert_eq!("2.0".parse::<Generation>().unwrap(), Generation::Rdt20);
        assert_eq!("rdt21".parse::<Generation>().unwrap(), Generation::Rdt21);
        assert_eq!("RDT2.2".parse::<Generation>().unwrap(), Generation::Rdt22);
        assert_eq!(" 30 ".parse::<Generation>().unwrap(), Generation::Rdt30);
        assert!("1.0".parse::<Generation>().is_err());
    }

    #[test]
    fn descriptor_matches_lineage() {
        assert_eq!(Generation::Rdt20.packet_format(), PacketFormat::Checksummed);
        assert_eq!(Generation::Rdt20.sender_phases(), 2);
        assert!(!Generation::Rdt20.detects_duplicates());

        assert_eq!(Generation::Rdt21.reply_style(), ReplyStyle::AckNak);
        assert_eq!(Generation::Rdt22.reply_style(), ReplyStyle::SequencedAck);
        assert_eq!(Generation::Rdt30.sender_phases(), 4);

        let timed: Vec<_> = Generation::ALL
            .into_iter()
            .filter(|g| g.retransmits_on_timeout())
            .collect();
        assert_eq!(timed, vec![Generation::Rdt30]);
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for generation in Generation::ALL {
            let shown = generation.to_string();
            assert_eq!(shown.parse::<Generation>().unwrap(), generation);
        }
    }
}
