use rdt_lab_abstract::{Generation, SimConfig};
use serde::Serialize;

use crate::channel::LinkStats;
use crate::observer::LinkEventSummary;
use crate::receiver::ReceiverStats;
use crate::sender::SenderStats;

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub generation: Generation,
    pub config: SimConfig,
    pub duration_ms: u64,
    pub delivered_data: Vec<String>,
    pub sender: SenderStats,
    pub receiver: ReceiverStats,
    pub forward: LinkStats,
    pub backward: LinkStats,
    pub link_events: Vec<LinkEventSummary>,
}

impl SimulationReport {
    /// Every data transmission made by the sender, retransmissions included.
    pub fn sender_packet_count(&self) -> u32 {
        self.sender.packets_sent
    }
}
