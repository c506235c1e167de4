use crate::config::SimConfig;
use crate::generation::Generation;
use crate::interface::Direction;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub generation: Generation,
    #[serde(default)]
    pub config: SimConfigOverride,
    pub actions: Vec<TestAction>,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SimConfigOverride {
    pub loss_rate: Option<f64>,
    pub corrupt_rate: Option<f64>,
    pub min_latency: Option<u64>,
    pub max_latency: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub seed: Option<u64>,
    pub max_duration_ms: Option<u64>,
}

impl SimConfigOverride {
    pub fn apply_to(&self, config: &mut SimConfig) {
        if let Some(v) = self.loss_rate {
            config.loss_rate = v;
        }
        if let Some(v) = self.corrupt_rate {
            config.corrupt_rate = v;
        }
        if let Some(v) = self.min_latency {
            config.min_latency = v;
        }
        if let Some(v) = self.max_latency {
            config.max_latency = v;
        }
        if let Some(v) = self.timeout_ms {
            config.timeout_ms = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(v) = self.max_duration_ms {
            config.max_duration_ms = v;
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAction {
    /// Queue an application message; messages are sent in file order.
    AppSend { data: String },
    /// Drop the n-th transmission (1-based) from the sender.
    DropForward { nth: u64 },
    /// Drop the n-th transmission (1-based) from the receiver.
    DropBackward { nth: u64 },
    /// Corrupt the n-th transmission (1-based) from the sender.
    CorruptForward { nth: u64 },
    /// Corrupt the n-th transmission (1-based) from the receiver.
    CorruptBackward { nth: u64 },
}

impl TestAction {
    /// Direction affected by a scripted fault, if this is one.
    pub fn fault_direction(&self) -> Option<Direction> {
        match self {
            TestAction::AppSend { .. } => None,
            TestAction::DropForward { .. } | TestAction::CorruptForward { .. } => {
                Some(Direction::Forward)
            }
            TestAction::DropBackward { .. } | TestAction::CorruptBackward { .. } => {
                Some(Direction::Backward)
            }
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAssertion {
    /// Assert that specific data was delivered to the application layer
    DataDelivered { data: String },
    /// Assert the exact delivery sequence, duplicates included
    DeliveredExactly { data: Vec<String> },
    /// Assert that the number of deliveries is within range
    DeliveryCount { min: u32, max: Option<u32> },
    /// Assert that the total number of packets sent by Sender is within range
    SenderPacketCount { min: u32, max: Option<u32> },
    /// Assert that the number of sender timeouts is within range
    TimeoutCount { min: u32, max: Option<u32> },
    /// Assert that simulation finishes within time
    MaxDuration { ms: u64 },
}

impl TestScenario {
    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().filter_map(|action| match action {
            TestAction::AppSend { data } => Some(data.as_str()),
            _ => None,
        })
    }
}
