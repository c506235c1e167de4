use crate::channel::{FaultPlan, link};
use crate::error::SessionError;
use crate::observer::{EventRecorder, Fanout, TracingObserver};
use crate::receiver::{ReceiverMachine, ReceiverSummary};
use crate::sender::{SenderMachine, SenderSummary};
use crate::timer::TimedReceiver;
use crate::trace::SimulationReport;
use rdt_lab_abstract::{
    AppFeed, AppSink, ConfigError, Direction, Generation, SessionObserver, SimConfig,
};
use std::sync::Arc;
use tokio::task::JoinError;
use tokio::time::{Duration, Instant};
use tracing::info;

/// One sender/receiver pair of a single generation, wired through two
/// simulated links.
pub struct Simulator {
    generation: Generation,
    config: SimConfig,
    feed: Box<dyn AppFeed>,
    sink: Box<dyn AppSink>,
    forward_faults: FaultPlan,
    backward_faults: FaultPlan,
    observers: Fanout,
}

impl Simulator {
    pub fn new(
        generation: Generation,
        config: SimConfig,
        feed: Box<dyn AppFeed>,
        sink: Box<dyn AppSink>,
    ) -> Self {
        Self {
            generation,
            config,
            feed,
            sink,
            forward_faults: FaultPlan::default(),
            backward_faults: FaultPlan::default(),
            observers: Fanout::default(),
        }
    }

    /// Register a deterministic fault: drop the `nth` (1-based) data transmission.
    pub fn add_drop_forward_once(&mut self, nth: u64) {
        self.forward_faults.drop_nth(nth);
    }

    /// Register a deterministic fault: drop the `nth` (1-based) reply.
    pub fn add_drop_backward_once(&mut self, nth: u64) {
        self.backward_faults.drop_nth(nth);
    }

    pub fn add_corrupt_forward_once(&mut self, nth: u64) {
        self.forward_faults.corrupt_nth(nth);
    }

    pub fn add_corrupt_backward_once(&mut self, nth: u64) {
        self.backward_faults.corrupt_nth(nth);
    }

    /// Attach an extra observer. Events still go to the log and the report.
    pub fn add_observer(&mut self, observer: Arc<dyn SessionObserver>) {
        self.observers.push(observer);
    }

    /// Validate the configuration, run both automata until the feed is
    /// exhausted and acknowledged, and collect the report.
    ///
    /// `max_duration_ms` bounds the time the sender spends awaiting
    /// acknowledgements. Waiting on the feed is not counted.
    ///
    /// Must be called inside a tokio runtime.
    pub async fn run_until_complete(self) -> Result<SimulationReport, SessionError> {
        let Simulator {
            generation,
            config,
            feed,
            sink,
            forward_faults,
            backward_faults,
            observers: extra,
        } = self;

        config.validate(generation)?;
        if !generation.retransmits_on_timeout()
            && (forward_faults.has_drops() || backward_faults.has_drops())
        {
            return Err(ConfigError::ScriptedLossWithoutTimeout { generation }.into());
        }

        let recorder = Arc::new(EventRecorder::new());
        let mut fanout = Fanout::default();
        fanout.push(Arc::new(TracingObserver));
        fanout.push(recorder.clone());
        fanout.push(Arc::new(extra));
        let observer: Arc<dyn SessionObserver> = Arc::new(fanout);

        let (forward_tx, forward_rx) =
            link(Direction::Forward, &config, forward_faults, observer.clone());
        let (backward_tx, backward_rx) =
            link(Direction::Backward, &config, backward_faults, observer.clone());

        let sender = SenderMachine::new(
            generation,
            forward_tx,
            TimedReceiver::new(backward_rx),
            feed,
            observer.clone(),
            Duration::from_millis(config.timeout_ms),
            Duration::from_millis(config.max_duration_ms),
        );
        let receiver = ReceiverMachine::new(generation, forward_rx, backward_tx, sink, observer);

        info!(
            "Starting {} session (loss={}, corrupt={}, latency={}..={}ms, seed={})",
            generation,
            config.loss_rate,
            config.corrupt_rate,
            config.min_latency,
            config.max_latency,
            config.seed
        );
        let start = Instant::now();
        let sender_task = tokio::spawn(sender.run());
        let receiver_task = tokio::spawn(receiver.run());
        let (sender_joined, receiver_joined) = tokio::join!(sender_task, receiver_task);

        // A receiver failure closes the links under the sender, so it is the
        // root cause whenever both fail.
        let receiver: ReceiverSummary = receiver_joined.map_err(|e| task_error("receiver", e))??;
        let sender: SenderSummary = sender_joined.map_err(|e| task_error("sender", e))??;
        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "{} session complete in {} ms: {} delivered",
            generation,
            duration_ms,
            receiver.delivered.len()
        );

        Ok(SimulationReport {
            generation,
            config,
            duration_ms,
            delivered_data: receiver.delivered,
            sender: sender.stats,
            receiver: receiver.stats,
            forward: sender.link,
            backward: receiver.link,
            link_events: recorder.snapshot(),
        })
    }
}

fn task_error(role: &'static str, err: JoinError) -> SessionError {
    SessionError::Task {
        role,
        message: err.to_string(),
    }
}
