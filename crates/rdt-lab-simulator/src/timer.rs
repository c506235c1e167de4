use crate::channel::{ChannelError, LinkReceiver};
use tokio::time::{Duration, Instant, sleep_until};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Armed { deadline: Instant },
    Fired,
    Cancelled,
}

/// Reader half of a link with one cancellable countdown.
///
/// The timer is only ever observed inside [`TimedReceiver::receive`], and
/// arming, stopping and receiving all take `&mut self`, so a stop issued by
/// the owning automaton can never race a later expiry.
pub struct TimedReceiver {
    inner: LinkReceiver,
    timer: TimerState,
}

impl TimedReceiver {
    pub fn new(inner: LinkReceiver) -> Self {
        Self {
            inner,
            timer: TimerState::Idle,
        }
    }

    /// Arm the timer, replacing any countdown already running.
    pub fn start_timer(&mut self, duration: Duration) {
        self.timer = TimerState::Armed {
            deadline: Instant::now() + duration,
        };
    }

    /// Disarm the timer. A no-op unless it is armed.
    pub fn stop_timer(&mut self) {
        if let TimerState::Armed { .. } = self.timer {
            self.timer = TimerState::Cancelled;
        }
    }

    pub fn timer_state(&self) -> TimerState {
        self.timer
    }

    /// Receive the next packet, racing the timer when it is armed.
    ///
    /// Exactly one of data or [`ChannelError::TimedOut`] is returned; if both
    /// are ready, data wins. On timeout the racing packet stays queued.
    pub async fn receive(&mut self) -> Result<String, ChannelError> {
        let TimerState::Armed { deadline } = self.timer else {
            return self.inner.receive().await;
        };
        tokio::select! {
            biased;
            wire = self.inner.receive() => wire,
            () = sleep_until(deadline) => {
                self.timer = TimerState::Fired;
                Err(ChannelError::TimedOut)
            }
        }
    }
}
