/// Result of one automaton step, shared by the sender and the receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition<S> {
    Next(S),
    /// Nothing left to do: the feed is exhausted (sender) or the peer has
    /// hung up (receiver).
    Finished,
}
