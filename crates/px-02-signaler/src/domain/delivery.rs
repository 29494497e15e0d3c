/// Outcome of one signal call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Sinks that accepted the message.
    pub delivered: usize,
    /// Members skipped because they were in `exceptions`.
    pub excepted: usize,
    /// Members skipped because their listener is paused.
    pub paused: usize,
    /// Members with no registered listener.
    pub offline: usize,
    /// Sinks that returned an error or panicked.
    pub failed: usize,
    /// Remote origins the signal was relayed to.
    pub relayed: Vec<String>,
}
