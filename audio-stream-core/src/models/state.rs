/// Native stream state machine.
///
/// State transitions:
/// ```text
/// closed → opened → started ↔ stopped → closed
///             started → reconfiguring → started
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Closed,
    Opened,
    Started,
    Stopped,
    Reconfiguring,
}

impl StreamState {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started)
    }
}
