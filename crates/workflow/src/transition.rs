use hpcalloc_events::DomainEvent;

/// Result of a committed state transition: the updated record and the
/// events to hand to the notification dispatcher.
#[derive(Debug, Clone)]
pub struct Transition<T> {
    pub record: T,
    pub events: Vec<DomainEvent>,
}

impl<T> Transition<T> {
    pub fn new(record: T) -> Self {
        Self {
            record,
            events: Vec::new(),
        }
    }

    /// A transition that changed nothing, such as a repeated execution.
    pub fn unchanged(record: T) -> Self {
        Self::new(record)
    }

    pub fn with_event(mut self, event: DomainEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn into_parts(self) -> (T, Vec<DomainEvent>) {
        (self.record, self.events)
    }
}
