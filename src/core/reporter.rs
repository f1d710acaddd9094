use super::events::Event;

/// Implemented by callers that want to observe lifecycle progress as it happens.
pub trait Reporter {
    fn report(&mut self, event: Event);
}

impl Reporter for () {
    fn report(&mut self, _event: Event) {}
}

impl Reporter for Vec<Event> {
    fn report(&mut self, event: Event) {
        self.push(event);
    }
}
