use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::bus::{SignalBus, Subscription};
use crate::collaborators::PushChannel;
use crate::events::PushEvent;

/// In-process push channel. Producers call [`PushBus::publish`]; the engine runtime
/// subscribes through [`PushChannel::on_push_event`].
#[derive(Clone, Default)]
pub struct PushBus {
    bus: SignalBus<PushEvent>,
}

impl PushBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, event: PushEvent) {
        tracing::trace!(kind = event.kind(), "push event published");
        self.bus.emit(&event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.bus.handler_count()
    }
}

impl PushChannel for PushBus {
    fn on_push_event(&self, handler: Box<dyn Fn(&PushEvent) + Send + Sync>) -> Subscription {
        self.bus.subscribe(handler)
    }
}

/// Publish every well-formed JSON line from `reader` until EOF.
/// Malformed lines are skipped. Returns the number of events published.
pub async fn read_push_lines<R>(reader: R, bus: &PushBus) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut published = 0;

    while let Some(line) = lines.next_line().await? {
        if let Some(event) = PushEvent::from_line(&line) {
            bus.publish(event);
            published += 1;
        }
    }

    Ok(published)
}
