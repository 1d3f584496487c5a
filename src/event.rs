use std::sync::Arc;

use feedwarden_core_types::ItemId;
use feedwarden_policy_center::ConfigSnapshot;

use crate::connection::ConnectionEvent;
use crate::errors::OrchestratorError;
use crate::view::HostEvent;

/// Everything the orchestrator reacts to. Spawned tasks only ever post these;
/// all state changes happen while the loop handles one of them.
#[derive(Debug)]
pub enum Event {
    ViewMutated { added: usize, removed: usize },
    /// The mutation debounce window elapsed.
    DiscoveryDue { seq: u64 },
    LocationPoll,
    Connection { generation: u64, event: ConnectionEvent },
    DispatchFinished {
        item: ItemId,
        outcome: Result<(), OrchestratorError>,
    },
    Timer(TimerEvent),
    ConfigReplaced(Arc<ConfigSnapshot>),
    Host(HostEvent),
    Shutdown,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimerEvent {
    NavigationRescan { seq: u64 },
    Reconnect { seq: u64 },
    MenuOpened { seq: u64, item: ItemId },
    ResumeObservation { seq: u64 },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::ViewMutated { .. } => "view_mutated",
            Event::DiscoveryDue { .. } => "discovery_due",
            Event::LocationPoll => "location_poll",
            Event::Connection { .. } => "connection",
            Event::DispatchFinished { .. } => "dispatch_finished",
            Event::Timer(_) => "timer",
            Event::ConfigReplaced(_) => "config_replaced",
            Event::Host(_) => "host",
            Event::Shutdown => "shutdown",
        }
    }
}
