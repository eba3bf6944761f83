//! # Command/Request Channel
//!
//! ```text
//! CONSUMER                                   SIMULATOR
//! CommandSender ──── Command (FIFO) ────────▶ SimulatorLink.commands
//! ConsumerLink.events ◀──── Event (FIFO) ─── SimulatorLink.events
//! ```
//!
//! Both directions are FIFO on their own. Nothing orders a command relative
//! to the buffer snapshots; the simulator's slot table is authoritative.

pub mod commands;
pub mod requests;
pub mod wire;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tandem_shared::{Command, Event};

pub use commands::CommandSender;
pub use requests::{PendingRequests, RequestTicket};

/// Consumer end of the channel.
pub struct ConsumerLink {
    /// Outgoing commands, buffered until `READY`.
    pub commands: CommandSender,
    /// Incoming events.
    pub events: Receiver<Event>,
}

/// Simulator end of the channel.
pub struct SimulatorLink {
    /// Incoming commands.
    pub commands: Receiver<Command>,
    /// Outgoing events.
    pub events: Sender<Event>,
}

/// Creates both ends of one session's channel.
///
/// Commands are never dropped for lack of room, so both queues are
/// unbounded; the simulator drains commands every tick.
#[must_use]
pub fn link() -> (ConsumerLink, SimulatorLink) {
    let (command_tx, command_rx) = unbounded();
    let (event_tx, event_rx) = unbounded();
    (
        ConsumerLink {
            commands: CommandSender::new(command_tx),
            events: event_rx,
        },
        SimulatorLink {
            commands: command_rx,
            events: event_tx,
        },
    )
}
