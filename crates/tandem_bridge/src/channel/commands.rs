//! Consumer-side command sender with the pre-`READY` backlog.
//!
//! `INIT` must reach the simulator first. Anything else issued before the
//! simulator answers `READY` is held back and flushed in order afterwards,
//! never dropped.

use crossbeam_channel::Sender;
use tandem_shared::Command;

use crate::error::{ChannelError, ChannelResult};

/// Sends commands to the simulator in FIFO order.
pub struct CommandSender {
    tx: Sender<Command>,
    /// Commands issued before `READY`, in issue order.
    backlog: Vec<Command>,
    ready: bool,
}

impl CommandSender {
    /// Wraps the raw sender. Starts in the not-ready state.
    #[must_use]
    pub fn new(tx: Sender<Command>) -> Self {
        Self {
            tx,
            backlog: Vec::new(),
            ready: false,
        }
    }

    /// Returns true once `READY` has been observed.
    #[inline]
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.ready
    }

    /// Commands waiting for `READY`.
    #[inline]
    #[must_use]
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Queues one command.
    ///
    /// # Errors
    ///
    /// [`ChannelError::Disconnected`] if the simulator is gone. A command
    /// held in the backlog cannot fail until it is flushed.
    pub fn send(&mut self, command: Command) -> ChannelResult<()> {
        if !self.ready && command.requires_ready() {
            tracing::debug!(kind = command.kind(), "holding command until READY");
            self.backlog.push(command);
            return Ok(());
        }
        self.tx.send(command).map_err(|_| ChannelError::Disconnected)
    }

    /// Marks the simulator ready and flushes the backlog in order.
    ///
    /// A second call is a no-op.
    ///
    /// # Errors
    ///
    /// [`ChannelError::Disconnected`] if the simulator went away mid-flush;
    /// unsent commands stay in the backlog.
    pub fn mark_ready(&mut self) -> ChannelResult<()> {
        if self.ready {
            return Ok(());
        }
        self.ready = true;

        let backlog = std::mem::take(&mut self.backlog);
        if !backlog.is_empty() {
            tracing::debug!(count = backlog.len(), "flushing commands held before READY");
        }
        let mut pending = backlog.into_iter();
        while let Some(command) = pending.next() {
            if let Err(err) = self.tx.send(command) {
                self.backlog = std::iter::once(err.into_inner()).chain(pending).collect();
                return Err(ChannelError::Disconnected);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use tandem_shared::{EntityId, HandoffDescriptor, HandoffMode, WorldConfig};

    fn remove(id: &str) -> Command {
        Command::RemoveRigidBody { id: EntityId::new(id) }
    }

    fn init() -> Command {
        Command::Init {
            world: WorldConfig::default(),
            handoff: HandoffDescriptor {
                mode: HandoffMode::SharedMemory,
                max_bodies: 4,
                debug_vertex_capacity: 0,
                protocol_version: 1,
            },
        }
    }

    #[test]
    fn test_structural_commands_wait_for_ready() {
        let (tx, rx) = unbounded();
        let mut sender = CommandSender::new(tx);

        sender.send(remove("a")).unwrap();
        sender.send(init()).unwrap();
        sender.send(remove("b")).unwrap();

        // Only INIT went out
        assert!(matches!(rx.try_recv(), Ok(Command::Init { .. })));
        assert!(rx.try_recv().is_err());
        assert_eq!(sender.backlog_len(), 2);

        sender.mark_ready().unwrap();
        assert_eq!(rx.try_recv().unwrap(), remove("a"));
        assert_eq!(rx.try_recv().unwrap(), remove("b"));

        // After READY commands go straight out
        sender.send(remove("c")).unwrap();
        assert_eq!(rx.try_recv().unwrap(), remove("c"));
        assert_eq!(sender.backlog_len(), 0);
    }

    #[test]
    fn test_disconnected_peer_keeps_backlog() {
        let (tx, rx) = unbounded();
        let mut sender = CommandSender::new(tx);
        sender.send(remove("a")).unwrap();
        sender.send(remove("b")).unwrap();
        drop(rx);

        assert_eq!(sender.mark_ready(), Err(ChannelError::Disconnected));
        assert_eq!(sender.backlog_len(), 2);
        assert_eq!(sender.send(remove("c")), Err(ChannelError::Disconnected));
    }
}
