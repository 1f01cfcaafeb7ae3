use std::time::Duration;

/// Cluster calls a fault can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    AllocateTimestamp,
    Get,
    BatchGet,
    Scan,
    Prewrite,
    CommitPrimary,
    CommitSecondary,
    AcquirePessimisticLock,
    Rollback,
    Gc,
}

/// A one-shot failure consumed by the next matching call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The call fails without reaching the store.
    Unavailable,
    /// The call is slowed down. Delays beyond the configured request timeout fail the call
    /// as unavailable, after waiting for the timeout.
    Delay(Duration),
}

#[derive(Debug, Default)]
pub(crate) struct FaultQueue {
    pending: Vec<(Operation, Fault)>,
}

impl FaultQueue {
    pub(crate) fn push(&mut self, op: Operation, fault: Fault) {
        self.pending.push((op, fault));
    }

    pub(crate) fn take(&mut self, op: Operation) -> Option<Fault> {
        let idx = self.pending.iter().position(|(o, _)| *o == op)?;
        Some(self.pending.remove(idx).1)
    }

    pub(crate) fn clear(&mut self) {
        self.pending.clear();
    }
}
