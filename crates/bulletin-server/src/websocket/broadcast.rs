//! Bulletin sequencing and fan-out to open connections.

use std::sync::Arc;

use bulletin_core::{SlowConsumerDrop, ValidatedBulletin};
use metrics::counter;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::connection::EnqueueOutcome;
use super::registry::ConnectionRegistry;
use crate::metrics::{BULLETINS_ACCEPTED_TOTAL, WS_BROADCAST_DROPS_TOTAL};

/// What happened to one accepted bulletin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptReceipt {
    /// Sequence assigned to the bulletin.
    pub sequence: u64,
    /// Open connections the bulletin was queued on.
    pub recipients: usize,
    /// Connections that lost an older bulletin to make room.
    pub drops: Vec<SlowConsumerDrop>,
}

/// Assigns sequence numbers and enqueues bulletins on every open connection.
pub struct BroadcastEngine {
    registry: Arc<ConnectionRegistry>,
    /// Last assigned sequence. Held for the whole accept so that sequence
    /// order, snapshot order and enqueue order agree.
    last_sequence: Mutex<u64>,
}

impl BroadcastEngine {
    /// Create an engine broadcasting to the given registry.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            last_sequence: Mutex::new(0),
        }
    }

    /// Sequence and broadcast a validated bulletin.
    ///
    /// Never waits on any connection: a full queue gives up its oldest entry.
    pub fn accept(&self, bulletin: ValidatedBulletin) -> AcceptReceipt {
        let (bulletin, recipients, drops, version) = {
            // Held across the fan-out: O(open connections), each enqueue O(1),
            // no await and no transport I/O under the lock.
            let mut last = self.last_sequence.lock();
            *last += 1;
            let bulletin = Arc::new(bulletin.sequenced(*last));
            let snapshot = self.registry.snapshot();

            let mut recipients = 0;
            let mut drops = Vec::new();
            for connection in snapshot.open_connections() {
                match connection.enqueue(Arc::clone(&bulletin)) {
                    EnqueueOutcome::Delivered => recipients += 1,
                    EnqueueOutcome::DeliveredWithEviction(evicted) => {
                        recipients += 1;
                        drops.push(SlowConsumerDrop {
                            connection_id: connection.id.clone(),
                            evicted_sequence: evicted.sequence,
                        });
                    }
                    EnqueueOutcome::Skipped => {}
                }
            }
            (bulletin, recipients, drops, snapshot.version())
        };

        counter!(BULLETINS_ACCEPTED_TOTAL).increment(1);
        for slow in &drops {
            counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
            warn!(
                connection_id = %slow.connection_id,
                evicted_sequence = slow.evicted_sequence,
                sequence = bulletin.sequence,
                "slow consumer: evicted oldest queued bulletin"
            );
        }
        debug!(
            sequence = bulletin.sequence,
            sender = %bulletin.sender,
            recipients,
            registry_version = version,
            "bulletin accepted"
        );

        AcceptReceipt {
            sequence: bulletin.sequence,
            recipients,
            drops,
        }
    }

    /// Most recently assigned sequence, `0` before the first accept.
    pub fn last_sequence(&self) -> u64 {
        *self.last_sequence.lock()
    }

    /// The registry this engine broadcasts to.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }
}

/// Take every bulletin currently queued on a connection, in order.
#[cfg(test)]
pub(crate) fn drain_queued(
    connection: &super::connection::Connection,
) -> Vec<Arc<bulletin_core::Bulletin>> {
    std::iter::from_fn(|| connection.queue().try_pop()).collect()
}
