//! Queue layout inside the shared region.
//!
//! All configured queues are the same size and are packed in queue-type
//! order from the base of the region:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │ A2P-REQ region (queue_size bytes)                         │
//! │   slot 0 [0..4]: head index (little-endian)               │
//! │   slot 1 [0..4]: tail index (little-endian)               │
//! │   slots 2..N-1:  one message per slot                     │
//! ├───────────────────────────────────────────────────────────┤
//! │ P2A-ACK region (queue_size bytes)                         │
//! ├───────────────────────────────────────────────────────────┤
//! │ P2A-REQ region  (only with the P2A channel)               │
//! ├───────────────────────────────────────────────────────────┤
//! │ A2P-ACK region  (only with the P2A channel)               │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Message slot `i` of a queue lives at offset `(i + 2) * slot_size` within
//! the queue's region. Capacity is `queue_size / slot_size - 2`.

use core::fmt;

use rpmi_wire::{ByteOrder, QueueType};
use static_assertions::const_assert;

use crate::OutOfRange;

/// Smallest permitted slot size. Slots must also be a power of two.
pub const MIN_SLOT_SIZE: usize = 64;

/// Slots reserved at the front of each queue for the head/tail indices.
pub const QUEUE_HEADER_SLOTS: usize = 2;

/// Smallest permitted queue size, in slots (header slots included).
pub const MIN_QUEUE_SLOTS: usize = 16;

const_assert!(MIN_SLOT_SIZE.is_power_of_two());
const_assert!(MIN_QUEUE_SLOTS > QUEUE_HEADER_SLOTS);

/// Construction-time transport configuration.
#[derive(Clone, Copy, Debug)]
pub struct ShmemTransportConfig {
    /// Slot size in bytes; power of two, at least [`MIN_SLOT_SIZE`].
    pub slot_size: usize,
    /// Per-queue region size in bytes; a multiple of `slot_size`, at least
    /// [`MIN_QUEUE_SLOTS`] slots.
    pub queue_size: usize,
    /// Byte order of multi-byte header and payload fields on the wire.
    pub byte_order: ByteOrder,
    /// Configure the server-initiated channel (P2A-REQ + A2P-ACK).
    pub with_p2a_channel: bool,
}

impl ShmemTransportConfig {
    /// Number of queue regions this configuration lays out.
    pub fn queue_count(&self) -> usize {
        if self.with_p2a_channel { 4 } else { 2 }
    }

    /// Message capacity of each queue.
    pub fn data_slots(&self) -> usize {
        self.queue_size / self.slot_size - QUEUE_HEADER_SLOTS
    }

    /// Shared-memory footprint of all configured queues.
    pub fn total_size(&self) -> usize {
        self.queue_size * self.queue_count()
    }

    /// Byte offset of a queue's region from the shared-memory base.
    pub fn queue_base(&self, queue: QueueType) -> usize {
        queue.index() * self.queue_size
    }

    pub fn validate(&self) -> Result<(), LayoutError> {
        if !self.slot_size.is_power_of_two() || self.slot_size < MIN_SLOT_SIZE {
            return Err(LayoutError::BadSlotSize(self.slot_size));
        }
        if self.queue_size == 0 || !self.queue_size.is_multiple_of(self.slot_size) {
            return Err(LayoutError::QueueSizeMisaligned {
                queue_size: self.queue_size,
                slot_size: self.slot_size,
            });
        }
        if self.queue_size < MIN_QUEUE_SLOTS * self.slot_size {
            return Err(LayoutError::QueueTooSmall {
                slots: self.queue_size / self.slot_size,
                min: MIN_QUEUE_SLOTS,
            });
        }
        Ok(())
    }
}

/// Errors from layout validation and transport construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    /// Slot size not a power of two or below the minimum.
    BadSlotSize(usize),
    /// Queue size not a multiple of the slot size.
    QueueSizeMisaligned { queue_size: usize, slot_size: usize },
    /// Queue holds fewer than the minimum number of slots.
    QueueTooSmall { slots: usize, min: usize },
    /// Shared region smaller than the configured queues.
    RegionTooSmall { required: usize, found: usize },
    /// The region rejected an access during initialization.
    Region(OutOfRange),
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadSlotSize(size) => {
                write!(
                    f,
                    "slot size {} invalid: must be a power of two >= {}",
                    size, MIN_SLOT_SIZE
                )
            }
            Self::QueueSizeMisaligned {
                queue_size,
                slot_size,
            } => {
                write!(
                    f,
                    "queue size {} is not a multiple of slot size {}",
                    queue_size, slot_size
                )
            }
            Self::QueueTooSmall { slots, min } => {
                write!(f, "queue holds {} slots, minimum is {}", slots, min)
            }
            Self::RegionTooSmall { required, found } => {
                write!(
                    f,
                    "shared region too small: need {} bytes, got {}",
                    required, found
                )
            }
            Self::Region(e) => write!(f, "region access failed: {}", e),
        }
    }
}

impl std::error::Error for LayoutError {}

impl From<OutOfRange> for LayoutError {
    fn from(e: OutOfRange) -> Self {
        LayoutError::Region(e)
    }
}
