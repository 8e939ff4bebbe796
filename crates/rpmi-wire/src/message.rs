//! Reusable message buffer.
//!
//! A [`Message`] is one slot's worth of scratch: the decoded header plus a
//! payload buffer sized to the slot payload capacity. The dispatcher owns
//! two of these (request and ack) and reuses them for every exchange;
//! messages have no lifetime beyond a single dispatch.

use core::fmt;

use crate::{MESSAGE_HEADER_SIZE, MessageHeader};

/// Payload does not fit the slot payload capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadTooLarge {
    pub len: usize,
    pub max: usize,
}

impl fmt::Display for PayloadTooLarge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "payload too large for slot: {} bytes, max {}",
            self.len, self.max
        )
    }
}

impl std::error::Error for PayloadTooLarge {}

/// One slot's worth of message scratch.
#[derive(Debug)]
pub struct Message {
    pub header: MessageHeader,
    payload: Box<[u8]>,
}

impl Message {
    /// Allocate a message buffer for the given slot size.
    ///
    /// The payload capacity is `slot_size - MESSAGE_HEADER_SIZE`.
    pub fn for_slot(slot_size: usize) -> Self {
        debug_assert!(slot_size >= MESSAGE_HEADER_SIZE);
        Self {
            header: MessageHeader::default(),
            payload: vec![0u8; slot_size - MESSAGE_HEADER_SIZE].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn payload_capacity(&self) -> usize {
        self.payload.len()
    }

    /// The valid payload bytes, per the header's `datalen`.
    pub fn data(&self) -> &[u8] {
        let len = (self.header.datalen as usize).min(self.payload.len());
        &self.payload[..len]
    }

    /// The full payload buffer, including bytes past `datalen`.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[inline]
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.payload
    }

    /// Set the header's `datalen`, bounds-checked against the capacity.
    pub fn set_datalen(&mut self, len: usize) -> Result<(), PayloadTooLarge> {
        if len > self.payload.len() {
            return Err(PayloadTooLarge {
                len,
                max: self.payload.len(),
            });
        }
        self.header.datalen = len as u16;
        Ok(())
    }

    /// Copy `src` into the payload and set `datalen` accordingly.
    pub fn write_data(&mut self, src: &[u8]) -> Result<(), PayloadTooLarge> {
        if src.len() > self.payload.len() {
            return Err(PayloadTooLarge {
                len: src.len(),
                max: self.payload.len(),
            });
        }
        self.payload[..src.len()].copy_from_slice(src);
        self.header.datalen = src.len() as u16;
        Ok(())
    }

    /// Clear the header for reuse. Payload bytes are left as-is; `datalen`
    /// zero makes them unreachable.
    pub fn reset(&mut self) {
        self.header = MessageHeader::default();
    }
}
