//! Slot-ring transport.
//!
//! Four logical FIFO queues over one shared region. Each queue keeps its
//! head and tail indices in its first two slots (always little-endian) and
//! carries one message per remaining slot. The multi-byte message-header
//! fields are normalized to the transport byte order on enqueue and back to
//! native order on dequeue; queue indices are wrapped modulo the data-slot
//! count.
//!
//! Every operation is serialized by the transport lock. The lock is a leaf:
//! it is never held across anything but the region accesses themselves.

use core::fmt;

use parking_lot::Mutex;

use rpmi_wire::{
    ByteOrder, MESSAGE_HEADER_SIZE, Message, MessageHeader, PayloadTooLarge, QueueType, Status,
};

use crate::{LayoutError, OutOfRange, QUEUE_HEADER_SLOTS, SharedMemory, ShmemTransportConfig};

/// Errors from queue operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Enqueue target has no free slot. Transient.
    QueueFull(QueueType),
    /// Dequeue source has no message. Transient.
    QueueEmpty(QueueType),
    /// Operation addressed a P2A-channel queue on a transport configured
    /// without one.
    ChannelUnavailable(QueueType),
    /// Message does not fit the slot payload.
    Payload(PayloadTooLarge),
    /// A stored queue index is outside `[0, data_slots)`; the peer (or the
    /// region) is corrupt.
    CorruptIndex {
        queue: QueueType,
        index: u32,
        capacity: u32,
    },
    /// The region rejected an access.
    Region(OutOfRange),
}

impl TransportError {
    /// True for conditions that clear on their own (full/empty rings).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::QueueFull(_) | Self::QueueEmpty(_))
    }

    /// Wire status this error maps to.
    pub fn status(&self) -> Status {
        match self {
            Self::QueueFull(_) | Self::QueueEmpty(_) => Status::Busy,
            Self::ChannelUnavailable(_) => Status::InvalidParam,
            Self::Payload(_) => Status::OutOfRange,
            Self::CorruptIndex { .. } => Status::CommsError,
            Self::Region(_) => Status::OutOfRange,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull(q) => write!(f, "{} queue is full", q),
            Self::QueueEmpty(q) => write!(f, "{} queue is empty", q),
            Self::ChannelUnavailable(q) => {
                write!(f, "{} requires the P2A channel, which is not configured", q)
            }
            Self::Payload(e) => write!(f, "{}", e),
            Self::CorruptIndex {
                queue,
                index,
                capacity,
            } => {
                write!(
                    f,
                    "{} queue index {} outside capacity {}",
                    queue, index, capacity
                )
            }
            Self::Region(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<OutOfRange> for TransportError {
    fn from(e: OutOfRange) -> Self {
        TransportError::Region(e)
    }
}

impl From<PayloadTooLarge> for TransportError {
    fn from(e: PayloadTooLarge) -> Self {
        TransportError::Payload(e)
    }
}

/// Snapshot of one queue's indices, for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct QueueStatus {
    pub head: u32,
    pub tail: u32,
    pub capacity: u32,
    pub used: u32,
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "head={} tail={} used={}/{}",
            self.head, self.tail, self.used, self.capacity
        )
    }
}

/// The shared-memory transport.
pub struct ShmemTransport {
    config: ShmemTransportConfig,
    data_slots: u32,
    mem: Mutex<Box<dyn SharedMemory>>,
}

impl fmt::Debug for ShmemTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShmemTransport")
            .field("config", &self.config)
            .field("data_slots", &self.data_slots)
            .finish()
    }
}

impl ShmemTransport {
    /// Lay the queues out in `mem` and zero-fill the region.
    pub fn new(
        mem: Box<dyn SharedMemory>,
        config: ShmemTransportConfig,
    ) -> Result<Self, LayoutError> {
        config.validate()?;
        let required = config.total_size();
        let found = mem.size();
        if found < required {
            return Err(LayoutError::RegionTooSmall { required, found });
        }

        let mut mem = mem;
        mem.fill(0, 0, found)?;

        tracing::debug!(
            slot_size = config.slot_size,
            queue_size = config.queue_size,
            queues = config.queue_count(),
            data_slots = config.data_slots(),
            "shared-memory transport initialized"
        );

        Ok(Self {
            data_slots: config.data_slots() as u32,
            config,
            mem: Mutex::new(mem),
        })
    }

    #[inline]
    pub fn slot_size(&self) -> usize {
        self.config.slot_size
    }

    /// Payload capacity of one slot.
    #[inline]
    pub fn slot_payload_size(&self) -> usize {
        self.config.slot_size - MESSAGE_HEADER_SIZE
    }

    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.config.byte_order
    }

    #[inline]
    pub fn data_slots(&self) -> u32 {
        self.data_slots
    }

    #[inline]
    pub fn has_p2a_channel(&self) -> bool {
        self.config.with_p2a_channel
    }

    fn queue_base(&self, queue: QueueType) -> Result<usize, TransportError> {
        if queue.requires_p2a_channel() && !self.config.with_p2a_channel {
            return Err(TransportError::ChannelUnavailable(queue));
        }
        Ok(self.config.queue_base(queue))
    }

    // Queue indices are little-endian in the first two slots, independent
    // of the message byte order.
    fn read_index(
        &self,
        mem: &dyn SharedMemory,
        queue: QueueType,
        base: usize,
        slot: usize,
    ) -> Result<u32, TransportError> {
        let mut b = [0u8; 4];
        mem.read(base + slot * self.config.slot_size, &mut b)?;
        let index = u32::from_le_bytes(b);
        if index >= self.data_slots {
            return Err(TransportError::CorruptIndex {
                queue,
                index,
                capacity: self.data_slots,
            });
        }
        Ok(index)
    }

    fn write_index(
        &self,
        mem: &mut dyn SharedMemory,
        base: usize,
        slot: usize,
        value: u32,
    ) -> Result<(), TransportError> {
        mem.write(base + slot * self.config.slot_size, &value.to_le_bytes())?;
        Ok(())
    }

    fn indices(
        &self,
        mem: &dyn SharedMemory,
        queue: QueueType,
        base: usize,
    ) -> Result<(u32, u32), TransportError> {
        let head = self.read_index(mem, queue, base, 0)?;
        let tail = self.read_index(mem, queue, base, 1)?;
        Ok((head, tail))
    }

    /// True when the queue holds no messages.
    pub fn is_empty(&self, queue: QueueType) -> Result<bool, TransportError> {
        let base = self.queue_base(queue)?;
        let mem = self.mem.lock();
        let (head, tail) = self.indices(mem.as_ref(), queue, base)?;
        Ok(head == tail)
    }

    /// True when the queue cannot accept another message.
    pub fn is_full(&self, queue: QueueType) -> Result<bool, TransportError> {
        let base = self.queue_base(queue)?;
        let mem = self.mem.lock();
        let (head, tail) = self.indices(mem.as_ref(), queue, base)?;
        Ok((tail + 1) % self.data_slots == head)
    }

    /// Snapshot of a queue's indices.
    pub fn status(&self, queue: QueueType) -> Result<QueueStatus, TransportError> {
        let base = self.queue_base(queue)?;
        let mem = self.mem.lock();
        let (head, tail) = self.indices(mem.as_ref(), queue, base)?;
        let used = (tail + self.data_slots - head) % self.data_slots;
        Ok(QueueStatus {
            head,
            tail,
            capacity: self.data_slots,
            used,
        })
    }

    /// Write `msg` into the slot at `tail` and advance `tail`.
    ///
    /// Header fields cross to the transport byte order at this boundary;
    /// the caller's message is left untouched.
    pub fn enqueue(&self, queue: QueueType, msg: &Message) -> Result<(), TransportError> {
        let base = self.queue_base(queue)?;
        let datalen = msg.header.datalen as usize;
        if datalen > self.slot_payload_size() {
            return Err(TransportError::Payload(PayloadTooLarge {
                len: datalen,
                max: self.slot_payload_size(),
            }));
        }

        let mut mem = self.mem.lock();
        let (head, tail) = self.indices(mem.as_ref(), queue, base)?;
        if (tail + 1) % self.data_slots == head {
            return Err(TransportError::QueueFull(queue));
        }

        let slot = base + (QUEUE_HEADER_SLOTS + tail as usize) * self.config.slot_size;
        let wire = msg.header.to_bytes(self.config.byte_order);
        mem.write(slot, &wire)?;
        if datalen > 0 {
            mem.write(slot + MESSAGE_HEADER_SIZE, msg.data())?;
        }

        self.write_index(mem.as_mut(), base, 1, (tail + 1) % self.data_slots)?;
        Ok(())
    }

    /// Read the slot at `head` into `out` and advance `head`.
    ///
    /// Header fields are normalized back to native order.
    pub fn dequeue(&self, queue: QueueType, out: &mut Message) -> Result<(), TransportError> {
        let base = self.queue_base(queue)?;

        let mut mem = self.mem.lock();
        let (head, tail) = self.indices(mem.as_ref(), queue, base)?;
        if head == tail {
            return Err(TransportError::QueueEmpty(queue));
        }

        let slot = base + (QUEUE_HEADER_SLOTS + head as usize) * self.config.slot_size;
        let mut wire = [0u8; MESSAGE_HEADER_SIZE];
        mem.read(slot, &mut wire)?;
        let header = MessageHeader::from_bytes(wire, self.config.byte_order);

        let datalen = header.datalen as usize;
        if datalen > out.payload_capacity() {
            return Err(TransportError::Payload(PayloadTooLarge {
                len: datalen,
                max: out.payload_capacity(),
            }));
        }
        if datalen > 0 {
            mem.read(slot + MESSAGE_HEADER_SIZE, &mut out.payload_mut()[..datalen])?;
        }
        out.header = header;

        self.write_index(mem.as_mut(), base, 0, (head + 1) % self.data_slots)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HeapSharedMemory;
    use rpmi_wire::MessageType;
    use std::sync::Arc;

    fn config(byte_order: ByteOrder) -> ShmemTransportConfig {
        ShmemTransportConfig {
            slot_size: 64,
            queue_size: 16 * 64,
            byte_order,
            with_p2a_channel: false,
        }
    }

    fn transport(byte_order: ByteOrder) -> ShmemTransport {
        let cfg = config(byte_order);
        ShmemTransport::new(Box::new(HeapSharedMemory::new(cfg.total_size())), cfg).unwrap()
    }

    fn request(token: u16, payload: &[u8]) -> Message {
        let mut msg = Message::for_slot(64);
        msg.header = MessageHeader::new(MessageType::NormalRequest, 0x0001, 0x04, token);
        msg.write_data(payload).unwrap();
        msg
    }

    #[test]
    fn construction_rejects_small_region() {
        let cfg = config(ByteOrder::LittleEndian);
        let err = ShmemTransport::new(
            Box::new(HeapSharedMemory::new(cfg.total_size() - 1)),
            cfg,
        )
        .unwrap_err();
        assert_eq!(
            err,
            LayoutError::RegionTooSmall {
                required: 2048,
                found: 2047
            }
        );
    }

    #[test]
    fn fresh_queues_are_empty() {
        let t = transport(ByteOrder::LittleEndian);
        assert!(t.is_empty(QueueType::A2pRequest).unwrap());
        assert!(t.is_empty(QueueType::P2aAck).unwrap());
        assert!(!t.is_full(QueueType::A2pRequest).unwrap());
    }

    #[test]
    fn p2a_queues_unavailable_without_channel() {
        let t = transport(ByteOrder::LittleEndian);
        assert_eq!(
            t.is_empty(QueueType::P2aRequest),
            Err(TransportError::ChannelUnavailable(QueueType::P2aRequest))
        );
        let mut msg = Message::for_slot(64);
        assert_eq!(
            t.dequeue(QueueType::A2pAck, &mut msg),
            Err(TransportError::ChannelUnavailable(QueueType::A2pAck))
        );
    }

    #[test]
    fn p2a_queues_work_when_configured() {
        let cfg = ShmemTransportConfig {
            with_p2a_channel: true,
            ..config(ByteOrder::LittleEndian)
        };
        let t =
            ShmemTransport::new(Box::new(HeapSharedMemory::new(cfg.total_size())), cfg).unwrap();
        t.enqueue(QueueType::P2aRequest, &request(1, &[])).unwrap();
        let mut out = Message::for_slot(64);
        t.dequeue(QueueType::P2aRequest, &mut out).unwrap();
        assert_eq!(out.header.token, 1);
    }

    #[test]
    fn round_trip_preserves_bytes() {
        let t = transport(ByteOrder::LittleEndian);
        let msg = request(0xBEEF, &[0xDE, 0xAD, 0xC0, 0xDE]);
        t.enqueue(QueueType::A2pRequest, &msg).unwrap();

        let mut out = Message::for_slot(64);
        t.dequeue(QueueType::A2pRequest, &mut out).unwrap();
        assert_eq!(out.header, msg.header);
        assert_eq!(out.data(), msg.data());
    }

    #[test]
    fn round_trip_preserves_bytes_big_endian() {
        let t = transport(ByteOrder::BigEndian);
        let msg = request(0x1234, &[1, 2, 3, 4, 5]);
        t.enqueue(QueueType::A2pRequest, &msg).unwrap();

        let mut out = Message::for_slot(64);
        t.dequeue(QueueType::A2pRequest, &mut out).unwrap();
        assert_eq!(out.header, msg.header);
        assert_eq!(out.data(), msg.data());
    }

    #[test]
    fn fifo_order_and_capacity() {
        // data_slots = 16 - 2 = 14; one slot stays free to tell full from
        // empty, so 13 messages fit.
        let t = transport(ByteOrder::LittleEndian);
        assert_eq!(t.data_slots(), 14);

        for i in 0..20u16 {
            let msg = request(i, &[i as u8; 8]);
            let result = t.enqueue(QueueType::A2pRequest, &msg);
            if i < 13 {
                result.unwrap();
            } else {
                assert!(t.is_full(QueueType::A2pRequest).unwrap());
                assert_eq!(result, Err(TransportError::QueueFull(QueueType::A2pRequest)));
            }
        }

        let mut out = Message::for_slot(64);
        for i in 0..13u16 {
            t.dequeue(QueueType::A2pRequest, &mut out).unwrap();
            assert_eq!(out.header.token, i);
            assert_eq!(out.data(), &[i as u8; 8]);
        }
        assert_eq!(
            t.dequeue(QueueType::A2pRequest, &mut out),
            Err(TransportError::QueueEmpty(QueueType::A2pRequest))
        );
    }

    #[test]
    fn ring_wraps_past_capacity() {
        let t = transport(ByteOrder::LittleEndian);
        let mut out = Message::for_slot(64);
        // Three full laps around the 14-slot ring.
        for i in 0..42u16 {
            t.enqueue(QueueType::A2pRequest, &request(i, &[])).unwrap();
            t.dequeue(QueueType::A2pRequest, &mut out).unwrap();
            assert_eq!(out.header.token, i);
            let status = t.status(QueueType::A2pRequest).unwrap();
            assert!(status.head < 14 && status.tail < 14);
            assert_eq!(status.used, 0);
        }
    }

    /// Region wrapper that mirrors every write into a shadow buffer the
    /// test can inspect, since the transport owns the region outright.
    struct SpyMemory {
        inner: HeapSharedMemory,
        shadow: Arc<parking_lot::Mutex<Vec<u8>>>,
    }

    impl SharedMemory for SpyMemory {
        fn size(&self) -> usize {
            self.inner.size()
        }
        fn base(&self) -> usize {
            self.inner.base()
        }
        fn read(&self, offset: usize, dst: &mut [u8]) -> Result<(), OutOfRange> {
            self.inner.read(offset, dst)
        }
        fn write(&mut self, offset: usize, src: &[u8]) -> Result<(), OutOfRange> {
            self.inner.write(offset, src)?;
            self.shadow.lock()[offset..offset + src.len()].copy_from_slice(src);
            Ok(())
        }
        fn fill(&mut self, offset: usize, byte: u8, len: usize) -> Result<(), OutOfRange> {
            self.inner.fill(offset, byte, len)?;
            self.shadow.lock()[offset..offset + len].fill(byte);
            Ok(())
        }
    }

    fn spy_transport(byte_order: ByteOrder) -> (ShmemTransport, Arc<parking_lot::Mutex<Vec<u8>>>) {
        let cfg = config(byte_order);
        let shadow = Arc::new(parking_lot::Mutex::new(vec![0xFFu8; cfg.total_size()]));
        let mem = SpyMemory {
            inner: HeapSharedMemory::new(cfg.total_size()),
            shadow: shadow.clone(),
        };
        let t = ShmemTransport::new(Box::new(mem), cfg).unwrap();
        (t, shadow)
    }

    #[test]
    fn construction_zero_fills_the_region() {
        let (_t, shadow) = spy_transport(ByteOrder::LittleEndian);
        assert!(shadow.lock().iter().all(|&b| b == 0));
    }

    #[test]
    fn wire_layout_big_endian_header_little_endian_indices() {
        let (t, shadow) = spy_transport(ByteOrder::BigEndian);
        let mut msg = request(0x0102, &[0xAA, 0xBB]);
        msg.header.servicegroup_id = 0x0304;
        msg.header.datalen = 2;
        t.enqueue(QueueType::A2pRequest, &msg).unwrap();

        let shadow = shadow.lock();
        // First message slot of the A2P-REQ region.
        let slot = 2 * 64;
        assert_eq!(
            &shadow[slot..slot + 8],
            // flags, service, group BE, datalen BE, token BE
            &[0x00, 0x04, 0x03, 0x04, 0x00, 0x02, 0x01, 0x02]
        );
        assert_eq!(&shadow[slot + 8..slot + 10], &[0xAA, 0xBB]);
        // Tail advanced to 1, little-endian, in slot 1 of the region.
        assert_eq!(&shadow[64..68], &[1, 0, 0, 0]);
        // Head untouched at 0.
        assert_eq!(&shadow[0..4], &[0, 0, 0, 0]);
    }
}
