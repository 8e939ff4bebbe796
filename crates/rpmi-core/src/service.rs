//! Service and service-group model.
//!
//! A service is a value: an id, a minimum request length and a name for
//! diagnostics. A service group is anything implementing [`ServiceGroup`] —
//! metadata plus a `handle` entry point and an optional event processor.
//! Handlers read requests through [`Request`] and build ack payloads
//! through [`AckWriter`]; both serialize multi-byte fields in the
//! transport's byte order.
//!
//! Handler errors are values too: returning `Err(status)` makes the
//! dispatcher replace whatever was written with a single status word, so
//! the wire contract ("always ack a normal request, status first") holds
//! no matter how the handler bails out.

use rpmi_wire::{ByteOrder, MessageHeader, Status};

use crate::{DispatchEnv, PrivilegeMask};

/// Static description of a service group.
#[derive(Clone, Copy, Debug)]
pub struct GroupInfo {
    pub name: &'static str,
    /// Wire id the group answers to.
    pub id: u16,
    /// Packed major.minor version reported by probes.
    pub version: u32,
    /// Privilege levels the group may be registered under.
    pub privilege: PrivilegeMask,
}

/// Static description of one service inside a group.
#[derive(Clone, Copy, Debug)]
pub struct ServiceDesc {
    pub id: u8,
    pub name: &'static str,
    /// Requests shorter than this get a not-supported ack without reaching
    /// the handler.
    pub min_request_len: u16,
}

/// A decoded request, scoped to one dispatch.
pub struct Request<'a> {
    header: MessageHeader,
    data: &'a [u8],
    order: ByteOrder,
}

impl<'a> Request<'a> {
    pub fn new(header: MessageHeader, data: &'a [u8], order: ByteOrder) -> Self {
        Self { header, data, order }
    }

    #[inline]
    pub fn header(&self) -> &MessageHeader {
        &self.header
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        self.data
    }

    /// Payload word at 32-bit index `word`, or `None` past `datalen`.
    pub fn u32_at(&self, word: usize) -> Option<u32> {
        let offset = word.checked_mul(4)?;
        let bytes = self.data.get(offset..offset + 4)?;
        Some(self.order.u32_from([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

/// Incremental ack-payload builder over the context's ack buffer.
pub struct AckWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
    order: ByteOrder,
}

impl<'a> AckWriter<'a> {
    pub fn new(buf: &'a mut [u8], order: ByteOrder) -> Self {
        Self { buf, len: 0, order }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.len
    }

    /// Discard everything written so far.
    pub fn reset(&mut self) {
        self.len = 0;
    }

    pub fn put_u32(&mut self, v: u32) -> Result<(), Status> {
        if self.remaining() < 4 {
            return Err(Status::OutOfRange);
        }
        self.buf[self.len..self.len + 4].copy_from_slice(&self.order.u32_to(v));
        self.len += 4;
        Ok(())
    }

    pub fn put_status(&mut self, status: Status) -> Result<(), Status> {
        self.put_u32(status.as_u32())
    }

    /// Append raw bytes verbatim (opaque blobs are not byte-swapped).
    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), Status> {
        if self.remaining() < bytes.len() {
            return Err(Status::OutOfRange);
        }
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }
}

/// Rings the P2A acknowledgment doorbell. Provided by a registered group
/// (normally system-MSI); probed by the context via
/// [`ServiceGroup::as_doorbell`].
pub trait DoorbellInjector: Send + Sync {
    fn inject_p2a_doorbell(&self);
}

/// A registered collection of services.
///
/// Implementations serialize their own state: `handle` and
/// `process_events` run under the group's lock, which lives inside the
/// implementation. Neither may block on the platform indefinitely.
pub trait ServiceGroup: Send + Sync {
    fn info(&self) -> &GroupInfo;

    /// The service table, used for id and minimum-length checks.
    fn services(&self) -> &[ServiceDesc];

    /// Handle one request. On `Err`, the dispatcher acks with that status
    /// as the only payload word.
    fn handle(
        &self,
        env: &DispatchEnv<'_>,
        service_id: u8,
        req: &Request<'_>,
        ack: &mut AckWriter<'_>,
    ) -> Result<(), Status>;

    /// Advance internal state machines; called from the event pump.
    /// `Err(Busy)` means "try again next pass".
    fn process_events(&self) -> Result<(), Status> {
        Ok(())
    }

    /// True when `process_events` does real work.
    fn has_process_events(&self) -> bool {
        false
    }

    /// The doorbell capability, when this group provides it.
    fn as_doorbell(&self) -> Option<&dyn DoorbellInjector> {
        None
    }

    /// Descriptor lookup; `None` for ids the group does not define.
    fn service_desc(&self, service_id: u8) -> Option<&ServiceDesc> {
        self.services().iter().find(|s| s.id == service_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_words_follow_byte_order() {
        let header = MessageHeader::default();
        let data = [0x01, 0x02, 0x03, 0x04, 0xAA, 0xBB, 0xCC, 0xDD];

        let le = Request::new(header, &data, ByteOrder::LittleEndian);
        assert_eq!(le.u32_at(0), Some(0x0403_0201));
        assert_eq!(le.u32_at(1), Some(0xDDCC_BBAA));
        assert_eq!(le.u32_at(2), None);

        let be = Request::new(header, &data, ByteOrder::BigEndian);
        assert_eq!(be.u32_at(0), Some(0x0102_0304));
    }

    #[test]
    fn request_short_payload() {
        let data = [1, 2, 3];
        let req = Request::new(MessageHeader::default(), &data, ByteOrder::LittleEndian);
        assert_eq!(req.u32_at(0), None);
    }

    #[test]
    fn ack_writer_packs_words() {
        let mut buf = [0u8; 12];
        let mut w = AckWriter::new(&mut buf, ByteOrder::LittleEndian);
        w.put_status(Status::Success).unwrap();
        w.put_u32(0x0001_0000).unwrap();
        assert_eq!(w.len(), 8);
        assert_eq!(&buf[..8], &[0, 0, 0, 0, 0x00, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn ack_writer_capacity_enforced() {
        let mut buf = [0u8; 6];
        let mut w = AckWriter::new(&mut buf, ByteOrder::LittleEndian);
        w.put_u32(1).unwrap();
        assert_eq!(w.put_u32(2), Err(Status::OutOfRange));
        assert_eq!(w.put_bytes(&[0; 3]), Err(Status::OutOfRange));
        w.put_bytes(&[9, 9]).unwrap();
        assert_eq!(w.len(), 6);
        w.reset();
        assert_eq!(w.len(), 0);
        w.put_u32(3).unwrap();
    }

    #[test]
    fn ack_writer_status_is_twos_complement() {
        let mut buf = [0u8; 4];
        let mut w = AckWriter::new(&mut buf, ByteOrder::LittleEndian);
        w.put_status(Status::Already).unwrap();
        assert_eq!(buf, [0xF4, 0xFF, 0xFF, 0xFF]);
    }
}
