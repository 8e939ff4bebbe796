//! Message header encoding.
//!
//! Every message starts with an 8-byte header followed by `datalen` payload
//! bytes; the remainder of the slot is undefined.
//!
//! ```text
//! byte 0:    flags (low 2 bits = message type; bit 3 = doorbell-on-ack)
//! byte 1:    service_id
//! bytes 2-3: servicegroup_id   (transport byte order)
//! bytes 4-5: datalen           (transport byte order)
//! bytes 6-7: token             (transport byte order)
//! ```

use core::fmt;

use bitflags::bitflags;

/// Size of the message header on the wire.
pub const MESSAGE_HEADER_SIZE: usize = 8;

/// Mask selecting the message-type bits of the flags byte.
pub const MSG_TYPE_MASK: u8 = 0b0000_0011;

/// Byte order of the multi-byte header and payload fields on the shared
/// channel. Chosen once per transport at construction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ByteOrder {
    #[default]
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    #[inline]
    pub fn u16_to(self, v: u16) -> [u8; 2] {
        match self {
            ByteOrder::LittleEndian => v.to_le_bytes(),
            ByteOrder::BigEndian => v.to_be_bytes(),
        }
    }

    #[inline]
    pub fn u16_from(self, b: [u8; 2]) -> u16 {
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes(b),
            ByteOrder::BigEndian => u16::from_be_bytes(b),
        }
    }

    #[inline]
    pub fn u32_to(self, v: u32) -> [u8; 4] {
        match self {
            ByteOrder::LittleEndian => v.to_le_bytes(),
            ByteOrder::BigEndian => v.to_be_bytes(),
        }
    }

    #[inline]
    pub fn u32_from(self, b: [u8; 4]) -> u32 {
        match self {
            ByteOrder::LittleEndian => u32::from_le_bytes(b),
            ByteOrder::BigEndian => u32::from_be_bytes(b),
        }
    }

    #[inline]
    pub fn u64_to(self, v: u64) -> [u8; 8] {
        match self {
            ByteOrder::LittleEndian => v.to_le_bytes(),
            ByteOrder::BigEndian => v.to_be_bytes(),
        }
    }

    #[inline]
    pub fn u64_from(self, b: [u8; 8]) -> u64 {
        match self {
            ByteOrder::LittleEndian => u64::from_le_bytes(b),
            ByteOrder::BigEndian => u64::from_be_bytes(b),
        }
    }
}

/// Message type, carried in the low 2 bits of the flags byte.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageType {
    /// Request that must be acknowledged.
    NormalRequest = 0,
    /// Request processed without an acknowledgment.
    PostedRequest = 1,
    /// Acknowledgment of an earlier request.
    Ack = 2,
    /// Unsolicited server-side event.
    Notification = 3,
}

impl MessageType {
    /// Extract the message type from a flags byte. Total over the 2-bit
    /// field, so this cannot fail.
    pub fn from_flags(flags: u8) -> Self {
        match flags & MSG_TYPE_MASK {
            0 => MessageType::NormalRequest,
            1 => MessageType::PostedRequest,
            2 => MessageType::Ack,
            _ => MessageType::Notification,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::NormalRequest => write!(f, "normal request"),
            MessageType::PostedRequest => write!(f, "posted request"),
            MessageType::Ack => write!(f, "ack"),
            MessageType::Notification => write!(f, "notification"),
        }
    }
}

bitflags! {
    /// Flag bits of the header flags byte outside the message-type field.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct HeaderFlags: u8 {
        /// Requester wants an MSI doorbell rung when the ack is enqueued.
        const DOORBELL = 1 << 3;
    }
}

/// Decoded message header.
///
/// `flags` keeps the raw byte; use [`MessageHeader::msg_type`] and the
/// doorbell accessors instead of poking at bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MessageHeader {
    pub flags: u8,
    pub service_id: u8,
    pub servicegroup_id: u16,
    pub datalen: u16,
    pub token: u16,
}

impl MessageHeader {
    pub fn new(msg_type: MessageType, servicegroup_id: u16, service_id: u8, token: u16) -> Self {
        Self {
            flags: msg_type.as_u8(),
            service_id,
            servicegroup_id,
            datalen: 0,
            token,
        }
    }

    #[inline]
    pub fn msg_type(&self) -> MessageType {
        MessageType::from_flags(self.flags)
    }

    pub fn set_msg_type(&mut self, ty: MessageType) {
        self.flags = (self.flags & !MSG_TYPE_MASK) | ty.as_u8();
    }

    #[inline]
    pub fn doorbell(&self) -> bool {
        HeaderFlags::from_bits_truncate(self.flags).contains(HeaderFlags::DOORBELL)
    }

    pub fn set_doorbell(&mut self, on: bool) {
        if on {
            self.flags |= HeaderFlags::DOORBELL.bits();
        } else {
            self.flags &= !HeaderFlags::DOORBELL.bits();
        }
    }

    /// Serialize to wire bytes; multi-byte fields in `order`.
    pub fn to_bytes(&self, order: ByteOrder) -> [u8; MESSAGE_HEADER_SIZE] {
        let group = order.u16_to(self.servicegroup_id);
        let datalen = order.u16_to(self.datalen);
        let token = order.u16_to(self.token);
        [
            self.flags,
            self.service_id,
            group[0],
            group[1],
            datalen[0],
            datalen[1],
            token[0],
            token[1],
        ]
    }

    /// Decode wire bytes; multi-byte fields interpreted in `order`.
    pub fn from_bytes(b: [u8; MESSAGE_HEADER_SIZE], order: ByteOrder) -> Self {
        Self {
            flags: b[0],
            service_id: b[1],
            servicegroup_id: order.u16_from([b[2], b[3]]),
            datalen: order.u16_from([b[4], b[5]]),
            token: order.u16_from([b[6], b[7]]),
        }
    }
}

impl fmt::Display for MessageHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} group={:#06x} service={:#04x} datalen={} token={:#06x}",
            self.msg_type(),
            self.servicegroup_id,
            self.service_id,
            self.datalen,
            self.token
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msg_type_from_flags_is_total() {
        assert_eq!(MessageType::from_flags(0x00), MessageType::NormalRequest);
        assert_eq!(MessageType::from_flags(0x01), MessageType::PostedRequest);
        assert_eq!(MessageType::from_flags(0x02), MessageType::Ack);
        assert_eq!(MessageType::from_flags(0x03), MessageType::Notification);
        // Upper bits are ignored.
        assert_eq!(MessageType::from_flags(0xFC), MessageType::NormalRequest);
        assert_eq!(MessageType::from_flags(0xFE), MessageType::Ack);
    }

    #[test]
    fn doorbell_bit_is_bit_three() {
        let mut hdr = MessageHeader::new(MessageType::NormalRequest, 0x0001, 0x04, 0x0001);
        assert!(!hdr.doorbell());
        hdr.set_doorbell(true);
        assert_eq!(hdr.flags, 0x08);
        assert_eq!(hdr.msg_type(), MessageType::NormalRequest);
        hdr.set_doorbell(false);
        assert_eq!(hdr.flags, 0x00);
    }

    #[test]
    fn set_msg_type_preserves_doorbell() {
        let mut hdr = MessageHeader::new(MessageType::NormalRequest, 1, 1, 1);
        hdr.set_doorbell(true);
        hdr.set_msg_type(MessageType::Ack);
        assert!(hdr.doorbell());
        assert_eq!(hdr.msg_type(), MessageType::Ack);
    }

    #[test]
    fn encoding_little_endian() {
        let hdr = MessageHeader {
            flags: 0x02,
            service_id: 0x04,
            servicegroup_id: 0x0102,
            datalen: 0x0304,
            token: 0x0506,
        };
        let bytes = hdr.to_bytes(ByteOrder::LittleEndian);
        assert_eq!(bytes, [0x02, 0x04, 0x02, 0x01, 0x04, 0x03, 0x06, 0x05]);
        assert_eq!(MessageHeader::from_bytes(bytes, ByteOrder::LittleEndian), hdr);
    }

    #[test]
    fn encoding_big_endian() {
        let hdr = MessageHeader {
            flags: 0x00,
            service_id: 0x06,
            servicegroup_id: 0x0102,
            datalen: 0x0304,
            token: 0x0506,
        };
        let bytes = hdr.to_bytes(ByteOrder::BigEndian);
        assert_eq!(bytes, [0x00, 0x06, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        assert_eq!(MessageHeader::from_bytes(bytes, ByteOrder::BigEndian), hdr);
    }

    #[test]
    fn byte_order_round_trips() {
        for order in [ByteOrder::LittleEndian, ByteOrder::BigEndian] {
            assert_eq!(order.u16_from(order.u16_to(0xA55A)), 0xA55A);
            assert_eq!(order.u32_from(order.u32_to(0xDEAD_BEEF)), 0xDEAD_BEEF);
            assert_eq!(
                order.u64_from(order.u64_to(0x0102_0304_0506_0708)),
                0x0102_0304_0506_0708
            );
        }
    }
}
