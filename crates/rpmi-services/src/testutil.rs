//! Shared plumbing for the service-group tests: a context over a
//! heap-backed region, plus client-side framing helpers.

use std::sync::Arc;

use rpmi_core::{Context, ContextConfig, PrivilegeLevel};
use rpmi_shmem::{HeapSharedMemory, ShmemTransport, ShmemTransportConfig};
use rpmi_wire::{ByteOrder, Message, MessageHeader, MessageType, QueueType};

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub(crate) fn make_context() -> (Context, Arc<ShmemTransport>) {
    init_tracing();
    let cfg = ShmemTransportConfig {
        slot_size: 64,
        queue_size: 16 * 64,
        byte_order: ByteOrder::LittleEndian,
        with_p2a_channel: false,
    };
    let transport = Arc::new(
        ShmemTransport::new(Box::new(HeapSharedMemory::new(cfg.total_size())), cfg).unwrap(),
    );
    let ctx = Context::new(
        ContextConfig {
            name: "service-tests".into(),
            max_groups: 8,
            privilege: PrivilegeLevel::Machine,
            impl_id: 0,
            platform_info: Vec::new(),
        },
        transport.clone(),
    )
    .unwrap();
    (ctx, transport)
}

pub(crate) fn send(transport: &ShmemTransport, group: u16, service: u8, token: u16, words: &[u32]) {
    let mut msg = Message::for_slot(transport.slot_size());
    msg.header = MessageHeader::new(MessageType::NormalRequest, group, service, token);
    let mut data = Vec::new();
    for w in words {
        data.extend_from_slice(&transport.byte_order().u32_to(*w));
    }
    msg.write_data(&data).unwrap();
    transport.enqueue(QueueType::A2pRequest, &msg).unwrap();
}

pub(crate) fn recv_ack(transport: &ShmemTransport) -> Option<Vec<u32>> {
    let mut msg = Message::for_slot(transport.slot_size());
    transport.dequeue(QueueType::P2aAck, &mut msg).ok()?;
    let order = transport.byte_order();
    Some(
        msg.data()
            .chunks_exact(4)
            .map(|c| order.u32_from([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}
