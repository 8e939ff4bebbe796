//! Platform-management messaging for firmware, over a shared-memory ring.
//!
//! The server side of the AP-to-platform-microcontroller channel: a slot
//! ring transport in shared memory, a context that pumps requests to
//! registered service groups, and the groups themselves (base, system
//! reset, hart state management, system MSI).
//!
//! The library never creates threads and never blocks on the platform; the
//! embedder drives [`Context::process_a2p_request`] and
//! [`Context::process_all_events`] from its own loop or interrupt handler.
//!
//! ```no_run
//! use std::sync::Arc;
//! use rpmi::prelude::*;
//! use rpmi::{HeapSharedMemory, ShmemTransport, ShmemTransportConfig};
//!
//! let config = ShmemTransportConfig {
//!     slot_size: 64,
//!     queue_size: 16 * 64,
//!     byte_order: ByteOrder::LittleEndian,
//!     with_p2a_channel: false,
//! };
//! let mem = Box::new(HeapSharedMemory::new(config.total_size()));
//! let transport = Arc::new(ShmemTransport::new(mem, config).expect("bad layout"));
//! let context = Context::new(
//!     ContextConfig {
//!         name: "puc".into(),
//!         max_groups: 8,
//!         privilege: PrivilegeLevel::Machine,
//!         impl_id: 0x0001,
//!         platform_info: b"demo platform".to_vec(),
//!     },
//!     transport,
//! )
//! .expect("bad config");
//!
//! loop {
//!     context.process_a2p_request();
//!     context.process_all_events();
//! }
//! ```

#![forbid(unsafe_code)]

// Wire-level types.
pub use rpmi_wire::{
    ByteOrder, HeaderFlags, MESSAGE_HEADER_SIZE, Message, MessageHeader, MessageType,
    PayloadTooLarge, QueueType, SPEC_VERSION, Status, pack_version, version_major, version_minor,
    well_known_group_name,
};

// Well-known group ids.
pub use rpmi_wire::{
    GROUP_ID_BASE, GROUP_ID_CLOCK, GROUP_ID_CPPC, GROUP_ID_DEVICE_POWER, GROUP_ID_HSM,
    GROUP_ID_MM, GROUP_ID_PERFORMANCE, GROUP_ID_SYSTEM_MSI, GROUP_ID_SYSTEM_RESET,
    GROUP_ID_SYSTEM_SUSPEND, GROUP_ID_VOLTAGE,
};

// Shared memory and transport.
pub use rpmi_shmem::{
    CacheOps, HeapSharedMemory, LayoutError, MIN_QUEUE_SLOTS, MIN_SLOT_SIZE,
    NonCoherentSharedMemory, OutOfRange, QueueStatus, SharedMemory, ShmemTransport,
    ShmemTransportConfig, TransportError,
};

// Context and service-group model.
pub use rpmi_core::{
    AckWriter, BaseGroup, Context, ContextConfig, ContextError, DispatchEnv, DoorbellInjector,
    GroupInfo, PrivilegeLevel, PrivilegeMask, Request, ServiceDesc, ServiceGroup,
};

// Base-group service ids and attribute flags.
pub use rpmi_core::{
    BASE_ATTR_DOORBELL_MSI, BASE_ATTR_MACHINE_MODE, BASE_SRV_ENABLE_NOTIFICATION,
    BASE_SRV_GET_ATTRIBUTES, BASE_SRV_GET_IMPL_IDN, BASE_SRV_GET_IMPL_VERSION,
    BASE_SRV_GET_PLATFORM_INFO, BASE_SRV_GET_SPEC_VERSION, BASE_SRV_PROBE_SERVICE_GROUP,
};

// Hart state management.
pub use rpmi_hsm::{HartState, Hsm, HsmComposite, HsmError, HsmLeaf, HsmPlatform, HwState, SuspendType};

// Service groups.
pub use rpmi_services::*;

/// Convenient imports for an embedder.
pub mod prelude {
    pub use rpmi_core::{
        Context, ContextConfig, PrivilegeLevel, PrivilegeMask, ServiceGroup,
    };
    pub use rpmi_wire::{ByteOrder, MessageType, QueueType, Status};
}
