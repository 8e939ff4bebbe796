//! The built-in base service group.
//!
//! Always present, addressable under any privilege level. Serves protocol
//! and implementation versions, the platform-info blob, group probing and
//! the context attribute word.

use rpmi_wire::{GROUP_ID_BASE, IMPL_VERSION, SPEC_VERSION, Status, pack_version};

use crate::{
    AckWriter, ContextError, DispatchEnv, GroupInfo, PrivilegeLevel, PrivilegeMask, Request,
    ServiceDesc, ServiceGroup,
};

pub const BASE_SRV_ENABLE_NOTIFICATION: u8 = 0x01;
pub const BASE_SRV_GET_IMPL_VERSION: u8 = 0x02;
pub const BASE_SRV_GET_IMPL_IDN: u8 = 0x03;
pub const BASE_SRV_GET_SPEC_VERSION: u8 = 0x04;
pub const BASE_SRV_GET_PLATFORM_INFO: u8 = 0x05;
pub const BASE_SRV_PROBE_SERVICE_GROUP: u8 = 0x06;
pub const BASE_SRV_GET_ATTRIBUTES: u8 = 0x07;

/// GetAttributes flag: context runs in machine mode.
pub const BASE_ATTR_MACHINE_MODE: u32 = 1 << 0;
/// GetAttributes flag: a P2A doorbell MSI is available.
pub const BASE_ATTR_DOORBELL_MSI: u32 = 1 << 1;

const INFO: GroupInfo = GroupInfo {
    name: "base",
    id: GROUP_ID_BASE,
    version: pack_version(1, 0),
    privilege: PrivilegeMask::ANY,
};

const SERVICES: &[ServiceDesc] = &[
    ServiceDesc {
        id: BASE_SRV_ENABLE_NOTIFICATION,
        name: "EnableNotification",
        min_request_len: 4,
    },
    ServiceDesc {
        id: BASE_SRV_GET_IMPL_VERSION,
        name: "GetImplementationVersion",
        min_request_len: 0,
    },
    ServiceDesc {
        id: BASE_SRV_GET_IMPL_IDN,
        name: "GetImplementationIdn",
        min_request_len: 0,
    },
    ServiceDesc {
        id: BASE_SRV_GET_SPEC_VERSION,
        name: "GetSpecVersion",
        min_request_len: 0,
    },
    ServiceDesc {
        id: BASE_SRV_GET_PLATFORM_INFO,
        name: "GetPlatformInfo",
        min_request_len: 0,
    },
    ServiceDesc {
        id: BASE_SRV_PROBE_SERVICE_GROUP,
        name: "ProbeServiceGroup",
        min_request_len: 4,
    },
    ServiceDesc {
        id: BASE_SRV_GET_ATTRIBUTES,
        name: "GetAttributes",
        min_request_len: 0,
    },
];

pub struct BaseGroup {
    impl_id: u32,
    platform_info: Vec<u8>,
}

impl BaseGroup {
    /// Built by the context; `payload_capacity` is the transport's slot
    /// payload size, which bounds the platform-info blob (two lead words
    /// precede it in the ack).
    pub(crate) fn new(
        impl_id: u32,
        platform_info: Vec<u8>,
        payload_capacity: usize,
    ) -> Result<Self, ContextError> {
        let max = payload_capacity.saturating_sub(8);
        if platform_info.len() > max {
            return Err(ContextError::PlatformInfoTooLarge {
                len: platform_info.len(),
                max,
            });
        }
        Ok(Self {
            impl_id,
            platform_info,
        })
    }

    pub fn impl_id(&self) -> u32 {
        self.impl_id
    }

    pub fn platform_info(&self) -> &[u8] {
        &self.platform_info
    }
}

impl ServiceGroup for BaseGroup {
    fn info(&self) -> &GroupInfo {
        &INFO
    }

    fn services(&self) -> &[ServiceDesc] {
        SERVICES
    }

    fn handle(
        &self,
        env: &DispatchEnv<'_>,
        service_id: u8,
        req: &Request<'_>,
        ack: &mut AckWriter<'_>,
    ) -> Result<(), Status> {
        match service_id {
            BASE_SRV_GET_IMPL_VERSION => {
                ack.put_status(Status::Success)?;
                ack.put_u32(IMPL_VERSION)?;
            }
            BASE_SRV_GET_IMPL_IDN => {
                ack.put_status(Status::Success)?;
                ack.put_u32(self.impl_id)?;
            }
            BASE_SRV_GET_SPEC_VERSION => {
                ack.put_status(Status::Success)?;
                ack.put_u32(SPEC_VERSION)?;
            }
            BASE_SRV_GET_PLATFORM_INFO => {
                ack.put_status(Status::Success)?;
                ack.put_u32(self.platform_info.len() as u32)?;
                ack.put_bytes(&self.platform_info)?;
            }
            BASE_SRV_PROBE_SERVICE_GROUP => {
                let group_id = req.u32_at(0).ok_or(Status::InvalidParam)?;
                let version = u16::try_from(group_id)
                    .map(|id| env.probe_group_version(id))
                    .unwrap_or(0);
                ack.put_status(Status::Success)?;
                ack.put_u32(version)?;
            }
            BASE_SRV_GET_ATTRIBUTES => {
                let mut flags = 0;
                if env.privilege() == PrivilegeLevel::Machine {
                    flags |= BASE_ATTR_MACHINE_MODE;
                }
                if env.doorbell_available() {
                    flags |= BASE_ATTR_DOORBELL_MSI;
                }
                ack.put_status(Status::Success)?;
                ack.put_u32(flags)?;
                ack.put_u32(0)?;
                ack.put_u32(0)?;
                ack.put_u32(0)?;
            }
            // Notifications are not implemented; EnableNotification and
            // unknown ids fall out the same way.
            _ => return Err(Status::NotSupported),
        }
        Ok(())
    }
}
