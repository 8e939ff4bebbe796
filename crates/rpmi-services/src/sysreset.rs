//! System-reset service group.
//!
//! A thin gate in front of one platform operation that does not return.
//! The group validates the requested reset type against the supported list;
//! everything after `system_reset` is the platform's problem.

use rpmi_core::{
    AckWriter, DispatchEnv, GroupInfo, PrivilegeMask, Request, ServiceDesc, ServiceGroup,
};
use rpmi_wire::{GROUP_ID_SYSTEM_RESET, Status, pack_version};

pub const SYSRESET_SRV_ENABLE_NOTIFICATION: u8 = 0x01;
pub const SYSRESET_SRV_GET_ATTRIBUTES: u8 = 0x02;
pub const SYSRESET_SRV_SYSTEM_RESET: u8 = 0x03;

/// Architected reset types; platforms may define more.
pub const RESET_TYPE_SHUTDOWN: u32 = 0;
pub const RESET_TYPE_COLD_REBOOT: u32 = 1;
pub const RESET_TYPE_WARM_REBOOT: u32 = 2;

/// GetAttributes: the queried reset type is supported.
pub const SYSRESET_ATTR_SUPPORTED: u32 = 1 << 31;

/// The one platform operation this group delegates to.
pub trait SystemResetPlatform: Send + Sync {
    /// Perform the reset. Must not return.
    fn system_reset(&self, reset_type: u32) -> !;
}

const INFO: GroupInfo = GroupInfo {
    name: "system-reset",
    id: GROUP_ID_SYSTEM_RESET,
    version: pack_version(1, 0),
    privilege: PrivilegeMask::MACHINE,
};

const SERVICES: &[ServiceDesc] = &[
    ServiceDesc {
        id: SYSRESET_SRV_ENABLE_NOTIFICATION,
        name: "EnableNotification",
        min_request_len: 4,
    },
    ServiceDesc {
        id: SYSRESET_SRV_GET_ATTRIBUTES,
        name: "GetAttributes",
        min_request_len: 4,
    },
    ServiceDesc {
        id: SYSRESET_SRV_SYSTEM_RESET,
        name: "SystemReset",
        min_request_len: 4,
    },
];

pub struct SystemResetGroup {
    supported: Vec<u32>,
    platform: Box<dyn SystemResetPlatform>,
}

impl SystemResetGroup {
    pub fn new(supported: Vec<u32>, platform: Box<dyn SystemResetPlatform>) -> Self {
        Self {
            supported,
            platform,
        }
    }

    pub fn is_supported(&self, reset_type: u32) -> bool {
        self.supported.contains(&reset_type)
    }
}

impl ServiceGroup for SystemResetGroup {
    fn info(&self) -> &GroupInfo {
        &INFO
    }

    fn services(&self) -> &[ServiceDesc] {
        SERVICES
    }

    fn handle(
        &self,
        _env: &DispatchEnv<'_>,
        service_id: u8,
        req: &Request<'_>,
        ack: &mut AckWriter<'_>,
    ) -> Result<(), Status> {
        match service_id {
            SYSRESET_SRV_GET_ATTRIBUTES => {
                let reset_type = req.u32_at(0).ok_or(Status::InvalidParam)?;
                let flags = if self.is_supported(reset_type) {
                    SYSRESET_ATTR_SUPPORTED
                } else {
                    0
                };
                ack.put_status(Status::Success)?;
                ack.put_u32(flags)?;
            }
            SYSRESET_SRV_SYSTEM_RESET => {
                let reset_type = req.u32_at(0).ok_or(Status::InvalidParam)?;
                if !self.is_supported(reset_type) {
                    return Err(Status::InvalidParam);
                }
                tracing::info!(reset_type, "system reset requested");
                self.platform.system_reset(reset_type)
            }
            _ => return Err(Status::NotSupported),
        }
        Ok(())
    }
}
