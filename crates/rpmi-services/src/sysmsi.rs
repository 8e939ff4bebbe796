//! System-MSI service group.
//!
//! Routes platform interrupts to AP-programmed targets. One descriptor per
//! MSI: enable and pending bits plus a validated `{address, data}` target.
//! Index 0 is the P2A acknowledgment doorbell; the dispatcher rings it
//! through [`rpmi_core::DoorbellInjector`] when a request asked for a
//! doorbell on ack.

use parking_lot::Mutex;

use rpmi_core::{
    AckWriter, DispatchEnv, DoorbellInjector, GroupInfo, PrivilegeMask, Request, ServiceDesc,
    ServiceGroup,
};
use rpmi_wire::{GROUP_ID_SYSTEM_MSI, Status, pack_version};

pub const SYSMSI_SRV_ENABLE_NOTIFICATION: u8 = 0x01;
pub const SYSMSI_SRV_GET_ATTRIBUTES: u8 = 0x02;
pub const SYSMSI_SRV_MSI_GET_ATTRIBUTES: u8 = 0x03;
pub const SYSMSI_SRV_MSI_SET_ENABLE: u8 = 0x04;
pub const SYSMSI_SRV_MSI_GET_ENABLE: u8 = 0x05;
pub const SYSMSI_SRV_MSI_SET_PENDING: u8 = 0x06;
pub const SYSMSI_SRV_MSI_GET_PENDING: u8 = 0x07;
pub const SYSMSI_SRV_MSI_SET_TARGET: u8 = 0x08;
pub const SYSMSI_SRV_MSI_GET_TARGET: u8 = 0x09;

/// Index of the P2A acknowledgment doorbell MSI.
pub const P2A_DOORBELL_INDEX: u32 = 0;

/// Per-MSI attribute flag: the platform prefers M-mode handling.
pub const SYSMSI_MSI_ATTR_MACHINE_PREFERRED: u32 = 1 << 0;

/// Bytes of MSI name returned by per-MSI attributes.
pub const SYSMSI_NAME_LEN: usize = 16;

/// Platform hooks: target validation and the actual doorbell store.
pub trait SystemMsiPlatform: Send + Sync {
    /// True when `addr` is an acceptable MSI target for the AP.
    fn validate_msi_addr(&self, addr: u64) -> bool;

    /// Perform the 32-bit MSI write.
    fn write_msi(&self, addr: u64, data: u32);
}

const INFO: GroupInfo = GroupInfo {
    name: "system-msi",
    id: GROUP_ID_SYSTEM_MSI,
    version: pack_version(1, 0),
    privilege: PrivilegeMask::MACHINE,
};

const SERVICES: &[ServiceDesc] = &[
    ServiceDesc {
        id: SYSMSI_SRV_ENABLE_NOTIFICATION,
        name: "EnableNotification",
        min_request_len: 4,
    },
    ServiceDesc {
        id: SYSMSI_SRV_GET_ATTRIBUTES,
        name: "GetAttributes",
        min_request_len: 0,
    },
    ServiceDesc {
        id: SYSMSI_SRV_MSI_GET_ATTRIBUTES,
        name: "MsiGetAttributes",
        min_request_len: 4,
    },
    ServiceDesc {
        id: SYSMSI_SRV_MSI_SET_ENABLE,
        name: "MsiSetEnable",
        min_request_len: 8,
    },
    ServiceDesc {
        id: SYSMSI_SRV_MSI_GET_ENABLE,
        name: "MsiGetEnable",
        min_request_len: 4,
    },
    ServiceDesc {
        id: SYSMSI_SRV_MSI_SET_PENDING,
        name: "MsiSetPending",
        min_request_len: 8,
    },
    ServiceDesc {
        id: SYSMSI_SRV_MSI_GET_PENDING,
        name: "MsiGetPending",
        min_request_len: 4,
    },
    ServiceDesc {
        id: SYSMSI_SRV_MSI_SET_TARGET,
        name: "MsiSetTarget",
        min_request_len: 16,
    },
    ServiceDesc {
        id: SYSMSI_SRV_MSI_GET_TARGET,
        name: "MsiGetTarget",
        min_request_len: 4,
    },
];

#[derive(Clone, Copy, Debug, Default)]
struct MsiEntry {
    enabled: bool,
    pending: bool,
    /// Target has been programmed and validated.
    valid: bool,
    address: u64,
    data: u32,
}

pub struct SystemMsiGroup {
    entries: Mutex<Vec<MsiEntry>>,
    names: Vec<String>,
    platform: Box<dyn SystemMsiPlatform>,
}

impl SystemMsiGroup {
    /// `msi_count` includes the P2A doorbell at index 0.
    pub fn new(msi_count: u32, platform: Box<dyn SystemMsiPlatform>) -> Self {
        let names = (0..msi_count)
            .map(|i| {
                if i == P2A_DOORBELL_INDEX {
                    "p2a-doorbell".to_string()
                } else {
                    format!("sys-msi-{}", i)
                }
            })
            .collect();
        Self {
            entries: Mutex::new(vec![MsiEntry::default(); msi_count as usize]),
            names,
            platform,
        }
    }

    pub fn msi_count(&self) -> u32 {
        self.names.len() as u32
    }

    /// Mark an MSI pending and deliver it if it is ready.
    pub fn inject(&self, index: u32) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(index as usize) else {
            tracing::warn!(index, "MSI injection for out-of-range index");
            return;
        };
        entry.pending = true;
        Self::deliver(self.platform.as_ref(), entry);
    }

    /// Fire one MSI if enabled, pending and programmed.
    fn deliver(platform: &dyn SystemMsiPlatform, entry: &mut MsiEntry) {
        if entry.enabled && entry.pending && entry.valid {
            platform.write_msi(entry.address, entry.data);
            entry.pending = false;
        }
    }

    fn with_entry<R>(
        &self,
        index: u32,
        f: impl FnOnce(&mut MsiEntry) -> R,
    ) -> Result<R, Status> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(index as usize)
            .ok_or(Status::InvalidParam)?;
        Ok(f(entry))
    }
}

impl DoorbellInjector for SystemMsiGroup {
    fn inject_p2a_doorbell(&self) {
        self.inject(P2A_DOORBELL_INDEX);
    }
}

impl ServiceGroup for SystemMsiGroup {
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
            SYSMSI_SRV_GET_ATTRIBUTES => {
                ack.put_status(Status::Success)?;
                ack.put_u32(self.msi_count())?;
                ack.put_u32(P2A_DOORBELL_INDEX)?;
                ack.put_u32(0)?;
            }
            SYSMSI_SRV_MSI_GET_ATTRIBUTES => {
                let index = req.u32_at(0).ok_or(Status::InvalidParam)?;
                let name = self
                    .names
                    .get(index as usize)
                    .ok_or(Status::InvalidParam)?;
                ack.put_status(Status::Success)?;
                ack.put_u32(SYSMSI_MSI_ATTR_MACHINE_PREFERRED)?;
                let mut padded = [0u8; SYSMSI_NAME_LEN];
                let len = name.len().min(SYSMSI_NAME_LEN);
                padded[..len].copy_from_slice(&name.as_bytes()[..len]);
                ack.put_bytes(&padded)?;
            }
            SYSMSI_SRV_MSI_SET_ENABLE => {
                let index = req.u32_at(0).ok_or(Status::InvalidParam)?;
                let enable = req.u32_at(1).ok_or(Status::InvalidParam)? != 0;
                self.with_entry(index, |e| {
                    e.enabled = enable;
                    // Turning an MSI on delivers anything already pending.
                    Self::deliver(self.platform.as_ref(), e);
                })?;
                ack.put_status(Status::Success)?;
            }
            SYSMSI_SRV_MSI_GET_ENABLE => {
                let index = req.u32_at(0).ok_or(Status::InvalidParam)?;
                let enabled = self.with_entry(index, |e| e.enabled)?;
                ack.put_status(Status::Success)?;
                ack.put_u32(enabled as u32)?;
            }
            SYSMSI_SRV_MSI_SET_PENDING => {
                let index = req.u32_at(0).ok_or(Status::InvalidParam)?;
                let pending = req.u32_at(1).ok_or(Status::InvalidParam)? != 0;
                self.with_entry(index, |e| {
                    e.pending = pending;
                    Self::deliver(self.platform.as_ref(), e);
                })?;
                ack.put_status(Status::Success)?;
            }
            SYSMSI_SRV_MSI_GET_PENDING => {
                let index = req.u32_at(0).ok_or(Status::InvalidParam)?;
                let pending = self.with_entry(index, |e| e.pending)?;
                ack.put_status(Status::Success)?;
                ack.put_u32(pending as u32)?;
            }
            SYSMSI_SRV_MSI_SET_TARGET => {
                let index = req.u32_at(0).ok_or(Status::InvalidParam)?;
                let lo = req.u32_at(1).ok_or(Status::InvalidParam)?;
                let hi = req.u32_at(2).ok_or(Status::InvalidParam)?;
                let data = req.u32_at(3).ok_or(Status::InvalidParam)?;
                let address = (hi as u64) << 32 | lo as u64;
                if !self.platform.validate_msi_addr(address) {
                    return Err(Status::InvalidParam);
                }
                self.with_entry(index, |e| {
                    e.address = address;
                    e.data = data;
                    e.valid = true;
                })?;
                ack.put_status(Status::Success)?;
            }
            SYSMSI_SRV_MSI_GET_TARGET => {
                let index = req.u32_at(0).ok_or(Status::InvalidParam)?;
                let (address, data) = self.with_entry(index, |e| (e.address, e.data))?;
                ack.put_status(Status::Success)?;
                ack.put_u32(address as u32)?;
                ack.put_u32((address >> 32) as u32)?;
                ack.put_u32(data)?;
            }
            _ => return Err(Status::NotSupported),
        }
        Ok(())
    }

    /// Deliver every armed MSI.
    fn process_events(&self) -> Result<(), Status> {
        let mut entries = self.entries.lock();
        for entry in entries.iter_mut() {
            Self::deliver(self.platform.as_ref(), entry);
        }
        Ok(())
    }

    fn has_process_events(&self) -> bool {
        true
    }

    fn as_doorbell(&self) -> Option<&dyn DoorbellInjector> {
        Some(self)
    }
}
