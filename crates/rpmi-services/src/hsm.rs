//! Hart-state-management service group.
//!
//! Request decoding and pagination over an [`Hsm`] instance; the state
//! machine itself lives in `rpmi-hsm`. The event pump forwards to
//! `process_state_changes`, which is what finalizes pending transitions.

use std::sync::Arc;

use rpmi_core::{
    AckWriter, DispatchEnv, GroupInfo, PrivilegeMask, Request, ServiceDesc, ServiceGroup,
};
use rpmi_hsm::Hsm;
use rpmi_wire::{GROUP_ID_HSM, Status, pack_version};

pub const HSM_SRV_ENABLE_NOTIFICATION: u8 = 0x01;
pub const HSM_SRV_GET_HART_STATUS: u8 = 0x02;
pub const HSM_SRV_GET_HART_LIST: u8 = 0x03;
pub const HSM_SRV_GET_SUSPEND_TYPES: u8 = 0x04;
pub const HSM_SRV_GET_SUSPEND_INFO: u8 = 0x05;
pub const HSM_SRV_HART_START: u8 = 0x06;
pub const HSM_SRV_HART_STOP: u8 = 0x07;
pub const HSM_SRV_HART_SUSPEND: u8 = 0x08;

const INFO: GroupInfo = GroupInfo {
    name: "hsm",
    id: GROUP_ID_HSM,
    version: pack_version(1, 0),
    privilege: PrivilegeMask::MACHINE,
};

const SERVICES: &[ServiceDesc] = &[
    ServiceDesc {
        id: HSM_SRV_ENABLE_NOTIFICATION,
        name: "EnableNotification",
        min_request_len: 4,
    },
    ServiceDesc {
        id: HSM_SRV_GET_HART_STATUS,
        name: "GetHartStatus",
        min_request_len: 4,
    },
    ServiceDesc {
        id: HSM_SRV_GET_HART_LIST,
        name: "GetHartList",
        min_request_len: 4,
    },
    ServiceDesc {
        id: HSM_SRV_GET_SUSPEND_TYPES,
        name: "GetSuspendTypes",
        min_request_len: 4,
    },
    ServiceDesc {
        id: HSM_SRV_GET_SUSPEND_INFO,
        name: "GetSuspendInfo",
        min_request_len: 4,
    },
    ServiceDesc {
        id: HSM_SRV_HART_START,
        name: "HartStart",
        min_request_len: 12,
    },
    ServiceDesc {
        id: HSM_SRV_HART_STOP,
        name: "HartStop",
        min_request_len: 4,
    },
    ServiceDesc {
        id: HSM_SRV_HART_SUSPEND,
        name: "HartSuspend",
        min_request_len: 4,
    },
];

pub struct HsmGroup {
    hsm: Arc<Hsm>,
}

impl HsmGroup {
    pub fn new(hsm: Arc<Hsm>) -> Self {
        Self { hsm }
    }

    pub fn hsm(&self) -> &Arc<Hsm> {
        &self.hsm
    }

    /// Write one pagination ack: `{SUCCESS, remaining, returned, entries}`
    /// where `entries` come from `at(start + i)`.
    fn paginate(
        &self,
        total: usize,
        start: usize,
        ack: &mut AckWriter<'_>,
        at: impl Fn(usize) -> Option<u32>,
    ) -> Result<(), Status> {
        if start > total {
            return Err(Status::InvalidParam);
        }
        // Three lead words, then as many 32-bit entries as the slot allows.
        let max_entries = (ack.capacity() - 3 * 4) / 4;
        let returned = (total - start).min(max_entries);
        let remaining = total - start - returned;

        ack.put_status(Status::Success)?;
        ack.put_u32(remaining as u32)?;
        ack.put_u32(returned as u32)?;
        for i in 0..returned {
            ack.put_u32(at(start + i).ok_or(Status::ImplError)?)?;
        }
        Ok(())
    }
}

impl ServiceGroup for HsmGroup {
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
            HSM_SRV_GET_HART_STATUS => {
                let hart_id = req.u32_at(0).ok_or(Status::InvalidParam)?;
                let state = self.hsm.get_state(hart_id).map_err(|e| e.status())?;
                ack.put_status(Status::Success)?;
                ack.put_u32(state.as_u32())?;
            }
            HSM_SRV_GET_HART_LIST => {
                let start = req.u32_at(0).ok_or(Status::InvalidParam)? as usize;
                self.paginate(self.hsm.hart_count(), start, ack, |i| {
                    self.hsm.hart_index_to_id(i)
                })?;
            }
            HSM_SRV_GET_SUSPEND_TYPES => {
                let start = req.u32_at(0).ok_or(Status::InvalidParam)? as usize;
                self.paginate(self.hsm.suspend_type_count(), start, ack, |i| {
                    self.hsm.suspend_type_at(i).map(|t| t.id)
                })?;
            }
            HSM_SRV_GET_SUSPEND_INFO => {
                let type_id = req.u32_at(0).ok_or(Status::InvalidParam)?;
                let ty = self
                    .hsm
                    .find_suspend_type(type_id)
                    .ok_or(Status::InvalidParam)?;
                ack.put_status(Status::Success)?;
                ack.put_u32(ty.flags)?;
                ack.put_u32(ty.entry_latency_us)?;
                ack.put_u32(ty.exit_latency_us)?;
                ack.put_u32(ty.wakeup_latency_us)?;
                ack.put_u32(ty.min_residency_us)?;
            }
            HSM_SRV_HART_START => {
                let hart_id = req.u32_at(0).ok_or(Status::InvalidParam)?;
                let lo = req.u32_at(1).ok_or(Status::InvalidParam)?;
                let hi = req.u32_at(2).ok_or(Status::InvalidParam)?;
                let start_addr = (hi as u64) << 32 | lo as u64;
                self.hsm
                    .start(hart_id, start_addr)
                    .map_err(|e| e.status())?;
                ack.put_status(Status::Success)?;
            }
            HSM_SRV_HART_STOP => {
                let hart_id = req.u32_at(0).ok_or(Status::InvalidParam)?;
                self.hsm.stop(hart_id).map_err(|e| e.status())?;
                ack.put_status(Status::Success)?;
            }
            HSM_SRV_HART_SUSPEND => {
                let hart_id = req.u32_at(0).ok_or(Status::InvalidParam)?;
                // Suspend type and resume address are optional; default
                // type 0, resume address 0.
                let suspend_type = req.u32_at(1).unwrap_or(0);
                let lo = req.u32_at(2).unwrap_or(0);
                let hi = req.u32_at(3).unwrap_or(0);
                let resume_addr = (hi as u64) << 32 | lo as u64;
                self.hsm
                    .suspend(hart_id, suspend_type, resume_addr)
                    .map_err(|e| e.status())?;
                ack.put_status(Status::Success)?;
            }
            _ => return Err(Status::NotSupported),
        }
        Ok(())
    }

    fn process_events(&self) -> Result<(), Status> {
        self.hsm.process_state_changes();
        Ok(())
    }

    fn has_process_events(&self) -> bool {
        true
    }
}
