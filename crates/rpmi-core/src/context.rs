//! The context: group registry and the message pump.
//!
//! One context owns one transport, the always-present base group, the
//! registered service groups and two reusable message buffers. The pump is
//! a plain loop: dequeue an A2P request, resolve group and service, run the
//! handler, enqueue the ack, maybe ring the doorbell, until the request
//! queue drains. Nothing here blocks on the platform.
//!
//! Lock order: the registry lock is never held while a handler runs (the
//! pump resolves the group, drops the lock, then dispatches); the transport
//! lock is a leaf inside enqueue/dequeue.

use core::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use rpmi_shmem::{ShmemTransport, TransportError};
use rpmi_wire::{
    GROUP_ID_BASE, Message, MessageHeader, MessageType, QueueType, Status, well_known_group_name,
};

use crate::{
    AckWriter, BaseGroup, PrivilegeLevel, Request, ServiceGroup,
};

/// Errors from context construction and group registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// A group with this id is already registered (or it is the base id).
    DuplicateGroup(u16),
    /// The group's privilege bitmap excludes the context's level.
    PrivilegeDenied { group: u16, level: PrivilegeLevel },
    /// The registry is at `max_groups`.
    OutOfResources { max: usize },
    /// No group with this id is registered.
    GroupNotFound(u16),
    /// The platform-info blob does not fit a slot payload.
    PlatformInfoTooLarge { len: usize, max: usize },
}

impl ContextError {
    /// Wire status this error maps to.
    pub fn status(&self) -> Status {
        match self {
            Self::DuplicateGroup(_) => Status::Already,
            Self::PrivilegeDenied { .. } => Status::Denied,
            Self::OutOfResources { .. } => Status::OutOfResources,
            Self::GroupNotFound(_) => Status::NotFound,
            Self::PlatformInfoTooLarge { .. } => Status::InvalidParam,
        }
    }
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateGroup(id) => write!(f, "service group {:#06x} already registered", id),
            Self::PrivilegeDenied { group, level } => {
                write!(f, "service group {:#06x} not allowed under {}", group, level)
            }
            Self::OutOfResources { max } => {
                write!(f, "group registry full ({} groups)", max)
            }
            Self::GroupNotFound(id) => write!(f, "service group {:#06x} not registered", id),
            Self::PlatformInfoTooLarge { len, max } => {
                write!(f, "platform info blob of {} bytes exceeds {}", len, max)
            }
        }
    }
}

impl std::error::Error for ContextError {}

/// Construction-time context configuration.
#[derive(Clone, Debug)]
pub struct ContextConfig {
    /// Diagnostic name.
    pub name: String,
    /// Registry capacity, not counting the built-in base group.
    pub max_groups: usize,
    /// Privilege level requests execute under.
    pub privilege: PrivilegeLevel,
    /// Implementation id reported by the base group.
    pub impl_id: u32,
    /// Opaque platform/hardware description served by the base group.
    pub platform_info: Vec<u8>,
}

/// What a handler may ask of its context during dispatch.
///
/// Passed by reference into every `handle` call; this is the one sanctioned
/// back-reference from a group to its context.
pub struct DispatchEnv<'a> {
    ctx: &'a Context,
}

impl DispatchEnv<'_> {
    pub fn privilege(&self) -> PrivilegeLevel {
        self.ctx.privilege
    }

    /// True when a registered group provides the P2A doorbell.
    pub fn doorbell_available(&self) -> bool {
        self.ctx.doorbell.lock().is_some()
    }

    /// Version of a registered group, or 0 when the id is not present.
    pub fn probe_group_version(&self, group_id: u16) -> u32 {
        self.ctx.probe_group_version(group_id)
    }
}

struct PumpBuffers {
    request: Message,
    ack: Message,
}

/// A server-side protocol context.
pub struct Context {
    name: String,
    transport: Arc<ShmemTransport>,
    privilege: PrivilegeLevel,
    max_groups: usize,
    groups: Mutex<Vec<Arc<dyn ServiceGroup>>>,
    base: Arc<BaseGroup>,
    doorbell: Mutex<Option<Arc<dyn ServiceGroup>>>,
    buffers: Mutex<PumpBuffers>,
}

impl Context {
    pub fn new(config: ContextConfig, transport: Arc<ShmemTransport>) -> Result<Self, ContextError> {
        let payload_capacity = transport.slot_payload_size();
        let base = Arc::new(BaseGroup::new(
            config.impl_id,
            config.platform_info,
            payload_capacity,
        )?);

        tracing::info!(
            name = %config.name,
            privilege = %config.privilege,
            max_groups = config.max_groups,
            "context created"
        );

        Ok(Self {
            name: config.name,
            privilege: config.privilege,
            max_groups: config.max_groups,
            groups: Mutex::new(Vec::new()),
            base,
            doorbell: Mutex::new(None),
            buffers: Mutex::new(PumpBuffers {
                request: Message::for_slot(transport.slot_size()),
                ack: Message::for_slot(transport.slot_size()),
            }),
            transport,
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn privilege(&self) -> PrivilegeLevel {
        self.privilege
    }

    #[inline]
    pub fn transport(&self) -> &ShmemTransport {
        &self.transport
    }

    /// The built-in base group.
    pub fn base_group(&self) -> &Arc<BaseGroup> {
        &self.base
    }

    /// Register a service group.
    pub fn register_group(&self, group: Arc<dyn ServiceGroup>) -> Result<(), ContextError> {
        let info = *group.info();
        if !info.privilege.permits(self.privilege) {
            return Err(ContextError::PrivilegeDenied {
                group: info.id,
                level: self.privilege,
            });
        }

        let mut groups = self.groups.lock();
        if info.id == GROUP_ID_BASE || groups.iter().any(|g| g.info().id == info.id) {
            return Err(ContextError::DuplicateGroup(info.id));
        }
        if groups.len() >= self.max_groups {
            return Err(ContextError::OutOfResources {
                max: self.max_groups,
            });
        }

        if group.as_doorbell().is_some() {
            *self.doorbell.lock() = Some(group.clone());
        }
        tracing::info!(group = info.name, id = info.id, "service group registered");
        groups.push(group);
        Ok(())
    }

    /// Remove a registered group by id. The base group cannot be removed.
    pub fn remove_group(&self, group_id: u16) -> Result<(), ContextError> {
        let mut groups = self.groups.lock();
        let index = groups
            .iter()
            .position(|g| g.info().id == group_id)
            .ok_or(ContextError::GroupNotFound(group_id))?;
        let removed = groups.remove(index);
        drop(groups);

        let mut doorbell = self.doorbell.lock();
        if doorbell
            .as_ref()
            .is_some_and(|d| Arc::ptr_eq(d, &removed))
        {
            *doorbell = None;
        }
        tracing::info!(id = group_id, "service group removed");
        Ok(())
    }

    /// Resolve a group by wire id; the base group answers its own id.
    fn find_group(&self, group_id: u16) -> Option<Arc<dyn ServiceGroup>> {
        if group_id == GROUP_ID_BASE {
            return Some(self.base.clone() as Arc<dyn ServiceGroup>);
        }
        self.groups
            .lock()
            .iter()
            .find(|g| g.info().id == group_id)
            .cloned()
    }

    /// Version of a registered group, or 0 when absent.
    pub fn probe_group_version(&self, group_id: u16) -> u32 {
        self.find_group(group_id)
            .map(|g| g.info().version)
            .unwrap_or(0)
    }

    /// Drain the A2P request queue, acknowledging as we go.
    pub fn process_a2p_request(&self) {
        let mut buffers = self.buffers.lock();
        let PumpBuffers { request, ack } = &mut *buffers;

        loop {
            match self.transport.dequeue(QueueType::A2pRequest, request) {
                Ok(()) => {}
                Err(TransportError::QueueEmpty(_)) => break,
                Err(err) => {
                    tracing::warn!(%err, "request dequeue failed");
                    break;
                }
            }
            self.dispatch_one(request, ack);
        }
    }

    fn dispatch_one(&self, request: &Message, ack: &mut Message) {
        let header = request.header;

        let Some(group) = self.find_group(header.servicegroup_id) else {
            tracing::warn!(
                group_id = header.servicegroup_id,
                well_known = well_known_group_name(header.servicegroup_id),
                token = header.token,
                "request for unknown service group dropped"
            );
            return;
        };

        let wants_ack = match header.msg_type() {
            MessageType::NormalRequest => true,
            MessageType::PostedRequest => false,
            ty @ (MessageType::Ack | MessageType::Notification) => {
                tracing::warn!(%ty, token = header.token, "unexpected message type on A2P request queue");
                return;
            }
        };

        ack.reset();
        ack.header = MessageHeader::new(
            MessageType::Ack,
            header.servicegroup_id,
            header.service_id,
            header.token,
        );

        let order = self.transport.byte_order();
        let req = Request::new(header, request.data(), order);
        let env = DispatchEnv { ctx: self };

        let ack_len = {
            let mut writer = AckWriter::new(ack.payload_mut(), order);
            let outcome = match group.service_desc(header.service_id) {
                Some(desc) if header.datalen >= desc.min_request_len => {
                    group.handle(&env, header.service_id, &req, &mut writer)
                }
                Some(desc) => {
                    tracing::debug!(
                        group = group.info().name,
                        service = desc.name,
                        datalen = header.datalen,
                        min = desc.min_request_len,
                        "request shorter than service minimum"
                    );
                    Err(Status::NotSupported)
                }
                None => {
                    tracing::debug!(
                        group = group.info().name,
                        service_id = header.service_id,
                        "request for unknown service"
                    );
                    Err(Status::NotSupported)
                }
            };
            if let Err(status) = outcome {
                writer.reset();
                let _ = writer.put_status(status);
            }
            writer.len()
        };

        if ack.set_datalen(ack_len).is_err() {
            // AckWriter is bounded by the payload buffer, so this is
            // unreachable; recover with a bare status word regardless.
            let _ = ack.write_data(&order.u32_to(Status::ImplError.as_u32()));
        }

        if !wants_ack {
            return;
        }

        loop {
            match self.transport.enqueue(QueueType::P2aAck, ack) {
                Ok(()) => break,
                Err(err) if err.is_transient() => {
                    tracing::trace!(%err, "ack enqueue busy, retrying");
                }
                Err(err) => {
                    tracing::error!(%err, token = header.token, "ack enqueue failed");
                    return;
                }
            }
        }

        if header.doorbell() {
            let doorbell = self.doorbell.lock().clone();
            if let Some(group) = doorbell
                && let Some(injector) = group.as_doorbell()
            {
                injector.inject_p2a_doorbell();
            }
        }
    }

    /// Run one group's event processor.
    pub fn process_group_events(&self, group_id: u16) -> Result<(), ContextError> {
        let group = self
            .find_group(group_id)
            .ok_or(ContextError::GroupNotFound(group_id))?;
        self.run_events(&group);
        Ok(())
    }

    /// Run every group's event processor, in registration order.
    pub fn process_all_events(&self) {
        // Snapshot under the registry lock, call with it released.
        let groups: Vec<Arc<dyn ServiceGroup>> = self.groups.lock().clone();
        for group in &groups {
            self.run_events(group);
        }
    }

    fn run_events(&self, group: &Arc<dyn ServiceGroup>) {
        if !group.has_process_events() {
            return;
        }
        match group.process_events() {
            Ok(()) => {}
            // Busy clears on its own; the next pump pass retries.
            Err(Status::Busy) => {}
            Err(status) => {
                tracing::warn!(group = group.info().name, %status, "event processing failed");
            }
        }
    }
}
