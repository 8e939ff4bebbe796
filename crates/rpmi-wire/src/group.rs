//! Well-known service-group ids.
//!
//! Only the first four have implementations in this workspace; the rest are
//! reserved assignments that extended groups use. Probing an unregistered
//! id returns version 0.

/// Built-in enumeration / version / platform-info group.
pub const GROUP_ID_BASE: u16 = 0x0001;
/// System shutdown and reboot.
pub const GROUP_ID_SYSTEM_RESET: u16 = 0x0002;
/// Hart state management.
pub const GROUP_ID_HSM: u16 = 0x0003;
/// System MSI routing and the P2A doorbell.
pub const GROUP_ID_SYSTEM_MSI: u16 = 0x0004;
/// System suspend (reserved).
pub const GROUP_ID_SYSTEM_SUSPEND: u16 = 0x0005;
/// Clock control (reserved).
pub const GROUP_ID_CLOCK: u16 = 0x0006;
/// Voltage control (reserved).
pub const GROUP_ID_VOLTAGE: u16 = 0x0007;
/// Performance domains (reserved).
pub const GROUP_ID_PERFORMANCE: u16 = 0x0008;
/// Collaborative processor performance control (reserved).
pub const GROUP_ID_CPPC: u16 = 0x0009;
/// Device power domains (reserved).
pub const GROUP_ID_DEVICE_POWER: u16 = 0x000A;
/// Management-mode / EFI variable store (reserved).
pub const GROUP_ID_MM: u16 = 0x000B;

/// Diagnostic name for a well-known group id.
pub fn well_known_group_name(id: u16) -> Option<&'static str> {
    Some(match id {
        GROUP_ID_BASE => "base",
        GROUP_ID_SYSTEM_RESET => "system-reset",
        GROUP_ID_HSM => "hsm",
        GROUP_ID_SYSTEM_MSI => "system-msi",
        GROUP_ID_SYSTEM_SUSPEND => "system-suspend",
        GROUP_ID_CLOCK => "clock",
        GROUP_ID_VOLTAGE => "voltage",
        GROUP_ID_PERFORMANCE => "performance",
        GROUP_ID_CPPC => "cppc",
        GROUP_ID_DEVICE_POWER => "device-power",
        GROUP_ID_MM => "mm",
        _ => return None,
    })
}
