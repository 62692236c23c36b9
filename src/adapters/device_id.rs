//! Device identity derived from the primary network interface MAC.
//!
//! Produces a stable, human-readable device ID in the form `LW-XXYYZZ`
//! (last 3 bytes of the 6-byte MAC in uppercase hex).  Used when the
//! configuration leaves `device_id` empty.

use std::fs;
use std::path::Path;

use log::{info, warn};

/// Fixed-size device ID string: "LW-XXYYZZ".
pub type DeviceIdString = heapless::String<16>;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

const SYSFS_NET: &str = "/sys/class/net";

/// Used when no interface exposes a usable MAC.
const FALLBACK_MAC: MacAddress = [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE];

/// Parse `aa:bb:cc:dd:ee:ff`.
pub fn parse_mac(text: &str) -> Option<MacAddress> {
    let mut mac = [0u8; 6];
    let mut parts = text.trim().split(':');
    for byte in &mut mac {
        *byte = u8::from_str_radix(parts.next()?, 16).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(mac)
}

/// MAC of the first non-loopback interface (by name) under `root`.
pub fn read_mac_from(root: &Path) -> Option<MacAddress> {
    let mut names: Vec<String> = fs::read_dir(root)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n != "lo")
        .collect();
    names.sort();
    names.iter().find_map(|name| {
        let text = fs::read_to_string(root.join(name).join("address")).ok()?;
        parse_mac(&text).filter(|m| *m != [0; 6])
    })
}

/// Primary interface MAC, or a fixed fallback.
pub fn read_mac() -> MacAddress {
    read_mac_from(Path::new(SYSFS_NET)).unwrap_or_else(|| {
        warn!("device_id: no interface MAC found, using fallback");
        FALLBACK_MAC
    })
}

/// Derive the short device ID from the last 3 MAC bytes.
/// Format: `LW-XXYYZZ` (e.g., `LW-EFCAFE`).
pub fn device_id(mac: &MacAddress) -> DeviceIdString {
    let mut id = DeviceIdString::new();
    use core::fmt::Write;
    let _ = write!(id, "LW-{:02X}{:02X}{:02X}", mac[3], mac[4], mac[5]);
    id
}

/// The configured ID, or one derived from the MAC when it is empty.
pub fn resolve(configured: &str) -> String {
    if !configured.trim().is_empty() {
        return configured.trim().to_string();
    }
    let id = device_id(&read_mac());
    info!("device_id: derived '{}'", id);
    id.as_str().to_string()
}
