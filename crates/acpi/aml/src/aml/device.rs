//! Device enumeration helpers built on method evaluation.
//!
//! These cover the small set of queries a kernel makes right after loading
//! tables: running `_INI` methods in namespace order, finding devices by
//! PnP ID, and decoding a device's current resource settings.

extern crate alloc;

use alloc::format;
use alloc::vec::Vec;

use super::interpreter::Interpreter;
use super::namespace::NodeHandle;
use super::path::NameSeg;
use super::value::{EisaId, Object, ObjectType};
use crate::AmlError;
use crate::handler::Handler;
use crate::resource::{Resource, decode_resource_template};

bitflags::bitflags! {
    /// Device status bits returned by `_STA`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceStatus: u32 {
        /// The device is present.
        const PRESENT = 1 << 0;
        /// The device is enabled and decoding its resources.
        const ENABLED = 1 << 1;
        /// The device should be shown in the user interface.
        const SHOWN_IN_UI = 1 << 2;
        /// The device passed its self-test.
        const FUNCTIONING = 1 << 3;
        /// A battery is present (control method batteries only).
        const BATTERY = 1 << 4;
    }
}

impl Default for DeviceStatus {
    /// A device without `_STA` is assumed present and working.
    fn default() -> Self {
        Self::PRESENT | Self::ENABLED | Self::SHOWN_IN_UI | Self::FUNCTIONING
    }
}

const STA: NameSeg = NameSeg(*b"_STA");
const INI: NameSeg = NameSeg(*b"_INI");
const HID: NameSeg = NameSeg(*b"_HID");
const CID: NameSeg = NameSeg(*b"_CID");
const CRS: NameSeg = NameSeg(*b"_CRS");

impl<H: Handler> Interpreter<H> {
    /// Evaluate a device's `_STA`, defaulting when it has none.
    ///
    /// # Errors
    ///
    /// Faults raised by `_STA`, or [`AmlError::Type`] if it does not yield
    /// an Integer.
    pub fn device_status(&self, device: NodeHandle) -> Result<DeviceStatus, AmlError> {
        let Some(sta) = self.namespace().lookup_child(device, STA) else {
            return Ok(DeviceStatus::default());
        };
        match self.evaluate_node(sta, &[])? {
            Object::Integer(v) => Ok(DeviceStatus::from_bits_truncate(v as u32)),
            other => Err(other.type_error(ObjectType::Integer)),
        }
    }

    /// Run `\_SB._INI`, then `_INI` of every present device below `\_SB`
    /// in namespace order.
    ///
    /// Children of a device that is neither present nor functioning are
    /// skipped entirely. Failing methods are logged and the device is left
    /// as it is. Returns the number of `_INI` methods that completed.
    pub fn initialize_devices(&self) -> usize {
        let ns = self.namespace();
        let Some(sb) = ns.lookup_child(ns.root(), NameSeg(*b"_SB_")) else {
            log::warn!("aml: no \\_SB scope; skipping device initialization");
            return 0;
        };

        let mut initialized = 0;
        if self.run_ini(sb) {
            initialized += 1;
        }

        ns.walk(sb, |node, _| {
            if !matches!(ns.object(node), Ok(Object::Device)) {
                return true;
            }
            let status = match self.device_status(node) {
                Ok(status) => status,
                Err(e) => {
                    log::warn!("aml: {}._STA failed: {e}", ns.path_of(node));
                    return false;
                }
            };
            if status.contains(DeviceStatus::PRESENT) {
                if self.run_ini(node) {
                    initialized += 1;
                }
                true
            } else {
                log::trace!("aml: {} not present ({status:?})", ns.path_of(node));
                status.contains(DeviceStatus::FUNCTIONING)
            }
        });

        log::info!("aml: ran {initialized} _INI method(s)");
        initialized
    }

    fn run_ini(&self, node: NodeHandle) -> bool {
        let Some(ini) = self.namespace().lookup_child(node, INI) else {
            return false;
        };
        match self.evaluate_node(ini, &[]) {
            Ok(_) => true,
            Err(e) => {
                log::warn!("aml: {}._INI failed: {e}", self.namespace().path_of(node));
                false
            }
        }
    }

    /// Every device whose `_HID` or `_CID` matches `id`, in namespace order.
    ///
    /// `id` is a PnP ID such as `"PNP0A03"` or an ACPI ID such as
    /// `"ACPI0007"`. EISA-compressed integer IDs are matched against the
    /// compressed form of `id`.
    pub fn find_devices_by_hid(&self, id: &str) -> Vec<NodeHandle> {
        let ns = self.namespace();
        let eisa = EisaId::encode(id);
        let mut found = Vec::new();
        ns.walk(ns.root(), |node, _| {
            if matches!(ns.object(node), Ok(Object::Device)) && self.device_has_id(node, id, eisa) {
                found.push(node);
            }
            true
        });
        found
    }

    fn device_has_id(&self, device: NodeHandle, id: &str, eisa: Option<EisaId>) -> bool {
        let ns = self.namespace();
        let query = |seg: NameSeg| {
            let node = ns.lookup_child(device, seg)?;
            self.evaluate_node(node, &[])
                .map_err(|e| log::debug!("aml: {}.{seg} failed: {e}", ns.path_of(device)))
                .ok()
        };
        if query(HID).is_some_and(|hid| id_matches(&hid, id, eisa)) {
            return true;
        }
        match query(CID) {
            Some(Object::Package(ids)) => ids.read().iter().any(|cid| id_matches(cid, id, eisa)),
            Some(cid) => id_matches(&cid, id, eisa),
            None => false,
        }
    }

    /// Evaluate a device's `_CRS` and decode the resource template.
    ///
    /// # Errors
    ///
    /// [`AmlError::NameNotFound`] if the device has no `_CRS`,
    /// [`AmlError::Type`] if it does not return a Buffer, otherwise faults
    /// from the method or from decoding.
    pub fn device_resources(&self, device: NodeHandle) -> Result<Vec<Resource>, AmlError> {
        let ns = self.namespace();
        let crs = ns
            .lookup_child(device, CRS)
            .ok_or_else(|| AmlError::NameNotFound(format!("{}._CRS", ns.path_of(device))))?;
        match self.evaluate_node(crs, &[])? {
            Object::Buffer(bytes) => decode_resource_template(&bytes.read()),
            other => Err(other.type_error(ObjectType::Buffer)),
        }
    }
}

/// Whether a `_HID`/`_CID` value names `id`.
fn id_matches(value: &Object, id: &str, eisa: Option<EisaId>) -> bool {
    match value {
        Object::Integer(raw) => eisa.is_some_and(|e| u64::from(e.raw) == *raw),
        Object::String(s) => s == id,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sta_means_present_and_functioning() {
        let status = DeviceStatus::default();
        assert_eq!(status.bits(), 0x0F);
        assert!(status.contains(DeviceStatus::PRESENT | DeviceStatus::FUNCTIONING));
        assert!(!status.contains(DeviceStatus::BATTERY));
    }

    #[test]
    fn unknown_status_bits_are_dropped() {
        let status = DeviceStatus::from_bits_truncate(0xF9);
        assert_eq!(
            status,
            DeviceStatus::PRESENT | DeviceStatus::FUNCTIONING | DeviceStatus::BATTERY
        );
    }

    #[test]
    fn ids_match_in_either_form() {
        let eisa = EisaId::encode("PNP0A03");
        assert!(id_matches(&Object::Integer(0x030A_D041), "PNP0A03", eisa));
        assert!(id_matches(&Object::string("PNP0A03"), "PNP0A03", eisa));
        assert!(!id_matches(&Object::Integer(0x080A_D041), "PNP0A03", eisa));
        assert!(!id_matches(&Object::string("ACPI0007"), "PNP0A03", eisa));
        assert!(!id_matches(&Object::Integer(0), "ACPI0007", EisaId::encode("ACPI0007")));
    }
}
