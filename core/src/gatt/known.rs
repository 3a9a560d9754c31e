//! Bluetooth SIG assigned numbers for common attributes.

use uuid::Uuid;

/// `0000xxxx-0000-1000-8000-00805F9B34FB`
const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5F9B_34FB;

/// Expand a 16-bit assigned number onto the Bluetooth base UUID.
pub const fn uuid_from_u16(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

/// The 16-bit assigned number, if `uuid` lies on the Bluetooth base UUID.
pub fn short_id(uuid: &Uuid) -> Option<u16> {
    let value = uuid.as_u128();
    let short = (value >> 96) as u32;
    if value & !(0xFFFF_FFFFu128 << 96) == BLUETOOTH_BASE_UUID && short <= u16::MAX as u32 {
        Some(short as u16)
    } else {
        None
    }
}

pub const CLIENT_CHARACTERISTIC_CONFIGURATION: Uuid = uuid_from_u16(0x2902);

pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];
pub const ENABLE_INDICATION_VALUE: [u8; 2] = [0x02, 0x00];
pub const DISABLE_NOTIFICATION_VALUE: [u8; 2] = [0x00, 0x00];

const SERVICES: &[(u16, &str)] = &[
    (0x1800, "Generic Access"),
    (0x1801, "Generic Attribute"),
    (0x1802, "Immediate Alert"),
    (0x1803, "Link Loss"),
    (0x1804, "Tx Power"),
    (0x1805, "Current Time Service"),
    (0x180A, "Device Information"),
    (0x180D, "Heart Rate"),
    (0x180F, "Battery Service"),
    (0x1809, "Health Thermometer"),
    (0x1810, "Blood Pressure"),
    (0x1812, "Human Interface Device"),
    (0x1816, "Cycling Speed and Cadence"),
    (0x1818, "Cycling Power"),
    (0x1819, "Location and Navigation"),
    (0x181A, "Environmental Sensing"),
    (0x181C, "User Data"),
    (0x181D, "Weight Scale"),
];

const CHARACTERISTICS: &[(u16, &str)] = &[
    (0x2A00, "Device Name"),
    (0x2A01, "Appearance"),
    (0x2A04, "Peripheral Preferred Connection Parameters"),
    (0x2A05, "Service Changed"),
    (0x2A06, "Alert Level"),
    (0x2A07, "Tx Power Level"),
    (0x2A19, "Battery Level"),
    (0x2A1C, "Temperature Measurement"),
    (0x2A23, "System ID"),
    (0x2A24, "Model Number String"),
    (0x2A25, "Serial Number String"),
    (0x2A26, "Firmware Revision String"),
    (0x2A27, "Hardware Revision String"),
    (0x2A28, "Software Revision String"),
    (0x2A29, "Manufacturer Name String"),
    (0x2A2B, "Current Time"),
    (0x2A35, "Blood Pressure Measurement"),
    (0x2A37, "Heart Rate Measurement"),
    (0x2A38, "Body Sensor Location"),
    (0x2A39, "Heart Rate Control Point"),
    (0x2A4D, "Report"),
    (0x2A50, "PnP ID"),
    (0x2A5B, "CSC Measurement"),
    (0x2A63, "Cycling Power Measurement"),
    (0x2A6E, "Temperature"),
    (0x2A6F, "Humidity"),
    (0x2A9D, "Weight Measurement"),
];

const DESCRIPTORS: &[(u16, &str)] = &[
    (0x2900, "Characteristic Extended Properties"),
    (0x2901, "Characteristic User Description"),
    (0x2902, "Client Characteristic Configuration"),
    (0x2903, "Server Characteristic Configuration"),
    (0x2904, "Characteristic Presentation Format"),
    (0x2905, "Characteristic Aggregate Format"),
    (0x2906, "Valid Range"),
    (0x2908, "Report Reference"),
];

fn lookup(table: &[(u16, &'static str)], uuid: &Uuid) -> Option<&'static str> {
    let short = short_id(uuid)?;
    table
        .iter()
        .find(|(id, _)| *id == short)
        .map(|(_, name)| *name)
}

pub fn service_name(uuid: &Uuid) -> Option<&'static str> {
    lookup(SERVICES, uuid)
}

pub fn characteristic_name(uuid: &Uuid) -> Option<&'static str> {
    lookup(CHARACTERISTICS, uuid)
}

pub fn descriptor_name(uuid: &Uuid) -> Option<&'static str> {
    lookup(DESCRIPTORS, uuid)
}
