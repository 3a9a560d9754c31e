/// Remote peripherals: identity, advertisement data and per-link lifecycle.
pub mod advertisement;
pub mod id;
pub mod link;
pub mod peripheral;

pub use advertisement::{AdvertisementRecord, AdvertisementRecordType};
pub use id::DeviceId;
pub use link::LinkHandle;
pub use peripheral::{Device, DeviceState};

pub(crate) use link::LinkScope;
