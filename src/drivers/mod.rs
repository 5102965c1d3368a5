// Radio driver framework
pub mod registry;
pub mod traits;

// Drivers
pub mod uv5r;

pub use registry::{get_driver, list_drivers, register_driver, DriverInfo};
pub use traits::{CloneModeRadio, Radio, RadioError, RadioResult, Status, StatusCallback};
pub use uv5r::UV5RRadio;

/// Register every built-in driver.
///
/// Call once at startup before querying the registry.
pub fn init_drivers() {
    register_driver(DriverInfo::new(
        uv5r::VENDOR,
        uv5r::MODEL,
        "Dual-band handheld (VHF/UHF, FM only)",
        true,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_drivers() {
        init_drivers();

        let uv5r = get_driver("Baofeng", "UV-5R").expect("UV-5R not registered");
        assert!(uv5r.is_clone_mode);
        assert!(list_drivers().iter().any(|d| d.vendor == "Baofeng"));
    }
}
