//! Device enumeration over a cpal host.
//!
//! Devices are addressed by their position in `Host::devices()`. cpal does
//! not guarantee stable ordering across calls, so every lookup by index also
//! checks the name recorded when the list was taken.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::SupportedBufferSize;

use audio_stream_core::models::audio_models::DeviceInfo;
use audio_stream_core::models::error::DriverError;

use crate::error::CpalError;

/// Latency reported when the host does not expose a buffer size range.
pub const FALLBACK_LATENCY_SECONDS: f64 = 0.01;

/// Snapshot of the host's devices, in `Host::devices()` order.
pub(crate) fn list_devices(host: &cpal::Host) -> Result<Vec<DeviceInfo>, CpalError> {
    let devices: Vec<DeviceInfo> = host
        .devices()?
        .map(|device| describe(&device))
        .collect();
    log::info!("Enumerated {} audio devices on host {:?}", devices.len(), host.id());
    Ok(devices)
}

/// Describe one device. Failed queries degrade to zero channels rather than
/// dropping the device, so indices stay aligned with `Host::devices()`.
pub(crate) fn describe(device: &cpal::Device) -> DeviceInfo {
    let name = device.name().unwrap_or_else(|e| {
        log::debug!("Could not read device name: {}", e);
        "Unknown".to_string()
    });

    let max_input_channels = device
        .supported_input_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0);
    let max_output_channels = device
        .supported_output_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0);

    let input_default = device.default_input_config().ok();
    let output_default = device.default_output_config().ok();

    let default_sample_rate = input_default
        .as_ref()
        .or(output_default.as_ref())
        .map(|c| f64::from(c.sample_rate().0))
        .unwrap_or(0.0);

    let latency_of = |config: Option<&cpal::SupportedStreamConfig>| {
        config
            .map(|c| low_latency_seconds(c.buffer_size(), c.sample_rate().0))
            .unwrap_or(FALLBACK_LATENCY_SECONDS)
    };

    DeviceInfo {
        name,
        max_input_channels,
        max_output_channels,
        default_sample_rate,
        default_low_input_latency: latency_of(input_default.as_ref()),
        default_low_output_latency: latency_of(output_default.as_ref()),
    }
}

/// Smallest buffer the host allows, as seconds of audio.
pub(crate) fn low_latency_seconds(buffer_size: &SupportedBufferSize, sample_rate: u32) -> f64 {
    match buffer_size {
        SupportedBufferSize::Range { min, .. } if *min > 0 && sample_rate > 0 => {
            f64::from(*min) / f64::from(sample_rate)
        }
        _ => FALLBACK_LATENCY_SECONDS,
    }
}

/// Position of the host default device in `devices`, if it has channels in
/// the wanted direction.
pub(crate) fn default_index(
    devices: &[DeviceInfo],
    default: Option<cpal::Device>,
    has_channels: impl Fn(&DeviceInfo) -> bool,
) -> Option<usize> {
    let name = default?.name().ok()?;
    devices
        .iter()
        .position(|info| info.name == name && has_channels(info))
}

/// Re-resolve a device by index, checking it is still the one named.
pub(crate) fn find_device(
    host: &cpal::Host,
    index: usize,
    name: &str,
) -> Result<cpal::Device, DriverError> {
    let device = host
        .devices()
        .map_err(CpalError::from)?
        .nth(index)
        .ok_or(DriverError::InvalidDevice(index))?;

    match device.name() {
        Ok(actual) if actual == name => Ok(device),
        Ok(actual) => {
            log::warn!(
                "Device at index {} is now '{}', expected '{}'",
                index,
                actual,
                name
            );
            Err(DriverError::InvalidDevice(index))
        }
        Err(e) => Err(DriverError::Host(format!("could not read device name: {}", e))),
    }
}
