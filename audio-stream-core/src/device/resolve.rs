//! Turn user attributes into concrete stream parameters for one device.

use crate::models::audio_models::DeviceInfo;
use crate::models::config::StreamConfig;
use crate::models::error::StreamError;
use crate::models::params::{StreamDirection, StreamParameters};
use crate::traits::audio_driver::AudioDriver;

fn channels_for(info: &DeviceInfo, direction: StreamDirection) -> u16 {
    match direction {
        StreamDirection::Capture => info.max_input_channels,
        StreamDirection::Render => info.max_output_channels,
    }
}

/// Find a device whose name matches exactly and that has channels in the
/// requested direction. Input and output devices may share a name.
pub fn find_device_by_name(
    driver: &dyn AudioDriver,
    name: &str,
    direction: StreamDirection,
) -> Option<(usize, DeviceInfo)> {
    (0..driver.device_count()).find_map(|index| {
        let Some(info) = driver.device_info(index) else {
            log::warn!("could not get device info for device index {}, skipping", index);
            return None;
        };
        (info.name == name && channels_for(&info, direction) > 0).then_some((index, info))
    })
}

fn default_device(
    driver: &dyn AudioDriver,
    direction: StreamDirection,
) -> Result<(usize, DeviceInfo), StreamError> {
    let index = match direction {
        StreamDirection::Capture => driver.default_input_device(),
        StreamDirection::Render => driver.default_output_device(),
    }
    .ok_or_else(|| StreamError::DeviceNotAvailable(format!("no default {:?} device", direction)))?;

    let info = driver.device_info(index).ok_or_else(|| {
        StreamError::DeviceNotAvailable(format!("default device index {} has no info", index))
    })?;
    Ok((index, info))
}

/// Resolve `config` against the driver's devices.
///
/// - no device name: the host default for `direction`
/// - no sample rate: the device default
/// - no channel count: mono
/// - latency 0 or unset: the device's default low latency
pub fn resolve_stream_parameters(
    driver: &dyn AudioDriver,
    config: &StreamConfig,
    direction: StreamDirection,
) -> Result<StreamParameters, StreamError> {
    config.validate().map_err(StreamError::ConfigurationFailed)?;

    let (device_index, info) = match config.device_name.as_deref() {
        Some(name) => find_device_by_name(driver, name, direction).ok_or_else(|| {
            StreamError::DeviceNotAvailable(format!(
                "audio {:?} device with name '{}' not found",
                direction, name
            ))
        })?,
        None => default_device(driver, direction)?,
    };

    let sample_rate = match config.sample_rate {
        Some(rate) => rate,
        None => info.default_sample_rate.round() as u32,
    };
    if sample_rate == 0 {
        return Err(StreamError::ConfigurationFailed(format!(
            "device '{}' reports no default sample rate",
            info.name
        )));
    }

    let latency_seconds = match config.latency_seconds() {
        l if l > 0.0 => l,
        _ => match direction {
            StreamDirection::Capture => info.default_low_input_latency,
            StreamDirection::Render => info.default_low_output_latency,
        },
    };

    Ok(StreamParameters {
        device_name: info.name,
        device_index,
        direction,
        sample_rate,
        num_channels: config.num_channels.unwrap_or(1),
        latency_seconds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDriver;
    use approx::assert_relative_eq;

    fn driver() -> MockDriver {
        MockDriver::with_devices(vec![
            MockDriver::output_device("Shared", 2, 48000.0),
            MockDriver::input_device("Shared", 2, 44100.0),
            MockDriver::input_device("Default Mic", 1, 16000.0),
        ])
        .with_defaults(Some(2), Some(0))
    }

    #[test]
    fn name_lookup_requires_matching_direction() {
        let d = driver();
        assert_eq!(find_device_by_name(&d, "Shared", StreamDirection::Capture).unwrap().0, 1);
        assert_eq!(find_device_by_name(&d, "Shared", StreamDirection::Render).unwrap().0, 0);
        assert!(find_device_by_name(&d, "Missing", StreamDirection::Capture).is_none());
    }

    #[test]
    fn empty_config_uses_defaults() {
        let params =
            resolve_stream_parameters(&driver(), &StreamConfig::default(), StreamDirection::Capture)
                .unwrap();

        assert_eq!(params.device_index, 2);
        assert_eq!(params.device_name, "Default Mic");
        assert_eq!(params.sample_rate, 16000);
        assert_eq!(params.num_channels, 1);
        assert_relative_eq!(params.latency_seconds, MockDriver::DEFAULT_LATENCY);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = StreamConfig {
            device_name: Some("Shared".into()),
            sample_rate: Some(22050),
            num_channels: Some(2),
            latency: Some(50.0),
        };
        let params =
            resolve_stream_parameters(&driver(), &config, StreamDirection::Capture).unwrap();

        assert_eq!(params.device_index, 1);
        assert_eq!(params.sample_rate, 22050);
        assert_eq!(params.num_channels, 2);
        assert_relative_eq!(params.latency_seconds, 0.05);
    }

    #[test]
    fn unknown_device_is_not_available() {
        let config = StreamConfig {
            device_name: Some("Nope".into()),
            ..Default::default()
        };
        let err =
            resolve_stream_parameters(&driver(), &config, StreamDirection::Capture).unwrap_err();
        assert!(matches!(err, StreamError::DeviceNotAvailable(msg) if msg.contains("Nope")));
    }

    #[test]
    fn missing_default_device_is_not_available() {
        let d = MockDriver::with_devices(Vec::new());
        let err = resolve_stream_parameters(&d, &StreamConfig::default(), StreamDirection::Render)
            .unwrap_err();
        assert!(matches!(err, StreamError::DeviceNotAvailable(_)));
    }

    #[test]
    fn invalid_config_fails_before_lookup() {
        let config = StreamConfig {
            sample_rate: Some(0),
            ..Default::default()
        };
        let err =
            resolve_stream_parameters(&driver(), &config, StreamDirection::Capture).unwrap_err();
        assert!(matches!(err, StreamError::ConfigurationFailed(_)));
    }
}
