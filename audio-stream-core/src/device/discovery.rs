use crate::models::audio_models::{DeviceDescriptor, DeviceKind};
use crate::traits::audio_driver::AudioDriver;

/// List every device as a microphone and/or speaker descriptor.
///
/// A device with input channels yields a `microphone-N` entry and one with
/// output channels a `speaker-N` entry, where N is the 1-based device index.
pub fn discover(driver: &dyn AudioDriver) -> Vec<DeviceDescriptor> {
    let count = driver.device_count();
    if count == 0 {
        log::warn!("No audio devices found during discovery");
        return Vec::new();
    }
    log::info!("Discovery found {} audio devices", count);

    let mut descriptors = Vec::new();
    for index in 0..count {
        let Some(info) = driver.device_info(index) else {
            log::warn!("could not get device info for device index {}, skipping", index);
            continue;
        };
        let sample_rate = info.default_sample_rate.round() as u32;

        if info.max_input_channels > 0 {
            log::info!(
                "Microphone {} - Name: {}, default sample rate: {}, max channels: {}",
                index + 1,
                info.name,
                sample_rate,
                info.max_input_channels
            );
            descriptors.push(DeviceDescriptor {
                kind: DeviceKind::Microphone,
                name: format!("microphone-{}", index + 1),
                device_name: info.name.clone(),
                sample_rate,
                num_channels: info.max_input_channels,
            });
        }
        if info.max_output_channels > 0 {
            log::info!(
                "Speaker {} - Name: {}, default sample rate: {}, max channels: {}",
                index + 1,
                info.name,
                sample_rate,
                info.max_output_channels
            );
            descriptors.push(DeviceDescriptor {
                kind: DeviceKind::Speaker,
                name: format!("speaker-{}", index + 1),
                device_name: info.name.clone(),
                sample_rate,
                num_channels: info.max_output_channels,
            });
        }
    }
    descriptors
}
