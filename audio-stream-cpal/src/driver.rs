use cpal::traits::{DeviceTrait, HostTrait};
use cpal::SampleFormat;
use parking_lot::RwLock;

use audio_stream_core::models::audio_models::DeviceInfo;
use audio_stream_core::models::error::DriverError;
use audio_stream_core::models::params::{StreamDirection, StreamParameters};
use audio_stream_core::traits::audio_driver::{AudioDriver, NativeStream, StreamCallback};

use crate::device::{default_index, find_device, list_devices};
use crate::error::CpalError;
use crate::stream::CpalStream;

#[derive(Default)]
struct DeviceSnapshot {
    initialized: bool,
    devices: Vec<DeviceInfo>,
    default_input: Option<usize>,
    default_output: Option<usize>,
}

/// [`AudioDriver`] over one cpal host.
///
/// Device queries answer from a snapshot taken by [`initialize`]; call it
/// again to pick up hot-plugged devices. Stream operations always go back
/// to the host.
///
/// [`initialize`]: AudioDriver::initialize
pub struct CpalDriver {
    host_id: cpal::HostId,
    snapshot: RwLock<DeviceSnapshot>,
}

impl CpalDriver {
    /// Driver for the platform default host, already initialized.
    pub fn new() -> Result<Self, DriverError> {
        Self::with_host(cpal::default_host().id())
    }

    pub fn with_host(host_id: cpal::HostId) -> Result<Self, DriverError> {
        let driver = Self {
            host_id,
            snapshot: RwLock::new(DeviceSnapshot::default()),
        };
        driver.initialize()?;
        Ok(driver)
    }

    pub fn host_id(&self) -> cpal::HostId {
        self.host_id
    }

    fn host(&self) -> Result<cpal::Host, CpalError> {
        Ok(cpal::host_from_id(self.host_id)?)
    }

    /// The sample format a stream with `params` will run in.
    fn sample_format(&self, params: &StreamParameters) -> Result<SampleFormat, DriverError> {
        let host = self.host()?;
        let device = find_device(&host, params.device_index, &params.device_name)?;

        let formats: Vec<SampleFormat> = match params.direction {
            StreamDirection::Capture => device
                .supported_input_configs()
                .map_err(CpalError::from)?
                .filter(|c| {
                    range_matches(c.channels(), c.min_sample_rate().0, c.max_sample_rate().0, params)
                })
                .map(|c| c.sample_format())
                .collect(),
            StreamDirection::Render => device
                .supported_output_configs()
                .map_err(CpalError::from)?
                .filter(|c| {
                    range_matches(c.channels(), c.min_sample_rate().0, c.max_sample_rate().0, params)
                })
                .map(|c| c.sample_format())
                .collect(),
        };

        preferred_format(&formats).ok_or_else(|| {
            DriverError::FormatNotSupported(format!(
                "no 16-bit or float configuration with {} channel(s) at {} Hz",
                params.num_channels, params.sample_rate
            ))
        })
    }
}

fn range_matches(channels: u16, min_rate: u32, max_rate: u32, params: &StreamParameters) -> bool {
    channels == params.num_channels && (min_rate..=max_rate).contains(&params.sample_rate)
}

/// Native 16-bit when offered, float otherwise.
fn preferred_format(formats: &[SampleFormat]) -> Option<SampleFormat> {
    [SampleFormat::I16, SampleFormat::F32]
        .into_iter()
        .find(|wanted| formats.contains(wanted))
}

impl AudioDriver for CpalDriver {
    fn initialize(&self) -> Result<(), DriverError> {
        let host = self.host()?;
        let devices = list_devices(&host)?;
        let default_input = default_index(&devices, host.default_input_device(), |d| {
            d.max_input_channels > 0
        });
        let default_output = default_index(&devices, host.default_output_device(), |d| {
            d.max_output_channels > 0
        });

        for (index, info) in devices.iter().enumerate() {
            log::debug!(
                "Device {}: '{}' ({} in, {} out, {} Hz)",
                index,
                info.name,
                info.max_input_channels,
                info.max_output_channels,
                info.default_sample_rate
            );
        }

        *self.snapshot.write() = DeviceSnapshot {
            initialized: true,
            devices,
            default_input,
            default_output,
        };
        Ok(())
    }

    fn terminate(&self) -> Result<(), DriverError> {
        *self.snapshot.write() = DeviceSnapshot::default();
        log::debug!("cpal driver terminated");
        Ok(())
    }

    fn device_count(&self) -> usize {
        self.snapshot.read().devices.len()
    }

    fn device_info(&self, index: usize) -> Option<DeviceInfo> {
        self.snapshot.read().devices.get(index).cloned()
    }

    fn default_input_device(&self) -> Option<usize> {
        self.snapshot.read().default_input
    }

    fn default_output_device(&self) -> Option<usize> {
        self.snapshot.read().default_output
    }

    fn is_format_supported(&self, params: &StreamParameters) -> Result<(), DriverError> {
        self.sample_format(params).map(|_| ())
    }

    fn open_stream(
        &self,
        params: &StreamParameters,
        callback: StreamCallback,
    ) -> Result<Box<dyn NativeStream>, DriverError> {
        if !self.snapshot.read().initialized {
            return Err(DriverError::NotInitialized);
        }
        let format = self.sample_format(params)?;
        let stream = CpalStream::open(self.host_id, params, format, callback)?;
        Ok(Box::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audio_stream_core::models::audio_models::AudioInfo;
    use audio_stream_core::processing::callback::bind_capture;
    use audio_stream_core::processing::stream_context::CaptureContext;
    use std::sync::Arc;
    use std::time::Duration;

    fn params(channels: u16, rate: u32) -> StreamParameters {
        StreamParameters {
            device_name: "Test".into(),
            device_index: 0,
            direction: StreamDirection::Capture,
            sample_rate: rate,
            num_channels: channels,
            latency_seconds: 0.01,
        }
    }

    #[test]
    fn prefers_i16_over_f32() {
        assert_eq!(
            preferred_format(&[SampleFormat::F32, SampleFormat::I16]),
            Some(SampleFormat::I16)
        );
        assert_eq!(preferred_format(&[SampleFormat::F32]), Some(SampleFormat::F32));
        assert_eq!(preferred_format(&[SampleFormat::U8]), None);
    }

    #[test]
    fn range_needs_exact_channels_and_contained_rate() {
        let p = params(2, 44100);
        assert!(range_matches(2, 8000, 96000, &p));
        assert!(!range_matches(1, 8000, 96000, &p));
        assert!(!range_matches(2, 48000, 96000, &p));
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn enumerates_devices() {
        let _ = env_logger::builder().is_test(true).try_init();
        let driver = CpalDriver::new().unwrap();
        assert!(driver.device_count() > 0);
        for index in 0..driver.device_count() {
            assert!(driver.device_info(index).is_some());
        }
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn captures_from_default_input() {
        let _ = env_logger::builder().is_test(true).try_init();
        let driver = CpalDriver::new().unwrap();
        let index = driver.default_input_device().unwrap();
        let info = driver.device_info(index).unwrap();
        let params = StreamParameters {
            device_name: info.name.clone(),
            device_index: index,
            direction: StreamDirection::Capture,
            sample_rate: info.default_sample_rate as u32,
            num_channels: 1,
            latency_seconds: info.default_low_input_latency,
        };
        let ctx = Arc::new(CaptureContext::new(
            AudioInfo::pcm16(params.sample_rate, 1),
            1.0,
        ));

        let mut stream = driver
            .open_stream(&params, bind_capture(Arc::clone(&ctx)))
            .unwrap();
        stream.start().unwrap();
        std::thread::sleep(Duration::from_millis(300));
        stream.stop().unwrap();
        stream.close().unwrap();
        stream.close().unwrap();

        assert!(ctx.buffer().current_write_position() > 0);
        assert!(ctx.anchor().is_some());
    }
}
