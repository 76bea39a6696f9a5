//! Symphonia-backed MP3 frame decoder.

use std::io::{Cursor, ErrorKind};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::models::error::CodecError;
use crate::traits::frame_codec::{DecodedFrame, FrameDecoder};

/// Decodes an in-memory MP3 stream one packet per call.
///
/// Submitting a buffer probes it and reports the stream format without
/// decoding; each following call with no input yields the next frame.
#[derive(Default)]
pub struct SymphoniaFrameDecoder {
    reader: Option<Box<dyn FormatReader>>,
    decoder: Option<Box<dyn Decoder>>,
    track_id: u32,
}

impl SymphoniaFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn open(&mut self, data: Vec<u8>) -> Result<DecodedFrame, CodecError> {
        self.reader = None;
        self.decoder = None;

        let mss = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());
        let mut hint = Hint::new();
        hint.with_extension("mp3");

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| CodecError::Failed(format!("not an MP3 stream: {}", e)))?;
        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| CodecError::Failed("no decodable audio track".into()))?;
        let params = track.codec_params.clone();
        let track_id = track.id;

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| CodecError::Failed(format!("unsupported codec: {}", e)))?;

        self.track_id = track_id;
        self.reader = Some(reader);
        self.decoder = Some(decoder);

        Ok(DecodedFrame {
            samples: 0,
            sample_rate: params.sample_rate.unwrap_or(0),
            channels: params.channels.map(|c| c.count() as u16).unwrap_or(0),
        })
    }

    fn next_frame(
        &mut self,
        left: &mut Vec<i16>,
        right: &mut Vec<i16>,
    ) -> Result<DecodedFrame, CodecError> {
        let (Some(reader), Some(decoder)) = (self.reader.as_mut(), self.decoder.as_mut()) else {
            return Ok(DecodedFrame::default());
        };

        loop {
            let packet = match reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                    return Ok(DecodedFrame::default());
                }
                Err(SymphoniaError::ResetRequired) => return Ok(DecodedFrame::default()),
                Err(e) => return Err(CodecError::Failed(e.to_string())),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    log::warn!("Skipping corrupt MP3 frame: {}", e);
                    continue;
                }
                Err(e) => return Err(CodecError::Failed(e.to_string())),
            };

            let frames = decoded.frames();
            if frames == 0 {
                continue;
            }
            let spec = *decoded.spec();
            let channels = spec.channels.count();

            let mut planar = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
            planar.copy_planar_ref(decoded);
            let samples = planar.samples();

            left.extend_from_slice(&samples[..frames]);
            if channels > 1 {
                right.extend_from_slice(&samples[frames..2 * frames]);
            }

            return Ok(DecodedFrame {
                samples: frames,
                sample_rate: spec.rate,
                channels: channels as u16,
            });
        }
    }
}

impl FrameDecoder for SymphoniaFrameDecoder {
    fn decode_headers(
        &mut self,
        input: Option<&[u8]>,
        left: &mut Vec<i16>,
        right: &mut Vec<i16>,
    ) -> Result<DecodedFrame, CodecError> {
        left.clear();
        right.clear();
        match input {
            Some(data) if !data.is_empty() => self.open(data.to_vec()),
            _ => self.next_frame(left, right),
        }
    }
}
