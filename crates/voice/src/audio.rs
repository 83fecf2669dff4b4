use crate::config::AudioConfig;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::io::Cursor;
use tracing::{debug, warn};
use waypoint_common::{Result, WaypointError};

/// Lowest WAV sample rate accepted for normalisation.
pub const MIN_SAMPLE_RATE: u32 = 4000;

/// Container formats recognised by their leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Ogg,
    WebM,
    Mp3,
    Flac,
    Unknown,
}

impl AudioFormat {
    pub fn detect(data: &[u8]) -> Self {
        if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WAVE" {
            AudioFormat::Wav
        } else if data.starts_with(b"OggS") {
            AudioFormat::Ogg
        } else if data.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
            AudioFormat::WebM
        } else if data.starts_with(b"fLaC") {
            AudioFormat::Flac
        } else if data.starts_with(b"ID3") || (data.len() >= 2 && data[0] == 0xFF && data[1] & 0xE0 == 0xE0) {
            AudioFormat::Mp3
        } else {
            AudioFormat::Unknown
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav | AudioFormat::Unknown => "wav",
            AudioFormat::Ogg => "ogg",
            AudioFormat::WebM => "webm",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Flac => "flac",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Wav | AudioFormat::Unknown => "audio/wav",
            AudioFormat::Ogg => "audio/ogg",
            AudioFormat::WebM => "audio/webm",
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Flac => "audio/flac",
        }
    }
}

/// Audio ready to hand to a transcription provider.
#[derive(Debug, Clone)]
pub struct PreparedAudio {
    pub data: Vec<u8>,
    pub format: AudioFormat,
}

impl PreparedAudio {
    pub fn file_name(&self) -> String {
        format!("audio.{}", self.format.extension())
    }
}

pub struct AudioProcessor {
    config: AudioConfig,
}

impl AudioProcessor {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    pub fn decode_base64(&self, encoded: &str) -> Result<Vec<u8>> {
        let payload = strip_data_url(encoded.trim());
        let data = STANDARD
            .decode(payload)
            .map_err(|_| WaypointError::BadRequest("Invalid base64 audio data".to_string()))?;

        if data.len() > self.config.max_bytes {
            return Err(WaypointError::BadRequest(format!(
                "Audio exceeds the {} byte limit",
                self.config.max_bytes
            )));
        }
        Ok(data)
    }

    /// Decodes base64 audio and prepares it for transcription.
    pub fn prepare_base64(&self, encoded: &str) -> Result<PreparedAudio> {
        let data = self.decode_base64(encoded)?;
        self.prepare(data)
    }

    /// WAV is normalised to mono 16-bit PCM at the configured rate. Other
    /// containers pass through for the provider to decode.
    pub fn prepare(&self, data: Vec<u8>) -> Result<PreparedAudio> {
        if data.is_empty() {
            return Err(WaypointError::BadRequest("No audio data provided".to_string()));
        }

        let format = AudioFormat::detect(&data);
        debug!("Preparing {} bytes of {:?} audio", data.len(), format);

        match format {
            AudioFormat::Wav => Ok(PreparedAudio {
                data: self.normalize_wav(&data)?,
                format,
            }),
            AudioFormat::Unknown => {
                warn!("Unrecognised audio container, sending as-is");
                Ok(PreparedAudio { data, format })
            }
            _ => Ok(PreparedAudio { data, format }),
        }
    }

    fn normalize_wav(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut reader = hound::WavReader::new(Cursor::new(data))
            .map_err(|e| WaypointError::VoiceProcessing(format!("Unsupported audio format: {}", e)))?;
        let spec = reader.spec();
        if spec.sample_rate < MIN_SAMPLE_RATE {
            return Err(WaypointError::BadRequest(format!(
                "Unsupported sample rate: {} Hz",
                spec.sample_rate
            )));
        }
        let channels = spec.channels.max(1) as usize;

        // Frames past the duration limit are never decoded.
        let max_frames = self.config.max_duration_seconds as usize * spec.sample_rate as usize;
        if reader.duration() as usize > max_frames {
            warn!(
                "Audio duration {:.1}s exceeds limit {}s, trimming",
                reader.duration() as f32 / spec.sample_rate as f32,
                self.config.max_duration_seconds
            );
        }
        let max_values = max_frames.saturating_mul(channels);

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .take(max_values)
                .collect::<std::result::Result<_, _>>()
                .map_err(wav_error)?,
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .samples::<i32>()
                    .take(max_values)
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(wav_error)?
            }
        };

        let mono = downmix(&interleaved, channels);
        let mut resampled = resample_linear(&mono, spec.sample_rate, self.config.sample_rate);
        resampled.truncate(self.config.max_duration_seconds as usize * self.config.sample_rate as usize);

        encode_pcm16(&resampled, self.config.sample_rate)
    }
}

fn wav_error(e: hound::Error) -> WaypointError {
    WaypointError::VoiceProcessing(format!("Unsupported audio format: {}", e))
}

fn strip_data_url(encoded: &str) -> &str {
    if encoded.starts_with("data:") {
        if let Some((_, payload)) = encoded.split_once(',') {
            return payload;
        }
    }
    encoded
}

fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).floor() as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos.floor() as usize;
            let frac = (pos - idx as f64) as f32;
            let a = samples[idx.min(last)];
            let b = samples[(idx + 1).min(last)];
            a + (b - a) * frac
        })
        .collect()
}

fn encode_pcm16(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut buffer = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut buffer), spec).map_err(wav_error)?;
        for &sample in samples {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer.write_sample(value).map_err(wav_error)?;
        }
        writer.finalize().map_err(wav_error)?;
    }
    Ok(buffer)
}

/// Silent mono 16-bit WAV, used to probe transcription providers.
pub fn silent_wav(seconds: u32, sample_rate: u32) -> Result<Vec<u8>> {
    encode_pcm16(&vec![0.0; (seconds * sample_rate) as usize], sample_rate)
}

pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn wav(channels: u16, sample_rate: u32, frames: usize) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut buffer = Vec::new();
        {
            let mut writer = hound::WavWriter::new(Cursor::new(&mut buffer), spec).unwrap();
            for i in 0..frames * channels as usize {
                writer.write_sample(((i % 100) as i16) * 100).unwrap();
            }
            writer.finalize().unwrap();
        }
        buffer
    }

    fn processor() -> AudioProcessor {
        AudioProcessor::new(&AudioConfig::default())
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(AudioFormat::detect(&wav(1, 16000, 10)), AudioFormat::Wav);
        assert_eq!(AudioFormat::detect(b"OggS\0\x02"), AudioFormat::Ogg);
        assert_eq!(AudioFormat::detect(&[0x1A, 0x45, 0xDF, 0xA3, 0x01]), AudioFormat::WebM);
        assert_eq!(AudioFormat::detect(b"ID3\x04"), AudioFormat::Mp3);
        assert_eq!(AudioFormat::detect(&[0xFF, 0xFB, 0x90]), AudioFormat::Mp3);
        assert_eq!(AudioFormat::detect(b"fLaC"), AudioFormat::Flac);
        assert_eq!(AudioFormat::detect(b"hello"), AudioFormat::Unknown);
    }

    #[test]
    fn test_stereo_wav_is_normalised() {
        let input = wav(2, 48000, 48000);
        let prepared = processor().prepare(input).unwrap();
        assert_eq!(prepared.format, AudioFormat::Wav);
        assert_eq!(prepared.file_name(), "audio.wav");

        let reader = hound::WavReader::new(Cursor::new(prepared.data)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.duration(), 16000);
    }

    #[test]
    fn test_long_audio_is_trimmed() {
        let config = AudioConfig {
            max_duration_seconds: 1,
            ..AudioConfig::default()
        };
        let prepared = AudioProcessor::new(&config).prepare(wav(1, 16000, 40000)).unwrap();
        let reader = hound::WavReader::new(Cursor::new(prepared.data)).unwrap();
        assert_eq!(reader.duration(), 16000);
    }

    #[test]
    fn test_long_low_rate_audio_is_trimmed_before_resampling() {
        let config = AudioConfig {
            max_duration_seconds: 2,
            ..AudioConfig::default()
        };
        let prepared = AudioProcessor::new(&config).prepare(wav(1, 8000, 80000)).unwrap();
        let reader = hound::WavReader::new(Cursor::new(prepared.data)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.duration(), 32000);
    }

    #[test]
    fn test_tiny_sample_rate_is_rejected() {
        let err = processor().prepare(wav(1, 1, 20000)).unwrap_err();
        assert!(matches!(err, WaypointError::BadRequest(_)));
        assert_eq!(err.detail(), "Unsupported sample rate: 1 Hz");
    }

    #[test]
    fn test_compressed_audio_passes_through() {
        let ogg = b"OggS-opus-payload".to_vec();
        let prepared = processor().prepare(ogg.clone()).unwrap();
        assert_eq!(prepared.format, AudioFormat::Ogg);
        assert_eq!(prepared.data, ogg);
        assert_eq!(prepared.file_name(), "audio.ogg");
    }

    #[test]
    fn test_base64_errors() {
        let err = processor().decode_base64("not base64!!").unwrap_err();
        assert_eq!(err.detail(), "Invalid base64 audio data");

        let config = AudioConfig {
            max_bytes: 4,
            ..AudioConfig::default()
        };
        let encoded = encode_base64(&[0u8; 8]);
        assert!(AudioProcessor::new(&config).decode_base64(&encoded).is_err());
    }

    #[test]
    fn test_data_url_prefix_is_accepted() {
        let encoded = format!("data:audio/wav;base64,{}", encode_base64(&wav(1, 16000, 8)));
        let prepared = processor().prepare_base64(&encoded).unwrap();
        assert_eq!(prepared.format, AudioFormat::Wav);
    }

    #[test]
    fn test_silent_wav() {
        let data = silent_wav(1, 16000).unwrap();
        let mut reader = hound::WavReader::new(Cursor::new(data)).unwrap();
        assert_eq!(reader.duration(), 16000);
        assert!(reader.samples::<i16>().all(|s| s.unwrap() == 0));
    }

    proptest! {
        #[test]
        fn resample_length_tracks_ratio(len in 1usize..5000, from in 8000u32..48000) {
            let samples = vec![0.25f32; len];
            let out = resample_linear(&samples, from, 16000);
            let expected = (len as f64 * 16000.0 / from as f64).floor() as usize;
            prop_assert!((out.len() as i64 - expected as i64).abs() <= 1);
            prop_assert!(out.iter().all(|s| (*s - 0.25).abs() < 1e-6));
        }
    }
}
