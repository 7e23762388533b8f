use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use super::ffmpeg_decoder::MonoAudioStream;
use crate::audio::domain::audio_extractor::{AudioExtractor, ExtractedAudio, ExtractionError};
use crate::shared::constants::WHISPER_SAMPLE_RATE;

/// Extracts the audio track of a media file into a temporary 16 kHz mono
/// 16-bit WAV file.
#[derive(Debug, Default)]
pub struct WavAudioExtractor {
    temp_dir: Option<PathBuf>,
}

impl WavAudioExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write temporary files under `dir` instead of the system temp dir.
    pub fn with_temp_dir(mut self, dir: PathBuf) -> Self {
        self.temp_dir = Some(dir);
        self
    }

    fn temp_wav_path(&self) -> Result<PathBuf, ExtractionError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("audio_extract_").suffix(".wav");
        let file = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.into_temp_path()
            .keep()
            .map_err(|e| ExtractionError::Write(e.to_string()))
    }
}

impl AudioExtractor for WavAudioExtractor {
    fn extract(&self, source: &Path) -> Result<ExtractedAudio, ExtractionError> {
        let decode_err = |e: ffmpeg_next::Error| ExtractionError::Decode {
            path: source.to_path_buf(),
            reason: e.to_string(),
        };
        let stream = MonoAudioStream::open(source, WHISPER_SAMPLE_RATE)
            .map_err(decode_err)?
            .ok_or_else(|| ExtractionError::NoAudioTrack(source.to_path_buf()))?;

        // Owned from here on so every failure below still removes the file.
        let extracted = ExtractedAudio::new(self.temp_wav_path()?);
        let mut writer = hound::WavWriter::create(extracted.path(), wav_spec(WHISPER_SAMPLE_RATE))
            .map_err(write_err)?;

        let mut write_failure = None;
        let written = stream
            .for_each_chunk(|chunk| {
                match chunk.iter().try_for_each(|&s| writer.write_sample(pcm16(s))) {
                    Ok(()) => ControlFlow::Continue(()),
                    Err(e) => {
                        write_failure = Some(e);
                        ControlFlow::Break(())
                    }
                }
            })
            .map_err(decode_err)?;
        if let Some(e) = write_failure {
            return Err(write_err(e));
        }
        writer.finalize().map_err(write_err)?;

        log::info!(
            "extracted {:.1}s of audio to {}",
            written as f64 / WHISPER_SAMPLE_RATE as f64,
            extracted.path().display()
        );
        Ok(extracted)
    }
}

fn wav_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn write_err(e: hound::Error) -> ExtractionError {
    ExtractionError::Write(e.to_string())
}

/// Write mono f32 samples as 16-bit PCM in one go.
#[cfg(test)]
pub(crate) fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), ExtractionError> {
    let mut writer = hound::WavWriter::create(path, wav_spec(sample_rate)).map_err(write_err)?;
    for &sample in samples {
        writer.write_sample(pcm16(sample)).map_err(write_err)?;
    }
    writer.finalize().map_err(write_err)
}
