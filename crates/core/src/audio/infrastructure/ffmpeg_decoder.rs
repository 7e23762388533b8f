use std::ops::ControlFlow;
use std::path::Path;

use ffmpeg_next::format::sample::Type as SampleLayout;
use ffmpeg_next::format::Sample;
use ffmpeg_next::software::resampling;
use ffmpeg_next::util::frame::audio::Audio;
use ffmpeg_next::{codec, decoder, format, media, ChannelLayout};

/// The best audio track of a media file, decoded and resampled to mono f32
/// PCM chunk by chunk so callers never need the whole track in memory.
pub struct MonoAudioStream {
    input: format::context::Input,
    stream_index: usize,
    decoder: decoder::Audio,
    resampler: resampling::Context,
}

impl MonoAudioStream {
    /// Returns `None` when the file has no audio track.
    pub fn open(path: &Path, sample_rate: u32) -> Result<Option<Self>, ffmpeg_next::Error> {
        ffmpeg_next::init()?;
        let input = format::input(path)?;

        let Some(stream) = input.streams().best(media::Type::Audio) else {
            return Ok(None);
        };
        let stream_index = stream.index();
        let decoder = codec::context::Context::from_parameters(stream.parameters())?
            .decoder()
            .audio()?;
        let resampler = resampling::Context::get(
            decoder.format(),
            decoder.channel_layout(),
            decoder.rate(),
            Sample::F32(SampleLayout::Planar),
            ChannelLayout::MONO,
            sample_rate,
        )?;
        log::debug!(
            "audio track {stream_index} of {}: {} Hz, {} channel(s)",
            path.display(),
            decoder.rate(),
            decoder.channels()
        );

        Ok(Some(Self {
            input,
            stream_index,
            decoder,
            resampler,
        }))
    }

    /// Hand every decoded chunk to `sink` in order until the track ends or
    /// the sink breaks. Returns the number of samples delivered.
    ///
    /// Packets the decoder rejects are skipped; a damaged frame in the
    /// middle of a long recording should not lose the rest of it.
    pub fn for_each_chunk(
        self,
        mut sink: impl FnMut(&[f32]) -> ControlFlow<()>,
    ) -> Result<u64, ffmpeg_next::Error> {
        let Self {
            mut input,
            stream_index,
            mut decoder,
            mut resampler,
        } = self;
        let mut delivered = 0u64;

        for (stream, packet) in input.packets() {
            if stream.index() != stream_index {
                continue;
            }
            if let Err(e) = decoder.send_packet(&packet) {
                log::debug!("skipping undecodable audio packet: {e}");
                continue;
            }
            if pump(&mut decoder, &mut resampler, &mut sink, &mut delivered)?.is_break() {
                return Ok(delivered);
            }
        }

        decoder.send_eof()?;
        if pump(&mut decoder, &mut resampler, &mut sink, &mut delivered)?.is_break() {
            return Ok(delivered);
        }

        let mut tail = Audio::empty();
        if let Some(delay) = resampler.flush(&mut tail)? {
            if delay.output > 0 {
                let _ = deliver(&tail, &mut sink, &mut delivered);
            }
        }
        Ok(delivered)
    }
}

/// Move every frame the decoder has ready through the resampler to `sink`.
fn pump(
    decoder: &mut decoder::Audio,
    resampler: &mut resampling::Context,
    sink: &mut impl FnMut(&[f32]) -> ControlFlow<()>,
    delivered: &mut u64,
) -> Result<ControlFlow<()>, ffmpeg_next::Error> {
    let mut decoded = Audio::empty();
    let mut resampled = Audio::empty();
    while decoder.receive_frame(&mut decoded).is_ok() {
        resampler.run(&decoded, &mut resampled)?;
        if deliver(&resampled, sink, delivered).is_break() {
            return Ok(ControlFlow::Break(()));
        }
    }
    Ok(ControlFlow::Continue(()))
}

fn deliver(
    frame: &Audio,
    sink: &mut impl FnMut(&[f32]) -> ControlFlow<()>,
    delivered: &mut u64,
) -> ControlFlow<()> {
    if frame.samples() == 0 {
        return ControlFlow::Continue(());
    }
    // Mono planar f32, as configured on the resampler.
    let chunk = frame.plane::<f32>(0);
    *delivered += chunk.len() as u64;
    sink(chunk)
}

/// Decode a whole track into memory.
///
/// Returns `None` when the file has no audio stream.
pub fn decode_mono(path: &Path, sample_rate: u32) -> Result<Option<Vec<f32>>, ffmpeg_next::Error> {
    let Some(stream) = MonoAudioStream::open(path, sample_rate)? else {
        return Ok(None);
    };
    let mut samples = Vec::new();
    stream.for_each_chunk(|chunk| {
        samples.extend_from_slice(chunk);
        ControlFlow::Continue(())
    })?;
    Ok(Some(samples))
}
