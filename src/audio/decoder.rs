use anyhow::{anyhow, Context, Result};
use std::path::Path;
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::{FormatOptions, FormatReader},
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};
use tracing::debug;

pub struct PcmBlock {
    pub l: Vec<f32>,
    pub r: Vec<f32>,
}

/// Pull decoder over a preview file. Mono is duplicated to both sides, extra
/// channels beyond the first two are dropped.
pub struct PreviewDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
}

impl PreviewDecoder {
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| anyhow!("probe format: {e}"))?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| anyhow!("no audio track found"))?;
        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.ok_or_else(|| anyhow!("sample rate not found"))?;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| anyhow!("create decoder: {e}"))?;

        debug!(path = %path.display(), sample_rate, "opened preview");
        Ok(Self { format, decoder, track_id, sample_rate })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn next_pcm_block(&mut self) -> Result<Option<PcmBlock>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(None)
                }
                Err(SymphoniaError::ResetRequired) => return Ok(None),
                Err(e) => return Err(anyhow!("read packet: {e}")),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(e)) => {
                    debug!(error = e, "skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(anyhow!("decode packet: {e}")),
            };
            if decoded.frames() == 0 {
                continue;
            }

            let spec = *decoded.spec();
            let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            buf.copy_interleaved_ref(decoded);
            return Ok(Some(split_stereo(buf.samples(), spec.channels.count())));
        }
    }
}

fn split_stereo(interleaved: &[f32], channels: usize) -> PcmBlock {
    let channels = channels.max(1);
    let frames = interleaved.len() / channels;
    let mut l = Vec::with_capacity(frames);
    let mut r = Vec::with_capacity(frames);
    for frame in interleaved.chunks_exact(channels) {
        l.push(frame[0]);
        r.push(if channels > 1 { frame[1] } else { frame[0] });
    }
    PcmBlock { l, r }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::test_wav::write_wav;

    #[test]
    fn mono_is_duplicated_and_surround_is_folded_to_front_pair() {
        let mono = split_stereo(&[0.1, 0.2], 1);
        assert_eq!(mono.l, vec![0.1, 0.2]);
        assert_eq!(mono.r, vec![0.1, 0.2]);

        let quad = split_stereo(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0], 4);
        assert_eq!(quad.l, vec![1.0, 5.0]);
        assert_eq!(quad.r, vec![2.0, 6.0]);
    }

    #[test]
    fn decodes_every_frame_of_a_wav_preview() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.wav");
        write_wav(&path, 8_000, &vec![16_384i16; 800]);

        let mut dec = PreviewDecoder::open(&path).unwrap();
        assert_eq!(dec.sample_rate(), 8_000);

        let mut frames = 0;
        let mut first = None;
        while let Some(block) = dec.next_pcm_block().unwrap() {
            first.get_or_insert(block.l[0]);
            assert_eq!(block.l.len(), block.r.len());
            frames += block.l.len();
        }

        assert_eq!(frames, 800);
        assert!((first.unwrap() - 0.5).abs() < 1e-3);
    }

    #[test]
    fn garbage_is_rejected_at_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.mp3");
        std::fs::write(&path, b"this is not audio").unwrap();

        assert!(PreviewDecoder::open(&path).is_err());
    }
}
