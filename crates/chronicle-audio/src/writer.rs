//! 16 kHz mono 16-bit WAV output for the audio persistence job (§4.4).
//! Grounded on the stuck-stream reaper / session modules' style of
//! wrapping a single external resource behind a small owned type.

use std::io::Cursor;
use std::path::Path;

use chronicle_domain::{Error, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

pub struct PersistenceWriter {
    inner: WavWriter<std::io::BufWriter<std::fs::File>>,
    path: std::path::PathBuf,
}

impl PersistenceWriter {
    pub fn create(path: impl AsRef<Path>, sample_rate: u32) -> Result<Self> {
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let inner = WavWriter::create(&path, spec).map_err(|e| Error::Other(e.to_string()))?;
        Ok(Self { inner, path: path.as_ref().to_path_buf() })
    }

    pub fn write_samples(&mut self, samples: &[i16]) -> Result<()> {
        for &sample in samples {
            self.inner
                .write_sample(sample)
                .map_err(|e| Error::Other(e.to_string()))?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn finalize(self) -> Result<()> {
        self.inner.finalize().map_err(|e| Error::Other(e.to_string()))
    }
}

/// In-memory WAV encode for the speaker-identification window upload (§6:
/// "in-memory WAV upload fallback" for non-diarizing providers) — same
/// spec as [`PersistenceWriter`] but over a `Cursor<Vec<u8>>` instead of a
/// file.
pub fn encode_wav_bytes(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            WavWriter::new(&mut cursor, spec).map_err(|e| Error::Other(e.to_string()))?;
        for &sample in samples {
            writer.write_sample(sample).map_err(|e| Error::Other(e.to_string()))?;
        }
        writer.finalize().map_err(|e| Error::Other(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}

/// Decode a persisted WAV file back to 16-bit samples plus sample rate,
/// for batch reprocessing reading `audio:file:{conversation_id}`.
pub fn decode_wav_file(path: impl AsRef<Path>) -> Result<(Vec<i16>, u32)> {
    let mut reader = WavReader::open(path).map_err(|e| Error::Other(e.to_string()))?;
    let sample_rate = reader.spec().sample_rate;
    let samples: std::result::Result<Vec<i16>, _> = reader.samples::<i16>().collect();
    let samples = samples.map_err(|e| Error::Other(e.to_string()))?;
    Ok((samples, sample_rate))
}
