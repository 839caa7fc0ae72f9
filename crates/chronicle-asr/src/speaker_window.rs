//! Raw-audio accumulation buffer for speaker identification when the
//! provider lacks native diarization (§4.5): once ≥0.1s of audio has
//! accumulated, the buffer is handed off (as WAV) to the speaker
//! recognition service, then cleared.

pub struct SpeakerWindowBuffer {
    sample_rate: u32,
    threshold_secs: f64,
    samples: Vec<i16>,
}

impl SpeakerWindowBuffer {
    pub fn new(sample_rate: u32, threshold_secs: f64) -> Self {
        Self {
            sample_rate,
            threshold_secs,
            samples: Vec::new(),
        }
    }

    pub fn push(&mut self, pcm: &[i16]) {
        self.samples.extend_from_slice(pcm);
    }

    fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// If enough audio has accumulated, take and clear the buffer.
    pub fn take_if_ready(&mut self) -> Option<Vec<i16>> {
        if self.duration_secs() >= self.threshold_secs {
            Some(std::mem::take(&mut self.samples))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_none_below_threshold() {
        let mut buf = SpeakerWindowBuffer::new(16_000, 0.1);
        buf.push(&vec![0i16; 800]); // 0.05s
        assert!(buf.take_if_ready().is_none());
    }

    #[test]
    fn returns_and_clears_at_threshold() {
        let mut buf = SpeakerWindowBuffer::new(16_000, 0.1);
        buf.push(&vec![0i16; 1_600]); // exactly 0.1s
        let taken = buf.take_if_ready();
        assert_eq!(taken.unwrap().len(), 1_600);
        assert!(buf.take_if_ready().is_none());
    }
}
