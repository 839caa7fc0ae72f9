//! Word-field normalization and speaker-segment grouping (§4.5), grounded
//! on `original_source/.../streaming_consumer.py`'s `_normalize_words` /
//! `_group_words_into_segments`. `chronicle_domain::conversation::Word`
//! already aliases `start_time`/`end_time` on deserialize, so normalization
//! here is a no-op for that shape; `group_words_into_segments` operates on
//! the canonical `Word` directly instead of re-parsing raw JSON.

use chronicle_domain::conversation::{SpeakerSegment, Word};

/// Group consecutive words by speaker into contiguous segments. Words
/// without a speaker are treated as speaker `-1` ("Unknown"), matching the
/// original's sentinel.
pub fn group_words_into_segments(words: &[Word]) -> Vec<SpeakerSegment> {
    if words.is_empty() {
        return Vec::new();
    }

    let mut segments = Vec::new();
    let mut current_speaker: Option<i32> = None;
    let mut current: Vec<&Word> = Vec::new();

    let flush = |speaker: Option<i32>, words: &[&Word]| -> Option<SpeakerSegment> {
        let first = words.first()?;
        let last = words.last()?;
        Some(SpeakerSegment {
            start: first.start,
            end: last.end,
            text: words.iter().map(|w| w.word.as_str()).collect::<Vec<_>>().join(" "),
            speaker: match speaker {
                Some(-1) | None => "Unknown".to_string(),
                Some(s) => format!("Speaker {s}"),
            },
            segment_type: chronicle_domain::conversation::SegmentType::Speech,
            identified_as: None,
            confidence: None,
            words: words.iter().map(|w| (*w).clone()).collect(),
        })
    };

    for w in words {
        let spk = w.speaker.unwrap_or(-1);
        if Some(spk) != current_speaker && !current.is_empty() {
            if let Some(seg) = flush(current_speaker, &current) {
                segments.push(seg);
            }
            current.clear();
        }
        current_speaker = Some(spk);
        current.push(w);
    }
    if let Some(seg) = flush(current_speaker, &current) {
        segments.push(seg);
    }

    segments
}

/// Plugin-dispatch gating for `transcript.streaming` (§4.5 "Plugin
/// gating"). Returns true if the event should be dispatched.
pub fn should_dispatch_transcript_event(
    primary_speakers: &[String],
    identified_speaker: Option<&str>,
) -> bool {
    if primary_speakers.is_empty() {
        return true;
    }
    let Some(identified) = identified_speaker else {
        // No identification available: plugins still fire.
        return true;
    };
    let identified = identified.trim().to_ascii_lowercase();
    primary_speakers
        .iter()
        .any(|p| p.trim().to_ascii_lowercase() == identified)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, start: f64, end: f64, speaker: Option<i32>) -> Word {
        Word {
            word: text.to_string(),
            start,
            end,
            confidence: None,
            speaker,
            speaker_confidence: None,
        }
    }

    #[test]
    fn groups_consecutive_same_speaker_words() {
        let words = vec![
            word("hello", 0.0, 0.3, Some(1)),
            word("there", 0.3, 0.6, Some(1)),
            word("hi", 0.6, 0.9, Some(2)),
        ];
        let segments = group_words_into_segments(&words);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "hello there");
        assert_eq!(segments[0].speaker, "Speaker 1");
        assert_eq!(segments[1].speaker, "Speaker 2");
    }

    #[test]
    fn words_without_speaker_become_unknown() {
        let words = vec![word("hmm", 0.0, 0.2, None)];
        let segments = group_words_into_segments(&words);
        assert_eq!(segments[0].speaker, "Unknown");
    }

    #[test]
    fn gating_allows_when_no_primary_speakers_configured() {
        assert!(should_dispatch_transcript_event(&[], Some("Alice")));
    }

    #[test]
    fn gating_allows_when_no_identification_available() {
        assert!(should_dispatch_transcript_event(
            &["Alice".into()],
            None
        ));
    }

    #[test]
    fn gating_blocks_non_primary_speaker() {
        assert!(!should_dispatch_transcript_event(
            &["Alice".into()],
            Some("Bob")
        ));
    }

    #[test]
    fn gating_is_case_insensitive_and_trims() {
        assert!(should_dispatch_transcript_event(
            &["Alice".into()],
            Some(" alice  ")
        ));
    }
}
