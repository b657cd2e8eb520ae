//! Command extraction from a growing, not-yet-final transcript.
//! Pipeline: normalize words → rightmost trigger occurrence → timing check
//! on the pause after the trigger → command text after the trigger.
//!
//! Pure and deterministic; safe to re-run on every partial update.

pub mod normalize;

use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::transcript::WordSegment;
pub use normalize::{collapse_whitespace, normalize_word, sanitize_triggers, TriggerPhrase};

/// Default pause required between the wake phrase and the command.
pub const DEFAULT_MIN_POST_TRIGGER_GAP: Duration = Duration::from_millis(450);

/// A command extracted from one transcript update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub command: String,
    pub trigger: TriggerPhrase,
}

/// Transcript word with its position among the raw whitespace tokens.
struct Word {
    raw_index: usize,
    norm: String,
}

/// Located trigger occurrence, inclusive word range.
struct Occurrence<'a> {
    start: usize,
    end: usize,
    phrase: &'a TriggerPhrase,
}

/// Extract only the command string. See [`extract`].
pub fn extract_command(
    transcript: &str,
    segments: &[WordSegment],
    triggers: &[TriggerPhrase],
    min_post_trigger_gap: Duration,
) -> Option<String> {
    extract(transcript, segments, triggers, min_post_trigger_gap).map(|m| m.command)
}

/// Find a `<trigger> <pause> <command>` pattern in the transcript.
///
/// Returns `None` while the command has not started yet, when the words after
/// the trigger follow without a pause of at least `min_post_trigger_gap`, or
/// when segment timing does not cover the trigger yet.
///
/// Segments only supply timing. The command text is the transcript tail after
/// the trigger, in its original casing, with whitespace collapsed.
pub fn extract(
    transcript: &str,
    segments: &[WordSegment],
    triggers: &[TriggerPhrase],
    min_post_trigger_gap: Duration,
) -> Option<MatchResult> {
    if triggers.is_empty() || transcript.trim().is_empty() {
        return None;
    }

    let raw_tokens: Vec<&str> = transcript.split_whitespace().collect();
    let words: Vec<Word> = raw_tokens
        .iter()
        .enumerate()
        .filter_map(|(raw_index, token)| {
            let norm = normalize_word(token);
            (!norm.is_empty()).then_some(Word { raw_index, norm })
        })
        .collect();

    let occurrence = find_last_occurrence(&words, triggers)?;

    // Segment word k carries the timing of transcript word k.
    let segment_words: Vec<(usize, String)> = segments
        .iter()
        .enumerate()
        .flat_map(|(idx, seg)| {
            seg.text
                .split_whitespace()
                .map(normalize_word)
                .filter(|w| !w.is_empty())
                .map(move |w| (idx, w))
        })
        .collect();

    if segment_words.len() <= occurrence.end {
        debug!(trigger = %occurrence.phrase, "trigger found, timing not available yet");
        return None;
    }
    let timing_consistent = (occurrence.start..=occurrence.end)
        .all(|k| segment_words[k].1 == words[k].norm);
    if !timing_consistent {
        debug!(trigger = %occurrence.phrase, "segments disagree with transcript, waiting");
        return None;
    }

    let trigger_segment = segment_words[occurrence.end].0;
    let next_segment = trigger_segment + 1;
    let Some(next) = segments.get(next_segment) else {
        debug!(trigger = %occurrence.phrase, "trigger is the whole utterance so far");
        return None;
    };

    let gap = next.start.saturating_sub(segments[trigger_segment].end);
    if gap < min_post_trigger_gap {
        debug!(
            trigger = %occurrence.phrase,
            gap_ms = gap.as_millis() as u64,
            min_gap_ms = min_post_trigger_gap.as_millis() as u64,
            "no pause after trigger, ignoring"
        );
        return None;
    }

    let tail_start = words[occurrence.end].raw_index + 1;
    let tail = raw_tokens[tail_start..].join(" ");
    let command = collapse_whitespace(tail.trim_start_matches(|c: char| {
        c.is_whitespace() || (c.is_ascii_punctuation() && c != '\'')
    }));
    if command.is_empty() {
        return None;
    }

    Some(MatchResult {
        command,
        trigger: occurrence.phrase.clone(),
    })
}

/// Rightmost occurrence of any trigger; ties on the end word prefer the longer phrase.
fn find_last_occurrence<'a>(
    words: &[Word],
    triggers: &'a [TriggerPhrase],
) -> Option<Occurrence<'a>> {
    let mut best: Option<Occurrence<'a>> = None;
    for phrase in triggers {
        let len = phrase.len();
        if len == 0 || len > words.len() {
            continue;
        }
        let last = (0..=words.len() - len).rev().find(|&start| {
            words[start..start + len]
                .iter()
                .zip(phrase.words())
                .all(|(w, p)| w.norm == *p)
        });
        if let Some(start) = last {
            let end = start + len - 1;
            let better = match &best {
                None => true,
                Some(b) => end > b.end || (end == b.end && start < b.start),
            };
            if better {
                best = Some(Occurrence { start, end, phrase });
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triggers(raw: &[&str]) -> Vec<TriggerPhrase> {
        sanitize_triggers(raw)
    }

    /// Segments for whitespace-separated words, 300ms per word, 100ms between
    /// words, plus `pause_ms` inserted after word index `pause_after`.
    fn timed(text: &str, pause_after: Option<usize>, pause_ms: u64) -> Vec<WordSegment> {
        let mut t = 0;
        let mut out = Vec::new();
        for (i, w) in text.split_whitespace().enumerate() {
            out.push(WordSegment::from_millis(w, t, t + 300));
            t += 400;
            if pause_after == Some(i) {
                t += pause_ms;
            }
        }
        out
    }

    #[test]
    fn test_returns_command_after_paused_trigger() {
        let text = "hey assistant turn on the lights";
        let segs = timed(text, Some(1), 500);
        let result = extract(text, &segs, &triggers(&["hey assistant"]), DEFAULT_MIN_POST_TRIGGER_GAP)
            .unwrap();
        assert_eq!(result.command, "turn on the lights");
        assert_eq!(result.trigger.to_string(), "hey assistant");
    }

    #[test]
    fn test_gap_below_threshold_returns_nothing() {
        let text = "hey assistant turn on the lights";
        // 100ms natural gap only
        let segs = timed(text, None, 0);
        assert!(extract(text, &segs, &triggers(&["hey assistant"]), DEFAULT_MIN_POST_TRIGGER_GAP).is_none());
    }

    #[test]
    fn test_gap_exactly_at_threshold_matches() {
        let text = "hey assistant stop";
        let segs = vec![
            WordSegment::from_millis("hey", 0, 200),
            WordSegment::from_millis("assistant", 250, 700),
            WordSegment::from_millis("stop", 1150, 1400),
        ];
        assert_eq!(
            extract_command(text, &segs, &triggers(&["hey assistant"]), DEFAULT_MIN_POST_TRIGGER_GAP),
            Some("stop".to_string())
        );
    }

    #[test]
    fn test_embedded_trigger_in_conversation_does_not_fire() {
        let text = "i went to say hey assistant yesterday";
        let segs = timed(text, None, 0);
        assert!(extract(text, &segs, &triggers(&["hey assistant"]), DEFAULT_MIN_POST_TRIGGER_GAP).is_none());
    }

    #[test]
    fn test_no_trigger_returns_nothing() {
        let text = "turn on the lights please";
        let segs = timed(text, Some(0), 2000);
        assert!(extract(text, &segs, &triggers(&["hey assistant", "computer"]), DEFAULT_MIN_POST_TRIGGER_GAP).is_none());
    }

    #[test]
    fn test_trigger_must_match_whole_words() {
        let text = "heyassistant turn on the lights";
        let segs = timed(text, Some(0), 1000);
        assert!(extract(text, &segs, &triggers(&["hey assistant"]), DEFAULT_MIN_POST_TRIGGER_GAP).is_none());

        let text = "computers are great";
        let segs = timed(text, Some(0), 1000);
        assert!(extract(text, &segs, &triggers(&["computer"]), DEFAULT_MIN_POST_TRIGGER_GAP).is_none());
    }

    #[test]
    fn test_empty_inputs_return_nothing() {
        let segs = timed("hey assistant go", Some(1), 1000);
        assert!(extract("", &segs, &triggers(&["hey assistant"]), DEFAULT_MIN_POST_TRIGGER_GAP).is_none());
        assert!(extract("hey assistant go", &segs, &[], DEFAULT_MIN_POST_TRIGGER_GAP).is_none());
    }

    #[test]
    fn test_trigger_as_whole_utterance_waits() {
        let text = "hey assistant";
        let segs = timed(text, None, 0);
        assert!(extract(text, &segs, &triggers(&["hey assistant"]), DEFAULT_MIN_POST_TRIGGER_GAP).is_none());
    }

    #[test]
    fn test_segments_lagging_behind_transcript_wait() {
        let text = "hey assistant turn on";
        // Timing only for "hey"
        let segs = vec![WordSegment::from_millis("hey", 0, 300)];
        assert!(extract(text, &segs, &triggers(&["hey assistant"]), DEFAULT_MIN_POST_TRIGGER_GAP).is_none());
    }

    #[test]
    fn test_rightmost_trigger_wins() {
        let text = "hey assistant play hey assistant stop the music";
        let mut segs = timed(text, Some(1), 600);
        // Second utterance of the phrase is followed by a pause too
        for seg in segs.iter_mut().skip(5) {
            seg.start += Duration::from_millis(800);
            seg.end += Duration::from_millis(800);
        }
        assert_eq!(
            extract_command(text, &segs, &triggers(&["hey assistant"]), DEFAULT_MIN_POST_TRIGGER_GAP),
            Some("stop the music".to_string())
        );
    }

    #[test]
    fn test_rightmost_trigger_without_pause_blocks_earlier_match() {
        let text = "hey assistant say hey assistant twice";
        let segs = timed(text, Some(1), 600);
        assert!(extract(text, &segs, &triggers(&["hey assistant"]), DEFAULT_MIN_POST_TRIGGER_GAP).is_none());
    }

    #[test]
    fn test_matching_ignores_case_punctuation_and_diacritics_but_keeps_command_casing() {
        let text = "Hé, Ordinateur!   Play   Beyoncé";
        let segs = vec![
            WordSegment::from_millis("Hé", 0, 200),
            WordSegment::from_millis("Ordinateur", 250, 800),
            WordSegment::from_millis("Play", 1500, 1700),
            WordSegment::from_millis("Beyoncé", 1750, 2200),
        ];
        assert_eq!(
            extract_command(text, &segs, &triggers(&["he ordinateur"]), DEFAULT_MIN_POST_TRIGGER_GAP),
            Some("Play Beyoncé".to_string())
        );
    }

    #[test]
    fn test_punctuation_only_tail_is_empty_command() {
        let text = "computer ...";
        let segs = vec![
            WordSegment::from_millis("computer", 0, 400),
            WordSegment::from_millis("...", 1200, 1300),
        ];
        assert!(extract(text, &segs, &triggers(&["computer"]), DEFAULT_MIN_POST_TRIGGER_GAP).is_none());
    }

    #[test]
    fn test_reports_longer_phrase_on_shared_end_word() {
        let text = "hey computer lights off";
        let segs = timed(text, Some(1), 700);
        let result = extract(
            text,
            &segs,
            &triggers(&["computer", "hey computer"]),
            DEFAULT_MIN_POST_TRIGGER_GAP,
        )
        .unwrap();
        assert_eq!(result.trigger.to_string(), "hey computer");
        assert_eq!(result.command, "lights off");
    }

    #[test]
    fn test_repeated_calls_are_deterministic() {
        let text = "hey assistant open mail";
        let segs = timed(text, Some(1), 900);
        let t = triggers(&["hey assistant"]);
        let first = extract(text, &segs, &t, DEFAULT_MIN_POST_TRIGGER_GAP);
        let second = extract(text, &segs, &t, DEFAULT_MIN_POST_TRIGGER_GAP);
        assert_eq!(first, second);
        assert_eq!(first.unwrap().command, "open mail");
    }
}
