//! Caption grouping: word tokens to timed cues.
//!
//! Tokens arrive in segment-local time. Cues are grouped locally and then
//! shifted by the segment's placement to absolute timeline time.

use tracing::debug;

use nclip_models::{CaptionCue, TimelinePlacement, WordToken};

use crate::error::PipelineResult;

/// Minimum length given to a token whose end is not after its start.
pub const MIN_TOKEN_SECS: f64 = 0.01;

/// Estimated length of a script word that has no transcribed timing.
pub const ESTIMATED_WORD_SECS: f64 = 0.3;

/// Clamp token timing so tokens are disjoint, ordered and of positive length.
///
/// Tokens with non-finite timing or empty text are dropped. A start earlier
/// than the previous token's end is moved up to it, so no two cues built
/// from these tokens can overlap.
fn sanitize_tokens(tokens: &[WordToken]) -> Vec<WordToken> {
    let mut clean: Vec<WordToken> = Vec::with_capacity(tokens.len());
    let mut prev_end = 0.0_f64;

    for token in tokens {
        let text = token.text.trim();
        if text.is_empty() || !token.start.is_finite() || !token.end.is_finite() {
            debug!(token = %token.text, "Dropping malformed word token");
            continue;
        }
        let start = token.start.max(prev_end);
        let end = if token.end <= start { start + MIN_TOKEN_SECS } else { token.end };
        prev_end = end;
        clean.push(WordToken::new(text, start, end));
    }

    clean
}

fn flush(group: &mut Vec<WordToken>, cues: &mut Vec<CaptionCue>) -> PipelineResult<()> {
    if let (Some(first), Some(last)) = (group.first(), group.last()) {
        let text = group
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let end = last.end.max(first.start + MIN_TOKEN_SECS);
        cues.push(CaptionCue::new(text, first.start, end)?);
    }
    group.clear();
    Ok(())
}

/// Group tokens into cues of at most `max_words` words, breaking early after
/// sentence-terminal punctuation. Cue times stay segment-local.
pub fn group_words(tokens: &[WordToken], max_words: usize) -> PipelineResult<Vec<CaptionCue>> {
    let max_words = max_words.max(1);
    let mut cues = Vec::new();
    let mut group = Vec::with_capacity(max_words);

    for token in sanitize_tokens(tokens) {
        let ends_sentence = token.ends_sentence();
        group.push(token);
        if group.len() >= max_words || ends_sentence {
            flush(&mut group, &mut cues)?;
        }
    }
    flush(&mut group, &mut cues)?;

    Ok(cues)
}

/// Shift segment-local cues to absolute time.
pub fn place_cues(cues: &[CaptionCue], offset: f64) -> Vec<CaptionCue> {
    cues.iter().map(|c| c.offset(offset)).collect()
}

/// Pair script words with transcribed timing by position.
///
/// The script's spelling wins. Script words past the last token are given
/// [`ESTIMATED_WORD_SECS`] each after the previous word. Without tokens there
/// is nothing to align and the result is empty.
pub fn align_script_words(script: &str, tokens: &[WordToken]) -> Vec<WordToken> {
    if tokens.is_empty() {
        return Vec::new();
    }

    let mut aligned: Vec<WordToken> = Vec::new();
    for (i, word) in script.split_whitespace().enumerate() {
        match tokens.get(i) {
            Some(token) => aligned.push(WordToken::new(word, token.start, token.end)),
            None => {
                let last_end = aligned.last().map(|w| w.end).unwrap_or(0.0);
                aligned.push(WordToken::new(word, last_end, last_end + ESTIMATED_WORD_SECS));
            }
        }
    }
    aligned
}

/// One cue carrying the whole text across `duration` seconds.
pub fn fallback_cue(text: &str, duration: f64) -> PipelineResult<CaptionCue> {
    Ok(CaptionCue::new(text.trim(), 0.0, duration)?)
}

/// Absolute cues for one placed segment.
///
/// Uses script-aligned grouping when the transcription produced tokens and a
/// single full-length cue otherwise.
pub fn segment_captions(
    script: &str,
    tokens: &[WordToken],
    max_words: usize,
    placement: &TimelinePlacement,
) -> PipelineResult<Vec<CaptionCue>> {
    let aligned = align_script_words(script, tokens);
    let local = if aligned.is_empty() {
        if script.trim().is_empty() {
            return Ok(Vec::new());
        }
        vec![fallback_cue(script, placement.duration())?]
    } else {
        group_words(&aligned, max_words)?
    };

    // Captions never run past the segment's slot.
    let limit = placement.duration();
    let clipped: Vec<CaptionCue> = local
        .into_iter()
        .filter(|c| c.start < limit)
        .map(|c| {
            let end = c.end.min(limit);
            CaptionCue::new(c.text, c.start, end)
        })
        .collect::<Result<_, _>>()?;

    Ok(place_cues(&clipped, placement.start))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(text: &str, start: f64, end: f64) -> WordToken {
        WordToken::new(text, start, end)
    }

    fn words(n: usize) -> Vec<WordToken> {
        (0..n)
            .map(|i| tok(&format!("ord{i}"), i as f64 * 0.5, i as f64 * 0.5 + 0.4))
            .collect()
    }

    #[test]
    fn test_group_by_max_words() {
        let cues = group_words(&words(10), 4).unwrap();
        assert_eq!(cues.len(), 3);
        assert_eq!(cues[0].text, "ord0 ord1 ord2 ord3");
        assert_eq!(cues[2].text, "ord8 ord9");
        assert!((cues[0].start - 0.0).abs() < 1e-9);
        assert!((cues[0].end - 1.9).abs() < 1e-9);
    }

    #[test]
    fn test_group_breaks_at_sentence_end() {
        let tokens = vec![
            tok("Politiet", 0.0, 0.4),
            tok("anholdt", 0.5, 0.9),
            tok("manden.", 1.0, 1.4),
            tok("Han", 1.6, 1.8),
            tok("sigtes,", 1.9, 2.3),
            tok("for", 2.4, 2.5),
            tok("vold!", 2.6, 3.0),
        ];
        let cues = group_words(&tokens, 4).unwrap();
        let texts: Vec<_> = cues.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["Politiet anholdt manden.", "Han sigtes, for vold!"]);
    }

    #[test]
    fn test_zero_length_token_is_clamped() {
        let tokens = vec![tok("nu", 1.0, 1.0), tok("igen", 0.8, 0.5)];
        let cues = group_words(&tokens, 1).unwrap();

        assert_eq!(cues.len(), 2);
        for cue in &cues {
            assert!(cue.start < cue.end);
        }
        assert!(cues[1].start >= cues[0].start);
        assert!((cues[0].end - (1.0 + MIN_TOKEN_SECS)).abs() < 1e-9);
    }

    fn assert_disjoint(cues: &[CaptionCue]) {
        for cue in cues {
            assert!(cue.start < cue.end, "empty cue {cue:?}");
        }
        for pair in cues.windows(2) {
            assert!(pair[0].end <= pair[1].start, "{:?} overlaps {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_clamped_token_does_not_overlap_next() {
        let tokens = vec![tok("nu.", 1.0, 1.0), tok("igen", 1.0, 1.3)];
        let cues = group_words(&tokens, 4).unwrap();

        assert_eq!(cues.len(), 2);
        assert_disjoint(&cues);
        assert!((cues[0].end - 1.01).abs() < 1e-9);
        assert!((cues[1].start - 1.01).abs() < 1e-9);
        assert!((cues[1].end - 1.3).abs() < 1e-9);
    }

    #[test]
    fn test_overrunning_word_end_does_not_overlap_next_cue() {
        let tokens = vec![
            tok("Politiet", 0.0, 0.4),
            tok("anholdt.", 0.5, 1.2),
            tok("Han", 0.9, 1.4),
            tok("flygtede", 1.3, 1.35),
        ];
        let cues = group_words(&tokens, 4).unwrap();

        assert_eq!(cues.len(), 2);
        assert_eq!(cues[1].text, "Han flygtede");
        assert_disjoint(&cues);
        assert!((cues[1].start - 1.2).abs() < 1e-9);
        assert!((cues[1].end - 1.41).abs() < 1e-9);
    }

    #[test]
    fn test_malformed_tokens_dropped() {
        let tokens = vec![tok(" ", 0.0, 0.2), tok("ok", f64::NAN, 1.0), tok("ja", 0.3, 0.6)];
        let cues = group_words(&tokens, 4).unwrap();
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "ja");
    }

    #[test]
    fn test_cues_non_decreasing_and_positive() {
        let cues = group_words(&words(23), 3).unwrap();
        for cue in &cues {
            assert!(cue.start < cue.end);
        }
        for pair in cues.windows(2) {
            assert!(pair[0].start <= pair[1].start);
            assert!(pair[0].end <= pair[1].start + 1e-9);
        }
    }

    #[test]
    fn test_place_cues_adds_offset() {
        let cues = group_words(&words(4), 2).unwrap();
        let placed = place_cues(&cues, 10.7);
        assert!((placed[0].start - 10.7).abs() < 1e-9);
        assert!((placed[1].end - (10.7 + 1.9)).abs() < 1e-9);
    }

    #[test]
    fn test_align_uses_script_spelling() {
        let tokens = vec![tok(" politi", 0.0, 0.3), tok(" aarhus", 0.4, 0.9)];
        let aligned = align_script_words("Politi Aarhus efterlyser vidner", &tokens);

        assert_eq!(aligned.len(), 4);
        assert_eq!(aligned[1].text, "Aarhus");
        assert!((aligned[1].end - 0.9).abs() < 1e-9);
        assert!((aligned[2].start - 0.9).abs() < 1e-9);
        assert!((aligned[2].end - 1.2).abs() < 1e-9);
        assert!((aligned[3].start - 1.2).abs() < 1e-9);
        assert!((aligned[3].end - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_align_without_tokens_is_empty() {
        assert!(align_script_words("Et eller andet", &[]).is_empty());
    }

    #[test]
    fn test_segment_captions_fallback_spans_slot() {
        let placement = TimelinePlacement::new(1, 4.1, 10.6);
        let cues = segment_captions("En bil brændte i nat.", &[], 4, &placement).unwrap();

        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "En bil brændte i nat.");
        assert!((cues[0].start - 4.1).abs() < 1e-9);
        assert!((cues[0].end - 10.6).abs() < 1e-9);
    }

    #[test]
    fn test_segment_captions_clipped_to_slot() {
        let placement = TimelinePlacement::new(0, 0.0, 1.0);
        let tokens = vec![tok("a", 0.0, 0.5), tok("b.", 0.6, 1.4), tok("c", 1.5, 1.8)];
        let cues = segment_captions("a b. c", &tokens, 4, &placement).unwrap();

        assert_eq!(cues.len(), 1);
        assert!((cues[0].end - 1.0).abs() < 1e-9);
    }
}
