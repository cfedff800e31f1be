//! Candidate matching
//!
//! Picks at most one candidate from an adapter's response and merges it into
//! the draft. Matching compares normalised title/author signatures.

use crate::merge::merge_candidate;
use crate::types::{is_empty_value, Draft};

/// Threshold at or above which only exact signature matches are accepted
pub const EXACT_MATCH_THRESHOLD: f64 = 1.0;

/// Threshold factor applied when author string and year already agree
pub const CORROBORATED_RELAXATION: f64 = 0.8;

/// Characters of the first author's family name kept in the signature
pub const AUTHOR_PREFIX_LEN: usize = 8;

/// Lowercase `text`, drop `&amp;` entities, symbols and whitespace
pub fn normalize(text: &str) -> String {
    text.replace("&amp;", "")
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Normalised family name of the first author, truncated
fn author_prefix(authors: &str) -> String {
    let first = authors.split(',').next().unwrap_or_default();
    let family = first.split_whitespace().last().unwrap_or_default();
    normalize(family).chars().take(AUTHOR_PREFIX_LEN).collect()
}

/// Matching signature of a record
///
/// The author prefix is appended only when `with_authors` is set.
pub fn signature(title: &str, authors: &str, with_authors: bool) -> String {
    let mut sig = normalize(title);
    if with_authors {
        sig.push_str(&author_prefix(authors));
    }
    sig
}

/// Sørensen–Dice similarity over character bigrams, in `[0, 1]`
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::sorensen_dice(a, b)
}

/// True when author string and year of the candidate equal the draft's
fn corroborated(draft: &Draft, candidate: &Draft) -> bool {
    !is_empty_value(&draft.authors)
        && !is_empty_value(&draft.pub_time)
        && draft.authors.trim() == candidate.authors.trim()
        && draft.pub_time.trim() == candidate.pub_time.trim()
}

/// Index of the candidate that should be merged, if any
///
/// - threshold `< 0`: the first candidate
/// - threshold `>= EXACT_MATCH_THRESHOLD`: first candidate with an identical signature
/// - otherwise: first candidate whose similarity exceeds the threshold
///   (relaxed by `CORROBORATED_RELAXATION` for corroborated candidates)
pub fn select_candidate(draft: &Draft, candidates: &[Draft], threshold: f64) -> Option<usize> {
    if candidates.is_empty() {
        return None;
    }
    if threshold < 0.0 {
        return Some(0);
    }

    let with_authors = !is_empty_value(&draft.authors);
    let target = signature(&draft.title, &draft.authors, with_authors);
    if target.is_empty() {
        return None;
    }

    candidates.iter().position(|candidate| {
        let sig = signature(&candidate.title, &candidate.authors, with_authors);
        if threshold >= EXACT_MATCH_THRESHOLD {
            return sig == target;
        }
        let effective = if corroborated(draft, candidate) {
            threshold * CORROBORATED_RELAXATION
        } else {
            threshold
        };
        similarity(&sig, &target) > effective
    })
}

/// Merge the selected candidate into the draft
///
/// Returns the draft unchanged when nothing qualifies.
pub fn match_candidates(draft: Draft, candidates: Vec<Draft>, threshold: f64) -> Draft {
    match select_candidate(&draft, &candidates, threshold) {
        Some(index) => merge_candidate(draft, &candidates[index]),
        None => draft,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(title: &str, authors: &str, year: &str) -> Draft {
        Draft {
            title: title.to_string(),
            authors: authors.to_string(),
            pub_time: year.to_string(),
            publication: "Venue".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Deep &amp; Wide: Learning!"), "deepwidelearning");
        assert_eq!(normalize("  BERT  "), "bert");
    }

    #[test]
    fn test_signature_author_prefix() {
        assert_eq!(
            signature("ResNet", "Kaiming He, Xiangyu Zhang", true),
            "resnethe"
        );
        assert_eq!(signature("ResNet", "Kaiming He", false), "resnet");
        assert_eq!(
            signature("X", "Johannes Vandermeulenstraat", true),
            "xvanderme"
        );
    }

    #[test]
    fn test_empty_candidates_unchanged() {
        let draft = Draft::with_title("Anything");
        assert_eq!(match_candidates(draft.clone(), vec![], -1.0), draft);
    }

    #[test]
    fn test_accept_first_ignores_title() {
        let draft = Draft::with_title("Completely different");
        let merged = match_candidates(
            draft,
            vec![candidate("Unrelated", "A B", "1999"), candidate("Other", "C D", "2000")],
            -1.0,
        );
        assert_eq!(merged.title, "Unrelated");
        assert_eq!(merged.pub_time, "1999");
    }

    #[test]
    fn test_exact_requires_identical_signature() {
        let draft = Draft::with_title("Attention is all you need");
        let candidates = vec![
            candidate("Attention is all you need now", "A", "2017"),
            candidate("Attention Is All You Need.", "Ashish Vaswani", "2017"),
        ];
        assert_eq!(select_candidate(&draft, &candidates, EXACT_MATCH_THRESHOLD), Some(1));

        let near_miss = vec![candidate("Attention is all you needs", "A", "2017")];
        assert_eq!(select_candidate(&draft, &near_miss, EXACT_MATCH_THRESHOLD), None);
    }

    #[test]
    fn test_exact_includes_author_when_draft_has_one() {
        let mut draft = Draft::with_title("Attention is all you need");
        draft.authors = "Ashish Vaswani".to_string();
        let candidates = vec![
            candidate("Attention is all you need", "Someone Else", "2017"),
            candidate("Attention is all you need", "A. Vaswani, N. Shazeer", "2017"),
        ];
        assert_eq!(select_candidate(&draft, &candidates, EXACT_MATCH_THRESHOLD), Some(1));
    }

    #[test]
    fn test_fuzzy_first_above_threshold_wins() {
        let draft = Draft::with_title("Deep Residual Learning for Image Recognition");
        let candidates = vec![
            candidate("Shallow networks", "X", "2016"),
            candidate("Deep Residual Learning for Image Recognitio", "K He", "2016"),
            candidate("Deep Residual Learning for Image Recognition", "K He", "2016"),
        ];
        assert_eq!(select_candidate(&draft, &candidates, 0.95), Some(1));
    }

    #[test]
    fn test_relaxation_is_exactly_point_eight() {
        let title = "Deep Residual Learning for Image Recognition";
        let mut draft = Draft::with_title(title);
        draft.authors = "Kaiming He".to_string();
        draft.pub_time = "2016".to_string();

        let noisy = "Deep Residual Learning for Imag";
        let sim = similarity(
            &signature(noisy, "Kaiming He", true),
            &signature(title, "Kaiming He", true),
        );
        assert!(sim < 0.95 && sim > 0.95 * CORROBORATED_RELAXATION, "sim = {}", sim);

        let corroborated = vec![candidate(noisy, "Kaiming He", "2016")];
        assert_eq!(select_candidate(&draft, &corroborated, 0.95), Some(0));

        let other_year = vec![candidate(noisy, "Kaiming He", "2015")];
        assert_eq!(select_candidate(&draft, &other_year, 0.95), None);

        // Threshold just above sim / 0.8 must reject even when corroborated
        let strict = (sim / CORROBORATED_RELAXATION) + 0.001;
        assert_eq!(select_candidate(&draft, &corroborated, strict), None);
        let loose = (sim / CORROBORATED_RELAXATION) - 0.001;
        assert_eq!(select_candidate(&draft, &corroborated, loose), Some(0));
    }

    #[test]
    fn test_no_match_unchanged() {
        let draft = Draft::with_title("Graph Attention Networks");
        let merged = match_candidates(
            draft.clone(),
            vec![candidate("Convolutional Sequence to Sequence", "A", "2017")],
            0.95,
        );
        assert_eq!(merged, draft);
    }
}
