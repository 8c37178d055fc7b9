//! Person-name normalization and similarity scoring.
//!
//! Names are compared after folding case, stripping diacritics, dropping
//! punctuation and collapsing whitespace. The score is the best of three
//! normalized Levenshtein ratios: the names as written, their tokens sorted,
//! and a token-set comparison when the names share two or more tokens. Every
//! component is symmetric, so `score(a, b) == score(b, a)`.

use std::collections::BTreeSet;
use strsim::normalized_levenshtein;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Fold a name to its comparison form.
///
/// Hyphens survive (they join double-barrelled surnames), periods and
/// apostrophes are removed, every other non-alphanumeric becomes a space.
pub fn normalize_name(name: &str) -> String {
    let folded: String = name
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .filter_map(|c| match c {
            '.' | '\'' | '\u{2019}' => None,
            '-' => Some('-'),
            c if c.is_alphanumeric() => Some(c),
            _ => Some(' '),
        })
        .collect();

    folded
        .split_whitespace()
        .map(|token| token.trim_matches('-'))
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// True if the name contains at least one letter once normalized.
pub fn is_usable_name(name: &str) -> bool {
    normalize_name(name).chars().any(char::is_alphabetic)
}

/// Similarity of two names in `[0, 1]`.
pub fn score_name_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_name(a);
    let b = normalize_name(b);

    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let direct = normalized_levenshtein(&a, &b);

    let tokens_a: BTreeSet<&str> = a.split(' ').collect();
    let tokens_b: BTreeSet<&str> = b.split(' ').collect();
    let sorted = normalized_levenshtein(&join(tokens_a.iter()), &join(tokens_b.iter()));

    direct.max(sorted).max(token_set_ratio(&tokens_a, &tokens_b))
}

/// Token-set ratio over the shared tokens and each side's remainder.
///
/// Only applies when at least two tokens are shared; a single shared surname
/// says too little about the person.
fn token_set_ratio(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> f64 {
    let shared: Vec<&str> = a.intersection(b).copied().collect();
    if shared.len() < 2 {
        return 0.0;
    }

    let base = join(shared.iter());
    let with_rest = |tokens: &BTreeSet<&str>| {
        let rest = join(tokens.difference(&shared.iter().copied().collect()));
        format!("{} {}", base, rest).trim().to_string()
    };
    let full_a = with_rest(a);
    let full_b = with_rest(b);

    normalized_levenshtein(&base, &full_a)
        .max(normalized_levenshtein(&base, &full_b))
        .max(normalized_levenshtein(&full_a, &full_b))
}

fn join<'a, I>(tokens: I) -> String
where
    I: Iterator<Item = &'a &'a str>,
{
    tokens.copied().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Fernando   Plazas-Niño "), "fernando plazas-nino");
        assert_eq!(normalize_name("J. Smith"), "j smith");
        assert_eq!(normalize_name("O'Brien, Seán"), "obrien sean");
        assert_eq!(normalize_name("1298139487(*&^)"), "1298139487");
    }

    #[test]
    fn test_usable_name() {
        assert!(is_usable_name("Lucy"));
        assert!(!is_usable_name("   "));
        assert!(!is_usable_name("1298139487(*&^)"));
    }

    #[test]
    fn test_score_names_same() {
        assert_eq!(score_name_similarity("Will Usher", "Will Usher"), 1.0);
    }

    #[test]
    fn test_score_names_different() {
        assert_eq!(score_name_similarity("Will Usher", "1298139487(*&^)"), 0.0);
    }

    #[test]
    fn test_score_names_truncated() {
        assert!(score_name_similarity("Vignesh Sridha", "Vignesh Sridharan") > 0.8);
    }

    #[test]
    fn test_score_names_reversed() {
        assert_eq!(score_name_similarity("Sridharan Vignesh", "Vignesh Sridharan"), 1.0);
    }

    #[test]
    fn test_score_names_ignore_case() {
        assert_eq!(score_name_similarity("Sridharan Vignesh", "VIGNESH Sridharan"), 1.0);
    }

    #[test]
    fn test_score_names_similar_but_different() {
        assert!(score_name_similarity("James Sridharan", "Vignesh Sridharan") < 0.8);
    }

    #[test]
    fn test_score_names_middle_name_and_accent() {
        assert!(score_name_similarity("Fernando Antonio Plazas", "Fernando Plazas-Nino") < 0.8);
        assert!(score_name_similarity("Fernando Plazas-Niño", "Fernando Antonio Plazas-Niño") > 0.8);
        assert_eq!(score_name_similarity("Fernando Plazas-Niño", "Fernando Plazas-Nino"), 1.0);
        assert!(score_name_similarity("Fernando ANtonio Plazas", "Fernando Antonio Plazas Nino") > 0.8);
    }

    #[test]
    fn test_score_is_symmetric() {
        let pairs = [
            ("Jon Smyth", "John Smith"),
            ("Fernando Antonio Plazas", "Fernando Plazas-Nino"),
            ("Lucy Allington", "Allington L."),
            ("Vignesh Sridha", "Vignesh Sridharan"),
            ("Ana María", "Maria Ana Lopez"),
        ];
        for (a, b) in pairs {
            assert_eq!(score_name_similarity(a, b), score_name_similarity(b, a), "{} / {}", a, b);
        }
    }

    #[test]
    fn test_score_empty() {
        assert_eq!(score_name_similarity("", "Will Usher"), 0.0);
    }
}
