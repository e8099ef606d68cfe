/*!
 * Terminology checks on finished translations.
 *
 * Consistency of domain terms is only requested in the prompt. These checks
 * report likely misses so they can be logged; nothing is rewritten.
 */

/// Domain terms that look like proper nouns, occur in `source` and are
/// absent from `translated` (case-insensitive).
///
/// Lowercase terms are skipped since they are usually translated.
pub fn missing_terms<'a>(terms: &'a [String], source: &str, translated: &str) -> Vec<&'a str> {
    let source = source.to_lowercase();
    let translated = translated.to_lowercase();

    terms
        .iter()
        .filter(|term| term.chars().next().is_some_and(char::is_uppercase))
        .filter(|term| {
            let needle = term.to_lowercase();
            source.contains(&needle) && !translated.contains(&needle)
        })
        .map(String::as_str)
        .collect()
}
