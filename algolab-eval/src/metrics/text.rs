//! Text preparation shared by the metric calculators

use std::collections::BTreeSet;

/// Function words ignored by lexical overlap
const STOPWORDS: &[&str] = &[
    "les", "des", "une", "est", "que", "qui", "quoi", "pour", "dans", "par", "sur", "avec", "pas",
    "vous", "nous", "mais", "donc", "car", "son", "ses", "leur", "leurs", "votre", "vos", "notre",
    "nos", "cette", "ces", "aux", "ont", "sont", "elle", "ils", "elles", "mon", "ton", "tes", "mes",
    "ete", "tout", "tous", "tres", "plus", "comme", "aussi", "alors", "bien", "etre", "avoir", "cela",
    "ceci", "sans", "sous", "entre", "encore", "deja", "the", "and",
];

/// Replace French diacritics with their base letter
pub fn fold_diacritics(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            'à' | 'â' | 'ä' | 'á' => out.push('a'),
            'é' | 'è' | 'ê' | 'ë' => out.push('e'),
            'î' | 'ï' | 'í' => out.push('i'),
            'ô' | 'ö' | 'ó' => out.push('o'),
            'ù' | 'û' | 'ü' | 'ú' => out.push('u'),
            'ç' => out.push('c'),
            'ÿ' => out.push('y'),
            'œ' => out.push_str("oe"),
            'æ' => out.push_str("ae"),
            'À' | 'Â' | 'Ä' => out.push('A'),
            'É' | 'È' | 'Ê' | 'Ë' => out.push('E'),
            'Î' | 'Ï' => out.push('I'),
            'Ô' | 'Ö' => out.push('O'),
            'Ù' | 'Û' | 'Ü' => out.push('U'),
            'Ç' => out.push('C'),
            other => out.push(other),
        }
    }
    out
}

/// Lower-case, fold diacritics, join elisions (`d'accord` -> `daccord`),
/// turn punctuation into spaces and collapse whitespace
pub fn normalize(text: &str) -> String {
    let folded = fold_diacritics(&text.to_lowercase());
    let cleaned: String = folded
        .chars()
        .filter(|c| *c != '\'' && *c != '’')
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Content tokens: normalized, at least 3 characters, stopwords removed
pub fn tokenize(text: &str) -> Vec<String> {
    normalize(text)
        .split(' ')
        .filter(|t| t.chars().count() >= 3 && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

pub fn token_set(text: &str) -> BTreeSet<String> {
    tokenize(text).into_iter().collect()
}

/// |A ∩ B| / |A ∪ B|, 0 when both are empty
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Sorted intersection
pub fn shared(a: &BTreeSet<String>, b: &BTreeSet<String>) -> Vec<String> {
    a.intersection(b).cloned().collect()
}

/// Whitespace-delimited word count
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// First `n` characters (char boundary safe)
pub fn prefix(word: &str, n: usize) -> &str {
    match word.char_indices().nth(n) {
        Some((idx, _)) => &word[..idx],
        None => word,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_folds_and_joins_elisions() {
        assert_eq!(normalize("D'accord, TRÈS bien !"), "daccord tres bien");
        assert_eq!(normalize("  ça   marche… "), "ca marche");
    }

    #[test]
    fn test_tokenize_drops_short_words_and_stopwords() {
        assert_eq!(
            tokenize("je vais vérifier votre dossier"),
            vec!["vais", "verifier", "dossier"]
        );
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_jaccard_and_shared() {
        let a = token_set("je vais vérifier votre dossier");
        let b = token_set("vérifier le dossier oui");
        assert!((jaccard(&a, &b) - 0.5).abs() < 1e-9);
        assert_eq!(shared(&a, &b), vec!["dossier", "verifier"]);
        assert_eq!(jaccard(&BTreeSet::new(), &BTreeSet::new()), 0.0);
    }

    #[test]
    fn test_prefix_is_char_safe() {
        assert_eq!(prefix("vérification", 4), "véri");
        assert_eq!(prefix("ok", 5), "ok");
    }
}
