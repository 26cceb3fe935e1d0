//! Text normalisation shared by vendor names and bank labels.

/// Tokens that carry no identifying signal: legal-entity suffixes, payment
/// method markers found in bank labels, and short function words.
const STOP_WORDS: &[&str] = &[
    // legal entity suffixes
    "sa", "sas", "sasu", "sarl", "eurl", "sci", "snc", "inc", "ltd", "llc", "gmbh", "corp",
    "co", "plc", "bv",
    // payment method markers
    "cb", "carte", "prlv", "prelevement", "prélèvement", "vir", "virement", "sepa", "paiement",
    "tpe", "achat", "card", "payment", "transfer", "dd",
    // function words
    "de", "du", "des", "la", "le", "les", "et", "en", "au", "aux", "the", "of", "and", "for",
];

/// Lowercases, turns punctuation into spaces, and drops stop words and
/// tokens shorter than two characters.
pub fn tokens(text: &str) -> Vec<String> {
    let lowered: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    lowered
        .split_whitespace()
        .filter(|t| t.chars().count() >= 2)
        .filter(|t| !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Normalised form as a single space-separated string.
pub fn normalize(text: &str) -> String {
    tokens(text).join(" ")
}
