//! Merchant/counterparty text fingerprints and their similarity.

use std::collections::BTreeMap;

/// Upper-cased, diacritics-folded tokens with banking noise removed.
///
/// Returns `None` when nothing comparable remains.
pub fn fingerprint(value: &str) -> Option<String> {
    let normalized = normalize_text(value)?;
    let stable_tokens = normalized
        .split_whitespace()
        .filter(|token| !is_noise_token(token) && !is_terminal_id(token))
        .collect::<Vec<&str>>();

    if stable_tokens.is_empty() {
        // A merchant that is literally a city or a legal form still carries
        // signal; fall back to the digit-free normalized text.
        let fallback = normalized
            .split_whitespace()
            .filter(|token| !is_terminal_id(token))
            .collect::<Vec<&str>>();
        if fallback.is_empty() {
            return None;
        }
        return Some(fallback.join(" "));
    }

    Some(stable_tokens.join(" "))
}

/// Similarity in [0,1] between two fingerprints.
///
/// Normalized Levenshtein distance, lifted to `0.9 * coverage` when every
/// token of the shorter side also appears on the longer side.
pub fn similarity(left: &str, right: &str) -> f64 {
    if left == right {
        return 1.0;
    }

    let left_len = left.chars().count();
    let right_len = right.chars().count();
    let longest = left_len.max(right_len);
    if longest == 0 {
        return 0.0;
    }

    let distance = levenshtein_distance(left, right);
    let edit_similarity = 1.0 - (distance as f64 / longest as f64);

    edit_similarity.max(0.9 * token_coverage(left, right))
}

/// User-maintained spellings that name the same merchant, e.g. `MGB` and
/// `Migros`, keyed by fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MerchantAliases {
    canonical_by_alias: BTreeMap<String, String>,
    /// Alias keys with the most tokens first, so `MIGROS MARKT` wins over
    /// `MIGROS` inside a longer text.
    replacement_order: Vec<String>,
}

impl MerchantAliases {
    /// Pairs whose alias or canonical side has no fingerprint are skipped.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut canonical_by_alias = BTreeMap::new();
        for (alias, canonical) in pairs {
            if let (Some(alias_key), Some(canonical_key)) = (fingerprint(alias), fingerprint(canonical))
                && alias_key != canonical_key
            {
                canonical_by_alias.insert(alias_key, canonical_key);
            }
        }

        let mut replacement_order = canonical_by_alias.keys().cloned().collect::<Vec<String>>();
        replacement_order.sort_by(|left, right| {
            token_count(right)
                .cmp(&token_count(left))
                .then_with(|| left.cmp(right))
        });
        Self {
            canonical_by_alias,
            replacement_order,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.canonical_by_alias.is_empty()
    }

    /// Rewrites whole-token alias occurrences inside a fingerprint.
    pub fn canonicalize(&self, fingerprint: String) -> String {
        if let Some(canonical) = self.canonical_by_alias.get(&fingerprint) {
            return canonical.clone();
        }

        let mut padded = format!(" {fingerprint} ");
        for alias in &self.replacement_order {
            let needle = format!(" {alias} ");
            if padded.contains(&needle)
                && let Some(canonical) = self.canonical_by_alias.get(alias)
            {
                padded = padded.replace(&needle, &format!(" {canonical} "));
            }
        }
        padded.trim().to_string()
    }
}

/// [`fingerprint`] with merchant aliases applied.
pub fn canonical_fingerprint(value: &str, aliases: &MerchantAliases) -> Option<String> {
    let base = fingerprint(value)?;
    if aliases.is_empty() {
        return Some(base);
    }
    Some(aliases.canonicalize(base))
}

fn token_count(value: &str) -> usize {
    value.split_whitespace().count()
}

fn token_coverage(left: &str, right: &str) -> f64 {
    let left_tokens = left.split_whitespace().collect::<Vec<&str>>();
    let right_tokens = right.split_whitespace().collect::<Vec<&str>>();
    let (shorter, longer) = if left_tokens.len() <= right_tokens.len() {
        (left_tokens, right_tokens)
    } else {
        (right_tokens, left_tokens)
    };
    if shorter.is_empty() {
        return 0.0;
    }

    let shared = shorter
        .iter()
        .filter(|token| longer.contains(token))
        .count();
    if shared < shorter.len() {
        return 0.0;
    }
    shared as f64 / longer.len() as f64
}

fn normalize_text(value: &str) -> Option<String> {
    let mut output = String::new();
    let mut previous_space = false;
    for character in value.trim().chars() {
        if let Some(folded) = fold_diacritic(character) {
            output.push_str(folded);
            previous_space = false;
        } else if character.is_alphanumeric() {
            output.extend(character.to_uppercase());
            previous_space = false;
        } else if !previous_space {
            output.push(' ');
            previous_space = true;
        }
    }

    let normalized = output.trim().to_string();
    if normalized.is_empty() {
        return None;
    }
    Some(normalized)
}

/// Latin letters with diacritics, folded to their ASCII base.
fn fold_diacritic(character: char) -> Option<&'static str> {
    if character.is_ascii() {
        return None;
    }
    let lower = character.to_lowercase().next().unwrap_or(character);
    let folded = match lower {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "A",
        'æ' => "AE",
        'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' => "C",
        'ď' | 'đ' | 'ð' => "D",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => "E",
        'ĝ' | 'ğ' | 'ġ' | 'ģ' => "G",
        'ĥ' | 'ħ' => "H",
        'ì' | 'í' | 'î' | 'ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' | 'ı' => "I",
        'ĳ' => "IJ",
        'ĵ' => "J",
        'ķ' => "K",
        'ĺ' | 'ļ' | 'ľ' | 'ŀ' | 'ł' => "L",
        'ñ' | 'ń' | 'ņ' | 'ň' => "N",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ŏ' | 'ő' => "O",
        'œ' => "OE",
        'ŕ' | 'ŗ' | 'ř' => "R",
        'ś' | 'ŝ' | 'ş' | 'š' | 'ș' => "S",
        'ß' => "SS",
        'ţ' | 'ť' | 'ŧ' | 'ț' => "T",
        'þ' => "TH",
        'ù' | 'ú' | 'û' | 'ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' => "U",
        'ŵ' => "W",
        'ý' | 'ÿ' | 'ŷ' => "Y",
        'ź' | 'ż' | 'ž' => "Z",
        _ => return None,
    };
    Some(folded)
}

/// Digit runs and mixed tokens carrying three or more digits (terminal ids,
/// card suffixes, receipt numbers).
fn is_terminal_id(token: &str) -> bool {
    let digits = token
        .chars()
        .filter(|character| character.is_ascii_digit())
        .count();
    digits == token.len() || digits >= 3
}

fn is_noise_token(token: &str) -> bool {
    is_card_noise(token) || is_legal_form(token) || is_swiss_city(token)
}

fn is_card_noise(token: &str) -> bool {
    matches!(
        token,
        "POS"
            | "EFT"
            | "DEBIT"
            | "CARD"
            | "KARTE"
            | "CARTE"
            | "PURCHASE"
            | "EINKAUF"
            | "ACHAT"
            | "ACQUISTO"
            | "ZAHLUNG"
            | "PAIEMENT"
            | "PAGAMENTO"
            | "PAYMENT"
            | "ONLINE"
            | "TWINT"
            | "MAESTRO"
            | "VISA"
            | "MASTERCARD"
            | "MC"
            | "DEBITMASTERCARD"
            | "VPAY"
            | "TERMINAL"
            | "TERM"
            | "TRX"
            | "TXN"
            | "AUTH"
            | "PENDING"
            | "NR"
            | "NO"
            | "REF"
            | "CHF"
            | "EUR"
            | "USD"
            | "GBP"
    )
}

fn is_legal_form(token: &str) -> bool {
    matches!(
        token,
        "SA" | "AG" | "GMBH" | "SARL" | "SAGL" | "SRL" | "SPA" | "LTD" | "INC" | "LLC" | "KG"
            | "CO" | "CIE" | "GENOSSENSCHAFT" | "CH" | "CHE"
    )
}

fn is_swiss_city(token: &str) -> bool {
    matches!(
        token,
        "ZURICH"
            | "ZUERICH"
            | "GENEVE"
            | "GENEVA"
            | "GENF"
            | "GINEVRA"
            | "LAUSANNE"
            | "BERN"
            | "BERNE"
            | "BASEL"
            | "BALE"
            | "LUZERN"
            | "LUCERNE"
            | "WINTERTHUR"
            | "LUGANO"
            | "BIEL"
            | "BIENNE"
            | "THUN"
            | "FRIBOURG"
            | "FREIBURG"
            | "NEUCHATEL"
            | "SION"
            | "CHUR"
            | "ZUG"
            | "MONTREUX"
            | "VEVEY"
            | "YVERDON"
            | "NYON"
            | "MORGES"
            | "RENENS"
            | "CAROUGE"
            | "AARAU"
            | "OLTEN"
            | "BADEN"
            | "SCHAFFHAUSEN"
            | "LOCARNO"
            | "BELLINZONA"
            | "USTER"
            | "KLOTEN"
            | "DUBENDORF"
            | "EMMEN"
            | "KRIENS"
    )
}

fn levenshtein_distance(left: &str, right: &str) -> usize {
    if left == right {
        return 0;
    }

    if left.is_empty() {
        return right.chars().count();
    }

    if right.is_empty() {
        return left.chars().count();
    }

    let right_chars = right.chars().collect::<Vec<char>>();
    let mut previous = (0..=right_chars.len()).collect::<Vec<usize>>();

    for (left_index, left_char) in left.chars().enumerate() {
        let mut current = vec![left_index + 1];

        for (right_index, right_char) in right_chars.iter().enumerate() {
            let insertion = current[right_index] + 1;
            let deletion = previous[right_index + 1] + 1;
            let substitution = previous[right_index] + usize::from(left_char != *right_char);
            current.push(insertion.min(deletion).min(substitution));
        }

        previous = current;
    }

    previous[right_chars.len()]
}
