//! Tiered carrier name resolution.
//!
//! Free-text carrier input (a code, a display name, or something close to
//! one) is matched against the vocabulary by an ordered cascade of pure
//! matchers; the first tier that produces a hit wins. The substring and
//! token-overlap constants are tuning policy, not correctness logic.

use regex::Regex;

use crate::carriers::registry::CarrierEntry;

/// Minimum token-overlap score for the final tier.
const TOKEN_OVERLAP_THRESHOLD: f64 = 0.5;

/// Tokens too generic to signal a specific carrier.
const STOP_WORDS: &[&str] = &["express", "post", "courier", "delivery", "logistics", "shipping"];

/// Deployment-level aliasing applied before the tiered match: sub-brands
/// that always map to a parent code, and tracking-number prefixes that
/// force a code. Data, not algorithm.
pub struct AliasRules {
    /// Lowercased carrier text -> code.
    name_aliases: Vec<(String, String)>,
    /// Tracking-number pattern -> code. Checked before name aliases.
    tracking_rules: Vec<(Regex, String)>,
}

impl Default for AliasRules {
    fn default() -> Self {
        let mut rules = Self::empty();
        // Dragonfly is Intelcom's consumer brand.
        rules.add_name_alias("dragonfly", "intelc");
        // "JY…" numbers are UniUni last-mile deliveries (often AliExpress
        // shipments); trust the number over the claimed carrier.
        rules.add_tracking_rule(r"^JY", "uniuni");
        rules
    }
}

impl AliasRules {
    /// No aliasing at all.
    pub fn empty() -> Self {
        Self {
            name_aliases: Vec::new(),
            tracking_rules: Vec::new(),
        }
    }

    pub fn add_name_alias(&mut self, carrier_text: &str, code: &str) {
        self.name_aliases
            .push((carrier_text.to_lowercase(), code.to_string()));
    }

    /// Panics on an invalid pattern; rules are static configuration.
    pub fn add_tracking_rule(&mut self, pattern: &str, code: &str) {
        let regex = Regex::new(pattern).expect("invalid tracking alias pattern");
        self.tracking_rules.push((regex, code.to_string()));
    }

    /// First matching rule's code, tracking rules before name aliases.
    pub fn apply(&self, carrier_text: &str, tracking_number: &str) -> Option<&str> {
        for (regex, code) in &self.tracking_rules {
            if regex.is_match(tracking_number) {
                return Some(code);
            }
        }
        let needle = carrier_text.trim().to_lowercase();
        self.name_aliases
            .iter()
            .find(|(alias, _)| *alias == needle)
            .map(|(_, code)| code.as_str())
    }
}

/// Resolve free-text input against a fixed vocabulary.
///
/// Tiers, first hit wins: exact code, exact display name, substring
/// containment (shortest name), token overlap (highest score).
pub fn resolve_in(entries: &[CarrierEntry], input: &str) -> Option<String> {
    let needle = input.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    let tiers: [fn(&[CarrierEntry], &str) -> Option<usize>; 4] = [
        match_exact_code,
        match_exact_name,
        match_substring,
        match_token_overlap,
    ];
    tiers
        .iter()
        .find_map(|tier| tier(entries, &needle))
        .map(|i| entries[i].code.clone())
}

/// Tier 1: the input is a canonical code.
fn match_exact_code(entries: &[CarrierEntry], needle: &str) -> Option<usize> {
    entries
        .iter()
        .position(|e| e.code.eq_ignore_ascii_case(needle))
}

/// Tier 2: the input is a display name, ignoring case.
fn match_exact_name(entries: &[CarrierEntry], needle: &str) -> Option<usize> {
    entries
        .iter()
        .position(|e| e.name.to_lowercase() == needle)
}

/// Tier 3: substring containment either direction. The shortest matching
/// display name wins, so a shared brand prefix resolves to the generic
/// service rather than a longer specific one. First-seen breaks ties.
fn match_substring(entries: &[CarrierEntry], needle: &str) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (i, entry) in entries.iter().enumerate() {
        let name = entry.name.to_lowercase();
        if !name.contains(needle) && !needle.contains(name.as_str()) {
            continue;
        }
        if best.map(|(_, len)| name.len() < len).unwrap_or(true) {
            best = Some((i, name.len()));
        }
    }
    best.map(|(i, _)| i)
}

/// Tier 4: token-overlap scoring. Both sides are tokenized on
/// whitespace/hyphen/ampersand with generic stop-words dropped;
/// score = |shared| / max(|input|, |name|). Highest score at or above
/// the threshold wins; ties go to the shorter name, then first-seen.
fn match_token_overlap(entries: &[CarrierEntry], needle: &str) -> Option<usize> {
    let input_tokens = tokenize(needle);
    if input_tokens.is_empty() {
        return None;
    }

    let mut best: Option<(usize, f64, usize)> = None;
    for (i, entry) in entries.iter().enumerate() {
        let name = entry.name.to_lowercase();
        let name_tokens = tokenize(&name);
        if name_tokens.is_empty() {
            continue;
        }

        let shared = input_tokens
            .iter()
            .filter(|t| name_tokens.contains(*t))
            .count();
        let score = shared as f64 / input_tokens.len().max(name_tokens.len()) as f64;
        if score < TOKEN_OVERLAP_THRESHOLD {
            continue;
        }

        let better = match best {
            None => true,
            Some((_, best_score, best_len)) => {
                score > best_score || (score == best_score && name.len() < best_len)
            }
        };
        if better {
            best = Some((i, score, name.len()));
        }
    }
    best.map(|(i, _, _)| i)
}

fn tokenize(s: &str) -> Vec<&str> {
    s.split(|c: char| c.is_whitespace() || c == '-' || c == '&')
        .filter(|t| !t.is_empty() && !STOP_WORDS.contains(t))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocabulary() -> Vec<CarrierEntry> {
        [
            ("ups", "UPS"),
            ("fedex", "FedEx"),
            ("usps", "USPS"),
            ("dhl", "DHL Express"),
            ("dhlgm", "DHL Global Mail"),
            ("amzlus", "Amazon US"),
            ("amzlca", "Amazon Canada"),
            ("ont", "OnTrac"),
            ("laser", "OnTrac - Lasership"),
            ("cp", "Canada Post"),
            ("canpar", "Canpar"),
            ("puro", "Purolator"),
            ("intelc", "Dragonfly - Intelcom"),
            ("loom", "Loomis Express"),
            ("dicom", "GLS Canada"),
            ("nationex", "Nationex"),
            ("ics", "ICS Courier"),
            ("rm", "Royal Mail"),
            ("au", "Australia Post"),
            ("pbi", "PBI - Pitney Bowes"),
        ]
        .into_iter()
        .map(|(code, name)| CarrierEntry {
            code: code.into(),
            name: name.into(),
        })
        .collect()
    }

    #[test]
    fn matches_by_exact_code() {
        let vocab = vocabulary();
        assert_eq!(resolve_in(&vocab, "ups"), Some("ups".into()));
        assert_eq!(resolve_in(&vocab, "fedex"), Some("fedex".into()));
    }

    #[test]
    fn matches_by_exact_name_case_insensitive() {
        let vocab = vocabulary();
        assert_eq!(resolve_in(&vocab, "FedEx"), Some("fedex".into()));
        assert_eq!(resolve_in(&vocab, "FEDEX"), Some("fedex".into()));
        assert_eq!(resolve_in(&vocab, "Canada Post"), Some("cp".into()));
        assert_eq!(resolve_in(&vocab, "canada post"), Some("cp".into()));
        assert_eq!(resolve_in(&vocab, "Loomis Express"), Some("loom".into()));
    }

    #[test]
    fn matches_by_substring_preferring_shortest_name() {
        let vocab = vocabulary();
        // "DHL" is contained in both DHL names; the shorter one wins.
        assert_eq!(resolve_in(&vocab, "DHL"), Some("dhl".into()));
        assert_eq!(match_substring(&vocab, "dhl"), Some(3));
        // Input containing the name also counts.
        assert_eq!(resolve_in(&vocab, "Purolator Inc."), Some("puro".into()));
        assert_eq!(resolve_in(&vocab, "Intelcom"), Some("intelc".into()));
    }

    #[test]
    fn matches_by_token_overlap() {
        let vocab = vocabulary();
        // Not a substring either direction; token overlap is 1.0.
        assert_eq!(resolve_in(&vocab, "global mail DHL"), Some("dhlgm".into()));
    }

    #[test]
    fn amazon_resolves_to_shorter_of_tied_names() {
        let vocab = vocabulary();
        assert_eq!(resolve_in(&vocab, "Amazon"), Some("amzlus".into()));
    }

    #[test]
    fn token_overlap_tie_breaks_on_name_length() {
        let vocab = vocabulary();
        // Both Amazon entries score 0.5 against "amazon"; "Amazon US"
        // is shorter than "Amazon Canada".
        assert_eq!(match_token_overlap(&vocab, "amazon"), Some(5));
    }

    #[test]
    fn token_overlap_below_threshold_is_rejected() {
        let vocab = vocabulary();
        // {amazon, prime, video} shares one token of three: 0.33 < 0.5.
        assert_eq!(resolve_in(&vocab, "Amazon Prime Video"), None);
    }

    #[test]
    fn trims_and_lowercases_input() {
        let vocab = vocabulary();
        assert_eq!(resolve_in(&vocab, "  UPS  "), Some("ups".into()));
    }

    #[test]
    fn unknown_carrier_is_unresolved() {
        let vocab = vocabulary();
        assert_eq!(resolve_in(&vocab, "Totally Fake Carrier"), None);
        assert_eq!(resolve_in(&vocab, ""), None);
        assert_eq!(resolve_in(&vocab, "   "), None);
    }

    #[test]
    fn stop_words_are_ignored_in_token_overlap() {
        let vocab = vocabulary();
        // "loomis" vs "Loomis Express" -> {loomis} both sides after
        // stop-word removal, score 1.0.
        assert_eq!(match_token_overlap(&vocab, "loomis shipping"), Some(13));
    }

    #[test]
    fn alias_rules_tracking_prefix_beats_name_alias() {
        let rules = AliasRules::default();
        assert_eq!(rules.apply("Dragonfly", "D123"), Some("intelc"));
        assert_eq!(rules.apply("Dragonfly", "JY25CA10A002279541"), Some("uniuni"));
        assert_eq!(rules.apply("UPS", "1Z999AA10123456784"), None);
    }

    #[test]
    fn alias_rules_are_case_insensitive_on_names() {
        let rules = AliasRules::default();
        assert_eq!(rules.apply("  dragonfly ", "D123"), Some("intelc"));
    }

    #[test]
    fn empty_alias_rules_match_nothing() {
        let rules = AliasRules::empty();
        assert_eq!(rules.apply("Dragonfly", "JY123"), None);
    }
}
