//! Static carrier exclusion policy.
//!
//! The downstream tracker's registry covers every carrier it can render,
//! most of which can never deliver to this deployment's recipients. Codes
//! listed here are removed from the vocabulary before caching, so neither
//! the classifier nor the resolver ever matches on them.
//!
//! Maintenance: fetch the live carrier map and diff it against these
//! entries. Drop codes the registry no longer serves, and consider adding
//! new codes that are clearly irrelevant for a Canadian recipient
//! (regional last-mile carriers in distant countries, freight/B2B
//! services, non-shipping platforms). Keep international postal services
//! and cross-border shippers — they can carry inbound packages.

/// Code prefixes removed from the vocabulary.
const EXCLUDED_PREFIXES: &[&str] = &[
    "amzl",   // Amazon regional last-mile
    "amship", // Amazon Shipping
];

/// Exact codes removed from the vocabulary.
const EXCLUDED_CODES: &[&str] = &[
    // Food delivery / non-shipping
    "doordash", "pholder",
    // Freight / B2B logistics (not consumer parcels)
    "abf", "ceva", "dachser", "dsv", "geodis", "mscgva", "pilot", "safmar", "sch", "seabour",
    "straight", "pfl", "syncreon",
    // Russia / CIS regional
    "rp", "ems", "edos", "boxb", "shiptor", "fivepost", "dellin", "pec", "energia", "major",
    "blp", "kz", "azer", "moldov", "newp", "ukr",
    // Middle East / Africa regional
    "naqel", "smsa", "saudi", "emirates", "imile", "jordan", "safr", "il",
    // South / SE Asia regional last-mile
    "dtdc", "bluedart", "in", "kerry", "thai", "skynetm", "malpos", "phlpost", "indon",
    "bluecare",
    // Latin America regional
    "oca", "chilex", "colomb", "corm", "estafe", "redpack", "paquet", "serpost", "corurg",
    "corbra", "vasp",
    // Eastern Europe regional last-mile
    "econt", "bolg", "serbia", "hr", "hrpar", "hung", "ceska", "slovak", "slv", "litva", "ee",
    "lv", "cypr", "geniki", "elta", "venipak",
    // Oceania regional last-mile
    "airroad", "star", "fastau", "tntau", "couple", "northline", "allied", "sendle", "coup",
    "fastnz", "pbt", "parcelpnt",
    // Spain / Italy domestic last-mile
    "acs", "asmred", "celeritas", "chrexp", "cor", "envia", "mrw", "nacex", "seur", "tipsac",
    "tourline", "zel", "bartol", "glsit",
    // Malta / Turkey / Pakistan
    "malta", "turk", "pk",
    // UK / Germany heavy goods & niche
    "arrowxl", "dx", "her2mann",
    // Niche air cargo
    "hawai", "koreanair",
];

/// Whether a carrier code is excluded from the cached vocabulary.
pub fn is_excluded(code: &str) -> bool {
    EXCLUDED_PREFIXES.iter().any(|p| code.starts_with(p))
        || EXCLUDED_CODES.contains(&code)
}

/// Whether a carrier is tracked through the recipient's own retailer
/// account rather than this pipeline (Amazon logs deliveries itself).
/// Such deliveries are skipped without calling the submission API.
pub fn is_self_tracked(code: &str) -> bool {
    code == "amazon" || code.starts_with("amzl") || code.starts_with("amship")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_by_prefix() {
        assert!(is_excluded("amzlus"));
        assert!(is_excluded("amzlca"));
        assert!(is_excluded("amship_uk"));
    }

    #[test]
    fn excludes_by_exact_code() {
        assert!(is_excluded("doordash"));
        assert!(is_excluded("seur"));
        assert!(!is_excluded("ups"));
        assert!(!is_excluded("cp"));
    }

    #[test]
    fn exact_codes_do_not_match_as_prefixes() {
        // "in" (India Post) must not drag down "intelc" (Intelcom)
        assert!(is_excluded("in"));
        assert!(!is_excluded("intelc"));
    }

    #[test]
    fn self_tracked_is_amazon_only() {
        assert!(is_self_tracked("amazon"));
        assert!(is_self_tracked("amzlus"));
        assert!(!is_self_tracked("ups"));
        assert!(!is_self_tracked("uniuni"));
    }
}
