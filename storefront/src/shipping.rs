use crate::shop_settings::ShippingConfig;

/// Flattened shipping quote. Computed fresh from the current `ShippingConfig`
/// and destination on every checkout — never from a cached cart snapshot
/// (see design note: "cart hydration").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShippingQuote {
    pub sats: u64,
}

/// Resolves `(destination, settings) -> quote` without back-references: the
/// most specific zone wins (country override > continent > domestic >
/// "ALL" fallback), matching country codes case-insensitively by
/// upper-casing before comparison.
pub fn quote(country: &str, cfg: &ShippingConfig) -> ShippingQuote {
    let country = country.to_uppercase();

    if let Some(domestic) = &cfg.domestic_country {
        if domestic.to_uppercase() == country {
            return ShippingQuote { sats: cfg.domestic_sats };
        }
    }

    if let Some(sats) = cfg
        .country_overrides
        .iter()
        .find(|(k, _)| k.to_uppercase() == country)
        .map(|(_, v)| *v)
    {
        return ShippingQuote { sats };
    }

    if let Some(continent) = continent_for(&country) {
        if let Some(sats) = cfg
            .continent_sats
            .iter()
            .find(|(k, _)| k.to_uppercase() == continent)
            .map(|(_, v)| *v)
        {
            return ShippingQuote { sats };
        }
    }

    let fallback = cfg
        .country_overrides
        .iter()
        .find(|(k, _)| k.to_uppercase() == "ALL")
        .map(|(_, v)| *v)
        .unwrap_or(0);
    ShippingQuote { sats: fallback }
}

/// Minimal ISO-3166-1 alpha-2 -> continent mapping sufficient to resolve
/// continent-tier shipping without a full geo database; unmapped codes fall
/// through to the "ALL" zone.
fn continent_for(country: &str) -> Option<&'static str> {
    const EUROPE: &[&str] = &[
        "IT", "DE", "FR", "ES", "PT", "NL", "BE", "AT", "CH", "IE", "SE", "NO", "FI", "DK", "PL",
        "GR", "CZ", "SK", "HU", "RO", "BG", "GB",
    ];
    const NORTH_AMERICA: &[&str] = &["US", "CA", "MX"];
    const ASIA: &[&str] = &["JP", "CN", "KR", "IN", "SG", "HK", "TW", "TH", "VN"];
    const OCEANIA: &[&str] = &["AU", "NZ"];
    const SOUTH_AMERICA: &[&str] = &["BR", "AR", "CL", "CO", "PE"];

    if EUROPE.contains(&country) {
        Some("EUROPE")
    } else if NORTH_AMERICA.contains(&country) {
        Some("NORTH_AMERICA")
    } else if ASIA.contains(&country) {
        Some("ASIA")
    } else if OCEANIA.contains(&country) {
        Some("OCEANIA")
    } else if SOUTH_AMERICA.contains(&country) {
        Some("SOUTH_AMERICA")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cfg() -> ShippingConfig {
        ShippingConfig {
            domestic_country: Some("it".to_string()),
            domestic_sats: 100,
            continent_sats: HashMap::from([("EUROPE".to_string(), 300)]),
            country_overrides: HashMap::from([
                ("DE".to_string(), 250),
                ("ALL".to_string(), 900),
            ]),
        }
    }

    #[test]
    fn domestic_matches_case_insensitively() {
        assert_eq!(quote("IT", &cfg()).sats, 100);
        assert_eq!(quote("it", &cfg()).sats, 100);
    }

    #[test]
    fn country_override_beats_continent() {
        assert_eq!(quote("DE", &cfg()).sats, 250);
    }

    #[test]
    fn continent_applies_when_no_override() {
        assert_eq!(quote("FR", &cfg()).sats, 300);
    }

    #[test]
    fn unmapped_country_falls_back_to_all() {
        assert_eq!(quote("ZZ", &cfg()).sats, 900);
    }
}
