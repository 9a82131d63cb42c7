// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Enforces a non-empty site list with unique names.

use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::HashSet;

use super::SiteConfig;

pub fn deserialize_sites<'de, D>(deserializer: D) -> Result<NonEmpty<SiteConfig>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let sites: Vec<SiteConfig> = Vec::deserialize(deserializer)?;

    let mut seen = HashSet::new();
    for site in &sites {
        if !seen.insert(site.name.clone()) {
            return Err(serde::de::Error::custom(format!(
                "duplicate site name: {}",
                site.name
            )));
        }
    }

    NonEmpty::from_vec(sites).ok_or_else(|| serde::de::Error::custom("at least one site is required"))
}
