//! Shared domain enumerations aligned with persisted database enums.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;

/// Content locales served by the site.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "content_locale", rename_all = "snake_case")]
pub enum Locale {
    #[default]
    En,
    Es,
}

impl Locale {
    pub const ALL: [Locale; 2] = [Locale::En, Locale::Es];

    pub fn as_str(self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Es => "es",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Locale {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "en" | "en-us" => Ok(Locale::En),
            "es" | "es-es" | "es-mx" => Ok(Locale::Es),
            other => Err(DomainError::validation(format!(
                "unsupported locale `{other}`"
            ))),
        }
    }
}

/// Condition grade of a used club listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "item_condition", rename_all = "snake_case")]
pub enum Condition {
    Excellent,
    Good,
    Fair,
}

impl Condition {
    pub fn as_str(self) -> &'static str {
        match self {
            Condition::Excellent => "excellent",
            Condition::Good => "good",
            Condition::Fair => "fair",
        }
    }
}

/// Flavours of CMS-managed landing pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "page_kind", rename_all = "snake_case")]
pub enum PageKind {
    Seo,
    Location,
}

impl PageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PageKind::Seo => "seo",
            PageKind::Location => "location",
        }
    }
}

impl FromStr for PageKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "seo" => Ok(PageKind::Seo),
            "location" | "locations" => Ok(PageKind::Location),
            other => Err(DomainError::validation(format!(
                "unknown page kind `{other}`"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_parses_regional_variants() {
        assert_eq!("EN".parse::<Locale>().unwrap(), Locale::En);
        assert_eq!("es-MX".parse::<Locale>().unwrap(), Locale::Es);
        assert!("fr".parse::<Locale>().is_err());
    }

    #[test]
    fn page_kind_accepts_plural_location() {
        assert_eq!("locations".parse::<PageKind>().unwrap(), PageKind::Location);
        assert!("blog".parse::<PageKind>().is_err());
    }
}
