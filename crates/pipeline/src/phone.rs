use tracing::warn;

/// Locale-specific phone normalization.
pub trait PhonePolicy: Send + Sync {
    /// Canonical national number, or `None` when `raw` is not a usable phone.
    fn normalize(&self, raw: &str) -> Option<String>;
}

/// National numbering plan with a fixed subscriber length and a trunk
/// prefix of `0`.
#[derive(Debug, Clone)]
pub struct NationalPhonePolicy {
    country_code: String,
    length: usize,
}

impl NationalPhonePolicy {
    pub fn new(country_code: impl Into<String>, length: usize) -> Self {
        Self {
            country_code: country_code.into(),
            length,
        }
    }

    pub fn india() -> Self {
        Self::new("91", 10)
    }
}

impl PhonePolicy for NationalPhonePolicy {
    fn normalize(&self, raw: &str) -> Option<String> {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

        let national = if digits.len() > self.length
            && (digits.starts_with(&self.country_code) || digits.starts_with('0'))
        {
            &digits[digits.len() - self.length..]
        } else {
            digits.as_str()
        };

        (national.len() == self.length).then(|| national.to_string())
    }
}

/// Policy for a locale key such as `IN`. Unknown keys fall back to India.
pub fn policy_for_locale(locale: &str) -> Box<dyn PhonePolicy> {
    match locale.trim().to_uppercase().as_str() {
        "IN" => Box::new(NationalPhonePolicy::india()),
        other => {
            warn!(locale = %other, "Unknown phone locale, using IN");
            Box::new(NationalPhonePolicy::india())
        }
    }
}
