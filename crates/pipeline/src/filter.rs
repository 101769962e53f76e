use once_cell::sync::Lazy;
use regex::Regex;

static RETAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(store|showroom|boutique|mall|fashion|clothing|apparel|wear)\b")
        .expect("retail pattern regex is valid")
});

/// Why a candidate was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exclusion {
    Closed,
    RetailCategory,
    RetailName,
}

impl Exclusion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Exclusion::Closed => "closed",
            Exclusion::RetailCategory => "retail_category",
            Exclusion::RetailName => "retail_name",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Include,
    Excluded(Exclusion),
}

/// Whether a displayed status line announces a closure.
pub fn is_closed(status: &str) -> bool {
    let status = status.to_lowercase();
    status.contains("permanently closed") || status.contains("temporarily closed")
}

/// Decide whether a listing is a relevant (non-retail, open) business.
///
/// A category, when shown, is authoritative: a non-retail category keeps the
/// listing even if its name looks like a shop.
pub fn evaluate(name: &str, category: Option<&str>, status: Option<&str>) -> Verdict {
    if status.map(is_closed).unwrap_or(false) {
        return Verdict::Excluded(Exclusion::Closed);
    }

    match category.map(str::trim).filter(|c| !c.is_empty()) {
        Some(category) => {
            if RETAIL_PATTERN.is_match(category) {
                Verdict::Excluded(Exclusion::RetailCategory)
            } else {
                Verdict::Include
            }
        }
        None => {
            if RETAIL_PATTERN.is_match(name) {
                Verdict::Excluded(Exclusion::RetailName)
            } else {
                Verdict::Include
            }
        }
    }
}
