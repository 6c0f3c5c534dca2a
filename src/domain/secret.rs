use std::str::FromStr;

use super::errors::DomainError;

/// Lifecycle of a redeemable card secret: available → reserved → used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretStatus {
    Available,
    Reserved,
    Used,
}

impl SecretStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretStatus::Available => "available",
            SecretStatus::Reserved => "reserved",
            SecretStatus::Used => "used",
        }
    }
}

impl FromStr for SecretStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(SecretStatus::Available),
            "reserved" => Ok(SecretStatus::Reserved),
            "used" => Ok(SecretStatus::Used),
            other => Err(DomainError::Internal(format!(
                "unknown secret status '{}'",
                other
            ))),
        }
    }
}

/// Result of loading a batch of secrets into the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecretImport {
    pub imported: usize,
    pub available: i64,
}

/// Normalise an import batch: trim, drop blanks, drop duplicates while
/// keeping first-seen order.
pub fn normalize_secret_batch<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    raw.into_iter()
        .map(|s| s.as_ref().trim().to_string())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_drops_blanks_and_duplicates() {
        let batch = normalize_secret_batch(["  AAA ", "", "BBB", "AAA", "\t"]);
        assert_eq!(batch, vec!["AAA".to_string(), "BBB".to_string()]);
    }

    #[test]
    fn status_parses() {
        assert_eq!("reserved".parse::<SecretStatus>().unwrap(), SecretStatus::Reserved);
        assert!("sold".parse::<SecretStatus>().is_err());
    }
}
