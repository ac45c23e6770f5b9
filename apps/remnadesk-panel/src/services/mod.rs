pub mod access_service;
pub mod auth_service;
pub mod backup_service;
pub mod banner_service;
pub mod client_service;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod gateway_service;
pub mod logging_service;
pub mod monitoring;
pub mod notification_service;
pub mod partner_service;
pub mod payment;
pub mod payment_service;
pub mod plan_service;
pub mod referral_service;
pub mod remnawave_sync_service;
pub mod statistics_service;
pub mod subscription_service;

use rand::Rng;

use crate::error::{AppError, AppResult};

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// `prefix` followed by `len` random uppercase alphanumerics.
pub fn generate_code(prefix: &str, len: usize) -> String {
    let mut rng = rand::rng();
    let mut code = String::with_capacity(prefix.len() + len);
    code.push_str(prefix);
    for _ in 0..len {
        let idx = rng.random_range(0..CODE_ALPHABET.len());
        code.push(CODE_ALPHABET[idx] as char);
    }
    code
}

/// Three-letter ISO code, uppercased. Defaults to USD.
pub fn normalize_currency(currency: Option<&str>) -> AppResult<String> {
    let currency = currency.map(str::trim).filter(|c| !c.is_empty()).unwrap_or("USD");
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::BadRequest(format!("invalid currency '{}'", currency)));
    }
    Ok(currency.to_ascii_uppercase())
}

/// `floor(amount * percent / 100)`, never negative. The percent is taken to
/// two decimals (basis points) so the product stays in integers.
pub fn percent_of(amount: i64, percent: f64) -> i64 {
    if amount <= 0 || !percent.is_finite() || percent <= 0.0 {
        return 0;
    }
    let basis_points = (percent * 100.0).round() as i128;
    (amount as i128 * basis_points / 10_000) as i64
}

fn database_error(err: &anyhow::Error) -> Option<&(dyn sqlx::error::DatabaseError + 'static)> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<sqlx::Error>())
        .and_then(|e| e.as_database_error())
}

pub(crate) fn is_foreign_key_violation(err: &anyhow::Error) -> bool {
    database_error(err).is_some_and(|db| db.is_foreign_key_violation())
}

pub(crate) fn is_unique_violation(err: &anyhow::Error) -> bool {
    database_error(err).is_some_and(|db| db.is_unique_violation())
}

pub fn require_non_empty(value: &str, field: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        Err(AppError::BadRequest(format!("{} must not be empty", field)))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_have_prefix_and_alphabet() {
        let code = generate_code("P", 7);
        assert_eq!(code.len(), 8);
        assert!(code.starts_with('P'));
        assert!(code[1..].bytes().all(|b| CODE_ALPHABET.contains(&b)));
        assert_ne!(generate_code("", 12), generate_code("", 12));
    }

    #[test]
    fn currency_normalization() {
        assert_eq!(normalize_currency(None).unwrap(), "USD");
        assert_eq!(normalize_currency(Some(" eur ")).unwrap(), "EUR");
        assert!(normalize_currency(Some("EURO")).is_err());
        assert!(normalize_currency(Some("U$D")).is_err());
    }

    #[test]
    fn percent_of_floors() {
        assert_eq!(percent_of(1000, 20.0), 200);
        assert_eq!(percent_of(999, 10.0), 99);
        assert_eq!(percent_of(19, 5.0), 0);
        assert_eq!(percent_of(1499, 2.5), 37);
        assert_eq!(percent_of(-100, 10.0), 0);
        assert_eq!(percent_of(100, f64::NAN), 0);
    }

    #[test]
    fn percent_of_fractional_rates_are_exact() {
        assert_eq!(percent_of(10000, 0.57), 57);
        assert_eq!(percent_of(10000, 1.15), 115);
        assert_eq!(percent_of(100, 29.0), 29);
        assert_eq!(percent_of(333, 33.33), 110);
        assert_eq!(percent_of(i64::MAX, 100.0), i64::MAX);
    }

    #[derive(Debug)]
    struct FakeDbError {
        unique: bool,
    }

    impl std::fmt::Display for FakeDbError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "constraint violated")
        }
    }

    impl std::error::Error for FakeDbError {}

    impl sqlx::error::DatabaseError for FakeDbError {
        fn message(&self) -> &str {
            "constraint violated"
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            if self.unique {
                sqlx::error::ErrorKind::UniqueViolation
            } else {
                sqlx::error::ErrorKind::ForeignKeyViolation
            }
        }
    }

    fn db_error(unique: bool) -> anyhow::Error {
        anyhow::Error::from(sqlx::Error::Database(Box::new(FakeDbError { unique }))).context("Failed to insert")
    }

    #[test]
    fn constraint_violations_are_recognised_through_context() {
        let unique = db_error(true);
        assert!(is_unique_violation(&unique));
        assert!(!is_foreign_key_violation(&unique));

        let fk = db_error(false);
        assert!(is_foreign_key_violation(&fk));
        assert!(!is_unique_violation(&fk));

        assert!(!is_unique_violation(&anyhow::anyhow!("Failed to insert")));
        assert!(!is_unique_violation(&anyhow::Error::from(sqlx::Error::RowNotFound)));
    }
}
