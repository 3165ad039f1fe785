use chrono::NaiveDate;

use brandpulse_common::{BrandPulseError, DateRange, DATE_FORMAT};

pub const MAX_BRAND_CHARS: usize = 200;

/// A scraping request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeRequest {
    pub brand: String,
    pub start_date: String,
    pub end_date: String,
    pub range: DateRange,
}

/// Brand must be non-empty and at most `MAX_BRAND_CHARS` characters; both
/// dates must be `YYYY-MM-DD` with start strictly before end.
pub fn validate_request(brand: &str, start: &str, end: &str) -> Result<ScrapeRequest, BrandPulseError> {
    let brand = brand.trim();
    if brand.is_empty() {
        return Err(BrandPulseError::Validation("brand name is required".to_string()));
    }
    if brand.chars().count() > MAX_BRAND_CHARS {
        return Err(BrandPulseError::Validation(format!(
            "brand name must be at most {MAX_BRAND_CHARS} characters"
        )));
    }

    let start_date = parse_required(start, "start date")?;
    let end_date = parse_required(end, "end date")?;
    if start_date >= end_date {
        return Err(BrandPulseError::Validation(
            "start date must be before end date".to_string(),
        ));
    }

    Ok(ScrapeRequest {
        brand: brand.to_string(),
        start_date: start_date.format(DATE_FORMAT).to_string(),
        end_date: end_date.format(DATE_FORMAT).to_string(),
        range: DateRange::new(Some(start_date), Some(end_date)),
    })
}

fn parse_required(raw: &str, what: &str) -> Result<NaiveDate, BrandPulseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(BrandPulseError::Validation(format!("{what} is required")));
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|_| BrandPulseError::Validation(format!("{what} '{raw}' is not in YYYY-MM-DD format")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_request() {
        let req = validate_request("  Acme ", "2025-01-01", "2025-01-31").unwrap();
        assert_eq!(req.brand, "Acme");
        assert_eq!(req.range.start, NaiveDate::from_ymd_opt(2025, 1, 1));
    }

    #[test]
    fn rejects_bad_brand() {
        assert!(validate_request("   ", "2025-01-01", "2025-01-31").is_err());
        let long = "a".repeat(201);
        assert!(validate_request(&long, "2025-01-01", "2025-01-31").is_err());
        assert!(validate_request(&"a".repeat(200), "2025-01-01", "2025-01-31").is_ok());
    }

    #[test]
    fn rejects_bad_dates() {
        assert!(validate_request("Acme", "", "2025-01-31").is_err());
        assert!(validate_request("Acme", "01/01/2025", "2025-01-31").is_err());
        assert!(validate_request("Acme", "2025-01-31", "2025-01-31").is_err());
        assert!(validate_request("Acme", "2025-02-01", "2025-01-31").is_err());
    }
}
