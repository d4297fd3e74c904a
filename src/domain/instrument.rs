use crate::domain::payment::{CardInput, CreatePaymentRequest, PaymentMethod};
use crate::error::{GatewayError, GatewayResult};
use chrono::{DateTime, Datelike, Utc};
use regex::Regex;
use std::sync::OnceLock;

fn vpa_pattern() -> &'static Regex {
    static VPA: OnceLock<Regex> = OnceLock::new();
    VPA.get_or_init(|| Regex::new(r"^[a-zA-Z0-9._-]+@[a-zA-Z0-9]+$").expect("static vpa pattern"))
}

pub fn is_valid_vpa(vpa: &str) -> bool {
    vpa_pattern().is_match(vpa)
}

pub fn sanitize_card_number(number: &str) -> String {
    number.chars().filter(char::is_ascii_digit).collect()
}

pub fn luhn_valid(digits: &str) -> bool {
    if !(12..=19).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    let sum: u32 = digits
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let d = u32::from(b - b'0');
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();

    sum % 10 == 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardNetwork {
    Visa,
    Mastercard,
    Amex,
    Rupay,
    Unknown,
}

impl CardNetwork {
    pub fn detect(digits: &str) -> Self {
        let first_two: u32 = digits.get(..2).and_then(|s| s.parse().ok()).unwrap_or(0);

        if digits.starts_with('4') {
            CardNetwork::Visa
        } else if (51..=55).contains(&first_two) {
            CardNetwork::Mastercard
        } else if first_two == 34 || first_two == 37 {
            CardNetwork::Amex
        } else if first_two == 60 || first_two == 65 || (81..=89).contains(&first_two) {
            CardNetwork::Rupay
        } else {
            CardNetwork::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CardNetwork::Visa => "visa",
            CardNetwork::Mastercard => "mastercard",
            CardNetwork::Amex => "amex",
            CardNetwork::Rupay => "rupay",
            CardNetwork::Unknown => "unknown",
        }
    }
}

/// A card is valid through the last day of its expiry month; two digit years
/// are read as 20xx.
pub fn is_valid_expiry(month: &str, year: &str, now: DateTime<Utc>) -> bool {
    let Ok(month) = month.trim().parse::<u32>() else {
        return false;
    };
    if !(1..=12).contains(&month) {
        return false;
    }

    let year_str = year.trim();
    let Ok(mut year) = year_str.parse::<i32>() else {
        return false;
    };
    if year_str.len() == 2 {
        year += 2000;
    }

    (year, month) >= (now.year(), now.month())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedInstrument {
    pub method: PaymentMethod,
    pub vpa: Option<String>,
    pub card_network: Option<String>,
    pub card_last4: Option<String>,
}

pub fn validate_instrument(
    req: &CreatePaymentRequest,
    now: DateTime<Utc>,
) -> GatewayResult<ValidatedInstrument> {
    match PaymentMethod::parse(&req.method)? {
        PaymentMethod::Upi => {
            let vpa = req.vpa.as_deref().unwrap_or_default();
            if !is_valid_vpa(vpa) {
                return Err(GatewayError::InvalidVpa);
            }
            Ok(ValidatedInstrument {
                method: PaymentMethod::Upi,
                vpa: Some(vpa.to_string()),
                card_network: None,
                card_last4: None,
            })
        }
        PaymentMethod::Card => validate_card(req.card.as_ref(), now),
    }
}

fn validate_card(card: Option<&CardInput>, now: DateTime<Utc>) -> GatewayResult<ValidatedInstrument> {
    let card = card.ok_or(GatewayError::InvalidCard)?;
    let (Some(number), Some(month), Some(year)) = (
        card.number.as_deref(),
        card.expiry_month.as_deref(),
        card.expiry_year.as_deref(),
    ) else {
        return Err(GatewayError::InvalidCard);
    };

    let digits = sanitize_card_number(number);
    if !luhn_valid(&digits) {
        return Err(GatewayError::InvalidCard);
    }
    if !is_valid_expiry(month, year, now) {
        return Err(GatewayError::ExpiredCard);
    }

    Ok(ValidatedInstrument {
        method: PaymentMethod::Card,
        vpa: None,
        card_network: Some(CardNetwork::detect(&digits).as_str().to_string()),
        card_last4: Some(digits[digits.len() - 4..].to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn june_2026() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).unwrap()
    }

    fn card_request(number: &str, month: &str, year: &str) -> CreatePaymentRequest {
        CreatePaymentRequest {
            order_id: "order_x".to_string(),
            method: "card".to_string(),
            vpa: None,
            card: Some(CardInput {
                number: Some(number.to_string()),
                expiry_month: Some(month.to_string()),
                expiry_year: Some(year.to_string()),
                cvv: Some("123".to_string()),
                holder_name: Some("Test".to_string()),
            }),
        }
    }

    #[test]
    fn vpa_shapes() {
        assert!(is_valid_vpa("user@okhdfcbank"));
        assert!(is_valid_vpa("first.last-1_x@ybl"));
        assert!(!is_valid_vpa("@ybl"));
        assert!(!is_valid_vpa("user@"));
        assert!(!is_valid_vpa("userybl"));
        assert!(!is_valid_vpa("us er@ybl"));
        assert!(!is_valid_vpa("user@ok.hdfc"));
    }

    #[test]
    fn luhn_checks() {
        assert!(luhn_valid("4111111111111111"));
        assert!(!luhn_valid("4111111111111112"));
        assert!(luhn_valid("5555555555554444"));
        assert!(luhn_valid("378282246310005"));
        assert!(!luhn_valid("0"));
    }

    #[test]
    fn networks_by_prefix() {
        assert_eq!(CardNetwork::detect("4111111111111111"), CardNetwork::Visa);
        assert_eq!(CardNetwork::detect("5105105105105100"), CardNetwork::Mastercard);
        assert_eq!(CardNetwork::detect("371449635398431"), CardNetwork::Amex);
        assert_eq!(CardNetwork::detect("6011111111111117"), CardNetwork::Rupay);
        assert_eq!(CardNetwork::detect("8123456789012345"), CardNetwork::Rupay);
        assert_eq!(CardNetwork::detect("3566002020360505"), CardNetwork::Unknown);
    }

    #[test]
    fn expiry_compares_year_and_month() {
        let now = june_2026();
        assert!(is_valid_expiry("6", "2026", now));
        assert!(is_valid_expiry("01", "27", now));
        assert!(!is_valid_expiry("5", "2026", now));
        assert!(!is_valid_expiry("12", "2025", now));
        assert!(!is_valid_expiry("13", "2030", now));
        assert!(!is_valid_expiry("0", "2030", now));
        assert!(!is_valid_expiry("ab", "2030", now));
    }

    #[test]
    fn card_keeps_only_last4_and_network() {
        let req = card_request("4111 1111-1111 1111", "12", "2030");
        let out = validate_instrument(&req, june_2026()).unwrap();
        assert_eq!(out.card_network.as_deref(), Some("visa"));
        assert_eq!(out.card_last4.as_deref(), Some("1111"));
        assert_eq!(out.vpa, None);
    }

    #[test]
    fn card_errors_map_to_codes() {
        let bad_luhn = card_request("4111111111111112", "12", "2030");
        assert!(matches!(
            validate_instrument(&bad_luhn, june_2026()),
            Err(GatewayError::InvalidCard)
        ));

        let expired = card_request("4111111111111111", "1", "2026");
        assert!(matches!(
            validate_instrument(&expired, june_2026()),
            Err(GatewayError::ExpiredCard)
        ));

        let mut missing = card_request("4111111111111111", "12", "2030");
        missing.card = None;
        assert!(matches!(
            validate_instrument(&missing, june_2026()),
            Err(GatewayError::InvalidCard)
        ));
    }

    #[test]
    fn upi_and_unknown_methods() {
        let mut req = card_request("", "", "");
        req.method = "upi".to_string();
        req.vpa = Some("bad vpa".to_string());
        assert!(matches!(
            validate_instrument(&req, june_2026()),
            Err(GatewayError::InvalidVpa)
        ));

        req.vpa = Some("user@paytm".to_string());
        let ok = validate_instrument(&req, june_2026()).unwrap();
        assert_eq!(ok.vpa.as_deref(), Some("user@paytm"));

        req.method = "wallet".to_string();
        assert!(matches!(
            validate_instrument(&req, june_2026()),
            Err(GatewayError::InvalidMethod)
        ));
    }
}
