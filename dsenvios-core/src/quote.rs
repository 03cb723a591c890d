//! Local shipping quotes
//!
//! Flat tariff in quetzales: base fee, per-kilogram rate, a fixed distance
//! surcharge, and 1% of the declared value. Express costs 1.5x standard.

use serde::{Deserialize, Serialize};

use crate::validation::{required_text, ValidationError};

pub const CURRENCY: &str = "GTQ";
pub const BASE_RATE: f64 = 15.00;
pub const RATE_PER_KG: f64 = 2.50;
pub const DISTANCE_RATE: f64 = 5.00;
pub const DECLARED_VALUE_RATE: f64 = 0.01;
pub const EXPRESS_FACTOR: f64 = 1.5;

const MAX_PLACE_LEN: usize = 120;

/// Package dimensions are recorded with the quote but do not affect the price.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageDetails {
    pub weight_kg: f64,
    pub length_cm: Option<f64>,
    pub width_cm: Option<f64>,
    pub height_cm: Option<f64>,
    pub declared_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub origin: String,
    pub destination: String,
    pub package: PackageDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceOption {
    pub service_id: String,
    pub name: String,
    pub cost: f64,
    pub delivery_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub total_cost: f64,
    pub currency: String,
    pub estimated_delivery: String,
    pub services: Vec<ServiceOption>,
}

fn non_negative(field: &'static str, value: Option<f64>) -> Result<(), ValidationError> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(ValidationError::OutOfRange {
            field,
            reason: format!("must not be negative, got {}", v),
        }),
        _ => Ok(()),
    }
}

fn cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

impl QuoteRequest {
    pub fn validate(self) -> Result<Self, ValidationError> {
        let package = self.package;
        if !package.weight_kg.is_finite() || package.weight_kg <= 0.0 {
            return Err(ValidationError::OutOfRange {
                field: "peso",
                reason: format!("must be greater than zero, got {}", package.weight_kg),
            });
        }
        non_negative("largo", package.length_cm)?;
        non_negative("ancho", package.width_cm)?;
        non_negative("alto", package.height_cm)?;
        non_negative("valor_declarado", package.declared_value)?;

        Ok(Self {
            origin: required_text("origen", &self.origin, MAX_PLACE_LEN)?,
            destination: required_text("destino", &self.destination, MAX_PLACE_LEN)?,
            package,
        })
    }

    /// Price this request. Amounts are rounded to cents.
    pub fn quote(&self) -> Quote {
        let package = &self.package;
        let standard = BASE_RATE
            + package.weight_kg * RATE_PER_KG
            + DISTANCE_RATE
            + package.declared_value.unwrap_or(0.0) * DECLARED_VALUE_RATE;
        let standard = cents(standard);

        Quote {
            total_cost: standard,
            currency: CURRENCY.to_string(),
            estimated_delivery: "3-5 días laborales".to_string(),
            services: vec![
                ServiceOption {
                    service_id: "standard".to_string(),
                    name: "Envío Estándar".to_string(),
                    cost: standard,
                    delivery_time: "3-5 días".to_string(),
                },
                ServiceOption {
                    service_id: "express".to_string(),
                    name: "Envío Express".to_string(),
                    cost: cents(standard * EXPRESS_FACTOR),
                    delivery_time: "1-2 días".to_string(),
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(weight_kg: f64, declared_value: Option<f64>) -> QuoteRequest {
        QuoteRequest {
            origin: " Guatemala ".into(),
            destination: "Quetzaltenango".into(),
            package: PackageDetails {
                weight_kg,
                declared_value,
                ..Default::default()
            },
        }
    }

    #[test]
    fn prices_weight_distance_and_value() {
        let quote = request(2.0, Some(100.0)).validate().unwrap().quote();
        assert_eq!(quote.total_cost, 26.0);
        assert_eq!(quote.currency, "GTQ");
        assert_eq!(quote.services[0].cost, 26.0);
        assert_eq!(quote.services[1].service_id, "express");
        assert_eq!(quote.services[1].cost, 39.0);
    }

    #[test]
    fn rounds_to_cents() {
        let quote = request(1.5, None).quote();
        assert_eq!(quote.total_cost, 23.75);
        assert_eq!(quote.services[1].cost, 35.63);
    }

    #[test]
    fn rejects_bad_packages() {
        assert!(matches!(
            request(0.0, None).validate(),
            Err(ValidationError::OutOfRange { field: "peso", .. })
        ));
        assert!(matches!(
            request(1.0, Some(-5.0)).validate(),
            Err(ValidationError::OutOfRange { field: "valor_declarado", .. })
        ));

        let mut blank = request(1.0, None);
        blank.destination = "  ".into();
        assert_eq!(blank.validate(), Err(ValidationError::Empty { field: "destino" }));
    }

    #[test]
    fn trims_places() {
        let valid = request(1.0, None).validate().unwrap();
        assert_eq!(valid.origin, "Guatemala");
    }
}
