//! Restaurant listing input handling
//!
//! Form and JSON bodies arrive with loosely typed fields; `RestaurantInput`
//! accepts them as text and `into_new` turns them into a checked
//! `NewRestaurant` before anything touches the database.

use crate::errors::{AppError, Result};
use serde::{de, Deserialize, Deserializer, Serialize};
use validator::Validate;

/// Raw restaurant fields as submitted
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct RestaurantInput {
    #[serde(default)]
    #[validate(length(max = 120))]
    pub name: String,

    #[serde(default)]
    #[validate(length(max = 60))]
    pub category: String,

    #[serde(default)]
    #[validate(url, length(max = 2048))]
    pub image_url: Option<String>,

    /// Decimal amount, e.g. "7.50"
    #[serde(default, deserialize_with = "string_or_number")]
    pub delivery_fee: String,

    /// Whole minutes
    #[serde(default, deserialize_with = "string_or_number")]
    pub delivery_time_minutes: String,
}

/// Checked restaurant ready to insert
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRestaurant {
    pub name: String,
    pub category: String,
    pub image_url: Option<String>,
    pub delivery_fee_cents: i64,
    pub delivery_time_minutes: i32,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(de::Error::custom(format!(
            "expected a string or number, got {}",
            other
        ))),
    }
}

fn required(value: &str, field: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::MissingField {
            field: field.to_string(),
        });
    }
    Ok(value.to_string())
}

impl RestaurantInput {
    /// Trim fields and drop an empty image URL
    fn normalized(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.category = self.category.trim().to_string();
        self.image_url = self
            .image_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());
        self
    }

    /// Check every field and produce an insertable restaurant
    pub fn into_new(self) -> Result<NewRestaurant> {
        let input = self.normalized();

        let name = required(&input.name, "name")?;
        let category = required(&input.category, "category")?;
        let fee = required(&input.delivery_fee, "delivery_fee")?;
        let time = required(&input.delivery_time_minutes, "delivery_time_minutes")?;

        input.validate()?;

        let delivery_fee_cents = parse_fee_cents(&fee).ok_or_else(|| AppError::Validation {
            message: format!("Delivery fee must be a non-negative amount with at most two decimals, got '{}'", fee),
            field: Some("delivery_fee".to_string()),
        })?;

        let delivery_time_minutes = time
            .parse::<i32>()
            .ok()
            .filter(|minutes| *minutes > 0)
            .ok_or_else(|| AppError::Validation {
                message: format!("Delivery time must be a positive number of minutes, got '{}'", time),
                field: Some("delivery_time_minutes".to_string()),
            })?;

        Ok(NewRestaurant {
            name,
            category,
            image_url: input.image_url,
            delivery_fee_cents,
            delivery_time_minutes,
        })
    }
}

/// Parse a decimal currency amount into cents.
///
/// Accepts `12`, `12.5`, `12.50` and `.5`; rejects signs, exponents and
/// more than two decimals.
pub fn parse_fee_cents(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let (whole, frac) = raw.split_once('.').unwrap_or((raw, ""));

    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if frac.len() > 2
        || !whole.chars().all(|c| c.is_ascii_digit())
        || !frac.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }

    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let frac: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        _ => frac.parse().ok()?,
    };

    whole.checked_mul(100)?.checked_add(frac)
}

/// Render cents as a two-decimal amount
pub fn format_fee(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, cents / 100, cents % 100)
}
