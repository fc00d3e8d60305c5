//! Property records and the lease/district/house-type vocabulary.
//!
//! The snapshot table covers villa (빌라) and officetel (오피스텔) listings in
//! two Seoul districts, with per-quarter forecast columns for 2025 through
//! 2030 (`deposit_25q1` .. `monthly_rent_30q4`).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::quarter::YearQuarter;

/// District codes accepted from users, in request form.
pub const ALLOWED_DISTRICTS: &[&str] = &["eunpyeong", "guro"];

/// House types accepted from users, stored in Korean.
pub const ALLOWED_HOUSE_TYPES: &[&str] = &["빌라", "오피스텔"];

/// Lease types accepted from users, stored in Korean.
pub const ALLOWED_LEASE_TYPES: &[&str] = &["전세", "월세"];

/// First year covered by the forecast grid.
pub const FORECAST_START_YEAR: u16 = 2025;

/// Last year covered by the forecast grid.
pub const FORECAST_END_YEAR: u16 = 2030;

/// Korean display name for a district code.
pub fn district_display(code: &str) -> Option<&'static str> {
    match code {
        "eunpyeong" => Some("은평구"),
        "guro" => Some("구로구"),
        _ => None,
    }
}

/// All quarters of the forecast grid, in chronological order.
pub fn forecast_quarters() -> impl Iterator<Item = YearQuarter> {
    (FORECAST_START_YEAR..=FORECAST_END_YEAR)
        .flat_map(|year| (1..=4u8).map(move |q| YearQuarter::new(year, q).expect("quarter in 1..=4")))
}

// ============================================================================
// Lease types
// ============================================================================

/// Contract kind: deposit-only (전세) or deposit plus monthly rent (월세).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeaseType {
    #[serde(rename = "전세")]
    Jeonse,
    #[serde(rename = "월세")]
    Wolse,
}

impl LeaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseType::Jeonse => "전세",
            LeaseType::Wolse => "월세",
        }
    }
}

impl fmt::Display for LeaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeaseType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "전세" => Ok(LeaseType::Jeonse),
            "월세" => Ok(LeaseType::Wolse),
            _ => Err(ValidationError::NotAllowed {
                field: "lease_type",
                allowed: ALLOWED_LEASE_TYPES,
            }),
        }
    }
}

// ============================================================================
// Forecast grid
// ============================================================================

/// Which forecast series a column belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForecastKind {
    Deposit,
    MonthlyRent,
}

impl ForecastKind {
    pub const BOTH: [ForecastKind; 2] = [ForecastKind::Deposit, ForecastKind::MonthlyRent];

    pub fn prefix(&self) -> &'static str {
        match self {
            ForecastKind::Deposit => "deposit",
            ForecastKind::MonthlyRent => "monthly_rent",
        }
    }

    /// Column name for this series at a given quarter, e.g. `deposit_25q1`.
    pub fn column(&self, yq: YearQuarter) -> String {
        format!("{}_{}", self.prefix(), yq.short_tag())
    }
}

/// Per-quarter forecast values for one property row.
///
/// Cells are keyed by quarter; a cell can be present-but-null (the model
/// produced no value for that quarter). Reads flatten "outside the grid" and
/// "null cell" into `None`, which is what every consumer wants.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForecastGrid {
    deposit: BTreeMap<YearQuarter, Option<f64>>,
    monthly_rent: BTreeMap<YearQuarter, Option<f64>>,
}

impl ForecastGrid {
    fn cells(&self, kind: ForecastKind) -> &BTreeMap<YearQuarter, Option<f64>> {
        match kind {
            ForecastKind::Deposit => &self.deposit,
            ForecastKind::MonthlyRent => &self.monthly_rent,
        }
    }

    pub fn set(&mut self, kind: ForecastKind, yq: YearQuarter, value: Option<f64>) {
        let cells = match kind {
            ForecastKind::Deposit => &mut self.deposit,
            ForecastKind::MonthlyRent => &mut self.monthly_rent,
        };
        cells.insert(yq, value);
    }

    /// Forecast value at a quarter, `None` when the cell is null or the
    /// quarter is outside the stored grid.
    pub fn value(&self, kind: ForecastKind, yq: YearQuarter) -> Option<f64> {
        self.cells(kind).get(&yq).copied().flatten()
    }

    /// Full series keyed by column name, nulls preserved, chronological.
    pub fn history(&self, kind: ForecastKind) -> BTreeMap<String, Option<f64>> {
        self.cells(kind)
            .iter()
            .map(|(yq, value)| (kind.column(*yq), *value))
            .collect()
    }
}

// ============================================================================
// Property records
// ============================================================================

/// One row of the property snapshot table.
///
/// `lease_type` stays a raw string here: the snapshot is scraped data and may
/// hold values outside the request vocabulary, which simply never win the
/// lease-match tie-break.
#[derive(Debug, Clone, Default)]
pub struct PropertyRecord {
    pub rowid: i64,
    pub district: Option<String>,
    pub dong_name: Option<String>,
    pub house_type: Option<String>,
    pub building_name: Option<String>,
    pub lease_type: Option<String>,
    pub floor: Option<i64>,
    pub built_year: Option<i64>,
    pub area_m2: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub road_address: Option<String>,
    pub jibun_address: Option<String>,
    pub recent_yq: Option<String>,
    pub recent_deposit: Option<f64>,
    pub recent_monthly: Option<f64>,
    pub monthly_rent: Option<f64>,
    pub forecasts: ForecastGrid,
}

impl PropertyRecord {
    /// Recency of the most recent contract, -1 when unknown.
    pub fn recency_score(&self) -> i64 {
        crate::quarter::recency_score(self.recent_yq.as_deref())
    }

    /// Absolute area difference against a target, missing areas count as 0.
    pub fn area_distance(&self, target_m2: f64) -> f64 {
        (self.area_m2.unwrap_or(0.0) - target_m2).abs()
    }

    /// Whether the stored lease type equals the requested one.
    pub fn lease_matches(&self, lease: LeaseType) -> bool {
        self.lease_type.as_deref() == Some(lease.as_str())
    }
}
