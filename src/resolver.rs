//! Prediction resolution: a loosely-shaped payload plus a target quarter in,
//! the stored forecast for the best candidate row out.
//!
//! Payloads arrive from two producers with different shapes: full documents
//! from the input assembler and minimal objects from the NLQ interpreter.
//! `ResolverPayload` deserializes both by treating every section and field
//! as optional and ignoring anything it does not know.

use serde::{Deserialize, Serialize};

use crate::error::{LookupError, Result, ValidationError};
use crate::property::{ForecastKind, LeaseType, PropertyRecord};
use crate::quarter::YearQuarter;
use crate::store::{PropertyFilter, PropertyStore};

/// Lenient view over an incoming payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverPayload {
    pub contract: ContractHint,
    pub region: RegionHint,
    pub property: PropertyHint,
    pub db_context: DbContextHint,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractHint {
    pub lease_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionHint {
    pub district_code: Option<String>,
    pub dong_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyHint {
    pub building_name: Option<String>,
    pub house_type: Option<String>,
}

/// Assembled documents carry the matched building here; NLQ payloads may
/// carry the district here as well.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DbContextHint {
    pub district_code: Option<String>,
    pub building_name: Option<String>,
}

/// Monthly component of a 월세 outcome. Absent entirely for 전세.
#[derive(Debug, Clone, Serialize)]
pub struct MonthlyForecast {
    pub monthly_rent_column: String,
    pub predicted_monthly_rent_krw: Option<f64>,
}

/// Resolved forecast with enough context to audit the selection.
#[derive(Debug, Clone, Serialize)]
pub struct ResolverOutcome {
    pub lease_type: LeaseType,
    pub target_yq: YearQuarter,
    pub deposit_column: String,
    pub predicted_deposit_krw: Option<f64>,
    #[serde(flatten)]
    pub monthly: Option<MonthlyForecast>,
    pub selected_rowid: i64,
    pub selected_lease_type: Option<String>,
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Candidate rank, compared lexicographically: does the stored lease type
/// match, is the primary component positive at the target quarter, is the
/// secondary component usable. For 전세 only the deposit matters.
fn rank(record: &PropertyRecord, lease: LeaseType, yq: YearQuarter) -> (bool, bool, bool) {
    let lease_match = record.lease_matches(lease);
    let deposit = record.forecasts.value(ForecastKind::Deposit, yq);
    match lease {
        LeaseType::Wolse => {
            let monthly = record.forecasts.value(ForecastKind::MonthlyRent, yq);
            (
                lease_match,
                monthly.is_some_and(|v| v > 0.0),
                deposit.is_some_and(|v| v >= 0.0),
            )
        }
        LeaseType::Jeonse => (lease_match, deposit.is_some_and(|v| v > 0.0), false),
    }
}

/// First row with the maximal rank, keeping table order on ties.
fn select_candidate(
    rows: &[PropertyRecord],
    lease: LeaseType,
    yq: YearQuarter,
) -> Option<&PropertyRecord> {
    let (first, rest) = rows.split_first()?;
    let mut best = first;
    let mut best_rank = rank(first, lease, yq);
    for candidate in rest {
        let candidate_rank = rank(candidate, lease, yq);
        if candidate_rank > best_rank {
            best = candidate;
            best_rank = candidate_rank;
        }
    }
    Some(best)
}

/// Resolve the stored forecast for a payload at the target quarter.
///
/// Unlike the assembler, zero candidates here is an error: the caller asked
/// for a concrete building and there is nothing to anchor a prediction on.
pub fn run_prediction_lookup(
    store: &PropertyStore,
    payload: &ResolverPayload,
    target_yq: &str,
) -> Result<ResolverOutcome> {
    let yq = YearQuarter::parse(target_yq)?;
    let lease: LeaseType = payload
        .contract
        .lease_type
        .as_deref()
        .unwrap_or("")
        .parse()?;

    let district = trimmed(&payload.region.district_code)
        .or_else(|| trimmed(&payload.db_context.district_code))
        .ok_or(ValidationError::Required("region.district_code"))?;
    let building = trimmed(&payload.property.building_name)
        .or_else(|| trimmed(&payload.db_context.building_name))
        .ok_or(ValidationError::Required("property.building_name"))?;

    let house_type = trimmed(&payload.property.house_type);
    let dong_name = trimmed(&payload.region.dong_name);

    let narrowed = PropertyFilter {
        district: Some(district.clone()),
        building_name: Some(building.clone()),
        house_type: house_type.clone(),
        dong_name: dong_name.clone(),
        ..Default::default()
    };
    let mut rows = store.find_properties(&narrowed)?;
    if rows.is_empty() && (house_type.is_some() || dong_name.is_some()) {
        // widen: the optional hints may simply be wrong
        let wide = PropertyFilter {
            district: Some(district.clone()),
            building_name: Some(building.clone()),
            ..Default::default()
        };
        rows = store.find_properties(&wide)?;
    }

    let Some(chosen) = select_candidate(&rows, lease, yq) else {
        return Err(LookupError::NoCandidates { district, building }.into());
    };

    let deposit_column = ForecastKind::Deposit.column(yq);
    let predicted_deposit_krw = chosen.forecasts.value(ForecastKind::Deposit, yq);
    let monthly = match lease {
        LeaseType::Wolse => Some(MonthlyForecast {
            monthly_rent_column: ForecastKind::MonthlyRent.column(yq),
            predicted_monthly_rent_krw: chosen.forecasts.value(ForecastKind::MonthlyRent, yq),
        }),
        LeaseType::Jeonse => None,
    };

    tracing::info!(
        "prediction lookup chose rowid {} for {}/{} at {}",
        chosen.rowid,
        district,
        building,
        yq
    );
    Ok(ResolverOutcome {
        lease_type: lease,
        target_yq: yq,
        deposit_column,
        predicted_deposit_krw,
        monthly,
        selected_rowid: chosen.rowid,
        selected_lease_type: chosen.lease_type.clone(),
    })
}
