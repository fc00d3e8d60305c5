//! Listing search: filter buckets and Korean display formatting for the
//! search endpoint.
//!
//! Filters arrive as loose UI strings (pyeong ranges like `10-19`, floor
//! bands like `low`). Unparseable buckets simply don't constrain the query,
//! mirroring how the search screen has always behaved.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::property::{district_display, ForecastKind, PropertyRecord};

/// One pyeong in square meters.
pub const M2_PER_PYEONG: f64 = 3.305785;

/// Area bucket `"10-19"` (pyeong) to inclusive m² bounds. Anything that is
/// not exactly two dash-separated integers means "no area filter".
pub fn area_bounds(bucket: &str) -> Option<(f64, f64)> {
    let parts: Vec<&str> = bucket.split('-').collect();
    let [min_p, max_p] = parts.as_slice() else {
        return None;
    };
    let min_p: i64 = min_p.trim().parse().ok()?;
    let max_p: i64 = max_p.trim().parse().ok()?;
    Some((min_p as f64 * M2_PER_PYEONG, max_p as f64 * M2_PER_PYEONG))
}

/// Floor band to inclusive floor bounds: `basement` (< 0), `low` (1..=4),
/// `mid` (5..=10), `high` (>= 11). Unknown bands mean "no floor filter".
pub fn floor_bounds(band: &str) -> (Option<i64>, Option<i64>) {
    match band {
        "basement" => (None, Some(-1)),
        "low" => (Some(1), Some(4)),
        "mid" => (Some(5), Some(10)),
        "high" => (Some(11), None),
        _ => (None, None),
    }
}

/// `"지하 2층"` for basements, `"3층"` above ground, empty when unknown.
pub fn floor_label(floor: Option<i64>) -> String {
    match floor {
        None => String::new(),
        Some(f) if f < 0 => format!("지하 {}층", f.abs()),
        Some(f) => format!("{f}층"),
    }
}

/// Rounded pyeong label for an area, e.g. `"10평"`.
pub fn pyeong_label(area_m2: Option<f64>) -> Option<String> {
    area_m2.map(|m2| format!("{}평", (m2 / M2_PER_PYEONG).round() as i64))
}

/// `"2024년 3분기 계약"` for a long-form tag; odd tags come back verbatim.
pub fn contract_label(yq: Option<&str>) -> String {
    let Some(yq) = yq else {
        return String::new();
    };
    if yq.is_empty() {
        return String::new();
    }
    if yq.is_ascii() && yq.len() >= 5 {
        let year = &yq[..4];
        let quarter = &yq[yq.len() - 1..];
        format!("{year}년 {quarter}분기 계약")
    } else {
        yq.to_string()
    }
}

/// One search result row: display strings plus the raw values the map and
/// chart need, with the full forecast grid flattened in.
#[derive(Debug, Clone, Serialize)]
pub struct ListingItem {
    pub building_name: Option<String>,
    pub district_code: Option<String>,
    pub district: Option<String>,
    pub floor: String,
    pub floor_raw: Option<i64>,
    pub area_m2: Option<f64>,
    pub area_p: Option<String>,
    pub built_year: Option<i64>,
    pub house_type: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub recent_yq: String,
    pub recent_yq_raw: Option<String>,
    pub recent_deposit: Option<f64>,
    pub recent_monthly: Option<f64>,
    pub road_address: Option<String>,
    pub jibun_address: Option<String>,
    pub dong_name: Option<String>,
    pub lease_type: Option<String>,
    pub monthly_rent: Option<f64>,
    #[serde(flatten)]
    pub deposit_forecasts: BTreeMap<String, Option<f64>>,
    #[serde(flatten)]
    pub monthly_rent_forecasts: BTreeMap<String, Option<f64>>,
}

impl ListingItem {
    pub fn from_record(record: &PropertyRecord) -> Self {
        Self {
            building_name: record.building_name.clone(),
            district_code: record.district.clone(),
            district: record
                .district
                .as_deref()
                .map(|code| district_display(code).unwrap_or(code).to_string()),
            floor: floor_label(record.floor),
            floor_raw: record.floor,
            area_m2: record.area_m2,
            area_p: pyeong_label(record.area_m2),
            built_year: record.built_year,
            house_type: record.house_type.clone(),
            latitude: record.latitude,
            longitude: record.longitude,
            recent_yq: contract_label(record.recent_yq.as_deref()),
            recent_yq_raw: record.recent_yq.clone(),
            recent_deposit: record.recent_deposit,
            recent_monthly: record.recent_monthly,
            road_address: record.road_address.clone(),
            jibun_address: record.jibun_address.clone(),
            dong_name: record.dong_name.clone(),
            lease_type: record.lease_type.clone(),
            monthly_rent: record.monthly_rent,
            deposit_forecasts: record.forecasts.history(ForecastKind::Deposit),
            monthly_rent_forecasts: record.forecasts.history(ForecastKind::MonthlyRent),
        }
    }
}
