//! The prediction-input document handed from the input assembler to
//! downstream consumers (prediction resolver, feature jobs, LLM prompts).
//!
//! The JSON shape is versioned and deliberately flat-ish: one section per
//! concern, nullable fields serialized as explicit nulls so consumers can
//! distinguish "not looked up" from "looked up, absent" via `match_status`.

use std::collections::BTreeMap;

use chrono::{FixedOffset, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::property::LeaseType;

/// Version tag stamped into every document.
pub const SCHEMA_VERSION: &str = "v1.0";

/// Current time in Seoul (UTC+9, no DST) as an ISO-8601 string.
pub fn kst_now_iso() -> String {
    let kst = FixedOffset::east_opt(9 * 3600).expect("KST offset is valid");
    Utc::now()
        .with_timezone(&kst)
        .to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Assembled prediction input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionInput {
    pub schema_version: String,
    pub meta: RequestMeta,
    pub region: RegionSection,
    pub property: PropertySection,
    pub contract: ContractSection,
    pub location: LocationSection,
    pub db_context: DbContext,
    pub infra_features: InfraFeatures,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMeta {
    pub request_id: Option<String>,
    pub requested_at: String,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionSection {
    pub district_code: String,
    pub district_display: String,
    pub dong_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySection {
    pub house_type: String,
    pub area_m2: f64,
    pub built_year: Option<i64>,
    pub floor: Option<i64>,
    pub building_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractSection {
    pub lease_type: LeaseType,
    pub deposit_krw: Option<i64>,
    pub monthly_rent_krw: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocationSection {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// How the snapshot lookup went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    #[default]
    NotChecked,
    Matched,
    NoMatch,
    DbNotFound,
}

/// Everything the snapshot contributed. All fields stay empty for `no_match`
/// and `db_not_found` documents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DbContext {
    pub match_status: MatchStatus,
    pub matched_rowid: Option<i64>,
    pub recent_deposit_krw: Option<f64>,
    pub recent_monthly_rent_krw: Option<f64>,
    pub recent_yq: Option<String>,
    pub road_address: Option<String>,
    pub jibun_address: Option<String>,
    pub building_name: Option<String>,
    pub deposit_history: BTreeMap<String, Option<f64>>,
    pub monthly_rent_history: BTreeMap<String, Option<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Placeholders for the infrastructure feature job. Always serialized, always
/// null until that job runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InfraFeatures {
    pub subway_distance_m: Option<f64>,
    pub bus_stop_count_500m: Option<i64>,
    pub mart_count_500m: Option<i64>,
    pub school_count_500m: Option<i64>,
    pub hospital_count_500m: Option<i64>,
}
