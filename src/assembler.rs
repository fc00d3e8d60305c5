//! Input assembly: normalized user query in, prediction-input document out.
//!
//! The document is always produced for a valid query. Snapshot problems are
//! reported inside `db_context.match_status` (`no_match`, `db_not_found`)
//! rather than as errors, so a missing database still yields a usable
//! document built from user fields alone.

use std::cmp::Ordering;

use uuid::Uuid;

use crate::document::{
    kst_now_iso, ContractSection, DbContext, InfraFeatures, LocationSection, MatchStatus,
    PredictionInput, PropertySection, RegionSection, RequestMeta, SCHEMA_VERSION,
};
use crate::error::{Result, StoreError, ValidationError};
use crate::property::{
    district_display, ForecastKind, LeaseType, PropertyRecord, ALLOWED_DISTRICTS,
    ALLOWED_HOUSE_TYPES,
};
use crate::store::{PropertyFilter, PropertyStore};

const SOURCE_WEB_FORM: &str = "web_form";

/// A validated-shape user query. Field-level parsing (required fields, number
/// ranges) happens at the form boundary; vocabulary checks happen here.
#[derive(Debug, Clone)]
pub struct UserQuery {
    pub district_code: String,
    pub dong_name: String,
    pub house_type: String,
    pub lease_type: LeaseType,
    pub area_m2: f64,
    pub built_year: Option<i64>,
    pub floor: Option<i64>,
    pub building_name: Option<String>,
    pub deposit_krw: Option<i64>,
    pub monthly_rent_krw: Option<i64>,
}

fn validate_query(query: &UserQuery) -> std::result::Result<(), ValidationError> {
    if !ALLOWED_DISTRICTS.contains(&query.district_code.as_str()) {
        return Err(ValidationError::NotAllowed {
            field: "district_code",
            allowed: ALLOWED_DISTRICTS,
        });
    }
    if !ALLOWED_HOUSE_TYPES.contains(&query.house_type.as_str()) {
        return Err(ValidationError::NotAllowed {
            field: "house_type",
            allowed: ALLOWED_HOUSE_TYPES,
        });
    }
    Ok(())
}

fn base_document(query: &UserQuery) -> PredictionInput {
    // 전세 contracts have no monthly component whatever the form carried.
    let monthly_rent_krw = match query.lease_type {
        LeaseType::Jeonse => None,
        LeaseType::Wolse => query.monthly_rent_krw,
    };
    PredictionInput {
        schema_version: SCHEMA_VERSION.to_string(),
        meta: RequestMeta {
            request_id: Some(Uuid::new_v4().to_string()),
            requested_at: kst_now_iso(),
            source: SOURCE_WEB_FORM.to_string(),
        },
        region: RegionSection {
            district_code: query.district_code.clone(),
            district_display: district_display(&query.district_code)
                .map(str::to_string)
                .unwrap_or_else(|| query.district_code.clone()),
            dong_name: query.dong_name.clone(),
        },
        property: PropertySection {
            house_type: query.house_type.clone(),
            area_m2: query.area_m2,
            built_year: query.built_year,
            floor: query.floor,
            building_name: query.building_name.clone(),
        },
        contract: ContractSection {
            lease_type: query.lease_type,
            deposit_krw: query.deposit_krw,
            monthly_rent_krw,
        },
        location: LocationSection::default(),
        db_context: DbContext::default(),
        infra_features: InfraFeatures::default(),
    }
}

/// Pick the row to anchor the document on: most recent contract first, then
/// smallest area distance. Ties keep the earliest row in table order.
fn select_best_row(rows: &[PropertyRecord], target_area: f64) -> Option<&PropertyRecord> {
    let (first, rest) = rows.split_first()?;
    let mut best = first;
    for candidate in rest {
        let strictly_better = match candidate.recency_score().cmp(&best.recency_score()) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => candidate.area_distance(target_area) < best.area_distance(target_area),
        };
        if strictly_better {
            best = candidate;
        }
    }
    Some(best)
}

/// Assemble the prediction-input document for a user query.
pub fn build_prediction_input(store: &PropertyStore, query: &UserQuery) -> Result<PredictionInput> {
    validate_query(query)?;
    let mut doc = base_document(query);

    let filter = PropertyFilter {
        district: Some(query.district_code.clone()),
        dong_name: Some(query.dong_name.clone()),
        house_type: Some(query.house_type.clone()),
        building_name: query.building_name.clone(),
        ..Default::default()
    };
    let rows = match store.find_properties(&filter) {
        Ok(rows) => rows,
        Err(StoreError::DbNotFound(path)) => {
            tracing::warn!("snapshot missing at {}, document degrades to db_not_found", path.display());
            doc.db_context.match_status = MatchStatus::DbNotFound;
            doc.db_context.error = Some(format!("DB 파일을 찾을 수 없습니다: {}", path.display()));
            return Ok(doc);
        }
        Err(e) => return Err(e.into()),
    };

    let Some(best) = select_best_row(&rows, query.area_m2) else {
        tracing::debug!(
            "no snapshot match for {}/{}/{}",
            query.district_code,
            query.dong_name,
            query.house_type
        );
        doc.db_context.match_status = MatchStatus::NoMatch;
        return Ok(doc);
    };

    doc.db_context = DbContext {
        match_status: MatchStatus::Matched,
        matched_rowid: Some(best.rowid),
        recent_deposit_krw: best.recent_deposit,
        recent_monthly_rent_krw: best.recent_monthly,
        recent_yq: best.recent_yq.clone(),
        road_address: best.road_address.clone(),
        jibun_address: best.jibun_address.clone(),
        building_name: best.building_name.clone(),
        deposit_history: best.forecasts.history(ForecastKind::Deposit),
        monthly_rent_history: best.forecasts.history(ForecastKind::MonthlyRent),
        error: None,
    };
    doc.location.latitude = best.latitude;
    doc.location.longitude = best.longitude;
    // user-supplied values win, the snapshot only fills gaps
    if doc.property.built_year.is_none() {
        doc.property.built_year = best.built_year;
    }
    if doc.property.floor.is_none() {
        doc.property.floor = best.floor;
    }
    if doc.property.building_name.is_none() {
        doc.property.building_name = best.building_name.clone();
    }

    tracing::info!(
        "assembled input for {}/{} matched rowid {}",
        query.district_code,
        query.dong_name,
        best.rowid
    );
    Ok(doc)
}
