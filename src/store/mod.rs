//! Read-only SQLite access to the property snapshot and support tables.
//!
//! The database file is produced offline by the data pipeline; this service
//! never writes to it. Connections are opened read-only per call and dropped
//! right after, which keeps the handlers free of pooling concerns and lets
//! the snapshot file be swapped out underneath a running server.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, ToSql};

use crate::error::StoreError;
use crate::property::{forecast_quarters, ForecastGrid, ForecastKind, PropertyRecord};

/// Snapshot table with one row per listing.
pub const PROPERTY_TABLE: &str = "HOUSE_INFO";

/// Loan/policy support articles.
pub const SUPPORT_TABLE: &str = "SUPPORT_LIST";

const FIXED_COLUMNS: &[&str] = &[
    "rowid",
    "district",
    "dong_name",
    "house_type",
    "building_name",
    "lease_type",
    "floor",
    "built_year",
    "area_m2",
    "latitude",
    "longitude",
    "road_address",
    "jibun_address",
    "recent_yq",
    "recent_deposit",
    "recent_monthly",
    "monthly_rent",
];

/// SELECT list with every forecast column spelled out, derived from the
/// typed grid so the query and the row mapping cannot drift apart.
static PROPERTY_SELECT: LazyLock<String> = LazyLock::new(|| {
    let mut cols: Vec<String> = FIXED_COLUMNS.iter().map(|c| c.to_string()).collect();
    for kind in ForecastKind::BOTH {
        for yq in forecast_quarters() {
            cols.push(kind.column(yq));
        }
    }
    format!("SELECT {} FROM {}", cols.join(", "), PROPERTY_TABLE)
});

fn open_read_only(path: &Path) -> Result<Connection, StoreError> {
    if !path.is_file() {
        return Err(StoreError::DbNotFound(path.to_path_buf()));
    }
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    Connection::open_with_flags(path, flags).map_err(|source| StoreError::Open {
        path: path.to_path_buf(),
        source,
    })
}

// ============================================================================
// Property store
// ============================================================================

/// Equality/range predicates for the snapshot table. Unset fields don't
/// constrain the query.
#[derive(Debug, Clone, Default)]
pub struct PropertyFilter {
    pub district: Option<String>,
    pub dong_name: Option<String>,
    pub house_type: Option<String>,
    pub building_name: Option<String>,
    pub lease_type: Option<String>,
    pub area_min_m2: Option<f64>,
    pub area_max_m2: Option<f64>,
    pub floor_min: Option<i64>,
    pub floor_max: Option<i64>,
}

fn build_property_query(filter: &PropertyFilter) -> (String, Vec<Box<dyn ToSql>>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    let mut text_eq = |column: &str, value: &Option<String>| {
        if let Some(value) = value {
            clauses.push(format!("{} = ?{}", column, clauses.len() + 1));
            params.push(Box::new(value.clone()));
        }
    };
    text_eq("district", &filter.district);
    text_eq("dong_name", &filter.dong_name);
    text_eq("house_type", &filter.house_type);
    text_eq("building_name", &filter.building_name);
    text_eq("lease_type", &filter.lease_type);

    if let Some(min) = filter.area_min_m2 {
        clauses.push(format!("area_m2 >= ?{}", clauses.len() + 1));
        params.push(Box::new(min));
    }
    if let Some(max) = filter.area_max_m2 {
        clauses.push(format!("area_m2 <= ?{}", clauses.len() + 1));
        params.push(Box::new(max));
    }
    if let Some(min) = filter.floor_min {
        clauses.push(format!("floor >= ?{}", clauses.len() + 1));
        params.push(Box::new(min));
    }
    if let Some(max) = filter.floor_max {
        clauses.push(format!("floor <= ?{}", clauses.len() + 1));
        params.push(Box::new(max));
    }

    let mut sql = PROPERTY_SELECT.clone();
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    (sql, params)
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<PropertyRecord> {
    let mut record = PropertyRecord {
        rowid: row.get(0)?,
        district: row.get(1)?,
        dong_name: row.get(2)?,
        house_type: row.get(3)?,
        building_name: row.get(4)?,
        lease_type: row.get(5)?,
        floor: row.get(6)?,
        built_year: row.get(7)?,
        area_m2: row.get(8)?,
        latitude: row.get(9)?,
        longitude: row.get(10)?,
        road_address: row.get(11)?,
        jibun_address: row.get(12)?,
        recent_yq: row.get(13)?,
        recent_deposit: row.get(14)?,
        recent_monthly: row.get(15)?,
        monthly_rent: row.get(16)?,
        forecasts: ForecastGrid::default(),
    };
    let mut idx = FIXED_COLUMNS.len();
    for kind in ForecastKind::BOTH {
        for yq in forecast_quarters() {
            record.forecasts.set(kind, yq, row.get(idx)?);
            idx += 1;
        }
    }
    Ok(record)
}

/// Read-only access to the property snapshot.
#[derive(Debug, Clone)]
pub struct PropertyStore {
    db_path: PathBuf,
}

impl PropertyStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn db_exists(&self) -> bool {
        self.db_path.is_file()
    }

    /// Fetch all rows matching the filter, forecast grid included.
    pub fn find_properties(
        &self,
        filter: &PropertyFilter,
    ) -> Result<Vec<PropertyRecord>, StoreError> {
        let conn = open_read_only(&self.db_path)?;
        let (sql, params) = build_property_query(filter);
        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(params_from_iter(param_refs), row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        tracing::debug!("property query matched {} rows", records.len());
        Ok(records)
    }
}

// ============================================================================
// Support store
// ============================================================================

/// One loan/policy support article.
#[derive(Debug, Clone)]
pub struct SupportRecord {
    pub id: i64,
    pub title: Option<String>,
    pub source_type: Option<String>,
    pub target: Option<String>,
    pub biz_category: Option<String>,
    pub detail_json: Option<String>,
}

/// Equality predicates for the support listing.
#[derive(Debug, Clone, Default)]
pub struct SupportFilter {
    pub source_type: Option<String>,
    pub target: Option<String>,
    pub biz_category: Option<String>,
}

fn row_to_support(row: &rusqlite::Row<'_>) -> rusqlite::Result<SupportRecord> {
    Ok(SupportRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        source_type: row.get(2)?,
        target: row.get(3)?,
        biz_category: row.get(4)?,
        detail_json: row.get(5)?,
    })
}

/// Read-only access to support articles.
#[derive(Debug, Clone)]
pub struct SupportStore {
    db_path: PathBuf,
}

impl SupportStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn list(&self, filter: &SupportFilter) -> Result<Vec<SupportRecord>, StoreError> {
        let conn = open_read_only(&self.db_path)?;

        let mut clauses: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();
        let mut text_eq = |column: &str, value: &Option<String>| {
            if let Some(value) = value {
                clauses.push(format!("{} = ?{}", column, clauses.len() + 1));
                params.push(Box::new(value.clone()));
            }
        };
        text_eq("source_type", &filter.source_type);
        text_eq("target", &filter.target);
        text_eq("biz_category", &filter.biz_category);

        let mut sql = format!(
            "SELECT id, title, source_type, target, biz_category, detail_json FROM {}",
            SUPPORT_TABLE
        );
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY id");

        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(params_from_iter(param_refs), row_to_support)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn get(&self, id: i64) -> Result<Option<SupportRecord>, StoreError> {
        let conn = open_read_only(&self.db_path)?;
        let sql = format!(
            "SELECT id, title, source_type, target, biz_category, detail_json FROM {} WHERE id = ?1",
            SUPPORT_TABLE
        );
        let record = conn
            .query_row(&sql, params![id], row_to_support)
            .optional()?;
        Ok(record)
    }
}

// ============================================================================
// Test fixtures
// ============================================================================
