//! Authoritative hash dictionary sync from asset/site exports.
//! Ported from `original_source/hash_lookup_sync.py`.

use std::path::Path;

use tipflow_protocol::LookupType;

use crate::error::{HashError, Result};

const ASSET_TYPE_MAPPING: &[(&str, LookupType)] = &[
    ("PRIME MOVER", LookupType::Vehicle),
    ("RIGID", LookupType::Vehicle),
    ("VEHICLE", LookupType::Vehicle),
    ("LIGHT VEHICLE", LookupType::Vehicle),
    ("FORKLIFT", LookupType::Vehicle),
    ("TRAILER", LookupType::Trailer),
    ("DROPDECK", LookupType::Trailer),
    ("DOLLY", LookupType::Trailer),
    ("UHF", LookupType::Uhf),
    ("SKEL", LookupType::Trailer),
];

const DEPARTMENT_PATTERNS: &[&str] = &["- Drivers", "- Admin", "Transport", "Workshop", "Distribution"];

/// `(tip_hash, lookup_type, resolved_value, source_type)`.
pub type HashRecord = (String, LookupType, String, String);

#[derive(Debug, Default)]
pub struct SyncStats {
    pub assets_processed: usize,
    pub assets_skipped: usize,
    pub sites_processed: usize,
    pub sites_skipped: usize,
}

fn determine_asset_lookup_type(asset_type: &str) -> LookupType {
    let upper = asset_type.trim().to_uppercase();
    ASSET_TYPE_MAPPING
        .iter()
        .find(|(key, _)| *key == upper)
        .map(|(_, lookup)| *lookup)
        .unwrap_or(LookupType::Unknown)
}

fn format_source_type(raw_type: &str) -> String {
    let raw = raw_type.trim();
    if raw.is_empty() {
        return "Unknown".to_string();
    }
    if !raw.contains(' ') && raw.chars().next().is_some_and(|c| c.is_lowercase()) {
        let mut chars = raw.chars();
        return match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => raw.to_string(),
        };
    }
    raw.replace('_', " ")
        .split_whitespace()
        .map(|word| {
            let mut c = word.chars();
            match c.next() {
                Some(first) => first.to_uppercase().collect::<String>() + &c.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect()
}

fn determine_site_lookup_type(site_name: &str, site_type: Option<&str>) -> LookupType {
    if DEPARTMENT_PATTERNS.iter().any(|p| site_name.contains(p)) {
        return LookupType::Department;
    }
    if site_type.map(|t| t.trim().eq_ignore_ascii_case("team")).unwrap_or(false) {
        return LookupType::Team;
    }
    LookupType::Department
}

fn format_site_resolved_value(goldstar_id: Option<&str>, site_name: &str) -> String {
    let name = if site_name.trim().is_empty() { "Unknown" } else { site_name.trim() };
    match goldstar_id.map(str::trim).filter(|g| !g.is_empty()) {
        Some(gid) => format!("{gid} - {name}"),
        None => name.to_string(),
    }
}

/// Which export a CSV file is, detected from its header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Asset,
    Site,
}

pub fn detect_export_kind(path: &Path) -> Result<Option<ExportKind>> {
    let mut reader = csv::Reader::from_path(path).map_err(|source| HashError::Csv {
        path: path.display().to_string(),
        source,
    })?;
    let headers = reader.headers().map_err(|source| HashError::Csv {
        path: path.display().to_string(),
        source,
    })?;
    let names: Vec<&str> = headers.iter().collect();
    if names.contains(&"assetType") || names.contains(&"assetName") {
        return Ok(Some(ExportKind::Asset));
    }
    if names.contains(&"siteType") || names.contains(&"siteName") {
        return Ok(Some(ExportKind::Site));
    }
    Ok(None)
}

pub fn load_asset_export(path: &Path) -> Result<(SyncStats, Vec<HashRecord>)> {
    let mut reader = csv::Reader::from_path(path).map_err(|source| HashError::Csv {
        path: path.display().to_string(),
        source,
    })?;
    let headers: Vec<String> = reader.headers().map_err(|source| HashError::Csv {
        path: path.display().to_string(),
        source,
    })?.iter().map(str::to_string).collect();
    for required in ["nogginId", "assetName", "assetType"] {
        if !headers.iter().any(|h| h == required) {
            return Err(HashError::MissingColumns {
                path: path.display().to_string(),
                missing: required.to_string(),
            });
        }
    }

    let mut stats = SyncStats::default();
    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|source| HashError::Csv {
            path: path.display().to_string(),
            source,
        })?;
        let get = |col: &str| -> Option<&str> {
            headers.iter().position(|h| h == col).and_then(|i| row.get(i))
        };
        let tip_hash = get("nogginId").unwrap_or("").trim();
        if tip_hash.is_empty() {
            stats.assets_skipped += 1;
            continue;
        }
        let asset_name = get("assetName").unwrap_or("").trim();
        let resolved_value = if asset_name.is_empty() { "Unknown".to_string() } else { asset_name.to_string() };
        let asset_type = get("assetType").unwrap_or("");
        let lookup_type = determine_asset_lookup_type(asset_type);
        let source_type = format_source_type(asset_type);
        records.push((tip_hash.to_string(), lookup_type, resolved_value, source_type));
        stats.assets_processed += 1;
    }
    Ok((stats, records))
}

pub fn load_site_export(path: &Path) -> Result<(SyncStats, Vec<HashRecord>)> {
    let mut reader = csv::Reader::from_path(path).map_err(|source| HashError::Csv {
        path: path.display().to_string(),
        source,
    })?;
    let headers: Vec<String> = reader.headers().map_err(|source| HashError::Csv {
        path: path.display().to_string(),
        source,
    })?.iter().map(str::to_string).collect();
    for required in ["nogginId", "siteName", "goldstarId", "siteType"] {
        if !headers.iter().any(|h| h == required) {
            return Err(HashError::MissingColumns {
                path: path.display().to_string(),
                missing: required.to_string(),
            });
        }
    }

    let mut stats = SyncStats::default();
    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|source| HashError::Csv {
            path: path.display().to_string(),
            source,
        })?;
        let get = |col: &str| -> Option<&str> {
            headers.iter().position(|h| h == col).and_then(|i| row.get(i))
        };
        let tip_hash = get("nogginId").unwrap_or("").trim();
        if tip_hash.is_empty() {
            stats.sites_skipped += 1;
            continue;
        }
        let site_name = get("siteName").unwrap_or("").trim();
        if site_name.is_empty() {
            stats.sites_skipped += 1;
            continue;
        }
        let goldstar_id = get("goldstarId");
        let site_type = get("siteType");
        let resolved_value = format_site_resolved_value(goldstar_id, site_name);
        let lookup_type = determine_site_lookup_type(site_name, site_type);
        let source_type = format_source_type(site_type.unwrap_or(""));
        records.push((tip_hash.to_string(), lookup_type, resolved_value, source_type));
        stats.sites_processed += 1;
    }
    Ok((stats, records))
}

/// Best-effort classification of a bare `(hash, value)` pair when loading
/// older CSVs that lack explicit type columns. A compatibility shim only;
/// prefer [`load_asset_export`]/[`load_site_export`].
pub fn detect_lookup_type_heuristic(resolved_value: &str) -> LookupType {
    let upper = resolved_value.to_uppercase();
    if ["DRIVERS", "TRANSPORT", "WORKSHOP", "ADMIN"].iter().any(|d| upper.contains(d)) {
        return LookupType::Department;
    }
    if upper.contains("TEAM") || resolved_value.contains(" - ") {
        return LookupType::Team;
    }
    let digits = resolved_value.chars().any(|c| c.is_ascii_digit());
    if digits && resolved_value.len() <= 10 && resolved_value.starts_with(|c: char| c.is_ascii_digit() && c != '0') {
        return LookupType::Vehicle;
    }
    LookupType::Unknown
}
