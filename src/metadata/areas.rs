//! Area definitions (named report scopes).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProfilerError, Result};
use crate::logging::structured::LogContext;
use crate::metadata::store::{areas_file_name, LocalStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Area {
    pub id: i64,
    pub name: String,
}

impl Area {
    pub fn from_json(json: &Value) -> Result<Self> {
        let id = match json.get("id") {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        }
        .ok_or_else(|| ProfilerError::Parse(format!("area without id: {}", json)))?;
        let name = json
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ProfilerError::Parse(format!("area {} without name", id)))?;
        Ok(Self {
            id,
            name: name.to_string(),
        })
    }

    /// Lookup form of the name: spaces become underscores.
    pub fn normalized_name(&self) -> String {
        normalize(&self.name)
    }
}

fn normalize(name: &str) -> String {
    name.replace(' ', "_")
}

/// Area name to id map for one appliance version.
#[derive(Debug, Clone, Default)]
pub struct AreaCatalog {
    areas: BTreeMap<String, Area>,
}

impl AreaCatalog {
    pub fn new(areas: Vec<Area>) -> Self {
        Self {
            areas: areas.into_iter().map(|a| (a.normalized_name(), a)).collect(),
        }
    }

    /// Load the stored area list for `appliance_version`, fetching and
    /// storing it on first use.
    pub fn load_or_fetch<F>(
        store: &dyn LocalStore,
        appliance_version: &str,
        fetch: F,
        ctx: &LogContext,
    ) -> Result<Self>
    where
        F: FnOnce() -> Result<Vec<Value>>,
    {
        let name = areas_file_name(appliance_version);
        let stored = match store.read(&name) {
            Ok(contents) => contents.and_then(|c| serde_json::from_str::<Vec<Value>>(&c).ok()),
            Err(e) => {
                log::warn!("{} AREAS_READ_FAILED file={} error={}", ctx, name, e);
                None
            }
        };

        let raw = match stored {
            Some(raw) => raw,
            None => {
                let raw = fetch()?;
                store.write(&name, &serde_json::to_string(&raw)?)?;
                log::info!("{} AREAS_FETCHED count={}", ctx, raw.len());
                raw
            }
        };

        let areas = raw.iter().map(Area::from_json).collect::<Result<Vec<_>>>()?;
        Ok(Self::new(areas))
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.areas.keys().map(String::as_str).collect()
    }

    /// Id of the named area. Accepts the display name or its normalized form.
    pub fn area_id(&self, name: &str) -> Result<i64> {
        self.areas
            .get(&normalize(name))
            .map(|a| a.id)
            .ok_or_else(|| ProfilerError::InvalidArea(name.to_string()))
    }
}
