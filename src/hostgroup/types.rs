use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::endpoints::ProfilerApi;
use crate::error::{ProfilerError, Result};
use crate::hostgroup::group::HostGroup;
use crate::logging::structured::LogContext;
use crate::profiler::NetProfiler;
use crate::report::values::value_to_int;

/// One `{cidr, name}` line of a host group type's config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub cidr: String,
    pub name: String,
}

impl ConfigEntry {
    pub fn new(cidr: &str, name: &str) -> Self {
        Self {
            cidr: cidr.to_string(),
            name: name.to_string(),
        }
    }
}

fn ignore_not_found(result: Result<Value>) -> Result<Option<Value>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(ProfilerError::Http(e)) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

#[derive(Clone)]
pub struct HostGroupType {
    api: ProfilerApi,
    ctx: LogContext,
    /// `None` until saved on the appliance.
    pub id: Option<i64>,
    pub name: String,
    pub favorite: bool,
    pub description: String,
    pub config: Vec<ConfigEntry>,
    groups: BTreeSet<String>,
}

impl HostGroupType {
    /// New type, local until [`save`](Self::save).
    pub fn create(profiler: &NetProfiler, name: &str, favorite: bool, description: &str) -> Self {
        Self {
            api: profiler.api().clone(),
            ctx: profiler.ctx().clone(),
            id: None,
            name: name.to_string(),
            favorite,
            description: description.to_string(),
            config: Vec::new(),
            groups: BTreeSet::new(),
        }
    }

    /// Find a type by name and load its config.
    pub fn find_by_name(profiler: &NetProfiler, name: &str) -> Result<Self> {
        let found = profiler
            .api()
            .host_group_types()?
            .into_iter()
            .find(|t| t.get("name").and_then(Value::as_str) == Some(name))
            .ok_or_else(|| ProfilerError::HostGroup(format!("no host group type named {}", name)))?;
        let id = found
            .get("id")
            .and_then(value_to_int)
            .ok_or_else(|| ProfilerError::Parse(format!("host group type without id: {}", found)))?;

        let mut hgt = Self::create(profiler, name, false, "");
        hgt.id = Some(id);
        hgt.load()?;
        Ok(hgt)
    }

    fn require_id(&self) -> Result<i64> {
        self.id
            .ok_or_else(|| ProfilerError::HostGroup(format!("host group type {} has not been saved", self.name)))
    }

    /// Reload settings, config and group names from the appliance. A type
    /// with no config yet answers 404 for it, which loads as empty.
    pub fn load(&mut self) -> Result<()> {
        let id = self.require_id()?;
        let info = self.api.host_group_type(id)?;
        if let Some(name) = info.get("name").and_then(Value::as_str) {
            self.name = name.to_string();
        }
        self.favorite = info.get("favorite").and_then(Value::as_bool).unwrap_or(false);
        self.description = info
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        self.config = match ignore_not_found(self.api.host_group_type_config(id))? {
            Some(raw) => serde_json::from_value(raw)?,
            None => Vec::new(),
        };

        self.groups = self.config.iter().map(|e| e.name.clone()).collect();
        let listed = ignore_not_found(self.api.host_group_type_groups(id).map(Value::Array))?;
        if let Some(Value::Array(groups)) = listed {
            self.groups
                .extend(groups.iter().filter_map(|g| g.get("name").and_then(Value::as_str)).map(str::to_string));
        }

        log::info!(
            "{} HOSTGROUP_TYPE_LOADED id={} name={} entries={} groups={}",
            self.ctx,
            id,
            self.name,
            self.config.len(),
            self.groups.len()
        );
        Ok(())
    }

    fn body(&self) -> Value {
        json!({
            "name": self.name,
            "favorite": self.favorite,
            "description": self.description,
            "config": self.config,
        })
    }

    /// Create the type on the appliance if new, otherwise update it.
    pub fn save(&mut self) -> Result<()> {
        let body = self.body();
        match self.id {
            Some(id) => {
                self.api.update_host_group_type(id, &body)?;
                log::info!("{} HOSTGROUP_TYPE_UPDATED id={} entries={}", self.ctx, id, self.config.len());
            }
            None => {
                let response = self.api.create_host_group_type(&body)?;
                let id = response
                    .get("id")
                    .and_then(value_to_int)
                    .ok_or_else(|| ProfilerError::HostGroup(format!("create returned no id: {}", response)))?;
                self.id = Some(id);
                log::info!("{} HOSTGROUP_TYPE_CREATED id={} name={}", self.ctx, id, self.name);
            }
        }
        Ok(())
    }

    /// Delete the type and all its groups from the appliance.
    pub fn delete(&mut self) -> Result<()> {
        let id = self.require_id()?;
        self.api.delete_host_group_type(id)?;
        self.id = None;
        log::info!("{} HOSTGROUP_TYPE_DELETED id={}", self.ctx, id);
        Ok(())
    }

    /// Edit handle for the named group, registering the name if new.
    pub fn group(&mut self, name: &str) -> HostGroup<'_> {
        self.groups.insert(name.to_string());
        HostGroup::new(self, name)
    }

    pub fn group_names(&self) -> Vec<&str> {
        self.groups.iter().map(String::as_str).collect()
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.groups.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::connection::Method;
    use crate::api::endpoints::HOST_GROUP_TYPES_PREFIX;
    use crate::api::testing::{connect, not_found, scripted};
    use crate::error::HttpError;

    #[test]
    fn test_find_by_name_loads_config() {
        let conn = scripted("np");
        conn.on(
            Method::Get,
            HOST_GROUP_TYPES_PREFIX,
            Ok(json!([{"id": 3, "name": "ByRegion"}, {"id": 7, "name": "ByLocation"}])),
        );
        conn.on(
            Method::Get,
            &format!("{}/7", HOST_GROUP_TYPES_PREFIX),
            Ok(json!({"id": 7, "name": "ByLocation", "favorite": true, "description": "sites"})),
        );
        conn.on(
            Method::Get,
            &format!("{}/7/config", HOST_GROUP_TYPES_PREFIX),
            Ok(json!([{"cidr": "10.99.1.0/24", "name": "Boston"}, {"cidr": "10.99.3.0/24", "name": "SanFran"}])),
        );
        conn.on(
            Method::Get,
            &format!("{}/7/groups", HOST_GROUP_TYPES_PREFIX),
            Ok(json!([{"name": "Boston"}, {"name": "Empty"}])),
        );
        let profiler = connect(&conn);

        let hgt = HostGroupType::find_by_name(&profiler, "ByLocation").unwrap();
        assert_eq!(hgt.id, Some(7));
        assert!(hgt.favorite);
        assert_eq!(hgt.config.len(), 2);
        assert_eq!(hgt.group_names(), vec!["Boston", "Empty", "SanFran"]);

        assert!(matches!(
            HostGroupType::find_by_name(&profiler, "Nope"),
            Err(ProfilerError::HostGroup(_))
        ));
    }

    #[test]
    fn test_missing_config_loads_empty() {
        let conn = scripted("np");
        conn.on(Method::Get, &format!("{}/9", HOST_GROUP_TYPES_PREFIX), Ok(json!({"name": "Fresh"})));
        conn.on(Method::Get, &format!("{}/9/config", HOST_GROUP_TYPES_PREFIX), Err(not_found()));
        let profiler = connect(&conn);
        let mut hgt = HostGroupType::create(&profiler, "Fresh", false, "");
        hgt.id = Some(9);
        hgt.load().unwrap();
        assert!(hgt.config.is_empty());

        conn.on(
            Method::Get,
            &format!("{}/10/config", HOST_GROUP_TYPES_PREFIX),
            Err(HttpError::Status { code: 500, body: "boom".into() }),
        );
        conn.on(Method::Get, &format!("{}/10", HOST_GROUP_TYPES_PREFIX), Ok(json!({"name": "Broken"})));
        hgt.id = Some(10);
        assert!(matches!(hgt.load(), Err(ProfilerError::Http(_))));
    }

    #[test]
    fn test_create_save_update_delete() {
        let conn = scripted("np");
        conn.on(Method::Post, HOST_GROUP_TYPES_PREFIX, Ok(json!({"id": 12, "name": "TestType"})));
        conn.on(Method::Put, &format!("{}/12", HOST_GROUP_TYPES_PREFIX), Ok(json!({})));
        conn.on(Method::Delete, &format!("{}/12", HOST_GROUP_TYPES_PREFIX), Ok(Value::Null));
        let profiler = connect(&conn);

        let mut hgt = HostGroupType::create(&profiler, "TestType", false, "PODLE");
        assert!(matches!(hgt.load(), Err(ProfilerError::HostGroup(_))));
        assert!(matches!(hgt.delete(), Err(ProfilerError::HostGroup(_))));

        hgt.group("Test0").add(&["10.90.11.0/24"], false, true, false);
        hgt.save().unwrap();
        assert_eq!(hgt.id, Some(12));

        hgt.save().unwrap();
        let put = conn
            .calls()
            .into_iter()
            .find(|c| c.method == Method::Put)
            .and_then(|c| c.body)
            .unwrap();
        assert_eq!(put["config"], json!([{"cidr": "10.90.11.0/24", "name": "Test0"}]));
        assert_eq!(put["description"], "PODLE");

        hgt.delete().unwrap();
        assert_eq!(hgt.id, None);
        assert!(hgt.delete().is_err());
    }
}
