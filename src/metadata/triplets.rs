//! Realms, centricities, groupbys and the table of legal combinations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ProfilerError, Result};

/// Version of the persisted column cache layout. Bump when the column or
/// triplet schema changes so stale files are rebuilt.
pub const CACHE_VERSION: u32 = 2;

/// Columns created by the appliance for a single report get ids at or above
/// this value.
pub const EPHEMERAL_COLID: i64 = 200_000;

/// Appliance query domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Realm {
    TrafficSummary,
    TrafficOverallTimeSeries,
    TrafficTimeSeries,
    TrafficFlowList,
    IdentityList,
    Msq,
}

impl Realm {
    pub const ALL: [Realm; 6] = [
        Realm::TrafficSummary,
        Realm::TrafficOverallTimeSeries,
        Realm::TrafficTimeSeries,
        Realm::TrafficFlowList,
        Realm::IdentityList,
        Realm::Msq,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Realm::TrafficSummary => "traffic_summary",
            Realm::TrafficOverallTimeSeries => "traffic_overall_time_series",
            Realm::TrafficTimeSeries => "traffic_time_series",
            Realm::TrafficFlowList => "traffic_flow_list",
            Realm::IdentityList => "identity_list",
            Realm::Msq => "msq",
        }
    }

    /// Centricities the appliance accepts for this realm.
    pub fn centricities(&self) -> &'static [Centricity] {
        match self {
            Realm::TrafficFlowList | Realm::IdentityList | Realm::Msq => &[Centricity::Host],
            _ => &[Centricity::Host, Centricity::Interface],
        }
    }

    /// Whether `groupby` is legal for this realm.
    pub fn allows_groupby(&self, groupby: Groupby) -> bool {
        match self {
            Realm::TrafficSummary => groupby != Groupby::TimeHostUser,
            Realm::TrafficOverallTimeSeries | Realm::TrafficTimeSeries => groupby == Groupby::Time,
            Realm::TrafficFlowList => groupby == Groupby::Host,
            Realm::IdentityList => groupby == Groupby::TimeHostUser,
            Realm::Msq => groupby == Groupby::ServiceLocationMetric,
        }
    }
}

impl fmt::Display for Realm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Realm {
    type Err = ProfilerError;

    fn from_str(s: &str) -> Result<Self> {
        Realm::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| ProfilerError::InvalidArgument(format!("unknown realm {}", s)))
    }
}

/// Perspective of directional counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Centricity {
    #[serde(rename = "hos")]
    Host,
    #[serde(rename = "int")]
    Interface,
}

impl Centricity {
    pub const ALL: [Centricity; 2] = [Centricity::Host, Centricity::Interface];

    pub fn as_str(&self) -> &'static str {
        match self {
            Centricity::Host => "hos",
            Centricity::Interface => "int",
        }
    }
}

impl fmt::Display for Centricity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Centricity {
    type Err = ProfilerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hos" | "host" => Ok(Centricity::Host),
            "int" | "interface" => Ok(Centricity::Interface),
            other => Err(ProfilerError::InvalidArgument(format!(
                "unknown centricity {}",
                other
            ))),
        }
    }
}

macro_rules! groupbys {
    ($($variant:ident => ($name:literal, $code:literal)),* $(,)?) => {
        /// Dimension rows are aggregated by, encoded on the wire as a
        /// three-letter code.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Groupby {
            $($variant),*
        }

        impl Groupby {
            pub const ALL: &'static [Groupby] = &[$(Groupby::$variant),*];

            pub fn code(&self) -> &'static str {
                match self {
                    $(Groupby::$variant => $code),*
                }
            }

            pub fn name(&self) -> &'static str {
                match self {
                    $(Groupby::$variant => $name),*
                }
            }
        }
    };
}

groupbys! {
    Application => ("application", "app"),
    ApplicationPort => ("application_port", "apt"),
    ApplicationProtoportQos => ("application_protoport_qos", "apq"),
    Device => ("device", "dev"),
    GroupPairProtoport => ("group_pair_protoport", "gpr"),
    Host => ("host", "hos"),
    HostAndVtepPair => ("host_and_vtep_pair", "vhp"),
    HostGroup => ("host_group", "gro"),
    HostGroupPair => ("host_group_pair", "gpp"),
    HostPair => ("host_pair", "hop"),
    HostPairProtoport => ("host_pair_protoport", "hpr"),
    Interface => ("interface", "ifc"),
    InterfaceQos => ("interface_qos", "ifq"),
    IpMac => ("ip_mac", "ipm"),
    IpMacPair => ("ip_mac_pair", "ipp"),
    IpMacPairProtoport => ("ip_mac_pair_protoport", "ipr"),
    Peer => ("peer", "per"),
    PeerGroup => ("peer_group", "pgp"),
    PeerIpMac => ("peer_ip_mac", "pip"),
    Port => ("port", "por"),
    PortGroup => ("port_group", "pgr"),
    Protocol => ("protocol", "pro"),
    Segment => ("segment", "seg"),
    ServiceLocationMetric => ("service_location_metric_aggregation", "slm"),
    Time => ("time", "tim"),
    TimeHostUser => ("time_host_user", "thu"),
    Total => ("total", "mzt"),
    VtepPair => ("vtep_pair", "vpa"),
    Vxlan => ("vxlan", "vxl"),
}

impl Groupby {
    /// Groupbys that aggregate over host groups and need a host group type.
    pub fn uses_host_groups(&self) -> bool {
        matches!(
            self,
            Groupby::HostGroup
                | Groupby::HostGroupPair
                | Groupby::GroupPairProtoport
                | Groupby::PeerGroup
                | Groupby::PortGroup
        )
    }
}

impl fmt::Display for Groupby {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Groupby {
    type Err = ProfilerError;

    /// Accepts the wire code (`por`) or the long name (`port`).
    fn from_str(s: &str) -> Result<Self> {
        Groupby::ALL
            .iter()
            .copied()
            .find(|g| g.code() == s || g.name() == s)
            .ok_or_else(|| ProfilerError::InvalidArgument(format!("unknown groupby {}", s)))
    }
}

impl Serialize for Groupby {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for Groupby {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One (realm, centricity, groupby) combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Triplet {
    pub realm: Realm,
    pub centricity: Centricity,
    pub groupby: Groupby,
}

impl Triplet {
    pub fn new(realm: Realm, centricity: Centricity, groupby: Groupby) -> Self {
        Self {
            realm,
            centricity,
            groupby,
        }
    }

    /// Cache key for this triplet.
    pub fn key(&self) -> String {
        format!(
            "{}{}{}",
            self.realm.as_str(),
            self.centricity.as_str(),
            self.groupby.code()
        )
    }

    pub fn is_valid(&self) -> bool {
        self.realm.centricities().contains(&self.centricity) && self.realm.allows_groupby(self.groupby)
    }

    /// Fail with `InvalidRealmGroupbyCombination` unless the table allows
    /// this combination.
    pub fn validate(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(ProfilerError::InvalidRealmGroupbyCombination {
                realm: self.realm.to_string(),
                centricity: self.centricity.to_string(),
                groupby: self.groupby.to_string(),
            })
        }
    }
}

impl fmt::Display for Triplet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.realm, self.centricity, self.groupby)
    }
}

/// Every legal triplet drawn from the given realms, centricities and
/// groupbys, in that nesting order.
pub fn valid_triplets(realms: &[Realm], centricities: &[Centricity], groupbys: &[Groupby]) -> Vec<Triplet> {
    let mut result = Vec::new();
    for &realm in realms {
        for &centricity in centricities {
            if !realm.centricities().contains(&centricity) {
                continue;
            }
            for &groupby in groupbys {
                if realm.allows_groupby(groupby) {
                    result.push(Triplet::new(realm, centricity, groupby));
                }
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groupby_parse_code_and_name() {
        assert_eq!("por".parse::<Groupby>().unwrap(), Groupby::Port);
        assert_eq!("port".parse::<Groupby>().unwrap(), Groupby::Port);
        assert_eq!("thu".parse::<Groupby>().unwrap(), Groupby::TimeHostUser);
        assert!("xyz".parse::<Groupby>().is_err());
    }

    #[test]
    fn test_compatibility_table() {
        assert!(Triplet::new(Realm::TrafficSummary, Centricity::Interface, Groupby::Port).is_valid());
        assert!(!Triplet::new(Realm::TrafficSummary, Centricity::Host, Groupby::TimeHostUser).is_valid());
        assert!(Triplet::new(Realm::TrafficTimeSeries, Centricity::Interface, Groupby::Time).is_valid());
        assert!(!Triplet::new(Realm::TrafficOverallTimeSeries, Centricity::Host, Groupby::Port).is_valid());
        assert!(!Triplet::new(Realm::TrafficFlowList, Centricity::Interface, Groupby::Host).is_valid());
        assert!(Triplet::new(Realm::IdentityList, Centricity::Host, Groupby::TimeHostUser).is_valid());
        assert!(Triplet::new(Realm::Msq, Centricity::Host, Groupby::ServiceLocationMetric).is_valid());
    }

    #[test]
    fn test_validate_reports_combination() {
        let err = Triplet::new(Realm::TrafficFlowList, Centricity::Host, Groupby::Port)
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            ProfilerError::InvalidRealmGroupbyCombination { ref groupby, .. } if groupby == "por"
        ));
    }

    #[test]
    fn test_valid_triplets_counts() {
        let triplets = valid_triplets(
            &[Realm::TrafficSummary, Realm::TrafficOverallTimeSeries, Realm::TrafficTimeSeries],
            &Centricity::ALL,
            &[Groupby::Time],
        );
        assert_eq!(triplets.len(), 6);

        let flow = valid_triplets(&[Realm::TrafficFlowList], &Centricity::ALL, Groupby::ALL);
        assert_eq!(flow, vec![Triplet::new(Realm::TrafficFlowList, Centricity::Host, Groupby::Host)]);

        let summary = valid_triplets(&[Realm::TrafficSummary], &[Centricity::Host], Groupby::ALL);
        assert_eq!(summary.len(), Groupby::ALL.len() - 1);
    }

    #[test]
    fn test_triplet_key() {
        let t = Triplet::new(Realm::TrafficSummary, Centricity::Host, Groupby::Port);
        assert_eq!(t.key(), "traffic_summaryhospor");
    }

    #[test]
    fn test_realm_serde_names() {
        let v = serde_json::to_value(Realm::TrafficOverallTimeSeries).unwrap();
        assert_eq!(v, serde_json::json!("traffic_overall_time_series"));
        let g: Groupby = serde_json::from_value(serde_json::json!("tim")).unwrap();
        assert_eq!(g, Groupby::Time);
    }
}
