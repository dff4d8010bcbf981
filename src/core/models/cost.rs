use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One full cost report as returned by `GET /cloudCost`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub data: SnapshotData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotData {
    #[serde(default, deserialize_with = "null_as_default")]
    pub sets: Vec<CostSet>,
}

/// A set of cost items for one window, keyed by an opaque item identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSet {
    #[serde(rename = "cloudCosts", default, deserialize_with = "null_as_default")]
    pub cloud_costs: BTreeMap<String, CostItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostItem {
    #[serde(default)]
    pub properties: CostProperties,
    #[serde(default)]
    pub window: Window,
    #[serde(default)]
    pub list_cost: CostValue,
    #[serde(default)]
    pub net_cost: CostValue,
    #[serde(default)]
    pub amortized_net_cost: CostValue,
    #[serde(default)]
    pub invoiced_cost: CostValue,
    #[serde(default)]
    pub amortized_cost: CostValue,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostProperties {
    #[serde(rename = "providerID", alias = "providerId", default)]
    pub provider_id: String,
    #[serde(default)]
    pub provider: String,
    #[serde(rename = "accountID", alias = "accountId", default)]
    pub account_id: String,
    #[serde(rename = "accountName", default)]
    pub account_name: String,
    #[serde(rename = "invoiceEntityID", alias = "invoiceEntityId", default)]
    pub invoice_entity_id: String,
    #[serde(rename = "invoiceEntityName", default)]
    pub invoice_entity_name: String,
    #[serde(rename = "availabilityZone", default)]
    pub availability_zone: String,
    #[serde(rename = "regionID", alias = "regionId", default)]
    pub region_id: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub category: String,
    /// Free-form resource labels (tags)
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "HashMap::is_empty"
    )]
    pub labels: HashMap<String, String>,
}

impl CostProperties {
    /// Label value by key, empty when the label is absent.
    pub fn label(&self, key: &str) -> &str {
        self.labels.get(key).map(String::as_str).unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Window {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

/// A cost amount paired with the fraction attributed to Kubernetes (0.0 - 1.0).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostValue {
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub kubernetes_percent: f64,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
