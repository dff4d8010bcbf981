use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, trace};

use crate::core::models::cost::{CostItem, Snapshot};

/// Label names of a cost series, in emission order. `cost_type` sits between
/// `category` and `region`.
pub const COST_LABELS: [&str; 10] = [
    "provider_id",
    "account_id",
    "service",
    "category",
    "cost_type",
    "region",
    "availability_zone",
    "owner",
    "environment",
    "cluster",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CostType {
    List,
    Net,
    AmortizedNet,
    Invoiced,
    Amortized,
}

impl CostType {
    pub const ALL: [CostType; 5] = [
        CostType::List,
        CostType::Net,
        CostType::AmortizedNet,
        CostType::Invoiced,
        CostType::Amortized,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Net => "net",
            Self::AmortizedNet => "amortized_net",
            Self::Invoiced => "invoiced",
            Self::Amortized => "amortized",
        }
    }
}

impl fmt::Display for CostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grouping key for cost items. Missing labels are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DimensionKey {
    pub provider_id: String,
    pub account_id: String,
    pub service: String,
    pub category: String,
    pub region: String,
    pub availability_zone: String,
    pub owner: String,
    pub environment: String,
    pub cluster: String,
}

impl DimensionKey {
    pub fn from_item(item: &CostItem) -> Self {
        let props = &item.properties;
        Self {
            provider_id: props.provider_id.clone(),
            account_id: props.account_id.clone(),
            service: props.service.clone(),
            category: props.category.clone(),
            region: props.region_id.clone(),
            availability_zone: props.availability_zone.clone(),
            owner: props.label("owner").to_string(),
            environment: props.label("environment").to_string(),
            cluster: props.label("cluster").to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AggregatedCost {
    pub list: f64,
    pub net: f64,
    pub amortized_net: f64,
    pub invoiced: f64,
    pub amortized: f64,
    /// Kubernetes share of the last item folded into this key. Items sharing
    /// a key are assumed to share the same share, so it is not summed.
    pub kube_percent: f64,
}

impl AggregatedCost {
    fn add(&mut self, item: &CostItem) {
        self.list += item.list_cost.cost;
        self.net += item.net_cost.cost;
        self.amortized_net += item.amortized_net_cost.cost;
        self.invoiced += item.invoiced_cost.cost;
        self.amortized += item.amortized_cost.cost;
        self.kube_percent = item.list_cost.kubernetes_percent;
    }

    pub fn cost(&self, cost_type: CostType) -> f64 {
        match cost_type {
            CostType::List => self.list,
            CostType::Net => self.net,
            CostType::AmortizedNet => self.amortized_net,
            CostType::Invoiced => self.invoiced,
            CostType::Amortized => self.amortized,
        }
    }
}

/// Sum every item of every set by its dimension key.
pub fn aggregate(snapshot: &Snapshot) -> BTreeMap<DimensionKey, AggregatedCost> {
    let mut aggregated: BTreeMap<DimensionKey, AggregatedCost> = BTreeMap::new();

    debug!(num_sets = snapshot.data.sets.len(), "processing cloud cost data");
    for (set_index, set) in snapshot.data.sets.iter().enumerate() {
        debug!(set_index, num_items = set.cloud_costs.len(), "processing cloud cost set");
        for (id, item) in &set.cloud_costs {
            trace!(
                id = %id,
                account_id = %item.properties.account_id,
                service = %item.properties.service,
                category = %item.properties.category,
                labels = ?item.properties.labels,
                list_cost = item.list_cost.cost,
                kube_percent = item.list_cost.kubernetes_percent,
                "processing cloud cost item"
            );
            aggregated
                .entry(DimensionKey::from_item(item))
                .or_default()
                .add(item);
        }
    }

    debug!(num_unique_keys = aggregated.len(), "aggregation complete");
    aggregated
}

/// One labeled value handed to the metrics sink.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostObservation<'a> {
    pub key: &'a DimensionKey,
    pub cost_type: CostType,
    pub value: f64,
}

impl<'a> CostObservation<'a> {
    /// Label values in `COST_LABELS` order.
    pub fn label_values(&self) -> [&'a str; 10] {
        let k = self.key;
        [
            &k.provider_id,
            &k.account_id,
            &k.service,
            &k.category,
            self.cost_type.as_str(),
            &k.region,
            &k.availability_zone,
            &k.owner,
            &k.environment,
            &k.cluster,
        ]
    }
}

#[derive(Debug, Default)]
pub struct Observations<'a> {
    pub costs: Vec<CostObservation<'a>>,
    /// Tagged `amortized_net` so each key yields a single series.
    pub kube_percent: Vec<CostObservation<'a>>,
}

/// Five cost observations per key, plus one Kubernetes share per key when enabled.
pub fn observations(
    aggregated: &BTreeMap<DimensionKey, AggregatedCost>,
    emit_kube_percent: bool,
) -> Observations<'_> {
    let mut out = Observations {
        costs: Vec::with_capacity(aggregated.len() * CostType::ALL.len()),
        kube_percent: Vec::new(),
    };
    for (key, cost) in aggregated {
        for cost_type in CostType::ALL {
            out.costs.push(CostObservation {
                key,
                cost_type,
                value: cost.cost(cost_type),
            });
        }
        if emit_kube_percent {
            out.kube_percent.push(CostObservation {
                key,
                cost_type: CostType::AmortizedNet,
                value: cost.kube_percent,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::cost::{CostProperties, CostSet, CostValue, SnapshotData};
    use std::collections::HashMap;

    fn item(service: &str, list: f64, kube: f64, labels: &[(&str, &str)]) -> CostItem {
        CostItem {
            properties: CostProperties {
                provider_id: "i-123".to_string(),
                account_id: "123456789".to_string(),
                service: service.to_string(),
                category: "Compute".to_string(),
                region_id: "us-east-1".to_string(),
                availability_zone: "us-east-1a".to_string(),
                labels: labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<HashMap<_, _>>(),
                ..Default::default()
            },
            list_cost: CostValue {
                cost: list,
                kubernetes_percent: kube,
            },
            ..Default::default()
        }
    }

    fn snapshot(sets: Vec<Vec<(&str, CostItem)>>) -> Snapshot {
        Snapshot {
            code: 200,
            data: SnapshotData {
                sets: sets
                    .into_iter()
                    .map(|items| CostSet {
                        cloud_costs: items
                            .into_iter()
                            .map(|(id, item)| (id.to_string(), item))
                            .collect(),
                    })
                    .collect(),
            },
        }
    }

    #[test]
    fn identical_keys_are_summed() {
        let snap = snapshot(vec![vec![
            ("a", item("AmazonEC2", 100.50, 0.5, &[])),
            ("b", item("AmazonEC2", 50.00, 0.5, &[])),
        ]]);
        let aggregated = aggregate(&snap);
        assert_eq!(aggregated.len(), 1);
        let cost = aggregated.values().next().unwrap();
        assert_eq!(cost.list, 150.50);
    }

    #[test]
    fn keys_are_summed_across_sets() {
        let snap = snapshot(vec![
            vec![("a", item("AmazonEC2", 10.0, 0.0, &[]))],
            vec![("a", item("AmazonEC2", 5.0, 0.0, &[]))],
        ]);
        let aggregated = aggregate(&snap);
        assert_eq!(aggregated.len(), 1);
        assert_eq!(aggregated.values().next().unwrap().list, 15.0);
    }

    #[test]
    fn distinct_keys_stay_distinct() {
        let snap = snapshot(vec![vec![
            ("a", item("AmazonEC2", 100.0, 0.0, &[("owner", "team-alpha")])),
            ("b", item("AmazonEC2", 100.0, 0.0, &[("owner", "team-beta")])),
            ("c", item("AmazonRDS", 100.0, 0.0, &[("owner", "team-alpha")])),
        ]]);
        let aggregated = aggregate(&snap);
        assert_eq!(aggregated.len(), 3);
        assert!(aggregated.values().all(|c| c.list == 100.0));
    }

    #[test]
    fn missing_labels_become_empty_strings() {
        let key = DimensionKey::from_item(&item("AmazonS3", 1.0, 0.0, &[("owner", "ops")]));
        assert_eq!(key.owner, "ops");
        assert_eq!(key.environment, "");
        assert_eq!(key.cluster, "");
    }

    #[test]
    fn region_comes_from_region_id_not_zone() {
        let key = DimensionKey::from_item(&item("AmazonEC2", 1.0, 0.0, &[]));
        assert_eq!(key.region, "us-east-1");
        assert_eq!(key.availability_zone, "us-east-1a");
    }

    #[test]
    fn kube_percent_is_last_write_not_sum() {
        let snap = snapshot(vec![vec![
            ("a", item("AmazonEC2", 1.0, 0.25, &[])),
            ("b", item("AmazonEC2", 1.0, 0.75, &[])),
        ]]);
        let aggregated = aggregate(&snap);
        let cost = aggregated.values().next().unwrap();
        assert_eq!(cost.kube_percent, 0.75);
    }

    #[test]
    fn aggregation_is_deterministic() {
        let snap = snapshot(vec![vec![
            ("x", item("AmazonEC2", 0.1, 0.0, &[])),
            ("y", item("AmazonEC2", 0.2, 0.0, &[])),
            ("z", item("AmazonRDS", 0.3, 0.0, &[("cluster", "eks")])),
        ]]);
        let first = aggregate(&snap);
        let second = aggregate(&snap);
        assert_eq!(first.keys().collect::<Vec<_>>(), second.keys().collect::<Vec<_>>());
        for (a, b) in first.values().zip(second.values()) {
            assert_eq!(a.list.to_bits(), b.list.to_bits());
        }
    }

    #[test]
    fn cost_labels_interleave_cost_type_after_category() {
        let key = DimensionKey {
            provider_id: "p".to_string(),
            account_id: "a".to_string(),
            service: "svc".to_string(),
            category: "cat".to_string(),
            region: "region".to_string(),
            availability_zone: "az".to_string(),
            owner: "owner".to_string(),
            environment: "env".to_string(),
            cluster: "cluster".to_string(),
        };
        let obs = CostObservation {
            key: &key,
            cost_type: CostType::Net,
            value: 1.0,
        };
        assert_eq!(
            obs.label_values(),
            ["p", "a", "svc", "cat", "net", "region", "az", "owner", "env", "cluster"]
        );
        assert_eq!(COST_LABELS[3], "category");
        assert_eq!(COST_LABELS[4], "cost_type");
        assert_eq!(COST_LABELS[5], "region");
    }

    #[test]
    fn single_item_yields_five_costs_and_one_kube_percent() {
        let mut ec2 = item(
            "AmazonEC2",
            100.50,
            0.75,
            &[("owner", "team-alpha"), ("environment", "prod"), ("cluster", "eks-main")],
        );
        ec2.amortized_net_cost = CostValue {
            cost: 70.30,
            kubernetes_percent: 0.75,
        };
        let snap = snapshot(vec![vec![("test-item", ec2)]]);
        let aggregated = aggregate(&snap);
        let obs = observations(&aggregated, true);

        assert_eq!(obs.costs.len(), 5);
        let types: Vec<_> = obs.costs.iter().map(|o| o.cost_type.as_str()).collect();
        assert_eq!(types, ["list", "net", "amortized_net", "invoiced", "amortized"]);
        let list = obs.costs.iter().find(|o| o.cost_type == CostType::List).unwrap();
        assert_eq!(list.value, 100.50);
        let amortized_net = obs
            .costs
            .iter()
            .find(|o| o.cost_type == CostType::AmortizedNet)
            .unwrap();
        assert_eq!(amortized_net.value, 70.30);

        assert_eq!(obs.kube_percent.len(), 1);
        assert_eq!(obs.kube_percent[0].cost_type, CostType::AmortizedNet);
        assert_eq!(obs.kube_percent[0].value, 0.75);
        assert_eq!(obs.kube_percent[0].label_values()[4], "amortized_net");
    }

    #[test]
    fn kube_percent_disabled_emits_none() {
        let snap = snapshot(vec![vec![("a", item("AmazonEC2", 1.0, 0.5, &[]))]]);
        let aggregated = aggregate(&snap);
        let obs = observations(&aggregated, false);
        assert_eq!(obs.costs.len(), 5);
        assert!(obs.kube_percent.is_empty());
    }

    #[test]
    fn empty_snapshot_yields_nothing() {
        let aggregated = aggregate(&Snapshot::default());
        assert!(aggregated.is_empty());
        assert!(observations(&aggregated, true).costs.is_empty());
    }
}
