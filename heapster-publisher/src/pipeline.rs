/**
 * INGESTION PIPELINE - Routes one decoded batch into the entity store
 *
 * ROLE :
 * Turns flat namespaced measurements into per-container documents and
 * per-round samples, using the mapping tables of the compiled template.
 *
 * HOW IT WORKS :
 * - classification on the metric prefix; the next segment names the container
 * - each relevant measurement tries the sample table, then the interface
 *   table, then (first round of a container only) the container table
 * - at the end of the batch every in-progress sample gets its interface list
 *   and is admitted into its container history under the retention policy
 *
 * Runs with the store lock held for the whole batch.
 */

use crate::codec::Measurement;
use crate::config::Settings;
use crate::error::{PathError, PublishError};
use crate::models::{Node, Scalar};
use crate::state::{Entity, RetentionPolicy, Sample, StoreState};
use crate::template::{CompiledTemplate, Region, TemplateSpec, INTERFACES_PATH};
use crate::walker;
use serde::Serialize;
use std::collections::{hash_map::Entry, BTreeMap, HashMap, HashSet};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime, UtcOffset};
use tracing::{debug, info, warn};

pub const ROOT_CONTAINER: &str = "root";
const TIMESTAMP_PATH: &str = "/timestamp";

/// Outcome of one batch, returned to the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub metrics_received: usize,
    pub metrics_routed: usize,
    pub containers_touched: usize,
    pub samples_committed: usize,
}

/// Container addressed by a measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRef {
    pub id: String,
    pub key: String,
}

/// `<prefix>/<id>/...` → container; `root` is the host itself, keyed `/`.
pub fn classify(namespace: &str, prefix: &str) -> Option<ContainerRef> {
    let tail = namespace.strip_prefix(prefix)?.trim_start_matches('/');
    let id = tail.split('/').next().filter(|id| !id.is_empty())?;
    if id == ROOT_CONTAINER {
        return Some(ContainerRef {
            id: walker::ROOT.to_string(),
            key: walker::ROOT.to_string(),
        });
    }
    Some(ContainerRef {
        id: id.to_string(),
        key: format!("/{id}"),
    })
}

/// Sample being filled during the current batch.
struct PendingSample {
    timestamp: OffsetDateTime,
    document: Node,
    interfaces: BTreeMap<String, Node>,
}

impl PendingSample {
    fn new(region: &Region, timestamp: OffsetDateTime, stamp: String) -> Result<Self, PathError> {
        let mut document = region.instantiate();
        walker::set(&mut document, TIMESTAMP_PATH, Node::string(stamp))?;
        Ok(Self {
            timestamp,
            document,
            interfaces: BTreeMap::new(),
        })
    }

    fn interface(&mut self, name: &str, region: &Region) -> &mut Node {
        self.interfaces.entry(name.to_string()).or_insert_with(|| {
            let mut snapshot = region.instantiate();
            if let Some(map) = snapshot.as_map_mut() {
                map.insert("name".to_string(), Node::string(name));
            }
            snapshot
        })
    }

    fn into_sample(self) -> Result<Sample, PathError> {
        let mut document = self.document;
        let interfaces = self.interfaces.into_values().collect();
        walker::set(&mut document, INTERFACES_PATH, Node::List(interfaces))?;
        Ok(Sample {
            timestamp: self.timestamp,
            document,
        })
    }
}

/// Shifted by `delta`, in UTC, whole seconds.
fn sample_timestamp(measured_at: OffsetDateTime, delta: Duration) -> OffsetDateTime {
    let shifted = measured_at
        .checked_add(delta)
        .unwrap_or(measured_at)
        .to_offset(UtcOffset::UTC);
    shifted - Duration::nanoseconds(i64::from(shifted.nanosecond()))
}

fn write_targets(doc: &mut Node, targets: &[&TemplateSpec], value: &Node) -> Result<(), PathError> {
    for spec in targets {
        walker::set(doc, &spec.target_path, value.clone())?;
    }
    Ok(())
}

/// Folds one batch into `state`. Nothing in `state` changes unless the whole
/// batch goes through.
pub fn process(
    state: &mut StoreState,
    batch: &[Measurement],
    template: &CompiledTemplate,
    settings: &Settings,
) -> Result<BatchReport, PublishError> {
    let mut pending: HashMap<String, PendingSample> = HashMap::new();
    // containers first seen in this batch, merged into the store on success
    let mut created: HashMap<String, Entity> = HashMap::new();
    let mut touched: HashSet<String> = HashSet::new();
    let mut produced: HashSet<String> = HashSet::new();
    let mut routed = 0;

    for measurement in batch {
        let namespace = measurement.namespace.to_string();
        let Some(container) = classify(&namespace, &settings.metric_prefix) else {
            continue;
        };

        let sample = match pending.entry(container.key.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let timestamp = sample_timestamp(measurement.timestamp, settings.timestamp_delta);
                let stamp = match timestamp.format(&Rfc3339) {
                    Ok(stamp) => stamp,
                    Err(e) => {
                        warn!(key = %container.key, %namespace, error = %e, "skipping measurement with unusable timestamp");
                        continue;
                    }
                };
                entry.insert(PendingSample::new(&template.sample, timestamp, stamp)?)
            }
        };
        touched.insert(container.key.clone());
        if !state.entities.contains_key(&container.key) && !created.contains_key(&container.key) {
            debug!(key = %container.key, "tracking new container");
            let entity = Entity::new(&container.key, &container.id, template.container.instantiate())?;
            created.insert(container.key.clone(), entity);
        }
        let value = Node::Leaf(Scalar::from(&measurement.data));

        if let Some(targets) = template.sample.mapping.resolve(&namespace) {
            write_targets(&mut sample.document, &targets, &value)?;
            produced.insert(container.key);
            routed += 1;
            continue;
        }
        if let Some(targets) = template.interface.mapping.resolve(&namespace) {
            let name = measurement.namespace.interface_name().unwrap_or_default();
            write_targets(sample.interface(name, &template.interface), &targets, &value)?;
            routed += 1;
            continue;
        }
        // container fields are only written in the round that discovers the container
        if let Some(entity) = created.get_mut(&container.key) {
            if let Some(targets) = template.container.mapping.resolve(&namespace) {
                write_targets(&mut entity.document, &targets, &value)?;
                routed += 1;
            }
        }
        // anything else is custom data with no place in the document
    }

    let samples = pending
        .into_iter()
        .map(|(key, in_progress)| Ok((key, in_progress.into_sample()?)))
        .collect::<Result<Vec<_>, PathError>>()?;

    state.entities.extend(created);
    let policy = RetentionPolicy::from_settings(settings);
    let mut committed = 0;
    for (key, sample) in samples {
        if let Some(entity) = state.entities.get_mut(&key) {
            policy.admit(&mut entity.history, sample);
            committed += 1;
        }
    }

    state.stats.record_batch(batch.len(), touched.len(), produced.len());
    info!(stats = ?state.stats, "processing stats");

    Ok(BatchReport {
        metrics_received: batch.len(),
        metrics_routed: routed,
        containers_touched: touched.len(),
        samples_committed: committed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{MetricData, Namespace};
    use crate::config::{ConfigMap, ConfigValue};
    use crate::walker::seek;
    use time::macros::datetime;
    use time::{Date, Month};

    fn measurement(ns: &str, data: MetricData, timestamp: OffsetDateTime) -> Measurement {
        Measurement {
            namespace: Namespace::parse(ns),
            data,
            timestamp,
        }
    }

    fn run(state: &mut StoreState, batch: &[Measurement]) -> BatchReport {
        let template = CompiledTemplate::builtin().unwrap();
        process(state, batch, &template, &Settings::default()).unwrap()
    }

    fn latest(state: &StoreState, key: &str) -> Node {
        state.entities[key].history.back().unwrap().document.clone()
    }

    #[test]
    fn test_classify() {
        let prefix = "/intel/docker";
        assert_eq!(
            classify("/intel/docker/abc123/cpu_stats/cpu_usage/total_usage", prefix),
            Some(ContainerRef { id: "abc123".into(), key: "/abc123".into() })
        );
        assert_eq!(
            classify("/intel/docker/root/memory_stats/cache", prefix),
            Some(ContainerRef { id: "/".into(), key: "/".into() })
        );
        assert_eq!(classify("/intel/procfs/cpu/0/user", prefix), None);
        assert_eq!(classify("/intel/docker", prefix), None);
    }

    #[test]
    fn test_sample_value_lands_at_target_path() {
        let mut state = StoreState::default();
        let ts = datetime!(2024-03-01 12:00:05.750 UTC);
        let report = run(
            &mut state,
            &[measurement("/intel/docker/abc/cpu_stats/cpu_usage/total_usage", MetricData::UInt(4242), ts)],
        );
        assert_eq!(report.metrics_routed, 1);
        assert_eq!(report.samples_committed, 1);

        let sample = latest(&state, "/abc");
        assert_eq!(seek(&sample, "/cpu/usage/total").unwrap(), &Node::Leaf(Scalar::UInt(4242)));
        assert_eq!(seek(&sample, "/timestamp").unwrap().as_str(), Some("2024-03-01T12:00:05Z"));
        assert_eq!(state.entities["/abc"].id, "abc");
    }

    #[test]
    fn test_alias_fan_out() {
        let mut state = StoreState::default();
        let ts = datetime!(2024-03-01 12:00 UTC);
        run(
            &mut state,
            &[measurement("/intel/docker/abc/memory_stats/usage/usage", MetricData::UInt(77), ts)],
        );
        let sample = latest(&state, "/abc");
        assert_eq!(seek(&sample, "/memory/usage").unwrap(), &Node::Leaf(Scalar::UInt(77)));
        assert_eq!(seek(&sample, "/memory/working_set").unwrap(), &Node::Leaf(Scalar::UInt(77)));
    }

    #[test]
    fn test_interfaces_become_named_list_entries() {
        let mut state = StoreState::default();
        let ts = datetime!(2024-03-01 12:00 UTC);
        run(
            &mut state,
            &[
                measurement("/intel/docker/abc/network/eth0/rx_bytes", MetricData::UInt(10), ts),
                measurement("/intel/docker/abc/network/eth1/rx_bytes", MetricData::UInt(20), ts),
                measurement("/intel/docker/abc/network/eth0/tx_bytes", MetricData::UInt(30), ts),
            ],
        );
        let sample = latest(&state, "/abc");
        let ifaces = seek(&sample, INTERFACES_PATH).unwrap().as_list().unwrap().to_vec();
        assert_eq!(ifaces.len(), 2);
        let eth0 = ifaces.iter().find(|i| i.get("name").and_then(Node::as_str) == Some("eth0")).unwrap();
        assert_eq!(eth0.get("rx_bytes"), Some(&Node::Leaf(Scalar::UInt(10))));
        assert_eq!(eth0.get("tx_bytes"), Some(&Node::Leaf(Scalar::UInt(30))));
        // the interface skeleton default stays for counters not reported
        assert_eq!(eth0.get("rx_errors"), Some(&Node::Leaf(Scalar::Int(0))));
    }

    #[test]
    fn test_container_fields_only_written_on_first_round() {
        let mut state = StoreState::default();
        let ts = datetime!(2024-03-01 12:00 UTC);
        let image = "/intel/docker/abc/spec/image_name";
        run(&mut state, &[measurement(image, MetricData::from("nginx:1"), ts)]);
        run(&mut state, &[measurement(image, MetricData::from("nginx:2"), ts + Duration::seconds(10))]);

        let doc = &state.entities["/abc"].document;
        assert_eq!(seek(doc, "/spec/image").unwrap().as_str(), Some("nginx:1"));
    }

    #[test]
    fn test_irrelevant_measurements_are_dropped() {
        let mut state = StoreState::default();
        let ts = datetime!(2024-03-01 12:00 UTC);
        let report = run(&mut state, &[measurement("/intel/procfs/load/min1", MetricData::Float(0.5), ts)]);
        assert!(state.entities.is_empty());
        assert_eq!(report.containers_touched, 0);
        assert_eq!(state.stats.metrics_rx_total, 1);
    }

    #[test]
    fn test_unformattable_timestamp_skips_only_that_container() {
        let mut state = StoreState::default();
        let good = datetime!(2024-03-01 12:00 UTC);
        let ancient = Date::from_calendar_date(-5, Month::January, 1).unwrap().midnight().assume_utc();
        let report = run(
            &mut state,
            &[
                measurement("/intel/docker/abc/memory_stats/cache", MetricData::UInt(1), good),
                measurement("/intel/docker/def/spec/image_name", MetricData::from("nginx:1"), ancient),
            ],
        );
        assert_eq!(report.samples_committed, 1);
        assert_eq!(state.entities.len(), 1);
        assert!(!state.entities.contains_key("/def"));
        assert_eq!(state.entities["/abc"].history.len(), 1);
        assert_eq!(state.stats.metrics_rx_total, 2);

        // the skipped container is still discovered on its next usable round
        run(
            &mut state,
            &[measurement("/intel/docker/def/spec/image_name", MetricData::from("nginx:2"), good)],
        );
        let doc = &state.entities["/def"].document;
        assert_eq!(seek(doc, "/spec/image").unwrap().as_str(), Some("nginx:2"));
    }

    #[test]
    fn test_failed_batch_leaves_store_untouched() {
        let template = CompiledTemplate::compile(
            r#"{"id": "", "name": "", "spec": {"image": "__tmpl:src=/spec/image_name"},
                "stats": [{"timestamp": "", "network": {"interfaces": [{"name": ""}]}}]}"#,
        )
        .unwrap();
        let mut state = StoreState::default();
        let ts = datetime!(2024-03-01 12:00 UTC);
        let batch = [
            measurement("/intel/docker/abc/spec/image_name", MetricData::from("nginx:1"), ts),
            measurement("/intel/docker/def/spec/image_name", MetricData::from("nginx:1"), ts),
        ];
        // interfaces can't be attached under a scalar `network`, so the merge fails
        let mut broken = template.clone();
        broken.sample.skeleton = Node::parse(r#"{"timestamp": "", "network": 5}"#).unwrap();
        let err = process(&mut state, &batch, &broken, &Settings::default()).unwrap_err();
        assert!(matches!(err, PublishError::Path(PathError::NotAContainer { .. })));
        assert!(state.entities.is_empty());
        assert_eq!(state.stats.metrics_rx_total, 0);

        process(&mut state, &batch, &template, &Settings::default()).unwrap();
        assert_eq!(seek(&state.entities["/abc"].document, "/spec/image").unwrap().as_str(), Some("nginx:1"));
        assert_eq!(state.entities["/def"].history.len(), 1);
    }

    #[test]
    fn test_huge_stats_span_keeps_every_sample() {
        let mut config = ConfigMap::new();
        config.insert("stats_span".into(), ConfigValue::Str("20000years".into()));
        let settings = Settings::resolve(&config);
        let template = CompiledTemplate::builtin().unwrap();
        let mut state = StoreState::default();
        let ts = datetime!(2024-03-01 12:00 UTC);
        for minutes in [0, 10, 20] {
            let batch = [measurement(
                "/intel/docker/abc/memory_stats/cache",
                MetricData::UInt(1),
                ts + Duration::minutes(minutes),
            )];
            process(&mut state, &batch, &template, &settings).unwrap();
        }
        assert_eq!(state.entities["/abc"].history.len(), 3);
    }

    #[test]
    fn test_timestamp_delta_and_utc_conversion() {
        let measured = datetime!(2024-03-01 14:00:00.999 +02:00);
        let shifted = sample_timestamp(measured, Duration::seconds(-30));
        assert_eq!(shifted, datetime!(2024-03-01 11:59:30 UTC));
        assert_eq!(shifted.offset(), UtcOffset::UTC);
    }
}
