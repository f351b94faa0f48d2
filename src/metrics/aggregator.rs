//! The aggregation of metrics.

use crate::metrics::{
    constants, errors,
    metric::{truncate, Metric, Type},
};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Context {
    name: String,
    tags: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
struct Entry {
    kind: Type,
    metric_value: MetricValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone)]
struct DistributionMetric {
    summary: Summary,
}

#[derive(Debug, Clone)]
struct CountMetric {
    value: f64,
}

#[derive(Debug, Clone)]
struct GaugeMetric {
    value: f64,
}

#[derive(Debug, Clone)]
enum MetricValue {
    Count(CountMetric),
    Gauge(GaugeMetric),
    Distribution(DistributionMetric),
}

trait InsertMetric {
    fn insert_metric(&mut self, metric: &Metric);
}

impl InsertMetric for MetricValue {
    fn insert_metric(&mut self, metric: &Metric) {
        match self {
            MetricValue::Count(count_metric) => {
                count_metric.insert_metric(metric);
            }
            MetricValue::Gauge(gauge_metric) => {
                gauge_metric.insert_metric(metric);
            }
            MetricValue::Distribution(distribution_metric) => {
                distribution_metric.insert_metric(metric);
            }
        }
    }
}

impl InsertMetric for DistributionMetric {
    fn insert_metric(&mut self, metric: &Metric) {
        let s = &mut self.summary;
        s.count += 1;
        s.sum += metric.value;
        s.min = s.min.min(metric.value);
        s.max = s.max.max(metric.value);
    }
}

impl InsertMetric for GaugeMetric {
    fn insert_metric(&mut self, metric: &Metric) {
        self.value = metric.value;
    }
}

impl InsertMetric for CountMetric {
    fn insert_metric(&mut self, metric: &Metric) {
        self.value += metric.value;
    }
}

impl Entry {
    fn new_from_metric(metric: &Metric) -> Self {
        let metric_value = match metric.kind {
            Type::Count => MetricValue::Count(CountMetric {
                value: metric.value,
            }),
            Type::Gauge => MetricValue::Gauge(GaugeMetric {
                value: metric.value,
            }),
            Type::Distribution => MetricValue::Distribution(DistributionMetric {
                summary: Summary {
                    count: 1,
                    sum: metric.value,
                    min: metric.value,
                    max: metric.value,
                },
            }),
        };
        Self {
            kind: metric.kind,
            metric_value,
        }
    }
}

/// Aggregated value of one context.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SeriesValue {
    Value(f64),
    Summary(Summary),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub metric: String,
    #[serde(rename = "type")]
    pub kind: Type,
    pub tags: Vec<String>,
    pub value: SeriesValue,
}

#[derive(Clone, Debug)]
// NOTE by construction we know that contexts do not explore the full space of
// usize but the type system limits how we can express this today.
pub struct Aggregator<const CONTEXTS: usize> {
    map: HashMap<Context, Entry>,
}

impl<const CONTEXTS: usize> Aggregator<CONTEXTS> {
    /// Create a new instance of `Aggregator`
    ///
    /// # Errors
    ///
    /// Will fail at runtime if `CONTEXTS` exceeds `constants::MAX_CONTEXTS`.
    pub fn new() -> Result<Self, errors::Creation> {
        if CONTEXTS > constants::MAX_CONTEXTS {
            return Err(errors::Creation::Contexts);
        }

        Ok(Self {
            map: HashMap::new(),
        })
    }

    /// Insert a `Metric` into the `Aggregator`
    ///
    /// # Errors
    ///
    /// Function will return overflow error if more than
    /// `min(constants::MAX_CONTEXTS, CONTEXTS)` is exceeded.
    pub fn insert(&mut self, metric: &Metric) -> Result<(), errors::Insert> {
        let context = Context {
            name: metric.name.clone(),
            tags: metric.tags.clone(),
        };
        let len = self.map.len();
        match self.map.get_mut(&context) {
            Some(entry) if entry.kind == metric.kind => {
                entry.metric_value.insert_metric(metric);
            }
            Some(entry) => {
                // A context changing kind restarts from the new metric.
                *entry = Entry::new_from_metric(metric);
            }
            None => {
                if len >= CONTEXTS {
                    return Err(errors::Insert::Overflow);
                }
                self.map.insert(context, Entry::new_from_metric(metric));
            }
        }
        Ok(())
    }

    /// Keeps only the contexts for which `keep(name, tags)` holds.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &[(String, String)]) -> bool) {
        self.map.retain(|context, _| keep(&context.name, &context.tags));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Current value of a count or gauge context.
    #[must_use]
    pub fn value(&self, name: &str, tags: &[(&str, &str)]) -> Option<f64> {
        match self.lookup(name, tags)?.metric_value {
            MetricValue::Count(CountMetric { value }) | MetricValue::Gauge(GaugeMetric { value }) => {
                Some(value)
            }
            MetricValue::Distribution(_) => None,
        }
    }

    /// Summary of a distribution context.
    #[must_use]
    pub fn summary(&self, name: &str, tags: &[(&str, &str)]) -> Option<Summary> {
        match &self.lookup(name, tags)?.metric_value {
            MetricValue::Distribution(d) => Some(d.summary),
            _ => None,
        }
    }

    fn lookup(&self, name: &str, tags: &[(&str, &str)]) -> Option<&Entry> {
        let mut tags: Vec<(String, String)> = tags
            .iter()
            .map(|(k, v)| ((*k).to_string(), truncate(v, constants::MAX_TAG_VALUE_BYTES)))
            .collect();
        tags.sort_unstable();
        self.map.get(&Context {
            name: name.to_string(),
            tags,
        })
    }

    /// Every context, sorted by name then tags.
    #[must_use]
    pub fn to_series(&self) -> Vec<Series> {
        let mut series: Vec<Series> = self
            .map
            .iter()
            .map(|(context, entry)| Series {
                metric: context.name.clone(),
                kind: entry.kind,
                tags: context
                    .tags
                    .iter()
                    .map(|(k, v)| format!("{k}:{v}"))
                    .collect(),
                value: match &entry.metric_value {
                    MetricValue::Count(c) => SeriesValue::Value(c.value),
                    MetricValue::Gauge(g) => SeriesValue::Value(g.value),
                    MetricValue::Distribution(d) => SeriesValue::Summary(d.summary),
                },
            })
            .collect();
        series.sort_by(|a, b| a.metric.cmp(&b.metric).then_with(|| a.tags.cmp(&b.tags)));
        series
    }
}
