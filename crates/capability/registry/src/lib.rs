//! 动态指标注册表。
//!
//! 指标名与标签集合在运行期由首次观测决定，创建后标签集合冻结。
//! 目录结构变更由一把锁保护，gauge 写入在锁外完成。

use domain::{Point, metric_name};
use prometheus::core::Collector;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use prusa_normalize::coerce;
use prusa_telemetry::record_sample_set;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, trace, warn};

/// 注册表错误。
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// 导出端已存在同名指标（吞掉，只记 trace）
    #[error("registration conflict: {0}")]
    Conflict(String),
    /// 指标名或标签名不合法
    #[error("invalid metric: {0}")]
    Invalid(String),
    #[error("encode error: {0}")]
    Encode(String),
}

/// 指标族：名称 + 冻结的标签名 + gauge 向量。
#[derive(Debug)]
pub struct MetricFamily {
    name: String,
    label_names: Vec<String>,
    gauges: GaugeVec,
}

impl MetricFamily {
    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    /// 按冻结顺序写入一个样本（覆盖旧值）。
    pub fn set(&self, label_values: &[String], value: f64) -> Result<(), RegistryError> {
        let values: Vec<&str> = label_values.iter().map(String::as_str).collect();
        let gauge = self
            .gauges
            .get_metric_with_label_values(&values)
            .map_err(|err| RegistryError::Invalid(format!("{}: {}", self.name, err)))?;
        gauge.set(value);
        Ok(())
    }

    /// 读取某组标签值当前的样本；只读，不会创建新序列。
    pub fn get(&self, label_values: &[&str]) -> Option<f64> {
        if label_values.len() != self.label_names.len() {
            return None;
        }
        self.gauges
            .collect()
            .iter()
            .flat_map(|family| family.get_metric())
            .find(|metric| {
                self.label_names
                    .iter()
                    .zip(label_values)
                    .all(|(name, value)| {
                        metric
                            .get_label()
                            .iter()
                            .any(|pair| pair.get_name() == name.as_str() && pair.get_value() == *value)
                    })
            })
            .map(|metric| metric.get_gauge().get_value())
    }
}

/// 进程级指标目录。
pub struct MetricRegistry {
    registry: Registry,
    families: Mutex<HashMap<String, Arc<MetricFamily>>>,
    last_push: GaugeVec,
    registrations: AtomicU64,
    conflicts: AtomicU64,
}

impl MetricRegistry {
    /// 使用独立的 Prometheus registry 创建目录。
    pub fn new(prefix: &str) -> Result<Self, RegistryError> {
        Self::with_registry(Registry::new(), prefix)
    }

    /// 基于已有 registry 创建目录，并注册固定的 last_push_timestamp。
    pub fn with_registry(registry: Registry, prefix: &str) -> Result<Self, RegistryError> {
        let last_push = GaugeVec::new(
            Opts::new(
                format!("{}last_push_timestamp", prefix),
                "Last time the printer pushed metrics to the exporter.",
            ),
            &["printer_mac", "printer_address"],
        )
        .map_err(|err| RegistryError::Invalid(err.to_string()))?;
        registry
            .register(Box::new(last_push.clone()))
            .map_err(|err| RegistryError::Conflict(err.to_string()))?;

        Ok(Self {
            registry,
            families: Mutex::new(HashMap::new()),
            last_push,
            registrations: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
        })
    }

    /// 记录设备最近一次上报时间（UNIX 秒）。
    pub fn touch_last_push(&self, mac: &str, address: &str) {
        match self.last_push.get_metric_with_label_values(&[mac, address]) {
            Ok(gauge) => gauge.set(now_epoch_secs()),
            Err(err) => warn!(target: "prusa.registry", error = %err, "last_push_update_failed"),
        }
    }

    /// 获取或创建指标族，并按冻结标签顺序解析本次标签值。
    ///
    /// 整个过程持有目录锁；缺失的标签取空串，多余的标签被忽略。
    pub fn get_or_create(
        &self,
        name: &str,
        help: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<(Arc<MetricFamily>, Vec<String>), RegistryError> {
        let mut families = self.families.lock().unwrap_or_else(|err| err.into_inner());

        let family = match families.get(name) {
            Some(family) => family.clone(),
            None => {
                let family = Arc::new(self.create_family(name, help, tags)?);
                families.insert(name.to_string(), family.clone());
                family
            }
        };

        let label_values = resolve_label_values(&family.label_names, tags);
        if tags.len() != family.label_names.len()
            || family.label_names.iter().any(|label| !tags.contains_key(label))
        {
            debug!(
                target: "prusa.registry",
                metric = %name,
                labels = ?family.label_names,
                tags = ?tags.keys().collect::<Vec<_>>(),
                "label_schema_mismatch"
            );
        }
        Ok((family, label_values))
    }

    fn create_family(
        &self,
        name: &str,
        help: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<MetricFamily, RegistryError> {
        let label_names: Vec<String> = tags.keys().cloned().collect();
        let label_refs: Vec<&str> = label_names.iter().map(String::as_str).collect();
        let gauges = GaugeVec::new(Opts::new(name, help), &label_refs)
            .map_err(|err| RegistryError::Invalid(err.to_string()))?;

        match self.registry.register(Box::new(gauges.clone())) {
            Ok(()) => {
                self.registrations.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.conflicts.fetch_add(1, Ordering::Relaxed);
                let err = RegistryError::Conflict(err.to_string());
                trace!(target: "prusa.registry", metric = %name, error = %err, "metric_already_registered");
            }
        }

        Ok(MetricFamily {
            name: name.to_string(),
            label_names,
            gauges,
        })
    }

    /// 将一个点写入目录：每个字段更新一个指标族，返回成功写入的样本数。
    pub fn observe(&self, point: &Point) -> usize {
        let mut written = 0;
        for (key, value) in &point.fields {
            let name = metric_name(&point.measurement, key);
            let help = format!("Metric for {} from {}", name, point.measurement);

            let (family, label_values) = match self.get_or_create(&name, &help, &point.tags) {
                Ok(resolved) => resolved,
                Err(err) => {
                    debug!(target: "prusa.registry", metric = %name, error = %err, "metric_skipped");
                    continue;
                }
            };

            match family.set(&label_values, coerce(value)) {
                Ok(()) => {
                    record_sample_set();
                    written += 1;
                }
                Err(err) => {
                    debug!(target: "prusa.registry", metric = %name, error = %err, "sample_set_failed")
                }
            }
        }
        written
    }

    pub fn family(&self, name: &str) -> Option<Arc<MetricFamily>> {
        let families = self.families.lock().unwrap_or_else(|err| err.into_inner());
        families.get(name).cloned()
    }

    pub fn family_count(&self) -> usize {
        let families = self.families.lock().unwrap_or_else(|err| err.into_inner());
        families.len()
    }

    /// 成功注册到导出端的指标族数量。
    pub fn registrations(&self) -> u64 {
        self.registrations.load(Ordering::Relaxed)
    }

    /// 注册冲突（已被吞掉）的次数。
    pub fn conflicts(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    /// 以 Prometheus 文本格式导出全部指标。
    pub fn render(&self) -> Result<String, RegistryError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|err| RegistryError::Encode(err.to_string()))?;
        String::from_utf8(buffer).map_err(|err| RegistryError::Encode(err.to_string()))
    }

    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }
}

fn resolve_label_values(label_names: &[String], tags: &BTreeMap<String, String>) -> Vec<String> {
    label_names
        .iter()
        .map(|label| tags.get(label).cloned().unwrap_or_default())
        .collect()
}

fn now_epoch_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as f64
}
