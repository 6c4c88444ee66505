//! Core data model: `Transmutation`, `Matrix`, the Extract/Transform/Load
//! tagged variants, and `Configuration` (spec §3).
//!
//! Extract/Transform/Load are modelled as closed sum types rather than an
//! abstract-class hierarchy (spec §9 "Tagged variants over inheritance");
//! dispatch to processors switches on the tag.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A scalar metadata value. `Transmutation::metadata_map` stores these
/// alongside the ordered message list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Hash for Scalar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Scalar::Text(s) => {
                0u8.hash(state);
                s.hash(state);
            }
            Scalar::Number(n) => {
                1u8.hash(state);
                n.to_bits().hash(state);
            }
            Scalar::Bool(b) => {
                2u8.hash(state);
                b.hash(state);
            }
        }
    }
}

/// An immutable measurement flowing through the pipeline (spec §3).
///
/// `original_value` is set once by the Extract processor that produced
/// this point and is never altered by a Transform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transmutation {
    pub time: DateTime<Utc>,
    pub name: String,
    pub value: f64,
    pub original_value: f64,
    /// Ordered, human-readable annotations (e.g. threshold messages).
    pub metadata: Vec<String>,
    pub metadata_map: BTreeMap<String, Scalar>,
}

impl Transmutation {
    pub fn new(time: DateTime<Utc>, name: impl Into<String>, value: f64) -> Self {
        Self {
            time,
            name: name.into(),
            value,
            original_value: value,
            metadata: Vec::new(),
            metadata_map: BTreeMap::new(),
        }
    }

    /// Returns a copy with a new `value`, preserving `original_value` and
    /// `time`. Used by transforms that reclassify a point's level
    /// (spec §4.5, `changeValue`).
    pub fn with_value(&self, value: f64) -> Self {
        Self {
            value,
            ..self.clone()
        }
    }

    pub fn with_metadata_message(&self, message: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.metadata.push(message.into());
        copy
    }
}

impl PartialEq for Transmutation {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time
            && self.name == other.name
            && self.value.to_bits() == other.value.to_bits()
            && self.original_value.to_bits() == other.original_value.to_bits()
            && self.metadata == other.metadata
            && self.metadata_map == other.metadata_map
    }
}
impl Eq for Transmutation {}

impl Hash for Transmutation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.time.hash(state);
        self.name.hash(state);
        self.value.to_bits().hash(state);
        self.original_value.to_bits().hash(state);
        self.metadata.hash(state);
        for (k, v) in &self.metadata_map {
            k.hash(state);
            v.hash(state);
        }
    }
}

/// One row of an ETL [`Matrix`]: samples from a single Extract, ordered by
/// `time` ascending.
pub type Row = Vec<Transmutation>;

/// Ordered rows of ordered [`Transmutation`]; the unit of data flowing
/// between pipeline stages (spec §3). Transforms may change row length
/// (including to zero, which drops the row) but must preserve row
/// ordering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Matrix {
    rows: Vec<Row>,
}

impl Matrix {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn empty() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Concatenates rows from several Matrices in the given order,
    /// preserving each source Matrix's row order (spec §4.7).
    pub fn concat(matrices: impl IntoIterator<Item = Matrix>) -> Matrix {
        let mut rows = Vec::new();
        for m in matrices {
            rows.extend(m.rows);
        }
        Matrix { rows }
    }
}

impl FromIterator<Row> for Matrix {
    fn from_iter<T: IntoIterator<Item = Row>>(iter: T) -> Self {
        Matrix {
            rows: iter.into_iter().collect(),
        }
    }
}

/// The four levels `Threshold`/`ThresholdMetForDuration` classify cells
/// into (spec §4.5).
pub mod status_level {
    pub const OK: f64 = 0.0;
    pub const INFO: f64 = 1.0;
    pub const WARN: f64 = 2.0;
    pub const CRIT: f64 = 3.0;
}

/// Threshold comparison mode (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThresholdType {
    GreaterThan,
    LessThan,
    EqualTo,
}

impl ThresholdType {
    pub fn matches(self, value: f64, threshold: f64) -> bool {
        match self {
            ThresholdType::GreaterThan => value > threshold,
            ThresholdType::LessThan => value < threshold,
            ThresholdType::EqualTo => (value - threshold).abs() < f64::EPSILON,
        }
    }
}

/// Extract stage definitions (spec §3, §4.4). Closed set; new remote
/// protocol bindings are added as a variant plus a matching processor, not
/// via dynamic plugin loading (spec §1 Non-goals).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Extract {
    Refocus {
        endpoint_id: String,
        name: String,
        filtered_name: String,
        default_value: Option<f64>,
        cache_millis: i64,
    },
}

impl Extract {
    pub fn endpoint_id(&self) -> &str {
        match self {
            Extract::Refocus { endpoint_id, .. } => endpoint_id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Extract::Refocus { name, .. } => name,
        }
    }

    pub fn filtered_name(&self) -> &str {
        match self {
            Extract::Refocus { filtered_name, .. } => filtered_name,
        }
    }

    pub fn default_value(&self) -> Option<f64> {
        match self {
            Extract::Refocus { default_value, .. } => *default_value,
        }
    }

    pub fn cache_millis(&self) -> i64 {
        match self {
            Extract::Refocus { cache_millis, .. } => *cache_millis,
        }
    }

    /// Opaque key identifying this Extract's desired sample within an
    /// endpoint's returned sample set (spec §3, §4.4).
    pub fn cache_key(&self) -> String {
        match self {
            Extract::Refocus { filtered_name, .. } => filtered_name.clone(),
        }
    }
}

/// Transform stage definitions (spec §3, §4.5). Each variant is a pure,
/// deterministic, side-effect-free `Matrix -> Matrix` function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Transform {
    LastDatapoint,
    InfoStatus,
    Threshold {
        threshold: f64,
        threshold_type: ThresholdType,
    },
    ThresholdMetForDuration {
        threshold: f64,
        threshold_type: ThresholdType,
        critical_duration_millis: i64,
        warn_duration_millis: i64,
        info_duration_millis: i64,
    },
}

/// Load stage definitions (spec §3, §4.6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Load {
    Refocus { endpoint_id: String, id: String },
}

impl Load {
    pub fn id(&self) -> &str {
        match self {
            Load::Refocus { id, .. } => id,
        }
    }

    pub fn endpoint_id(&self) -> &str {
        match self {
            Load::Refocus { endpoint_id, .. } => endpoint_id,
        }
    }
}

/// A declarative ETL job: extracts, ordered transforms, loads, and repeat
/// interval (spec §3). Identity is the structural hash of all fields: two
/// Configurations with identical content are equal, regardless of which
/// `ConfigurationLoader` invocation produced them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Configuration {
    pub extracts: Vec<Extract>,
    pub transforms: Vec<Transform>,
    pub loads: Vec<Load>,
    pub repeat_interval_millis: i64,
    pub disabled: bool,
}

impl Configuration {
    /// Structural identity key used by the Scheduler to track
    /// already-scheduled Configurations without holding a reference to
    /// this exact value (spec §3 "Ownership", §9 "Cyclic references").
    pub fn identity(&self) -> ConfigurationId {
        use std::collections::hash_map::DefaultHasher;
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        ConfigurationId(hasher.finish())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigurationId(pub u64);
