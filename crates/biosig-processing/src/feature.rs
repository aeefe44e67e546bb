//! Feature extraction: reduce channels to one flat numeric row per window

use crate::function::{ChannelInputs, Inputs};
use crate::params::{Arguments, ParameterValue};
use crate::queue::InputSpec;
use biosig_core::{config_error, shape_error, BiosigResult, Container, TimestampPoint};
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Value returned by a feature function for one window
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Scalar(f64),
    /// Anonymous values, named `{feature}_{i}` unless columns are declared
    List(Vec<f64>),
    /// Named values
    Series(Vec<(String, f64)>),
    /// Named values that may nest; keys are joined with `_`
    Record(Vec<(String, FeatureValue)>),
}

impl FeatureValue {
    pub fn series<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        FeatureValue::Series(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn record<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, FeatureValue)>,
        S: Into<String>,
    {
        FeatureValue::Record(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Flatten into `(key, value)` pairs; anonymous values have no key
    pub fn flatten(self) -> Vec<(Option<String>, f64)> {
        let mut flat = Vec::new();
        match self {
            FeatureValue::Scalar(value) => flat.push((None, value)),
            FeatureValue::List(values) => flat.extend(values.into_iter().map(|v| (None, v))),
            FeatureValue::Series(entries) => flat.extend(entries.into_iter().map(|(k, v)| (Some(k), v))),
            FeatureValue::Record(entries) => {
                for (key, value) in entries {
                    flatten_into(&key, value, &mut flat);
                }
            }
        }
        flat
    }
}

fn flatten_into(path: &str, value: FeatureValue, flat: &mut Vec<(Option<String>, f64)>) {
    match value {
        FeatureValue::Scalar(value) => flat.push((Some(path.to_string()), value)),
        FeatureValue::List(values) => {
            for (index, value) in values.into_iter().enumerate() {
                flat.push((Some(format!("{}_{}", path, index)), value));
            }
        }
        FeatureValue::Series(entries) => {
            for (key, value) in entries {
                flat.push((Some(format!("{}_{}", path, key)), value));
            }
        }
        FeatureValue::Record(entries) => {
            for (key, value) in entries {
                flatten_into(&format!("{}_{}", path, key), value, flat);
            }
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::Scalar(value)
    }
}

impl From<Vec<f64>> for FeatureValue {
    fn from(values: Vec<f64>) -> Self {
        FeatureValue::List(values)
    }
}

/// Function computing features from the buffers of one window
pub trait FeatureFunction: Send + Sync {
    fn compute(&self, inputs: &Inputs<'_>, arguments: &Arguments) -> BiosigResult<FeatureValue>;
}

impl<F> FeatureFunction for F
where
    F: Fn(&Inputs<'_>, &Arguments) -> BiosigResult<FeatureValue> + Send + Sync,
{
    fn compute(&self, inputs: &Inputs<'_>, arguments: &Arguments) -> BiosigResult<FeatureValue> {
        self(inputs, arguments)
    }
}

/// A named feature function with fixed arguments
///
/// Functions always receive `sampling_rate` from the first input channel
/// unless a fixed argument of that name overrides it.
#[derive(Clone)]
pub struct Feature {
    name: String,
    function: Arc<dyn FeatureFunction>,
    arguments: Arguments,
    columns: Option<Vec<String>>,
    prefix: Option<String>,
}

impl Feature {
    pub fn new<F>(name: &str, function: F) -> Self
    where
        F: Fn(&Inputs<'_>, &Arguments) -> BiosigResult<FeatureValue> + Send + Sync + 'static,
    {
        Self::with_function(name, function)
    }

    pub fn with_function(name: &str, function: impl FeatureFunction + 'static) -> Self {
        Feature {
            name: name.to_string(),
            function: Arc::new(function),
            arguments: Arguments::new(),
            columns: None,
            prefix: None,
        }
    }

    pub fn argument(mut self, key: &str, value: impl Into<ParameterValue>) -> Self {
        self.arguments.set(key, value);
        self
    }

    /// Names for anonymous outputs, in order
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Prefix added to every column this feature produces
    pub fn prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Compute and name one row
    pub fn compute_row(&self, inputs: &Inputs<'_>, arguments: &Arguments) -> BiosigResult<Vec<(String, f64)>> {
        let flat = self.function.compute(inputs, arguments)?.flatten();
        let anonymous = flat.iter().filter(|(key, _)| key.is_none()).count();

        if let Some(columns) = &self.columns {
            if columns.len() != anonymous {
                return Err(config_error!(
                    "feature '{}' declares {} columns but produced {} unnamed values",
                    self.name,
                    columns.len(),
                    anonymous
                ));
            }
        }

        let mut next = 0;
        let row = flat
            .into_iter()
            .map(|(key, value)| {
                let column = key.unwrap_or_else(|| {
                    let column = match &self.columns {
                        Some(columns) => columns[next].clone(),
                        None => format!("{}_{}", self.name, next),
                    };
                    next += 1;
                    column
                });
                match &self.prefix {
                    Some(prefix) => (format!("{}{}", prefix, column), value),
                    None => (column, value),
                }
            })
            .collect();
        Ok(row)
    }
}

impl fmt::Debug for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feature")
            .field("name", &self.name)
            .field("arguments", &self.arguments)
            .field("columns", &self.columns)
            .field("prefix", &self.prefix)
            .finish()
    }
}

const INDEX_TOLERANCE: f64 = 1e-9;

/// Feature rows indexed by window start timestamp
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureMatrix {
    index: Vec<f64>,
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn new(index: Vec<f64>, columns: Vec<String>, rows: Vec<Vec<f64>>) -> BiosigResult<Self> {
        if rows.len() != index.len() {
            return Err(shape_error!("{} rows for an index of {}", rows.len(), index.len()));
        }
        if let Some(row) = rows.iter().find(|row| row.len() != columns.len()) {
            return Err(shape_error!("row of {} values for {} columns", row.len(), columns.len()));
        }
        check_unique(&columns)?;
        Ok(FeatureMatrix { index, columns, rows })
    }

    pub fn index(&self) -> &[f64] {
        &self.index
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&[f64]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// All values of one column
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let position = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row[position]).collect())
    }

    pub fn value(&self, row: usize, column: &str) -> Option<f64> {
        let position = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row).map(|r| r[position])
    }

    /// Append the columns of `other`; both matrices must share the index
    pub fn hstack(mut self, other: FeatureMatrix) -> BiosigResult<Self> {
        if other.n_rows() != self.n_rows() {
            return Err(shape_error!(
                "cannot join {} feature rows with {}",
                self.n_rows(),
                other.n_rows()
            ));
        }
        let misaligned = self
            .index
            .iter()
            .zip(&other.index)
            .position(|(a, b)| (a - b).abs() > INDEX_TOLERANCE * a.abs().max(1.0));
        if let Some(row) = misaligned {
            return Err(shape_error!(
                "feature row {} starts at {} in one matrix and {} in the other",
                row,
                self.index[row],
                other.index[row]
            ));
        }
        self.columns.extend(other.columns);
        check_unique(&self.columns)?;
        for (row, extra) in self.rows.iter_mut().zip(other.rows) {
            row.extend(extra);
        }
        Ok(self)
    }
}

fn check_unique(columns: &[String]) -> BiosigResult<()> {
    let mut seen = BTreeSet::new();
    match columns.iter().find(|c| !seen.insert(c.as_str())) {
        Some(duplicate) => Err(config_error!("duplicate feature column '{}'", duplicate)),
        None => Ok(()),
    }
}

/// Features evaluated against a container, concatenated column-wise
#[derive(Debug, Clone, Default)]
pub struct FeatureQueue {
    features: Vec<(Feature, InputSpec)>,
    workers: Option<usize>,
}

impl FeatureQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run per-window calls on a pool of `workers` threads
    pub fn with_workers(mut self, workers: usize) -> BiosigResult<Self> {
        self.set_workers(Some(workers))?;
        Ok(self)
    }

    pub fn set_workers(&mut self, workers: Option<usize>) -> BiosigResult<()> {
        if workers == Some(0) {
            return Err(config_error!("feature worker count must be at least 1"));
        }
        self.workers = workers;
        Ok(())
    }

    pub fn workers(&self) -> Option<usize> {
        self.workers
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn add_feature(&mut self, feature: Feature, inputs: impl Into<InputSpec>) -> BiosigResult<&mut Self> {
        let inputs = inputs.into();
        inputs.validate()?;
        self.features.push((feature, inputs));
        Ok(self)
    }

    /// Evaluate every feature and join the results into one matrix
    ///
    /// The index comes from the first feature's primary input: window start
    /// timestamps, or the first timestamp for an unwindowed channel.
    pub fn run(&self, container: &Container) -> BiosigResult<FeatureMatrix> {
        if self.features.is_empty() {
            return Err(config_error!("no features registered"));
        }

        let pool = self.workers.map(build_pool).transpose()?;
        let mut matrix: Option<FeatureMatrix> = None;

        for (feature, spec) in &self.features {
            let inputs = spec.resolve(container)?;
            let block = extract(feature, &inputs, pool.as_ref())?;
            debug!(
                feature = feature.name(),
                rows = block.n_rows(),
                columns = block.n_columns(),
                workers = ?self.workers,
                "feature extracted"
            );
            matrix = Some(match matrix {
                None => block,
                Some(matrix) => matrix.hstack(block)?,
            });
        }

        matrix.ok_or_else(|| config_error!("no features registered"))
    }
}

fn build_pool(workers: usize) -> BiosigResult<ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|index| format!("biosig-feature-{}", index))
        .build()
        .map_err(|error| config_error!("cannot start feature worker pool: {}", error))
}

fn extract(feature: &Feature, inputs: &ChannelInputs<'_>, pool: Option<&ThreadPool>) -> BiosigResult<FeatureMatrix> {
    let reference = inputs.primary_channel()?;
    let channels = inputs.sampled()?;

    let mut arguments = Arguments::new();
    arguments.set("sampling_rate", reference.sampling_rate());
    arguments.merge(&feature.arguments);

    let compute = |window: usize| -> BiosigResult<Vec<(String, f64)>> {
        let mut call = Inputs::new();
        for (parameter, channel) in &channels {
            let samples = channel.data().window(window).unwrap_or(&[]);
            match parameter {
                Some(parameter) => call.push_named(parameter, samples),
                None => call.push(samples),
            }
        }
        feature.compute_row(&call, &arguments)
    };

    let windows = reference.windows();
    let rows = match pool {
        Some(pool) => pool.install(|| {
            (0..windows)
                .into_par_iter()
                .map(&compute)
                .collect::<BiosigResult<Vec<_>>>()
        })?,
        None => (0..windows).map(&compute).collect::<BiosigResult<Vec<_>>>()?,
    };

    let columns: Vec<String> = rows
        .first()
        .map(|row| row.iter().map(|(name, _)| name.clone()).collect())
        .unwrap_or_default();
    let mut values = Vec::with_capacity(rows.len());
    for (window, row) in rows.into_iter().enumerate() {
        let same = row.len() == columns.len() && row.iter().zip(&columns).all(|((name, _), c)| name == c);
        if !same {
            return Err(shape_error!(
                "feature '{}' produced different columns in window {}",
                feature.name(),
                window
            ));
        }
        values.push(row.into_iter().map(|(_, value)| value).collect());
    }

    let index = if reference.is_windowed() {
        reference.get_timestamp(TimestampPoint::Start)
    } else {
        let first = reference.timestamps().window(0).and_then(|t| t.first().copied());
        vec![first.unwrap_or_else(|| reference.timestamp_start())]
    };

    FeatureMatrix::new(index, columns, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use biosig_core::{BiosigError, Channel};

    fn windowed_container() -> Container {
        let mut container = Container::from_signals([
            Channel::new("ecg", (0..12).map(|i| i as f64).collect::<Vec<_>>(), 2.0).unwrap(),
            Channel::new("eda", vec![1.0; 12], 2.0).unwrap(),
        ])
        .unwrap();
        container.segment_all(2.0, 2.0).unwrap();
        container
    }

    fn mean() -> Feature {
        Feature::new("mean", |inputs, _| {
            let samples = inputs.first()?;
            Ok((samples.iter().sum::<f64>() / samples.len() as f64).into())
        })
    }

    #[test]
    fn test_flatten_nested_record() {
        let value = FeatureValue::record([
            ("mean", FeatureValue::Scalar(1.0)),
            ("bands", FeatureValue::series([("low", 2.0), ("high", 3.0)])),
            ("deep", FeatureValue::record([("x", FeatureValue::List(vec![4.0, 5.0]))])),
        ]);
        let flat = value.flatten();
        let keys: Vec<_> = flat.iter().map(|(k, _)| k.clone().unwrap()).collect();
        assert_eq!(keys, vec!["mean", "bands_low", "bands_high", "deep_x_0", "deep_x_1"]);
        assert_eq!(flat[4].1, 5.0);
    }

    #[test]
    fn test_anonymous_naming() {
        let samples = [1.0, 2.0];
        let feature = Feature::new("minmax", |inputs, _| {
            let s = inputs.first()?;
            Ok(vec![s[0], s[s.len() - 1]].into())
        });
        let row = feature.compute_row(&Inputs::single(&samples), &Arguments::new()).unwrap();
        assert_eq!(row, vec![("minmax_0".to_string(), 1.0), ("minmax_1".to_string(), 2.0)]);

        let named = feature.clone().columns(["first", "last"]).prefix("ecg_");
        let row = named.compute_row(&Inputs::single(&samples), &Arguments::new()).unwrap();
        assert_eq!(row[1], ("ecg_last".to_string(), 2.0));

        let wrong = feature.columns(["only"]);
        assert!(wrong.compute_row(&Inputs::single(&samples), &Arguments::new()).is_err());
    }

    #[test]
    fn test_windowed_matrix() {
        let mut queue = FeatureQueue::new();
        queue.add_feature(mean().prefix("ecg_"), "ecg").unwrap();
        queue.add_feature(mean().prefix("eda_"), "eda").unwrap();

        let matrix = queue.run(&windowed_container()).unwrap();
        assert_eq!(matrix.n_rows(), 3);
        assert_eq!(matrix.columns(), &["ecg_mean_0".to_string(), "eda_mean_0".to_string()]);
        assert_eq!(matrix.index(), &[0.0, 2.0, 4.0]);
        assert_eq!(matrix.column("ecg_mean_0").unwrap(), vec![1.5, 5.5, 9.5]);
        assert_eq!(matrix.value(2, "eda_mean_0"), Some(1.0));
    }

    #[test]
    fn test_unwindowed_single_row() {
        let container = Container::from_signals([Channel::new("ecg", vec![1.0, 3.0], 1.0).unwrap()]).unwrap();
        let mut queue = FeatureQueue::new();
        queue.add_feature(mean(), "ecg").unwrap();

        let matrix = queue.run(&container).unwrap();
        assert_eq!(matrix.n_rows(), 1);
        assert_eq!(matrix.index(), &[0.0]);
        assert_eq!(matrix.row(0).unwrap(), &[2.0]);
    }

    #[test]
    fn test_sampling_rate_argument() {
        let mut queue = FeatureQueue::new();
        queue
            .add_feature(
                Feature::new("rate", |_, arguments| Ok(arguments.require_float("sampling_rate")?.into())),
                "ecg",
            )
            .unwrap();
        let matrix = queue.run(&windowed_container()).unwrap();
        assert_eq!(matrix.column("rate_0").unwrap(), vec![2.0; 3]);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mut sequential = FeatureQueue::new();
        sequential.add_feature(mean(), "ecg").unwrap();
        let parallel = sequential.clone().with_workers(3).unwrap();

        let container = windowed_container();
        assert_eq!(sequential.run(&container).unwrap(), parallel.run(&container).unwrap());
        assert!(FeatureQueue::new().with_workers(0).is_err());
    }

    #[test]
    fn test_duplicate_columns_fail() {
        let mut queue = FeatureQueue::new();
        queue.add_feature(mean(), "ecg").unwrap();
        queue.add_feature(mean(), "eda").unwrap();
        assert!(matches!(
            queue.run(&windowed_container()),
            Err(BiosigError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_row_count_mismatch_fails() {
        let mut container = windowed_container();
        container
            .add_channel(Channel::new("flat", vec![1.0, 2.0], 1.0).unwrap(), None, false)
            .unwrap();
        let mut queue = FeatureQueue::new();
        queue.add_feature(mean().prefix("a_"), "ecg").unwrap();
        queue.add_feature(mean().prefix("b_"), "flat").unwrap();
        assert!(matches!(
            queue.run(&container),
            Err(BiosigError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_misaligned_index_fails() {
        let left = FeatureMatrix::new(vec![0.0, 5.0], vec!["a".into()], vec![vec![1.0], vec![2.0]]).unwrap();
        let shifted = FeatureMatrix::new(vec![0.0, 6.0], vec!["b".into()], vec![vec![3.0], vec![4.0]]).unwrap();
        assert!(matches!(
            left.clone().hstack(shifted),
            Err(BiosigError::ShapeMismatch { .. })
        ));

        let aligned = FeatureMatrix::new(vec![0.0, 5.0], vec!["b".into()], vec![vec![3.0], vec![4.0]]).unwrap();
        let joined = left.hstack(aligned).unwrap();
        assert_eq!(joined.columns(), &["a".to_string(), "b".to_string()]);
        assert_eq!(joined.row(1), Some(&[2.0, 4.0][..]));
    }

    #[test]
    fn test_feature_errors_propagate() {
        let mut queue = FeatureQueue::new();
        queue
            .add_feature(
                Feature::new("broken", |_, _| Err(BiosigError::function("broken", "no data"))),
                "ecg",
            )
            .unwrap();
        assert!(queue.run(&windowed_container()).is_err());
        assert!(FeatureQueue::new().run(&windowed_container()).is_err());
    }

    #[test]
    fn test_matrix_serializes() {
        let matrix = FeatureMatrix::new(vec![0.0], vec!["a".into()], vec![vec![1.5]]).unwrap();
        let json = serde_json::to_value(&matrix).unwrap();
        assert_eq!(json["columns"][0], "a");
        assert_eq!(json["rows"][0][0], 1.5);
        assert!(FeatureMatrix::new(vec![0.0], vec!["a".into(), "a".into()], vec![vec![1.0, 2.0]]).is_err());
    }
}
