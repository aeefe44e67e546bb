//! Conversion of raw inputs into containers

use biosig_core::{config_error, BiosigResult, Channel, Container, Modality, SignalData};
use std::collections::BTreeMap;

/// Anything a pipeline accepts as input
#[derive(Debug, Clone)]
pub enum PipelineInput {
    Container(Container),
    Channel(Channel),
    /// One flat sample array
    Samples {
        name: String,
        data: Vec<f64>,
        sampling_rate: f64,
    },
    /// Named columns in order, all sampled at the same rate
    Table {
        columns: Vec<(String, Vec<f64>)>,
        sampling_rate: f64,
    },
    /// Named arrays keyed by channel name
    Mapping {
        entries: BTreeMap<String, Vec<f64>>,
        sampling_rate: f64,
    },
    /// One row per channel; unnamed rows become `channel_{i}`
    Matrix {
        rows: Vec<Vec<f64>>,
        names: Option<Vec<String>>,
        sampling_rate: f64,
    },
}

impl PipelineInput {
    pub fn samples(name: &str, data: Vec<f64>, sampling_rate: f64) -> Self {
        PipelineInput::Samples {
            name: name.to_string(),
            data,
            sampling_rate,
        }
    }

    /// Convert to a container with unique names and a valid rate
    pub fn into_container(self) -> BiosigResult<Container> {
        match self {
            PipelineInput::Container(container) => Ok(container),
            PipelineInput::Channel(channel) => {
                let mut container = Container::with_metadata(Some(channel.sampling_rate()), None)?;
                container.add_channel(channel, None, false)?;
                Ok(container)
            }
            PipelineInput::Samples {
                name,
                data,
                sampling_rate,
            } => from_columns(vec![(name, data)], sampling_rate),
            PipelineInput::Table {
                columns,
                sampling_rate,
            } => from_columns(columns, sampling_rate),
            PipelineInput::Mapping {
                entries,
                sampling_rate,
            } => from_columns(entries.into_iter().collect(), sampling_rate),
            PipelineInput::Matrix {
                rows,
                names,
                sampling_rate,
            } => {
                let names = match names {
                    Some(names) if names.len() == rows.len() => names,
                    Some(names) => {
                        return Err(config_error!(
                            "{} names for a matrix of {} rows",
                            names.len(),
                            rows.len()
                        ))
                    }
                    None => (0..rows.len()).map(|i| format!("channel_{}", i)).collect(),
                };
                from_columns(names.into_iter().zip(rows).collect(), sampling_rate)
            }
        }
    }
}

fn from_columns(columns: Vec<(String, Vec<f64>)>, sampling_rate: f64) -> BiosigResult<Container> {
    if columns.is_empty() {
        return Err(config_error!("input has no channels"));
    }
    let mut container = Container::with_metadata(Some(sampling_rate), None)?;
    for (name, data) in columns {
        if name.is_empty() {
            return Err(config_error!("channel name cannot be empty"));
        }
        if data.is_empty() {
            return Err(config_error!("channel '{}' has no samples", name));
        }
        container.add_channel(Channel::new(&name, SignalData::Continuous(data), sampling_rate)?, None, false)?;
    }
    if container.len() == 1 {
        let modality = container
            .channel_names()
            .first()
            .and_then(|name| name.parse::<Modality>().ok());
        if let Some(modality) = modality.filter(|m| !matches!(m, Modality::Other(_))) {
            container.set_modality(modality);
        }
    }
    Ok(container)
}

impl From<Container> for PipelineInput {
    fn from(container: Container) -> Self {
        PipelineInput::Container(container)
    }
}

impl From<Channel> for PipelineInput {
    fn from(channel: Channel) -> Self {
        PipelineInput::Channel(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biosig_core::BiosigError;

    #[test]
    fn test_samples_input() {
        let container = PipelineInput::samples("ecg", vec![0.0; 10], 100.0).into_container().unwrap();
        assert_eq!(container.channel_names(), vec!["ecg"]);
        assert_eq!(container.sampling_rate(), Some(100.0));
        assert_eq!(container.modality(), Some(&Modality::Ecg));
    }

    #[test]
    fn test_invalid_rate_is_rejected() {
        assert!(matches!(
            PipelineInput::samples("ecg", vec![0.0; 10], 0.0).into_container(),
            Err(BiosigError::InvalidSamplingRate { .. })
        ));
    }

    #[test]
    fn test_table_keeps_order_and_rejects_duplicates() {
        let table = PipelineInput::Table {
            columns: vec![("x".into(), vec![1.0]), ("a".into(), vec![2.0])],
            sampling_rate: 4.0,
        };
        assert_eq!(table.into_container().unwrap().channel_names(), vec!["x", "a"]);

        let duplicate = PipelineInput::Table {
            columns: vec![("x".into(), vec![1.0]), ("x".into(), vec![2.0])],
            sampling_rate: 4.0,
        };
        assert!(matches!(
            duplicate.into_container(),
            Err(BiosigError::DuplicateChannel { .. })
        ));
    }

    #[test]
    fn test_mapping_and_matrix() {
        let mut entries = BTreeMap::new();
        entries.insert("ppg".to_string(), vec![1.0, 2.0]);
        entries.insert("eda".to_string(), vec![3.0]);
        let mapping = PipelineInput::Mapping { entries, sampling_rate: 2.0 };
        assert_eq!(mapping.into_container().unwrap().channel_names(), vec!["eda", "ppg"]);

        let matrix = PipelineInput::Matrix {
            rows: vec![vec![1.0, 2.0], vec![3.0, 4.0]],
            names: None,
            sampling_rate: 2.0,
        };
        let container = matrix.into_container().unwrap();
        assert_eq!(container.channel_names(), vec!["channel_0", "channel_1"]);
        assert!(container.modality().is_none());

        let misnamed = PipelineInput::Matrix {
            rows: vec![vec![1.0]],
            names: Some(vec![]),
            sampling_rate: 2.0,
        };
        assert!(misnamed.into_container().is_err());
    }

    #[test]
    fn test_container_serializes_with_session_id() {
        let container = PipelineInput::samples("eda", vec![0.1, 0.2], 4.0).into_container().unwrap();
        let json = serde_json::to_value(&container).unwrap();
        assert_eq!(json["id"], serde_json::json!(container.id().to_string()));
        assert_eq!(json["sampling_rate"], serde_json::json!(4.0));
    }

    #[test]
    fn test_channel_and_container_inputs() {
        let channel = Channel::new("resp", vec![0.0; 4], 25.0).unwrap();
        let container = PipelineInput::from(channel.clone()).into_container().unwrap();
        assert_eq!(container.channel("resp").unwrap(), &channel);

        let passthrough = PipelineInput::from(container.clone()).into_container().unwrap();
        assert_eq!(passthrough, container);
        assert!(PipelineInput::Table { columns: vec![], sampling_rate: 1.0 }.into_container().is_err());
    }
}
