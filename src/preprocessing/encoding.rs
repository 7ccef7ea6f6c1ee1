//! Кодирование категориальных признаков целыми числами

use std::collections::{BTreeMap, BTreeSet};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::types::{Cell, Column, ColumnSchema, ColumnType, EncodedFrame, Table};

/// Биекция "метка -> код" для одного столбца.
///
/// Коды назначаются по отсортированному списку различных меток,
/// поэтому они не зависят от порядка строк.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let classes: BTreeSet<String> = labels.into_iter().map(Into::into).collect();
        Self {
            classes: classes.into_iter().collect(),
        }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn transform(&self, label: &str) -> Option<usize> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(label))
            .ok()
    }

    pub fn inverse_transform(&self, code: usize) -> Option<&str> {
        self.classes.get(code).map(String::as_str)
    }
}

/// Набор кодировщиков, по одному на каждый категориальный столбец
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoricalEncoder {
    encoders: BTreeMap<String, LabelEncoder>,
}

impl CategoricalEncoder {
    /// Обучение кодировщиков и кодирование таблицы.
    ///
    /// Столбцы из `numeric_columns` пропускаются как есть и не могут содержать текст.
    pub fn fit_transform<S: AsRef<str>>(
        table: &Table,
        numeric_columns: &[S],
    ) -> Result<(Self, EncodedFrame)> {
        let mut encoders = BTreeMap::new();

        for column in table.columns() {
            let must_be_numeric = numeric_columns.iter().any(|n| n.as_ref() == column.name);
            if must_be_numeric {
                ensure_numeric(column)?;
                continue;
            }
            if column.is_categorical() {
                let encoder = LabelEncoder::fit(column.cells.iter().filter_map(Cell::as_label));
                tracing::debug!(
                    "Fitted label encoder for {:?} with {} classes",
                    column.name,
                    encoder.len()
                );
                encoders.insert(column.name.clone(), encoder);
            }
        }

        tracing::info!(
            "Encoded {} categorical columns: {:?}",
            encoders.len(),
            encoders.keys().collect::<Vec<_>>()
        );

        let encoder = Self { encoders };
        let frame = encoder.transform(table)?;
        Ok((encoder, frame))
    }

    /// Кодирование таблицы уже обученными кодировщиками
    pub fn transform(&self, table: &Table) -> Result<EncodedFrame> {
        let mut values = Array2::zeros((table.height(), table.width()));
        let mut schema = Vec::with_capacity(table.width());

        for (j, column) in table.columns().iter().enumerate() {
            let column_type = match self.encoders.get(&column.name) {
                Some(encoder) => {
                    for (i, cell) in column.cells.iter().enumerate() {
                        let label = cell.as_label().ok_or_else(|| missing_value(column, i))?;
                        let code = encoder.transform(&label).ok_or_else(|| {
                            PipelineError::UnseenLabel {
                                column: column.name.clone(),
                                label,
                            }
                        })?;
                        values[[i, j]] = code as f64;
                    }
                    ColumnType::Long
                }
                None => {
                    let mut integral = true;
                    for (i, cell) in column.cells.iter().enumerate() {
                        let v = numeric_value(column, i, cell)?;
                        integral &= v.fract() == 0.0;
                        values[[i, j]] = v;
                    }
                    if integral {
                        ColumnType::Long
                    } else {
                        ColumnType::Double
                    }
                }
            };
            schema.push(ColumnSchema {
                name: column.name.clone(),
                r#type: column_type,
            });
        }

        Ok(EncodedFrame { schema, values })
    }

    pub fn encoder(&self, column: &str) -> Option<&LabelEncoder> {
        self.encoders.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.encoders.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.encoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encoders.is_empty()
    }
}

fn ensure_numeric(column: &Column) -> Result<()> {
    for (row, cell) in column.cells.iter().enumerate() {
        if let Cell::Text(value) = cell {
            return Err(PipelineError::NonNumeric {
                column: column.name.clone(),
                row,
                value: value.clone(),
            });
        }
    }
    Ok(())
}

fn numeric_value(column: &Column, row: usize, cell: &Cell) -> Result<f64> {
    match cell {
        Cell::Number(v) if !v.is_nan() => Ok(*v),
        Cell::Text(value) => Err(PipelineError::NonNumeric {
            column: column.name.clone(),
            row,
            value: value.clone(),
        }),
        _ => Err(missing_value(column, row)),
    }
}

fn missing_value(column: &Column, row: usize) -> PipelineError {
    PipelineError::Dataset(format!(
        "missing value in column {:?} at row {}",
        column.name, row
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table::new(vec![
            Column::texts("sexo", &["M", "F", "F", "M", "F"]),
            Column::numbers("idade", &[30.0, 41.0, 25.0, 60.0, 33.0]),
            Column::new(
                "codigo",
                vec![
                    Cell::Number(301010072.0),
                    Cell::Text("0301010072".into()),
                    Cell::Number(301010072.0),
                    Cell::Text("0214010015".into()),
                    Cell::Number(1.0),
                ],
            ),
            Column::numbers("valor", &[10.0, 12.5, 7.25, 30.0, 11.0]),
        ])
        .unwrap()
    }

    #[test]
    fn two_labels_get_two_stable_codes() {
        let (encoder, frame) = CategoricalEncoder::fit_transform(&table(), &["valor"]).unwrap();
        let sexo = encoder.encoder("sexo").unwrap();

        assert_eq!(sexo.len(), 2);
        assert_eq!(sexo.transform("F"), Some(0));
        assert_eq!(sexo.transform("M"), Some(1));
        assert_eq!(sexo.inverse_transform(1), Some("M"));

        let codes: Vec<f64> = frame.values.column(0).to_vec();
        assert_eq!(codes, vec![1.0, 0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn vocabulary_is_exactly_the_observed_values() {
        let (encoder, _) = CategoricalEncoder::fit_transform(&table(), &["valor"]).unwrap();
        let codigo = encoder.encoder("codigo").unwrap();
        assert_eq!(codigo.classes(), ["0214010015", "0301010072", "1", "301010072"]);
        assert_eq!(encoder.len(), 2);
        assert!(encoder.encoder("idade").is_none());
    }

    #[test]
    fn numeric_columns_pass_through_with_inferred_types() {
        let (_, frame) = CategoricalEncoder::fit_transform(&table(), &["valor"]).unwrap();
        let types: Vec<ColumnType> = frame.schema.iter().map(|c| c.r#type).collect();
        assert_eq!(
            types,
            [ColumnType::Long, ColumnType::Long, ColumnType::Long, ColumnType::Double]
        );
        assert_eq!(frame.values[[2, 3]], 7.25);
        assert_eq!(frame.values[[3, 1]], 60.0);
    }

    #[test]
    fn text_in_numeric_target_is_rejected() {
        let table = Table::new(vec![
            Column::numbers("idade", &[1.0, 2.0]),
            Column::texts("valor", &["12,50", "3,10"]),
        ])
        .unwrap();
        let err = CategoricalEncoder::fit_transform(&table, &["valor"]).unwrap_err();
        assert!(matches!(err, PipelineError::NonNumeric { row: 0, .. }));
    }

    #[test]
    fn unseen_label_is_reported_on_transform() {
        let (encoder, _) = CategoricalEncoder::fit_transform(&table(), &["valor"]).unwrap();
        let fresh = Table::new(vec![
            Column::texts("sexo", &["X"]),
            Column::numbers("idade", &[50.0]),
            Column::numbers("codigo", &[1.0]),
            Column::numbers("valor", &[5.0]),
        ])
        .unwrap();

        let err = encoder.transform(&fresh).unwrap_err();
        assert!(matches!(err, PipelineError::UnseenLabel { label, .. } if label == "X"));
    }
}
