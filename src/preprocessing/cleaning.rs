//! Выбор столбцов и удаление строк с пропусками

use crate::error::{PipelineError, Result};
use crate::types::{Column, Table};

pub struct DataCleaner;

impl DataCleaner {
    /// Оставляет только указанные столбцы в заданном порядке
    pub fn select_columns<S: AsRef<str>>(table: &Table, names: &[S]) -> Result<Table> {
        let columns = names
            .iter()
            .map(|name| {
                table
                    .column(name.as_ref())
                    .cloned()
                    .ok_or_else(|| PipelineError::MissingColumn(name.as_ref().to_string()))
            })
            .collect::<Result<Vec<Column>>>()?;
        Table::new(columns)
    }

    /// Удаляет каждую строку, где пропущено хотя бы одно значение (без импутации)
    pub fn drop_missing(table: Table) -> Result<Table> {
        let height = table.height();
        let keep: Vec<bool> = (0..height)
            .map(|row| table.columns().iter().all(|c| !c.cells[row].is_missing()))
            .collect();

        let columns = table
            .into_columns()
            .into_iter()
            .map(|column| Column {
                name: column.name,
                cells: column
                    .cells
                    .into_iter()
                    .zip(&keep)
                    .filter_map(|(cell, &k)| k.then_some(cell))
                    .collect(),
            })
            .collect();

        Table::new(columns)
    }

    pub fn clean<S: AsRef<str>>(table: &Table, names: &[S]) -> Result<Table> {
        let selected = Self::select_columns(table, names)?;
        let before = selected.height();
        let cleaned = Self::drop_missing(selected)?;
        tracing::info!(
            "Selected {} columns; dropped {} of {} rows with missing values",
            cleaned.width(),
            before - cleaned.height(),
            before
        );
        Ok(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Cell;

    fn sample() -> Table {
        Table::new(vec![
            Column::numbers("idade", &[30.0, f64::NAN, 45.0, 60.0]),
            Column::new(
                "sexo",
                vec![
                    Cell::Text("M".into()),
                    Cell::Text("F".into()),
                    Cell::Empty,
                    Cell::Text("F".into()),
                ],
            ),
            Column::numbers("extra", &[1.0, 2.0, 3.0, 4.0]),
            Column::numbers("valor", &[10.0, 11.0, 12.0, 13.0]),
        ])
        .unwrap()
    }

    #[test]
    fn clean_set_has_no_missing_values() {
        let cleaned = DataCleaner::clean(&sample(), &["valor", "idade", "sexo"]).unwrap();

        assert_eq!(cleaned.column_names(), ["valor", "idade", "sexo"]);
        assert_eq!(cleaned.height(), 2);
        for column in cleaned.columns() {
            assert!(column.cells.iter().all(|c| !c.is_missing()));
        }
        assert_eq!(cleaned.column("valor").unwrap().cells[1], Cell::Number(13.0));
    }

    #[test]
    fn unselected_columns_do_not_drop_rows() {
        let cleaned = DataCleaner::clean(&sample(), &["extra", "valor"]).unwrap();
        assert_eq!(cleaned.height(), 4);
    }

    #[test]
    fn drop_missing_keeps_columns_aligned() {
        let cleaned = DataCleaner::drop_missing(sample()).unwrap();

        assert_eq!(cleaned.width(), 4);
        assert_eq!(cleaned.height(), 2);
        assert!(cleaned.columns().iter().all(|c| c.cells.len() == 2));
        assert_eq!(cleaned.column("extra").unwrap().cells, [Cell::Number(1.0), Cell::Number(4.0)]);
    }

    #[test]
    fn drop_missing_on_empty_table_is_empty() {
        let cleaned = DataCleaner::drop_missing(Table::default()).unwrap();
        assert_eq!(cleaned.height(), 0);
        assert_eq!(cleaned.width(), 0);
    }

    #[test]
    fn unknown_column_is_a_missing_column_error() {
        let err = DataCleaner::clean(&sample(), &["valor", "Tipo de Estabelecimento"]).unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn(name) if name == "Tipo de Estabelecimento"));
    }
}
