use crate::core::{LoadError, Result, Row, Value};

/// Forward-only cursor over raw result rows.
pub trait RowSource {
    /// Moves to the next row. Returns `false` once the rows are exhausted.
    fn advance(&mut self) -> Result<bool>;

    /// Raw value at `position` of the current row.
    fn value_at(&self, position: usize) -> Result<Value>;

    fn column_count(&self) -> usize;
}

/// In-memory row source backed by a vector of rows.
#[derive(Debug, Clone)]
pub struct VecRowSource {
    columns: Vec<String>,
    rows: Vec<Row>,
    cursor: Option<usize>,
}

impl VecRowSource {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            cursor: None,
        }
    }

    /// Builds a source with generated column names `c0..cN`.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        let columns = (0..width).map(|i| format!("c{}", i)).collect();
        Self::new(columns, rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Zero-based index of the current row, if positioned on one.
    pub fn position(&self) -> Option<usize> {
        self.cursor.filter(|idx| *idx < self.rows.len())
    }

    pub fn rewind(&mut self) {
        self.cursor = None;
    }
}

impl RowSource for VecRowSource {
    fn advance(&mut self) -> Result<bool> {
        let next = self.cursor.map_or(0, |idx| idx + 1);
        self.cursor = Some(next.min(self.rows.len()));
        Ok(next < self.rows.len())
    }

    fn value_at(&self, position: usize) -> Result<Value> {
        let row = self
            .position()
            .map(|idx| &self.rows[idx])
            .ok_or_else(|| LoadError::RowSource("Cursor is not positioned on a row".into()))?;

        row.get(position)
            .cloned()
            .ok_or(LoadError::ColumnOutOfRange {
                position,
                width: row.len(),
            })
    }

    fn column_count(&self) -> usize {
        self.columns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> VecRowSource {
        VecRowSource::new(
            vec!["id".into(), "name".into()],
            vec![
                vec![Value::Integer(1), Value::from("Ann")],
                vec![Value::Integer(2), Value::Null],
            ],
        )
    }

    #[test]
    fn test_cursor_walks_rows_once() {
        let mut rows = source();
        assert!(rows.value_at(0).is_err());

        assert!(rows.advance().unwrap());
        assert_eq!(rows.value_at(1).unwrap(), Value::from("Ann"));
        assert!(rows.advance().unwrap());
        assert!(rows.value_at(1).unwrap().is_null());
        assert!(!rows.advance().unwrap());
        assert!(!rows.advance().unwrap());
        assert!(rows.value_at(0).is_err());
    }

    #[test]
    fn test_column_out_of_range() {
        let mut rows = source();
        rows.advance().unwrap();
        assert!(matches!(
            rows.value_at(5),
            Err(LoadError::ColumnOutOfRange { position: 5, width: 2 })
        ));
        assert_eq!(rows.column_position("NAME"), Some(1));
    }
}
