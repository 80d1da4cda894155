use std::io;

use crate::state::State;

#[derive(serde::Serialize, Clone, Debug, PartialEq)]
pub struct TimeSeries {
    variables: Vec<String>,
    times: Vec<f64>,
    rows: Vec<Vec<f64>>,
}

impl TimeSeries {
    pub fn new(variables: Vec<String>, times: Vec<f64>, rows: Vec<Vec<f64>>) -> Self {
        debug_assert_eq!(times.len(), rows.len());
        debug_assert!(rows.iter().all(|r| r.len() == variables.len()));
        TimeSeries {
            variables,
            times,
            rows,
        }
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let i = self.variables.iter().position(|v| v == name)?;
        Some(self.rows.iter().map(|row| row[i]).collect())
    }

    pub fn state_at(&self, sample: usize) -> State {
        self.variables
            .iter()
            .cloned()
            .zip(self.rows[sample].iter().copied())
            .collect()
    }

    pub fn terminal(&self) -> State {
        self.state_at(self.len() - 1)
    }

    // Element-wise mean of series sharing one layout and one time grid.
    pub fn mean(series: &[TimeSeries]) -> Option<TimeSeries> {
        let first = series.first()?;
        if series
            .iter()
            .any(|s| s.variables != first.variables || s.times != first.times)
        {
            return None;
        }
        let n = series.len() as f64;
        let rows = (0..first.len())
            .map(|i| {
                (0..first.variables.len())
                    .map(|j| series.iter().map(|s| s.rows[i][j]).sum::<f64>() / n)
                    .collect()
            })
            .collect();
        Some(TimeSeries::new(
            first.variables.clone(),
            first.times.clone(),
            rows,
        ))
    }

    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(std::iter::once("t").chain(self.variables.iter().map(|v| v.as_str())))?;
        for (t, row) in self.times.iter().zip(&self.rows) {
            wtr.write_record(
                std::iter::once(t.to_string()).chain(row.iter().map(|v| v.to_string())),
            )?;
        }
        wtr.flush()?;
        Ok(())
    }
}
