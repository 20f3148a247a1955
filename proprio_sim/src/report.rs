use std::io::{self, Write};

use serde::Serialize;

pub const COLUMNS: [&str; 8] = [
    "time",
    "position",
    "speed",
    "activation",
    "excitation",
    "fiber_length",
    "tendon_length",
    "muscle_force",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Row {
    pub time: f64,
    pub position: f64,
    pub speed: f64,
    pub activation: f64,
    pub excitation: f64,
    pub fiber_length: f64,
    pub tendon_length: f64,
    pub muscle_force: f64,
}

impl Row {
    fn values(&self) -> [f64; 8] {
        [
            self.time,
            self.position,
            self.speed,
            self.activation,
            self.excitation,
            self.fiber_length,
            self.tendon_length,
            self.muscle_force,
        ]
    }
}

/// Peaks and end state of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Summary {
    pub rows: usize,
    pub final_time: f64,
    pub final_position: f64,
    pub max_position: f64,
    pub peak_excitation: f64,
    pub peak_force: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Report {
    rows: Vec<Row>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn write_csv<W: Write>(&self, mut out: W) -> io::Result<()> {
        writeln!(out, "{}", COLUMNS.join(","))?;
        for row in &self.rows {
            let line: Vec<String> = row.values().iter().map(|v| format!("{v:.9}")).collect();
            writeln!(out, "{}", line.join(","))?;
        }
        out.flush()
    }

    pub fn summary(&self) -> Summary {
        let Some(last) = self.rows.last() else {
            return Summary::default();
        };
        let mut summary = Summary {
            rows: self.rows.len(),
            final_time: last.time,
            final_position: last.position,
            max_position: f64::NEG_INFINITY,
            peak_excitation: 0.0,
            peak_force: 0.0,
        };
        for row in &self.rows {
            summary.max_position = summary.max_position.max(row.position);
            summary.peak_excitation = summary.peak_excitation.max(row.excitation);
            summary.peak_force = summary.peak_force.max(row.muscle_force);
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(time: f64, position: f64, excitation: f64, force: f64) -> Row {
        Row {
            time,
            position,
            speed: 0.0,
            activation: 0.01,
            excitation,
            fiber_length: 0.2 + position,
            tendon_length: 0.1,
            muscle_force: force,
        }
    }

    #[test]
    fn csv_has_header_and_one_line_per_row() {
        let mut report = Report::new();
        report.push(row(0.0, 0.0, 0.01, 10.0));
        report.push(row(0.01, 0.002, 0.02, 12.5));

        let mut buf = Vec::new();
        report.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], COLUMNS.join(","));
        assert!(lines[2].starts_with("0.010000000,0.002000000,"));
        assert_eq!(lines[1].split(',').count(), COLUMNS.len());
    }

    #[test]
    fn summary_tracks_peaks() {
        let mut report = Report::new();
        assert_eq!(report.summary(), Summary::default());

        report.push(row(0.0, -0.005, 0.01, 10.0));
        report.push(row(1.1, 0.08, 0.4, 250.0));
        report.push(row(2.0, 0.01, 0.05, 30.0));

        let s = report.summary();
        assert_eq!(s.rows, 3);
        assert_eq!(s.final_time, 2.0);
        assert_eq!(s.max_position, 0.08);
        assert_eq!(s.peak_excitation, 0.4);
        assert_eq!(s.peak_force, 250.0);
    }
}
