//! Ordinal grade scales and the aggregations built on them.
//!
//! A grade is an ordinal classification label ("Green"/"Amber"/"Red",
//! "PASS"/"FAIL") assigned to a site-parameter-period combination. The
//! scale carries the severity ordering and the display colour per label;
//! aggregation is a maximum over severities (the "worst grade" of a
//! group).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::table::Table;

/// Fallback colour for labels missing from a colour map.
pub const DEFAULT_COLOUR: &str = "orange";

/// An ordered grade scale: labels from best to worst, plus labels that
/// mark absent data ("No Observations", "No Sample") which never win a
/// worst-grade aggregation, and a colour per label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeScale {
    /// Graded labels, best first. Severity is the position in this list.
    labels: Vec<String>,
    /// Labels carrying no grade information, excluded from aggregation.
    #[serde(default)]
    ungraded: Vec<String>,
    /// Label → hex colour.
    #[serde(default)]
    colours: HashMap<String, String>,
}

impl GradeScale {
    pub fn new<L, U, S>(labels: L, ungraded: U, colours: &[(&str, &str)]) -> GradeScale
    where
        L: IntoIterator<Item = S>,
        U: IntoIterator<Item = S>,
        S: Into<String>,
    {
        GradeScale {
            labels: labels.into_iter().map(Into::into).collect(),
            ungraded: ungraded.into_iter().map(Into::into).collect(),
            colours: colours
                .iter()
                .map(|(label, colour)| (label.to_string(), colour.to_string()))
                .collect(),
        }
    }

    /// The Green/Amber/Red scale used by the recreational water grades.
    pub fn traffic_light() -> GradeScale {
        GradeScale::new(
            ["Green", "Amber", "Red"],
            ["No Observations", "No Sample"],
            &[
                ("Green", "#70ad47"),
                ("Amber", "#ed7d31"),
                ("Red", "#ff0000"),
                ("No Observations", "#a6a6a6"),
                ("No Sample", "#d3d3d3"),
            ],
        )
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Graded labels followed by the ungraded ones — legend display order.
    pub fn all_labels(&self) -> Vec<&str> {
        self.labels
            .iter()
            .chain(self.ungraded.iter())
            .map(String::as_str)
            .collect()
    }

    /// Severity rank of a label: 1 for the best graded label upwards.
    /// `None` for ungraded or unknown labels.
    pub fn severity(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label).map(|i| i + 1)
    }

    /// Worst (maximum-severity) graded label present. Ungraded and
    /// unknown labels are ignored; an empty or ungraded-only group has
    /// no worst grade.
    pub fn worst<'a>(&'a self, labels: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
        labels
            .into_iter()
            .filter_map(|label| self.severity(label).map(|sev| (sev, label)))
            .max_by_key(|(sev, _)| *sev)
            .map(|(_, label)| label)
    }

    /// Colour for a label, falling back to [`DEFAULT_COLOUR`].
    pub fn colour(&self, label: &str) -> &str {
        self.colours.get(label).map(String::as_str).unwrap_or(DEFAULT_COLOUR)
    }

    /// Colour map as owned pairs, for chart colour arguments.
    pub fn colour_map(&self) -> HashMap<String, String> {
        self.colours.clone()
    }
}

/// Numeric cutoffs → grade labels. `cutoffs` has one more entry than
/// `labels`; a value lands in the band whose lower cutoff it reaches
/// (lower bound inclusive, upper exclusive).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeBands {
    cutoffs: Vec<f64>,
    labels: Vec<String>,
}

impl GradeBands {
    pub fn new<S: Into<String>>(
        cutoffs: Vec<f64>,
        labels: impl IntoIterator<Item = S>,
    ) -> Result<GradeBands> {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if cutoffs.len() != labels.len() + 1 {
            return Err(Error::BandShape { cutoffs: cutoffs.len(), labels: labels.len() });
        }
        Ok(GradeBands { cutoffs, labels })
    }

    /// Bathing-season enterococci bands (counts per 100 ml).
    pub fn enterococci() -> GradeBands {
        GradeBands::new(vec![0.0, 140.0, 280.0, 100_000.0], ["Green", "Amber", "Red"])
            .expect("static band shape")
    }

    /// Bathing-season E. coli bands (counts per 100 ml).
    pub fn e_coli() -> GradeBands {
        GradeBands::new(vec![0.0, 260.0, 540.0, 100_000.0], ["Green", "Amber", "Red"])
            .expect("static band shape")
    }

    /// Cyanobacteria alert-level bands.
    pub fn cyanobacteria() -> GradeBands {
        GradeBands::new(
            vec![0.0, 1.0, 2.0, 3.0, 100_000.0],
            ["No Observations", "Green", "Amber", "Red"],
        )
        .expect("static band shape")
    }

    /// Label of the band containing `value`, or `None` outside all bands.
    pub fn classify(&self, value: f64) -> Option<&str> {
        for (i, label) in self.labels.iter().enumerate() {
            if value >= self.cutoffs[i] && value < self.cutoffs[i + 1] {
                return Some(label);
            }
        }
        None
    }
}

/// A group × category pivot of percentages.
#[derive(Debug, Clone, PartialEq)]
pub struct PercentagePivot {
    /// Row labels (groups), in first-appearance order.
    pub index: Vec<String>,
    /// Column labels (categories), in the order supplied.
    pub columns: Vec<String>,
    /// `values[row][col]` — percentage of the row's records in the
    /// category; rows sum to 100 over the listed categories.
    pub values: Vec<Vec<f64>>,
}

/// Pivot `table` into per-group category percentages. Only categories in
/// `category_order` that actually occur become columns, keeping the
/// supplied ordering. Rows with a null group or category are skipped.
pub fn percentage_pivot(
    table: &Table,
    group_column: &str,
    category_column: &str,
    category_order: &[&str],
) -> Result<PercentagePivot> {
    table.column_index(group_column)?;
    table.column_index(category_column)?;

    let mut index: Vec<String> = Vec::new();
    let mut counts: Vec<HashMap<String, usize>> = Vec::new();
    for row in table.iter() {
        let (Some(group), Some(category)) =
            (row.display(group_column), row.display(category_column))
        else {
            continue;
        };
        let row_idx = match index.iter().position(|g| *g == group) {
            Some(i) => i,
            None => {
                index.push(group);
                counts.push(HashMap::new());
                index.len() - 1
            }
        };
        *counts[row_idx].entry(category).or_insert(0) += 1;
    }

    let columns: Vec<String> = category_order
        .iter()
        .filter(|c| counts.iter().any(|m| m.contains_key(**c)))
        .map(|c| c.to_string())
        .collect();

    let values = counts
        .iter()
        .map(|per_group| {
            let total: usize = columns.iter().map(|c| per_group.get(c).copied().unwrap_or(0)).sum();
            columns
                .iter()
                .map(|c| {
                    if total == 0 {
                        0.0
                    } else {
                        per_group.get(c).copied().unwrap_or(0) as f64 * 100.0 / total as f64
                    }
                })
                .collect()
        })
        .collect();

    Ok(PercentagePivot { index, columns, values })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_is_the_maximum_severity_label_present() {
        let scale = GradeScale::traffic_light();
        assert_eq!(scale.worst(["Green", "Red", "Amber"]), Some("Red"));
        assert_eq!(scale.worst(["Green", "Amber"]), Some("Amber"));
        assert_eq!(scale.worst(["Green"]), Some("Green"));
    }

    #[test]
    fn worst_ignores_ungraded_and_unknown_labels() {
        let scale = GradeScale::traffic_light();
        assert_eq!(scale.worst(["No Sample", "Green", "Mystery"]), Some("Green"));
        assert_eq!(scale.worst(["No Sample", "No Observations"]), None);
        assert_eq!(scale.worst([]), None);
    }

    #[test]
    fn colour_falls_back_to_default() {
        let scale = GradeScale::traffic_light();
        assert_eq!(scale.colour("Green"), "#70ad47");
        assert_eq!(scale.colour("Turquoise"), DEFAULT_COLOUR);
    }

    #[test]
    fn bands_are_lower_inclusive() {
        let bands = GradeBands::e_coli();
        assert_eq!(bands.classify(0.0), Some("Green"));
        assert_eq!(bands.classify(259.9), Some("Green"));
        // A boundary value belongs to the upper band.
        assert_eq!(bands.classify(260.0), Some("Amber"));
        assert_eq!(bands.classify(540.0), Some("Red"));
        assert_eq!(bands.classify(-1.0), None);
    }

    #[test]
    fn band_shape_is_checked() {
        let err = GradeBands::new(vec![0.0, 1.0], ["a", "b", "c"]);
        assert!(err.is_err());
    }

    #[test]
    fn percentage_rows_sum_to_one_hundred() {
        let csv = "\
fmu,grade
Coast,Green
Coast,Green
Coast,Red
Hills,Amber
";
        let table = Table::from_csv_reader(csv.as_bytes()).unwrap();
        let pivot =
            percentage_pivot(&table, "fmu", "grade", &["Green", "Amber", "Red"]).unwrap();
        assert_eq!(pivot.index, vec!["Coast", "Hills"]);
        assert_eq!(pivot.columns, vec!["Green", "Amber", "Red"]);
        for row in &pivot.values {
            let total: f64 = row.iter().sum();
            assert!((total - 100.0).abs() < 1e-9, "row sums to {total}");
        }
        assert!((pivot.values[0][0] - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn pivot_drops_categories_never_seen() {
        let csv = "fmu,grade\nCoast,Green\n";
        let table = Table::from_csv_reader(csv.as_bytes()).unwrap();
        let pivot =
            percentage_pivot(&table, "fmu", "grade", &["Green", "Amber", "Red"]).unwrap();
        assert_eq!(pivot.columns, vec!["Green"]);
    }
}
