//! Flat table of per-object shape statistics across stains, and its summary.
#![allow(missing_docs)]

use channel_stack::Stain;
use itertools::Itertools;
use ndarray::ArrayView2;
use segmentation::shape_stats::{label_shape_statistics, LabelShape};
use segmentation::Spacing;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Distribution, Max, Median, Min};

/// One object of one stain. Rows are written to `shape_stats.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeStatsRow {
    pub stain: Stain,
    pub label: u32,
    pub num_pixels: usize,
    /// Area in square micrometers.
    pub physical_size: f64,
    pub num_pixels_on_border: usize,
    pub centroid_x: f64,
    pub centroid_y: f64,
    pub bbox_min_row: usize,
    pub bbox_min_col: usize,
    pub bbox_max_row: usize,
    pub bbox_max_col: usize,
}

impl ShapeStatsRow {
    fn new(stain: Stain, shape: LabelShape) -> Self {
        let [bbox_min_row, bbox_min_col, bbox_max_row, bbox_max_col] = shape.bbox;
        ShapeStatsRow {
            stain,
            label: shape.label,
            num_pixels: shape.num_pixels,
            physical_size: shape.physical_size,
            num_pixels_on_border: shape.num_pixels_on_border,
            centroid_x: shape.centroid_x,
            centroid_y: shape.centroid_y,
            bbox_min_row,
            bbox_min_col,
            bbox_max_row,
            bbox_max_col,
        }
    }

    /// Whether the object reaches the first or last row or column.
    pub fn touches_border(&self) -> bool {
        self.num_pixels_on_border > 0
    }
}

/// Statistics of every label of every stain, stains in the given order and
/// labels ascending within a stain.
pub fn shape_stats_table<'a>(
    labels: impl IntoIterator<Item = (Stain, ArrayView2<'a, u32>)>,
    spacing: Spacing,
) -> Vec<ShapeStatsRow> {
    labels
        .into_iter()
        .flat_map(|(stain, labels)| {
            label_shape_statistics(labels, spacing)
                .into_iter()
                .map(move |shape| ShapeStatsRow::new(stain, shape))
        })
        .collect()
}

/// Rows whose object lies fully inside the image.
pub fn filter_interior(rows: &[ShapeStatsRow]) -> Vec<ShapeStatsRow> {
    rows.iter().filter(|row| !row.touches_border()).cloned().collect()
}

/// Object counts and area distribution of one stain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StainSummary {
    pub stain: Stain,
    /// Li threshold of the smoothed channel, when known.
    pub threshold: Option<f64>,
    pub num_objects: usize,
    pub num_border_objects: usize,
    pub mean_area: Option<f64>,
    pub median_area: Option<f64>,
    pub min_area: Option<f64>,
    pub max_area: Option<f64>,
}

/// Summaries of all stains of the table. `thresholds` lists the Li threshold
/// of each segmented channel; stains without rows still get a summary.
pub fn summarize(rows: &[ShapeStatsRow], thresholds: &[(Stain, f64)]) -> Vec<StainSummary> {
    let by_stain = rows.iter().into_group_map_by(|row| row.stain);
    thresholds
        .iter()
        .map(|&(stain, _)| stain)
        .chain(by_stain.keys().copied())
        .unique()
        .sorted()
        .map(|stain| {
            let stain_rows = by_stain.get(&stain).map(Vec::as_slice).unwrap_or_default();
            let areas: Vec<f64> = stain_rows.iter().map(|row| row.physical_size).collect();
            let (mean_area, median_area, min_area, max_area) = if areas.is_empty() {
                (None, None, None, None)
            } else {
                let areas = Data::new(areas);
                (
                    areas.mean(),
                    Some(areas.median()),
                    Some(areas.min()),
                    Some(areas.max()),
                )
            };
            StainSummary {
                stain,
                threshold: thresholds
                    .iter()
                    .find(|(s, _)| *s == stain)
                    .map(|&(_, threshold)| threshold),
                num_objects: stain_rows.len(),
                num_border_objects: stain_rows.iter().filter(|row| row.touches_border()).count(),
                mean_area,
                median_area,
                min_area,
                max_area,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use pretty_assertions::assert_eq;

    fn dapi_labels() -> Array2<u32> {
        array![
            [1, 1, 0, 0, 0],
            [0, 0, 0, 2, 0],
            [0, 0, 2, 2, 0],
            [0, 0, 0, 0, 0],
        ]
    }

    #[test]
    fn test_table_and_filter() {
        let dapi = dapi_labels();
        let ki67 = array![
            [0, 0, 0, 0, 0],
            [0, 0, 0, 1, 0],
            [0, 0, 1, 1, 0],
            [0, 0, 0, 0, 0],
        ];
        let rows = shape_stats_table(
            [(Stain::Dapi, dapi.view()), (Stain::Ki67, ki67.view())],
            Spacing::isotropic(0.5),
        );
        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows.iter().map(|r| (r.stain, r.label)).collect::<Vec<_>>(),
            vec![(Stain::Dapi, 1), (Stain::Dapi, 2), (Stain::Ki67, 1)]
        );
        assert_eq!(rows[1].physical_size, 0.75);
        assert_eq!(rows[1].bbox_min_row, 1);
        assert_eq!(rows[1].bbox_max_col, 3);

        let interior = filter_interior(&rows);
        assert!(interior.len() <= rows.len());
        assert_eq!(interior.len(), 2);
        assert!(interior.iter().all(|r| !r.touches_border()));
    }

    #[test]
    fn test_summarize() {
        let dapi = dapi_labels();
        let rows = shape_stats_table([(Stain::Dapi, dapi.view())], Spacing::default());
        let summary = summarize(&rows, &[(Stain::Dapi, 10.0), (Stain::Ph3, 20.0)]);
        assert_eq!(summary.len(), 2);

        assert_eq!(summary[0].stain, Stain::Dapi);
        assert_eq!(summary[0].threshold, Some(10.0));
        assert_eq!(summary[0].num_objects, 2);
        assert_eq!(summary[0].num_border_objects, 1);
        assert_eq!(summary[0].mean_area, Some(2.5));
        assert_eq!(summary[0].median_area, Some(2.5));
        assert_eq!(summary[0].min_area, Some(2.0));
        assert_eq!(summary[0].max_area, Some(3.0));

        assert_eq!(summary[1].stain, Stain::Ph3);
        assert_eq!(summary[1].num_objects, 0);
        assert_eq!(summary[1].mean_area, None);
    }

    #[test]
    fn test_csv_header() -> anyhow::Result<()> {
        let dapi = dapi_labels();
        let rows = shape_stats_table([(Stain::Dapi, dapi.view())], Spacing::default());
        let row = serde_json::to_value(&rows[0])?;
        assert_eq!(row["stain"], "dapi");
        assert_eq!(row["num_pixels"], 2);
        Ok(())
    }
}
