//! Per-label shape statistics.

use crate::Spacing;
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Shape statistics of one labelled object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelShape {
    /// Object label.
    pub label: u32,
    /// Number of pixels carrying the label.
    pub num_pixels: usize,
    /// Physical area, `num_pixels` times the pixel area.
    pub physical_size: f64,
    /// Number of the object's pixels lying on the first or last row or column.
    pub num_pixels_on_border: usize,
    /// Physical x (column) coordinate of the centroid.
    pub centroid_x: f64,
    /// Physical y (row) coordinate of the centroid.
    pub centroid_y: f64,
    /// Bounding box as `[min_row, min_col, max_row, max_col]`, inclusive.
    pub bbox: [usize; 4],
}

impl LabelShape {
    /// Whether any pixel of the object lies on the image border.
    pub fn touches_border(&self) -> bool {
        self.num_pixels_on_border > 0
    }
}

struct Accumulator {
    num_pixels: usize,
    on_border: usize,
    row_sum: f64,
    col_sum: f64,
    bbox: [usize; 4],
}

impl Accumulator {
    fn new((row, col): (usize, usize)) -> Self {
        Accumulator {
            num_pixels: 0,
            on_border: 0,
            row_sum: 0.0,
            col_sum: 0.0,
            bbox: [row, col, row, col],
        }
    }

    fn add(&mut self, (row, col): (usize, usize), on_border: bool) {
        self.num_pixels += 1;
        self.on_border += usize::from(on_border);
        self.row_sum += row as f64;
        self.col_sum += col as f64;
        self.bbox = [
            self.bbox[0].min(row),
            self.bbox[1].min(col),
            self.bbox[2].max(row),
            self.bbox[3].max(col),
        ];
    }
}

/// Shape statistics of every label present in `labels`, in increasing label order.
pub fn label_shape_statistics(labels: ArrayView2<'_, u32>, spacing: Spacing) -> Vec<LabelShape> {
    let (nrows, ncols) = labels.dim();
    let mut accumulators: BTreeMap<u32, Accumulator> = BTreeMap::new();
    for (index @ (row, col), &label) in labels.indexed_iter() {
        if label == 0 {
            continue;
        }
        let on_border = row == 0 || col == 0 || row + 1 == nrows || col + 1 == ncols;
        accumulators
            .entry(label)
            .or_insert_with(|| Accumulator::new(index))
            .add(index, on_border);
    }
    accumulators
        .into_iter()
        .map(|(label, acc)| {
            let n = acc.num_pixels as f64;
            LabelShape {
                label,
                num_pixels: acc.num_pixels,
                physical_size: n * spacing.pixel_area(),
                num_pixels_on_border: acc.on_border,
                centroid_x: acc.col_sum / n * spacing.col,
                centroid_y: acc.row_sum / n * spacing.row,
                bbox: acc.bbox,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::present_labels;
    use ndarray::{array, Array2};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_statistics() {
        let labels = array![
            [2, 2, 0, 0],
            [2, 2, 0, 0],
            [0, 0, 1, 0],
            [0, 0, 0, 0],
        ];
        let stats = label_shape_statistics(labels.view(), Spacing { row: 0.5, col: 2.0 });
        assert_eq!(stats.len(), 2);

        assert_eq!(
            stats[0],
            LabelShape {
                label: 1,
                num_pixels: 1,
                physical_size: 1.0,
                num_pixels_on_border: 0,
                centroid_x: 4.0,
                centroid_y: 1.0,
                bbox: [2, 2, 2, 2],
            }
        );
        assert_eq!(stats[1].label, 2);
        assert_eq!(stats[1].num_pixels, 4);
        assert_eq!(stats[1].physical_size, 4.0);
        assert_eq!(stats[1].num_pixels_on_border, 3);
        assert!(stats[1].touches_border());
        assert!(!stats[0].touches_border());
        assert_eq!(stats[1].centroid_x, 1.0);
        assert_eq!(stats[1].centroid_y, 0.25);
        assert_eq!(stats[1].bbox, [0, 0, 1, 1]);
    }

    #[test]
    fn test_row_count_matches_label_count_and_border_filter_shrinks() {
        let labels = Array2::from_shape_fn((9, 9), |(r, c)| ((r / 3) * 3 + c / 3) as u32);
        let stats = label_shape_statistics(labels.view(), Spacing::default());
        assert_eq!(stats.len(), present_labels(labels.view()).len());
        let interior: Vec<_> = stats.iter().filter(|s| !s.touches_border()).collect();
        assert!(interior.len() <= stats.len());
        assert_eq!(interior.len(), 1);
        assert_eq!(interior[0].label, 4);
    }
}
