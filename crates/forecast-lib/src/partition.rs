//! Chronological train/test partitioning and look-back windowing
//!
//! Splits are positional (`floor(f * n)`) and never shuffle. Windows are built
//! per partition, so no window spans the train/test boundary.

use crate::error::{PipelineError, Result};
use crate::models::FeatureFrame;
use serde::Serialize;
use std::ops::Range;

/// Compute the split boundary for `len` rows at fraction `fraction`.
///
/// Fails when the fraction is outside (0, 1) or either partition would be empty.
pub fn split_boundary(len: usize, fraction: f64) -> Result<usize> {
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(PipelineError::InvalidConfig(format!(
            "split fraction must be in (0, 1), got {}",
            fraction
        )));
    }
    let boundary = (fraction * len as f64).floor() as usize;
    if boundary == 0 || boundary >= len {
        return Err(PipelineError::InsufficientData {
            needed: 1,
            got: len,
        });
    }
    Ok(boundary)
}

/// Non-owning view over a contiguous row range of a `FeatureFrame`
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    frame: &'a FeatureFrame,
    range: (usize, usize),
}

impl<'a> FrameView<'a> {
    pub fn len(&self) -> usize {
        self.range.1 - self.range.0
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rows(&self) -> Range<usize> {
        self.range.0..self.range.1
    }

    pub fn column(&self, name: &str) -> Option<&'a [f64]> {
        self.frame
            .column(name)
            .map(|values| &values[self.range.0..self.range.1])
    }
}

/// Ordered (train, test) pair over one frame
#[derive(Debug, Clone, Copy)]
pub struct Split<'a> {
    pub train: FrameView<'a>,
    pub test: FrameView<'a>,
    boundary: usize,
}

impl<'a> Split<'a> {
    /// Partition a frame at `floor(fraction * len)`
    pub fn new(frame: &'a FeatureFrame, fraction: f64) -> Result<Self> {
        let boundary = split_boundary(frame.len(), fraction)?;
        Ok(Self {
            train: FrameView {
                frame,
                range: (0, boundary),
            },
            test: FrameView {
                frame,
                range: (boundary, frame.len()),
            },
            boundary,
        })
    }

    /// Index of the first test row
    pub fn boundary(&self) -> usize {
        self.boundary
    }

    /// Train and test slices of one column
    pub fn series(&self, column: &str) -> Result<SeriesSplit<'a>> {
        let missing = || PipelineError::MissingColumn {
            column: column.to_string(),
        };
        Ok(SeriesSplit {
            train: self.train.column(column).ok_or_else(missing)?,
            test: self.test.column(column).ok_or_else(missing)?,
        })
    }
}

/// Train and test slices of a single column
#[derive(Debug, Clone, Copy)]
pub struct SeriesSplit<'a> {
    pub train: &'a [f64],
    pub test: &'a [f64],
}

/// A look-back input sequence and the value that follows it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Window {
    /// Offset of the first input within the partition it was cut from
    pub start: usize,
    pub inputs: Vec<f64>,
    pub target: f64,
}

impl Window {
    /// Index of the target within the source partition
    pub fn target_index(&self) -> usize {
        self.start + self.inputs.len()
    }
}

/// Cut fixed-length windows over one partition.
///
/// Window `i` takes `values[i..i + look_back]` as input and `values[i + look_back]`
/// as target, for `i` in `0..len - look_back - 1`. The last possible window is
/// not produced, matching the reference dataset builder.
pub fn make_windows(values: &[f64], look_back: usize) -> Result<Vec<Window>> {
    if look_back == 0 {
        return Err(PipelineError::InvalidConfig(
            "look-back must be at least 1".into(),
        ));
    }
    if values.len() <= look_back + 1 {
        return Err(PipelineError::InsufficientData {
            needed: look_back + 1,
            got: values.len(),
        });
    }
    Ok((0..values.len() - look_back - 1)
        .map(|i| Window {
            start: i,
            inputs: values[i..i + look_back].to_vec(),
            target: values[i + look_back],
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_boundary_floor() {
        assert_eq!(split_boundary(100, 0.66).unwrap(), 66);
        assert_eq!(split_boundary(10, 0.7).unwrap(), 7);
        assert_eq!(split_boundary(3, 0.5).unwrap(), 1);
    }

    #[test]
    fn test_split_boundary_rejects_empty_partitions() {
        assert!(matches!(
            split_boundary(1, 0.5),
            Err(PipelineError::InsufficientData { .. })
        ));
        assert!(matches!(
            split_boundary(10, 0.0),
            Err(PipelineError::InvalidConfig(_))
        ));
        assert!(split_boundary(10, 1.0).is_err());
        assert!(split_boundary(10, f64::NAN).is_err());
    }

    #[test]
    fn test_split_covers_frame_in_order() {
        let frame = FeatureFrame::from_series("cpu", (0..10).map(|i| i as f64).collect());
        let split = Split::new(&frame, 0.7).unwrap();
        let series = split.series("cpu").unwrap();
        assert_eq!(series.train, &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(series.test, &[7.0, 8.0, 9.0]);
        assert_eq!(split.boundary(), 7);
        assert_eq!(split.train.rows(), 0..7);
        assert_eq!(split.test.rows(), 7..10);
    }

    #[test]
    fn test_split_missing_column() {
        let frame = FeatureFrame::from_series("cpu", vec![1.0, 2.0, 3.0]);
        let split = Split::new(&frame, 0.5).unwrap();
        assert!(matches!(
            split.series("net"),
            Err(PipelineError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_make_windows() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let windows = make_windows(&values, 2).unwrap();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].inputs, vec![1.0, 2.0]);
        assert_eq!(windows[0].target, 3.0);
        assert_eq!(windows[1].inputs, vec![2.0, 3.0]);
        assert_eq!(windows[1].target, 4.0);
        assert_eq!(windows[1].target_index(), 3);
    }

    #[test]
    fn test_make_windows_insufficient() {
        assert!(matches!(
            make_windows(&[1.0, 2.0], 1),
            Err(PipelineError::InsufficientData { needed: 2, got: 2 })
        ));
        assert!(make_windows(&[1.0, 2.0, 3.0], 1).is_ok());
    }
}
