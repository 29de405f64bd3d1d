use std::collections::{BTreeMap, VecDeque};
use std::ops::RangeInclusive;

use log::{error, info, warn};
use nalgebra::{Point3, Vector3};
use ndarray::Array3;
use serde::{Deserialize, Serialize};
use web_time::Instant;

use crate::grid::GridGeometry;
use crate::progress::{Progress, cancelled};
use crate::volume::{ScalarField, Volume, VolumeError};

const UNVISITED: i32 = -1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobParams {
    /// Voxels strictly above this value belong to blobs.
    pub threshold: f64,
    /// Blobs with fewer voxels are folded into the background.
    pub min_blob_size: usize,
}

impl Default for BlobParams {
    fn default() -> Self {
        Self {
            threshold: 0.0,
            min_blob_size: 1,
        }
    }
}

/// Labels the 6-connected supra-threshold regions of `source_column`.
///
/// Returns one label per voxel with shape `(nR, nT, nS)`: 0 for background
/// and for blobs below `min_blob_size`, otherwise `1..=K` numbered in the
/// order the blobs were first reached by a linear scan.
pub fn extract_blobs<G: GridGeometry>(
    volume: &Volume<G>,
    source_column: &str,
    params: &BlobParams,
    progress: Option<&dyn Progress>,
) -> Result<Array3<i32>, VolumeError> {
    let column = volume
        .require_column(source_column)
        .inspect_err(|e| error!("Cannot extract blobs: {e}"))?;
    let grid = volume.grid();
    let n = grid.voxel_count();
    let start = Instant::now();

    // NaN never exceeds the threshold.
    let supra = |index: usize| column.get(index) > params.threshold;

    if let Some(p) = progress {
        p.set_range(0, n);
    }
    let mut visited = 0;
    let mut visit = || -> Result<(), VolumeError> {
        if cancelled(progress) {
            warn!("Blob extraction on '{}' cancelled", volume.name());
            return Err(VolumeError::Cancelled);
        }
        visited += 1;
        if let Some(p) = progress {
            p.update(visited);
        }
        Ok(())
    };

    let mut labels = vec![UNVISITED; n];
    let mut sizes: Vec<usize> = Vec::new();
    let mut queue = VecDeque::new();

    for index in 0..n {
        if labels[index] != UNVISITED {
            continue;
        }
        visit()?;
        if !supra(index) {
            labels[index] = 0;
            continue;
        }

        let label = sizes.len() as i32 + 1;
        labels[index] = label;
        let mut size = 1;
        queue.push_back(index);
        while let Some(current) = queue.pop_front() {
            for neighbour in grid.neighbours(current) {
                if labels[neighbour] != UNVISITED {
                    continue;
                }
                if supra(neighbour) {
                    labels[neighbour] = label;
                    size += 1;
                    queue.push_back(neighbour);
                } else {
                    labels[neighbour] = 0;
                }
                visit()?;
            }
        }
        sizes.push(size);
    }

    // relabel[old] for old in 0..=K
    let mut relabel = Vec::with_capacity(sizes.len() + 1);
    relabel.push(0);
    let mut removed = 0;
    for (i, &size) in sizes.iter().enumerate() {
        if size < params.min_blob_size {
            relabel.push(0);
            removed += 1;
        } else {
            relabel.push((i + 1 - removed) as i32);
        }
    }
    for label in labels.iter_mut().filter(|l| **l > 0) {
        *label = relabel[*label as usize];
    }

    info!(
        "Found {} blobs in '{}.{}' ({} below {} voxels) in {:.2?}",
        sizes.len() - removed,
        volume.name(),
        source_column,
        removed,
        params.min_blob_size,
        start.elapsed()
    );

    let [n_s, n_t, n_r] = grid.dims();
    Ok(Array3::from_shape_vec((n_r, n_t, n_s), labels)?)
}

/// Runs [`extract_blobs`] and stores the labels as an `Int32` column,
/// replacing any column named `target_column`. Nothing is written when
/// extraction fails.
pub fn extract_blobs_into<G: GridGeometry>(
    volume: &mut Volume<G>,
    source_column: &str,
    target_column: &str,
    params: &BlobParams,
    progress: Option<&dyn Progress>,
) -> Result<(), VolumeError> {
    let labels = extract_blobs(volume, source_column, params, progress)?;
    let mut field = ScalarField::from_labels(labels);
    field.update_limits();
    volume.insert_column(target_column, field)
}

/// Peak of one labelled region.
#[derive(Clone, Debug, PartialEq)]
pub struct RegionMaximum {
    pub label: i32,
    pub value: f64,
    pub voxel: [usize; 3],
    /// World-space midpoint of `voxel`.
    pub point: Point3<f64>,
}

/// Centre of mass of one labelled region.
#[derive(Clone, Debug, PartialEq)]
pub struct RoiCentroid {
    pub label: i32,
    pub size: usize,
    pub centroid: Point3<f64>,
}

/// Finds the maximum of `source_column` inside each region of `mask_column`.
///
/// Mask values are truncated to integers and only positive ones name a
/// region. Without a mask the whole volume is region 1. Ties keep the first
/// voxel in linear order and NaN values are skipped. Results are sorted by
/// label.
pub fn find_maxima<G: GridGeometry>(
    volume: &Volume<G>,
    source_column: &str,
    mask_column: Option<&str>,
) -> Result<Vec<RegionMaximum>, VolumeError> {
    let values = volume
        .require_column(source_column)
        .inspect_err(|e| error!("Cannot find maxima: {e}"))?;
    let mask = mask_column
        .map(|name| volume.require_column(name))
        .transpose()
        .inspect_err(|e| error!("Cannot find maxima: {e}"))?;
    let grid = volume.grid();

    let mut peaks: BTreeMap<i32, (f64, usize)> = BTreeMap::new();
    for index in 0..grid.voxel_count() {
        let label = mask.map_or(1, |m| m.get(index) as i32);
        let value = values.get(index);
        if label <= 0 || value.is_nan() {
            continue;
        }
        peaks
            .entry(label)
            .and_modify(|peak| {
                if value > peak.0 {
                    *peak = (value, index);
                }
            })
            .or_insert((value, index));
    }

    Ok(peaks
        .into_iter()
        .map(|(label, (value, index))| RegionMaximum {
            label,
            value,
            voxel: grid.voxel_of(index),
            point: grid.midpoint_at(index),
        })
        .collect())
}

/// Computes the centroid of every region of `label_column` whose label lies
/// in `value_range` and which has at least `min_size` voxels.
///
/// Labels are rounded to the nearest integer; NaN voxels belong to no
/// region. Centroids are the mean world-space voxel midpoints, sorted by
/// label. Progress runs over all voxels and cancellation is polled on each.
pub fn roi_centroids<G: GridGeometry>(
    volume: &Volume<G>,
    label_column: &str,
    value_range: RangeInclusive<i32>,
    min_size: usize,
    progress: Option<&dyn Progress>,
) -> Result<Vec<RoiCentroid>, VolumeError> {
    let labels = volume
        .require_column(label_column)
        .inspect_err(|e| error!("Cannot compute ROI centroids: {e}"))?;
    let grid = volume.grid();
    let n = grid.voxel_count();
    let min_size = min_size.max(1);

    if let Some(p) = progress {
        p.set_range(0, n);
    }

    let mut sums: BTreeMap<i32, (usize, Vector3<f64>)> = BTreeMap::new();
    for index in 0..n {
        if cancelled(progress) {
            warn!("ROI centroids on '{}' cancelled", volume.name());
            return Err(VolumeError::Cancelled);
        }
        let value = labels.get(index);
        if !value.is_nan() {
            let label = value.round() as i32;
            if value_range.contains(&label) {
                let sum = sums.entry(label).or_insert((0, Vector3::zeros()));
                sum.0 += 1;
                sum.1 += grid.midpoint_at(index).coords;
            }
        }
        if let Some(p) = progress {
            p.update(index + 1);
        }
    }

    Ok(sums
        .into_iter()
        .filter(|(_, (size, _))| *size >= min_size)
        .map(|(label, (size, sum))| RoiCentroid {
            label,
            size,
            centroid: Point3::from(sum / size as f64),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::DataType;
    use crate::grid::Grid3;

    fn volume_with(dims: [usize; 3], on: &[[usize; 3]]) -> Volume {
        let mut volume = Volume::new("blobs", Grid3::unit(dims).unwrap());
        let indices: Vec<usize> = on.iter().map(|v| volume.grid().index_of(*v)).collect();
        let column = volume.add_column("mask", DataType::UInt8);
        for index in indices {
            column.set(index, 1.0);
        }
        volume
    }

    #[test]
    fn test_diagonal_voxels_are_separate_blobs() {
        let volume = volume_with([3, 3, 1], &[[0, 0, 0], [1, 1, 0], [2, 1, 0]]);
        let labels = extract_blobs(&volume, "mask", &BlobParams::default(), None).unwrap();
        assert_eq!(labels[[0, 0, 0]], 1);
        assert_eq!(labels[[0, 1, 1]], 2);
        assert_eq!(labels[[0, 1, 2]], 2);
        assert_eq!(labels.iter().filter(|l| **l == 0).count(), 6);
    }

    #[test]
    fn test_small_blobs_are_dropped_and_labels_compacted() {
        // Sizes 1, 3 and 2 in discovery order.
        let volume = volume_with(
            [8, 1, 1],
            &[[0, 0, 0], [2, 0, 0], [3, 0, 0], [4, 0, 0], [6, 0, 0], [7, 0, 0]],
        );
        let params = BlobParams {
            threshold: 0.5,
            min_blob_size: 2,
        };
        let labels = extract_blobs(&volume, "mask", &params, None).unwrap();
        let row: Vec<i32> = labels.iter().copied().collect();
        assert_eq!(row, vec![0, 0, 1, 1, 1, 0, 2, 2]);
    }

    #[test]
    fn test_labels_are_written_as_int32_column() {
        let mut volume = volume_with([2, 2, 2], &[[0, 0, 0], [1, 0, 0]]);
        volume.add_column("labels", DataType::Float32);
        extract_blobs_into(&mut volume, "mask", "labels", &BlobParams::default(), None).unwrap();
        let labels = volume.column("labels").unwrap();
        assert_eq!(labels.data_type(), DataType::Int32);
        assert_eq!(labels.limits(), Some((0.0, 1.0)));
    }

    #[test]
    fn test_maxima_keep_first_of_ties() {
        let mut volume = volume_with([4, 1, 1], &[[0, 0, 0], [1, 0, 0], [3, 0, 0]]);
        let values = volume.add_column("values", DataType::Float64);
        for (index, value) in [2.0, 2.0, 9.0, 1.0].into_iter().enumerate() {
            values.set(index, value);
        }
        let maxima = find_maxima(&volume, "values", Some("mask")).unwrap();
        assert_eq!(maxima.len(), 1);
        assert_eq!(maxima[0].voxel, [0, 0, 0]);
        assert_eq!(maxima[0].value, 2.0);

        let global = find_maxima(&volume, "values", None).unwrap();
        assert_eq!(global[0].label, 1);
        assert_eq!(global[0].voxel, [2, 0, 0]);
        assert_eq!(global[0].point, Point3::new(2.5, 0.5, 0.5));
    }

    #[test]
    fn test_centroids_respect_range_and_min_size() {
        let mut volume = volume_with([6, 1, 1], &[]);
        let labels = volume.add_column("labels", DataType::Float32);
        for (index, value) in [1.0, 1.0, 0.0, 2.2, 3.0, 3.0].into_iter().enumerate() {
            labels.set(index, value);
        }
        let centroids = roi_centroids(&volume, "labels", 1..=2, 1, None).unwrap();
        assert_eq!(centroids.len(), 2);
        assert_eq!(centroids[0].label, 1);
        assert_eq!(centroids[0].size, 2);
        assert!((centroids[0].centroid.x - 1.0).abs() < 1e-12);
        assert_eq!(centroids[1].label, 2);
        assert!((centroids[1].centroid.x - 3.5).abs() < 1e-12);

        let centroids = roi_centroids(&volume, "labels", 0..=3, 2, None).unwrap();
        let kept: Vec<i32> = centroids.iter().map(|c| c.label).collect();
        assert_eq!(kept, vec![1, 3]);
    }

    #[test]
    fn test_missing_column_is_reported() {
        let mut volume = volume_with([2, 2, 2], &[]);
        let err = extract_blobs_into(&mut volume, "absent", "labels", &BlobParams::default(), None)
            .unwrap_err();
        assert!(matches!(err, VolumeError::MissingColumn { .. }));
        assert!(!volume.has_column("labels"));
    }
}
