mod common;

use common::{CancelAfter, constant_volume, fill_box};
use nalgebra::Point3;
use volume_resample::{
    BlobParams, DataType, ProgressTracker, extract_blobs, extract_blobs_into, find_maxima,
    roi_centroids,
};

fn two_cubes() -> volume_resample::Volume {
    let mut volume = constant_volume([9, 9, 9], "mask", 0.0);
    fill_box(&mut volume, "mask", [1, 1, 1], [4, 4, 4], 1.0);
    fill_box(&mut volume, "mask", [5, 5, 5], [8, 8, 8], 1.0);
    volume
}

fn count(labels: &ndarray::Array3<i32>, label: i32) -> usize {
    labels.iter().filter(|l| **l == label).count()
}

#[test]
fn test_two_disjoint_cubes_get_two_labels() {
    let volume = two_cubes();
    for min_blob_size in [1, 27] {
        let params = BlobParams {
            threshold: 0.0,
            min_blob_size,
        };
        let labels = extract_blobs(&volume, "mask", &params, None).unwrap();
        assert_eq!(count(&labels, 1), 27);
        assert_eq!(count(&labels, 2), 27);
        assert_eq!(count(&labels, 0), 729 - 54);
        // Labels are stored (r, t, s).
        assert_eq!(labels[[2, 2, 2]], 1);
        assert_eq!(labels[[6, 6, 6]], 2);
    }
}

#[test]
fn test_blobs_below_min_size_fold_into_background() {
    let volume = two_cubes();
    let params = BlobParams {
        threshold: 0.0,
        min_blob_size: 28,
    };
    let labels = extract_blobs(&volume, "mask", &params, None).unwrap();
    assert!(labels.iter().all(|l| *l == 0));
}

#[test]
fn test_threshold_is_exclusive() {
    let mut volume = two_cubes();
    fill_box(&mut volume, "mask", [5, 5, 5], [8, 8, 8], 0.5);
    let params = BlobParams {
        threshold: 0.5,
        min_blob_size: 1,
    };
    let labels = extract_blobs(&volume, "mask", &params, None).unwrap();
    assert_eq!(count(&labels, 1), 27);
    assert_eq!(count(&labels, 2), 0);
}

#[test]
fn test_labels_column_replaces_existing() {
    let mut volume = two_cubes();
    volume.add_column("labels", DataType::UInt8);
    let tracker = ProgressTracker::new();
    extract_blobs_into(
        &mut volume,
        "mask",
        "labels",
        &BlobParams::default(),
        Some(&tracker),
    )
    .unwrap();

    let labels = volume.column("labels").unwrap();
    assert_eq!(labels.data_type(), DataType::Int32);
    assert_eq!(labels.limits(), Some((0.0, 2.0)));
    assert_eq!(labels.get_voxel([6, 7, 5]), 2.0);
    // Every voxel is visited exactly once.
    assert_eq!(tracker.range(), (0, 729));
    assert_eq!(tracker.value(), 729);
}

#[test]
fn test_cancellation_writes_no_column() {
    let mut volume = two_cubes();
    for allowed in [0, 40] {
        let progress = CancelAfter::new(allowed);
        let err = extract_blobs_into(
            &mut volume,
            "mask",
            "labels",
            &BlobParams::default(),
            Some(&progress),
        )
        .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(progress.updates(), allowed);
        assert!(!volume.has_column("labels"));
    }
}

#[test]
fn test_maxima_per_blob() {
    let mut volume = two_cubes();
    let mask = volume.column_mut("mask").unwrap();
    mask.set_voxel([2, 3, 1], 5.0);
    mask.set_voxel([7, 5, 6], 4.0);
    extract_blobs_into(&mut volume, "mask", "labels", &BlobParams::default(), None).unwrap();

    let maxima = find_maxima(&volume, "mask", Some("labels")).unwrap();
    assert_eq!(maxima.len(), 2);
    assert_eq!((maxima[0].label, maxima[0].value), (1, 5.0));
    assert_eq!(maxima[0].voxel, [2, 3, 1]);
    assert_eq!(maxima[0].point, Point3::new(2.5, 3.5, 1.5));
    assert_eq!((maxima[1].label, maxima[1].value), (2, 4.0));
    assert_eq!(maxima[1].voxel, [7, 5, 6]);
}

#[test]
fn test_centroids_of_blobs() {
    let mut volume = two_cubes();
    extract_blobs_into(&mut volume, "mask", "labels", &BlobParams::default(), None).unwrap();
    let tracker = ProgressTracker::new();

    let centroids = roi_centroids(&volume, "labels", 1..=2, 27, Some(&tracker)).unwrap();
    assert_eq!(centroids.len(), 2);
    for (centroid, centre) in centroids.iter().zip([2.5, 6.5]) {
        assert_eq!(centroid.size, 27);
        assert!((centroid.centroid - Point3::new(centre, centre, centre)).norm() < 1e-12);
    }
    assert_eq!(tracker.range(), (0, 729));
    assert_eq!(tracker.value(), 729);

    assert!(roi_centroids(&volume, "labels", 1..=2, 28, None).unwrap().is_empty());
    let background = roi_centroids(&volume, "labels", 0..=0, 1, None).unwrap();
    assert_eq!(background[0].size, 729 - 54);
}

#[test]
fn test_centroids_cancelled() {
    let mut volume = two_cubes();
    extract_blobs_into(&mut volume, "mask", "labels", &BlobParams::default(), None).unwrap();
    let progress = CancelAfter::new(100);
    let err = roi_centroids(&volume, "labels", 1..=2, 1, Some(&progress)).unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(progress.updates(), 100);
}
