use std::sync::Arc;

use volume_resample::{
    BlobParams, DataType, Grid3, GridGeometry, ProgressTracker, ResampleMethod, ResampleParams,
    SmoothingParams, Volume, Worker, extract_blobs_into, find_maxima, map_volume_to_volume,
    roi_centroids, smooth_gaussian,
};

/// Builds a 32³ volume holding two bright spheres on a dark background.
fn phantom() -> Volume {
    let grid = Grid3::new([32, 32, 32], [64.0, 64.0, 64.0]).expect("should have built grid");
    let mut volume = Volume::new("phantom", grid);
    let midpoints: Vec<_> = (0..volume.grid().voxel_count())
        .map(|i| volume.grid().midpoint_at(i))
        .collect();
    let column = volume.add_column("intensity", DataType::Float32);
    for (index, p) in midpoints.iter().enumerate() {
        let a = ((p.x - 20.0).powi(2) + (p.y - 20.0).powi(2) + (p.z - 32.0).powi(2)).sqrt();
        let b = ((p.x - 44.0).powi(2) + (p.y - 44.0).powi(2) + (p.z - 32.0).powi(2)).sqrt();
        if a < 8.0 || b < 6.0 {
            column.set(index, 100.0);
        }
    }
    volume
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let worker = Worker::new();
    let progress = Arc::new(ProgressTracker::new());

    let job_progress = progress.clone();
    let volume = worker
        .post(move || {
            let mut volume = phantom();
            smooth_gaussian(
                &mut volume,
                "intensity",
                "smoothed",
                &SmoothingParams::default(),
                Some(job_progress.as_ref()),
            )?;
            extract_blobs_into(
                &mut volume,
                "intensity",
                "blobs",
                &BlobParams {
                    threshold: 50.0,
                    min_blob_size: 10,
                },
                Some(job_progress.as_ref()),
            )?;
            Ok(volume)
        })
        .await
        .expect("should have smoothed and labelled the phantom");

    let blobs = volume.column("blobs").and_then(|c| c.limits());
    log::info!("Blob label range: {blobs:?}");
    let centroids = roi_centroids(&volume, "blobs", 1..=i32::MAX, 1, None)
        .expect("should have found blob centroids");
    let maxima = find_maxima(&volume, "smoothed", Some("blobs"))
        .expect("should have found blob maxima");
    for (centroid, peak) in centroids.iter().zip(&maxima) {
        log::info!(
            "Blob {}: {} voxels, centroid {:?}, peak {:.1} at {:?}",
            centroid.label,
            centroid.size,
            centroid.centroid,
            peak.value,
            peak.point
        );
    }

    let job_progress = progress.clone();
    let target = worker
        .post(move || {
            let grid = Grid3::new([48, 48, 48], [64.0, 64.0, 64.0])?;
            let mut target = Volume::new("resampled", grid);
            target.add_column("smoothed", DataType::Float32);
            let params = ResampleParams::new(ResampleMethod::Tricubic, 0.0);
            map_volume_to_volume(
                &volume,
                &mut target,
                "smoothed",
                "smoothed",
                &params,
                Some(job_progress.as_ref()),
            )?;
            Ok(target)
        })
        .await
        .expect("should have resampled the smoothed phantom");

    let range = target.column("smoothed").and_then(|c| c.value_range());
    log::info!(
        "Resampled '{}' to {:?} voxels, value range {:?} ({:.0}% of last job)",
        target.name(),
        target.grid().dims(),
        range,
        progress.fraction() * 100.0
    );
}
