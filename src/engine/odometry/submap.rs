//! Local submap assembly.
//!
//! The submap is the union of a few selected keyframes moved into the world
//! frame. Selection mixes three independent strategies:
//!
//! - **k-NN**: keyframes nearest to the query position
//! - **Convex hull**: vertices of the XY convex hull of nearby keyframes
//! - **Concave hull**: vertices of the XY alpha-shape of nearby keyframes
//!
//! The hull strategies pull in peripheral keyframes, which a pure k-NN query
//! tends to miss in densely revisited areas. The submap is rebuilt only when
//! the selected index set changes.

use std::collections::BTreeSet;

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

use super::keyframe::Keyframe;
use crate::algorithms::hull::{concave_hull_xy, convex_hull_xy};
use crate::algorithms::registration::CovarianceCloud;
use crate::core::types::PointCloud3D;
use crate::sensors::preprocessing::{VoxelConfig, VoxelDownsampler};

/// Hull selections fall back to all candidates at or below these sizes.
const CONVEX_MIN_CANDIDATES: usize = 3;
const CONCAVE_MIN_CANDIDATES: usize = 5;

/// Submap selection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmapConfig {
    /// Nearest keyframes to include.
    pub knn: usize,

    /// Convex hull keyframes to include.
    pub kcv: usize,

    /// Concave hull keyframes to include.
    pub kcc: usize,

    /// Alpha-shape radius for the concave hull (meters). Boundary edges
    /// are at most `2 * concave_alpha` long, so this must exceed half the
    /// keyframe spacing.
    pub concave_alpha: f32,

    /// Hull selectors only consider keyframes within this distance of the
    /// query (meters, 0 = all keyframes).
    pub hull_candidate_radius: f32,

    /// Optional downsampling of the assembled submap.
    pub voxel: VoxelConfig,
}

impl Default for SubmapConfig {
    fn default() -> Self {
        Self {
            knn: 10,
            kcv: 10,
            kcc: 10,
            concave_alpha: 2.0,
            hull_candidate_radius: 30.0,
            voxel: VoxelConfig {
                enabled: false,
                resolution: 0.25,
            },
        }
    }
}

// ============================================================================
// Selectors
// ============================================================================

/// Indices of the `k` positions nearest to `query`, nearest first.
pub fn select_knn(positions: &[Point3<f32>], query: &Point3<f32>, k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..positions.len()).collect();
    order.sort_by(|&a, &b| {
        let da = (positions[a] - query).norm_squared();
        let db = (positions[b] - query).norm_squared();
        da.total_cmp(&db)
    });
    order.truncate(k);
    order
}

/// Up to `k` convex hull keyframes, nearest to `query` first.
pub fn select_convex(
    positions: &[Point3<f32>],
    query: &Point3<f32>,
    k: usize,
    candidate_radius: f32,
) -> Vec<usize> {
    select_on_hull(positions, query, k, candidate_radius, CONVEX_MIN_CANDIDATES, |xy| {
        convex_hull_xy(xy)
    })
}

/// Up to `k` concave hull keyframes, nearest to `query` first.
pub fn select_concave(
    positions: &[Point3<f32>],
    query: &Point3<f32>,
    k: usize,
    candidate_radius: f32,
    alpha: f32,
) -> Vec<usize> {
    select_on_hull(positions, query, k, candidate_radius, CONCAVE_MIN_CANDIDATES, |xy| {
        concave_hull_xy(xy, alpha)
    })
}

fn select_on_hull<H>(
    positions: &[Point3<f32>],
    query: &Point3<f32>,
    k: usize,
    candidate_radius: f32,
    min_candidates: usize,
    hull: H,
) -> Vec<usize>
where
    H: Fn(&[Point2<f32>]) -> Vec<usize>,
{
    if k == 0 {
        return Vec::new();
    }

    let radius_sq = candidate_radius * candidate_radius;
    let candidates: Vec<usize> = (0..positions.len())
        .filter(|&i| candidate_radius <= 0.0 || (positions[i] - query).norm_squared() <= radius_sq)
        .collect();

    let on_hull: Vec<usize> = if candidates.len() <= min_candidates {
        candidates
    } else {
        let xy: Vec<Point2<f32>> = candidates
            .iter()
            .map(|&i| Point2::new(positions[i].x, positions[i].y))
            .collect();
        hull(&xy).into_iter().map(|j| candidates[j]).collect()
    };

    let hull_positions: Vec<Point3<f32>> = on_hull.iter().map(|&i| positions[i]).collect();
    select_knn(&hull_positions, query, k)
        .into_iter()
        .map(|j| on_hull[j])
        .collect()
}

/// Union of the three selectors, ascending.
pub fn select_keyframes(
    positions: &[Point3<f32>],
    query: &Point3<f32>,
    config: &SubmapConfig,
) -> Vec<usize> {
    let mut selected = BTreeSet::new();
    selected.extend(select_knn(positions, query, config.knn));
    selected.extend(select_convex(
        positions,
        query,
        config.kcv,
        config.hull_candidate_radius,
    ));
    selected.extend(select_concave(
        positions,
        query,
        config.kcc,
        config.hull_candidate_radius,
        config.concave_alpha,
    ));
    selected.into_iter().collect()
}

// ============================================================================
// Submap
// ============================================================================

/// Assembled world-frame submap.
#[derive(Debug, Clone)]
pub struct Submap {
    /// Keyframe indices it was built from, ascending.
    pub keyframes: Vec<usize>,

    /// World-frame points with covariances.
    pub cloud: CovarianceCloud,
}

/// Maintains the current submap.
#[derive(Debug)]
pub struct SubmapBuilder {
    config: SubmapConfig,
    current: Option<Submap>,
    rebuilds: u64,
}

impl SubmapBuilder {
    pub fn new(config: SubmapConfig) -> Self {
        Self {
            config,
            current: None,
            rebuilds: 0,
        }
    }

    pub fn config(&self) -> &SubmapConfig {
        &self.config
    }

    /// Current submap, if any keyframe has been selected.
    pub fn submap(&self) -> Option<&Submap> {
        self.current.as_ref()
    }

    /// How many times the submap has been rebuilt.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }

    /// Select keyframes around `query` and rebuild if the selection changed.
    ///
    /// `k` is the neighbourhood size used when covariances must be
    /// re-estimated after downsampling. Returns true when a rebuild happened.
    pub fn update(&mut self, keyframes: &[Keyframe], query: &Point3<f32>, k: usize) -> bool {
        let positions: Vec<Point3<f32>> = keyframes.iter().map(Keyframe::position).collect();
        let selection = select_keyframes(&positions, query, &self.config);

        if selection.is_empty() {
            self.current = None;
            return false;
        }
        if let Some(current) = &self.current
            && current.keyframes == selection
        {
            return false;
        }

        let cloud = self.assemble(keyframes, &selection, k);
        log::debug!(
            "Submap rebuilt from {} keyframes ({} points)",
            selection.len(),
            cloud.len()
        );
        self.current = Some(Submap {
            keyframes: selection,
            cloud,
        });
        self.rebuilds += 1;
        true
    }

    fn assemble(&self, keyframes: &[Keyframe], selection: &[usize], k: usize) -> CovarianceCloud {
        let total: usize = selection.iter().map(|&i| keyframes[i].cloud.len()).sum();
        let mut points = Vec::with_capacity(total);
        let mut covariances = Vec::with_capacity(total);
        let mut normals = Vec::with_capacity(total);

        for &i in selection {
            let keyframe = &keyframes[i];
            let (p, c, n) = keyframe.cloud.transformed_parts(&keyframe.pose.to_isometry());
            points.extend(p);
            covariances.extend(c);
            normals.extend(n);
        }

        if self.config.voxel.enabled {
            let merged = PointCloud3D::from_points(points);
            let downsampled = VoxelDownsampler::new(self.config.voxel).apply(&merged);
            CovarianceCloud::from_cloud(&downsampled, k)
        } else {
            CovarianceCloud::from_parts(points, covariances, normals)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Pose3D;

    fn keyframe(id: u64, x: f32, y: f32) -> Keyframe {
        let points = (0..20)
            .map(|i| Point3::new((i % 5) as f32 * 0.2, (i / 5) as f32 * 0.2, 0.0))
            .collect();
        Keyframe {
            id,
            pose: Pose3D::from_translation(x, y, 0.0),
            cloud: CovarianceCloud::from_points(points, 5),
            timestamp_us: id,
        }
    }

    fn grid_positions() -> Vec<Point3<f32>> {
        let mut positions = Vec::new();
        for i in 0..5 {
            for j in 0..5 {
                positions.push(Point3::new(i as f32, j as f32, 0.0));
            }
        }
        positions
    }

    #[test]
    fn test_knn_orders_by_distance() {
        let positions: Vec<_> = (0..6).map(|i| Point3::new(i as f32, 0.0, 0.0)).collect();
        let selected = select_knn(&positions, &Point3::new(3.2, 0.0, 0.0), 3);
        assert_eq!(selected, vec![3, 4, 2]);
    }

    #[test]
    fn test_convex_selector_picks_corners() {
        let positions = grid_positions();
        let mut selected = select_convex(&positions, &Point3::new(2.0, 2.0, 0.0), 10, 0.0);
        selected.sort_unstable();
        // Corners of the 5x5 grid
        assert_eq!(selected, vec![0, 4, 20, 24]);
    }

    #[test]
    fn test_concave_selector_stays_on_boundary() {
        let positions = grid_positions();
        let selected = select_concave(&positions, &Point3::new(2.0, 2.0, 0.0), 4, 0.0, 0.75);
        assert_eq!(selected.len(), 4);
        for i in selected {
            let p = positions[i];
            assert!(p.x == 0.0 || p.x == 4.0 || p.y == 0.0 || p.y == 4.0);
        }
    }

    #[test]
    fn test_hull_selectors_use_all_few_candidates() {
        let positions = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
        let mut convex = select_convex(&positions, &Point3::origin(), 5, 0.0);
        convex.sort_unstable();
        assert_eq!(convex, vec![0, 1]);
        assert_eq!(select_concave(&positions, &Point3::origin(), 5, 0.0, 1.0).len(), 2);
    }

    #[test]
    fn test_candidate_radius_limits_hulls() {
        let positions = grid_positions();
        let selected = select_convex(&positions, &Point3::new(0.0, 0.0, 0.0), 10, 1.1);
        // Only (0,0), (0,1), (1,0) are within the radius
        let mut selected = selected;
        selected.sort_unstable();
        assert_eq!(selected, vec![0, 1, 5]);
    }

    #[test]
    fn test_default_concave_selection_on_keyframe_spacing() {
        // L-shaped path with keyframes just over the 1m creation distance
        let step = 1.05;
        let mut positions: Vec<_> = (0..12).map(|i| Point3::new(i as f32 * step, 0.0, 0.0)).collect();
        positions.extend((1..12).map(|j| Point3::new(11.0 * step, j as f32 * step, 0.0)));
        let config = SubmapConfig::default();
        let query = *positions.last().unwrap();

        let concave = select_concave(
            &positions,
            &query,
            config.kcc,
            config.hull_candidate_radius,
            config.concave_alpha,
        );

        assert_eq!(concave.len(), config.kcc);
        assert!(concave.contains(&22));
    }

    #[test]
    fn test_union_deduplicates() {
        let positions = grid_positions();
        let config = SubmapConfig {
            knn: 25,
            ..SubmapConfig::default()
        };
        let selected = select_keyframes(&positions, &Point3::new(2.0, 2.0, 0.0), &config);
        assert_eq!(selected, (0..25).collect::<Vec<_>>());
    }

    #[test]
    fn test_no_keyframes_no_submap() {
        let mut builder = SubmapBuilder::new(SubmapConfig::default());
        assert!(!builder.update(&[], &Point3::origin(), 10));
        assert!(builder.submap().is_none());
        assert_eq!(builder.rebuild_count(), 0);
    }

    #[test]
    fn test_unchanged_selection_is_reused() {
        let keyframes = vec![keyframe(0, 0.0, 0.0), keyframe(1, 1.0, 0.0)];
        let mut builder = SubmapBuilder::new(SubmapConfig::default());

        assert!(builder.update(&keyframes, &Point3::origin(), 10));
        assert!(!builder.update(&keyframes, &Point3::new(0.5, 0.0, 0.0), 10));
        assert_eq!(builder.rebuild_count(), 1);
        assert_eq!(builder.submap().map(|s| s.cloud.len()), Some(40));
    }

    #[test]
    fn test_new_keyframe_triggers_rebuild() {
        let mut keyframes = vec![keyframe(0, 0.0, 0.0)];
        let mut builder = SubmapBuilder::new(SubmapConfig::default());
        builder.update(&keyframes, &Point3::origin(), 10);

        keyframes.push(keyframe(1, 1.0, 0.0));
        assert!(builder.update(&keyframes, &Point3::origin(), 10));
        assert_eq!(builder.rebuild_count(), 2);
        assert_eq!(builder.submap().map(|s| s.keyframes.clone()), Some(vec![0, 1]));
    }

    #[test]
    fn test_submap_points_in_world_frame() {
        let keyframes = vec![keyframe(0, 10.0, 5.0)];
        let mut builder = SubmapBuilder::new(SubmapConfig::default());
        builder.update(&keyframes, &Point3::origin(), 10);

        let submap = builder.submap().unwrap();
        assert!(submap.cloud.points().iter().all(|p| p.x >= 10.0 && p.y >= 5.0));
    }

    #[test]
    fn test_voxel_submap_is_downsampled() {
        let keyframes = vec![keyframe(0, 0.0, 0.0), keyframe(1, 0.0, 0.0)];
        let mut builder = SubmapBuilder::new(SubmapConfig {
            voxel: VoxelConfig {
                enabled: true,
                resolution: 0.1,
            },
            ..SubmapConfig::default()
        });
        builder.update(&keyframes, &Point3::origin(), 5);

        // Two identical keyframes collapse onto one set of voxels
        assert_eq!(builder.submap().map(|s| s.cloud.len()), Some(20));
    }
}
