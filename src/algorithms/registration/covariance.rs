//! Point clouds annotated with local surface covariances.
//!
//! Each point gets the covariance of its k nearest neighbours, regularized
//! to a plane: the eigenvalue along the surface normal is replaced by
//! [`PLANE_EPSILON`] and the two in-plane eigenvalues by 1. This is what
//! turns GICP into a plane-to-plane method and makes the covariance of a
//! point independent of the local sampling density.

use nalgebra::{Matrix3, Point3, Vector3};
use rayon::prelude::*;
use rstar::RTree;
use rstar::primitives::GeomWithData;

use crate::core::math::smallest_eigenvector;
use crate::core::types::{PointCloud3D, Transform3D};

/// Eigenvalue assigned along the surface normal.
pub const PLANE_EPSILON: f32 = 1e-3;

/// Fewest neighbours for which a covariance is estimated.
const MIN_NEIGHBORS: usize = 3;

/// R-tree entry: coordinates plus index into the cloud.
pub type IndexedPoint = GeomWithData<[f32; 3], usize>;

/// Points with normals, regularized covariances and a spatial index.
#[derive(Debug, Clone)]
pub struct CovarianceCloud {
    points: Vec<Point3<f32>>,
    covariances: Vec<Matrix3<f32>>,
    normals: Vec<Vector3<f32>>,
    nn_distances: Vec<f32>,
    tree: RTree<IndexedPoint>,
}

impl CovarianceCloud {
    /// Estimate covariances of a sweep from its `k` nearest neighbours.
    pub fn from_cloud(cloud: &PointCloud3D, k: usize) -> Self {
        Self::from_points(cloud.points.clone(), k)
    }

    /// Estimate covariances of bare points from their `k` nearest neighbours.
    pub fn from_points(points: Vec<Point3<f32>>, k: usize) -> Self {
        let tree = build_tree(&points);
        let k = k.max(MIN_NEIGHBORS);

        let estimates: Vec<(Matrix3<f32>, Vector3<f32>, f32)> = points
            .par_iter()
            .map(|p| estimate_local(&tree, p, k))
            .collect();

        let mut covariances = Vec::with_capacity(points.len());
        let mut normals = Vec::with_capacity(points.len());
        let mut nn_distances = Vec::with_capacity(points.len());
        for (cov, normal, nn) in estimates {
            covariances.push(cov);
            normals.push(normal);
            nn_distances.push(nn);
        }

        Self {
            points,
            covariances,
            normals,
            nn_distances,
            tree,
        }
    }

    /// Assemble from already-estimated parts (e.g. concatenated keyframes).
    ///
    /// Nearest-neighbour distances are not available on assembled clouds.
    pub fn from_parts(
        points: Vec<Point3<f32>>,
        covariances: Vec<Matrix3<f32>>,
        normals: Vec<Vector3<f32>>,
    ) -> Self {
        debug_assert_eq!(points.len(), covariances.len());
        debug_assert_eq!(points.len(), normals.len());
        let tree = build_tree(&points);
        Self {
            points,
            covariances,
            normals,
            nn_distances: Vec::new(),
            tree,
        }
    }

    /// Points, covariances and normals moved into another frame.
    ///
    /// Covariances rotate as `R C Rᵀ`.
    pub fn transformed_parts(
        &self,
        transform: &Transform3D,
    ) -> (Vec<Point3<f32>>, Vec<Matrix3<f32>>, Vec<Vector3<f32>>) {
        let r = transform.rotation.to_rotation_matrix().into_inner();
        let rt = r.transpose();
        let points = self.points.iter().map(|p| transform * p).collect();
        let covariances = self.covariances.iter().map(|c| r * c * rt).collect();
        let normals = self.normals.iter().map(|n| r * n).collect();
        (points, covariances, normals)
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points.
    pub fn points(&self) -> &[Point3<f32>] {
        &self.points
    }

    /// Regularized covariances, index-aligned with `points`.
    pub fn covariances(&self) -> &[Matrix3<f32>] {
        &self.covariances
    }

    /// Unit surface normals (zero where too few neighbours were found).
    pub fn normals(&self) -> &[Vector3<f32>] {
        &self.normals
    }

    /// Distance from each point to its nearest other point.
    ///
    /// Empty for clouds built with [`CovarianceCloud::from_parts`].
    pub fn nn_distances(&self) -> &[f32] {
        &self.nn_distances
    }

    /// Nearest point to `query` as (index, squared distance).
    #[inline]
    pub fn nearest(&self, query: &Point3<f32>) -> Option<(usize, f32)> {
        self.tree
            .nearest_neighbor_iter_with_distance_2(&[query.x, query.y, query.z])
            .next()
            .map(|(entry, d2)| (entry.data, d2))
    }

    /// Copy of the bare points as a sweep.
    pub fn to_point_cloud(&self) -> PointCloud3D {
        PointCloud3D::from_points(self.points.clone())
    }
}

fn build_tree(points: &[Point3<f32>]) -> RTree<IndexedPoint> {
    let entries = points
        .iter()
        .enumerate()
        .map(|(i, p)| GeomWithData::new([p.x, p.y, p.z], i))
        .collect();
    RTree::bulk_load(entries)
}

/// Plane-regularized covariance, normal and nearest-neighbour distance of one point.
fn estimate_local(
    tree: &RTree<IndexedPoint>,
    p: &Point3<f32>,
    k: usize,
) -> (Matrix3<f32>, Vector3<f32>, f32) {
    let neighbors: Vec<([f32; 3], f32)> = tree
        .nearest_neighbor_iter_with_distance_2(&[p.x, p.y, p.z])
        .take(k)
        .map(|(entry, d2)| (*entry.geom(), d2))
        .collect();

    // First hit is the point itself (or an exact duplicate)
    let nn = neighbors.get(1).map(|(_, d2)| d2.sqrt()).unwrap_or(0.0);

    if neighbors.len() < MIN_NEIGHBORS {
        return (Matrix3::identity(), Vector3::zeros(), nn);
    }

    let n = neighbors.len() as f32;
    let mean: Vector3<f32> = neighbors
        .iter()
        .map(|(q, _)| Vector3::new(q[0], q[1], q[2]))
        .sum::<Vector3<f32>>()
        / n;
    let mut cov = Matrix3::zeros();
    for (q, _) in &neighbors {
        let d = Vector3::new(q[0], q[1], q[2]) - mean;
        cov += d * d.transpose();
    }
    cov /= n;

    let (normal, _) = smallest_eigenvector(&cov);
    let regularized = Matrix3::identity() - normal * normal.transpose() * (1.0 - PLANE_EPSILON);
    (regularized, normal, nn)
}
