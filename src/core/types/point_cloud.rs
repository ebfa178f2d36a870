//! 3D point cloud type.

use nalgebra::{Point3, Vector3};

use super::pose::Transform3D;

/// Unordered set of 3D points with optional per-point intensity.
///
/// When intensities are present they are kept index-aligned with `points`
/// through every filtering and transform operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud3D {
    /// Points in meters
    pub points: Vec<Point3<f32>>,
    /// Optional intensities, same length as `points`
    pub intensities: Option<Vec<f32>>,
}

impl PointCloud3D {
    /// Create an empty cloud.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cloud with preallocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
            intensities: None,
        }
    }

    /// Create from points without intensity.
    pub fn from_points(points: Vec<Point3<f32>>) -> Self {
        Self {
            points,
            intensities: None,
        }
    }

    /// Add a point.
    ///
    /// If the cloud carries intensities, the point gets intensity 0.
    #[inline]
    pub fn push(&mut self, point: Point3<f32>) {
        self.points.push(point);
        if let Some(intensities) = &mut self.intensities {
            intensities.push(0.0);
        }
    }

    /// Add a point with intensity.
    pub fn push_with_intensity(&mut self, point: Point3<f32>, intensity: f32) {
        let len = self.points.len();
        let intensities = self.intensities.get_or_insert_with(|| vec![0.0; len]);
        intensities.push(intensity);
        self.points.push(point);
    }

    /// Number of points.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Remove all points.
    pub fn clear(&mut self) {
        self.points.clear();
        self.intensities = None;
    }

    /// Iterate over points.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Point3<f32>> + '_ {
        self.points.iter()
    }

    /// Intensity of the point at `index`, if intensities are present.
    #[inline]
    pub fn intensity_at(&self, index: usize) -> Option<f32> {
        self.intensities.as_ref().and_then(|i| i.get(index).copied())
    }

    /// Copy of the cloud keeping only points for which `keep` returns true.
    pub fn filtered<F>(&self, mut keep: F) -> PointCloud3D
    where
        F: FnMut(&Point3<f32>) -> bool,
    {
        let mut points = Vec::with_capacity(self.points.len());
        let mut intensities = self
            .intensities
            .as_ref()
            .map(|_| Vec::with_capacity(self.points.len()));

        for (i, p) in self.points.iter().enumerate() {
            if keep(p) {
                points.push(*p);
                if let (Some(out), Some(src)) = (&mut intensities, &self.intensities) {
                    out.push(src[i]);
                }
            }
        }

        PointCloud3D {
            points,
            intensities,
        }
    }

    /// Transform every point by a rigid transform.
    pub fn transform(&self, transform: &Transform3D) -> PointCloud3D {
        PointCloud3D {
            points: self.points.iter().map(|p| transform * p).collect(),
            intensities: self.intensities.clone(),
        }
    }

    /// Append another cloud.
    pub fn extend(&mut self, other: &PointCloud3D) {
        if self.intensities.is_some() || other.intensities.is_some() {
            let existing = self.points.len();
            let mine = self
                .intensities
                .get_or_insert_with(|| vec![0.0; existing]);
            match &other.intensities {
                Some(theirs) => mine.extend_from_slice(theirs),
                None => mine.extend(std::iter::repeat_n(0.0, other.len())),
            }
        }
        self.points.extend_from_slice(&other.points);
    }

    /// Centroid of all points.
    pub fn centroid(&self) -> Option<Point3<f32>> {
        if self.points.is_empty() {
            return None;
        }
        let sum: Vector3<f32> = self.points.iter().map(|p| p.coords).sum();
        Some(Point3::from(sum / self.points.len() as f32))
    }

    /// Axis-aligned bounds as (min, max).
    pub fn bounds(&self) -> Option<(Point3<f32>, Point3<f32>)> {
        let first = self.points.first()?;
        let (mut min, mut max) = (*first, *first);
        for p in &self.points[1..] {
            min = min.inf(p);
            max = max.sup(p);
        }
        Some((min, max))
    }
}

impl FromIterator<Point3<f32>> for PointCloud3D {
    fn from_iter<I: IntoIterator<Item = Point3<f32>>>(iter: I) -> Self {
        Self::from_points(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Translation3, UnitQuaternion};

    #[test]
    fn test_filtered_keeps_intensities_aligned() {
        let mut cloud = PointCloud3D::new();
        cloud.push_with_intensity(Point3::new(1.0, 0.0, 0.0), 10.0);
        cloud.push_with_intensity(Point3::new(5.0, 0.0, 0.0), 50.0);
        cloud.push_with_intensity(Point3::new(2.0, 0.0, 0.0), 20.0);

        let near = cloud.filtered(|p| p.x < 3.0);

        assert_eq!(near.len(), 2);
        assert_eq!(near.intensity_at(0), Some(10.0));
        assert_eq!(near.intensity_at(1), Some(20.0));
    }

    #[test]
    fn test_transform() {
        let cloud: PointCloud3D = vec![Point3::new(1.0, 0.0, 0.0)].into_iter().collect();
        let iso = Transform3D::from_parts(
            Translation3::new(0.0, 0.0, 1.0),
            UnitQuaternion::from_euler_angles(0.0, 0.0, std::f32::consts::FRAC_PI_2),
        );
        let moved = cloud.transform(&iso);

        assert_relative_eq!(moved.points[0], Point3::new(0.0, 1.0, 1.0), epsilon = 1e-6);
    }

    #[test]
    fn test_extend_mixed_intensity() {
        let mut a: PointCloud3D = vec![Point3::origin()].into_iter().collect();
        let mut b = PointCloud3D::new();
        b.push_with_intensity(Point3::new(1.0, 1.0, 1.0), 7.0);

        a.extend(&b);

        assert_eq!(a.len(), 2);
        assert_eq!(a.intensity_at(0), Some(0.0));
        assert_eq!(a.intensity_at(1), Some(7.0));
    }

    #[test]
    fn test_centroid_and_bounds() {
        let cloud: PointCloud3D = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 4.0, -2.0)]
            .into_iter()
            .collect();

        assert_relative_eq!(cloud.centroid().unwrap(), Point3::new(1.0, 2.0, -1.0));
        let (min, max) = cloud.bounds().unwrap();
        assert_relative_eq!(min, Point3::new(0.0, 0.0, -2.0));
        assert_relative_eq!(max, Point3::new(2.0, 4.0, 0.0));
        assert!(PointCloud3D::new().centroid().is_none());
    }
}
