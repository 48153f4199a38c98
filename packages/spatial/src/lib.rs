#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Geometry helpers for the prediction pipeline.
//!
//! Distances are planar Euclidean distances in degree space, converted to
//! approximate kilometres with a fixed [`KM_PER_DEGREE`] multiplier. This
//! ignores the Earth's curvature and the shrinking of a degree of longitude
//! away from the equator, so it is only reasonable over city-sized areas.
//! Callers rely on that exact convention; do not swap in great-circle
//! distances here.
//!
//! [`CentroidIndex`] stores POI centroids in an arena and indexes them with
//! an R-tree so threshold lookups only visit nearby points.

use geo::Centroid;
use house_price_property_models::{BoundingBox, Coordinate};
use rstar::{AABB, RTree, RTreeObject};

/// Approximate kilometres per degree used by every distance conversion.
pub const KM_PER_DEGREE: f64 = 111.0;

/// Builds a box of `width` x `height` degrees centered on `center`.
#[must_use]
pub fn bounding_box(center: Coordinate, width: f64, height: f64) -> BoundingBox {
    BoundingBox {
        north: center.latitude + height / 2.0,
        south: center.latitude - height / 2.0,
        west: center.longitude - width / 2.0,
        east: center.longitude + width / 2.0,
    }
}

/// Planar distance between two coordinates, in degrees.
#[must_use]
pub fn distance(a: Coordinate, b: Coordinate) -> f64 {
    (a.latitude - b.latitude).hypot(a.longitude - b.longitude)
}

/// [`distance`] scaled by [`KM_PER_DEGREE`].
#[must_use]
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    distance(a, b) * KM_PER_DEGREE
}

/// Converts kilometres back to degrees under the same convention.
#[must_use]
pub fn km_to_degrees(km: f64) -> f64 {
    km / KM_PER_DEGREE
}

/// Padding added to index lookups so that points sitting exactly on the
/// threshold are decided by [`distance_km`] alone.
const ENVELOPE_PADDING_DEG: f64 = 1e-9;

/// A centroid stored in the R-tree, pointing back into the arena.
struct CentroidEntry {
    index: usize,
    point: [f64; 2],
}

impl RTreeObject for CentroidEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

/// Arena of centroids with an R-tree over their positions.
pub struct CentroidIndex {
    centroids: Vec<Coordinate>,
    tree: RTree<CentroidEntry>,
}

impl CentroidIndex {
    /// Indexes the given coordinates in order.
    #[must_use]
    pub fn from_coordinates(centroids: Vec<Coordinate>) -> Self {
        let entries = centroids
            .iter()
            .enumerate()
            .map(|(index, c)| CentroidEntry {
                index,
                point: c.to_xy(),
            })
            .collect();

        Self {
            centroids,
            tree: RTree::bulk_load(entries),
        }
    }

    /// Indexes the centroid of every geometry that has one.
    ///
    /// Empty geometries (which have no centroid) are skipped.
    #[must_use]
    pub fn from_geometries<'a>(geometries: impl IntoIterator<Item = &'a geo::Geometry<f64>>) -> Self {
        let mut skipped = 0usize;
        let centroids = geometries
            .into_iter()
            .filter_map(|geometry| {
                let centroid = geometry.centroid();
                if centroid.is_none() {
                    skipped += 1;
                }
                centroid.map(|p| Coordinate::new(p.y(), p.x()))
            })
            .collect();

        if skipped > 0 {
            log::debug!("Skipped {skipped} geometries without a centroid");
        }

        Self::from_coordinates(centroids)
    }

    /// Number of indexed centroids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.centroids.len()
    }

    /// Whether the index holds no centroids.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }

    /// The indexed centroids, in insertion order.
    #[must_use]
    pub fn centroids(&self) -> &[Coordinate] {
        &self.centroids
    }

    /// Distances in kilometres from `center` to every centroid whose
    /// distance is at most `threshold_km`, in arena order.
    #[must_use]
    pub fn distances_within_km(&self, center: Coordinate, threshold_km: f64) -> Vec<f64> {
        let radius = km_to_degrees(threshold_km) + ENVELOPE_PADDING_DEG;
        let [x, y] = center.to_xy();
        let query_env = AABB::from_corners([x - radius, y - radius], [x + radius, y + radius]);

        let mut hits: Vec<(usize, f64)> = self
            .tree
            .locate_in_envelope_intersecting(&query_env)
            .map(|entry| (entry.index, distance_km(center, self.centroids[entry.index])))
            .filter(|(_, d)| *d <= threshold_km)
            .collect();
        hits.sort_unstable_by_key(|(index, _)| *index);

        hits.into_iter().map(|(_, d)| d).collect()
    }
}
