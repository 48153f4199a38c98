//! Sources that answer queries from data held in memory.
//!
//! The file-backed sources load into these, and tests build them
//! directly.

use std::collections::BTreeMap;

use geo::Centroid;
use house_price_features_models::FeatureSpec;
use house_price_property_models::{BoundingBox, Coordinate, DateRange, PropertyType, Transaction};

use crate::{PoiSource, SourceError, TransactionSource};

/// A [`TransactionSource`] over a fixed list of transactions.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransactionSource {
    transactions: Vec<Transaction>,
}

impl InMemoryTransactionSource {
    /// Wraps the given transactions.
    #[must_use]
    pub const fn new(transactions: Vec<Transaction>) -> Self {
        Self { transactions }
    }

    /// All transactions held by the source.
    #[must_use]
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Number of transactions held by the source.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Whether the source holds no transactions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

impl TransactionSource for InMemoryTransactionSource {
    fn query(
        &self,
        bbox: &BoundingBox,
        dates: &DateRange,
        property_type: Option<PropertyType>,
    ) -> Result<Vec<Transaction>, SourceError> {
        Ok(self
            .transactions
            .iter()
            .filter(|t| bbox.contains(t.coordinate()))
            .filter(|t| dates.contains(t.date_of_transfer))
            .filter(|t| property_type.is_none_or(|ty| t.property_type == ty))
            .cloned()
            .collect())
    }
}

/// A geometry with its OSM-style tags.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedGeometry {
    /// Tag key/value pairs (e.g. `amenity = school`).
    pub tags: BTreeMap<String, String>,
    /// The geometry itself.
    pub geometry: geo::Geometry<f64>,
}

impl TaggedGeometry {
    /// Convenience constructor for a tagged point.
    #[must_use]
    pub fn point(coordinate: Coordinate, tags: &[(&str, &str)]) -> Self {
        Self {
            tags: tags
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            geometry: geo::Geometry::Point(geo::Point::new(
                coordinate.longitude,
                coordinate.latitude,
            )),
        }
    }

    fn centroid(&self) -> Option<Coordinate> {
        self.geometry
            .centroid()
            .map(|p| Coordinate::new(p.y(), p.x()))
    }
}

/// A [`PoiSource`] over a fixed list of tagged geometries.
///
/// A geometry is inside a query box when its centroid is.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPoiSource {
    pois: Vec<TaggedGeometry>,
}

impl InMemoryPoiSource {
    /// Wraps the given geometries.
    #[must_use]
    pub const fn new(pois: Vec<TaggedGeometry>) -> Self {
        Self { pois }
    }

    /// Number of geometries held by the source.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pois.len()
    }

    /// Whether the source holds no geometries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pois.is_empty()
    }
}

impl PoiSource for InMemoryPoiSource {
    fn query(
        &self,
        bbox: &BoundingBox,
        spec: &FeatureSpec,
    ) -> Result<Vec<geo::Geometry<f64>>, SourceError> {
        Ok(self
            .pois
            .iter()
            .filter(|poi| spec.matches_tags(|key| poi.tags.get(key).map(String::as_str)))
            .filter(|poi| poi.centroid().is_some_and(|c| bbox.contains(c)))
            .map(|poi| poi.geometry.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use house_price_features_models::{AggregationMethod, TagFilter};

    use super::*;

    fn transaction(id: &str, lat: f64, lon: f64, day: u32, ty: PropertyType) -> Transaction {
        Transaction {
            unique_id: id.to_string(),
            price: 100_000,
            date_of_transfer: NaiveDate::from_ymd_opt(2021, 3, day).unwrap(),
            property_type: ty,
            latitude: lat,
            longitude: lon,
            postcode: None,
        }
    }

    fn bbox() -> BoundingBox {
        BoundingBox {
            north: 1.0,
            south: -1.0,
            west: -1.0,
            east: 1.0,
        }
    }

    #[test]
    fn transaction_query_filters_box_dates_and_type() {
        let source = InMemoryTransactionSource::new(vec![
            transaction("a", 0.0, 0.0, 10, PropertyType::Flat),
            transaction("b", 0.5, 0.5, 10, PropertyType::Detached),
            transaction("c", 2.0, 0.0, 10, PropertyType::Flat),
            transaction("d", 0.0, 0.0, 28, PropertyType::Flat),
        ]);
        let dates = DateRange::around(NaiveDate::from_ymd_opt(2021, 3, 10).unwrap(), 5);

        let all = source.query(&bbox(), &dates, None).unwrap();
        let ids: Vec<&str> = all.iter().map(|t| t.unique_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let flats = source
            .query(&bbox(), &dates, Some(PropertyType::Flat))
            .unwrap();
        assert_eq!(flats.len(), 1);
        assert_eq!(flats[0].unique_id, "a");
    }

    #[test]
    fn poi_query_filters_tags_and_box() {
        let source = InMemoryPoiSource::new(vec![
            TaggedGeometry::point(Coordinate::new(0.1, 0.1), &[("amenity", "school")]),
            TaggedGeometry::point(Coordinate::new(0.2, 0.2), &[("amenity", "pub")]),
            TaggedGeometry::point(Coordinate::new(5.0, 5.0), &[("amenity", "school")]),
        ]);
        let spec = FeatureSpec {
            name: "school".to_string(),
            tags: [("amenity".to_string(), TagFilter::Value("school".to_string()))]
                .into_iter()
                .collect(),
            methods: vec![AggregationMethod::Count],
        };

        let found = source.query(&bbox(), &spec).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(
            found[0],
            geo::Geometry::Point(geo::Point::new(0.1, 0.1))
        );
    }
}
