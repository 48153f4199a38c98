#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Transaction, coordinate and property type definitions.
//!
//! These types are shared by every stage of the prediction pipeline: the
//! transaction sources produce [`Transaction`] rows, the geometry helpers
//! operate on [`Coordinate`] and [`BoundingBox`], and the sampler scopes
//! its queries with a [`DateRange`].

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A WGS-84 position in degrees.
///
/// No range validation is performed; out-of-range values propagate
/// through every computation unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl Coordinate {
    /// Creates a coordinate from latitude and longitude.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Returns the coordinate as an `[x, y]` pair (longitude first), the
    /// layout used by the spatial index.
    #[must_use]
    pub const fn to_xy(self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }
}

/// An axis-aligned box in degree space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Northern edge (maximum latitude).
    pub north: f64,
    /// Southern edge (minimum latitude).
    pub south: f64,
    /// Western edge (minimum longitude).
    pub west: f64,
    /// Eastern edge (maximum longitude).
    pub east: f64,
}

impl BoundingBox {
    /// Whether `coordinate` lies inside the box. Edges are inclusive.
    #[must_use]
    pub fn contains(&self, coordinate: Coordinate) -> bool {
        (self.south..=self.north).contains(&coordinate.latitude)
            && (self.west..=self.east).contains(&coordinate.longitude)
    }

    /// Height of the box in degrees of latitude.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Width of the box in degrees of longitude.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.east - self.west
    }
}

/// Property type as recorded in the Land Registry Price Paid data.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum PropertyType {
    /// Detached house.
    #[serde(rename = "D", alias = "detached")]
    #[strum(to_string = "D", serialize = "detached")]
    Detached,
    /// Semi-detached house.
    #[serde(rename = "S", alias = "semi_detached")]
    #[strum(to_string = "S", serialize = "semi_detached", serialize = "semi-detached")]
    SemiDetached,
    /// Terraced house.
    #[serde(rename = "T", alias = "terraced")]
    #[strum(to_string = "T", serialize = "terraced")]
    Terraced,
    /// Flat or maisonette.
    #[serde(rename = "F", alias = "flat")]
    #[strum(to_string = "F", serialize = "flat")]
    Flat,
    /// Anything else (commercial, garages, ...).
    #[serde(rename = "O", alias = "other")]
    #[strum(to_string = "O", serialize = "other")]
    Other,
}

impl PropertyType {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Detached,
            Self::SemiDetached,
            Self::Terraced,
            Self::Flat,
            Self::Other,
        ]
    }

    /// Human-readable name.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Detached => "detached",
            Self::SemiDetached => "semi-detached",
            Self::Terraced => "terraced",
            Self::Flat => "flat",
            Self::Other => "other",
        }
    }
}

/// An inclusive range of transfer dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First date included.
    pub start: NaiveDate,
    /// Last date included.
    pub end: NaiveDate,
}

impl DateRange {
    /// Builds the range `[date - half_window_days, date + half_window_days]`.
    ///
    /// Saturates at the representable date bounds instead of overflowing.
    #[must_use]
    pub fn around(date: NaiveDate, half_window_days: u64) -> Self {
        let days = Days::new(half_window_days);
        Self {
            start: date.checked_sub_days(days).unwrap_or(NaiveDate::MIN),
            end: date.checked_add_days(days).unwrap_or(NaiveDate::MAX),
        }
    }

    /// Whether `date` falls within the range.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        (self.start..=self.end).contains(&date)
    }
}

/// A single sale from the transaction source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Identifier unique across the whole transaction source.
    pub unique_id: String,
    /// Sale price in whole pounds.
    pub price: u64,
    /// Date the sale completed.
    pub date_of_transfer: NaiveDate,
    /// Property type of the sold property.
    pub property_type: PropertyType,
    /// Latitude of the property's postcode centroid.
    pub latitude: f64,
    /// Longitude of the property's postcode centroid.
    pub longitude: f64,
    /// Postcode, when known.
    #[serde(default)]
    pub postcode: Option<String>,
}

impl Transaction {
    /// Location of the transaction.
    #[must_use]
    pub const fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}
