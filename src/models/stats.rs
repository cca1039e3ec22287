//! Summary statistics derived from a single page of property records.

use serde::Serialize;
use std::collections::HashMap;

/// Aggregate metrics over one page of listed properties.
///
/// Statistics are always page-local: a caller requesting page 2 gets
/// page-2-only numbers, never totals over the owner's full collection.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PropertyStats {
    /// Number of records on the page.
    pub total_properties: usize,

    /// Sum of areas, computed exactly and converted to float for output.
    pub total_area: f64,

    /// Sum of perimeters, computed the same way.
    pub total_perimeter: f64,

    /// Mean area over the page; zero when the page is empty.
    pub average_area: f64,

    /// Largest strictly-positive area on the page; zero when none exists.
    pub largest_property: f64,

    /// Smallest strictly-positive area on the page; zero when none exists.
    pub smallest_property: f64,

    /// Count of records per property kind.
    pub type_distribution: HashMap<String, u64>,
}
