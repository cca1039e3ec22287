//! Summary statistics over a page of property records.
//!
//! Sums run on exact decimals; the float conversion happens once, when the
//! result struct is built. Metrics are always computed over exactly the
//! page handed in, never the owner's full collection.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;

use crate::models::property::Property;
use crate::models::stats::PropertyStats;

/// Compute aggregate metrics for one page of properties.
pub fn aggregate(properties: &[Property]) -> PropertyStats {
    let mut total_area = Decimal::ZERO;
    let mut total_perimeter = Decimal::ZERO;
    let mut positive_areas: Vec<Decimal> = Vec::new();
    let mut type_distribution: HashMap<String, u64> = HashMap::new();

    for property in properties {
        total_area += property.area;
        total_perimeter += property.perimeter;
        if property.area > Decimal::ZERO {
            positive_areas.push(property.area);
        }
        *type_distribution
            .entry(property.kind.as_str().to_string())
            .or_insert(0) += 1;
    }

    let count = properties.len();
    let average_area = if count == 0 {
        Decimal::ZERO
    } else {
        total_area / Decimal::from(count as u64)
    };
    let largest = positive_areas.iter().copied().max().unwrap_or(Decimal::ZERO);
    let smallest = positive_areas.iter().copied().min().unwrap_or(Decimal::ZERO);

    PropertyStats {
        total_properties: count,
        total_area: total_area.to_f64().unwrap_or(0.0),
        total_perimeter: total_perimeter.to_f64().unwrap_or(0.0),
        average_area: average_area.to_f64().unwrap_or(0.0),
        largest_property: largest.to_f64().unwrap_or(0.0),
        smallest_property: smallest.to_f64().unwrap_or(0.0),
        type_distribution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::property::{AnalysisStatus, PropertyKind};
    use chrono::Utc;

    fn property(area: &str, perimeter: &str, kind: PropertyKind) -> Property {
        Property {
            owner_id: "owner-a".into(),
            property_id: "prop_0123456789ab".into(),
            name: "Test".into(),
            kind,
            description: String::new(),
            area: area.parse().unwrap(),
            perimeter: perimeter.parse().unwrap(),
            coordinates: Vec::new(),
            analysis_status: AnalysisStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn aggregates_a_two_record_page() {
        let page = vec![
            property("10", "40", PropertyKind::Farm),
            property("30", "60", PropertyKind::Ranchette),
        ];
        let stats = aggregate(&page);

        assert_eq!(stats.total_properties, 2);
        assert_eq!(stats.total_area, 40.0);
        assert_eq!(stats.total_perimeter, 100.0);
        assert_eq!(stats.average_area, 20.0);
        assert_eq!(stats.largest_property, 30.0);
        assert_eq!(stats.smallest_property, 10.0);
        assert_eq!(stats.type_distribution.get("farm"), Some(&1));
        assert_eq!(stats.type_distribution.get("ranchette"), Some(&1));
    }

    #[test]
    fn an_empty_page_yields_zeroes() {
        let stats = aggregate(&[]);
        assert_eq!(stats.total_properties, 0);
        assert_eq!(stats.average_area, 0.0);
        assert_eq!(stats.largest_property, 0.0);
        assert_eq!(stats.smallest_property, 0.0);
        assert!(stats.type_distribution.is_empty());
    }

    #[test]
    fn sums_stay_exact_across_repeating_fractions() {
        // 0.1 three times is exactly 0.3 in decimal arithmetic.
        let page = vec![
            property("0.1", "1", PropertyKind::Farm),
            property("0.1", "1", PropertyKind::Farm),
            property("0.1", "1", PropertyKind::Farm),
        ];
        let stats = aggregate(&page);
        assert_eq!(stats.total_area, 0.3);
        assert_eq!(stats.average_area, 0.1);
    }

    #[test]
    fn kind_counts_cover_every_record_on_the_page() {
        let page = vec![
            property("5", "10", PropertyKind::Farm),
            property("6", "10", PropertyKind::Farm),
            property("7", "10", PropertyKind::VacantLot),
        ];
        let stats = aggregate(&page);
        assert_eq!(stats.type_distribution.get("farm"), Some(&2));
        assert_eq!(stats.type_distribution.get("vacant_lot"), Some(&1));
    }
}
