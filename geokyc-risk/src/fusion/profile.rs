//! Business category profiles
//!
//! What a legitimate site for each declared category looks like from
//! above: its site class, the object classes a detector should find there
//! and the land-use classes the address may carry. Part of the versioned
//! rule set: changing a table here requires a `RULESET_VERSION` bump.

use crate::types::{BusinessCategory, LocationType};

/// Broad kind of site a category operates from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteClass {
    Industrial,
    Commercial,
    Mixed,
}

#[derive(Debug)]
pub struct CategoryProfile {
    pub site_class: SiteClass,
    /// Detector classes consistent with the declared activity
    pub expected_objects: &'static [&'static str],
    pub expected_locations: &'static [LocationType],
}

/// Classes that fit the category but say nothing about who occupies the
/// building (one tower can host hundreds of registered addresses)
pub const SHARED_OCCUPANCY_OBJECTS: &[&str] = &["commercial_tower", "office_tower"];

/// Classes that indicate a dwelling
pub const RESIDENTIAL_OBJECTS: &[&str] = &[
    "house",
    "residential_building",
    "apartment_block",
    "swimming_pool",
    "garden",
];

const LOGISTICS: CategoryProfile = CategoryProfile {
    site_class: SiteClass::Industrial,
    expected_objects: &[
        "warehouse",
        "loading_dock",
        "truck",
        "shipping_container",
        "industrial_building",
    ],
    expected_locations: &[LocationType::Industrial, LocationType::Commercial],
};

const TRANSPORT: CategoryProfile = CategoryProfile {
    site_class: SiteClass::Industrial,
    expected_objects: &[
        "warehouse",
        "truck",
        "bus",
        "vehicle_maintenance",
        "parking_lot",
        "industrial_building",
    ],
    expected_locations: &[LocationType::Industrial, LocationType::Commercial],
};

const MANUFACTURING: CategoryProfile = CategoryProfile {
    site_class: SiteClass::Industrial,
    expected_objects: &[
        "factory",
        "industrial_building",
        "warehouse",
        "chimney",
        "storage_tank",
    ],
    expected_locations: &[LocationType::Industrial],
};

const CONSTRUCTION: CategoryProfile = CategoryProfile {
    site_class: SiteClass::Industrial,
    expected_objects: &[
        "industrial_building",
        "warehouse",
        "construction_equipment",
        "crane",
    ],
    expected_locations: &[LocationType::Industrial],
};

const TECHNOLOGY: CategoryProfile = CategoryProfile {
    site_class: SiteClass::Commercial,
    expected_objects: &[
        "office_building",
        "commercial_building",
        "parking_lot",
        "commercial_tower",
        "office_tower",
    ],
    expected_locations: &[LocationType::Commercial],
};

const CONSULTING: CategoryProfile = CategoryProfile {
    site_class: SiteClass::Commercial,
    expected_objects: &[
        "office_building",
        "commercial_building",
        "commercial_tower",
        "office_tower",
    ],
    expected_locations: &[LocationType::Commercial],
};

const RETAIL: CategoryProfile = CategoryProfile {
    site_class: SiteClass::Commercial,
    expected_objects: &[
        "storefront",
        "commercial_building",
        "parking_lot",
        "shopping_mall",
    ],
    expected_locations: &[LocationType::Commercial],
};

const RESTAURANT: CategoryProfile = CategoryProfile {
    site_class: SiteClass::Commercial,
    expected_objects: &["storefront", "commercial_building", "outdoor_seating"],
    expected_locations: &[LocationType::Commercial],
};

const OTHER: CategoryProfile = CategoryProfile {
    site_class: SiteClass::Mixed,
    expected_objects: &[
        "commercial_building",
        "industrial_building",
        "office_building",
        "warehouse",
        "storefront",
    ],
    expected_locations: &[
        LocationType::Industrial,
        LocationType::Commercial,
        LocationType::Mixed,
    ],
};

pub fn profile_for(category: BusinessCategory) -> &'static CategoryProfile {
    match category {
        BusinessCategory::Logistics => &LOGISTICS,
        BusinessCategory::Transport => &TRANSPORT,
        BusinessCategory::Manufacturing => &MANUFACTURING,
        BusinessCategory::Construction => &CONSTRUCTION,
        BusinessCategory::Technology => &TECHNOLOGY,
        BusinessCategory::Consulting => &CONSULTING,
        BusinessCategory::Retail => &RETAIL,
        BusinessCategory::Restaurant => &RESTAURANT,
        BusinessCategory::Other => &OTHER,
    }
}

impl CategoryProfile {
    pub fn expects_object(&self, class: &str) -> bool {
        self.expected_objects.contains(&class)
    }

    pub fn expects_location(&self, location: LocationType) -> bool {
        self.expected_locations.contains(&location)
    }
}
