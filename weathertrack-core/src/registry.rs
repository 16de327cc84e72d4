use std::collections::BTreeMap;

use crate::model::Target;

/// Region → representative location polled when no targets are configured.
const DEFAULT_TARGETS: &[(&str, &str)] = &[
    ("California", "San Francisco"),
    ("Colorado", "Denver"),
    ("Florida", "Miami"),
    ("Illinois", "Chicago"),
    ("Massachusetts", "Boston"),
    ("North Carolina", "Raleigh"),
    ("North Dakota", "Bismarck"),
    ("New York", "New York"),
    ("Texas", "Austin"),
    ("Washington", "Seattle"),
];

/// Immutable set of targets that makes up the fetch universe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRegistry {
    targets: Vec<Target>,
}

impl TargetRegistry {
    pub fn new(targets: Vec<Target>) -> Self {
        Self { targets }
    }

    /// Build a registry from a region → location table.
    pub fn from_table(table: &BTreeMap<String, String>) -> Self {
        let targets = table
            .iter()
            .map(|(region, location)| Target::new(region.as_str(), location.as_str()))
            .collect();
        Self { targets }
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl Default for TargetRegistry {
    fn default() -> Self {
        let targets = DEFAULT_TARGETS
            .iter()
            .map(|(region, location)| Target::new(*region, *location))
            .collect();
        Self { targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_ten_distinct_regions() {
        let registry = TargetRegistry::default();
        assert_eq!(registry.len(), 10);

        let mut regions: Vec<_> = registry.iter().map(|t| t.region.as_str()).collect();
        regions.sort_unstable();
        regions.dedup();
        assert_eq!(regions.len(), 10);
    }

    #[test]
    fn from_table_maps_region_to_location() {
        let mut table = BTreeMap::new();
        table.insert("Oregon".to_string(), "Portland".to_string());

        let registry = TargetRegistry::from_table(&table);
        assert_eq!(registry.targets(), &[Target::new("Oregon", "Portland")]);
    }
}
