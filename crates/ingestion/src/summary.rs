//! End-of-run report

use satlas_common::reference::ImportReport;
use satlas_common::spatial::Coverage;
use satlas_common::UpsertOutcome;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityCounts {
    pub inserted: u64,
    pub skipped: u64,
}

impl EntityCounts {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Where this run's footprints landed, per the reference tables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoverageReport {
    /// Images per intersected country ISO code
    pub countries: BTreeMap<String, u64>,
    /// Images touching at least one city buffer
    pub near_cities: u64,
    /// Images touching at least one land-cover class
    pub over_land_cover: u64,
}

impl CoverageReport {
    pub fn add(&mut self, coverage: &Coverage) {
        for iso in &coverage.countries {
            *self.countries.entry(iso.clone()).or_default() += 1;
        }
        if !coverage.cities.is_empty() {
            self.near_cities += 1;
        }
        if !coverage.land_cover_classes.is_empty() {
            self.over_land_cover += 1;
        }
    }
}

/// Counts for one ingestion run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub fetched: u64,
    pub satellites: EntityCounts,
    pub item_types: EntityCounts,
    pub asset_types: EntityCounts,
    pub items_assets: EntityCounts,
    pub images: EntityCounts,
    /// Dropped features by reason label
    pub rejected: BTreeMap<&'static str, u64>,
    pub reference: Option<ImportReport>,
    pub coverage: Option<CoverageReport>,
}

impl RunSummary {
    pub fn reject(&mut self, reason: &'static str) {
        *self.rejected.entry(reason).or_default() += 1;
    }

    pub fn rejected_total(&self) -> u64 {
        self.rejected.values().sum()
    }

    /// Features whose image row was written or already present
    pub fn persisted(&self) -> u64 {
        self.images.inserted + self.images.skipped
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<14} {:>10} {:>10}", "entity", "inserted", "skipped")?;
        let rows = [
            ("satellites", self.satellites),
            ("item_types", self.item_types),
            ("asset_types", self.asset_types),
            ("items_assets", self.items_assets),
            ("sat_images", self.images),
        ];
        for (name, counts) in rows {
            writeln!(f, "{:<14} {:>10} {:>10}", name, counts.inserted, counts.skipped)?;
        }

        write!(f, "fetched {}, rejected {}", self.fetched, self.rejected_total())?;
        for (reason, count) in &self.rejected {
            write!(f, "\n  {reason}: {count}")?;
        }

        if let Some(reference) = &self.reference {
            write!(
                f,
                "\nreference rows imported: countries {}, cities {}, land_cover_classes {}",
                reference.countries, reference.cities, reference.land_cover_classes
            )?;
        }

        if let Some(coverage) = &self.coverage {
            let countries: Vec<String> = coverage
                .countries
                .iter()
                .map(|(iso, count)| format!("{iso}={count}"))
                .collect();
            write!(
                f,
                "\ncoverage: countries [{}], near cities {}, over land cover {}",
                countries.join(", "),
                coverage.near_cities,
                coverage.over_land_cover
            )?;
        }
        Ok(())
    }
}
