//! Command-line arguments

use chrono::{Days, NaiveDate};
use clap::Parser;
use satlas_common::errors::{AppError, Result};
use satlas_common::SearchRequest;
use std::path::PathBuf;

/// Ingest satellite image metadata for an area of interest into PostGIS
#[derive(Debug, Parser)]
#[command(name = "ingestion", version, about)]
pub struct Args {
    /// GeoJSON FeatureCollection; the first feature's geometry is the search AOI
    #[arg(long, value_name = "PATH")]
    pub aoi_file: PathBuf,

    /// Start of the acquisition window (inclusive). Defaults to yesterday (UTC)
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub start_date: Option<NaiveDate>,

    /// End of the acquisition window. Defaults to today (UTC)
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub end_date: Option<NaiveDate>,

    /// Maximum cloud cover, 0.0 to 1.0
    #[arg(long, default_value_t = 1.0)]
    pub cc: f64,

    /// Comma-separated item types; all available types when omitted
    #[arg(long, value_delimiter = ',')]
    pub item_types: Vec<String>,

    /// Catalog API key; falls back to APP__CATALOG__API_KEY, then PL_API_KEY
    #[arg(long)]
    pub api_key: Option<String>,

    /// Concurrent feature workers (overrides ingestion.workers)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Do not import missing reference tables
    #[arg(long)]
    pub skip_reference: bool,

    /// Run against an in-memory store instead of the database
    #[arg(long)]
    pub dry_run: bool,
}

impl Args {
    /// Acquisition window with defaults applied relative to `today`
    pub fn window(&self, today: NaiveDate) -> Result<(NaiveDate, NaiveDate)> {
        let start = match self.start_date {
            Some(date) => date,
            None => today
                .checked_sub_days(Days::new(1))
                .ok_or_else(|| AppError::config("start date out of range"))?,
        };
        let end = self.end_date.unwrap_or(today);

        if end <= start {
            return Err(AppError::config(format!(
                "end date {end} must be after start date {start}"
            )));
        }
        Ok((start, end))
    }

    /// Validate and build the catalog search
    pub fn search_request(&self, aoi: geojson::Geometry, today: NaiveDate) -> Result<SearchRequest> {
        if !(0.0..=1.0).contains(&self.cc) {
            return Err(AppError::config(format!(
                "cloud cover threshold {} is outside [0, 1]",
                self.cc
            )));
        }
        let (start_date, end_date) = self.window(today)?;

        let item_types = self
            .item_types
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Ok(SearchRequest {
            start_date,
            end_date,
            cloud_cover_max: self.cc,
            aoi,
            item_types,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("ingestion").chain(args.iter().copied())).unwrap()
    }

    fn aoi() -> geojson::Geometry {
        geojson::Geometry::new(geojson::Value::Point(vec![13.4, 52.5]))
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 9, 2).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["--aoi-file", "aoi.geojson"]);
        assert_eq!(args.cc, 1.0);
        assert!(!args.dry_run);
        assert!(args.item_types.is_empty());

        let request = args.search_request(aoi(), today()).unwrap();
        assert_eq!(request.start_date, NaiveDate::from_ymd_opt(2022, 9, 1).unwrap());
        assert_eq!(request.end_date, today());
        assert!(request.item_types.is_empty());
    }

    #[test]
    fn test_item_types_split_on_commas() {
        let args = parse(&["--aoi-file", "a.json", "--item-types", "PSScene,SkySatScene"]);
        let request = args.search_request(aoi(), today()).unwrap();
        assert_eq!(request.item_types, vec!["PSScene", "SkySatScene"]);
    }

    #[test]
    fn test_end_must_follow_start() {
        let args = parse(&[
            "--aoi-file",
            "a.json",
            "--start-date",
            "2022-09-02",
            "--end-date",
            "2022-09-02",
        ]);
        let err = args.search_request(aoi(), today()).unwrap_err();
        assert!(matches!(err, AppError::Configuration { .. }));
    }

    #[test]
    fn test_cloud_cover_range() {
        let args = parse(&["--aoi-file", "a.json", "--cc", "1.5"]);
        assert!(matches!(
            args.search_request(aoi(), today()),
            Err(AppError::Configuration { .. })
        ));

        let args = parse(&["--aoi-file", "a.json", "--cc", "0.1"]);
        assert_eq!(args.search_request(aoi(), today()).unwrap().cloud_cover_max, 0.1);
    }

    #[test]
    fn test_aoi_file_required() {
        assert!(Args::try_parse_from(["ingestion"]).is_err());
        assert!(Args::try_parse_from(["ingestion", "--aoi-file", "a.json", "--start-date", "yesterday"]).is_err());
    }
}
