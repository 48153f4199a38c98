#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! House price prediction from the command line.
//!
//! ```text
//! house_price predict --transactions sales.csv --pois pois.geojson \
//!     --lat 51.5 --lon -0.1 --date 2021-06-01 [--property-type flat] [--model gaussian]
//! house_price evaluate --transactions sales.csv --pois pois.geojson --validation held_out.csv
//! house_price features --pois pois.geojson --lat 51.5 --lon -0.1
//! ```
//!
//! Every command accepts `--config <toml>`; the embedded default is used
//! otherwise. Results are printed to stdout as JSON and logs go to stderr
//! (`RUST_LOG=info` to see them).

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use house_price_cli_utils::IndicatifProgress;
use house_price_predict::{
    Evaluation, EvaluationMetrics, PredictionConfig, PredictionRequest, evaluate,
    evaluate_parallel, features_at, predict_price,
};
use house_price_property_models::{Coordinate, PropertyType};
use house_price_source::csv_transactions::read_transactions;
use house_price_source::{CsvTransactionSource, GeoJsonPoiSource};
use serde::Serialize;

#[derive(Parser)]
#[command(
    name = "house_price",
    about = "Predict house prices from nearby sales and points of interest"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConfigArgs {
    /// Prediction configuration (TOML). Uses the built-in default if omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// POI `GeoJSON` `FeatureCollection`
    #[arg(long)]
    pois: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict the price of one property
    Predict {
        #[command(flatten)]
        common: ConfigArgs,
        /// Transactions CSV
        #[arg(long)]
        transactions: PathBuf,
        /// Latitude of the property
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        /// Longitude of the property
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Date to predict for (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
        /// Property type (D, S, T, F, O or the full name)
        #[arg(long)]
        property_type: Option<PropertyType>,
        /// Model family, overriding the configuration
        #[arg(long)]
        model: Option<String>,
    },
    /// Leave-one-out evaluation over a validation CSV
    Evaluate {
        #[command(flatten)]
        common: ConfigArgs,
        /// Transactions CSV
        #[arg(long)]
        transactions: PathBuf,
        /// Validation transactions CSV
        #[arg(long)]
        validation: PathBuf,
        /// Predict records in parallel, overriding the configuration
        #[arg(long)]
        parallel: bool,
    },
    /// Print the POI feature row for a location
    Features {
        #[command(flatten)]
        common: ConfigArgs,
        /// Latitude of the location
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        /// Longitude of the location
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
}

#[derive(Serialize)]
struct EvaluationReport<'a> {
    metrics: Option<EvaluationMetrics>,
    #[serde(flatten)]
    evaluation: &'a Evaluation,
}

fn load_config(path: Option<&Path>) -> Result<PredictionConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => PredictionConfig::load(path)?,
        None => PredictionConfig::embedded_default()?,
    };
    config.validate()?;
    Ok(config)
}

fn print_json(value: &impl Serialize) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = house_price_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Predict {
            common,
            transactions,
            lat,
            lon,
            date,
            property_type,
            model,
        } => {
            let mut config = load_config(common.config.as_deref())?;
            if let Some(model) = model {
                config.model = model;
            }
            let transactions = CsvTransactionSource::load(&transactions)?;
            let pois = GeoJsonPoiSource::load(&common.pois)?;

            let request = PredictionRequest {
                center: Coordinate::new(lat, lon),
                date,
                property_type,
            };
            let prediction = predict_price(&transactions, &pois, &request, &config, None)?;
            print_json(&prediction)?;
        }
        Commands::Evaluate {
            common,
            transactions,
            validation,
            parallel,
        } => {
            let config = load_config(common.config.as_deref())?;
            let transactions = CsvTransactionSource::load(&transactions)?;
            let pois = GeoJsonPoiSource::load(&common.pois)?;
            let validation = read_transactions(&validation)?;
            log::info!("Evaluating {} validation records", validation.len());

            let progress = IndicatifProgress::records_bar(&multi, "Evaluating");
            let evaluation = if parallel || config.parallel {
                evaluate_parallel(&transactions, &pois, &validation, &config, progress.as_ref())?
            } else {
                evaluate(&transactions, &pois, &validation, &config, progress.as_ref())?
            };

            print_json(&EvaluationReport {
                metrics: evaluation.metrics(),
                evaluation: &evaluation,
            })?;
        }
        Commands::Features { common, lat, lon } => {
            let config = load_config(common.config.as_deref())?;
            let pois = GeoJsonPoiSource::load(&common.pois)?;
            let features = features_at(&pois, Coordinate::new(lat, lon), &config)?;
            print_json(&features)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predict_parses_property_type_and_negative_longitude() {
        let cli = Cli::try_parse_from([
            "house_price",
            "predict",
            "--pois",
            "pois.geojson",
            "--transactions",
            "sales.csv",
            "--lat",
            "51.5",
            "--lon",
            "-0.1",
            "--date",
            "2021-06-01",
            "--property-type",
            "flat",
        ])
        .unwrap();

        let Commands::Predict {
            property_type,
            lon,
            date,
            model,
            ..
        } = cli.command
        else {
            panic!("expected the predict command");
        };
        assert_eq!(property_type, Some(PropertyType::Flat));
        assert!((lon - -0.1).abs() < f64::EPSILON);
        assert_eq!(date, NaiveDate::from_ymd_opt(2021, 6, 1).unwrap());
        assert_eq!(model, None);
    }

    #[test]
    fn predict_rejects_unknown_property_type() {
        let result = Cli::try_parse_from([
            "house_price",
            "predict",
            "--pois",
            "pois.geojson",
            "--transactions",
            "sales.csv",
            "--lat",
            "51.5",
            "--lon",
            "-0.1",
            "--date",
            "2021-06-01",
            "--property-type",
            "castle",
        ]);
        assert!(result.is_err());
    }
}
