#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Weighted ensembles of trained classifiers behind the single-classifier interface.

/// Classifier capability contract and shared value types.
#[path = "../classifier.rs"]
pub mod classifier;

/// Error type shared by classifiers and ensembles.
#[path = "../error.rs"]
pub mod error;

/// Batch sources for generator-driven training.
#[path = "../generator.rs"]
pub mod generator;

/// Reference dense softmax member.
#[path = "../linear/main.rs"]
pub mod linear;

/// Ensemble adapter and aggregation.
#[path = "../ensemble/main.rs"]
pub mod ensemble;

/// Serde-backed configuration.
#[path = "../config.rs"]
pub mod config;

/// Structured logging helpers.
#[path = "../telemetry.rs"]
pub mod telemetry;

pub use classifier::{check_input, Classifier, ClipValues, LayerRef, Preprocessing};
pub use config::{default_data_path, EnsembleConfig, LinearConfig, DATA_PATH_ENV};
pub use ensemble::{EnsembleClassifier, EnsembleMember, MemberReviewer};
pub use error::{ClassifierError, Result};
pub use generator::{ArrayGenerator, DataGenerator};
pub use linear::LinearSoftmaxClassifier;
pub use telemetry::{EnsembleTelemetry, EnsembleTelemetryBuilder};
