//! train - fit the scaler and classifier from the collected dataset

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use fruit_sense::dataset::read_dataset;
use fruit_sense::training::{self, TrainingOptions, DEFAULT_TEST_FRACTION, SPLIT_SEED};
use fruit_sense::ui::{Ui, UiMode};
use fruit_sense::{RawFrame, SensorConfig};

/// Typical readings shown after training as a sanity check.
const EXAMPLE_READINGS: [(&str, [u32; 3]); 2] = [
    ("limon", [1000, 1400, 650]),
    ("manzana", [1500, 900, 700]),
];

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Dataset CSV produced by `collect`.
    #[arg(long)]
    dataset: Option<PathBuf>,
    /// Where to write the model artifact.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Where to write the scaler artifact.
    #[arg(long)]
    scaler: Option<PathBuf>,
    /// The two classes to train on; other labels are skipped.
    #[arg(long, value_delimiter = ',', default_value = "limon,manzana")]
    classes: Vec<String>,
    /// Share of each class held out for evaluation.
    #[arg(long, default_value_t = DEFAULT_TEST_FRACTION)]
    test_fraction: f64,
    /// Seed for the train/test split.
    #[arg(long, default_value_t = SPLIT_SEED)]
    seed: u64,
    /// UI mode for stderr progress
    #[arg(long, value_enum, default_value_t = UiMode::Auto, value_name = "MODE")]
    ui: UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = Ui::for_stderr(args.ui);

    let mut cfg = SensorConfig::load()?;
    if let Some(dataset) = args.dataset {
        cfg.dataset_path = dataset;
    }
    if let Some(model) = args.model {
        cfg.model_path = model;
    }
    if let Some(scaler) = args.scaler {
        cfg.scaler_path = scaler;
    }

    let samples = {
        let mut stage = ui.stage("Load dataset");
        let samples = read_dataset(&cfg.dataset_path)?;
        stage.set_detail(format!("{} rows", samples.len()));
        samples
    };

    let options = TrainingOptions {
        classes: args.classes,
        test_fraction: args.test_fraction,
        split_seed: args.seed,
        ..TrainingOptions::default()
    };
    let outcome = {
        let mut stage = ui.stage("Train classifier");
        let outcome = training::train(&samples, &options)?;
        stage.set_detail(format!(
            "{} epochs, loss {:.4}",
            outcome.fit.epochs, outcome.fit.final_loss
        ));
        outcome
    };
    if !outcome.fit.converged {
        log::warn!(
            "optimizer stopped at the epoch limit ({}) before converging",
            outcome.fit.epochs
        );
    }

    println!("Muestras por clase:");
    for (label, count) in &outcome.class_counts {
        println!("  {:10} {}", label, count);
    }
    if outcome.excluded > 0 {
        println!("  ({} filas de otras clases omitidas)", outcome.excluded);
    }
    println!(
        "\nEntrenamiento: {} muestras | Prueba: {} muestras",
        outcome.train_size, outcome.test_size
    );
    println!("Precision en entrenamiento: {:.3}", outcome.train_accuracy);
    println!("Precision en prueba:        {:.3}", outcome.test_accuracy);

    println!(
        "\n{:10} {:>9} {:>9} {:>9} {:>8}",
        "", "precision", "recall", "f1", "soporte"
    );
    for metrics in outcome.confusion.class_metrics() {
        println!(
            "{:10} {:>9.2} {:>9.2} {:>9.2} {:>8}",
            metrics.label, metrics.precision, metrics.recall, metrics.f1, metrics.support
        );
    }

    println!("\nMatriz de confusion");
    println!("Filas: valores reales | Columnas: predicciones");
    print!("{}", outcome.confusion);

    println!("\nPredicciones de ejemplo:");
    for (name, [r, g, b]) in EXAMPLE_READINGS {
        let frame = RawFrame::new(r, g, b);
        let prediction = outcome.params.classify(&outcome.params.normalize(frame));
        let shares: Vec<String> = outcome
            .params
            .labels()
            .iter()
            .zip(&prediction.probabilities)
            .map(|(label, p)| format!("{} {:.1}%", label, p * 100.0))
            .collect();
        println!(
            "  {} RGB({}, {}, {}) -> {} [{}]",
            name,
            r,
            g,
            b,
            prediction.label,
            shares.join(", ")
        );
    }

    {
        let _stage = ui.stage("Save artifacts");
        outcome.params.save(&cfg.scaler_path, &cfg.model_path)?;
    }
    println!(
        "\nModelo guardado en {} | scaler en {}",
        cfg.model_path.display(),
        cfg.scaler_path.display()
    );
    Ok(())
}
