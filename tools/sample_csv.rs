//! Sample CSV generator
//!
//! Writes synthetic exoplanet-archive rows for exercising `/predict-csv`.
//!
//! Usage: sample-csv [output.csv|-] [rows] [candidate_rate] [malformed_rate]

use rand::Rng;
use std::io::Write;
use tracing::info;

const COLUMNS: &[&str] = &[
    "st_teff",
    "st_logg",
    "st_rad",
    "st_dist",
    "pl_orbper",
    "pl_trandurh",
    "pl_trandep",
    "pl_rade",
    "pl_insol",
    "pl_eqt",
];

/// Row generator for testing
struct RowGenerator {
    rng: rand::rngs::ThreadRng,
    malformed_rate: f64,
}

impl RowGenerator {
    fn new(malformed_rate: f64) -> Self {
        Self {
            rng: rand::thread_rng(),
            malformed_rate,
        }
    }

    /// A transit consistent with a small planet around a sun-like star
    fn generate_candidate(&mut self) -> Vec<String> {
        let values = [
            self.rng.gen_range(4800.0..6200.0),
            self.rng.gen_range(4.2..4.6),
            self.rng.gen_range(0.8..1.3),
            self.rng.gen_range(50.0..900.0),
            self.rng.gen_range(1.0..120.0),
            self.rng.gen_range(1.5..6.0),
            self.rng.gen_range(100.0..2500.0),
            self.rng.gen_range(0.8..4.0),
            self.rng.gen_range(1.0..400.0),
            self.rng.gen_range(250.0..1400.0),
        ];
        self.render(&values)
    }

    /// Deep, V-shaped signals typical of eclipsing binaries
    fn generate_false_positive(&mut self) -> Vec<String> {
        let values = [
            self.rng.gen_range(3500.0..9000.0),
            self.rng.gen_range(3.5..4.8),
            self.rng.gen_range(0.5..3.0),
            self.rng.gen_range(20.0..2000.0),
            self.rng.gen_range(0.3..10.0),
            self.rng.gen_range(0.5..3.0),
            self.rng.gen_range(5000.0..60000.0), // Deep transit
            self.rng.gen_range(12.0..40.0),      // Too large for a planet
            self.rng.gen_range(200.0..20000.0),
            self.rng.gen_range(1200.0..3500.0),
        ];
        self.render(&values)
    }

    fn render(&mut self, values: &[f64]) -> Vec<String> {
        values
            .iter()
            .map(|v| {
                if self.rng.gen_bool(self.malformed_rate) {
                    self.random_choice(&["", "n/a", "?"]).to_string()
                } else {
                    format!("{:.3}", v)
                }
            })
            .collect()
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

/// A probability argument in [0, 1]; values outside are clamped, NaN and
/// infinities are refused
fn parse_rate(arg: Option<&String>, default: f64) -> anyhow::Result<f64> {
    let Some(raw) = arg else {
        return Ok(default);
    };
    let rate: f64 = raw
        .parse()
        .map_err(|_| anyhow::anyhow!("rate must be a number, got {:?}", raw))?;
    if !rate.is_finite() {
        anyhow::bail!("rate must be finite, got {:?}", raw);
    }
    Ok(rate.clamp(0.0, 1.0))
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout can carry the CSV
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sample_csv=info".parse()?),
        )
        .init();

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let output = args.get(1).map(|s| s.as_str()).unwrap_or("-");
    let count: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(100);
    let candidate_rate = parse_rate(args.get(3), 0.3)?;
    let malformed_rate = parse_rate(args.get(4), 0.0)?;

    info!(
        output = %output,
        count = count,
        candidate_rate = candidate_rate,
        malformed_rate = malformed_rate,
        "Configuration loaded"
    );

    let sink: Box<dyn Write> = if output == "-" {
        Box::new(std::io::stdout().lock())
    } else {
        Box::new(std::fs::File::create(output)?)
    };
    let mut writer = csv::Writer::from_writer(sink);
    writer.write_record(COLUMNS)?;

    let mut generator = RowGenerator::new(malformed_rate);
    let mut rng = rand::thread_rng();
    let mut candidates = 0;

    for _ in 0..count {
        let row = if rng.gen_bool(candidate_rate) {
            candidates += 1;
            generator.generate_candidate()
        } else {
            generator.generate_false_positive()
        };
        writer.write_record(&row)?;
    }
    writer.flush()?;

    info!(
        "Completed! Wrote {} rows ({} candidates, {} false positives)",
        count,
        candidates,
        count - candidates
    );

    Ok(())
}
