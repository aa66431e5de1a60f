use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{ArrayRef, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use clap::Parser;
use parquet::arrow::ArrowWriter;
use subject_browser::audiology::{AC_FREQUENCIES, BC_FREQUENCIES};

/// Write a synthetic subject roster laid out like the database export.
#[derive(Parser)]
#[command(name = "generate-sample")]
struct Args {
    /// Output file; `.csv` or `.parquet`.
    #[arg(default_value = "sample_roster.csv")]
    output: PathBuf,

    #[arg(long, default_value_t = 200)]
    subjects: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }

    fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items[(self.next_u64() % items.len() as u64) as usize]
    }
}

/// Audiometers step in 5 dB.
fn audiometer(db: f64) -> i64 {
    ((db / 5.0).round() as i64 * 5).clamp(-10, 120)
}

/// One ear of a sloping high-frequency loss.
fn ear(rng: &mut SimpleRng, base: f64, slope: f64) -> Vec<(u32, i64)> {
    AC_FREQUENCIES
        .iter()
        .map(|&f| {
            let octaves = (f as f64 / 500.0).log2().max(0.0);
            (f, audiometer(base + slope * octaves + rng.gauss(0.0, 4.0)))
        })
        .collect()
}

fn reading(rng: &mut SimpleRng, value: i64) -> String {
    if rng.chance(0.04) {
        "-".to_string()
    } else {
        value.to_string()
    }
}

/// Header layout of the database export, defects included.
fn columns() -> Vec<String> {
    let mut columns: Vec<String> = [
        "Subject Id",
        "Status",
        "Employment Status",
        "Good Candidate",
        "Miles From Starkey",
        "Date Of Birth",
        "Hearing AidUse",
    ]
    .map(String::from)
    .to_vec();
    for f in AC_FREQUENCIES {
        columns.push(format!("RightAC {f}"));
    }
    for f in AC_FREQUENCIES {
        columns.push(format!("LeftAC {f}"));
    }
    for f in BC_FREQUENCIES {
        columns.push(format!("RightBC  {f}"));
    }
    for f in BC_FREQUENCIES {
        columns.push(format!("L Pt Bc {f}"));
    }
    columns
}

fn subject(rng: &mut SimpleRng) -> Vec<String> {
    let mut row = vec![
        rng.pick(&["Active", "Active", "Active", "Inactive"]).to_string(),
        rng.pick(&["Retired", "Full Time", "Part Time", "Employee", "-"]).to_string(),
        rng.pick(&["Excellent", "Good", "Fair", "Poor", "-"]).to_string(),
        if rng.chance(0.05) {
            "-".to_string()
        } else {
            (rng.next_f64() * 150.0).round().to_string()
        },
        format!(
            "{}/{}/{}",
            1 + rng.next_u64() % 12,
            1 + rng.next_u64() % 28,
            1935 + rng.next_u64() % 50
        ),
        rng.pick(&["None", "Binaural", "Right", "Left"]).to_string(),
    ];

    let base = rng.gauss(30.0, 12.0);
    let slope = rng.gauss(7.0, 3.0);
    let right = ear(rng, base, slope);
    let asymmetry = rng.gauss(0.0, 5.0);
    let left = ear(rng, base + asymmetry, slope);
    for &(_, t) in right.iter().chain(&left) {
        row.push(reading(rng, t));
    }
    for ac in [&right, &left] {
        for &f in &BC_FREQUENCIES {
            let t = ac.iter().find(|(freq, _)| *freq == f).map_or(0, |&(_, t)| t);
            let gap = (rng.next_f64() * 10.0) as i64;
            row.push(reading(rng, audiometer((t - gap) as f64)));
        }
    }
    row
}

fn write_csv(path: &Path, columns: &[String], ids: &[i64], rows: &[Vec<String>]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).context("creating CSV")?;
    writer.write_record(columns)?;
    for (id, row) in ids.iter().zip(rows) {
        writer.write_record(std::iter::once(id.to_string()).chain(row.iter().cloned()))?;
    }
    writer.flush()?;
    Ok(())
}

fn write_parquet(path: &Path, columns: &[String], ids: &[i64], rows: &[Vec<String>]) -> Result<()> {
    let mut fields = vec![Field::new(&columns[0], DataType::Int64, false)];
    let mut arrays: Vec<ArrayRef> = vec![Arc::new(Int64Array::from(ids.to_vec()))];
    for (i, name) in columns.iter().enumerate().skip(1) {
        fields.push(Field::new(name, DataType::Utf8, false));
        arrays.push(Arc::new(StringArray::from(
            rows.iter().map(|r| r[i - 1].as_str()).collect::<Vec<_>>(),
        )));
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays).context("building record batch")?;

    let file = std::fs::File::create(path).context("creating parquet file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating writer")?;
    writer.write(&batch).context("writing batch")?;
    writer.close().context("closing writer")?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut rng = SimpleRng::new(args.seed);

    let columns = columns();
    // Export order is not id order.
    let mut ids: Vec<i64> = (0..args.subjects as i64).map(|i| 1000 + 3 * i).collect();
    for i in (1..ids.len()).rev() {
        let j = (rng.next_u64() % (i as u64 + 1)) as usize;
        ids.swap(i, j);
    }
    let rows: Vec<Vec<String>> = ids.iter().map(|_| subject(&mut rng)).collect();

    let ext = args
        .output
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "csv" => write_csv(&args.output, &columns, &ids, &rows)?,
        "parquet" | "pq" => write_parquet(&args.output, &columns, &ids, &rows)?,
        other => bail!("Unsupported output extension: .{other}"),
    }

    println!(
        "Wrote {} subjects ({} columns) to {}",
        ids.len(),
        columns.len(),
        args.output.display()
    );
    Ok(())
}
