// Plot how the extra_bits margin trades precision for overflow safety
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use plotters::prelude::*;
use symmetric_quantizer::matrices::Matrix;
use symmetric_quantizer::SymmetricQuantizer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "symmetric_quantizer")]
#[command(about = "Measure 16-bit symmetric quantization error against the extra_bits margin")]
struct Cli {
    /// Side length of the random square matrices
    #[arg(long, default_value_t = 32)]
    dimension: usize,

    /// Entries are drawn uniformly from (-range, range)
    #[arg(long, default_value_t = 1.0)]
    range: f32,

    /// Largest extra_bits value to measure (starting at 0)
    #[arg(long, default_value_t = 6)]
    max_extra_bits: u32,

    /// Random matrix pairs averaged per extra_bits value
    #[arg(long, default_value_t = 20)]
    iterations: usize,

    /// Directory the SVG plots are written to
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
}

#[derive(Debug, Default, Clone, Copy)]
struct Measurement {
    round_trip_mse: f32,
    product_mse: f32,
    overflow_rate: f32,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if cli.dimension == 0 || cli.iterations == 0 {
        return Err(anyhow!("dimension and iterations must be positive"));
    }
    if !(cli.range.is_finite() && cli.range > 0.0) {
        return Err(anyhow!("range must be a positive finite number"));
    }

    let mut results = Vec::new();
    for extra_bits in 0..=cli.max_extra_bits {
        let m = measure(&cli, extra_bits)?;
        info!(
            extra_bits,
            round_trip_mse = m.round_trip_mse,
            product_mse = m.product_mse,
            overflow_rate = m.overflow_rate,
            "measured"
        );
        results.push((extra_bits as f32, m));
    }

    let round_trip: Vec<_> = results.iter().map(|(x, m)| (*x, m.round_trip_mse)).collect();
    let product: Vec<_> = results.iter().map(|(x, m)| (*x, m.product_mse)).collect();
    let overflow: Vec<_> = results.iter().map(|(x, m)| (*x, m.overflow_rate)).collect();

    let mse_path = cli.output_dir.join("mse-extra-bits.svg");
    plot(
        &mse_path,
        "MSE vs. Extra Bits",
        "Mean Squared Error (MSE)",
        &[
            ("Round trip", round_trip.as_slice(), RED),
            ("Matrix product", product.as_slice(), BLUE),
        ],
    )
    .map_err(|e| anyhow!("failed to plot {}: {e}", mse_path.display()))?;

    let overflow_path = cli.output_dir.join("overflow-extra-bits.svg");
    plot(
        &overflow_path,
        "Pairwise Sum Overflow vs. Extra Bits",
        "Fraction of i16 sums overflowing",
        &[("Overflow rate", overflow.as_slice(), RED)],
    )
    .map_err(|e| anyhow!("failed to plot {}: {e}", overflow_path.display()))?;

    info!(output_dir = %cli.output_dir.display(), "plots written");
    Ok(())
}

fn measure(cli: &Cli, extra_bits: u32) -> Result<Measurement> {
    let mut total = Measurement::default();

    for _ in 0..cli.iterations {
        let f_lhs = Matrix::random_square(cli.dimension, -cli.range..cli.range);
        let f_rhs = Matrix::random_square(cli.dimension, -cli.range..cli.range);

        let lhs_quantizer = SymmetricQuantizer::<f32, i16>::from_samples(&f_lhs.data, extra_bits)
            .context("building lhs quantizer")?;
        let rhs_quantizer = SymmetricQuantizer::<f32, i16>::from_samples(&f_rhs.data, extra_bits)
            .context("building rhs quantizer")?;

        let q_lhs = f_lhs.quantize(&lhs_quantizer)?;
        let q_rhs = f_rhs.quantize(&rhs_quantizer)?;

        let restored = q_lhs.dequantize(&lhs_quantizer);
        total.round_trip_mse += mean_squared_error(&f_lhs.data, &restored.data);

        let f_result = f_lhs.multiply(&f_rhs)?;
        let q_result = q_lhs
            .qmultiply(&q_rhs)?
            .rescale(lhs_quantizer.scale(), rhs_quantizer.scale());
        total.product_mse += mean_squared_error(&f_result.data, &q_result.data);

        total.overflow_rate += overflow_rate(&q_lhs.data, &q_rhs.data);
    }

    let n = cli.iterations as f32;
    Ok(Measurement {
        round_trip_mse: total.round_trip_mse / n,
        product_mse: total.product_mse / n,
        overflow_rate: total.overflow_rate / n,
    })
}

fn mean_squared_error(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "Number of values must be equal");
    let n = a.len() as f32;
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x - y).powi(2))
        .sum::<f32>()
        / n
}

/// Fraction of element-wise sums that do not fit in an i16.
fn overflow_rate(a: &[i16], b: &[i16]) -> f32 {
    let overflows = a
        .iter()
        .zip(b)
        .filter(|&(&x, &y)| x.checked_add(y).is_none())
        .count();
    overflows as f32 / a.len().min(b.len()) as f32
}

type Series<'a> = (&'a str, &'a [(f32, f32)], RGBColor);

fn plot(
    path: &Path,
    caption: &str,
    y_desc: &str,
    series: &[Series],
) -> Result<(), Box<dyn std::error::Error>> {
    let root = SVGBackend::new(path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let points = series.iter().flat_map(|(_, data, _)| data.iter());
    let (x_min, x_max) = points
        .clone()
        .fold((f32::MAX, f32::MIN), |(lo, hi), (x, _)| (lo.min(*x), hi.max(*x)));
    let x_max = if x_max > x_min { x_max } else { x_min + 1.0 };
    let y_max = points.map(|(_, y)| *y).fold(0.0, f32::max).max(f32::EPSILON) * 1.1; // Add 10% padding

    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 40).into_font())
        .margin(30)
        .x_label_area_size(50)
        .y_label_area_size(75)
        .build_cartesian_2d(x_min..x_max, 0f32..y_max)?;

    chart
        .configure_mesh()
        .x_desc("Extra Bits")
        .y_desc(y_desc)
        .light_line_style(&WHITE.mix(0.8))
        .draw()?;

    for &(label, data, color) in series {
        chart
            .draw_series(LineSeries::new(data.iter().cloned(), color))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x - 5, y), (x + 5, y)], color));

        chart.draw_series(
            data.iter()
                .map(|(x, y)| Circle::new((*x, *y), 3, color.filled())),
        )?;
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}
