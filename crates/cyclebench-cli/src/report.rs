//! Console output for a measurement.

use anyhow::Result;
use cyclebench_runtime::measure::Measurement;
use std::io::Write;

/// First line of every text report.
pub const BANNER: &str = "WES237A lab 4";

/// Write the banner line.
pub fn write_banner<W: Write>(out: &mut W) -> Result<()> {
    writeln!(out, "{BANNER}")?;
    Ok(())
}

/// Write the two measurement lines.
///
/// The cycle count is printed in reported units, so with the divider on it
/// is the number of 64-tick groups.
pub fn write_text<W: Write>(out: &mut W, measurement: &Measurement) -> Result<()> {
    writeln!(out, "Cycle count: {}", measurement.cycle_count)?;
    writeln!(out, "Timer: {}", measurement.elapsed_secs())?;
    Ok(())
}

/// Write the measurement as one JSON object, with the tick count and
/// seconds spelled out.
pub fn write_json<W: Write>(out: &mut W, measurement: &Measurement) -> Result<()> {
    let mut value = serde_json::to_value(measurement)?;
    if let Some(object) = value.as_object_mut() {
        object.insert("ticks".into(), measurement.ticks().into());
        object.insert("elapsed_secs".into(), measurement.elapsed_secs().into());
    }
    serde_json::to_writer(&mut *out, &value)?;
    writeln!(out)?;
    Ok(())
}
