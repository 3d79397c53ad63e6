//! CSV export of per-tick results.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::sim::TickResult;

/// Column header of the telemetry CSV.
const HEADER: &str = "tick,time,dt_s,price_ct_per_kwh,base_load_kw,pv_kw,\
                      storage_kw,storage_soc_pct,heatpump_kw,chp_kw,generator_kw,\
                      ev_total_kw,grid_kw,grid_available,over_limit";

/// Exports tick results to a CSV file at `path`.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(results: &[TickResult], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_csv(results, io::BufWriter::new(file))
}

/// Writes tick results as CSV to any writer, one row per tick.
///
/// Output is byte-identical for identical results.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(results: &[TickResult], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(HEADER.split(',').map(str::trim))?;

    for r in results {
        wtr.write_record(&[
            r.tick.to_string(),
            r.time.format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
            format!("{:.3}", r.dt_s),
            format!("{:.4}", r.price_ct_per_kwh),
            format!("{:.4}", r.base_load_kw),
            format!("{:.4}", r.pv_kw),
            format!("{:.4}", r.storage_kw),
            format!("{:.4}", r.storage_soc_pct),
            format!("{:.4}", r.heatpump_kw),
            format!("{:.4}", r.chp_kw),
            format!("{:.4}", r.generator_kw),
            format!("{:.4}", r.ev_total_kw),
            format!("{:.4}", r.grid_kw),
            r.grid_available.to_string(),
            r.over_limit.to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn make_tick(n: u64) -> TickResult {
        let t0 = NaiveDate::from_ymd_opt(2024, 5, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap();
        TickResult {
            tick: n,
            time: t0 + Duration::seconds(n as i64),
            dt_s: 1.0,
            price_ct_per_kwh: 31.5,
            base_load_kw: 14.2,
            pv_kw: 20.0,
            storage_kw: -3.0,
            storage_soc_pct: 50.01,
            heatpump_kw: 0.0,
            chp_kw: 0.0,
            generator_kw: 0.0,
            ev_total_kw: 11.0,
            grid_kw: 8.2,
            grid_available: true,
            over_limit: false,
        }
    }

    #[test]
    fn header_lists_every_column() {
        let mut buf = Vec::new();
        write_csv(&[make_tick(1)], &mut buf).ok();
        let output = String::from_utf8(buf).unwrap_or_default();
        let first_line = output.lines().next().unwrap_or("");
        assert_eq!(
            first_line,
            "tick,time,dt_s,price_ct_per_kwh,base_load_kw,pv_kw,storage_kw,storage_soc_pct,\
             heatpump_kw,chp_kw,generator_kw,ev_total_kw,grid_kw,grid_available,over_limit"
        );
    }

    #[test]
    fn row_count_matches_tick_count() {
        let results: Vec<TickResult> = (1..=24).map(make_tick).collect();
        let mut buf = Vec::new();
        write_csv(&results, &mut buf).ok();
        let output = String::from_utf8(buf).unwrap_or_default();
        assert_eq!(output.lines().count(), 25);
    }

    #[test]
    fn rows_parse_back() {
        let results: Vec<TickResult> = (1..=3).map(make_tick).collect();
        let mut buf = Vec::new();
        write_csv(&results, &mut buf).ok();

        let mut rdr = csv::ReaderBuilder::new().from_reader(buf.as_slice());
        assert_eq!(rdr.headers().map(csv::StringRecord::len).ok(), Some(15));
        let mut rows = 0;
        for record in rdr.records() {
            let rec = record.expect("row parses");
            for i in 2..13 {
                assert!(rec[i].parse::<f64>().is_ok(), "column {i} should be numeric");
            }
            assert!(rec[13].parse::<bool>().is_ok());
            rows += 1;
        }
        assert_eq!(rows, 3);
    }

    #[test]
    fn export_writes_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ticks.csv");
        export_csv(&[make_tick(1), make_tick(2)], &path).expect("export");
        let text = std::fs::read_to_string(&path).expect("read back");
        assert_eq!(text.lines().count(), 3);
        assert!(text.contains("2024-05-01T12:00:01.000"));
    }
}
