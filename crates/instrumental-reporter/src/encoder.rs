//! Flattening registry snapshots into collector wire lines.
//!
//! Every metric becomes one or more `(name, f64)` pairs, and every pair is
//! sent as `gauge <prefix>.<name> <value> <unix-seconds>`. Counts, rates and
//! percentiles all use the `gauge` verb.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use instrumental_metrics::{HistogramSnapshot, MeterSnapshot, MetricSnapshot, MetricSource};

/// Joins the prefix, the metric name and each derived suffix.
pub const SEPARATOR: char = '.';

/// Quantiles reported for histograms and timers.
const QUANTILES: [f64; 3] = [0.5, 0.75, 0.95];

/// Flattened values for one tick, keyed by sub-metric name.
pub type Flattened = BTreeMap<String, f64>;

/// Produce the wire lines for one reporting tick.
///
/// All lines share `unix_secs`. Kinds without a scalar form are skipped.
pub fn encode(source: &dyn MetricSource, prefix: &str, unix_secs: u64) -> Vec<String> {
    let mut values = Flattened::new();
    source.for_each_metric(&mut |name, snapshot| flatten(name, &snapshot, &mut values));

    values
        .iter()
        .map(|(name, value)| format_line(prefix, name, *value, unix_secs))
        .collect()
}

/// Add the sub-metrics of one snapshot to `out`.
///
/// Later writes to the same key replace earlier ones; for timers the mean
/// rate therefore replaces the mean duration under `.mean`.
pub fn flatten(name: &str, snapshot: &MetricSnapshot, out: &mut Flattened) {
    match snapshot {
        MetricSnapshot::Counter(count) => {
            out.insert(key(name), *count as f64);
        }
        MetricSnapshot::Gauge(value) => {
            out.insert(key(name), *value as f64);
        }
        MetricSnapshot::FloatGauge(value) => {
            out.insert(key(name), *value);
        }
        MetricSnapshot::Histogram(h) => flatten_histogram(name, h, out),
        MetricSnapshot::Meter(m) => {
            out.insert(suffixed(name, "count"), m.count as f64);
            flatten_rates(name, m, out);
        }
        MetricSnapshot::Timer(t) => {
            flatten_histogram(name, &t.histogram, out);
            flatten_rates(name, &t.meter, out);
        }
        MetricSnapshot::Unknown => {}
    }
}

fn flatten_histogram(name: &str, h: &HistogramSnapshot, out: &mut Flattened) {
    let ps = h.percentiles(&QUANTILES);
    out.insert(suffixed(name, "count"), h.count() as f64);
    out.insert(suffixed(name, "min"), h.min() as f64);
    out.insert(suffixed(name, "max"), h.max() as f64);
    out.insert(suffixed(name, "mean"), h.mean());
    out.insert(suffixed(name, "std-dev"), h.std_dev());
    out.insert(suffixed(name, "50-percentile"), ps[0]);
    out.insert(suffixed(name, "75-percentile"), ps[1]);
    out.insert(suffixed(name, "95-percentile"), ps[2]);
}

fn flatten_rates(name: &str, m: &MeterSnapshot, out: &mut Flattened) {
    out.insert(suffixed(name, "one-minute"), m.rate1);
    out.insert(suffixed(name, "five-minute"), m.rate5);
    out.insert(suffixed(name, "fifteen-minute"), m.rate15);
    out.insert(suffixed(name, "mean"), m.rate_mean);
}

fn suffixed(name: &str, suffix: &str) -> String {
    key(&format!("{name}{SEPARATOR}{suffix}"))
}

/// Flattened names never start with the separator, so an empty base name
/// plus `.count` and a metric named `count` share one key.
fn key(name: &str) -> String {
    name.strip_prefix(SEPARATOR).unwrap_or(name).to_string()
}

/// Render one `gauge` line, newline included.
pub fn format_line(prefix: &str, name: &str, value: f64, unix_secs: u64) -> String {
    format!("gauge {prefix}{SEPARATOR}{name} {value:.6} {unix_secs}\n")
}

/// Current wall-clock time in Unix seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use instrumental_metrics::{Histogram, Meter, Registry, TimerSnapshot};

    use super::*;

    const TS: u64 = 1_700_000_000;

    fn source(entries: Vec<(&str, MetricSnapshot)>) -> Vec<(String, MetricSnapshot)> {
        entries
            .into_iter()
            .map(|(n, s)| (n.to_string(), s))
            .collect()
    }

    fn flattened(name: &str, snap: MetricSnapshot) -> Flattened {
        let mut out = Flattened::new();
        flatten(name, &snap, &mut out);
        out
    }

    fn hist_1_to_100() -> HistogramSnapshot {
        let h = Histogram::new();
        for v in 1..=100 {
            h.update(v);
        }
        h.snapshot()
    }

    fn meter_snapshot() -> MeterSnapshot {
        MeterSnapshot {
            count: 30,
            rate1: 1.5,
            rate5: 1.25,
            rate15: 1.125,
            rate_mean: 0.5,
        }
    }

    #[test]
    fn counter_becomes_one_gauge_line() {
        let src = source(vec![("c", MetricSnapshot::Counter(7))]);
        let lines = encode(&src, "p", TS);
        assert_eq!(lines, vec![format!("gauge p.c 7.000000 {TS}\n")]);
    }

    #[test]
    fn gauges_are_sent_as_floats() {
        let src = source(vec![
            ("g", MetricSnapshot::Gauge(-3)),
            ("f", MetricSnapshot::FloatGauge(0.125)),
        ]);
        let lines = encode(&src, "app", TS);
        assert_eq!(
            lines,
            vec![
                format!("gauge app.f 0.125000 {TS}\n"),
                format!("gauge app.g -3.000000 {TS}\n"),
            ]
        );
    }

    #[test]
    fn histogram_emits_exactly_eight_suffixes() {
        let snap = hist_1_to_100();
        let out = flattened("latency", MetricSnapshot::Histogram(snap.clone()));

        let keys: Vec<&str> = out.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "latency.50-percentile",
                "latency.75-percentile",
                "latency.95-percentile",
                "latency.count",
                "latency.max",
                "latency.mean",
                "latency.min",
                "latency.std-dev",
            ]
        );

        let reference = snap.percentiles(&[0.5, 0.75, 0.95]);
        assert_eq!(out["latency.50-percentile"], reference[0]);
        assert_eq!(out["latency.75-percentile"], reference[1]);
        assert_eq!(out["latency.95-percentile"], reference[2]);
        assert_eq!(out["latency.count"], 100.0);
        assert_eq!(out["latency.min"], 1.0);
        assert_eq!(out["latency.max"], 100.0);
        assert_eq!(out["latency.mean"], 50.5);
        assert_eq!(out["latency.std-dev"], snap.std_dev());
    }

    #[test]
    fn meter_emits_count_and_rates() {
        let out = flattened("jobs", MetricSnapshot::Meter(meter_snapshot()));
        assert_eq!(out.len(), 5);
        assert_eq!(out["jobs.count"], 30.0);
        assert_eq!(out["jobs.one-minute"], 1.5);
        assert_eq!(out["jobs.five-minute"], 1.25);
        assert_eq!(out["jobs.fifteen-minute"], 1.125);
        assert_eq!(out["jobs.mean"], 0.5);
    }

    #[test]
    fn timer_mean_rate_overwrites_mean_duration() {
        let timer = TimerSnapshot {
            histogram: hist_1_to_100(),
            meter: meter_snapshot(),
        };
        let out = flattened("req", MetricSnapshot::Timer(timer));

        // 8 histogram keys + 4 rate keys, `.mean` shared.
        assert_eq!(out.len(), 11);
        for suffix in [
            "count",
            "min",
            "max",
            "mean",
            "std-dev",
            "50-percentile",
            "75-percentile",
            "95-percentile",
            "one-minute",
            "five-minute",
            "fifteen-minute",
        ] {
            assert!(out.contains_key(&format!("req.{suffix}")), "missing {suffix}");
        }
        assert_eq!(out["req.mean"], 0.5);
        assert_eq!(out["req.count"], 100.0);
    }

    #[test]
    fn unknown_kinds_are_skipped() {
        let src = source(vec![("mystery", MetricSnapshot::Unknown)]);
        assert!(encode(&src, "p", TS).is_empty());
    }

    #[test]
    fn empty_base_name_drops_leading_separator() {
        let src = source(vec![("", MetricSnapshot::Meter(meter_snapshot()))]);
        let lines = encode(&src, "prefix", TS);
        assert!(lines.contains(&format!("gauge prefix.count 30.000000 {TS}\n")));
        assert!(lines.iter().all(|l| !l.starts_with("gauge prefix..")));
    }

    #[test]
    fn format_line_matches_wire_shape() {
        assert_eq!(
            format_line("svc", "db.query.95-percentile", 12.5, 42),
            "gauge svc.db.query.95-percentile 12.500000 42\n"
        );
        assert_eq!(format_line("svc", "count", 1.0, 42), "gauge svc.count 1.000000 42\n");
    }

    #[test]
    fn one_line_per_key_across_colliding_metrics() {
        // A counter literally named `x.count` collides with meter `x`'s
        // count; only one line may be sent for the key.
        let src = source(vec![
            ("x.count", MetricSnapshot::Counter(1)),
            ("x", MetricSnapshot::Meter(meter_snapshot())),
        ]);
        let lines = encode(&src, "p", TS);
        let count_lines = lines.iter().filter(|l| l.starts_with("gauge p.x.count ")).count();
        assert_eq!(count_lines, 1);
    }

    #[test]
    fn empty_base_name_and_bare_name_share_one_line() {
        let src = source(vec![
            ("count", MetricSnapshot::Counter(1)),
            ("", MetricSnapshot::Meter(meter_snapshot())),
        ]);
        let lines = encode(&src, "p", TS);
        let count_lines: Vec<&String> =
            lines.iter().filter(|l| l.starts_with("gauge p.count ")).collect();
        // The later metric wins, as with any other key collision.
        assert_eq!(count_lines, vec![&format!("gauge p.count 30.000000 {TS}\n")]);

        let keys = flattened("", MetricSnapshot::Meter(meter_snapshot()));
        assert!(keys.keys().all(|k| !k.starts_with(SEPARATOR)), "keys: {keys:?}");
    }

    #[test]
    fn encodes_a_live_registry() {
        let registry = Registry::new();
        registry.counter("requests").unwrap().inc(3);
        registry.histogram("sizes").unwrap().update(512);
        let meter = Meter::with_start(Instant::now());
        meter.mark(2);
        registry
            .register("events", instrumental_metrics::Metric::Meter(meter.into()))
            .unwrap();

        let lines = encode(&registry, "host", TS);
        // 1 counter + 8 histogram + 5 meter.
        assert_eq!(lines.len(), 14);
        assert!(lines.contains(&format!("gauge host.requests 3.000000 {TS}\n")));
        assert!(lines.contains(&format!("gauge host.sizes.max 512.000000 {TS}\n")));
        assert!(lines.contains(&format!("gauge host.events.count 2.000000 {TS}\n")));
        assert!(lines.iter().all(|l| l.ends_with(&format!(" {TS}\n"))));
    }

    #[test]
    fn unix_now_is_after_2020() {
        assert!(unix_now() > 1_577_836_800);
    }
}
