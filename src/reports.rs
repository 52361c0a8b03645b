//! Tenant-scoped reporting over vehicle-entry history.
//!
//! Every bucket label is computed from the configured local calendar
//! (`FixedOffset` injected at construction), never from UTC components.
//! An entry stamped `02:30Z` under a UTC-3 calendar belongs to the
//! previous local day. Most of this module's tests pin that rule down.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::entry::VehicleEntry;
use crate::store::EntryRepository;

const VEHICLE_REPORT_LIMIT: i64 = 100;
pub const DEFAULT_TRAILING_DAYS: u32 = 7;

/// Grouping granularity for the peak-hours report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    Day,
    Month,
    Year,
}

/// Inclusive local calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn single(date: NaiveDate) -> Self {
        Self { start: date, end: date }
    }
}

/// Reporting window for the peak-hours report.
#[derive(Debug, Clone, Copy)]
pub enum PeakWindow {
    /// Trailing `days` ending today.
    TrailingDays(u32),
    /// Explicit inclusive date range.
    Range(DateRange),
    /// From the tenant's first entry to its last.
    AllTime,
}

// ── Report payloads ──────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct DailyMovementReport {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_entries: i64,
    pub total_exits: i64,
    /// Live snapshot — deliberately not scoped to the date range.
    pub currently_parked: i64,
    pub unique_vehicles: i64,
    /// Mean minutes over records with both entry and exit in range.
    pub avg_parking_duration: Option<i64>,
    pub peak_hour: Option<u32>,
    pub entries_by_hour: BTreeMap<u32, i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_breakdown: Option<Vec<DayMovement>>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct DayMovement {
    pub date: NaiveDate,
    pub entries: i64,
    pub exits: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PeakBucket {
    pub label: String,
    pub entries: i64,
    pub exits: i64,
    /// Equals `entries`: exits are reported for display but excluded
    /// from the movement total.
    pub total_movements: i64,
}

#[derive(Debug, Serialize)]
pub struct PeakHoursReport {
    pub period: String,
    pub group_by: Granularity,
    pub data: Vec<PeakBucket>,
    pub highest_peak: Option<String>,
    pub avg_movements: i64,
}

#[derive(Debug, Serialize)]
pub struct VehicleReport {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_vehicles: i64,
    pub avg_duration: Option<i64>,
    pub min_duration: Option<i64>,
    pub max_duration: Option<i64>,
    pub vehicles: Vec<VehicleReportRow>,
}

#[derive(Debug, Serialize)]
pub struct VehicleReportRow {
    pub id: Uuid,
    pub plate: String,
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
    /// Minutes; null while the vehicle is still parked.
    pub duration: Option<i64>,
    pub client_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ParkedSnapshot {
    pub count: usize,
    pub vehicles: Vec<ParkedVehicleRow>,
}

#[derive(Debug, Serialize)]
pub struct ParkedVehicleRow {
    pub id: Uuid,
    pub plate: String,
    pub spot_number: Option<String>,
    pub client_name: Option<String>,
    pub entry_time: DateTime<Utc>,
    /// `{hours}h {minutes}m` since entry.
    pub elapsed: String,
}

// ── Aggregator ───────────────────────────────────────────────

#[derive(Clone)]
pub struct ReportAggregator {
    entries: Arc<dyn EntryRepository>,
    tz: FixedOffset,
}

impl ReportAggregator {
    pub fn new(entries: Arc<dyn EntryRepository>, tz: FixedOffset) -> Self {
        Self { entries, tz }
    }

    /// Today in the configured calendar.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.tz).date_naive()
    }

    fn require_tenant(tenant: Option<Uuid>) -> Result<Uuid, AppError> {
        tenant.ok_or_else(|| {
            AppError::Forbidden("session is not associated with a tenant".into())
        })
    }

    /// Half-open UTC instants covering the inclusive local date range.
    fn bounds(&self, range: DateRange) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            self.local_midnight(range.start),
            self.local_midnight(range.end + Days::new(1)),
        )
    }

    fn local_midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        let midnight = date.and_time(NaiveTime::MIN);
        match midnight.and_local_timezone(self.tz) {
            chrono::LocalResult::Single(dt) => dt.with_timezone(&Utc),
            // Unreachable for a fixed offset.
            _ => DateTime::from_naive_utc_and_offset(midnight, Utc),
        }
    }

    fn local_date(&self, ts: DateTime<Utc>) -> NaiveDate {
        ts.with_timezone(&self.tz).date_naive()
    }

    pub async fn daily_movement(
        &self,
        tenant: Option<Uuid>,
        range: DateRange,
    ) -> Result<DailyMovementReport, AppError> {
        let tenant = Self::require_tenant(tenant)?;
        let (start, end) = self.bounds(range);

        let (total_entries, total_exits, currently_parked, entries, exits) = tokio::try_join!(
            self.entries.count_entries_between(tenant, start, end),
            self.entries.count_exits_between(tenant, start, end),
            self.entries.count_parked(tenant),
            self.entries.entries_between(tenant, start, end),
            self.entries.exits_between(tenant, start, end),
        )?;

        let unique_vehicles = entries
            .iter()
            .map(|e| e.plate.as_str())
            .collect::<HashSet<_>>()
            .len() as i64;

        let completed: Vec<i64> = entries
            .iter()
            .filter_map(|e| {
                e.exit_time
                    .filter(|x| *x >= start && *x < end)
                    .map(|exit| (exit - e.entry_time).num_minutes())
            })
            .collect();
        let avg_parking_duration = mean_rounded(&completed);

        let mut entries_by_hour: BTreeMap<u32, i64> = BTreeMap::new();
        for e in &entries {
            let hour = e.entry_time.with_timezone(&self.tz).hour();
            *entries_by_hour.entry(hour).or_default() += 1;
        }
        // Ascending iteration makes the smallest hour win ties.
        let mut peak_hour = None;
        let mut peak_count = 0i64;
        for (hour, count) in &entries_by_hour {
            if *count > peak_count {
                peak_count = *count;
                peak_hour = Some(*hour);
            }
        }

        let daily_breakdown = if range.start != range.end {
            let mut per_day: BTreeMap<NaiveDate, (i64, i64)> = BTreeMap::new();
            for e in &entries {
                per_day.entry(self.local_date(e.entry_time)).or_default().0 += 1;
            }
            for e in &exits {
                if let Some(exit) = e.exit_time {
                    per_day.entry(self.local_date(exit)).or_default().1 += 1;
                }
            }
            Some(
                per_day
                    .into_iter()
                    .map(|(date, (entries, exits))| DayMovement { date, entries, exits })
                    .collect(),
            )
        } else {
            None
        };

        Ok(DailyMovementReport {
            start_date: range.start,
            end_date: range.end,
            total_entries,
            total_exits,
            currently_parked,
            unique_vehicles,
            avg_parking_duration,
            peak_hour,
            entries_by_hour,
            daily_breakdown,
        })
    }

    pub async fn peak_hours(
        &self,
        tenant: Option<Uuid>,
        group_by: Granularity,
        window: PeakWindow,
    ) -> Result<PeakHoursReport, AppError> {
        let tenant = Self::require_tenant(tenant)?;

        let (period, range) = match window {
            PeakWindow::TrailingDays(days) => {
                let today = self.today();
                (
                    format!("last_{days}_days"),
                    Some(DateRange {
                        start: today - Days::new(u64::from(days)),
                        end: today,
                    }),
                )
            }
            PeakWindow::Range(range) => {
                (format!("{}..{}", range.start, range.end), Some(range))
            }
            PeakWindow::AllTime => match self.entries.entry_time_span(tenant).await? {
                Some((first, last)) => (
                    "all_time".to_string(),
                    Some(DateRange {
                        start: self.local_date(first),
                        end: self.local_date(last),
                    }),
                ),
                // A tenant with no history gets an empty report, not an
                // error.
                None => ("all_time".to_string(), None),
            },
        };

        let Some(range) = range else {
            return Ok(PeakHoursReport {
                period,
                group_by,
                data: vec![],
                highest_peak: None,
                avg_movements: 0,
            });
        };

        let (start, end) = self.bounds(range);
        let (entries, exits) = tokio::try_join!(
            self.entries.entries_between(tenant, start, end),
            self.entries.exits_between(tenant, start, end),
        )?;

        let data = bucketize(&entries, &exits, group_by, self.tz);
        let highest_peak = highest_peak(&data);
        let avg_movements = avg_movements(&data);

        Ok(PeakHoursReport {
            period,
            group_by,
            data,
            highest_peak,
            avg_movements,
        })
    }

    pub async fn vehicle_report(
        &self,
        tenant: Option<Uuid>,
        range: DateRange,
    ) -> Result<VehicleReport, AppError> {
        let tenant = Self::require_tenant(tenant)?;
        let (start, end) = self.bounds(range);

        let (total_vehicles, all_in_range, recent) = tokio::try_join!(
            self.entries.count_entries_between(tenant, start, end),
            self.entries.entries_between(tenant, start, end),
            self.entries
                .recent_entries_between(tenant, start, end, VEHICLE_REPORT_LIMIT),
        )?;

        let durations: Vec<i64> = all_in_range
            .iter()
            .filter_map(|e| {
                e.exit_time
                    .filter(|x| *x >= start && *x < end)
                    .map(|x| (x - e.entry_time).num_minutes())
            })
            .collect();

        Ok(VehicleReport {
            start_date: range.start,
            end_date: range.end,
            total_vehicles,
            avg_duration: mean_rounded(&durations),
            min_duration: durations.iter().min().copied(),
            max_duration: durations.iter().max().copied(),
            vehicles: recent
                .into_iter()
                .map(|e| VehicleReportRow {
                    id: e.id,
                    plate: e.plate.clone(),
                    entry_time: e.entry_time,
                    exit_time: e.exit_time,
                    duration: e.duration_minutes(),
                    client_name: e.client_name,
                })
                .collect(),
        })
    }

    pub async fn parked_snapshot(
        &self,
        tenant: Option<Uuid>,
    ) -> Result<ParkedSnapshot, AppError> {
        let tenant = Self::require_tenant(tenant)?;
        let rows = self.entries.parked(tenant).await?;
        let now = Utc::now();
        let vehicles: Vec<ParkedVehicleRow> = rows
            .into_iter()
            .map(|e| ParkedVehicleRow {
                id: e.id,
                plate: e.plate,
                spot_number: e.spot_number,
                client_name: e.client_name,
                entry_time: e.entry_time,
                elapsed: format_elapsed(now - e.entry_time),
            })
            .collect();
        Ok(ParkedSnapshot {
            count: vehicles.len(),
            vehicles,
        })
    }
}

// ── Bucketing primitives ─────────────────────────────────────

fn bucket_label(ts: DateTime<Utc>, group_by: Granularity, tz: FixedOffset) -> String {
    let local = ts.with_timezone(&tz);
    match group_by {
        Granularity::Hour => local.hour().to_string(),
        Granularity::Day => local.format("%Y-%m-%d").to_string(),
        Granularity::Month => local.format("%Y-%m").to_string(),
        Granularity::Year => local.year().to_string(),
    }
}

/// Union of entry-labels and exit-labels, each bucket carrying its own
/// entry and exit counts, sorted by the natural order of the label.
pub(crate) fn bucketize(
    entries: &[VehicleEntry],
    exits: &[VehicleEntry],
    group_by: Granularity,
    tz: FixedOffset,
) -> Vec<PeakBucket> {
    let mut buckets: HashMap<String, (i64, i64)> = HashMap::new();
    for e in entries {
        buckets
            .entry(bucket_label(e.entry_time, group_by, tz))
            .or_default()
            .0 += 1;
    }
    for e in exits {
        if let Some(exit) = e.exit_time {
            buckets
                .entry(bucket_label(exit, group_by, tz))
                .or_default()
                .1 += 1;
        }
    }

    let mut out: Vec<PeakBucket> = buckets
        .into_iter()
        .map(|(label, (entries, exits))| PeakBucket {
            total_movements: entries,
            label,
            entries,
            exits,
        })
        .collect();
    match group_by {
        // "2" sorts before "10": numeric, never lexicographic.
        Granularity::Hour | Granularity::Year => {
            out.sort_by_key(|b| b.label.parse::<i64>().unwrap_or(i64::MAX))
        }
        // Zero-padded labels sort correctly as strings.
        Granularity::Day | Granularity::Month => out.sort_by(|a, b| a.label.cmp(&b.label)),
    }
    out
}

/// Label with the maximum movement total; ties go to the first label in
/// sorted order.
pub(crate) fn highest_peak(data: &[PeakBucket]) -> Option<String> {
    let mut best: Option<&PeakBucket> = None;
    for bucket in data {
        if best.map_or(true, |b| bucket.total_movements > b.total_movements) {
            best = Some(bucket);
        }
    }
    best.map(|b| b.label.clone())
}

/// Mean of the movement totals, rounded to the nearest integer.
pub(crate) fn avg_movements(data: &[PeakBucket]) -> i64 {
    if data.is_empty() {
        return 0;
    }
    let sum: i64 = data.iter().map(|b| b.total_movements).sum();
    (sum as f64 / data.len() as f64).round() as i64
}

fn mean_rounded(values: &[i64]) -> Option<i64> {
    if values.is_empty() {
        return None;
    }
    let sum: i64 = values.iter().sum();
    Some((sum as f64 / values.len() as f64).round() as i64)
}

/// `{hours}h {minutes}m`, clamped at zero for clock skew.
pub(crate) fn format_elapsed(elapsed: chrono::Duration) -> String {
    let minutes = elapsed.num_minutes().max(0);
    format!("{}h {}m", minutes / 60, minutes % 60)
}

/// Lenient by policy: a malformed date falls back to the given day
/// rather than failing the request.
pub fn parse_date_or(input: Option<&str>, fallback: NaiveDate) -> NaiveDate {
    input
        .and_then(|v| NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d").ok())
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entry::EntryStatus;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn entry_at(entry: DateTime<Utc>, exit: Option<DateTime<Utc>>) -> VehicleEntry {
        VehicleEntry {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            plate: "ABC-1234".into(),
            client_name: None,
            spot_number: None,
            status: if exit.is_some() {
                EntryStatus::Retrieved
            } else {
                EntryStatus::Parked
            },
            entry_time: entry,
            exit_time: exit,
            created_at: entry,
        }
    }

    #[test]
    fn test_hour_labels_sort_numerically() {
        let tz = FixedOffset::east_opt(0).unwrap();
        let entries: Vec<VehicleEntry> = [2, 10, 2, 21]
            .iter()
            .map(|h| entry_at(utc(2026, 3, 1, *h, 0), None))
            .collect();
        let buckets = bucketize(&entries, &[], Granularity::Hour, tz);
        let labels: Vec<&str> = buckets.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["2", "10", "21"]);
        assert_eq!(buckets[0].entries, 2);
    }

    #[test]
    fn test_labels_use_local_calendar_not_utc() {
        // 02:30Z under UTC-3 is 23:30 on the previous local day.
        let tz = FixedOffset::west_opt(3 * 3600).unwrap();
        let e = entry_at(utc(2026, 3, 10, 2, 30), None);
        assert_eq!(bucket_label(e.entry_time, Granularity::Hour, tz), "23");
        assert_eq!(
            bucket_label(e.entry_time, Granularity::Day, tz),
            "2026-03-09"
        );
        assert_eq!(bucket_label(e.entry_time, Granularity::Month, tz), "2026-03");
        assert_eq!(bucket_label(e.entry_time, Granularity::Year, tz), "2026");
    }

    #[test]
    fn test_exits_excluded_from_movement_total() {
        let tz = FixedOffset::east_opt(0).unwrap();
        let entries = vec![entry_at(utc(2026, 3, 1, 9, 0), None)];
        let exits = vec![entry_at(
            utc(2026, 3, 1, 8, 0),
            Some(utc(2026, 3, 1, 14, 0)),
        )];
        let buckets = bucketize(&entries, &exits, Granularity::Hour, tz);
        // Hour 14 exists only via its exit; its movement total is zero.
        let fourteen = buckets.iter().find(|b| b.label == "14").unwrap();
        assert_eq!(fourteen.exits, 1);
        assert_eq!(fourteen.total_movements, 0);
        let nine = buckets.iter().find(|b| b.label == "9").unwrap();
        assert_eq!(nine.total_movements, 1);
        assert_eq!(highest_peak(&buckets).as_deref(), Some("9"));
    }

    #[test]
    fn test_highest_peak_tie_goes_to_first_sorted_label() {
        let tz = FixedOffset::east_opt(0).unwrap();
        let entries = vec![
            entry_at(utc(2026, 3, 1, 12, 0), None),
            entry_at(utc(2026, 3, 1, 7, 0), None),
        ];
        let buckets = bucketize(&entries, &[], Granularity::Hour, tz);
        assert_eq!(highest_peak(&buckets).as_deref(), Some("7"));
    }

    #[test]
    fn test_avg_movements_rounds_to_nearest() {
        let bucket = |label: &str, n: i64| PeakBucket {
            label: label.into(),
            entries: n,
            exits: 0,
            total_movements: n,
        };
        assert_eq!(avg_movements(&[bucket("1", 1), bucket("2", 2)]), 2); // 1.5 → 2
        assert_eq!(avg_movements(&[bucket("1", 1), bucket("2", 1), bucket("3", 2)]), 1); // 1.33 → 1
        assert_eq!(avg_movements(&[]), 0);
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(chrono::Duration::minutes(125)), "2h 5m");
        assert_eq!(format_elapsed(chrono::Duration::minutes(59)), "0h 59m");
        assert_eq!(format_elapsed(chrono::Duration::minutes(-3)), "0h 0m");
    }

    #[test]
    fn test_parse_date_or_falls_back() {
        let fallback = NaiveDate::from_ymd_opt(2026, 8, 7).unwrap();
        assert_eq!(
            parse_date_or(Some("2026-01-02"), fallback),
            NaiveDate::from_ymd_opt(2026, 1, 2).unwrap()
        );
        assert_eq!(parse_date_or(Some("02/01/2026"), fallback), fallback);
        assert_eq!(parse_date_or(Some("garbage"), fallback), fallback);
        assert_eq!(parse_date_or(None, fallback), fallback);
    }
}
