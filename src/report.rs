use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Location a test was executed from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Region {
    pub value: String,
    pub label: String,
}

/// One Core Web Vital. `score` is seconds for LCP/FCP and unitless for CLS.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricReport {
    pub score: f64,
    pub display_value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceReport {
    pub cls: MetricReport,
    pub fcp: MetricReport,
    pub lcp: MetricReport,
}

impl DeviceReport {
    pub fn metric(&self, metric: Metric) -> &MetricReport {
        match metric {
            Metric::Cls => &self.cls,
            Metric::Fcp => &self.fcp,
            Metric::Lcp => &self.lcp,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Running,
    Complete,
    Failed,
}

/// A single speed test record as returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpeedTest {
    pub id: String,
    pub date: DateTime<Utc>,
    pub url: String,
    pub status: TestStatus,
    pub region: Region,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desktop_report: Option<DeviceReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile_report: Option<DeviceReport>,
}

impl SpeedTest {
    /// Running tests carry no reports; complete tests carry both.
    pub fn is_well_formed(&self) -> bool {
        let has_reports = self.desktop_report.is_some() && self.mobile_report.is_some();
        match self.status {
            TestStatus::Running => self.desktop_report.is_none() && self.mobile_report.is_none(),
            TestStatus::Complete => has_reports,
            TestStatus::Failed => true,
        }
    }
}

/// Acknowledgement returned when a test is accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StartedTest {
    pub id: String,
    pub status: TestStatus,
}

/// Daily aggregate. Unlike [`MetricReport`], `fcp` and `lcp` are milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendPoint {
    /// Calendar day, `YYYY-MM-DD`.
    pub date: String,
    pub cls: f64,
    pub fcp: f64,
    pub lcp: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Lcp,
    Fcp,
    Cls,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Lcp, Metric::Fcp, Metric::Cls];

    /// Upper bounds (inclusive) for "good" and "needs improvement".
    fn thresholds(self) -> (f64, f64) {
        match self {
            Metric::Lcp => (2.5, 4.0),
            Metric::Fcp => (1.8, 3.0),
            Metric::Cls => (0.1, 0.25),
        }
    }
}

impl std::str::FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lcp" => Ok(Metric::Lcp),
            "fcp" => Ok(Metric::Fcp),
            "cls" => Ok(Metric::Cls),
            other => Err(format!("unknown metric '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Good,
    NeedsImprovement,
    Poor,
}

impl Rating {
    /// Rate a [`MetricReport`] score (seconds for LCP/FCP).
    pub fn for_metric(metric: Metric, score: f64) -> Rating {
        let (good, needs_improvement) = metric.thresholds();
        if score <= good {
            Rating::Good
        } else if score <= needs_improvement {
            Rating::NeedsImprovement
        } else {
            Rating::Poor
        }
    }
}

/// Ratings for every metric of a device report, in LCP, FCP, CLS order.
pub fn rate_report(report: &DeviceReport) -> Vec<(Metric, Rating)> {
    Metric::ALL
        .iter()
        .map(|m| (*m, Rating::for_metric(*m, report.metric(*m).score)))
        .collect()
}
