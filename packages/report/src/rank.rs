//! Top-N ranking of scored wards.

use heat_priority_index_models::ScoredWard;
use serde::Serialize;

/// One line of a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    /// 1-based position.
    pub rank: usize,
    /// Ward display name.
    pub ward_name: String,
    /// Ranking score; missing scores are reported as 0.
    pub score: f64,
}

impl ReportRow {
    /// The row as printed, e.g. `3. Maninagar | Priority: 0.87`.
    #[must_use]
    pub fn line(&self) -> String {
        format!("{}. {} | Priority: {:.2}", self.rank, self.ward_name, self.score)
    }
}

/// The `n` highest-scoring wards, best first.
///
/// Ties keep their input order. Fewer than `n` wards are all returned.
#[must_use]
pub fn top_n(scored: &[ScoredWard], n: usize) -> Vec<ReportRow> {
    let mut ranked: Vec<&ScoredWard> = scored.iter().collect();
    ranked.sort_by(|a, b| b.rank_score().total_cmp(&a.rank_score()));

    ranked
        .into_iter()
        .take(n)
        .enumerate()
        .map(|(i, scored)| ReportRow {
            rank: i + 1,
            ward_name: scored.ward.name.clone(),
            score: scored.rank_score(),
        })
        .collect()
}
