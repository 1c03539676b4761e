//! Report ranking and selection.

use std::collections::HashSet;

use tracing::info;

use nclip_models::{Report, ScrapedReport};

use crate::collaborators::{RankingCandidate, RankingScore, ReportRanker};
use crate::error::{PipelineError, PipelineResult};

const RANKER: &str = "ranker";

/// How many of the best reports are logged after ranking.
const LOGGED_TOP: usize = 3;

/// Candidates sent to the ranker, indexed by input position.
pub fn candidates(scraped: &[ScrapedReport]) -> Vec<RankingCandidate> {
    scraped
        .iter()
        .enumerate()
        .map(|(index, r)| RankingCandidate {
            index,
            title: r.title.clone(),
            summary: r.summary.clone(),
        })
        .collect()
}

/// Merge ranker scores back onto their reports, best first.
///
/// Any index that does not round-trip, a repeated index, or a score outside
/// the 1-10 scale is treated as malformed ranker output. Reports the ranker
/// did not score are dropped. Ties keep input order.
pub fn merge_scores(scraped: &[ScrapedReport], scores: Vec<RankingScore>) -> PipelineResult<Vec<Report>> {
    let mut seen = HashSet::with_capacity(scores.len());
    let mut ranked = Vec::with_capacity(scores.len());

    for score in scores {
        let index = usize::try_from(score.index)
            .ok()
            .filter(|i| *i < scraped.len())
            .ok_or_else(|| {
                PipelineError::upstream(RANKER, format!("unknown report index {}", score.index))
            })?;
        if !seen.insert(index) {
            return Err(PipelineError::upstream(
                RANKER,
                format!("report index {index} scored twice"),
            ));
        }
        let report = Report::scored(scraped[index].clone(), score.score, score.justification)
            .map_err(|e| PipelineError::upstream(RANKER, e.to_string()))?;
        ranked.push((index, report));
    }

    ranked.sort_by(|(ia, a), (ib, b)| {
        b.newsworthiness_score
            .cmp(&a.newsworthiness_score)
            .then(ia.cmp(ib))
    });
    Ok(ranked.into_iter().map(|(_, r)| r).collect())
}

/// Score every scraped report and return them best first.
pub async fn rank_reports(
    scraped: &[ScrapedReport],
    ranker: &dyn ReportRanker,
) -> PipelineResult<Vec<Report>> {
    if scraped.is_empty() {
        return Err(PipelineError::upstream("reports", "no reports to rank"));
    }
    let scores = ranker.rank(&candidates(scraped)).await?;
    let ranked = merge_scores(scraped, scores)?;

    for (place, report) in ranked.iter().take(LOGGED_TOP).enumerate() {
        info!(
            place = place + 1,
            score = report.newsworthiness_score,
            title = %report.title,
            justification = %report.justification,
            "Ranked report"
        );
    }
    Ok(ranked)
}

/// The most newsworthy report.
pub fn select_best(ranked: Vec<Report>) -> PipelineResult<Report> {
    ranked
        .into_iter()
        .next()
        .ok_or_else(|| PipelineError::upstream(RANKER, "ranking returned no reports"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    fn scraped(n: usize) -> Vec<ScrapedReport> {
        (0..n)
            .map(|i| {
                ScrapedReport::new(
                    format!("Rapport {i}"),
                    format!("Resumé {i}"),
                    "Politiet rykkede ud.",
                    format!("https://politi.dk/rapport/{i}"),
                )
                .unwrap()
            })
            .collect()
    }

    fn score(index: i64, score: i64) -> RankingScore {
        RankingScore {
            index,
            score,
            justification: format!("score {score}"),
        }
    }

    struct FixedRanker(Vec<RankingScore>);

    #[async_trait]
    impl ReportRanker for FixedRanker {
        async fn rank(&self, candidates: &[RankingCandidate]) -> PipelineResult<Vec<RankingScore>> {
            assert!(candidates.iter().enumerate().all(|(i, c)| c.index == i));
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_merge_sorts_descending_and_stable() {
        let ranked = merge_scores(&scraped(4), vec![score(0, 5), score(1, 9), score(2, 5), score(3, 7)]).unwrap();
        let titles: Vec<_> = ranked.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Rapport 1", "Rapport 3", "Rapport 0", "Rapport 2"]);
    }

    #[test]
    fn test_merge_rejects_unknown_index() {
        let err = merge_scores(&scraped(2), vec![score(5, 8)]).unwrap_err();
        assert!(matches!(err, PipelineError::UpstreamService { .. }));
        assert!(merge_scores(&scraped(2), vec![score(-1, 8)]).is_err());
    }

    #[test]
    fn test_merge_rejects_duplicate_index() {
        assert!(merge_scores(&scraped(2), vec![score(1, 8), score(1, 3)]).is_err());
    }

    #[test]
    fn test_merge_rejects_out_of_range_score() {
        assert!(merge_scores(&scraped(2), vec![score(0, 11)]).is_err());
        assert!(merge_scores(&scraped(2), vec![score(0, 0)]).is_err());
    }

    #[tokio::test]
    async fn test_rank_and_select_best() {
        let ranker = FixedRanker(vec![score(0, 3), score(1, 8), score(2, 6)]);
        let ranked = rank_reports(&scraped(3), &ranker).await.unwrap();
        let best = select_best(ranked).unwrap();
        assert_eq!(best.title, "Rapport 1");
        assert_eq!(best.newsworthiness_score, 8);
    }

    #[tokio::test]
    async fn test_rank_empty_input_fails() {
        let ranker = FixedRanker(vec![]);
        assert!(rank_reports(&[], &ranker).await.is_err());
        assert!(select_best(vec![]).is_err());
    }
}
