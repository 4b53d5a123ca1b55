//! Top-level footage pipeline.
//!
//! Wires the stages together for one segment: analysis, per-query search,
//! merge/dedup, text scoring, screenshot capture for the visual top-N,
//! visual validation, ranking, and retrieval with fallback. All browser
//! work runs sequentially on one shared driver.

use tracing::{info, warn};

use newsreel_browser::{PlatformBrowser, SessionManager};
use newsreel_models::{
    MatchResult, PipelineStage, ProgressUpdate, RetrievalReport, SearchAnalysis, Segment,
};

use crate::analysis::SegmentAnalyzer;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::model::ModelClient;
use crate::progress::ProgressSink;
use crate::rank::rank_candidates;
use crate::retrieval::RetrievalOrchestrator;
use crate::score::score_candidate;
use crate::search::{dedupe_candidates, CandidateSearch};
use crate::visual::VisualValidator;

/// Caller-supplied options for one pipeline run.
#[derive(Default)]
pub struct MatchOptions {
    /// Screenshot of the segment itself; enables the advisory
    /// person-confirmation call when a named person is required.
    pub segment_screenshot: Option<Vec<u8>>,

    /// Override for result links collected per query.
    pub limit_per_query: Option<usize>,
}

/// The discovery-ranking-retrieval pipeline for one segment.
pub struct FootagePipeline {
    config: EngineConfig,
    session: SessionManager,
    analyzer: SegmentAnalyzer,
    search: CandidateSearch,
    validator: VisualValidator,
    orchestrator: RetrievalOrchestrator,
}

impl FootagePipeline {
    pub fn new(config: EngineConfig, session: SessionManager, model: ModelClient) -> Self {
        let analyzer = SegmentAnalyzer::new(model.clone());
        let validator = VisualValidator::new(model, config.visual_top_n, config.visual_pacing);
        let search = CandidateSearch::new(config.clone());
        let orchestrator = RetrievalOrchestrator::new(config.clone());

        Self {
            config,
            session,
            analyzer,
            search,
            validator,
            orchestrator,
        }
    }

    /// Discover and rank candidates for a segment.
    pub async fn match_segment(
        &mut self,
        driver: &PlatformBrowser,
        segment: &Segment,
        options: &MatchOptions,
        progress: &dyn ProgressSink,
    ) -> EngineResult<MatchResult> {
        self.ensure_session().await?;
        self.session.restore(driver).await?;

        progress.update(ProgressUpdate::stage(
            PipelineStage::Analyzing,
            "Analyzing segment",
        ));
        let analysis = self.analyzer.analyze(segment).await?;
        let person_mode = analysis.person_mode();

        if let Some(screenshot) = options
            .segment_screenshot
            .as_deref()
            .filter(|_| person_mode)
        {
            // Advisory only; the ranker works from per-candidate visuals.
            if let Some(confirmation) = self.analyzer.confirm_person(screenshot, &analysis).await {
                info!(
                    is_person = confirmation.is_person,
                    confidence = confirmation.confidence,
                    "Segment person confirmation"
                );
                progress.update(ProgressUpdate::log(format!(
                    "Person check on segment frame: {} (confidence {:.2})",
                    if confirmation.is_person { "match" } else { "no match" },
                    confirmation.confidence,
                )));
            }
        }

        let candidates = self
            .run_searches(driver, &analysis, options, progress)
            .await?;

        progress.update(ProgressUpdate::stage(
            PipelineStage::Scoring,
            format!("Scoring {} candidates", candidates.len()),
        ));
        let mut candidates = candidates;
        for candidate in &mut candidates {
            let text_score = score_candidate(candidate, &analysis);
            info!(
                url = %candidate.url,
                score = text_score.score,
                rules = text_score.signals.len(),
                "Text score"
            );
            candidate.text_score = Some(text_score);
        }
        candidates.sort_by_key(|c| std::cmp::Reverse(c.text_score_value()));

        progress.update(ProgressUpdate::stage(
            PipelineStage::Validating,
            "Validating top candidates",
        ));
        let top_n = self.config.visual_top_n.min(candidates.len());
        for index in 0..top_n {
            progress.update(ProgressUpdate::item(
                PipelineStage::Validating,
                index as u32 + 1,
                top_n as u32,
            ));
            if candidates[index].screenshot.is_none() {
                let url = candidates[index].url.clone();
                candidates[index].screenshot =
                    self.search.capture_screenshot(driver, &url).await;
            }
        }
        self.validator
            .validate_top(&mut candidates, &analysis, person_mode)
            .await;

        progress.update(ProgressUpdate::stage(
            PipelineStage::Ranking,
            "Ranking candidates",
        ));
        rank_candidates(&mut candidates, person_mode);

        // Successful authenticated interaction: refresh the cookie jar.
        if let Err(e) = self.session.persist_from(driver).await {
            warn!(error = %e, "Failed to refresh cookie jar after matching");
        }

        Ok(MatchResult {
            videos: candidates,
            context: Some(analysis),
        })
    }

    /// Match a segment and download the best candidate, falling back
    /// through the ranked alternatives.
    pub async fn download_best(
        &mut self,
        driver: &PlatformBrowser,
        segment: &Segment,
        options: &MatchOptions,
        progress: &dyn ProgressSink,
    ) -> EngineResult<RetrievalReport> {
        let matched = self.match_segment(driver, segment, options, progress).await?;

        progress.update(ProgressUpdate::stage(
            PipelineStage::Downloading,
            format!("Downloading best of {} candidates", matched.videos.len()),
        ));

        let report = self
            .orchestrator
            .download_ranked(driver, &matched.videos)
            .await;

        if report.outcome.is_success() {
            if let Err(e) = self.session.persist_from(driver).await {
                warn!(error = %e, "Failed to refresh cookie jar after download");
            }
        } else {
            progress.update(ProgressUpdate::error(report.outcome.skip_reason()));
        }

        // End-of-run lifecycle for the per-run screenshot cache.
        self.search.clear_cache();

        Ok(report)
    }

    /// Run every generated query, merging candidates with URL-dedup.
    async fn run_searches(
        &self,
        driver: &PlatformBrowser,
        analysis: &SearchAnalysis,
        options: &MatchOptions,
        progress: &dyn ProgressSink,
    ) -> EngineResult<Vec<newsreel_models::Candidate>> {
        let limit = options
            .limit_per_query
            .unwrap_or(self.config.search_result_limit);
        let queries: Vec<&String> = analysis
            .queries
            .iter()
            .take(self.config.max_queries)
            .collect();
        let total = queries.len() as u32;

        let mut all = Vec::new();
        for (index, query) in queries.into_iter().enumerate() {
            progress.update(ProgressUpdate::item_with_message(
                PipelineStage::Searching,
                index as u32 + 1,
                total,
                query.clone(),
            ));

            match self
                .search
                .search(driver, query, limit, index as u32)
                .await
            {
                Ok(candidates) => all.extend(candidates),
                Err(e) => {
                    // One bad query is not fatal; the others still run.
                    warn!(query = %query, error = %e, "Search query failed");
                    progress.update(ProgressUpdate::error(format!(
                        "Search failed for {:?}: {}",
                        query, e
                    )));
                }
            }
        }

        let merged = dedupe_candidates(all);
        if merged.is_empty() {
            return Err(EngineError::search_failed(
                "No candidates found for any generated query",
            ));
        }

        info!(candidates = merged.len(), "Merged candidates across queries");
        Ok(merged)
    }

    /// Invisible session check; a missing or expired session surfaces as
    /// "needs login" and is never auto-retried.
    async fn ensure_session(&self) -> EngineResult<()> {
        let verification = self.session.verify_headless().await?;
        if verification.needs_login {
            return Err(EngineError::session_invalid(
                "Saved platform session is missing or expired; run the login flow",
            ));
        }
        Ok(())
    }
}
