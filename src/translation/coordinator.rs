/*!
 * Translation coordinator.
 *
 * Segments are grouped into units of `batch_size`, every unit is translated
 * against the job context, and at most `concurrency_limit` units are in
 * flight at once. Units complete in any order; results are written back by
 * segment position in the single collecting loop, so identity is never lost.
 *
 * A segment that still fails after the retry budget is marked `Failed` and
 * the remaining segments carry on.
 */

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use std::sync::Arc;

use crate::errors::{PipelineError, ProviderError};
use crate::jobs::cancel::CancelToken;
use crate::providers::TextGenerator;
use crate::segment::{self, Segment};
use crate::translation::context::{missing_terms, JobContext};
use crate::translation::prompts;
use crate::translation::retry::RetryPolicy;

/// Progress callback receiving `(completed, total)` segment counts
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Optional hooks for a translation run
#[derive(Clone, Default)]
pub struct TranslationControl {
    /// Checked before each unit of work and between fallback calls
    pub cancel: Option<CancelToken>,
    /// Called after each unit's results are merged
    pub progress: Option<ProgressCallback>,
}

impl TranslationControl {
    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}

/// One dispatchable piece of work: `(position, segment)` pairs
type Unit = Vec<(usize, Segment)>;

/// Translation results keyed by position in the job's segment list
type UnitResult = Vec<(usize, Result<String, ProviderError>)>;

/// Drives per-segment translation calls for one job
#[derive(Debug, Clone)]
pub struct TranslationCoordinator {
    generator: Arc<dyn TextGenerator>,
    retry: RetryPolicy,
    batch_size: usize,
}

impl TranslationCoordinator {
    /// Coordinator translating one segment per call
    pub fn new(generator: Arc<dyn TextGenerator>, retry: RetryPolicy) -> Self {
        Self {
            generator,
            retry,
            batch_size: 1,
        }
    }

    /// Enable batched mode; values below 1 are treated as 1
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Translate every pending segment.
    ///
    /// The returned list has the input order and every segment is either
    /// `Translated` or `Failed`.
    pub async fn translate_all(
        &self,
        segments: Vec<Segment>,
        context: &JobContext,
        concurrency_limit: usize,
    ) -> Result<Vec<Segment>, PipelineError> {
        self.translate_all_with(segments, context, concurrency_limit, &TranslationControl::default())
            .await
    }

    /// `translate_all` with cancellation and progress reporting.
    ///
    /// Cancellation is honored between units; calls already in flight finish
    /// and the run then ends with `Cancelled`.
    pub async fn translate_all_with(
        &self,
        mut segments: Vec<Segment>,
        context: &JobContext,
        concurrency_limit: usize,
        control: &TranslationControl,
    ) -> Result<Vec<Segment>, PipelineError> {
        segment::validate(&segments)?;
        let pending: Vec<(usize, Segment)> = segments
            .iter()
            .enumerate()
            .filter(|(_, s)| s.state == segment::SegmentState::Pending)
            .map(|(position, s)| (position, s.clone()))
            .collect();
        let total = pending.len();

        let units: Vec<Unit> = pending
            .chunks(self.batch_size)
            .map(<[(usize, Segment)]>::to_vec)
            .collect();

        info!(
            "Translating {} segments in {} units (batch size {}, concurrency {})",
            total,
            units.len(),
            self.batch_size,
            concurrency_limit.max(1)
        );

        let this = self;
        let mut results = stream::iter(units)
            .map(move |unit| async move { this.translate_unit(unit, context, control).await })
            .buffer_unordered(concurrency_limit.max(1));

        let mut completed = 0;
        let mut failed = 0;
        while let Some(unit_result) = results.next().await {
            for (position, outcome) in unit_result {
                let Some(target) = segments.get_mut(position) else {
                    continue;
                };
                match outcome {
                    Ok(text) => {
                        for term in missing_terms(&context.domain_terms, &target.source_text, &text) {
                            debug!("Segment {}: term '{}' not found in translation", target.index, term);
                        }
                        segment::merge_translation(target, text)?;
                    }
                    Err(source) => {
                        let error = PipelineError::SegmentTranslationFailed {
                            index: target.index,
                            source,
                        };
                        warn!("{}", error);
                        segment::mark_failed(target, error.to_string())?;
                        failed += 1;
                    }
                }
                completed += 1;
            }

            if let Some(progress) = &control.progress {
                progress(completed, total);
            }
        }

        if control.is_cancelled() {
            info!("Translation cancelled after {}/{} segments", completed, total);
            return Err(PipelineError::Cancelled);
        }

        info!("Translated {}/{} segments ({} failed)", completed - failed, total, failed);
        Ok(segments)
    }

    async fn translate_unit(&self, unit: Unit, context: &JobContext, control: &TranslationControl) -> UnitResult {
        if control.is_cancelled() {
            return Vec::new();
        }

        if unit.len() > 1 {
            match self.translate_batch(&unit, context).await {
                Ok(texts) => {
                    return unit
                        .iter()
                        .map(|(position, _)| *position)
                        .zip(texts.into_iter().map(Ok))
                        .collect();
                }
                Err(reason) => {
                    warn!(
                        "Batch of segments {}..={} rejected ({}), retrying one by one",
                        unit[0].1.index,
                        unit[unit.len() - 1].1.index,
                        reason
                    );
                }
            }
        }

        let mut results = Vec::with_capacity(unit.len());
        for (position, segment) in &unit {
            if control.is_cancelled() {
                break;
            }
            results.push((*position, self.translate_segment(segment, context).await));
        }
        results
    }

    async fn translate_segment(&self, segment: &Segment, context: &JobContext) -> Result<String, ProviderError> {
        let prompt = prompts::build_segment_prompt(context, segment);
        let reply = self.retry.generate(self.generator.as_ref(), &prompt).await?;
        let text = prompts::clean_translation(&reply);
        if text.is_empty() {
            return Err(ProviderError::ParseError(format!(
                "empty translation for segment {}",
                segment.index
            )));
        }
        Ok(text)
    }

    async fn translate_batch(&self, unit: &Unit, context: &JobContext) -> Result<Vec<String>, String> {
        let refs: Vec<&Segment> = unit.iter().map(|(_, s)| s).collect();
        let indexes: Vec<usize> = refs.iter().map(|s| s.index).collect();

        let prompt = prompts::build_batch_prompt(context, &refs);
        let reply = self
            .retry
            .generate(self.generator.as_ref(), &prompt)
            .await
            .map_err(|e| e.to_string())?;
        prompts::parse_batch_response(&reply, &indexes)
    }
}
