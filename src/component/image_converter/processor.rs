use super::artifact_policy::{ArtifactPolicy, has_artifact};
use super::cache_invalidator::CacheInvalidator;
use super::codec::ImageCodec;
use super::work_key::WorkKey;
use crate::config::OutputFormat;
use crate::tools::{ConcurrencyBudget, ensure_parent_exists};
use anyhow::{Context, Result};
use log::{debug, error, info, trace, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatOutcome {
    Converted,
    AlreadyPresent,
    Failed(String),
}

/// 單一來源檔的處理結果，每個設定格式一筆
///
/// 不需要處理的來源（副檔名不符或全部格式都已產出）結果為空。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessReport {
    pub outcomes: Vec<(OutputFormat, FormatOutcome)>,
}

impl ProcessReport {
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.outcomes.is_empty()
    }

    #[must_use]
    pub fn converted_count(&self) -> usize {
        self.count(|outcome| *outcome == FormatOutcome::Converted)
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.count(|outcome| matches!(outcome, FormatOutcome::Failed(_)))
    }

    fn count(&self, predicate: impl Fn(&FormatOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| predicate(o)).count()
    }
}

/// 將一個來源檔轉成所有設定的格式
///
/// 每次呼叫編碼器前取得一個並行額度，編碼結束（成功或失敗）立即歸還。
/// 單一格式失敗不影響其他格式。
pub struct ConversionProcessor {
    policy: Arc<ArtifactPolicy>,
    codec: Arc<dyn ImageCodec>,
    invalidator: Arc<dyn CacheInvalidator>,
    budget: ConcurrencyBudget,
}

impl ConversionProcessor {
    #[must_use]
    pub fn new(
        policy: Arc<ArtifactPolicy>,
        codec: Arc<dyn ImageCodec>,
        invalidator: Arc<dyn CacheInvalidator>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            policy,
            codec,
            invalidator,
            budget: ConcurrencyBudget::new(max_concurrency),
        }
    }

    #[must_use]
    pub const fn budget(&self) -> &ConcurrencyBudget {
        &self.budget
    }

    pub fn process(&self, key: &WorkKey) -> ProcessReport {
        let source = key.path();
        if !self.policy.needs_processing(source) {
            trace!("無需處理: {key}");
            return ProcessReport::default();
        }

        let outcomes = self
            .policy
            .formats()
            .iter()
            .map(|format| (format.clone(), self.process_format(source, format)))
            .collect();

        ProcessReport { outcomes }
    }

    fn process_format(&self, source: &Path, format: &OutputFormat) -> FormatOutcome {
        let Some(target) = self.policy.artifact_path(source, format) else {
            let message = format!("來源不在上傳資料夾內: {}", source.display());
            error!("{message}");
            return FormatOutcome::Failed(message);
        };

        if has_artifact(&target) {
            debug!("[略過] {} 已存在", target.display());
            return FormatOutcome::AlreadyPresent;
        }

        match self.convert(source, &target, format) {
            Ok(elapsed) => {
                info!(
                    "轉檔完成: {} -> {} ({}ms)",
                    source.display(),
                    target.display(),
                    elapsed.as_millis()
                );
                if let Err(e) = self.invalidator.purge(&target) {
                    warn!("CDN 快取清除失敗 {}: {e:#}", target.display());
                }
                FormatOutcome::Converted
            }
            Err(e) => {
                error!(
                    "轉檔失敗 {} -> {}: {e:#}",
                    source.display(),
                    target.display()
                );
                FormatOutcome::Failed(format!("{e:#}"))
            }
        }
    }

    fn convert(&self, source: &Path, target: &Path, format: &OutputFormat) -> Result<Duration> {
        let _permit = self.budget.acquire();
        let started = Instant::now();

        ensure_parent_exists(target)?;
        info!(
            "開始轉檔: {} -> {}",
            source.file_name().unwrap_or_default().to_string_lossy(),
            target.display()
        );
        self.codec
            .convert(source, target, format)
            .with_context(|| format!("{format} 編碼失敗"))?;

        Ok(started.elapsed())
    }
}
