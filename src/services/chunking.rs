//! Pure decomposition functions (spec.md §4.5 step 5), kept free of the
//! pool and broker so they are unit-testable without a database — the
//! same separation `dsl-core` draws between its parser/validator and the
//! service layer that invokes them.

use uuid::Uuid;

use crate::config::ChunkStrategy;
use crate::dispatcher::{TaskKind, TaskPayload};

/// One unit of dispatchable work: the task kind to enqueue plus its
/// payload, and — under the range form only — the range it covers.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    pub kind: TaskKind,
    pub payload: TaskPayload,
    pub range: Option<(u32, u32)>,
}

/// Splits `keywords × engines` into one chunk per pair, each capped at
/// `ceil(max_images / total_chunks)` images (spec.md §4.5 step 5,
/// keyword-engine form: payload `{job_id, keyword: k, engine: e,
/// per_chunk_cap}`).
pub fn keyword_engine_chunks(
    job_id: Uuid,
    keywords: &[String],
    engines: &[String],
    max_images: u32,
) -> Vec<ChunkPlan> {
    let total_chunks = (keywords.len() * engines.len()) as u32;
    if total_chunks == 0 {
        return Vec::new();
    }
    let per_chunk_cap = max_images.div_ceil(total_chunks);

    let mut plans = Vec::with_capacity(total_chunks as usize);
    for keyword in keywords {
        for engine in engines {
            let payload = TaskPayload::new()
                .with("job_id", job_id.to_string())
                .with("keyword", keyword.as_str())
                .with("engine", engine.as_str())
                .with("per_chunk_cap", per_chunk_cap);
            plans.push(ChunkPlan {
                kind: TaskKind::Download,
                payload,
                range: None,
            });
        }
    }
    plans
}

/// Splits `[0, max_images)` into half-open, contiguous ranges of
/// `chunk_size`, the final range possibly shorter (spec.md §4.5 step 5,
/// range form; spec.md §3 JobChunk invariants: non-overlapping, widths
/// sum to `max_images`).
pub fn image_range_chunks(job_id: Uuid, max_images: u32, chunk_size: u32) -> Vec<ChunkPlan> {
    if max_images == 0 || chunk_size == 0 {
        return Vec::new();
    }

    let mut plans = Vec::new();
    let mut start = 0u32;
    while start < max_images {
        let end = (start + chunk_size).min(max_images);
        let payload = TaskPayload::new()
            .with("job_id", job_id.to_string())
            .with("range_start", start)
            .with("range_end", end);
        plans.push(ChunkPlan {
            kind: TaskKind::Download,
            payload,
            range: Some((start, end)),
        });
        start = end;
    }
    plans
}

/// Dispatches to the configured strategy (spec.md §9 "a configuration
/// switch, not guessed from incomplete source").
pub fn decompose(
    strategy: ChunkStrategy,
    job_id: Uuid,
    keywords: &[String],
    engines: &[String],
    max_images: u32,
) -> Vec<ChunkPlan> {
    match strategy {
        ChunkStrategy::KeywordEngine => keyword_engine_chunks(job_id, keywords, engines, max_images),
        ChunkStrategy::ImageRange { chunk_size } => {
            image_range_chunks(job_id, max_images, chunk_size)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_engine_product_matches_cardinality() {
        let job_id = Uuid::new_v4();
        let keywords = vec!["cat".to_string(), "dog".to_string()];
        let engines = vec!["google".to_string(), "bing".to_string()];
        let plans = keyword_engine_chunks(job_id, &keywords, &engines, 100);
        assert_eq!(plans.len(), 4);
    }

    #[test]
    fn keyword_engine_payload_carries_job_id() {
        let job_id = Uuid::new_v4();
        let keywords = vec!["cat".to_string()];
        let engines = vec!["google".to_string()];
        let plans = keyword_engine_chunks(job_id, &keywords, &engines, 10);
        assert_eq!(plans[0].payload.as_value()["job_id"], job_id.to_string());
    }

    #[test]
    fn keyword_engine_per_chunk_cap_divides_evenly_when_possible() {
        let job_id = Uuid::new_v4();
        let keywords = vec!["x".to_string()];
        let engines = vec!["e1".to_string(), "e2".to_string()];
        let plans = keyword_engine_chunks(job_id, &keywords, &engines, 100);
        for plan in &plans {
            assert_eq!(plan.payload.as_value()["per_chunk_cap"], 50);
        }
    }

    #[test]
    fn keyword_engine_per_chunk_cap_rounds_up() {
        let job_id = Uuid::new_v4();
        let keywords = vec!["x".to_string()];
        let engines = vec!["e1".to_string(), "e2".to_string(), "e3".to_string()];
        let plans = keyword_engine_chunks(job_id, &keywords, &engines, 100);
        // ceil(100 / 3) = 34
        for plan in &plans {
            assert_eq!(plan.payload.as_value()["per_chunk_cap"], 34);
        }
    }

    #[test]
    fn image_range_chunks_are_contiguous_and_sum_to_max_images() {
        let job_id = Uuid::new_v4();
        let plans = image_range_chunks(job_id, 100, 30);
        let ranges: Vec<(u32, u32)> = plans.iter().map(|p| p.range.unwrap()).collect();
        assert_eq!(ranges, vec![(0, 30), (30, 60), (60, 90), (90, 100)]);

        let total_width: u32 = ranges.iter().map(|(s, e)| e - s).sum();
        assert_eq!(total_width, 100);
    }

    #[test]
    fn image_range_chunks_exact_multiple_has_no_short_tail() {
        let job_id = Uuid::new_v4();
        let plans = image_range_chunks(job_id, 90, 30);
        assert_eq!(plans.len(), 3);
        assert_eq!(plans.last().unwrap().range, Some((60, 90)));
    }

    #[test]
    fn empty_keywords_or_engines_yields_no_chunks() {
        let job_id = Uuid::new_v4();
        assert!(keyword_engine_chunks(job_id, &[], &["e".to_string()], 10).is_empty());
        assert!(keyword_engine_chunks(job_id, &["k".to_string()], &[], 10).is_empty());
    }
}
