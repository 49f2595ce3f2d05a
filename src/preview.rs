//! # Async Preview Driver
//!
//! Per-page preview rasterization. Pages are independent, so each one
//! rasterizes on its own blocking task and completion order is
//! irrelevant: results are keyed by page index, and a monotonically
//! increasing counter, not arrival order, gates "all pages ready".
//!
//! Staleness: every job carries the generation number it was started
//! with. If the source content changes and a new job begins while an old
//! one is in flight, the old result fails the [`Previewer::accept`]
//! check and must be discarded. Applying a stale render over fresh mark
//! state is a correctness bug, not a performance concern.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::debug;

use crate::error::Error;
use crate::layout::LayoutResult;
use crate::regions::MarkState;
use crate::render::svg::render_page_png;

/// A finished preview: one PNG per page, in page order.
#[derive(Debug, Clone)]
pub struct PreviewPages {
    pub generation: u64,
    pub pages: Vec<Vec<u8>>,
}

/// Issues preview jobs and validates their results against the latest
/// generation.
#[derive(Debug, Default)]
pub struct Previewer {
    generation: AtomicU64,
}

impl Previewer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start rasterizing every page of a layout. Must be called from
    /// within a tokio runtime. Each call supersedes all previous ones.
    pub fn begin(&self, layout: LayoutResult, marks: &MarkState, scale: f32) -> PreviewJob {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let total = layout.pages.len();
        let done = Arc::new(AtomicUsize::new(0));
        let shared = Arc::new((layout, marks.clone()));

        let mut tasks: JoinSet<Result<(usize, Vec<u8>), Error>> = JoinSet::new();
        for index in 0..total {
            let shared = shared.clone();
            let done = done.clone();
            tasks.spawn_blocking(move || {
                let (layout, marks) = &*shared;
                let png =
                    render_page_png(&layout.pages[index], &layout.regions, marks, index, scale)?;
                done.fetch_add(1, Ordering::SeqCst);
                Ok((index, png))
            });
        }

        PreviewJob {
            generation,
            total,
            done,
            tasks,
        }
    }

    /// The latest generation number handed out.
    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Validate a finished preview against the latest generation,
    /// rejecting stale in-flight results.
    pub fn accept(&self, preview: PreviewPages) -> Result<PreviewPages, Error> {
        let current = self.current_generation();
        if preview.generation != current {
            debug!(
                got = preview.generation,
                current, "discarding stale preview render"
            );
            return Err(Error::StaleGeneration {
                got: preview.generation,
                current,
            });
        }
        Ok(preview)
    }
}

/// An in-flight preview render.
pub struct PreviewJob {
    generation: u64,
    total: usize,
    done: Arc<AtomicUsize>,
    tasks: JoinSet<Result<(usize, Vec<u8>), Error>>,
}

impl PreviewJob {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn total_pages(&self) -> usize {
        self.total
    }

    /// How many pages have rasterized so far. Monotonically increasing;
    /// reaches `total_pages` exactly once per job.
    pub fn pages_rendered(&self) -> usize {
        self.done.load(Ordering::SeqCst)
    }

    pub fn is_complete(&self) -> bool {
        self.pages_rendered() == self.total
    }

    /// Await every page task and assemble the pages in index order.
    pub async fn wait(mut self) -> Result<PreviewPages, Error> {
        let mut slots: Vec<Option<Vec<u8>>> = vec![None; self.total];
        while let Some(joined) = self.tasks.join_next().await {
            let (index, png) = joined
                .map_err(|e| Error::Render(format!("preview task failed: {e}")))??;
            slots[index] = Some(png);
        }
        let pages = slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.ok_or_else(|| Error::Render(format!("page {i} never rasterized")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PreviewPages {
            generation: self.generation,
            pages,
        })
    }
}
