// ===========================================================================
// Cleaning job orchestration
// ===========================================================================
//
// Pass order:
//   load, either directly or through the break pipeline:
//     prepare strokes -> [fix unlinks on strokes] -> break -> load pieces
//   -> clean duplicates + closed polylines
//   -> [fix unlinks on edges, when not breaking]
//   -> [snap endpoints -> clean duplicates + closed polylines]
//   -> merge (intersections | collinear | none)
//   -> clean duplicates + [orphans] + multipart split
//   -> [generate unlinks]
//
// Every pass owns a slice of the 0..100 progress range and the graph is
// checked against its invariants after each one.
// ===========================================================================

use crate::clean::{CleanPasses, CleanStats, clean};
use crate::config::{CleaningConfig, MergeType};
use crate::error::{CleanError, CleanResult};
use crate::feature::{InputFeature, OutputFeature};
use crate::graph_types::{Graph, Marker, MarkerKind};
use crate::merge::{MergeStats, merge_b_intersections, merge_collinear};
use crate::progress::{CancelFlag, JobStatus, ProgressEvent, ProgressReporter};
use crate::snap::{SnapStats, snap_endpoints};
use crate::unlinks::{fix_unlinks, generate_unlinks};
use crate::validation::check_invariants;
use crossbeam::channel::Receiver;
use log::{info, warn};
use serde::Serialize;
use std::thread::JoinHandle;

/// Summary of what a run did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleaningReport {
    pub input_features: usize,
    pub output_features: usize,
    pub output_nodes: usize,
    /// Error markers per kind, kinds with no marker left out.
    pub marker_counts: Vec<(MarkerKind, usize)>,
    pub vertices_nudged: usize,
    pub clusters_snapped: usize,
    pub chains_merged: usize,
    pub unlinks: usize,
}

impl CleaningReport {
    pub fn count(&self, kind: MarkerKind) -> usize {
        self.marker_counts
            .iter()
            .find(|(k, _)| *k == kind)
            .map_or(0, |(_, n)| *n)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleaningOutput {
    pub features: Vec<OutputFeature>,
    pub errors: Vec<Marker>,
    pub unlinks: Vec<Marker>,
    pub report: CleaningReport,
}

#[derive(Debug, Clone)]
pub struct CleaningJob {
    config: CleaningConfig,
}

impl CleaningJob {
    /// Refuses configurations that cannot be run.
    pub fn new(config: CleaningConfig) -> CleanResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CleaningConfig {
        &self.config
    }

    /// Run every configured pass on the calling thread.
    pub fn run(
        &self,
        features: Vec<InputFeature>,
        progress: &mut ProgressReporter,
    ) -> CleanResult<CleaningOutput> {
        let cfg = &self.config;
        let mut report = CleaningReport {
            input_features: features.len(),
            ..Default::default()
        };
        let mut graph = Graph::new();

        report.vertices_nudged = load(&mut graph, features, cfg, progress)?;
        check_invariants(&graph, "load")?;

        progress.begin_stage(20.0, 30.0);
        let mut removed = clean(&mut graph, early_clean(), progress)?;
        check_invariants(&graph, "initial clean")?;

        if cfg.fix_unlinks && !cfg.break_at_vertices {
            progress.begin_stage(30.0, 40.0);
            report.vertices_nudged = fix_unlinks(&mut graph, cfg.unlink_nudge, progress)?;
            check_invariants(&graph, "fix unlinks")?;
        }

        if cfg.snap_threshold > 0.0 {
            progress.begin_stage(40.0, 55.0);
            let snapped: SnapStats = snap_endpoints(&mut graph, cfg.snap_threshold, progress)?;
            report.clusters_snapped = snapped.clusters;
            check_invariants(&graph, "snap")?;
            progress.begin_stage(55.0, 60.0);
            removed += clean(&mut graph, early_clean(), progress)?;
            check_invariants(&graph, "post-snap clean")?;
        }

        progress.begin_stage(60.0, 80.0);
        let merged: MergeStats = match cfg.merge_type {
            MergeType::Intersections => merge_b_intersections(&mut graph, progress)?,
            MergeType::Collinear => merge_collinear(
                &mut graph,
                cfg.collinear_threshold,
                cfg.angle_threshold,
                progress,
            )?,
            MergeType::None => MergeStats::default(),
        };
        report.chains_merged = merged.chains;
        check_invariants(&graph, "merge")?;

        progress.begin_stage(80.0, 90.0);
        let final_passes = CleanPasses {
            duplicates: true,
            orphans: cfg.orphans,
            closed_polylines: false,
            multiparts: true,
        };
        removed += clean(&mut graph, final_passes, progress)?;
        check_invariants(&graph, "final clean")?;

        if cfg.get_unlinks {
            progress.begin_stage(90.0, 100.0);
            report.unlinks = generate_unlinks(&mut graph, progress)?;
        }

        log_removals(&removed);
        Ok(extract(graph, report))
    }

    /// Run on a named worker thread. Progress and the terminal status arrive
    /// on the handle's `events` channel; setting `cancel` stops the worker
    /// at its next unit of work.
    pub fn spawn(self, features: Vec<InputFeature>, cancel: CancelFlag) -> std::io::Result<JobHandle> {
        let (mut reporter, events) = ProgressReporter::channel(cancel.clone());
        let worker = std::thread::Builder::new()
            .name("rcl-cleaner".to_string())
            .spawn(move || {
                let result = self.run(features, &mut reporter);
                let status = match &result {
                    Ok(_) => JobStatus::Done,
                    Err(e) if e.is_cancelled() => JobStatus::Cancelled,
                    Err(e) => {
                        warn!("cleaning job failed: {}", e);
                        JobStatus::Failed(e.to_string())
                    }
                };
                reporter.finish(status);
                result
            })?;
        Ok(JobHandle {
            events,
            cancel,
            worker,
        })
    }
}

/// Returns how many stroke vertices fix-unlinks moved before breaking.
fn load(
    graph: &mut Graph,
    features: Vec<InputFeature>,
    cfg: &CleaningConfig,
    progress: &mut ProgressReporter,
) -> CleanResult<usize> {
    if !cfg.break_at_vertices {
        progress.begin_stage(0.0, 20.0);
        graph.load_edges(features, cfg.angle_threshold, progress)?;
        return Ok(0);
    }

    progress.begin_stage(0.0, 5.0);
    let mut pseudo = graph.load_edges_w_o_topology(features, progress)?;

    let mut nudged = 0;
    if cfg.fix_unlinks {
        progress.begin_stage(5.0, 8.0);
        nudged = pseudo.fix_unlinks(cfg.unlink_nudge, progress)?;
    }

    progress.begin_stage(8.0, 12.0);
    let total = pseudo.len();
    let mut pieces = Vec::with_capacity(total);
    for (i, broken) in pseudo.break_features_iter().enumerate() {
        progress.step(i, total)?;
        for (kind, point) in broken.markers {
            graph.record_error(kind, point);
        }
        pieces.extend(broken.pieces);
    }
    info!("break pipeline: {} features became {} pieces", total, pieces.len());

    progress.begin_stage(12.0, 20.0);
    graph.load_edges(pieces, cfg.angle_threshold, progress)?;
    Ok(nudged)
}

fn early_clean() -> CleanPasses {
    CleanPasses {
        duplicates: true,
        orphans: false,
        closed_polylines: true,
        multiparts: false,
    }
}

fn log_removals(stats: &CleanStats) {
    info!(
        "cleaning removed {} duplicates, {} orphans, {} closed polylines; split {} multiparts",
        stats.duplicates, stats.orphans, stats.closed_polylines, stats.multiparts
    );
}

fn extract(graph: Graph, mut report: CleaningReport) -> CleaningOutput {
    let features: Vec<OutputFeature> = graph.edges.values().map(OutputFeature::from).collect();
    report.output_features = features.len();
    report.output_nodes = graph.num_nodes();
    report.marker_counts = MarkerKind::ALL
        .iter()
        .map(|kind| (*kind, graph.errors.iter().filter(|m| m.kind == *kind).count()))
        .filter(|(_, n)| *n > 0)
        .collect();
    info!(
        "cleaned {} input features into {} edges and {} nodes",
        report.input_features, report.output_features, report.output_nodes
    );
    CleaningOutput {
        features,
        errors: graph.errors,
        unlinks: graph.unlinks,
        report,
    }
}

/// A job running on its worker thread.
pub struct JobHandle {
    pub events: Receiver<ProgressEvent>,
    cancel: CancelFlag,
    worker: JoinHandle<CleanResult<CleaningOutput>>,
}

impl JobHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the worker and take its result.
    pub fn join(self) -> CleanResult<CleaningOutput> {
        self.worker
            .join()
            .map_err(|_| CleanError::invariant("worker", "cleaning thread panicked"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::coord;

    fn line(id: u64, points: &[(f64, f64)]) -> InputFeature {
        InputFeature::line(id, points.iter().map(|&(x, y)| coord(x, y)).collect())
    }

    #[test]
    fn test_invalid_config_rejected_before_work() {
        let cfg = CleaningConfig {
            snap_threshold: -3.0,
            ..Default::default()
        };
        assert!(matches!(CleaningJob::new(cfg), Err(CleanError::InvalidConfig(_))));
    }

    #[test]
    fn test_crossing_lines_are_broken_and_merged_back_out() {
        // a plus sign: both lines break at the centre, which then has degree 4
        let job = CleaningJob::new(CleaningConfig::default()).unwrap();
        let out = job
            .run(
                vec![
                    line(1, &[(-10.0, 0.0), (0.0, 0.0), (10.0, 0.0)]),
                    line(2, &[(0.0, -10.0), (0.0, 0.0), (0.0, 10.0)]),
                ],
                &mut ProgressReporter::silent(),
            )
            .unwrap();
        assert_eq!(out.features.len(), 4);
        assert_eq!(out.report.output_nodes, 5);
        assert_eq!(out.report.count(MarkerKind::Broken), 2);
    }

    #[test]
    fn test_spawned_job_reports_done() {
        let job = CleaningJob::new(CleaningConfig::default()).unwrap();
        let handle = job
            .spawn(vec![line(1, &[(0.0, 0.0), (1.0, 0.0)])], CancelFlag::new())
            .unwrap();
        let events = handle.events.clone();
        let out = handle.join().unwrap();
        assert_eq!(out.features.len(), 1);

        let seen: Vec<ProgressEvent> = events.try_iter().collect();
        assert_eq!(seen.last(), Some(&ProgressEvent::Finished(JobStatus::Done)));
        assert!(seen.contains(&ProgressEvent::Percent(100)));
    }

    #[test]
    fn test_cancelled_job_reports_cancelled() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let job = CleaningJob::new(CleaningConfig::default()).unwrap();
        let handle = job
            .spawn(vec![line(1, &[(0.0, 0.0), (1.0, 0.0)])], cancel)
            .unwrap();
        let events = handle.events.clone();
        assert_eq!(handle.join(), Err(CleanError::Cancelled));
        let last = events.try_iter().last();
        assert_eq!(last, Some(ProgressEvent::Finished(JobStatus::Cancelled)));
    }
}
