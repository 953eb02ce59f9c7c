// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

#![deny(
    clippy::mutable_key_type,
    clippy::map_entry,
    clippy::boxed_local,
    clippy::let_unit_value,
    clippy::redundant_allocation,
    clippy::bool_comparison,
    clippy::bind_instead_of_map,
    clippy::vec_box,
    clippy::while_let_loop,
    clippy::useless_asref,
    clippy::repeat_once,
    clippy::deref_addrof,
    clippy::suspicious_map,
    clippy::arc_with_non_send_sync,
    clippy::single_char_pattern,
    clippy::for_kv_map,
    clippy::let_unit_value,
    clippy::let_and_return,
    clippy::iter_nth,
    clippy::iter_cloned_collect,
    clippy::bytes_nth,
    clippy::deprecated_clippy_cfg_attr,
    clippy::match_result_ok,
    clippy::cmp_owned,
    clippy::cmp_null,
    clippy::op_ref
)]

//! Topology cleaning for road centre-line networks.
//!
//! Features go in, a planar line graph comes out: lines are broken at shared
//! vertices, near-coincident endpoints snapped together, duplicates and
//! orphans removed, pass-through vertices merged away, and grade-separated
//! crossings reported as unlinks. [`CleaningJob`] runs the whole sequence;
//! every pass is also usable on its own against a [`Graph`].

pub mod clean;
pub mod config;
pub mod error;
pub mod feature;
pub mod geometry;
pub mod graph_types;
pub mod id_allocator;
pub mod loader;
pub mod merge;
pub mod pipeline;
pub mod progress;
pub mod snap;
pub mod spatial_index;
pub mod unlinks;
pub mod validation;


pub use config::{CleaningConfig, MergeType};
pub use error::{CleanError, CleanResult};
pub use feature::{Attributes, FeatureGeometry, FeatureId, InputFeature, OutputFeature};
pub use graph_types::{Edge, EdgeId, Graph, Marker, MarkerKind, Node, NodeId};
pub use pipeline::{CleaningJob, CleaningOutput, CleaningReport, JobHandle};
pub use progress::{CancelFlag, JobStatus, ProgressEvent, ProgressReporter};
