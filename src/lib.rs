// THEORY:
// This file is the main entry point for the `shelf_audit` library crate.
// The public face of the engine is `pipeline::AuditPipeline`: it takes a shelf
// photograph plus an inventory manifest and hands back one `AuditResult`. The
// analysis stages (`core_modules`) are public so hosting layers and tests can
// drive a single stage, but nothing outside the pipeline is required to run an
// audit.
//
// Every audit is a pure, synchronous computation over two input buffers. The
// only concurrency lives in `parallel_pipeline`, which fans independent audits
// out over worker tasks; the engine itself holds no shared state.

pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use crate::error::AuditError;
pub use crate::pipeline::{run, AuditConfig, AuditPipeline, AuditResult, FidelityMode};
pub use crate::parallel_pipeline::{AuditJob, AuditWorkerPool};
