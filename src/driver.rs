//! Benchmark pipeline driver.
//!
//! A strictly linear, single-invocation pipeline:
//! `Init -> RegionReady -> EnvironmentReady -> Timed -> Reported`, with
//! `Aborted` reachable from any non-terminal state on failure. No retries, no
//! loops across runs, no cancellation: once the timed call begins it runs to
//! completion before any cleanup happens.

use crate::codegen::{CodeImageGenerator, MarginPolicy};
use crate::environment::EnvironmentGuard;
use crate::error::Result;
use crate::exec_memory::ExecRegion;
use crate::report::Reporter;
use crate::template::CodeTemplateProvider;
use crate::timer::HighResolutionTimer;
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    RegionReady,
    EnvironmentReady,
    Timed,
    Reported,
    Aborted,
}

/// Outcome of one successful measurement.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Integer returned by the generated function.
    pub result: i32,
    /// Elapsed wall time of the single timed call.
    pub duration_us: u64,
    pub region_size: usize,
    pub bytes_written: usize,
    pub body_repetitions: usize,
    /// Core the run was pinned to, absent when environment control was
    /// skipped.
    pub pinned_core: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
pub struct DriverConfig {
    /// Executable region size in bytes; sized to exercise a particular cache
    /// level. Must hold prologue + epilogue + at least one body chunk.
    pub region_size: usize,
    /// Integer input passed to the generated function.
    pub input: i32,
    pub margin_policy: MarginPolicy,
    /// When false the timed call runs without pinning or priority changes
    /// (for unprivileged runs); measurements are noisier.
    pub control_environment: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            region_size: 4096 * 10,
            input: 100,
            margin_policy: MarginPolicy::default(),
            control_environment: true,
        }
    }
}

/// Orchestrates region acquisition, image generation, environment control and
/// the single timed call.
pub struct BenchmarkDriver<'a> {
    config: DriverConfig,
    provider: &'a dyn CodeTemplateProvider,
    state: RunState,
}

impl<'a> BenchmarkDriver<'a> {
    pub fn new(config: DriverConfig, provider: &'a dyn CodeTemplateProvider) -> Self {
        Self {
            config,
            provider,
            state: RunState::Init,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Runs the single-shot pipeline, reporting the outcome through
    /// `reporter` either way.
    pub fn run(&mut self, reporter: &dyn Reporter) -> Result<RunReport> {
        match self.execute() {
            Ok(report) => {
                self.state = RunState::Reported;
                reporter.report_success(&report);
                Ok(report)
            }
            Err(e) => {
                self.state = RunState::Aborted;
                reporter.report_failure(&e.to_string(), e.errno());
                Err(e)
            }
        }
    }

    fn execute(&mut self) -> Result<RunReport> {
        let template = self.provider.template()?;
        let mut region = ExecRegion::acquire(self.config.region_size)?;
        let layout =
            CodeImageGenerator::new(self.config.margin_policy).fill(&mut region, &template);
        region.sync_instruction_cache()?;
        self.state = RunState::RegionReady;
        debug!(
            bytes_written = layout.bytes_written,
            body_repetitions = layout.body_repetitions,
            "region ready"
        );

        // A failed enter has already run its own cleanup; the driver just
        // aborts.
        let guard = if self.config.control_environment {
            Some(EnvironmentGuard::enter()?)
        } else {
            info!("environment control skipped; measuring without pinning");
            None
        };
        let pinned_core = guard.as_ref().map(|g| g.pinned_core());
        self.state = RunState::EnvironmentReady;

        let mut timer = HighResolutionTimer::new()?;
        let entry = unsafe { region.entry_fn() };

        timer.start();
        let result = entry(self.config.input);
        timer.stop();
        self.state = RunState::Timed;

        // Best-effort restore, not gated on success; the pin stays.
        drop(guard);

        Ok(RunReport {
            result,
            duration_us: timer.duration_us(),
            region_size: self.config.region_size,
            bytes_written: layout.bytes_written,
            body_repetitions: layout.body_repetitions,
            pinned_core,
        })
    }
}
