//! Pipeline orchestrator: walks the stage table in order, skipping stages
//! whose output already exists, and stops at the first failure.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use pf_core::config::{Config, PipelineSettings, ToolsConfig};
use pf_core::{Device, Error, LogSink, ProfileId, Result};
use pf_tools::{StageRunner, ToolRegistry, ToolRunner};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::artifact::ArtifactChecker;
use crate::context::{RunContext, RunProgress, RunRequest};
use crate::dataset;
use crate::profile::ProfileStore;
use crate::run::{PipelineRun, RunReport};
use crate::stage::{
    self, BuildContext, RefineOutcome, Stage, StageName, DENSE_MESH, IMAGES_TEMP, RESULT_OBJ,
    STAGES,
};

/// Drives one reconstruction at a time through the fixed stage sequence.
///
/// The orchestrator holds only immutable configuration; all per-run state
/// lives in a [`PipelineRun`] created by [`PipelineOrchestrator::run`], so
/// one instance can serve any number of sequential runs.
pub struct PipelineOrchestrator {
    settings: PipelineSettings,
    profiles: ProfileStore,
    tools: ToolRegistry,
    runner: Arc<dyn StageRunner>,
    checker: ArtifactChecker,
}

impl PipelineOrchestrator {
    pub fn new(
        settings: PipelineSettings,
        profiles: ProfileStore,
        tools: ToolRegistry,
        runner: Arc<dyn StageRunner>,
    ) -> Self {
        Self {
            settings,
            profiles,
            tools,
            runner,
            checker: ArtifactChecker::new(),
        }
    }

    /// Build an orchestrator backed by real processes from `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let profiles = ProfileStore::builtin().with_overrides(&config.profiles)?;
        let tools = ToolRegistry::discover(&config.tools);
        let runner = ToolRunner::new()
            .with_tail_lines(config.pipeline.output_tail_lines)
            .with_timeout(config.tools.timeout_secs.map(Duration::from_secs));

        Ok(Self::new(
            config.pipeline.clone(),
            profiles,
            tools,
            Arc::new(runner),
        ))
    }

    /// Built-in profiles, default settings and tools found on `PATH`.
    pub fn with_defaults() -> Self {
        Self::new(
            PipelineSettings::default(),
            ProfileStore::builtin(),
            ToolRegistry::discover(&ToolsConfig::default()),
            Arc::new(ToolRunner::new()),
        )
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Stages `profile` runs, in order.
    pub fn plan(&self, profile: ProfileId) -> Vec<&'static Stage> {
        STAGES
            .iter()
            .filter(|s| !(s.optional && self.profiles.should_skip_optional_stage(profile, s.name)))
            .collect()
    }

    /// Run the pipeline for `request`.
    ///
    /// Never panics and never returns early: every outcome, including a
    /// rejected dataset, is described by the returned [`RunReport`].
    pub async fn run(&self, request: &RunRequest, ctx: &RunContext) -> RunReport {
        let mut run = PipelineRun::new(request.result_dir.clone(), request.profile, request.device);
        let span = info_span!("pipeline", run_id = %run.run_id, profile = %request.profile);

        async move {
            info!(
                "Starting pipeline: {} -> {}",
                request.dataset_dir.display(),
                request.result_dir.display()
            );

            let outcome = self.execute(request, ctx, &mut run).await;
            let last_stage = run.current;

            let report = match outcome {
                Ok(mesh) => {
                    info!("Pipeline complete: {}", mesh.display());
                    ctx.sink.write(&format!(
                        "\nReconstruction complete! Result saved to: {}\n",
                        mesh.display()
                    ));
                    run.succeed(mesh)
                }
                Err(e) => {
                    if e.is_cancelled() {
                        warn!("{e}");
                    } else {
                        error!("Pipeline failed: {e}");
                    }
                    ctx.sink.write(&format!("\n{e}\n"));
                    run.fail(e)
                }
            };

            ctx.progress.send(RunProgress {
                percent: report.progress,
                stage: report.failed_stage.or(last_stage),
                status: report.status,
            });
            report
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        request: &RunRequest,
        ctx: &RunContext,
        run: &mut PipelineRun,
    ) -> Result<PathBuf> {
        // Reject the dataset before anything is written.
        let images = dataset::find_images(&request.dataset_dir, &self.settings.image_extensions)?;

        std::fs::create_dir_all(&request.result_dir)?;
        let result_dir = request.result_dir.canonicalize()?;
        run.result_dir = result_dir.clone();

        let sink = ctx.sink.as_ref();
        sink.write(&format!(
            "\n{rule}\n  Photogrammetry pipeline - profile {} (device {})\n{rule}\n",
            request.profile,
            request.device,
            rule = "=".repeat(60)
        ));

        dataset::stage_images(&images, &result_dir.join(IMAGES_TEMP))?;

        let plan = self.plan(request.profile);
        let total = plan.len();
        run.start(plan.iter().map(|s| s.name).collect());
        self.publish(ctx, run);

        for (i, stage) in plan.into_iter().enumerate() {
            if ctx.cancellation.is_cancelled() {
                return Err(Error::Cancelled { stage: None });
            }

            run.begin_stage(stage.name);
            self.publish(ctx, run);
            sink.write(&format!("\n--- Stage {}/{total}: {} ---\n", i + 1, stage.name));

            let executed = self
                .run_stage(stage, request, &result_dir, ctx)
                .await?;

            let pct = run.complete_stage(stage.name, executed);
            if executed {
                info!("[{pct}%] Completed: {}", stage.name);
            } else {
                info!("[{pct}%] Skipped: {}", stage.name);
            }
            self.publish(ctx, run);
        }

        Ok(result_dir.join(RESULT_OBJ))
    }

    /// Run one stage. Returns `false` when it was skipped as already done.
    async fn run_stage(
        &self,
        stage: &'static Stage,
        request: &RunRequest,
        result_dir: &Path,
        ctx: &RunContext,
    ) -> Result<bool> {
        let sink = ctx.sink.as_ref();

        if self.checker.is_complete(stage, result_dir) {
            sink.write(&format!(
                "Skipping {}: {} already exists\n",
                stage.name,
                stage.marker.relative()
            ));
            // The output is trusted; a missing input only means an earlier
            // stage's artifacts were removed after the fact.
            for input in self.checker.missing_inputs(stage, result_dir) {
                warn!(
                    "{} output exists but its input {} is missing",
                    stage.name,
                    input.display()
                );
                sink.write(&format!(
                    "Warning: {} output exists but its input {} is missing\n",
                    stage.name,
                    input.display()
                ));
            }
            return Ok(false);
        }

        if let Some(input) = self.checker.missing_inputs(stage, result_dir).into_iter().next() {
            return Err(Error::missing_artifact(stage.name.as_str(), input));
        }

        let texture_mesh = if stage.name == StageName::TextureMesh {
            self.select_texture_mesh(request.profile, result_dir, sink)?
        } else {
            DENSE_MESH
        };

        let build = BuildContext {
            result_dir,
            profile: request.profile,
            device: request.device,
            camera_model: &self.settings.camera_model,
            profiles: &self.profiles,
            tools: &self.tools,
            texture_mesh,
        };

        info!("Running stage {}", stage.name);
        for invocation in stage.invocations(&build) {
            if let Some(ref existing) = invocation.skip_if_exists {
                if existing.exists() {
                    sink.write(&format!(
                        "{} already exists. Skipping {}.\n",
                        existing.display(),
                        invocation.step
                    ));
                    continue;
                }
            }

            for dir in &invocation.create_dirs {
                std::fs::create_dir_all(dir)?;
            }

            debug!(argv = ?invocation.argv, "Launching {}", invocation.step);
            let result = self
                .runner
                .execute(
                    &invocation.argv,
                    &invocation.working_dir,
                    sink,
                    &ctx.cancellation,
                )
                .await;

            if let Some(err) = result.stage_error(stage.name.as_str()) {
                return Err(err);
            }
        }

        Ok(true)
    }

    /// Pick the mesh TextureMesh reads. Resolved once, right before its
    /// argv is built.
    fn select_texture_mesh(
        &self,
        profile: ProfileId,
        result_dir: &Path,
        sink: &dyn LogSink,
    ) -> Result<&'static str> {
        let refined = self
            .checker
            .is_complete(stage::stage(StageName::RefineMesh), result_dir);
        let outcome = RefineOutcome::resolve(self.profiles.skip_refine(profile), refined);
        let mesh = outcome.texture_input();

        debug!("Refinement outcome {outcome:?}; texturing {mesh}");
        let path = result_dir.join(mesh);
        if !path.exists() {
            return Err(Error::missing_artifact(StageName::TextureMesh.as_str(), path));
        }
        sink.write(&format!("Texturing mesh: {mesh}\n"));
        Ok(mesh)
    }

    fn publish(&self, ctx: &RunContext, run: &PipelineRun) {
        ctx.progress.send(RunProgress {
            percent: run.progress,
            stage: run.current,
            status: run.status,
        });
    }
}

/// Run the full pipeline with default settings and tools found on `PATH`.
pub async fn run_pipeline(
    dataset_dir: impl AsRef<Path>,
    profile: ProfileId,
    device: Device,
    result_dir: impl AsRef<Path>,
    sink: Arc<dyn LogSink>,
) -> RunReport {
    let request = RunRequest::new(dataset_dir.as_ref(), result_dir.as_ref())
        .with_profile(profile)
        .with_device(device);
    PipelineOrchestrator::with_defaults()
        .run(&request, &RunContext::new(sink))
        .await
}
