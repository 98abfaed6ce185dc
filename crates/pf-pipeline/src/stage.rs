//! The fixed reconstruction stage table and argv construction.
//!
//! A [`Stage`] is static data: its name, the artifact that marks it done,
//! the artifacts it consumes, and whether the profile may leave it out.
//! Each stage expands into one or more tool [`Invocation`]s; most stages are
//! a single process, sparse reconstruction is three COLMAP subcommands and
//! densification is preceded by the COLMAP-to-MVS format conversion.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use pf_core::{Device, ProfileId};
use pf_tools::ToolRegistry;
use serde::{Deserialize, Serialize};

use crate::profile::{build_argv, ProfileStore};

// ---------------------------------------------------------------------------
// Artifact paths (relative to the result directory)
// ---------------------------------------------------------------------------

pub const IMAGES_TEMP: &str = "images_temp";
pub const DATABASE: &str = "database.db";
pub const SPARSE_DIR: &str = "sparse";
pub const SPARSE_MODEL: &str = "sparse/0";
pub const SPARSE_TEXT: &str = "sparse/0/sparse";
pub const UNDISTORTED: &str = "images_undistorted";
pub const UNDISTORTED_IMAGES: &str = "images_undistorted/images";
pub const SCENE_MVS: &str = "scene.mvs";
pub const SCENE_DENSE_MVS: &str = "scene_dense.mvs";
pub const DENSE_MESH: &str = "scene_dense_mesh.ply";
pub const REFINED_MESH: &str = "scene_dense_mesh_refine.ply";
pub const RESULT_OBJ: &str = "result.obj";

// ---------------------------------------------------------------------------
// StageName / Step
// ---------------------------------------------------------------------------

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StageName {
    SparseReconstruct,
    ConvertModelToText,
    UndistortImages,
    DensifyPointCloud,
    ReconstructMesh,
    RefineMesh,
    TextureMesh,
}

impl StageName {
    /// Every stage, in execution order.
    pub const ALL: [StageName; 7] = [
        StageName::SparseReconstruct,
        StageName::ConvertModelToText,
        StageName::UndistortImages,
        StageName::DensifyPointCloud,
        StageName::ReconstructMesh,
        StageName::RefineMesh,
        StageName::TextureMesh,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StageName::SparseReconstruct => "SparseReconstruct",
            StageName::ConvertModelToText => "ConvertModelToText",
            StageName::UndistortImages => "UndistortImages",
            StageName::DensifyPointCloud => "DensifyPointCloud",
            StageName::ReconstructMesh => "ReconstructMesh",
            StageName::RefineMesh => "RefineMesh",
            StageName::TextureMesh => "TextureMesh",
        }
    }

    /// The tool steps this stage runs, in order.
    pub fn steps(self) -> &'static [Step] {
        match self {
            StageName::SparseReconstruct => {
                &[Step::FeatureExtractor, Step::SequentialMatcher, Step::Mapper]
            }
            StageName::ConvertModelToText => &[Step::ModelConverter],
            StageName::UndistortImages => &[Step::ImageUndistorter],
            StageName::DensifyPointCloud => &[Step::InterfaceColmap, Step::DensifyPointCloud],
            StageName::ReconstructMesh => &[Step::ReconstructMesh],
            StageName::RefineMesh => &[Step::RefineMesh],
            StageName::TextureMesh => &[Step::TextureMesh],
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageName {
    type Err = pf_core::Error;

    fn from_str(s: &str) -> pf_core::Result<Self> {
        StageName::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| pf_core::Error::Validation(format!("unknown stage '{s}'")))
    }
}

/// One external tool invocation, the unit the profile tables are keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Step {
    FeatureExtractor,
    SequentialMatcher,
    Mapper,
    ModelConverter,
    ImageUndistorter,
    InterfaceColmap,
    DensifyPointCloud,
    ReconstructMesh,
    RefineMesh,
    TextureMesh,
}

impl Step {
    pub const ALL: [Step; 10] = [
        Step::FeatureExtractor,
        Step::SequentialMatcher,
        Step::Mapper,
        Step::ModelConverter,
        Step::ImageUndistorter,
        Step::InterfaceColmap,
        Step::DensifyPointCloud,
        Step::ReconstructMesh,
        Step::RefineMesh,
        Step::TextureMesh,
    ];

    /// The name the step is known by on the command line: a COLMAP
    /// subcommand or an OpenMVS binary.
    pub fn as_str(self) -> &'static str {
        match self {
            Step::FeatureExtractor => "feature_extractor",
            Step::SequentialMatcher => "sequential_matcher",
            Step::Mapper => "mapper",
            Step::ModelConverter => "model_converter",
            Step::ImageUndistorter => "image_undistorter",
            Step::InterfaceColmap => "InterfaceCOLMAP",
            Step::DensifyPointCloud => "DensifyPointCloud",
            Step::ReconstructMesh => "ReconstructMesh",
            Step::RefineMesh => "RefineMesh",
            Step::TextureMesh => "TextureMesh",
        }
    }

    /// Whether this step is a `colmap` subcommand.
    pub fn is_colmap(self) -> bool {
        matches!(
            self,
            Step::FeatureExtractor
                | Step::SequentialMatcher
                | Step::Mapper
                | Step::ModelConverter
                | Step::ImageUndistorter
        )
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = pf_core::Error;

    fn from_str(s: &str) -> pf_core::Result<Self> {
        Step::ALL
            .into_iter()
            .find(|step| step.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| pf_core::Error::Config(format!("unknown step '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Stage table
// ---------------------------------------------------------------------------

/// Filesystem artifact whose presence marks a stage as done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMarker {
    /// Complete when the file exists.
    File(&'static str),
    /// Complete when the directory exists and is not empty.
    Dir(&'static str),
}

impl OutputMarker {
    /// Path relative to the result directory.
    pub fn relative(self) -> &'static str {
        match self {
            OutputMarker::File(p) | OutputMarker::Dir(p) => p,
        }
    }

    /// Absolute path under `result_dir`.
    pub fn path(self, result_dir: &Path) -> PathBuf {
        result_dir.join(self.relative())
    }
}

/// Static description of one pipeline stage.
#[derive(Debug)]
pub struct Stage {
    pub name: StageName,
    pub marker: OutputMarker,
    /// Optional stages may be left out of the plan by the profile.
    pub optional: bool,
    /// Predecessor artifacts this stage reads.
    pub inputs: &'static [OutputMarker],
}

/// The fixed stage sequence. Order is execution order.
pub static STAGES: [Stage; 7] = [
    Stage {
        name: StageName::SparseReconstruct,
        marker: OutputMarker::Dir(SPARSE_MODEL),
        optional: false,
        inputs: &[OutputMarker::Dir(IMAGES_TEMP)],
    },
    Stage {
        name: StageName::ConvertModelToText,
        marker: OutputMarker::Dir(SPARSE_TEXT),
        optional: false,
        inputs: &[OutputMarker::Dir(SPARSE_MODEL)],
    },
    Stage {
        name: StageName::UndistortImages,
        marker: OutputMarker::Dir(UNDISTORTED),
        optional: false,
        inputs: &[OutputMarker::Dir(SPARSE_MODEL), OutputMarker::Dir(IMAGES_TEMP)],
    },
    Stage {
        name: StageName::DensifyPointCloud,
        marker: OutputMarker::File(SCENE_DENSE_MVS),
        optional: false,
        inputs: &[OutputMarker::Dir(UNDISTORTED)],
    },
    Stage {
        name: StageName::ReconstructMesh,
        marker: OutputMarker::File(DENSE_MESH),
        optional: false,
        inputs: &[OutputMarker::File(SCENE_DENSE_MVS)],
    },
    Stage {
        name: StageName::RefineMesh,
        marker: OutputMarker::File(REFINED_MESH),
        optional: true,
        inputs: &[OutputMarker::File(SCENE_DENSE_MVS), OutputMarker::File(DENSE_MESH)],
    },
    Stage {
        name: StageName::TextureMesh,
        marker: OutputMarker::File(RESULT_OBJ),
        optional: false,
        inputs: &[OutputMarker::File(SCENE_DENSE_MVS)],
    },
];

/// Look up the static definition of `name`.
pub fn stage(name: StageName) -> &'static Stage {
    // STAGES is ordered exactly like StageName::ALL.
    &STAGES[name as usize]
}

// ---------------------------------------------------------------------------
// Mesh selection
// ---------------------------------------------------------------------------

/// What became of the optional refinement, which decides the mesh that
/// texturing reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RefineOutcome {
    /// The profile leaves refinement out.
    NotRun,
    /// Refinement was in the plan but its output is absent.
    RanUnrefined,
    /// The refined mesh exists.
    RanRefined,
}

impl RefineOutcome {
    pub fn resolve(skip_refine: bool, refined_present: bool) -> Self {
        match (skip_refine, refined_present) {
            (true, _) => RefineOutcome::NotRun,
            (false, true) => RefineOutcome::RanRefined,
            (false, false) => RefineOutcome::RanUnrefined,
        }
    }

    /// Mesh file name handed to TextureMesh.
    pub fn texture_input(self) -> &'static str {
        match self {
            RefineOutcome::RanRefined => REFINED_MESH,
            RefineOutcome::NotRun | RefineOutcome::RanUnrefined => DENSE_MESH,
        }
    }
}

// ---------------------------------------------------------------------------
// Invocations
// ---------------------------------------------------------------------------

/// One process to launch for a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub step: Step,
    pub argv: Vec<String>,
    pub working_dir: PathBuf,
    /// The invocation is skipped when this path already exists.
    pub skip_if_exists: Option<PathBuf>,
    /// Directories created before launch.
    pub create_dirs: Vec<PathBuf>,
}

/// Everything argv construction depends on.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    /// Absolute result directory.
    pub result_dir: &'a Path,
    pub profile: ProfileId,
    pub device: Device,
    pub camera_model: &'a str,
    pub profiles: &'a ProfileStore,
    pub tools: &'a ToolRegistry,
    /// Mesh file TextureMesh reads; only consulted for that stage.
    pub texture_mesh: &'a str,
}

impl BuildContext<'_> {
    fn path(&self, relative: &str) -> String {
        self.result_dir.join(relative).to_string_lossy().into_owned()
    }

    fn colmap(&self, step: Step, base: Vec<String>) -> Vec<String> {
        let mut tokens = vec![
            self.tools.colmap().to_string_lossy().into_owned(),
            step.as_str().to_string(),
        ];
        tokens.extend(base);
        build_argv(tokens, self.profiles.params(self.profile, step))
    }

    fn openmvs(&self, step: Step, base: Vec<String>) -> Vec<String> {
        let mut tokens = vec![self.tools.resolve(step.as_str()).to_string_lossy().into_owned()];
        tokens.extend(base);
        build_argv(tokens, self.profiles.params(self.profile, step))
    }

    fn invocation(&self, step: Step, argv: Vec<String>) -> Invocation {
        Invocation {
            step,
            argv,
            working_dir: self.result_dir.to_path_buf(),
            skip_if_exists: None,
            create_dirs: Vec::new(),
        }
    }
}

fn strings<const N: usize>(tokens: [&str; N]) -> Vec<String> {
    tokens.into_iter().map(str::to_string).collect()
}

/// Device-specific flags appended after the profile parameters.
fn device_flags(step: Step, device: Device) -> Vec<String> {
    let gpu = match device {
        Device::Auto => return Vec::new(),
        Device::Cpu => false,
        Device::Cuda => true,
    };
    match step {
        Step::FeatureExtractor => strings(["--SiftExtraction.use_gpu", if gpu { "1" } else { "0" }]),
        Step::SequentialMatcher => strings(["--SiftMatching.use_gpu", if gpu { "1" } else { "0" }]),
        Step::DensifyPointCloud => strings(["--cuda-device", if gpu { "-1" } else { "-2" }]),
        _ => Vec::new(),
    }
}

impl Stage {
    /// Build the processes this stage launches, in order.
    pub fn invocations(&self, ctx: &BuildContext<'_>) -> Vec<Invocation> {
        let database = ctx.path(DATABASE);
        let images = ctx.path(IMAGES_TEMP);

        match self.name {
            StageName::SparseReconstruct => {
                let mut extract = ctx.colmap(
                    Step::FeatureExtractor,
                    vec![
                        "--database_path".into(),
                        database.clone(),
                        "--image_path".into(),
                        images.clone(),
                        "--ImageReader.camera_model".into(),
                        ctx.camera_model.to_string(),
                    ],
                );
                extract.extend(device_flags(Step::FeatureExtractor, ctx.device));
                let mut extract = ctx.invocation(Step::FeatureExtractor, extract);
                extract.skip_if_exists = Some(ctx.result_dir.join(DATABASE));

                let mut matcher = ctx.colmap(
                    Step::SequentialMatcher,
                    vec!["--database_path".into(), database.clone()],
                );
                matcher.extend(device_flags(Step::SequentialMatcher, ctx.device));
                let matcher = ctx.invocation(Step::SequentialMatcher, matcher);

                let mapper = ctx.colmap(
                    Step::Mapper,
                    vec![
                        "--database_path".into(),
                        database,
                        "--image_path".into(),
                        images,
                        "--output_path".into(),
                        ctx.path(SPARSE_DIR),
                    ],
                );
                let mut mapper = ctx.invocation(Step::Mapper, mapper);
                mapper.create_dirs.push(ctx.result_dir.join(SPARSE_DIR));

                vec![extract, matcher, mapper]
            }
            StageName::ConvertModelToText => {
                let argv = ctx.colmap(
                    Step::ModelConverter,
                    vec![
                        "--input_path".into(),
                        ctx.path(SPARSE_MODEL),
                        "--output_path".into(),
                        ctx.path(SPARSE_TEXT),
                        "--output_type".into(),
                        "TXT".into(),
                    ],
                );
                let mut convert = ctx.invocation(Step::ModelConverter, argv);
                convert.create_dirs.push(ctx.result_dir.join(SPARSE_TEXT));
                vec![convert]
            }
            StageName::UndistortImages => {
                let argv = ctx.colmap(
                    Step::ImageUndistorter,
                    vec![
                        "--image_path".into(),
                        images,
                        "--input_path".into(),
                        ctx.path(SPARSE_MODEL),
                        "--output_path".into(),
                        ctx.path(UNDISTORTED),
                        "--output_type".into(),
                        "COLMAP".into(),
                    ],
                );
                vec![ctx.invocation(Step::ImageUndistorter, argv)]
            }
            StageName::DensifyPointCloud => {
                let interface = ctx.openmvs(
                    Step::InterfaceColmap,
                    vec![
                        "-i".into(),
                        ctx.path(UNDISTORTED),
                        "-o".into(),
                        SCENE_MVS.into(),
                        "--image-folder".into(),
                        ctx.path(UNDISTORTED_IMAGES),
                    ],
                );
                let mut interface = ctx.invocation(Step::InterfaceColmap, interface);
                interface.skip_if_exists = Some(ctx.result_dir.join(SCENE_MVS));

                let mut densify = ctx.openmvs(
                    Step::DensifyPointCloud,
                    strings([SCENE_MVS, "-o", SCENE_DENSE_MVS]),
                );
                densify.extend(device_flags(Step::DensifyPointCloud, ctx.device));

                vec![interface, ctx.invocation(Step::DensifyPointCloud, densify)]
            }
            StageName::ReconstructMesh => {
                let argv = ctx.openmvs(
                    Step::ReconstructMesh,
                    strings([SCENE_DENSE_MVS, "-o", DENSE_MESH]),
                );
                vec![ctx.invocation(Step::ReconstructMesh, argv)]
            }
            StageName::RefineMesh => {
                let argv = ctx.openmvs(
                    Step::RefineMesh,
                    strings([SCENE_DENSE_MVS, "-m", DENSE_MESH, "-o", REFINED_MESH]),
                );
                vec![ctx.invocation(Step::RefineMesh, argv)]
            }
            StageName::TextureMesh => {
                let argv = ctx.openmvs(
                    Step::TextureMesh,
                    strings([
                        "--export-type",
                        "obj",
                        SCENE_DENSE_MVS,
                        "-m",
                        ctx.texture_mesh,
                        "-o",
                        RESULT_OBJ,
                    ]),
                );
                vec![ctx.invocation(Step::TextureMesh, argv)]
            }
        }
    }
}
