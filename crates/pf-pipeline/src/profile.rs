//! Profile parameter tables.
//!
//! Each [`ProfileId`] maps every [`Step`] to an ordered list of flag/value
//! pairs that are appended to the step's base arguments. Lookup is total: a
//! step with nothing to tune has an empty list.

use std::collections::BTreeMap;

use pf_core::config::ProfileOverride;
use pf_core::{Error, ProfileId, Result};
use serde::Serialize;

use crate::stage::{StageName, Step};

/// One command-line flag and its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Param {
    pub flag: String,
    pub value: String,
}

impl Param {
    pub fn new(flag: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            flag: flag.into(),
            value: value.into(),
        }
    }
}

type Table = &'static [(&'static str, &'static str)];

fn builtin_table(profile: ProfileId, step: Step) -> Table {
    use ProfileId::*;

    match (step, profile) {
        (Step::FeatureExtractor, Speed) => &[
            ("--SiftExtraction.max_image_size", "1600"),
            ("--SiftExtraction.num_threads", "16"),
            ("--SiftExtraction.first_octave", "0"),
        ],
        (Step::FeatureExtractor, Balanced) => &[
            ("--SiftExtraction.max_image_size", "2000"),
            ("--SiftExtraction.num_threads", "16"),
            ("--SiftExtraction.first_octave", "0"),
        ],
        (Step::FeatureExtractor, Quality) => &[
            ("--SiftExtraction.max_image_size", "3200"),
            ("--SiftExtraction.num_threads", "16"),
            ("--SiftExtraction.first_octave", "-1"),
        ],

        (Step::SequentialMatcher, Speed | Balanced) => &[
            ("--SiftMatching.num_threads", "16"),
            ("--SiftMatching.guided_matching", "0"),
        ],
        (Step::SequentialMatcher, Quality) => &[
            ("--SiftMatching.num_threads", "16"),
            ("--SiftMatching.guided_matching", "1"),
        ],

        (Step::Mapper, Speed) => &[
            ("--Mapper.num_threads", "16"),
            ("--Mapper.ba_global_frames_ratio", "1.4"),
            ("--Mapper.multiple_models", "0"),
        ],
        (Step::Mapper, Balanced) => &[
            ("--Mapper.num_threads", "16"),
            ("--Mapper.ba_global_frames_ratio", "1.2"),
            ("--Mapper.multiple_models", "0"),
        ],
        (Step::Mapper, Quality) => &[
            ("--Mapper.num_threads", "16"),
            ("--Mapper.ba_global_frames_ratio", "1.1"),
            ("--Mapper.multiple_models", "0"),
        ],

        (Step::ImageUndistorter, _) => &[("--max_image_size", "2000")],

        (Step::ModelConverter | Step::InterfaceColmap, _) => &[],

        (Step::DensifyPointCloud, Speed) => &[
            ("--resolution-level", "3"),
            ("--max-resolution", "2560"),
            ("--min-resolution", "640"),
            ("--number-views", "3"),
            ("--iters", "2"),
            ("--geometric-iters", "1"),
            ("--sub-resolution-levels", "0"),
            ("--remove-dmaps", "1"),
        ],
        (Step::DensifyPointCloud, Balanced) => &[
            ("--resolution-level", "2"),
            ("--max-resolution", "2560"),
            ("--min-resolution", "640"),
            ("--number-views", "5"),
            ("--iters", "3"),
            ("--geometric-iters", "2"),
            ("--sub-resolution-levels", "1"),
            ("--remove-dmaps", "1"),
        ],
        (Step::DensifyPointCloud, Quality) => &[
            ("--resolution-level", "1"),
            ("--max-resolution", "3200"),
            ("--min-resolution", "640"),
            ("--number-views", "8"),
            ("--iters", "4"),
            ("--geometric-iters", "3"),
            ("--sub-resolution-levels", "2"),
            ("--remove-dmaps", "0"),
        ],

        (Step::ReconstructMesh, Speed) => &[
            ("--min-point-distance", "2.0"),
            ("--decimate", "0.7"),
            ("--remove-spurious", "20"),
            ("--close-holes", "30"),
            ("--smooth", "2"),
        ],
        (Step::ReconstructMesh, Balanced) => &[
            ("--min-point-distance", "1.5"),
            ("--decimate", "0.9"),
            ("--remove-spurious", "20"),
            ("--close-holes", "30"),
            ("--smooth", "2"),
        ],
        (Step::ReconstructMesh, Quality) => &[
            ("--min-point-distance", "1.0"),
            ("--decimate", "1"),
            ("--remove-spurious", "20"),
            ("--close-holes", "30"),
            ("--smooth", "2"),
        ],

        (Step::RefineMesh, Speed) => &[
            ("--resolution-level", "2"),
            ("--max-views", "4"),
            ("--scales", "1"),
            ("--reduce-memory", "1"),
        ],
        (Step::RefineMesh, Balanced) => &[
            ("--resolution-level", "1"),
            ("--max-views", "6"),
            ("--scales", "2"),
            ("--reduce-memory", "1"),
        ],
        (Step::RefineMesh, Quality) => &[
            ("--resolution-level", "0"),
            ("--max-views", "12"),
            ("--scales", "3"),
            ("--reduce-memory", "1"),
        ],

        (Step::TextureMesh, Speed) => &[
            ("--resolution-level", "1"),
            ("--max-texture-size", "4096"),
            ("--cost-smoothness-ratio", "0.1"),
            ("--global-seam-leveling", "1"),
            ("--local-seam-leveling", "1"),
            ("--patch-packing-heuristic", "100"),
            ("--outlier-threshold", "0.02"),
            ("--empty-color", "0"),
            ("--virtual-face-images", "3"),
        ],
        (Step::TextureMesh, Balanced) => &[
            ("--resolution-level", "1"),
            ("--max-texture-size", "4096"),
            ("--cost-smoothness-ratio", "0.1"),
            ("--global-seam-leveling", "1"),
            ("--local-seam-leveling", "1"),
            ("--patch-packing-heuristic", "3"),
            ("--outlier-threshold", "0.03"),
            ("--empty-color", "0"),
            ("--virtual-face-images", "3"),
        ],
        (Step::TextureMesh, Quality) => &[
            ("--resolution-level", "0"),
            ("--max-texture-size", "8192"),
            ("--cost-smoothness-ratio", "0.1"),
            ("--global-seam-leveling", "1"),
            ("--local-seam-leveling", "1"),
            ("--patch-packing-heuristic", "3"),
            ("--outlier-threshold", "0.03"),
            ("--sharpness-weight", "0.5"),
            ("--empty-color", "0"),
        ],
    }
}

fn builtin_skip_refine(profile: ProfileId) -> bool {
    matches!(profile, ProfileId::Balanced)
}

/// Immutable parameter tables for every profile.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    tables: BTreeMap<(ProfileId, Step), Vec<Param>>,
    skip_refine: BTreeMap<ProfileId, bool>,
}

impl Default for ProfileStore {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ProfileStore {
    /// The built-in SPEED, BALANCED and QUALITY tables.
    pub fn builtin() -> Self {
        let mut tables = BTreeMap::new();
        let mut skip_refine = BTreeMap::new();

        for profile in ProfileId::ALL {
            for step in Step::ALL {
                let params = builtin_table(profile, step)
                    .iter()
                    .map(|&(flag, value)| Param::new(flag, value))
                    .collect();
                tables.insert((profile, step), params);
            }
            skip_refine.insert(profile, builtin_skip_refine(profile));
        }

        Self { tables, skip_refine }
    }

    /// Apply configuration overrides on top of this store.
    ///
    /// A flag that already exists in the step's table keeps its position and
    /// takes the new value; an unknown flag is appended.
    pub fn with_overrides(mut self, overrides: &[ProfileOverride]) -> Result<Self> {
        for o in overrides {
            let step: Step = o.step.parse()?;
            if !o.flag.starts_with('-') {
                return Err(Error::Config(format!(
                    "override flag '{}' for {} must start with '-'",
                    o.flag, o.step
                )));
            }

            let params = self.tables.entry((o.profile, step)).or_default();
            match params.iter_mut().find(|p| p.flag == o.flag) {
                Some(existing) => existing.value = o.value.clone(),
                None => params.push(Param::new(o.flag.clone(), o.value.clone())),
            }
            tracing::debug!(
                "Profile override: {} {} {}={}",
                o.profile,
                step,
                o.flag,
                o.value
            );
        }
        Ok(self)
    }

    /// Ordered parameters for one step of one profile.
    pub fn params(&self, profile: ProfileId, step: Step) -> &[Param] {
        self.tables
            .get(&(profile, step))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Parameters of every step the stage runs, concatenated in run order.
    pub fn stage_params(&self, profile: ProfileId, stage: StageName) -> Vec<Param> {
        stage
            .steps()
            .iter()
            .flat_map(|&step| self.params(profile, step).iter().cloned())
            .collect()
    }

    /// Whether this profile leaves mesh refinement out.
    pub fn skip_refine(&self, profile: ProfileId) -> bool {
        self.skip_refine.get(&profile).copied().unwrap_or(false)
    }

    /// True only for [`StageName::RefineMesh`] under a profile that skips it.
    pub fn should_skip_optional_stage(&self, profile: ProfileId, stage: StageName) -> bool {
        stage == StageName::RefineMesh && self.skip_refine(profile)
    }
}

/// Append `flag value` pairs to the base tokens, in table order.
pub fn build_argv<I>(base: I, params: &[Param]) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut argv: Vec<String> = base.into_iter().collect();
    argv.reserve(params.len() * 2);
    for p in params {
        argv.push(p.flag.clone());
        argv.push(p.value.clone());
    }
    argv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(params: &[Param]) -> Vec<&str> {
        params.iter().map(|p| p.flag.as_str()).collect()
    }

    #[test]
    fn lookup_is_total() {
        let store = ProfileStore::builtin();
        for profile in ProfileId::ALL {
            for step in Step::ALL {
                // Must not panic; empty is allowed.
                let _ = store.params(profile, step);
            }
        }
        assert!(store.params(ProfileId::Quality, Step::ModelConverter).is_empty());
        assert!(store.params(ProfileId::Speed, Step::InterfaceColmap).is_empty());
    }

    #[test]
    fn tables_differ_by_profile() {
        let store = ProfileStore::builtin();
        let speed = store.params(ProfileId::Speed, Step::DensifyPointCloud);
        let quality = store.params(ProfileId::Quality, Step::DensifyPointCloud);
        assert_eq!(speed[0], Param::new("--resolution-level", "3"));
        assert_eq!(quality[0], Param::new("--resolution-level", "1"));
        assert_eq!(flags(speed), flags(quality));
    }

    #[test]
    fn quality_texture_has_sharpness_weight() {
        let store = ProfileStore::builtin();
        let quality = flags(store.params(ProfileId::Quality, Step::TextureMesh));
        assert!(quality.contains(&"--sharpness-weight"));
        assert!(!quality.contains(&"--virtual-face-images"));

        let speed = store.params(ProfileId::Speed, Step::TextureMesh);
        assert!(speed.contains(&Param::new("--patch-packing-heuristic", "100")));
        assert!(speed.contains(&Param::new("--outlier-threshold", "0.02")));
    }

    #[test]
    fn only_balanced_skips_refine() {
        let store = ProfileStore::builtin();
        assert!(!store.skip_refine(ProfileId::Speed));
        assert!(store.skip_refine(ProfileId::Balanced));
        assert!(!store.skip_refine(ProfileId::Quality));

        assert!(store.should_skip_optional_stage(ProfileId::Balanced, StageName::RefineMesh));
        assert!(!store.should_skip_optional_stage(ProfileId::Balanced, StageName::TextureMesh));
        assert!(!store.should_skip_optional_stage(ProfileId::Quality, StageName::RefineMesh));
    }

    #[test]
    fn stage_params_concatenate_steps() {
        let store = ProfileStore::builtin();
        let params = store.stage_params(ProfileId::Speed, StageName::SparseReconstruct);
        assert_eq!(params.len(), 3 + 2 + 3);
        assert_eq!(params[0].flag, "--SiftExtraction.max_image_size");
        assert_eq!(params[3].flag, "--SiftMatching.num_threads");
        assert_eq!(params[5].flag, "--Mapper.num_threads");
    }

    #[test]
    fn build_argv_keeps_table_order() {
        let argv = build_argv(
            vec!["tool".to_string(), "in".to_string()],
            &[Param::new("--a", "1"), Param::new("--b", "2")],
        );
        assert_eq!(argv, vec!["tool", "in", "--a", "1", "--b", "2"]);
    }

    #[test]
    fn override_replaces_in_place() {
        let store = ProfileStore::builtin()
            .with_overrides(&[ProfileOverride {
                profile: ProfileId::Speed,
                step: "DensifyPointCloud".into(),
                flag: "--iters".into(),
                value: "7".into(),
            }])
            .unwrap();
        let params = store.params(ProfileId::Speed, Step::DensifyPointCloud);
        assert_eq!(params.len(), 8);
        assert_eq!(params[4], Param::new("--iters", "7"));
        // Other profiles untouched.
        assert_eq!(
            store.params(ProfileId::Balanced, Step::DensifyPointCloud)[4],
            Param::new("--iters", "3")
        );
    }

    #[test]
    fn override_appends_new_flag() {
        let store = ProfileStore::builtin()
            .with_overrides(&[ProfileOverride {
                profile: ProfileId::Quality,
                step: "model_converter".into(),
                flag: "--skip_distortion".into(),
                value: "1".into(),
            }])
            .unwrap();
        assert_eq!(
            store.params(ProfileId::Quality, Step::ModelConverter),
            [Param::new("--skip_distortion", "1")]
        );
    }

    #[test]
    fn override_for_unknown_step_is_rejected() {
        let err = ProfileStore::builtin()
            .with_overrides(&[ProfileOverride {
                profile: ProfileId::Speed,
                step: "Sharpen".into(),
                flag: "--x".into(),
                value: "1".into(),
            }])
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
