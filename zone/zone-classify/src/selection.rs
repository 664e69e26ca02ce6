//! Backend selection from an ordered probe list.

use zone_gpu::{SceneProbe, WgpuProbe};
use zone_kernel::{BackendProbe, ComputeBackend, CpuProbe};

use tracing::{info, warn};

use crate::config::{BackendPreference, ClassifyConfig};
use crate::error::{ClassifyError, ClassifyResult};

/// A probe that declined, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeFailure {
    /// Probe name.
    pub name: String,
    /// Reason the probe gave.
    pub reason: String,
}

/// The chosen backend plus every probe that declined before it.
pub struct BackendSelection {
    /// Ready backend.
    pub backend: Box<dyn ComputeBackend>,
    /// Probes tried before the winner, in order.
    pub failures: Vec<ProbeFailure>,
}

impl std::fmt::Debug for BackendSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSelection")
            .field("backend", &self.backend.name())
            .field("device", &self.backend.device())
            .field("failures", &self.failures)
            .finish()
    }
}

/// Try each probe in order and keep the first backend created.
///
/// Declines are logged and recorded, never fatal on their own.
///
/// # Errors
///
/// Returns [`ClassifyError::NoBackend`] listing every reason when all
/// probes decline.
///
/// # Example
///
/// ```
/// use zone_classify::select_backend;
/// use zone_gpu::SceneProbe;
/// use zone_kernel::{BackendProbe, CpuProbe};
///
/// let probes: Vec<Box<dyn BackendProbe>> = vec![
///     Box::new(SceneProbe::new(None)),
///     Box::new(CpuProbe::default()),
/// ];
/// let selection = select_backend(&probes).unwrap();
/// assert_eq!(selection.backend.name(), "cpu");
/// assert_eq!(selection.failures.len(), 1);
/// ```
pub fn select_backend(probes: &[Box<dyn BackendProbe>]) -> ClassifyResult<BackendSelection> {
    let mut failures = Vec::new();
    for probe in probes {
        match probe.try_create() {
            Ok(backend) => {
                info!(
                    backend = backend.name(),
                    device = backend.device(),
                    declined = failures.len(),
                    "Compute backend selected"
                );
                return Ok(BackendSelection { backend, failures });
            }
            Err(reason) => {
                warn!(probe = probe.name(), reason = %reason, "Backend probe declined");
                failures.push(ProbeFailure {
                    name: probe.name().to_string(),
                    reason,
                });
            }
        }
    }

    let summary = if failures.is_empty() {
        "no probes configured".to_string()
    } else {
        failures
            .iter()
            .map(|f| format!("{}: {}", f.name, f.reason))
            .collect::<Vec<_>>()
            .join("; ")
    };
    Err(ClassifyError::NoBackend(summary))
}

/// Probe list for a configuration, most preferred first.
///
/// Every list ends with the CPU probe, so selection from it cannot fail.
#[must_use]
pub fn default_probes(config: &ClassifyConfig) -> Vec<Box<dyn BackendProbe>> {
    let seed = config.jitter_seed;
    let scene = || -> Box<dyn BackendProbe> {
        Box::new(
            SceneProbe::new(config.native_library_dir.clone())
                .with_leaf_size(config.scene_leaf_size)
                .with_seed(seed),
        )
    };
    let wgpu = || -> Box<dyn BackendProbe> {
        Box::new(WgpuProbe::new(seed, config.max_points_per_dispatch))
    };
    let cpu = || -> Box<dyn BackendProbe> { Box::new(CpuProbe::new(seed)) };

    match config.backend {
        BackendPreference::Auto if config.native_library_dir.is_some() => {
            vec![scene(), wgpu(), cpu()]
        }
        BackendPreference::Auto | BackendPreference::GeneralGpu => vec![wgpu(), cpu()],
        BackendPreference::CpuOnly => vec![cpu()],
        BackendPreference::SpecializedGpu => vec![scene(), wgpu(), cpu()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Declines(&'static str);

    impl BackendProbe for Declines {
        fn name(&self) -> &str {
            self.0
        }

        fn try_create(&self) -> Result<Box<dyn ComputeBackend>, String> {
            Err(format!("{} is unplugged", self.0))
        }
    }

    fn names(probes: &[Box<dyn BackendProbe>]) -> Vec<&str> {
        probes.iter().map(|p| p.name()).collect()
    }

    #[test]
    fn falls_through_to_cpu() {
        let probes: Vec<Box<dyn BackendProbe>> = vec![
            Box::new(Declines("alpha")),
            Box::new(Declines("beta")),
            Box::new(CpuProbe::default()),
        ];
        let selection = select_backend(&probes).unwrap();
        assert_eq!(selection.backend.name(), "cpu");
        assert_eq!(
            selection.failures,
            vec![
                ProbeFailure {
                    name: "alpha".to_string(),
                    reason: "alpha is unplugged".to_string(),
                },
                ProbeFailure {
                    name: "beta".to_string(),
                    reason: "beta is unplugged".to_string(),
                },
            ]
        );
    }

    #[test]
    fn all_declining_is_an_error() {
        let probes: Vec<Box<dyn BackendProbe>> = vec![Box::new(Declines("alpha"))];
        let err = select_backend(&probes).unwrap_err();
        assert!(format!("{err}").contains("alpha is unplugged"));
        assert!(matches!(select_backend(&[]), Err(ClassifyError::NoBackend(_))));
    }

    #[test]
    fn probe_order_follows_preference() {
        let auto = ClassifyConfig::default();
        assert_eq!(names(&default_probes(&auto)), vec!["wgpu", "cpu"]);

        let auto_native = ClassifyConfig::default().with_native_library_dir("/opt/zonescene");
        assert_eq!(names(&default_probes(&auto_native)), vec!["scene", "wgpu", "cpu"]);

        let cpu = ClassifyConfig::default().with_backend(BackendPreference::CpuOnly);
        assert_eq!(names(&default_probes(&cpu)), vec!["cpu"]);

        let general = ClassifyConfig::default().with_backend(BackendPreference::GeneralGpu);
        assert_eq!(names(&default_probes(&general)), vec!["wgpu", "cpu"]);

        let specialized = ClassifyConfig::default()
            .with_backend(BackendPreference::SpecializedGpu)
            .with_native_library_dir("/opt/zonescene");
        assert_eq!(names(&default_probes(&specialized)), vec!["scene", "wgpu", "cpu"]);
    }

    #[test]
    fn cpu_only_carries_the_seed() {
        let config = ClassifyConfig::default()
            .with_backend(BackendPreference::CpuOnly)
            .with_jitter_seed(42);
        let selection = select_backend(&default_probes(&config)).unwrap();
        assert_eq!(selection.backend.jitter_seed(), 42);
        assert!(selection.failures.is_empty());
    }
}
