//! Integration tests for zone-gpu.
//!
//! GPU-dependent checks return early when no adapter is present, so the
//! suite passes on headless CI machines.
//!
//! ```bash
//! cargo test -p zone-gpu --test integration
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use zone_gpu::{GpuContext, SceneProbe, WgpuBackend, WgpuProbe};
use zone_kernel::{
    BackendProbe, CancellationToken, ComputeBackend, CpuBackend, KernelError, PointBatch,
    ZoneGeometry,
};
use zone_types::{Aabb, ContainmentFlag, Point3, SamplePoint, ZoneMesh};

fn cube_zone(min: [f64; 3], size: f64) -> ZoneMesh {
    ZoneMesh::from_box(
        "cube",
        &Aabb::new(
            Point3::new(min[0], min[1], min[2]),
            Point3::new(min[0] + size, min[1] + size, min[2] + size),
        ),
    )
}

fn gpu_backend() -> Option<WgpuBackend> {
    if !GpuContext::is_available() {
        eprintln!("Skipping: no GPU available");
        return None;
    }
    WgpuBackend::new().ok()
}

/// Whether `p` is at least `margin` away from every face plane of `zone`.
fn clear_of_faces(zone: &ZoneMesh, p: &Point3<f64>, margin: f64) -> bool {
    let Some(b) = zone.bounds() else {
        return true;
    };
    (0..3).all(|axis| (p[axis] - b.min[axis]).abs() > margin && (p[axis] - b.max[axis]).abs() > margin)
}

/// Random batch over several zones, keeping points away from every face.
fn random_batch(zones: &[ZoneMesh], count: u32, seed: u64) -> PointBatch {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut batch = PointBatch::with_capacity(count as usize);
    let mut key = 0;
    while batch.len() < count as usize {
        let p = Point3::new(
            rng.gen_range(-1.0..14.0),
            rng.gen_range(-1.0..5.0),
            rng.gen_range(-1.0..5.0),
        );
        #[allow(clippy::cast_possible_truncation)]
        let zone = rng.gen_range(0..zones.len() + 1) as u32;
        let clear = zones.iter().all(|z| clear_of_faces(z, &p, 1e-3));
        if clear {
            batch.push(SamplePoint::new(p, key), zone);
            key += 1;
        }
    }
    batch
}

/// GPU results may only differ from the host by reporting `Uncertain`, and
/// rarely.
fn assert_agrees_with_cpu(gpu: &[ContainmentFlag], cpu: &[ContainmentFlag]) {
    assert_eq!(gpu.len(), cpu.len());
    let mut uncertain_only = 0;
    for (i, (g, c)) in gpu.iter().zip(cpu).enumerate() {
        if g == c {
            continue;
        }
        assert!(
            *g == ContainmentFlag::Uncertain || *c == ContainmentFlag::Uncertain,
            "point {i}: gpu {g:?} vs cpu {c:?}"
        );
        uncertain_only += 1;
    }
    assert!(uncertain_only * 200 <= gpu.len(), "{uncertain_only} uncertain-only mismatches");
}

#[test]
fn test_gpu_matches_cpu_on_batched_zones() {
    let Some(mut gpu) = gpu_backend() else {
        return;
    };
    let zones = vec![
        cube_zone([0.0, 0.0, 0.0], 4.0),
        cube_zone([10.0, 0.0, 0.0], 2.0),
        ZoneMesh::new("empty", Vec::new()),
        cube_zone([9.0, 1.0, 1.0], 3.0),
    ];
    let geometry = ZoneGeometry::from_zones(zones.iter().map(|z| z.triangles.as_slice())).unwrap();
    let batch = random_batch(&zones, 5000, 42);
    let cancel = CancellationToken::new();

    let mut cpu = CpuBackend::new();
    for two_rays in [false, true] {
        let expected = cpu
            .test_points_batched(&geometry, batch.points(), batch.zone_ids(), two_rays, &cancel)
            .unwrap();
        let actual = gpu
            .test_points_batched(&geometry, batch.points(), batch.zone_ids(), two_rays, &cancel)
            .unwrap();
        assert_agrees_with_cpu(&actual, &expected);
    }
}

#[test]
fn test_gpu_small_dispatches_match_one_big_dispatch() {
    let Some(gpu) = gpu_backend() else {
        return;
    };
    let mut gpu = gpu.with_max_points_per_dispatch(100);
    let zone = cube_zone([0.0, 0.0, 0.0], 4.0);
    let batch = random_batch(std::slice::from_ref(&zone), 1000, 7);
    let geometry = ZoneGeometry::single(&zone.triangles).unwrap();
    let cancel = CancellationToken::new();

    let chunked = gpu
        .test_points_batched(&geometry, batch.points(), batch.zone_ids(), true, &cancel)
        .unwrap();
    let mut whole = WgpuBackend::new().unwrap();
    let single = whole
        .test_points_batched(&geometry, batch.points(), batch.zone_ids(), true, &cancel)
        .unwrap();
    assert_eq!(chunked, single);
}

#[test]
fn test_gpu_far_coordinates() {
    let Some(mut gpu) = gpu_backend() else {
        return;
    };
    // A 1 m box (millimeters) two thousand kilometers from the origin.
    let base = 2.0e9;
    let zone = cube_zone([base, base, 0.0], 1000.0);
    let points = [
        SamplePoint::from_coords(base + 500.0, base + 500.0, 500.0, 0),
        SamplePoint::from_coords(base + 1500.0, base + 500.0, 500.0, 1),
    ];
    let flags = gpu
        .test_points(&zone.triangles, &points, true, &CancellationToken::new())
        .unwrap();
    assert_eq!(flags, vec![ContainmentFlag::Inside, ContainmentFlag::Outside]);
}

#[test]
fn test_gpu_geometry_change_is_uploaded() {
    let Some(mut gpu) = gpu_backend() else {
        return;
    };
    let p = [SamplePoint::from_coords(0.5, 0.5, 0.5, 0)];
    let cancel = CancellationToken::new();
    let a = cube_zone([0.0, 0.0, 0.0], 1.0);
    let b = cube_zone([5.0, 5.0, 5.0], 1.0);

    assert_eq!(
        gpu.test_points(&a.triangles, &p, true, &cancel).unwrap(),
        vec![ContainmentFlag::Inside]
    );
    assert_eq!(
        gpu.test_points(&b.triangles, &p, true, &cancel).unwrap(),
        vec![ContainmentFlag::Outside]
    );
    gpu.reset();
    assert_eq!(
        gpu.test_points(&a.triangles, &p, true, &cancel).unwrap(),
        vec![ContainmentFlag::Inside]
    );
}

#[test]
fn test_gpu_cancel_before_dispatch() {
    let Some(mut gpu) = gpu_backend() else {
        return;
    };
    let zone = cube_zone([0.0, 0.0, 0.0], 1.0);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = gpu
        .test_points(
            &zone.triangles,
            &[SamplePoint::from_coords(0.5, 0.5, 0.5, 0)],
            false,
            &cancel,
        )
        .unwrap_err();
    assert!(matches!(err, KernelError::Cancelled));
}

#[test]
fn test_probes_report_reasons() {
    let missing = std::env::temp_dir().join("zone-gpu-integration-no-plugin");
    let reason = SceneProbe::new(Some(missing)).try_create().err().unwrap();
    assert!(reason.contains("native scene library unavailable"));

    match WgpuProbe::default().try_create() {
        Ok(backend) => assert_eq!(backend.name(), "wgpu"),
        Err(reason) => assert!(reason.contains("not available")),
    }
}
