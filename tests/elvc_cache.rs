//! Environment-light visibility cache: build, hierarchical sampling
//! consistency and the persistent round trip.

mod common;

use std::sync::Arc;

use common::{build_scene, floor_quad, DiffuseBsdf, TopDownCamera, UniformEnvLight};
use glam::Vec3;
use photon_engine::cache::CancelToken;
use photon_engine::{
    ElvcParams, EnvLightVisibilityCache, LightSource, LuminanceMap, Scene, SceneMesh, Spectrum,
};

const ALBEDO: Spectrum = Spectrum::splat(0.5);

fn env_scene() -> (Scene, Arc<dyn LightSource>) {
    let env: Arc<dyn LightSource> = Arc::new(UniformEnvLight {
        index: 0,
        radiance: Spectrum::splat(1.0),
    });
    let camera = Arc::new(TopDownCamera {
        x_range: (-2.0, 2.0),
        z_range: (-2.0, 2.0),
        height: 4.0,
        film_width: 16,
        film_height: 16,
    });
    let scene = build_scene(
        vec![SceneMesh::Plain(floor_quad(-4.0, 4.0, -4.0, 4.0))],
        vec![env.clone()],
        camera,
        ALBEDO,
    )
    .unwrap();
    (scene, env)
}

fn test_params(file_name: &str) -> ElvcParams {
    let mut params = ElvcParams::default();
    params.map.tile_width = 16;
    params.map.tile_height = 16;
    params.map.tile_sample_count = 4;
    params.visibility.max_sample_count = 50_000;
    params.visibility.target_hit_rate = 0.95;
    params.visibility.lookup_radius = 0.5;
    params.persistent.file_name = file_name.to_string();
    params.persistent.safe_save = true;
    params
}

#[test]
fn test_build_and_sample() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (scene, env) = env_scene();

    let mut cache = EnvLightVisibilityCache::with_map_size(64, 32, test_params(""));
    cache.build(&scene, &env, &CancelToken::new()).unwrap();
    assert!(cache.is_built());
    assert!(cache.entry_count() > 0);
    assert_eq!(cache.tiles_x_count(), 4);
    assert_eq!(cache.tiles_y_count(), 2);
    // No luminance map: tiles sample uniformly, no sub-distributions
    assert!(!cache.has_tile_distributions());

    // An open floor sees the upper hemisphere; sampling must work and the
    // returned pdf must agree with the pdf query
    let bsdf = DiffuseBsdf::at(Vec3::new(0.0, 0.0, 0.0), Vec3::Y, ALBEDO);
    let mut sampled = 0;
    for i in 0..64 {
        let u0 = (i % 8) as f32 / 8.0 + 0.01;
        let u1 = (i / 8) as f32 / 8.0 + 0.01;
        if let Some((uv, pdf)) = cache.sample(&bsdf, u0, u1) {
            sampled += 1;
            assert!((0.0..=1.0).contains(&uv[0]));
            assert!((0.0..=1.0).contains(&uv[1]));
            let pdf2 = cache.pdf(&bsdf, uv[0], uv[1]);
            assert!(
                (pdf - pdf2).abs() <= 1e-4 * pdf.max(1.0),
                "sample pdf {} vs query pdf {}",
                pdf,
                pdf2
            );
        }
    }
    assert!(sampled > 0, "no sample succeeded near a cached point");
}

#[test]
fn test_hierarchical_pdf_with_luminance_map() {
    let (scene, env) = env_scene();

    // A luminance map with a bright band so tile distributions matter
    let mut pixels = vec![0.1f32; 64 * 32];
    for y in 4..8 {
        for x in 20..28 {
            pixels[y * 64 + x] = 50.0;
        }
    }
    let map = LuminanceMap::new(64, 32, pixels).unwrap();

    let mut cache = EnvLightVisibilityCache::with_luminance_map(map, test_params(""));
    cache.build(&scene, &env, &CancelToken::new()).unwrap();
    assert!(cache.is_built());
    assert!(cache.has_tile_distributions());

    let bsdf = DiffuseBsdf::at(Vec3::ZERO, Vec3::Y, ALBEDO);
    for i in 0..32 {
        let u0 = (i as f32 + 0.5) / 32.0;
        let u1 = ((i * 11 % 32) as f32 + 0.5) / 32.0;
        if let Some((uv, pdf)) = cache.sample(&bsdf, u0, u1) {
            // The hierarchical pdf factorizes: coarse tile pdf times
            // in-tile pdf
            let pdf2 = cache.pdf(&bsdf, uv[0], uv[1]);
            assert!(
                (pdf - pdf2).abs() <= 1e-3 * pdf.max(1.0),
                "pdf mismatch: sample {} vs query {}",
                pdf,
                pdf2
            );
        }
    }
}

#[test]
fn test_persistent_round_trip_is_bit_exact() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("env.elvc");
    let file_name = file.to_str().unwrap();

    let (scene, env) = env_scene();
    let mut built = EnvLightVisibilityCache::with_map_size(64, 32, test_params(file_name));
    built.build(&scene, &env, &CancelToken::new()).unwrap();
    assert!(file.exists());

    // Second build must load from disk instead of tracing
    let mut loaded = EnvLightVisibilityCache::with_map_size(64, 32, test_params(file_name));
    loaded.build(&scene, &env, &CancelToken::new()).unwrap();
    assert_eq!(loaded.entry_count(), built.entry_count());
    assert_eq!(loaded.tiles_x_count(), built.tiles_x_count());
    assert_eq!(loaded.tiles_y_count(), built.tiles_y_count());

    // Sampling must agree bit-exactly between the in-memory and reloaded
    // caches at points covered during training
    let probes = [
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, -1.0),
        Vec3::new(-1.5, 0.0, 1.5),
    ];
    for p in probes {
        let bsdf = DiffuseBsdf::at(p, Vec3::Y, ALBEDO);
        for i in 0..64 {
            let u0 = (i % 8) as f32 / 8.0 + 0.05;
            let u1 = (i / 8) as f32 / 8.0 + 0.05;
            let a = built.sample(&bsdf, u0, u1);
            let b = loaded.sample(&bsdf, u0, u1);
            match (a, b) {
                (None, None) => {}
                (Some((uv_a, pdf_a)), Some((uv_b, pdf_b))) => {
                    assert_eq!(uv_a[0].to_bits(), uv_b[0].to_bits());
                    assert_eq!(uv_a[1].to_bits(), uv_b[1].to_bits());
                    assert_eq!(pdf_a.to_bits(), pdf_b.to_bits());
                }
                other => panic!("divergent sample results: {:?}", other),
            }
        }
    }
}

#[test]
fn test_cancelled_build_is_partial_but_valid() {
    let (scene, env) = env_scene();
    let cancel = CancelToken::new();
    cancel.cancel();

    let mut cache = EnvLightVisibilityCache::with_map_size(64, 32, test_params(""));
    cache.build(&scene, &env, &cancel).unwrap();
    // Nothing was traced; queries must miss cleanly
    let bsdf = DiffuseBsdf::at(Vec3::ZERO, Vec3::Y, ALBEDO);
    assert!(cache.sample(&bsdf, 0.5, 0.5).is_none());
    assert_eq!(cache.pdf(&bsdf, 0.5, 0.5), 0.0);
}
