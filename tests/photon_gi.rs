//! Photon-GI cache build over a closed box scene.

mod common;

use std::sync::Arc;

use common::{build_scene, quad, DiffuseBsdf, PointLight, TopDownCamera};
use glam::Vec3;
use photon_engine::cache::CancelToken;
use photon_engine::{PhotonGiCache, PhotonGiParams, SceneMesh, Spectrum};

const ALBEDO: Spectrum = Spectrum::splat(0.6);

/// Closed box [-2,2]^2 in x/z, y in [0,4], normals facing inward
fn box_scene() -> photon_engine::Scene {
    let objects = vec![
        // Floor (+Y)
        SceneMesh::Plain(quad(
            Vec3::new(-2.0, 0.0, -2.0),
            Vec3::new(0.0, 0.0, 4.0),
            Vec3::new(4.0, 0.0, 0.0),
        )),
        // Ceiling (-Y)
        SceneMesh::Plain(quad(
            Vec3::new(-2.0, 4.0, -2.0),
            Vec3::new(4.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 4.0),
        )),
        // Wall x = -2 (+X)
        SceneMesh::Plain(quad(
            Vec3::new(-2.0, 0.0, -2.0),
            Vec3::new(0.0, 4.0, 0.0),
            Vec3::new(0.0, 0.0, 4.0),
        )),
        // Wall x = 2 (-X)
        SceneMesh::Plain(quad(
            Vec3::new(2.0, 0.0, -2.0),
            Vec3::new(0.0, 0.0, 4.0),
            Vec3::new(0.0, 4.0, 0.0),
        )),
        // Wall z = -2 (+Z)
        SceneMesh::Plain(quad(
            Vec3::new(-2.0, 0.0, -2.0),
            Vec3::new(4.0, 0.0, 0.0),
            Vec3::new(0.0, 4.0, 0.0),
        )),
        // Wall z = 2 (-Z)
        SceneMesh::Plain(quad(
            Vec3::new(-2.0, 0.0, 2.0),
            Vec3::new(0.0, 4.0, 0.0),
            Vec3::new(4.0, 0.0, 0.0),
        )),
    ];
    let camera = Arc::new(TopDownCamera {
        x_range: (-1.5, 1.5),
        z_range: (-1.5, 1.5),
        height: 3.5,
        film_width: 16,
        film_height: 16,
    });
    build_scene(
        objects,
        vec![Arc::new(PointLight {
            index: 0,
            position: Vec3::new(0.0, 2.0, 0.0),
            intensity: Spectrum::splat(20.0),
        })],
        camera,
        ALBEDO,
    )
    .unwrap()
}

fn test_params() -> PhotonGiParams {
    let mut params = PhotonGiParams {
        indirect_enabled: true,
        caustic_enabled: true,
        ..Default::default()
    };
    params.photon.max_path_count = 20_000;
    params.photon.max_path_depth = 4;
    params.visibility.lookup_radius = 0.5;
    params.visibility.max_sample_count = 50_000;
    params.visibility.target_hit_rate = 0.95;
    params
}

#[test]
fn test_indirect_cache_build_and_query() {
    let _ = env_logger::builder().is_test(true).try_init();
    let scene = box_scene();

    let mut cache = PhotonGiCache::new(test_params());
    cache.build(&scene, &CancelToken::new()).unwrap();

    // A diffuse box bounces every photon at least once, so the indirect
    // cache must exist; nothing is specular so no caustics can form
    assert!(cache.has_indirect());
    assert!(!cache.has_caustic());

    let bsdf = DiffuseBsdf::at(Vec3::new(0.0, 0.0, 0.0), Vec3::Y, ALBEDO);
    let radiance = cache
        .indirect_radiance(&bsdf)
        .expect("the floor center must be covered by a radiance photon");
    let total = radiance.outgoing_radiance.total();
    assert!(total.is_valid());
    assert!(
        total.y() > 0.0,
        "indirect radiance must be positive inside a lit box"
    );

    // No caustic photons: the estimate is exactly black, never NaN
    let caustic = cache.caustic_radiance(&bsdf);
    assert!(caustic.total().is_valid());
    assert!(caustic.is_black());
}

#[test]
fn test_disabled_cache_is_inert() {
    let scene = box_scene();
    let mut cache = PhotonGiCache::new(PhotonGiParams::default());
    cache.build(&scene, &CancelToken::new()).unwrap();
    assert!(!cache.has_indirect());
    assert!(!cache.has_caustic());

    let bsdf = DiffuseBsdf::at(Vec3::ZERO, Vec3::Y, ALBEDO);
    assert!(cache.indirect_radiance(&bsdf).is_none());
    assert!(cache.caustic_radiance(&bsdf).is_black());
}

#[test]
fn test_glossiness_threshold_gates_queries() {
    let scene = box_scene();
    let mut params = test_params();
    params.glossiness_usage_threshold = 0.3;
    let mut cache = PhotonGiCache::new(params);
    cache.build(&scene, &CancelToken::new()).unwrap();

    // The diffuse mock reports glossiness 0, below the threshold
    let diffuse = DiffuseBsdf::at(Vec3::ZERO, Vec3::Y, ALBEDO);
    assert!(cache.is_photon_gi_enabled(&diffuse));
}
