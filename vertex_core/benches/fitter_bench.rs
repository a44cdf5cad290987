use bfield::ConstantBField;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nalgebra::{Vector3, Vector4, Vector6};
use std::sync::Arc;
use vertex_core::helix::{perigee_parameters, Trajectory};
use vertex_core::types::BoundSquareMatrix;
use vertex_core::{
    BilloirFitterConfig, BilloirState, BoundTrackParameters, FullBilloirVertexFitter,
    GaussianTrackDensity, HelicalTrackLinearizer, IdentityExtractor, Linearizer, ParticleHypothesis,
    VertexingOptions,
};

fn make_tracks(n: usize) -> Vec<BoundTrackParameters> {
    let vertex = Vector4::new(0.01, -0.02, 12.0, 0.0);
    let particle = ParticleHypothesis::pion();
    let cov = BoundSquareMatrix::from_diagonal(&Vector6::new(0.01, 0.01, 1e-4, 1e-4, 1e-4, 1.0));
    let reference = Vector3::zeros();
    (0..n)
        .map(|i| {
            let phi = i as f64 * std::f64::consts::TAU / n as f64 - std::f64::consts::PI;
            let theta = 0.6 + 1.9 * (i as f64 / n as f64);
            let qop = if i % 2 == 0 { 0.8 } else { -1.2 };
            let momentum = Vector3::new(phi, theta, qop);
            let trajectory = Trajectory::new(2.0, theta, qop);
            let params = perigee_parameters(trajectory, &vertex, &momentum, &particle, &reference)
                .unwrap_or_else(Vector6::zeros);
            BoundTrackParameters::at_origin(params, Some(cov))
        })
        .collect()
}

fn bench_fitter(c: &mut Criterion) {
    let mut group = c.benchmark_group("billoir");
    let linearizer = HelicalTrackLinearizer::new(Arc::new(ConstantBField::along_z(2.0)));
    let fitter = FullBilloirVertexFitter::new(BilloirFitterConfig::default(), IdentityExtractor);

    for n in [2, 10, 50, 200] {
        let tracks = make_tracks(n);
        group.bench_function(format!("{n}_tracks"), |b| {
            b.iter(|| {
                let mut state = BilloirState::new(linearizer.make_state());
                let options = VertexingOptions::default();
                black_box(fitter.fit(&tracks, &linearizer, &options, &mut state))
            });
        });
    }

    group.finish();
}

fn bench_density(c: &mut Criterion) {
    let mut group = c.benchmark_group("track_density");
    let density = GaussianTrackDensity::default();

    for n in [10, 100, 1000] {
        let tracks = make_tracks(n);
        group.bench_function(format!("{n}_tracks"), |b| {
            b.iter(|| black_box(density.global_maximum_with_width(&tracks, &IdentityExtractor)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fitter, bench_density);
criterion_main!(benches);
