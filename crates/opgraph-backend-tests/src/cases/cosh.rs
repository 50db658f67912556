use opgraph::graph;
use opgraph::runtime::Backend;
use opgraph::Shape;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::case::{run_elementwise, CaseContext, CaseFailure};

const COSH_INPUTS: [f64; 6] = [1.0, 0.0, -0.0, -1.0, 5.0, -5.0];
const SEEDED_LEN: usize = 64;
const SEED: u64 = 0x0c05_4a11;

pub(super) fn cosh(backend: &Backend, ctx: &CaseContext) -> Result<(), CaseFailure> {
    let a: Vec<f32> = COSH_INPUTS.iter().map(|&x| x as f32).collect();
    let expected: Vec<f32> = a.iter().map(|x| x.cosh()).collect();
    run_elementwise(backend, ctx, Shape::from([6]), &[a.as_slice()], &expected, |p| {
        graph::cosh(&p[0])
    })
}

pub(super) fn cosh_f64(backend: &Backend, ctx: &CaseContext) -> Result<(), CaseFailure> {
    let expected: Vec<f64> = COSH_INPUTS.iter().map(|x| x.cosh()).collect();
    run_elementwise(
        backend,
        ctx,
        Shape::from([6]),
        &[COSH_INPUTS.as_slice()],
        &expected,
        |p| graph::cosh(&p[0]),
    )
}

pub(super) fn cosh_seeded(backend: &Backend, ctx: &CaseContext) -> Result<(), CaseFailure> {
    let mut rng = StdRng::seed_from_u64(SEED);
    let a: Vec<f32> = (0..SEEDED_LEN)
        .map(|_| rng.gen_range(-10.0f32..=10.0))
        .collect();
    let expected: Vec<f32> = a.iter().map(|x| x.cosh()).collect();
    run_elementwise(
        backend,
        ctx,
        Shape::from([SEEDED_LEN]),
        &[a.as_slice()],
        &expected,
        |p| graph::cosh(&p[0]),
    )
}
