use opgraph::graph;
use opgraph::runtime::Backend;
use opgraph::Shape;

use crate::case::{run_elementwise, CaseContext, CaseElement, CaseFailure};

fn run_minimum<T: CaseElement>(
    backend: &Backend,
    ctx: &CaseContext,
    shape: Shape,
    a: &[T],
    b: &[T],
    expected: &[T],
) -> Result<(), CaseFailure> {
    run_elementwise(backend, ctx, shape, &[a, b], expected, |p| {
        graph::minimum(&p[0], &p[1])
    })
}

pub(super) fn minimum(backend: &Backend, ctx: &CaseContext) -> Result<(), CaseFailure> {
    run_minimum::<f32>(
        backend,
        ctx,
        Shape::from([2, 2, 2]),
        &[1.0, 8.0, -8.0, 17.0, -0.5, 0.5, 2.0, 1.0],
        &[1.0, 2.0, 4.0, 8.0, 0.0, 0.0, 1.0, 1.5],
        &[1.0, 2.0, -8.0, 8.0, -0.5, 0.0, 1.0, 1.0],
    )
}

pub(super) fn minimum_int32(backend: &Backend, ctx: &CaseContext) -> Result<(), CaseFailure> {
    run_minimum::<i32>(
        backend,
        ctx,
        Shape::from([2, 2, 2]),
        &[1, 8, -8, 17, -5, 67_635_216, 2, 1],
        &[1, 2, 4, 8, 0, 18_448, 1, 6],
        &[1, 2, -8, 8, -5, 18_448, 1, 1],
    )
}

pub(super) fn minimum_int64(backend: &Backend, ctx: &CaseContext) -> Result<(), CaseFailure> {
    run_minimum::<i64>(
        backend,
        ctx,
        Shape::from([2, 2, 2]),
        &[1, 8, -8, 17, -5, 67_635_216, 2, 17_179_887_632],
        &[1, 2, 4, 8, 0, 18_448, 1, 280_592],
        &[1, 2, -8, 8, -5, 18_448, 1, 280_592],
    )
}

pub(super) fn minimum_unsigned_limit(
    backend: &Backend,
    ctx: &CaseContext,
) -> Result<(), CaseFailure> {
    run_minimum::<u32>(backend, ctx, Shape::scalar(), &[u32::MAX], &[10], &[10])
}
