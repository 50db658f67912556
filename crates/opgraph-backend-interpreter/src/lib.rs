pub mod cpu;
mod kernels;
pub mod widened;

pub use cpu::{
    CpuKernelInterceptor, CpuPortableBackend, CpuTensor, GenericCpuBackend, NoopInterceptor,
    TensorData,
};
pub use widened::{WidenedPrecisionBackend, WidenedPrecisionInterceptor};

pub const INTERPRETER_BACKEND_NAME: &str = "interpreter";
pub const CPU_ALIAS_NAME: &str = "cpu";
pub const WIDENED_BACKEND_NAME: &str = "interpreter-wide";

/// Register the interpreter backends with the global backend registry.
///
/// Called automatically from a static initializer; calling it again is harmless.
/// Registers "interpreter", its alias "cpu", and the widened-precision "interpreter-wide".
pub fn register_interpreter_backends() {
    use opgraph::backend::registry::register_portable_backend;

    register_portable_backend(INTERPRETER_BACKEND_NAME, CpuPortableBackend::new);
    register_portable_backend(CPU_ALIAS_NAME, || {
        CpuPortableBackend::new().named(CPU_ALIAS_NAME)
    });
    register_portable_backend(WIDENED_BACKEND_NAME, WidenedPrecisionBackend::widened);
}

// Auto-register on library load
#[cfg(not(target_family = "wasm"))]
#[used]
#[link_section = ".init_array"]
static REGISTER_INTERPRETER_BACKENDS: extern "C" fn() = {
    extern "C" fn register() {
        register_interpreter_backends();
    }
    register
};
