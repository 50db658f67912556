use opgraph::backend::registry::{
    create_backend, get_typed_backend, has_backend, list_backends, register_portable_backend,
    RegistryError,
};
use opgraph::runtime::Backend;
use opgraph_backend_interpreter::CpuPortableBackend;

#[test]
fn unknown_backends_report_the_registered_names() {
    register_portable_backend("registry-test-a", || {
        CpuPortableBackend::new().named("registry-test-a")
    });
    let err = create_backend("registry-test-missing").err().unwrap();
    let RegistryError::UnknownBackend { name, available } = &err;
    assert_eq!(name, "registry-test-missing");
    assert!(available.contains(&"registry-test-a".to_string()));
    let mut sorted = available.clone();
    sorted.sort();
    assert_eq!(&sorted, available);
    assert!(err.to_string().contains("registry-test-a"));
}

#[test]
fn listing_is_sorted() {
    register_portable_backend("registry-test-z", CpuPortableBackend::new);
    register_portable_backend("registry-test-m", CpuPortableBackend::new);
    let names = list_backends();
    let z = names.iter().position(|n| n == "registry-test-z").unwrap();
    let m = names.iter().position(|n| n == "registry-test-m").unwrap();
    assert!(m < z);
    assert!(has_backend("registry-test-m"));
    assert!(!has_backend("registry-test-unregistered"));
}

#[test]
fn erased_backends_can_be_recovered() {
    register_portable_backend("registry-test-typed", || {
        CpuPortableBackend::new().named("registry-test-typed")
    });
    let erased = create_backend("registry-test-typed").unwrap();
    assert_eq!(erased.backend_name(), "registry-test-typed");
    let typed = get_typed_backend::<CpuPortableBackend>(erased.as_ref()).unwrap();
    assert_eq!(
        opgraph::PortableBackend::backend_name(typed.as_ref()),
        "registry-test-typed"
    );
}

#[test]
fn runtime_backend_resolves_through_the_registry() {
    opgraph_backend_interpreter::register_interpreter_backends();
    let backend = Backend::create("cpu").unwrap();
    assert_eq!(backend.name(), "cpu");
    let err = Backend::create("registry-test-nope").unwrap_err();
    assert!(format!("{err:#}").contains("registry-test-nope"));
}
