//! Global subscriber installation; runs in its own test binary so no other
//! test can install a subscriber first

use doc_repository::config::Config;
use doc_repository::error::Error;
use doc_repository::observability::init_tracing;

#[test]
fn test_init_tracing_installs_once() {
    let config = Config::default();

    init_tracing(&config).expect("first install succeeds");

    match init_tracing(&config) {
        Err(Error::Internal(message)) => {
            assert!(message.contains("Failed to initialize tracing"), "{message}");
        }
        other => panic!("expected Error::Internal, got {other:?}"),
    }
}
