pub mod env;
pub mod os;
pub mod telemetry;

#[cfg(any(test, feature = "test-utils"))]
pub mod tmp_dir;
