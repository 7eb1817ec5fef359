/// Identifier used as `server` and `user-agent` header value.
pub const fn network_service_identifier() -> &'static str {
    concat!("vecro-node/", env!("CARGO_PKG_VERSION"))
}
