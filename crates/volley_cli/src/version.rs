/// The version reported by `volley version`.
pub(crate) const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
