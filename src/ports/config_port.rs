//! Configuration access port.

/// Typed lookups into sectioned key/value configuration. Numeric and
/// boolean getters fall back to `default` when the key is absent or unparsable.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;
}
