//! Configuration access port trait.

/// Read access to sectioned key/value settings.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;
    /// Every key in `section`, for table-style sections.
    fn keys(&self, section: &str) -> Vec<String>;
}
