//! Configuration access port trait.

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;

    /// Comma-separated list with blank entries dropped. `None` when the key
    /// is absent or holds no entries.
    fn get_list(&self, section: &str, key: &str) -> Option<Vec<String>> {
        let items: Vec<String> = self
            .get_string(section, key)?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if items.is_empty() { None } else { Some(items) }
    }
}
