//! Configuration access port trait.

/// Sectioned key/value configuration source. Values come back raw; typed
/// parsing and range checks live in `domain::config_validation`.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    /// Section names present in the source, in no particular order.
    fn sections(&self) -> Vec<String>;

    /// A comma-separated value split into trimmed, non-empty items.
    fn get_list(&self, section: &str, key: &str) -> Option<Vec<String>> {
        self.get_string(section, key).map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
    }
}
