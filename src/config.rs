//! Container-wide settings

/// Settings shared by the live container and the compiler.
///
/// # Examples
///
/// ```rust
/// use definition_injector::ContainerConfig;
///
/// let config = ContainerConfig::default()
///     .with_singleton_default(true)
///     .with_zero_config(false);
///
/// assert!(config.singleton_default);
/// assert_eq!(config.default_priority_method.as_deref(), Some("get_priority"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerConfig {
    /// Lifetime used when a definition does not say
    pub singleton_default: bool,
    /// Autowire unregistered identifiers that name a known class
    pub zero_config: bool,
    /// Honor declarative parameter metadata
    pub use_attributes: bool,
    /// Class priority function consulted for tag members without a priority
    pub default_priority_method: Option<String>,
}

impl ContainerConfig {
    /// Default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the inherited singleton flag
    pub fn with_singleton_default(mut self, singleton: bool) -> Self {
        self.singleton_default = singleton;
        self
    }

    /// Enable or disable zero-config autowiring
    pub fn with_zero_config(mut self, enabled: bool) -> Self {
        self.zero_config = enabled;
        self
    }

    /// Enable or disable parameter metadata
    pub fn with_attributes(mut self, enabled: bool) -> Self {
        self.use_attributes = enabled;
        self
    }

    /// Set (or clear) the default tag priority function
    pub fn with_default_priority_method(mut self, method: Option<impl Into<String>>) -> Self {
        self.default_priority_method = method.map(Into::into);
        self
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            singleton_default: false,
            zero_config: true,
            use_attributes: true,
            default_priority_method: Some("get_priority".to_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ContainerConfig::new();
        assert!(!config.singleton_default);
        assert!(config.zero_config);
        assert!(config.use_attributes);
    }

    #[test]
    fn test_clear_priority_method() {
        let config = ContainerConfig::new().with_default_priority_method(None::<String>);
        assert!(config.default_priority_method.is_none());
    }
}
