//! Runtime configuration.

use crate::to_array::ToArrayMode;

/// Configuration shared by every entity built from one catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// How deep `ToArrayMode::Full` follows relationships before falling
    /// back to identity references.
    pub max_recursion_level: usize,

    /// Mode used by `Entity::to_array_default`.
    pub default_to_array_mode: ToArrayMode,

    /// When false, text holding an integer is coerced on assignment to an
    /// integer field.
    pub strict_types: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_recursion_level: 3,
            default_to_array_mode: ToArrayMode::AsIs,
            strict_types: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the relationship recursion limit for full exports.
    #[must_use]
    pub const fn max_recursion_level(mut self, level: usize) -> Self {
        self.max_recursion_level = level;
        self
    }

    /// Sets the default export mode.
    #[must_use]
    pub const fn default_to_array_mode(mut self, mode: ToArrayMode) -> Self {
        self.default_to_array_mode = mode;
        self
    }

    /// Sets strict type checking on assignment.
    #[must_use]
    pub const fn strict_types(mut self, value: bool) -> Self {
        self.strict_types = value;
        self
    }
}
