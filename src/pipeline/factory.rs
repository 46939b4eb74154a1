//! Filter factory for creating filters from parsed descriptors.

use crate::element::Filter;
use crate::elements::{Delay, FormatFilter, Identity, Negate, TemporalBlend};
use crate::error::{Error, Result};
use crate::pipeline::parser::{FilterOptions, FilterSpec};
use std::collections::HashMap;

/// Type alias for filter constructor functions.
pub type FilterConstructor = fn(&FilterOptions) -> Result<Box<dyn Filter>>;

/// Registry of filter constructors.
#[derive(Clone)]
pub struct FilterFactory {
    constructors: HashMap<String, FilterConstructor>,
}

impl FilterFactory {
    /// Create a new factory with the built-in filters registered.
    pub fn new() -> Self {
        let mut factory = Self::empty();

        factory.register("null", create_null);
        factory.register("identity", create_identity);
        factory.register("negate", create_negate);
        factory.register("format", create_format);
        factory.register("tblend", create_tblend);
        factory.register("delay", create_delay);

        factory
    }

    /// Create a factory with nothing registered.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register a custom filter constructor, replacing any existing one.
    pub fn register(&mut self, name: &str, constructor: FilterConstructor) {
        self.constructors.insert(name.to_string(), constructor);
    }

    /// Create a filter from a parsed description.
    pub fn create(&self, spec: &FilterSpec) -> Result<Box<dyn Filter>> {
        self.create_named(&spec.name, &spec.options)
    }

    /// Create a filter by kind name.
    pub fn create_named(&self, kind: &str, options: &FilterOptions) -> Result<Box<dyn Filter>> {
        match self.constructors.get(kind) {
            Some(constructor) => constructor(options),
            None => Err(Error::UnknownFilter(kind.to_string())),
        }
    }

    /// Check if a filter kind is registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// List all registered filter names, sorted.
    pub fn list_filters(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for FilterFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FilterFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterFactory")
            .field("filters", &self.list_filters())
            .finish()
    }
}

// Built-in filter constructors

fn create_null(options: &FilterOptions) -> Result<Box<dyn Filter>> {
    options.ensure_known("null", &[])?;
    Ok(Box::new(Identity::new().with_name("null")))
}

fn create_identity(options: &FilterOptions) -> Result<Box<dyn Filter>> {
    Ok(Box::new(Identity::from_options(options)?))
}

fn create_negate(options: &FilterOptions) -> Result<Box<dyn Filter>> {
    Ok(Box::new(Negate::from_options(options)?))
}

fn create_format(options: &FilterOptions) -> Result<Box<dyn Filter>> {
    Ok(Box::new(FormatFilter::from_options(options)?))
}

fn create_tblend(options: &FilterOptions) -> Result<Box<dyn Filter>> {
    Ok(Box::new(TemporalBlend::from_options(options)?))
}

fn create_delay(options: &FilterOptions) -> Result<Box<dyn Filter>> {
    Ok(Box::new(Delay::from_options(options)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::PixelFormat;

    #[test]
    fn test_factory_creation() {
        let factory = FilterFactory::new();
        assert!(factory.is_registered("null"));
        assert!(factory.is_registered("identity"));
        assert!(factory.is_registered("negate"));
        assert!(factory.is_registered("format"));
        assert!(factory.is_registered("tblend"));
        assert!(factory.is_registered("delay"));
        assert!(!factory.is_registered("boxblur"));
        assert_eq!(factory.list_filters().len(), 6);
    }

    #[test]
    fn test_create_identity() {
        let factory = FilterFactory::new();
        let filter = factory.create(&FilterSpec::new("identity")).unwrap();
        assert_eq!(filter.name(), "identity");
        assert_eq!(filter.input_count(), 1);
        assert_eq!(filter.output_count(), 1);
    }

    #[test]
    fn test_create_null_named_null() {
        let factory = FilterFactory::new();
        let filter = factory.create(&FilterSpec::new("null")).unwrap();
        assert_eq!(filter.name(), "null");
    }

    #[test]
    fn test_create_format_with_options() {
        let factory = FilterFactory::new();
        let spec = FilterSpec::new("format").with_option("pix_fmts", "nv12");
        let filter = factory.create(&spec).unwrap();
        assert!(filter.input_caps().accepts(PixelFormat::Nv12));
        assert!(!filter.input_caps().accepts(PixelFormat::Yuv420p));
    }

    #[test]
    fn test_create_rejects_bad_option() {
        let factory = FilterFactory::new();
        let spec = FilterSpec::new("delay").with_option("frames", "many");
        assert!(matches!(
            factory.create(&spec),
            Err(Error::InvalidOption { .. })
        ));
    }

    #[test]
    fn test_unknown_filter() {
        let factory = FilterFactory::new();
        let result = factory.create(&FilterSpec::new("boxblur"));
        assert!(matches!(result, Err(Error::UnknownFilter(ref name)) if name == "boxblur"));
    }

    #[test]
    fn test_register_custom() {
        fn create_custom(_: &FilterOptions) -> Result<Box<dyn Filter>> {
            Ok(Box::new(Identity::new().with_name("custom")))
        }

        let mut factory = FilterFactory::empty();
        assert!(factory.list_filters().is_empty());
        factory.register("custom", create_custom);
        let filter = factory.create(&FilterSpec::new("custom")).unwrap();
        assert_eq!(filter.name(), "custom");
    }
}
